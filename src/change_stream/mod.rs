mod processor;
mod record;

pub use processor::{
    to_event, BatchItemFailure, BatchOutcome, BatchResponse, ChangeRecordError,
    ChangeStreamProcessor, RecordOutcome, SYSTEM_USER,
};
pub use record::{extract_scalar, image_to_details, AttributeValue, ChangeRecord, Image, StreamChange};
