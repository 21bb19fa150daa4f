pub mod actors;
pub mod api;
pub mod change_stream;
pub mod config;
pub mod db;
pub mod domain;
pub mod error;
pub mod event_sourcing;
pub mod metrics;
pub mod utils;

pub use error::{AdminError, Result};
