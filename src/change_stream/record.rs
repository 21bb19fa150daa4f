use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

// ============================================================================
// Change Records - raw mutation notifications against the admin table
// ============================================================================
//
// Wire shape (one element of a batch):
//
//   {
//     "eventID": "...",
//     "eventName": "INSERT" | "MODIFY" | "REMOVE",
//     "eventSource": "...",
//     "eventSourceId": "...",
//     "change": {
//       "approximateCreationDateTime": 1705309200.123,
//       "keys":     { "pk": {"S": "acme"}, "sk": {"S": "ENTERPRISE#acme"} },
//       "newImage": { ... },
//       "oldImage": { ... },
//       "sequenceNumber": "..."
//     }
//   }
//
// Attribute values are tagged: {"S": ".."}, {"N": ".."}, {"BOOL": b},
// {"NULL": true}. Any other tag is kept verbatim as `Unsupported`.
// PascalCase keys (`ApproximateCreationDateTime`, `NewImage`, ...), the
// `dynamodb` body name and `eventSourceARN` are accepted as aliases.
//
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum AttributeValue {
    S(String),
    N(String),
    #[serde(rename = "BOOL")]
    Bool(bool),
    #[serde(rename = "NULL")]
    Null(bool),
    #[serde(untagged)]
    Unsupported(Value),
}

pub type Image = BTreeMap<String, AttributeValue>;

impl AttributeValue {
    pub fn text(value: impl Into<String>) -> Self {
        AttributeValue::S(value.into())
    }

    pub fn number(value: impl ToString) -> Self {
        AttributeValue::N(value.to_string())
    }

    /// String form of a scalar value; None for null and unsupported tags.
    pub fn scalar(&self) -> Option<String> {
        match self {
            AttributeValue::S(s) => Some(s.clone()),
            AttributeValue::N(n) => Some(n.clone()),
            AttributeValue::Bool(b) => Some(b.to_string()),
            AttributeValue::Null(_) | AttributeValue::Unsupported(_) => None,
        }
    }
}

pub fn extract_scalar(image: &Image, name: &str) -> Option<String> {
    image.get(name).and_then(AttributeValue::scalar)
}

/// The raw image as a JSON object, tags preserved.
pub fn image_to_details(image: &Image) -> Map<String, Value> {
    image
        .iter()
        .map(|(k, v)| {
            let value = serde_json::to_value(v).unwrap_or(Value::Null);
            (k.clone(), value)
        })
        .collect()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeRecord {
    #[serde(rename = "eventID", alias = "eventId")]
    pub event_id: String,

    /// Kept as text so an unknown operation fails only this record.
    #[serde(rename = "eventName")]
    pub event_name: String,

    #[serde(rename = "eventSource", default, skip_serializing_if = "Option::is_none")]
    pub event_source: Option<String>,

    #[serde(
        rename = "eventSourceId",
        alias = "eventSourceARN",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub event_source_id: Option<String>,

    #[serde(rename = "change", alias = "dynamodb")]
    pub change: StreamChange,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StreamChange {
    #[serde(
        rename = "approximateCreationDateTime",
        alias = "ApproximateCreationDateTime",
        default,
        with = "epoch_seconds",
        skip_serializing_if = "Option::is_none"
    )]
    pub approximate_creation_time: Option<DateTime<Utc>>,

    #[serde(rename = "keys", alias = "Keys", default)]
    pub keys: Image,

    #[serde(rename = "newImage", alias = "NewImage", default, skip_serializing_if = "Option::is_none")]
    pub new_image: Option<Image>,

    #[serde(rename = "oldImage", alias = "OldImage", default, skip_serializing_if = "Option::is_none")]
    pub old_image: Option<Image>,

    #[serde(rename = "sequenceNumber", alias = "SequenceNumber", default, skip_serializing_if = "Option::is_none")]
    pub sequence_number: Option<String>,
}

impl ChangeRecord {
    pub fn new(event_id: impl Into<String>, event_name: impl Into<String>) -> Self {
        Self {
            event_id: event_id.into(),
            event_name: event_name.into(),
            event_source: None,
            event_source_id: None,
            change: StreamChange::default(),
        }
    }

    pub fn with_source(mut self, source: impl Into<String>, source_id: impl Into<String>) -> Self {
        self.event_source = Some(source.into());
        self.event_source_id = Some(source_id.into());
        self
    }

    pub fn with_keys(mut self, keys: Image) -> Self {
        self.change.keys = keys;
        self
    }

    pub fn with_new_image(mut self, image: Image) -> Self {
        self.change.new_image = Some(image);
        self
    }

    pub fn with_old_image(mut self, image: Image) -> Self {
        self.change.old_image = Some(image);
        self
    }

    pub fn at(mut self, time: DateTime<Utc>) -> Self {
        self.change.approximate_creation_time = Some(time);
        self
    }
}

/// Epoch seconds (integer or fractional) <-> UTC timestamp.
mod epoch_seconds {
    use super::*;

    pub fn serialize<S>(value: &Option<DateTime<Utc>>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match value {
            Some(time) => serializer.serialize_f64(time.timestamp_millis() as f64 / 1000.0),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let seconds = Option::<f64>::deserialize(deserializer)?;
        seconds
            .map(|s| {
                DateTime::<Utc>::from_timestamp_millis((s * 1000.0).round() as i64).ok_or_else(
                    || serde::de::Error::custom(format!("timestamp out of range: {}", s)),
                )
            })
            .transpose()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_parses_tagged_stream_record() {
        let json = serde_json::json!({
            "eventID": "rec-1",
            "eventName": "INSERT",
            "eventSource": "aws:dynamodb",
            "eventSourceARN": "arn:table/admin",
            "dynamodb": {
                "ApproximateCreationDateTime": 1705309200,
                "Keys": { "pk": {"S": "acme"}, "sk": {"S": "ENTERPRISE#acme"} },
                "NewImage": {
                    "name": {"S": "Acme"},
                    "max_licenses": {"N": "10"},
                    "active": {"BOOL": true},
                    "website": {"NULL": true},
                    "tags": {"SS": ["a", "b"]}
                },
                "SequenceNumber": "111"
            }
        });

        let record: ChangeRecord = serde_json::from_value(json).unwrap();
        assert_eq!(record.event_id, "rec-1");
        assert_eq!(record.event_source_id.as_deref(), Some("arn:table/admin"));
        assert_eq!(
            record.change.approximate_creation_time,
            Some(Utc.with_ymd_and_hms(2024, 1, 15, 9, 0, 0).unwrap())
        );

        let image = record.change.new_image.unwrap();
        assert_eq!(extract_scalar(&image, "name").as_deref(), Some("Acme"));
        assert_eq!(extract_scalar(&image, "max_licenses").as_deref(), Some("10"));
        assert_eq!(extract_scalar(&image, "active").as_deref(), Some("true"));
        assert_eq!(extract_scalar(&image, "website"), None);
        assert_eq!(extract_scalar(&image, "tags"), None);
        assert_eq!(extract_scalar(&image, "missing"), None);
        assert!(matches!(image.get("tags"), Some(AttributeValue::Unsupported(_))));
    }

    #[test]
    fn test_fractional_seconds_keep_millis() {
        let change: StreamChange = serde_json::from_value(serde_json::json!({
            "approximateCreationDateTime": 1705309200.250
        }))
        .unwrap();
        let time = change.approximate_creation_time.unwrap();
        assert_eq!(time.timestamp_subsec_millis(), 250);
    }

    #[test]
    fn test_details_preserve_tags() {
        let mut image = Image::new();
        image.insert("name".into(), AttributeValue::text("Acme"));
        image.insert("max_licenses".into(), AttributeValue::number(10));
        let details = image_to_details(&image);
        assert_eq!(details["name"], serde_json::json!({"S": "Acme"}));
        assert_eq!(details["max_licenses"], serde_json::json!({"N": "10"}));
    }

    #[test]
    fn test_record_serializes_with_canonical_names() {
        let record = ChangeRecord::new("rec-9", "REMOVE")
            .with_source("scylla-cdc", "admin_ks.enterprises")
            .with_old_image(Image::new());
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["eventID"], "rec-9");
        assert_eq!(json["eventSourceId"], "admin_ks.enterprises");
        assert!(json["change"]["oldImage"].is_object());
        assert!(json["change"].get("newImage").is_none());
    }
}
