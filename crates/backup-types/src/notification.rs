//! Object-created notifications from the source bucket.
//!
//! The storage service delivers notifications as a JSON document with a
//! `Records` array. Only the fields the producer needs are modelled; unknown
//! fields are ignored.
//!
//! Object keys arrive form-encoded (`+` for space, `%XX` for other bytes) and
//! are decoded by [`ObjectCreatedNotification::objects`].

use percent_encoding::percent_decode_str;
use serde::Deserialize;

/// Errors raised while reading a notification.
#[derive(Debug, thiserror::Error)]
pub enum NotificationError {
    /// The document is not a valid notification.
    #[error("malformed notification: {0}")]
    Malformed(#[from] serde_json::Error),

    /// The document carries no records.
    #[error("notification contains no records")]
    Empty,

    /// A key did not decode to UTF-8.
    #[error("object key is not valid UTF-8 after decoding: {key}")]
    InvalidKey {
        /// The key as it appeared in the notification.
        key: String,
    },
}

/// The notification document.
#[derive(Debug, Clone, Deserialize)]
pub struct ObjectCreatedNotification {
    /// One entry per created object.
    #[serde(rename = "Records")]
    pub records: Vec<NotificationRecord>,
}

/// A single notification record.
#[derive(Debug, Clone, Deserialize)]
pub struct NotificationRecord {
    /// Region of the bucket that emitted the notification.
    #[serde(rename = "awsRegion")]
    pub aws_region: String,
    /// Storage-specific payload.
    pub s3: S3Entity,
}

/// The storage payload of a notification record.
#[derive(Debug, Clone, Deserialize)]
pub struct S3Entity {
    /// The object that was created.
    pub object: S3Object,
}

/// The object described by a notification record.
#[derive(Debug, Clone, Deserialize)]
pub struct S3Object {
    /// Form-encoded object key.
    pub key: String,
    /// Object size in bytes.
    pub size: u64,
}

/// A decoded object-created notification entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectCreated {
    /// Region of the source bucket.
    pub source_region: String,
    /// Decoded object key.
    pub object_key: String,
    /// Object size in bytes.
    pub size: u64,
}

impl ObjectCreatedNotification {
    /// Parse a notification document.
    ///
    /// # Errors
    ///
    /// Returns [`NotificationError::Malformed`] if the JSON does not match.
    pub fn from_slice(body: &[u8]) -> Result<Self, NotificationError> {
        Ok(serde_json::from_slice(body)?)
    }

    /// Decode every record into an [`ObjectCreated`].
    ///
    /// # Errors
    ///
    /// Returns [`NotificationError::Empty`] if there are no records and
    /// [`NotificationError::InvalidKey`] if a key does not decode.
    pub fn objects(&self) -> Result<Vec<ObjectCreated>, NotificationError> {
        if self.records.is_empty() {
            return Err(NotificationError::Empty);
        }
        self.records
            .iter()
            .map(|record| {
                Ok(ObjectCreated {
                    source_region: record.aws_region.clone(),
                    object_key: decode_key(&record.s3.object.key)?,
                    size: record.s3.object.size,
                })
            })
            .collect()
    }
}

/// Undo form encoding: `+` becomes a space, then `%XX` escapes are decoded.
fn decode_key(raw: &str) -> Result<String, NotificationError> {
    let spaced = raw.replace('+', " ");
    percent_decode_str(&spaced)
        .decode_utf8()
        .map(std::borrow::Cow::into_owned)
        .map_err(|_utf8| NotificationError::InvalidKey {
            key: raw.to_owned(),
        })
}
