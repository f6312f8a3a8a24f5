use thiserror::Error;

/// Why a distributed trace payload could not be accepted or created.
///
/// Inbound failures never reach the host application; the handler converts
/// them into a supportability counter and an absent payload.
#[derive(Error, Debug)]
pub enum PayloadError {
    #[error("Distributed trace payload is empty")]
    Null,
    #[error("Cannot decode base64 payload: {0}")]
    Base64(#[from] base64::DecodeError),
    #[error("Decoded payload is not valid UTF-8: {0}")]
    Utf8(#[from] std::string::FromUtf8Error),
    #[error("Cannot parse payload JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Payload is missing required field `{0}`")]
    MissingField(&'static str),
    #[error("Malformed payload: {0}")]
    Malformed(&'static str),
    #[error("Invalid payload timestamp {0}")]
    InvalidTimestamp(i64),
    #[error("Payload has neither a guid nor a transaction id")]
    NotTraceable,
    #[error("Unsupported payload major version {major}, highest supported is {supported}")]
    UnsupportedVersion { major: i64, supported: i64 },
    #[error("Untrusted payload with trust key {trust_key}")]
    Untrusted { trust_key: String },
    #[error("Cannot create outgoing payload: {0}")]
    InvalidOutgoing(&'static str),
}

impl PayloadError {
    /// True for malformed wire data, as opposed to well-formed payloads that are ignored.
    #[must_use]
    pub fn is_parse_failure(&self) -> bool {
        matches!(
            self,
            PayloadError::Base64(_)
                | PayloadError::Utf8(_)
                | PayloadError::Json(_)
                | PayloadError::MissingField(_)
                | PayloadError::Malformed(_)
                | PayloadError::InvalidTimestamp(_)
                | PayloadError::NotTraceable
        )
    }
}
