use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;

/// Response envelope shared by every control API endpoint. `code == 0` means
/// `info` carries the success payload; any other code means `info` is a
/// human-readable error message.
#[derive(Debug, Clone, Deserialize)]
pub struct Envelope {
    pub code: i64,
    #[serde(default)]
    pub info: Value,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("api error {status}: {message}")]
pub struct ApiError {
    pub status: i64,
    pub message: String,
}

impl Envelope {
    /// Decode the envelope into a typed result exactly once; callers never
    /// re-inspect the raw `code` field.
    pub fn into_result(self) -> Result<Value, ApiError> {
        if self.code == 0 {
            return Ok(self.info);
        }
        let message = match self.info {
            Value::String(message) => message,
            Value::Null => String::new(),
            other => other.to_string(),
        };
        Err(ApiError {
            status: self.code,
            message,
        })
    }
}
