use thiserror::Error;

use shared::error::ApiError;

/// Terminal failure of a single command invocation. Commands never retry and
/// never touch the entity store on failure; the caller decides what to do.
#[derive(Debug, Error)]
pub enum CommandError {
    /// The control API answered with a non-zero envelope code.
    #[error(transparent)]
    Api(#[from] ApiError),
    /// The request never produced a response envelope.
    #[error("transport failure: {0}")]
    Transport(#[from] reqwest::Error),
    /// The response body was not a well-formed envelope or payload.
    #[error("malformed response envelope: {0}")]
    Envelope(#[from] serde_json::Error),
}

impl CommandError {
    /// Envelope code for application errors; `None` for transport-level
    /// failures that never reached the API.
    pub fn status(&self) -> Option<i64> {
        match self {
            CommandError::Api(err) => Some(err.status),
            _ => None,
        }
    }
}

#[derive(Debug, Error)]
pub enum ChannelError {
    #[error("invalid server url: {0}")]
    Url(#[from] url::ParseError),
    #[error("cannot derive events url from '{0}'")]
    UnsupportedUrl(String),
    #[error("websocket connect failed: {0}")]
    Connect(#[from] tokio_tungstenite::tungstenite::Error),
}
