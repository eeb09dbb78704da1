//! Client error types.

use thiserror::Error;
use tokio_tungstenite::tungstenite;
use vergedb_codec::CodecError;

/// Client errors.
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("invalid namespace name: {0:?}")]
    InvalidNamespaceName(String),

    #[error("invalid database name: {0:?}")]
    InvalidDatabaseName(String),

    #[error("not connected")]
    NotConnected,

    #[error("connection closed")]
    ConnectionClosed,

    #[error("channel closed")]
    ChannelClosed,

    #[error("connection shut down while waiting")]
    Cancelled,

    #[error("request timeout")]
    Timeout,

    #[error("empty response")]
    EmptyResponse,

    #[error("response status is not OK: {0:?}")]
    ResponseNotOkay(String),

    #[error("could not get live query channel")]
    CouldNotGetLiveQueryChannel,

    #[error("expected a binary message")]
    ExpectedBinaryMessage,

    #[error("query error ({code}): {message}")]
    Query { code: i64, message: String },

    #[error("background tasks did not finish in time")]
    ShutdownTimeout,

    #[error("codec error: {0}")]
    Codec(#[from] CodecError),

    #[error("websocket error: {0}")]
    Websocket(#[from] tungstenite::Error),
}

impl ClientError {
    /// Returns whether retrying the operation on the same client can
    /// reasonably succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ClientError::Timeout | ClientError::ChannelClosed | ClientError::Websocket(_)
        )
    }
}
