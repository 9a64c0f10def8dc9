//! WebSocket transport error types.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum WsError {
    #[error("connection failed: {0}")]
    ConnectionFailed(String),

    #[error("connection closed: code={code}, reason={reason}")]
    ConnectionClosed { code: u16, reason: String },

    #[error("send failed: {0}")]
    SendFailed(String),

    #[error("message parse error: {0}")]
    ParseError(String),

    #[error("rate limit exceeded")]
    RateLimitExceeded,

    #[error("heartbeat timeout")]
    HeartbeatTimeout,

    #[error("subscribe timeout for {0}")]
    SubscribeTimeout(String),

    #[error("pool destroyed")]
    PoolDestroyed,

    #[error("tungstenite error: {0}")]
    Tungstenite(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type WsResult<T> = Result<T, WsError>;
