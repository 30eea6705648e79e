use thiserror::Error;

#[derive(Debug, Error)]
pub enum WorldError {
    #[error("malformed session token: expected three dot-separated segments")]
    MalformedToken,

    #[error("session token signature mismatch")]
    InvalidTokenSignature,

    #[error("session token expired")]
    TokenExpired,

    #[error("sync group not found: {0}")]
    SyncGroupNotFound(String),

    #[error("missing configuration: {0}")]
    MissingConfig(String),

    #[error("invalid action status: {0}")]
    InvalidActionStatus(String),

    #[error("persistence error: {0}")]
    Persistence(String),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, WorldError>;
