use thiserror::Error;

/// Errors produced by the voxlink protocol and transport layers.
#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("codec error: {0}")]
    Codec(String),

    #[error("invalid message: {0}")]
    InvalidMessage(String),

    #[error("channel error: {0}")]
    Channel(String),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("config error: {0}")]
    Config(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Other(String),
}

impl From<serde_json::Error> for GatewayError {
    fn from(e: serde_json::Error) -> Self {
        GatewayError::Codec(e.to_string())
    }
}

pub type GatewayResult<T> = Result<T, GatewayError>;
