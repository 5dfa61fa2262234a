use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("unsupported content class: {0}")]
    UnsupportedContentClass(String),

    #[error("invalid provision path: {0}")]
    InvalidPath(String),

    #[error("config error: {0}")]
    Config(#[from] toml::de::Error),

    #[error("serialization error: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("arrow error: {0}")]
    Arrow(#[from] arrow::error::ArrowError),
}
