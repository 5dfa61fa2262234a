use provisio_core::CoreError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ParseError {
    #[error("document id must not be empty")]
    EmptyDocumentId,

    #[error("invalid keyword pattern: {0}")]
    Pattern(#[from] regex::Error),

    #[error(transparent)]
    Core(#[from] CoreError),
}
