use provisio_core::ComputationStatus;
use provisio_store::StoreError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConsolidateError {
    #[error("document id must not be empty")]
    EmptyDocumentId,

    #[error("base parse result {0} is not usable")]
    UnusableBase(String),

    #[error("no effective date could be determined for {0}")]
    NoEffectiveDate(String),

    #[error("snapshot {id} has status {status} and cannot be published")]
    NotPublishable { id: String, status: ComputationStatus },

    #[error(transparent)]
    Store(#[from] StoreError),
}
