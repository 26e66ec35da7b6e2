use std::time::Duration;

use thiserror::Error;

/// Errors surfaced by the order flow
#[derive(Error, Debug)]
pub enum FlowError {
    #[error("Step execution failed: {0}")]
    StepExecutionFailed(String),

    #[error("Session storage error: {0}")]
    StorageError(String),

    #[error(transparent)]
    Catalog(#[from] CatalogError),

    #[error(transparent)]
    Oracle(#[from] OracleError),

    #[error(transparent)]
    Fulfillment(#[from] FulfillmentError),

    #[error("Transcript error: {0}")]
    TranscriptError(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// The product store could not be queried. Never used for "no products".
#[derive(Error, Debug, Clone)]
pub enum CatalogError {
    #[error("Catalog store unavailable: {0}")]
    Unavailable(String),
}

#[derive(Error, Debug, Clone)]
pub enum OracleError {
    #[error("Oracle call failed: {0}")]
    Failed(String),

    #[error("Oracle call timed out after {0:?}")]
    Timeout(Duration),

    #[error("Oracle returned an empty reply")]
    EmptyReply,
}

#[derive(Error, Debug, Clone)]
pub enum FulfillmentError {
    #[error("Fulfillment collaborator unreachable: {0}")]
    Unreachable(String),

    #[error("Fulfillment collaborator rejected the order with status {status}")]
    Rejected { status: u16 },
}

pub type Result<T> = std::result::Result<T, FlowError>;
