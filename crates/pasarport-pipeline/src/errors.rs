use thiserror::Error;

/// Errors that abort a migration run.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("invalid migration order: {0}")]
    InvalidOrder(String),
    #[error("source extraction failed: {0}")]
    Extraction(#[source] pasarport_core::Error),
    #[error("target introspection failed: {0}")]
    Introspection(#[source] pasarport_core::Error),
    #[error("target store failed: {0}")]
    Store(#[from] pasarport_core::Error),
}
