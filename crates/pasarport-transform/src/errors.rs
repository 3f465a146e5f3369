use thiserror::Error;

/// Row-scoped conversion failures. The row is dropped and the table continues.
#[derive(Debug, Error)]
pub enum TransformError {
    #[error("inbound {inbound} has no tag")]
    MissingTag { inbound: String },
    #[error("inbound {inbound} has an unreadable config: {reason}")]
    InvalidConfig { inbound: String, reason: String },
    /// REALITY needs the server private key, which the source never stores.
    #[error("inbound {inbound} uses REALITY and its private key is not available")]
    RealityKeyUnavailable { inbound: String },
    #[error("transform {transform} failed on {column}: {reason}")]
    Transform {
        transform: String,
        column: String,
        reason: String,
    },
}
