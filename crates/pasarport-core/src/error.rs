use thiserror::Error;

/// Error type shared by the migration crates and the database collaborators.
#[derive(Debug, Error)]
pub enum Error {
    /// Connection refused, dropped, or otherwise unusable.
    #[error("connection error: {0}")]
    Connection(String),
    /// A single statement was rejected; the connection is still usable.
    #[error("statement error: {0}")]
    Statement(String),
    /// Target schema metadata could not be read.
    #[error("introspection error: {0}")]
    Introspection(String),
    /// Catch-all error for unexpected failures.
    #[error("other error: {0}")]
    Other(String),
}

impl Error {
    /// Errors that must abort the whole run.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Error::Connection(_) | Error::Introspection(_))
    }
}

/// Convenience alias for results returned by pasarport crates.
pub type Result<T> = std::result::Result<T, Error>;
