//! Association store error types.

/// Errors returned by a [`CertAuthStore`](super::CertAuthStore) backend.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum StoreError {
    /// A conditional bind lost its condition: another enrollment holds the
    /// hash, or the enrollment already holds a hash.
    #[error("conflicting certificate association")]
    Conflict,

    /// The backend itself failed (I/O, database, serialization).
    #[error("association store: {0}")]
    Backend(#[source] Box<dyn std::error::Error + Send + Sync>),
}

impl StoreError {
    /// Wrap any backend failure.
    pub fn backend(err: impl Into<Box<dyn std::error::Error + Send + Sync>>) -> Self {
        Self::Backend(err.into())
    }
}
