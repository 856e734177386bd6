//! Store error type.

/// A persistence failure.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The underlying filesystem operation failed.
    #[error("store I/O failed: {0}")]
    Io(#[from] std::io::Error),

    /// The stored bytes were not valid JSON, or the document could not
    /// be serialized.
    #[error("stored document is not valid JSON: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A lock guarding the in-memory store was poisoned by a panicking
    /// writer.
    #[error("store lock poisoned")]
    Poisoned,
}
