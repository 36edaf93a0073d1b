use crate::pointer::PointerBuf;

/// The error taxonomy for the Chava core algebra.
///
/// Each variant corresponds to a row of the error-handling design table:
/// most are ordinary, recoverable outcomes a caller is expected to branch
/// on; [`ChavaError::UnknownVerifierKind`] is the one fatal, programmer-error
/// variant that should not be retried.
#[derive(Debug, thiserror::Error)]
pub enum ChavaError {
    /// `unwrap` was called on an object that still carries obligations, or
    /// whose evidence chain contains a reject-after-accept conflict.
    #[error("obligation violation: {0:?} remain unresolved")]
    ObligationViolation(Vec<String>),

    /// A cryptographic operation failed: the object was not cleared at
    /// release time, or the ciphertext failed to authenticate.
    #[error("cryptographic operation failed: {0}")]
    Cryptographic(String),

    /// The requested object id has no corresponding entry in the store.
    #[error("object not found: {0}")]
    NotFound(String),

    /// A pointer did not resolve against the object's value. Note this is
    /// never surfaced to a caller of `project`/`merge` directly; those
    /// convert it into an `("invalid_path", "")` obligation instead. The
    /// variant exists for lower-level callers (e.g. `Pointer::resolve`)
    /// that need a typed failure before that conversion happens.
    #[error("invalid path: {0}")]
    InvalidPath(PointerBuf),

    /// `discharge` was asked to run a verifier kind the registry has never
    /// seen registered. Not retried: this is a caller/configuration bug.
    #[error("unknown verifier kind: {0}")]
    UnknownVerifierKind(String),

    /// An obligation tuple failed basic construction invariants (empty
    /// kind, or a scope that isn't a well-formed JSON Pointer).
    #[error("malformed obligation: {0}")]
    MalformedObligation(String),
}

/// Convenience alias used throughout `chava-core`.
pub type Result<T> = std::result::Result<T, ChavaError>;
