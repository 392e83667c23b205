//! Error types shared across the HALO loader workspace.

use std::path::PathBuf;

use thiserror::Error;

/// Result type for loader operations.
pub type Result<T> = std::result::Result<T, LoaderError>;

/// Errors reported at the loader boundary.
///
/// Every failure an application can observe maps onto exactly one of these
/// variants; backend-reported codes the loader does not model pass through
/// as [`LoaderError::Backend`] without being retried or masked.
#[derive(Error, Debug)]
pub enum LoaderError {
    /// An operation was attempted before the required initialization
    /// completed (for example, no usable backend has been discovered).
    #[error("loader is not initialized")]
    Uninitialized,

    /// A handle argument is not currently valid.
    #[error("handle argument is not valid")]
    InvalidHandle,

    /// Destruction was attempted while other handles still depend on the
    /// object.
    #[error("object still has dependents and is in use")]
    ObjectInUse,

    /// An argument violates the operation's contract, e.g. appending to a
    /// closed command buffer or mixing handles from different backends.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// A required pointer argument was null.
    #[error("required pointer argument is null")]
    InvalidNullPointer,

    /// An enumeration tag (object category, capability bit) is not
    /// recognized.
    #[error("invalid enumeration value: {0}")]
    InvalidEnumeration(String),

    /// The operation is not supported by the selected backend.
    #[error("operation not supported: {0}")]
    Unsupported(String),

    /// The requested interface version cannot be satisfied.
    #[error("unsupported version: {0}")]
    UnsupportedVersion(String),

    /// A backend reported a failure code the loader does not model.
    #[error("backend reported error code {0}")]
    Backend(i32),

    /// A backend library could not be loaded.
    #[error("failed to load backend library {path}: {reason}")]
    LibraryLoad {
        /// Path of the library that failed to load.
        path: PathBuf,
        /// Loader-reported reason, preserved as text.
        reason: String,
    },

    /// A required symbol is missing from a backend library.
    #[error("backend symbol `{0}` is missing")]
    MissingSymbol(String),

    /// A backend manifest file could not be parsed.
    #[error("invalid backend manifest: {0}")]
    Manifest(String),

    /// IO error while reading configuration or manifest files.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl LoaderError {
    /// True for the validation-family errors that are always detected
    /// before any backend is invoked.
    pub fn is_validation_error(&self) -> bool {
        matches!(
            self,
            LoaderError::InvalidHandle
                | LoaderError::ObjectInUse
                | LoaderError::InvalidArgument(_)
                | LoaderError::InvalidNullPointer
                | LoaderError::InvalidEnumeration(_)
        )
    }
}
