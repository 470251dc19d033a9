/// Error types for the rendering core.
/// Asset failures are per-object recoverable; render errors are fatal to the
/// drain call that observed them.
use thiserror::Error;

/// Failure while resolving an external asset through one of the collaborator
/// traits. These degrade the affected object only and never abort a frame.
#[derive(Debug, Clone, Error)]
pub enum AssetError {
    #[error("model not found: {0}")]
    ModelNotFound(String),

    #[error("material {0:#010x} did not resolve")]
    MaterialNotFound(u32),

    #[error("texture decode failed for {path}: {reason}")]
    TextureDecode { path: String, reason: String },
}

/// Fatal failure of a render drain call. The first error recorded by any
/// worker is re-raised to the caller after all threads have joined; the
/// caller may fix the cause and call the drain again.
#[derive(Debug, Error)]
pub enum RenderError {
    #[error("render worker failed: {0}")]
    Worker(String),

    #[error("render queue was shut down")]
    ShutDown,
}
