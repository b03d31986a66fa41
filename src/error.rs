use thiserror::Error;

/// Failure classes of the segmentation core.
///
/// `Load` is fatal: construction fails and no session handle exists.
/// `InvalidInput` aborts a single call before any inference runs, leaving
/// the cached embedding untouched. `Inference` means the decoder returned
/// missing or malformed output tensors. `Runtime` wraps faults raised by
/// the inference layer itself; they are logged and propagated, never
/// retried, since inference is deterministic for fixed inputs.
#[derive(Debug, Error)]
pub enum SamError {
    #[error("model load failed: {0}")]
    Load(String),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("inference output missing or malformed: {0}")]
    Inference(String),

    #[error(transparent)]
    Runtime(#[from] ort::Error),
}

pub type SamResult<T> = Result<T, SamError>;
