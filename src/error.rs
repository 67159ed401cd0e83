use thiserror::Error;

/// Errors that stop the extraction of a container (or of one file inside it).
///
/// Functions in this crate return [`anyhow::Result`]; callers that need to
/// tell these apart can `downcast_ref::<ExtractError>()` the error.
#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("Input file too small: {size} instead of at least {minimum} bytes")]
    InputTooSmall { size: u64, minimum: u64 },

    #[error("Unknown signature: {}", String::from_utf8_lossy(.0))]
    UnknownSignature([u8; 4]),

    #[error("Short read at 0x{offset:x}: expected {expected} bytes, got {actual}")]
    ShortRead {
        offset: u64,
        expected: usize,
        actual: usize,
    },

    #[error("Size mismatch: expected {declared}, got {actual}")]
    SizeMismatch { declared: u64, actual: u64 },

    #[error("Signature {found:02x?} does not match {expected:02x?}")]
    PatternMismatch { found: Vec<u8>, expected: Vec<u8> },

    #[error("Refusing to write outside the output directory: {0}")]
    UnsafePath(String),
}
