//! Error type for the wire layer.

use thiserror::Error;

/// A server response that does not follow the IMAP grammar.
///
/// The offset is the byte position within the framed response where
/// decoding gave up; `detail` says what the decoder was looking for.
#[derive(Debug, Error)]
#[error("malformed response at byte {offset}: {detail}")]
pub struct Error {
    /// Byte position within the response.
    pub offset: usize,
    /// What went wrong there.
    pub detail: String,
}

/// Result type alias using our Error type.
pub type Result<T> = std::result::Result<T, Error>;
