//! Error types for the asset decoders.

use thiserror::Error;

/// Result type alias using SourceError.
pub type Result<T> = std::result::Result<T, SourceError>;

/// Main error type for asset decoding operations.
///
/// Every error is terminal for the decode call that raised it; nothing is
/// retried internally. The one deliberately lossy surface is the typed
/// getters on [`crate::material::MaterialPropertyGroup`], which substitute a
/// caller-supplied default instead of failing.
#[derive(Error, Debug)]
pub enum SourceError {
    /// I/O error while reading an input stream.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Failed to encode or process an image.
    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),

    /// Failed to read the embedded pakfile archive.
    #[error("Pakfile error: {0}")]
    Zip(#[from] zip::result::ZipError),

    /// A header or offset value that points outside the input stream, or a
    /// structurally invalid file.
    #[error("Malformed input: {0}")]
    Malformed(String),

    /// Token or pattern mismatch in the material text grammar. Reports the
    /// 1-based line number and the full offending line.
    #[error("Material parse error: expected {expected} on line {line}: {text}")]
    MaterialParse {
        expected: String,
        line: usize,
        text: String,
    },

    /// A recognized but unimplemented enumeration value, such as an unhandled
    /// texture pixel format or a triangle-strip encoded strip.
    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),

    /// An index resolved against a companion file falls outside that file's
    /// data. Signals version skew between files that should correspond.
    #[error("Cross-file reference out of range: {0}")]
    CrossReference(String),
}
