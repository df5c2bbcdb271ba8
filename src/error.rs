//! Unified error types for codec operations.

use crate::format::ImageFormat;

/// Unified error type for codec operations.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum CodecError {
    /// Generic failure (surface factory misbehaved, driver misuse, ...).
    #[error("{0}")]
    Failure(String),
    /// Format variant not implemented (bit depth, color space, image type).
    #[error("unsupported: {0}")]
    Unsupported(String),
    /// The codec does not implement the requested operation.
    #[error("format {format:?} does not support: {operation}")]
    UnsupportedOperation {
        format: ImageFormat,
        operation: &'static str,
    },
    /// The source stream contained no bytes at all.
    #[error("empty input")]
    EmptyInput,
    /// Allocation failure in a codec or in the surface factory.
    #[error("out of memory")]
    NoMemory,
    /// Malformed bitstream: truncation, invalid packets, bad header fields.
    #[error("corrupt image: {0}")]
    CorruptData(String),
    /// Reading the source or writing the sink failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    /// Operation cancelled via a [`Stop`](crate::Stop) token.
    #[error("operation cancelled")]
    Cancelled,
    /// Resource limit exceeded.
    #[error("limit exceeded: {0}")]
    LimitExceeded(String),
    /// Content type could not be determined from the name or the bytes.
    #[error("unrecognized image format")]
    UnrecognizedFormat,
    /// No codec handles this MIME type.
    #[error("unsupported mime type `{0}'")]
    UnknownMimeType(String),
    /// Codec not enabled in the provided registry.
    #[error("format {0:?} is disabled in the codec registry")]
    DisabledFormat(ImageFormat),
}

/// Coarse classification of a [`CodecError`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Failure,
    Unsupported,
    EmptyInput,
    NoMemory,
    CorruptData,
    Io,
    Cancelled,
}

impl CodecError {
    /// Classify this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            CodecError::Failure(_) => ErrorKind::Failure,
            CodecError::Unsupported(_)
            | CodecError::UnsupportedOperation { .. }
            | CodecError::UnrecognizedFormat
            | CodecError::UnknownMimeType(_)
            | CodecError::DisabledFormat(_) => ErrorKind::Unsupported,
            CodecError::EmptyInput => ErrorKind::EmptyInput,
            CodecError::NoMemory | CodecError::LimitExceeded(_) => ErrorKind::NoMemory,
            CodecError::CorruptData(_) => ErrorKind::CorruptData,
            CodecError::Io(_) => ErrorKind::Io,
            CodecError::Cancelled => ErrorKind::Cancelled,
        }
    }

    pub(crate) fn corrupt(format: ImageFormat, detail: impl core::fmt::Display) -> Self {
        CodecError::CorruptData(format!("{}: {}", format.name(), detail))
    }

    pub(crate) fn unsupported(format: ImageFormat, detail: impl core::fmt::Display) -> Self {
        CodecError::Unsupported(format!("{}: {}", format.name(), detail))
    }

    pub(crate) fn failure(format: ImageFormat, detail: impl core::fmt::Display) -> Self {
        CodecError::Failure(format!("{}: {}", format.name(), detail))
    }

    pub(crate) fn truncated(format: ImageFormat) -> Self {
        Self::corrupt(format, "truncated image")
    }
}

impl From<enough::StopReason> for CodecError {
    fn from(_: enough::StopReason) -> Self {
        CodecError::Cancelled
    }
}

// Conversion helpers for codec-specific errors
#[cfg(feature = "png")]
impl From<png::DecodingError> for CodecError {
    fn from(error: png::DecodingError) -> Self {
        match error {
            png::DecodingError::IoError(e) => CodecError::Io(e),
            png::DecodingError::LimitsExceeded => {
                CodecError::LimitExceeded(String::from("png: decoder memory limit"))
            }
            other => CodecError::corrupt(ImageFormat::Png, other),
        }
    }
}

#[cfg(feature = "png")]
impl From<png::EncodingError> for CodecError {
    fn from(error: png::EncodingError) -> Self {
        match error {
            png::EncodingError::IoError(e) => CodecError::Io(e),
            other => CodecError::failure(ImageFormat::Png, other),
        }
    }
}

#[cfg(feature = "jpeg")]
impl From<jpeg_decoder::Error> for CodecError {
    fn from(error: jpeg_decoder::Error) -> Self {
        match error {
            jpeg_decoder::Error::Io(e) => CodecError::Io(e),
            jpeg_decoder::Error::Unsupported(feature) => {
                CodecError::unsupported(ImageFormat::Jpeg, format!("{:?}", feature))
            }
            jpeg_decoder::Error::Format(msg) => CodecError::corrupt(ImageFormat::Jpeg, msg),
            #[allow(unreachable_patterns)]
            other => CodecError::corrupt(ImageFormat::Jpeg, other),
        }
    }
}
