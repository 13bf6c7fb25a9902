use std::sync::Arc;

use thiserror::Error;

/// Error type shared by every block, range and writer operation.
///
/// The kind lives behind an `Arc` so a faulted range can hand the very same
/// error back on every later call without re-deriving it.
#[derive(Debug, Clone, Error)]
#[error(transparent)]
pub struct Error(Arc<ErrorKind>);

pub type Result<T, E = Error> = std::result::Result<T, E>;

impl Error {
    pub fn kind(&self) -> &ErrorKind {
        self.0.as_ref()
    }

    pub fn corrupt(chunk: usize, message: impl Into<String>) -> Error {
        ErrorKind::Corrupt {
            chunk,
            message: message.into(),
        }
        .into()
    }

    pub fn checksum_mismatch(chunk: usize, expected: u64, actual: u64) -> Error {
        ErrorKind::ChecksumMismatch {
            chunk,
            expected,
            actual,
        }
        .into()
    }

    pub fn count_mismatch(declared: u64, actual: u64) -> Error {
        ErrorKind::CountMismatch { declared, actual }.into()
    }

    pub fn unknown_encoding(tag: u16) -> Error {
        ErrorKind::UnknownEncoding(tag).into()
    }

    pub fn unknown_codec(id: u16) -> Error {
        ErrorKind::UnknownCodec(id).into()
    }

    pub fn released() -> Error {
        ErrorKind::Released.into()
    }

    pub fn invalid_arg(name: impl Into<String>, message: impl Into<String>) -> Error {
        ErrorKind::InvalidArgument {
            name: name.into(),
            message: message.into(),
        }
        .into()
    }

    pub fn invalid_format(element: impl Into<String>, message: impl Into<String>) -> Error {
        ErrorKind::InvalidFormat {
            element: element.into(),
            message: message.into(),
        }
        .into()
    }

    pub fn encode(message: impl Into<String>) -> Error {
        ErrorKind::Encode {
            message: message.into(),
        }
        .into()
    }

    /// True for errors caused by the block contents: corrupt bytes, a wrong
    /// declared element count, or an encoding/codec nobody registered.
    pub fn is_decode(&self) -> bool {
        matches!(
            self.kind(),
            ErrorKind::Corrupt { .. }
                | ErrorKind::ChecksumMismatch { .. }
                | ErrorKind::CountMismatch { .. }
                | ErrorKind::UnknownEncoding(_)
                | ErrorKind::UnknownCodec(_)
        )
    }

    /// True for lifecycle bugs in the caller, such as reading a released range.
    pub fn is_misuse(&self) -> bool {
        matches!(self.kind(), ErrorKind::Released)
    }

    /// True if both errors share the same allocation, i.e. one is a clone of
    /// the other.
    pub fn same_as(&self, other: &Error) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

#[derive(Debug, Error)]
pub enum ErrorKind {
    #[error("corrupt block data in chunk {chunk}: {message}")]
    Corrupt { chunk: usize, message: String },

    #[error("checksum mismatch in chunk {chunk}: expected {expected:016x}, got {actual:016x}")]
    ChecksumMismatch {
        chunk: usize,
        expected: u64,
        actual: u64,
    },

    #[error("element count mismatch: block declares {declared} elements but holds {actual}")]
    CountMismatch { declared: u64, actual: u64 },

    #[error("unknown encoding tag {0}")]
    UnknownEncoding(u16),

    #[error("unknown compression codec id {0}")]
    UnknownCodec(u16),

    #[error("block range used after release")]
    Released,

    #[error("invalid argument {name}: {message}")]
    InvalidArgument { name: String, message: String },

    #[error("invalid format for '{element}': {message}")]
    InvalidFormat { element: String, message: String },

    #[error("failed to encode chunk: {message}")]
    Encode { message: String },
}

impl From<ErrorKind> for Error {
    fn from(kind: ErrorKind) -> Self {
        Error(Arc::new(kind))
    }
}
