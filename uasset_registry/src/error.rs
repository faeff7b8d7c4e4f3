use std::fmt;

use crate::version::AssetRegistryVersion;

/// Errors produced while decoding or encoding an asset registry.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A sentinel or declared size didn't match what was found on the wire.
    #[error("format error: {0}")]
    Format(FormatError),

    /// The file's version predates what this codec supports.
    #[error("unsupported version: found {found:?}, minimum supported is {minimum:?}")]
    Version {
        minimum: AssetRegistryVersion,
        found: AssetRegistryVersion,
    },

    /// A count, offset, or length violates a structural invariant.
    #[error("integrity error: {0}")]
    Integrity(IntegrityError),

    /// A packed reference pointed outside the table it indexes into.
    ///
    /// Distinct from [`Error::Format`]: this indicates either a corrupt file
    /// or a bug in this codec, not a simple wire mismatch.
    #[error("internal consistency error: {0}")]
    Internal(InternalError),

    /// A feature this specification deliberately leaves unimplemented.
    #[error("not implemented: {0}")]
    NotImplemented(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

#[derive(Debug)]
pub enum FormatError {
    InvalidStartMarker { found: u32 },
    InvalidEndMarker { found: u32 },
    SizeMismatch {
        what: &'static str,
        declared: u64,
        actual: u64,
    },
    TrailingBytes { remaining: u64 },
}

impl fmt::Display for FormatError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FormatError::InvalidStartMarker { found } => {
                write!(f, "invalid tag store start marker: {found:#010x}")
            }
            FormatError::InvalidEndMarker { found } => {
                write!(f, "invalid tag store end marker: {found:#010x}")
            }
            FormatError::SizeMismatch {
                what,
                declared,
                actual,
            } => write!(
                f,
                "{what}: declared size {declared} does not match consumed size {actual}"
            ),
            FormatError::TrailingBytes { remaining } => {
                write!(f, "{remaining} byte(s) remain after decode, expected EOF")
            }
        }
    }
}

#[derive(Debug)]
pub enum IntegrityError {
    NegativeCount { what: &'static str, value: i64 },
    OffsetOutOfRange { what: &'static str, offset: u64, len: u64 },
    StringTooLong { len: usize, max: usize },
}

impl fmt::Display for IntegrityError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IntegrityError::NegativeCount { what, value } => {
                write!(f, "{what} has negative count {value}")
            }
            IntegrityError::OffsetOutOfRange { what, offset, len } => {
                write!(f, "{what} offset {offset} is out of range for length {len}")
            }
            IntegrityError::StringTooLong { len, max } => {
                write!(f, "string of {len} characters exceeds limit of {max}")
            }
        }
    }
}

#[derive(Debug)]
pub enum InternalError {
    ValueIdOutOfRange { value_type: &'static str, index: u32, len: usize },
    TagMapHandleOutOfRange { begin: u32, count: u16, len: usize },
}

impl fmt::Display for InternalError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InternalError::ValueIdOutOfRange {
                value_type,
                index,
                len,
            } => write!(
                f,
                "value id ({value_type}, {index}) is out of range for table of length {len}"
            ),
            InternalError::TagMapHandleOutOfRange { begin, count, len } => write!(
                f,
                "tag map handle [{begin}..{}) is out of range for pair array of length {len}",
                *begin as u64 + *count as u64
            ),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    pub fn invalid_start_marker(found: u32) -> Self {
        Error::Format(FormatError::InvalidStartMarker { found })
    }

    pub fn invalid_end_marker(found: u32) -> Self {
        Error::Format(FormatError::InvalidEndMarker { found })
    }

    pub fn size_mismatch(what: &'static str, declared: u64, actual: u64) -> Self {
        Error::Format(FormatError::SizeMismatch {
            what,
            declared,
            actual,
        })
    }

    pub fn trailing_bytes(remaining: u64) -> Self {
        Error::Format(FormatError::TrailingBytes { remaining })
    }

    pub fn version_too_old(minimum: AssetRegistryVersion, found: AssetRegistryVersion) -> Self {
        Error::Version { minimum, found }
    }

    pub fn negative_count(what: &'static str, value: i64) -> Self {
        Error::Integrity(IntegrityError::NegativeCount { what, value })
    }

    pub fn offset_out_of_range(what: &'static str, offset: u64, len: u64) -> Self {
        Error::Integrity(IntegrityError::OffsetOutOfRange { what, offset, len })
    }

    pub fn string_too_long(len: usize, max: usize) -> Self {
        Error::Integrity(IntegrityError::StringTooLong { len, max })
    }

    pub fn value_id_out_of_range(value_type: &'static str, index: u32, len: usize) -> Self {
        Error::Internal(InternalError::ValueIdOutOfRange {
            value_type,
            index,
            len,
        })
    }

    pub fn tag_map_handle_out_of_range(begin: u32, count: u16, len: usize) -> Self {
        Error::Internal(InternalError::TagMapHandleOutOfRange { begin, count, len })
    }

    pub fn not_implemented(what: impl Into<String>) -> Self {
        Error::NotImplemented(what.into())
    }
}
