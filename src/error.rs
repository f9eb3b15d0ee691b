
//! Error type definitions.

use std::borrow::Cow;
use std::convert::TryFrom;
use std::io::ErrorKind;

pub use std::io::Error as IoError;
pub use std::io::Result as IoResult;


/// A result that may contain a gvrs error.
pub type Result<T> = std::result::Result<T, Error>;

/// A result that, if ok, contains nothing, and otherwise contains a gvrs error.
pub type UnitResult = Result<()>;


/// An error that may happen while reading or writing a gvrs file.
/// Distinguishes between errors of the underlying byte stream
/// and errors in the contents or usage of the file itself.
#[derive(Debug)]
pub enum Error {

    /// The underlying byte stream could not be read or written.
    Io(IoError),

    /// The byte stream ended before the expected number of bytes was read.
    UnexpectedEof,

    /// The file does not start with the gvrs identifier bytes.
    BadMagic,

    /// The file declares a version this library cannot process.
    UnsupportedVersion {

        /// Major version found in the file.
        version: u8,

        /// Sub version found in the file.
        subversion: u8,
    },

    /// The opened-for-writing timestamp in the file is non-zero,
    /// so the file is either held by a writer or was not closed cleanly.
    FileBusyOrUnclean,

    /// The stored header checksum does not match the header bytes.
    HeaderChecksumMismatch,

    /// The stored checksum of a record does not match its bytes.
    RecordChecksumMismatch {

        /// File position of the offending record.
        position: u64,
    },

    /// A record type byte outside the defined range was encountered.
    InvalidRecordType(u8),

    /// A tile index is negative or not less than the tile count of the raster,
    /// or a grid coordinate lies outside the raster.
    InvalidTileIndex(i64),

    /// The first byte of a compressed packing does not
    /// select a codec known to this file.
    InvalidCompressionCode(u8),

    /// A value written to an element lies outside its declared range,
    /// or is NaN where the element does not accept NaN.
    ValueOutOfRange(Cow<'static, str>),

    /// A mutating operation was attempted on a file opened read-only,
    /// or on a file disabled by an earlier write failure.
    NotOpenForWriting,

    /// An allocation produced a file position beyond 2^35 bytes
    /// while the tile directory still uses the compact representation.
    FilePositionExceedsCompactLimit(u64),

    /// The file specification is inconsistent and cannot describe a file.
    InvalidSpecification(Cow<'static, str>),

    /// A metadata or element name violates the identifier syntax.
    InvalidMetadataName(String),
}


impl Error {

    /// Create an error declaring the specification invalid.
    pub(crate) fn invalid_spec(message: impl Into<Cow<'static, str>>) -> Self {
        Error::InvalidSpecification(message.into())
    }

    /// Create an error for a rejected element value.
    pub(crate) fn out_of_range(message: impl Into<Cow<'static, str>>) -> Self {
        Error::ValueOutOfRange(message.into())
    }
}


/// Enable using the `?` operator on `std::io::Result`.
impl From<IoError> for Error {
    fn from(error: IoError) -> Self {
        if error.kind() == ErrorKind::UnexpectedEof { Error::UnexpectedEof }
        else { Error::Io(error) }
    }
}

impl std::fmt::Display for Error {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::Io(error) => write!(formatter, "io error: {}", error),
            Error::UnexpectedEof => write!(formatter, "unexpected end of file"),
            Error::BadMagic => write!(formatter, "not a gvrs file (identifier mismatch)"),

            Error::UnsupportedVersion { version, subversion } =>
                write!(formatter, "unsupported file version {}.{}", version, subversion),

            Error::FileBusyOrUnclean =>
                write!(formatter, "file is opened for writing elsewhere or was not closed cleanly"),

            Error::HeaderChecksumMismatch => write!(formatter, "header checksum mismatch"),

            Error::RecordChecksumMismatch { position } =>
                write!(formatter, "record checksum mismatch at file position {}", position),

            Error::InvalidRecordType(code) => write!(formatter, "invalid record type {}", code),
            Error::InvalidTileIndex(index) => write!(formatter, "invalid tile index {}", index),

            Error::InvalidCompressionCode(code) =>
                write!(formatter, "invalid compression code {}", code),

            Error::ValueOutOfRange(message) => write!(formatter, "value out of range: {}", message),
            Error::NotOpenForWriting => write!(formatter, "file is not open for writing"),

            Error::FilePositionExceedsCompactLimit(position) =>
                write!(formatter, "file position {} exceeds the compact addressing limit", position),

            Error::InvalidSpecification(message) =>
                write!(formatter, "invalid specification: {}", message),

            Error::InvalidMetadataName(name) => write!(formatter, "invalid name `{}`", name),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Io(error) => Some(error),
            _ => None,
        }
    }
}


/// Panics on overflow. Cannot happen for values that describe an in-memory buffer.
pub(crate) fn usize_to_i32(value: usize) -> i32 {
    i32::try_from(value).expect("(usize as i32) overflowed")
}

/// Returns an invalid-specification error on negative values.
pub(crate) fn i32_to_usize(value: i32, error_message: &'static str) -> Result<usize> {
    usize::try_from(value).map_err(|_| Error::invalid_spec(error_message))
}
