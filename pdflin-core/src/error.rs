use crate::parser::ParseError;
use crate::writer::WriteError;
use std::fmt;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PdfError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    Parse(#[from] ParseError),

    #[error("Unable to recover cross-reference data: {0}")]
    RebuildRequired(String),

    #[error("Document catalog is missing or not a dictionary")]
    MissingRoot,

    #[error("Encrypted files are not supported")]
    Encrypted,

    #[error("Write error: {0}")]
    Write(#[from] WriteError),

    #[error("Linearization error: {0}")]
    Linearization(String),

    #[error("No input has been read")]
    NoInput,

    #[error("No output has been configured")]
    NoOutput,
}

pub type Result<T> = std::result::Result<T, PdfError>;

/// Coarse classification of a failure, stable across versions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ErrorKind {
    MalformedToken,
    UnexpectedToken,
    RebuildRequired,
    MissingRoot,
    Encrypted,
    WriteTruncated,
    Io,
    InvalidHeader,
    StreamDecode,
    Linearization,
    NoInput,
    NoOutput,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorKind::MalformedToken => "malformed token",
            ErrorKind::UnexpectedToken => "unexpected token",
            ErrorKind::RebuildRequired => "rebuild required",
            ErrorKind::MissingRoot => "missing root",
            ErrorKind::Encrypted => "encrypted",
            ErrorKind::WriteTruncated => "write truncated",
            ErrorKind::Io => "i/o",
            ErrorKind::InvalidHeader => "invalid header",
            ErrorKind::StreamDecode => "stream decode",
            ErrorKind::Linearization => "linearization",
            ErrorKind::NoInput => "no input",
            ErrorKind::NoOutput => "no output",
        };
        f.write_str(name)
    }
}

impl std::error::Error for ErrorKind {}

impl PdfError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            PdfError::Io(_) => ErrorKind::Io,
            PdfError::Parse(e) => match e {
                ParseError::Io(_) => ErrorKind::Io,
                ParseError::EmptyFile | ParseError::InvalidHeader => ErrorKind::InvalidHeader,
                ParseError::MalformedToken { .. } => ErrorKind::MalformedToken,
                ParseError::UnexpectedToken { .. } => ErrorKind::UnexpectedToken,
                ParseError::StreamDecodeError(_) => ErrorKind::StreamDecode,
                ParseError::EncryptionNotSupported => ErrorKind::Encrypted,
                ParseError::InvalidReference(..)
                | ParseError::MissingKey(_)
                | ParseError::InvalidXRef { .. }
                | ParseError::InvalidTrailer
                | ParseError::CircularReference(..) => ErrorKind::RebuildRequired,
            },
            PdfError::RebuildRequired(_) => ErrorKind::RebuildRequired,
            PdfError::MissingRoot => ErrorKind::MissingRoot,
            PdfError::Encrypted => ErrorKind::Encrypted,
            PdfError::Write(WriteError::Truncated { .. }) => ErrorKind::WriteTruncated,
            PdfError::Write(WriteError::Io(_)) => ErrorKind::Io,
            PdfError::Linearization(_) => ErrorKind::Linearization,
            PdfError::NoInput => ErrorKind::NoInput,
            PdfError::NoOutput => ErrorKind::NoOutput,
        }
    }

    /// Byte offset in the input the failure refers to, if known
    pub fn offset(&self) -> Option<u64> {
        match self {
            PdfError::Parse(e) => e.position().map(|p| p as u64),
            _ => None,
        }
    }
}

/// A recorded failure, as handed out by
/// [`PdfProcessor::drain_last_error`](crate::PdfProcessor::drain_last_error).
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ErrorDetail {
    pub kind: ErrorKind,
    pub message: String,
    pub offset: Option<u64>,
    /// Name of the input the failure happened on
    pub filename: Option<String>,
}

impl ErrorDetail {
    pub fn from_error(error: &PdfError, filename: Option<&str>) -> Self {
        Self {
            kind: error.kind(),
            message: error.to_string(),
            offset: error.offset(),
            filename: filename.map(str::to_string),
        }
    }
}

impl fmt::Display for ErrorDetail {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(name) = &self.filename {
            write!(f, "{name}: ")?;
        }
        write!(f, "{}", self.message)?;
        if let Some(offset) = self.offset {
            write!(f, " (offset {offset})")?;
        }
        Ok(())
    }
}
