//! PDF Parser Module
//!
//! Byte-level reading of PDF files according to ISO 32000-1: tokens, objects,
//! cross-reference tables and streams, trailers and stream filters.

pub mod filters;
pub mod header;
pub mod lexer;
pub mod object_stream;
pub mod objects;
pub mod stack_safe;
pub mod trailer;
pub mod xref;
pub mod xref_stream;

pub use self::header::{PdfHeader, PdfVersion};
pub use self::lexer::{Lexer, Token};
pub use self::object_stream::ObjectStream;
pub use self::objects::{
    LengthResolver, ObjectId, ObjectParser, PdfArray, PdfDictionary, PdfName, PdfObject,
    PdfStream, PdfString,
};
pub use self::stack_safe::StackSafeContext;
pub use self::trailer::PdfTrailer;
pub use self::xref::{XRefEntry, XRefResolution, XRefTable};

/// Result type for parser operations
pub type ParseResult<T> = Result<T, ParseError>;

/// PDF Parser errors
#[derive(Debug, thiserror::Error)]
pub enum ParseError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Empty file")]
    EmptyFile,

    #[error("Invalid PDF header")]
    InvalidHeader,

    #[error("Malformed token at offset {position}: {message}")]
    MalformedToken { position: usize, message: String },

    #[error("Unexpected token at offset {position}: expected {expected}, found {found}")]
    UnexpectedToken {
        position: usize,
        expected: String,
        found: String,
    },

    #[error("Invalid object reference: {0} {1} R")]
    InvalidReference(u32, u16),

    #[error("Missing required key: {0}")]
    MissingKey(String),

    #[error("Invalid xref at offset {offset}: {message}")]
    InvalidXRef { offset: usize, message: String },

    #[error("Invalid trailer")]
    InvalidTrailer,

    #[error("Circular reference detected: {0} {1} R")]
    CircularReference(u32, u16),

    #[error("Stream decode error: {0}")]
    StreamDecodeError(String),

    #[error("Encryption not supported")]
    EncryptionNotSupported,
}

impl ParseError {
    /// Byte offset the error refers to, when known.
    pub fn position(&self) -> Option<usize> {
        match self {
            ParseError::MalformedToken { position, .. }
            | ParseError::UnexpectedToken { position, .. } => Some(*position),
            ParseError::InvalidXRef { offset, .. } => Some(*offset),
            _ => None,
        }
    }

    pub(crate) fn malformed(position: usize, message: impl Into<String>) -> Self {
        ParseError::MalformedToken {
            position,
            message: message.into(),
        }
    }

    pub(crate) fn unexpected(
        position: usize,
        expected: impl Into<String>,
        found: impl Into<String>,
    ) -> Self {
        ParseError::UnexpectedToken {
            position,
            expected: expected.into(),
            found: found.into(),
        }
    }
}

/// Options controlling how tolerant the parser is of malformed files.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseOptions {
    /// Accept common syntax violations (missing `endobj`, comments cut by
    /// EOF, bad stream lengths, junk before the header) with a warning.
    pub lenient_syntax: bool,
    /// Maximum nesting of arrays/dictionaries and of deep resolution.
    pub max_recursion_depth: usize,
    /// Maximum number of reference-to-reference hops followed by `resolve`.
    pub max_reference_chain: usize,
}

impl Default for ParseOptions {
    fn default() -> Self {
        Self::lenient()
    }
}

impl ParseOptions {
    /// Reject anything that violates the file syntax.
    pub fn strict() -> Self {
        Self {
            lenient_syntax: false,
            max_recursion_depth: 500,
            max_reference_chain: 32,
        }
    }

    /// Repair what can be repaired and keep going.
    pub fn lenient() -> Self {
        Self {
            lenient_syntax: true,
            max_recursion_depth: 1000,
            max_reference_chain: 64,
        }
    }

    pub fn with_max_recursion_depth(mut self, depth: usize) -> Self {
        self.max_recursion_depth = depth;
        self
    }

    pub fn with_max_reference_chain(mut self, hops: usize) -> Self {
        self.max_reference_chain = hops;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_error_position() {
        assert_eq!(ParseError::malformed(12, "x").position(), Some(12));
        assert_eq!(
            ParseError::unexpected(7, "name", "integer").position(),
            Some(7)
        );
        assert_eq!(ParseError::InvalidTrailer.position(), None);
    }

    #[test]
    fn test_parse_error_display() {
        let err = ParseError::unexpected(40, "dictionary", "integer");
        assert_eq!(
            err.to_string(),
            "Unexpected token at offset 40: expected dictionary, found integer"
        );
        let err = ParseError::InvalidReference(3, 0);
        assert_eq!(err.to_string(), "Invalid object reference: 3 0 R");
    }

    #[test]
    fn test_options_presets() {
        assert!(ParseOptions::default().lenient_syntax);
        assert!(!ParseOptions::strict().lenient_syntax);
        let opts = ParseOptions::strict().with_max_recursion_depth(8);
        assert_eq!(opts.max_recursion_depth, 8);
    }
}
