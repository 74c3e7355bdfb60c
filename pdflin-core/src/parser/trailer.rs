//! PDF Trailer Parser
//!
//! Parses PDF trailer according to ISO 32000-1 Section 7.5.5

use super::objects::{ObjectId, PdfDictionary, PdfObject, PdfString};
use super::{ParseError, ParseResult};

/// PDF Trailer information
#[derive(Debug, Clone, PartialEq)]
pub struct PdfTrailer {
    /// The merged trailer dictionary (newest revision wins)
    pub dict: PdfDictionary,
    /// Byte offset `startxref` pointed to; 0 for rebuilt tables
    pub xref_offset: u64,
}

impl PdfTrailer {
    /// Wrap a trailer dictionary
    pub fn from_dict(dict: PdfDictionary, xref_offset: u64) -> Self {
        PdfTrailer { dict, xref_offset }
    }

    /// Get the size (number of entries in xref table)
    pub fn size(&self) -> ParseResult<u32> {
        self.dict
            .get("Size")
            .and_then(|obj| obj.as_integer())
            .and_then(|i| u32::try_from(i).ok())
            .ok_or_else(|| ParseError::MissingKey("Size".to_string()))
    }

    /// Get the root object reference (document catalog)
    pub fn root(&self) -> ParseResult<ObjectId> {
        self.dict
            .get("Root")
            .and_then(|obj| obj.as_reference())
            .ok_or_else(|| ParseError::MissingKey("Root".to_string()))
    }

    /// Get the info object reference (document information dictionary)
    pub fn info(&self) -> Option<ObjectId> {
        self.dict.get("Info").and_then(|obj| obj.as_reference())
    }

    /// Get the ID array (file identifiers)
    pub fn id(&self) -> Option<&PdfObject> {
        self.dict.get("ID")
    }

    /// First element of `/ID`, when it is a string
    pub fn first_id(&self) -> Option<&PdfString> {
        self.id()
            .and_then(|id| id.as_array())
            .and_then(|array| array.get(0))
            .and_then(|first| first.as_string())
    }

    /// Check if this PDF is encrypted
    pub fn is_encrypted(&self) -> bool {
        self.dict.contains_key("Encrypt")
    }

    /// Validate the trailer dictionary
    pub fn validate(&self) -> ParseResult<()> {
        self.root()?;
        if self.is_encrypted() {
            return Err(ParseError::EncryptionNotSupported);
        }
        Ok(())
    }

    /// Get access to the trailer dictionary
    pub fn dict(&self) -> &PdfDictionary {
        &self.dict
    }
}
