//! PDF Header Parser
//!
//! Parses PDF header and version according to ISO 32000-1 Section 7.5.2

use super::lexer::find_bytes;
use super::{ParseError, ParseOptions, ParseResult};
use tracing::warn;

/// How far into the file a lenient reader looks for `%PDF-`.
const HEADER_SEARCH_LIMIT: usize = 1024;

/// PDF Version information
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct PdfVersion {
    pub major: u8,
    pub minor: u8,
}

impl PdfVersion {
    /// Create a new PDF version
    pub fn new(major: u8, minor: u8) -> Self {
        Self { major, minor }
    }

    /// Check if this version is supported
    pub fn is_supported(&self) -> bool {
        matches!((self.major, self.minor), (1, 0..=7) | (2, 0))
    }
}

impl std::fmt::Display for PdfVersion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}", self.major, self.minor)
    }
}

/// PDF Header information
#[derive(Debug, Clone, PartialEq)]
pub struct PdfHeader {
    pub version: PdfVersion,
    /// Offset of `%PDF-`; non-zero when junk precedes the header
    pub offset: usize,
    pub has_binary_marker: bool,
}

impl PdfHeader {
    /// Parse the PDF header at (or, leniently, near) the start of `data`
    pub fn parse(data: &[u8], options: &ParseOptions) -> ParseResult<Self> {
        if data.is_empty() {
            return Err(ParseError::EmptyFile);
        }

        let offset = if data.starts_with(b"%PDF-") {
            0
        } else if options.lenient_syntax {
            let window = &data[..data.len().min(HEADER_SEARCH_LIMIT)];
            let found = find_bytes(window, b"%PDF-").ok_or(ParseError::InvalidHeader)?;
            warn!("PDF header found at offset {} instead of 0", found);
            found
        } else {
            return Err(ParseError::InvalidHeader);
        };

        let line_start = offset + 5;
        let line_end = data[line_start..]
            .iter()
            .position(|b| matches!(b, b'\r' | b'\n'))
            .map_or(data.len(), |i| line_start + i);
        let version_text = String::from_utf8_lossy(&data[line_start..line_end]);
        let version = Self::parse_version(version_text.trim()).ok_or(ParseError::InvalidHeader)?;

        if !version.is_supported() {
            if options.lenient_syntax {
                warn!("Unsupported PDF version {}, continuing", version);
            } else {
                return Err(ParseError::InvalidHeader);
            }
        }

        Ok(PdfHeader {
            version,
            offset,
            has_binary_marker: Self::check_binary_marker(&data[line_end..]),
        })
    }

    /// Accepts "1.7" and tolerates trailing junk such as "1.4 %comment"
    fn parse_version(text: &str) -> Option<PdfVersion> {
        let text: String = text
            .chars()
            .take_while(|c| c.is_ascii_digit() || *c == '.')
            .collect();
        let (major, minor) = text.split_once('.')?;
        Some(PdfVersion::new(major.parse().ok()?, minor.parse().ok()?))
    }

    /// Second line is a comment with at least four bytes >= 128
    fn check_binary_marker(rest: &[u8]) -> bool {
        let rest = match rest.iter().position(|b| !matches!(b, b'\r' | b'\n')) {
            Some(i) => &rest[i..],
            None => return false,
        };
        if rest.first() != Some(&b'%') {
            return false;
        }
        rest[1..]
            .iter()
            .take_while(|b| !matches!(b, b'\r' | b'\n'))
            .filter(|b| **b >= 128)
            .count()
            >= 4
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_header() {
        let data = b"%PDF-1.7\n%\xE2\xE3\xCF\xD3\n";
        let header = PdfHeader::parse(data, &ParseOptions::default()).unwrap();
        assert_eq!(header.version, PdfVersion::new(1, 7));
        assert_eq!(header.offset, 0);
        assert!(header.has_binary_marker);
    }

    #[test]
    fn test_header_without_marker() {
        let header = PdfHeader::parse(b"%PDF-1.4\r\n1 0 obj", &ParseOptions::default()).unwrap();
        assert_eq!(header.version, PdfVersion::new(1, 4));
        assert!(!header.has_binary_marker);
    }

    #[test]
    fn test_junk_before_header() {
        let data = b"garbage\n%PDF-1.5\n";
        let header = PdfHeader::parse(data, &ParseOptions::default()).unwrap();
        assert_eq!(header.offset, 8);
        assert!(matches!(
            PdfHeader::parse(data, &ParseOptions::strict()),
            Err(ParseError::InvalidHeader)
        ));
    }

    #[test]
    fn test_invalid_headers() {
        let opts = ParseOptions::default();
        assert!(matches!(PdfHeader::parse(b"", &opts), Err(ParseError::EmptyFile)));
        assert!(matches!(
            PdfHeader::parse(b"hello world", &opts),
            Err(ParseError::InvalidHeader)
        ));
        assert!(matches!(
            PdfHeader::parse(b"%PDF-x.y\n", &opts),
            Err(ParseError::InvalidHeader)
        ));
    }

    #[test]
    fn test_unsupported_version() {
        assert!(PdfHeader::parse(b"%PDF-3.0\n", &ParseOptions::default()).is_ok());
        assert!(PdfHeader::parse(b"%PDF-3.0\n", &ParseOptions::strict()).is_err());
    }

    #[test]
    fn test_version_ordering() {
        assert!(PdfVersion::new(1, 4) < PdfVersion::new(1, 5));
        assert!(PdfVersion::new(2, 0) > PdfVersion::new(1, 7));
        assert_eq!(PdfVersion::new(1, 6).to_string(), "1.6");
    }
}
