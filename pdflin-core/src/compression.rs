//! Compression utilities for PDF streams

use crate::error::{PdfError, Result};

/// Compress data using Flate/Zlib compression
pub fn compress(data: &[u8]) -> Result<Vec<u8>> {
    use flate2::write::ZlibEncoder;
    use flate2::Compression;
    use std::io::Write;

    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(data).map_err(PdfError::Io)?;
    encoder.finish().map_err(PdfError::Io)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::filters::decode_stream;
    use crate::parser::objects::{PdfDictionary, PdfName, PdfObject};

    fn flate_dict() -> PdfDictionary {
        let mut dict = PdfDictionary::new();
        dict.insert("Filter", PdfObject::Name(PdfName::from("FlateDecode")));
        dict
    }

    #[test]
    fn test_compress_readable_by_flate_filter() {
        let original = b"Hello, this is a test string that should be compressed and decompressed!";

        let compressed = compress(original).unwrap();
        assert!(!compressed.is_empty());

        let decompressed = decode_stream(&compressed, &flate_dict()).unwrap();
        assert_eq!(decompressed, original);
    }

    #[test]
    fn test_compress_empty() {
        let compressed = compress(b"").unwrap();
        assert!(!compressed.is_empty()); // Even empty data has headers
        assert_eq!(decode_stream(&compressed, &flate_dict()).unwrap(), b"");
    }

    #[test]
    fn test_compress_large_data() {
        let large_data: Vec<u8> = (0..10000).map(|i| (i % 256) as u8).collect();
        let compressed = compress(&large_data).unwrap();
        assert_eq!(decode_stream(&compressed, &flate_dict()).unwrap(), large_data);
    }
}
