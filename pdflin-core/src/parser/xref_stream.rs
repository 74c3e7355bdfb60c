//! Cross-reference streams (PDF 1.5+)
//!
//! Decodes the binary entries of a `/Type /XRef` stream according to
//! ISO 32000-1 Section 7.5.8.

use super::objects::{PdfObject, PdfStream};
use super::xref::{XRefEntry, XRefTable};
use super::{ParseError, ParseOptions, ParseResult};
use tracing::warn;

/// Decoded xref stream
#[derive(Debug, Clone)]
pub struct XRefStream {
    /// Field widths from `/W`
    pub widths: [usize; 3],
    /// `(first, count)` subsections from `/Index`
    pub index: Vec<(u32, u32)>,
    pub table: XRefTable,
}

impl XRefStream {
    /// Parse an xref stream object
    pub fn parse(stream: &PdfStream, options: &ParseOptions) -> ParseResult<Self> {
        let dict = &stream.dict;

        let size = dict
            .get("Size")
            .and_then(|obj| obj.as_integer())
            .ok_or_else(|| ParseError::MissingKey("Size".to_string()))?;

        let index = match dict.get("Index") {
            Some(PdfObject::Array(array)) => {
                if array.len() % 2 != 0 {
                    return Err(ParseError::StreamDecodeError(
                        "Index array must have even number of elements".to_string(),
                    ));
                }
                array
                    .0
                    .chunks(2)
                    .map(|pair| {
                        let first = pair[0].as_integer().and_then(|v| u32::try_from(v).ok());
                        let count = pair[1].as_integer().and_then(|v| u32::try_from(v).ok());
                        first.zip(count).ok_or_else(|| {
                            ParseError::StreamDecodeError(
                                "Index values must be integers".to_string(),
                            )
                        })
                    })
                    .collect::<ParseResult<Vec<_>>>()?
            }
            // Default: single subsection starting at 0
            _ => vec![(0, u32::try_from(size).unwrap_or(0))],
        };

        let w_array = dict
            .get("W")
            .and_then(|obj| obj.as_array())
            .ok_or_else(|| ParseError::MissingKey("W".to_string()))?;
        if w_array.len() != 3 {
            return Err(ParseError::StreamDecodeError(
                "W array must have exactly 3 elements".to_string(),
            ));
        }
        let mut widths = [0usize; 3];
        for (slot, obj) in widths.iter_mut().zip(w_array.iter()) {
            *slot = obj
                .as_integer()
                .and_then(|v| usize::try_from(v).ok())
                .filter(|v| *v <= 8)
                .ok_or_else(|| {
                    ParseError::StreamDecodeError("W values must be integers 0..=8".to_string())
                })?;
        }

        let data = stream.decode()?;
        let table = Self::decode_entries(&data, &index, widths, options)?;

        Ok(Self {
            widths,
            index,
            table,
        })
    }

    fn decode_entries(
        data: &[u8],
        index: &[(u32, u32)],
        w: [usize; 3],
        options: &ParseOptions,
    ) -> ParseResult<XRefTable> {
        let entry_len = w[0] + w[1] + w[2];
        if entry_len == 0 && index.iter().any(|&(_, count)| count > 0) {
            return Err(ParseError::StreamDecodeError(
                "W array describes zero-length entries".to_string(),
            ));
        }
        let mut table = XRefTable::new();
        let mut offset = 0;

        for &(first, count) in index {
            for i in 0..count {
                if offset + entry_len > data.len() {
                    if options.lenient_syntax {
                        warn!("Xref stream data truncated after {} entries", table.len());
                        return Ok(table);
                    }
                    return Err(ParseError::StreamDecodeError(
                        "Xref stream data truncated".to_string(),
                    ));
                }

                // A zero-width type field defaults to type 1
                let kind = if w[0] == 0 {
                    1
                } else {
                    read_field(&data[offset..], w[0])
                };
                let field2 = read_field(&data[offset + w[0]..], w[1]);
                let field3 = read_field(&data[offset + w[0] + w[1]..], w[2]);
                offset += entry_len;

                let Some(num) = first.checked_add(i) else {
                    break;
                };
                let entry = match kind {
                    0 => XRefEntry::Free {
                        next_free: field2 as u32,
                        generation: field3 as u16,
                    },
                    1 => XRefEntry::InUse {
                        offset: field2,
                        generation: field3 as u16,
                    },
                    2 => XRefEntry::Compressed {
                        stream_object: field2 as u32,
                        index: field3 as u32,
                    },
                    other => {
                        // Unknown types are references to the null object
                        warn!("Unknown xref entry type {} for object {}", other, num);
                        continue;
                    }
                };
                table.insert(num, entry);
            }
        }

        Ok(table)
    }
}

/// Read a big-endian field of given width
fn read_field(data: &[u8], width: usize) -> u64 {
    data.iter()
        .take(width)
        .fold(0u64, |value, byte| (value << 8) | u64::from(*byte))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::objects::{PdfArray, PdfDictionary, PdfName};

    fn xref_stream(
        widths: [i64; 3],
        index: Option<Vec<i64>>,
        size: i64,
        data: Vec<u8>,
    ) -> PdfStream {
        let mut dict = PdfDictionary::new();
        dict.insert("Type", PdfObject::Name(PdfName::from("XRef")));
        dict.insert("Size", PdfObject::Integer(size));
        dict.insert(
            "W",
            PdfObject::Array(PdfArray(widths.iter().map(|w| PdfObject::Integer(*w)).collect())),
        );
        if let Some(index) = index {
            dict.insert(
                "Index",
                PdfObject::Array(PdfArray(index.into_iter().map(PdfObject::Integer).collect())),
            );
        }
        PdfStream::new(dict, data)
    }

    #[test]
    fn test_decode_all_entry_types() {
        let data = vec![
            0, 0, 0, 0xFF, // 0: free, gen 255
            1, 0, 0x10, 0, // 1: offset 16
            2, 0, 5, 3, // 2: in stream 5 at index 3
        ];
        let stream = xref_stream([1, 2, 1], None, 3, data);
        let xref = XRefStream::parse(&stream, &ParseOptions::default()).unwrap();
        assert_eq!(
            xref.table.get_entry(0),
            Some(&XRefEntry::Free { next_free: 0, generation: 255 })
        );
        assert_eq!(
            xref.table.get_entry(1),
            Some(&XRefEntry::InUse { offset: 16, generation: 0 })
        );
        assert_eq!(
            xref.table.get_entry(2),
            Some(&XRefEntry::Compressed { stream_object: 5, index: 3 })
        );
    }

    #[test]
    fn test_index_subsections() {
        let data = vec![1, 0, 9, 1, 0, 20];
        let stream = xref_stream([1, 2, 0], Some(vec![4, 1, 10, 1]), 11, data);
        let xref = XRefStream::parse(&stream, &ParseOptions::default()).unwrap();
        assert_eq!(xref.index, vec![(4, 1), (10, 1)]);
        assert_eq!(
            xref.table.get_entry(4),
            Some(&XRefEntry::InUse { offset: 9, generation: 0 })
        );
        assert_eq!(
            xref.table.get_entry(10),
            Some(&XRefEntry::InUse { offset: 20, generation: 0 })
        );
    }

    #[test]
    fn test_zero_width_type_defaults_to_in_use() {
        let stream = xref_stream([0, 1, 0], Some(vec![1, 1]), 2, vec![42]);
        let xref = XRefStream::parse(&stream, &ParseOptions::default()).unwrap();
        assert_eq!(
            xref.table.get_entry(1),
            Some(&XRefEntry::InUse { offset: 42, generation: 0 })
        );
    }

    #[test]
    fn test_truncated_data() {
        let stream = xref_stream([1, 2, 1], None, 3, vec![1, 0, 16, 0, 1]);
        let lenient = XRefStream::parse(&stream, &ParseOptions::default()).unwrap();
        assert_eq!(lenient.table.len(), 1);
        assert!(XRefStream::parse(&stream, &ParseOptions::strict()).is_err());
    }

    #[test]
    fn test_unknown_type_is_skipped() {
        let stream = xref_stream([1, 1, 0], None, 2, vec![7, 0, 1, 3]);
        let xref = XRefStream::parse(&stream, &ParseOptions::default()).unwrap();
        assert!(xref.table.get_entry(0).is_none());
        assert!(xref.table.get_entry(1).is_some());
    }

    #[test]
    fn test_zero_width_entries_rejected() {
        let stream = xref_stream([0, 0, 0], Some(vec![0, 3_000_000]), 3_000_000, vec![]);
        assert!(matches!(
            XRefStream::parse(&stream, &ParseOptions::default()),
            Err(ParseError::StreamDecodeError(_))
        ));

        // Nothing to decode, nothing to reject
        let empty = xref_stream([0, 0, 0], Some(vec![]), 0, vec![]);
        assert!(XRefStream::parse(&empty, &ParseOptions::default())
            .unwrap()
            .table
            .is_empty());
    }

    #[test]
    fn test_oversized_index_stops_at_data_end() {
        let index = Some(vec![0, 4_000_000_000]);
        let stream = xref_stream([1, 2, 1], index, 10, vec![1, 0, 16, 0]);
        let xref = XRefStream::parse(&stream, &ParseOptions::default()).unwrap();
        assert_eq!(xref.table.len(), 1);
    }

    #[test]
    fn test_missing_w() {
        let mut stream = xref_stream([1, 1, 1], None, 1, vec![]);
        stream.dict.remove("W");
        assert!(matches!(
            XRefStream::parse(&stream, &ParseOptions::default()),
            Err(ParseError::MissingKey(_))
        ));
    }

    #[test]
    fn test_read_field() {
        assert_eq!(read_field(&[0x01, 0x02], 2), 0x0102);
        assert_eq!(read_field(&[0x01, 0x02], 0), 0);
    }
}
