//! PDF Object Stream Parser
//!
//! Handles compressed objects stored in object streams (PDF 1.5+)

use super::lexer::Token;
use super::objects::{ObjectParser, PdfObject, PdfStream};
use super::{ParseError, ParseOptions, ParseResult};
use tracing::warn;

/// Represents a PDF object stream containing compressed objects
#[derive(Debug, Clone)]
pub struct ObjectStream {
    /// `(object number, object)` in stream order
    objects: Vec<(u32, PdfObject)>,
}

impl ObjectStream {
    /// Parse an object stream, decoding every object eagerly
    pub fn parse(stream: &PdfStream, options: &ParseOptions) -> ParseResult<Self> {
        let dict = &stream.dict;

        let n = dict
            .get("N")
            .and_then(|obj| obj.as_integer())
            .and_then(|n| usize::try_from(n).ok())
            .ok_or_else(|| ParseError::MissingKey("N".to_string()))?;

        let first = dict
            .get("First")
            .and_then(|obj| obj.as_integer())
            .and_then(|f| usize::try_from(f).ok())
            .ok_or_else(|| ParseError::MissingKey("First".to_string()))?;

        let data = stream.decode()?;

        // Read object number/offset pairs
        let mut header = ObjectParser::new(&data, options);
        let mut offsets = Vec::with_capacity(n.min(data.len()));
        for _ in 0..n {
            let position = header.position();
            let pair = (
                header.lexer().next_significant_token()?,
                header.lexer().next_significant_token()?,
            );
            match pair {
                (Token::Integer(num), Token::Integer(offset)) if num >= 0 && offset >= 0 => {
                    match (u32::try_from(num), usize::try_from(offset)) {
                        (Ok(num), Ok(offset)) => offsets.push((num, offset)),
                        _ => warn!(
                            "Skipping object stream entry {} at offset {}: out of range",
                            num, offset
                        ),
                    }
                }
                (a, _) => {
                    return Err(ParseError::unexpected(
                        position,
                        "object number and offset",
                        a.describe(),
                    ))
                }
            }
        }

        let mut objects = Vec::with_capacity(offsets.len());
        for (num, offset) in offsets {
            let mut parser = ObjectParser::at(&data, first.saturating_add(offset), options);
            let object = match parser.parse_object() {
                Ok(object) => object,
                Err(e) if options.lenient_syntax => {
                    warn!("Compressed object {} unreadable ({}); using null", num, e);
                    PdfObject::Null
                }
                Err(e) => return Err(e),
            };
            objects.push((num, object));
        }

        Ok(ObjectStream { objects })
    }

    /// Number of objects in the stream
    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    /// Get an object by its object number
    pub fn get_object(&self, obj_num: u32) -> Option<&PdfObject> {
        self.objects
            .iter()
            .find(|(num, _)| *num == obj_num)
            .map(|(_, obj)| obj)
    }

    /// Object at `index`, but only if it carries `obj_num`; otherwise
    /// fall back to a search by number.
    pub fn get_indexed(&self, obj_num: u32, index: usize) -> Option<&PdfObject> {
        match self.objects.get(index) {
            Some((num, obj)) if *num == obj_num => Some(obj),
            _ => self.get_object(obj_num),
        }
    }

    /// Object numbers held in this stream
    pub fn object_numbers(&self) -> impl Iterator<Item = u32> + '_ {
        self.objects.iter().map(|(num, _)| *num)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::objects::{PdfDictionary, PdfName};

    fn object_stream(header: &str, body: &str) -> PdfStream {
        let mut dict = PdfDictionary::new();
        dict.insert("Type", PdfObject::Name(PdfName::from("ObjStm")));
        dict.insert("N", PdfObject::Integer(header.split_whitespace().count() as i64 / 2));
        dict.insert("First", PdfObject::Integer(header.len() as i64));
        PdfStream::new(dict, format!("{header}{body}").into_bytes())
    }

    #[test]
    fn test_parse_object_stream() {
        let stream = object_stream("10 0 11 10 ", "<< /A 1 >>[1 2 3]");
        let objstm = ObjectStream::parse(&stream, &ParseOptions::default()).unwrap();
        assert_eq!(objstm.len(), 2);
        assert_eq!(
            objstm.get_object(10).unwrap().as_dict().unwrap().get("A"),
            Some(&PdfObject::Integer(1))
        );
        assert_eq!(objstm.get_object(11).unwrap().as_array().unwrap().len(), 3);
        assert_eq!(objstm.object_numbers().collect::<Vec<_>>(), vec![10, 11]);
    }

    #[test]
    fn test_get_indexed_falls_back_to_number() {
        let stream = object_stream("10 0 11 2 ", "1 2");
        let objstm = ObjectStream::parse(&stream, &ParseOptions::default()).unwrap();
        assert_eq!(objstm.get_indexed(11, 1), Some(&PdfObject::Integer(2)));
        assert_eq!(objstm.get_indexed(11, 0), Some(&PdfObject::Integer(2)));
        assert_eq!(objstm.get_indexed(12, 0), None);
    }

    #[test]
    fn test_out_of_range_numbers_are_skipped() {
        let stream = object_stream("4294967297 0 7 2 ", "1 2");
        let objstm = ObjectStream::parse(&stream, &ParseOptions::default()).unwrap();
        assert_eq!(objstm.object_numbers().collect::<Vec<_>>(), vec![7]);
        // 4294967297 must not wrap around to object 1
        assert_eq!(objstm.get_object(1), None);
        assert_eq!(objstm.get_object(7), Some(&PdfObject::Integer(2)));
    }

    #[test]
    fn test_huge_offset_does_not_overflow() {
        let stream = object_stream("3 9223372036854775807 ", "true");
        let result = ObjectStream::parse(&stream, &ParseOptions::default());
        assert_eq!(result.unwrap().get_object(3), Some(&PdfObject::Null));
    }

    #[test]
    fn test_missing_n() {
        let mut stream = object_stream("1 0 ", "true");
        stream.dict.remove("N");
        assert!(matches!(
            ObjectStream::parse(&stream, &ParseOptions::default()),
            Err(ParseError::MissingKey(_))
        ));
    }

    #[test]
    fn test_bad_object_lenient() {
        let stream = object_stream("1 0 ", ")");
        let objstm = ObjectStream::parse(&stream, &ParseOptions::default()).unwrap();
        assert_eq!(objstm.get_object(1), Some(&PdfObject::Null));
        assert!(ObjectStream::parse(&stream, &ParseOptions::strict()).is_err());
    }
}
