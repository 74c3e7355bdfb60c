//! PDF Object Parser
//!
//! Parses PDF objects from tokens according to ISO 32000-1 Section 7.3

use super::lexer::{is_whitespace, Lexer, Token};
use super::{ParseError, ParseOptions, ParseResult};
use std::borrow::Borrow;
use std::collections::HashMap;
use std::fmt;
use tracing::{debug, warn};

/// Identity of an indirect object: object number plus generation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectId {
    number: u32,
    generation: u16,
}

impl ObjectId {
    pub fn new(number: u32, generation: u16) -> Self {
        Self { number, generation }
    }

    pub fn number(&self) -> u32 {
        self.number
    }

    pub fn generation(&self) -> u16 {
        self.generation
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} R", self.number, self.generation)
    }
}

/// PDF Name object. Names are byte sequences; most are ASCII.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PdfName(pub Vec<u8>);

impl PdfName {
    pub fn new(name: impl Into<Vec<u8>>) -> Self {
        PdfName(name.into())
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// The name as text, if it is valid UTF-8
    pub fn as_str(&self) -> Option<&str> {
        std::str::from_utf8(&self.0).ok()
    }
}

impl Borrow<[u8]> for PdfName {
    fn borrow(&self) -> &[u8] {
        &self.0
    }
}

impl From<&str> for PdfName {
    fn from(name: &str) -> Self {
        PdfName(name.as_bytes().to_vec())
    }
}

impl PartialEq<str> for PdfName {
    fn eq(&self, other: &str) -> bool {
        self.0 == other.as_bytes()
    }
}

impl PartialEq<&str> for PdfName {
    fn eq(&self, other: &&str) -> bool {
        self.0 == other.as_bytes()
    }
}

/// PDF String object
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PdfString(pub Vec<u8>);

impl PdfString {
    pub fn new(data: Vec<u8>) -> Self {
        PdfString(data)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

/// PDF Array object
#[derive(Debug, Clone, PartialEq, Default)]
pub struct PdfArray(pub Vec<PdfObject>);

impl PdfArray {
    pub fn new() -> Self {
        PdfArray(Vec::new())
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&PdfObject> {
        self.0.get(index)
    }

    pub fn push(&mut self, obj: PdfObject) {
        self.0.push(obj);
    }

    pub fn iter(&self) -> std::slice::Iter<'_, PdfObject> {
        self.0.iter()
    }
}

/// PDF Dictionary object
#[derive(Debug, Clone, PartialEq, Default)]
pub struct PdfDictionary(pub HashMap<PdfName, PdfObject>);

impl PdfDictionary {
    pub fn new() -> Self {
        PdfDictionary(HashMap::new())
    }

    pub fn get(&self, key: &str) -> Option<&PdfObject> {
        self.0.get(key.as_bytes())
    }

    pub fn get_mut(&mut self, key: &str) -> Option<&mut PdfObject> {
        self.0.get_mut(key.as_bytes())
    }

    pub fn insert(&mut self, key: impl Into<PdfName>, value: PdfObject) {
        self.0.insert(key.into(), value);
    }

    pub fn remove(&mut self, key: &str) -> Option<PdfObject> {
        self.0.remove(key.as_bytes())
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.0.contains_key(key.as_bytes())
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&PdfName, &PdfObject)> {
        self.0.iter()
    }

    /// Entries sorted by key, for deterministic output
    pub fn sorted_entries(&self) -> Vec<(&PdfName, &PdfObject)> {
        let mut entries: Vec<_> = self.0.iter().collect();
        entries.sort_by(|a, b| a.0.cmp(b.0));
        entries
    }

    /// Get the /Type name of this dictionary
    pub fn get_type(&self) -> Option<&str> {
        self.get("Type").and_then(|t| t.as_name()).and_then(|n| n.as_str())
    }

    /// True when `key` holds the name `value`
    pub fn has_name(&self, key: &str, value: &str) -> bool {
        matches!(self.get(key), Some(PdfObject::Name(n)) if n == value)
    }
}

/// PDF Stream object
#[derive(Debug, Clone, PartialEq)]
pub struct PdfStream {
    pub dict: PdfDictionary,
    pub data: Vec<u8>,
}

impl PdfStream {
    pub fn new(dict: PdfDictionary, data: Vec<u8>) -> Self {
        Self { dict, data }
    }

    /// Get the decompressed stream data
    pub fn decode(&self) -> ParseResult<Vec<u8>> {
        super::filters::decode_stream(&self.data, &self.dict)
    }

    /// Get the raw (possibly compressed) stream data
    pub fn raw_data(&self) -> &[u8] {
        &self.data
    }
}

/// PDF Object types
#[derive(Debug, Clone, PartialEq)]
pub enum PdfObject {
    Null,
    Boolean(bool),
    Integer(i64),
    Real(f64),
    String(PdfString),
    Name(PdfName),
    Array(PdfArray),
    Dictionary(PdfDictionary),
    Stream(PdfStream),
    Reference(ObjectId),
}

impl PdfObject {
    pub fn is_null(&self) -> bool {
        matches!(self, PdfObject::Null)
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            PdfObject::Boolean(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_integer(&self) -> Option<i64> {
        match self {
            PdfObject::Integer(i) => Some(*i),
            _ => None,
        }
    }

    /// Numeric value of an integer or real
    pub fn as_real(&self) -> Option<f64> {
        match self {
            PdfObject::Integer(i) => Some(*i as f64),
            PdfObject::Real(r) => Some(*r),
            _ => None,
        }
    }

    pub fn as_string(&self) -> Option<&PdfString> {
        match self {
            PdfObject::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_name(&self) -> Option<&PdfName> {
        match self {
            PdfObject::Name(n) => Some(n),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&PdfArray> {
        match self {
            PdfObject::Array(a) => Some(a),
            _ => None,
        }
    }

    /// Dictionary of a dictionary or a stream
    pub fn as_dict(&self) -> Option<&PdfDictionary> {
        match self {
            PdfObject::Dictionary(d) => Some(d),
            PdfObject::Stream(s) => Some(&s.dict),
            _ => None,
        }
    }

    pub fn as_dict_mut(&mut self) -> Option<&mut PdfDictionary> {
        match self {
            PdfObject::Dictionary(d) => Some(d),
            PdfObject::Stream(s) => Some(&mut s.dict),
            _ => None,
        }
    }

    pub fn as_stream(&self) -> Option<&PdfStream> {
        match self {
            PdfObject::Stream(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_reference(&self) -> Option<ObjectId> {
        match self {
            PdfObject::Reference(id) => Some(*id),
            _ => None,
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            PdfObject::Null => "null",
            PdfObject::Boolean(_) => "boolean",
            PdfObject::Integer(_) => "integer",
            PdfObject::Real(_) => "real",
            PdfObject::String(_) => "string",
            PdfObject::Name(_) => "name",
            PdfObject::Array(_) => "array",
            PdfObject::Dictionary(_) => "dictionary",
            PdfObject::Stream(_) => "stream",
            PdfObject::Reference(_) => "reference",
        }
    }

    /// Append every reference held directly or nested inside this value.
    pub fn collect_references(&self, out: &mut Vec<ObjectId>) {
        match self {
            PdfObject::Reference(id) => out.push(*id),
            PdfObject::Array(a) => a.iter().for_each(|o| o.collect_references(out)),
            PdfObject::Dictionary(d) => d.iter().for_each(|(_, o)| o.collect_references(out)),
            PdfObject::Stream(s) => s.dict.iter().for_each(|(_, o)| o.collect_references(out)),
            _ => {}
        }
    }
}

/// Supplies the value of an indirect `/Length` while a stream is being
/// parsed. Implementations must not re-enter stream parsing.
pub trait LengthResolver {
    fn resolve_length(&self, id: ObjectId) -> Option<i64>;
}

/// Recursive-descent parser over a [`Lexer`].
pub struct ObjectParser<'a> {
    lexer: Lexer<'a>,
    options: ParseOptions,
    depth: usize,
    lengths: Option<&'a dyn LengthResolver>,
}

impl<'a> ObjectParser<'a> {
    /// Parser at the start of `data`
    pub fn new(data: &'a [u8], options: &ParseOptions) -> Self {
        Self::at(data, 0, options)
    }

    /// Parser positioned at `offset`
    pub fn at(data: &'a [u8], offset: usize, options: &ParseOptions) -> Self {
        Self {
            lexer: Lexer::at(data, offset, options),
            options: options.clone(),
            depth: 0,
            lengths: None,
        }
    }

    pub fn with_length_resolver(mut self, resolver: &'a dyn LengthResolver) -> Self {
        self.lengths = Some(resolver);
        self
    }

    pub fn lexer(&mut self) -> &mut Lexer<'a> {
        &mut self.lexer
    }

    pub fn position(&self) -> usize {
        self.lexer.position()
    }

    /// Parse a direct PDF object at the cursor
    pub fn parse_object(&mut self) -> ParseResult<PdfObject> {
        let token = self.lexer.next_significant_token()?;
        self.parse_from_token(token)
    }

    /// Parse `N G obj <object> endobj`
    pub fn parse_indirect_object(&mut self) -> ParseResult<(ObjectId, PdfObject)> {
        let start = self.lexer.position();
        let number = match self.lexer.next_significant_token()? {
            Token::Integer(n) if (0..=i64::from(u32::MAX)).contains(&n) => n as u32,
            other => return Err(ParseError::unexpected(start, "object number", other.describe())),
        };
        let generation = match self.lexer.next_significant_token()? {
            Token::Integer(g) if (0..=i64::from(u16::MAX)).contains(&g) => g as u16,
            other => {
                return Err(ParseError::unexpected(
                    self.lexer.position(),
                    "generation number",
                    other.describe(),
                ))
            }
        };
        self.lexer.expect_keyword(Token::Obj)?;
        let id = ObjectId::new(number, generation);

        let object = self.parse_object()?;

        let saved = self.lexer.save_position();
        match self.lexer.next_significant_token() {
            Ok(Token::EndObj) => {}
            Ok(found) if !self.options.lenient_syntax => {
                return Err(ParseError::unexpected(saved, "endobj", found.describe()));
            }
            Err(e) if !self.options.lenient_syntax => return Err(e),
            _ => {
                debug!("Object {} has no endobj at offset {}", id, saved);
                self.lexer.restore_position(saved);
            }
        }

        Ok((id, object))
    }

    /// Parse a PDF object starting from a specific token
    fn parse_from_token(&mut self, token: Token) -> ParseResult<PdfObject> {
        let position = self.lexer.position();
        match token {
            Token::Null => Ok(PdfObject::Null),
            Token::Boolean(b) => Ok(PdfObject::Boolean(b)),
            Token::Integer(i) => self.parse_integer_or_reference(i),
            Token::Real(r) => Ok(PdfObject::Real(r)),
            Token::LiteralString(s) | Token::HexString(s) => Ok(PdfObject::String(PdfString(s))),
            Token::Name(n) => Ok(PdfObject::Name(PdfName(n))),
            Token::ArrayStart => self.nested(Self::parse_array),
            Token::DictStart => self.nested(Self::parse_dictionary_or_stream),
            Token::Eof => Err(ParseError::malformed(position, "unexpected end of file")),
            other => Err(ParseError::unexpected(position, "PDF object", other.describe())),
        }
    }

    fn nested(
        &mut self,
        parse: fn(&mut Self) -> ParseResult<PdfObject>,
    ) -> ParseResult<PdfObject> {
        if self.depth >= self.options.max_recursion_depth {
            return Err(ParseError::malformed(
                self.lexer.position(),
                format!("nesting deeper than {}", self.options.max_recursion_depth),
            ));
        }
        self.depth += 1;
        let result = parse(self);
        self.depth -= 1;
        result
    }

    /// `N` alone, or `N G R`
    fn parse_integer_or_reference(&mut self, number: i64) -> ParseResult<PdfObject> {
        let saved = self.lexer.save_position();
        if let Ok(Token::Integer(generation)) = self.lexer.next_significant_token() {
            if let Ok(Token::R) = self.lexer.next_significant_token() {
                if let (Ok(number), Ok(generation)) =
                    (u32::try_from(number), u16::try_from(generation))
                {
                    return Ok(PdfObject::Reference(ObjectId::new(number, generation)));
                }
            }
        }
        self.lexer.restore_position(saved);
        Ok(PdfObject::Integer(number))
    }

    /// Parse a PDF array
    fn parse_array(&mut self) -> ParseResult<PdfObject> {
        let mut elements = Vec::new();

        loop {
            let token = self.lexer.next_significant_token()?;
            match token {
                Token::ArrayEnd => break,
                Token::Eof => {
                    return Err(ParseError::malformed(
                        self.lexer.position(),
                        "unterminated array",
                    ))
                }
                _ => elements.push(self.parse_from_token(token)?),
            }
        }

        Ok(PdfObject::Array(PdfArray(elements)))
    }

    /// Parse a PDF dictionary and check if it's followed by a stream
    fn parse_dictionary_or_stream(&mut self) -> ParseResult<PdfObject> {
        let dict = self.parse_dictionary_inner()?;

        let saved = self.lexer.save_position();
        match self.lexer.next_significant_token() {
            Ok(Token::Stream) => {
                let data = self.parse_stream_data(&dict)?;
                Ok(PdfObject::Stream(PdfStream { dict, data }))
            }
            _ => {
                self.lexer.restore_position(saved);
                Ok(PdfObject::Dictionary(dict))
            }
        }
    }

    /// Parse dictionary entries up to and including `>>`
    fn parse_dictionary_inner(&mut self) -> ParseResult<PdfDictionary> {
        let mut dict = PdfDictionary::new();

        loop {
            let position = self.lexer.position();
            let key = match self.lexer.next_significant_token()? {
                Token::DictEnd => break,
                Token::Name(n) => PdfName(n),
                other if self.options.lenient_syntax && other != Token::Eof => {
                    warn!("Skipping non-name dictionary key at offset {}", position);
                    continue;
                }
                other => {
                    return Err(ParseError::unexpected(position, "name", other.describe()));
                }
            };

            let value_position = self.lexer.position();
            let token = self.lexer.next_significant_token()?;
            if token == Token::DictEnd {
                if self.options.lenient_syntax {
                    dict.insert(key, PdfObject::Null);
                    break;
                }
                return Err(ParseError::unexpected(value_position, "value", token.describe()));
            }
            let value = self.parse_from_token(token)?;
            dict.insert(key, value);
        }

        Ok(dict)
    }

    /// Read stream bytes following the `stream` keyword.
    ///
    /// The declared `/Length` is trusted only if `endstream` follows it;
    /// otherwise the data runs up to the first `endstream` keyword.
    fn parse_stream_data(&mut self, dict: &PdfDictionary) -> ParseResult<Vec<u8>> {
        self.lexer.read_newline()?;
        let start = self.lexer.position();
        let data = self.lexer.data();

        let declared = match dict.get("Length") {
            Some(PdfObject::Integer(len)) => Some(*len),
            Some(PdfObject::Reference(id)) => self.lengths.and_then(|r| r.resolve_length(*id)),
            _ => None,
        }
        .and_then(|len| usize::try_from(len).ok());

        let declared_fits = declared.filter(|len| {
            start
                .checked_add(*len)
                .map_or(false, |end| end <= data.len() && endstream_follows(data, end))
        });

        let length = match declared_fits {
            Some(len) => len,
            None => match scan_for_endstream(data, start) {
                Some(len) => {
                    if let Some(declared) = declared {
                        warn!(
                            "Stream at offset {} declares /Length {} but endstream is at {}; using {}",
                            start, declared, start + len, len
                        );
                    } else {
                        debug!("Stream at offset {} has no usable /Length; scanned {}", start, len);
                    }
                    len
                }
                None => match declared {
                    Some(len) if self.options.lenient_syntax && start + len <= data.len() => len,
                    _ => return Err(ParseError::malformed(start, "unterminated stream")),
                },
            },
        };

        self.lexer.set_position(start + length);
        let bytes = data[start..start + length].to_vec();

        let saved = self.lexer.save_position();
        match self.lexer.next_significant_token() {
            Ok(Token::EndStream) => {}
            _ if self.options.lenient_syntax => self.lexer.restore_position(saved),
            Ok(found) => return Err(ParseError::unexpected(saved, "endstream", found.describe())),
            Err(e) => return Err(e),
        }

        Ok(bytes)
    }
}

/// True if only white space separates `pos` from an `endstream` keyword.
fn endstream_follows(data: &[u8], mut pos: usize) -> bool {
    while pos < data.len() && is_whitespace(data[pos]) {
        pos += 1;
    }
    data[pos..].starts_with(b"endstream")
}

/// Length of stream data starting at `start`, found by locating the next
/// `endstream` and dropping the single EOL that precedes it.
fn scan_for_endstream(data: &[u8], start: usize) -> Option<usize> {
    let found = super::lexer::find_bytes(&data[start..], b"endstream")?;
    let mut end = start + found;
    if end > start && data[end - 1] == b'\n' {
        end -= 1;
        if end > start && data[end - 1] == b'\r' {
            end -= 1;
        }
    } else if end > start && data[end - 1] == b'\r' {
        end -= 1;
    }
    Some(end - start)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn parse(input: &[u8]) -> ParseResult<PdfObject> {
        ObjectParser::new(input, &ParseOptions::default()).parse_object()
    }

    fn parse_strict(input: &[u8]) -> ParseResult<PdfObject> {
        ObjectParser::new(input, &ParseOptions::strict()).parse_object()
    }

    #[test]
    fn test_parse_simple_objects() {
        assert_eq!(parse(b"null").unwrap(), PdfObject::Null);
        assert_eq!(parse(b"true").unwrap(), PdfObject::Boolean(true));
        assert_eq!(parse(b"123").unwrap(), PdfObject::Integer(123));
        assert_eq!(parse(b"-1.5").unwrap(), PdfObject::Real(-1.5));
        assert_eq!(
            parse(b"(Hi)").unwrap(),
            PdfObject::String(PdfString(b"Hi".to_vec()))
        );
        assert_eq!(parse(b"/Page").unwrap(), PdfObject::Name(PdfName::from("Page")));
    }

    #[test]
    fn test_parse_reference() {
        assert_eq!(
            parse(b"12 0 R").unwrap(),
            PdfObject::Reference(ObjectId::new(12, 0))
        );
    }

    #[test]
    fn test_integers_not_reference() {
        let mut parser = ObjectParser::new(b"1 2 3", &ParseOptions::default());
        assert_eq!(parser.parse_object().unwrap(), PdfObject::Integer(1));
        assert_eq!(parser.parse_object().unwrap(), PdfObject::Integer(2));
        assert_eq!(parser.parse_object().unwrap(), PdfObject::Integer(3));
    }

    #[test]
    fn test_parse_array() {
        let obj = parse(b"[1 2 0 R /X [true] (s)]").unwrap();
        let array = obj.as_array().unwrap();
        assert_eq!(array.len(), 4);
        assert_eq!(array.get(1), Some(&PdfObject::Reference(ObjectId::new(2, 0))));
        assert_eq!(array.get(3).unwrap().as_string().unwrap().as_bytes(), b"s");
    }

    #[test]
    fn test_parse_dictionary() {
        let obj = parse(b"<< /Type /Catalog /Pages 2 0 R /Count 3 >>").unwrap();
        let dict = obj.as_dict().unwrap();
        assert_eq!(dict.get_type(), Some("Catalog"));
        assert!(dict.has_name("Type", "Catalog"));
        assert_eq!(dict.get("Pages").unwrap().as_reference(), Some(ObjectId::new(2, 0)));
        assert_eq!(dict.get("Count").unwrap().as_integer(), Some(3));
    }

    #[test]
    fn test_dictionary_missing_value() {
        let obj = parse(b"<< /A 1 /B >>").unwrap();
        assert_eq!(obj.as_dict().unwrap().get("B"), Some(&PdfObject::Null));
        assert!(matches!(
            parse_strict(b"<< /A 1 /B >>"),
            Err(ParseError::UnexpectedToken { .. })
        ));
    }

    #[test]
    fn test_dictionary_bad_key_strict() {
        assert!(matches!(
            parse_strict(b"<< 1 2 >>"),
            Err(ParseError::UnexpectedToken { position: 2, .. })
        ));
    }

    #[test]
    fn test_unexpected_token() {
        assert!(matches!(
            parse(b"endobj"),
            Err(ParseError::UnexpectedToken { .. })
        ));
        assert!(matches!(parse(b"]"), Err(ParseError::UnexpectedToken { .. })));
    }

    #[test]
    fn test_unterminated_array() {
        assert!(matches!(
            parse(b"[1 2"),
            Err(ParseError::MalformedToken { .. })
        ));
    }

    #[test]
    fn test_depth_limit() {
        let options = ParseOptions::default().with_max_recursion_depth(10);
        let deep = "[".repeat(50);
        let mut parser = ObjectParser::new(deep.as_bytes(), &options);
        assert!(matches!(
            parser.parse_object(),
            Err(ParseError::MalformedToken { .. })
        ));
    }

    #[test]
    fn test_parse_indirect_object() {
        let options = ParseOptions::default();
        let mut parser = ObjectParser::new(b"7 0 obj\n<< /A 1 >>\nendobj\n", &options);
        let (id, obj) = parser.parse_indirect_object().unwrap();
        assert_eq!(id, ObjectId::new(7, 0));
        assert!(obj.as_dict().is_some());
    }

    #[test]
    fn test_missing_endobj() {
        let input = b"7 0 obj\n42\n8 0 obj";
        let (_, obj) = ObjectParser::new(input, &ParseOptions::default())
            .parse_indirect_object()
            .unwrap();
        assert_eq!(obj, PdfObject::Integer(42));
        assert!(ObjectParser::new(input, &ParseOptions::strict())
            .parse_indirect_object()
            .is_err());
    }

    #[test]
    fn test_stream_with_correct_length() {
        let input = b"<< /Length 5 >>\nstream\nhello\nendstream";
        let obj = parse(input).unwrap();
        assert_eq!(obj.as_stream().unwrap().data, b"hello");
    }

    #[test]
    fn test_stream_with_wrong_length_uses_scan() {
        let input = b"<< /Length 2 >>\nstream\nhello world\r\nendstream";
        let obj = parse(input).unwrap();
        assert_eq!(obj.as_stream().unwrap().data, b"hello world");

        let input = b"<< /Length 500 >>\nstream\nabc\nendstream";
        assert_eq!(parse(input).unwrap().as_stream().unwrap().data, b"abc");
    }

    #[test]
    fn test_stream_without_length() {
        let input = b"<< >>\nstream\r\nabc\nendstream";
        assert_eq!(parse(input).unwrap().as_stream().unwrap().data, b"abc");
    }

    #[test]
    fn test_stream_containing_endstream_text_with_good_length() {
        // Declared length wins when it is consistent
        let body = b"xxendstreamyy";
        let mut input = format!("<< /Length {} >>\nstream\n", body.len()).into_bytes();
        input.extend_from_slice(body);
        input.extend_from_slice(b"\nendstream");
        assert_eq!(parse(&input).unwrap().as_stream().unwrap().data, body);
    }

    struct FixedLength(i64);

    impl LengthResolver for FixedLength {
        fn resolve_length(&self, id: ObjectId) -> Option<i64> {
            (id == ObjectId::new(9, 0)).then_some(self.0)
        }
    }

    #[test]
    fn test_stream_with_indirect_length() {
        let resolver = FixedLength(4);
        let input = b"<< /Length 9 0 R >>\nstream\nabcd\nendstream";
        let mut parser =
            ObjectParser::new(input, &ParseOptions::default()).with_length_resolver(&resolver);
        assert_eq!(parser.parse_object().unwrap().as_stream().unwrap().data, b"abcd");
    }

    #[test]
    fn test_unterminated_stream() {
        assert!(matches!(
            parse(b"<< >>\nstream\nabc"),
            Err(ParseError::MalformedToken { .. })
        ));
    }

    #[test]
    fn test_collect_references() {
        let obj = parse(b"<< /A 1 0 R /B [2 0 R << /C 3 0 R >>] >>").unwrap();
        let mut refs = Vec::new();
        obj.collect_references(&mut refs);
        refs.sort();
        assert_eq!(
            refs,
            vec![ObjectId::new(1, 0), ObjectId::new(2, 0), ObjectId::new(3, 0)]
        );
    }

    #[test]
    fn test_object_id_display() {
        assert_eq!(ObjectId::new(4, 2).to_string(), "4 2 R");
    }
}
