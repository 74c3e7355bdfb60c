//! PDF Lexer
//!
//! Tokenizes PDF syntax according to ISO 32000-1 Section 7.2. The lexer is a
//! cursor over an immutable byte buffer, so saving and restoring a position
//! is free and the parser can look ahead as far as it needs.

use super::{ParseError, ParseOptions, ParseResult};

/// PDF Token types
#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    /// Boolean: true or false
    Boolean(bool),

    /// Integer number
    Integer(i64),

    /// Real number
    Real(f64),

    /// Literal string `( ... )`, escapes already processed
    LiteralString(Vec<u8>),

    /// Hexadecimal string `< ... >`, already decoded
    HexString(Vec<u8>),

    /// Name object (e.g., /Type), `#xx` escapes already decoded
    Name(Vec<u8>),

    /// Left square bracket [
    ArrayStart,

    /// Right square bracket ]
    ArrayEnd,

    /// Dictionary start <<
    DictStart,

    /// Dictionary end >>
    DictEnd,

    /// Stream keyword
    Stream,

    /// Endstream keyword
    EndStream,

    /// Obj keyword
    Obj,

    /// Endobj keyword
    EndObj,

    /// The `R` of an indirect reference
    R,

    /// XRef keyword
    XRef,

    /// Trailer keyword
    Trailer,

    /// StartXRef keyword
    StartXRef,

    /// Any other bare word (content operators, `n`/`f` in xref tables, ...)
    Keyword(String),

    /// Null object
    Null,

    /// Comment (usually ignored)
    Comment(Vec<u8>),

    /// End of file
    Eof,
}

impl Token {
    /// Short human-readable description used in error messages.
    pub fn describe(&self) -> String {
        match self {
            Token::Boolean(b) => format!("boolean {b}"),
            Token::Integer(i) => format!("integer {i}"),
            Token::Real(r) => format!("real {r}"),
            Token::LiteralString(_) | Token::HexString(_) => "string".to_string(),
            Token::Name(n) => format!("name /{}", String::from_utf8_lossy(n)),
            Token::ArrayStart => "'['".to_string(),
            Token::ArrayEnd => "']'".to_string(),
            Token::DictStart => "'<<'".to_string(),
            Token::DictEnd => "'>>'".to_string(),
            Token::Stream => "stream".to_string(),
            Token::EndStream => "endstream".to_string(),
            Token::Obj => "obj".to_string(),
            Token::EndObj => "endobj".to_string(),
            Token::R => "R".to_string(),
            Token::XRef => "xref".to_string(),
            Token::Trailer => "trailer".to_string(),
            Token::StartXRef => "startxref".to_string(),
            Token::Keyword(k) => format!("keyword {k}"),
            Token::Null => "null".to_string(),
            Token::Comment(_) => "comment".to_string(),
            Token::Eof => "end of file".to_string(),
        }
    }
}

/// White-space characters (Table 1 of ISO 32000-1).
pub fn is_whitespace(ch: u8) -> bool {
    matches!(ch, b'\0' | b'\t' | b'\n' | b'\x0C' | b'\r' | b' ')
}

/// Delimiter characters (Table 2 of ISO 32000-1).
pub fn is_delimiter(ch: u8) -> bool {
    matches!(
        ch,
        b'(' | b')' | b'<' | b'>' | b'[' | b']' | b'{' | b'}' | b'/' | b'%'
    )
}

/// Regular characters: neither white space nor delimiters.
pub fn is_regular(ch: u8) -> bool {
    !is_whitespace(ch) && !is_delimiter(ch)
}

/// PDF Lexer for tokenizing PDF content
#[derive(Debug, Clone)]
pub struct Lexer<'a> {
    data: &'a [u8],
    position: usize,
    lenient: bool,
}

impl<'a> Lexer<'a> {
    /// Create a new lexer at the start of `data`
    pub fn new(data: &'a [u8]) -> Self {
        Self::new_with_options(data, &ParseOptions::default())
    }

    /// Create a new lexer with explicit parse options
    pub fn new_with_options(data: &'a [u8], options: &ParseOptions) -> Self {
        Self {
            data,
            position: 0,
            lenient: options.lenient_syntax,
        }
    }

    /// Create a lexer positioned at `offset`
    pub fn at(data: &'a [u8], offset: usize, options: &ParseOptions) -> Self {
        let mut lexer = Self::new_with_options(data, options);
        lexer.set_position(offset);
        lexer
    }

    /// The whole buffer this lexer reads from
    pub fn data(&self) -> &'a [u8] {
        self.data
    }

    /// Get current position in the buffer
    pub fn position(&self) -> usize {
        self.position
    }

    /// Move the cursor; positions past the end are clamped to EOF
    pub fn set_position(&mut self, position: usize) {
        self.position = position.min(self.data.len());
    }

    pub fn is_lenient(&self) -> bool {
        self.lenient
    }

    pub fn is_eof(&self) -> bool {
        self.position >= self.data.len()
    }

    /// Get the next token
    pub fn next_token(&mut self) -> ParseResult<Token> {
        self.skip_whitespace();

        let ch = match self.peek_char() {
            Some(ch) => ch,
            None => return Ok(Token::Eof),
        };

        match ch {
            b'%' => self.read_comment(),
            b'/' => self.read_name(),
            b'(' => self.read_literal_string(),
            b'<' => self.read_angle_bracket(),
            b'>' => {
                let start = self.position;
                self.consume_char();
                if self.peek_char() == Some(b'>') {
                    self.consume_char();
                    Ok(Token::DictEnd)
                } else {
                    Err(ParseError::malformed(start, "expected '>' after '>'"))
                }
            }
            b'[' => {
                self.consume_char();
                Ok(Token::ArrayStart)
            }
            b']' => {
                self.consume_char();
                Ok(Token::ArrayEnd)
            }
            b'{' | b'}' => {
                // PostScript calculator braces, only meaningful inside type 4 functions
                self.consume_char();
                Ok(Token::Keyword((ch as char).to_string()))
            }
            b')' => Err(ParseError::malformed(self.position, "unbalanced ')'")),
            b'+' | b'-' | b'0'..=b'9' | b'.' => self.read_number(),
            _ => self.read_keyword(),
        }
    }

    /// Return the next non-comment token without consuming it
    pub fn peek_token(&mut self) -> ParseResult<Token> {
        let saved = self.position;
        let token = self.next_significant_token();
        self.position = saved;
        token
    }

    /// Get the next token, skipping comments
    pub fn next_significant_token(&mut self) -> ParseResult<Token> {
        loop {
            match self.next_token()? {
                Token::Comment(_) => continue,
                token => return Ok(token),
            }
        }
    }

    /// Peek at the next character without consuming it
    pub fn peek_char(&self) -> Option<u8> {
        self.data.get(self.position).copied()
    }

    /// Consume the next character
    pub fn consume_char(&mut self) -> Option<u8> {
        let ch = self.peek_char();
        if ch.is_some() {
            self.position += 1;
        }
        ch
    }

    /// Skip whitespace and return the number of bytes skipped
    pub fn skip_whitespace(&mut self) -> usize {
        let start = self.position;
        while let Some(ch) = self.peek_char() {
            if !is_whitespace(ch) {
                break;
            }
            self.position += 1;
        }
        self.position - start
    }

    /// Skip whitespace and comments
    pub fn skip_whitespace_and_comments(&mut self) {
        loop {
            self.skip_whitespace();
            if self.peek_char() != Some(b'%') {
                return;
            }
            while let Some(ch) = self.peek_char() {
                if ch == b'\n' || ch == b'\r' {
                    break;
                }
                self.position += 1;
            }
        }
    }

    /// Read a comment (from % to end of line)
    fn read_comment(&mut self) -> ParseResult<Token> {
        let start = self.position;
        self.consume_char(); // consume '%'
        let body_start = self.position;

        while let Some(ch) = self.peek_char() {
            if ch == b'\n' || ch == b'\r' {
                return Ok(Token::Comment(self.data[body_start..self.position].to_vec()));
            }
            self.position += 1;
        }

        if self.lenient {
            Ok(Token::Comment(self.data[body_start..self.position].to_vec()))
        } else {
            Err(ParseError::malformed(start, "comment not terminated by end of line"))
        }
    }

    /// Read a name object (e.g., /Type)
    fn read_name(&mut self) -> ParseResult<Token> {
        self.consume_char(); // consume '/'
        let mut name = Vec::new();

        while let Some(ch) = self.peek_char() {
            if !is_regular(ch) {
                break;
            }
            self.position += 1;

            // Handle hex codes in names (e.g., /A#20B means /A B)
            if ch == b'#' {
                let digits = self
                    .data
                    .get(self.position..self.position + 2)
                    .and_then(|pair| std::str::from_utf8(pair).ok())
                    .and_then(|pair| u8::from_str_radix(pair, 16).ok());
                match digits {
                    Some(value) => {
                        self.position += 2;
                        name.push(value);
                    }
                    None if self.lenient => name.push(b'#'),
                    None => {
                        return Err(ParseError::malformed(
                            self.position - 1,
                            "invalid #xx escape in name",
                        ))
                    }
                }
            } else {
                name.push(ch);
            }
        }

        Ok(Token::Name(name))
    }

    /// Read a literal string (parentheses)
    fn read_literal_string(&mut self) -> ParseResult<Token> {
        let start = self.position;
        self.consume_char(); // consume '('
        let mut string = Vec::new();
        let mut depth = 1usize;

        loop {
            let ch = self
                .consume_char()
                .ok_or_else(|| ParseError::malformed(start, "unterminated literal string"))?;

            match ch {
                b'\\' => {
                    let escaped = self.consume_char().ok_or_else(|| {
                        ParseError::malformed(start, "unterminated literal string")
                    })?;
                    match escaped {
                        b'n' => string.push(b'\n'),
                        b'r' => string.push(b'\r'),
                        b't' => string.push(b'\t'),
                        b'b' => string.push(b'\x08'),
                        b'f' => string.push(b'\x0C'),
                        b'0'..=b'7' => {
                            let mut value = u32::from(escaped - b'0');
                            for _ in 0..2 {
                                match self.peek_char() {
                                    Some(next @ b'0'..=b'7') => {
                                        self.position += 1;
                                        value = value * 8 + u32::from(next - b'0');
                                    }
                                    _ => break,
                                }
                            }
                            // High-order overflow is ignored
                            string.push((value & 0xFF) as u8);
                        }
                        // Line continuation
                        b'\r' => {
                            if self.peek_char() == Some(b'\n') {
                                self.position += 1;
                            }
                        }
                        b'\n' => {}
                        // Covers \( \) \\ and unknown escapes, where the backslash is dropped
                        other => string.push(other),
                    }
                }
                b'(' => {
                    depth += 1;
                    string.push(ch);
                }
                b')' => {
                    depth -= 1;
                    if depth == 0 {
                        break;
                    }
                    string.push(ch);
                }
                b'\r' => {
                    if self.peek_char() == Some(b'\n') {
                        self.position += 1;
                    }
                    string.push(b'\n');
                }
                _ => string.push(ch),
            }
        }

        Ok(Token::LiteralString(string))
    }

    /// Read angle bracket tokens (hex strings or dict markers)
    fn read_angle_bracket(&mut self) -> ParseResult<Token> {
        let start = self.position;
        self.consume_char(); // consume '<'

        if self.peek_char() == Some(b'<') {
            self.consume_char();
            return Ok(Token::DictStart);
        }

        let mut bytes = Vec::new();
        let mut high: Option<u8> = None;

        loop {
            let ch = self
                .consume_char()
                .ok_or_else(|| ParseError::malformed(start, "unterminated hex string"))?;
            if ch == b'>' {
                break;
            }
            let nibble = match ch {
                b'0'..=b'9' => ch - b'0',
                b'a'..=b'f' => ch - b'a' + 10,
                b'A'..=b'F' => ch - b'A' + 10,
                _ if is_whitespace(ch) => continue,
                _ if self.lenient => continue,
                _ => {
                    return Err(ParseError::malformed(
                        self.position - 1,
                        "invalid character in hex string",
                    ))
                }
            };
            match high.take() {
                Some(h) => bytes.push((h << 4) | nibble),
                None => high = Some(nibble),
            }
        }

        // Pad with 0 if odd number of digits
        if let Some(h) = high {
            bytes.push(h << 4);
        }

        Ok(Token::HexString(bytes))
    }

    /// Read a number (integer or real)
    fn read_number(&mut self) -> ParseResult<Token> {
        let start = self.position;
        let mut text = String::new();
        let mut has_dot = false;
        let mut has_digit = false;

        if let Some(ch @ (b'+' | b'-')) = self.peek_char() {
            self.consume_char();
            text.push(ch as char);
            // Tolerate doubled signs such as "--5"
            while self.lenient && matches!(self.peek_char(), Some(b'+' | b'-')) {
                self.consume_char();
            }
        }

        while let Some(ch) = self.peek_char() {
            match ch {
                b'0'..=b'9' => {
                    has_digit = true;
                    text.push(ch as char);
                }
                b'.' if !has_dot => {
                    has_dot = true;
                    text.push('.');
                }
                _ => break,
            }
            self.position += 1;
        }

        // Trailing garbage glued to a number ("12abc") is a syntax error
        if let Some(ch) = self.peek_char() {
            if is_regular(ch) && !self.lenient {
                return Err(ParseError::malformed(start, "invalid number"));
            }
        }

        if !has_digit {
            return if self.lenient {
                Ok(Token::Integer(0))
            } else {
                Err(ParseError::malformed(start, "number without digits"))
            };
        }

        if has_dot {
            let value = text
                .parse::<f64>()
                .map_err(|_| ParseError::malformed(start, "invalid real number"))?;
            Ok(Token::Real(value))
        } else {
            match text.parse::<i64>() {
                Ok(value) => Ok(Token::Integer(value)),
                // Out-of-range integers degrade to reals
                Err(_) => text
                    .parse::<f64>()
                    .map(Token::Real)
                    .map_err(|_| ParseError::malformed(start, "invalid integer")),
            }
        }
    }

    /// Read a keyword (bare word)
    fn read_keyword(&mut self) -> ParseResult<Token> {
        let start = self.position;
        let word = self.read_word();
        if word.is_empty() {
            // A byte that is neither regular nor handled above
            self.position += 1;
            return Err(ParseError::malformed(
                start,
                format!("unexpected character 0x{:02x}", self.data[start]),
            ));
        }
        Ok(Self::process_keyword(word))
    }

    fn process_keyword(word: String) -> Token {
        match word.as_str() {
            "true" => Token::Boolean(true),
            "false" => Token::Boolean(false),
            "null" => Token::Null,
            "obj" => Token::Obj,
            "endobj" => Token::EndObj,
            "stream" => Token::Stream,
            "endstream" => Token::EndStream,
            "R" => Token::R,
            "xref" => Token::XRef,
            "trailer" => Token::Trailer,
            "startxref" => Token::StartXRef,
            _ => Token::Keyword(word),
        }
    }

    /// Read a run of regular characters
    fn read_word(&mut self) -> String {
        let start = self.position;
        while let Some(ch) = self.peek_char() {
            if !is_regular(ch) {
                break;
            }
            self.position += 1;
        }
        String::from_utf8_lossy(&self.data[start..self.position]).into_owned()
    }

    /// Consume the end-of-line marker that follows the `stream` keyword.
    ///
    /// The syntax requires CRLF or LF. Lenient mode also accepts a bare CR
    /// and spaces before the EOL, as real-world writers produce both.
    pub fn read_newline(&mut self) -> ParseResult<()> {
        if self.lenient {
            while self.peek_char() == Some(b' ') {
                self.position += 1;
            }
        }
        match self.peek_char() {
            Some(b'\n') => {
                self.position += 1;
                Ok(())
            }
            Some(b'\r') => {
                self.position += 1;
                if self.peek_char() == Some(b'\n') {
                    self.position += 1;
                    Ok(())
                } else if self.lenient {
                    Ok(())
                } else {
                    Err(ParseError::malformed(
                        self.position,
                        "bare CR after stream keyword",
                    ))
                }
            }
            _ if self.lenient => Ok(()),
            _ => Err(ParseError::malformed(
                self.position,
                "expected end of line after stream keyword",
            )),
        }
    }

    /// Read exactly `n` bytes from the current position
    pub fn read_bytes(&mut self, n: usize) -> ParseResult<&'a [u8]> {
        let end = self
            .position
            .checked_add(n)
            .filter(|end| *end <= self.data.len())
            .ok_or_else(|| ParseError::malformed(self.position, "unexpected end of data"))?;
        let bytes = &self.data[self.position..end];
        self.position = end;
        Ok(bytes)
    }

    /// Find the next occurrence of `keyword` at or after the current
    /// position, looking at most `max_distance` bytes ahead.
    pub fn find_keyword_ahead(&self, keyword: &[u8], max_distance: usize) -> Option<usize> {
        let end = self.position.saturating_add(max_distance).min(self.data.len());
        find_bytes(&self.data[self.position..end], keyword).map(|i| self.position + i)
    }

    /// Move past the next `obj` or `endobj` keyword so a caller can
    /// resume after a malformed token. Returns false at EOF.
    pub fn resync_after(&mut self) -> bool {
        let mut cursor = self.position;
        while let Some(i) = find_bytes(&self.data[cursor..], b"obj") {
            let at = cursor + i;
            let after = at + 3;
            let bounded_after = self.data.get(after).map_or(true, |c| !is_regular(*c));
            let bounded_before = at == 0
                || !is_regular(self.data[at - 1])
                || self.data[..at].ends_with(b"end");
            if bounded_after && bounded_before {
                self.position = after;
                return true;
            }
            cursor = after;
        }
        self.position = self.data.len();
        false
    }

    /// Expect a specific keyword token
    pub fn expect_keyword(&mut self, expected: Token) -> ParseResult<()> {
        let position = self.position;
        let token = self.next_significant_token()?;
        if token == expected {
            Ok(())
        } else {
            Err(ParseError::unexpected(
                position,
                expected.describe(),
                token.describe(),
            ))
        }
    }

    /// Save the current position for a later `restore_position`
    pub fn save_position(&self) -> usize {
        self.position
    }

    /// Restore a position obtained from `save_position`
    pub fn restore_position(&mut self, saved: usize) {
        self.position = saved;
    }
}

/// Naive forward search for `needle` in `haystack`
pub fn find_bytes(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    if needle.is_empty() || haystack.len() < needle.len() {
        return None;
    }
    haystack.windows(needle.len()).position(|w| w == needle)
}

/// Backward search for the last occurrence of `needle` in `haystack`
pub fn rfind_bytes(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    if needle.is_empty() || haystack.len() < needle.len() {
        return None;
    }
    haystack.windows(needle.len()).rposition(|w| w == needle)
}
