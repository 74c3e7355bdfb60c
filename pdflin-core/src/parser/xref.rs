//! PDF Cross-Reference Table Parser
//!
//! Parses xref tables and streams according to ISO 32000-1 Section 7.5.4 and
//! 7.5.8, follows `/Prev` chains and decides when the table has to be rebuilt
//! from a full scan of the file.

use super::lexer::{rfind_bytes, Lexer, Token};
use super::objects::{ObjectParser, PdfDictionary, PdfObject};
use super::trailer::PdfTrailer;
use super::xref_stream::XRefStream;
use super::{ParseError, ParseOptions, ParseResult};
use crate::recovery::XRefRecovery;
use std::collections::{BTreeMap, HashSet};
use tracing::{debug, info, warn};

/// `startxref` must appear within this many bytes of the end of the file.
const STARTXREF_SEARCH_WINDOW: usize = 1024;

/// Keys that describe an xref stream itself rather than the document.
const XREF_STREAM_KEYS: &[&str] = &[
    "Type", "W", "Index", "Length", "Filter", "DecodeParms", "Prev", "XRefStm",
];

/// Cross-reference entry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum XRefEntry {
    /// Object on the free list
    Free { next_free: u32, generation: u16 },
    /// Uncompressed object at a byte offset
    InUse { offset: u64, generation: u16 },
    /// Object stored inside an object stream
    Compressed { stream_object: u32, index: u32 },
}

impl XRefEntry {
    pub fn generation(&self) -> u16 {
        match self {
            XRefEntry::Free { generation, .. } | XRefEntry::InUse { generation, .. } => *generation,
            XRefEntry::Compressed { .. } => 0,
        }
    }

    pub fn is_in_use(&self) -> bool {
        !matches!(self, XRefEntry::Free { .. })
    }
}

/// Merged cross-reference table keyed by object number
#[derive(Debug, Clone, Default, PartialEq)]
pub struct XRefTable {
    entries: BTreeMap<u32, XRefEntry>,
}

impl XRefTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get an entry by object number
    pub fn get_entry(&self, obj_num: u32) -> Option<&XRefEntry> {
        self.entries.get(&obj_num)
    }

    /// Insert or replace an entry
    pub fn insert(&mut self, obj_num: u32, entry: XRefEntry) {
        self.entries.insert(obj_num, entry);
    }

    /// Insert only if the object number has no entry yet.
    /// Returns true when the entry was taken.
    pub fn claim(&mut self, obj_num: u32, entry: XRefEntry) -> bool {
        use std::collections::btree_map::Entry;
        match self.entries.entry(obj_num) {
            Entry::Vacant(slot) => {
                slot.insert(entry);
                true
            }
            Entry::Occupied(_) => false,
        }
    }

    /// Merge an older section under this one: existing entries win.
    pub fn merge_older(&mut self, older: &XRefTable) {
        for (num, entry) in older.iter() {
            self.claim(*num, *entry);
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&u32, &XRefEntry)> {
        self.entries.iter()
    }

    /// Highest object number with an entry
    pub fn max_object_number(&self) -> u32 {
        self.entries.keys().next_back().copied().unwrap_or(0)
    }

    /// Object numbers of every in-use (direct or compressed) entry
    pub fn in_use_numbers(&self) -> impl Iterator<Item = u32> + '_ {
        self.entries
            .iter()
            .filter(|(num, e)| **num != 0 && e.is_in_use())
            .map(|(num, _)| *num)
    }
}

/// Form of a single cross-reference section
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SectionKind {
    Table,
    Stream,
}

/// One cross-reference section together with its trailer dictionary
#[derive(Debug, Clone)]
pub struct XRefSection {
    pub table: XRefTable,
    pub trailer: PdfDictionary,
    pub kind: SectionKind,
}

/// Outcome of reading the cross-reference data the file points to
#[derive(Debug)]
pub enum XRefResolution {
    Resolved { table: XRefTable, trailer: PdfTrailer },
    NeedsRebuild { reason: ParseError },
}

/// Final cross-reference data for a document
#[derive(Debug, Clone)]
pub struct ResolvedXRef {
    pub table: XRefTable,
    pub trailer: PdfTrailer,
    /// True when the table came from a full scan instead of the file's xref
    pub rebuilt: bool,
}

/// Find the offset recorded after the last `startxref` keyword
pub fn find_startxref(data: &[u8]) -> ParseResult<u64> {
    let window_start = data.len().saturating_sub(STARTXREF_SEARCH_WINDOW);
    let keyword = rfind_bytes(&data[window_start..], b"startxref").ok_or_else(|| {
        ParseError::InvalidXRef {
            offset: data.len(),
            message: "startxref not found".to_string(),
        }
    })?;
    let position = window_start + keyword + b"startxref".len();

    let mut lexer = Lexer::new(data);
    lexer.set_position(position);
    match lexer.next_significant_token()? {
        Token::Integer(offset) if offset >= 0 => Ok(offset as u64),
        other => Err(ParseError::unexpected(
            position,
            "xref offset",
            other.describe(),
        )),
    }
}

/// Parse the xref table or xref stream that starts at `offset`
pub fn parse_section_at(
    data: &[u8],
    offset: u64,
    options: &ParseOptions,
) -> ParseResult<XRefSection> {
    let start = usize::try_from(offset)
        .ok()
        .filter(|o| *o < data.len())
        .ok_or_else(|| ParseError::InvalidXRef {
            offset: offset as usize,
            message: format!("offset beyond end of file ({} bytes)", data.len()),
        })?;

    let mut lexer = Lexer::at(data, start, options);
    match lexer.peek_token()? {
        Token::XRef => parse_traditional_xref(data, start, options),
        Token::Integer(_) => parse_xref_stream_at(data, start, options),
        other => Err(ParseError::InvalidXRef {
            offset: start,
            message: format!("expected xref or xref stream, found {}", other.describe()),
        }),
    }
}

/// Classic `xref` table followed by `trailer << ... >>`
fn parse_traditional_xref(
    data: &[u8],
    start: usize,
    options: &ParseOptions,
) -> ParseResult<XRefSection> {
    let mut parser = ObjectParser::at(data, start, options);
    parser.lexer().expect_keyword(Token::XRef)?;
    let mut table = XRefTable::new();

    loop {
        let position = parser.position();
        let first = match parser.lexer().next_significant_token()? {
            Token::Trailer => break,
            Token::Integer(n) if n >= 0 => n as u64,
            other => {
                return Err(ParseError::unexpected(
                    position,
                    "subsection header or trailer",
                    other.describe(),
                ))
            }
        };
        let count = match parser.lexer().next_significant_token()? {
            Token::Integer(n) if n >= 0 => n as u64,
            other => {
                return Err(ParseError::unexpected(
                    parser.position(),
                    "subsection count",
                    other.describe(),
                ))
            }
        };

        for i in 0..count {
            let entry = parse_xref_entry(parser.lexer())?;
            let Ok(num) = u32::try_from(first + i) else {
                return Err(ParseError::InvalidXRef {
                    offset: position,
                    message: "object number out of range".to_string(),
                });
            };
            table.insert(num, entry);
        }
    }

    let trailer_position = parser.position();
    let trailer = match parser.parse_object()? {
        PdfObject::Dictionary(dict) => dict,
        other => {
            return Err(ParseError::unexpected(
                trailer_position,
                "trailer dictionary",
                other.type_name(),
            ))
        }
    };

    Ok(XRefSection {
        table,
        trailer,
        kind: SectionKind::Table,
    })
}

/// One `nnnnnnnnnn ggggg n` entry. Tokens rather than fixed columns, so
/// 19- and 21-byte lines written by sloppy producers still parse.
fn parse_xref_entry(lexer: &mut Lexer<'_>) -> ParseResult<XRefEntry> {
    let position = lexer.position();
    let field1 = match lexer.next_significant_token()? {
        Token::Integer(n) if n >= 0 => n as u64,
        other => {
            return Err(ParseError::unexpected(
                position,
                "xref entry offset",
                other.describe(),
            ))
        }
    };
    let generation = match lexer.next_significant_token()? {
        Token::Integer(n) if (0..=i64::from(u16::MAX)).contains(&n) => n as u16,
        other => {
            return Err(ParseError::unexpected(
                position,
                "xref entry generation",
                other.describe(),
            ))
        }
    };
    match lexer.next_significant_token()? {
        Token::Keyword(k) if k == "n" => Ok(XRefEntry::InUse {
            offset: field1,
            generation,
        }),
        Token::Keyword(k) if k == "f" => Ok(XRefEntry::Free {
            next_free: u32::try_from(field1).unwrap_or(0),
            generation,
        }),
        other => Err(ParseError::unexpected(position, "'n' or 'f'", other.describe())),
    }
}

/// `N G obj << /Type /XRef ... >> stream ... endstream`
fn parse_xref_stream_at(
    data: &[u8],
    start: usize,
    options: &ParseOptions,
) -> ParseResult<XRefSection> {
    let mut parser = ObjectParser::at(data, start, options);
    let (id, object) = parser.parse_indirect_object()?;
    let stream = match object {
        PdfObject::Stream(stream) => stream,
        other => {
            return Err(ParseError::InvalidXRef {
                offset: start,
                message: format!("object {} at xref offset is a {}", id, other.type_name()),
            })
        }
    };
    if !stream.dict.has_name("Type", "XRef") && !options.lenient_syntax {
        return Err(ParseError::InvalidXRef {
            offset: start,
            message: "stream at xref offset is not /Type /XRef".to_string(),
        });
    }

    let decoded = XRefStream::parse(&stream, options)?;
    Ok(XRefSection {
        table: decoded.table,
        trailer: stream.dict,
        kind: SectionKind::Stream,
    })
}

/// Read the primary cross-reference chain starting from `startxref`.
///
/// Any failure is reported as `NeedsRebuild` rather than an error so the
/// caller can decide to fall back to scanning.
pub fn resolve_primary(data: &[u8], options: &ParseOptions) -> XRefResolution {
    match read_chain(data, options) {
        Ok((table, trailer)) => XRefResolution::Resolved { table, trailer },
        Err(reason) => XRefResolution::NeedsRebuild { reason },
    }
}

fn read_chain(data: &[u8], options: &ParseOptions) -> ParseResult<(XRefTable, PdfTrailer)> {
    let startxref = find_startxref(data)?;
    let mut offset = startxref;
    let mut visited = HashSet::new();
    let mut merged = XRefTable::new();
    let mut trailer_dict: Option<PdfDictionary> = None;

    loop {
        if !visited.insert(offset) {
            warn!("Xref Prev chain loops back to offset {}", offset);
            break;
        }

        let section = parse_section_at(data, offset, options)?;
        debug!(
            "Read {:?} xref section at {} with {} entries",
            section.kind,
            offset,
            section.table.len()
        );
        let mut section_table = section.table;

        // Hybrid-reference file: the XRefStm stream supplements this table
        if section.kind == SectionKind::Table {
            if let Some(stm_offset) = section.trailer.get("XRefStm").and_then(|o| o.as_integer()) {
                match parse_section_at(data, stm_offset as u64, options) {
                    Ok(stm) => {
                        for (num, entry) in stm.table.iter() {
                            let fill = match section_table.get_entry(*num) {
                                None | Some(XRefEntry::Free { .. }) => true,
                                Some(_) => false,
                            };
                            if fill {
                                section_table.insert(*num, *entry);
                            }
                        }
                    }
                    Err(e) => warn!("Ignoring unreadable XRefStm at {}: {}", stm_offset, e),
                }
            }
        }

        merged.merge_older(&section_table);

        let prev = section.trailer.get("Prev").and_then(|o| o.as_integer());
        match trailer_dict.as_mut() {
            None => trailer_dict = Some(section.trailer),
            Some(newest) => fill_missing_trailer_keys(newest, &section.trailer),
        }

        match prev {
            Some(p) if p >= 0 => offset = p as u64,
            _ => break,
        }
    }

    let mut dict = trailer_dict.ok_or(ParseError::InvalidTrailer)?;
    for key in XREF_STREAM_KEYS {
        dict.remove(key);
    }
    if !dict.contains_key("Root") {
        return Err(ParseError::MissingKey("Root".to_string()));
    }

    Ok((merged, PdfTrailer::from_dict(dict, startxref)))
}

/// Older trailers contribute keys the newest one lacks
fn fill_missing_trailer_keys(newest: &mut PdfDictionary, older: &PdfDictionary) {
    for (key, value) in older.iter() {
        let Some(name) = key.as_str() else { continue };
        if XREF_STREAM_KEYS.contains(&name) || newest.contains_key(name) {
            continue;
        }
        newest.insert(key.clone(), value.clone());
    }
}

/// Resolve the cross-reference data, rebuilding it by scanning when the
/// primary chain is unusable. Fails only if both paths fail.
pub fn resolve(data: &[u8], options: &ParseOptions) -> ParseResult<ResolvedXRef> {
    match resolve_primary(data, options) {
        XRefResolution::Resolved { table, trailer } => Ok(ResolvedXRef {
            table,
            trailer,
            rebuilt: false,
        }),
        XRefResolution::NeedsRebuild { reason } => {
            warn!("Cross-reference data unusable ({}); rebuilding", reason);
            let recovered = XRefRecovery::new(data, options).rebuild()?;
            info!(
                "Rebuilt cross-reference table with {} entries",
                recovered.table.len()
            );
            Ok(ResolvedXRef {
                table: recovered.table,
                trailer: recovered.trailer,
                rebuilt: true,
            })
        }
    }
}
