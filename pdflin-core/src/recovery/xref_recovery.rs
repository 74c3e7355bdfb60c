//! XRef recovery for corrupted PDF files
//!
//! Rebuilds the cross-reference table from a literal scan of the buffer and
//! recovers a usable trailer.

use crate::parser::lexer::{find_bytes, is_regular, is_whitespace, rfind_bytes};
use crate::parser::object_stream::ObjectStream;
use crate::parser::objects::{ObjectId, ObjectParser, PdfDictionary, PdfObject};
use crate::parser::trailer::PdfTrailer;
use crate::parser::xref::{XRefEntry, XRefTable};
use crate::parser::{ParseError, ParseOptions, ParseResult};
use tracing::{debug, warn};

/// Keys that belong to an xref stream or to the chain, not to the document
const STALE_TRAILER_KEYS: &[&str] = &[
    "Type", "W", "Index", "Length", "Filter", "DecodeParms", "Prev", "XRefStm",
];

/// Recovery statistics
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RecoveryStats {
    /// Number of `N G obj` headers found
    pub objects_found: usize,
    /// Number of XRef entries reconstructed
    pub entries_reconstructed: usize,
    /// Entries pointing into object streams
    pub compressed_entries: usize,
    /// Whether a `trailer` dictionary or xref stream dictionary was found
    pub trailer_found: bool,
    /// Whether `/Root` had to be located by searching for the catalog
    pub root_synthesized: bool,
}

/// Result of a full rebuild
#[derive(Debug, Clone)]
pub struct RecoveredXRef {
    pub table: XRefTable,
    pub trailer: PdfTrailer,
    pub stats: RecoveryStats,
}

/// XRef recovery engine
pub struct XRefRecovery<'a> {
    data: &'a [u8],
    options: ParseOptions,
}

impl<'a> XRefRecovery<'a> {
    /// Create a new XRef recovery instance
    pub fn new(data: &'a [u8], options: &ParseOptions) -> Self {
        Self {
            data,
            options: options.clone(),
        }
    }

    /// Every `N G obj` header in file order: (number, generation, offset)
    pub fn find_object_headers(&self) -> Vec<(u32, u16, usize)> {
        let mut found = Vec::new();
        let mut pos = 0;

        while let Some(i) = find_bytes(&self.data[pos..], b"obj") {
            let at = pos + i;
            pos = at + 3;

            // "obj" must be a whole keyword
            if self.data.get(at + 3).is_some_and(|c| is_regular(*c)) {
                continue;
            }
            if let Some((num, gen, start)) = parse_object_header(self.data, at) {
                found.push((num, gen, start));
            }
        }

        found
    }

    /// Direct objects only; later occurrences of a number win
    pub fn scan_table(&self) -> XRefTable {
        let mut table = XRefTable::new();
        for (num, generation, offset) in self.find_object_headers() {
            table.insert(
                num,
                XRefEntry::InUse {
                    offset: offset as u64,
                    generation,
                },
            );
        }
        table
    }

    /// Rebuild the table and trailer from scratch
    pub fn rebuild(&self) -> ParseResult<RecoveredXRef> {
        let headers = self.find_object_headers();
        if headers.is_empty() {
            return Err(ParseError::InvalidXRef {
                offset: 0,
                message: "no objects found while scanning file".to_string(),
            });
        }

        let mut stats = RecoveryStats {
            objects_found: headers.len(),
            ..RecoveryStats::default()
        };

        let mut table = XRefTable::new();
        for (num, generation, offset) in &headers {
            table.insert(
                *num,
                XRefEntry::InUse {
                    offset: *offset as u64,
                    generation: *generation,
                },
            );
        }

        // Classify the surviving direct objects
        let mut last_xref_stream: Option<(usize, PdfDictionary)> = None;
        let mut last_catalog: Option<(usize, ObjectId)> = None;
        let mut compressed = Vec::new();

        for (num, entry) in table.iter() {
            let XRefEntry::InUse { offset, generation } = *entry else {
                continue;
            };
            let offset = offset as usize;
            let mut parser = ObjectParser::at(self.data, offset, &self.options);
            let object = match parser.parse_indirect_object() {
                Ok((_, object)) => object,
                Err(e) => {
                    debug!("Scanned object {} at {} unreadable: {}", num, offset, e);
                    continue;
                }
            };

            let Some(dict) = object.as_dict() else {
                continue;
            };
            if dict.has_name("Type", "Catalog") {
                if last_catalog.map_or(true, |(o, _)| o <= offset) {
                    last_catalog = Some((offset, ObjectId::new(*num, generation)));
                }
            } else if dict.has_name("Type", "XRef") {
                if last_xref_stream.as_ref().map_or(true, |(o, _)| *o < offset) {
                    last_xref_stream = Some((offset, dict.clone()));
                }
            } else if dict.has_name("Type", "ObjStm") {
                let PdfObject::Stream(stream) = &object else {
                    continue;
                };
                match ObjectStream::parse(stream, &self.options) {
                    Ok(objstm) => {
                        for (index, inner) in objstm.object_numbers().enumerate() {
                            compressed.push((inner, *num, index as u32));
                            let is_catalog = objstm
                                .get_indexed(inner, index)
                                .and_then(|o| o.as_dict())
                                .is_some_and(|d| d.has_name("Type", "Catalog"));
                            if is_catalog && last_catalog.map_or(true, |(o, _)| o <= offset) {
                                last_catalog = Some((offset, ObjectId::new(inner, 0)));
                            }
                        }
                    }
                    Err(e) => warn!("Object stream {} unreadable during rebuild: {}", num, e),
                }
            }
        }

        for (inner, stream_object, index) in compressed {
            // Objects found directly take precedence
            if table.claim(inner, XRefEntry::Compressed { stream_object, index }) {
                stats.compressed_entries += 1;
            }
        }
        stats.entries_reconstructed = table.len();

        let mut trailer = match self.find_trailer() {
            Some(dict) => {
                stats.trailer_found = true;
                dict
            }
            None => match last_xref_stream {
                Some((_, dict)) => {
                    stats.trailer_found = true;
                    dict
                }
                None => PdfDictionary::new(),
            },
        };
        for key in STALE_TRAILER_KEYS {
            trailer.remove(key);
        }

        if !matches!(trailer.get("Root"), Some(PdfObject::Reference(_))) {
            if let Some((_, catalog)) = last_catalog {
                trailer.insert("Root", PdfObject::Reference(catalog));
                stats.root_synthesized = true;
            }
        }

        let size = i64::from(table.max_object_number()) + 1;
        let declared = trailer.get("Size").and_then(|s| s.as_integer()).unwrap_or(0);
        if declared < size {
            trailer.insert("Size", PdfObject::Integer(size));
        }

        debug!("Recovery stats: {:?}", stats);
        Ok(RecoveredXRef {
            table,
            trailer: PdfTrailer::from_dict(trailer, 0),
            stats,
        })
    }

    /// The last `trailer` keyword followed by a parseable dictionary
    fn find_trailer(&self) -> Option<PdfDictionary> {
        let mut end = self.data.len();
        while let Some(at) = rfind_bytes(&self.data[..end], b"trailer") {
            let mut parser = ObjectParser::at(self.data, at + b"trailer".len(), &self.options);
            if let Ok(PdfObject::Dictionary(dict)) = parser.parse_object() {
                return Some(dict);
            }
            end = at;
        }
        None
    }
}

/// Walk backwards from the `obj` keyword at `obj_pos` over `N G `.
/// Returns (number, generation, offset of N).
fn parse_object_header(data: &[u8], obj_pos: usize) -> Option<(u32, u16, usize)> {
    let mut i = obj_pos;
    while i > 0 && is_whitespace(data[i - 1]) {
        i -= 1;
    }

    let gen_end = i;
    while i > 0 && data[i - 1].is_ascii_digit() {
        i -= 1;
    }
    if i == gen_end {
        return None;
    }
    let gen_start = i;

    let spaces_end = i;
    while i > 0 && is_whitespace(data[i - 1]) {
        i -= 1;
    }
    if i == spaces_end {
        return None;
    }

    let num_end = i;
    while i > 0 && data[i - 1].is_ascii_digit() {
        i -= 1;
    }
    if i == num_end {
        return None;
    }
    if i > 0 && is_regular(data[i - 1]) {
        return None;
    }

    let number = std::str::from_utf8(&data[i..num_end]).ok()?.parse().ok()?;
    let generation = std::str::from_utf8(&data[gen_start..gen_end])
        .ok()?
        .parse()
        .ok()?;
    Some((number, generation, i))
}

/// True when the file has no `startxref` near its end
pub fn needs_xref_recovery(data: &[u8]) -> bool {
    let window = &data[data.len().saturating_sub(1024)..];
    find_bytes(window, b"startxref").is_none()
}
