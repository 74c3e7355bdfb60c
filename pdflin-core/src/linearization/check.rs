//! Verification of linearized files
//!
//! [`check`] reads the linearization parameter dictionary, the first-page
//! cross-reference section and the primary hint stream, and compares what
//! they claim with the actual layout of the file.

use super::hint::{decode_hint_stream, PageOffsetTable, SharedObjectTable};
use crate::document::Document;
use crate::parser::lexer::Lexer;
use crate::parser::objects::{ObjectId, ObjectParser, PdfDictionary, PdfObject};
use crate::parser::xref::{parse_section_at, XRefEntry, XRefTable};
use crate::parser::ParseOptions;
use tracing::debug;

/// The linearization dictionary must start within this many bytes
const PARAMETER_SEARCH_LIMIT: usize = 1024;

/// Decoded linearization parameter dictionary
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct LinearizationParameters {
    /// Object number of the dictionary itself
    pub object_number: u32,
    /// `/L`: file length
    pub file_length: u64,
    /// `/H`: offset and length of the primary hint stream
    pub hint_offset: u64,
    pub hint_length: u64,
    /// `/O`: object number of the first page
    pub first_page_object: u32,
    /// `/E`: end of the first page
    pub first_page_end: u64,
    /// `/N`: number of pages
    pub page_count: u32,
    /// `/T`: offset of the white-space before the first main xref entry
    pub main_xref_entry: u64,
    /// Offset just past the dictionary's `endobj`
    #[cfg_attr(feature = "serde", serde(skip))]
    pub end: usize,
}

/// Result of checking a file's linearization data
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct LinearizationReport {
    pub linearized: bool,
    pub parameters: Option<LinearizationParameters>,
    pub page_offsets: Option<PageOffsetTable>,
    pub shared_objects: Option<SharedObjectTable>,
    /// Everything found wrong, in the order found
    pub problems: Vec<String>,
}

impl LinearizationReport {
    /// Linearized and free of problems
    pub fn is_ok(&self) -> bool {
        self.linearized && self.parameters.is_some() && self.problems.is_empty()
    }

    fn problem(&mut self, message: impl Into<String>) {
        let message = message.into();
        debug!("Linearization problem: {}", message);
        self.problems.push(message);
    }
}

/// The first object of the file, if it is a linearization dictionary
fn first_dictionary(
    data: &[u8],
    options: &ParseOptions,
) -> Option<(ObjectId, PdfDictionary, usize)> {
    let mut lexer = Lexer::new_with_options(data, options);
    lexer.skip_whitespace_and_comments();
    let start = lexer.position();
    if start > PARAMETER_SEARCH_LIMIT {
        return None;
    }

    let mut parser = ObjectParser::at(data, start, options);
    let (id, object) = parser.parse_indirect_object().ok()?;
    let end = parser.position();
    match object {
        PdfObject::Dictionary(dict) if dict.contains_key("Linearized") => Some((id, dict, end)),
        _ => None,
    }
}

/// Whether the file begins with a linearization parameter dictionary
pub fn is_linearized(data: &[u8], options: &ParseOptions) -> bool {
    first_dictionary(data, options).is_some()
}

/// Read the linearization parameters; `None` if the file is not
/// linearized or the dictionary lacks a required entry
pub fn find_parameters(data: &[u8], options: &ParseOptions) -> Option<LinearizationParameters> {
    let (id, dict, end) = first_dictionary(data, options)?;
    let unsigned = |key: &str| {
        dict.get(key)
            .and_then(|value| value.as_integer())
            .and_then(|value| u64::try_from(value).ok())
    };
    let hint = dict.get("H").and_then(|h| h.as_array())?;
    let hint_value = |index: usize| {
        hint.get(index)
            .and_then(|value| value.as_integer())
            .and_then(|value| u64::try_from(value).ok())
    };

    Some(LinearizationParameters {
        object_number: id.number(),
        file_length: unsigned("L")?,
        hint_offset: hint_value(0)?,
        hint_length: hint_value(1)?,
        first_page_object: u32::try_from(unsigned("O")?).ok()?,
        first_page_end: unsigned("E")?,
        page_count: u32::try_from(unsigned("N")?).ok()?,
        main_xref_entry: unsigned("T")?,
        end,
    })
}

/// Check the linearization data of a complete file
pub fn check(data: &[u8]) -> LinearizationReport {
    let options = ParseOptions::default();
    let mut report = LinearizationReport::default();

    if !is_linearized(data, &options) {
        report.problem("file is not linearized");
        return report;
    }
    report.linearized = true;

    let Some(params) = find_parameters(data, &options) else {
        report.problem("linearization dictionary is missing a required entry");
        return report;
    };
    report.parameters = Some(params.clone());

    if params.file_length != data.len() as u64 {
        report.problem(format!(
            "/L is {} but the file is {} bytes long",
            params.file_length,
            data.len()
        ));
    }

    let first_page_xref = check_first_page_xref(data, &params, &options, &mut report);
    let hint_data = read_hint_stream(data, &params, &options, &mut report);

    let mut document = match Document::load(data.to_vec(), &options) {
        Ok(document) => document,
        Err(e) => {
            report.problem(format!("file cannot be loaded: {e}"));
            return report;
        }
    };
    let pages = document.page_ids();

    if params.page_count as usize != pages.len() {
        report.problem(format!(
            "/N is {} but the document has {} pages",
            params.page_count,
            pages.len()
        ));
    }
    match pages.first() {
        Some(first) if first.number() == params.first_page_object => {}
        Some(first) => report.problem(format!(
            "/O is {} but the first page is object {}",
            params.first_page_object,
            first.number()
        )),
        None => report.problem("document has no pages"),
    }

    if let Some((first_table, main_table)) = &first_page_xref {
        check_first_page_end(data, &params, first_table, main_table, &options, &mut report);
    }

    if let Some((stream, shared_offset)) = hint_data {
        match decode_hint_stream(&stream, shared_offset, params.page_count as usize) {
            Ok((page_table, shared_table)) => {
                check_page_locations(&document, &pages, &params, &page_table, &mut report);
                report.page_offsets = Some(page_table);
                report.shared_objects = Some(shared_table);
            }
            Err(e) => report.problem(format!("hint stream cannot be decoded: {e}")),
        }
    }

    report
}

/// The first-page xref must follow the parameter dictionary; returns its
/// table and the table of the main xref it points to
fn check_first_page_xref(
    data: &[u8],
    params: &LinearizationParameters,
    options: &ParseOptions,
    report: &mut LinearizationReport,
) -> Option<(XRefTable, XRefTable)> {
    let mut lexer = Lexer::at(data, params.end, options);
    lexer.skip_whitespace();
    let position = lexer.position();
    if !data[position..].starts_with(b"xref") {
        report.problem(
            "first-page cross-reference table does not follow the linearization dictionary",
        );
        return None;
    }

    let section = match parse_section_at(data, position as u64, options) {
        Ok(section) => section,
        Err(e) => {
            report.problem(format!("first-page cross-reference table is unreadable: {e}"));
            return None;
        }
    };

    let Some(prev) = section
        .trailer
        .get("Prev")
        .and_then(|prev| prev.as_integer())
        .and_then(|prev| u64::try_from(prev).ok())
    else {
        report.problem("first-page trailer has no /Prev");
        return None;
    };

    // /T must sit on the line break before the first main xref entry
    let t = usize::try_from(params.main_xref_entry).unwrap_or(usize::MAX);
    let line_break = data
        .get(t)
        .is_some_and(|c| matches!(c, b'\n' | b'\r' | b' '));
    let entry_follows = t
        .checked_add(11)
        .and_then(|end| data.get(t + 1..end))
        .is_some_and(|digits| digits.iter().all(u8::is_ascii_digit));
    if params.main_xref_entry < prev || !line_break || !entry_follows {
        report.problem(format!(
            "/T {} does not point before the first main cross-reference entry",
            params.main_xref_entry
        ));
    }

    match parse_section_at(data, prev, options) {
        Ok(main) => Some((section.table, main.table)),
        Err(e) => {
            report.problem(format!("main cross-reference table is unreadable: {e}"));
            None
        }
    }
}

/// The hint stream must be the indirect stream object `/H` brackets;
/// returns its decoded data and `/S`
fn read_hint_stream(
    data: &[u8],
    params: &LinearizationParameters,
    options: &ParseOptions,
    report: &mut LinearizationReport,
) -> Option<(Vec<u8>, usize)> {
    let offset = usize::try_from(params.hint_offset).ok()?;
    if offset >= data.len() {
        report.problem(format!("/H offset {offset} is past the end of the file"));
        return None;
    }

    let mut parser = ObjectParser::at(data, offset, options);
    let stream = match parser.parse_indirect_object() {
        Ok((_, PdfObject::Stream(stream))) => stream,
        Ok((id, other)) => {
            report.problem(format!(
                "/H points to object {} which is a {}, not a stream",
                id,
                other.type_name()
            ));
            return None;
        }
        Err(e) => {
            report.problem(format!("no object at /H offset {offset}: {e}"));
            return None;
        }
    };

    // The bracketed range ends at the white-space after endobj
    let mut lexer = Lexer::at(data, parser.position(), options);
    lexer.skip_whitespace();
    let actual = (lexer.position() - offset) as u64;
    if actual != params.hint_length && (parser.position() - offset) as u64 != params.hint_length {
        report.problem(format!(
            "/H length is {} but the hint stream object spans {} bytes",
            params.hint_length, actual
        ));
    }

    let Some(shared_offset) = stream
        .dict
        .get("S")
        .and_then(|s| s.as_integer())
        .and_then(|s| usize::try_from(s).ok())
    else {
        report.problem("hint stream has no /S");
        return None;
    };

    match stream.decode() {
        Ok(decoded) => Some((decoded, shared_offset)),
        Err(e) => {
            report.problem(format!("hint stream cannot be decompressed: {e}"));
            None
        }
    }
}

/// First-page objects must end by `/E`; later objects must start after it
fn check_first_page_end(
    data: &[u8],
    params: &LinearizationParameters,
    first_table: &XRefTable,
    main_table: &XRefTable,
    options: &ParseOptions,
    report: &mut LinearizationReport,
) {
    let mut first_page_end = 0usize;
    for (num, entry) in first_table.iter() {
        let XRefEntry::InUse { offset, .. } = entry else {
            continue;
        };
        let mut parser = ObjectParser::at(data, *offset as usize, options);
        match parser.parse_indirect_object() {
            Ok(_) => first_page_end = first_page_end.max(parser.position()),
            Err(e) => report.problem(format!("first-page object {num} is unreadable: {e}")),
        }
    }
    if first_page_end as u64 > params.first_page_end {
        report.problem(format!(
            "/E is {} but first-page objects end at {}",
            params.first_page_end, first_page_end
        ));
    }

    let later_start = main_table
        .iter()
        .filter_map(|(_, entry)| match entry {
            XRefEntry::InUse { offset, .. } => Some(*offset),
            _ => None,
        })
        .min();
    if let Some(start) = later_start {
        if start < params.first_page_end {
            report.problem(format!(
                "/E is {} but later objects start at {}",
                params.first_page_end, start
            ));
        }
    }
}

/// Page starts recorded in the page offset hint table must match the page
/// objects. Recorded offsets ignore the hint stream, so its length is added
/// to anything located after it.
fn check_page_locations(
    document: &Document,
    pages: &[ObjectId],
    params: &LinearizationParameters,
    table: &PageOffsetTable,
    report: &mut LinearizationReport,
) {
    let locations = match table.page_locations() {
        Ok(locations) => locations,
        Err(e) => {
            report.problem(format!("page offset hint table is inconsistent: {e}"));
            return;
        }
    };
    for (index, (page, recorded)) in pages.iter().zip(locations).enumerate() {
        let expected = if recorded >= params.hint_offset {
            match recorded.checked_add(params.hint_length) {
                Some(expected) => expected,
                None => {
                    report.problem(format!(
                        "page {} location {} overflows when shifted by /H length {}",
                        index + 1,
                        recorded,
                        params.hint_length
                    ));
                    continue;
                }
            }
        } else {
            recorded
        };
        let actual = match document.xref().get_entry(page.number()) {
            Some(XRefEntry::InUse { offset, .. }) => *offset,
            _ => {
                report.problem(format!("page {} has no uncompressed offset", index + 1));
                continue;
            }
        };
        if actual != expected {
            report.problem(format!(
                "page {} starts at {} but the hint table says {}",
                index + 1,
                actual,
                expected
            ));
        }
    }
}
