//! Linearized output
//!
//! The file is laid out twice. The first pass leaves the hint stream out and
//! writes zeros for every offset-dependent value; all such values are padded
//! to a fixed width, so the pass yields the exact size of everything except
//! the hint stream. Hint tables are computed from those offsets (the tables
//! describe the file as if the hint stream were absent). The second pass
//! inserts the hint stream, fills in the real values, and must land every
//! object exactly where the first pass predicted.

use super::serialize::{write_dictionary, write_indirect};
use super::{trailer_entries, PdfWriter, WriteOptions};
use crate::compression::compress;
use crate::document::Document;
use crate::error::{PdfError, Result};
use crate::linearization::hint::{
    encode_hint_stream, PageOffsetEntry, PageOffsetTable, SharedObjectEntry, SharedObjectTable,
};
use crate::linearization::plan::{plan, LinearizationPlan, LINEARIZATION_DICT_NUMBER};
use crate::parser::header::PdfVersion;
use crate::parser::objects::{ObjectId, PdfDictionary, PdfName, PdfObject, PdfStream};
use std::collections::BTreeMap;
use tracing::{debug, info, warn};

/// Where each part of a linearized file was written
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OffsetMap {
    /// New object number to (offset, length through `endobj\n`)
    objects: BTreeMap<u32, (u64, u64)>,
    pub first_page_xref: u64,
    pub hint_offset: u64,
    pub first_page_end: u64,
    pub main_xref: u64,
    pub file_length: u64,
}

impl OffsetMap {
    pub fn offset(&self, number: u32) -> Option<u64> {
        self.objects.get(&number).map(|(offset, _)| *offset)
    }

    pub fn length(&self, number: u32) -> Option<u64> {
        self.objects.get(&number).map(|(_, length)| *length)
    }

    fn record(&mut self, number: u32, start: u64, end: u64) {
        self.objects.insert(number, (start, end - start));
    }

    /// The map after inserting an object of `length` bytes at the hint
    /// offset
    fn with_hint_stream(&self, number: u32, length: u64) -> Self {
        let at = self.hint_offset;
        let shift = |position: u64| if position >= at { position + length } else { position };

        let mut objects: BTreeMap<u32, (u64, u64)> = self
            .objects
            .iter()
            .map(|(num, (offset, len))| (*num, (shift(*offset), *len)))
            .collect();
        objects.insert(number, (at, length));

        Self {
            objects,
            first_page_xref: shift(self.first_page_xref),
            hint_offset: at,
            first_page_end: shift(self.first_page_end),
            main_xref: shift(self.main_xref),
            file_length: self.file_length + length,
        }
    }
}

/// Everything that does not depend on offsets, serialized once
struct Layout<'a> {
    plan: &'a LinearizationPlan,
    version: PdfVersion,
    /// Indirect objects keyed by new number
    bodies: BTreeMap<u32, Vec<u8>>,
    /// First-page trailer dictionary without its leading `<<`
    trailer_tail: Vec<u8>,
}

impl<'a> Layout<'a> {
    fn new(
        document: &Document,
        plan: &'a LinearizationPlan,
        options: &WriteOptions,
    ) -> Result<Self> {
        let refs = |id: ObjectId| plan.new_id(id);

        let mut bodies = BTreeMap::new();
        let order = std::iter::once(plan.catalog)
            .chain(plan.first_page.objects.iter().copied())
            .chain(plan.later_objects());
        for old in order {
            let Some(new) = plan.new_id(old) else {
                continue;
            };
            let mut body = Vec::new();
            write_indirect(&mut body, new, document.get(old), &refs)?;
            bodies.insert(new.number(), body);
        }

        let mut trailer = trailer_entries(document, &refs, options, "linearize");
        trailer.insert("Size", PdfObject::Integer(i64::from(plan.last_number()) + 1));
        let mut serialized = Vec::new();
        write_dictionary(&mut serialized, &trailer, &refs)?;
        // `/Prev` is written separately, padded, right after the `<<`
        let trailer_tail = serialized.split_off(2);

        Ok(Self {
            plan,
            version: document.version(),
            bodies,
            trailer_tail,
        })
    }

    fn main_xref_header(&self) -> String {
        let k = self.plan.first_page_last_number();
        format!("xref\n{} {}\n", k + 1, self.plan.last_number() - k)
    }

    /// Linearization parameter dictionary. Offset-dependent values are
    /// padded so both passes produce the same length.
    fn parameter_object(&self, target: Option<&OffsetMap>) -> Vec<u8> {
        let hint_number = self.plan.hint_stream_number();
        let (length, hint_offset, hint_length, first_page_end, main_xref_entry) = match target {
            Some(map) => (
                map.file_length,
                map.hint_offset,
                map.length(hint_number).unwrap_or(0),
                map.first_page_end,
                map.main_xref + self.main_xref_header().len() as u64 - 1,
            ),
            None => (0, 0, 0, 0, 0),
        };
        let first_page = self
            .plan
            .new_id(self.plan.first_page.page)
            .map_or(0, |id| id.number());

        format!(
            "{LINEARIZATION_DICT_NUMBER} 0 obj\n<< /Linearized 1 /L {length:>10} \
             /H [ {hint_offset:>10} {hint_length:>10} ] /O {first_page} \
             /E {first_page_end:>10} /N {} /T {main_xref_entry:>10} >>\nendobj\n",
            self.plan.page_count()
        )
        .into_bytes()
    }

    fn write_body(
        &self,
        writer: &mut PdfWriter<Vec<u8>>,
        map: &mut OffsetMap,
        number: u32,
    ) -> Result<()> {
        let body = self.bodies.get(&number).ok_or_else(|| {
            PdfError::Linearization(format!("no serialized object for number {number}"))
        })?;
        let start = writer.position();
        writer.write_bytes(body)?;
        map.record(number, start, writer.position());
        Ok(())
    }

    /// Lay the file out. `target` supplies the values written into the
    /// parameter dictionary, the first-page xref and trailer; without it
    /// they are zero.
    fn render(
        &self,
        hint: Option<&[u8]>,
        target: Option<&OffsetMap>,
    ) -> Result<(Vec<u8>, OffsetMap)> {
        let plan = self.plan;
        let first_page_last = plan.first_page_last_number();
        let last = plan.last_number();

        let mut writer = PdfWriter::new_with_writer(Vec::new());
        let mut map = OffsetMap::default();
        writer.write_header(self.version)?;

        let start = writer.position();
        writer.write_bytes(&self.parameter_object(target))?;
        map.record(LINEARIZATION_DICT_NUMBER, start, writer.position());

        map.first_page_xref = writer.position();
        let mut xref = format!("xref\n0 {}\n0000000000 65535 f \n", first_page_last + 1);
        for number in 1..=first_page_last {
            let offset = target.and_then(|t| t.offset(number)).unwrap_or(0);
            xref.push_str(&format!("{offset:010} 00000 n \n"));
        }
        let prev = target.map_or(0, |t| t.main_xref);
        xref.push_str(&format!("trailer\n<< /Prev {prev:>10}"));
        writer.write_bytes(xref.as_bytes())?;
        writer.write_bytes(&self.trailer_tail)?;
        writer.write_bytes(b"\nstartxref\n0\n%%EOF\n")?;

        self.write_body(&mut writer, &mut map, plan.catalog_number())?;

        map.hint_offset = writer.position();
        if let Some(hint) = hint {
            writer.write_bytes(hint)?;
            map.record(plan.hint_stream_number(), map.hint_offset, writer.position());
        }

        for number in plan.hint_stream_number() + 1..=first_page_last {
            self.write_body(&mut writer, &mut map, number)?;
        }
        map.first_page_end = writer.position();

        for number in first_page_last + 1..=last {
            self.write_body(&mut writer, &mut map, number)?;
        }

        map.main_xref = writer.position();
        let mut xref = self.main_xref_header();
        for number in first_page_last + 1..=last {
            let offset = map.offset(number).unwrap_or(0);
            xref.push_str(&format!("{offset:010} 00000 n \n"));
        }
        xref.push_str(&format!(
            "trailer\n<< /Size {} >>\nstartxref\n{}\n%%EOF\n",
            last + 1,
            map.first_page_xref
        ));
        writer.write_bytes(xref.as_bytes())?;

        map.file_length = writer.position();
        Ok((writer.into_inner(), map))
    }

    /// Hint tables for the layout measured without the hint stream
    fn hint_tables(&self, measured: &OffsetMap) -> (PageOffsetTable, SharedObjectTable) {
        let plan = self.plan;
        let number = |old: ObjectId| plan.new_id(old).map(|id| id.number());
        let offset = |old: ObjectId| number(old).and_then(|n| measured.offset(n)).unwrap_or(0);
        let length = |old: ObjectId| number(old).and_then(|n| measured.length(n)).unwrap_or(0);

        let entries = plan
            .pages()
            .enumerate()
            .map(|(index, part)| {
                let start = offset(part.page);
                let end = if index == 0 {
                    measured.first_page_end
                } else {
                    part.objects
                        .last()
                        .map_or(start, |last| offset(*last) + length(*last))
                };
                let (content_offset, content_length) = part.content.map_or((0, 0), |content| {
                    (offset(content).saturating_sub(start), length(content))
                });
                PageOffsetEntry {
                    object_count: part.objects.len() as u32,
                    page_length: end.saturating_sub(start),
                    shared_refs: part.shared_refs.clone(),
                    content_offset,
                    content_length,
                }
            })
            .collect();

        let pages = PageOffsetTable {
            first_page_location: offset(plan.first_page.page),
            entries,
        };
        let shared = SharedObjectTable {
            first_shared_object: plan.shared.first().and_then(|id| number(*id)).unwrap_or(0),
            first_shared_location: plan.shared.first().map_or(0, |id| offset(*id)),
            first_page_entries: plan.first_page_shared as u32,
            entries: plan
                .shared_table
                .iter()
                .map(|id| SharedObjectEntry { length: length(*id) })
                .collect(),
        };
        (pages, shared)
    }

    fn hint_object(&self, measured: &OffsetMap, options: &WriteOptions) -> Result<Vec<u8>> {
        let (pages, shared) = self.hint_tables(measured);
        let hint = encode_hint_stream(&pages, &shared);

        let mut dict = PdfDictionary::new();
        dict.insert("S", PdfObject::Integer(hint.shared_offset as i64));
        let data = if options.compress_hint_stream {
            dict.insert("Filter", PdfObject::Name(PdfName::from("FlateDecode")));
            compress(&hint.data)?
        } else {
            hint.data
        };

        let mut out = Vec::new();
        let stream = PdfObject::Stream(PdfStream::new(dict, data));
        write_indirect(
            &mut out,
            ObjectId::new(self.plan.hint_stream_number(), 0),
            &stream,
            &|_: ObjectId| -> Option<ObjectId> { None },
        )?;
        Ok(out)
    }
}

/// Write `document` as a linearized file
pub fn write_linearized(document: &mut Document, options: &WriteOptions) -> Result<Vec<u8>> {
    if options.xref_stream {
        warn!("Cross-reference streams are not used for linearized output");
    }
    let plan = plan(document, options.preserve_unreferenced)?;
    let layout = Layout::new(document, &plan, options)?;

    let (_, measured) = layout.render(None, None)?;
    let hint = layout.hint_object(&measured, options)?;
    let predicted = measured.with_hint_stream(plan.hint_stream_number(), hint.len() as u64);
    debug!(
        "Measured layout: {} bytes before the {} byte hint stream",
        measured.file_length,
        hint.len()
    );

    let (bytes, actual) = layout.render(Some(&hint), Some(&predicted))?;
    if actual != predicted || bytes.len() as u64 != predicted.file_length {
        return Err(PdfError::Linearization(format!(
            "layout moved between passes (predicted {} bytes, wrote {})",
            predicted.file_length,
            bytes.len()
        )));
    }

    info!(
        "Linearized {} pages into {} objects ({} bytes)",
        plan.page_count(),
        plan.last_number(),
        bytes.len()
    );
    Ok(bytes)
}
