//! PDF writer
//!
//! Rewrites a [`Document`] either as a plain file (original object numbers,
//! classic xref table or cross-reference stream) or, with
//! [`WriteOptions::linearize`], as a linearized file.

pub mod linearized;
pub mod serialize;
pub mod xref_stream_writer;

pub use linearized::{write_linearized, OffsetMap};
pub use serialize::ReferenceMap;
pub use xref_stream_writer::XRefStreamWriter;

use crate::document::Document;
use crate::error::Result;
use crate::parser::header::PdfVersion;
use crate::parser::objects::{ObjectId, PdfArray, PdfDictionary, PdfObject, PdfString};
use crate::parser::xref::XRefEntry;
use std::collections::{BTreeMap, HashSet};
use std::fs::File;
use std::io::{self, Write};
use std::path::Path;
use tracing::{debug, info, warn};

/// `/ID` used when reproducible output is requested
const STATIC_ID: [u8; 16] = [
    0x31, 0x41, 0x59, 0x26, 0x53, 0x58, 0x97, 0x93, 0x23, 0x84, 0x62, 0x64, 0x33, 0x83, 0x27, 0x95,
];

#[derive(Debug, thiserror::Error)]
pub enum WriteError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Output truncated: wrote {written} of {expected} bytes")]
    Truncated { written: usize, expected: usize },
}

/// Output settings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteOptions {
    /// Write a linearized file
    pub linearize: bool,
    /// Use a cross-reference stream instead of a table (plain output only)
    pub xref_stream: bool,
    /// Keep objects that nothing references
    pub preserve_unreferenced: bool,
    /// Use a fixed `/ID` so output is reproducible
    pub static_id: bool,
    /// Flate-compress the hint stream
    pub compress_hint_stream: bool,
}

impl Default for WriteOptions {
    fn default() -> Self {
        Self {
            linearize: false,
            xref_stream: false,
            preserve_unreferenced: false,
            static_id: false,
            compress_hint_stream: true,
        }
    }
}

impl WriteOptions {
    pub fn with_linearize(mut self, linearize: bool) -> Self {
        self.linearize = linearize;
        self
    }

    pub fn with_xref_stream(mut self, xref_stream: bool) -> Self {
        self.xref_stream = xref_stream;
        self
    }

    pub fn with_preserve_unreferenced(mut self, preserve: bool) -> Self {
        self.preserve_unreferenced = preserve;
        self
    }

    pub fn with_static_id(mut self, static_id: bool) -> Self {
        self.static_id = static_id;
        self
    }

    pub fn with_compress_hint_stream(mut self, compress: bool) -> Self {
        self.compress_hint_stream = compress;
        self
    }
}

/// Serialize `document` according to `options`
pub fn write_document(document: &mut Document, options: &WriteOptions) -> Result<Vec<u8>> {
    if options.linearize {
        write_linearized(document, options)
    } else {
        write_plain(document, options)
    }
}

/// Position-tracking writer for PDF file structure
pub struct PdfWriter<W: Write> {
    writer: W,
    current_position: u64,
    /// Object number to (offset, generation)
    xref_positions: BTreeMap<u32, (u64, u16)>,
}

impl<W: Write> PdfWriter<W> {
    pub fn new_with_writer(writer: W) -> Self {
        Self {
            writer,
            current_position: 0,
            xref_positions: BTreeMap::new(),
        }
    }

    pub fn position(&self) -> u64 {
        self.current_position
    }

    pub fn write_header(&mut self, version: PdfVersion) -> Result<()> {
        self.write_bytes(format!("%PDF-{version}\n").as_bytes())?;
        // Binary comment to ensure file is treated as binary
        self.write_bytes(&[b'%', 0xE2, 0xE3, 0xCF, 0xD3, b'\n'])
    }

    pub fn write_object(
        &mut self,
        id: ObjectId,
        object: &PdfObject,
        refs: &dyn ReferenceMap,
    ) -> Result<()> {
        self.xref_positions
            .insert(id.number(), (self.current_position, id.generation()));
        let mut buffer = Vec::new();
        serialize::write_indirect(&mut buffer, id, object, refs)?;
        self.write_bytes(&buffer)
    }

    /// Classic table covering `0..size`; returns its offset
    pub fn write_xref_table(&mut self, size: u32) -> Result<u64> {
        let xref_position = self.current_position;
        let mut table = format!("xref\n0 {size}\n");
        for entry in xref_rows(&self.xref_positions, size) {
            let line = match entry {
                XRefEntry::Free {
                    next_free,
                    generation,
                } => format!("{next_free:010} {generation:05} f \n"),
                XRefEntry::InUse { offset, generation } => {
                    format!("{offset:010} {generation:05} n \n")
                }
                XRefEntry::Compressed { .. } => continue,
            };
            table.push_str(&line);
        }
        self.write_bytes(table.as_bytes())?;
        Ok(xref_position)
    }

    pub fn write_trailer(
        &mut self,
        trailer: &PdfDictionary,
        xref_position: u64,
        refs: &dyn ReferenceMap,
    ) -> Result<()> {
        let mut buffer = b"trailer\n".to_vec();
        serialize::write_dictionary(&mut buffer, trailer, refs)?;
        buffer.extend_from_slice(format!("\nstartxref\n{xref_position}\n%%EOF\n").as_bytes());
        self.write_bytes(&buffer)
    }

    pub fn write_bytes(&mut self, data: &[u8]) -> Result<()> {
        self.writer.write_all(data)?;
        self.current_position += data.len() as u64;
        Ok(())
    }

    pub fn object_positions(&self) -> &BTreeMap<u32, (u64, u16)> {
        &self.xref_positions
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}

/// Entries `0..size`: written objects in use, the rest chained into the
/// free list headed by object 0
fn xref_rows(positions: &BTreeMap<u32, (u64, u16)>, size: u32) -> Vec<XRefEntry> {
    let free: Vec<u32> = (1..size).filter(|n| !positions.contains_key(n)).collect();
    let mut next_free = free.iter().copied().chain(std::iter::once(0));
    let mut rows = Vec::with_capacity(size as usize);

    rows.push(XRefEntry::Free {
        next_free: next_free.next().unwrap_or(0),
        generation: 65535,
    });
    for num in 1..size {
        match positions.get(&num) {
            Some((offset, generation)) => rows.push(XRefEntry::InUse {
                offset: *offset,
                generation: *generation,
            }),
            None => rows.push(XRefEntry::Free {
                next_free: next_free.next().unwrap_or(0),
                generation: 0,
            }),
        }
    }
    rows
}

/// Plain rewrite: original object numbers in ascending order
fn write_plain(document: &mut Document, options: &WriteOptions) -> Result<Vec<u8>> {
    let mut ids = document.reachable_ids();
    if options.preserve_unreferenced {
        ids.extend(document.all_object_ids());
        ids.sort();
        ids.dedup();
    }
    let written: HashSet<ObjectId> = ids.iter().copied().collect();
    let refs = |id: ObjectId| written.contains(&id).then_some(id);

    let mut version = document.version();
    if options.xref_stream && version < PdfVersion::new(1, 5) {
        debug!("Raising output version to 1.5 for the cross-reference stream");
        version = PdfVersion::new(1, 5);
    }

    let mut writer = PdfWriter::new_with_writer(Vec::new());
    writer.write_header(version)?;
    for id in &ids {
        writer.write_object(*id, document.get(*id), &refs)?;
    }

    let max_number = ids.iter().map(|id| id.number()).max().unwrap_or(0);
    let mut trailer = trailer_entries(document, &refs, options, "rewrite");

    if options.xref_stream {
        let stream_id = ObjectId::new(max_number + 1, 0);
        let xref_position = writer.position();
        let mut positions = writer.object_positions().clone();
        positions.insert(stream_id.number(), (xref_position, 0));

        let mut xref = XRefStreamWriter::new(stream_id);
        for entry in xref_rows(&positions, stream_id.number() + 1) {
            match entry {
                XRefEntry::Free {
                    next_free,
                    generation,
                } => xref.add_free_entry(next_free, generation),
                XRefEntry::InUse { offset, generation } => {
                    xref.add_in_use_entry(offset, generation)
                }
                XRefEntry::Compressed {
                    stream_object,
                    index,
                } => xref.add_compressed_entry(stream_object, index),
            }
        }
        xref.set_trailer(trailer);

        let mut buffer = Vec::new();
        xref.write_xref_stream(&mut buffer, &refs)?;
        writer.write_bytes(&buffer)?;
        writer.write_bytes(format!("startxref\n{xref_position}\n%%EOF\n").as_bytes())?;
    } else {
        let size = max_number + 1;
        let xref_position = writer.write_xref_table(size)?;
        trailer.insert("Size", PdfObject::Integer(i64::from(size)));
        writer.write_trailer(&trailer, xref_position, &refs)?;
    }

    let bytes = writer.into_inner();
    info!(
        "Wrote {} objects ({} bytes){}",
        ids.len(),
        bytes.len(),
        if options.xref_stream {
            " with a cross-reference stream"
        } else {
            ""
        }
    );
    Ok(bytes)
}

/// `/Root`, `/Info` (when it is written) and `/ID`
pub(crate) fn trailer_entries(
    document: &Document,
    refs: &dyn ReferenceMap,
    options: &WriteOptions,
    mode: &str,
) -> PdfDictionary {
    let mut trailer = PdfDictionary::new();
    trailer.insert("Root", PdfObject::Reference(document.root_id()));
    if let Some(info) = document.trailer().info() {
        if refs.map(info).is_some() {
            trailer.insert("Info", PdfObject::Reference(info));
        }
    }
    trailer.insert("ID", file_id(document, options, mode));
    trailer
}

/// Two-element `/ID`: the first keeps the input's identity, the second
/// identifies this particular output
fn file_id(document: &Document, options: &WriteOptions, mode: &str) -> PdfObject {
    let (first, second) = if options.static_id {
        (STATIC_ID.to_vec(), STATIC_ID.to_vec())
    } else {
        let first = match document.trailer().first_id() {
            Some(id) => id.as_bytes().to_vec(),
            None => md5::compute(document.data()).to_vec(),
        };
        let mut seed = document.data().to_vec();
        seed.extend_from_slice(mode.as_bytes());
        (first, md5::compute(&seed).to_vec())
    };
    PdfObject::Array(PdfArray(vec![
        PdfObject::String(PdfString::new(first)),
        PdfObject::String(PdfString::new(second)),
    ]))
}

/// Write all of `bytes`. A destination that stops accepting data yields
/// [`WriteError::Truncated`].
pub fn write_to<W: Write>(
    bytes: &[u8],
    destination: &mut W,
) -> std::result::Result<(), WriteError> {
    let mut written = 0;
    while written < bytes.len() {
        match destination.write(&bytes[written..]) {
            Ok(0) => break,
            Ok(n) => written += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => {
                warn!("Write failed after {} bytes: {}", written, e);
                break;
            }
        }
    }
    if written < bytes.len() {
        return Err(WriteError::Truncated {
            written,
            expected: bytes.len(),
        });
    }
    destination.flush()?;
    Ok(())
}

/// Write `bytes` to a new file; a partial file is removed on failure
pub fn write_file(bytes: &[u8], path: &Path) -> Result<()> {
    let mut file = File::create(path)?;
    if let Err(e) = write_to(bytes, &mut file) {
        drop(file);
        if let Err(remove) = std::fs::remove_file(path) {
            warn!("Could not remove partial output {}: {}", path.display(), remove);
        }
        return Err(e.into());
    }
    Ok(())
}
