//! XRef Stream Writer for PDF 1.5+
//!
//! This module implements writing cross-reference streams according to
//! ISO 32000-1:2008 Section 7.5.8.

use super::serialize::{write_dictionary, ReferenceMap};
use crate::error::Result;
use crate::parser::objects::{ObjectId, PdfArray, PdfDictionary, PdfName, PdfObject};
use crate::parser::xref::XRefEntry;
use std::io::Write;

/// Writer for XRef streams
pub struct XRefStreamWriter {
    /// Entries to be written, numbered from 0
    entries: Vec<XRefEntry>,
    /// Field widths [type, field2, field3]
    widths: [usize; 3],
    /// Object ID for this XRef stream
    stream_id: ObjectId,
    /// Trailer entries carried by the stream dictionary
    trailer: PdfDictionary,
}

impl XRefStreamWriter {
    /// Create a new XRef stream writer
    pub fn new(stream_id: ObjectId) -> Self {
        Self {
            entries: Vec::new(),
            // Default widths: 1 byte for type, 3 bytes for offsets, 2 bytes for generation
            widths: [1, 3, 2],
            stream_id,
            trailer: PdfDictionary::new(),
        }
    }

    /// Set trailer entries (`Root`, `Info`, `ID`)
    pub fn set_trailer(&mut self, trailer: PdfDictionary) {
        self.trailer = trailer;
    }

    /// Add a free entry
    pub fn add_free_entry(&mut self, next_free: u32, generation: u16) {
        self.entries.push(XRefEntry::Free {
            next_free,
            generation,
        });
        self.widen(1, u64::from(next_free));
    }

    /// Add an in-use entry
    pub fn add_in_use_entry(&mut self, offset: u64, generation: u16) {
        self.entries.push(XRefEntry::InUse { offset, generation });
        self.widen(1, offset);
    }

    /// Add a compressed entry
    pub fn add_compressed_entry(&mut self, stream_object: u32, index: u32) {
        self.entries.push(XRefEntry::Compressed {
            stream_object,
            index,
        });
        self.widen(1, u64::from(stream_object));
        self.widen(2, u64::from(index));
    }

    fn widen(&mut self, field: usize, value: u64) {
        let bytes = Self::bytes_needed(value);
        if bytes > self.widths[field] {
            self.widths[field] = bytes;
        }
    }

    /// Calculate minimum bytes needed to represent a value
    fn bytes_needed(value: u64) -> usize {
        if value == 0 {
            1
        } else {
            ((value.ilog2() / 8) + 1) as usize
        }
    }

    /// Encode entries into binary data
    pub fn encode_entries(&self) -> Vec<u8> {
        let mut data = Vec::with_capacity(self.entries.len() * self.widths.iter().sum::<usize>());

        for entry in &self.entries {
            let (kind, field2, field3) = match *entry {
                XRefEntry::Free {
                    next_free,
                    generation,
                } => (0, u64::from(next_free), u64::from(generation)),
                XRefEntry::InUse { offset, generation } => (1, offset, u64::from(generation)),
                XRefEntry::Compressed {
                    stream_object,
                    index,
                } => (2, u64::from(stream_object), u64::from(index)),
            };
            Self::write_field(&mut data, kind, self.widths[0]);
            Self::write_field(&mut data, field2, self.widths[1]);
            Self::write_field(&mut data, field3, self.widths[2]);
        }

        data
    }

    /// Write a field with the specified width
    fn write_field(data: &mut Vec<u8>, value: u64, width: usize) {
        for i in (0..width).rev() {
            data.push(((value >> (i * 8)) & 0xFF) as u8);
        }
    }

    /// Create the XRef stream dictionary
    pub fn create_dictionary(&self) -> PdfDictionary {
        let mut dict = self.trailer.clone();

        dict.insert("Type", PdfObject::Name(PdfName::from("XRef")));
        dict.insert("Size", PdfObject::Integer(self.entries.len() as i64));
        dict.insert(
            "W",
            PdfObject::Array(PdfArray(
                self.widths
                    .iter()
                    .map(|w| PdfObject::Integer(*w as i64))
                    .collect(),
            )),
        );
        dict.insert("Filter", PdfObject::Name(PdfName::from("FlateDecode")));

        dict
    }

    /// Write the complete XRef stream object
    pub fn write_xref_stream<W: Write>(
        &self,
        writer: &mut W,
        refs: &dyn ReferenceMap,
    ) -> Result<()> {
        let compressed_data = crate::compression::compress(&self.encode_entries())?;

        let mut dict = self.create_dictionary();
        dict.insert("Length", PdfObject::Integer(compressed_data.len() as i64));

        writeln!(
            writer,
            "{} {} obj",
            self.stream_id.number(),
            self.stream_id.generation()
        )?;
        write_dictionary(writer, &dict, refs)?;
        writer.write_all(b"\nstream\n")?;
        writer.write_all(&compressed_data)?;
        writer.write_all(b"\nendstream\nendobj\n")?;

        Ok(())
    }

    /// Get the number of entries
    pub fn entry_count(&self) -> usize {
        self.entries.len()
    }

    /// Get the stream object ID
    pub fn stream_id(&self) -> ObjectId {
        self.stream_id
    }
}
