//! Hint table encoding (ISO 32000-1 Annex F.4)
//!
//! The primary hint stream holds the page offset hint table followed by the
//! shared object hint table; `/S` in the stream dictionary gives the byte
//! offset of the latter. Values are stored as unsigned big-endian bit fields,
//! most of them as differences from the least value in the table. Each item
//! group is padded to a byte boundary.

use std::fmt;

/// Number of bits needed to hold `value`
pub fn bits_needed(value: u64) -> u32 {
    64 - value.leading_zeros()
}

/// Big-endian bit packer
#[derive(Debug, Default)]
pub struct BitWriter {
    data: Vec<u8>,
    current: u8,
    used: u32,
}

impl BitWriter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append the low `bits` bits of `value`
    pub fn write_bits(&mut self, value: u64, bits: u32) {
        for shift in (0..bits).rev() {
            let bit = ((value >> shift) & 1) as u8;
            self.current = (self.current << 1) | bit;
            self.used += 1;
            if self.used == 8 {
                self.data.push(self.current);
                self.current = 0;
                self.used = 0;
            }
        }
    }

    /// Pad with zero bits up to the next byte boundary
    pub fn align(&mut self) {
        if self.used > 0 {
            self.data.push(self.current << (8 - self.used));
            self.current = 0;
            self.used = 0;
        }
    }

    pub fn finish(mut self) -> Vec<u8> {
        self.align();
        self.data
    }
}

/// Big-endian bit reader
#[derive(Debug)]
pub struct BitReader<'a> {
    data: &'a [u8],
    bit_position: usize,
}

impl<'a> BitReader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self {
            data,
            bit_position: 0,
        }
    }

    pub fn read_bits(&mut self, bits: u32) -> Result<u64, HintError> {
        let mut value = 0u64;
        for _ in 0..bits {
            let byte = self
                .data
                .get(self.bit_position / 8)
                .ok_or(HintError::Truncated)?;
            let bit = (byte >> (7 - (self.bit_position % 8))) & 1;
            value = (value << 1) | u64::from(bit);
            self.bit_position += 1;
        }
        Ok(value)
    }

    pub fn align(&mut self) {
        self.bit_position = self.bit_position.div_ceil(8) * 8;
    }

    pub fn remaining_bits(&self) -> usize {
        self.data
            .len()
            .saturating_mul(8)
            .saturating_sub(self.bit_position)
    }

    /// Fail unless `rows` rows of `row_bits` bits each fit in what is left
    fn ensure_rows(&self, rows: usize, row_bits: usize) -> Result<(), HintError> {
        let bits_left = self.remaining_bits();
        match rows.checked_mul(row_bits) {
            Some(needed) if needed <= bits_left => Ok(()),
            _ => Err(HintError::TooManyRows { rows, bits_left }),
        }
    }
}

/// Failure to decode a hint table
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HintError {
    Truncated,
    FieldTooWide(u64),
    /// A row count larger than the remaining data can describe
    TooManyRows { rows: usize, bits_left: usize },
    /// A decoded value does not fit its type
    Overflow,
}

impl fmt::Display for HintError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HintError::Truncated => write!(f, "hint table ends early"),
            HintError::FieldTooWide(bits) => write!(f, "hint field width {bits} exceeds 64 bits"),
            HintError::TooManyRows { rows, bits_left } => write!(
                f,
                "{rows} hint table rows do not fit in the remaining {bits_left} bits"
            ),
            HintError::Overflow => write!(f, "hint table value overflows"),
        }
    }
}

impl std::error::Error for HintError {}

/// Per-page row of the page offset hint table
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct PageOffsetEntry {
    pub object_count: u32,
    pub page_length: u64,
    /// Shared object hint table rows the page uses
    pub shared_refs: Vec<u32>,
    /// Content stream start relative to the page start
    pub content_offset: u64,
    pub content_length: u64,
}

/// Page offset hint table (Table F.3 header plus Table F.4 rows)
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct PageOffsetTable {
    /// Offset of the first page's page object
    pub first_page_location: u64,
    pub entries: Vec<PageOffsetEntry>,
}

/// Row of the shared object hint table; every group holds one object
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SharedObjectEntry {
    pub length: u64,
}

/// Shared object hint table (Table F.5 header plus Table F.6 rows)
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SharedObjectTable {
    /// Object number of the first object in the shared part; 0 when empty
    pub first_shared_object: u32,
    /// Offset of that object; 0 when empty
    pub first_shared_location: u64,
    /// Rows describing objects that live in the first page
    pub first_page_entries: u32,
    pub entries: Vec<SharedObjectEntry>,
}

/// Encoded primary hint stream contents
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HintStream {
    pub data: Vec<u8>,
    /// Byte offset of the shared object hint table within `data`
    pub shared_offset: usize,
}

/// Least value and delta width of a column
fn column(values: impl Iterator<Item = u64> + Clone) -> (u64, u32) {
    let least = values.clone().min().unwrap_or(0);
    let greatest = values.max().unwrap_or(0);
    (least, bits_needed(greatest - least))
}

impl PageOffsetTable {
    pub fn encode(&self, writer: &mut BitWriter) {
        let entries = &self.entries;
        let (least_objects, object_bits) =
            column(entries.iter().map(|e| u64::from(e.object_count)));
        let (least_length, length_bits) = column(entries.iter().map(|e| e.page_length));
        let (least_content_offset, content_offset_bits) =
            column(entries.iter().map(|e| e.content_offset));
        let (least_content_length, content_length_bits) =
            column(entries.iter().map(|e| e.content_length));
        let shared_count_bits = bits_needed(
            entries
                .iter()
                .map(|e| e.shared_refs.len() as u64)
                .max()
                .unwrap_or(0),
        );
        let shared_id_bits = bits_needed(
            entries
                .iter()
                .flat_map(|e| e.shared_refs.iter())
                .map(|r| u64::from(*r))
                .max()
                .unwrap_or(0),
        );

        writer.write_bits(least_objects, 32);
        writer.write_bits(self.first_page_location, 32);
        writer.write_bits(u64::from(object_bits), 16);
        writer.write_bits(least_length, 32);
        writer.write_bits(u64::from(length_bits), 16);
        writer.write_bits(least_content_offset, 32);
        writer.write_bits(u64::from(content_offset_bits), 16);
        writer.write_bits(least_content_length, 32);
        writer.write_bits(u64::from(content_length_bits), 16);
        writer.write_bits(u64::from(shared_count_bits), 16);
        writer.write_bits(u64::from(shared_id_bits), 16);
        // Numerator bits and denominator of the fractional position
        writer.write_bits(0, 16);
        writer.write_bits(1, 16);

        for entry in entries {
            writer.write_bits(u64::from(entry.object_count) - least_objects, object_bits);
        }
        writer.align();
        for entry in entries {
            writer.write_bits(entry.page_length - least_length, length_bits);
        }
        writer.align();
        for entry in entries {
            writer.write_bits(entry.shared_refs.len() as u64, shared_count_bits);
        }
        writer.align();
        for entry in entries {
            for shared in &entry.shared_refs {
                writer.write_bits(u64::from(*shared), shared_id_bits);
            }
        }
        writer.align();
        // Numerators take zero bits
        writer.align();
        for entry in entries {
            writer.write_bits(entry.content_offset - least_content_offset, content_offset_bits);
        }
        writer.align();
        for entry in entries {
            writer.write_bits(entry.content_length - least_content_length, content_length_bits);
        }
        writer.align();
    }

    pub fn decode(reader: &mut BitReader<'_>, pages: usize) -> Result<Self, HintError> {
        let least_objects = reader.read_bits(32)?;
        let first_page_location = reader.read_bits(32)?;
        let object_bits = width(reader.read_bits(16)?)?;
        let least_length = reader.read_bits(32)?;
        let length_bits = width(reader.read_bits(16)?)?;
        let least_content_offset = reader.read_bits(32)?;
        let content_offset_bits = width(reader.read_bits(16)?)?;
        let least_content_length = reader.read_bits(32)?;
        let content_length_bits = width(reader.read_bits(16)?)?;
        let shared_count_bits = width(reader.read_bits(16)?)?;
        let shared_id_bits = width(reader.read_bits(16)?)?;
        let numerator_bits = width(reader.read_bits(16)?)?;
        let _denominator = reader.read_bits(16)?;

        // Every row costs its fixed-width fields; a row count the remaining
        // data cannot hold is rejected before anything is allocated
        let row_bits = [
            object_bits,
            length_bits,
            shared_count_bits,
            content_offset_bits,
            content_length_bits,
        ]
        .iter()
        .map(|bits| *bits as usize)
        .sum::<usize>()
        .max(1);
        reader.ensure_rows(pages, row_bits)?;

        let mut entries = vec![PageOffsetEntry::default(); pages];
        for entry in entries.iter_mut() {
            let count = offset_by(least_objects, reader.read_bits(object_bits)?)?;
            entry.object_count = u32::try_from(count).map_err(|_| HintError::Overflow)?;
        }
        reader.align();
        for entry in entries.iter_mut() {
            entry.page_length = offset_by(least_length, reader.read_bits(length_bits)?)?;
        }
        reader.align();
        let mut counts = Vec::with_capacity(pages);
        for _ in 0..pages {
            let count = reader.read_bits(shared_count_bits)?;
            counts.push(usize::try_from(count).map_err(|_| HintError::Overflow)?);
        }
        reader.align();
        let total_refs = counts
            .iter()
            .try_fold(0usize, |total, count| total.checked_add(*count))
            .ok_or(HintError::Overflow)?;
        if shared_id_bits == 0 {
            // A zero-width identifier can only name row 0, once per page
            if let Some(count) = counts.iter().find(|count| **count > 1) {
                return Err(HintError::TooManyRows {
                    rows: *count,
                    bits_left: reader.remaining_bits(),
                });
            }
        } else {
            reader.ensure_rows(total_refs, shared_id_bits as usize)?;
        }
        for (entry, count) in entries.iter_mut().zip(&counts) {
            entry.shared_refs.reserve(*count);
            for _ in 0..*count {
                let shared = reader.read_bits(shared_id_bits)?;
                entry
                    .shared_refs
                    .push(u32::try_from(shared).map_err(|_| HintError::Overflow)?);
            }
        }
        reader.align();
        for _ in 0..total_refs {
            reader.read_bits(numerator_bits)?;
        }
        reader.align();
        for entry in entries.iter_mut() {
            entry.content_offset =
                offset_by(least_content_offset, reader.read_bits(content_offset_bits)?)?;
        }
        reader.align();
        for entry in entries.iter_mut() {
            entry.content_length =
                offset_by(least_content_length, reader.read_bits(content_length_bits)?)?;
        }
        reader.align();

        Ok(Self {
            first_page_location,
            entries,
        })
    }

    /// Start of each page as recorded in the table, before any hint stream
    /// adjustment
    pub fn page_locations(&self) -> Result<Vec<u64>, HintError> {
        let mut location = self.first_page_location;
        self.entries
            .iter()
            .map(|entry| {
                let start = location;
                location = offset_by(location, entry.page_length)?;
                Ok(start)
            })
            .collect()
    }
}

impl SharedObjectTable {
    pub fn encode(&self, writer: &mut BitWriter) {
        let (least_length, length_bits) = column(self.entries.iter().map(|e| e.length));

        writer.write_bits(u64::from(self.first_shared_object), 32);
        writer.write_bits(self.first_shared_location, 32);
        writer.write_bits(u64::from(self.first_page_entries), 32);
        writer.write_bits(self.entries.len() as u64, 32);
        // One object per group
        writer.write_bits(0, 16);
        writer.write_bits(least_length, 32);
        writer.write_bits(u64::from(length_bits), 16);

        for entry in &self.entries {
            writer.write_bits(entry.length - least_length, length_bits);
        }
        writer.align();
        // No MD5 signatures
        for _ in &self.entries {
            writer.write_bits(0, 1);
        }
        writer.align();
    }

    pub fn decode(reader: &mut BitReader<'_>) -> Result<Self, HintError> {
        let first_shared_object = reader.read_bits(32)? as u32;
        let first_shared_location = reader.read_bits(32)?;
        let first_page_entries = reader.read_bits(32)? as u32;
        let total = usize::try_from(reader.read_bits(32)?).map_err(|_| HintError::Overflow)?;
        let group_bits = width(reader.read_bits(16)?)?;
        let least_length = reader.read_bits(32)?;
        let length_bits = width(reader.read_bits(16)?)?;

        // Each row carries at least its one-bit signature flag
        reader.ensure_rows(total, 1)?;

        let mut entries = Vec::with_capacity(total);
        for _ in 0..total {
            entries.push(SharedObjectEntry {
                length: offset_by(least_length, reader.read_bits(length_bits)?)?,
            });
        }
        reader.align();
        for _ in 0..total {
            if reader.read_bits(1)? == 1 {
                reader.read_bits(64)?;
                reader.read_bits(64)?;
            }
        }
        reader.align();
        for _ in 0..total {
            reader.read_bits(group_bits)?;
        }
        reader.align();

        Ok(Self {
            first_shared_object,
            first_shared_location,
            first_page_entries,
            entries,
        })
    }
}

/// A table's least value plus a row's delta
fn offset_by(least: u64, delta: u64) -> Result<u64, HintError> {
    least.checked_add(delta).ok_or(HintError::Overflow)
}

fn width(bits: u64) -> Result<u32, HintError> {
    if bits > 64 {
        return Err(HintError::FieldTooWide(bits));
    }
    Ok(bits as u32)
}

/// Encode both tables into the body of a primary hint stream
pub fn encode_hint_stream(pages: &PageOffsetTable, shared: &SharedObjectTable) -> HintStream {
    let mut writer = BitWriter::new();
    pages.encode(&mut writer);
    let mut data = writer.finish();
    let shared_offset = data.len();

    let mut writer = BitWriter::new();
    shared.encode(&mut writer);
    data.extend(writer.finish());

    HintStream {
        data,
        shared_offset,
    }
}

/// Decode both tables from a decoded primary hint stream
pub fn decode_hint_stream(
    data: &[u8],
    shared_offset: usize,
    pages: usize,
) -> Result<(PageOffsetTable, SharedObjectTable), HintError> {
    let page_table = PageOffsetTable::decode(&mut BitReader::new(data), pages)?;
    let shared_data = data.get(shared_offset..).ok_or(HintError::Truncated)?;
    let shared_table = SharedObjectTable::decode(&mut BitReader::new(shared_data))?;
    Ok((page_table, shared_table))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_bits_needed() {
        assert_eq!(bits_needed(0), 0);
        assert_eq!(bits_needed(1), 1);
        assert_eq!(bits_needed(2), 2);
        assert_eq!(bits_needed(255), 8);
        assert_eq!(bits_needed(256), 9);
    }

    #[test]
    fn test_bit_writer_packs_big_endian() {
        let mut writer = BitWriter::new();
        writer.write_bits(0b101, 3);
        writer.write_bits(0b1, 1);
        writer.align();
        writer.write_bits(0xABCD, 16);
        assert_eq!(writer.finish(), vec![0b1011_0000, 0xAB, 0xCD]);
    }

    #[test]
    fn test_bit_reader() {
        let data = [0b1011_0000, 0xAB, 0xCD];
        let mut reader = BitReader::new(&data);
        assert_eq!(reader.read_bits(3).unwrap(), 0b101);
        reader.align();
        assert_eq!(reader.read_bits(16).unwrap(), 0xABCD);
        assert_eq!(reader.read_bits(1), Err(HintError::Truncated));
    }

    fn sample_tables() -> (PageOffsetTable, SharedObjectTable) {
        let pages = PageOffsetTable {
            first_page_location: 812,
            entries: vec![
                PageOffsetEntry {
                    object_count: 4,
                    page_length: 3000,
                    shared_refs: vec![],
                    content_offset: 120,
                    content_length: 900,
                },
                PageOffsetEntry {
                    object_count: 2,
                    page_length: 450,
                    shared_refs: vec![0, 2],
                    content_offset: 80,
                    content_length: 300,
                },
                PageOffsetEntry {
                    object_count: 3,
                    page_length: 700,
                    shared_refs: vec![1],
                    content_offset: 0,
                    content_length: 0,
                },
            ],
        };
        let shared = SharedObjectTable {
            first_shared_object: 12,
            first_shared_location: 5000,
            first_page_entries: 1,
            entries: vec![
                SharedObjectEntry { length: 60 },
                SharedObjectEntry { length: 2048 },
                SharedObjectEntry { length: 75 },
            ],
        };
        (pages, shared)
    }

    #[test]
    fn test_hint_stream_decodes_to_same_tables() {
        let (pages, shared) = sample_tables();
        let stream = encode_hint_stream(&pages, &shared);
        let (decoded_pages, decoded_shared) =
            decode_hint_stream(&stream.data, stream.shared_offset, 3).unwrap();
        assert_eq!(decoded_pages, pages);
        assert_eq!(decoded_shared, shared);
    }

    #[test]
    fn test_page_locations() {
        let (pages, _) = sample_tables();
        assert_eq!(pages.page_locations().unwrap(), vec![812, 3812, 4262]);
    }

    #[test]
    fn test_page_locations_overflow() {
        let pages = PageOffsetTable {
            first_page_location: u64::MAX - 10,
            entries: vec![
                PageOffsetEntry {
                    page_length: 100,
                    ..Default::default()
                },
                PageOffsetEntry::default(),
            ],
        };
        assert_eq!(pages.page_locations(), Err(HintError::Overflow));
    }

    #[test]
    fn test_page_count_beyond_data_is_rejected() {
        let (pages, shared) = sample_tables();
        let stream = encode_hint_stream(&pages, &shared);
        let result = decode_hint_stream(&stream.data, stream.shared_offset, 4_000_000_000);
        assert!(matches!(result, Err(HintError::TooManyRows { .. })));
    }

    #[test]
    fn test_huge_shared_row_count_is_rejected() {
        let mut writer = BitWriter::new();
        writer.write_bits(0, 32);
        writer.write_bits(0, 32);
        writer.write_bits(0, 32);
        writer.write_bits(u64::from(u32::MAX), 32);
        writer.write_bits(0, 16);
        writer.write_bits(0, 32);
        writer.write_bits(0, 16);
        let data = writer.finish();
        assert!(matches!(
            SharedObjectTable::decode(&mut BitReader::new(&data)),
            Err(HintError::TooManyRows { .. })
        ));
    }

    #[test]
    fn test_object_count_overflow() {
        // One page: least object count u32::MAX plus a one-bit delta of 1
        let mut writer = BitWriter::new();
        writer.write_bits(u64::from(u32::MAX), 32);
        writer.write_bits(0, 32);
        writer.write_bits(1, 16);
        for _ in 0..3 {
            writer.write_bits(0, 32);
            writer.write_bits(0, 16);
        }
        writer.write_bits(0, 16);
        writer.write_bits(0, 16);
        writer.write_bits(0, 16);
        writer.write_bits(1, 16);
        writer.write_bits(1, 1);
        writer.align();
        let data = writer.finish();
        assert_eq!(
            PageOffsetTable::decode(&mut BitReader::new(&data), 1),
            Err(HintError::Overflow)
        );
    }

    #[test]
    fn test_page_offset_header_layout() {
        let (pages, _) = sample_tables();
        let mut writer = BitWriter::new();
        pages.encode(&mut writer);
        let data = writer.finish();
        // Least object count, then first page location
        assert_eq!(&data[0..4], &[0, 0, 0, 2]);
        assert_eq!(&data[4..8], &812u32.to_be_bytes());
        // Header is 36 bytes
        assert!(data.len() > 36);
    }

    #[test]
    fn test_empty_shared_table() {
        let table = SharedObjectTable::default();
        let mut writer = BitWriter::new();
        table.encode(&mut writer);
        let data = writer.finish();
        assert_eq!(data.len(), 24);
        let decoded = SharedObjectTable::decode(&mut BitReader::new(&data)).unwrap();
        assert_eq!(decoded, table);
    }

    #[test]
    fn test_truncated_table() {
        let (pages, shared) = sample_tables();
        let stream = encode_hint_stream(&pages, &shared);
        assert!(decode_hint_stream(&stream.data[..20], 10, 3).is_err());
    }
}
