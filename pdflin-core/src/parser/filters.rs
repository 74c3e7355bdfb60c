//! PDF Stream Filters
//!
//! Handles decompression and decoding of PDF streams according to ISO 32000-1 Section 7.4

use super::objects::{PdfDictionary, PdfObject};
use super::{ParseError, ParseResult};

use flate2::read::ZlibDecoder;
use std::io::Read;
use tracing::warn;

/// Supported PDF filters
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Filter {
    /// ASCII hex decode
    ASCIIHexDecode,

    /// ASCII 85 decode
    ASCII85Decode,

    /// LZW decode
    LZWDecode,

    /// Flate decode (zlib/deflate compression)
    FlateDecode,

    /// Run length decode
    RunLengthDecode,

    /// CCITT fax decode
    CCITTFaxDecode,

    /// JBIG2 decode
    JBIG2Decode,

    /// DCT decode (JPEG)
    DCTDecode,

    /// JPX decode (JPEG 2000)
    JPXDecode,

    /// Crypt filter
    Crypt,
}

impl Filter {
    /// Parse filter from name, including the inline-image abbreviations
    pub fn from_name(name: &[u8]) -> Option<Self> {
        match name {
            b"ASCIIHexDecode" | b"AHx" => Some(Filter::ASCIIHexDecode),
            b"ASCII85Decode" | b"A85" => Some(Filter::ASCII85Decode),
            b"LZWDecode" | b"LZW" => Some(Filter::LZWDecode),
            b"FlateDecode" | b"Fl" => Some(Filter::FlateDecode),
            b"RunLengthDecode" | b"RL" => Some(Filter::RunLengthDecode),
            b"CCITTFaxDecode" | b"CCF" => Some(Filter::CCITTFaxDecode),
            b"JBIG2Decode" => Some(Filter::JBIG2Decode),
            b"DCTDecode" | b"DCT" => Some(Filter::DCTDecode),
            b"JPXDecode" => Some(Filter::JPXDecode),
            b"Crypt" => Some(Filter::Crypt),
            _ => None,
        }
    }
}

/// `/DecodeParms` values relevant to the predictor functions
#[derive(Debug, Clone, Copy, PartialEq)]
struct PredictorParams {
    predictor: i64,
    colors: usize,
    bits_per_component: usize,
    columns: usize,
}

impl PredictorParams {
    fn from_dict(dict: Option<&PdfDictionary>) -> Self {
        let get = |key: &str, default: i64| {
            dict.and_then(|d| d.get(key))
                .and_then(|v| v.as_integer())
                .unwrap_or(default)
        };
        let positive = |key: &str, default: i64| {
            usize::try_from(get(key, default).max(1)).unwrap_or(usize::MAX)
        };
        Self {
            predictor: get("Predictor", 1),
            colors: positive("Colors", 1),
            bits_per_component: positive("BitsPerComponent", 8),
            columns: positive("Columns", 1),
        }
    }

    /// Bytes per pixel and bytes per row.
    ///
    /// Fails when the row size overflows or a single row is larger than
    /// the whole stream.
    fn row_geometry(&self, data_len: usize) -> ParseResult<(usize, usize)> {
        let bits_per_pixel = self
            .colors
            .checked_mul(self.bits_per_component)
            .ok_or_else(|| self.invalid_geometry())?;
        let row_len = bits_per_pixel
            .checked_mul(self.columns)
            .ok_or_else(|| self.invalid_geometry())?
            .div_ceil(8);
        if row_len > data_len {
            return Err(self.invalid_geometry());
        }
        Ok((bits_per_pixel.div_ceil(8), row_len))
    }

    fn invalid_geometry(&self) -> ParseError {
        ParseError::StreamDecodeError(format!(
            "Predictor rows of {} columns x {} colors x {} bits do not fit the stream",
            self.columns, self.colors, self.bits_per_component
        ))
    }
}

/// Decode stream data according to specified filters
pub fn decode_stream(data: &[u8], dict: &PdfDictionary) -> ParseResult<Vec<u8>> {
    let filters: Vec<&[u8]> = match dict.get("Filter") {
        Some(PdfObject::Name(name)) => vec![name.as_bytes()],
        Some(PdfObject::Array(array)) => array
            .iter()
            .map(|obj| {
                obj.as_name().map(|n| n.as_bytes()).ok_or_else(|| {
                    ParseError::StreamDecodeError("Invalid filter in array".to_string())
                })
            })
            .collect::<ParseResult<_>>()?,
        None | Some(PdfObject::Null) => return Ok(data.to_vec()),
        Some(_) => {
            return Err(ParseError::StreamDecodeError(
                "Invalid Filter type".to_string(),
            ))
        }
    };

    // DecodeParms is a dictionary for a single filter or an array parallel to Filter
    let params: Vec<Option<&PdfDictionary>> = match dict.get("DecodeParms").or(dict.get("DP")) {
        Some(PdfObject::Dictionary(d)) => vec![Some(d)],
        Some(PdfObject::Array(array)) => array.iter().map(|p| p.as_dict()).collect(),
        _ => Vec::new(),
    };

    let mut result = data.to_vec();
    for (i, name) in filters.iter().enumerate() {
        let filter = Filter::from_name(name).ok_or_else(|| {
            ParseError::StreamDecodeError(format!(
                "Unknown filter: {}",
                String::from_utf8_lossy(name)
            ))
        })?;
        let parms = params.get(i).copied().flatten();
        result = apply_filter(&result, filter, parms)?;
    }

    Ok(result)
}

/// Apply a single filter to data
fn apply_filter(
    data: &[u8],
    filter: Filter,
    parms: Option<&PdfDictionary>,
) -> ParseResult<Vec<u8>> {
    match filter {
        Filter::FlateDecode => {
            let decoded = decode_flate(data)?;
            apply_predictor(decoded, PredictorParams::from_dict(parms))
        }
        Filter::ASCIIHexDecode => decode_ascii_hex(data),
        Filter::ASCII85Decode => decode_ascii85(data),
        Filter::RunLengthDecode => decode_run_length(data),
        _ => Err(ParseError::StreamDecodeError(format!(
            "Filter {filter:?} not supported"
        ))),
    }
}

/// Decode FlateDecode (zlib/deflate) compressed data.
///
/// A corrupt tail keeps whatever decoded cleanly before it.
fn decode_flate(data: &[u8]) -> ParseResult<Vec<u8>> {
    let mut decoder = ZlibDecoder::new(data);
    let mut result = Vec::new();
    match decoder.read_to_end(&mut result) {
        Ok(_) => Ok(result),
        Err(e) if !result.is_empty() => {
            warn!("Flate stream truncated after {} bytes: {}", result.len(), e);
            Ok(result)
        }
        Err(e) => Err(ParseError::StreamDecodeError(format!(
            "Flate decode error: {e}"
        ))),
    }
}

/// Undo a TIFF or PNG predictor
fn apply_predictor(data: Vec<u8>, params: PredictorParams) -> ParseResult<Vec<u8>> {
    match params.predictor {
        1 => Ok(data),
        _ if data.is_empty() => Ok(data),
        2 => decode_tiff_predictor(data, params),
        10..=15 => decode_png_predictor(&data, params),
        other => Err(ParseError::StreamDecodeError(format!(
            "Unsupported predictor {other}"
        ))),
    }
}

fn decode_tiff_predictor(mut data: Vec<u8>, params: PredictorParams) -> ParseResult<Vec<u8>> {
    if params.bits_per_component != 8 {
        return Err(ParseError::StreamDecodeError(
            "TIFF predictor supports only 8 bits per component".to_string(),
        ));
    }
    let (_, row_len) = params.row_geometry(data.len())?;
    for row in data.chunks_mut(row_len) {
        for i in params.colors..row.len() {
            row[i] = row[i].wrapping_add(row[i - params.colors]);
        }
    }
    Ok(data)
}

fn decode_png_predictor(data: &[u8], params: PredictorParams) -> ParseResult<Vec<u8>> {
    let (bpp, row_len) = params.row_geometry(data.len())?;

    let mut result = Vec::with_capacity(data.len());
    let mut previous = vec![0u8; row_len];

    for chunk in data.chunks(row_len + 1) {
        let filter_type = chunk[0];
        let mut row = chunk[1..].to_vec();
        row.resize(row_len, 0);

        for i in 0..row_len {
            let left = if i >= bpp { row[i - bpp] } else { 0 };
            let up = previous[i];
            let up_left = if i >= bpp { previous[i - bpp] } else { 0 };
            row[i] = match filter_type {
                0 => row[i],
                1 => row[i].wrapping_add(left),
                2 => row[i].wrapping_add(up),
                3 => row[i].wrapping_add(((u16::from(left) + u16::from(up)) / 2) as u8),
                4 => row[i].wrapping_add(paeth(left, up, up_left)),
                other => {
                    return Err(ParseError::StreamDecodeError(format!(
                        "Invalid PNG filter type {other}"
                    )))
                }
            };
        }

        result.extend_from_slice(&row);
        previous = row;
    }

    Ok(result)
}

fn paeth(a: u8, b: u8, c: u8) -> u8 {
    let p = i16::from(a) + i16::from(b) - i16::from(c);
    let pa = (p - i16::from(a)).abs();
    let pb = (p - i16::from(b)).abs();
    let pc = (p - i16::from(c)).abs();
    if pa <= pb && pa <= pc {
        a
    } else if pb <= pc {
        b
    } else {
        c
    }
}

/// Decode ASCIIHexDecode data
fn decode_ascii_hex(data: &[u8]) -> ParseResult<Vec<u8>> {
    let mut result = Vec::new();
    let mut high: Option<u8> = None;

    for &ch in data {
        if ch == b'>' {
            break;
        }
        if super::lexer::is_whitespace(ch) {
            continue;
        }
        let value = hex_digit_value(ch).ok_or_else(|| {
            ParseError::StreamDecodeError(format!("Invalid hex digit: {}", ch as char))
        })?;
        match high.take() {
            Some(h) => result.push((h << 4) | value),
            None => high = Some(value),
        }
    }

    // Pad with 0 if odd number of digits
    if let Some(h) = high {
        result.push(h << 4);
    }

    Ok(result)
}

/// Get value of hex digit
fn hex_digit_value(ch: u8) -> Option<u8> {
    match ch {
        b'0'..=b'9' => Some(ch - b'0'),
        b'A'..=b'F' => Some(ch - b'A' + 10),
        b'a'..=b'f' => Some(ch - b'a' + 10),
        _ => None,
    }
}

fn ascii85_group_value(group: &[u8]) -> ParseResult<u32> {
    let value = group
        .iter()
        .fold(0u64, |acc, &ch| acc * 85 + u64::from(ch - b'!'));
    u32::try_from(value)
        .map_err(|_| ParseError::StreamDecodeError("ASCII85 group out of range".to_string()))
}

/// Decode ASCII85Decode data
fn decode_ascii85(data: &[u8]) -> ParseResult<Vec<u8>> {
    let mut result = Vec::new();
    let mut group = Vec::with_capacity(5);
    let mut body = data;

    // Skip optional <~ prefix
    let trimmed = body
        .iter()
        .position(|b| !super::lexer::is_whitespace(*b))
        .map_or(&body[..0], |i| &body[i..]);
    if trimmed.starts_with(b"<~") {
        body = &trimmed[2..];
    }

    let mut chars = body.iter().filter(|b| !super::lexer::is_whitespace(**b));
    while let Some(&c) = chars.next() {
        match c {
            b'~' => {
                // End marker ~>, anything after it is ignored
                break;
            }
            b'z' if group.is_empty() => {
                result.extend_from_slice(&[0, 0, 0, 0]);
            }
            b'!'..=b'u' => {
                group.push(c);
                if group.len() == 5 {
                    let value = ascii85_group_value(&group)?;
                    result.extend_from_slice(&value.to_be_bytes());
                    group.clear();
                }
            }
            _ => {
                return Err(ParseError::StreamDecodeError(format!(
                    "Invalid ASCII85 character: {}",
                    c as char
                )));
            }
        }
    }

    // Handle incomplete final group
    if !group.is_empty() {
        if group.len() == 1 {
            return Err(ParseError::StreamDecodeError(
                "ASCII85 final group has a single character".to_string(),
            ));
        }
        let original_len = group.len();
        group.resize(5, b'u');
        let value = ascii85_group_value(&group)?;
        result.extend_from_slice(&value.to_be_bytes()[..original_len - 1]);
    }

    Ok(result)
}

/// Decode RunLengthDecode data
fn decode_run_length(data: &[u8]) -> ParseResult<Vec<u8>> {
    let mut result = Vec::new();
    let mut i = 0;

    while i < data.len() {
        let length = data[i];
        i += 1;
        match length {
            128 => break,
            0..=127 => {
                let count = usize::from(length) + 1;
                let end = (i + count).min(data.len());
                result.extend_from_slice(&data[i..end]);
                i = end;
            }
            _ => {
                let byte = *data.get(i).ok_or_else(|| {
                    ParseError::StreamDecodeError("Truncated run-length data".to_string())
                })?;
                result.extend(std::iter::repeat(byte).take(257 - usize::from(length)));
                i += 1;
            }
        }
    }

    Ok(result)
}
