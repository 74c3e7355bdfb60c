//! Object serialization
//!
//! Dictionary keys are written in sorted order so output is reproducible.
//! References are passed through a mapping; a reference the mapping rejects
//! is written as `null`.

use crate::parser::lexer::{is_delimiter, is_whitespace};
use crate::parser::objects::{ObjectId, PdfDictionary, PdfName, PdfObject, PdfStream, PdfString};
use std::io::{self, Write};

/// Maps an original reference to the one written, or `None` for `null`
pub trait ReferenceMap {
    fn map(&self, id: ObjectId) -> Option<ObjectId>;
}

impl<F> ReferenceMap for F
where
    F: Fn(ObjectId) -> Option<ObjectId>,
{
    fn map(&self, id: ObjectId) -> Option<ObjectId> {
        self(id)
    }
}

/// Serialize `N G obj ... endobj` followed by a newline
pub fn write_indirect<W: Write>(
    writer: &mut W,
    id: ObjectId,
    object: &PdfObject,
    refs: &dyn ReferenceMap,
) -> io::Result<()> {
    writeln!(writer, "{} {} obj", id.number(), id.generation())?;
    write_value(writer, object, refs)?;
    writer.write_all(b"\nendobj\n")
}

/// Serialize a direct value
pub fn write_value<W: Write>(
    writer: &mut W,
    object: &PdfObject,
    refs: &dyn ReferenceMap,
) -> io::Result<()> {
    match object {
        PdfObject::Null => writer.write_all(b"null"),
        PdfObject::Boolean(b) => writer.write_all(if *b { b"true" } else { b"false" }),
        PdfObject::Integer(i) => write!(writer, "{i}"),
        PdfObject::Real(f) => writer.write_all(format_real(*f).as_bytes()),
        PdfObject::String(s) => write_string(writer, s),
        PdfObject::Name(n) => write_name(writer, n),
        PdfObject::Array(array) => {
            writer.write_all(b"[")?;
            for (i, item) in array.iter().enumerate() {
                if i > 0 {
                    writer.write_all(b" ")?;
                }
                write_value(writer, item, refs)?;
            }
            writer.write_all(b"]")
        }
        PdfObject::Dictionary(dict) => write_dictionary(writer, dict, refs),
        PdfObject::Stream(stream) => write_stream(writer, stream, refs),
        PdfObject::Reference(id) => match refs.map(*id) {
            Some(mapped) => write!(writer, "{} {} R", mapped.number(), mapped.generation()),
            None => writer.write_all(b"null"),
        },
    }
}

pub fn write_dictionary<W: Write>(
    writer: &mut W,
    dict: &PdfDictionary,
    refs: &dyn ReferenceMap,
) -> io::Result<()> {
    writer.write_all(b"<<")?;
    for (key, value) in dict.sorted_entries() {
        writer.write_all(b" ")?;
        write_name(writer, key)?;
        writer.write_all(b" ")?;
        write_value(writer, value, refs)?;
    }
    writer.write_all(b" >>")
}

/// Stream data is written as stored; `/Length` always states its size
fn write_stream<W: Write>(
    writer: &mut W,
    stream: &PdfStream,
    refs: &dyn ReferenceMap,
) -> io::Result<()> {
    let mut dict = stream.dict.clone();
    dict.insert("Length", PdfObject::Integer(stream.data.len() as i64));
    write_dictionary(writer, &dict, refs)?;
    writer.write_all(b"\nstream\n")?;
    writer.write_all(&stream.data)?;
    writer.write_all(b"\nendstream")
}

pub fn write_name<W: Write>(writer: &mut W, name: &PdfName) -> io::Result<()> {
    writer.write_all(b"/")?;
    for &byte in name.as_bytes() {
        if byte == b'#' || !(b'!'..=b'~').contains(&byte) || is_delimiter(byte) {
            write!(writer, "#{byte:02X}")?;
        } else {
            writer.write_all(&[byte])?;
        }
    }
    Ok(())
}

/// Literal form for text, hex form for binary data
pub fn write_string<W: Write>(writer: &mut W, string: &PdfString) -> io::Result<()> {
    let bytes = string.as_bytes();
    let is_text = bytes
        .iter()
        .all(|b| (0x20..0x7f).contains(b) || is_whitespace(*b) || *b == 0x08);
    if !is_text {
        writer.write_all(b"<")?;
        for byte in bytes {
            write!(writer, "{byte:02x}")?;
        }
        return writer.write_all(b">");
    }

    writer.write_all(b"(")?;
    for &byte in bytes {
        match byte {
            b'(' => writer.write_all(b"\\(")?,
            b')' => writer.write_all(b"\\)")?,
            b'\\' => writer.write_all(b"\\\\")?,
            b'\n' => writer.write_all(b"\\n")?,
            b'\r' => writer.write_all(b"\\r")?,
            b'\t' => writer.write_all(b"\\t")?,
            0x08 => writer.write_all(b"\\b")?,
            0x0c => writer.write_all(b"\\f")?,
            0x00 => writer.write_all(b"\\000")?,
            _ => writer.write_all(&[byte])?,
        }
    }
    writer.write_all(b")")
}

/// Shortest decimal form that reads back as the same value
pub fn format_real(value: f64) -> String {
    if !value.is_finite() {
        return "0".to_string();
    }
    // Display never uses an exponent and keeps the shortest exact digits
    let text = format!("{value}");
    if text == "-0" {
        "0".to_string()
    } else {
        text
    }
}

/// Serialize a value into a fresh buffer
pub fn to_bytes(object: &PdfObject, refs: &dyn ReferenceMap) -> Vec<u8> {
    let mut out = Vec::new();
    // Writing into a Vec cannot fail
    let _ = write_value(&mut out, object, refs);
    out
}
