//! Property-based tests for parser robustness
//!
//! Arbitrary and mutated input must produce errors or documents, never
//! panics, runaway recursion or allocations sized by untrusted counts.

mod common;

use common::sample_document;
use pdflin::linearization::check;
use pdflin::linearization::hint::{decode_hint_stream, BitWriter};
use pdflin::parser::filters::decode_stream;
use pdflin::parser::xref_stream::XRefStream;
use pdflin::parser::{
    Lexer, ObjectParser, PdfArray, PdfDictionary, PdfName, PdfObject, PdfStream, Token,
};
use pdflin::writer::write_document;
use pdflin::{Document, ParseOptions, WriteOptions};
use proptest::prelude::*;

fn integers(values: &[i64]) -> PdfObject {
    PdfObject::Array(PdfArray(values.iter().map(|v| PdfObject::Integer(*v)).collect()))
}

fn flate(data: &[u8]) -> Vec<u8> {
    use flate2::write::ZlibEncoder;
    use flate2::Compression;
    use std::io::Write;

    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(data).unwrap();
    encoder.finish().unwrap()
}

// Integers biased towards the edges of the i64 range
fn hostile_integer() -> impl Strategy<Value = i64> {
    prop_oneof![
        -4i64..64,
        Just(i64::MAX),
        Just(i64::MIN),
        Just(i64::from(u32::MAX)),
        any::<i64>(),
    ]
}

// Strategy for generating PDF-ish token soup
fn token_soup_strategy() -> impl Strategy<Value = String> {
    prop::collection::vec(
        prop_oneof![
            "[0-9]{1,4}".prop_map(|s| s),
            "-?[0-9]{0,3}\\.[0-9]{0,3}".prop_map(|s| s),
            "[a-zA-Z][a-zA-Z0-9]{0,8}".prop_map(|s| format!("/{s}")),
            "[a-zA-Z0-9 ]{0,12}".prop_map(|s| format!("({s})")),
            "[0-9A-Fa-f]{0,12}".prop_map(|s| format!("<{s}>")),
            Just("<<".to_string()),
            Just(">>".to_string()),
            Just("[".to_string()),
            Just("]".to_string()),
            Just("R".to_string()),
            Just("obj".to_string()),
            Just("endobj".to_string()),
            Just("stream\n".to_string()),
            Just("endstream".to_string()),
            Just("% comment\n".to_string()),
        ],
        0..40,
    )
    .prop_map(|tokens| tokens.join(" "))
}

proptest! {
    #[test]
    fn test_lexer_never_panics(data in prop::collection::vec(any::<u8>(), 0..512)) {
        let options = ParseOptions::default();
        let mut lexer = Lexer::new_with_options(&data, &options);
        // Every token consumes at least one byte, so this terminates
        for _ in 0..=data.len() {
            match lexer.next_token() {
                Ok(Token::Eof) => break,
                Ok(_) => {}
                Err(_) => {
                    if !lexer.resync_after() {
                        break;
                    }
                }
            }
        }
    }

    #[test]
    fn test_object_parser_handles_token_soup(soup in token_soup_strategy()) {
        for options in [ParseOptions::strict(), ParseOptions::lenient()] {
            let mut parser = ObjectParser::new(soup.as_bytes(), &options);
            let _ = parser.parse_object();
            let mut parser = ObjectParser::new(soup.as_bytes(), &options);
            let _ = parser.parse_indirect_object();
        }
    }

    #[test]
    fn test_deep_nesting_is_an_error(depth in 200usize..2000) {
        let data = "[".repeat(depth) + &"]".repeat(depth);
        let options = ParseOptions::default().with_max_recursion_depth(100);
        let mut parser = ObjectParser::new(data.as_bytes(), &options);
        prop_assert!(parser.parse_object().is_err());
    }

    #[test]
    fn test_load_arbitrary_bytes(tail in prop::collection::vec(any::<u8>(), 0..1024)) {
        let mut data = b"%PDF-1.4\n".to_vec();
        data.extend_from_slice(&tail);
        let _ = Document::load(data, &ParseOptions::default());
    }

    #[test]
    fn test_corrupted_file_loads_or_fails_cleanly(
        position in 0usize..2000,
        byte in any::<u8>(),
        cut in any::<bool>(),
    ) {
        let mut data = sample_document(2).build();
        let position = position % data.len();
        if cut {
            data.truncate(position.max(10));
        } else {
            data[position] = byte;
        }

        if let Ok(mut document) = Document::load(data, &ParseOptions::default()) {
            let _ = document.page_count();
            let _ = write_document(&mut document, &WriteOptions::default());
            let _ = write_document(&mut document, &WriteOptions::default().with_linearize(true));
        }
    }

    #[test]
    fn test_predictor_params_never_panic(
        predictor in prop_oneof![Just(2i64), 10i64..16, hostile_integer()],
        colors in hostile_integer(),
        bits in hostile_integer(),
        columns in hostile_integer(),
        body in prop::collection::vec(any::<u8>(), 0..256),
    ) {
        let mut parms = PdfDictionary::new();
        parms.insert("Predictor", PdfObject::Integer(predictor));
        parms.insert("Colors", PdfObject::Integer(colors));
        parms.insert("BitsPerComponent", PdfObject::Integer(bits));
        parms.insert("Columns", PdfObject::Integer(columns));
        let mut dict = PdfDictionary::new();
        dict.insert("Filter", PdfObject::Name(PdfName::from("FlateDecode")));
        dict.insert("DecodeParms", PdfObject::Dictionary(parms));

        if let Ok(decoded) = decode_stream(&flate(&body), &dict) {
            // Rows are never longer than the data they came from
            prop_assert!(decoded.len() <= body.len().max(1) * 2);
        }
    }

    #[test]
    fn test_filter_chains_never_panic(
        names in prop::collection::vec(
            prop_oneof![
                Just("FlateDecode"),
                Just("ASCIIHexDecode"),
                Just("ASCII85Decode"),
                Just("RunLengthDecode"),
                Just("AHx"),
                Just("LZWDecode"),
            ],
            0..4,
        ),
        body in prop::collection::vec(any::<u8>(), 0..256),
    ) {
        let mut dict = PdfDictionary::new();
        dict.insert(
            "Filter",
            PdfObject::Array(PdfArray(
                names.into_iter().map(|n| PdfObject::Name(PdfName::from(n))).collect(),
            )),
        );
        let _ = decode_stream(&body, &dict);
    }

    #[test]
    fn test_xref_stream_widths_and_index_bounded(
        widths in prop::collection::vec(-2i64..12, 3),
        index in prop::collection::vec(hostile_integer(), 0..6),
        body in prop::collection::vec(any::<u8>(), 0..64),
    ) {
        let mut dict = PdfDictionary::new();
        dict.insert("Type", PdfObject::Name(PdfName::from("XRef")));
        dict.insert("Size", PdfObject::Integer(16));
        dict.insert("W", integers(&widths));
        dict.insert("Index", integers(&index));
        let stream = PdfStream::new(dict, body.clone());

        if let Ok(xref) = XRefStream::parse(&stream, &ParseOptions::default()) {
            let entry_len: usize = xref.widths.iter().sum();
            // Every entry is backed by stream bytes
            prop_assert!(entry_len > 0 || xref.table.is_empty());
            prop_assert!(xref.table.len() * entry_len <= body.len());
        }
    }

    #[test]
    fn test_hint_tables_reject_bogus_row_counts(
        header in prop::collection::vec(any::<u8>(), 0..96),
        shared_offset in 0usize..128,
        pages in prop_oneof![
            0usize..8,
            Just(4_000_000_000usize),
            any::<u32>().prop_map(|p| p as usize),
        ],
    ) {
        let _ = decode_hint_stream(&header, shared_offset, pages);
    }

    #[test]
    fn test_check_with_hostile_page_count(
        pages in prop_oneof![1u64..4, Just(4_000_000_000u64), Just(u64::from(u32::MAX))],
        shared in 0u64..200,
        widths in prop::collection::vec(0u64..70, 4),
    ) {
        // Page offset table header: large least values, chosen field widths
        let mut hint = BitWriter::new();
        hint.write_bits(u64::from(u32::MAX), 32);
        hint.write_bits(0, 32);
        for (i, width) in widths.iter().enumerate() {
            hint.write_bits(*width, 16);
            if i < 3 {
                hint.write_bits(u64::from(u32::MAX) - i as u64, 32);
            }
        }
        for _ in 0..4 {
            hint.write_bits(0, 16);
        }
        let mut hint = hint.finish();
        hint.resize(64, 0xFF);

        let mut data = b"%PDF-1.5\n".to_vec();
        let dict = format!(
            "1 0 obj\n<< /Linearized 1 /L 1000 /H [ 200 120 ] /O 3 /E 500 /N {pages} /T 900 >>\nendobj\n"
        );
        data.extend_from_slice(dict.as_bytes());
        data.resize(200, b' ');
        let hint_header = format!("2 0 obj\n<< /Length 64 /S {shared} >>\nstream\n");
        data.extend_from_slice(hint_header.as_bytes());
        data.extend_from_slice(&hint);
        data.extend_from_slice(b"\nendstream\nendobj\n");
        data.extend_from_slice(b"3 0 obj\n<< /Type /Page /Parent 4 0 R >>\nendobj\n");
        data.extend_from_slice(b"4 0 obj\n<< /Type /Pages /Kids [3 0 R] /Count 1 >>\nendobj\n");
        data.extend_from_slice(b"5 0 obj\n<< /Type /Catalog /Pages 4 0 R >>\nendobj\n");

        let report = check(&data);
        prop_assert!(report.linearized);
        prop_assert!(!report.is_ok());
    }
}
