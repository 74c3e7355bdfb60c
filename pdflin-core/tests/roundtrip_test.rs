//! Rewrite round-trips: output reads back with the same pages and content

mod common;

use common::{page_content, sample_document};
use pdflin::writer::{write_document, write_file};
use pdflin::{Document, ParseOptions, PdfObject, PdfProcessor, WriteOptions};
use pretty_assertions::assert_eq;

fn page_contents(document: &mut Document) -> Vec<Vec<u8>> {
    let pages = document.page_ids();
    pages
        .into_iter()
        .map(|page| {
            let contents = document
                .resolve(page)
                .as_dict()
                .and_then(|dict| dict.get("Contents"))
                .and_then(PdfObject::as_reference)
                .expect("page has a content stream");
            document
                .resolve(contents)
                .as_stream()
                .expect("content is a stream")
                .decode()
                .expect("content decodes")
        })
        .collect()
}

#[test]
fn test_rewrite_keeps_pages_and_content() {
    let data = sample_document(4).build();
    let mut document = Document::load(data, &ParseOptions::default()).unwrap();
    let before = page_contents(&mut document);

    let bytes = write_document(&mut document, &WriteOptions::default()).unwrap();
    let mut reread = Document::load(bytes, &ParseOptions::strict()).unwrap();

    assert_eq!(reread.page_count(), 4);
    assert_eq!(page_contents(&mut reread), before);
    assert_eq!(before[2], page_content(2));
}

#[test]
fn test_xref_stream_rewrite_keeps_content() {
    let data = sample_document(3).build();
    let mut document = Document::load(data, &ParseOptions::default()).unwrap();
    let before = page_contents(&mut document);

    let options = WriteOptions::default().with_xref_stream(true);
    let bytes = write_document(&mut document, &options).unwrap();
    assert!(bytes.starts_with(b"%PDF-1.5"));

    let mut reread = Document::load(bytes, &ParseOptions::default()).unwrap();
    assert!(!reread.was_rebuilt());
    assert_eq!(page_contents(&mut reread), before);
}

#[test]
fn test_linearized_rewrite_keeps_content() {
    let data = sample_document(5).build();
    let mut document = Document::load(data, &ParseOptions::default()).unwrap();
    let before = page_contents(&mut document);

    let options = WriteOptions::default().with_linearize(true);
    let bytes = write_document(&mut document, &options).unwrap();

    let mut reread = Document::load(bytes, &ParseOptions::strict()).unwrap();
    assert!(reread.is_linearized());
    assert_eq!(page_contents(&mut reread), before);
}

#[test]
fn test_rewriting_a_rewrite_is_identical() {
    let data = sample_document(2).build();
    let options = WriteOptions::default().with_static_id(true);

    let mut document = Document::load(data, &ParseOptions::default()).unwrap();
    let first = write_document(&mut document, &options).unwrap();
    let mut reread = Document::load(first.clone(), &ParseOptions::default()).unwrap();
    let second = write_document(&mut reread, &options).unwrap();

    assert_eq!(first, second);
}

#[test]
fn test_file_round_trip_through_processor() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("in.pdf");
    let output = dir.path().join("out.pdf");
    write_file(&sample_document(3).build(), &input).unwrap();

    let mut processor = PdfProcessor::new();
    processor.read(&input).unwrap();
    processor.set_linearization(true);
    processor.init_write(&output).unwrap();
    processor.write().unwrap();
    assert!(!processor.has_pending_error());

    let mut written = Document::open(&output, &ParseOptions::default()).unwrap();
    assert!(written.is_linearized());
    assert_eq!(written.page_count(), 3);
}

#[test]
fn test_info_and_id_carried_over() {
    let id = "<00112233445566778899aabbccddeeff>";
    let data = sample_document(1)
        .trailer(&format!("/Root 1 0 R /Info 4 0 R /ID [{id} {id}]"))
        .build();
    let mut document = Document::load(data, &ParseOptions::default()).unwrap();
    let bytes = write_document(&mut document, &WriteOptions::default()).unwrap();

    let reread = Document::load(bytes, &ParseOptions::default()).unwrap();
    assert!(reread.trailer().info().is_some());
    let first_id = reread.trailer().first_id().unwrap();
    assert_eq!(
        first_id.as_bytes(),
        &[
            0x00, 0x11, 0x22, 0x33, 0x44, 0x55, 0x66, 0x77, 0x88, 0x99, 0xaa, 0xbb, 0xcc, 0xdd,
            0xee, 0xff
        ]
    );
}
