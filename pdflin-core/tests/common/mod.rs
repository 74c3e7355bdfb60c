//! Test PDF builder
//!
//! Produces small PDF files with real byte offsets in their cross-reference
//! tables, plus helpers for damaging them.

#![allow(dead_code)]

use std::collections::BTreeMap;

pub struct PdfBuilder {
    version: &'static str,
    objects: Vec<(u32, Vec<u8>)>,
    trailer: String,
}

impl Default for PdfBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl PdfBuilder {
    pub fn new() -> Self {
        Self {
            version: "1.4",
            objects: Vec::new(),
            trailer: "/Root 1 0 R".to_string(),
        }
    }

    pub fn version(mut self, version: &'static str) -> Self {
        self.version = version;
        self
    }

    pub fn object(mut self, number: u32, body: &str) -> Self {
        self.objects.push((number, body.as_bytes().to_vec()));
        self
    }

    /// Stream object with a direct `/Length`
    pub fn stream(mut self, number: u32, extra: &str, data: &[u8]) -> Self {
        let mut body = format!("<< /Length {} {extra} >>\nstream\n", data.len()).into_bytes();
        body.extend_from_slice(data);
        body.extend_from_slice(b"\nendstream");
        self.objects.push((number, body));
        self
    }

    /// Entries added to the trailer besides `/Size`
    pub fn trailer(mut self, entries: &str) -> Self {
        self.trailer = entries.to_string();
        self
    }

    fn body(&self) -> (Vec<u8>, BTreeMap<u32, usize>) {
        let mut out = format!("%PDF-{}\n", self.version).into_bytes();
        out.extend_from_slice(&[b'%', 0xE2, 0xE3, 0xCF, 0xD3, b'\n']);
        let mut offsets = BTreeMap::new();
        for (number, body) in &self.objects {
            offsets.insert(*number, out.len());
            out.extend_from_slice(format!("{number} 0 obj\n").as_bytes());
            out.extend_from_slice(body);
            out.extend_from_slice(b"\nendobj\n");
        }
        (out, offsets)
    }

    /// Complete file with a classic cross-reference table
    pub fn build(&self) -> Vec<u8> {
        let (mut out, offsets) = self.body();
        let size = offsets.keys().max().copied().unwrap_or(0) + 1;
        let xref = out.len();
        out.extend_from_slice(format!("xref\n0 {size}\n").as_bytes());
        for number in 0..size {
            let line = match offsets.get(&number) {
                Some(offset) => format!("{offset:010} 00000 n \n"),
                None => "0000000000 65535 f \n".to_string(),
            };
            out.extend_from_slice(line.as_bytes());
        }
        out.extend_from_slice(
            format!(
                "trailer\n<< /Size {size} {} >>\nstartxref\n{xref}\n%%EOF\n",
                self.trailer
            )
            .as_bytes(),
        );
        out
    }

    /// Objects and a trailer, but `startxref` points at `startxref`
    pub fn build_with_startxref(&self, startxref: u64) -> Vec<u8> {
        let (mut out, offsets) = self.body();
        let size = offsets.keys().max().copied().unwrap_or(0) + 1;
        out.extend_from_slice(
            format!(
                "trailer\n<< /Size {size} {} >>\nstartxref\n{startxref}\n%%EOF\n",
                self.trailer
            )
            .as_bytes(),
        );
        out
    }

    /// Objects only, no cross-reference data or trailer at all
    pub fn build_bare(&self) -> Vec<u8> {
        let (mut out, _) = self.body();
        out.extend_from_slice(b"%%EOF\n");
        out
    }
}

/// Content stream of page `index`
pub fn page_content(index: usize) -> Vec<u8> {
    format!("BT /F1 12 Tf 72 720 Td (Page {}) Tj ET", index + 1).into_bytes()
}

/// A document with `pages` pages. Every page uses the shared font (3) and
/// has its own content stream; pages after the first also share an image
/// placeholder (5). Page `i` is object `10 + 2i`, its content `11 + 2i`.
pub fn sample_document(pages: usize) -> PdfBuilder {
    let kids: Vec<String> = (0..pages).map(|i| format!("{} 0 R", 10 + 2 * i)).collect();
    let mut builder = PdfBuilder::new()
        .trailer("/Root 1 0 R /Info 4 0 R")
        .object(1, "<< /Type /Catalog /Pages 2 0 R >>")
        .object(
            2,
            &format!(
                "<< /Type /Pages /Kids [{}] /Count {pages} /MediaBox [0 0 612 792] >>",
                kids.join(" ")
            ),
        )
        .object(3, "<< /Type /Font /Subtype /Type1 /BaseFont /Helvetica >>")
        .object(4, "<< /Title (Sample) /Producer (pdflin tests) >>")
        .stream(5, "/Type /XObject /Subtype /Form /BBox [0 0 10 10]", b"0 0 10 10 re f");

    for i in 0..pages {
        let page = 10 + 2 * i as u32;
        let xobject = if i > 0 { " /XObject << /X1 5 0 R >>" } else { "" };
        builder = builder
            .object(
                page,
                &format!(
                    "<< /Type /Page /Parent 2 0 R /Contents {} 0 R /Resources << /Font << /F1 3 0 R >>{xobject} >> >>",
                    page + 1
                ),
            )
            .stream(page + 1, "", &page_content(i));
    }
    builder
}
