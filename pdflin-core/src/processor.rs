//! Stateful processing handle
//!
//! [`PdfProcessor`] sequences the usual steps (read an input, choose the
//! output form, set an output target, write) and keeps the most recent
//! failure in a drainable slot alongside a queue of warnings.
//!
//! ```no_run
//! use pdflin::PdfProcessor;
//!
//! let mut processor = PdfProcessor::new();
//! if processor.read("in.pdf").is_ok() {
//!     processor.set_linearization(true);
//!     let _ = processor.init_write("out.pdf");
//!     let _ = processor.write();
//! }
//! while let Some(detail) = processor.drain_last_error() {
//!     eprintln!("{detail}");
//! }
//! ```

use crate::document::Document;
use crate::error::{ErrorDetail, ErrorKind, PdfError};
use crate::linearization::{check, LinearizationReport};
use crate::parser::ParseOptions;
use crate::writer::{write_document, write_file, WriteOptions};
use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

type StepResult<T = ()> = std::result::Result<T, ErrorKind>;

#[derive(Debug, Clone, PartialEq, Eq)]
enum Output {
    File(PathBuf),
    Memory,
}

/// Handle owning one document and its output settings
#[derive(Debug, Default)]
pub struct PdfProcessor {
    document: Option<Document>,
    filename: Option<String>,
    parse_options: ParseOptions,
    write_options: WriteOptions,
    output: Option<Output>,
    buffer: Option<Vec<u8>>,
    last_error: Option<ErrorDetail>,
    warnings: VecDeque<String>,
}

impl PdfProcessor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Options used by subsequent reads
    pub fn set_parse_options(&mut self, options: ParseOptions) {
        self.parse_options = options;
    }

    /// Read and open a file
    pub fn read(&mut self, path: impl AsRef<Path>) -> StepResult {
        let path = path.as_ref();
        let name = path.display().to_string();
        match std::fs::read(path) {
            Ok(data) => self.read_memory(&name, data),
            Err(e) => {
                self.filename = Some(name);
                Err(self.fail(PdfError::Io(e)))
            }
        }
    }

    /// Open a document held in memory; `name` identifies it in errors
    pub fn read_memory(&mut self, name: &str, data: Vec<u8>) -> StepResult {
        self.filename = Some(name.to_string());
        self.document = None;
        self.buffer = None;

        match Document::load(data, &self.parse_options) {
            Ok(mut document) => {
                self.queue_warnings(&mut document);
                info!("Opened {}", name);
                self.document = Some(document);
                Ok(())
            }
            Err(e) => Err(self.fail(e)),
        }
    }

    pub fn set_linearization(&mut self, linearize: bool) {
        self.write_options.linearize = linearize;
    }

    pub fn set_write_options(&mut self, options: WriteOptions) {
        self.write_options = options;
    }

    pub fn write_options(&self) -> &WriteOptions {
        &self.write_options
    }

    /// Write to a file on the next [`write`](Self::write)
    pub fn init_write(&mut self, path: impl AsRef<Path>) -> StepResult {
        if self.document.is_none() {
            return Err(self.fail(PdfError::NoInput));
        }
        self.output = Some(Output::File(path.as_ref().to_path_buf()));
        Ok(())
    }

    /// Keep the output in memory; see [`get_buffer`](Self::get_buffer)
    pub fn init_write_memory(&mut self) -> StepResult {
        if self.document.is_none() {
            return Err(self.fail(PdfError::NoInput));
        }
        self.output = Some(Output::Memory);
        Ok(())
    }

    pub fn write(&mut self) -> StepResult {
        let Some(output) = self.output.clone() else {
            return Err(self.fail(PdfError::NoOutput));
        };
        let Some(document) = self.document.as_mut() else {
            return Err(self.fail(PdfError::NoInput));
        };

        let result = write_document(document, &self.write_options);
        let mut pending = document.take_warnings();
        self.warnings.extend(pending.drain(..));

        let bytes = match result {
            Ok(bytes) => bytes,
            Err(e) => return Err(self.fail(e)),
        };
        match output {
            Output::File(path) => {
                if let Err(e) = write_file(&bytes, &path) {
                    return Err(self.fail(e));
                }
                info!("Wrote {} ({} bytes)", path.display(), bytes.len());
            }
            Output::Memory => {
                debug!("Wrote {} bytes to memory", bytes.len());
                self.buffer = Some(bytes);
            }
        }
        Ok(())
    }

    /// Output of the last in-memory write
    pub fn get_buffer(&self) -> Option<&[u8]> {
        self.buffer.as_deref()
    }

    pub fn has_pending_error(&self) -> bool {
        self.last_error.is_some()
    }

    /// Take the most recent failure, leaving the slot empty
    pub fn drain_last_error(&mut self) -> Option<ErrorDetail> {
        self.last_error.take()
    }

    pub fn more_warnings(&self) -> bool {
        !self.warnings.is_empty()
    }

    pub fn next_warning(&mut self) -> Option<String> {
        self.warnings.pop_front()
    }

    /// Check the linearization data of the input as read
    pub fn check_linearization(&mut self) -> StepResult<LinearizationReport> {
        let report = self.document.as_ref().map(|document| check(document.data()));
        report.ok_or_else(|| self.fail(PdfError::NoInput))
    }

    pub fn document(&self) -> Option<&Document> {
        self.document.as_ref()
    }

    pub fn document_mut(&mut self) -> Option<&mut Document> {
        self.document.as_mut()
    }

    fn queue_warnings(&mut self, document: &mut Document) {
        self.warnings.extend(document.take_warnings());
    }

    /// Record `error` in the slot, replacing any earlier one
    fn fail(&mut self, error: PdfError) -> ErrorKind {
        let detail = ErrorDetail::from_error(&error, self.filename.as_deref());
        warn!("{}", detail);
        let kind = detail.kind;
        self.last_error = Some(detail);
        kind
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL: &[u8] = b"%PDF-1.4
1 0 obj
<< /Type /Catalog /Pages 2 0 R >>
endobj
2 0 obj
<< /Type /Pages /Kids [3 0 R] /Count 1 >>
endobj
3 0 obj
<< /Type /Page /Parent 2 0 R /MediaBox [0 0 200 200] >>
endobj
trailer
<< /Root 1 0 R >>
%%EOF
";

    #[test]
    fn test_write_before_read() {
        let mut processor = PdfProcessor::new();
        assert_eq!(processor.write(), Err(ErrorKind::NoOutput));
        assert_eq!(processor.init_write_memory(), Err(ErrorKind::NoInput));
        assert!(processor.has_pending_error());
        assert_eq!(
            processor.drain_last_error().map(|d| d.kind),
            Some(ErrorKind::NoInput)
        );
        assert!(!processor.has_pending_error());
        assert_eq!(processor.drain_last_error(), None);
    }

    #[test]
    fn test_rebuild_is_a_warning() {
        let mut processor = PdfProcessor::new();
        processor.read_memory("minimal.pdf", MINIMAL.to_vec()).unwrap();
        assert!(!processor.has_pending_error());
        assert!(processor.more_warnings());
        while processor.next_warning().is_some() {}
        assert!(!processor.more_warnings());
    }

    #[test]
    fn test_linearize_to_memory() {
        let mut processor = PdfProcessor::new();
        processor.read_memory("minimal.pdf", MINIMAL.to_vec()).unwrap();
        processor.set_linearization(true);
        processor.init_write_memory().unwrap();
        processor.write().unwrap();

        let output = processor.get_buffer().unwrap();
        assert!(check(output).is_ok());
        assert!(!processor.has_pending_error());
    }

    #[test]
    fn test_new_failure_replaces_slot() {
        let mut processor = PdfProcessor::new();
        let _ = processor.read_memory("a.pdf", b"not a pdf".to_vec());
        let _ = processor.write();
        let detail = processor.drain_last_error().unwrap();
        assert_eq!(detail.kind, ErrorKind::NoOutput);
        assert_eq!(detail.filename.as_deref(), Some("a.pdf"));
    }

    #[test]
    fn test_read_missing_file() {
        let mut processor = PdfProcessor::new();
        assert_eq!(processor.read("/nonexistent/in.pdf"), Err(ErrorKind::Io));
        let detail = processor.drain_last_error().unwrap();
        assert_eq!(detail.filename.as_deref(), Some("/nonexistent/in.pdf"));
    }

    #[test]
    fn test_check_linearization_of_plain_input() {
        let mut processor = PdfProcessor::new();
        processor.read_memory("minimal.pdf", MINIMAL.to_vec()).unwrap();
        let report = processor.check_linearization().unwrap();
        assert!(!report.linearized);
        assert!(!report.is_ok());
    }
}
