//! # pdflin
//!
//! A pure Rust engine for reading, repairing, rewriting and linearizing PDF
//! files.
//!
//! ## Features
//!
//! - **Lenient parsing**: tokenizer and object parser that tolerate the
//!   common ways real files break the syntax
//! - **Cross-reference recovery**: follows `/Prev` chains, hybrid files and
//!   xref streams, and rebuilds the table by scanning when it is unusable
//! - **Rewriting**: straight rewrites with a classic xref table or a
//!   cross-reference stream
//! - **Linearization**: "fast web view" output with page offset and shared
//!   object hint tables, plus a checker for linearized files
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use pdflin::PdfProcessor;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let mut processor = PdfProcessor::new();
//! processor.read("input.pdf")?;
//! processor.set_linearization(true);
//! processor.init_write("output.pdf")?;
//! processor.write()?;
//!
//! if let Some(error) = processor.drain_last_error() {
//!     eprintln!("{error}");
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ## Lower-level use
//!
//! ```rust,no_run
//! use pdflin::parser::ParseOptions;
//! use pdflin::{linearization, writer, Document, WriteOptions};
//!
//! # fn main() -> pdflin::Result<()> {
//! let mut document = Document::open("input.pdf", &ParseOptions::default())?;
//! println!("{} pages, PDF {}", document.page_count(), document.version());
//!
//! let options = WriteOptions::default().with_linearize(true);
//! let bytes = writer::write_document(&mut document, &options)?;
//! let report = linearization::check(&bytes);
//! assert!(report.is_ok());
//! # Ok(())
//! # }
//! ```

pub mod compression;
pub mod document;
pub mod error;
pub mod linearization;
pub mod parser;
pub mod processor;
pub mod recovery;
pub mod writer;

pub use document::Document;
pub use error::{ErrorDetail, ErrorKind, PdfError, Result};
pub use linearization::{LinearizationPlan, LinearizationReport};
pub use parser::{
    ObjectId, ParseOptions, PdfArray, PdfDictionary, PdfName, PdfObject, PdfStream, PdfString,
};
pub use processor::PdfProcessor;
pub use writer::{WriteError, WriteOptions};

/// Current version of pdflin
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Version string of the library
pub fn version() -> &'static str {
    VERSION
}
