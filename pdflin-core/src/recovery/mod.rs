//! PDF structure recovery
//!
//! When a file's cross-reference data is missing or wrong, the table is
//! rebuilt by scanning the whole buffer for `N G obj` headers.
//!
//! # Example
//!
//! ```rust
//! use pdflin::parser::ParseOptions;
//! use pdflin::recovery::XRefRecovery;
//!
//! let data = b"%PDF-1.4\n1 0 obj\n<< /Type /Catalog >>\nendobj\n";
//! let recovered = XRefRecovery::new(data, &ParseOptions::default()).rebuild().unwrap();
//! assert_eq!(recovered.stats.objects_found, 1);
//! assert_eq!(recovered.trailer.root().unwrap().number(), 1);
//! ```

pub mod xref_recovery;

pub use xref_recovery::{needs_xref_recovery, RecoveredXRef, RecoveryStats, XRefRecovery};
