//! Linearization ("fast web view") support
//!
//! - [`plan`] partitions a document into first-page, later-page, shared and
//!   other parts and renumbers its objects
//! - [`hint`] encodes and decodes the page offset and shared object hint
//!   tables
//! - [`check`] verifies the linearization data of an existing file
//!
//! Writing a linearized file is done by [`crate::writer::write_document`]
//! with [`WriteOptions::linearize`](crate::WriteOptions) set.

pub mod check;
pub mod hint;
pub mod plan;

pub use check::{check, is_linearized, LinearizationParameters, LinearizationReport};
pub use hint::{HintStream, PageOffsetEntry, PageOffsetTable, SharedObjectEntry, SharedObjectTable};
pub use plan::{plan, LinearizationPlan, PagePart};
