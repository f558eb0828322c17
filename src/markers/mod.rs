//! Annotation marker discovery.
//!
//! This module handles:
//! - Scanning a source snapshot for inline sidenote tags
//! - Scanning footnote references and their definition blocks
//! - Numbering markers, optionally per heading section

mod scanner;
mod types;

pub use scanner::{ScanOptions, scan};
pub use types::{FootnoteDefinition, Marker, MarkerIndex, MarkerKind, Section};
