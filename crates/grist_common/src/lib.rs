//! Shared foundational types used across the grist build pipeline.
//!
//! This crate provides content hashing, output file types, pivot sets
//! (locale/theme/dpi dimensions), hierarchical section identifiers, and the
//! explicit outcome type activities return to the cache layer.

#![warn(missing_docs)]

pub mod file_type;
pub mod hash;
pub mod outcome;
pub mod pivot;
pub mod section_id;

pub use file_type::{FileType, ParseFileTypeError};
pub use hash::{ContentHash, HashBuilder, ParseHashError};
pub use outcome::{IssueCode, WorkIssue, WorkOutcome};
pub use pivot::PivotSet;
pub use section_id::SectionId;
