//! The grist build pipeline.
//!
//! Every unit of work runs inside a cache section. A build produces one
//! `Everything.<Type>` section per file type, which wraps one section per
//! file set (`CssFileSet.<name>`, `JsFileSet.<name>`), which in turn wraps
//! the `Bundle` step. Localized variants are hashed and written to the
//! destination together with an output log per file type.

#![warn(missing_docs)]

pub mod build;
pub mod bundle;
pub mod context;
pub mod error;
pub mod file_set;
pub mod images;
pub mod inputs;
pub mod localize;

pub use build::{run_build, BuildReport, FileSetReport, FileTypeReport};
pub use context::{BuildContext, SectionRun, TOOL_VERSION};
pub use error::PipelineError;
