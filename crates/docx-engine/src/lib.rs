//! JSON to Word document generation engine
//!
//! This crate turns a JSON payload into a filled-in `.docx` file:
//! - Payload normalization (plain objects, wrapped lists, chat-completion envelopes)
//! - Template lookup in a read-only directory
//! - Context building (nested personal data, inline images)
//! - Template rendering with Jinja-style tags inside Word XML
//!
//! # Feature Flags
//!
//! - `test-fixtures`: In-memory docx and image builders for tests

pub mod context;
pub mod error;
pub mod output;
pub mod payload;
pub mod pipeline;
pub mod render;
pub mod templates;

#[cfg(any(test, feature = "test-fixtures"))]
pub mod fixtures;

pub use context::{build_context, BuiltContext, ContextOptions, RenderContext};
pub use error::{PipelineError, PipelineWarning};
pub use output::{derive_filename, FilenameOptions, GeneratedDocument, DOCX_CONTENT_TYPE};
pub use payload::{Mapping, NormalizedPayload, Payload};
pub use pipeline::{DocumentPipeline, PipelineConfig, DEFAULT_TEMPLATE};
pub use render::render_document;
pub use templates::{TemplateDirectory, TemplateInfo, TemplateRef};
