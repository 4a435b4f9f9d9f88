//! End-to-end document generation
//!
//! normalize payload -> resolve template -> build context -> render -> name

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::context::{build_context, ContextOptions};
use crate::error::PipelineError;
use crate::output::{derive_filename, FilenameOptions, GeneratedDocument, DOCX_CONTENT_TYPE};
use crate::payload::Payload;
use crate::render::render_document;
use crate::templates::{validate_template_name, TemplateDirectory, TemplateInfo};

/// Name of the template used when a payload does not pick one
pub const DEFAULT_TEMPLATE: &str = "CV_Template_Placeholders.docx";

/// Pipeline settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Directory holding the `.docx` templates
    pub templates_dir: PathBuf,
    pub default_template: String,
    #[serde(flatten)]
    pub context: ContextOptions,
    pub filename: FilenameOptions,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            templates_dir: PathBuf::from("templates"),
            default_template: DEFAULT_TEMPLATE.to_string(),
            context: ContextOptions::default(),
            filename: FilenameOptions::default(),
        }
    }
}

/// Immutable, shareable document generator
#[derive(Debug, Clone)]
pub struct DocumentPipeline {
    templates: TemplateDirectory,
    config: PipelineConfig,
}

impl DocumentPipeline {
    /// Create a pipeline, validating the configured default template name
    ///
    /// The default template does not have to exist yet; a request that needs
    /// it fails with [`PipelineError::TemplateNotFound`].
    pub fn new(config: PipelineConfig) -> Result<Self, PipelineError> {
        validate_template_name(&config.default_template)?;
        let templates =
            TemplateDirectory::new(config.templates_dir.clone(), config.default_template.clone());
        Ok(Self { templates, config })
    }

    pub fn template_directory(&self) -> &TemplateDirectory {
        &self.templates
    }

    /// Generate a document from a raw request body
    pub fn generate_from_slice(&self, body: &[u8]) -> Result<GeneratedDocument, PipelineError> {
        self.generate(Payload::from_slice(body)?)
    }

    /// Generate a document from a classified payload
    pub fn generate(&self, payload: Payload) -> Result<GeneratedDocument, PipelineError> {
        let normalized = payload.normalize()?;
        let mut warnings = normalized.warnings;

        let template = self.templates.resolve(&normalized.mapping)?;
        debug!("Resolved template {}", template.path.display());
        let template_bytes = self.templates.load(&template)?;

        let built = build_context(normalized.mapping, &self.config.context);
        warnings.extend(built.warnings);

        let bytes = render_document(&template_bytes, &built.context)?;
        let filename = derive_filename(&built.context, &template, &self.config.filename);

        info!(
            "Generated {} from {} ({} bytes, {} warnings)",
            filename,
            template.name,
            bytes.len(),
            warnings.len()
        );

        Ok(GeneratedDocument {
            bytes,
            filename,
            content_type: DOCX_CONTENT_TYPE,
            template: template.name,
            warnings,
        })
    }

    /// Templates available in the configured directory
    pub fn templates(&self) -> Result<Vec<TemplateInfo>, PipelineError> {
        self.templates.list()
    }
}
