//! Command-line arguments and pipeline configuration
//!
//! Settings come from three places, later ones winning:
//! 1. built-in defaults
//! 2. an optional TOML file (`--config`)
//! 3. command-line flags and `DOCGEN_*` environment variables

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::Parser;
use docx_engine::PipelineConfig;

/// Default request body limit (base64 images make bodies large)
pub const DEFAULT_BODY_LIMIT: usize = 20 * 1024 * 1024;

/// Command-line arguments for the docgen server
#[derive(Parser, Debug)]
#[command(name = "docgen-server")]
#[command(about = "Fill Word templates from JSON payloads over HTTP")]
pub struct Args {
    /// Port to listen on
    #[arg(short, long, env = "DOCGEN_PORT", default_value = "5000")]
    pub port: u16,

    /// Host address to bind to
    #[arg(long, env = "DOCGEN_HOST", default_value = "0.0.0.0")]
    pub host: String,

    /// TOML file with pipeline settings
    #[arg(short, long, env = "DOCGEN_CONFIG")]
    pub config: Option<PathBuf>,

    /// Directory holding the .docx templates
    #[arg(long, env = "DOCGEN_TEMPLATES_DIR")]
    pub templates_dir: Option<PathBuf>,

    /// Template used when a payload has no template_name
    #[arg(long, env = "DOCGEN_DEFAULT_TEMPLATE")]
    pub default_template: Option<String>,

    /// Nested objects merged into the top level (comma-separated)
    #[arg(long, env = "DOCGEN_NESTED_KEYS", value_delimiter = ',')]
    pub nested_keys: Option<Vec<String>>,

    /// Fields holding base64 images (comma-separated)
    #[arg(long, env = "DOCGEN_IMAGE_FIELDS", value_delimiter = ',')]
    pub image_fields: Option<Vec<String>>,

    /// Display width of inline images in millimetres
    #[arg(long, env = "DOCGEN_IMAGE_WIDTH_MM")]
    pub image_width_mm: Option<f64>,

    /// Render timeout in milliseconds
    #[arg(long, env = "DOCGEN_TIMEOUT_MS", default_value = "10000")]
    pub timeout_ms: u64,

    /// Rate limit: requests per second per IP
    #[arg(long, env = "DOCGEN_RATE_LIMIT", default_value = "10")]
    pub rate_limit: u32,

    /// Maximum request body size in bytes
    #[arg(long, env = "DOCGEN_BODY_LIMIT", default_value_t = DEFAULT_BODY_LIMIT)]
    pub body_limit: usize,

    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,
}

impl Args {
    /// Build the pipeline configuration from the config file and flags
    pub fn pipeline_config(&self) -> anyhow::Result<PipelineConfig> {
        let mut config = match &self.config {
            Some(path) => load_config_file(path)?,
            None => PipelineConfig::default(),
        };

        if let Some(dir) = &self.templates_dir {
            config.templates_dir = dir.clone();
        }
        if let Some(name) = &self.default_template {
            config.default_template = name.clone();
        }
        if let Some(keys) = &self.nested_keys {
            config.context.nested_keys = keys.clone();
        }
        if let Some(fields) = &self.image_fields {
            config.context.image_fields = fields.clone();
        }
        if let Some(width) = self.image_width_mm {
            anyhow::ensure!(width > 0.0, "Image width must be positive, got {}", width);
            config.context.image_width_mm = width;
        }

        Ok(config)
    }
}

/// Load pipeline settings from a TOML file
pub fn load_config_file(path: &Path) -> anyhow::Result<PipelineConfig> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;
    parse_config(&content).with_context(|| format!("Invalid config file: {}", path.display()))
}

/// Parse pipeline settings from TOML text
pub fn parse_config(s: &str) -> anyhow::Result<PipelineConfig> {
    let config: PipelineConfig = toml::from_str(s)?;
    Ok(config)
}
