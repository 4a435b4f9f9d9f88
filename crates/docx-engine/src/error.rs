//! Error and warning types for the generation pipeline

use serde::Serialize;
use thiserror::Error;

/// Fatal pipeline errors
///
/// Any of these aborts the request; no partial document is ever produced.
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("No JSON data provided")]
    MissingPayload,

    #[error("Request body is not valid JSON: {0}")]
    MalformedJson(String),

    #[error("Invalid payload shape: {0}")]
    InvalidPayloadShape(String),

    #[error("Invalid template name '{name}': {reason}")]
    InvalidTemplateName { name: String, reason: String },

    #[error("Template not found: {0}")]
    TemplateNotFound(String),

    #[error("Render error: {0}")]
    RenderError(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Document package error: {0}")]
    Zip(#[from] zip::result::ZipError),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl PipelineError {
    pub(crate) fn invalid_name(name: impl Into<String>, reason: impl Into<String>) -> Self {
        PipelineError::InvalidTemplateName {
            name: name.into(),
            reason: reason.into(),
        }
    }
}

impl From<minijinja::Error> for PipelineError {
    fn from(err: minijinja::Error) -> Self {
        // Keep the whole source chain; minijinja nests the useful detail
        let mut message = err.to_string();
        let mut source = std::error::Error::source(&err);
        while let Some(cause) = source {
            message.push_str(": ");
            message.push_str(&cause.to_string());
            source = cause.source();
        }
        PipelineError::RenderError(message)
    }
}

/// Non-fatal degradations recorded while building a document
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PipelineWarning {
    /// A chat-completion wrapper could not be unwrapped; the outer element was used
    ChatCompletionUnwrap { reason: String },
    /// An image field could not be decoded; the field was replaced by the no-image marker
    ImageDecode { field: String, reason: String },
}

impl std::fmt::Display for PipelineWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PipelineWarning::ChatCompletionUnwrap { reason } => {
                write!(f, "chat-completion unwrap failed: {}", reason)
            }
            PipelineWarning::ImageDecode { field, reason } => {
                write!(f, "image field '{}' ignored: {}", field, reason)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_warning_display() {
        let warning = PipelineWarning::ImageDecode {
            field: "photo".to_string(),
            reason: "invalid base64".to_string(),
        };
        assert_eq!(
            warning.to_string(),
            "image field 'photo' ignored: invalid base64"
        );
    }

    #[test]
    fn test_invalid_name_message() {
        let err = PipelineError::invalid_name("a/b.docx", "contains a path separator");
        assert_eq!(
            err.to_string(),
            "Invalid template name 'a/b.docx': contains a path separator"
        );
    }
}
