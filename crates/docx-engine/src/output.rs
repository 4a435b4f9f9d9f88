//! Generated document and download filename

use serde::{Deserialize, Serialize};

use crate::context::RenderContext;
use crate::error::PipelineWarning;
use crate::templates::TemplateRef;

/// MIME type of every generated document
pub const DOCX_CONTENT_TYPE: &str =
    "application/vnd.openxmlformats-officedocument.wordprocessingml.document";

/// How the download filename is derived
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FilenameOptions {
    /// Context fields tried in order; the first non-empty string wins
    pub fields: Vec<String>,
    /// Appended to the sanitized field value
    pub suffix: String,
}

impl Default for FilenameOptions {
    fn default() -> Self {
        Self {
            fields: ["name", "naam", "full_name", "functie", "role"]
                .into_iter()
                .map(String::from)
                .collect(),
            suffix: "_CV.docx".to_string(),
        }
    }
}

/// A rendered document ready to be sent
#[derive(Debug, Clone)]
pub struct GeneratedDocument {
    pub bytes: Vec<u8>,
    pub filename: String,
    pub content_type: &'static str,
    /// Template the document was rendered from
    pub template: String,
    pub warnings: Vec<PipelineWarning>,
}

/// Pick the download filename for a rendered context
pub fn derive_filename(
    context: &RenderContext,
    template: &TemplateRef,
    options: &FilenameOptions,
) -> String {
    options
        .fields
        .iter()
        .filter_map(|field| context.get_str(field))
        .map(sanitize)
        .find(|name| !name.is_empty())
        .map(|name| format!("{}{}", name, options.suffix))
        .unwrap_or_else(|| fallback_filename(template))
}

fn fallback_filename(template: &TemplateRef) -> String {
    let stem = sanitize(template.stem());
    let stem = if stem.is_empty() { "document".to_string() } else { stem };
    format!("Generated_{}.docx", stem)
}

/// Reduce text to a header-safe file name
///
/// Whitespace runs become a single `_`; anything outside `[A-Za-z0-9._-]`
/// is dropped. Leading dots are removed so the name is never hidden.
fn sanitize(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for word in raw.split_whitespace() {
        if !out.is_empty() {
            out.push('_');
        }
        out.extend(
            word.chars()
                .filter(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-')),
        );
    }
    out.trim_start_matches(['.', '_']).trim_end_matches('_').to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::ContextValue;
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;
    use serde_json::{json, Value};
    use std::path::PathBuf;

    fn template() -> TemplateRef {
        TemplateRef {
            name: "CV_Template_Placeholders.docx".to_string(),
            path: PathBuf::from("templates/CV_Template_Placeholders.docx"),
        }
    }

    fn context(pairs: &[(&str, Value)]) -> RenderContext {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), ContextValue::Json(v.clone())))
            .collect()
    }

    fn filename(pairs: &[(&str, Value)]) -> String {
        derive_filename(&context(pairs), &template(), &FilenameOptions::default())
    }

    #[test]
    fn test_name_field() {
        assert_eq!(filename(&[("naam", json!("Jan Jansen"))]), "Jan_Jansen_CV.docx");
    }

    #[test]
    fn test_field_precedence() {
        assert_eq!(
            filename(&[("functie", json!("Developer")), ("naam", json!("Jan"))]),
            "Jan_CV.docx"
        );
        assert_eq!(
            filename(&[("role", json!("Tester")), ("functie", json!("Developer"))]),
            "Developer_CV.docx"
        );
    }

    #[test]
    fn test_empty_and_non_string_fields_skipped() {
        assert_eq!(
            filename(&[("name", json!("  ")), ("naam", json!(42)), ("role", json!("Ops"))]),
            "Ops_CV.docx"
        );
    }

    #[test]
    fn test_unsafe_characters_removed() {
        assert_eq!(
            filename(&[("name", json!("../José \"O'Brien\"\r\n"))]),
            "Jos_OBrien_CV.docx"
        );
    }

    #[test]
    fn test_fallback_to_template_stem() {
        assert_eq!(filename(&[]), "Generated_CV_Template_Placeholders.docx");
        assert_eq!(
            filename(&[("name", json!("!!!"))]),
            "Generated_CV_Template_Placeholders.docx"
        );
    }

    #[test]
    fn test_custom_options() {
        let options = FilenameOptions {
            fields: vec!["company".to_string()],
            suffix: "_offer.docx".to_string(),
        };
        let ctx = context(&[("company", json!("Acme BV")), ("name", json!("Jan"))]);
        assert_eq!(derive_filename(&ctx, &template(), &options), "Acme_BV_offer.docx");
    }

    proptest! {
        #[test]
        fn prop_filename_is_header_safe(name in "\\PC{0,40}") {
            let result = filename(&[("name", Value::String(name))]);
            prop_assert!(result.ends_with(".docx"));
            prop_assert!(!result.starts_with('.'));
            prop_assert!(result
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-')));
        }
    }
}
