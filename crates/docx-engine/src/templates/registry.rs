//! Template directory lookup and name validation

use std::fs;
use std::path::{Path, PathBuf};

use serde::Serialize;
use serde_json::Value;
use tracing::debug;

use crate::error::PipelineError;
use crate::payload::Mapping;

/// Required extension for template files
pub const DOCX_EXTENSION: &str = ".docx";

/// Payload field selecting the template
pub const TEMPLATE_NAME_FIELD: &str = "template_name";

/// A validated template that exists on disk
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TemplateRef {
    /// File name inside the templates directory
    pub name: String,
    /// Full path to the template file
    pub path: PathBuf,
}

impl TemplateRef {
    /// File name without the `.docx` extension
    pub fn stem(&self) -> &str {
        self.name.strip_suffix(DOCX_EXTENSION).unwrap_or(&self.name)
    }
}

/// Information about an available template
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TemplateInfo {
    /// Template file name (what callers pass as `template_name`)
    pub name: String,
    /// File size in bytes
    pub size_bytes: u64,
}

/// A read-only directory of `.docx` templates
#[derive(Debug, Clone)]
pub struct TemplateDirectory {
    root: PathBuf,
    default_template: String,
}

impl TemplateDirectory {
    pub fn new(root: impl Into<PathBuf>, default_template: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            default_template: default_template.into(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn default_template(&self) -> &str {
        &self.default_template
    }

    /// Pick the template named by the payload's `template_name` field
    ///
    /// An absent or `null` field selects the default template.
    pub fn resolve(&self, mapping: &Mapping) -> Result<TemplateRef, PipelineError> {
        match mapping.get(TEMPLATE_NAME_FIELD) {
            None | Some(Value::Null) => self.resolve_name(&self.default_template),
            Some(Value::String(name)) => self.resolve_name(name),
            Some(other) => Err(PipelineError::invalid_name(
                other.to_string(),
                "template_name must be a string",
            )),
        }
    }

    /// Validate a template name and check that the file exists
    pub fn resolve_name(&self, name: &str) -> Result<TemplateRef, PipelineError> {
        validate_template_name(name)?;

        let path = self.root.join(name);
        if !path.is_file() {
            debug!("Template lookup missed: {}", path.display());
            return Err(PipelineError::TemplateNotFound(name.to_string()));
        }

        Ok(TemplateRef {
            name: name.to_string(),
            path,
        })
    }

    /// Read the template bytes
    pub fn load(&self, template: &TemplateRef) -> Result<Vec<u8>, PipelineError> {
        fs::read(&template.path).map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => PipelineError::TemplateNotFound(template.name.clone()),
            _ => PipelineError::Io(e),
        })
    }

    /// List all templates in the directory, sorted by name
    pub fn list(&self) -> Result<Vec<TemplateInfo>, PipelineError> {
        let mut templates = Vec::new();

        for entry in fs::read_dir(&self.root)? {
            let entry = entry?;
            let metadata = entry.metadata()?;
            if !metadata.is_file() {
                continue;
            }
            let Some(name) = entry.file_name().to_str().map(str::to_string) else {
                continue;
            };
            // Skip Word's owner/lock files
            if name.starts_with("~$") || validate_template_name(&name).is_err() {
                continue;
            }
            templates.push(TemplateInfo {
                name,
                size_bytes: metadata.len(),
            });
        }

        templates.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(templates)
    }
}

/// Check that a template name is a bare `.docx` file name
///
/// Names may not contain path separators, so a resolved template can never
/// escape the templates directory.
pub fn validate_template_name(name: &str) -> Result<(), PipelineError> {
    if name.contains('/') || name.contains('\\') {
        return Err(PipelineError::invalid_name(
            name,
            "must not contain a path separator",
        ));
    }
    if name.contains('\0') {
        return Err(PipelineError::invalid_name(name, "must not contain NUL"));
    }
    match name.strip_suffix(DOCX_EXTENSION) {
        Some(stem) if !stem.is_empty() => Ok(()),
        Some(_) => Err(PipelineError::invalid_name(name, "file name is empty")),
        None => Err(PipelineError::invalid_name(
            name,
            format!("must end with {}", DOCX_EXTENSION),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;
    use serde_json::json;

    fn mapping(value: serde_json::Value) -> Mapping {
        match value {
            Value::Object(map) => map,
            _ => unreachable!(),
        }
    }

    fn setup() -> (tempfile::TempDir, TemplateDirectory) {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("default.docx"), b"x").unwrap();
        fs::write(dir.path().join("Letter.docx"), b"xyz").unwrap();
        fs::write(dir.path().join("notes.txt"), b"ignored").unwrap();
        fs::write(dir.path().join("~$default.docx"), b"lock").unwrap();
        fs::create_dir(dir.path().join("nested.docx")).unwrap();
        let templates = TemplateDirectory::new(dir.path(), "default.docx");
        (dir, templates)
    }

    #[test]
    fn test_resolve_default_when_absent() {
        let (_dir, templates) = setup();
        let template = templates.resolve(&mapping(json!({"a": 1}))).unwrap();
        assert_eq!(template.name, "default.docx");
        assert_eq!(template.stem(), "default");

        let template = templates
            .resolve(&mapping(json!({"template_name": null})))
            .unwrap();
        assert_eq!(template.name, "default.docx");
    }

    #[test]
    fn test_resolve_named_template() {
        let (dir, templates) = setup();
        let template = templates
            .resolve(&mapping(json!({"template_name": "Letter.docx"})))
            .unwrap();
        assert_eq!(template.path, dir.path().join("Letter.docx"));
    }

    #[test]
    fn test_resolution_is_case_sensitive() {
        let (_dir, templates) = setup();
        let err = templates.resolve_name("letter.docx");
        // Case-insensitive filesystems may still find it; Linux must not
        if cfg!(target_os = "linux") {
            assert!(matches!(err, Err(PipelineError::TemplateNotFound(_))));
        }
    }

    #[test]
    fn test_traversal_rejected() {
        let (_dir, templates) = setup();
        let err = templates
            .resolve(&mapping(json!({"template_name": "../../etc/passwd.docx"})))
            .unwrap_err();
        assert!(matches!(err, PipelineError::InvalidTemplateName { .. }));

        let err = templates.resolve_name("..\\secret.docx").unwrap_err();
        assert!(matches!(err, PipelineError::InvalidTemplateName { .. }));
    }

    #[test]
    fn test_wrong_extension_rejected() {
        for name in ["cv.doc", "cv.DOCX", "cv", ".docx", "cv.docx.txt"] {
            let err = validate_template_name(name).unwrap_err();
            assert!(
                matches!(err, PipelineError::InvalidTemplateName { .. }),
                "{} should be rejected",
                name
            );
        }
    }

    #[test]
    fn test_non_string_name_rejected() {
        let (_dir, templates) = setup();
        let err = templates
            .resolve(&mapping(json!({"template_name": 7})))
            .unwrap_err();
        assert!(matches!(err, PipelineError::InvalidTemplateName { .. }));
    }

    #[test]
    fn test_missing_template() {
        let (_dir, templates) = setup();
        let err = templates.resolve_name("absent.docx").unwrap_err();
        assert!(matches!(err, PipelineError::TemplateNotFound(name) if name == "absent.docx"));
    }

    #[test]
    fn test_directory_is_not_a_template() {
        let (_dir, templates) = setup();
        let err = templates.resolve_name("nested.docx").unwrap_err();
        assert!(matches!(err, PipelineError::TemplateNotFound(_)));
    }

    #[test]
    fn test_list_templates() {
        let (_dir, templates) = setup();
        let listed = templates.list().unwrap();
        let names: Vec<&str> = listed.iter().map(|t| t.name.as_str()).collect();
        assert_eq!(names, vec!["Letter.docx", "default.docx"]);
        assert_eq!(listed[0].size_bytes, 3);
    }

    #[test]
    fn test_load_reads_bytes() {
        let (_dir, templates) = setup();
        let template = templates.resolve_name("Letter.docx").unwrap();
        assert_eq!(templates.load(&template).unwrap(), b"xyz".to_vec());
    }

    proptest! {
        /// Property: any name with a separator is rejected before touching the filesystem
        #[test]
        fn names_with_separators_rejected(
            prefix in "[a-z.]{0,8}",
            sep in prop_oneof![Just('/'), Just('\\')],
            suffix in "[a-z.]{0,8}"
        ) {
            let name = format!("{}{}{}.docx", prefix, sep, suffix);
            let rejected = matches!(
                validate_template_name(&name),
                Err(PipelineError::InvalidTemplateName { .. })
            );
            prop_assert!(rejected);
        }

        /// Property: plain names with the extension are accepted
        #[test]
        fn plain_docx_names_accepted(stem in "[A-Za-z0-9_ -]{1,30}") {
            let name = format!("{}.docx", stem);
            prop_assert!(validate_template_name(&name).is_ok());
        }
    }
}
