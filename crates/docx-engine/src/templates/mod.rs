//! Template management

pub mod registry;

pub use registry::{
    validate_template_name, TemplateDirectory, TemplateInfo, TemplateRef, DOCX_EXTENSION,
    TEMPLATE_NAME_FIELD,
};
