//! Template rendering
//!
//! Rendering works on the package level: every part that can hold template
//! tags is prepared, rendered with [`minijinja`] against the context, and
//! written back. Inline images are stored once under `word/media/` and
//! referenced from each part that shows them.

pub mod drawing;
pub mod package;
pub mod preprocess;

use std::collections::BTreeMap;

use minijinja::value::Value;
use minijinja::{AutoEscape, Environment, UndefinedBehavior};
use quick_xml::events::Event;
use quick_xml::Reader;
use serde_json::Value as Json;
use tracing::debug;

use self::drawing::{assign_picture_ids, inline_picture};
pub use self::package::{DocxPackage, EmbeddedMedia, MAIN_DOCUMENT_PART};
use crate::context::{ContextValue, InlineImage, RenderContext};
use crate::error::PipelineError;

/// First `wp:docPr` id handed to generated pictures
const DOC_PR_BASE: u32 = 10_000;

/// Template environment for document parts
///
/// Unknown placeholders render as empty text, `none` renders as empty text,
/// and all other values are XML-escaped unless marked safe.
fn environment() -> Environment<'static> {
    let mut env = Environment::new();
    env.set_undefined_behavior(UndefinedBehavior::Chainable);
    env.set_keep_trailing_newline(true);
    env.set_auto_escape_callback(|_| AutoEscape::Html);
    env.set_formatter(|out, state, value| {
        if value.is_none() {
            return Ok(());
        }
        minijinja::escape_formatter(out, state, value)
    });
    env
}

/// Render a `.docx` template against a context
///
/// Returns the bytes of the filled document. The template bytes are never
/// modified.
pub fn render_document(template: &[u8], context: &RenderContext) -> Result<Vec<u8>, PipelineError> {
    let mut package = DocxPackage::read(template)?;
    let env = environment();

    let mut prepared = Vec::new();
    for part in package.renderable_parts() {
        let Some(xml) = package.text(&part)? else {
            continue;
        };
        let xml = preprocess::prepare(&xml);
        if preprocess::has_template_syntax(&xml) {
            prepared.push((part, xml));
        } else {
            debug!("Part {} has no template tags, copied unchanged", part);
        }
    }

    let used_images: Vec<(&str, &InlineImage)> = context
        .images()
        .filter(|(key, _)| prepared.iter().any(|(_, xml)| xml.contains(key)))
        .collect();
    let media = package.add_media(used_images);
    if !media.is_empty() {
        package.ensure_image_content_types(media.iter().map(|m| m.image.kind()))?;
    }

    let values = context_values(context);
    let mut doc_pr_id = DOC_PR_BASE;

    for (part, xml) in prepared {
        let part_media: Vec<EmbeddedMedia<'_>> = media
            .iter()
            .filter(|m| xml.contains(m.key))
            .cloned()
            .collect();

        let mut part_values = values.clone();
        if !part_media.is_empty() {
            let rel_ids = package.add_image_relationships(&part, &part_media)?;
            for (item, rel_id) in part_media.iter().zip(&rel_ids) {
                let markup = inline_picture(rel_id, item.key, item.image.extent_emu());
                part_values.insert(item.key.to_string(), Value::from_safe_string(markup));
            }
        }

        let rendered = env
            .render_str(&xml, &part_values)
            .map_err(|e| part_failure(&part, e))?;
        let rendered = assign_picture_ids(&rendered, &mut doc_pr_id);
        check_well_formed(&part, &rendered)?;
        debug!("Rendered part {} ({} bytes)", part, rendered.len());
        package.set(&part, rendered.into_bytes());
    }

    package.write()
}

/// Plain JSON values for every key; images render as empty until a part claims them
fn context_values(context: &RenderContext) -> BTreeMap<String, Value> {
    context
        .iter()
        .map(|(key, value)| {
            let value = match value {
                ContextValue::Json(json) => Value::from_serialize(strip_forbidden_chars(json)),
                ContextValue::Image(_) => Value::from(""),
            };
            (key.to_string(), value)
        })
        .collect()
}

/// Characters XML 1.0 does not allow anywhere in a document
fn is_forbidden_in_xml(ch: char) -> bool {
    matches!(
        ch,
        '\u{0}'..='\u{8}' | '\u{B}' | '\u{C}' | '\u{E}'..='\u{1F}' | '\u{FFFE}' | '\u{FFFF}'
    )
}

/// Copy of a JSON value with forbidden control characters removed from every string
fn strip_forbidden_chars(json: &Json) -> Json {
    match json {
        Json::String(text) if text.chars().any(is_forbidden_in_xml) => {
            Json::String(text.chars().filter(|ch| !is_forbidden_in_xml(*ch)).collect())
        }
        Json::Array(items) => Json::Array(items.iter().map(strip_forbidden_chars).collect()),
        Json::Object(map) => Json::Object(
            map.iter()
                .map(|(key, value)| (key.clone(), strip_forbidden_chars(value)))
                .collect(),
        ),
        other => other.clone(),
    }
}

/// Reject a rendered part that is no longer well-formed XML
///
/// Start and end tags must pair up and every element must be closed.
fn check_well_formed(part: &str, xml: &str) -> Result<(), PipelineError> {
    let malformed = |detail: String| {
        PipelineError::RenderError(format!("{}: rendered XML is not well-formed: {}", part, detail))
    };

    let mut reader = Reader::from_str(xml);
    let mut open: Vec<Vec<u8>> = Vec::new();

    loop {
        match reader.read_event() {
            Ok(Event::Start(start)) => open.push(start.name().as_ref().to_vec()),
            Ok(Event::End(end)) => {
                let name = end.name();
                if open.pop().as_deref() != Some(name.as_ref()) {
                    return Err(malformed(format!(
                        "unexpected </{}> at byte {}",
                        String::from_utf8_lossy(name.as_ref()),
                        reader.buffer_position()
                    )));
                }
            }
            Ok(Event::Eof) => break,
            Ok(_) => {}
            Err(e) => {
                return Err(malformed(format!("{} at byte {}", e, reader.buffer_position())))
            }
        }
    }

    match open.last() {
        Some(name) => Err(malformed(format!(
            "<{}> is never closed",
            String::from_utf8_lossy(name)
        ))),
        None => Ok(()),
    }
}

fn part_failure(part: &str, err: minijinja::Error) -> PipelineError {
    match PipelineError::from(err) {
        PipelineError::RenderError(message) => {
            PipelineError::RenderError(format!("{}: {}", part, message))
        }
        other => other,
    }
}
