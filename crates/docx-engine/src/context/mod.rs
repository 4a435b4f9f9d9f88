//! Rendering context construction
//!
//! Turns the normalized payload into the values the renderer sees:
//!
//! - nested "personal data" objects are flattened into the top level
//! - base64 image fields become [`InlineImage`] handles
//!
//! Flattening never overwrites: when a nested key collides with an existing
//! top-level key, the top-level value is kept.

pub mod inline_image;

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

pub use self::inline_image::{ImageDecodeError, ImageKind, InlineImage, DEFAULT_IMAGE_WIDTH_MM};
use crate::error::PipelineWarning;
use crate::payload::Mapping;

/// Value that replaces an image field which could not be decoded
pub const NO_IMAGE_MARKER: &str = "";

/// A single placeholder value
#[derive(Debug, Clone, PartialEq)]
pub enum ContextValue {
    Json(Value),
    Image(InlineImage),
}

/// Flat placeholder-name to value mapping, in key order
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RenderContext {
    entries: BTreeMap<String, ContextValue>,
}

impl RenderContext {
    pub fn get(&self, key: &str) -> Option<&ContextValue> {
        self.entries.get(key)
    }

    /// JSON value for a key, if it is not an image
    pub fn get_json(&self, key: &str) -> Option<&Value> {
        match self.entries.get(key) {
            Some(ContextValue::Json(value)) => Some(value),
            _ => None,
        }
    }

    /// String value for a key, if it is a JSON string
    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.get_json(key).and_then(Value::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &ContextValue)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// All inline images, in key order
    pub fn images(&self) -> impl Iterator<Item = (&str, &InlineImage)> {
        self.entries.iter().filter_map(|(k, v)| match v {
            ContextValue::Image(image) => Some((k.as_str(), image)),
            ContextValue::Json(_) => None,
        })
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl FromIterator<(String, ContextValue)> for RenderContext {
    fn from_iter<T: IntoIterator<Item = (String, ContextValue)>>(iter: T) -> Self {
        Self {
            entries: iter.into_iter().collect(),
        }
    }
}

/// Context construction settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ContextOptions {
    /// Nested objects merged into the top level, in priority order
    pub nested_keys: Vec<String>,
    /// Fields holding base64 images
    pub image_fields: Vec<String>,
    /// Display width of inline images in millimetres
    pub image_width_mm: f64,
}

impl Default for ContextOptions {
    fn default() -> Self {
        Self {
            nested_keys: vec![
                "personal_data".to_string(),
                "personal data".to_string(),
                "persoonsgegevens".to_string(),
            ],
            image_fields: vec!["photo".to_string(), "chart".to_string()],
            image_width_mm: DEFAULT_IMAGE_WIDTH_MM,
        }
    }
}

/// Context plus the degradations applied while building it
#[derive(Debug, Clone)]
pub struct BuiltContext {
    pub context: RenderContext,
    pub warnings: Vec<PipelineWarning>,
}

/// Build the rendering context from a normalized payload
pub fn build_context(mut mapping: Mapping, options: &ContextOptions) -> BuiltContext {
    flatten_nested(&mut mapping, &options.nested_keys);

    let mut warnings = Vec::new();
    let mut images = BTreeMap::new();

    for field in &options.image_fields {
        let decoded = match mapping.get(field) {
            None | Some(Value::Null) => continue,
            Some(Value::String(s)) if s.trim().is_empty() => continue,
            Some(Value::String(s)) => {
                InlineImage::decode(s, options.image_width_mm).map_err(|e| e.to_string())
            }
            Some(_) => Err("expected a base64 string".to_string()),
        };

        match decoded {
            Ok(image) => {
                debug!(
                    "Decoded image field '{}' ({} bytes, {})",
                    field,
                    image.data().len(),
                    image.kind().content_type()
                );
                images.insert(field.clone(), image);
            }
            Err(reason) => {
                warn!("Image field '{}' could not be decoded: {}", field, reason);
                mapping.insert(field.clone(), Value::String(NO_IMAGE_MARKER.to_string()));
                warnings.push(PipelineWarning::ImageDecode {
                    field: field.clone(),
                    reason,
                });
            }
        }
    }

    let context = mapping
        .into_iter()
        .map(|(key, value)| match images.remove(&key) {
            Some(image) => (key, ContextValue::Image(image)),
            None => (key, ContextValue::Json(value)),
        })
        .collect();

    BuiltContext { context, warnings }
}

/// Merge nested objects into the top level without overwriting existing keys
fn flatten_nested(mapping: &mut Mapping, nested_keys: &[String]) {
    for key in nested_keys {
        if !matches!(mapping.get(key), Some(Value::Object(_))) {
            continue;
        }
        let Some(Value::Object(nested)) = mapping.remove(key) else {
            continue;
        };
        for (inner_key, value) in nested {
            if mapping.contains_key(&inner_key) {
                debug!(
                    "Nested field '{}.{}' shadowed by top-level value",
                    key, inner_key
                );
                continue;
            }
            mapping.insert(inner_key, value);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures;
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn mapping(value: Value) -> Mapping {
        match value {
            Value::Object(map) => map,
            _ => unreachable!(),
        }
    }

    fn build(value: Value) -> BuiltContext {
        build_context(mapping(value), &ContextOptions::default())
    }

    #[test]
    fn test_flattens_personal_data() {
        let built = build(json!({
            "personal_data": {"naam": "Jan", "woonplaats": "Utrecht"},
            "functie": "Developer"
        }));
        assert_eq!(built.context.get_str("naam"), Some("Jan"));
        assert_eq!(built.context.get_str("woonplaats"), Some("Utrecht"));
        assert_eq!(built.context.get_str("functie"), Some("Developer"));
        assert!(built.context.get("personal_data").is_none());
        assert!(built.warnings.is_empty());
    }

    #[test]
    fn test_flattens_spaced_personal_data_key() {
        let built = build(json!({"personal data": {"naam": "Jan"}}));
        assert_eq!(built.context.get_str("naam"), Some("Jan"));
        assert!(built.context.get("personal data").is_none());
    }

    #[test]
    fn test_top_level_wins_on_conflict() {
        let built = build(json!({
            "personal_data": {"naam": "Jan"},
            "naam": "Piet"
        }));
        assert_eq!(built.context.get_str("naam"), Some("Piet"));
    }

    #[test]
    fn test_first_nested_key_wins_between_nested() {
        let built = build(json!({
            "personal_data": {"naam": "Jan"},
            "persoonsgegevens": {"naam": "Klaas", "email": "k@example.com"}
        }));
        assert_eq!(built.context.get_str("naam"), Some("Jan"));
        assert_eq!(built.context.get_str("email"), Some("k@example.com"));
    }

    #[test]
    fn test_non_object_nested_key_passes_through() {
        let built = build(json!({"personal_data": "n/a"}));
        assert_eq!(built.context.get_str("personal_data"), Some("n/a"));
    }

    #[test]
    fn test_unknown_keys_pass_through() {
        let built = build(json!({"skills": ["rust", "sql"], "years": 7}));
        assert_eq!(
            built.context.get_json("skills"),
            Some(&json!(["rust", "sql"]))
        );
        assert_eq!(built.context.get_json("years"), Some(&json!(7)));
        assert_eq!(built.context.len(), 2);
    }

    #[test]
    fn test_invalid_photo_becomes_marker() {
        let built = build(json!({"photo": "not-base64"}));
        assert_eq!(built.context.get_str("photo"), Some(NO_IMAGE_MARKER));
        assert_eq!(built.warnings.len(), 1);
        assert!(matches!(
            &built.warnings[0],
            PipelineWarning::ImageDecode { field, .. } if field == "photo"
        ));
    }

    #[test]
    fn test_non_string_image_becomes_marker() {
        let built = build(json!({"chart": 12}));
        assert_eq!(built.context.get_str("chart"), Some(NO_IMAGE_MARKER));
        assert_eq!(built.warnings.len(), 1);
    }

    #[test]
    fn test_empty_photo_is_left_alone() {
        let built = build(json!({"photo": ""}));
        assert_eq!(built.context.get_str("photo"), Some(""));
        assert!(built.warnings.is_empty());
    }

    #[test]
    fn test_valid_photo_becomes_image() {
        let png = fixtures::png_bytes(10, 20);
        let built = build(json!({"photo": STANDARD.encode(&png), "naam": "Jan"}));
        let images: Vec<&str> = built.context.images().map(|(k, _)| k).collect();
        assert_eq!(images, vec!["photo"]);
        assert!(matches!(
            built.context.get("photo"),
            Some(ContextValue::Image(_))
        ));
        assert!(built.warnings.is_empty());
    }

    #[test]
    fn test_photo_inside_personal_data() {
        let png = fixtures::png_bytes(10, 10);
        let built = build(json!({"personal_data": {"photo": STANDARD.encode(&png)}}));
        assert!(matches!(
            built.context.get("photo"),
            Some(ContextValue::Image(_))
        ));
    }

    #[test]
    fn test_custom_image_width() {
        let png = fixtures::png_bytes(10, 10);
        let options = ContextOptions {
            image_width_mm: 25.0,
            ..ContextOptions::default()
        };
        let built = build_context(mapping(json!({"photo": STANDARD.encode(&png)})), &options);
        let (_, image) = built.context.images().next().unwrap();
        assert_eq!(image.extent_emu(), (900_000, 900_000));
    }
}
