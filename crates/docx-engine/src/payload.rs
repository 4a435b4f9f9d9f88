//! Request payload normalization
//!
//! Callers send the rendering data in several shapes:
//!
//! - a plain JSON object
//! - a list wrapping that object (`[{...}]`), as emitted by workflow tools
//! - a chat-completion response whose `choices[0].message.content` holds the
//!   object as JSON-encoded text, optionally inside a markdown code fence
//!
//! The body is classified once into a [`Payload`] and then flattened into a
//! single mapping by [`Payload::normalize`].

use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::error::{PipelineError, PipelineWarning};

/// A JSON object used as rendering data
pub type Mapping = Map<String, Value>;

/// Classified request payload
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    /// A plain object, used as-is
    Direct(Mapping),
    /// A sequence; only its first element is used
    Wrapped(Vec<Payload>),
    /// A chat-completion response envelope
    ChatCompletion(ChatCompletion),
    /// Anything else (numbers, strings, booleans)
    Scalar(Value),
}

/// A chat-completion shaped object (`{"choices": [{"message": {"content": ...}}]}`)
#[derive(Debug, Clone, PartialEq)]
pub struct ChatCompletion {
    envelope: Mapping,
}

/// Result of normalization: the flat mapping plus any non-fatal warnings
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedPayload {
    pub mapping: Mapping,
    pub warnings: Vec<PipelineWarning>,
}

impl Payload {
    /// Parse a raw request body
    ///
    /// An empty body is [`PipelineError::MissingPayload`]; unparseable JSON is
    /// [`PipelineError::MalformedJson`].
    pub fn from_slice(body: &[u8]) -> Result<Self, PipelineError> {
        if body.iter().all(|b| b.is_ascii_whitespace()) {
            return Err(PipelineError::MissingPayload);
        }
        let value: Value = serde_json::from_slice(body)
            .map_err(|e| PipelineError::MalformedJson(e.to_string()))?;
        Self::from_value(value)
    }

    /// Classify an already-decoded JSON value
    ///
    /// `null`, `{}`, `[]` and `""` count as no payload at all.
    pub fn from_value(value: Value) -> Result<Self, PipelineError> {
        if is_empty(&value) {
            return Err(PipelineError::MissingPayload);
        }
        Ok(Self::classify(value))
    }

    fn classify(value: Value) -> Self {
        match value {
            Value::Object(map) if map.contains_key("choices") => {
                Payload::ChatCompletion(ChatCompletion { envelope: map })
            }
            Value::Object(map) => Payload::Direct(map),
            Value::Array(items) => {
                Payload::Wrapped(items.into_iter().map(Self::classify).collect())
            }
            other => Payload::Scalar(other),
        }
    }

    /// Reduce the payload to a single mapping
    pub fn normalize(self) -> Result<NormalizedPayload, PipelineError> {
        let mut warnings = Vec::new();
        let mapping = self.into_mapping(&mut warnings)?;
        Ok(NormalizedPayload { mapping, warnings })
    }

    fn into_mapping(self, warnings: &mut Vec<PipelineWarning>) -> Result<Mapping, PipelineError> {
        match self {
            Payload::Direct(map) => Ok(map),
            Payload::Wrapped(items) => {
                let first = items.into_iter().next().ok_or_else(|| {
                    PipelineError::InvalidPayloadShape("sequence is empty".to_string())
                })?;
                first.into_mapping(warnings)
            }
            Payload::ChatCompletion(completion) => match completion.content() {
                Ok(map) => {
                    debug!("Unwrapped chat-completion content ({} keys)", map.len());
                    Ok(map)
                }
                Err(reason) => {
                    warn!("Chat-completion unwrap failed, using envelope: {}", reason);
                    warnings.push(PipelineWarning::ChatCompletionUnwrap { reason });
                    Ok(completion.envelope)
                }
            },
            Payload::Scalar(value) => Err(PipelineError::InvalidPayloadShape(format!(
                "expected a JSON object, got {}",
                kind_of(&value)
            ))),
        }
    }
}

impl ChatCompletion {
    /// Extract `choices[0].message.content` as a mapping
    ///
    /// String content is parsed as JSON. Anything that does not end up as an
    /// object is an error, and the caller falls back to the envelope.
    pub fn content(&self) -> Result<Mapping, String> {
        let content = self
            .envelope
            .get("choices")
            .and_then(|choices| choices.get(0))
            .and_then(|choice| choice.get("message"))
            .and_then(|message| message.get("content"))
            .ok_or_else(|| "missing choices[0].message.content".to_string())?;

        let decoded = match content {
            Value::String(text) => serde_json::from_str::<Value>(strip_code_fence(text))
                .map_err(|e| format!("content is not valid JSON: {}", e))?,
            other => other.clone(),
        };

        match decoded {
            Value::Object(map) => Ok(map),
            other => Err(format!(
                "content decoded to {} instead of an object",
                kind_of(&other)
            )),
        }
    }
}

/// Strip a surrounding markdown code fence (```json ... ```), if any
fn strip_code_fence(text: &str) -> &str {
    let trimmed = text.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let Some(body) = rest.strip_suffix("```") else {
        return trimmed;
    };
    // Drop the info string (e.g. "json") on the opening line
    match body.find('\n') {
        Some(idx) => body[idx + 1..].trim(),
        None => body.trim(),
    }
}

fn is_empty(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Object(map) => map.is_empty(),
        Value::Array(items) => items.is_empty(),
        Value::String(s) => s.is_empty(),
        _ => false,
    }
}

fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
