//! Log records as they arrive from the upstream producer.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::borrow::Cow;

/// One structured log event passed into the sink.
///
/// `display_text` is the fully formatted line produced by the upstream
/// formatter (timestamps, metadata, and so on). It becomes the mail body.
/// Producers that do not format records themselves can leave it unset and
/// the record renders as a single JSON line.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Record {
    /// Severity label, e.g. `error`
    pub level: String,
    /// Raw message; may span several lines
    pub message: String,
    /// Additional named fields
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub metadata: Map<String, Value>,
    /// Formatted display string set by the producer
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_text: Option<String>,
}

impl Record {
    /// Create a record with no metadata and no display text
    pub fn new(level: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            level: level.into(),
            message: message.into(),
            metadata: Map::new(),
            display_text: None,
        }
    }

    /// Attach a metadata field
    pub fn with_field(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// Set the formatted display string
    pub fn with_display_text(mut self, text: impl Into<String>) -> Self {
        self.display_text = Some(text.into());
        self
    }

    /// First line of the message, used for subject rendering.
    pub fn first_line(&self) -> &str {
        let line = self.message.split('\n').next().unwrap_or_default();
        line.strip_suffix('\r').unwrap_or(line)
    }

    /// The text that goes into the mail body.
    pub fn display_text(&self) -> Cow<'_, str> {
        match &self.display_text {
            Some(text) => Cow::Borrowed(text),
            None => Cow::Owned(self.to_json_line()),
        }
    }

    /// Render as `{"level":..,"message":..,<metadata>}`.
    ///
    /// `level` and `message` win over metadata fields of the same name.
    pub fn to_json_line(&self) -> String {
        let mut object = self.metadata.clone();
        object.insert("level".to_string(), Value::String(self.level.clone()));
        object.insert("message".to_string(), Value::String(self.message.clone()));
        Value::Object(object).to_string()
    }
}
