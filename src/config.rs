//! Config exchange: the schema-described text format decoders use to
//! publish tunable parameters and receive edited values.
//!
//! The document is a JSON object with a single `plugincfg` array of records.
//! The host never interprets a record's `value` beyond its declared `type`;
//! it only round-trips records between the decoder and the configuration
//! surface.

use crate::error::Result;
use serde::{Deserialize, Serialize};

/// Declared type of a config record's value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordType {
    /// One of a fixed set of options.
    Enum,
    /// Integer value.
    Int,
    /// Free-form string.
    String,
    /// Boolean flag.
    Bool,
}

/// One user-tunable parameter published by a decoder.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfigRecord {
    /// Parameter name, unique within the document.
    pub name: String,
    /// Declared value type.
    #[serde(rename = "type")]
    pub kind: RecordType,
    /// Help text shown next to the parameter.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub help: Option<String>,
    /// Choices for `enum` records.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub options: Option<Vec<String>>,
    /// Current value; opaque to the host.
    pub value: serde_json::Value,
}

impl ConfigRecord {
    /// A boolean record.
    pub fn bool(name: &str, help: &str, value: bool) -> Self {
        Self {
            name: name.to_string(),
            kind: RecordType::Bool,
            help: Some(help.to_string()),
            options: None,
            value: serde_json::Value::Bool(value),
        }
    }

    /// An integer record.
    pub fn int(name: &str, help: &str, value: i64) -> Self {
        Self {
            name: name.to_string(),
            kind: RecordType::Int,
            help: Some(help.to_string()),
            options: None,
            value: serde_json::Value::from(value),
        }
    }

    /// The value as a bool, when it is one.
    pub fn as_bool(&self) -> Option<bool> {
        self.value.as_bool()
    }

    /// The value as an integer, when it is one.
    pub fn as_int(&self) -> Option<i64> {
        self.value.as_i64()
    }
}

/// A full config exchange document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConfigDoc {
    /// The published records.
    pub plugincfg: Vec<ConfigRecord>,
}

impl ConfigDoc {
    /// Build a document from records.
    pub fn new(records: Vec<ConfigRecord>) -> Self {
        Self { plugincfg: records }
    }

    /// Parse a document from its JSON text.
    pub fn from_text(text: &str) -> Result<Self> {
        Ok(serde_json::from_str(text)?)
    }

    /// Serialize the document to JSON text.
    pub fn to_text(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Look up a record by name.
    pub fn get(&self, name: &str) -> Option<&ConfigRecord> {
        self.plugincfg.iter().find(|r| r.name == name)
    }

    /// Overwrite the value of a named record, if present.
    pub fn set_value(&mut self, name: &str, value: serde_json::Value) -> bool {
        match self.plugincfg.iter_mut().find(|r| r.name == name) {
            Some(record) => {
                record.value = value;
                true
            }
            None => false,
        }
    }
}
