//! Rule documents: a YARA rule's strings plus its parsed condition.
//!
//! ```json
//! {
//!   "name": "Example",
//!   "strings": { "$a": {"text": "evil"}, "$mz": {"hex": "4D 5A"} },
//!   "condition": {"kind": "string_at", "id": "$a", "at": {"kind": "int_literal", "value": 64}}
//! }
//! ```

use crate::ast::Expr;
use crate::error::{Result, SynthError};
use crate::file_io;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

/// Value of a string definition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StringValue {
    /// Text string, written as its UTF-8 bytes
    Text(String),
    /// Hex string such as `{ 4D 5A 90 00 }`; wildcards and jumps are not supported
    Hex(String),
}

impl StringValue {
    pub fn to_bytes(&self, id: &str) -> Result<Vec<u8>> {
        let bytes = match self {
            StringValue::Text(text) => text.as_bytes().to_vec(),
            StringValue::Hex(hex) => {
                let digits: String = hex
                    .chars()
                    .filter(|c| !c.is_whitespace() && *c != '{' && *c != '}')
                    .collect();
                hex::decode(&digits).map_err(|e| SynthError::invalid_string(id, e.to_string()))?
            }
        };

        if bytes.is_empty() {
            return Err(SynthError::invalid_string(id, "empty string"));
        }
        Ok(bytes)
    }
}

/// A rule as handed over by the parser.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleDocument {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub strings: BTreeMap<String, StringValue>,
    pub condition: Expr,
}

impl RuleDocument {
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let rule = Self::from_json(&file_io::read_text(path)?)?;
        tracing::debug!(
            "Loaded rule {} from {} ({} strings)",
            rule.name.as_deref().unwrap_or("<unnamed>"),
            path.display(),
            rule.strings.len()
        );
        Ok(rule)
    }

    /// Byte content of every string, keyed by identifier.
    pub fn string_bytes(&self) -> Result<BTreeMap<String, Vec<u8>>> {
        self.strings
            .iter()
            .map(|(id, value)| Ok((id.clone(), value.to_bytes(id)?)))
            .collect()
    }
}
