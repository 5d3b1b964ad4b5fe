//! Output types produced by [`crate::execute::execute`].

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Back-reference from an output record to the input item it came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PairedItem {
    pub item: usize,
}

/// One entry of the result list. Exactly one is produced per input item.
///
/// Serializes in the host's item shape:
/// `{"json": {...}, "pairedItem": {"item": i}}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutputRecord {
    pub json: Map<String, Value>,
    #[serde(rename = "pairedItem")]
    pub paired_item: PairedItem,
}

impl OutputRecord {
    pub fn new(json: Map<String, Value>, item_index: usize) -> Self {
        Self {
            json,
            paired_item: PairedItem { item: item_index },
        }
    }

    /// The `{error: message}` record substituted under continue-on-failure.
    pub fn error(message: impl Into<String>, item_index: usize) -> Self {
        let mut json = Map::new();
        json.insert("error".into(), Value::String(message.into()));
        Self::new(json, item_index)
    }

    pub fn item_index(&self) -> usize {
        self.paired_item.item
    }

    pub fn is_error(&self) -> bool {
        self.json.len() == 1 && self.json.get("error").is_some_and(Value::is_string)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn serializes_in_host_shape() {
        let record = OutputRecord::error("The API returned an error: invalid_schema", 2);
        assert_eq!(
            serde_json::to_value(&record).unwrap(),
            json!({
                "json": {"error": "The API returned an error: invalid_schema"},
                "pairedItem": {"item": 2}
            })
        );
        assert!(record.is_error());
        assert_eq!(record.item_index(), 2);
    }
}
