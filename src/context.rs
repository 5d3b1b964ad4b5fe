//! The host capability interface and an in-memory host.
//!
//! The node is written against [`NodeContext`], a handful of operations the
//! workflow host provides: parameter resolution per item, the credential,
//! binary attachments per item, and the continue-on-failure switch. Any host
//! can adapt to it; [`StaticContext`] is the self-contained implementation used
//! by the CLI's batch mode and by tests.

use crate::credentials::ApiCredentials;
use crate::error::ExtractError;
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};
use std::collections::HashMap;

/// A binary attachment on an item. `data` is base64 in serialized form.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BinaryData {
    #[serde(serialize_with = "encode_b64", deserialize_with = "decode_b64")]
    pub data: Vec<u8>,
    #[serde(rename = "fileName", default, skip_serializing_if = "Option::is_none")]
    pub file_name: Option<String>,
    #[serde(rename = "mimeType", default, skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
}

impl BinaryData {
    pub fn new(data: impl Into<Vec<u8>>) -> Self {
        Self {
            data: data.into(),
            file_name: None,
            mime_type: None,
        }
    }

    pub fn with_file_name(mut self, name: impl Into<String>) -> Self {
        self.file_name = Some(name.into());
        self
    }

    pub fn with_mime_type(mut self, mime: impl Into<String>) -> Self {
        self.mime_type = Some(mime.into());
        self
    }
}

fn encode_b64<S: Serializer>(data: &[u8], s: S) -> Result<S::Ok, S::Error> {
    s.serialize_str(&STANDARD.encode(data))
}

fn decode_b64<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<u8>, D::Error> {
    let raw = String::deserialize(d)?;
    STANDARD.decode(raw.trim()).map_err(serde::de::Error::custom)
}

/// One input item: a JSON object plus named binary attachments.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InputItem {
    #[serde(default)]
    pub json: Map<String, Value>,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub binary: HashMap<String, BinaryData>,
}

impl InputItem {
    pub fn from_json(json: Map<String, Value>) -> Self {
        Self {
            json,
            binary: HashMap::new(),
        }
    }

    pub fn with_binary(mut self, field: impl Into<String>, data: BinaryData) -> Self {
        self.binary.insert(field.into(), data);
        self
    }
}

/// Operations the workflow host supplies to the node.
#[async_trait]
pub trait NodeContext: Send + Sync {
    /// Number of input items in this run.
    fn item_count(&self) -> usize;

    /// The resolved value of a node parameter for one item, if set.
    fn parameter(&self, name: &str, item_index: usize) -> Option<Value>;

    /// The API credential configured for the node.
    fn credentials(&self) -> Result<ApiCredentials, ExtractError>;

    /// The binary attachment `field` of item `item_index`.
    ///
    /// Must fail with [`ExtractError::MissingBinaryData`] when absent.
    async fn binary_field(
        &self,
        item_index: usize,
        field: &str,
    ) -> Result<BinaryData, ExtractError>;

    /// Whether failures become `{error}` records instead of aborting.
    fn continue_on_fail(&self) -> bool {
        false
    }
}

/// In-memory [`NodeContext`].
///
/// String parameters starting with `=` are expressions: each
/// `{{ $json.path.to.field }}` is replaced by that field of the current item.
/// An expression that is exactly one placeholder yields the field's raw JSON
/// value, so non-string values (a schema object, a flag) pass through intact.
#[derive(Debug, Clone, Default)]
pub struct StaticContext {
    items: Vec<InputItem>,
    parameters: Map<String, Value>,
    credentials: Option<ApiCredentials>,
    continue_on_fail: bool,
}

impl StaticContext {
    pub fn new(items: Vec<InputItem>) -> Self {
        Self {
            items,
            ..Self::default()
        }
    }

    pub fn with_parameter(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.parameters.insert(name.into(), value.into());
        self
    }

    pub fn with_parameters(mut self, params: Map<String, Value>) -> Self {
        self.parameters.extend(params);
        self
    }

    pub fn with_credentials(mut self, creds: ApiCredentials) -> Self {
        self.credentials = Some(creds);
        self
    }

    pub fn continue_on_fail(mut self, v: bool) -> Self {
        self.continue_on_fail = v;
        self
    }
}

#[async_trait]
impl NodeContext for StaticContext {
    fn item_count(&self) -> usize {
        self.items.len()
    }

    fn parameter(&self, name: &str, item_index: usize) -> Option<Value> {
        let raw = self.parameters.get(name)?;
        let empty = Map::new();
        let item_json = self.items.get(item_index).map(|i| &i.json).unwrap_or(&empty);
        Some(evaluate(raw, item_json))
    }

    fn credentials(&self) -> Result<ApiCredentials, ExtractError> {
        self.credentials
            .clone()
            .ok_or(ExtractError::MissingCredentials)
    }

    async fn binary_field(
        &self,
        item_index: usize,
        field: &str,
    ) -> Result<BinaryData, ExtractError> {
        self.items
            .get(item_index)
            .and_then(|item| item.binary.get(field))
            .cloned()
            .ok_or_else(|| ExtractError::MissingBinaryData {
                field: field.to_string(),
            })
    }

    fn continue_on_fail(&self) -> bool {
        self.continue_on_fail
    }
}

// ── Expressions ──────────────────────────────────────────────────────────

static RE_PLACEHOLDER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\{\{\s*\$json\.([A-Za-z0-9_\-]+(?:\.[A-Za-z0-9_\-]+)*)\s*\}\}").unwrap());

/// Resolve expressions inside `value` against one item's JSON.
pub fn evaluate(value: &Value, item: &Map<String, Value>) -> Value {
    match value {
        Value::String(s) => match s.strip_prefix('=') {
            Some(expr) => evaluate_expression(expr, item),
            None => value.clone(),
        },
        Value::Object(map) => Value::Object(
            map.iter()
                .map(|(k, v)| (k.clone(), evaluate(v, item)))
                .collect(),
        ),
        Value::Array(values) => Value::Array(values.iter().map(|v| evaluate(v, item)).collect()),
        other => other.clone(),
    }
}

fn evaluate_expression(expr: &str, item: &Map<String, Value>) -> Value {
    // A lone placeholder keeps the field's JSON type.
    if let Some(caps) = RE_PLACEHOLDER.captures(expr.trim()) {
        if caps[0].len() == expr.trim().len() {
            return lookup(item, &caps[1]).cloned().unwrap_or(Value::Null);
        }
    }

    let rendered = RE_PLACEHOLDER.replace_all(expr, |caps: &Captures| {
        match lookup(item, &caps[1]) {
            Some(Value::String(s)) => s.clone(),
            Some(Value::Null) | None => String::new(),
            Some(other) => other.to_string(),
        }
    });
    Value::String(rendered.into_owned())
}

fn lookup<'a>(item: &'a Map<String, Value>, path: &str) -> Option<&'a Value> {
    let mut segments = path.split('.');
    let mut current = item.get(segments.next()?)?;
    for seg in segments {
        current = match current {
            Value::Object(map) => map.get(seg)?,
            Value::Array(values) => values.get(seg.parse::<usize>().ok()?)?,
            _ => return None,
        };
    }
    Some(current)
}
