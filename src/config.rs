//! Configuration types for the extraction node.
//!
//! Two layers of configuration exist:
//!
//! * [`ExtractorConfig`] — fixed for the lifetime of a client: the API base
//!   URL and an optional progress callback. Built via
//!   [`ExtractorConfig::builder()`].
//! * [`NodeParameters`] — what the user configured on the node, resolved from
//!   a [`NodeContext`] for each item. `operation` and `useSchema` are read
//!   once per run (see [`RunParameters`]); everything else may differ per item.

use crate::context::NodeContext;
use crate::error::ExtractError;
use crate::pipeline::input::InputSource;
use crate::progress::ProgressCallback;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;

/// Production API root.
pub const DEFAULT_BASE_URL: &str = "https://api.extract.monster";

/// Field the extracted data lands in unless overridden.
pub const DEFAULT_OUTPUT_FIELD: &str = "extracted_data";

/// Binary field read in binary mode unless overridden.
pub const DEFAULT_BINARY_FIELD: &str = "data";

// ── Client configuration ─────────────────────────────────────────────────

/// Configuration shared by every request a client makes.
///
/// # Example
/// ```rust
/// use extract_monster::ExtractorConfig;
///
/// let config = ExtractorConfig::builder()
///     .base_url("http://localhost:8080")
///     .build()
///     .unwrap();
/// assert_eq!(config.base_url, "http://localhost:8080");
/// ```
#[derive(Clone)]
pub struct ExtractorConfig {
    /// API root without trailing slash. Default: `https://api.extract.monster`.
    pub base_url: String,

    /// Receives per-item events during [`crate::execute::execute`].
    pub progress_callback: Option<ProgressCallback>,
}

impl Default for ExtractorConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            progress_callback: None,
        }
    }
}

impl fmt::Debug for ExtractorConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExtractorConfig")
            .field("base_url", &self.base_url)
            .field(
                "progress_callback",
                &self.progress_callback.as_ref().map(|_| "<dyn ItemProgressCallback>"),
            )
            .finish()
    }
}

impl ExtractorConfig {
    pub fn builder() -> ExtractorConfigBuilder {
        ExtractorConfigBuilder {
            config: Self::default(),
        }
    }

    pub fn file_endpoint(&self) -> String {
        format!("{}/v1/extract/file", self.base_url)
    }

    pub fn text_endpoint(&self) -> String {
        format!("{}/v1/extract/text", self.base_url)
    }
}

/// Builder for [`ExtractorConfig`].
#[derive(Debug)]
pub struct ExtractorConfigBuilder {
    config: ExtractorConfig,
}

impl ExtractorConfigBuilder {
    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.config.base_url = url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn progress_callback(mut self, cb: ProgressCallback) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    /// Build the configuration, validating the base URL.
    pub fn build(self) -> Result<ExtractorConfig, ExtractError> {
        let parsed = url::Url::parse(&self.config.base_url).map_err(|e| {
            ExtractError::InvalidConfig(format!("base URL '{}': {}", self.config.base_url, e))
        })?;
        if parsed.scheme() != "http" && parsed.scheme() != "https" {
            return Err(ExtractError::InvalidConfig(format!(
                "base URL must be http or https, got '{}'",
                parsed.scheme()
            )));
        }
        Ok(self.config)
    }
}

// ── Enums ────────────────────────────────────────────────────────────────

/// Which endpoint the node calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Operation {
    /// `POST /v1/extract/file` (default).
    #[default]
    ExtractFile,
    /// `POST /v1/extract/text`.
    ExtractText,
}

impl FromStr for Operation {
    type Err = ExtractError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "extractFile" => Ok(Operation::ExtractFile),
            "extractText" => Ok(Operation::ExtractText),
            other => Err(ExtractError::invalid_parameter(
                "operation",
                format!("expected 'extractFile' or 'extractText', got '{other}'"),
            )),
        }
    }
}

/// Where file-mode input comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum InputMethod {
    /// A binary attachment from an upstream step (default).
    #[default]
    Binary,
    /// Download from a URL.
    Url,
    /// Read from the local filesystem.
    Path,
}

impl FromStr for InputMethod {
    type Err = ExtractError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "binary" => Ok(InputMethod::Binary),
            "url" => Ok(InputMethod::Url),
            "path" => Ok(InputMethod::Path),
            other => Err(ExtractError::invalid_parameter(
                "inputMethod",
                format!("expected 'binary', 'url' or 'path', got '{other}'"),
            )),
        }
    }
}

/// How the API response is shaped into the output record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct OutputOptions {
    /// Key the extracted data is stored under. Default: `extracted_data`.
    pub output_field_name: String,
    /// Copy `status`, `filename` and `file_type` into the output. Default: true.
    pub include_metadata: bool,
    /// Omit `raw_response` from the output. Default: true.
    pub simplify: bool,
}

impl Default for OutputOptions {
    fn default() -> Self {
        Self {
            output_field_name: DEFAULT_OUTPUT_FIELD.to_string(),
            include_metadata: true,
            simplify: true,
        }
    }
}

impl OutputOptions {
    /// Read the `options` collection parameter.
    ///
    /// Missing keys take their defaults; an empty field name falls back to
    /// `extracted_data`; the flags are on unless explicitly `false`.
    pub fn from_value(value: Option<&Value>) -> Result<Self, ExtractError> {
        let mut options = Self::default();
        let map = match value {
            None | Some(Value::Null) => return Ok(options),
            Some(Value::Object(map)) => map,
            Some(_) => {
                return Err(ExtractError::invalid_parameter(
                    "options",
                    "expected an object",
                ))
            }
        };

        if let Some(name) = map.get("outputFieldName").and_then(Value::as_str) {
            if !name.is_empty() {
                options.output_field_name = name.to_string();
            }
        }
        options.include_metadata = !is_false(map.get("includeMetadata"));
        options.simplify = !is_false(map.get("simplify"));
        Ok(options)
    }
}

fn is_false(value: Option<&Value>) -> bool {
    matches!(value, Some(Value::Bool(false)))
}

// ── Parameter resolution ─────────────────────────────────────────────────

/// Parameters read once, from item 0, before the item loop begins.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunParameters {
    pub operation: Operation,
    pub use_schema: bool,
}

impl RunParameters {
    pub fn resolve(ctx: &dyn NodeContext) -> Result<Self, ExtractError> {
        let operation = match string_param(ctx, "operation", 0) {
            Some(op) => op.parse()?,
            None => Operation::default(),
        };
        let use_schema = bool_param(ctx, "useSchema", 0)?.unwrap_or(false);
        Ok(Self {
            operation,
            use_schema,
        })
    }
}

/// Everything needed to process one item.
#[derive(Debug, Clone, PartialEq)]
pub struct NodeParameters {
    pub source: InputSource,
    /// Schema string sent as the `schema` field, if any.
    pub schema: Option<String>,
    pub options: OutputOptions,
}

impl NodeParameters {
    /// Resolve the parameters for item `index`.
    pub fn resolve(
        ctx: &dyn NodeContext,
        run: &RunParameters,
        index: usize,
    ) -> Result<Self, ExtractError> {
        let options = OutputOptions::from_value(ctx.parameter("options", index).as_ref())?;

        let schema = if run.use_schema {
            let value = ctx
                .parameter("jsonSchema", index)
                .ok_or_else(|| ExtractError::missing_parameter("jsonSchema"))?;
            schema_string(value)
        } else {
            None
        };

        let source = match run.operation {
            Operation::ExtractText => {
                InputSource::Text(required_param(ctx, "text", index, true)?)
            }
            Operation::ExtractFile => {
                let method = match string_param(ctx, "inputMethod", index) {
                    Some(m) => m.parse()?,
                    None => InputMethod::default(),
                };
                match method {
                    InputMethod::Binary => InputSource::Binary {
                        field: string_param(ctx, "binaryPropertyName", index)
                            .filter(|f| !f.is_empty())
                            .unwrap_or_else(|| DEFAULT_BINARY_FIELD.to_string()),
                    },
                    InputMethod::Url => {
                        InputSource::Url(required_param(ctx, "fileUrl", index, false)?)
                    }
                    InputMethod::Path => {
                        InputSource::Path(required_param(ctx, "filePath", index, false)?)
                    }
                }
            }
        };

        Ok(Self {
            source,
            schema,
            options,
        })
    }
}

/// Turn the `jsonSchema` parameter into the string sent to the API.
///
/// Strings are used verbatim; other JSON values are serialized. An empty
/// string or `null` means no schema.
pub fn schema_string(value: Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) if s.is_empty() => None,
        Value::String(s) => Some(s),
        other => Some(other.to_string()),
    }
}

fn string_param(ctx: &dyn NodeContext, name: &str, index: usize) -> Option<String> {
    match ctx.parameter(name, index)? {
        Value::Null => None,
        Value::String(s) => Some(s),
        other => Some(other.to_string()),
    }
}

fn required_param(
    ctx: &dyn NodeContext,
    name: &str,
    index: usize,
    allow_empty: bool,
) -> Result<String, ExtractError> {
    match string_param(ctx, name, index) {
        Some(s) if allow_empty || !s.trim().is_empty() => Ok(s),
        _ => Err(ExtractError::missing_parameter(name)),
    }
}

fn bool_param(ctx: &dyn NodeContext, name: &str, index: usize) -> Result<Option<bool>, ExtractError> {
    match ctx.parameter(name, index) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Bool(b)) => Ok(Some(b)),
        Some(Value::String(s)) => match s.as_str() {
            "true" => Ok(Some(true)),
            "false" => Ok(Some(false)),
            other => Err(ExtractError::invalid_parameter(
                name,
                format!("expected a boolean, got '{other}'"),
            )),
        },
        Some(other) => Err(ExtractError::invalid_parameter(
            name,
            format!("expected a boolean, got {other}"),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::{InputItem, StaticContext};
    use serde_json::json;

    fn ctx() -> StaticContext {
        StaticContext::new(vec![InputItem::default(), InputItem::default()])
    }

    #[test]
    fn config_defaults() {
        let config = ExtractorConfig::default();
        assert_eq!(config.file_endpoint(), "https://api.extract.monster/v1/extract/file");
        assert_eq!(config.text_endpoint(), "https://api.extract.monster/v1/extract/text");
    }

    #[test]
    fn builder_trims_and_validates_base_url() {
        let config = ExtractorConfig::builder()
            .base_url("http://127.0.0.1:9000/")
            .build()
            .unwrap();
        assert_eq!(config.base_url, "http://127.0.0.1:9000");

        assert!(ExtractorConfig::builder().base_url("not a url").build().is_err());
        assert!(ExtractorConfig::builder().base_url("ftp://x.test").build().is_err());
    }

    #[test]
    fn output_options_defaults_and_overrides() {
        assert_eq!(OutputOptions::from_value(None).unwrap(), OutputOptions::default());

        let opts = OutputOptions::from_value(Some(&json!({
            "outputFieldName": "",
            "includeMetadata": false
        })))
        .unwrap();
        assert_eq!(opts.output_field_name, "extracted_data");
        assert!(!opts.include_metadata);
        assert!(opts.simplify);

        let opts = OutputOptions::from_value(Some(&json!({
            "includeMetadata": "false",
            "simplify": 0
        })))
        .unwrap();
        assert!(opts.include_metadata, "only boolean false disables metadata");
        assert!(opts.simplify);

        let opts = OutputOptions::from_value(Some(&json!({"outputFieldName": "invoice"}))).unwrap();
        assert_eq!(opts.output_field_name, "invoice");

        assert!(OutputOptions::from_value(Some(&json!("bad"))).is_err());
    }

    #[test]
    fn parse_enums() {
        assert_eq!("extractText".parse::<Operation>().unwrap(), Operation::ExtractText);
        assert!("extract".parse::<Operation>().is_err());
        assert_eq!("path".parse::<InputMethod>().unwrap(), InputMethod::Path);
        assert!("ftp".parse::<InputMethod>().is_err());
    }

    #[test]
    fn run_parameters_default_to_binary_file_extraction() {
        let run = RunParameters::resolve(&ctx()).unwrap();
        assert_eq!(run.operation, Operation::ExtractFile);
        assert!(!run.use_schema);

        let params = NodeParameters::resolve(&ctx(), &run, 0).unwrap();
        assert_eq!(
            params.source,
            InputSource::Binary {
                field: "data".into()
            }
        );
        assert_eq!(params.schema, None);
    }

    #[test]
    fn text_operation_with_schema_object() {
        let ctx = ctx()
            .with_parameter("operation", "extractText")
            .with_parameter("text", "Invoice #1")
            .with_parameter("useSchema", true)
            .with_parameter("jsonSchema", json!({"total": {"type": "number"}}));
        let run = RunParameters::resolve(&ctx).unwrap();
        let params = NodeParameters::resolve(&ctx, &run, 1).unwrap();

        assert_eq!(params.source, InputSource::Text("Invoice #1".into()));
        assert_eq!(params.schema.as_deref(), Some(r#"{"total":{"type":"number"}}"#));
    }

    #[test]
    fn schema_string_is_verbatim() {
        let raw = "{ \"a\" : 1 }";
        assert_eq!(schema_string(json!(raw)).as_deref(), Some(raw));
        assert_eq!(schema_string(json!("")), None);
        assert_eq!(schema_string(Value::Null), None);
    }

    #[test]
    fn url_mode_requires_url() {
        let ctx = ctx().with_parameter("inputMethod", "url");
        let run = RunParameters::resolve(&ctx).unwrap();
        let err = NodeParameters::resolve(&ctx, &run, 0).unwrap_err();
        assert!(matches!(err, ExtractError::MissingParameter { ref name } if name == "fileUrl"));
    }

    #[test]
    fn path_mode_resolves_path() {
        let ctx = ctx()
            .with_parameter("inputMethod", "path")
            .with_parameter("filePath", "~/docs/x.pdf");
        let run = RunParameters::resolve(&ctx).unwrap();
        let params = NodeParameters::resolve(&ctx, &run, 0).unwrap();
        assert_eq!(params.source, InputSource::Path("~/docs/x.pdf".into()));
    }
}
