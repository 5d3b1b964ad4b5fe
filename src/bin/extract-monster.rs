//! CLI binary for extract-monster.
//!
//! A thin shim over the library crate: every subcommand builds a
//! `StaticContext` and runs the same node executor a workflow host would.

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use extract_monster::config::DEFAULT_BASE_URL;
use extract_monster::pipeline::input::is_url;
use extract_monster::transport::ReqwestTransport;
use extract_monster::{
    execute, ApiCredentials, ExtractClient, ExtractError, ExtractorConfig, InputItem,
    ItemProgressCallback, OutputRecord, ProgressCallback, RunAborted, StaticContext,
};
use indicatif::{ProgressBar, ProgressStyle};
use serde_json::{json, Map, Value};
use std::io::{self, Read, Write};
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers (no extra deps) ──────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn red(s: &str) -> String {
    format!("\x1b[31m{s}\x1b[0m")
}
fn bold(s: &str) -> String {
    format!("\x1b[1m{s}\x1b[0m")
}

// ── CLI progress callback using indicatif ────────────────────────────────────

struct CliProgressCallback {
    bar: ProgressBar,
    errors: AtomicUsize,
}

impl CliProgressCallback {
    fn new() -> Arc<Self> {
        let bar = ProgressBar::new(0);
        bar.set_style(
            ProgressStyle::with_template(
                "{spinner:.cyan} {prefix:.bold}  [{bar:42.green/238}] {pos:>4}/{len} items  ⏱ {elapsed_precise}",
            )
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("█▉▊▋▌▍▎▏  "),
        );
        bar.set_prefix("Extracting");
        bar.enable_steady_tick(Duration::from_millis(80));
        Arc::new(Self {
            bar,
            errors: AtomicUsize::new(0),
        })
    }
}

impl ItemProgressCallback for CliProgressCallback {
    fn on_run_start(&self, total_items: usize) {
        self.bar.set_length(total_items as u64);
    }

    fn on_item_complete(&self, _item_index: usize, _total_items: usize) {
        self.bar.inc(1);
    }

    fn on_item_error(&self, item_index: usize, _total_items: usize, error: &str) {
        self.errors.fetch_add(1, Ordering::SeqCst);
        let msg = if error.chars().count() > 80 {
            format!("{}\u{2026}", error.chars().take(79).collect::<String>())
        } else {
            error.to_string()
        };
        self.bar
            .println(format!("  {} Item {:>4}  {}", red("✗"), item_index, red(&msg)));
        self.bar.inc(1);
    }

    fn on_run_aborted(&self, item_index: usize, total_items: usize) {
        self.bar.finish_and_clear();
        eprintln!(
            "{} stopped at item {} of {}",
            red("✘"),
            bold(&item_index.to_string()),
            total_items
        );
    }

    fn on_run_complete(&self, total_items: usize, success_count: usize) {
        self.bar.finish_and_clear();
        let failed = self.errors.load(Ordering::SeqCst);
        if failed == 0 {
            eprintln!(
                "{} {} items extracted",
                green("✔"),
                bold(&success_count.to_string())
            );
        } else {
            eprintln!(
                "{} {}/{} items extracted  ({} failed)",
                red("✘"),
                bold(&success_count.to_string()),
                total_items,
                red(&failed.to_string()),
            );
        }
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Extract from a local file (~ is expanded)
  extract-monster file ~/invoices/march.pdf

  # Extract from a URL with a schema
  extract-monster file https://example.com/invoice.pdf \
      --schema '{"invoice_number": {"type": "string"}, "total": {"type": "number"}}'

  # Extract from text
  extract-monster text "Invoice #12345 dated 2024-01-15 for $500.00"

  # Run the node over a batch of items; parameters may be expressions
  extract-monster batch items.json --operation extract-text \
      --text '={{ $json.body }}' --continue-on-fail -o results.json

  # Check the API key
  extract-monster whoami

BATCH ITEMS FILE:
  A JSON array. Each element is either a plain object (used as the item's
  json) or a host-shaped item:
    {"json": {...}, "binary": {"data": {"data": "<base64>", "fileName": "a.pdf",
                                        "mimeType": "application/pdf"}}}

ENVIRONMENT VARIABLES:
  EXTRACT_MONSTER_API_KEY    API key (from your extract.monster dashboard)
  EXTRACT_MONSTER_BASE_URL   Override the API root
  RUST_LOG                   Override log filtering
"#;

/// Extract structured JSON from files and text with the Extract Monster API.
#[derive(Parser, Debug)]
#[command(
    name = "extract-monster",
    version,
    about = "Extract structured JSON from files and text with the Extract Monster API",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Extract Monster API key.
    #[arg(long, global = true, env = "EXTRACT_MONSTER_API_KEY", hide_env_values = true)]
    api_key: Option<String>,

    /// API root URL.
    #[arg(long, global = true, env = "EXTRACT_MONSTER_BASE_URL", default_value = DEFAULT_BASE_URL)]
    base_url: String,

    /// HTTP timeout in seconds (none by default).
    #[arg(long, global = true, env = "EXTRACT_MONSTER_TIMEOUT")]
    timeout: Option<u64>,

    /// Write JSON output to this file instead of stdout.
    #[arg(short, long, global = true, env = "EXTRACT_MONSTER_OUTPUT")]
    output: Option<PathBuf>,

    /// Disable progress bar.
    #[arg(long, global = true, env = "EXTRACT_MONSTER_NO_PROGRESS")]
    no_progress: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, global = true, env = "EXTRACT_MONSTER_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, global = true, env = "EXTRACT_MONSTER_QUIET")]
    quiet: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Extract from a local file path or HTTP/HTTPS URL.
    File {
        /// Local path or URL.
        input: String,
        #[command(flatten)]
        shape: ShapeArgs,
    },
    /// Extract from text ("-" reads stdin).
    Text {
        text: String,
        #[command(flatten)]
        shape: ShapeArgs,
    },
    /// Run the node over a JSON file of input items.
    Batch(BatchArgs),
    /// Verify the API key.
    Whoami,
}

/// Schema and output shaping shared by every extraction command.
#[derive(Args, Debug, Clone)]
struct ShapeArgs {
    /// JSON schema describing the data to extract.
    #[arg(long, conflicts_with = "schema_file")]
    schema: Option<String>,

    /// Read the JSON schema from a file.
    #[arg(long)]
    schema_file: Option<PathBuf>,

    /// Output field for the extracted data.
    #[arg(long, default_value = "extracted_data")]
    output_field: String,

    /// Omit status, filename and file_type.
    #[arg(long)]
    no_metadata: bool,

    /// Include the API's raw_response.
    #[arg(long)]
    no_simplify: bool,
}

#[derive(Args, Debug)]
struct BatchArgs {
    /// JSON file with an array of items ("-" reads stdin).
    items: PathBuf,

    #[arg(long, value_enum, default_value = "extract-file")]
    operation: OperationArg,

    #[arg(long, value_enum, default_value = "binary")]
    input_method: InputMethodArg,

    /// Binary field holding the file (binary input).
    #[arg(long, default_value = "data")]
    binary_field: String,

    /// File URL (url input); may be an expression.
    #[arg(long)]
    file_url: Option<String>,

    /// File path (path input); may be an expression.
    #[arg(long)]
    file_path: Option<String>,

    /// Text (text operation); may be an expression.
    #[arg(long)]
    text: Option<String>,

    /// Emit {error} records instead of aborting on the first failure.
    #[arg(long)]
    continue_on_fail: bool,

    /// Extra raw node parameter, KEY=VALUE (VALUE parsed as JSON if possible).
    #[arg(long = "param", value_name = "KEY=VALUE")]
    params: Vec<String>,

    #[command(flatten)]
    shape: ShapeArgs,
}

#[derive(ValueEnum, Clone, Debug)]
enum OperationArg {
    ExtractFile,
    ExtractText,
}

impl OperationArg {
    fn as_param(&self) -> &'static str {
        match self {
            OperationArg::ExtractFile => "extractFile",
            OperationArg::ExtractText => "extractText",
        }
    }
}

#[derive(ValueEnum, Clone, Debug)]
enum InputMethodArg {
    Binary,
    Url,
    Path,
}

impl InputMethodArg {
    fn as_param(&self) -> &'static str {
        match self {
            InputMethodArg::Binary => "binary",
            InputMethodArg::Url => "url",
            InputMethodArg::Path => "path",
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    let show_progress =
        !cli.quiet && !cli.no_progress && matches!(cli.command, Command::Batch(_));
    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet || show_progress {
        "error"
    } else {
        "info"
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();

    let transport = build_transport(&cli)?;
    let credentials = match cli.api_key.as_deref() {
        Some(key) => ApiCredentials::new(key),
        None => ApiCredentials::from_env(),
    }
    .context("An API key is required: pass --api-key or set EXTRACT_MONSTER_API_KEY")?;

    let mut builder = ExtractorConfig::builder().base_url(&cli.base_url);
    if show_progress {
        builder = builder.progress_callback(CliProgressCallback::new() as ProgressCallback);
    }
    let config = builder.build().context("Invalid configuration")?;

    match &cli.command {
        Command::Whoami => {
            let client = ExtractClient::with_transport(credentials, config, transport);
            client
                .verify_credentials()
                .await
                .context("Credential check failed")?;
            if !cli.quiet {
                eprintln!("{} API key accepted by {}", green("✔"), cli.base_url);
            }
        }
        Command::File { input, shape } => {
            let mut params = shape_params(shape).await?;
            params.insert("operation".into(), json!("extractFile"));
            if is_url(input) {
                params.insert("inputMethod".into(), json!("url"));
                params.insert("fileUrl".into(), json!(input));
            } else {
                params.insert("inputMethod".into(), json!("path"));
                params.insert("filePath".into(), json!(input));
            }
            let record = run_single(params, credentials, transport, &config).await?;
            write_output(&cli, &Value::Object(record.json))?;
        }
        Command::Text { text, shape } => {
            let text = if text == "-" {
                let mut buf = String::new();
                io::stdin()
                    .read_to_string(&mut buf)
                    .context("Failed to read text from stdin")?;
                buf
            } else {
                text.clone()
            };
            let mut params = shape_params(shape).await?;
            params.insert("operation".into(), json!("extractText"));
            params.insert("text".into(), json!(text));
            let record = run_single(params, credentials, transport, &config).await?;
            write_output(&cli, &Value::Object(record.json))?;
        }
        Command::Batch(args) => {
            let items = read_items(&args.items).await?;
            let params = batch_params(args).await?;
            let ctx = StaticContext::new(items)
                .with_parameters(params)
                .with_credentials(credentials)
                .continue_on_fail(args.continue_on_fail);

            match execute(&ctx, transport, &config).await {
                Ok(records) => write_output(&cli, &serde_json::to_value(&records)?)?,
                Err(aborted) => {
                    report_abort(&cli, &aborted)?;
                    return Err(aborted).context("Batch aborted");
                }
            }
        }
    }

    Ok(())
}

fn build_transport(cli: &Cli) -> Result<Arc<ReqwestTransport>> {
    let mut builder = ReqwestTransport::builder();
    if let Some(secs) = cli.timeout {
        builder = builder.timeout(Duration::from_secs(secs));
    }
    Ok(Arc::new(builder.build().context("Failed to build HTTP client")?))
}

/// Run the node over a single empty item.
async fn run_single(
    params: Map<String, Value>,
    credentials: ApiCredentials,
    transport: Arc<ReqwestTransport>,
    config: &ExtractorConfig,
) -> Result<OutputRecord> {
    let ctx = StaticContext::new(vec![InputItem::default()])
        .with_parameters(params)
        .with_credentials(credentials);

    let mut records = execute(&ctx, transport, config).await.map_err(|aborted| {
        let hint = error_hint(&aborted.error.source);
        let err = anyhow::Error::new(aborted.error.source);
        match hint {
            Some(h) => err.context(h),
            None => err,
        }
    })?;
    records.pop().context("Extraction produced no output")
}

/// Node parameters for `schema` and `options`.
async fn shape_params(shape: &ShapeArgs) -> Result<Map<String, Value>> {
    let mut params = Map::new();

    let schema = match (&shape.schema, &shape.schema_file) {
        (Some(s), _) => Some(s.clone()),
        (None, Some(path)) => Some(
            tokio::fs::read_to_string(path)
                .await
                .with_context(|| format!("Failed to read schema from {:?}", path))?,
        ),
        (None, None) => None,
    };
    if let Some(schema) = schema {
        params.insert("useSchema".into(), json!(true));
        params.insert("jsonSchema".into(), json!(schema));
    }

    params.insert(
        "options".into(),
        json!({
            "outputFieldName": shape.output_field,
            "includeMetadata": !shape.no_metadata,
            "simplify": !shape.no_simplify,
        }),
    );
    Ok(params)
}

async fn batch_params(args: &BatchArgs) -> Result<Map<String, Value>> {
    let mut params = shape_params(&args.shape).await?;
    params.insert("operation".into(), json!(args.operation.as_param()));
    params.insert("inputMethod".into(), json!(args.input_method.as_param()));
    params.insert("binaryPropertyName".into(), json!(args.binary_field));
    if let Some(url) = &args.file_url {
        params.insert("fileUrl".into(), json!(url));
    }
    if let Some(path) = &args.file_path {
        params.insert("filePath".into(), json!(path));
    }
    if let Some(text) = &args.text {
        params.insert("text".into(), json!(text));
    }
    for raw in &args.params {
        let (key, value) = parse_param(raw)?;
        params.insert(key, value);
    }
    Ok(params)
}

/// Parse `KEY=VALUE`; VALUE is JSON when it parses, else a string.
fn parse_param(raw: &str) -> Result<(String, Value)> {
    let Some((key, value)) = raw.split_once('=') else {
        bail!("Invalid --param '{}': expected KEY=VALUE", raw);
    };
    let key = key.trim();
    if key.is_empty() {
        bail!("Invalid --param '{}': empty key", raw);
    }
    let value = serde_json::from_str(value).unwrap_or_else(|_| Value::String(value.to_string()));
    Ok((key.to_string(), value))
}

async fn read_items(path: &PathBuf) -> Result<Vec<InputItem>> {
    let raw = if path.as_os_str() == "-" {
        let mut buf = String::new();
        io::stdin()
            .read_to_string(&mut buf)
            .context("Failed to read items from stdin")?;
        buf
    } else {
        tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read items from {:?}", path))?
    };
    parse_items(&raw)
}

fn parse_items(raw: &str) -> Result<Vec<InputItem>> {
    let values: Vec<Value> = serde_json::from_str(raw).context("Items file must be a JSON array")?;
    values
        .into_iter()
        .enumerate()
        .map(|(i, value)| match value {
            Value::Object(map) if map.contains_key("json") || map.contains_key("binary") => {
                serde_json::from_value(Value::Object(map))
                    .with_context(|| format!("Item {i} is not a valid item"))
            }
            Value::Object(map) => Ok(InputItem::from_json(map)),
            _ => bail!("Item {i} must be a JSON object"),
        })
        .collect()
}

fn error_hint(error: &ExtractError) -> Option<&'static str> {
    error.hint().or_else(|| {
        error
            .is_timeout()
            .then_some("The request timed out; raise --timeout or drop it to wait indefinitely.")
    })
}

fn report_abort(cli: &Cli, aborted: &RunAborted) -> Result<()> {
    if !aborted.completed.is_empty() {
        write_output(cli, &serde_json::to_value(&aborted.completed)?)?;
    }
    if let Some(hint) = error_hint(&aborted.error.source) {
        eprintln!("{} {}", red("hint:"), hint);
    }
    Ok(())
}

fn write_output(cli: &Cli, value: &Value) -> Result<()> {
    let json = serde_json::to_string_pretty(value).context("Failed to serialise output")?;
    match &cli.output {
        Some(path) => {
            std::fs::write(path, format!("{json}\n"))
                .with_context(|| format!("Failed to write {:?}", path))?;
            if !cli.quiet {
                eprintln!("{} wrote {}", green("✔"), bold(&path.display().to_string()));
            }
        }
        None => {
            let stdout = io::stdout();
            let mut handle = stdout.lock();
            handle
                .write_all(json.as_bytes())
                .context("Failed to write to stdout")?;
            handle.write_all(b"\n").ok();
        }
    }
    Ok(())
}
