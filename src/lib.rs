//! # extract-monster
//!
//! Extract structured JSON from documents, images and plain text with the
//! [Extract Monster](https://extract.monster) API.
//!
//! The crate has two layers:
//!
//! * [`ExtractClient`] — a plain API client. One call per request, no
//!   retries, bearer-token auth.
//! * [`execute`] — the workflow node. It walks a list of input items supplied
//!   by a [`NodeContext`] (the host), resolves each item's payload, calls the
//!   API and shapes the response into one [`OutputRecord`] per item.
//!
//! ## Pipeline Overview
//!
//! ```text
//! item
//!  │
//!  ├─ 1. Input     binary field │ URL download │ local path │ text
//!  ├─ 2. Request   multipart (file) or form-encoded (text) + optional schema
//!  ├─ 3. Transport POST /v1/extract/{file,text}, exactly once
//!  └─ 4. Output    status/filename/file_type + extracted data, or {error}
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use extract_monster::{execute, ApiCredentials, ExtractorConfig, InputItem, StaticContext};
//! use extract_monster::transport::ReqwestTransport;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let ctx = StaticContext::new(vec![InputItem::default()])
//!         .with_parameter("operation", "extractText")
//!         .with_parameter("text", "Invoice #12345 dated 2024-01-15 for $500.00")
//!         .with_credentials(ApiCredentials::from_env()?);
//!
//!     let records = execute(&ctx, Arc::new(ReqwestTransport::new()), &ExtractorConfig::default()).await?;
//!     println!("{}", serde_json::to_string_pretty(&records)?);
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `extract-monster` binary (clap + anyhow + tracing-subscriber + indicatif) |

// ── Modules ──────────────────────────────────────────────────────────────

pub mod client;
pub mod config;
pub mod context;
pub mod credentials;
pub mod error;
pub mod execute;
pub mod output;
pub mod pipeline;
pub mod progress;
pub mod transport;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use client::ExtractClient;
pub use config::{
    ExtractorConfig, ExtractorConfigBuilder, InputMethod, NodeParameters, Operation,
    OutputOptions, RunParameters,
};
pub use context::{BinaryData, InputItem, NodeContext, StaticContext};
pub use credentials::ApiCredentials;
pub use error::{ExtractError, NodeError, RunAborted, TransportError};
pub use execute::execute;
pub use output::{OutputRecord, PairedItem};
pub use pipeline::input::{FilePayload, InputSource, ResolvedInput};
pub use pipeline::request::ExtractionRequest;
pub use pipeline::response::ApiResponse;
pub use progress::{ItemProgressCallback, NoopProgressCallback, ProgressCallback};
