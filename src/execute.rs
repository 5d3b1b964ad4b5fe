//! Node execution: run the extraction pipeline over every input item.
//!
//! Items are processed strictly one after another. Each produces exactly one
//! [`OutputRecord`] at its own index: the normalized response on success, or
//! `{error: message}` when the item fails and the host has continue-on-failure
//! enabled. With it disabled the first failure stops the run and is returned
//! as [`RunAborted`] along with the records completed before it.
//!
//! `operation`, `useSchema` and the credential are resolved once, before the
//! loop. A bad `operation` or `useSchema` aborts the run (attributed to item
//! 0). A missing credential fails every item: with continue-on-failure each
//! gets an `{error}` record, otherwise the run aborts at item 0.

use crate::client::ExtractClient;
use crate::config::{ExtractorConfig, NodeParameters, RunParameters};
use crate::context::NodeContext;
use crate::error::{ExtractError, NodeError, RunAborted};
use crate::output::OutputRecord;
use crate::pipeline::input::resolve_input;
use crate::pipeline::request::ExtractionRequest;
use crate::pipeline::response::normalize;
use crate::transport::HttpTransport;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Execute the node over all items supplied by `ctx`.
///
/// # Returns
/// One record per input item, in input order.
///
/// # Errors
/// [`RunAborted`] when run-level setup fails, or when an item fails while
/// continue-on-failure is off.
pub async fn execute(
    ctx: &dyn NodeContext,
    transport: Arc<dyn HttpTransport>,
    config: &ExtractorConfig,
) -> Result<Vec<OutputRecord>, RunAborted> {
    let start = Instant::now();
    let total = ctx.item_count();
    let continue_on_fail = ctx.continue_on_fail();

    let run = RunParameters::resolve(ctx).map_err(|e| RunAborted {
        error: NodeError::new(0, e),
        completed: Vec::new(),
    })?;

    info!(
        "Executing {:?} over {} items (schema: {}, continue on fail: {})",
        run.operation, total, run.use_schema, continue_on_fail
    );

    let client = match ctx.credentials() {
        Ok(credentials) => Ok(ExtractClient::with_transport(
            credentials,
            config.clone(),
            transport,
        )),
        Err(e) if continue_on_fail => {
            warn!("Credentials unavailable, every item will fail: {}", e);
            Err(e)
        }
        Err(e) => {
            return Err(RunAborted {
                error: NodeError::new(0, e),
                completed: Vec::new(),
            })
        }
    };

    if let Some(ref cb) = config.progress_callback {
        cb.on_run_start(total);
    }

    let mut records = Vec::with_capacity(total);
    let mut succeeded = 0usize;

    for index in 0..total {
        if let Some(ref cb) = config.progress_callback {
            cb.on_item_start(index, total);
        }

        let result = match &client {
            Ok(client) => process_item(client, ctx, &run, index).await,
            Err(e) => Err(e.clone()),
        };

        match result {
            Ok(record) => {
                succeeded += 1;
                if let Some(ref cb) = config.progress_callback {
                    cb.on_item_complete(index, total);
                }
                records.push(record);
            }
            Err(e) => {
                let message = e.to_string();
                if let Some(ref cb) = config.progress_callback {
                    cb.on_item_error(index, total, &message);
                }
                if !continue_on_fail {
                    warn!("Item {} failed, aborting run: {}", index, message);
                    if let Some(ref cb) = config.progress_callback {
                        cb.on_run_aborted(index, total);
                    }
                    return Err(RunAborted {
                        error: NodeError::new(index, e),
                        completed: records,
                    });
                }
                warn!("Item {} failed, continuing: {}", index, message);
                records.push(OutputRecord::error(message, index));
            }
        }
    }

    if let Some(ref cb) = config.progress_callback {
        cb.on_run_complete(total, succeeded);
    }

    info!(
        "Run complete: {}/{} items succeeded in {}ms",
        succeeded,
        total,
        start.elapsed().as_millis()
    );

    Ok(records)
}

/// Resolve, send and normalize a single item.
async fn process_item(
    client: &ExtractClient,
    ctx: &dyn NodeContext,
    run: &RunParameters,
    index: usize,
) -> Result<OutputRecord, ExtractError> {
    let params = NodeParameters::resolve(ctx, run, index)?;
    debug!("Item {}: {} input", index, source_kind(&params));

    let input = resolve_input(&params.source, index, ctx, client.transport()).await?;
    let request = ExtractionRequest::from_input(input, params.schema);
    let response = client.extract(&request).await?;

    Ok(OutputRecord::new(normalize(&response, &params.options), index))
}

fn source_kind(params: &NodeParameters) -> &'static str {
    use crate::pipeline::input::InputSource;
    match params.source {
        InputSource::Binary { .. } => "binary",
        InputSource::Url(_) => "url",
        InputSource::Path(_) => "path",
        InputSource::Text(_) => "text",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::{BinaryData, InputItem, StaticContext};
    use crate::credentials::ApiCredentials;
    use crate::error::TransportError;
    use crate::progress::ItemProgressCallback;
    use crate::transport::{HttpRequest, HttpResponse};
    use async_trait::async_trait;
    use serde_json::{json, Value};
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    /// Replays queued responses and records every request.
    #[derive(Default)]
    struct ScriptedTransport {
        responses: Mutex<VecDeque<HttpResponse>>,
        requests: Mutex<Vec<HttpRequest>>,
    }

    impl ScriptedTransport {
        fn with(responses: Vec<Value>) -> Arc<Self> {
            Arc::new(Self {
                responses: Mutex::new(
                    responses
                        .into_iter()
                        .map(|v| HttpResponse::new(200, &[], v.to_string().into_bytes()))
                        .collect(),
                ),
                requests: Mutex::new(Vec::new()),
            })
        }

        fn request_count(&self) -> usize {
            self.requests.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl HttpTransport for ScriptedTransport {
        async fn send(&self, request: HttpRequest) -> Result<HttpResponse, TransportError> {
            self.requests.lock().unwrap().push(request);
            self.responses
                .lock()
                .unwrap()
                .pop_front()
                .ok_or_else(|| TransportError::new("no scripted response"))
        }
    }

    fn text_items(n: usize) -> Vec<InputItem> {
        (0..n)
            .map(|i| match json!({"body": format!("Invoice #{i}")}) {
                Value::Object(map) => InputItem::from_json(map),
                _ => unreachable!(),
            })
            .collect()
    }

    fn text_ctx(n: usize) -> StaticContext {
        StaticContext::new(text_items(n))
            .with_parameter("operation", "extractText")
            .with_parameter("text", "={{ $json.body }}")
            .with_credentials(ApiCredentials::new("em_test").unwrap())
    }

    #[tokio::test]
    async fn one_record_per_item_in_order() {
        let transport = ScriptedTransport::with(vec![
            json!({"status": "ok", "extracted_data": {"n": 0}}),
            json!({"status": "ok", "extracted_data": {"n": 1}}),
        ]);
        let records = execute(&text_ctx(2), transport.clone(), &ExtractorConfig::default())
            .await
            .unwrap();

        assert_eq!(records.len(), 2);
        assert_eq!(records[1].item_index(), 1);
        assert_eq!(records[1].json["extracted_data"], json!({"n": 1}));

        let requests = transport.requests.lock().unwrap();
        assert_eq!(requests[0].body.as_deref(), Some(&b"text=Invoice+%230"[..]));
        assert_eq!(requests[1].body.as_deref(), Some(&b"text=Invoice+%231"[..]));
    }

    #[tokio::test]
    async fn continue_on_fail_substitutes_error_record() {
        let transport = ScriptedTransport::with(vec![
            json!({"status": "error", "error_code": "invalid_schema"}),
            json!({"status": "ok", "extracted_data": {"ok": true}}),
        ]);
        let ctx = text_ctx(2).continue_on_fail(true);
        let records = execute(&ctx, transport, &ExtractorConfig::default())
            .await
            .unwrap();

        assert_eq!(records.len(), 2);
        assert!(records[0].is_error());
        assert_eq!(records[0].item_index(), 0);
        assert!(records[0].json["error"]
            .as_str()
            .unwrap()
            .contains("invalid_schema"));
        assert_eq!(records[1].json["status"], json!("ok"));
    }

    #[tokio::test]
    async fn failure_aborts_and_keeps_completed_records() {
        let transport = ScriptedTransport::with(vec![
            json!({"status": "ok", "extracted_data": {}}),
            json!({"status": "error"}),
            json!({"status": "ok", "extracted_data": {}}),
        ]);
        let err = execute(&text_ctx(3), transport.clone(), &ExtractorConfig::default())
            .await
            .unwrap_err();

        assert_eq!(err.item_index(), 1);
        assert_eq!(err.completed.len(), 1);
        assert!(err.to_string().contains("unknown_error"));
        assert_eq!(transport.request_count(), 2, "third item must not run");
    }

    #[tokio::test]
    async fn missing_binary_makes_no_http_call() {
        let transport = ScriptedTransport::with(vec![]);
        let ctx = StaticContext::new(vec![InputItem::default()])
            .with_credentials(ApiCredentials::new("em_test").unwrap());

        let err = execute(&ctx, transport.clone(), &ExtractorConfig::default())
            .await
            .unwrap_err();

        assert!(matches!(
            err.error.source,
            ExtractError::MissingBinaryData { .. }
        ));
        assert_eq!(transport.request_count(), 0);
    }

    #[tokio::test]
    async fn binary_item_is_uploaded_as_multipart() {
        let transport = ScriptedTransport::with(vec![json!({
            "status": "ok",
            "filename": "scan.png",
            "file_type": "image",
            "extracted_data": {"total": 9.5}
        })]);
        let item = InputItem::default().with_binary(
            "attachment",
            BinaryData::new(b"PNGDATA".to_vec())
                .with_file_name("scan.png")
                .with_mime_type("image/png"),
        );
        let ctx = StaticContext::new(vec![item])
            .with_parameter("binaryPropertyName", "attachment")
            .with_parameter("useSchema", true)
            .with_parameter("jsonSchema", r#"{"total":{"type":"number"}}"#)
            .with_credentials(ApiCredentials::new("em_test").unwrap());

        let records = execute(&ctx, transport.clone(), &ExtractorConfig::default())
            .await
            .unwrap();
        assert_eq!(
            Value::Object(records[0].json.clone()),
            json!({
                "status": "ok",
                "filename": "scan.png",
                "file_type": "image",
                "extracted_data": {"total": 9.5}
            })
        );

        let requests = transport.requests.lock().unwrap();
        let body = String::from_utf8(requests[0].body.clone().unwrap()).unwrap();
        assert!(requests[0].url.ends_with("/v1/extract/file"));
        assert!(body.contains("filename=\"scan.png\""));
        assert!(body.contains("Content-Type: image/png\r\n"));
        assert!(body.contains("name=\"schema\"\r\n\r\n{\"total\":{\"type\":\"number\"}}\r\n"));
    }

    #[tokio::test]
    async fn missing_credentials_fail_every_item_under_continue_on_fail() {
        let transport = ScriptedTransport::with(vec![]);
        let ctx = StaticContext::new(text_items(2))
            .with_parameter("operation", "extractText")
            .with_parameter("text", "x")
            .continue_on_fail(true);

        let records = execute(&ctx, transport.clone(), &ExtractorConfig::default())
            .await
            .unwrap();

        assert_eq!(records.len(), 2);
        for (i, record) in records.iter().enumerate() {
            assert!(record.is_error());
            assert_eq!(record.item_index(), i);
            assert_eq!(
                record.json["error"],
                json!("No Extract Monster API key configured")
            );
        }
        assert_eq!(transport.request_count(), 0);
    }

    #[tokio::test]
    async fn missing_credentials_abort_at_first_item() {
        let transport = ScriptedTransport::with(vec![]);
        let ctx = StaticContext::new(text_items(2))
            .with_parameter("operation", "extractText")
            .with_parameter("text", "x");

        let err = execute(&ctx, transport.clone(), &ExtractorConfig::default())
            .await
            .unwrap_err();
        assert_eq!(err.item_index(), 0);
        assert!(err.completed.is_empty());
        assert!(matches!(err.error.source, ExtractError::MissingCredentials));
        assert_eq!(transport.request_count(), 0);
    }

    #[tokio::test]
    async fn progress_events_are_reported() {
        #[derive(Default)]
        struct Counter {
            completes: AtomicUsize,
            errors: AtomicUsize,
            success_total: AtomicUsize,
        }

        impl ItemProgressCallback for Counter {
            fn on_item_complete(&self, _item_index: usize, _total_items: usize) {
                self.completes.fetch_add(1, Ordering::SeqCst);
            }
            fn on_item_error(&self, _item_index: usize, _total_items: usize, _error: &str) {
                self.errors.fetch_add(1, Ordering::SeqCst);
            }
            fn on_run_complete(&self, _total_items: usize, success_count: usize) {
                self.success_total.store(success_count, Ordering::SeqCst);
            }
        }

        let counter = Arc::new(Counter::default());
        let config = ExtractorConfig::builder()
            .progress_callback(counter.clone())
            .build()
            .unwrap();
        let transport = ScriptedTransport::with(vec![
            json!({"status": "ok"}),
            json!({"status": "error", "error_code": "bad_input"}),
        ]);

        execute(&text_ctx(2).continue_on_fail(true), transport, &config)
            .await
            .unwrap();

        assert_eq!(counter.completes.load(Ordering::SeqCst), 1);
        assert_eq!(counter.errors.load(Ordering::SeqCst), 1);
        assert_eq!(counter.success_total.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn abort_is_reported_instead_of_completion() {
        #[derive(Default)]
        struct Outcome {
            aborted_at: Mutex<Option<usize>>,
            completed: AtomicUsize,
        }

        impl ItemProgressCallback for Outcome {
            fn on_run_complete(&self, _total_items: usize, _success_count: usize) {
                self.completed.fetch_add(1, Ordering::SeqCst);
            }
            fn on_run_aborted(&self, item_index: usize, _total_items: usize) {
                *self.aborted_at.lock().unwrap() = Some(item_index);
            }
        }

        let outcome = Arc::new(Outcome::default());
        let config = ExtractorConfig::builder()
            .progress_callback(outcome.clone())
            .build()
            .unwrap();
        let transport = ScriptedTransport::with(vec![
            json!({"status": "ok"}),
            json!({"status": "error"}),
        ]);

        execute(&text_ctx(3), transport, &config).await.unwrap_err();

        assert_eq!(*outcome.aborted_at.lock().unwrap(), Some(1));
        assert_eq!(outcome.completed.load(Ordering::SeqCst), 0);
    }
}
