//! Request construction: one tagged request description, one serializer.
//!
//! File payloads go to `/v1/extract/file` as `multipart/form-data` with a
//! `file` part and an optional `schema` part. Text goes to
//! `/v1/extract/text` as `application/x-www-form-urlencoded` with `text` and
//! an optional `schema` field. Both carry the bearer token. Bodies are built
//! fully in memory.

use crate::config::ExtractorConfig;
use crate::credentials::ApiCredentials;
use crate::pipeline::input::{FilePayload, ResolvedInput};
use crate::transport::HttpRequest;
use tracing::debug;

/// One call to the extraction API.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExtractionRequest {
    File {
        payload: FilePayload,
        schema: Option<String>,
    },
    Text {
        text: String,
        schema: Option<String>,
    },
}

impl ExtractionRequest {
    pub fn from_input(input: ResolvedInput, schema: Option<String>) -> Self {
        match input {
            ResolvedInput::File(payload) => ExtractionRequest::File { payload, schema },
            ResolvedInput::Text(text) => ExtractionRequest::Text { text, schema },
        }
    }

    pub fn schema(&self) -> Option<&str> {
        match self {
            ExtractionRequest::File { schema, .. } | ExtractionRequest::Text { schema, .. } => {
                schema.as_deref()
            }
        }
    }

    /// Serialize into the HTTP request for the matching endpoint.
    pub fn to_http(&self, config: &ExtractorConfig, credentials: &ApiCredentials) -> HttpRequest {
        let request = match self {
            ExtractionRequest::File { payload, schema } => {
                let boundary = boundary_for(payload, schema.as_deref());
                let body = multipart_body(payload, schema.as_deref(), &boundary);
                debug!(
                    "File request: '{}' ({} bytes body, schema: {})",
                    payload.file_name,
                    body.len(),
                    schema.is_some()
                );
                HttpRequest::post(config.file_endpoint(), body).header(
                    "Content-Type",
                    format!("multipart/form-data; boundary={boundary}"),
                )
            }
            ExtractionRequest::Text { text, schema } => {
                let body = form_body(text, schema.as_deref());
                debug!("Text request: {} bytes body, schema: {}", body.len(), schema.is_some());
                HttpRequest::post(config.text_endpoint(), body.into_bytes())
                    .header("Content-Type", "application/x-www-form-urlencoded")
            }
        };
        request.header("Authorization", credentials.bearer())
    }
}

/// Encode `text` (and `schema`) as `application/x-www-form-urlencoded`.
///
/// Spaces become `+`; everything outside the unreserved set is
/// percent-encoded.
pub fn form_body(text: &str, schema: Option<&str>) -> String {
    let mut serializer = url::form_urlencoded::Serializer::new(String::new());
    serializer.append_pair("text", text);
    if let Some(schema) = schema {
        serializer.append_pair("schema", schema);
    }
    serializer.finish()
}

/// Assemble a `multipart/form-data` body with the given boundary.
pub fn multipart_body(payload: &FilePayload, schema: Option<&str>, boundary: &str) -> Vec<u8> {
    let mut body = Vec::with_capacity(payload.bytes.len() + 256);

    body.extend_from_slice(format!("--{boundary}\r\n").as_bytes());
    body.extend_from_slice(
        format!(
            "Content-Disposition: form-data; name=\"file\"; filename=\"{}\"\r\n",
            header_safe_filename(&payload.file_name)
        )
        .as_bytes(),
    );
    if let Some(mime) = &payload.mime_type {
        body.extend_from_slice(format!("Content-Type: {mime}\r\n").as_bytes());
    }
    body.extend_from_slice(b"\r\n");
    body.extend_from_slice(&payload.bytes);
    body.extend_from_slice(b"\r\n");

    if let Some(schema) = schema {
        body.extend_from_slice(format!("--{boundary}\r\n").as_bytes());
        body.extend_from_slice(b"Content-Disposition: form-data; name=\"schema\"\r\n\r\n");
        body.extend_from_slice(schema.as_bytes());
        body.extend_from_slice(b"\r\n");
    }

    body.extend_from_slice(format!("--{boundary}--\r\n").as_bytes());
    body
}

/// A random boundary that occurs in neither the file nor the schema.
fn boundary_for(payload: &FilePayload, schema: Option<&str>) -> String {
    loop {
        let boundary = format!("----FormBoundary{}", uuid::Uuid::new_v4().simple());
        let needle = boundary.as_bytes();
        let in_file = payload.bytes.windows(needle.len()).any(|w| w == needle);
        let in_schema = schema.is_some_and(|s| s.contains(&boundary));
        if !in_file && !in_schema {
            return boundary;
        }
    }
}

fn header_safe_filename(name: &str) -> String {
    name.chars()
        .filter(|c| *c != '\r' && *c != '\n')
        .collect::<String>()
        .replace('"', "%22")
}
