//! HTTP collaborator: the one seam through which every network call passes.
//!
//! The pipeline never talks to `reqwest` directly. It builds an
//! [`HttpRequest`] and hands it to an [`HttpTransport`], which returns the
//! status, full header map and raw body. Hosts with their own HTTP stack
//! implement the trait; everyone else uses [`ReqwestTransport`]. Tests
//! substitute an in-memory recorder.
//!
//! Non-2xx responses are *not* errors at this layer. Callers decide: a
//! download treats them as a failure, an API call first checks whether the
//! body carries a structured error.

use crate::error::TransportError;
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::{Method, StatusCode};
use std::borrow::Cow;
use std::time::Duration;
use tracing::debug;

/// A fully materialised request. The body is built in memory before sending.
#[derive(Debug, Clone)]
pub struct HttpRequest {
    pub method: Method,
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub body: Option<Vec<u8>>,
}

impl HttpRequest {
    pub fn get(url: impl Into<String>) -> Self {
        Self {
            method: Method::GET,
            url: url.into(),
            headers: Vec::new(),
            body: None,
        }
    }

    pub fn post(url: impl Into<String>, body: Vec<u8>) -> Self {
        Self {
            method: Method::POST,
            url: url.into(),
            headers: Vec::new(),
            body: Some(body),
        }
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Case-insensitive header lookup.
    pub fn header_value(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

/// Status, headers and body of a completed exchange.
#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Vec<u8>,
}

impl HttpResponse {
    /// Build a response from parts; mainly for transports and tests.
    pub fn new(status: u16, headers: &[(&str, &str)], body: impl Into<Vec<u8>>) -> Self {
        let mut map = HeaderMap::new();
        for (k, v) in headers {
            if let (Ok(name), Ok(value)) = (
                HeaderName::from_bytes(k.as_bytes()),
                HeaderValue::from_bytes(v.as_bytes()),
            ) {
                map.append(name, value);
            }
        }
        Self {
            status: StatusCode::from_u16(status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR),
            headers: map,
            body: body.into(),
        }
    }

    /// First value of a header as text, if present.
    ///
    /// Non-ASCII bytes are decoded as UTF-8, lossily.
    pub fn header(&self, name: &str) -> Option<Cow<'_, str>> {
        self.headers
            .get(name)
            .map(|v| String::from_utf8_lossy(v.as_bytes()))
    }

    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }
}

/// Anything that can carry out an [`HttpRequest`].
#[async_trait]
pub trait HttpTransport: Send + Sync {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, TransportError>;
}

/// [`HttpTransport`] backed by a shared `reqwest::Client`.
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl ReqwestTransport {
    /// A transport with reqwest defaults (no timeout).
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
        }
    }

    pub fn builder() -> ReqwestTransportBuilder {
        ReqwestTransportBuilder::default()
    }

    /// Wrap an already configured client.
    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

impl Default for ReqwestTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl HttpTransport for ReqwestTransport {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, TransportError> {
        debug!("{} {}", request.method, request.url);

        let mut builder = self.client.request(request.method, &request.url);
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if let Some(body) = request.body {
            builder = builder.body(body);
        }

        let response = builder.send().await?;
        let status = response.status();
        let headers = response.headers().clone();
        let body = response.bytes().await?.to_vec();

        debug!("→ {} ({} bytes)", status, body.len());

        Ok(HttpResponse {
            status,
            headers,
            body,
        })
    }
}

/// Builder for [`ReqwestTransport`].
///
/// Timeouts are a transport concern; the extraction pipeline applies none.
#[derive(Debug, Default)]
pub struct ReqwestTransportBuilder {
    timeout: Option<Duration>,
    user_agent: Option<String>,
}

impl ReqwestTransportBuilder {
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn user_agent(mut self, ua: impl Into<String>) -> Self {
        self.user_agent = Some(ua.into());
        self
    }

    pub fn build(self) -> Result<ReqwestTransport, TransportError> {
        let mut builder = reqwest::Client::builder();
        if let Some(timeout) = self.timeout {
            builder = builder.timeout(timeout);
        }
        let ua = self
            .user_agent
            .unwrap_or_else(|| concat!("extract-monster/", env!("CARGO_PKG_VERSION")).to_string());
        builder = builder.user_agent(ua);
        Ok(ReqwestTransport::with_client(builder.build()?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_header_lookup_ignores_case() {
        let req = HttpRequest::get("https://x.test/").header("Authorization", "Bearer k");
        assert_eq!(req.header_value("authorization"), Some("Bearer k"));
        assert_eq!(req.header_value("content-type"), None);
    }

    #[test]
    fn response_header_lookup() {
        let resp = HttpResponse::new(
            200,
            &[("Content-Type", "application/pdf")],
            b"%PDF".to_vec(),
        );
        assert!(resp.is_success());
        assert_eq!(resp.header("content-type").as_deref(), Some("application/pdf"));
        assert_eq!(resp.header("content-disposition"), None);
    }

    #[test]
    fn response_header_keeps_utf8_text() {
        let resp = HttpResponse::new(
            200,
            &[("Content-Disposition", "attachment; filename=\"résumé.pdf\"")],
            Vec::new(),
        );
        assert_eq!(
            resp.header("content-disposition").as_deref(),
            Some("attachment; filename=\"résumé.pdf\"")
        );
    }

    #[test]
    fn builder_applies_options() {
        let transport = ReqwestTransport::builder()
            .timeout(Duration::from_secs(5))
            .user_agent("test-agent")
            .build();
        assert!(transport.is_ok());
    }
}
