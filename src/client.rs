//! Standalone client for the extraction API.
//!
//! [`ExtractClient`] is usable without any workflow host: give it a key and
//! call [`ExtractClient::extract_text`], [`ExtractClient::extract_file`] and
//! friends. The node executor in [`crate::execute`] is built on top of it.
//!
//! ```rust,no_run
//! use extract_monster::{ApiCredentials, ExtractClient, ExtractorConfig};
//!
//! # #[tokio::main]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let client = ExtractClient::new(ApiCredentials::from_env()?, ExtractorConfig::default());
//! let response = client
//!     .extract_text("Invoice #12345 dated 2024-01-15 for $500.00", None)
//!     .await?;
//! println!("{:?}", response.extracted_data);
//! # Ok(())
//! # }
//! ```

use crate::config::ExtractorConfig;
use crate::credentials::ApiCredentials;
use crate::error::ExtractError;
use crate::pipeline::input::{self, FilePayload};
use crate::pipeline::request::ExtractionRequest;
use crate::pipeline::response::{parse_api_response, ApiResponse};
use crate::transport::{HttpTransport, ReqwestTransport};
use std::fmt;
use std::sync::Arc;
use tracing::debug;

/// Extraction API client. Cheap to clone.
#[derive(Clone)]
pub struct ExtractClient {
    transport: Arc<dyn HttpTransport>,
    credentials: ApiCredentials,
    config: ExtractorConfig,
}

impl fmt::Debug for ExtractClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExtractClient")
            .field("credentials", &self.credentials)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl ExtractClient {
    /// A client using [`ReqwestTransport`] defaults.
    pub fn new(credentials: ApiCredentials, config: ExtractorConfig) -> Self {
        Self::with_transport(credentials, config, Arc::new(ReqwestTransport::new()))
    }

    pub fn with_transport(
        credentials: ApiCredentials,
        config: ExtractorConfig,
        transport: Arc<dyn HttpTransport>,
    ) -> Self {
        Self {
            transport,
            credentials,
            config,
        }
    }

    pub fn config(&self) -> &ExtractorConfig {
        &self.config
    }

    pub fn transport(&self) -> &dyn HttpTransport {
        self.transport.as_ref()
    }

    /// Issue exactly one API call for `request`.
    pub async fn extract(&self, request: &ExtractionRequest) -> Result<ApiResponse, ExtractError> {
        let http = request.to_http(&self.config, &self.credentials);
        debug!("POST {}", http.url);
        let response = self.transport.send(http).await?;
        parse_api_response(&response)
    }

    pub async fn extract_text(
        &self,
        text: impl Into<String>,
        schema: Option<&str>,
    ) -> Result<ApiResponse, ExtractError> {
        self.extract(&ExtractionRequest::Text {
            text: text.into(),
            schema: schema.map(str::to_string),
        })
        .await
    }

    pub async fn extract_file(
        &self,
        payload: FilePayload,
        schema: Option<&str>,
    ) -> Result<ApiResponse, ExtractError> {
        self.extract(&ExtractionRequest::File {
            payload,
            schema: schema.map(str::to_string),
        })
        .await
    }

    /// Download `url`, then extract from it.
    pub async fn extract_url(
        &self,
        url: &str,
        schema: Option<&str>,
    ) -> Result<ApiResponse, ExtractError> {
        let payload = input::download(url, self.transport.as_ref()).await?;
        self.extract_file(payload, schema).await
    }

    /// Read a local file (with `~` expansion), then extract from it.
    pub async fn extract_path(
        &self,
        path: &str,
        schema: Option<&str>,
    ) -> Result<ApiResponse, ExtractError> {
        let payload = input::read_path(path).await?;
        self.extract_file(payload, schema).await
    }

    /// Check the API key against `GET /me`.
    pub async fn verify_credentials(&self) -> Result<(), ExtractError> {
        self.credentials
            .verify(self.transport.as_ref(), &self.config.base_url)
            .await
    }
}
