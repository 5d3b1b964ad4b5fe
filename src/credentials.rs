//! Extract Monster API credentials.
//!
//! A single secret, sent as `Authorization: Bearer <key>` on every call.

use crate::error::ExtractError;
use crate::transport::{HttpRequest, HttpTransport};
use std::fmt;
use tracing::{debug, warn};

/// Environment variable consulted by [`ApiCredentials::from_env`].
pub const API_KEY_ENV: &str = "EXTRACT_MONSTER_API_KEY";

/// The API key. `Debug` output is redacted.
#[derive(Clone, PartialEq, Eq)]
pub struct ApiCredentials {
    api_key: String,
}

impl ApiCredentials {
    /// Wrap a key. Empty or whitespace-only keys are rejected.
    pub fn new(api_key: impl Into<String>) -> Result<Self, ExtractError> {
        let api_key = api_key.into();
        if api_key.trim().is_empty() {
            return Err(ExtractError::MissingCredentials);
        }
        Ok(Self { api_key })
    }

    /// Read the key from `EXTRACT_MONSTER_API_KEY`.
    pub fn from_env() -> Result<Self, ExtractError> {
        match std::env::var(API_KEY_ENV) {
            Ok(key) => Self::new(key),
            Err(_) => Err(ExtractError::MissingCredentials),
        }
    }

    pub fn api_key(&self) -> &str {
        &self.api_key
    }

    /// Value for the `Authorization` header.
    pub fn bearer(&self) -> String {
        format!("Bearer {}", self.api_key)
    }

    /// Probe `GET {base_url}/me` to check the key is accepted.
    pub async fn verify(
        &self,
        transport: &dyn HttpTransport,
        base_url: &str,
    ) -> Result<(), ExtractError> {
        let url = format!("{}/me", base_url.trim_end_matches('/'));
        debug!("Verifying API key against {}", url);

        let response = transport
            .send(HttpRequest::get(url).header("Authorization", self.bearer()))
            .await?;

        if response.is_success() {
            Ok(())
        } else {
            warn!("Credential probe returned {}", response.status);
            Err(ExtractError::CredentialRejected {
                status: response.status.as_u16(),
            })
        }
    }
}

impl fmt::Debug for ApiCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ApiCredentials")
            .field("api_key", &"<redacted>")
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::TransportError;
    use crate::transport::HttpResponse;
    use async_trait::async_trait;
    use std::sync::Mutex;

    struct FixedStatus {
        status: u16,
        seen: Mutex<Vec<HttpRequest>>,
    }

    #[async_trait]
    impl HttpTransport for FixedStatus {
        async fn send(&self, request: HttpRequest) -> Result<HttpResponse, TransportError> {
            self.seen.lock().unwrap().push(request);
            Ok(HttpResponse::new(self.status, &[], b"{}".to_vec()))
        }
    }

    #[test]
    fn empty_key_is_rejected() {
        assert!(matches!(
            ApiCredentials::new("  "),
            Err(ExtractError::MissingCredentials)
        ));
    }

    #[test]
    fn debug_redacts_key() {
        let creds = ApiCredentials::new("em_secret").unwrap();
        let dbg = format!("{creds:?}");
        assert!(!dbg.contains("em_secret"));
        assert_eq!(creds.bearer(), "Bearer em_secret");
    }

    #[test]
    fn verify_hits_me_endpoint() {
        let transport = FixedStatus {
            status: 200,
            seen: Mutex::new(Vec::new()),
        };
        let creds = ApiCredentials::new("em_key").unwrap();
        tokio_test::block_on(creds.verify(&transport, "https://api.extract.monster/"))
            .expect("probe should pass");

        let seen = transport.seen.lock().unwrap();
        assert_eq!(seen[0].url, "https://api.extract.monster/me");
        assert_eq!(seen[0].header_value("Authorization"), Some("Bearer em_key"));
    }

    #[test]
    fn verify_reports_rejection() {
        let transport = FixedStatus {
            status: 401,
            seen: Mutex::new(Vec::new()),
        };
        let creds = ApiCredentials::new("bad").unwrap();
        let err = tokio_test::block_on(creds.verify(&transport, "https://api.extract.monster"))
            .unwrap_err();
        assert!(matches!(err, ExtractError::CredentialRejected { status: 401 }));
    }
}
