//! HTTP client for the readiness/cache service
//!
//! Used by the delegated topology: poll `/status` until the service reports
//! initialized, then pull every cached source from `/objects`.

use std::time::Duration;

use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use url::Url;

use crate::error::{AutoLoadError, Result};
use crate::retry::RetryPolicy;
use crate::types::RawFile;

// ============================================================================
// Wire types
// ============================================================================

/// `GET /status`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusResponse {
    pub initialized: bool,
}

/// `GET /objects`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CachedObjects {
    #[serde(default)]
    pub collections: Vec<RawFile>,
    #[serde(default)]
    pub environments: Vec<RawFile>,
}

/// `POST /reload`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReloadResponse {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

// ============================================================================
// Client
// ============================================================================

#[derive(Debug, Clone)]
pub struct CacheClient {
    base_url: Url,
    client: Client,
}

impl CacheClient {
    pub fn new(base_url: Url, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| AutoLoadError::Cache(format!("failed to build HTTP client: {}", e)))?;
        Ok(Self { base_url, client })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    fn endpoint(&self, path: &str) -> Result<Url> {
        self.base_url
            .join(path)
            .map_err(|e| AutoLoadError::Cache(format!("invalid endpoint {}: {}", path, e)))
    }

    pub async fn status(&self) -> Result<StatusResponse> {
        let response = self
            .client
            .get(self.endpoint("status")?)
            .send()
            .await
            .map_err(transport)?;
        handle_response(response).await
    }

    /// Cached sources, or `None` while nothing has been cached yet
    pub async fn objects(&self) -> Result<Option<CachedObjects>> {
        let response = self
            .client
            .get(self.endpoint("objects")?)
            .send()
            .await
            .map_err(transport)?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        handle_response(response).await.map(Some)
    }

    pub async fn reload(&self) -> Result<ReloadResponse> {
        let response = self
            .client
            .post(self.endpoint("reload")?)
            .send()
            .await
            .map_err(transport)?;
        handle_response(response).await
    }

    /// Poll `/status` until initialized, within the policy's attempt budget
    ///
    /// Transport errors count as "not ready" so a service that is still
    /// starting up does not fail the run early.
    pub async fn wait_until_ready(&self, policy: RetryPolicy) -> Result<()> {
        let outcome = policy
            .run("readiness", |attempt| async move {
                match self.status().await {
                    Ok(StatusResponse { initialized: true }) => Ok(()),
                    Ok(_) => Err(format!("not initialized (attempt {})", attempt)),
                    Err(e) => Err(e.to_string()),
                }
            })
            .await;

        match outcome {
            Ok(()) => {
                info!(url = %self.base_url, "Cache service ready");
                Ok(())
            }
            Err(last) => {
                warn!(
                    url = %self.base_url,
                    attempts = policy.max_attempts,
                    last = %last,
                    "Cache service never became ready"
                );
                Err(AutoLoadError::ReadinessTimeout {
                    attempts: policy.max_attempts,
                })
            }
        }
    }
}

fn transport(err: reqwest::Error) -> AutoLoadError {
    AutoLoadError::Cache(err.to_string())
}

async fn handle_response<T: serde::de::DeserializeOwned>(response: reqwest::Response) -> Result<T> {
    if !response.status().is_success() {
        let status = response.status().as_u16();
        let body = response.text().await.unwrap_or_default();
        return Err(AutoLoadError::Cache(format!("HTTP {}: {}", status, body)));
    }

    let body = response.json().await.map_err(transport)?;
    debug!("Cache service response decoded");
    Ok(body)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client_for(server: &MockServer) -> CacheClient {
        let base = Url::parse(&format!("{}/", server.uri())).unwrap();
        CacheClient::new(base, Duration::from_secs(5)).unwrap()
    }

    fn fast(attempts: u32) -> RetryPolicy {
        RetryPolicy::new(attempts, Duration::from_millis(5))
    }

    #[tokio::test]
    async fn test_objects_404_is_none() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/objects"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        assert_eq!(client_for(&server).objects().await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_objects_decoded() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/objects"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "collections": [
                    { "name": "a.json", "content": { "collection": [] }, "kind": "structured" }
                ],
                "environments": []
            })))
            .mount(&server)
            .await;

        let objects = client_for(&server).objects().await.unwrap().unwrap();
        assert_eq!(objects.collections[0].name, "a.json");
    }

    #[tokio::test]
    async fn test_wait_until_ready_times_out() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/status"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "initialized": false })))
            .expect(3)
            .mount(&server)
            .await;

        let err = client_for(&server).wait_until_ready(fast(3)).await.unwrap_err();
        assert!(matches!(err, AutoLoadError::ReadinessTimeout { attempts: 3 }));
    }

    #[tokio::test]
    async fn test_wait_until_ready_after_flip() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/status"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "initialized": false })))
            .up_to_n_times(2)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/status"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "initialized": true })))
            .mount(&server)
            .await;

        client_for(&server).wait_until_ready(fast(10)).await.unwrap();
    }

    #[tokio::test]
    async fn test_reload_server_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/reload"))
            .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
            .mount(&server)
            .await;

        let err = client_for(&server).reload().await.unwrap_err();
        assert!(err.to_string().contains("500"));
    }
}
