//! etcd v2 keys API client

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Method, RequestBuilder, Response, StatusCode};
use serde::Deserialize;
use tracing::{debug, warn};
use url::Url;

use crate::coordination::error::{StoreError, ETCD_KEY_NOT_FOUND, ETCD_NODE_EXIST, ETCD_NOT_FILE};
use crate::coordination::{DirCreator, Getter, Node, Setter, WatchEvent, Watcher};

/// Default timeout for non-watch requests.
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Retry policy for connection failures and HTTP 500 responses
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectionRetry {
    /// Extra attempts after the first one
    pub retries: usize,
    /// Pause between attempts
    pub sleep: Duration,
}

impl Default for ConnectionRetry {
    fn default() -> Self {
        Self {
            retries: 2,
            sleep: Duration::from_millis(200),
        }
    }
}

/// Client for the etcd v2 HTTP keys API.
///
/// Cheap to clone; clones share one connection pool.
#[derive(Clone)]
pub struct EtcdClient {
    inner: Arc<ClientInner>,
}

struct ClientInner {
    http: reqwest::Client,
    base_url: Url,
    retry: ConnectionRetry,
    timeout: Duration,
}

#[derive(Debug, Deserialize)]
struct KeysResponse {
    action: String,
    node: Node,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct KeysError {
    error_code: u64,
    #[serde(default)]
    message: String,
    #[serde(default)]
    cause: String,
}

/// What the request was for, so 4xx bodies can be mapped precisely
#[derive(Clone, Copy, PartialEq, Eq)]
enum Operation {
    Read,
    Write,
    CreateDir,
}

impl EtcdClient {
    /// Create a client for `endpoint`. A bare `host:port` gets `http://`.
    pub fn new(endpoint: &str, retry: ConnectionRetry) -> Result<Self, StoreError> {
        Self::with_timeout(endpoint, retry, DEFAULT_TIMEOUT)
    }

    pub fn with_timeout(
        endpoint: &str,
        retry: ConnectionRetry,
        timeout: Duration,
    ) -> Result<Self, StoreError> {
        let endpoint = if endpoint.contains("://") {
            endpoint.to_string()
        } else {
            format!("http://{}", endpoint)
        };

        let mut base_url = Url::parse(&endpoint)?;
        if !base_url.path().ends_with('/') {
            base_url.set_path(&format!("{}/", base_url.path()));
        }

        let http = reqwest::Client::builder()
            .user_agent(format!("builder-boot/{}", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| StoreError::Connection {
                attempts: 0,
                message: e.to_string(),
            })?;

        Ok(Self {
            inner: Arc::new(ClientInner {
                http,
                base_url,
                retry,
                timeout,
            }),
        })
    }

    /// Get the base URL.
    pub fn base_url(&self) -> &Url {
        &self.inner.base_url
    }

    /// URL of a key under `/v2/keys`
    fn key_url(&self, path: &str) -> Result<Url, StoreError> {
        let path = path.trim_start_matches('/');
        Ok(self.inner.base_url.join(&format!("v2/keys/{}", path))?)
    }

    /// Send a request, retrying transport failures and HTTP 500.
    async fn send<F>(&self, build: F) -> Result<Response, StoreError>
    where
        F: Fn() -> RequestBuilder,
    {
        let attempts = self.inner.retry.retries + 1;
        let mut last = String::new();

        for attempt in 1..=attempts {
            match build().send().await {
                Ok(response) if response.status() == StatusCode::INTERNAL_SERVER_ERROR => {
                    last = format!("HTTP 500: {}", response.text().await.unwrap_or_default());
                }
                Ok(response) => return Ok(response),
                Err(err) => {
                    last = err.to_string();
                }
            }

            debug!(attempt, attempts, "store request failed: {}", last);
            if attempt < attempts {
                tokio::time::sleep(self.inner.retry.sleep).await;
            }
        }

        warn!("store unreachable after {} attempts: {}", attempts, last);
        Err(StoreError::Connection {
            attempts,
            message: last,
        })
    }

    /// Map a response onto the status contract
    async fn decode(
        &self,
        path: &str,
        operation: Operation,
        response: Response,
    ) -> Result<KeysResponse, StoreError> {
        let status = response.status();

        if status == StatusCode::OK || status == StatusCode::CREATED {
            return response
                .json::<KeysResponse>()
                .await
                .map_err(|e| StoreError::Decode(e.to_string()));
        }

        let body = response.text().await.unwrap_or_default();
        if status.is_client_error() {
            if let Ok(err) = serde_json::from_str::<KeysError>(&body) {
                return Err(match (err.error_code, operation) {
                    (ETCD_KEY_NOT_FOUND, _) => StoreError::NotFound(path.to_string()),
                    (ETCD_NODE_EXIST, _) => StoreError::AlreadyExists(path.to_string()),
                    (ETCD_NOT_FILE, Operation::CreateDir) => StoreError::AlreadyExists(path.to_string()),
                    (code, _) => StoreError::Api {
                        code,
                        message: err.message,
                        cause: err.cause,
                    },
                });
            }
        }

        Err(StoreError::UnexpectedStatus {
            status: status.as_u16(),
            message: body,
        })
    }

    fn request(&self, method: Method, url: &Url) -> RequestBuilder {
        self.inner
            .http
            .request(method, url.clone())
            .timeout(self.inner.timeout)
    }
}

fn ttl_param(ttl: Duration) -> Option<(&'static str, String)> {
    if ttl.is_zero() {
        None
    } else {
        Some(("ttl", ttl.as_secs().max(1).to_string()))
    }
}

#[async_trait]
impl Getter for EtcdClient {
    async fn get(&self, path: &str, recursive: bool) -> Result<Node, StoreError> {
        let url = self.key_url(path)?;
        let recursive = if recursive { "true" } else { "false" };
        let response = self
            .send(|| self.request(Method::GET, &url).query(&[("recursive", recursive)]))
            .await?;
        Ok(self.decode(path, Operation::Read, response).await?.node)
    }
}

#[async_trait]
impl Setter for EtcdClient {
    async fn set(&self, path: &str, value: &str, ttl: Duration) -> Result<Node, StoreError> {
        let url = self.key_url(path)?;
        let mut form = vec![("value", value.to_string())];
        form.extend(ttl_param(ttl));

        let response = self
            .send(|| self.request(Method::PUT, &url).form(&form))
            .await?;
        Ok(self.decode(path, Operation::Write, response).await?.node)
    }
}

#[async_trait]
impl DirCreator for EtcdClient {
    async fn create_dir(&self, path: &str, ttl: Duration) -> Result<Node, StoreError> {
        if path.trim().is_empty() {
            return Err(StoreError::InvalidPath(path.to_string()));
        }

        let url = self.key_url(path)?;
        let form: Vec<(&str, String)> = ttl_param(ttl).into_iter().collect();
        let response = self
            .send(|| {
                self.request(Method::PUT, &url)
                    .query(&[("dir", "true"), ("prevExist", "false")])
                    .form(&form)
            })
            .await?;
        Ok(self.decode(path, Operation::CreateDir, response).await?.node)
    }
}

#[async_trait]
impl Watcher for EtcdClient {
    async fn watch(&self, path: &str, recursive: bool) -> Result<WatchEvent, StoreError> {
        let url = self.key_url(path)?;
        let mut query = vec![("wait", "true")];
        if recursive {
            query.push(("recursive", "true"));
        }

        // Blocks until the store reports a change, so no request timeout
        let response = self
            .send(|| self.inner.http.get(url.clone()).query(&query))
            .await?;
        let keys = self.decode(path, Operation::Read, response).await?;
        Ok(WatchEvent {
            action: keys.action,
            node: keys.node,
        })
    }
}
