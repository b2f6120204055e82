use crate::error::{map_reqwest_error, status_error, PodNetError, PodNetResult};
use async_trait::async_trait;
use backoff::{future::retry_notify, ExponentialBackoff};
use pod_types::{JsonRpcRequest, Pod, RpcMethod};
use reqwest::Client;
use serde_json::Value;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Source of pod lists
#[async_trait]
pub trait PodSource: Send + Sync {
    /// Fetch the current pod list
    async fn fetch_pods(&self) -> PodNetResult<Vec<Pod>>;

    /// URL of the endpoint being polled
    fn endpoint(&self) -> &str;
}

/// Retry configuration for transient failures
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Retries after the first attempt
    pub max_retries: u32,
    pub initial_interval: Duration,
    pub max_interval: Duration,
    pub max_elapsed: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_interval: Duration::from_millis(500),
            max_interval: Duration::from_secs(10),
            max_elapsed: Duration::from_secs(60),
        }
    }
}

impl RetryPolicy {
    /// Single attempt, no retries
    pub fn none() -> Self {
        Self {
            max_retries: 0,
            ..Self::default()
        }
    }

    fn backoff(&self) -> ExponentialBackoff {
        // Default randomization factor supplies the jitter
        ExponentialBackoff {
            current_interval: self.initial_interval,
            initial_interval: self.initial_interval,
            max_interval: self.max_interval,
            max_elapsed_time: Some(self.max_elapsed),
            ..ExponentialBackoff::default()
        }
    }
}

/// JSON-RPC client for the pod list endpoint
#[derive(Clone)]
pub struct RpcClient {
    /// HTTP client
    client: Client,

    /// RPC endpoint URL
    endpoint: String,

    /// Method requested on each poll
    method: RpcMethod,

    retry: RetryPolicy,

    next_id: Arc<AtomicU64>,
}

impl RpcClient {
    /// Create a new RPC client for `endpoint`
    pub fn new(client: Client, endpoint: impl Into<String>) -> Self {
        Self {
            client,
            endpoint: endpoint.into(),
            method: RpcMethod::GetPods,
            retry: RetryPolicy::default(),
            next_id: Arc::new(AtomicU64::new(1)),
        }
    }

    /// Request the stats-augmented pod list
    pub fn with_stats(mut self, with_stats: bool) -> Self {
        self.method = RpcMethod::for_stats(with_stats);
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn method(&self) -> RpcMethod {
        self.method
    }

    async fn fetch_once(&self) -> PodNetResult<Vec<Pod>> {
        let request = JsonRpcRequest::new(self.method, self.next_id.fetch_add(1, Ordering::Relaxed));
        debug!("Sending {} to {}", self.method, self.endpoint);

        let response = self
            .client
            .post(&self.endpoint)
            .json(&request)
            .send()
            .await
            .map_err(|e| map_reqwest_error(&self.endpoint, e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(status_error("RPC", status));
        }

        let body = match response.json::<Value>().await {
            Ok(body) => body,
            Err(e) => {
                warn!("RPC response from {} was not JSON: {}", self.endpoint, e);
                Value::Null
            }
        };

        Ok(parse_pod_list(body))
    }

    /// Fetch the pod list, retrying transient failures with jittered backoff
    pub async fn fetch_pods(&self) -> PodNetResult<Vec<Pod>> {
        let max_retries = self.retry.max_retries;
        let mut attempts = 0u32;

        let operation = || {
            attempts += 1;
            let attempt = attempts;
            async move {
                match self.fetch_once().await {
                    Ok(pods) => Ok(pods),
                    Err(e) if e.is_transient() && attempt <= max_retries => {
                        Err(backoff::Error::transient(e))
                    }
                    Err(e) => Err(backoff::Error::permanent(e)),
                }
            }
        };

        let pods = retry_notify(
            self.retry.backoff(),
            operation,
            |err: PodNetError, wait: Duration| {
                warn!("Retrying pod fetch after {:?} due to error: {}", wait, err);
            },
        )
        .await?;

        info!("Fetched {} pod records from {}", pods.len(), self.endpoint);
        Ok(pods)
    }
}

#[async_trait]
impl PodSource for RpcClient {
    async fn fetch_pods(&self) -> PodNetResult<Vec<Pod>> {
        self.fetch_pods().await
    }

    fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

/// Extract `result.pods` from a JSON-RPC response body.
///
/// A missing or non-array list yields no pods; individual malformed records
/// are skipped.
pub fn parse_pod_list(mut body: Value) -> Vec<Pod> {
    let items = match body.pointer_mut("/result/pods").map(Value::take) {
        Some(Value::Array(items)) => items,
        _ => {
            debug!("RPC response carried no pod list");
            return Vec::new();
        }
    };

    items
        .into_iter()
        .filter_map(|item| match serde_json::from_value::<Pod>(item) {
            Ok(pod) => Some(pod),
            Err(e) => {
                warn!("Skipping malformed pod record: {}", e);
                None
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::Matcher;
    use serde_json::json;

    fn fast_retry(max_retries: u32) -> RetryPolicy {
        RetryPolicy {
            max_retries,
            initial_interval: Duration::from_millis(1),
            max_interval: Duration::from_millis(5),
            max_elapsed: Duration::from_secs(10),
        }
    }

    #[test]
    fn test_parse_pod_list() {
        let body = json!({
            "jsonrpc": "2.0",
            "id": 1,
            "result": {
                "pods": [
                    {"address": "1.2.3.4:9001", "pubkey": "abc", "version": "1.0.0", "last_seen_timestamp": 10},
                    {"pubkey": "no-address"},
                ]
            }
        });

        let pods = parse_pod_list(body);
        assert_eq!(pods.len(), 1);
        assert_eq!(pods[0].ip(), Some("1.2.3.4"));
    }

    #[test]
    fn test_parse_keeps_pods_with_null_fields() {
        let body = json!({
            "result": {
                "pods": [
                    {"address": "1.1.1.1:9001", "pubkey": null, "version": "1.0.0", "last_seen_timestamp": 10},
                    {"address": "2.2.2.2:9001", "pubkey": "def", "version": null, "last_seen_timestamp": null},
                    {"address": "3.3.3.3:9001", "pubkey": "ghi", "version": "1.2.0", "last_seen_timestamp": 30},
                ]
            }
        });

        let pods = parse_pod_list(body);
        assert_eq!(pods.len(), 3);
        assert_eq!(pods[0].pubkey, "");
        assert_eq!(pods[1].version, "");
        assert_eq!(pods[1].last_seen_timestamp, 0);
        assert_eq!(pods[2].cleaned_version(), "1.2.0");
    }

    #[test]
    fn test_parse_missing_pods_is_empty() {
        assert!(parse_pod_list(json!({"result": {}})).is_empty());
        assert!(parse_pod_list(json!({"error": {"code": -32601}})).is_empty());
        assert!(parse_pod_list(json!({"result": {"pods": "nope"}})).is_empty());
        assert!(parse_pod_list(Value::Null).is_empty());
    }

    #[tokio::test]
    async fn test_fetch_pods_with_stats() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/rpc")
            .match_body(Matcher::PartialJson(json!({
                "jsonrpc": "2.0",
                "method": "get-pods-with-stats",
            })))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                json!({
                    "result": {"pods": [
                        {"address": "1.2.3.4:9001", "pubkey": "abc", "version": "1.0.0",
                         "last_seen_timestamp": 10, "storage_committed": 2048, "uptime": 600}
                    ]}
                })
                .to_string(),
            )
            .create_async()
            .await;

        let client = RpcClient::new(Client::new(), format!("{}/rpc", server.url()))
            .with_stats(true)
            .with_retry(RetryPolicy::none());

        let pods = client.fetch_pods().await.unwrap();
        mock.assert_async().await;
        assert_eq!(pods.len(), 1);
        assert_eq!(pods[0].storage_committed, Some(2048));
        assert_eq!(pods[0].uptime, Some(600));
    }

    #[tokio::test]
    async fn test_non_json_body_is_empty_list() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/")
            .with_status(200)
            .with_body("<html>maintenance</html>")
            .create_async()
            .await;

        let client = RpcClient::new(Client::new(), server.url()).with_retry(RetryPolicy::none());
        let pods = client.fetch_pods().await.unwrap();
        assert!(pods.is_empty());
    }

    #[tokio::test]
    async fn test_client_error_is_not_retried() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/")
            .with_status(404)
            .expect(1)
            .create_async()
            .await;

        let client = RpcClient::new(Client::new(), server.url()).with_retry(fast_retry(3));
        let err = client.fetch_pods().await.unwrap_err();

        mock.assert_async().await;
        assert!(matches!(err, PodNetError::Status { status: 404, .. }));
    }

    #[tokio::test]
    async fn test_server_error_retries_until_exhausted() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/")
            .with_status(503)
            .expect(3)
            .create_async()
            .await;

        let client = RpcClient::new(Client::new(), server.url()).with_retry(fast_retry(2));
        let err = client.fetch_pods().await.unwrap_err();

        mock.assert_async().await;
        assert!(matches!(err, PodNetError::Status { status: 503, .. }));
    }

    #[tokio::test]
    async fn test_unreachable_endpoint() {
        // Nothing listens on port 9 of localhost in the test environment
        let client = RpcClient::new(Client::new(), "http://127.0.0.1:9/rpc")
            .with_retry(RetryPolicy::none());
        let err = client.fetch_pods().await.unwrap_err();
        assert!(matches!(err, PodNetError::Unreachable { .. }));
        assert!(err.user_message().starts_with("Network Error: Could not reach"));
    }
}
