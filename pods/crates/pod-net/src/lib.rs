use reqwest::Client;
use std::time::Duration;
use url::Url;

// Sub-modules
pub mod chat;
pub mod error;
pub mod geo;
pub mod rpc;

// Re-export key types
pub use chat::{ChatBackend, ChatClient};
pub use error::{PodNetError, PodNetResult};
pub use geo::{flag_url, EnrichmentSource, GeoClient};
pub use rpc::{parse_pod_list, PodSource, RetryPolicy, RpcClient};

/// Build the shared HTTP client with a request timeout
pub fn http_client(timeout: Duration) -> Client {
    Client::builder()
        .timeout(timeout)
        .build()
        .unwrap_or_else(|_| Client::new())
}

/// Hostname of an RPC endpoint URL
pub fn rpc_host(endpoint: &str) -> PodNetResult<String> {
    let url = Url::parse(endpoint)?;
    url.host_str()
        .map(|host| host.to_string())
        .ok_or_else(|| PodNetError::InvalidUrl(format!("{} has no host", endpoint)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rpc_host() {
        assert_eq!(rpc_host("https://rpc.example.org:8899/rpc").unwrap(), "rpc.example.org");
        assert_eq!(rpc_host("http://10.0.0.1/").unwrap(), "10.0.0.1");
        assert!(matches!(rpc_host("rpc.example.org"), Err(PodNetError::InvalidUrl(_))));
    }
}
