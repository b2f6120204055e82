use crate::error::{map_reqwest_error, status_error, PodNetResult};
use async_trait::async_trait;
use pod_types::{BatchLookupRequest, Enrichment, GeoInfo, LookupItem};
use reqwest::Client;
use std::collections::HashMap;
use tracing::debug;
use url::Url;

/// Source of per-IP geo and reputation data
#[async_trait]
pub trait EnrichmentSource: Send + Sync {
    /// Look up a single IP
    async fn lookup(&self, item: &LookupItem) -> PodNetResult<Enrichment>;

    /// Look up many IPs in one request; the result is keyed by IP
    async fn lookup_batch(&self, items: &[LookupItem]) -> PodNetResult<HashMap<String, Enrichment>>;
}

/// Client for the geo/reputation companion service
#[derive(Clone)]
pub struct GeoClient {
    client: Client,
    base_url: String,
}

impl GeoClient {
    pub fn new(client: Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    /// The geo service that lives next to an RPC endpoint: `https://<host>/geo`
    pub fn for_rpc_endpoint(client: Client, rpc_endpoint: &str) -> PodNetResult<Self> {
        let host = crate::rpc_host(rpc_endpoint)?;
        Ok(Self::new(client, format!("https://{}/geo", host)))
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

/// Flag image path for `country_code` on the host of `base_url`
pub fn flag_url(base_url: &str, country_code: &str) -> Option<String> {
    let code = country_code.trim().to_lowercase();
    if code.is_empty() || !code.chars().all(|c| c.is_ascii_alphabetic()) {
        return None;
    }

    let mut url = Url::parse(base_url).ok()?;
    url.set_path(&format!("/flags/{}.png", code));
    url.set_query(None);
    Some(url.to_string())
}

#[async_trait]
impl EnrichmentSource for GeoClient {
    async fn lookup(&self, item: &LookupItem) -> PodNetResult<Enrichment> {
        debug!("Looking up geo data for {}", item.ip);

        let mut request = self.client.get(&self.base_url).query(&[("ip", item.ip.as_str())]);
        if !item.pubkey.is_empty() {
            request = request.query(&[("pubkey", item.pubkey.as_str())]);
        }

        let response = request
            .send()
            .await
            .map_err(|e| map_reqwest_error(&self.base_url, e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(status_error("Geo service", status));
        }

        let body = response.text().await?;
        let info: GeoInfo = serde_json::from_str(&body)?;
        Ok(Enrichment::from(info))
    }

    async fn lookup_batch(&self, items: &[LookupItem]) -> PodNetResult<HashMap<String, Enrichment>> {
        if items.is_empty() {
            return Ok(HashMap::new());
        }

        let url = format!("{}/batch", self.base_url);
        debug!("Looking up geo data for {} IPs in one batch", items.len());

        let body = BatchLookupRequest {
            items: items.to_vec(),
        };

        let response = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| map_reqwest_error(&url, e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(status_error("Geo service", status));
        }

        // A null entry counts as missing from the batch
        let body = response.text().await?;
        let infos: HashMap<String, Option<GeoInfo>> = serde_json::from_str(&body)?;
        Ok(infos
            .into_iter()
            .filter_map(|(ip, info)| info.map(|info| (ip, Enrichment::from(info))))
            .collect())
    }
}
