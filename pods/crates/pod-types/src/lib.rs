use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;

pub mod chat;

/// A pod record as reported by the RPC endpoint
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Pod {
    /// Gossip address in `ip:port` form
    pub address: String,

    /// Public key of the pod
    #[serde(default, deserialize_with = "null_as_default")]
    pub pubkey: String,

    /// Software version, possibly with a build suffix
    #[serde(default, deserialize_with = "null_as_default")]
    pub version: String,

    /// Unix seconds when the pod was last seen by the gossip layer
    #[serde(default, deserialize_with = "null_as_default")]
    pub last_seen_timestamp: i64,

    /// Whether the pod's RPC is publicly reachable
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_public: Option<bool>,

    /// Committed storage in bytes
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub storage_committed: Option<u64>,

    /// Percentage of committed storage in use
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub storage_usage_percent: Option<f64>,

    /// Uptime in seconds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uptime: Option<u64>,

    /// Fields we do not model but keep across merges
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

/// Treat an explicit `null` the same as a missing field
fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

impl Pod {
    /// The IP portion of the address, used as the identity key.
    ///
    /// Accepts `ip:port`, `[v6]:port`, a bare IPv4 and a bare IPv6 address.
    pub fn ip(&self) -> Option<&str> {
        let address = self.address.trim();
        let ip = if let Some(rest) = address.strip_prefix('[') {
            rest.split(']').next().unwrap_or_default()
        } else if address.matches(':').count() == 1 {
            address.split(':').next().unwrap_or_default()
        } else {
            address
        };

        if ip.is_empty() {
            None
        } else {
            Some(ip)
        }
    }

    /// Version with any build suffix after `-` removed
    pub fn cleaned_version(&self) -> &str {
        clean_version(&self.version)
    }

    /// Last seen time as a UTC datetime
    pub fn last_seen(&self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp(self.last_seen_timestamp, 0)
    }

    /// Merge a duplicate record for the same IP into this one.
    ///
    /// When `other` is at least as fresh its fields overlay ours; otherwise our
    /// fields win and `other` only fills in what we are missing. The resulting
    /// timestamp is always the newest of the two.
    pub fn merge(&mut self, other: Pod) {
        let newest = self.last_seen_timestamp.max(other.last_seen_timestamp);

        if other.last_seen_timestamp >= self.last_seen_timestamp {
            let mut merged = other;
            merged.fill_missing_from(std::mem::replace(self, Pod::empty()));
            *self = merged;
        } else {
            self.fill_missing_from(other);
        }

        self.last_seen_timestamp = newest;
    }

    fn fill_missing_from(&mut self, older: Pod) {
        if self.pubkey.is_empty() {
            self.pubkey = older.pubkey;
        }
        if self.version.is_empty() {
            self.version = older.version;
        }
        self.is_public = self.is_public.or(older.is_public);
        self.storage_committed = self.storage_committed.or(older.storage_committed);
        self.storage_usage_percent = self.storage_usage_percent.or(older.storage_usage_percent);
        self.uptime = self.uptime.or(older.uptime);
        for (key, value) in older.extra {
            self.extra.entry(key).or_insert(value);
        }
    }

    fn empty() -> Self {
        Pod {
            address: String::new(),
            pubkey: String::new(),
            version: String::new(),
            last_seen_timestamp: 0,
            is_public: None,
            storage_committed: None,
            storage_usage_percent: None,
            uptime: None,
            extra: BTreeMap::new(),
        }
    }
}

/// Strip any build suffix after the first `-`
pub fn clean_version(version: &str) -> &str {
    version.split('-').next().unwrap_or_default().trim()
}

/// JSON-RPC methods understood by the pod endpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RpcMethod {
    /// Basic pod list
    #[serde(rename = "get-pods")]
    GetPods,

    /// Pod list with storage and uptime stats
    #[serde(rename = "get-pods-with-stats")]
    GetPodsWithStats,
}

impl RpcMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            RpcMethod::GetPods => "get-pods",
            RpcMethod::GetPodsWithStats => "get-pods-with-stats",
        }
    }

    pub fn for_stats(with_stats: bool) -> Self {
        if with_stats {
            RpcMethod::GetPodsWithStats
        } else {
            RpcMethod::GetPods
        }
    }
}

impl fmt::Display for RpcMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// JSON-RPC 2.0 request envelope
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcRequest {
    pub jsonrpc: String,
    pub method: RpcMethod,
    pub id: u64,
}

impl JsonRpcRequest {
    pub fn new(method: RpcMethod, id: u64) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            method,
            id,
        }
    }
}

/// Raw lookup response from the geo/reputation service
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GeoInfo {
    #[serde(default)]
    pub name: Option<String>,

    #[serde(default)]
    pub country: Option<String>,

    #[serde(default)]
    pub country_code: Option<String>,

    #[serde(default)]
    pub provider: Option<String>,

    #[serde(default)]
    pub geo_sort_key: Option<String>,

    /// Round-trip time in milliseconds, `null` when the node did not answer
    #[serde(default)]
    pub ping: Option<f64>,

    #[serde(default)]
    pub credits: Option<f64>,

    #[serde(default)]
    pub balance: Option<f64>,

    #[serde(default)]
    pub stake: Option<f64>,

    #[serde(default)]
    pub nfts: Vec<Value>,
}

/// Enrichment data cached per IP
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Enrichment {
    /// Operator-registered display name
    pub name: Option<String>,

    /// Country name, "Unknown" when the service had none
    pub country: String,

    /// Lowercase ISO country code
    pub country_code: Option<String>,

    /// Hosting provider
    pub provider: Option<String>,

    /// Key used when sorting by country/provider
    pub geo_sort_key: String,

    pub ping_ms: Option<f64>,

    pub credits: Option<f64>,

    /// Stake, or balance when the service reports no stake
    pub stake: Option<f64>,

    pub nfts: Vec<Value>,
}

impl Enrichment {
    /// Name shown in the table
    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or("N/A")
    }
}

impl From<GeoInfo> for Enrichment {
    fn from(info: GeoInfo) -> Self {
        let name = info.name.filter(|n| !n.trim().is_empty());
        let country = info
            .country
            .filter(|c| !c.trim().is_empty())
            .unwrap_or_else(|| "Unknown".to_string());
        let country_code = info
            .country_code
            .map(|c| c.trim().to_lowercase())
            .filter(|c| !c.is_empty());
        let provider = info.provider.filter(|p| !p.trim().is_empty());
        let geo_sort_key = info.geo_sort_key.unwrap_or_else(|| {
            format!("{} {}", country, provider.as_deref().unwrap_or_default())
                .trim()
                .to_lowercase()
        });

        Self {
            name,
            country,
            country_code,
            provider,
            geo_sort_key,
            ping_ms: info.ping,
            credits: info.credits,
            stake: info.stake.or(info.balance),
            nfts: info.nfts,
        }
    }
}

/// One entry of a batched enrichment request
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LookupItem {
    pub ip: String,
    pub pubkey: String,
}

/// Body of a batched enrichment request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchLookupRequest {
    pub items: Vec<LookupItem>,
}

/// Colour scheme preference
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Theme {
    Dark,
    Light,
}

impl Theme {
    /// Use the stored preference if there is one, otherwise follow the system
    pub fn resolve(stored: Option<Theme>, system_prefers_dark: bool) -> Theme {
        match stored {
            Some(theme) => theme,
            None if system_prefers_dark => Theme::Dark,
            None => Theme::Light,
        }
    }

    pub fn toggled(self) -> Theme {
        match self {
            Theme::Dark => Theme::Light,
            Theme::Light => Theme::Dark,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Theme::Dark => "dark",
            Theme::Light => "light",
        }
    }
}

impl fmt::Display for Theme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Notifications broadcast by the dashboard service as cycles progress
pub mod events {
    /// Events emitted by the dashboard service
    #[derive(Debug, Clone, PartialEq)]
    pub enum PodEvent {
        /// A fetch cycle has started
        CycleStarted { generation: u64 },

        /// A fetch cycle produced a new pod list
        PodsLoaded { generation: u64, count: usize },

        /// A fetch cycle failed; prior table content is kept
        FetchFailed { generation: u64, message: String },

        /// Enrichment for an IP settled, successfully or not
        EnrichmentResolved { ip: String, ok: bool },

        /// A completion from a superseded cycle was dropped
        EnrichmentDiscarded { ip: String, generation: u64 },

        /// Sort or filter state changed
        ViewChanged,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn pod(address: &str, ts: i64) -> Pod {
        serde_json::from_value(json!({
            "address": address,
            "pubkey": "key",
            "version": "1.0.0",
            "last_seen_timestamp": ts,
        }))
        .unwrap()
    }

    #[test]
    fn test_ip_extraction() {
        assert_eq!(pod("10.0.0.1:9001", 0).ip(), Some("10.0.0.1"));
        assert_eq!(pod("10.0.0.1", 0).ip(), Some("10.0.0.1"));
        assert_eq!(pod("[2001:db8::1]:9001", 0).ip(), Some("2001:db8::1"));
        assert_eq!(pod("2001:db8::1", 0).ip(), Some("2001:db8::1"));
        assert_eq!(pod(":9001", 0).ip(), None);
    }

    #[test]
    fn test_clean_version() {
        assert_eq!(clean_version("2.0.0-rc1"), "2.0.0");
        assert_eq!(clean_version("2.0.0"), "2.0.0");
        assert_eq!(clean_version(""), "");
    }

    #[test]
    fn test_merge_prefers_fresher_record() {
        let mut stored = pod("10.0.0.1:9001", 100);
        stored.storage_committed = Some(1024);
        stored.version = "1.0.0".to_string();

        let mut incoming = pod("10.0.0.1:9002", 200);
        incoming.version = "1.1.0".to_string();

        stored.merge(incoming);

        assert_eq!(stored.last_seen_timestamp, 200);
        assert_eq!(stored.version, "1.1.0");
        assert_eq!(stored.address, "10.0.0.1:9002");
        // Stats known only to the older record survive
        assert_eq!(stored.storage_committed, Some(1024));
    }

    #[test]
    fn test_merge_keeps_stored_when_incoming_is_older() {
        let mut stored = pod("10.0.0.1:9001", 300);
        stored.version = "1.2.0".to_string();

        let mut incoming = pod("10.0.0.1:9001", 100);
        incoming.version = "1.0.0".to_string();
        incoming.uptime = Some(60);

        stored.merge(incoming);

        assert_eq!(stored.last_seen_timestamp, 300);
        assert_eq!(stored.version, "1.2.0");
        assert_eq!(stored.uptime, Some(60));
    }

    #[test]
    fn test_enrichment_from_geo_info() {
        let info: GeoInfo = serde_json::from_value(json!({
            "name": "",
            "country": "Germany",
            "country_code": "DE",
            "provider": "Contabo",
            "ping": null,
            "balance": 12.5,
        }))
        .unwrap();

        let enrichment = Enrichment::from(info);
        assert_eq!(enrichment.display_name(), "N/A");
        assert_eq!(enrichment.country_code.as_deref(), Some("de"));
        assert_eq!(enrichment.geo_sort_key, "germany contabo");
        assert_eq!(enrichment.ping_ms, None);
        assert_eq!(enrichment.stake, Some(12.5));
    }

    #[test]
    fn test_rpc_request_serialization() {
        let request = JsonRpcRequest::new(RpcMethod::GetPodsWithStats, 1);
        let value = serde_json::to_value(&request).unwrap();
        assert_eq!(
            value,
            json!({"jsonrpc": "2.0", "method": "get-pods-with-stats", "id": 1})
        );
    }

    #[test]
    fn test_theme_resolution() {
        assert_eq!(Theme::resolve(Some(Theme::Light), true), Theme::Light);
        assert_eq!(Theme::resolve(None, true), Theme::Dark);
        assert_eq!(Theme::resolve(None, false), Theme::Light);
        assert_eq!(Theme::Dark.toggled(), Theme::Light);
    }
}
