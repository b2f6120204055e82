use crate::cache::EnrichmentState;
use crate::relative::{format_relative, RelativeTime};
use crate::sort::{SortDirection, SortKey};
use crate::state::{Dashboard, FetchStatus, ReloadState};
use pod_net::flag_url;
use pod_types::{Enrichment, Pod};
use serde::Serialize;
use serde_json::Value;
use url::form_urlencoded;

pub const EMPTY_MESSAGE: &str = "No pods found matching the filter criteria.";
pub const LOADING: &str = "Loading...";
pub const GEO_ERROR: &str = "Geo Error";

/// Display class of a cell
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CellState {
    Value,
    Loading,
    Error,
    Missing,
}

/// One rendered cell
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FieldView {
    pub text: String,
    pub state: CellState,
}

impl FieldView {
    fn value(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            state: CellState::Value,
        }
    }

    fn loading() -> Self {
        Self {
            text: LOADING.to_string(),
            state: CellState::Loading,
        }
    }

    fn error(text: &str) -> Self {
        Self {
            text: text.to_string(),
            state: CellState::Error,
        }
    }

    fn missing() -> Self {
        Self {
            text: "-".to_string(),
            state: CellState::Missing,
        }
    }

    fn optional(value: Option<String>) -> Self {
        value.map(Self::value).unwrap_or_else(Self::missing)
    }
}

/// Sort indicator on a header cell
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Indicator {
    Neutral,
    Up,
    Down,
}

impl Indicator {
    pub fn symbol(&self) -> &'static str {
        match self {
            Indicator::Neutral => "↕",
            Indicator::Up => "▲",
            Indicator::Down => "▼",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct HeaderCell {
    pub key: SortKey,
    pub label: &'static str,
    pub indicator: Indicator,
    pub symbol: &'static str,
}

/// One table row
#[derive(Debug, Clone, Serialize)]
pub struct RowView {
    pub ip: String,
    pub address: String,
    pub name: FieldView,
    /// Whether the operator registered a name
    pub known: bool,
    pub pubkey: String,
    pub pubkey_short: String,
    /// Other IPs announcing the same pubkey
    pub duplicate_ips: Vec<String>,
    pub public: FieldView,
    pub country: FieldView,
    pub flag_url: Option<String>,
    pub provider: FieldView,
    pub storage: FieldView,
    pub usage: FieldView,
    pub uptime: FieldView,
    pub ping: FieldView,
    pub credits: FieldView,
    pub stake: FieldView,
    pub last_seen: RelativeTime,
    pub version: String,
    pub detail_href: String,
}

/// Status line above the table
#[derive(Debug, Clone, Serialize)]
pub struct StatusView {
    pub loading: bool,
    pub error: Option<String>,
    pub fetched_at: Option<i64>,
}

/// Everything needed to draw the table
#[derive(Debug, Clone, Serialize)]
pub struct TableView {
    pub headers: Vec<HeaderCell>,
    pub rows: Vec<RowView>,
    /// Unique pods before filtering
    pub total: usize,
    pub duplicated_keys: usize,
    pub pending_lookups: usize,
    /// Lookups that errored and will be retried on the next pass
    pub failed_lookups: usize,
    pub rpc_endpoint: String,
    pub reload: ReloadState,
    pub reload_label: &'static str,
    pub status: StatusView,
    pub empty_message: Option<&'static str>,
}

/// Single-node detail page
#[derive(Debug, Clone, Serialize)]
pub struct NodeDetail {
    pub row: RowView,
    pub last_seen_utc: Option<String>,
    pub enrichment: Option<Enrichment>,
    pub lookup_error: Option<String>,
    /// Every other field the RPC reported, as text
    pub extra: Vec<(String, String)>,
}

fn header_label(key: SortKey) -> &'static str {
    match key {
        SortKey::Name => "Name",
        SortKey::Pubkey => "Pubkey",
        SortKey::Public => "Public",
        SortKey::Country => "Country / Provider",
        SortKey::Storage => "Storage",
        SortKey::Usage => "Usage",
        SortKey::Uptime => "Uptime",
        SortKey::Ping => "Ping",
        SortKey::Credits => "Credits",
        SortKey::Stake => "Stake",
        SortKey::LastSeen => "Last Seen",
        SortKey::Version => "Version",
    }
}

/// Shorten a pubkey to `abcd...wxyz` when longer than 10 characters
pub fn truncate_pubkey(pubkey: &str) -> String {
    let chars: Vec<char> = pubkey.chars().collect();
    if chars.len() <= 10 {
        return pubkey.to_string();
    }
    let head: String = chars[..4].iter().collect();
    let tail: String = chars[chars.len() - 4..].iter().collect();
    format!("{}...{}", head, tail)
}

/// Bytes in binary units, e.g. `1.50 GB`
pub fn format_bytes(bytes: u64) -> String {
    const UNITS: [&str; 6] = ["B", "KB", "MB", "GB", "TB", "PB"];
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{} B", bytes)
    } else {
        format!("{:.2} {}", value, UNITS[unit])
    }
}

/// Uptime as its two most significant units
pub fn format_uptime(seconds: u64) -> String {
    let days = seconds / 86_400;
    let hours = (seconds % 86_400) / 3_600;
    let minutes = (seconds % 3_600) / 60;

    if days > 0 {
        format!("{}d {}h", days, hours)
    } else if hours > 0 {
        format!("{}h {}m", hours, minutes)
    } else {
        format!("{}m", minutes)
    }
}

/// Whole number with thousands separators
pub fn format_amount(value: f64) -> String {
    let rounded = value.round() as i64;
    let digits = rounded.unsigned_abs().to_string();
    let mut grouped = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(c);
    }
    if rounded < 0 {
        format!("-{}", grouped)
    } else {
        grouped
    }
}

fn detail_href(ip: &str, rpc_endpoint: &str) -> String {
    let host = pod_net::rpc_host(rpc_endpoint).unwrap_or_else(|_| rpc_endpoint.to_string());
    let query = form_urlencoded::Serializer::new(String::new())
        .append_pair("ip", ip)
        .append_pair("rpc", &host)
        .finish();
    format!("node.html?{}", query)
}

/// Enrichment-backed cells for one IP
struct GeoCells {
    name: FieldView,
    known: bool,
    country: FieldView,
    flag_url: Option<String>,
    provider: FieldView,
    ping: FieldView,
    credits: FieldView,
    stake: FieldView,
}

impl GeoCells {
    fn loading() -> Self {
        Self {
            name: FieldView::loading(),
            known: false,
            country: FieldView::loading(),
            flag_url: None,
            provider: FieldView::loading(),
            ping: FieldView::loading(),
            credits: FieldView::loading(),
            stake: FieldView::loading(),
        }
    }

    fn failed() -> Self {
        Self {
            name: FieldView::error(GEO_ERROR),
            known: false,
            country: FieldView::error(GEO_ERROR),
            flag_url: None,
            provider: FieldView::error("-"),
            ping: FieldView::error("-"),
            credits: FieldView::error("-"),
            stake: FieldView::error("-"),
        }
    }

    fn ready(enrichment: &Enrichment, geo_base_url: &str) -> Self {
        let name = match &enrichment.name {
            Some(name) => FieldView::value(name.clone()),
            None => FieldView {
                text: enrichment.display_name().to_string(),
                state: CellState::Missing,
            },
        };
        let ping = match enrichment.ping_ms {
            Some(ms) => FieldView::value(format!("{:.0} ms", ms)),
            None => FieldView {
                text: "Offline".to_string(),
                state: CellState::Missing,
            },
        };

        Self {
            name,
            known: enrichment.name.is_some(),
            country: FieldView::value(enrichment.country.clone()),
            flag_url: enrichment
                .country_code
                .as_deref()
                .and_then(|code| flag_url(geo_base_url, code)),
            provider: FieldView::optional(enrichment.provider.clone()),
            ping,
            credits: FieldView::optional(enrichment.credits.map(format_amount)),
            stake: FieldView::optional(enrichment.stake.map(format_amount)),
        }
    }
}

fn row_view(dashboard: &Dashboard, pod: &Pod, now: i64) -> RowView {
    let ip = pod.ip().unwrap_or_default().to_string();

    let geo = match dashboard.cache.get(&ip) {
        None | Some(EnrichmentState::Pending { .. }) => GeoCells::loading(),
        Some(EnrichmentState::Failed { .. }) => GeoCells::failed(),
        Some(EnrichmentState::Ready(enrichment)) => GeoCells::ready(enrichment, &dashboard.geo_base_url),
    };

    let duplicate_ips = if dashboard.index.is_duplicated(&pod.pubkey) {
        dashboard.index.other_ips(&pod.pubkey, &ip)
    } else {
        Vec::new()
    };

    RowView {
        detail_href: detail_href(&ip, &dashboard.rpc_endpoint),
        address: pod.address.clone(),
        name: geo.name,
        known: geo.known,
        pubkey: pod.pubkey.clone(),
        pubkey_short: truncate_pubkey(&pod.pubkey),
        duplicate_ips,
        public: FieldView::optional(pod.is_public.map(|p| if p { "Yes" } else { "No" }.to_string())),
        country: geo.country,
        flag_url: geo.flag_url,
        provider: geo.provider,
        storage: FieldView::optional(pod.storage_committed.map(format_bytes)),
        usage: FieldView::optional(pod.storage_usage_percent.map(|p| format!("{:.2}%", p))),
        uptime: FieldView::optional(pod.uptime.map(format_uptime)),
        ping: geo.ping,
        credits: geo.credits,
        stake: geo.stake,
        last_seen: format_relative(pod.last_seen_timestamp, now),
        version: pod.cleaned_version().to_string(),
        ip,
    }
}

impl Dashboard {
    /// Build the view model for the current state
    pub fn view(&self, now: i64) -> TableView {
        let sort = self.sort;
        let headers = SortKey::ALL
            .iter()
            .map(|&key| {
                let indicator = match (key == sort.key, sort.direction) {
                    (false, _) => Indicator::Neutral,
                    (true, SortDirection::Ascending) => Indicator::Up,
                    (true, SortDirection::Descending) => Indicator::Down,
                };
                HeaderCell {
                    key,
                    label: header_label(key),
                    indicator,
                    symbol: indicator.symbol(),
                }
            })
            .collect();

        let rows: Vec<RowView> = self
            .visible_pods()
            .into_iter()
            .map(|pod| row_view(self, pod, now))
            .collect();

        let status = match &self.status {
            FetchStatus::Idle => StatusView {
                loading: false,
                error: None,
                fetched_at: None,
            },
            FetchStatus::Loading { .. } => StatusView {
                loading: true,
                error: None,
                fetched_at: None,
            },
            FetchStatus::Loaded { fetched_at, .. } => StatusView {
                loading: false,
                error: None,
                fetched_at: Some(*fetched_at),
            },
            FetchStatus::Failed { message, .. } => StatusView {
                loading: false,
                error: Some(message.clone()),
                fetched_at: None,
            },
        };

        let empty_message = if rows.is_empty() && self.reload != ReloadState::Initial {
            Some(EMPTY_MESSAGE)
        } else {
            None
        };

        TableView {
            headers,
            rows,
            total: self.pods.len(),
            duplicated_keys: self.index.duplicated_keys(),
            pending_lookups: self.cache.pending_count(),
            failed_lookups: self.cache.failed_count(),
            rpc_endpoint: self.rpc_endpoint.clone(),
            reload: self.reload,
            reload_label: self.reload.label(),
            status,
            empty_message,
        }
    }

    /// Detail view for one IP, if it is in the current list
    pub fn detail(&self, ip: &str, now: i64) -> Option<NodeDetail> {
        let pod = self.pod(ip)?;
        let (enrichment, lookup_error) = match self.cache.get(ip) {
            Some(EnrichmentState::Ready(enrichment)) => (Some(enrichment.clone()), None),
            Some(EnrichmentState::Failed { reason }) => (None, Some(reason.clone())),
            _ => (None, None),
        };

        Some(NodeDetail {
            row: row_view(self, pod, now),
            last_seen_utc: pod.last_seen().map(|t| t.to_rfc3339()),
            enrichment,
            lookup_error,
            extra: pod
                .extra
                .iter()
                .map(|(key, value)| {
                    let text = match value {
                        Value::String(s) => s.clone(),
                        other => other.to_string(),
                    };
                    (key.clone(), text)
                })
                .collect(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::Action;
    use pod_types::GeoInfo;
    use serde_json::json;

    fn pod(address: &str, pubkey: &str, ts: i64) -> Pod {
        serde_json::from_value(json!({
            "address": address,
            "pubkey": pubkey,
            "version": "1.2.3-abc",
            "last_seen_timestamp": ts,
            "storage_committed": 1610612736u64,
            "storage_usage_percent": 12.5,
            "uptime": 93784,
            "region": "eu",
        }))
        .unwrap()
    }

    fn dashboard(pods: Vec<Pod>) -> Dashboard {
        let mut dashboard = Dashboard::new("https://rpc.example.org/rpc", "https://rpc.example.org/geo");
        dashboard.reduce(Action::BeginCycle);
        dashboard.reduce(Action::PodsLoaded {
            generation: 1,
            pods,
            fetched_at: 1000,
        });
        dashboard
    }

    #[test]
    fn test_truncate_pubkey() {
        assert_eq!(truncate_pubkey("abcdefghijklmnop"), "abcd...mnop");
        assert_eq!(truncate_pubkey("abcdefghij"), "abcdefghij");
        assert_eq!(truncate_pubkey(""), "");
    }

    #[test]
    fn test_formatting_helpers() {
        assert_eq!(format_bytes(512), "512 B");
        assert_eq!(format_bytes(1610612736), "1.50 GB");
        assert_eq!(format_uptime(93784), "1d 2h");
        assert_eq!(format_uptime(3700), "1h 1m");
        assert_eq!(format_uptime(59), "0m");
        assert_eq!(format_amount(1234567.4), "1,234,567");
        assert_eq!(format_amount(-1000.0), "-1,000");
        assert_eq!(format_amount(999.0), "999");
    }

    #[test]
    fn test_pending_rows_show_loading() {
        let mut dashboard = dashboard(vec![pod("1.1.1.1:1", "abcdefghijklmnop", 990)]);
        dashboard.plan_lookups();

        let view = dashboard.view(1000);
        let row = &view.rows[0];
        assert_eq!(row.name.text, LOADING);
        assert_eq!(row.country.state, CellState::Loading);
        assert_eq!(row.pubkey_short, "abcd...mnop");
        assert_eq!(row.version, "1.2.3");
        assert_eq!(row.storage.text, "1.50 GB");
        assert_eq!(row.usage.text, "12.50%");
        assert_eq!(row.last_seen.text, "10 seconds ago");
        assert_eq!(view.pending_lookups, 1);
    }

    #[test]
    fn test_failed_and_ready_rows() {
        let mut dashboard = dashboard(vec![pod("1.1.1.1:1", "a", 0), pod("2.2.2.2:1", "b", 0)]);
        dashboard.plan_lookups();
        dashboard.reduce(Action::EnrichmentResolved {
            generation: 1,
            ip: "1.1.1.1".to_string(),
            result: Err("boom".to_string()),
        });
        dashboard.reduce(Action::EnrichmentResolved {
            generation: 1,
            ip: "2.2.2.2".to_string(),
            result: Ok(Enrichment::from(GeoInfo {
                name: Some("node-b".to_string()),
                country: Some("Germany".to_string()),
                country_code: Some("DE".to_string()),
                credits: Some(1500.0),
                ..GeoInfo::default()
            })),
        });
        dashboard.reduce(Action::SortBy(SortKey::Pubkey));

        let view = dashboard.view(0);
        let failed = &view.rows[0];
        assert_eq!(failed.name.text, GEO_ERROR);
        assert_eq!(failed.ping.text, "-");
        assert_eq!(view.failed_lookups, 1);
        assert_eq!(view.pending_lookups, 0);

        let ready = &view.rows[1];
        assert!(ready.known);
        assert_eq!(ready.name.text, "node-b");
        assert_eq!(ready.credits.text, "1,500");
        assert_eq!(ready.ping.text, "Offline");
        assert_eq!(
            ready.flag_url.as_deref(),
            Some("https://rpc.example.org/flags/de.png")
        );
    }

    #[test]
    fn test_duplicate_badge_and_detail_link() {
        let dashboard = dashboard(vec![pod("1.1.1.1:1", "shared", 0), pod("2.2.2.2:1", "shared", 0)]);
        let view = dashboard.view(0);

        let row = view.rows.iter().find(|r| r.ip == "1.1.1.1").unwrap();
        assert_eq!(row.duplicate_ips, vec!["2.2.2.2"]);
        assert_eq!(row.detail_href, "node.html?ip=1.1.1.1&rpc=rpc.example.org");
        assert_eq!(view.duplicated_keys, 1);
    }

    #[test]
    fn test_header_indicators() {
        let view = dashboard(vec![]).view(0);
        let last_seen = view.headers.iter().find(|h| h.key == SortKey::LastSeen).unwrap();
        assert_eq!(last_seen.indicator, Indicator::Down);
        assert!(view
            .headers
            .iter()
            .filter(|h| h.key != SortKey::LastSeen)
            .all(|h| h.indicator == Indicator::Neutral));
    }

    #[test]
    fn test_empty_state_only_after_first_load() {
        let fresh = Dashboard::new("https://rpc.example.org/rpc", "https://rpc.example.org/geo");
        assert_eq!(fresh.view(0).empty_message, None);

        let mut loaded = dashboard(vec![pod("1.1.1.1:1", "a", 0)]);
        loaded.reduce(Action::SetFilterText("zzz".to_string()));
        loaded.reduce(Action::SetTextFilterEnabled(true));
        let view = loaded.view(0);
        assert!(view.rows.is_empty());
        assert_eq!(view.total, 1);
        assert_eq!(view.empty_message, Some(EMPTY_MESSAGE));
    }

    #[test]
    fn test_detail_lists_extra_fields() {
        let dashboard = dashboard(vec![pod("1.1.1.1:1", "a", 0)]);
        let detail = dashboard.detail("1.1.1.1", 0).unwrap();
        assert_eq!(detail.extra, vec![("region".to_string(), "eu".to_string())]);
        assert_eq!(detail.last_seen_utc.as_deref(), Some("1970-01-01T00:00:00+00:00"));
        assert!(dashboard.detail("9.9.9.9", 0).is_none());
    }
}
