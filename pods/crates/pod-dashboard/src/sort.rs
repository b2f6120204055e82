use crate::cache::EnrichmentCache;
use crate::version::compare_versions;
use pod_types::Pod;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

/// Columns the table can be sorted by
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortKey {
    Name,
    Pubkey,
    Public,
    Country,
    Storage,
    Usage,
    Uptime,
    Ping,
    Credits,
    Stake,
    LastSeen,
    Version,
}

impl SortKey {
    pub const ALL: [SortKey; 12] = [
        SortKey::Name,
        SortKey::Pubkey,
        SortKey::Public,
        SortKey::Country,
        SortKey::Storage,
        SortKey::Usage,
        SortKey::Uptime,
        SortKey::Ping,
        SortKey::Credits,
        SortKey::Stake,
        SortKey::LastSeen,
        SortKey::Version,
    ];

    /// Direction applied when this key is newly selected
    pub fn default_direction(&self) -> SortDirection {
        match self {
            SortKey::Name | SortKey::Pubkey | SortKey::Public | SortKey::Country | SortKey::Version => {
                SortDirection::Ascending
            }
            _ => SortDirection::Descending,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SortKey::Name => "name",
            SortKey::Pubkey => "pubkey",
            SortKey::Public => "public",
            SortKey::Country => "country",
            SortKey::Storage => "storage",
            SortKey::Usage => "usage",
            SortKey::Uptime => "uptime",
            SortKey::Ping => "ping",
            SortKey::Credits => "credits",
            SortKey::Stake => "stake",
            SortKey::LastSeen => "last_seen",
            SortKey::Version => "version",
        }
    }
}

impl fmt::Display for SortKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SortKey {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_lowercase().replace('-', "_");
        SortKey::ALL
            .iter()
            .copied()
            .find(|key| key.as_str() == wanted)
            .ok_or_else(|| format!("unknown sort key '{}'", s))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    Ascending,
    Descending,
}

impl SortDirection {
    pub fn flipped(self) -> Self {
        match self {
            SortDirection::Ascending => SortDirection::Descending,
            SortDirection::Descending => SortDirection::Ascending,
        }
    }
}

/// Current sort column and direction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SortState {
    pub key: SortKey,
    pub direction: SortDirection,
}

impl Default for SortState {
    fn default() -> Self {
        Self {
            key: SortKey::LastSeen,
            direction: SortKey::LastSeen.default_direction(),
        }
    }
}

impl SortState {
    /// Select a column: the same key flips direction, a new key starts at its default
    pub fn select(&mut self, key: SortKey) {
        if self.key == key {
            self.direction = self.direction.flipped();
        } else {
            self.key = key;
            self.direction = key.default_direction();
        }
    }

    /// Order two pods under this sort state
    pub fn compare(&self, a: &Pod, b: &Pod, cache: &EnrichmentCache) -> Ordering {
        let ip_a = a.ip().unwrap_or_default();
        let ip_b = b.ip().unwrap_or_default();

        // Unsettled geo data sinks to the bottom whatever the direction
        if self.key == SortKey::Country {
            match (cache.is_unsettled(ip_a), cache.is_unsettled(ip_b)) {
                (true, false) => return Ordering::Greater,
                (false, true) => return Ordering::Less,
                _ => {}
            }
        }

        let ord = compare_values(
            &sort_value(self.key, a, cache),
            &sort_value(self.key, b, cache),
        );
        let ord = match self.direction {
            SortDirection::Ascending => ord,
            SortDirection::Descending => ord.reverse(),
        };

        ord.then_with(|| ip_a.cmp(ip_b))
    }

    /// Sort `pods` in place
    pub fn apply(&self, pods: &mut [&Pod], cache: &EnrichmentCache) {
        pods.sort_by(|a, b| self.compare(a, b, cache));
    }
}

enum SortValue {
    Missing,
    Flag(bool),
    Number(f64),
    Text(String),
    Version(String),
}

fn sort_value(key: SortKey, pod: &Pod, cache: &EnrichmentCache) -> SortValue {
    let enrichment = pod.ip().and_then(|ip| cache.ready(ip));
    let number = |value: Option<f64>| value.map(SortValue::Number).unwrap_or(SortValue::Missing);

    match key {
        SortKey::Name => enrichment
            .and_then(|e| e.name.as_ref())
            .map(|name| SortValue::Text(name.to_lowercase()))
            .unwrap_or(SortValue::Missing),
        SortKey::Pubkey => SortValue::Text(pod.pubkey.clone()),
        SortKey::Public => pod.is_public.map(SortValue::Flag).unwrap_or(SortValue::Missing),
        SortKey::Country => enrichment
            .map(|e| SortValue::Text(e.geo_sort_key.to_lowercase()))
            .unwrap_or(SortValue::Missing),
        SortKey::Storage => number(pod.storage_committed.map(|v| v as f64)),
        SortKey::Usage => number(pod.storage_usage_percent),
        SortKey::Uptime => number(pod.uptime.map(|v| v as f64)),
        SortKey::Ping => number(enrichment.and_then(|e| e.ping_ms)),
        SortKey::Credits => number(enrichment.and_then(|e| e.credits)),
        SortKey::Stake => number(enrichment.and_then(|e| e.stake)),
        SortKey::LastSeen => SortValue::Number(pod.last_seen_timestamp as f64),
        SortKey::Version => SortValue::Version(pod.version.clone()),
    }
}

fn compare_values(a: &SortValue, b: &SortValue) -> Ordering {
    match (a, b) {
        (SortValue::Missing, SortValue::Missing) => Ordering::Equal,
        (SortValue::Missing, _) => Ordering::Less,
        (_, SortValue::Missing) => Ordering::Greater,
        (SortValue::Flag(x), SortValue::Flag(y)) => x.cmp(y),
        (SortValue::Number(x), SortValue::Number(y)) => x.total_cmp(y),
        (SortValue::Text(x), SortValue::Text(y)) => x.cmp(y),
        (SortValue::Version(x), SortValue::Version(y)) => compare_versions(x, y),
        // A key always yields the same variant
        _ => Ordering::Equal,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pod_types::{Enrichment, GeoInfo};
    use serde_json::json;

    fn pod(address: &str, version: &str, ts: i64) -> Pod {
        serde_json::from_value(json!({
            "address": address,
            "pubkey": format!("pk-{}", address),
            "version": version,
            "last_seen_timestamp": ts,
        }))
        .unwrap()
    }

    fn sorted<'a>(pods: &'a [Pod], state: &SortState, cache: &EnrichmentCache) -> Vec<&'a str> {
        let mut refs: Vec<&Pod> = pods.iter().collect();
        state.apply(&mut refs, cache);
        refs.iter().map(|p| p.ip().unwrap()).collect()
    }

    fn ready(cache: &mut EnrichmentCache, pods: &[Pod], ip: &str, info: GeoInfo) {
        cache.plan_lookups(pods, 1);
        cache.resolve(ip, 1, Ok(Enrichment::from(info)));
    }

    #[test]
    fn test_select_toggles_and_resets() {
        let mut state = SortState::default();
        assert_eq!(state.key, SortKey::LastSeen);
        assert_eq!(state.direction, SortDirection::Descending);

        state.select(SortKey::LastSeen);
        assert_eq!(state.direction, SortDirection::Ascending);

        state.select(SortKey::Name);
        assert_eq!(state.direction, SortDirection::Ascending);
        state.select(SortKey::Name);
        assert_eq!(state.direction, SortDirection::Descending);

        state.select(SortKey::Credits);
        assert_eq!(state.direction, SortDirection::Descending);
    }

    #[test]
    fn test_version_sort_is_numeric() {
        let pods = vec![
            pod("1.1.1.1:1", "1.10.0", 0),
            pod("2.2.2.2:1", "1.9.0", 0),
            pod("3.3.3.3:1", "1.2.0-beta", 0),
        ];
        let mut state = SortState::default();
        state.select(SortKey::Version);

        let cache = EnrichmentCache::new();
        assert_eq!(sorted(&pods, &state, &cache), vec!["3.3.3.3", "2.2.2.2", "1.1.1.1"]);
    }

    #[test]
    fn test_pending_country_sinks_in_both_directions() {
        let pods = vec![
            pod("1.1.1.1:1", "1.0.0", 0),
            pod("2.2.2.2:1", "1.0.0", 0),
            pod("3.3.3.3:1", "1.0.0", 0),
        ];
        let mut cache = EnrichmentCache::new();
        cache.plan_lookups(&pods, 1);
        cache.resolve(
            "2.2.2.2",
            1,
            Ok(Enrichment::from(GeoInfo {
                country: Some("Austria".to_string()),
                ..GeoInfo::default()
            })),
        );
        cache.resolve(
            "3.3.3.3",
            1,
            Ok(Enrichment::from(GeoInfo {
                country: Some("Brazil".to_string()),
                ..GeoInfo::default()
            })),
        );

        let mut state = SortState::default();
        state.select(SortKey::Country);
        assert_eq!(sorted(&pods, &state, &cache), vec!["2.2.2.2", "3.3.3.3", "1.1.1.1"]);

        state.select(SortKey::Country);
        assert_eq!(state.direction, SortDirection::Descending);
        assert_eq!(sorted(&pods, &state, &cache), vec!["3.3.3.3", "2.2.2.2", "1.1.1.1"]);
    }

    #[test]
    fn test_resort_by_credits_uses_cached_enrichment() {
        let pods = vec![pod("1.1.1.1:1", "1.0.0", 0), pod("2.2.2.2:1", "1.0.0", 0)];
        let mut cache = EnrichmentCache::new();
        ready(
            &mut cache,
            &pods,
            "1.1.1.1",
            GeoInfo {
                credits: Some(10.0),
                ..GeoInfo::default()
            },
        );
        cache.resolve(
            "2.2.2.2",
            1,
            Ok(Enrichment::from(GeoInfo {
                credits: Some(500.0),
                ..GeoInfo::default()
            })),
        );

        let mut state = SortState::default();
        state.select(SortKey::Credits);
        assert_eq!(sorted(&pods, &state, &cache), vec!["2.2.2.2", "1.1.1.1"]);
    }

    #[test]
    fn test_missing_values_sort_low() {
        let mut with_uptime = pod("1.1.1.1:1", "1.0.0", 0);
        with_uptime.uptime = Some(100);
        let without = pod("2.2.2.2:1", "1.0.0", 0);
        let pods = vec![without, with_uptime];

        let mut state = SortState::default();
        state.select(SortKey::Uptime);
        let cache = EnrichmentCache::new();
        assert_eq!(sorted(&pods, &state, &cache), vec!["1.1.1.1", "2.2.2.2"]);
    }

    #[test]
    fn test_parse_sort_key() {
        assert_eq!("last-seen".parse::<SortKey>().unwrap(), SortKey::LastSeen);
        assert_eq!("Credits".parse::<SortKey>().unwrap(), SortKey::Credits);
        assert!("bogus".parse::<SortKey>().is_err());
    }
}
