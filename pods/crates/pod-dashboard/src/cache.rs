use pod_types::{Enrichment, LookupItem, Pod};
use std::collections::{HashMap, HashSet};

/// Lookup state of one IP
#[derive(Debug, Clone, PartialEq)]
pub enum EnrichmentState {
    /// A lookup issued by fetch cycle `generation` is in flight
    Pending { generation: u64 },

    /// Lookup succeeded
    Ready(Enrichment),

    /// Lookup failed; retried on the next render pass
    Failed { reason: String },
}

/// Per-IP enrichment results kept for the whole session
#[derive(Debug, Clone, Default)]
pub struct EnrichmentCache {
    entries: HashMap<String, EnrichmentState>,
}

impl EnrichmentCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, ip: &str) -> Option<&EnrichmentState> {
        self.entries.get(ip)
    }

    /// Successful enrichment for `ip`, if any
    pub fn ready(&self, ip: &str) -> Option<&Enrichment> {
        match self.entries.get(ip) {
            Some(EnrichmentState::Ready(enrichment)) => Some(enrichment),
            _ => None,
        }
    }

    /// True while no lookup for `ip` has completed
    pub fn is_unsettled(&self, ip: &str) -> bool {
        matches!(
            self.entries.get(ip),
            None | Some(EnrichmentState::Pending { .. })
        )
    }

    fn needs_lookup(&self, ip: &str) -> bool {
        matches!(
            self.entries.get(ip),
            None | Some(EnrichmentState::Failed { .. })
        )
    }

    /// Collect lookups for IPs that were never requested or whose last
    /// attempt failed, and mark them pending under `generation`.
    pub fn plan_lookups(&mut self, pods: &[Pod], generation: u64) -> Vec<LookupItem> {
        let mut seen = HashSet::new();
        let mut items = Vec::new();

        for pod in pods {
            let Some(ip) = pod.ip() else {
                continue;
            };
            if !seen.insert(ip) || !self.needs_lookup(ip) {
                continue;
            }

            self.entries
                .insert(ip.to_string(), EnrichmentState::Pending { generation });
            items.push(LookupItem {
                ip: ip.to_string(),
                pubkey: pod.pubkey.clone(),
            });
        }

        items
    }

    /// Apply a completed lookup.
    ///
    /// Only accepted while the IP is still pending under the same generation;
    /// returns whether the result was applied.
    pub fn resolve(&mut self, ip: &str, generation: u64, result: Result<Enrichment, String>) -> bool {
        match self.entries.get(ip) {
            Some(EnrichmentState::Pending { generation: pending }) if *pending == generation => {
                let state = match result {
                    Ok(enrichment) => EnrichmentState::Ready(enrichment),
                    Err(reason) => EnrichmentState::Failed { reason },
                };
                self.entries.insert(ip.to_string(), state);
                true
            }
            _ => false,
        }
    }

    /// Forget lookups left pending by cycles older than `generation` so the
    /// current cycle requests them again.
    pub fn expire_pending(&mut self, generation: u64) -> usize {
        let before = self.entries.len();
        self.entries.retain(|_, state| {
            !matches!(state, EnrichmentState::Pending { generation: g } if *g < generation)
        });
        before - self.entries.len()
    }

    /// Lookups still in flight
    pub fn pending_count(&self) -> usize {
        self.entries
            .values()
            .filter(|state| matches!(state, EnrichmentState::Pending { .. }))
            .count()
    }

    pub fn failed_count(&self) -> usize {
        self.entries
            .values()
            .filter(|state| matches!(state, EnrichmentState::Failed { .. }))
            .count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pod_types::GeoInfo;
    use serde_json::json;

    fn pod(address: &str) -> Pod {
        serde_json::from_value(json!({"address": address, "pubkey": "pk"})).unwrap()
    }

    fn enrichment(name: &str) -> Enrichment {
        Enrichment::from(GeoInfo {
            name: Some(name.to_string()),
            ..GeoInfo::default()
        })
    }

    #[test]
    fn test_lookup_issued_once_while_pending_or_ready() {
        let mut cache = EnrichmentCache::new();
        let pods = vec![pod("1.1.1.1:1"), pod("2.2.2.2:1")];

        let first = cache.plan_lookups(&pods, 1);
        assert_eq!(first.len(), 2);

        // Still pending: nothing new to issue
        assert!(cache.plan_lookups(&pods, 1).is_empty());

        assert!(cache.resolve("1.1.1.1", 1, Ok(enrichment("alpha"))));
        assert!(cache.plan_lookups(&pods, 1).is_empty());
        assert_eq!(cache.ready("1.1.1.1").unwrap().display_name(), "alpha");
    }

    #[test]
    fn test_failed_lookup_is_retried_on_next_plan() {
        let mut cache = EnrichmentCache::new();
        let pods = vec![pod("1.1.1.1:1")];

        cache.plan_lookups(&pods, 1);
        assert!(cache.resolve("1.1.1.1", 1, Err("timeout".to_string())));
        assert_eq!(cache.failed_count(), 1);
        assert!(!cache.is_unsettled("1.1.1.1"));

        let retry = cache.plan_lookups(&pods, 1);
        assert_eq!(retry.len(), 1);
        assert_eq!(cache.pending_count(), 1);
    }

    #[test]
    fn test_stale_completion_is_discarded() {
        let mut cache = EnrichmentCache::new();
        let pods = vec![pod("1.1.1.1:1")];

        cache.plan_lookups(&pods, 1);

        // A newer cycle supersedes the in-flight lookup
        assert_eq!(cache.expire_pending(2), 1);
        assert_eq!(cache.plan_lookups(&pods, 2).len(), 1);

        assert!(!cache.resolve("1.1.1.1", 1, Ok(enrichment("old"))));
        assert!(cache.is_unsettled("1.1.1.1"));

        assert!(cache.resolve("1.1.1.1", 2, Ok(enrichment("new"))));
        assert_eq!(cache.ready("1.1.1.1").unwrap().display_name(), "new");
    }

    #[test]
    fn test_resolution_does_not_overwrite_settled_entry() {
        let mut cache = EnrichmentCache::new();
        cache.plan_lookups(&[pod("1.1.1.1:1")], 1);
        assert!(cache.resolve("1.1.1.1", 1, Ok(enrichment("first"))));
        assert!(!cache.resolve("1.1.1.1", 1, Err("late".to_string())));
        assert_eq!(cache.ready("1.1.1.1").unwrap().display_name(), "first");
    }

    #[test]
    fn test_duplicate_ips_planned_once() {
        let mut cache = EnrichmentCache::new();
        let items = cache.plan_lookups(&[pod("1.1.1.1:1"), pod("1.1.1.1:2")], 1);
        assert_eq!(items.len(), 1);
    }
}
