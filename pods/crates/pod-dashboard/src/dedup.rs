use pod_types::Pod;
use std::collections::HashMap;
use tracing::{debug, warn};

/// Pubkeys seen on more than one IP.
///
/// Used only to flag data-quality problems in the table.
#[derive(Debug, Clone, Default)]
pub struct PubkeyIndex {
    /// Distinct IPs per pubkey
    counts: HashMap<String, usize>,

    /// IPs per pubkey, in feed order
    ips: HashMap<String, Vec<String>>,
}

impl PubkeyIndex {
    /// Build the index over an already deduplicated pod list
    pub fn build(pods: &[Pod]) -> Self {
        let mut index = PubkeyIndex::default();

        for pod in pods {
            let (Some(ip), false) = (pod.ip(), pod.pubkey.is_empty()) else {
                continue;
            };

            let ips = index.ips.entry(pod.pubkey.clone()).or_default();
            if !ips.iter().any(|known| known == ip) {
                ips.push(ip.to_string());
                *index.counts.entry(pod.pubkey.clone()).or_insert(0) += 1;
            }
        }

        index
    }

    /// Number of distinct IPs using `pubkey`
    pub fn count(&self, pubkey: &str) -> usize {
        self.counts.get(pubkey).copied().unwrap_or(0)
    }

    /// Whether `pubkey` is used by two or more IPs
    pub fn is_duplicated(&self, pubkey: &str) -> bool {
        self.count(pubkey) >= 2
    }

    /// The other IPs sharing `pubkey` with `ip`
    pub fn other_ips(&self, pubkey: &str, ip: &str) -> Vec<String> {
        self.ips
            .get(pubkey)
            .map(|ips| ips.iter().filter(|other| *other != ip).cloned().collect())
            .unwrap_or_default()
    }

    /// Number of pubkeys that appear on more than one IP
    pub fn duplicated_keys(&self) -> usize {
        self.counts.values().filter(|count| **count >= 2).count()
    }
}

/// Result of collapsing the raw feed
#[derive(Debug, Clone, Default)]
pub struct DedupedPods {
    /// One record per IP, in order of first appearance
    pub pods: Vec<Pod>,

    pub index: PubkeyIndex,
}

/// Collapse records sharing an IP, keeping the freshest data for each
pub fn dedupe_pods(raw: Vec<Pod>) -> DedupedPods {
    let raw_count = raw.len();
    let mut positions: HashMap<String, usize> = HashMap::new();
    let mut pods: Vec<Pod> = Vec::with_capacity(raw_count);

    for pod in raw {
        let Some(ip) = pod.ip().map(str::to_string) else {
            warn!("Skipping pod with unusable address {:?}", pod.address);
            continue;
        };

        match positions.get(&ip) {
            Some(&position) => pods[position].merge(pod),
            None => {
                positions.insert(ip, pods.len());
                pods.push(pod);
            }
        }
    }

    debug!("Deduplicated {} pod records into {} unique IPs", raw_count, pods.len());

    let index = PubkeyIndex::build(&pods);
    DedupedPods { pods, index }
}
