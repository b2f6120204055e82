use crate::cache::EnrichmentCache;
use crate::dedup::{dedupe_pods, PubkeyIndex};
use crate::filter::FilterState;
use crate::sort::{SortDirection, SortKey, SortState};
use pod_types::{Enrichment, LookupItem, Pod};
use serde::Serialize;
use tracing::{debug, info, warn};

/// Visual state of the reload control
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ReloadState {
    /// Nothing loaded yet
    Initial,

    /// Filters or endpoint changed since the last successful fetch
    Stale,

    /// Showing the result of the latest fetch
    Fresh,
}

impl ReloadState {
    pub fn label(&self) -> &'static str {
        match self {
            ReloadState::Initial => "LOAD",
            ReloadState::Stale | ReloadState::Fresh => "RELOAD",
        }
    }
}

/// Progress of the latest fetch cycle
#[derive(Debug, Clone, PartialEq)]
pub enum FetchStatus {
    Idle,
    Loading { generation: u64 },
    Loaded { generation: u64, fetched_at: i64 },
    Failed { generation: u64, message: String },
}

/// State changes applied through [`Dashboard::reduce`]
#[derive(Debug, Clone)]
pub enum Action {
    /// Switch to another RPC endpoint and its geo service
    SelectEndpoint {
        rpc_endpoint: String,
        geo_base_url: String,
    },

    /// Start a new fetch cycle, bumping the generation
    BeginCycle,

    /// The fetch for `generation` returned a raw pod list
    PodsLoaded {
        generation: u64,
        pods: Vec<Pod>,
        fetched_at: i64,
    },

    /// The fetch for `generation` failed
    FetchFailed { generation: u64, message: String },

    /// A lookup issued by `generation` completed
    EnrichmentResolved {
        generation: u64,
        ip: String,
        result: Result<Enrichment, String>,
    },

    /// Click on a column header
    SortBy(SortKey),

    /// Set column and direction explicitly
    SetSort {
        key: SortKey,
        direction: SortDirection,
    },

    SetFilterText(String),

    SetTextFilterEnabled(bool),

    SetVersionFilter { enabled: bool, version: String },
}

/// Everything the table is rendered from
#[derive(Debug, Clone)]
pub struct Dashboard {
    pub(crate) rpc_endpoint: String,
    pub(crate) geo_base_url: String,
    pub(crate) pods: Vec<Pod>,
    pub(crate) index: PubkeyIndex,
    pub(crate) cache: EnrichmentCache,
    pub(crate) sort: SortState,
    pub(crate) filter: FilterState,
    pub(crate) generation: u64,
    pub(crate) reload: ReloadState,
    pub(crate) status: FetchStatus,
}

impl Dashboard {
    pub fn new(rpc_endpoint: impl Into<String>, geo_base_url: impl Into<String>) -> Self {
        Self {
            rpc_endpoint: rpc_endpoint.into(),
            geo_base_url: geo_base_url.into(),
            pods: Vec::new(),
            index: PubkeyIndex::default(),
            cache: EnrichmentCache::new(),
            sort: SortState::default(),
            filter: FilterState::default(),
            generation: 0,
            reload: ReloadState::Initial,
            status: FetchStatus::Idle,
        }
    }

    /// Apply an action; returns whether anything visible changed
    pub fn reduce(&mut self, action: Action) -> bool {
        match action {
            Action::SelectEndpoint {
                rpc_endpoint,
                geo_base_url,
            } => {
                if rpc_endpoint == self.rpc_endpoint && geo_base_url == self.geo_base_url {
                    return false;
                }
                info!("Switching RPC endpoint to {}", rpc_endpoint);
                self.rpc_endpoint = rpc_endpoint;
                self.geo_base_url = geo_base_url;
                self.mark_stale();
                true
            }
            Action::BeginCycle => {
                self.generation += 1;
                self.status = FetchStatus::Loading {
                    generation: self.generation,
                };
                true
            }
            Action::PodsLoaded {
                generation,
                pods,
                fetched_at,
            } => {
                if generation != self.generation {
                    warn!(
                        "Ignoring pod list from superseded cycle {} (current {})",
                        generation, self.generation
                    );
                    return false;
                }

                let deduped = dedupe_pods(pods);
                let expired = self.cache.expire_pending(generation);
                if expired > 0 {
                    debug!("Re-requesting {} lookups left pending by older cycles", expired);
                }

                self.pods = deduped.pods;
                self.index = deduped.index;
                self.reload = ReloadState::Fresh;
                self.status = FetchStatus::Loaded {
                    generation,
                    fetched_at,
                };
                true
            }
            Action::FetchFailed {
                generation,
                message,
            } => {
                if generation != self.generation {
                    return false;
                }
                // Prior table content stays as it was
                self.status = FetchStatus::Failed {
                    generation,
                    message,
                };
                true
            }
            Action::EnrichmentResolved {
                generation,
                ip,
                result,
            } => {
                let applied = self.cache.resolve(&ip, generation, result);
                if !applied {
                    debug!("Discarded stale lookup for {} from cycle {}", ip, generation);
                }
                applied
            }
            Action::SortBy(key) => {
                self.sort.select(key);
                true
            }
            Action::SetSort { key, direction } => {
                self.sort = SortState { key, direction };
                true
            }
            Action::SetFilterText(text) => {
                if text == self.filter.text {
                    return false;
                }
                self.filter.text = text;
                self.mark_stale();
                true
            }
            Action::SetTextFilterEnabled(enabled) => {
                self.filter.text_enabled = enabled;
                self.mark_stale();
                true
            }
            Action::SetVersionFilter { enabled, version } => {
                self.filter.version_enabled = enabled;
                self.filter.version = version;
                self.mark_stale();
                true
            }
        }
    }

    fn mark_stale(&mut self) {
        if self.reload != ReloadState::Initial {
            self.reload = ReloadState::Stale;
        }
    }

    /// Mark IPs that need a lookup as pending under the current generation.
    ///
    /// Called on every render pass, so failed lookups get another attempt.
    pub fn plan_lookups(&mut self) -> Vec<LookupItem> {
        let generation = self.generation;
        self.cache.plan_lookups(&self.pods, generation)
    }

    /// Pods that pass the filters, in display order
    pub fn visible_pods(&self) -> Vec<&Pod> {
        let mut visible: Vec<&Pod> = self
            .pods
            .iter()
            .filter(|pod| self.filter.matches(pod, &self.cache))
            .collect();
        self.sort.apply(&mut visible, &self.cache);
        visible
    }

    pub fn pod(&self, ip: &str) -> Option<&Pod> {
        self.pods.iter().find(|pod| pod.ip() == Some(ip))
    }

    pub fn pods(&self) -> &[Pod] {
        &self.pods
    }

    pub fn index(&self) -> &PubkeyIndex {
        &self.index
    }

    pub fn cache(&self) -> &EnrichmentCache {
        &self.cache
    }

    pub fn sort(&self) -> SortState {
        self.sort
    }

    pub fn filter(&self) -> &FilterState {
        &self.filter
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn reload_state(&self) -> ReloadState {
        self.reload
    }

    pub fn status(&self) -> &FetchStatus {
        &self.status
    }

    pub fn rpc_endpoint(&self) -> &str {
        &self.rpc_endpoint
    }

    pub fn geo_base_url(&self) -> &str {
        &self.geo_base_url
    }

    pub fn pending_lookups(&self) -> usize {
        self.cache.pending_count()
    }
}
