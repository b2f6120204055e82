use crate::error::{DashboardError, DashboardResult};
use crate::state::{Action, Dashboard};
use crate::view::{NodeDetail, TableView};
use chrono::Utc;
use pod_net::{EnrichmentSource, PodNetError, PodSource};
use pod_types::events::PodEvent;
use pod_types::{Enrichment, LookupItem};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, watch, Mutex, RwLock};
use tracing::{debug, error, info, warn};

/// The remote services a dashboard talks to
#[derive(Clone)]
pub struct Backends {
    pub pods: Arc<dyn PodSource>,
    pub enrichment: Arc<dyn EnrichmentSource>,
}

/// Shared handle driving a [`Dashboard`]: fetch cycles, enrichment and change
/// notification.
#[derive(Clone)]
pub struct DashboardService {
    state: Arc<RwLock<Dashboard>>,
    backends: Arc<RwLock<Backends>>,
    /// Send one batched lookup per render pass instead of one per IP
    batch: bool,
    /// Held for the whole of a fetch cycle
    cycle_lock: Arc<Mutex<()>>,
    revision: Arc<watch::Sender<u64>>,
    events: broadcast::Sender<PodEvent>,
}

impl DashboardService {
    pub fn new(dashboard: Dashboard, backends: Backends, batch: bool) -> Self {
        let (revision, _) = watch::channel(0);
        let (events, _) = broadcast::channel(256);
        Self {
            state: Arc::new(RwLock::new(dashboard)),
            backends: Arc::new(RwLock::new(backends)),
            batch,
            cycle_lock: Arc::new(Mutex::new(())),
            revision: Arc::new(revision),
            events,
        }
    }

    /// Revision counter bumped on every visible state change
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.revision.subscribe()
    }

    pub fn events(&self) -> broadcast::Receiver<PodEvent> {
        self.events.subscribe()
    }

    fn emit(&self, event: PodEvent) {
        // No subscribers is fine
        let _ = self.events.send(event);
    }

    fn notify(&self) {
        self.revision.send_modify(|revision| *revision += 1);
    }

    /// Apply an action and notify subscribers if it changed anything
    pub async fn dispatch(&self, action: Action) -> bool {
        let view_changed = matches!(
            action,
            Action::SortBy(_)
                | Action::SetSort { .. }
                | Action::SetFilterText(_)
                | Action::SetTextFilterEnabled(_)
                | Action::SetVersionFilter { .. }
        );

        let changed = self.state.write().await.reduce(action);
        if changed {
            if view_changed {
                self.emit(PodEvent::ViewChanged);
            }
            self.notify();
        }
        changed
    }

    /// Run `f` against the current state
    pub async fn read<R>(&self, f: impl FnOnce(&Dashboard) -> R) -> R {
        let state = self.state.read().await;
        f(&state)
    }

    pub async fn view(&self, now: i64) -> TableView {
        self.state.read().await.view(now)
    }

    pub async fn detail(&self, ip: &str, now: i64) -> DashboardResult<NodeDetail> {
        self.state
            .read()
            .await
            .detail(ip, now)
            .ok_or_else(|| DashboardError::UnknownPod(ip.to_string()))
    }

    /// Point the dashboard at another RPC endpoint.
    ///
    /// Waits for any running cycle so it never mixes backends.
    pub async fn select_endpoint(&self, backends: Backends, geo_base_url: impl Into<String>) {
        let _cycle = self.cycle_lock.lock().await;
        let rpc_endpoint = backends.pods.endpoint().to_string();
        *self.backends.write().await = backends;
        self.dispatch(Action::SelectEndpoint {
            rpc_endpoint,
            geo_base_url: geo_base_url.into(),
        })
        .await;
    }

    /// Run one fetch cycle and start enrichment for the new list.
    ///
    /// Cycles never overlap: a reload requested while one is running waits for
    /// it and then runs. Returns the number of unique pods.
    pub async fn reload(&self) -> DashboardResult<usize> {
        let _cycle = self.cycle_lock.lock().await;

        let generation = {
            let mut state = self.state.write().await;
            state.reduce(Action::BeginCycle);
            state.generation()
        };
        self.emit(PodEvent::CycleStarted { generation });
        self.notify();

        let source = self.backends.read().await.pods.clone();
        info!("Fetching pods from {} (cycle {})", source.endpoint(), generation);

        match source.fetch_pods().await {
            Ok(pods) => {
                let count = {
                    let mut state = self.state.write().await;
                    state.reduce(Action::PodsLoaded {
                        generation,
                        pods,
                        fetched_at: Utc::now().timestamp(),
                    });
                    state.pods().len()
                };
                info!("Loaded {} unique pods (cycle {})", count, generation);
                self.emit(PodEvent::PodsLoaded { generation, count });
                self.notify();

                self.render_pass().await;
                Ok(count)
            }
            Err(e) => {
                let message = e.user_message();
                error!("Fetch cycle {} failed: {}", generation, e);
                self.dispatch(Action::FetchFailed {
                    generation,
                    message: message.clone(),
                })
                .await;
                self.emit(PodEvent::FetchFailed {
                    generation,
                    message,
                });
                Err(e.into())
            }
        }
    }

    /// Issue lookups for every IP not yet enriched, including failed ones.
    ///
    /// Returns the number of IPs requested. Completions arrive in the
    /// background.
    pub async fn render_pass(&self) -> usize {
        let (generation, items) = {
            let mut state = self.state.write().await;
            let items = state.plan_lookups();
            (state.generation(), items)
        };
        if items.is_empty() {
            return 0;
        }

        let count = items.len();
        debug!("Requesting enrichment for {} IPs (cycle {})", count, generation);
        self.notify();

        let source = self.backends.read().await.enrichment.clone();
        if self.batch {
            self.spawn_batch_lookup(source, generation, items);
        } else {
            for item in items {
                self.spawn_single_lookup(source.clone(), generation, item);
            }
        }
        count
    }

    fn spawn_batch_lookup(&self, source: Arc<dyn EnrichmentSource>, generation: u64, items: Vec<LookupItem>) {
        let service = self.clone();
        tokio::spawn(async move {
            match source.lookup_batch(&items).await {
                Ok(mut found) => {
                    for item in items {
                        let result = found
                            .remove(&item.ip)
                            .ok_or_else(|| PodNetError::MissingFromBatch(item.ip.clone()).to_string());
                        service.resolve(generation, item.ip, result).await;
                    }
                }
                Err(e) => {
                    warn!("Batch lookup of {} IPs failed: {}", items.len(), e);
                    let reason = e.to_string();
                    for item in items {
                        service.resolve(generation, item.ip, Err(reason.clone())).await;
                    }
                }
            }
        });
    }

    fn spawn_single_lookup(&self, source: Arc<dyn EnrichmentSource>, generation: u64, item: LookupItem) {
        let service = self.clone();
        tokio::spawn(async move {
            let result = source.lookup(&item).await.map_err(|e| {
                debug!("Lookup for {} failed: {}", item.ip, e);
                e.to_string()
            });
            service.resolve(generation, item.ip, result).await;
        });
    }

    async fn resolve(&self, generation: u64, ip: String, result: Result<Enrichment, String>) {
        let ok = result.is_ok();
        let applied = self
            .state
            .write()
            .await
            .reduce(Action::EnrichmentResolved {
                generation,
                ip: ip.clone(),
                result,
            });

        if applied {
            self.emit(PodEvent::EnrichmentResolved { ip, ok });
            self.notify();
        } else {
            self.emit(PodEvent::EnrichmentDiscarded { ip, generation });
        }
    }

    /// Wait until no lookup is pending; false if `limit` elapsed first
    pub async fn wait_for_enrichment(&self, limit: Duration) -> bool {
        let mut revisions = self.subscribe();
        let settled = async {
            loop {
                if self.state.read().await.pending_lookups() == 0 {
                    return;
                }
                if revisions.changed().await.is_err() {
                    return;
                }
            }
        };
        tokio::time::timeout(limit, settled).await.is_ok()
    }
}
