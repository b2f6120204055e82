//! Pod list dashboard: deduplication, enrichment, sort/filter state and
//! rendering on top of the `pod-net` clients.

// Sub-modules
pub mod cache;
pub mod chat;
pub mod debounce;
pub mod dedup;
pub mod error;
pub mod filter;
pub mod refresh;
pub mod relative;
pub mod render;
pub mod service;
pub mod sort;
pub mod state;
pub mod version;
pub mod view;

// Re-export key types
pub use cache::{EnrichmentCache, EnrichmentState};
pub use chat::{ChatMessage, ChatSession, MessageKind};
pub use debounce::Debouncer;
pub use dedup::{dedupe_pods, DedupedPods, PubkeyIndex};
pub use error::{DashboardError, DashboardResult};
pub use filter::FilterState;
pub use refresh::{spawn_refresh_loop, DEFAULT_REFRESH_PERIOD};
pub use relative::{format_relative, Freshness, RelativeTime};
pub use render::HtmlRenderer;
pub use service::{Backends, DashboardService};
pub use sort::{SortDirection, SortKey, SortState};
pub use state::{Action, Dashboard, FetchStatus, ReloadState};
pub use view::{NodeDetail, RowView, TableView};
