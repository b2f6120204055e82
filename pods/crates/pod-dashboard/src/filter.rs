use crate::cache::EnrichmentCache;
use pod_types::{clean_version, Pod};

/// Row filters applied before sorting
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FilterState {
    /// Free text matched against IP, pubkey, name and provider
    pub text: String,

    /// Whether the text filter is active
    pub text_enabled: bool,

    /// Whether the version filter is active
    pub version_enabled: bool,

    /// Exact cleaned version to keep
    pub version: String,
}

impl FilterState {
    /// Whether `pod` passes every active filter
    pub fn matches(&self, pod: &Pod, cache: &EnrichmentCache) -> bool {
        self.matches_version(pod) && self.matches_text(pod, cache)
    }

    fn matches_version(&self, pod: &Pod) -> bool {
        let wanted = self.version.trim();
        if !self.version_enabled || wanted.is_empty() {
            return true;
        }
        pod.cleaned_version() == clean_version(wanted)
    }

    fn matches_text(&self, pod: &Pod, cache: &EnrichmentCache) -> bool {
        let needle = self.text.trim().to_lowercase();
        if !self.text_enabled || needle.is_empty() {
            return true;
        }

        let ip = pod.ip().unwrap_or_default();
        if ip.to_lowercase().contains(&needle) || pod.pubkey.to_lowercase().contains(&needle) {
            return true;
        }

        cache.ready(ip).is_some_and(|enrichment| {
            let name = enrichment.name.as_deref().unwrap_or_default();
            let provider = enrichment.provider.as_deref().unwrap_or_default();
            name.to_lowercase().contains(&needle) || provider.to_lowercase().contains(&needle)
        })
    }
}
