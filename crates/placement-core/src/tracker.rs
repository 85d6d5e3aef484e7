//! Pluggable live-score providers consumed by selectors and by
//! `successfulAtLeastPercent`.
//!
//! `UploadSuccessTracker` and `UploadFailureTracker` are the two trait
//! boundaries; everything downstream of the network call that would
//! populate them (the Prometheus wire protocol, metrics registration) is
//! left to the caller. What lives here is the read-through cache with
//! single-flight refresh and independent staleness windows, in
//! [`RefreshCache`], shared by both tracker implementations.
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use crate::error::PlacementError;
use crate::node::{NodeAttribute, NodeId, SelectedNode};

/// Default "fresh" window: a cache value younger than this is used as-is
/// without triggering a refresh.
pub const DEFAULT_FRESH: Duration = Duration::from_secs(3);

/// Default "stale" window: a cache value older than this is logged as
/// stale (but still served — tracker failures never become a hard
/// selection failure).
pub const DEFAULT_STALE: Duration = Duration::from_secs(10);

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Live per-requester upload-success scores. Higher is better; `NaN`
/// means "no data" and is treated leniently by consumers.
pub trait UploadSuccessTracker: Send + Sync {
    /// Returns the current score of every node this tracker has data for,
    /// from the point of view of `requester`.
    fn get(&self, requester: NodeId) -> HashMap<NodeId, f64>;
}

/// Live per-node upload-failure scores.
pub trait UploadFailureTracker: Send + Sync {
    /// Returns the current failure score for `node` (`NaN` if unknown).
    fn get(&self, node: NodeId) -> f64;
}

/// A read-through cache around a fallible fetch, with single-flight
/// refresh: when the cached value is older than `fresh`, exactly one
/// caller performs the refresh; concurrent callers observe the previous
/// value rather than blocking or duplicating the fetch.
pub struct RefreshCache<T> {
    value: Mutex<Option<(T, Instant)>>,
    refreshing: AtomicBool,
    fresh: Duration,
    stale: Duration,
}

impl<T: Clone> RefreshCache<T> {
    /// Builds an empty cache with the given freshness/staleness windows.
    pub fn new(fresh: Duration, stale: Duration) -> Self {
        Self {
            value: Mutex::new(None),
            refreshing: AtomicBool::new(false),
            fresh,
            stale,
        }
    }

    /// Returns the best available value, refreshing it first if the
    /// cache has aged past `fresh` and no other caller is already
    /// refreshing. Returns `None` only if the cache has never been
    /// successfully populated.
    pub fn get_or_refresh(&self, fetch: impl FnOnce() -> Result<T, PlacementError>) -> Option<T> {
        let needs_refresh = {
            let guard = lock(&self.value);
            guard.as_ref().is_none_or(|(_, at)| at.elapsed() > self.fresh)
        };

        if needs_refresh
            && self
                .refreshing
                .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
                .is_ok()
        {
            match fetch() {
                Ok(fresh_value) => {
                    let mut guard = lock(&self.value);
                    *guard = Some((fresh_value, Instant::now()));
                }
                Err(error) => {
                    tracing::warn!(%error, "tracker refresh failed, serving stale data");
                }
            }
            self.refreshing.store(false, Ordering::SeqCst);
        }

        let guard = lock(&self.value);
        guard.as_ref().map(|(value, at)| {
            if at.elapsed() > self.stale {
                tracing::debug!(age_secs = at.elapsed().as_secs(), "serving stale tracker data");
            }
            value.clone()
        })
    }
}

/// Raw metric values keyed by the Prometheus label value, as returned by
/// a (not-in-scope) HTTP scrape client.
pub trait MetricSource: Send + Sync {
    /// Queries the current metric values.
    fn query(&self) -> Result<HashMap<String, f64>, PlacementError>;
}

/// The subset of the overlay node table a tracker needs to build its join
/// key: every currently known node.
pub trait NodeTableSource: Send + Sync {
    /// Returns the current node snapshot.
    fn nodes(&self) -> Result<Vec<SelectedNode>, PlacementError>;
}

fn join_key(attrs: &[NodeAttribute], node: &SelectedNode) -> String {
    attrs
        .iter()
        .map(|a| a.apply(node))
        .collect::<Vec<_>>()
        .join("/")
}

/// A Prometheus-backed [`UploadSuccessTracker`]. Node identities are
/// joined to metric label values via a configurable list of
/// [`NodeAttribute`]s (e.g. `last_net` or `id`); the node table and the
/// metric values are refreshed independently and joined at query time.
pub struct PrometheusUploadSuccessTracker {
    metrics: Arc<dyn MetricSource>,
    nodes: Arc<dyn NodeTableSource>,
    label_attrs: Vec<NodeAttribute>,
    metric_cache: RefreshCache<HashMap<String, f64>>,
    node_cache: RefreshCache<Vec<SelectedNode>>,
}

impl PrometheusUploadSuccessTracker {
    /// Builds a tracker joining `metrics` and `nodes` on `label_attrs`,
    /// using the default freshness windows.
    pub fn new(
        metrics: Arc<dyn MetricSource>,
        nodes: Arc<dyn NodeTableSource>,
        label_attrs: Vec<NodeAttribute>,
    ) -> Self {
        Self::with_windows(metrics, nodes, label_attrs, DEFAULT_FRESH, DEFAULT_STALE)
    }

    /// Builds a tracker with explicit freshness windows.
    pub fn with_windows(
        metrics: Arc<dyn MetricSource>,
        nodes: Arc<dyn NodeTableSource>,
        label_attrs: Vec<NodeAttribute>,
        fresh: Duration,
        stale: Duration,
    ) -> Self {
        Self {
            metrics,
            nodes,
            label_attrs,
            metric_cache: RefreshCache::new(fresh, stale),
            node_cache: RefreshCache::new(fresh, stale),
        }
    }
}

impl UploadSuccessTracker for PrometheusUploadSuccessTracker {
    fn get(&self, _requester: NodeId) -> HashMap<NodeId, f64> {
        let metrics = self
            .metric_cache
            .get_or_refresh(|| self.metrics.query())
            .unwrap_or_default();
        let nodes = self
            .node_cache
            .get_or_refresh(|| self.nodes.nodes())
            .unwrap_or_default();

        nodes
            .iter()
            .filter_map(|n| {
                metrics
                    .get(&join_key(&self.label_attrs, n))
                    .map(|score| (n.id, *score))
            })
            .collect()
    }
}

/// A Prometheus-backed [`UploadFailureTracker`], sharing the same
/// join-by-attribute and read-through-cache design as
/// [`PrometheusUploadSuccessTracker`].
pub struct PrometheusUploadFailureTracker {
    metrics: Arc<dyn MetricSource>,
    nodes: Arc<dyn NodeTableSource>,
    label_attrs: Vec<NodeAttribute>,
    metric_cache: RefreshCache<HashMap<String, f64>>,
    node_cache: RefreshCache<Vec<SelectedNode>>,
}

impl PrometheusUploadFailureTracker {
    /// Builds a tracker joining `metrics` and `nodes` on `label_attrs`,
    /// using the default freshness windows.
    pub fn new(
        metrics: Arc<dyn MetricSource>,
        nodes: Arc<dyn NodeTableSource>,
        label_attrs: Vec<NodeAttribute>,
    ) -> Self {
        Self {
            metrics,
            nodes,
            label_attrs,
            metric_cache: RefreshCache::new(DEFAULT_FRESH, DEFAULT_STALE),
            node_cache: RefreshCache::new(DEFAULT_FRESH, DEFAULT_STALE),
        }
    }
}

impl UploadFailureTracker for PrometheusUploadFailureTracker {
    fn get(&self, node: NodeId) -> f64 {
        let metrics = self
            .metric_cache
            .get_or_refresh(|| self.metrics.query())
            .unwrap_or_default();
        let nodes = self
            .node_cache
            .get_or_refresh(|| self.nodes.nodes())
            .unwrap_or_default();

        nodes
            .iter()
            .find(|n| n.id == node)
            .and_then(|n| metrics.get(&join_key(&self.label_attrs, n)))
            .copied()
            .unwrap_or(f64::NAN)
    }
}

/// A fixed, uncached tracker useful for tests and small standalone tools:
/// every requester sees the same static score table.
#[derive(Clone, Default)]
pub struct StaticSuccessTracker(pub HashMap<NodeId, f64>);

impl UploadSuccessTracker for StaticSuccessTracker {
    fn get(&self, _requester: NodeId) -> HashMap<NodeId, f64> {
        self.0.clone()
    }
}

/// A fixed, uncached failure tracker, the [`UploadFailureTracker`]
/// counterpart of [`StaticSuccessTracker`].
#[derive(Clone, Default)]
pub struct StaticFailureTracker(pub HashMap<NodeId, f64>);

impl UploadFailureTracker for StaticFailureTracker {
    fn get(&self, node: NodeId) -> f64 {
        self.0.get(&node).copied().unwrap_or(f64::NAN)
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::expect_used, clippy::unwrap_used, clippy::panic)]

    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn refresh_cache_serves_stale_value_while_refresh_in_flight() {
        let cache: RefreshCache<i32> = RefreshCache::new(Duration::ZERO, Duration::from_secs(60));
        let first = cache.get_or_refresh(|| Ok(1));
        assert_eq!(first, Some(1));

        // Simulate a concurrent in-flight refresh by holding the flag.
        cache.refreshing.store(true, Ordering::SeqCst);
        let calls = AtomicUsize::new(0);
        let second = cache.get_or_refresh(|| {
            calls.fetch_add(1, Ordering::SeqCst);
            Ok(2)
        });
        assert_eq!(second, Some(1), "should serve the previous value");
        assert_eq!(calls.load(Ordering::SeqCst), 0, "fetch should be skipped");
        cache.refreshing.store(false, Ordering::SeqCst);
    }

    #[test]
    fn refresh_cache_keeps_old_value_on_fetch_error() {
        let cache: RefreshCache<i32> = RefreshCache::new(Duration::ZERO, Duration::from_secs(60));
        assert_eq!(cache.get_or_refresh(|| Ok(1)), Some(1));
        let result = cache.get_or_refresh(|| Err(PlacementError::TrackerUnavailable("down".into())));
        assert_eq!(result, Some(1));
    }

    #[test]
    fn static_success_tracker_returns_table() {
        let id = NodeId::from_bytes([1; crate::node::NODE_ID_LEN]);
        let mut map = HashMap::new();
        map.insert(id, 0.75);
        let tracker = StaticSuccessTracker(map);
        assert_eq!(tracker.get(id).get(&id), Some(&0.75));
    }
}
