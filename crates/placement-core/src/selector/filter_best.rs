//! `filter-best(tracker, spec, tieBreak, delegate)` — rank delegate's
//! candidates by tracker score and keep the best `spec`.
use std::sync::Arc;

use crate::error::PlacementError;
use crate::filter::FilterHandle;
use crate::node::{NodeAttribute, SelectedNode};
use crate::tracker::UploadSuccessTracker;

use super::{NodeSelector, NodeSelectorInit, SelectCall, SelectorHandle, SelectorInitHandle};

/// How many of the ranked candidates `filter-best` keeps.
#[derive(Clone, Debug, PartialEq)]
pub enum KeepSpec {
    /// `"<int>"` — keep exactly this many, best-scoring first.
    Absolute(usize),
    /// `"<pct>%"` — keep the top `pct` percent, rounded down, at least one.
    Percent(f64),
    /// `"-<int>"` — drop the worst-scoring `n`, keep the rest.
    DropWorst(usize),
}

impl KeepSpec {
    /// Parses the three textual forms named in the placement DSL.
    pub fn parse(spec: &str) -> Result<Self, PlacementError> {
        let trimmed = spec.trim();
        if let Some(pct) = trimmed.strip_suffix('%') {
            return pct
                .parse::<f64>()
                .map(|p| Self::Percent(p / 100.0))
                .map_err(|_| PlacementError::parse(spec, "not a valid percentage"));
        }
        if let Some(count) = trimmed.strip_prefix('-') {
            return count
                .parse::<usize>()
                .map(Self::DropWorst)
                .map_err(|_| PlacementError::parse(spec, "not a valid drop-worst count"));
        }
        trimmed
            .parse::<usize>()
            .map(Self::Absolute)
            .map_err(|_| PlacementError::parse(spec, "not a valid filter-best spec"))
    }

    fn keep_count(&self, pool_size: usize) -> usize {
        match self {
            Self::Absolute(n) => (*n).min(pool_size),
            Self::Percent(pct) => (((pool_size as f64) * pct).floor() as usize).clamp(1, pool_size.max(1)).min(pool_size),
            Self::DropWorst(drop) => pool_size.saturating_sub(*drop),
        }
    }
}

/// Builds a [`FilterBestSelector`] wrapping `delegate`.
pub struct FilterBestInit {
    /// Live score source ranking candidates.
    pub tracker: Arc<dyn UploadSuccessTracker>,
    /// How many of the ranked pool survive.
    pub spec: KeepSpec,
    /// Attribute used to break ties, compared lexicographically.
    pub tie_break: NodeAttribute,
    /// The candidate source.
    pub delegate: SelectorInitHandle,
}

impl NodeSelectorInit for FilterBestInit {
    fn init(&self, nodes: &[SelectedNode], base_filter: &FilterHandle) -> SelectorHandle {
        Arc::new(FilterBestSelector {
            tracker: self.tracker.clone(),
            spec: self.spec.clone(),
            tie_break: self.tie_break.clone(),
            delegate: self.delegate.init(nodes, base_filter),
        })
    }
}

/// Ranks `delegate`'s candidates descending by tracker score (`NaN`
/// sorts last — no data is worst, not best, once already a candidate)
/// and keeps the configured top slice.
pub struct FilterBestSelector {
    tracker: Arc<dyn UploadSuccessTracker>,
    spec: KeepSpec,
    tie_break: NodeAttribute,
    delegate: SelectorHandle,
}

impl NodeSelector for FilterBestSelector {
    fn select(&self, call: &SelectCall<'_>) -> Result<Vec<SelectedNode>, PlacementError> {
        let mut candidates = self.delegate.select(call)?;
        let scores = self.tracker.get(call.requester);

        candidates.sort_by(|a, b| {
            let score_a = scores.get(&a.id).copied().unwrap_or(f64::NAN);
            let score_b = scores.get(&b.id).copied().unwrap_or(f64::NAN);
            match (score_a.is_nan(), score_b.is_nan()) {
                (true, true) => self.tie_break.apply(a).cmp(&self.tie_break.apply(b)),
                (true, false) => std::cmp::Ordering::Greater,
                (false, true) => std::cmp::Ordering::Less,
                (false, false) => score_b
                    .partial_cmp(&score_a)
                    .unwrap_or(std::cmp::Ordering::Equal)
                    .then_with(|| self.tie_break.apply(a).cmp(&self.tie_break.apply(b))),
            }
        });

        let keep = self.spec.keep_count(candidates.len());
        candidates.truncate(keep);
        Ok(candidates)
    }
}
