//! `choice-of-n-selection(k, delegate, scoreSelection)` — take k
//! independent selections from `delegate`, keep the one scoring lowest.
use std::sync::Arc;

use crate::error::PlacementError;
use crate::filter::FilterHandle;
use crate::node::SelectedNode;

use super::{NodeSelector, NodeSelectorInit, SelectCall, SelectorHandle, SelectorInitHandle};

/// Scores one candidate selection as a whole (e.g. "largest group size",
/// "median piece count"); lower is better.
pub type ScoreSelectionFn = Arc<dyn Fn(&[SelectedNode]) -> f64 + Send + Sync>;

/// Builds a [`ChoiceOfNSelectionSelector`] wrapping `delegate`.
pub struct ChoiceOfNSelectionInit {
    /// Number of independent draws to compare.
    pub k: usize,
    /// The candidate source, called `k` times per selection.
    pub delegate: SelectorInitHandle,
    /// The whole-selection scoring function; the lowest-scoring draw
    /// wins.
    pub score_selection: ScoreSelectionFn,
}

impl NodeSelectorInit for ChoiceOfNSelectionInit {
    fn init(&self, nodes: &[SelectedNode], base_filter: &FilterHandle) -> SelectorHandle {
        Arc::new(ChoiceOfNSelectionSelector {
            k: self.k.max(1),
            delegate: self.delegate.init(nodes, base_filter),
            score_selection: self.score_selection.clone(),
        })
    }
}

/// Draws `k` independent selections from `delegate` (which must itself
/// vary between calls; see the open question in the placement DSL about
/// delegate idempotency) and returns the one minimizing `score_selection`.
pub struct ChoiceOfNSelectionSelector {
    k: usize,
    delegate: SelectorHandle,
    score_selection: ScoreSelectionFn,
}

impl NodeSelector for ChoiceOfNSelectionSelector {
    fn select(&self, call: &SelectCall<'_>) -> Result<Vec<SelectedNode>, PlacementError> {
        let mut best: Option<(f64, Vec<SelectedNode>)> = None;
        let mut last_err = None;

        for _ in 0..self.k {
            match self.delegate.select(call) {
                Ok(draw) => {
                    let score = (self.score_selection)(&draw);
                    if best.as_ref().is_none_or(|(best_score, _)| score < *best_score) {
                        best = Some((score, draw));
                    }
                }
                Err(err) => last_err = Some(err),
            }
        }

        best.map(|(_, draw)| draw).ok_or_else(|| last_err.unwrap_or_else(|| call.insufficient(0)))
    }
}
