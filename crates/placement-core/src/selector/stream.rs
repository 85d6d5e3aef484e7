//! `stream(seed, steps...)` — selection as a lazy, pull-based iterator
//! pipeline.
use std::collections::HashMap;
use std::sync::Arc;

use rand::seq::SliceRandom;

use crate::error::PlacementError;
use crate::filter::FilterHandle;
use crate::node::{NodeAttribute, SelectedNode};
use crate::score::ScoreNode;

use super::{NodeSelector, NodeSelectorInit, SelectCall, SelectorHandle, is_eligible};

/// A possibly-infinite pull source of candidate nodes. Single-threaded
/// and restartable per call; no coroutine primitives needed, a
/// pull-`next` closure suffices.
pub trait NodeSequence: Send {
    /// Pulls the next candidate, or `None` if the sequence is exhausted.
    fn next(&mut self) -> Option<SelectedNode>;
}

struct VecSeed(std::vec::IntoIter<SelectedNode>);

impl NodeSequence for VecSeed {
    fn next(&mut self) -> Option<SelectedNode> {
        self.0.next()
    }
}

/// A stream-to-stream transform, built fresh per `select` call so it can
/// be pre-seeded from that call's `alreadySelected`.
pub trait StreamStep: Send + Sync {
    /// Wraps `input`, returning a new sequence reflecting this step.
    fn wrap(&self, call: &SelectCall<'_>, input: Box<dyn NodeSequence>) -> Box<dyn NodeSequence>;
}

/// `streamfilter(groupconstraint(attr, max))` — rejects nodes that would
/// push any group (by `attr`) past `max` members, counting
/// `alreadySelected` toward the cap.
pub struct GroupConstraint {
    /// The attribute defining groups.
    pub attr: NodeAttribute,
    /// The maximum members per group.
    pub max: usize,
}

struct GroupConstraintSequence {
    attr: NodeAttribute,
    max: usize,
    counts: HashMap<String, usize>,
    input: Box<dyn NodeSequence>,
}

impl NodeSequence for GroupConstraintSequence {
    fn next(&mut self) -> Option<SelectedNode> {
        loop {
            let candidate = self.input.next()?;
            let key = self.attr.apply(&candidate);
            let count = self.counts.entry(key).or_insert(0);
            if *count < self.max {
                *count += 1;
                return Some(candidate);
            }
        }
    }
}

impl StreamStep for GroupConstraint {
    fn wrap(&self, call: &SelectCall<'_>, input: Box<dyn NodeSequence>) -> Box<dyn NodeSequence> {
        let mut counts = HashMap::new();
        for node in call.already_selected {
            *counts.entry(self.attr.apply(node)).or_insert(0) += 1;
        }
        Box::new(GroupConstraintSequence {
            attr: self.attr.clone(),
            max: self.max,
            counts,
            input,
        })
    }
}

/// `choiceofns(k, score)` — buffers `k` items from the input stream,
/// yields the best-scoring one, and repeats.
pub struct ChoiceOfNs {
    /// Buffer size per yielded item.
    pub k: usize,
    /// The score deciding the winner of each buffered batch.
    pub score: ScoreNode,
}

struct ChoiceOfNsSequence {
    k: usize,
    score: ScoreNode,
    requester: crate::node::NodeId,
    input: Box<dyn NodeSequence>,
}

impl NodeSequence for ChoiceOfNsSequence {
    fn next(&mut self) -> Option<SelectedNode> {
        let mut best: Option<(f64, SelectedNode)> = None;
        for _ in 0..self.k.max(1) {
            let Some(candidate) = self.input.next() else {
                break;
            };
            let score = self.score.apply(self.requester, &candidate);
            let is_better = best.as_ref().is_none_or(|(best_score, _)| score.is_nan() || score > *best_score);
            if is_better {
                best = Some((score, candidate));
            }
        }
        best.map(|(_, node)| node)
    }
}

impl StreamStep for ChoiceOfNs {
    fn wrap(&self, call: &SelectCall<'_>, input: Box<dyn NodeSequence>) -> Box<dyn NodeSequence> {
        Box::new(ChoiceOfNsSequence {
            k: self.k,
            score: self.score.clone(),
            requester: call.requester,
            input,
        })
    }
}

/// Builds a [`StreamSelector`] over the node pool, with `steps` applied
/// in order ahead of the driver.
pub struct StreamInit {
    /// Transforms applied, in order, to the seed sequence.
    pub steps: Vec<Arc<dyn StreamStep>>,
}

impl NodeSelectorInit for StreamInit {
    fn init(&self, nodes: &[SelectedNode], base_filter: &FilterHandle) -> SelectorHandle {
        Arc::new(StreamSelector {
            nodes: nodes.to_vec(),
            filter: base_filter.clone(),
            steps: self.steps.clone(),
        })
    }
}

/// Drives the seed-plus-steps pipeline, pulling until `n` nodes are
/// selected or the stream is exhausted.
pub struct StreamSelector {
    nodes: Vec<SelectedNode>,
    filter: FilterHandle,
    steps: Vec<Arc<dyn StreamStep>>,
}

impl NodeSelector for StreamSelector {
    fn select(&self, call: &SelectCall<'_>) -> Result<Vec<SelectedNode>, PlacementError> {
        let already = call.already_selected_ids();
        let mut pool: Vec<SelectedNode> = self
            .nodes
            .iter()
            .filter(|n| is_eligible(n, &self.filter, call.requester, call.excluded, &already, &Default::default()))
            .cloned()
            .collect();
        pool.shuffle(&mut rand::thread_rng());

        let mut sequence: Box<dyn NodeSequence> = Box::new(VecSeed(pool.into_iter()));
        for step in &self.steps {
            sequence = step.wrap(call, sequence);
        }

        let mut result = Vec::with_capacity(call.n);
        while result.len() < call.n {
            if call.cancel.is_cancelled() {
                return Err(PlacementError::Cancelled);
            }
            match sequence.next() {
                Some(node) => result.push(node),
                None => break,
            }
        }

        if result.len() < call.n {
            return Err(call.insufficient(result.len()));
        }
        Ok(result)
    }
}
