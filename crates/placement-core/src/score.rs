//! Score/compare layer: per-requester scoring and comparison functions,
//! and the arithmetic combinators the expression evaluator promotes
//! literals and attributes through.
use std::cmp::Ordering;
use std::fmt;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use crate::node::{NodeId, NodeValue, SelectedNode};

/// A per-requester node-scoring function: `NodeID -> Node -> float64`.
///
/// Needing the requester is what separates this from a plain
/// [`NodeValue`] — e.g. a score built from `successfulAtLeastPercent`'s
/// tracker needs to know who is asking.
#[derive(Clone)]
pub struct ScoreNode {
    name: String,
    f: Arc<dyn Fn(NodeId, &SelectedNode) -> f64 + Send + Sync>,
}

impl fmt::Debug for ScoreNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ScoreNode({})", self.name)
    }
}

impl ScoreNode {
    /// Builds a named score from an arbitrary closure.
    pub fn new(
        name: impl Into<String>,
        f: impl Fn(NodeId, &SelectedNode) -> f64 + Send + Sync + 'static,
    ) -> Self {
        Self {
            name: name.into(),
            f: Arc::new(f),
        }
    }

    /// The score's name, as it would appear in the DSL.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Evaluates this score for `node`, from `requester`'s point of view.
    pub fn apply(&self, requester: NodeId, node: &SelectedNode) -> f64 {
        (self.f)(requester, node)
    }

    /// Promotes a requester-independent [`NodeValue`] to a [`ScoreNode`]
    /// that ignores its requester argument — the bottom rung of the
    /// `int -> float64 -> NodeValue -> ScoreNode` promotion chain.
    pub fn from_value(value: NodeValue) -> Self {
        Self::new(value.name().to_string(), move |_requester, node| value.apply(node))
    }
}

/// A per-requester node comparator, as produced by [`ScoreNode`]-based
/// rules and combined by [`Compare`].
#[derive(Clone)]
pub struct CompareNodes {
    f: Arc<dyn Fn(NodeId, &SelectedNode, &SelectedNode) -> Ordering + Send + Sync>,
}

impl fmt::Debug for CompareNodes {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CompareNodes")
    }
}

impl CompareNodes {
    /// Builds a comparator from an arbitrary closure.
    pub fn new(f: impl Fn(NodeId, &SelectedNode, &SelectedNode) -> Ordering + Send + Sync + 'static) -> Self {
        Self { f: Arc::new(f) }
    }

    /// Compares `a` against `b` from `requester`'s point of view.
    pub fn compare(&self, requester: NodeId, a: &SelectedNode, b: &SelectedNode) -> Ordering {
        (self.f)(requester, a, b)
    }

    /// Builds a single-score comparator with NaN treated as maximal (a
    /// node with no data stays in contention rather than sorting last).
    pub fn from_score(score: ScoreNode) -> Self {
        Self::new(move |requester, a, b| {
            nan_max_cmp(score.apply(requester, a), score.apply(requester, b))
        })
    }
}

/// Compares two floats with NaN treated as the maximal value.
fn nan_max_cmp(a: f64, b: f64) -> Ordering {
    match (a.is_nan(), b.is_nan()) {
        (true, true) => Ordering::Equal,
        (true, false) => Ordering::Greater,
        (false, true) => Ordering::Less,
        (false, false) => a.partial_cmp(&b).unwrap_or(Ordering::Equal),
    }
}

/// `compare(scoreNodes...)` — builds a lexicographic comparator: the
/// first score that differentiates two nodes decides the order.
pub struct Compare(pub Vec<ScoreNode>);

impl Compare {
    /// Builds the lexicographic [`CompareNodes`] for this score list.
    pub fn build(self) -> CompareNodes {
        let scores = self.0;
        CompareNodes::new(move |requester, a, b| {
            for score in &scores {
                let ordering = nan_max_cmp(score.apply(requester, a), score.apply(requester, b));
                if ordering != Ordering::Equal {
                    return ordering;
                }
            }
            Ordering::Equal
        })
    }
}

// ---------------------------------------------------------------------------
// Arithmetic combinators
//
// The expression evaluator (`eval.rs`) dispatches `+ - * / ^` through
// these helpers once it has resolved both operands' types and promoted
// the lower one up the `int -> float64 -> NodeValue -> ScoreNode` chain;
// this module only has to implement each operation once per rung.
// ---------------------------------------------------------------------------

/// Adds two node values pointwise.
pub fn add_values(a: NodeValue, b: NodeValue) -> NodeValue {
    NodeValue::new(format!("({} + {})", a.name(), b.name()), move |n| a.apply(n) + b.apply(n))
}

/// Subtracts two node values pointwise.
pub fn sub_values(a: NodeValue, b: NodeValue) -> NodeValue {
    NodeValue::new(format!("({} - {})", a.name(), b.name()), move |n| a.apply(n) - b.apply(n))
}

/// Multiplies two node values pointwise.
pub fn mul_values(a: NodeValue, b: NodeValue) -> NodeValue {
    NodeValue::new(format!("({} * {})", a.name(), b.name()), move |n| a.apply(n) * b.apply(n))
}

/// Divides two node values pointwise.
pub fn div_values(a: NodeValue, b: NodeValue) -> NodeValue {
    NodeValue::new(format!("({} / {})", a.name(), b.name()), move |n| a.apply(n) / b.apply(n))
}

/// Raises `a` to the power of `b`, pointwise. Rust has no `^` operator
/// overload suitable for this, so the evaluator calls this helper
/// directly when it sees the `^` token.
pub fn pow_values(a: NodeValue, b: NodeValue) -> NodeValue {
    NodeValue::new(format!("({} ^ {})", a.name(), b.name()), move |n| a.apply(n).powf(b.apply(n)))
}

/// Adds two scores pointwise, per requester.
pub fn add_scores(a: ScoreNode, b: ScoreNode) -> ScoreNode {
    ScoreNode::new(format!("({} + {})", a.name(), b.name()), move |r, n| {
        a.apply(r, n) + b.apply(r, n)
    })
}

/// Subtracts two scores pointwise, per requester.
pub fn sub_scores(a: ScoreNode, b: ScoreNode) -> ScoreNode {
    ScoreNode::new(format!("({} - {})", a.name(), b.name()), move |r, n| {
        a.apply(r, n) - b.apply(r, n)
    })
}

/// Multiplies two scores pointwise, per requester.
pub fn mul_scores(a: ScoreNode, b: ScoreNode) -> ScoreNode {
    ScoreNode::new(format!("({} * {})", a.name(), b.name()), move |r, n| {
        a.apply(r, n) * b.apply(r, n)
    })
}

/// Divides two scores pointwise, per requester.
pub fn div_scores(a: ScoreNode, b: ScoreNode) -> ScoreNode {
    ScoreNode::new(format!("({} / {})", a.name(), b.name()), move |r, n| {
        a.apply(r, n) / b.apply(r, n)
    })
}

/// Raises one score to the power of another, pointwise, per requester.
pub fn pow_scores(a: ScoreNode, b: ScoreNode) -> ScoreNode {
    ScoreNode::new(format!("({} ^ {})", a.name(), b.name()), move |r, n| {
        a.apply(r, n).powf(b.apply(r, n))
    })
}

/// `min(a, b)` lifted to node values.
pub fn min_values(a: NodeValue, b: NodeValue) -> NodeValue {
    NodeValue::new(format!("min({}, {})", a.name(), b.name()), move |n| {
        a.apply(n).min(b.apply(n))
    })
}

/// `max(a, b)` lifted to node values.
pub fn max_values(a: NodeValue, b: NodeValue) -> NodeValue {
    NodeValue::new(format!("max({}, {})", a.name(), b.name()), move |n| {
        a.apply(n).max(b.apply(n))
    })
}

/// `round(a)` lifted to node values.
pub fn round_value(a: NodeValue) -> NodeValue {
    NodeValue::new(format!("round({})", a.name()), move |n| a.apply(n).round())
}

/// `min(a, b)` lifted to scores.
pub fn min_scores(a: ScoreNode, b: ScoreNode) -> ScoreNode {
    ScoreNode::new(format!("min({}, {})", a.name(), b.name()), move |r, n| {
        a.apply(r, n).min(b.apply(r, n))
    })
}

/// `max(a, b)` lifted to scores.
pub fn max_scores(a: ScoreNode, b: ScoreNode) -> ScoreNode {
    ScoreNode::new(format!("max({}, {})", a.name(), b.name()), move |r, n| {
        a.apply(r, n).max(b.apply(r, n))
    })
}

/// `round(a)` lifted to scores.
pub fn round_score(a: ScoreNode) -> ScoreNode {
    ScoreNode::new(format!("round({})", a.name()), move |r, n| a.apply(r, n).round())
}

/// Returns the current wall-clock hour of day, `0..24`, UTC.
fn current_hour() -> usize {
    let secs = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0);
    ((secs / 3600) % 24) as usize
}

/// `daily(h0, ..., h23)` — a node value that ignores the node and
/// returns `hours[current_hour()]`, making a selector built from it
/// time-varying.
pub fn daily(hours: [i64; 24]) -> NodeValue {
    NodeValue::new("daily(...)", move |_node| hours[current_hour()] as f64)
}
