//! The dynamically-typed value every expression node evaluates to.
use std::sync::Arc;

use crate::cohort::{CohortNameFn, CohortRequirement};
use crate::error::PlacementError;
use crate::filter::{FilterHandle, TagExpectation};
use crate::invariant::Invariant;
use crate::node::{NodeValue, SelectedNode};
use crate::score::{CompareNodes, ScoreNode};
use crate::selector::SelectorInitHandle;

/// A candidate pool narrowed for download/read selection. Unlike the
/// upload [`crate::selector`] library (stateful, oversampling,
/// tracker-aware), download selection only ever narrows a caller-supplied
/// candidate set, so a single trait without an init→select split suffices.
pub trait DownloadSelector: Send + Sync {
    /// Returns a subset of `candidates` (no larger than `candidates`,
    /// never inventing nodes not already present) to read from for
    /// `requester`.
    fn select(&self, requester: crate::node::NodeId, candidates: &[SelectedNode], needed: usize) -> Vec<SelectedNode>;
}

/// A shared, type-erased download-selector handle.
pub type DownloadSelectorHandle = Arc<dyn DownloadSelector>;

/// `filter(f)`-as-download-selector: keeps candidates matching `f`,
/// preferring the first `needed` in whatever order they arrived (the
/// overlay cache's own ordering, typically by last-contact recency).
pub struct FilterDownloadSelector(pub FilterHandle);

impl DownloadSelector for FilterDownloadSelector {
    fn select(&self, requester: crate::node::NodeId, candidates: &[SelectedNode], needed: usize) -> Vec<SelectedNode> {
        let ctx = crate::filter::FilterContext::new(requester);
        candidates
            .iter()
            .filter(|n| self.0.matches(&ctx, n))
            .take(needed)
            .cloned()
            .collect()
    }
}

/// `all()`-as-download-selector: every candidate is eligible, capped at
/// `needed`.
pub struct AllDownloadSelector;

impl DownloadSelector for AllDownloadSelector {
    fn select(&self, _requester: crate::node::NodeId, candidates: &[SelectedNode], needed: usize) -> Vec<SelectedNode> {
        candidates.iter().take(needed).cloned().collect()
    }
}

/// The dynamically-typed result of evaluating one DSL sub-expression.
///
/// Every rule kind (filter, selector, invariant, download-selector,
/// cohort-requirement) ultimately resolves to one of these variants;
/// [`crate::expr::eval`] rejects a fully-evaluated expression whose
/// top-level type doesn't match what the binding table expects.
#[derive(Clone)]
pub enum Value {
    Int(i64),
    Float(f64),
    Str(String),
    Bytes(Vec<u8>),
    Filter(FilterHandle),
    Invariant(Arc<dyn Invariant>),
    Selector(SelectorInitHandle),
    DownloadSelector(DownloadSelectorHandle),
    NodeValue(NodeValue),
    Score(ScoreNode),
    Compare(CompareNodes),
    CohortFn(CohortNameFn),
    Cohort(CohortRequirement),
    /// The `empty()`/`notEmpty()` sentinels, valid only as the third
    /// argument to `tag(signer, key, value)`.
    TagSentinel(TagExpectation),
}

impl Value {
    /// A short name for the dynamic type, used in type-mismatch error
    /// messages.
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::Str(_) => "string",
            Value::Bytes(_) => "bytes",
            Value::Filter(_) => "filter",
            Value::Invariant(_) => "invariant",
            Value::Selector(_) => "selector",
            Value::DownloadSelector(_) => "download-selector",
            Value::NodeValue(_) => "node-value",
            Value::Score(_) => "score",
            Value::Compare(_) => "comparator",
            Value::CohortFn(_) => "cohort-name",
            Value::Cohort(_) => "cohort-requirement",
            Value::TagSentinel(_) => "tag-sentinel",
        }
    }

    pub fn as_str(&self, expr: &str) -> Result<&str, PlacementError> {
        match self {
            Value::Str(s) => Ok(s.as_str()),
            other => Err(type_mismatch(expr, "string", other)),
        }
    }

    pub fn as_int(&self, expr: &str) -> Result<i64, PlacementError> {
        match self {
            Value::Int(v) => Ok(*v),
            other => Err(type_mismatch(expr, "int", other)),
        }
    }

    pub fn as_float(&self, expr: &str) -> Result<f64, PlacementError> {
        match self {
            Value::Int(v) => Ok(*v as f64),
            Value::Float(v) => Ok(*v),
            other => Err(type_mismatch(expr, "int or float", other)),
        }
    }

    pub fn as_bytes(&self, expr: &str) -> Result<Vec<u8>, PlacementError> {
        match self {
            Value::Bytes(b) => Ok(b.clone()),
            Value::Str(s) => Ok(s.clone().into_bytes()),
            other => Err(type_mismatch(expr, "bytes or string", other)),
        }
    }

    pub fn into_filter(self, expr: &str) -> Result<FilterHandle, PlacementError> {
        match self {
            Value::Filter(f) => Ok(f),
            other => Err(type_mismatch(expr, "filter", &other)),
        }
    }

    pub fn into_invariant(self, expr: &str) -> Result<Arc<dyn Invariant>, PlacementError> {
        match self {
            Value::Invariant(i) => Ok(i),
            other => Err(type_mismatch(expr, "invariant", &other)),
        }
    }

    pub fn into_selector(self, expr: &str) -> Result<SelectorInitHandle, PlacementError> {
        match self {
            Value::Selector(s) => Ok(s),
            other => Err(type_mismatch(expr, "selector", &other)),
        }
    }

    pub fn into_download_selector(self, expr: &str) -> Result<DownloadSelectorHandle, PlacementError> {
        match self {
            Value::DownloadSelector(d) => Ok(d),
            // A filter value used where a download selector is expected
            // is a legitimate shorthand: `filter(f)` narrows candidates
            // the same way a dedicated download selector would.
            Value::Filter(f) => Ok(Arc::new(FilterDownloadSelector(f))),
            other => Err(type_mismatch(expr, "download-selector", &other)),
        }
    }

    /// Resolves this value to a comparator: an explicit `compare(...)`
    /// result as-is, or a bare score/value promoted to a single-score
    /// comparator (NaN treated as maximal).
    pub fn into_compare(self, expr: &str) -> Result<CompareNodes, PlacementError> {
        if let Value::Compare(c) = self {
            return Ok(c);
        }
        let score = self.into_score(expr)?;
        Ok(CompareNodes::from_score(score))
    }

    pub fn into_cohort(self, expr: &str) -> Result<CohortRequirement, PlacementError> {
        match self {
            Value::Cohort(c) => Ok(c),
            other => Err(type_mismatch(expr, "cohort-requirement", &other)),
        }
    }

    pub fn into_cohort_fn(self, expr: &str) -> Result<CohortNameFn, PlacementError> {
        match self {
            Value::CohortFn(f) => Ok(f),
            Value::Str(s) => Ok(crate::cohort::literal_name(s)),
            other => Err(type_mismatch(expr, "cohort-name", &other)),
        }
    }

    /// Promotes this value to a [`NodeValue`], following the
    /// `int -> float64 -> NodeValue` rung of the arithmetic promotion
    /// chain.
    pub fn into_node_value(self, expr: &str) -> Result<NodeValue, PlacementError> {
        match self {
            Value::Int(v) => Ok(NodeValue::constant(v as f64)),
            Value::Float(v) => Ok(NodeValue::constant(v)),
            Value::NodeValue(v) => Ok(v),
            other => Err(type_mismatch(expr, "int, float, or node-value", &other)),
        }
    }

    /// Promotes this value to a [`ScoreNode`], the top rung of the
    /// promotion chain.
    pub fn into_score(self, expr: &str) -> Result<ScoreNode, PlacementError> {
        match self {
            Value::Int(v) => Ok(ScoreNode::from_value(NodeValue::constant(v as f64))),
            Value::Float(v) => Ok(ScoreNode::from_value(NodeValue::constant(v))),
            Value::NodeValue(v) => Ok(ScoreNode::from_value(v)),
            Value::Score(s) => Ok(s),
            other => Err(type_mismatch(expr, "int, float, node-value, or score", &other)),
        }
    }
}

fn type_mismatch(expr: &str, expected: &str, got: &Value) -> PlacementError {
    PlacementError::parse(expr, format!("expected {expected}, found {}", got.type_name()))
}

/// Ranks a value's position in the `int -> float64 -> NodeValue ->
/// ScoreNode` promotion chain, or `None` for types arithmetic doesn't
/// apply to.
pub fn promotion_rank(value: &Value) -> Option<u8> {
    match value {
        Value::Int(_) => Some(0),
        Value::Float(_) => Some(1),
        Value::NodeValue(_) => Some(2),
        Value::Score(_) => Some(3),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::expect_used, clippy::unwrap_used, clippy::panic)]

    use super::*;

    #[test]
    fn promotion_rank_orders_the_arithmetic_chain() {
        assert_eq!(promotion_rank(&Value::Int(1)), Some(0));
        assert_eq!(promotion_rank(&Value::Float(1.0)), Some(1));
        assert_eq!(promotion_rank(&Value::NodeValue(NodeValue::constant(1.0))), Some(2));
        assert_eq!(promotion_rank(&Value::Score(ScoreNode::from_value(NodeValue::constant(1.0)))), Some(3));
        assert_eq!(promotion_rank(&Value::Str("x".into())), None);
    }

    #[test]
    fn int_and_float_both_coerce_to_node_value_and_score() {
        assert!(Value::Int(3).into_node_value("").is_ok());
        assert!(Value::Float(3.0).into_node_value("").is_ok());
        assert!(Value::Int(3).into_score("").is_ok());
        assert!(Value::Str("x".into()).into_node_value("").is_err());
    }

    #[test]
    fn bare_score_promotes_to_a_comparator() {
        let score = ScoreNode::from_value(NodeValue::constant(1.0));
        assert!(Value::Score(score).into_compare("").is_ok());
        assert!(Value::Int(1).into_compare("").is_ok());
        assert!(Value::Str("x".into()).into_compare("").is_err());
    }

    #[test]
    fn as_bytes_accepts_either_bytes_or_string() {
        assert_eq!(Value::Bytes(b"hi".to_vec()).as_bytes("").expect("ok"), b"hi".to_vec());
        assert_eq!(Value::Str("hi".into()).as_bytes("").expect("ok"), b"hi".to_vec());
        assert!(Value::Int(1).as_bytes("").is_err());
    }

    #[test]
    fn type_mismatch_names_both_types() {
        let err = Value::Int(1).into_filter("country(\"DE\")").unwrap_err();
        let msg = format!("{err}");
        assert!(msg.contains("filter"), "error should mention expected type: {msg}");
        assert!(msg.contains("int"), "error should mention actual type: {msg}");
    }
}
