//! The single error type surfaced by `placement-core`.
//!
//! Every public entry point returns `Result<_, PlacementError>`. The six
//! variants correspond to the error kinds named in the placement
//! specification: a bad DSL expression, a bad config document, a selector
//! that could not satisfy its quota, a cancelled operation, an unavailable
//! tracker, and an attribute/value definition that refers to an unknown
//! field.
use thiserror::Error;

/// Errors produced anywhere in the node-selection engine.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum PlacementError {
    /// Malformed expression, unknown identifier, arity/type mismatch, or a
    /// forward reference to an unregistered placement. Carries the
    /// offending sub-expression verbatim.
    #[error("placement parse error in `{expr}`: {message}")]
    Parse {
        /// The offending sub-expression, verbatim from the source text.
        expr: String,
        /// Human-readable description of what went wrong.
        message: String,
    },

    /// YAML or file I/O failure while loading a placement configuration.
    #[error("placement config error: {0}")]
    Config(String),

    /// A selector could not satisfy the requested count `n` after
    /// exhausting its strategy.
    #[error(
        "insufficient nodes for placement {placement}: requested {requested}, achieved {achieved}"
    )]
    InsufficientNodes {
        /// The placement constraint ID this selection was for.
        placement: u16,
        /// The number of nodes the caller asked for.
        requested: usize,
        /// The number of nodes the selector actually managed to return.
        achieved: usize,
    },

    /// A cancellation context was observed to be cancelled.
    #[error("selection cancelled")]
    Cancelled,

    /// A tracker's refresh failed. Selectors degrade this to a `NaN`
    /// score rather than letting it become a hard failure; this variant
    /// exists for callers (e.g. the CLI) that want to surface it directly.
    #[error("tracker unavailable: {0}")]
    TrackerUnavailable(String),

    /// An attribute or value definition refers to an unknown field or an
    /// ill-formed tag path (e.g. `tag:` with no key).
    #[error("invalid attribute: {0}")]
    InvalidAttribute(String),
}

impl PlacementError {
    /// Shorthand for [`PlacementError::Parse`].
    pub fn parse(expr: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Parse {
            expr: expr.into(),
            message: message.into(),
        }
    }

    /// Shorthand for [`PlacementError::InsufficientNodes`].
    pub fn insufficient(placement: u16, requested: usize, achieved: usize) -> Self {
        Self::InsufficientNodes {
            placement,
            requested,
            achieved,
        }
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::expect_used, clippy::unwrap_used, clippy::panic)]

    use super::*;

    #[test]
    fn parse_error_carries_verbatim_expression() {
        let err = PlacementError::parse("country(XX)", "unknown country code");
        match err {
            PlacementError::Parse { expr, .. } => assert_eq!(expr, "country(XX)"),
            _ => unreachable!("constructed a Parse variant"),
        }
    }

    #[test]
    fn insufficient_nodes_display_mentions_counts() {
        let err = PlacementError::insufficient(7, 10, 4);
        let msg = err.to_string();
        assert!(msg.contains("requested 10"));
        assert!(msg.contains("achieved 4"));
    }
}
