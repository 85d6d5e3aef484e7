#![deny(clippy::print_stdout, clippy::print_stderr)]

pub mod cohort;
pub mod config;
pub mod context;
pub mod country;
pub mod error;
pub mod expr;
pub mod filter;
pub mod invariant;
pub mod node;
pub mod placement;
pub mod score;
pub mod selector;
pub mod tracker;

pub use cohort::{CohortNameFn, CohortNameTable, CohortRequirement};
pub use config::{PlacementConfig, load_config};
pub use context::CancellationToken;
pub use error::PlacementError;
pub use filter::{FilterContext, FilterHandle, NodeFilter};
pub use invariant::Invariant;
pub use node::{NodeAttribute, NodeId, NodeValue, SelectedNode};
pub use placement::{Placement, PlacementDefinitions};
pub use score::{CompareNodes, ScoreNode};
pub use selector::{NodeSelector, NodeSelectorInit, SelectCall, SelectorHandle, SelectorInitHandle};

/// Returns the current version of the placement-core library.
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

#[cfg(test)]
mod tests {
    #![allow(clippy::expect_used)]

    use super::*;

    #[test]
    fn version_is_semver() {
        let v = version();
        let parts: Vec<&str> = v.split('.').collect();
        assert_eq!(parts.len(), 3, "version should have 3 parts: {v}");
        for part in parts {
            part.parse::<u32>().expect("each part should be a number");
        }
    }
}
