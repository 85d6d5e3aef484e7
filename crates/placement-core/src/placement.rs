//! The placement registry: compiles a [`crate::config::PlacementConfig`]
//! into live filters/selectors/invariants and serves the five State Facade
//! operations: select, match, match-for-upload, invariant, and
//! download-selector.
use std::collections::HashMap;
use std::sync::Arc;

use arc_swap::ArcSwap;

use crate::cohort::{CohortNameTable, CohortRequirement};
use crate::config::{PlacementConfig, RuleSpec};
use crate::error::PlacementError;
use crate::expr::value::{AllDownloadSelector, FilterDownloadSelector};
use crate::expr::{Bindings, DownloadSelectorHandle, RuleKind, eval_source};
use crate::filter::{And, FilterContext, FilterHandle};
use crate::invariant::{AllGood, Invariant};
use crate::node::{NodeId, SelectedNode};
use crate::selector::{NodeSelectorInit, SelectCall, SelectorHandle, SelectorInitHandle};
use crate::tracker::{UploadFailureTracker, UploadSuccessTracker};

/// `success`/`repair` compiled to a function of the observed `k`
/// (`config::EcField::compile`).
pub use crate::config::EcFn;

/// A placement's compiled erasure-coding overrides.
#[derive(Clone)]
pub struct CompiledEc {
    pub minimum: i64,
    pub total: i64,
    pub success: EcFn,
    pub repair: EcFn,
}

/// One fully-compiled placement: every DSL field evaluated to its live
/// trait object, ready to be driven by the State Facade.
pub struct Placement {
    pub id: u16,
    pub name: Option<String>,
    pub filter: FilterHandle,
    pub upload_filter: FilterHandle,
    pub selector_init: SelectorInitHandle,
    pub invariant: Arc<dyn Invariant>,
    pub download_selector: DownloadSelectorHandle,
    pub cohort_requirements: Option<CohortRequirement>,
    pub cohort_names: CohortNameTable,
    pub ec: Option<CompiledEc>,
}

/// Every placement's selector initialized against one node-cache
/// generation. Cheap to hold onto and reuse for every `Select` call until
/// the next snapshot replaces it.
pub struct SelectorSnapshot {
    selectors: HashMap<u16, SelectorHandle>,
}

impl SelectorSnapshot {
    /// Runs `call.placement`'s selector: applies the node and upload
    /// filters and delegates to the compiled selector. An unregistered
    /// placement id gets an exclude-all fallback: no nodes, no error.
    pub fn select(&self, call: &SelectCall<'_>) -> Result<Vec<SelectedNode>, PlacementError> {
        match self.selectors.get(&call.placement) {
            Some(selector) => selector.select(call),
            None => Ok(Vec::new()),
        }
    }
}

/// The compiled, atomically-published set of placements: built once at
/// process start or reload, swapped in as a whole so no reader ever
/// observes a half-updated registry.
pub struct PlacementDefinitions {
    rules: ArcSwap<HashMap<u16, Arc<Placement>>>,
}

impl PlacementDefinitions {
    /// Compiles `config` and builds a fresh registry.
    pub fn build(
        config: &PlacementConfig,
        success_trackers: &HashMap<String, Arc<dyn UploadSuccessTracker>>,
        failure_trackers: &HashMap<String, Arc<dyn UploadFailureTracker>>,
    ) -> Result<Self, PlacementError> {
        let compiled = compile_rules(config, success_trackers, failure_trackers)?;
        Ok(Self {
            rules: ArcSwap::from_pointee(compiled),
        })
    }

    /// Recompiles `config` and atomically publishes it. Selections already
    /// in flight against the previous map see it through to completion.
    pub fn reload(
        &self,
        config: &PlacementConfig,
        success_trackers: &HashMap<String, Arc<dyn UploadSuccessTracker>>,
        failure_trackers: &HashMap<String, Arc<dyn UploadFailureTracker>>,
    ) -> Result<(), PlacementError> {
        let compiled = compile_rules(config, success_trackers, failure_trackers)?;
        self.rules.store(Arc::new(compiled));
        Ok(())
    }

    fn lookup(&self, id: u16) -> Option<Arc<Placement>> {
        self.rules.load().get(&id).cloned()
    }

    /// Returns the compiled placement, for callers that need its EC
    /// overrides or cohort tree directly.
    pub fn get(&self, id: u16) -> Option<Arc<Placement>> {
        self.lookup(id)
    }

    /// Initializes every placement's selector against `nodes`, so the node
    /// and upload filters are applied lazily through the initialized
    /// selector rather than re-evaluated on every call.
    pub fn snapshot(&self, nodes: &[SelectedNode]) -> SelectorSnapshot {
        let rules = self.rules.load();
        let selectors = rules
            .iter()
            .map(|(id, placement)| {
                let base_filter: FilterHandle = Arc::new(And(vec![placement.filter.clone(), placement.upload_filter.clone()]));
                (*id, placement.selector_init.init(nodes, &base_filter))
            })
            .collect();
        SelectorSnapshot { selectors }
    }

    /// `Match(node)` against a placement's node-filter. An unknown
    /// placement matches nothing.
    pub fn match_node(&self, placement: u16, requester: NodeId, node: &SelectedNode) -> bool {
        self.lookup(placement).is_some_and(|p| p.filter.matches(&FilterContext::new(requester), node))
    }

    /// `MatchForUpload(node)` against a placement's upload-filter. An
    /// unknown placement matches nothing.
    pub fn match_for_upload(&self, placement: u16, requester: NodeId, node: &SelectedNode) -> bool {
        self.lookup(placement).is_some_and(|p| p.upload_filter.matches(&FilterContext::new(requester), node))
    }

    /// The placement's invariant checker. An unknown placement falls back
    /// to `allgood()` — with no rule defined there is nothing to repair.
    pub fn invariant(&self, placement: u16) -> Arc<dyn Invariant> {
        self.lookup(placement)
            .map_or_else(|| Arc::new(AllGood) as Arc<dyn Invariant>, |p| p.invariant.clone())
    }

    /// The placement's download selector. An unknown placement falls back
    /// to accepting every candidate, matching `Match`/`MatchForUpload`'s
    /// "unknown placement has no constraints to apply" stance for reads.
    pub fn download_selector(&self, placement: u16) -> DownloadSelectorHandle {
        self.lookup(placement)
            .map_or_else(|| Arc::new(AllDownloadSelector) as DownloadSelectorHandle, |p| p.download_selector.clone())
    }
}

fn compile_rules(
    config: &PlacementConfig,
    success_trackers: &HashMap<String, Arc<dyn UploadSuccessTracker>>,
    failure_trackers: &HashMap<String, Arc<dyn UploadFailureTracker>>,
) -> Result<HashMap<u16, Arc<Placement>>, PlacementError> {
    let mut sorted: Vec<RuleSpec> = config.rules.clone();
    sorted.sort_by_key(|r| r.id);

    let mut placement_filters: HashMap<u16, FilterHandle> = HashMap::new();
    let mut out = HashMap::new();

    for rule in &sorted {
        let filter_expr = rule.filter.as_deref().unwrap_or("all()");
        let filter = {
            let b = Bindings::new(RuleKind::Filter, success_trackers, failure_trackers, &placement_filters);
            eval_source(filter_expr, &b)?.into_filter(filter_expr)?
        };

        let upload_filter = match rule.upload_filter.as_deref() {
            Some(expr) => {
                let b = Bindings::new(RuleKind::Filter, success_trackers, failure_trackers, &placement_filters);
                eval_source(expr, &b)?.into_filter(expr)?
            }
            None => filter.clone(),
        };

        let invariant_expr = rule.invariant.as_deref().unwrap_or("allgood()");
        let invariant = {
            let b = Bindings::new(RuleKind::Invariant, success_trackers, failure_trackers, &placement_filters);
            eval_source(invariant_expr, &b)?.into_invariant(invariant_expr)?
        };

        let selector_expr = rule.selector.as_deref().unwrap_or("random()");
        let selector_init = {
            let b = Bindings::new(RuleKind::Selector, success_trackers, failure_trackers, &placement_filters);
            eval_source(selector_expr, &b)?.into_selector(selector_expr)?
        };

        let download_selector: DownloadSelectorHandle = match rule.download_selector.as_deref() {
            Some(expr) => {
                let b = Bindings::new(RuleKind::DownloadSelector, success_trackers, failure_trackers, &placement_filters);
                eval_source(expr, &b)?.into_download_selector(expr)?
            }
            None => Arc::new(FilterDownloadSelector(filter.clone())),
        };

        let (cohort_requirements, cohort_names) = match rule.cohort_requirements.as_deref() {
            Some(expr) => {
                let b = Bindings::new(RuleKind::Cohort, success_trackers, failure_trackers, &placement_filters);
                let value = eval_source(expr, &b)?;
                let cohort = value.into_cohort(expr)?;
                (Some(cohort), b.into_cohort_table())
            }
            None => (None, CohortNameTable::new()),
        };

        let ec = rule.ec.as_ref().map(|spec| CompiledEc {
            minimum: spec.minimum,
            total: spec.total,
            success: spec.success.compile(spec.minimum),
            repair: spec.repair.compile(spec.minimum),
        });

        placement_filters.insert(rule.id, filter.clone());

        out.insert(
            rule.id,
            Arc::new(Placement {
                id: rule.id,
                name: rule.name.clone(),
                filter,
                upload_filter,
                selector_init,
                invariant,
                download_selector,
                cohort_requirements,
                cohort_names,
                ec,
            }),
        );
    }

    Ok(out)
}

#[cfg(test)]
mod tests {
    #![allow(clippy::expect_used, clippy::unwrap_used, clippy::panic)]

    use super::*;
    use crate::config::load_config;
    use crate::context::CancellationToken;
    use crate::node::NODE_ID_LEN;
    use std::collections::HashSet;

    fn node(id: u8, country: &str) -> SelectedNode {
        SelectedNode {
            id: NodeId::from_bytes([id; NODE_ID_LEN]),
            address: String::new(),
            last_net: format!("10.0.{id}.0"),
            last_ip_port: String::new(),
            country_code: country.to_string(),
            continent: "Europe".into(),
            vetted: true,
            exiting: false,
            online: true,
            suspended: false,
            free_disk: 0,
            piece_count: 0,
            wallet: String::new(),
            email: String::new(),
            tags: Vec::new(),
        }
    }

    fn empty_trackers() -> (HashMap<String, Arc<dyn UploadSuccessTracker>>, HashMap<String, Arc<dyn UploadFailureTracker>>) {
        (HashMap::new(), HashMap::new())
    }

    #[test]
    fn default_placements_compile_and_match_by_country() {
        let config = load_config("").expect("defaults always load");
        let (s, f) = empty_trackers();
        let defs = PlacementDefinitions::build(&config, &s, &f).expect("should compile");

        let requester = NodeId::from_bytes([1; NODE_ID_LEN]);
        let de_node = node(2, "DE");
        let fr_node = node(3, "FR");

        assert!(defs.match_node(crate::config::PLACEMENT_DE, requester, &de_node));
        assert!(!defs.match_node(crate::config::PLACEMENT_DE, requester, &fr_node));
        assert!(defs.match_node(crate::config::PLACEMENT_DEFAULT, requester, &fr_node));
    }

    #[test]
    fn unknown_placement_matches_nothing_but_has_permissive_invariant_and_download() {
        let config = load_config("").expect("defaults always load");
        let (s, f) = empty_trackers();
        let defs = PlacementDefinitions::build(&config, &s, &f).expect("should compile");

        let requester = NodeId::from_bytes([1; NODE_ID_LEN]);
        assert!(!defs.match_node(999, requester, &node(2, "DE")));
        assert!(!defs.match_for_upload(999, requester, &node(2, "DE")));

        let bad = defs.invariant(999).bad_pieces(&[0], &[node(2, "DE")]);
        assert!(bad.is_empty());

        let candidates = vec![node(2, "DE")];
        let kept = defs.download_selector(999).select(requester, &candidates, 1);
        assert_eq!(kept.len(), 1);
    }

    #[test]
    fn select_through_a_snapshot_honours_the_placement_filter() {
        let config = load_config(r#"9:country("DE")"#).expect("should load");
        let (s, f) = empty_trackers();
        let defs = PlacementDefinitions::build(&config, &s, &f).expect("should compile");

        let nodes: Vec<_> = (0..5).map(|i| node(i, if i % 2 == 0 { "DE" } else { "FR" })).collect();
        let snapshot = defs.snapshot(&nodes);

        let excluded = HashSet::new();
        let call = SelectCall {
            placement: 9,
            requester: NodeId::from_bytes([99; NODE_ID_LEN]),
            n: 2,
            excluded: &excluded,
            already_selected: &[],
            cancel: &CancellationToken::none(),
        };
        let selected = snapshot.select(&call).expect("enough DE nodes");
        assert_eq!(selected.len(), 2);
        assert!(selected.iter().all(|n| n.country_code == "DE"));
    }

    #[test]
    fn select_against_an_unregistered_placement_returns_no_nodes() {
        let config = load_config("").expect("defaults always load");
        let (s, f) = empty_trackers();
        let defs = PlacementDefinitions::build(&config, &s, &f).expect("should compile");
        let nodes: Vec<_> = (0..3).map(|i| node(i, "DE")).collect();
        let snapshot = defs.snapshot(&nodes);

        let excluded = HashSet::new();
        let call = SelectCall {
            placement: 999,
            requester: NodeId::from_bytes([99; NODE_ID_LEN]),
            n: 2,
            excluded: &excluded,
            already_selected: &[],
            cancel: &CancellationToken::none(),
        };
        let selected = snapshot.select(&call).expect("exclude-all fallback is not an error");
        assert!(selected.is_empty());
    }

    #[test]
    fn reload_publishes_a_new_map_atomically() {
        let config = load_config("").expect("defaults always load");
        let (s, f) = empty_trackers();
        let defs = PlacementDefinitions::build(&config, &s, &f).expect("should compile");

        let requester = NodeId::from_bytes([1; NODE_ID_LEN]);
        assert!(!defs.match_node(42, requester, &node(2, "DE")));

        let updated = load_config(r#"42:country("DE")"#).expect("should load");
        defs.reload(&updated, &s, &f).expect("should recompile");
        assert!(defs.match_node(42, requester, &node(2, "DE")));
    }

    #[test]
    fn forward_placement_reference_is_a_parse_error() {
        let yaml = r#"
placements:
  - id: 1
    filter: placement(2)
  - id: 2
    filter: country("DE")
"#;
        let config = load_config(yaml).expect("should load");
        let (s, f) = empty_trackers();
        assert!(PlacementDefinitions::build(&config, &s, &f).is_err());
    }
}
