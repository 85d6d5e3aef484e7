//! Cohort requirements: a small tree describing how many successful
//! pieces an upload needs, with optional per-group withholding (e.g.
//! "discount the first k pieces per rack, then ask if enough remain").
//!
//! Evaluating whether a concrete upload attempt satisfies a tree is the
//! uplink's job, not the satellite's: this module only parses, builds,
//! and hands back the tree plus its name table. [`CohortRequirement::is_satisfied_by`]
//! exists solely so tests can assert the worked examples against a
//! structural model; nothing in the selection path calls it.
use std::collections::HashMap;
use std::sync::Arc;

use crate::node::SelectedNode;

/// Assigns a cohort (e.g. "rack", "datacenter") name to a node.
pub type CohortNameFn = Arc<dyn Fn(&SelectedNode) -> String + Send + Sync>;

/// Maps each `withhold` node's synthetic key back to the name function it
/// was built with, in tree-construction order.
#[derive(Clone, Default)]
pub struct CohortNameTable {
    entries: Vec<(String, CohortNameFn)>,
}

impl CohortNameTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `name_fn` under a fresh synthetic key (`"0"`, `"1"`, ...
    /// in construction order) and returns that key.
    pub fn register(&mut self, name_fn: CohortNameFn) -> String {
        let key = self.entries.len().to_string();
        self.entries.push((key.clone(), name_fn));
        key
    }

    pub fn get(&self, key: &str) -> Option<&CohortNameFn> {
        self.entries.iter().find(|(k, _)| k == key).map(|(_, f)| f)
    }

    /// The registered keys, in construction order.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(k, _)| k.as_str())
    }
}

/// A cohort-requirement tree node.
#[derive(Clone)]
pub enum CohortRequirement {
    /// Must have at least this many successful pieces.
    Literal(u32),
    /// All children must hold.
    And(Vec<CohortRequirement>),
    /// Partitions pieces by the cohort-name function registered under
    /// `name_key`, discards `amount` successful pieces from each group,
    /// then evaluates `child` against what remains.
    Withhold { name_key: String, amount: u32, child: Box<CohortRequirement> },
}

impl CohortRequirement {
    /// Builds a `literal(v)` requirement.
    pub fn min(v: u32) -> Self {
        CohortRequirement::Literal(v)
    }

    /// Builds an `and(children...)` requirement.
    pub fn and(children: Vec<CohortRequirement>) -> Self {
        CohortRequirement::And(children)
    }

    /// Registers `name_fn` in `table` and builds the `withhold` node
    /// around it.
    pub fn withhold(table: &mut CohortNameTable, name_fn: CohortNameFn, amount: u32, child: CohortRequirement) -> Self {
        let name_key = table.register(name_fn);
        CohortRequirement::Withhold { name_key, amount, child: Box::new(child) }
    }

    /// A human-readable structural description, independent of any
    /// concrete node data.
    pub fn describe(&self) -> String {
        match self {
            CohortRequirement::Literal(v) => format!("literal({v})"),
            CohortRequirement::And(children) => {
                let parts: Vec<String> = children.iter().map(CohortRequirement::describe).collect();
                format!("and({})", parts.join(", "))
            }
            CohortRequirement::Withhold { name_key, amount, child } => {
                format!("withhold({name_key}, {amount}, {})", child.describe())
            }
        }
    }

    /// Evaluates this requirement against a concrete `(node, succeeded)`
    /// list, for test purposes only. Withholding discards the first
    /// `amount` successful pieces seen per group (arbitrary within a
    /// group, since only the surviving count feeds the child).
    pub fn is_satisfied_by(&self, names: &CohortNameTable, pieces: &[(SelectedNode, bool)]) -> bool {
        match self {
            CohortRequirement::Literal(min) => {
                let successes = pieces.iter().filter(|(_, ok)| *ok).count() as u32;
                successes >= *min
            }
            CohortRequirement::And(children) => children.iter().all(|c| c.is_satisfied_by(names, pieces)),
            CohortRequirement::Withhold { name_key, amount, child } => {
                let Some(name_fn) = names.get(name_key) else {
                    // Unregistered key: the tree was built by hand rather
                    // than through `CohortRequirement::withhold`, so there
                    // is no way to group pieces. Treat as unsatisfiable.
                    return false;
                };
                let mut withheld_per_group: HashMap<String, u32> = HashMap::new();
                let mut reduced = Vec::with_capacity(pieces.len());
                for (node, ok) in pieces {
                    if *ok {
                        let group = name_fn(node);
                        let withheld = withheld_per_group.entry(group).or_insert(0);
                        if *withheld < *amount {
                            *withheld += 1;
                            continue;
                        }
                    }
                    reduced.push((node.clone(), *ok));
                }
                child.is_satisfied_by(names, &reduced)
            }
        }
    }
}

/// Builds a cohort-name function from a plain node attribute, e.g.
/// `attr("dc")`.
pub fn name_from_attr(attr: crate::node::NodeAttribute) -> CohortNameFn {
    Arc::new(move |node| attr.apply(node))
}

/// Concatenates two cohort-name functions (the DSL's infix `+` between
/// cohort-name values), e.g. `attr("dc") + "-" + attr("rack")`.
pub fn concat_names(a: CohortNameFn, b: CohortNameFn) -> CohortNameFn {
    Arc::new(move |node| format!("{}{}", a(node), b(node)))
}

/// Lifts a string literal into a constant cohort-name function, for use
/// on either side of `concat_names`.
pub fn literal_name(value: impl Into<String>) -> CohortNameFn {
    let value = value.into();
    Arc::new(move |_node| value.clone())
}
