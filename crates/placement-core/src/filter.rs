//! The filter library: predicates over a node, composable with boolean
//! algebra, plus a first-hit-wins annotation side channel.
//!
//! All filters implement [`NodeFilter`]. A handful of them
//! (`successfulAtLeastPercent`) need to know which node is *requesting* the
//! match (to look up a tracker score for that requester), so `matches`
//! takes a [`FilterContext`] rather than being a bare `SelectedNode -> bool`
//! closure; every other filter ignores it.
use std::collections::HashSet;
use std::fmt;
use std::path::Path;
use std::sync::Arc;

use crate::country::{EEA_EXTRA, EU27, NR_EXCLUDED};
use crate::error::PlacementError;
use crate::node::{NodeId, SelectedNode};
use crate::tracker::UploadSuccessTracker;

/// Per-call context threaded through [`NodeFilter::matches`].
#[derive(Clone, Copy, Debug)]
pub struct FilterContext {
    /// The node on whose behalf this match is being evaluated (e.g. the
    /// node that will read or write the piece). Most filters ignore this.
    pub requester: NodeId,
}

impl FilterContext {
    /// Builds a context for the given requester.
    pub fn new(requester: NodeId) -> Self {
        Self { requester }
    }
}

/// A predicate over a node, evaluated deterministically and side-effect
/// free on the `(filter, node)` pair (tracker-backed filters are the one
/// intentional exception: they consult a live, possibly time-varying
/// score).
pub trait NodeFilter: Send + Sync {
    /// Evaluates this filter against `node` in the given context.
    fn matches(&self, ctx: &FilterContext, node: &SelectedNode) -> bool;

    /// Returns the value of annotation `key` on this filter, if any.
    /// Composite filters look this up via first-hit, left-to-right
    /// traversal of their children.
    fn get_annotation(&self, _key: &str) -> Option<String> {
        None
    }

    /// Returns the canonical DSL string form of this filter, if it has
    /// one. Only literal-set filters (`country`, `continent`) round-trip;
    /// derived/composite filters return `None`.
    fn canonical(&self) -> Option<String> {
        None
    }
}

/// A shared, type-erased filter handle.
pub type FilterHandle = Arc<dyn NodeFilter>;

// ---------------------------------------------------------------------------
// Boolean algebra
// ---------------------------------------------------------------------------

/// Conjunction of a list of filters — the implicit form when multiple
/// filters are listed together.
pub struct And(pub Vec<FilterHandle>);

impl NodeFilter for And {
    fn matches(&self, ctx: &FilterContext, node: &SelectedNode) -> bool {
        self.0.iter().all(|f| f.matches(ctx, node))
    }

    fn get_annotation(&self, key: &str) -> Option<String> {
        self.0.iter().find_map(|f| f.get_annotation(key))
    }
}

/// Disjunction of a list of filters (`||`).
pub struct Or(pub Vec<FilterHandle>);

impl NodeFilter for Or {
    fn matches(&self, ctx: &FilterContext, node: &SelectedNode) -> bool {
        self.0.iter().any(|f| f.matches(ctx, node))
    }

    fn get_annotation(&self, key: &str) -> Option<String> {
        self.0.iter().find_map(|f| f.get_annotation(key))
    }
}

/// `exclude(f)` — negates `f`.
pub struct Exclude(pub FilterHandle);

impl NodeFilter for Exclude {
    fn matches(&self, ctx: &FilterContext, node: &SelectedNode) -> bool {
        !self.0.matches(ctx, node)
    }

    fn get_annotation(&self, key: &str) -> Option<String> {
        self.0.get_annotation(key)
    }
}

/// `all()` — the tautology; matches every node.
pub struct All;

impl NodeFilter for All {
    fn matches(&self, _ctx: &FilterContext, _node: &SelectedNode) -> bool {
        true
    }

    fn canonical(&self) -> Option<String> {
        Some("all()".to_string())
    }
}

/// `none()` — the contradiction, a.k.a. the distinguished exclude-all
/// filter used when an unknown placement ID is looked up.
pub struct NoneFilter;

impl NodeFilter for NoneFilter {
    fn matches(&self, _ctx: &FilterContext, _node: &SelectedNode) -> bool {
        false
    }

    fn canonical(&self) -> Option<String> {
        Some("none()".to_string())
    }
}

/// `annotation(k, v)` — matches every node (like [`All`]) but carries one
/// annotation. Used as an argument to [`Annotated`].
pub struct Annotation {
    key: String,
    value: String,
}

impl Annotation {
    /// Builds a single `key=value` annotation carrier.
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }
}

impl NodeFilter for Annotation {
    fn matches(&self, _ctx: &FilterContext, _node: &SelectedNode) -> bool {
        true
    }

    fn get_annotation(&self, key: &str) -> Option<String> {
        (self.key == key).then(|| self.value.clone())
    }
}

/// `annotated(f, annotation...)` — wraps `f` with additional annotations.
/// Own annotations are checked before falling through to `f`'s, so a
/// re-annotated filter can override what it wraps.
pub struct Annotated {
    inner: FilterHandle,
    annotations: Vec<(String, String)>,
}

impl Annotated {
    /// Wraps `inner` with `annotations`, collected from `annotation(k, v)`
    /// arguments.
    pub fn new(inner: FilterHandle, annotations: Vec<(String, String)>) -> Self {
        Self { inner, annotations }
    }
}

impl NodeFilter for Annotated {
    fn matches(&self, ctx: &FilterContext, node: &SelectedNode) -> bool {
        self.inner.matches(ctx, node)
    }

    fn get_annotation(&self, key: &str) -> Option<String> {
        self.annotations
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.clone())
            .or_else(|| self.inner.get_annotation(key))
    }
}

/// Well-known annotation key: setting `autoExcludeSubnet = "off"` on a
/// placement's filter disables subnet de-duplication for selectors built
/// against it.
pub const ANNOTATION_AUTO_EXCLUDE_SUBNET: &str = "autoExcludeSubnet";

/// Well-known annotation key: a human-readable label for the placement
/// (e.g. a datacenter/region name).
pub const ANNOTATION_LOCATION: &str = "location";

/// Returns `true` unless `filter` carries `autoExcludeSubnet = "off"`.
pub fn subnet_dedup_enabled(filter: &dyn NodeFilter) -> bool {
    filter.get_annotation(ANNOTATION_AUTO_EXCLUDE_SUBNET)
        .as_deref()
        != Some("off")
}

// ---------------------------------------------------------------------------
// country() / continent()
// ---------------------------------------------------------------------------

/// `country(codes...)` — matches when the node's country code is in the
/// resulting set after expanding `EU`/`EEA`/`ALL`/`NONE` groups and
/// applying `!XX` subtractions, left to right.
pub struct Country {
    raw: Vec<String>,
    all: bool,
    added: HashSet<String>,
    removed: HashSet<String>,
}

impl Country {
    /// Builds a country filter from the given code tokens. Each token is
    /// one of: a bare ISO2 code, `EU`, `EEA`, `ALL`/`*`/`ANY`, `NONE`, or a
    /// `!`-prefixed negation of any of those.
    pub fn new(codes: impl IntoIterator<Item = impl Into<String>>) -> Self {
        let raw: Vec<String> = codes.into_iter().map(Into::into).collect();
        let mut all = false;
        let mut added = HashSet::new();
        let mut removed = HashSet::new();
        for token in &raw {
            let (negated, body) = match token.strip_prefix('!') {
                Some(rest) => (true, rest),
                None => (false, token.as_str()),
            };
            let expanded = Self::expand(body);
            if negated {
                removed.extend(expanded);
            } else if body.eq_ignore_ascii_case("ALL")
                || body == "*"
                || body.eq_ignore_ascii_case("ANY")
            {
                all = true;
            } else {
                added.extend(expanded);
            }
        }
        Self {
            raw,
            all,
            added,
            removed,
        }
    }

    fn expand(body: &str) -> Vec<String> {
        if body.eq_ignore_ascii_case("EU") {
            EU27.iter().map(|s| s.to_string()).collect()
        } else if body.eq_ignore_ascii_case("EEA") {
            EU27.iter()
                .chain(EEA_EXTRA.iter())
                .map(|s| s.to_string())
                .collect()
        } else if body.eq_ignore_ascii_case("NONE")
            || body.eq_ignore_ascii_case("ALL")
            || body == "*"
            || body.eq_ignore_ascii_case("ANY")
        {
            Vec::new()
        } else {
            vec![body.to_uppercase()]
        }
    }
}

impl NodeFilter for Country {
    fn matches(&self, _ctx: &FilterContext, node: &SelectedNode) -> bool {
        let code = node.country_code.to_uppercase();
        if self.removed.contains(&code) {
            return false;
        }
        self.all || self.added.contains(&code)
    }

    fn canonical(&self) -> Option<String> {
        Some(format!("country({})", self.raw.join(",")))
    }
}

/// Built-in default static placement country sets, matching the
/// well-known placement IDs pre-populated when no explicit rule overrides
/// them.
pub fn eu_filter() -> Country {
    Country::new(["EU"])
}

/// See [`eu_filter`].
pub fn eea_filter() -> Country {
    Country::new(["EEA"])
}

/// `US` built-in placement filter.
pub fn us_filter() -> Country {
    Country::new(["US"])
}

/// `DE` built-in placement filter.
pub fn de_filter() -> Country {
    Country::new(["DE"])
}

/// `NR` ("no Russia/Belarus") built-in placement filter: every country
/// except the excluded set.
pub fn nr_filter() -> Country {
    let mut codes: Vec<String> = vec!["ALL".to_string()];
    codes.extend(NR_EXCLUDED.iter().map(|c| format!("!{c}")));
    Country::new(codes)
}

/// `continent(code)` — matches the node's continent, or its negation with
/// a `!` prefix.
pub struct Continent {
    code: String,
    negated: bool,
}

impl Continent {
    /// Builds a continent filter. `code` may be `!`-prefixed to negate.
    pub fn new(code: impl Into<String>) -> Self {
        let code = code.into();
        match code.strip_prefix('!') {
            Some(rest) => Self {
                code: rest.to_string(),
                negated: true,
            },
            None => Self {
                code,
                negated: false,
            },
        }
    }
}

impl NodeFilter for Continent {
    fn matches(&self, _ctx: &FilterContext, node: &SelectedNode) -> bool {
        let equal = node.continent.eq_ignore_ascii_case(&self.code);
        equal != self.negated
    }

    fn canonical(&self) -> Option<String> {
        let prefix = if self.negated { "!" } else { "" };
        Some(format!("continent({prefix}{})", self.code))
    }
}

// ---------------------------------------------------------------------------
// tag()
// ---------------------------------------------------------------------------

/// The expected value shape for a [`Tag`] filter.
#[derive(Clone, Debug)]
pub enum TagExpectation {
    /// Must equal this literal byte string.
    Literal(Vec<u8>),
    /// Must be absent or have an empty value.
    Empty,
    /// Must be present with a non-empty value.
    NotEmpty,
}

/// `tag(signer, key, value)` — matches nodes carrying a tag from `signer`
/// with name `key` whose value satisfies `expectation`. `value` may be a
/// literal byte string, the `empty()` sentinel (absent or empty value),
/// or the `notEmpty()` sentinel (present with a non-empty value, also the
/// default when `value` is omitted).
pub struct Tag {
    signer: NodeId,
    key: String,
    expectation: TagExpectation,
}

impl Tag {
    /// Builds a tag filter.
    pub fn new(signer: NodeId, key: impl Into<String>, expectation: TagExpectation) -> Self {
        Self {
            signer,
            key: key.into(),
            expectation,
        }
    }
}

impl NodeFilter for Tag {
    fn matches(&self, _ctx: &FilterContext, node: &SelectedNode) -> bool {
        let value = node.tag_value(Some(&self.signer), &self.key);
        match &self.expectation {
            TagExpectation::Literal(expected) => value == Some(expected.as_slice()),
            TagExpectation::Empty => value.is_none_or(|v| v.is_empty()),
            TagExpectation::NotEmpty => value.is_some_and(|v| !v.is_empty()),
        }
    }
}

// ---------------------------------------------------------------------------
// nodelist()
// ---------------------------------------------------------------------------

/// `nodelist(path)` — an allow-list of node IDs parsed from a text file,
/// one hex-or-base58 ID per line. `#`-prefixed lines (after trimming) and
/// blank lines are comments.
pub struct NodeList {
    ids: HashSet<NodeId>,
}

impl NodeList {
    /// Loads an allow-list from `path`.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, PlacementError> {
        let text = std::fs::read_to_string(path.as_ref()).map_err(|e| {
            PlacementError::Config(format!(
                "reading nodelist {}: {e}",
                path.as_ref().display()
            ))
        })?;
        Self::parse(&text)
    }

    /// Parses an allow-list from in-memory text, for tests and inline
    /// config bodies.
    pub fn parse(text: &str) -> Result<Self, PlacementError> {
        let mut ids = HashSet::new();
        for line in text.lines() {
            let line = line.split('#').next().unwrap_or("").trim();
            if line.is_empty() {
                continue;
            }
            let id: NodeId = line
                .parse()
                .map_err(|e| PlacementError::Config(format!("nodelist entry {line:?}: {e}")))?;
            ids.insert(id);
        }
        Ok(Self { ids })
    }
}

impl NodeFilter for NodeList {
    fn matches(&self, _ctx: &FilterContext, node: &SelectedNode) -> bool {
        self.ids.contains(&node.id)
    }
}

// ---------------------------------------------------------------------------
// select()
// ---------------------------------------------------------------------------

/// Comparison operator for [`Select`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CompareOp {
    /// `=` or `==`.
    Eq,
    /// `!=` or `<>`.
    Ne,
    /// `<`.
    Lt,
    /// `<=`.
    Le,
    /// `>`.
    Gt,
    /// `>=`.
    Ge,
}

impl fmt::Display for CompareOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Eq => "=",
            Self::Ne => "!=",
            Self::Lt => "<",
            Self::Le => "<=",
            Self::Gt => ">",
            Self::Ge => ">=",
        })
    }
}

/// The right-hand side of a [`Select`] comparison.
pub enum SelectRhs {
    /// An ordinary literal to compare against.
    Literal(String),
    /// The `stringNotMatch` sentinel: the comparison result is inverted.
    NotMatch(String),
}

/// `select(attr, op, value)` — a generic attribute comparison. Numeric
/// comparison is attempted first (for `<`/`<=`/`>`/`>=`); falls back to a
/// lexicographic string comparison.
pub struct Select {
    attr: crate::node::NodeAttribute,
    op: CompareOp,
    rhs: SelectRhs,
}

impl Select {
    /// Builds a `select` filter.
    pub fn new(attr: crate::node::NodeAttribute, op: CompareOp, rhs: SelectRhs) -> Self {
        Self { attr, op, rhs }
    }

    fn compare(lhs: &str, op: CompareOp, rhs: &str) -> bool {
        if let (Ok(l), Ok(r)) = (lhs.parse::<f64>(), rhs.parse::<f64>()) {
            return match op {
                CompareOp::Eq => l == r,
                CompareOp::Ne => l != r,
                CompareOp::Lt => l < r,
                CompareOp::Le => l <= r,
                CompareOp::Gt => l > r,
                CompareOp::Ge => l >= r,
            };
        }
        match op {
            CompareOp::Eq => lhs == rhs,
            CompareOp::Ne => lhs != rhs,
            CompareOp::Lt => lhs < rhs,
            CompareOp::Le => lhs <= rhs,
            CompareOp::Gt => lhs > rhs,
            CompareOp::Ge => lhs >= rhs,
        }
    }
}

impl NodeFilter for Select {
    fn matches(&self, _ctx: &FilterContext, node: &SelectedNode) -> bool {
        let actual = self.attr.apply(node);
        match &self.rhs {
            SelectRhs::Literal(value) => Self::compare(&actual, self.op, value),
            SelectRhs::NotMatch(value) => !Self::compare(&actual, self.op, value),
        }
    }
}

// ---------------------------------------------------------------------------
// successfulAtLeastPercent()
// ---------------------------------------------------------------------------

/// `successfulAtLeastPercent(tracker, p)` — matches when the tracker has
/// no data for this (requester, node) pair (`NaN` is lenient) or the score
/// is at least `p`.
pub struct SuccessfulAtLeastPercent {
    tracker: Arc<dyn UploadSuccessTracker>,
    p: f64,
}

impl SuccessfulAtLeastPercent {
    /// Builds a filter backed by `tracker`, requiring a score of at least
    /// `p` (0.0–1.0).
    pub fn new(tracker: Arc<dyn UploadSuccessTracker>, p: f64) -> Self {
        Self { tracker, p }
    }
}

impl NodeFilter for SuccessfulAtLeastPercent {
    fn matches(&self, ctx: &FilterContext, node: &SelectedNode) -> bool {
        let scores = self.tracker.get(ctx.requester);
        match scores.get(&node.id).copied() {
            None => true,
            Some(score) if score.is_nan() => true,
            Some(score) => score >= self.p,
        }
    }
}
