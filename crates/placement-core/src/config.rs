//! Placement configuration: the full YAML schema, the legacy
//! `id:expr;id:expr` string form, `$NAME` template substitution, and the
//! five default static placements.
//!
//! This module only parses and resolves an on-disk or in-memory config
//! document into [`RuleSpec`]s — plain data, no DSL compilation. Turning a
//! `RuleSpec`'s expression strings into live filters/selectors/invariants
//! is [`crate::placement`]'s job, since that step needs the tracker and
//! forward-placement-reference bindings a config loader has no business
//! holding.
use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::Path;
use std::sync::{Arc, LazyLock};

use regex::Regex;
use serde::Deserialize;

use crate::error::PlacementError;

/// Built-in placement ID for the satellite-wide default (any node,
/// subnet-diverse, clumping by `last_net` at most 1).
pub const PLACEMENT_DEFAULT: u16 = 0;
/// Built-in placement ID for the `EEA` country group.
pub const PLACEMENT_EEA: u16 = 1;
/// Built-in placement ID for the `EU` country group.
pub const PLACEMENT_EU: u16 = 2;
/// Built-in placement ID for the `US` country group.
pub const PLACEMENT_US: u16 = 3;
/// Built-in placement ID for the `DE` (Germany-only) country group.
pub const PLACEMENT_DE: u16 = 4;
/// Built-in placement ID for the `NR` (no Russia/Belarus) country group.
pub const PLACEMENT_NR: u16 = 5;

/// A function of the actual `k` (redundancy scheme's `minimum`) observed
/// at call time, compiled from an [`EcField`].
pub type EcFn = Arc<dyn Fn(i64) -> i64 + Send + Sync>;

/// A raw `success`/`repair` field from the YAML `ec:` block, before
/// compilation: either a fixed literal or a `"+N"` offset expression.
#[derive(Clone, Debug, PartialEq)]
pub enum EcField {
    /// A bare integer: as a function of `k`, returns the literal only
    /// when `k == minimum`, else `0`.
    Literal(i64),
    /// A `"+N"` string: as a function of `k`, returns `k + N` for any `k`.
    PlusOffset(i64),
}

impl EcField {
    fn parse(raw: &EcFieldRaw) -> Result<Self, PlacementError> {
        match raw {
            EcFieldRaw::Int(v) => Ok(EcField::Literal(*v)),
            EcFieldRaw::Str(s) => {
                let offset = s.strip_prefix('+').ok_or_else(|| {
                    PlacementError::Config(format!("ec field {s:?} must be an integer or a \"+N\" offset"))
                })?;
                let n: i64 = offset
                    .parse()
                    .map_err(|_| PlacementError::Config(format!("bad ec offset {s:?}")))?;
                Ok(EcField::PlusOffset(n))
            }
        }
    }

    /// Compiles this field into a function of `k`, closing over
    /// `minimum` for the literal case.
    pub fn compile(&self, minimum: i64) -> EcFn {
        match *self {
            EcField::Literal(v) => Arc::new(move |k| if k == minimum { v } else { 0 }),
            EcField::PlusOffset(n) => Arc::new(move |k| k + n),
        }
    }
}

#[derive(Deserialize, Debug, Clone)]
#[serde(untagged)]
enum EcFieldRaw {
    Int(i64),
    Str(String),
}

/// A parsed (but not yet compiled) `ec:` block.
#[derive(Clone, Debug)]
pub struct EcSpec {
    pub minimum: i64,
    pub total: i64,
    pub success: EcField,
    pub repair: EcField,
}

#[derive(Deserialize, Debug)]
struct EcSpecRaw {
    minimum: i64,
    total: i64,
    success: EcFieldRaw,
    repair: EcFieldRaw,
}

/// One placement entry, expressions still in source form — `$NAME`
/// templates already expanded, but not yet parsed/compiled to DSL values.
#[derive(Clone, Debug)]
pub struct RuleSpec {
    pub id: u16,
    pub name: Option<String>,
    pub filter: Option<String>,
    pub upload_filter: Option<String>,
    pub invariant: Option<String>,
    pub selector: Option<String>,
    pub download_selector: Option<String>,
    pub cohort_requirements: Option<String>,
    pub ec: Option<EcSpec>,
}

impl RuleSpec {
    fn bare(id: u16) -> Self {
        Self {
            id,
            name: None,
            filter: None,
            upload_filter: None,
            invariant: None,
            selector: None,
            download_selector: None,
            cohort_requirements: None,
            ec: None,
        }
    }
}

/// The fully-resolved result of loading a placement configuration:
/// default static rules plus whatever the document/legacy-string/file
/// added or overrode, keyed by `id` (later entries win).
#[derive(Clone, Debug, Default)]
pub struct PlacementConfig {
    pub rules: Vec<RuleSpec>,
}

#[derive(Deserialize, Debug, Default)]
struct YamlDoc {
    #[serde(default)]
    templates: HashMap<String, String>,
    #[serde(default)]
    placements: Vec<YamlPlacement>,
}

#[derive(Deserialize, Debug)]
struct YamlPlacement {
    id: u16,
    name: Option<String>,
    filter: Option<String>,
    #[serde(rename = "upload-filter")]
    upload_filter: Option<String>,
    invariant: Option<String>,
    selector: Option<String>,
    #[serde(rename = "download-selector")]
    download_selector: Option<String>,
    #[serde(rename = "cohort-requirements")]
    cohort_requirements: Option<String>,
    ec: Option<EcSpecRaw>,
}

/// Loads a placement configuration from `source`, which may be:
/// 1. A path to a `.yaml` file.
/// 2. A path to a text file holding the legacy `id:expr;id:expr` form.
/// 3. A literal string in that legacy form.
///
/// A `source` that looks like a path (starts with `/`, `./`, or `../`)
/// but does not exist on disk is always an error — it is never
/// reinterpreted as a literal rule.
pub fn load_config(source: &str) -> Result<PlacementConfig, PlacementError> {
    let mut rules = default_rules();

    if looks_like_path(source) {
        let path = Path::new(source);
        if !path.exists() {
            return Err(PlacementError::Config(format!("placement config path not found: {source}")));
        }
        let text = fs::read_to_string(path)
            .map_err(|e| PlacementError::Config(format!("reading {source}: {e}")))?;
        let loaded = if is_yaml_path(path) { load_yaml(&text)? } else { load_legacy(&text)? };
        merge_rules(&mut rules, loaded);
        return Ok(PlacementConfig { rules });
    }

    if source.trim_start().starts_with("templates:") || source.trim_start().starts_with("placements:") {
        merge_rules(&mut rules, load_yaml(source)?);
    } else {
        merge_rules(&mut rules, load_legacy(source)?);
    }
    Ok(PlacementConfig { rules })
}

fn is_yaml_path(path: &Path) -> bool {
    matches!(path.extension().and_then(|e| e.to_str()), Some("yaml") | Some("yml"))
}

fn looks_like_path(source: &str) -> bool {
    source.starts_with('/') || source.starts_with("./") || source.starts_with("../")
}

/// Replaces any rule in `base` sharing an `id` with one from `overrides`,
/// appending the rest.
fn merge_rules(base: &mut Vec<RuleSpec>, overrides: Vec<RuleSpec>) {
    for rule in overrides {
        if let Some(slot) = base.iter_mut().find(|r| r.id == rule.id) {
            *slot = rule;
        } else {
            base.push(rule);
        }
    }
}

fn load_yaml(text: &str) -> Result<Vec<RuleSpec>, PlacementError> {
    let doc: YamlDoc = serde_yaml::from_str(text).map_err(|e| PlacementError::Config(format!("invalid YAML: {e}")))?;
    doc.placements
        .into_iter()
        .map(|p| {
            let mut stack = Vec::new();
            Ok(RuleSpec {
                id: p.id,
                name: p.name,
                filter: p.filter.map(|s| expand_templates(&s, &doc.templates, &mut stack)).transpose()?,
                upload_filter: p.upload_filter.map(|s| expand_templates(&s, &doc.templates, &mut stack)).transpose()?,
                invariant: p.invariant.map(|s| expand_templates(&s, &doc.templates, &mut stack)).transpose()?,
                selector: p.selector.map(|s| expand_templates(&s, &doc.templates, &mut stack)).transpose()?,
                download_selector: p
                    .download_selector
                    .map(|s| expand_templates(&s, &doc.templates, &mut stack))
                    .transpose()?,
                cohort_requirements: p
                    .cohort_requirements
                    .map(|s| expand_templates(&s, &doc.templates, &mut stack))
                    .transpose()?,
                ec: p
                    .ec
                    .map(|raw| {
                        Ok::<_, PlacementError>(EcSpec {
                            minimum: raw.minimum,
                            total: raw.total,
                            success: EcField::parse(&raw.success)?,
                            repair: EcField::parse(&raw.repair)?,
                        })
                    })
                    .transpose()?,
            })
        })
        .collect()
}

/// Parses the legacy `id:expr;id:expr;...` string form. Each rule's
/// `expr` becomes the placement's node filter; every other field is left
/// at its default.
fn load_legacy(text: &str) -> Result<Vec<RuleSpec>, PlacementError> {
    text.split(';')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|entry| {
            let (id_str, expr) = entry
                .split_once(':')
                .ok_or_else(|| PlacementError::Config(format!("malformed legacy placement rule {entry:?}")))?;
            let id: u16 = id_str
                .trim()
                .parse()
                .map_err(|_| PlacementError::Config(format!("bad placement id {id_str:?}")))?;
            let mut rule = RuleSpec::bare(id);
            rule.filter = Some(expr.trim().to_string());
            Ok(rule)
        })
        .collect()
}

static TEMPLATE_REF: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\$([A-Za-z_][A-Za-z0-9_]*)").unwrap_or_else(|_| {
        Regex::new("a^").unwrap_or_else(|_| Regex::new(".").unwrap_or_else(|_| unreachable!("regex engine broken")))
    })
});

/// Expands every `$NAME` occurrence in `expr` against `templates`,
/// recursively (a template body may itself reference other templates) in
/// a single textual pass per occurrence. `stack` tracks the templates
/// currently being expanded so a self- or mutually-referencing template
/// is reported as a config error instead of recursing forever.
fn expand_templates(expr: &str, templates: &HashMap<String, String>, stack: &mut Vec<String>) -> Result<String, PlacementError> {
    let mut out = String::with_capacity(expr.len());
    let mut last = 0;
    for m in TEMPLATE_REF.captures_iter(expr) {
        let whole = m.get(0).ok_or_else(|| PlacementError::Config("internal template regex error".to_string()))?;
        let name = &m[1];
        out.push_str(&expr[last..whole.start()]);
        out.push_str(&resolve_template(name, templates, stack)?);
        last = whole.end();
    }
    out.push_str(&expr[last..]);
    Ok(out)
}

fn resolve_template(name: &str, templates: &HashMap<String, String>, stack: &mut Vec<String>) -> Result<String, PlacementError> {
    if stack.iter().any(|s| s == name) {
        let mut cycle = stack.clone();
        cycle.push(name.to_string());
        return Err(PlacementError::Config(format!("template cycle detected: {}", cycle.join(" -> "))));
    }
    let body = templates
        .get(name)
        .ok_or_else(|| PlacementError::Config(format!("reference to unknown template ${name}")))?;
    stack.push(name.to_string());
    let expanded = expand_templates(body, templates, stack)?;
    stack.pop();
    Ok(expanded)
}

/// The pre-populated static placements: `0` the satellite-wide default,
/// plus the four country groups and `NR`. Each shares the default's
/// subnet-diverse selector and `last_net` clumping invariant; only the
/// node filter differs.
fn default_rules() -> Vec<RuleSpec> {
    let shared = |id: u16, filter: &str| RuleSpec {
        id,
        name: None,
        filter: Some(filter.to_string()),
        upload_filter: Some(filter.to_string()),
        invariant: Some("clumping(\"last_net\", 1)".to_string()),
        selector: Some("attributegroup(\"last_net\")".to_string()),
        download_selector: None,
        cohort_requirements: None,
        ec: None,
    };
    vec![
        shared(PLACEMENT_DEFAULT, "all()"),
        shared(PLACEMENT_EEA, "eea()"),
        shared(PLACEMENT_EU, "eu()"),
        shared(PLACEMENT_US, "us()"),
        shared(PLACEMENT_DE, "de()"),
        shared(PLACEMENT_NR, "nr()"),
    ]
}
