//! Evaluates a parsed expression tree into a dynamically-typed [`Value`],
//! dispatching the full builtin surface: filters, selectors, invariants,
//! and arithmetic/comparison operators.
use std::sync::Arc;

use crate::cohort::{CohortRequirement, concat_names, name_from_attr};
use crate::error::PlacementError;
use crate::filter::{
    All, And, Annotated, CompareOp, Continent, Country, Exclude, NodeList, NoneFilter, Or, Select, SelectRhs,
    SuccessfulAtLeastPercent, Tag, TagExpectation, de_filter, eea_filter, eu_filter, nr_filter, us_filter,
};
use crate::invariant::{AllGood, ClumpingByAttribute, Combined, FilterInvariant, Invariant};
use crate::node::{NodeAttribute, NodeValue};
use crate::score::{
    self, Compare, CompareNodes, ScoreNode, add_scores, add_values, div_scores, div_values, max_scores, max_values,
    min_scores, min_values, mul_scores, mul_values, pow_scores, pow_values, round_score, round_value, sub_scores,
    sub_values,
};
use crate::selector::attribute_group::AttributeGroupInit;
use crate::selector::balanced::BalancedInit;
use crate::selector::best_of_n::BestOfNInit;
use crate::selector::choice_of_n::ChoiceOfNInit;
use crate::selector::choice_of_n_selection::{ChoiceOfNSelectionInit, ScoreSelectionFn};
use crate::selector::dual::DualInit;
use crate::selector::filter_best::{FilterBestInit, KeepSpec};
use crate::selector::filter_delegate::FilterDelegateInit;
use crate::selector::fixed::FixedInit;
use crate::selector::multi::MultiInit;
use crate::selector::random::RandomInit;
use crate::selector::reduce::{AtLeast, DEFAULT_BATCH_MULTIPLIER, ReduceInit};
use crate::selector::stream::{ChoiceOfNs, GroupConstraint, StreamInit, StreamStep};
use crate::selector::topology::TopologyInit;
use crate::selector::weighted::WeightedInit;

use super::bindings::{Bindings, RuleKind};
use super::parser::{Expr, ExprKind, InfixOp};
use super::value::Value;

/// Parses and evaluates `src` under `bindings` in one step.
pub fn eval_source(src: &str, bindings: &Bindings<'_>) -> Result<Value, PlacementError> {
    let expr = super::parser::parse(src)?;
    eval(&expr, bindings)
}

/// Evaluates a parsed expression tree.
pub fn eval(expr: &Expr, b: &Bindings<'_>) -> Result<Value, PlacementError> {
    match &expr.kind {
        ExprKind::Int(v) => Ok(Value::Int(*v)),
        ExprKind::Float(v) => Ok(Value::Float(*v)),
        ExprKind::Str(s) => Ok(Value::Str(s.clone())),
        ExprKind::Bytes(v) => Ok(Value::Bytes(v.clone())),
        ExprKind::Ident(name) => eval_call(name, &[], &expr.text, b),
        ExprKind::Call(name, args) => eval_call(name, args, &expr.text, b),
        ExprKind::Infix(op, lhs, rhs) => eval_infix(*op, lhs, rhs, &expr.text, b),
    }
}

fn eval_infix(op: InfixOp, lhs: &Expr, rhs: &Expr, text: &str, b: &Bindings<'_>) -> Result<Value, PlacementError> {
    let lval = eval(lhs, b)?;
    let rval = eval(rhs, b)?;
    match op {
        InfixOp::And => match (lval, rval) {
            (Value::Filter(a), Value::Filter(b)) => Ok(Value::Filter(Arc::new(And(vec![a, b])))),
            (Value::Cohort(a), Value::Cohort(b)) => Ok(Value::Cohort(CohortRequirement::and(vec![a, b]))),
            (a, r) => Err(PlacementError::parse(
                text,
                format!("`&&` needs two filters or two cohort-requirements, found {} && {}", a.type_name(), r.type_name()),
            )),
        },
        InfixOp::Or => match (lval, rval) {
            (Value::Filter(a), Value::Filter(b)) => Ok(Value::Filter(Arc::new(Or(vec![a, b])))),
            (a, r) => Err(PlacementError::parse(
                text,
                format!("`||` needs two filters, found {} || {}", a.type_name(), r.type_name()),
            )),
        },
        InfixOp::Add => eval_add(lval, rval, text),
        InfixOp::Sub => eval_arith(lval, rval, text, sub_values, sub_scores, |a, b| a - b),
        InfixOp::Mul => eval_arith(lval, rval, text, mul_values, mul_scores, |a, b| a * b),
        InfixOp::Div => eval_arith(lval, rval, text, div_values, div_scores, |a, b| a / b),
        InfixOp::Pow => eval_arith(lval, rval, text, pow_values, pow_scores, f64::powf),
    }
}

/// `+` is overloaded: string/cohort-name concatenation alongside ordinary
/// numeric addition, e.g. `attr("dc") + "-" + attr("rack")`.
fn eval_add(lval: Value, rval: Value, text: &str) -> Result<Value, PlacementError> {
    let is_name_like = |v: &Value| matches!(v, Value::CohortFn(_) | Value::Str(_));
    if is_name_like(&lval) && is_name_like(&rval) {
        if let (Value::Str(a), Value::Str(b)) = (&lval, &rval) {
            return Ok(Value::Str(format!("{a}{b}")));
        }
        let a = lval.into_cohort_fn(text)?;
        let b = rval.into_cohort_fn(text)?;
        return Ok(Value::CohortFn(concat_names(a, b)));
    }
    eval_arith(lval, rval, text, add_values, add_scores, |a, b| a + b)
}

/// Dispatches a numeric infix operator through the `int -> float64 ->
/// node-value -> score` promotion chain: both operands are promoted to
/// whichever rung is higher, and the matching combinator from
/// [`crate::score`] applied.
fn eval_arith(
    lval: Value,
    rval: Value,
    text: &str,
    on_values: impl FnOnce(NodeValue, NodeValue) -> NodeValue,
    on_scores: impl FnOnce(ScoreNode, ScoreNode) -> ScoreNode,
    on_numbers: impl FnOnce(f64, f64) -> f64,
) -> Result<Value, PlacementError> {
    use super::value::promotion_rank;
    let lrank = promotion_rank(&lval).ok_or_else(|| {
        PlacementError::parse(text, format!("not a numeric value: {}", lval.type_name()))
    })?;
    let rrank = promotion_rank(&rval).ok_or_else(|| {
        PlacementError::parse(text, format!("not a numeric value: {}", rval.type_name()))
    })?;
    let rank = lrank.max(rrank);
    match rank {
        0 | 1 => {
            let a = lval.as_float(text)?;
            let b = rval.as_float(text)?;
            let result = on_numbers(a, b);
            if rank == 0 {
                Ok(Value::Int(result as i64))
            } else {
                Ok(Value::Float(result))
            }
        }
        2 => {
            let a = lval.into_node_value(text)?;
            let b = rval.into_node_value(text)?;
            Ok(Value::NodeValue(on_values(a, b)))
        }
        _ => {
            let a = lval.into_score(text)?;
            let b = rval.into_score(text)?;
            Ok(Value::Score(on_scores(a, b)))
        }
    }
}

/// Evaluates every argument left to right and dispatches the named
/// builtin. `withhold` is handled before this point whenever it appears
/// as the outermost call, since its middle argument must register in the
/// cohort-name table before its child argument is evaluated.
fn eval_call(name: &str, args: &[Expr], text: &str, b: &Bindings<'_>) -> Result<Value, PlacementError> {
    if name == "withhold" {
        return eval_withhold(args, text, b);
    }
    if name == "stream" {
        return eval_stream(args, text, b);
    }
    if name == "reduce" {
        return eval_reduce(args, text, b);
    }
    if name == "annotated" {
        return eval_annotated(args, text, b);
    }

    let vals: Vec<Value> = args.iter().map(|a| eval(a, b)).collect::<Result<_, _>>()?;

    match name {
        // -- boolean literals / structural ---------------------------------
        "all" => Ok(Value::Filter(Arc::new(All))),
        "none" => Ok(Value::Filter(Arc::new(NoneFilter))),
        "eu" => Ok(Value::Filter(Arc::new(eu_filter()))),
        "eea" => Ok(Value::Filter(Arc::new(eea_filter()))),
        "us" => Ok(Value::Filter(Arc::new(us_filter()))),
        "de" => Ok(Value::Filter(Arc::new(de_filter()))),
        "nr" => Ok(Value::Filter(Arc::new(nr_filter()))),
        "country" => {
            let codes: Vec<String> = vals.iter().map(|v| v.as_str(text).map(String::from)).collect::<Result<_, _>>()?;
            Ok(Value::Filter(Arc::new(Country::new(codes))))
        }
        "continent" => {
            let code = one_arg(&vals, name, text)?.as_str(text)?.to_string();
            Ok(Value::Filter(Arc::new(Continent::new(code))))
        }
        "tag" => eval_tag(&vals, text),
        "empty" => Ok(Value::TagSentinel(TagExpectation::Empty)),
        "notEmpty" => Ok(Value::TagSentinel(TagExpectation::NotEmpty)),
        "exclude" => {
            let f = one_arg(&vals, name, text)?.into_filter(text)?;
            Ok(Value::Filter(Arc::new(Exclude(f))))
        }
        "and" => eval_and(vals, text),
        "or" => {
            let filters: Vec<_> = vals.into_iter().map(|v| v.into_filter(text)).collect::<Result<_, _>>()?;
            Ok(Value::Filter(Arc::new(Or(filters))))
        }
        "nodelist" => {
            let path = one_arg(&vals, name, text)?.as_str(text)?;
            Ok(Value::Filter(Arc::new(NodeList::load(path)?)))
        }
        "select" => eval_select(&vals, text),
        "successfulAtLeastPercent" => {
            let [tracker_name, p] = exact_args::<2>(&vals, name, text)?;
            let tracker = b
                .success_tracker(tracker_name.as_str(text)?)
                .ok_or_else(|| PlacementError::parse(text, format!("unknown tracker {:?}", tracker_name.as_str(text)?)))?;
            Ok(Value::Filter(Arc::new(SuccessfulAtLeastPercent::new(tracker, p.as_float(text)?))))
        }
        "placement" => {
            let id = one_arg(&vals, name, text)?.as_int(text)?;
            let id = u16::try_from(id).map_err(|_| PlacementError::parse(text, "placement id out of range"))?;
            let filter = b
                .placement_filter(id)
                .ok_or_else(|| PlacementError::parse(text, format!("forward reference to unregistered placement {id}")))?;
            Ok(Value::Filter(filter))
        }

        // -- invariants ------------------------------------------------------
        "allgood" => Ok(Value::Invariant(Arc::new(AllGood))),
        "clumping" => {
            let [attr, max_allowed] = exact_args::<2>(&vals, name, text)?;
            let attr = NodeAttribute::parse(attr.as_str(text)?)?;
            Ok(Value::Invariant(Arc::new(ClumpingByAttribute::new(attr, max_allowed.as_int(text)? as usize))))
        }
        "filterinvariant" => {
            let f = one_arg(&vals, name, text)?.into_filter(text)?;
            Ok(Value::Invariant(Arc::new(FilterInvariant::new(f))))
        }
        "combined" => {
            let invariants: Vec<Arc<dyn Invariant>> = vals.into_iter().map(|v| v.into_invariant(text)).collect::<Result<_, _>>()?;
            Ok(Value::Invariant(Arc::new(Combined(invariants))))
        }

        // -- cohort requirements ---------------------------------------------
        "attr" => {
            let name_str = one_arg(&vals, name, text)?.as_str(text)?;
            let attr = NodeAttribute::parse(name_str)?;
            Ok(Value::CohortFn(name_from_attr(attr)))
        }
        "min" if b.kind == RuleKind::Cohort && vals.len() == 1 => {
            let v = vals[0].as_int(text)?;
            Ok(Value::Cohort(CohortRequirement::min(v.max(0) as u32)))
        }

        // -- arithmetic / scoring ---------------------------------------------
        "min" => eval_numeric_pair(vals, text, min_values, min_scores, f64::min),
        "max" => eval_numeric_pair(vals, text, max_values, max_scores, f64::max),
        "round" => {
            let v = one_arg(&vals, name, text)?;
            eval_numeric_unary(v, text, round_value, round_score)
        }
        "daily" => {
            let hours: Vec<i64> = vals.iter().map(|v| v.as_int(text)).collect::<Result<_, _>>()?;
            let hours: [i64; 24] = hours
                .try_into()
                .map_err(|_| PlacementError::parse(text, "daily() needs exactly 24 hour weights"))?;
            Ok(Value::NodeValue(score::daily(hours)))
        }
        "compare" => {
            let scores: Vec<ScoreNode> = vals.into_iter().map(|v| v.into_score(text)).collect::<Result<_, _>>()?;
            Ok(Value::Compare(Compare(scores).build()))
        }

        // -- selectors -------------------------------------------------------
        "random" => Ok(Value::Selector(Arc::new(RandomInit))),
        "attributegroup" => {
            let attr = NodeAttribute::parse(one_arg(&vals, name, text)?.as_str(text)?)?;
            Ok(Value::Selector(Arc::new(AttributeGroupInit { attr })))
        }
        "balanced" => {
            let attr = NodeAttribute::parse(vals.first().ok_or_else(|| arity_error(name, text))?.as_str(text)?)?;
            let filter = vals.get(1).cloned().map(|v| v.into_filter(text)).transpose()?;
            Ok(Value::Selector(Arc::new(BalancedInit { attr, filter })))
        }
        "unvetted" => {
            let [fraction, delegate] = exact_args::<2>(&vals, name, text)?;
            Ok(Value::Selector(Arc::new(crate::selector::unvetted::UnvettedInit {
                fraction: fraction.as_float(text)?,
                delegate: delegate.into_selector(text)?,
            })))
        }
        "choiceoftwo" => {
            let [cmp, delegate] = exact_args::<2>(&vals, name, text)?;
            Ok(Value::Selector(Arc::new(ChoiceOfNInit::choice_of_two(cmp.into_compare(text)?, delegate.into_selector(text)?))))
        }
        "choiceofn" => {
            let [cmp, k, delegate] = exact_args::<3>(&vals, name, text)?;
            Ok(Value::Selector(Arc::new(ChoiceOfNInit {
                cmp: cmp.into_compare(text)?,
                k: k.as_int(text)? as usize,
                delegate: delegate.into_selector(text)?,
            })))
        }
        "choiceofnselection" => {
            let [k, delegate, preset] = exact_args::<3>(&vals, name, text)?;
            let score_selection = score_selection_preset(preset.as_str(text)?, text)?;
            Ok(Value::Selector(Arc::new(ChoiceOfNSelectionInit {
                k: k.as_int(text)? as usize,
                delegate: delegate.into_selector(text)?,
                score_selection,
            })))
        }
        "bestofn" => {
            let [tracker_name, ratio, delegate] = exact_args::<3>(&vals, name, text)?;
            let tracker = b
                .success_tracker(tracker_name.as_str(text)?)
                .ok_or_else(|| PlacementError::parse(text, "unknown tracker"))?;
            Ok(Value::Selector(Arc::new(BestOfNInit {
                tracker,
                ratio: ratio.as_float(text)?,
                delegate: delegate.into_selector(text)?,
            })))
        }
        "dual" => {
            let [fraction, primary, fallback] = exact_args::<3>(&vals, name, text)?;
            Ok(Value::Selector(Arc::new(DualInit {
                fraction: fraction.as_float(text)?,
                primary: primary.into_selector(text)?,
                fallback: fallback.into_selector(text)?,
            })))
        }
        "filterbest" => {
            let [tracker_name, spec, tie_break, delegate] = exact_args::<4>(&vals, name, text)?;
            let tracker = b
                .success_tracker(tracker_name.as_str(text)?)
                .ok_or_else(|| PlacementError::parse(text, "unknown tracker"))?;
            Ok(Value::Selector(Arc::new(FilterBestInit {
                tracker,
                spec: KeepSpec::parse(spec.as_str(text)?)?,
                tie_break: NodeAttribute::parse(tie_break.as_str(text)?)?,
                delegate: delegate.into_selector(text)?,
            })))
        }
        "filter" => {
            let [f, delegate] = exact_args::<2>(&vals, name, text)?;
            Ok(Value::Selector(Arc::new(FilterDelegateInit { filter: f.into_filter(text)?, delegate: delegate.into_selector(text)? })))
        }
        "fixed" => {
            let [k, delegate] = exact_args::<2>(&vals, name, text)?;
            Ok(Value::Selector(Arc::new(FixedInit { k: k.as_int(text)? as usize, delegate: delegate.into_selector(text)? })))
        }
        "multi" => {
            let selectors: Vec<_> = vals.into_iter().map(|v| v.into_selector(text)).collect::<Result<_, _>>()?;
            Ok(Value::Selector(Arc::new(MultiInit(selectors))))
        }
        "topology" => eval_topology(&vals, text),
        "weighted" => {
            let attr = vals.first().ok_or_else(|| arity_error(name, text))?.as_str(text)?;
            let value = NodeValue::parse(attr)?;
            let default = vals.get(1).map(|v| v.as_float(text)).transpose()?.unwrap_or(0.0);
            let filter = vals.get(2).cloned().map(|v| v.into_filter(text)).transpose()?;
            Ok(Value::Selector(Arc::new(WeightedInit { value, default, filter })))
        }
        "weightedf" => {
            let value = vals.first().ok_or_else(|| arity_error(name, text))?.clone().into_node_value(text)?;
            let default = vals.get(1).map(|v| v.as_float(text)).transpose()?.unwrap_or(0.0);
            let filter = vals.get(2).cloned().map(|v| v.into_filter(text)).transpose()?;
            Ok(Value::Selector(Arc::new(WeightedInit { value, default, filter })))
        }

        other => Err(PlacementError::parse(text, format!("unknown function {other:?}"))),
    }
}

/// `withhold(nameFn, amount, child)` — registers `nameFn` into the
/// bindings' cohort-name table *before* evaluating `child`, so nested
/// `withhold` calls register in the same order a person reading the
/// expression left to right would expect.
fn eval_withhold(args: &[Expr], text: &str, b: &Bindings<'_>) -> Result<Value, PlacementError> {
    let [name_expr, amount_expr, child_expr] = args else {
        return Err(arity_error("withhold", text));
    };
    let name_fn = eval(name_expr, b)?.into_cohort_fn(&name_expr.text)?;
    let key = b.cohort_names.borrow_mut().register(name_fn);
    let amount = eval(amount_expr, b)?.as_int(&amount_expr.text)?;
    let child = eval(child_expr, b)?.into_cohort(&child_expr.text)?;
    Ok(Value::Cohort(CohortRequirement::Withhold {
        name_key: key,
        amount: amount.max(0) as u32,
        child: Box::new(child),
    }))
}

fn eval_and(vals: Vec<Value>, text: &str) -> Result<Value, PlacementError> {
    match vals.first() {
        Some(Value::Cohort(_)) => {
            let children: Vec<_> = vals.into_iter().map(|v| v.into_cohort(text)).collect::<Result<_, _>>()?;
            Ok(Value::Cohort(CohortRequirement::and(children)))
        }
        _ => {
            let filters: Vec<_> = vals.into_iter().map(|v| v.into_filter(text)).collect::<Result<_, _>>()?;
            Ok(Value::Filter(Arc::new(And(filters))))
        }
    }
}

fn eval_tag(vals: &[Value], text: &str) -> Result<Value, PlacementError> {
    if vals.len() < 2 || vals.len() > 3 {
        return Err(arity_error("tag", text));
    }
    let signer = vals[0].as_str(text)?.parse().map_err(|e| PlacementError::parse(text, format!("tag signer: {e}")))?;
    let key = vals[1].as_str(text)?.to_string();
    let expectation = match vals.get(2) {
        None => TagExpectation::NotEmpty,
        Some(Value::TagSentinel(e)) => e.clone(),
        Some(v) => TagExpectation::Literal(v.as_bytes(text)?),
    };
    Ok(Value::Filter(Arc::new(Tag::new(signer, key, expectation))))
}

fn eval_select(vals: &[Value], text: &str) -> Result<Value, PlacementError> {
    let [attr, op, value] = exact_args::<3>(vals, "select", text)?;
    let attr = NodeAttribute::parse(attr.as_str(text)?)?;
    let op_str = op.as_str(text)?;
    let value = value.as_str(text)?.to_string();
    if op_str == "stringNotMatch" {
        return Ok(Value::Filter(Arc::new(Select::new(attr, CompareOp::Eq, SelectRhs::NotMatch(value)))));
    }
    let op = parse_compare_op(op_str, text)?;
    Ok(Value::Filter(Arc::new(Select::new(attr, op, SelectRhs::Literal(value)))))
}

fn parse_compare_op(op: &str, text: &str) -> Result<CompareOp, PlacementError> {
    match op {
        "=" | "==" => Ok(CompareOp::Eq),
        "!=" | "<>" => Ok(CompareOp::Ne),
        "<" => Ok(CompareOp::Lt),
        "<=" => Ok(CompareOp::Le),
        ">" => Ok(CompareOp::Gt),
        ">=" => Ok(CompareOp::Ge),
        other => Err(PlacementError::parse(text, format!("unknown comparison operator {other:?}"))),
    }
}

fn eval_numeric_pair(
    vals: Vec<Value>,
    text: &str,
    on_values: impl FnOnce(NodeValue, NodeValue) -> NodeValue,
    on_scores: impl FnOnce(ScoreNode, ScoreNode) -> ScoreNode,
    on_numbers: impl FnOnce(f64, f64) -> f64,
) -> Result<Value, PlacementError> {
    let [a, b] = exact_args::<2>(&vals, "min/max", text)?;
    eval_arith(a, b, text, on_values, on_scores, on_numbers)
}

fn eval_numeric_unary(
    v: Value,
    text: &str,
    on_value: impl FnOnce(NodeValue) -> NodeValue,
    on_score: impl FnOnce(ScoreNode) -> ScoreNode,
) -> Result<Value, PlacementError> {
    use super::value::promotion_rank;
    match promotion_rank(&v) {
        Some(0) => Ok(Value::Int(v.as_int(text)?)),
        Some(1) => Ok(Value::Float(v.as_float(text)?.round())),
        Some(2) => Ok(Value::NodeValue(on_value(v.into_node_value(text)?))),
        _ => Ok(Value::Score(on_score(v.into_score(text)?))),
    }
}

fn eval_topology(vals: &[Value], text: &str) -> Result<Value, PlacementError> {
    if vals.len() < 3 || vals.len() > 4 {
        return Err(arity_error("topology", text));
    }
    let weight = vals[0].clone().into_node_value(text)?;
    let splits: Vec<usize> = vals[1]
        .as_str(text)?
        .split(',')
        .map(|s| s.trim().parse::<usize>().map_err(|_| PlacementError::parse(text, format!("bad split {s:?}"))))
        .collect::<Result<_, _>>()?;
    let attrs: Vec<NodeAttribute> = vals[2]
        .as_str(text)?
        .split(',')
        .map(|s| NodeAttribute::parse(s.trim()))
        .collect::<Result<_, _>>()?;
    let filter = vals.get(3).cloned().map(|v| v.into_filter(text)).transpose()?;
    Ok(Value::Selector(Arc::new(TopologyInit { weight, splits, attrs, filter })))
}

/// `reduce(delegate, sortOrder, atLeast(attr, k)...)` — `atLeast` isn't a
/// standalone [`Value`] variant (it only ever appears here), so its
/// argument expressions are inspected directly rather than evaluated
/// through the generic dispatch table.
fn eval_reduce(args: &[Expr], text: &str, b: &Bindings<'_>) -> Result<Value, PlacementError> {
    let [delegate_expr, sort_expr, at_least_exprs @ ..] = args else {
        return Err(arity_error("reduce", text));
    };
    let delegate = eval(delegate_expr, b)?.into_selector(&delegate_expr.text)?;
    let sort_order: CompareNodes = eval(sort_expr, b)?.into_compare(&sort_expr.text)?;
    let at_least = at_least_exprs
        .iter()
        .map(|e| eval_at_least(e, b))
        .collect::<Result<Vec<_>, _>>()?;
    Ok(Value::Selector(Arc::new(ReduceInit {
        delegate,
        sort_order,
        at_least,
        batch_multiplier: DEFAULT_BATCH_MULTIPLIER,
    })))
}

fn eval_at_least(expr: &Expr, b: &Bindings<'_>) -> Result<AtLeast, PlacementError> {
    let ExprKind::Call(name, call_args) = &expr.kind else {
        return Err(PlacementError::parse(&expr.text, "expected atleast(attr, k)"));
    };
    if name != "atleast" {
        return Err(PlacementError::parse(&expr.text, format!("expected atleast(...), found {name}(...)")));
    }
    let [attr_expr, k_expr] = call_args.as_slice() else {
        return Err(arity_error("atleast", &expr.text));
    };
    let attr = NodeAttribute::parse(eval(attr_expr, b)?.as_str(&attr_expr.text)?)?;
    let k = eval(k_expr, b)?.as_int(&k_expr.text)? as usize;
    Ok(AtLeast { attr, k })
}

/// `annotated(f, annotation(k, v)...)` — each trailing argument must be a
/// literal `annotation(key, value)` call; like `atleast`, annotations
/// aren't a [`Value`] variant of their own.
fn eval_annotated(args: &[Expr], text: &str, b: &Bindings<'_>) -> Result<Value, PlacementError> {
    let [base_expr, annotation_exprs @ ..] = args else {
        return Err(arity_error("annotated", text));
    };
    let base = eval(base_expr, b)?.into_filter(&base_expr.text)?;
    let mut annotations = Vec::with_capacity(annotation_exprs.len());
    for e in annotation_exprs {
        let ExprKind::Call(name, call_args) = &e.kind else {
            return Err(PlacementError::parse(&e.text, "expected annotation(key, value)"));
        };
        if name != "annotation" {
            return Err(PlacementError::parse(&e.text, format!("expected annotation(...), found {name}(...)")));
        }
        let [key_expr, value_expr] = call_args.as_slice() else {
            return Err(arity_error("annotation", &e.text));
        };
        let key = eval(key_expr, b)?.as_str(&key_expr.text)?.to_string();
        let value = eval(value_expr, b)?.as_str(&value_expr.text)?.to_string();
        annotations.push((key, value));
    }
    Ok(Value::Filter(Arc::new(Annotated::new(base, annotations))))
}

/// `stream(seed, streamfilter(groupconstraint(attr, max)) | choiceofns(k, score) ...)`
/// — steps aren't `Value`s either; their argument expressions are parsed
/// directly. `seed` is accepted for DSL compatibility but presently
/// unused: `StreamSelector` always shuffles from `rand::thread_rng()`
/// (an open question noted in `DESIGN.md`).
fn eval_stream(args: &[Expr], text: &str, b: &Bindings<'_>) -> Result<Value, PlacementError> {
    let [_seed_expr, step_exprs @ ..] = args else {
        return Err(arity_error("stream", text));
    };
    let steps = step_exprs.iter().map(|e| eval_stream_step(e, b)).collect::<Result<Vec<_>, _>>()?;
    Ok(Value::Selector(Arc::new(StreamInit { steps })))
}

fn eval_stream_step(expr: &Expr, b: &Bindings<'_>) -> Result<Arc<dyn StreamStep>, PlacementError> {
    let ExprKind::Call(name, args) = &expr.kind else {
        return Err(PlacementError::parse(&expr.text, "expected a stream step call"));
    };
    match name.as_str() {
        "streamfilter" => {
            let [inner] = args.as_slice() else { return Err(arity_error("streamfilter", &expr.text)) };
            let ExprKind::Call(inner_name, inner_args) = &inner.kind else {
                return Err(PlacementError::parse(&inner.text, "expected groupconstraint(attr, max)"));
            };
            if inner_name != "groupconstraint" {
                return Err(PlacementError::parse(&inner.text, "streamfilter only supports groupconstraint"));
            }
            let [attr_expr, max_expr] = inner_args.as_slice() else {
                return Err(arity_error("groupconstraint", &inner.text));
            };
            let attr = NodeAttribute::parse(eval(attr_expr, b)?.as_str(&attr_expr.text)?)?;
            let max = eval(max_expr, b)?.as_int(&max_expr.text)? as usize;
            Ok(Arc::new(GroupConstraint { attr, max }))
        }
        "choiceofns" => {
            let [k_expr, score_expr] = args.as_slice() else { return Err(arity_error("choiceofns", &expr.text)) };
            let k = eval(k_expr, b)?.as_int(&k_expr.text)? as usize;
            let score = eval(score_expr, b)?.into_score(&score_expr.text)?;
            Ok(Arc::new(ChoiceOfNs { k, score }))
        }
        other => Err(PlacementError::parse(&expr.text, format!("unknown stream step {other:?}"))),
    }
}

/// Resolves a `choiceofnselection` whole-draw scoring preset. The DSL has
/// no way to express an arbitrary closure over a whole candidate slice,
/// so a small fixed vocabulary of named presets stands in (an open
/// question resolution, recorded in `DESIGN.md`): lower always wins.
fn score_selection_preset(name: &str, text: &str) -> Result<ScoreSelectionFn, PlacementError> {
    if let Some(attr_name) = name.strip_prefix("groupspread:") {
        let attr = NodeAttribute::parse(attr_name)?;
        return Ok(Arc::new(move |nodes: &[crate::node::SelectedNode]| {
            let mut counts = std::collections::HashMap::new();
            for n in nodes {
                *counts.entry(attr.apply(n)).or_insert(0u32) += 1;
            }
            let max = counts.values().copied().max().unwrap_or(0);
            let min = counts.values().copied().min().unwrap_or(0);
            f64::from(max - min)
        }));
    }
    match name {
        "uniform" => Ok(Arc::new(|_nodes: &[crate::node::SelectedNode]| 0.0)),
        other => Err(PlacementError::parse(text, format!("unknown choiceofnselection preset {other:?}"))),
    }
}

fn arity_error(name: &str, text: &str) -> PlacementError {
    PlacementError::parse(text, format!("wrong number of arguments to {name}(...)"))
}

fn one_arg(vals: &[Value], name: &str, text: &str) -> Result<Value, PlacementError> {
    match vals {
        [v] => Ok(v.clone()),
        _ => Err(arity_error(name, text)),
    }
}

fn exact_args<const N: usize>(vals: &[Value], name: &str, text: &str) -> Result<[Value; N], PlacementError> {
    <[Value; N]>::try_from(vals.to_vec()).map_err(|_| arity_error(name, text))
}

#[cfg(test)]
mod tests {
    #![allow(clippy::expect_used, clippy::unwrap_used, clippy::panic)]

    use super::*;
    use crate::context::CancellationToken;
    use crate::filter::{FilterContext, FilterHandle};
    use crate::node::{NodeId, NODE_ID_LEN};
    use crate::selector::SelectCall;
    use std::collections::HashSet;

    fn node(id: u8, country: &str) -> crate::node::SelectedNode {
        crate::node::SelectedNode {
            id: NodeId::from_bytes([id; NODE_ID_LEN]),
            address: String::new(),
            last_net: format!("10.0.{id}.0"),
            last_ip_port: String::new(),
            country_code: country.into(),
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

    #[test]
    fn evaluates_filter_expression() {
        let bindings = Bindings::bare(RuleKind::Filter);
        let value = eval_source(r#"country("DE") && exclude(country("FR"))"#, &bindings.as_bindings()).expect("should eval");
        let filter = value.into_filter("").expect("should be a filter");
        let ctx = FilterContext::new(NodeId::from_bytes([0; NODE_ID_LEN]));
        assert!(filter.matches(&ctx, &node(1, "DE")));
        assert!(!filter.matches(&ctx, &node(2, "FR")));
        assert!(!filter.matches(&ctx, &node(3, "US")));
    }

    #[test]
    fn tag_with_no_value_arg_requires_present_and_nonempty() {
        let signer = NodeId::from_bytes([9; NODE_ID_LEN]);
        let bindings = Bindings::bare(RuleKind::Filter);
        let value = eval_source(&format!(r#"tag("{signer}", "owner")"#), &bindings.as_bindings()).expect("should eval");
        let filter = value.into_filter("").expect("should be a filter");
        let ctx = FilterContext::new(NodeId::from_bytes([0; NODE_ID_LEN]));

        let mut present = node(1, "DE");
        present.tags.push(crate::node::NodeTag {
            node_id: present.id,
            signer_id: signer,
            name: "owner".into(),
            value: b"zipernowsky".to_vec(),
            signed_at: 0,
        });
        assert!(filter.matches(&ctx, &present));

        let mut empty_value = node(2, "DE");
        empty_value.tags.push(crate::node::NodeTag {
            node_id: empty_value.id,
            signer_id: signer,
            name: "owner".into(),
            value: Vec::new(),
            signed_at: 0,
        });
        assert!(!filter.matches(&ctx, &empty_value));

        assert!(!filter.matches(&ctx, &node(3, "DE")));
    }

    #[test]
    fn tag_empty_sentinel_matches_absent_or_empty_but_not_literal_empty_value() {
        let signer = NodeId::from_bytes([9; NODE_ID_LEN]);
        let bindings = Bindings::bare(RuleKind::Filter);
        let value = eval_source(&format!(r#"tag("{signer}", "owner", empty())"#), &bindings.as_bindings()).expect("should eval");
        let filter = value.into_filter("").expect("should be a filter");
        let ctx = FilterContext::new(NodeId::from_bytes([0; NODE_ID_LEN]));

        assert!(filter.matches(&ctx, &node(1, "DE")), "absent tag should match empty()");

        let mut empty_value = node(2, "DE");
        empty_value.tags.push(crate::node::NodeTag {
            node_id: empty_value.id,
            signer_id: signer,
            name: "owner".into(),
            value: Vec::new(),
            signed_at: 0,
        });
        assert!(filter.matches(&ctx, &empty_value), "present-but-empty tag should match empty()");

        let mut present = node(3, "DE");
        present.tags.push(crate::node::NodeTag {
            node_id: present.id,
            signer_id: signer,
            name: "owner".into(),
            value: b"zipernowsky".to_vec(),
            signed_at: 0,
        });
        assert!(!filter.matches(&ctx, &present));
    }

    #[test]
    fn tag_literal_empty_string_requires_tag_present_with_empty_value() {
        let signer = NodeId::from_bytes([9; NODE_ID_LEN]);
        let bindings = Bindings::bare(RuleKind::Filter);
        let value = eval_source(&format!(r#"tag("{signer}", "owner", "")"#), &bindings.as_bindings()).expect("should eval");
        let filter = value.into_filter("").expect("should be a filter");
        let ctx = FilterContext::new(NodeId::from_bytes([0; NODE_ID_LEN]));

        assert!(!filter.matches(&ctx, &node(1, "DE")), "absent tag should not match a literal empty value");

        let mut empty_value = node(2, "DE");
        empty_value.tags.push(crate::node::NodeTag {
            node_id: empty_value.id,
            signer_id: signer,
            name: "owner".into(),
            value: Vec::new(),
            signed_at: 0,
        });
        assert!(filter.matches(&ctx, &empty_value));
    }

    #[test]
    fn tag_not_empty_sentinel_parses_and_matches_like_the_default() {
        let signer = NodeId::from_bytes([9; NODE_ID_LEN]);
        let bindings = Bindings::bare(RuleKind::Filter);
        let value =
            eval_source(&format!(r#"tag("{signer}", "owner", notEmpty())"#), &bindings.as_bindings()).expect("should eval");
        let filter = value.into_filter("").expect("should be a filter");
        let ctx = FilterContext::new(NodeId::from_bytes([0; NODE_ID_LEN]));

        let mut present = node(1, "DE");
        present.tags.push(crate::node::NodeTag {
            node_id: present.id,
            signer_id: signer,
            name: "owner".into(),
            value: b"zipernowsky".to_vec(),
            signed_at: 0,
        });
        assert!(filter.matches(&ctx, &present));
        assert!(!filter.matches(&ctx, &node(2, "DE")));
    }

    #[test]
    fn evaluates_selector_expression_and_selects() {
        let bindings = Bindings::bare(RuleKind::Selector);
        let value = eval_source("fixed(2, random())", &bindings.as_bindings()).expect("should eval");
        let selector_init = value.into_selector("").expect("should be a selector");

        let nodes = vec![node(1, "DE"), node(2, "DE"), node(3, "DE")];
        let base_filter: FilterHandle = Arc::new(All);
        let selector = selector_init.init(&nodes, &base_filter);

        let excluded = HashSet::new();
        let already = Vec::new();
        let cancel = CancellationToken::new();
        let call = SelectCall {
            placement: 1,
            requester: NodeId::from_bytes([0; NODE_ID_LEN]),
            n: 2,
            excluded: &excluded,
            already_selected: &already,
            cancel: &cancel,
        };
        let picked = selector.select(&call).expect("should select");
        assert_eq!(picked.len(), 2);
    }

    #[test]
    fn evaluates_invariant_expression() {
        let bindings = Bindings::bare(RuleKind::Invariant);
        let value = eval_source("allgood()", &bindings.as_bindings()).expect("should eval");
        assert!(value.into_invariant("").is_ok());
    }

    #[test]
    fn evaluates_withhold_worked_example_in_order() {
        let bindings = Bindings::bare(RuleKind::Cohort);
        let b = bindings.as_bindings();
        let value = eval_source(
            r#"and(min(49), withhold(attr("dc") + "-" + attr("rack"), 1, withhold(attr("dc"), 3, min(29))))"#,
            &b,
        )
        .expect("should eval");
        let cohort = value.into_cohort("").expect("should be a cohort-requirement");
        let table = b.into_cohort_table();
        assert_eq!(table.keys().collect::<Vec<_>>(), vec!["0", "1"]);
        assert_eq!(
            cohort.describe(),
            "and(literal(49), withhold(0, 1, withhold(1, 3, literal(29))))"
        );
    }

    #[test]
    fn arithmetic_promotes_through_int_float_chain() {
        let bindings = Bindings::bare(RuleKind::Filter);
        let b = bindings.as_bindings();
        let value = eval_source("1 + 2 * 3", &b).expect("should eval");
        assert_eq!(value.as_int("").expect("int"), 7);

        let value = eval_source("1 + 2.5", &b).expect("should eval");
        assert_eq!(value.as_float("").expect("float"), 3.5);
    }

    #[test]
    fn unknown_function_is_an_error() {
        let bindings = Bindings::bare(RuleKind::Filter);
        assert!(eval_source("bogus()", &bindings.as_bindings()).is_err());
    }

    #[test]
    fn successful_at_least_percent_needs_a_registered_tracker() {
        let bindings = Bindings::bare(RuleKind::Filter);
        assert!(eval_source(r#"successfulAtLeastPercent("missing", 0.5)"#, &bindings.as_bindings()).is_err());
    }
}
