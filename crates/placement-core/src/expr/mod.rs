//! The placement expression DSL: lexer, parser, dynamically-typed value,
//! evaluation bindings, and the builtin evaluator itself.
//!
//! A placement rule (filter, selector, invariant, download-selector, or
//! cohort requirement) is authored as a single DSL expression and compiled
//! once via [`eval::eval_source`]; the resulting [`value::Value`] is then
//! unwrapped into the concrete trait object the rule's kind calls for.
pub mod bindings;
pub mod eval;
pub mod lexer;
pub mod parser;
pub mod value;

pub use bindings::{Bindings, OwnedBindings, RuleKind};
pub use eval::{eval, eval_source};
pub use parser::{Expr, ExprKind, parse};
pub use value::{DownloadSelector, DownloadSelectorHandle, Value};
