//! Synthetic node-fleet generator and correctness checkers for
//! benchmarking `placement-core`'s selectors and expression evaluator.
//!
//! This crate plays the same role for `placement-core` that a fixture
//! generator plays for any library benchmarked against realistic input
//! sizes: deterministic, seeded generation of node fleets at a handful of
//! size tiers, plus invariant checks so a benchmark can also double as a
//! smoke test.

pub mod correctness;
pub mod generator;

pub use generator::{FleetConfig, SizeTier, generate_fleet};
