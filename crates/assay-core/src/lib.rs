//! assay-core — Value model, type signatures and expression engine.
//!
//! This crate defines the item and test data model, the expression registry
//! and evaluator, the attempt-state contract, and the TOML loader that the
//! rest of assay builds on.

pub mod assessment;
pub mod error;
pub mod expression;
pub mod model;
pub mod parser;
pub mod random;
pub mod rules;
pub mod state;
pub mod templates;
pub mod types;
pub mod validate;
pub mod value;
