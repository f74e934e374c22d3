//! Common items related to Genetic Programming.
//!
//! Expressions are nodes with some level of arity - aka the number of inputs.
//!
//! - `expr` provides the expression tree along with generation, mutation and evaluation.
//! - `op` provides the node set used to grow pictures.

pub mod expr;
pub mod op;
