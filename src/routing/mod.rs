//! Routing module
//!
//! Maps request paths to rewrite, redirect or passthrough decisions.

pub mod matcher;

pub use matcher::{decide, RouteDecision};
