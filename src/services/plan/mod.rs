//! Test Plan Selection

pub mod selector;

pub use selector::{CategorySelection, MissingField, PlanSelector};
