//! Scenario Composition
//!
//! Prompt conversion and merging of scenario sources into one runnable
//! document.

pub mod compose;
pub mod document;

pub use compose::{ComposedRun, ConvertedScenario, PlanSelection, ScenarioComposer};
pub use document::ScenarioDocument;
