//! Scenario Documents
//!
//! A scenario document is YAML text holding a list of scenarios, each with
//! its own `steps` list. The remote service owns the exact schema; locally
//! the text is only inspected to count scenarios and steps.

use serde::{Deserialize, Serialize};
use serde_yaml::Value;

use crate::utils::error::{AppError, AppResult};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScenarioDocument {
    text: String,
    scenarios: u32,
    steps: u32,
}

impl ScenarioDocument {
    /// Wrap document text. Empty or whitespace-only text is rejected.
    /// Text that does not parse as YAML is kept with zero counts.
    pub fn parse(text: impl Into<String>) -> AppResult<Self> {
        let text = text.into();
        if text.trim().is_empty() {
            return Err(AppError::validation("Scenario document is empty"));
        }
        let (scenarios, steps) = match serde_yaml::from_str::<Value>(&text) {
            Ok(value) => count(&value),
            Err(e) => {
                tracing::debug!(error = %e, "scenario document is not valid YAML");
                (0, 0)
            }
        };
        Ok(Self {
            text,
            scenarios,
            steps,
        })
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn into_text(self) -> String {
        self.text
    }

    pub fn scenario_count(&self) -> u32 {
        self.scenarios
    }

    pub fn step_count(&self) -> u32 {
        self.steps
    }

    /// `self` followed by `other`, separated by one newline. Counts add up.
    pub fn concat(&self, other: &ScenarioDocument) -> ScenarioDocument {
        ScenarioDocument {
            text: format!("{}\n{}", self.text, other.text),
            scenarios: self.scenarios + other.scenarios,
            steps: self.steps + other.steps,
        }
    }
}

/// Scenarios may sit at the top level or under a `scenarios` key.
fn count(value: &Value) -> (u32, u32) {
    let list = match value {
        Value::Sequence(seq) => seq,
        Value::Mapping(map) => match map.get("scenarios") {
            Some(Value::Sequence(seq)) => seq,
            _ if map.contains_key("steps") => return (1, steps_of(value)),
            _ => return (0, 0),
        },
        _ => return (0, 0),
    };
    let scenarios = list.iter().filter(|v| v.is_mapping()).count() as u32;
    let steps = list.iter().map(steps_of).sum();
    (scenarios, steps)
}

fn steps_of(scenario: &Value) -> u32 {
    scenario
        .get("steps")
        .and_then(Value::as_sequence)
        .map(|s| s.len() as u32)
        .unwrap_or(0)
}
