//! Plan Selector
//!
//! Holds the test plan returned by the planner and the operator's local
//! choices on top of it: which tests are selected, which categories are
//! expanded, and the credential and test-data values typed in. The plan's
//! structural fields are never modified.

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use webtest_core::{FieldDescriptor, TestCategory, TestPlan, TestPlanItem};

use crate::utils::error::{AppError, AppResult};

/// Selection state of a whole category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CategorySelection {
    All,
    Partial,
    None,
}

/// Where a field value is stored.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum FieldScope {
    Test(String),
    /// Category with a shared credentials block.
    Category(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FieldKind {
    Auth,
    TestData,
}

/// A required field of a selected test that has no value yet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MissingField {
    pub test_id: String,
    pub key: String,
    pub label: String,
}

#[derive(Debug, Clone, Default)]
pub struct PlanSelector {
    plan: TestPlan,
    selected: HashSet<String>,
    expanded: HashSet<String>,
    auth_values: HashMap<FieldScope, HashMap<String, String>>,
    test_data_values: HashMap<FieldScope, HashMap<String, String>>,
}

impl PlanSelector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the held plan. Selection is seeded from each item's
    /// default-selected flag, auto-selected categories start expanded, and
    /// previously entered field values are discarded.
    pub fn load_plan(&mut self, plan: TestPlan) {
        self.selected = plan
            .categories
            .iter()
            .flat_map(|c| c.tests.iter())
            .filter(|t| t.default_selected)
            .map(|t| t.id.clone())
            .collect();
        self.expanded = plan
            .categories
            .iter()
            .filter(|c| c.auto_selected)
            .map(|c| c.id.clone())
            .collect();
        self.auth_values.clear();
        self.test_data_values.clear();
        debug!(
            categories = plan.categories.len(),
            tests = plan.item_count(),
            selected = self.selected.len(),
            "plan loaded"
        );
        self.plan = plan;
    }

    pub fn plan(&self) -> &TestPlan {
        &self.plan
    }

    pub fn is_empty(&self) -> bool {
        self.plan.item_count() == 0
    }

    pub fn is_selected(&self, test_id: &str) -> bool {
        self.selected.contains(test_id)
    }

    pub fn is_expanded(&self, category_id: &str) -> bool {
        self.expanded.contains(category_id)
    }

    pub fn selected_count(&self) -> usize {
        self.selected.len()
    }

    /// Selected ids in plan order.
    pub fn selected_ids(&self) -> Vec<String> {
        self.plan
            .item_ids()
            .filter(|id| self.selected.contains(*id))
            .map(str::to_string)
            .collect()
    }

    /// Selected items in plan order.
    pub fn selected_items(&self) -> Vec<&TestPlanItem> {
        self.plan
            .categories
            .iter()
            .flat_map(|c| c.tests.iter())
            .filter(|t| self.selected.contains(&t.id))
            .collect()
    }

    /// Sum of the selected tests' estimated durations, in seconds.
    pub fn estimated_duration(&self) -> u32 {
        self.selected_items()
            .iter()
            .map(|t| t.estimated_duration)
            .sum()
    }

    /// Flip one test's selection. Returns the new state.
    pub fn toggle_test(&mut self, test_id: &str) -> AppResult<bool> {
        if self.plan.find_item(test_id).is_none() {
            return Err(AppError::validation(format!("Unknown test: {}", test_id)));
        }
        let now_selected = if self.selected.remove(test_id) {
            false
        } else {
            self.selected.insert(test_id.to_string());
            true
        };
        Ok(now_selected)
    }

    /// All items selected → deselect all; anything else → select all.
    pub fn toggle_category(&mut self, category_id: &str) -> AppResult<CategorySelection> {
        let category = self.category(category_id)?;
        let ids: Vec<String> = category.tests.iter().map(|t| t.id.clone()).collect();
        let all_selected = ids.iter().all(|id| self.selected.contains(id));
        if all_selected {
            for id in &ids {
                self.selected.remove(id);
            }
        } else {
            self.selected.extend(ids);
        }
        self.category_selection(category_id)
    }

    pub fn category_selection(&self, category_id: &str) -> AppResult<CategorySelection> {
        let category = self.category(category_id)?;
        let selected = category
            .tests
            .iter()
            .filter(|t| self.selected.contains(&t.id))
            .count();
        Ok(if selected == 0 {
            CategorySelection::None
        } else if selected == category.tests.len() {
            CategorySelection::All
        } else {
            CategorySelection::Partial
        })
    }

    pub fn toggle_expanded(&mut self, category_id: &str) -> AppResult<bool> {
        self.category(category_id)?;
        if self.expanded.remove(category_id) {
            Ok(false)
        } else {
            self.expanded.insert(category_id.to_string());
            Ok(true)
        }
    }

    /// Store a credential value for a test, or for its whole category when
    /// the category shares one credentials block.
    pub fn set_auth_field(&mut self, test_id: &str, key: &str, value: impl Into<String>) -> AppResult<()> {
        self.set_field(FieldKind::Auth, test_id, key, value.into())
    }

    pub fn set_test_data_field(
        &mut self,
        test_id: &str,
        key: &str,
        value: impl Into<String>,
    ) -> AppResult<()> {
        self.set_field(FieldKind::TestData, test_id, key, value.into())
    }

    pub fn auth_field(&self, test_id: &str, key: &str) -> Option<&str> {
        self.field(FieldKind::Auth, test_id, key)
    }

    pub fn test_data_field(&self, test_id: &str, key: &str) -> Option<&str> {
        self.field(FieldKind::TestData, test_id, key)
    }

    /// Credential values of the selected tests as one flat map.
    pub fn auth_data(&self) -> HashMap<String, String> {
        self.flatten(FieldKind::Auth)
    }

    /// Test-data values of the selected tests as one flat map.
    pub fn test_data(&self) -> HashMap<String, String> {
        self.flatten(FieldKind::TestData)
    }

    /// Required fields of selected tests that are still empty. Informational
    /// only; the remote execution call decides whether a run can proceed.
    pub fn missing_required_fields(&self) -> Vec<MissingField> {
        let mut missing = Vec::new();
        for item in self.selected_items() {
            for (kind, fields) in [
                (FieldKind::Auth, item.auth_fields()),
                (FieldKind::TestData, item.test_data_fields()),
            ] {
                for field in fields.iter().filter(|f| f.required) {
                    let filled = self
                        .field(kind, &item.id, &field.key)
                        .map(|v| !v.trim().is_empty())
                        .unwrap_or(false);
                    if !filled {
                        missing.push(MissingField {
                            test_id: item.id.clone(),
                            key: field.key.clone(),
                            label: field.label.clone(),
                        });
                    }
                }
            }
        }
        missing
    }

    fn category(&self, category_id: &str) -> AppResult<&TestCategory> {
        self.plan
            .find_category(category_id)
            .ok_or_else(|| AppError::validation(format!("Unknown category: {}", category_id)))
    }

    fn scope_for(&self, test_id: &str) -> AppResult<(FieldScope, &TestPlanItem)> {
        let (category, item) = self
            .plan
            .find_item(test_id)
            .ok_or_else(|| AppError::validation(format!("Unknown test: {}", test_id)))?;
        let scope = if category.shared_auth {
            FieldScope::Category(category.id.clone())
        } else {
            FieldScope::Test(item.id.clone())
        };
        Ok((scope, item))
    }

    fn store(&mut self, kind: FieldKind) -> &mut HashMap<FieldScope, HashMap<String, String>> {
        match kind {
            FieldKind::Auth => &mut self.auth_values,
            FieldKind::TestData => &mut self.test_data_values,
        }
    }

    fn values(&self, kind: FieldKind) -> &HashMap<FieldScope, HashMap<String, String>> {
        match kind {
            FieldKind::Auth => &self.auth_values,
            FieldKind::TestData => &self.test_data_values,
        }
    }

    fn set_field(&mut self, kind: FieldKind, test_id: &str, key: &str, value: String) -> AppResult<()> {
        let (scope, item) = self.scope_for(test_id)?;
        let declared: &[FieldDescriptor] = match kind {
            FieldKind::Auth => item.auth_fields(),
            FieldKind::TestData => item.test_data_fields(),
        };
        if !declared.is_empty() && !declared.iter().any(|f| f.key == key) {
            debug!(test_id, key, "value for undeclared field");
        }
        self.store(kind)
            .entry(scope)
            .or_default()
            .insert(key.to_string(), value);
        Ok(())
    }

    fn field(&self, kind: FieldKind, test_id: &str, key: &str) -> Option<&str> {
        let (scope, _) = self.scope_for(test_id).ok()?;
        self.values(kind)
            .get(&scope)
            .and_then(|m| m.get(key))
            .map(String::as_str)
    }

    /// First selected test in plan order wins on key collisions.
    fn flatten(&self, kind: FieldKind) -> HashMap<String, String> {
        let mut flat: HashMap<String, String> = HashMap::new();
        let mut seen_scopes: HashSet<FieldScope> = HashSet::new();
        for item in self.selected_items() {
            let Ok((scope, _)) = self.scope_for(&item.id) else {
                continue;
            };
            if !seen_scopes.insert(scope.clone()) {
                continue;
            }
            let Some(values) = self.values(kind).get(&scope) else {
                continue;
            };
            let mut keys: Vec<&String> = values.keys().collect();
            keys.sort();
            for key in keys {
                let value = &values[key];
                match flat.get(key) {
                    Some(existing) if existing != value => {
                        warn!(test_id = %item.id, key = %key, "conflicting field value ignored");
                    }
                    Some(_) => {}
                    None => {
                        flat.insert(key.clone(), value.clone());
                    }
                }
            }
        }
        flat
    }
}
