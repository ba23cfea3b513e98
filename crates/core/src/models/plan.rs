//! Test Plan Model
//!
//! The categorized set of proposed tests returned by
//! `POST /api/scan/{id}/plan`. Structural fields are never mutated locally;
//! selection and field values live in the orchestrator's `PlanSelector`.

use serde::{Deserialize, Serialize};

/// Test priority as proposed by the planner.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    High,
    #[default]
    Medium,
    Low,
}

/// A value the operator must supply before a test can run
/// (credentials or throwaway test data).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldDescriptor {
    pub key: String,
    #[serde(default)]
    pub label: String,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub field_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub placeholder: Option<String>,
    #[serde(default)]
    pub required: bool,
}

/// One proposed test.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestPlanItem {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub priority: Priority,
    /// Estimated duration in seconds.
    #[serde(default, rename = "estimated_time")]
    pub estimated_duration: u32,
    #[serde(default)]
    pub requires_auth: bool,
    /// Default-selected flag.
    #[serde(default, rename = "selected")]
    pub default_selected: bool,
    #[serde(default)]
    pub auth_fields: Option<Vec<FieldDescriptor>>,
    #[serde(default)]
    pub test_data_fields: Option<Vec<FieldDescriptor>>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub actual_elements: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub access_path: Option<String>,
}

impl TestPlanItem {
    pub fn auth_fields(&self) -> &[FieldDescriptor] {
        self.auth_fields.as_deref().unwrap_or(&[])
    }

    pub fn test_data_fields(&self) -> &[FieldDescriptor] {
        self.test_data_fields.as_deref().unwrap_or(&[])
    }
}

/// A named group of tests.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestCategory {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub auto_selected: bool,
    /// Credentials entered for one test apply to every test in the category.
    #[serde(default)]
    pub shared_auth: bool,
    #[serde(default)]
    pub tests: Vec<TestPlanItem>,
}

/// Ordered list of categories.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TestPlan {
    #[serde(default)]
    pub categories: Vec<TestCategory>,
}

impl TestPlan {
    pub fn find_item(&self, test_id: &str) -> Option<(&TestCategory, &TestPlanItem)> {
        self.categories.iter().find_map(|category| {
            category
                .tests
                .iter()
                .find(|item| item.id == test_id)
                .map(|item| (category, item))
        })
    }

    pub fn find_category(&self, category_id: &str) -> Option<&TestCategory> {
        self.categories.iter().find(|c| c.id == category_id)
    }

    pub fn item_count(&self) -> usize {
        self.categories.iter().map(|c| c.tests.len()).sum()
    }

    /// All item ids in plan order.
    pub fn item_ids(&self) -> impl Iterator<Item = &str> {
        self.categories
            .iter()
            .flat_map(|c| c.tests.iter().map(|t| t.id.as_str()))
    }
}
