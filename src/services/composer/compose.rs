//! Scenario Composer
//!
//! Produces the single document that one execution job runs. Sources are
//! the plan-derived document (composed remotely from a selection) and a
//! document converted from a free-text prompt; either or both may be
//! present.

use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use webtest_client::{ConvertRequest, ExecuteScanTestsRequest, TestingApi};
use webtest_core::{ExecutionJobId, ScanId, ValidationItem};

use crate::services::composer::document::ScenarioDocument;
use crate::utils::error::{AppError, AppResult};

/// A document converted from a prompt. No job exists for it yet.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConvertedScenario {
    pub document: ScenarioDocument,
    pub scenario_count: u32,
    pub steps_total: u32,
    pub validation: Vec<ValidationItem>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub relevance: Option<serde_json::Value>,
}

/// Plan selection handed to the composer.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PlanSelection {
    pub scan_id: Option<ScanId>,
    pub selected_ids: Vec<String>,
    pub auth_data: HashMap<String, String>,
    pub test_data: HashMap<String, String>,
}

impl PlanSelection {
    pub fn is_empty(&self) -> bool {
        self.selected_ids.is_empty()
    }
}

/// Result of composition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComposedRun {
    pub document: ScenarioDocument,
    /// Job the remote already created for exactly this document. `None`
    /// means the caller must create one.
    pub execution_job_id: Option<ExecutionJobId>,
    pub steps_total: u32,
    pub validation: Vec<ValidationItem>,
}

pub struct ScenarioComposer {
    api: Arc<dyn TestingApi>,
    language: String,
}

impl ScenarioComposer {
    pub fn new(api: Arc<dyn TestingApi>, language: impl Into<String>) -> Self {
        Self {
            api,
            language: language.into(),
        }
    }

    /// Convert a free-text prompt into a standalone scenario document.
    pub async fn convert(
        &self,
        target_url: &str,
        prompt: &str,
        scan_id: Option<ScanId>,
    ) -> AppResult<ConvertedScenario> {
        if prompt.trim().is_empty() {
            return Err(AppError::validation("Prompt is empty"));
        }
        let response = self
            .api
            .convert_scenario(ConvertRequest {
                target_url: target_url.to_string(),
                prompt: prompt.to_string(),
                language: self.language.clone(),
                scan_id,
            })
            .await?;
        let document = ScenarioDocument::parse(response.document)?;
        let scenario_count = nonzero_or(response.count, document.scenario_count());
        let steps_total = nonzero_or(response.steps, document.step_count());
        info!(scenarios = scenario_count, steps = steps_total, "prompt converted");
        Ok(ConvertedScenario {
            document,
            scenario_count,
            steps_total,
            validation: response.validation,
            relevance: response.relevance,
        })
    }

    /// Build one runnable document from whatever sources are present.
    ///
    /// With both sources the remote composes the plan part and creates a
    /// job for it; that job is cancelled and the merged document carries no
    /// job id so the caller creates exactly one job for the combined run.
    pub async fn compose(
        &self,
        selection: &PlanSelection,
        additional: Option<&ConvertedScenario>,
    ) -> AppResult<ComposedRun> {
        match (selection.is_empty(), additional) {
            (true, None) => Err(AppError::validation(
                "Nothing to run: select tests or convert a prompt first",
            )),
            (true, Some(converted)) => {
                debug!("composing converted document only");
                Ok(ComposedRun {
                    document: converted.document.clone(),
                    execution_job_id: None,
                    steps_total: converted.steps_total,
                    validation: converted.validation.clone(),
                })
            }
            (false, None) => self.compose_plan(selection).await,
            (false, Some(converted)) => {
                let plan = self.compose_plan(selection).await?;
                if let Some(job_id) = plan.execution_job_id {
                    match self.api.cancel_execution_job(job_id).await {
                        Ok(_) => info!(job_id = %job_id, "plan-only job discarded"),
                        Err(e) => {
                            warn!(job_id = %job_id, error = %e, "failed to cancel plan-only job")
                        }
                    }
                }
                let offset = plan.document.scenario_count() as usize;
                let mut validation = plan.validation;
                validation.extend(converted.validation.iter().cloned().map(|mut item| {
                    item.scenario_index += offset;
                    item
                }));
                Ok(ComposedRun {
                    document: plan.document.concat(&converted.document),
                    execution_job_id: None,
                    steps_total: plan.steps_total + converted.steps_total,
                    validation,
                })
            }
        }
    }

    async fn compose_plan(&self, selection: &PlanSelection) -> AppResult<ComposedRun> {
        let scan_id = selection
            .scan_id
            .ok_or_else(|| AppError::validation("A completed scan is required to run plan tests"))?;
        let response = self
            .api
            .execute_scan_tests(
                scan_id,
                ExecuteScanTestsRequest {
                    selected_tests: selection.selected_ids.clone(),
                    auth_data: selection.auth_data.clone(),
                    test_data: selection.test_data.clone(),
                },
            )
            .await?;
        info!(
            scan_id = %scan_id,
            job_id = %response.execution_job_id,
            tests = selection.selected_ids.len(),
            "plan document composed"
        );
        let document = ScenarioDocument::parse(response.document)?;
        let steps_total = nonzero_or(response.steps_total, document.step_count());
        Ok(ComposedRun {
            document,
            execution_job_id: Some(response.execution_job_id),
            steps_total,
            validation: response.validation,
        })
    }
}

fn nonzero_or(remote: u32, local: u32) -> u32 {
    if remote > 0 {
        remote
    } else {
        local
    }
}
