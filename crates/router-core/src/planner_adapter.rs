//! Planner adapter (spec §4.4).
//!
//! Wraps the `Planner` capability with a fixed, deterministic request
//! shape ("skeleton") and a single set of constraints (max steps, allowed
//! sources, snake_case-only instruction) that every planner call carries
//! regardless of which model answers it. On failure — the model being
//! unavailable, or returning output that doesn't parse — the adapter
//! surfaces a structured error. It never attempts free-form recovery.

use crate::capability::{Planner, PlannerError};
use crate::error::RouterError;
use crate::plan::{MAX_STEPS_CEILING, ModelPlan};
use crate::tool::{CatalogItem, ToolSource};
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;

/// The deterministic envelope sent to the planner for every request. Kept
/// as a first-class type (rather than ad hoc `json!`) so its shape can't
/// drift between requests.
#[derive(Debug, Clone, Serialize)]
pub struct PlannerRequestSkeleton<'a> {
    pub input: &'a str,
    pub context: &'a Value,
    pub catalog: &'a [CatalogItem],
    pub constraints: PlannerConstraints,
}

#[derive(Debug, Clone, Serialize)]
pub struct PlannerConstraints {
    pub max_steps: usize,
    pub allowed_sources: [&'static str; 2],
    pub instruction: &'static str,
}

const SNAKE_CASE_INSTRUCTION: &str =
    "Emit only snake_case tool names that exist in the supplied catalog. Never invent names.";

impl PlannerConstraints {
    pub fn new(max_steps: usize) -> Self {
        Self {
            max_steps: max_steps.min(MAX_STEPS_CEILING),
            allowed_sources: [ToolSource::Local.as_str(), ToolSource::Upstream.as_str()],
            instruction: SNAKE_CASE_INSTRUCTION,
        }
    }
}

pub struct PlannerAdapter {
    planner: Arc<dyn Planner>,
}

impl PlannerAdapter {
    pub fn new(planner: Arc<dyn Planner>) -> Self {
        Self { planner }
    }

    /// Build the deterministic request skeleton without calling the model.
    /// Exposed for diagnostics/logging and for tests asserting the shape
    /// never drifts.
    pub fn build_request_skeleton<'a>(
        input: &'a str,
        context: &'a Value,
        catalog: &'a [CatalogItem],
        max_steps: usize,
    ) -> PlannerRequestSkeleton<'a> {
        PlannerRequestSkeleton {
            input,
            context,
            catalog,
            constraints: PlannerConstraints::new(max_steps),
        }
    }

    /// Call the planner and return the decoded plan plus the raw response
    /// (kept for diagnostics). Never attempts free-form recovery on error.
    pub async fn plan(
        &self,
        input: &str,
        context: &Value,
        catalog: &[CatalogItem],
        max_steps: usize,
    ) -> Result<(ModelPlan, Value), RouterError> {
        let clamped = max_steps.min(MAX_STEPS_CEILING);
        self.planner
            .plan(input, context, catalog, clamped)
            .await
            .map_err(|err| match err {
                PlannerError::Unavailable(msg) => RouterError::Configuration(msg),
                PlannerError::Unparseable(msg) => RouterError::Planner(msg),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_skeleton_clamps_max_steps_to_ceiling() {
        let skeleton = PlannerAdapter::build_request_skeleton("hi", &Value::Null, &[], 99);
        assert_eq!(skeleton.constraints.max_steps, MAX_STEPS_CEILING);
    }

    #[test]
    fn request_skeleton_lists_both_sources() {
        let skeleton = PlannerAdapter::build_request_skeleton("hi", &Value::Null, &[], 3);
        assert_eq!(skeleton.constraints.allowed_sources, ["local", "upstream"]);
    }
}
