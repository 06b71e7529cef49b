//! Plan validator (spec §4.5).
//!
//! Rejects a plan as a single operation if it violates any of (a)-(e).
//! The planner is treated as an untrusted oracle (spec §9): nothing here
//! trusts a claimed `source` or `name` without checking it against the
//! catalog built by this process.

use crate::plan::{MAX_STEPS_CEILING, ModelPlan};
use crate::policy::Policy;
use crate::tool::{RESERVED_NAMES, ToolCatalog};

#[derive(Debug, Clone, thiserror::Error)]
pub enum ValidationError {
    #[error("plan must have between 1 and {max} steps, got {got}")]
    StepCountOutOfRange { got: usize, max: usize },

    #[error("unknown tool in plan: {0}")]
    UnknownTool(String),

    #[error("tool '{name}' source mismatch: plan claims '{claimed}', catalog has '{actual}'")]
    SourceMismatch {
        name: String,
        claimed: String,
        actual: String,
    },

    #[error("args for tool '{0}' must be a JSON object")]
    ArgsNotObject(String),

    #[error("tool '{0}' is blocked by policy")]
    PolicyBlocked(String),

    #[error("plan step names the proxy itself ('{0}')")]
    Recursive(String),
}

/// Validate a plan against the catalog and policy, per spec §4.5.
///
/// `max_steps` is the caller-requested cap (already clamped to
/// `MAX_STEPS_CEILING` by the query entrypoint); this function re-checks
/// the ceiling defensively so it never trusts a caller-supplied value.
pub fn validate(
    plan: &ModelPlan,
    catalog: &ToolCatalog,
    policy: &dyn Policy,
    max_steps: usize,
) -> Result<(), ValidationError> {
    let effective_max = max_steps.min(MAX_STEPS_CEILING);

    if plan.steps.is_empty() || plan.steps.len() > effective_max {
        return Err(ValidationError::StepCountOutOfRange {
            got: plan.steps.len(),
            max: effective_max,
        });
    }

    for step in &plan.steps {
        if RESERVED_NAMES.contains(&step.name.as_str()) {
            return Err(ValidationError::Recursive(step.name.clone()));
        }

        let catalog_entry = catalog
            .find(&step.name)
            .ok_or_else(|| ValidationError::UnknownTool(step.name.clone()))?;

        if catalog_entry.source != step.source {
            return Err(ValidationError::SourceMismatch {
                name: step.name.clone(),
                claimed: step.source.to_string(),
                actual: catalog_entry.source.to_string(),
            });
        }

        if step.args_as_object().is_none() {
            return Err(ValidationError::ArgsNotObject(step.name.clone()));
        }

        if !policy.allows(step.source, &step.name) {
            return Err(ValidationError::PolicyBlocked(step.name.clone()));
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plan::PlanStep;
    use crate::policy::ReadOnlyPolicy;
    use crate::tool::{CatalogItem, ToolSource};
    use serde_json::json;

    fn catalog() -> ToolCatalog {
        ToolCatalog::assemble(
            vec![CatalogItem {
                name: "search_tools".to_string(),
                description: "search".to_string(),
                category: "meta".to_string(),
                source: ToolSource::Local,
                input_schema: json!({"type": "object"}),
            }],
            vec![],
        )
    }

    fn step(name: &str, source: ToolSource, args: serde_json::Value) -> PlanStep {
        PlanStep {
            name: name.to_string(),
            source,
            args,
            reason: None,
            parallel_group: None,
        }
    }

    #[test]
    fn rejects_empty_plan() {
        let plan = ModelPlan::new(vec![], false);
        let err = validate(&plan, &catalog(), &ReadOnlyPolicy, 5).unwrap_err();
        assert!(matches!(err, ValidationError::StepCountOutOfRange { .. }));
    }

    #[test]
    fn rejects_unknown_tool() {
        let plan = ModelPlan::new(vec![step("nope", ToolSource::Local, json!({}))], false);
        let err = validate(&plan, &catalog(), &ReadOnlyPolicy, 5).unwrap_err();
        assert!(matches!(err, ValidationError::UnknownTool(_)));
    }

    #[test]
    fn rejects_source_mismatch() {
        let plan = ModelPlan::new(
            vec![step("search_tools", ToolSource::Upstream, json!({}))],
            false,
        );
        let err = validate(&plan, &catalog(), &ReadOnlyPolicy, 5).unwrap_err();
        assert!(matches!(err, ValidationError::SourceMismatch { .. }));
    }

    #[test]
    fn rejects_non_object_args() {
        let plan = ModelPlan::new(
            vec![step("search_tools", ToolSource::Local, json!(["x"]))],
            false,
        );
        let err = validate(&plan, &catalog(), &ReadOnlyPolicy, 5).unwrap_err();
        assert!(matches!(err, ValidationError::ArgsNotObject(_)));
    }

    #[test]
    fn rejects_recursive_step() {
        let plan = ModelPlan::new(vec![step("query", ToolSource::Local, json!({}))], false);
        let err = validate(&plan, &catalog(), &ReadOnlyPolicy, 5).unwrap_err();
        assert!(matches!(err, ValidationError::Recursive(_)));
    }

    #[test]
    fn accepts_valid_plan() {
        let plan = ModelPlan::new(
            vec![step("search_tools", ToolSource::Local, json!({"query": "x"}))],
            false,
        );
        assert!(validate(&plan, &catalog(), &ReadOnlyPolicy, 5).is_ok());
    }
}
