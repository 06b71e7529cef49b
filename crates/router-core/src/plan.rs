//! Plan data model (spec §3).

use crate::tool::ToolSource;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Upper bound on plan size, regardless of what the caller requests
/// (spec §3, §8: `max_steps > 8` is an input error).
pub const MAX_STEPS_CEILING: usize = 8;

/// One intended tool invocation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlanStep {
    pub name: String,
    pub source: ToolSource,
    pub args: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parallel_group: Option<String>,
}

impl PlanStep {
    pub fn args_as_object(&self) -> Option<&serde_json::Map<String, Value>> {
        self.args.as_object()
    }
}

/// An ordered sequence of steps, as produced by the planner or supplied
/// directly in `mode=executor`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelPlan {
    pub steps: Vec<PlanStep>,
    #[serde(default)]
    pub final_answer_needed: bool,
}

impl ModelPlan {
    pub fn new(steps: Vec<PlanStep>, final_answer_needed: bool) -> Self {
        Self {
            steps,
            final_answer_needed,
        }
    }
}
