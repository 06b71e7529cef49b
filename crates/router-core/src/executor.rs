//! Plan executor — the central algorithm (spec §4.9, §5).
//!
//! Runs a validated plan to completion: sequential steps run one after
//! another, contiguous same-group local steps run concurrently (bounded by
//! `parallelism`), every step result is shaped and, if large, offloaded to
//! the artifact store, and paginated results spawn continuation steps
//! appended to the tail of the run. A single failed step halts the whole
//! plan — the executor never attempts best-effort continuation past an
//! error (spec §7).

use crate::artifact::{ArtifactStore, Manifest};
use crate::capability::{LocalToolHandlers, ToolResult, UpstreamExecutor};
use crate::continuation;
use crate::plan::{ModelPlan, PlanStep};
use crate::policy::Policy;
use crate::shaper::{OutputOptions, shape};
use crate::tool::ToolSource;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Maximum number of auto-continuation steps appended in a single request
/// (spec §4.10, §8: "at most 10 continuation steps per request").
pub const MAX_CONTINUATIONS: usize = 10;

/// Upper bound on concurrent handler calls within a single parallel group.
pub const MAX_PARALLELISM: usize = 8;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutedStep {
    pub name: String,
    pub source: ToolSource,
    pub args: Value,
    pub ok: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ExecutedStep {
    fn failure(step: &PlanStep, error: impl Into<String>) -> Self {
        Self {
            name: step.name.clone(),
            source: step.source,
            args: step.args.clone(),
            ok: false,
            result: None,
            error: Some(error.into()),
        }
    }
}

pub struct ExecutionOutcome {
    pub executed_steps: Vec<ExecutedStep>,
    pub manifest: Option<Manifest>,
}

pub struct Executor {
    local: Arc<dyn LocalToolHandlers>,
    upstream: Arc<dyn UpstreamExecutor>,
    artifacts: Arc<ArtifactStore>,
    policy: Arc<dyn Policy>,
}

impl Executor {
    pub fn new(
        local: Arc<dyn LocalToolHandlers>,
        upstream: Arc<dyn UpstreamExecutor>,
        artifacts: Arc<ArtifactStore>,
        policy: Arc<dyn Policy>,
    ) -> Self {
        Self {
            local,
            upstream,
            artifacts,
            policy,
        }
    }

    /// Run `plan` to completion (or to the first failure), honoring
    /// `parallelism` (clamped to `max_parallelism`, itself clamped to the
    /// hard ceiling) and `cancellation`.
    pub async fn execute(
        &self,
        plan: &ModelPlan,
        output: &OutputOptions,
        parallelism: usize,
        max_parallelism: usize,
        cancellation: CancellationToken,
    ) -> ExecutionOutcome {
        let parallelism = parallelism.clamp(1, max_parallelism.clamp(1, MAX_PARALLELISM));
        let mut steps: Vec<PlanStep> = plan.steps.clone();
        let mut executed: Vec<ExecutedStep> = Vec::with_capacity(steps.len());
        let mut manifest_items = Vec::new();
        let mut continuations_used = 0usize;
        let mut i = 0usize;
        let mut halted = false;

        while i < steps.len() {
            let group_end = self.group_end(&steps, i, parallelism);
            let group = &steps[i..group_end];

            let results = if group.len() > 1 {
                self.run_group_parallel(group, output, parallelism, cancellation.clone()).await
            } else {
                vec![self.run_one(&group[0], output, cancellation.clone()).await]
            };

            let mut group_failed = false;
            let mut continuation_candidates = Vec::new();
            for (step, (exec_step, artifact, result_map)) in group.iter().zip(results) {
                if !exec_step.ok {
                    group_failed = true;
                }
                if let Some(item) = artifact {
                    manifest_items.push(item);
                }
                if exec_step.ok {
                    if let Some(map) = result_map {
                        continuation_candidates.push((step.clone(), map));
                    }
                }
                executed.push(exec_step);
            }

            if group_failed {
                halted = true;
                break;
            }

            for (step, map) in continuation_candidates {
                if continuations_used >= MAX_CONTINUATIONS {
                    break;
                }
                if let Some(next) = continuation::continuation(&step, &map) {
                    steps.push(next);
                    continuations_used += 1;
                }
            }

            i = group_end;
        }

        let _ = halted;
        let manifest = if manifest_items.is_empty() {
            None
        } else {
            Some(Manifest {
                artifacts: manifest_items,
            })
        };

        ExecutionOutcome {
            executed_steps: executed,
            manifest,
        }
    }

    /// Extend the contiguous run starting at `start` that shares the same
    /// non-empty `parallel_group` tag and `source = local` (spec §4.9.1).
    fn group_end(&self, steps: &[PlanStep], start: usize, parallelism: usize) -> usize {
        if parallelism <= 1 || steps[start].source != ToolSource::Local {
            return start + 1;
        }
        let Some(tag) = steps[start].parallel_group.as_ref().filter(|t| !t.is_empty()) else {
            return start + 1;
        };
        let mut end = start + 1;
        while end < steps.len()
            && steps[end].source == ToolSource::Local
            && steps[end].parallel_group.as_deref() == Some(tag.as_str())
        {
            end += 1;
        }
        end
    }

    async fn run_group_parallel(
        &self,
        group: &[PlanStep],
        output: &OutputOptions,
        parallelism: usize,
        cancellation: CancellationToken,
    ) -> Vec<(ExecutedStep, Option<crate::artifact::ArtifactItem>, Option<serde_json::Map<String, Value>>)> {
        let semaphore = Arc::new(tokio::sync::Semaphore::new(parallelism));
        let mut slots: Vec<Option<(ExecutedStep, Option<crate::artifact::ArtifactItem>, Option<serde_json::Map<String, Value>>)>> =
            (0..group.len()).map(|_| None).collect();

        let mut join_set = tokio::task::JoinSet::new();
        for (idx, step) in group.iter().cloned().enumerate() {
            let semaphore = semaphore.clone();
            let cancellation = cancellation.clone();
            let this = self.clone_handles();
            let output = output.clone();
            join_set.spawn(async move {
                let _permit = semaphore.acquire_owned().await.expect("semaphore closed");
                let outcome = this.run_one(&step, &output, cancellation).await;
                (idx, outcome)
            });
        }

        while let Some(joined) = join_set.join_next().await {
            if let Ok((idx, outcome)) = joined {
                slots[idx] = Some(outcome);
            }
        }

        slots.into_iter().map(|slot| slot.expect("every slot filled")).collect()
    }

    /// Dispatch a single step: policy check, args decode, handler call,
    /// result parse, artifact offload, output shaping.
    async fn run_one(
        &self,
        step: &PlanStep,
        output: &OutputOptions,
        cancellation: CancellationToken,
    ) -> (ExecutedStep, Option<crate::artifact::ArtifactItem>, Option<serde_json::Map<String, Value>>) {
        if !self.policy.allows(step.source, &step.name) {
            return (ExecutedStep::failure(step, "blocked by policy"), None, None);
        }

        let Some(args_obj) = step.args_as_object().cloned() else {
            return (ExecutedStep::failure(step, "invalid args"), None, None);
        };
        let args = Value::Object(args_obj);

        let dispatch = async {
            match step.source {
                ToolSource::Local => self.local.call(&step.name, args.clone()).await,
                ToolSource::Upstream => self.upstream.invoke(&step.name, args.clone()).await,
            }
        };

        let tool_result: Result<ToolResult, crate::error::HandlerError> = tokio::select! {
            _ = cancellation.cancelled() => {
                return (ExecutedStep::failure(step, "request cancelled"), None, None);
            }
            result = dispatch => result,
        };

        let tool_result = match tool_result {
            Ok(tr) => tr,
            Err(err) => return (ExecutedStep::failure(step, err.to_string()), None, None),
        };

        if tool_result.is_error {
            return (ExecutedStep::failure(step, tool_result.content_text), None, None);
        }

        let parsed = tool_result.parsed_result();
        let result_map = parsed.as_object().cloned();

        let (shaped, artifact_item) = match self.artifacts.maybe_store(&step.name, &args, &parsed) {
            Ok(Some((reference, item))) => {
                let reference_value = serde_json::to_value(&reference).unwrap_or(Value::Null);
                (shape(reference_value, output), Some(item))
            }
            Ok(None) => (shape(parsed, output), None),
            Err(err) => {
                return (
                    ExecutedStep::failure(step, format!("artifact offload failed: {err}")),
                    None,
                    None,
                );
            }
        };

        (
            ExecutedStep {
                name: step.name.clone(),
                source: step.source,
                args,
                ok: true,
                result: Some(shaped),
                error: None,
            },
            artifact_item,
            result_map,
        )
    }

    fn clone_handles(&self) -> Self {
        Self {
            local: self.local.clone(),
            upstream: self.upstream.clone(),
            artifacts: self.artifacts.clone(),
            policy: self.policy.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tool::CatalogItem;
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct EchoLocal {
        calls: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl LocalToolHandlers for EchoLocal {
        fn catalog(&self) -> Vec<CatalogItem> {
            vec![]
        }

        async fn call(&self, name: &str, args: Value) -> Result<ToolResult, crate::error::HandlerError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if name == "jira_add_comment" {
                return Err(crate::error::HandlerError::NotFound(name.to_string()));
            }
            Ok(ToolResult::ok(json!({"echo": args}).to_string()))
        }
    }

    struct NoopUpstream;
    #[async_trait]
    impl UpstreamExecutor for NoopUpstream {
        async fn invoke(&self, _name: &str, _args: Value) -> Result<ToolResult, crate::error::HandlerError> {
            Ok(ToolResult::ok("{}"))
        }
    }

    fn local_step(name: &str, args: Value) -> PlanStep {
        PlanStep {
            name: name.to_string(),
            source: ToolSource::Local,
            args,
            reason: None,
            parallel_group: None,
        }
    }

    fn executor(calls: Arc<AtomicUsize>) -> Executor {
        let dir = tempfile::tempdir().unwrap();
        Executor::new(
            Arc::new(EchoLocal { calls }),
            Arc::new(NoopUpstream),
            Arc::new(ArtifactStore::init_from_env(dir.path().to_path_buf(), 1_000_000).unwrap()),
            Arc::new(crate::policy::ReadOnlyPolicy),
        )
    }

    #[tokio::test]
    async fn sequential_plan_executes_all_steps() {
        let calls = Arc::new(AtomicUsize::new(0));
        let exec = executor(calls.clone());
        let plan = ModelPlan::new(
            vec![local_step("search_tools", json!({"query": "a"}))],
            false,
        );
        let outcome = exec
            .execute(&plan, &OutputOptions::default(), 1, MAX_PARALLELISM, CancellationToken::new())
            .await;
        assert_eq!(outcome.executed_steps.len(), 1);
        assert!(outcome.executed_steps[0].ok);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn policy_block_halts_plan() {
        let calls = Arc::new(AtomicUsize::new(0));
        let exec = executor(calls);
        let plan = ModelPlan::new(
            vec![
                local_step("jira_add_comment", json!({})),
                local_step("search_tools", json!({"query": "a"})),
            ],
            false,
        );
        let outcome = exec
            .execute(&plan, &OutputOptions::default(), 1, MAX_PARALLELISM, CancellationToken::new())
            .await;
        assert_eq!(outcome.executed_steps.len(), 1);
        assert!(!outcome.executed_steps[0].ok);
        assert_eq!(outcome.executed_steps[0].error.as_deref(), Some("blocked by policy"));
    }

    #[tokio::test]
    async fn parallel_group_preserves_plan_order() {
        let calls = Arc::new(AtomicUsize::new(0));
        let exec = executor(calls);
        let mut plan = ModelPlan::new(
            vec![
                local_step("search_tools", json!({"query": "1"})),
                local_step("search_tools", json!({"query": "2"})),
                local_step("search_tools", json!({"query": "3"})),
            ],
            false,
        );
        for step in &mut plan.steps {
            step.parallel_group = Some("g".to_string());
        }
        let outcome = exec
            .execute(&plan, &OutputOptions::default(), 4, MAX_PARALLELISM, CancellationToken::new())
            .await;
        assert_eq!(outcome.executed_steps.len(), 3);
        for (i, step) in outcome.executed_steps.iter().enumerate() {
            assert_eq!(step.args["query"], json!((i + 1).to_string()));
        }
    }

    #[tokio::test]
    async fn auto_continuation_appends_step_and_is_capped() {
        struct PagingLocal;
        #[async_trait]
        impl LocalToolHandlers for PagingLocal {
            fn catalog(&self) -> Vec<CatalogItem> {
                vec![]
            }
            async fn call(&self, _name: &str, _args: Value) -> Result<ToolResult, crate::error::HandlerError> {
                Ok(ToolResult::ok(json!({"has_next": true, "next_page": 2}).to_string()))
            }
        }

        let dir = tempfile::tempdir().unwrap();
        let exec = Executor::new(
            Arc::new(PagingLocal),
            Arc::new(NoopUpstream),
            Arc::new(ArtifactStore::init_from_env(dir.path().to_path_buf(), 1_000_000).unwrap()),
            Arc::new(crate::policy::ReadOnlyPolicy),
        );
        let plan = ModelPlan::new(
            vec![local_step("list_pull_request_files", json!({"page": 1}))],
            false,
        );
        let outcome = exec
            .execute(&plan, &OutputOptions::default(), 1, MAX_PARALLELISM, CancellationToken::new())
            .await;
        // every continuation reports has_next again, so we should hit the cap.
        assert_eq!(outcome.executed_steps.len(), 1 + MAX_CONTINUATIONS);
    }

    #[tokio::test]
    async fn cancellation_halts_with_reason() {
        let calls = Arc::new(AtomicUsize::new(0));
        let exec = executor(calls);
        let plan = ModelPlan::new(vec![local_step("search_tools", json!({}))], false);
        let token = CancellationToken::new();
        token.cancel();
        let outcome = exec.execute(&plan, &OutputOptions::default(), 1, MAX_PARALLELISM, token).await;
        assert!(!outcome.executed_steps[0].ok);
        assert_eq!(outcome.executed_steps[0].error.as_deref(), Some("request cancelled"));
    }
}
