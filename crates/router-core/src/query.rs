//! Query entrypoint (spec §4.11, §6.1).
//!
//! Ties every other component together: mode dispatch, defaults, discovery
//! fast-path, planner call, context projection, validation, execution, and
//! final output formatting. This module is the only place that knows the
//! full `input -> extract context -> fast-path? -> planner -> project
//! context -> validate -> execute -> shape + offload -> summarize? ->
//! envelope` pipeline end to end.

use crate::artifact::{ArtifactStore, Manifest};
use crate::capability::{LocalToolHandlers, Summarizer, UpstreamExecutor, UpstreamRegistry};
use crate::context;
use crate::discovery;
use crate::error::RouterError;
use crate::executor::Executor;
use crate::plan::{MAX_STEPS_CEILING, ModelPlan, PlanStep};
use crate::planner_adapter::PlannerAdapter;
use crate::policy::Policy;
use crate::projector;
use crate::shaper::OutputOptions;
use crate::tool::ToolCatalog;
use crate::validator;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    #[default]
    Auto,
    Planner,
    Executor,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Format {
    #[default]
    Json,
    Text,
}

const DEFAULT_MAX_STEPS: usize = 5;
const DEFAULT_PARALLELISM: usize = 1;

#[derive(Debug, Clone, Deserialize)]
pub struct QueryRequest {
    pub input: String,
    #[serde(default)]
    pub context: Value,
    #[serde(default)]
    pub mode: Mode,
    #[serde(default)]
    pub steps: Option<Vec<PlanStep>>,
    #[serde(default = "default_max_steps")]
    pub max_steps: usize,
    #[serde(default = "default_parallelism")]
    pub parallelism: usize,
    #[serde(default)]
    pub include_answer: bool,
    #[serde(default)]
    pub dry_run: bool,
    #[serde(default)]
    pub format: Format,
    #[serde(default)]
    pub output: OutputOptions,
}

fn default_max_steps() -> usize {
    DEFAULT_MAX_STEPS
}

fn default_parallelism() -> usize {
    DEFAULT_PARALLELISM
}

impl QueryRequest {
    /// Decode an already-JSON-RPC-decoded arguments object (spec: "the
    /// core receives already-decoded tool arguments").
    pub fn from_value(value: Value) -> Result<Self, RouterError> {
        serde_json::from_value(value).map_err(|err| RouterError::InvalidInput(err.to_string()))
    }
}

/// Envelope returned to the caller (spec §6.1, extended per §7 with an
/// explicit error marker since non-execution failures must still produce a
/// well-formed envelope rather than a transport-level error).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RouterResult {
    pub plan: Option<ModelPlan>,
    pub executed_steps: Vec<crate::executor::ExecutedStep>,
    pub manifest: Option<Manifest>,
    pub answer: Option<String>,
    pub is_error: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw_plan: Option<Value>,
}

impl RouterResult {
    fn error(message: impl Into<String>, plan: Option<ModelPlan>, raw_plan: Option<Value>) -> Self {
        Self {
            plan,
            executed_steps: Vec::new(),
            manifest: None,
            answer: None,
            is_error: true,
            error: Some(message.into()),
            raw_plan,
        }
    }
}

/// Final rendering requested via `format` (spec §4.11: "format=text wraps
/// the JSON envelope in a text block"). Always carries the structured
/// envelope; `text` is populated only when `format=text` was requested.
pub struct QueryOutput {
    pub result: RouterResult,
    pub text: Option<String>,
}

impl QueryOutput {
    pub fn render(self) -> (RouterResult, Option<String>) {
        (self.result, self.text)
    }
}

pub struct QueryEntrypoint {
    local: Arc<dyn LocalToolHandlers>,
    upstream_registry: Arc<dyn UpstreamRegistry>,
    upstream_executor: Arc<dyn UpstreamExecutor>,
    planner: Option<Arc<PlannerAdapter>>,
    summarizer: Option<Arc<dyn Summarizer>>,
    artifacts: Arc<ArtifactStore>,
    policy: Arc<dyn Policy>,
    max_parallelism: usize,
}

impl QueryEntrypoint {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        local: Arc<dyn LocalToolHandlers>,
        upstream_registry: Arc<dyn UpstreamRegistry>,
        upstream_executor: Arc<dyn UpstreamExecutor>,
        planner: Option<Arc<PlannerAdapter>>,
        summarizer: Option<Arc<dyn Summarizer>>,
        artifacts: Arc<ArtifactStore>,
        policy: Arc<dyn Policy>,
        max_parallelism: usize,
    ) -> Self {
        Self {
            local,
            upstream_registry,
            upstream_executor,
            planner,
            summarizer,
            artifacts,
            policy,
            max_parallelism,
        }
    }

    pub async fn handle(&self, request: QueryRequest, cancellation: CancellationToken) -> QueryOutput {
        let format = request.format;
        let result = self.handle_inner(request, cancellation).await;
        let text = match format {
            Format::Json => None,
            Format::Text => Some(serde_json::to_string_pretty(&result).unwrap_or_default()),
        };
        QueryOutput { result, text }
    }

    async fn handle_inner(&self, request: QueryRequest, cancellation: CancellationToken) -> RouterResult {
        if request.input.trim().is_empty() {
            return RouterResult::error("input must be non-empty", None, None);
        }
        if request.max_steps == 0 || request.max_steps > MAX_STEPS_CEILING {
            return RouterResult::error(
                format!("max_steps must be between 1 and {MAX_STEPS_CEILING}"),
                None,
                None,
            );
        }
        match request.mode {
            Mode::Executor => {
                if request.steps.as_ref().is_none_or(|s| s.is_empty()) {
                    return RouterResult::error("mode=executor requires non-empty steps", None, None);
                }
            }
            Mode::Planner => {
                if request.steps.is_some() {
                    return RouterResult::error("mode=planner forbids steps", None, None);
                }
            }
            Mode::Auto => {}
        }

        let catalog = self.build_catalog().await;

        match request.mode {
            Mode::Executor => self.run_executor_mode(&request, &catalog, cancellation).await,
            Mode::Planner => self.run_planner_mode(&request, &catalog).await,
            Mode::Auto => self.run_auto_mode(&request, &catalog, cancellation).await,
        }
    }

    async fn build_catalog(&self) -> ToolCatalog {
        let local_items = self.local.catalog();
        let upstream_items = self.upstream_registry.list_active().await;
        ToolCatalog::assemble(local_items, upstream_items)
    }

    async fn run_executor_mode(
        &self,
        request: &QueryRequest,
        catalog: &ToolCatalog,
        cancellation: CancellationToken,
    ) -> RouterResult {
        let steps = request.steps.clone().unwrap_or_default();
        let plan = ModelPlan::new(steps, false);

        if let Err(err) = validator::validate(&plan, catalog, self.policy.as_ref(), request.max_steps) {
            return RouterResult::error(err.to_string(), Some(plan), None);
        }

        if request.dry_run {
            return RouterResult {
                plan: Some(plan),
                executed_steps: Vec::new(),
                manifest: None,
                answer: None,
                is_error: false,
                error: None,
                raw_plan: None,
            };
        }

        let executor = Executor::new(
            self.local.clone(),
            self.upstream_executor.clone(),
            self.artifacts.clone(),
            self.policy.clone(),
        );
        let outcome = executor
            .execute(&plan, &request.output, request.parallelism, self.max_parallelism, cancellation)
            .await;

        let answer = if request.include_answer {
            Some(deterministic_rollup(&outcome.executed_steps, &outcome.manifest))
        } else {
            None
        };

        RouterResult {
            plan: Some(plan),
            executed_steps: outcome.executed_steps,
            manifest: outcome.manifest,
            answer,
            is_error: false,
            error: None,
            raw_plan: None,
        }
    }

    async fn run_planner_mode(&self, request: &QueryRequest, catalog: &ToolCatalog) -> RouterResult {
        let extracted = context::extract(&request.input);
        if let Some(fast_path) = discovery::try_fast_path(&extracted.forwarded_input) {
            return RouterResult {
                plan: Some(fast_path.plan),
                executed_steps: Vec::new(),
                manifest: None,
                answer: fast_path.answer,
                is_error: false,
                error: None,
                raw_plan: None,
            };
        }

        let Some(planner) = self.planner.as_ref() else {
            return RouterResult::error("planner is not configured", None, None);
        };

        let mut context_value = request.context.clone();
        merge_extracted_context(&mut context_value, &extracted.context);

        let (mut plan, raw) = match planner
            .plan(&extracted.forwarded_input, &context_value, catalog.snapshot(), request.max_steps)
            .await
        {
            Ok(pair) => pair,
            Err(err) => return RouterResult::error(err.to_string(), None, None),
        };

        projector::project(&mut plan, &extracted.context);

        if let Err(err) = validator::validate(&plan, catalog, self.policy.as_ref(), request.max_steps) {
            return RouterResult::error(err.to_string(), Some(plan), Some(raw));
        }

        RouterResult {
            plan: Some(plan),
            executed_steps: Vec::new(),
            manifest: None,
            answer: None,
            is_error: false,
            error: None,
            raw_plan: None,
        }
    }

    async fn run_auto_mode(
        &self,
        request: &QueryRequest,
        catalog: &ToolCatalog,
        cancellation: CancellationToken,
    ) -> RouterResult {
        let extracted = context::extract(&request.input);

        let (mut plan, raw_plan, mut canned_answer) = if let Some(fast_path) =
            discovery::try_fast_path(&extracted.forwarded_input)
        {
            (fast_path.plan, None, fast_path.answer)
        } else {
            let Some(planner) = self.planner.as_ref() else {
                return RouterResult::error("planner is not configured", None, None);
            };

            let mut context_value = request.context.clone();
            merge_extracted_context(&mut context_value, &extracted.context);

            match planner
                .plan(&extracted.forwarded_input, &context_value, catalog.snapshot(), request.max_steps)
                .await
            {
                Ok((plan, raw)) => (plan, Some(raw), None),
                Err(err) => return RouterResult::error(err.to_string(), None, None),
            }
        };

        projector::project(&mut plan, &extracted.context);

        if let Err(err) = validator::validate(&plan, catalog, self.policy.as_ref(), request.max_steps) {
            return RouterResult::error(err.to_string(), Some(plan), raw_plan);
        }

        if request.dry_run {
            return RouterResult {
                plan: Some(plan),
                executed_steps: Vec::new(),
                manifest: None,
                answer: canned_answer,
                is_error: false,
                error: None,
                raw_plan: None,
            };
        }

        let executor = Executor::new(
            self.local.clone(),
            self.upstream_executor.clone(),
            self.artifacts.clone(),
            self.policy.clone(),
        );
        let outcome = executor
            .execute(&plan, &request.output, request.parallelism, self.max_parallelism, cancellation)
            .await;

        let mut result = RouterResult {
            plan: Some(plan),
            executed_steps: outcome.executed_steps,
            manifest: outcome.manifest,
            answer: canned_answer.take(),
            is_error: false,
            error: None,
            raw_plan: None,
        };

        if request.include_answer {
            if let Some(summarizer) = self.summarizer.as_ref() {
                match summarizer.summarize(&request.input, &result).await {
                    Ok(answer) => result.answer = Some(answer),
                    Err(err) => {
                        result.answer = Some(format!("(summary unavailable: {err})"));
                    }
                }
            }
        }

        result
    }
}

fn merge_extracted_context(caller_context: &mut Value, extracted: &context::PlanningContext) {
    if !caller_context.is_object() {
        *caller_context = Value::Object(serde_json::Map::new());
    }
    if let Value::Object(map) = caller_context {
        extracted.merge_into(map);
    }
}

fn deterministic_rollup(
    executed: &[crate::executor::ExecutedStep],
    manifest: &Option<Manifest>,
) -> String {
    let ok = executed.iter().filter(|s| s.ok).count();
    let err = executed.len() - ok;
    let mut text = format!("Executed {} step(s).", executed.len());
    text.push_str(&format!(" {ok} ok, {err} error(s)."));
    if let Some(manifest) = manifest {
        if !manifest.artifacts.is_empty() {
            text.push_str(&format!(" {} artifact(s) produced.", manifest.artifacts.len()));
        }
    }
    text
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capability::{Planner, PlannerError, ToolResult};
    use crate::error::HandlerError;
    use crate::tool::{CatalogItem, ToolSource, UpstreamTool};
    use async_trait::async_trait;

    struct FixedLocal;
    #[async_trait]
    impl LocalToolHandlers for FixedLocal {
        fn catalog(&self) -> Vec<CatalogItem> {
            vec![CatalogItem {
                name: "search_tools".to_string(),
                description: "search".to_string(),
                category: "meta".to_string(),
                source: ToolSource::Local,
                input_schema: serde_json::json!({"type": "object"}),
            }]
        }
        async fn call(&self, name: &str, args: Value) -> Result<ToolResult, HandlerError> {
            Ok(ToolResult::ok(serde_json::json!({"tool": name, "args": args}).to_string()))
        }
    }

    struct EmptyUpstreamRegistry;
    #[async_trait]
    impl UpstreamRegistry for EmptyUpstreamRegistry {
        async fn list_active(&self) -> Vec<UpstreamTool> {
            vec![]
        }
        async fn get(&self, _name: &str) -> Option<UpstreamTool> {
            None
        }
        async fn activate(&self, _name: &str) -> Result<(), HandlerError> {
            Ok(())
        }
    }

    struct NoopUpstreamExecutor;
    #[async_trait]
    impl UpstreamExecutor for NoopUpstreamExecutor {
        async fn invoke(&self, _name: &str, _args: Value) -> Result<ToolResult, HandlerError> {
            Ok(ToolResult::ok("{}"))
        }
    }

    struct StubPlanner;
    #[async_trait]
    impl Planner for StubPlanner {
        async fn plan(
            &self,
            _input: &str,
            _context: &Value,
            _catalog: &[CatalogItem],
            _max_steps: usize,
        ) -> Result<(ModelPlan, Value), PlannerError> {
            Ok((
                ModelPlan::new(
                    vec![PlanStep {
                        name: "get_pull_request_details".to_string(),
                        source: ToolSource::Local,
                        args: serde_json::json!({}),
                        reason: None,
                        parallel_group: None,
                    }],
                    false,
                ),
                serde_json::json!({"raw": true}),
            ))
        }
    }

    struct PrAwareLocal;
    #[async_trait]
    impl LocalToolHandlers for PrAwareLocal {
        fn catalog(&self) -> Vec<CatalogItem> {
            vec![CatalogItem {
                name: "get_pull_request_details".to_string(),
                description: "d".to_string(),
                category: "github".to_string(),
                source: ToolSource::Local,
                input_schema: serde_json::json!({"type": "object"}),
            }]
        }
        async fn call(&self, _name: &str, args: Value) -> Result<ToolResult, HandlerError> {
            Ok(ToolResult::ok(args.to_string()))
        }
    }

    fn entrypoint_with(
        local: Arc<dyn LocalToolHandlers>,
        planner: Option<Arc<PlannerAdapter>>,
    ) -> (QueryEntrypoint, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let artifacts = Arc::new(ArtifactStore::init_from_env(dir.path().to_path_buf(), 1_000_000).unwrap());
        let entrypoint = QueryEntrypoint::new(
            local,
            Arc::new(EmptyUpstreamRegistry),
            Arc::new(NoopUpstreamExecutor),
            planner,
            None,
            artifacts,
            Arc::new(crate::policy::ReadOnlyPolicy),
            crate::executor::MAX_PARALLELISM,
        );
        (entrypoint, dir)
    }

    #[tokio::test]
    async fn discovery_fast_path_skips_planner_but_still_executes() {
        let (entrypoint, _dir) = entrypoint_with(Arc::new(FixedLocal), None);
        let request = QueryRequest::from_value(serde_json::json!({
            "input": "search tools grafana",
            "format": "json"
        }))
        .unwrap();
        let output = entrypoint.handle(request, CancellationToken::new()).await;
        let (result, _) = output.render();
        assert!(!result.is_error);
        assert_eq!(result.executed_steps.len(), 1);
        assert!(result.executed_steps[0].ok);
        assert_eq!(result.plan.unwrap().steps[0].name, "search_tools");
    }

    #[tokio::test]
    async fn discovery_fast_path_in_dry_run_skips_execution() {
        let (entrypoint, _dir) = entrypoint_with(Arc::new(FixedLocal), None);
        let request = QueryRequest::from_value(serde_json::json!({
            "input": "help",
            "dry_run": true
        }))
        .unwrap();
        let output = entrypoint.handle(request, CancellationToken::new()).await;
        let (result, _) = output.render();
        assert!(!result.is_error);
        assert_eq!(result.executed_steps.len(), 0);
        assert_eq!(result.answer.as_deref(), Some("Here are the available tools."));
    }

    #[tokio::test]
    async fn executor_mode_without_planner_produces_rollup_answer() {
        let (entrypoint, _dir) = entrypoint_with(Arc::new(FixedLocal), None);
        let request = QueryRequest::from_value(serde_json::json!({
            "input": "x",
            "mode": "executor",
            "steps": [{"name": "search_tools", "source": "local", "args": {"query": "pr", "format": "json", "limit": 1}}],
            "include_answer": true
        }))
        .unwrap();
        let output = entrypoint.handle(request, CancellationToken::new()).await;
        let (result, _) = output.render();
        assert!(!result.is_error);
        assert_eq!(result.executed_steps.len(), 1);
        assert!(result.executed_steps[0].ok);
        assert!(result.answer.unwrap().contains("Executed 1 step(s)."));
    }

    #[tokio::test]
    async fn context_injection_fills_pr_fields_after_planning() {
        let (entrypoint, _dir) = entrypoint_with(
            Arc::new(PrAwareLocal),
            Some(Arc::new(PlannerAdapter::new(Arc::new(StubPlanner)))),
        );
        let request = QueryRequest::from_value(serde_json::json!({
            "input": "Summarize https://github.com/acme/widget/pull/42",
            "dry_run": true
        }))
        .unwrap();
        let output = entrypoint.handle(request, CancellationToken::new()).await;
        let (result, _) = output.render();
        assert!(!result.is_error);
        let plan = result.plan.unwrap();
        assert_eq!(plan.steps[0].args, serde_json::json!({"repo": "acme/widget", "number": 42}));
    }

    #[tokio::test]
    async fn max_steps_zero_is_input_error() {
        let (entrypoint, _dir) = entrypoint_with(Arc::new(FixedLocal), None);
        let request = QueryRequest::from_value(serde_json::json!({"input": "x", "max_steps": 0})).unwrap();
        let output = entrypoint.handle(request, CancellationToken::new()).await;
        let (result, _) = output.render();
        assert!(result.is_error);
    }

    #[tokio::test]
    async fn max_steps_above_ceiling_is_input_error() {
        let (entrypoint, _dir) = entrypoint_with(Arc::new(FixedLocal), None);
        let request = QueryRequest::from_value(serde_json::json!({"input": "x", "max_steps": 9})).unwrap();
        let output = entrypoint.handle(request, CancellationToken::new()).await;
        let (result, _) = output.render();
        assert!(result.is_error);
    }

    #[tokio::test]
    async fn executor_mode_requires_steps() {
        let (entrypoint, _dir) = entrypoint_with(Arc::new(FixedLocal), None);
        let request =
            QueryRequest::from_value(serde_json::json!({"input": "x", "mode": "executor", "steps": []})).unwrap();
        let output = entrypoint.handle(request, CancellationToken::new()).await;
        let (result, _) = output.render();
        assert!(result.is_error);
    }

    #[tokio::test]
    async fn planner_mode_forbids_steps() {
        let (entrypoint, _dir) = entrypoint_with(Arc::new(FixedLocal), None);
        let request = QueryRequest::from_value(serde_json::json!({
            "input": "x",
            "mode": "planner",
            "steps": [{"name": "search_tools", "source": "local", "args": {}}]
        }))
        .unwrap();
        let output = entrypoint.handle(request, CancellationToken::new()).await;
        let (result, _) = output.render();
        assert!(result.is_error);
    }
}
