//! Consumed capabilities (spec §6.2).
//!
//! The core never talks to an LLM, an upstream MCP server, or a local tool
//! directly — it calls these traits. Concrete implementations (HTTP
//! clients, subprocess registries, the hardcoded local handler table) live
//! in sibling crates and are injected at startup.

use crate::error::HandlerError;
use crate::plan::ModelPlan;
use crate::query::RouterResult;
use crate::tool::{CatalogItem, UpstreamTool};
use async_trait::async_trait;
use serde_json::Value;

/// Uniform result of a single tool invocation, regardless of whether the
/// tool is local or upstream (spec §4.9: "Both return either an error or a
/// `ToolResult{content_text, is_error}`").
#[derive(Debug, Clone)]
pub struct ToolResult {
    pub content_text: String,
    pub is_error: bool,
}

impl ToolResult {
    pub fn ok(content_text: impl Into<String>) -> Self {
        Self {
            content_text: content_text.into(),
            is_error: false,
        }
    }

    pub fn error(content_text: impl Into<String>) -> Self {
        Self {
            content_text: content_text.into(),
            is_error: true,
        }
    }

    /// Parse `content_text` as JSON, falling back to the raw text when it
    /// isn't parseable (spec §4.9 step 2).
    pub fn parsed_result(&self) -> Value {
        serde_json::from_str(&self.content_text).unwrap_or_else(|_| Value::String(self.content_text.clone()))
    }
}

/// `Planner::plan` — single-shot call to an external chat model.
#[async_trait]
pub trait Planner: Send + Sync {
    async fn plan(
        &self,
        input: &str,
        context: &Value,
        catalog: &[CatalogItem],
        max_steps: usize,
    ) -> Result<(ModelPlan, Value), PlannerError>;
}

#[derive(thiserror::Error, Debug, Clone)]
pub enum PlannerError {
    #[error("planner unavailable: {0}")]
    Unavailable(String),
    #[error("planner returned unparseable output: {0}")]
    Unparseable(String),
}

/// `Summarizer::summarize` — turns a finished `RouterResult` into prose.
#[async_trait]
pub trait Summarizer: Send + Sync {
    async fn summarize(&self, input: &str, result: &RouterResult) -> Result<String, SummarizerError>;
}

#[derive(thiserror::Error, Debug, Clone)]
pub enum SummarizerError {
    #[error("summarizer unavailable: {0}")]
    Unavailable(String),
}

/// `UpstreamExecutor::invoke` — dispatches a single upstream tool call.
#[async_trait]
pub trait UpstreamExecutor: Send + Sync {
    async fn invoke(&self, name: &str, args: Value) -> Result<ToolResult, HandlerError>;
}

/// `UpstreamRegistry` — tracks which upstream tools are currently active.
#[async_trait]
pub trait UpstreamRegistry: Send + Sync {
    async fn list_active(&self) -> Vec<UpstreamTool>;
    async fn get(&self, name: &str) -> Option<UpstreamTool>;
    async fn activate(&self, name: &str) -> Result<(), HandlerError>;
}

/// `LocalToolHandlers` — the fixed table of local tool name -> handler,
/// plus the catalog items describing them (spec §4.1, §6.3).
#[async_trait]
pub trait LocalToolHandlers: Send + Sync {
    fn catalog(&self) -> Vec<CatalogItem>;
    async fn call(&self, name: &str, args: Value) -> Result<ToolResult, HandlerError>;
}
