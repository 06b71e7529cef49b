//! MCP surface: a single `query` tool (aliased `router`), per spec §6.1/§6.3.
//!
//! Grounded on `csa-mcp-hub::proxy::ProxyRouter`'s manual `ServerHandler`
//! impl, simplified from N-upstream-server proxying down to one fixed tool
//! that forwards into [`QueryEntrypoint::handle`].

use rmcp::model::{
    CallToolRequestParam, CallToolResult, Content, ListToolsResult, PaginatedRequestParam, ServerCapabilities,
    ServerInfo, Tool,
};
use rmcp::service::RequestContext;
use rmcp::{ErrorData as McpError, RoleServer, ServerHandler};
use router_core::QueryEntrypoint;
use serde_json::json;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

const QUERY_DESCRIPTION: &str = "Natural-language entrypoint to the aggregating proxy. Plans, validates, \
and executes a short sequence of local and upstream tool calls for the given request. Call with \
{\"input\": \"...\"}; see additionalProperties for the full request shape (mode, steps, max_steps, \
parallelism, include_answer, dry_run, format, output).";

fn query_tool(name: &str) -> Tool {
    Tool::new(
        name.to_string(),
        QUERY_DESCRIPTION.to_string(),
        json!({
            "type": "object",
            "properties": {
                "input": {"type": "string"},
                "context": {"type": "object"},
                "mode": {"type": "string", "enum": ["auto", "planner", "executor"]},
                "steps": {"type": "array"},
                "max_steps": {"type": "integer", "minimum": 1, "maximum": 8},
                "parallelism": {"type": "integer", "minimum": 1, "maximum": 8},
                "include_answer": {"type": "boolean"},
                "dry_run": {"type": "boolean"},
                "format": {"type": "string", "enum": ["json", "text"]},
                "output": {"type": "object"},
            },
            "required": ["input"],
        })
        .as_object()
        .expect("object literal")
        .clone(),
    )
}

#[derive(Clone)]
pub struct RouterServerHandler {
    entrypoint: Arc<QueryEntrypoint>,
}

impl RouterServerHandler {
    pub fn new(entrypoint: Arc<QueryEntrypoint>) -> Self {
        Self { entrypoint }
    }

    async fn dispatch(&self, arguments: serde_json::Value) -> Result<CallToolResult, McpError> {
        let request = router_core::QueryRequest::from_value(arguments)
            .map_err(|err| McpError::invalid_params(err.to_string(), None))?;

        let output = self.entrypoint.handle(request, CancellationToken::new()).await;
        let (result, text) = output.render();
        let is_error = result.is_error;
        let body = text.unwrap_or_else(|| serde_json::to_string(&result).unwrap_or_default());

        Ok(if is_error {
            CallToolResult::error(vec![Content::text(body)])
        } else {
            CallToolResult::success(vec![Content::text(body)])
        })
    }
}

impl ServerHandler for RouterServerHandler {
    async fn list_tools(
        &self,
        _request: Option<PaginatedRequestParam>,
        _context: RequestContext<RoleServer>,
    ) -> Result<ListToolsResult, McpError> {
        Ok(ListToolsResult::with_all_items(vec![query_tool("query"), query_tool("router")]))
    }

    async fn call_tool(
        &self,
        request: CallToolRequestParam,
        _context: RequestContext<RoleServer>,
    ) -> Result<CallToolResult, McpError> {
        match request.name.as_ref() {
            "query" | "router" => {
                let arguments = request.arguments.map(serde_json::Value::Object).unwrap_or_else(|| json!({}));
                self.dispatch(arguments).await
            }
            other => Err(McpError::invalid_params(format!("unknown tool: {other}"), None)),
        }
    }

    fn get_info(&self) -> ServerInfo {
        let mut info = ServerInfo::default();
        info.server_info.name = "router-server".to_string();
        info.server_info.version = env!("CARGO_PKG_VERSION").to_string();
        info.capabilities = ServerCapabilities::builder().enable_tools().build();
        info
    }
}
