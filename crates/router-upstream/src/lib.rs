//! `UpstreamRegistry`/`UpstreamExecutor` backed by MCP servers spawned over
//! stdio (SPEC_FULL.md §10.2, §12).
//!
//! One [`ManagedServer`] per configured [`UpstreamServerSpec`] owns the
//! child process and the `rmcp` session to it, respawning with backoff on
//! failure. `activate` is how a server's tools enter the active set; the
//! entry point never calls it automatically, matching spec §4.3's
//! discovery fast-path, which only ever touches the local catalog.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use router_config::UpstreamServerSpec;
use router_core::{HandlerError, ToolResult, UpstreamExecutor, UpstreamRegistry, UpstreamTool};
use rmcp::model::{CallToolRequestParam, CallToolResult, Tool};
use rmcp::service::{RunningService, ServiceExt};
use rmcp::RoleClient;
use serde_json::Value;
use thiserror::Error;
use tokio::process::Command;
use tokio::sync::{Mutex, RwLock};

const RESTART_BACKOFF_INITIAL_MS: u64 = 100;
const RESTART_BACKOFF_MAX_MS: u64 = 30_000;
const SHUTDOWN_GRACE_SECS: u64 = 3;
const DISPATCH_ATTEMPTS: usize = 3;

#[derive(Debug, Error)]
pub enum UpstreamError {
    #[error("unknown upstream server: {0}")]
    UnknownServer(String),
    #[error("failed to spawn upstream server '{server}': {source}")]
    SpawnFailed { server: String, source: String },
    #[error("upstream server '{0}' did not respond in time")]
    Timeout(String),
    #[error("upstream call cancelled: {0}")]
    Cancelled(String),
    #[error("upstream MCP error from '{server}': {source}")]
    Mcp { server: String, source: String },
}

impl From<UpstreamError> for HandlerError {
    fn from(err: UpstreamError) -> Self {
        match err {
            UpstreamError::UnknownServer(name) => HandlerError::NotFound(name),
            UpstreamError::Cancelled(reason) => HandlerError::Cancelled(reason),
            other => HandlerError::Upstream(other.to_string()),
        }
    }
}

/// `rmcp::model::Tool` carries its schema under a field whose exact
/// serde name/visibility we don't vendor locally, so we round-trip
/// through JSON rather than rely on struct field access.
fn tool_to_upstream_tool(tool: &Tool) -> UpstreamTool {
    let value = serde_json::to_value(tool).unwrap_or(Value::Null);
    let name = value
        .get("name")
        .and_then(Value::as_str)
        .map(str::to_string)
        .unwrap_or_else(|| tool.name.to_string());
    let description = value
        .get("description")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();
    let input_schema = value
        .get("inputSchema")
        .cloned()
        .or_else(|| value.get("input_schema").cloned())
        .unwrap_or_else(|| serde_json::json!({"type": "object", "properties": {}}));
    UpstreamTool {
        name,
        description,
        input_schema,
    }
}

fn call_result_to_tool_result(result: CallToolResult) -> ToolResult {
    let text = result
        .content
        .iter()
        .filter_map(|c| c.as_text().map(|t| t.text.to_string()))
        .collect::<Vec<_>>()
        .join("\n");
    let text = if text.is_empty() { "(empty result)".to_string() } else { text };
    ToolResult {
        content_text: text,
        is_error: result.is_error.unwrap_or(false),
    }
}

enum BackendTransport {
    Stdio {
        service: RunningService<RoleClient, ()>,
        child: Box<tokio::process::Child>,
    },
}

impl BackendTransport {
    fn service(&self) -> &RunningService<RoleClient, ()> {
        match self {
            Self::Stdio { service, .. } => service,
        }
    }

    async fn spawn(spec: &UpstreamServerSpec) -> Result<Self, UpstreamError> {
        let mut cmd = Command::new(&spec.command);
        cmd.args(&spec.args);
        for (key, value) in &spec.env {
            cmd.env(key, value);
        }
        cmd.stdin(std::process::Stdio::piped());
        cmd.stdout(std::process::Stdio::piped());
        cmd.stderr(std::process::Stdio::piped());
        cmd.kill_on_drop(true);

        let mut child = cmd.spawn().map_err(|err| UpstreamError::SpawnFailed {
            server: spec.name.clone(),
            source: err.to_string(),
        })?;

        let stdout = child.stdout.take().ok_or_else(|| UpstreamError::SpawnFailed {
            server: spec.name.clone(),
            source: "child stdout not captured".to_string(),
        })?;
        let stdin = child.stdin.take().ok_or_else(|| UpstreamError::SpawnFailed {
            server: spec.name.clone(),
            source: "child stdin not captured".to_string(),
        })?;
        if let Some(mut stderr) = child.stderr.take() {
            tokio::spawn(async move {
                let mut sink = tokio::io::sink();
                let _ = tokio::io::copy(&mut stderr, &mut sink).await;
            });
        }

        let service = ().serve((stdout, stdin)).await.map_err(|err| UpstreamError::SpawnFailed {
            server: spec.name.clone(),
            source: err.to_string(),
        })?;

        Ok(Self::Stdio {
            service,
            child: Box::new(child),
        })
    }

    async fn shutdown(self) {
        match self {
            Self::Stdio { service, mut child } => {
                let _ = service.cancel().await;
                match tokio::time::timeout(Duration::from_secs(SHUTDOWN_GRACE_SECS), child.wait()).await {
                    Ok(Ok(_)) => {}
                    Ok(Err(error)) => tracing::debug!(error = %error, "failed to wait upstream child process"),
                    Err(_) => {
                        let _ = child.kill().await;
                    }
                }
            }
        }
    }
}

struct ManagedServer {
    spec: UpstreamServerSpec,
    transport: Option<BackendTransport>,
    restart_backoff: Duration,
}

impl ManagedServer {
    fn new(spec: UpstreamServerSpec) -> Self {
        Self {
            spec,
            transport: None,
            restart_backoff: Duration::from_millis(RESTART_BACKOFF_INITIAL_MS),
        }
    }

    async fn ensure_running(&mut self) -> Result<(), UpstreamError> {
        if self.transport.is_some() {
            return Ok(());
        }
        self.transport = Some(BackendTransport::spawn(&self.spec).await?);
        Ok(())
    }

    async fn restart_after_failure(&mut self) {
        if let Some(transport) = self.transport.take() {
            transport.shutdown().await;
        }
        tokio::time::sleep(self.restart_backoff).await;
        self.restart_backoff = (self.restart_backoff * 2).min(Duration::from_millis(RESTART_BACKOFF_MAX_MS));
    }

    async fn list_tools(&mut self) -> Result<Vec<Tool>, UpstreamError> {
        let mut last_err = None;
        for _ in 0..DISPATCH_ATTEMPTS {
            if let Err(error) = self.ensure_running().await {
                tracing::warn!(server = %self.spec.name, error = %error, "upstream spawn/list_tools failed, restarting");
                last_err = Some(error);
                self.restart_after_failure().await;
                continue;
            }
            let transport = self.transport.as_ref().expect("ensured above");
            match transport.service().list_tools(None).await {
                Ok(response) => {
                    self.restart_backoff = Duration::from_millis(RESTART_BACKOFF_INITIAL_MS);
                    return Ok(response.tools);
                }
                Err(error) => {
                    tracing::warn!(server = %self.spec.name, error = %error, "upstream list_tools failed, restarting");
                    last_err = Some(UpstreamError::Mcp {
                        server: self.spec.name.clone(),
                        source: error.to_string(),
                    });
                    self.restart_after_failure().await;
                }
            }
        }
        Err(last_err.unwrap_or_else(|| UpstreamError::Mcp {
            server: self.spec.name.clone(),
            source: "list_tools failed without explicit error".to_string(),
        }))
    }

    async fn call_tool(&mut self, request: CallToolRequestParam) -> Result<CallToolResult, UpstreamError> {
        let mut last_err = None;
        for _ in 0..DISPATCH_ATTEMPTS {
            if let Err(error) = self.ensure_running().await {
                tracing::warn!(server = %self.spec.name, error = %error, "upstream spawn/call_tool failed, restarting");
                last_err = Some(error);
                self.restart_after_failure().await;
                continue;
            }
            let transport = self.transport.as_ref().expect("ensured above");
            match transport.service().call_tool(request.clone()).await {
                Ok(response) => {
                    self.restart_backoff = Duration::from_millis(RESTART_BACKOFF_INITIAL_MS);
                    return Ok(response);
                }
                Err(error) => {
                    tracing::warn!(server = %self.spec.name, error = %error, "upstream call_tool failed, restarting");
                    last_err = Some(UpstreamError::Mcp {
                        server: self.spec.name.clone(),
                        source: error.to_string(),
                    });
                    self.restart_after_failure().await;
                }
            }
        }
        Err(last_err.unwrap_or_else(|| UpstreamError::Mcp {
            server: self.spec.name.clone(),
            source: "call_tool failed without explicit error".to_string(),
        }))
    }

    async fn shutdown(&mut self) {
        if let Some(transport) = self.transport.take() {
            transport.shutdown().await;
        }
    }
}

/// Registry/executor over every configured upstream MCP server.
///
/// `activate(server_name)` spawns (or reuses) that server and refreshes its
/// tools in the active set; `get`/`list_active` read by tool name against
/// that set, and `invoke` routes a tool call to the server that last
/// reported owning it.
pub struct StdioUpstreamRegistry {
    servers: HashMap<String, Mutex<ManagedServer>>,
    active_tools: RwLock<HashMap<String, UpstreamTool>>,
    tool_owner: RwLock<HashMap<String, String>>,
}

impl StdioUpstreamRegistry {
    pub fn new(specs: Vec<UpstreamServerSpec>) -> Self {
        let servers = specs
            .into_iter()
            .map(|spec| (spec.name.clone(), Mutex::new(ManagedServer::new(spec))))
            .collect();
        Self {
            servers,
            active_tools: RwLock::new(HashMap::new()),
            tool_owner: RwLock::new(HashMap::new()),
        }
    }

    pub fn server_names(&self) -> Vec<String> {
        self.servers.keys().cloned().collect()
    }

    pub async fn shutdown_all(&self) {
        for server in self.servers.values() {
            server.lock().await.shutdown().await;
        }
    }
}

#[async_trait]
impl UpstreamRegistry for StdioUpstreamRegistry {
    async fn list_active(&self) -> Vec<UpstreamTool> {
        self.active_tools.read().await.values().cloned().collect()
    }

    async fn get(&self, name: &str) -> Option<UpstreamTool> {
        self.active_tools.read().await.get(name).cloned()
    }

    async fn activate(&self, name: &str) -> Result<(), HandlerError> {
        let server = self
            .servers
            .get(name)
            .ok_or_else(|| UpstreamError::UnknownServer(name.to_string()))?;

        let tools = server.lock().await.list_tools().await?;

        let mut active_tools = self.active_tools.write().await;
        let mut tool_owner = self.tool_owner.write().await;
        for tool in &tools {
            let upstream_tool = tool_to_upstream_tool(tool);
            tool_owner.insert(upstream_tool.name.clone(), name.to_string());
            active_tools.insert(upstream_tool.name.clone(), upstream_tool);
        }
        Ok(())
    }
}

#[async_trait]
impl UpstreamExecutor for StdioUpstreamRegistry {
    async fn invoke(&self, name: &str, args: Value) -> Result<ToolResult, HandlerError> {
        let server_name = self
            .tool_owner
            .read()
            .await
            .get(name)
            .cloned()
            .ok_or_else(|| UpstreamError::UnknownServer(name.to_string()))?;

        let server = self
            .servers
            .get(&server_name)
            .ok_or_else(|| UpstreamError::UnknownServer(server_name.clone()))?;

        let arguments = args.as_object().cloned();
        let request = CallToolRequestParam {
            name: name.to_string().into(),
            arguments,
        };

        let result = server.lock().await.call_tool(request).await?;
        Ok(call_result_to_tool_result(result))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::os::unix::fs::PermissionsExt;

    fn write_mock_server(dir: &std::path::Path) -> std::path::PathBuf {
        let path = dir.join("mock-mcp.sh");
        fs::write(
            &path,
            r#"#!/bin/sh
while IFS= read -r line; do
  id=$(printf '%s\n' "$line" | sed -n 's/.*"id"[ ]*:[ ]*\([^,}]*\).*/\1/p')
  case "$line" in
    *\"initialize\"*)
      printf '{"jsonrpc":"2.0","id":%s,"result":{"protocolVersion":"2024-11-05","capabilities":{"tools":{}},"serverInfo":{"name":"mock","version":"0.1.0"}}}\n' "$id"
      ;;
    *\"notifications/initialized\"*)
      ;;
    *\"tools/list\"*)
      printf '{"jsonrpc":"2.0","id":%s,"result":{"tools":[{"name":"echo_tool","description":"echo","inputSchema":{"type":"object","properties":{}}}]}}\n' "$id"
      ;;
    *\"tools/call\"*)
      printf '{"jsonrpc":"2.0","id":%s,"result":{"content":[{"type":"text","text":"pong"}]}}\n' "$id"
      ;;
    *)
      printf '{"jsonrpc":"2.0","id":%s,"result":{}}\n' "$id"
      ;;
  esac
done
"#,
        )
        .expect("write mock script");
        let mut perms = fs::metadata(&path).unwrap().permissions();
        perms.set_mode(0o755);
        fs::set_permissions(&path, perms).unwrap();
        path
    }

    fn spec(script: &std::path::Path, name: &str) -> UpstreamServerSpec {
        UpstreamServerSpec {
            name: name.to_string(),
            command: "sh".to_string(),
            args: vec![script.to_string_lossy().into_owned()],
            env: HashMap::new(),
        }
    }

    #[tokio::test]
    async fn activate_populates_tools_from_the_spawned_server() {
        let dir = tempfile::tempdir().unwrap();
        let script = write_mock_server(dir.path());
        let registry = StdioUpstreamRegistry::new(vec![spec(&script, "mock")]);

        registry.activate("mock").await.unwrap();

        let tools = registry.list_active().await;
        assert_eq!(tools.len(), 1);
        assert_eq!(tools[0].name, "echo_tool");
        assert_eq!(registry.get("echo_tool").await.unwrap().name, "echo_tool");

        registry.shutdown_all().await;
    }

    #[tokio::test]
    async fn activate_unknown_server_is_not_found() {
        let registry = StdioUpstreamRegistry::new(vec![]);
        let err = registry.activate("missing").await.unwrap_err();
        assert!(matches!(err, HandlerError::NotFound(_)));
    }

    #[tokio::test]
    async fn invoke_routes_to_the_owning_server_and_extracts_text() {
        let dir = tempfile::tempdir().unwrap();
        let script = write_mock_server(dir.path());
        let registry = StdioUpstreamRegistry::new(vec![spec(&script, "mock")]);
        registry.activate("mock").await.unwrap();

        let result = registry.invoke("echo_tool", serde_json::json!({"value": "hi"})).await.unwrap();
        assert_eq!(result.content_text, "pong");
        assert!(!result.is_error);

        registry.shutdown_all().await;
    }

    #[tokio::test]
    async fn invoke_unknown_tool_is_not_found() {
        let registry = StdioUpstreamRegistry::new(vec![]);
        let err = registry.invoke("nope", serde_json::json!({})).await.unwrap_err();
        assert!(matches!(err, HandlerError::NotFound(_)));
    }
}
