//! Artifact tools: `artifact_save_text`, `artifact_append_text`,
//! `artifact_list`, `artifact_search` (spec §6.3).
//!
//! These share the same process-wide `ArtifactStore` the executor uses for
//! auto-offload (spec §4.8), so `artifact_list` also surfaces artifacts the
//! executor offloaded without an explicit save call.

use router_core::{ArtifactStore, HandlerError, ToolResult};
use serde_json::{Value, json};

use crate::http::require_str;

fn item_json(item: &router_core::ArtifactItem) -> Value {
    json!({
        "id": item.id,
        "path": item.path.to_string_lossy(),
        "bytes": item.bytes,
        "mime": item.mime,
        "sha256": item.sha256,
        "tool": item.tool,
        "created_at": item.created_at.to_rfc3339(),
    })
}

pub(crate) fn save_text(store: &ArtifactStore, args: &Value) -> Result<ToolResult, HandlerError> {
    let text = require_str(args, "text")?;
    let mime = args.get("mime").and_then(Value::as_str).unwrap_or("text/plain");
    let ext = args.get("ext").and_then(Value::as_str).unwrap_or("txt");

    let (reference, item) = store
        .store("artifact_save_text", args, mime, ext, text.as_bytes())
        .map_err(|err| HandlerError::Upstream(err.to_string()))?;

    Ok(ToolResult::ok(
        json!({"artifact": reference.artifact, "item": item_json(&item)}).to_string(),
    ))
}

pub(crate) fn append_text(store: &ArtifactStore, args: &Value) -> Result<ToolResult, HandlerError> {
    let id = require_str(args, "id")?;
    let text = require_str(args, "text")?;

    let (existing_bytes, mime) = store
        .read(id)
        .map_err(|err| HandlerError::NotFound(err.to_string()))?;
    let mut content = String::from_utf8(existing_bytes).unwrap_or_default();
    content.push_str(text);

    let append_args = json!({"parent": id, "text": text});
    let (reference, item) = store
        .store("artifact_append_text", &append_args, &mime, "txt", content.as_bytes())
        .map_err(|err| HandlerError::Upstream(err.to_string()))?;

    Ok(ToolResult::ok(
        json!({"artifact": reference.artifact, "item": item_json(&item)}).to_string(),
    ))
}

pub(crate) fn list(store: &ArtifactStore, _args: &Value) -> Result<ToolResult, HandlerError> {
    let items: Vec<Value> = store.list().iter().map(item_json).collect();
    Ok(ToolResult::ok(json!({"artifacts": items}).to_string()))
}

pub(crate) fn search(store: &ArtifactStore, args: &Value) -> Result<ToolResult, HandlerError> {
    let query = args.get("query").and_then(Value::as_str).unwrap_or("").to_lowercase();
    let items: Vec<Value> = store
        .list()
        .into_iter()
        .filter(|item| {
            query.is_empty()
                || item.tool.to_lowercase().contains(&query)
                || item.mime.to_lowercase().contains(&query)
                || item.id.to_lowercase().contains(&query)
        })
        .map(|item| item_json(&item))
        .collect();
    Ok(ToolResult::ok(json!({"artifacts": items}).to_string()))
}
