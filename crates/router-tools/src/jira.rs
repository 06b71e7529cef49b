//! Jira read and write tools (spec §6.3). Write tools exist in the catalog
//! but are blocked by the default policy (spec §3) — they are still
//! implemented here because policy is enforced upstream, in
//! `router-core::policy`, not by omitting the handler.

use std::collections::HashMap;

use router_core::{HandlerError, ToolResult};
use serde_json::{Value, json};

use crate::http::{self, Auth, optional_i64, require_str, resolve_client};

fn auth(token: Option<&str>) -> Auth<'_> {
    match token {
        Some(t) => Auth::Bearer(t),
        None => Auth::None,
    }
}

pub(crate) async fn get_myself(
    client: &reqwest::Client,
    aliases: &HashMap<String, Value>,
    args: &Value,
) -> Result<ToolResult, HandlerError> {
    let (base_url, token) = resolve_client(aliases, args)?;
    let url = format!("{base_url}/rest/api/2/myself");
    let body = http::get_json(client, &url, auth(token)).await?;
    Ok(ToolResult::ok(body.to_string()))
}

pub(crate) async fn get_issue(
    client: &reqwest::Client,
    aliases: &HashMap<String, Value>,
    args: &Value,
) -> Result<ToolResult, HandlerError> {
    let (base_url, token) = resolve_client(aliases, args)?;
    let issue_key = require_str(args, "issue_key")?;
    let url = format!("{base_url}/rest/api/2/issue/{issue_key}");
    let body = http::get_json(client, &url, auth(token)).await?;
    Ok(ToolResult::ok(body.to_string()))
}

pub(crate) async fn get_issue_bundle(
    client: &reqwest::Client,
    aliases: &HashMap<String, Value>,
    args: &Value,
) -> Result<ToolResult, HandlerError> {
    let (base_url, token) = resolve_client(aliases, args)?;
    let issue_key = require_str(args, "issue_key")?;
    let issue_url = format!("{base_url}/rest/api/2/issue/{issue_key}");
    let comments_url = format!("{base_url}/rest/api/2/issue/{issue_key}/comment");
    let transitions_url = format!("{base_url}/rest/api/2/issue/{issue_key}/transitions");

    let issue = http::get_json(client, &issue_url, auth(token)).await?;
    let comments = http::get_json(client, &comments_url, auth(token)).await?;
    let transitions = http::get_json(client, &transitions_url, auth(token)).await?;

    Ok(ToolResult::ok(
        json!({"issue": issue, "comments": comments, "transitions": transitions}).to_string(),
    ))
}

pub(crate) async fn search_issues(
    client: &reqwest::Client,
    aliases: &HashMap<String, Value>,
    args: &Value,
) -> Result<ToolResult, HandlerError> {
    let (base_url, token) = resolve_client(aliases, args)?;
    let jql = require_str(args, "jql")?;
    let start_at = optional_i64(args, "startAt", 0);
    let max_results = optional_i64(args, "maxResults", 50);
    let url = format!(
        "{base_url}/rest/api/2/search?jql={}&startAt={start_at}&maxResults={max_results}",
        urlencoding::encode(jql)
    );
    let body = http::get_json(client, &url, auth(token)).await?;
    Ok(ToolResult::ok(body.to_string()))
}

pub(crate) async fn get_issue_comments(
    client: &reqwest::Client,
    aliases: &HashMap<String, Value>,
    args: &Value,
) -> Result<ToolResult, HandlerError> {
    let (base_url, token) = resolve_client(aliases, args)?;
    let issue_key = require_str(args, "issue_key")?;
    let url = format!("{base_url}/rest/api/2/issue/{issue_key}/comment");
    let body = http::get_json(client, &url, auth(token)).await?;
    Ok(ToolResult::ok(body.to_string()))
}

pub(crate) async fn get_issue_transitions(
    client: &reqwest::Client,
    aliases: &HashMap<String, Value>,
    args: &Value,
) -> Result<ToolResult, HandlerError> {
    let (base_url, token) = resolve_client(aliases, args)?;
    let issue_key = require_str(args, "issue_key")?;
    let url = format!("{base_url}/rest/api/2/issue/{issue_key}/transitions");
    let body = http::get_json(client, &url, auth(token)).await?;
    Ok(ToolResult::ok(body.to_string()))
}

pub(crate) async fn list_projects(
    client: &reqwest::Client,
    aliases: &HashMap<String, Value>,
    args: &Value,
) -> Result<ToolResult, HandlerError> {
    let (base_url, token) = resolve_client(aliases, args)?;
    let url = format!("{base_url}/rest/api/2/project");
    let body = http::get_json(client, &url, auth(token)).await?;
    Ok(ToolResult::ok(json!({"projects": body}).to_string()))
}

pub(crate) async fn export_tasks(
    client: &reqwest::Client,
    aliases: &HashMap<String, Value>,
    args: &Value,
) -> Result<ToolResult, HandlerError> {
    let (base_url, token) = resolve_client(aliases, args)?;
    let jql = args.get("jql").and_then(Value::as_str).unwrap_or("issuetype = Task");
    let url = format!("{base_url}/rest/api/2/search?jql={}", urlencoding::encode(jql));
    let body = http::get_json(client, &url, auth(token)).await?;
    let issues = body.get("issues").cloned().unwrap_or_else(|| json!([]));
    Ok(ToolResult::ok(json!({"tasks": issues}).to_string()))
}

pub(crate) async fn add_comment(
    client: &reqwest::Client,
    aliases: &HashMap<String, Value>,
    args: &Value,
) -> Result<ToolResult, HandlerError> {
    let (base_url, token) = resolve_client(aliases, args)?;
    let issue_key = require_str(args, "issue_key")?;
    let body_text = require_str(args, "body")?;
    let url = format!("{base_url}/rest/api/2/issue/{issue_key}/comment");
    let response = http::post_json(client, &url, auth(token), &json!({"body": body_text})).await?;
    Ok(ToolResult::ok(response.to_string()))
}

pub(crate) async fn transition_issue(
    client: &reqwest::Client,
    aliases: &HashMap<String, Value>,
    args: &Value,
) -> Result<ToolResult, HandlerError> {
    let (base_url, token) = resolve_client(aliases, args)?;
    let issue_key = require_str(args, "issue_key")?;
    let transition_id = require_str(args, "transition_id")?;
    let url = format!("{base_url}/rest/api/2/issue/{issue_key}/transitions");
    let response = http::post_json(
        client,
        &url,
        auth(token),
        &json!({"transition": {"id": transition_id}}),
    )
    .await?;
    Ok(ToolResult::ok(response.to_string()))
}

pub(crate) async fn create_issue(
    client: &reqwest::Client,
    aliases: &HashMap<String, Value>,
    args: &Value,
) -> Result<ToolResult, HandlerError> {
    let (base_url, token) = resolve_client(aliases, args)?;
    let fields = args
        .get("fields")
        .cloned()
        .ok_or_else(|| HandlerError::InvalidArgs("missing required field: fields".to_string()))?;
    let url = format!("{base_url}/rest/api/2/issue");
    let response = http::post_json(client, &url, auth(token), &json!({"fields": fields})).await?;
    Ok(ToolResult::ok(response.to_string()))
}

pub(crate) async fn update_issue(
    client: &reqwest::Client,
    aliases: &HashMap<String, Value>,
    args: &Value,
) -> Result<ToolResult, HandlerError> {
    let (base_url, token) = resolve_client(aliases, args)?;
    let issue_key = require_str(args, "issue_key")?;
    let fields = args
        .get("fields")
        .cloned()
        .ok_or_else(|| HandlerError::InvalidArgs("missing required field: fields".to_string()))?;
    let url = format!("{base_url}/rest/api/2/issue/{issue_key}");
    let response = http::post_json(client, &url, auth(token), &json!({"fields": fields})).await?;
    Ok(ToolResult::ok(response.to_string()))
}

pub(crate) async fn add_attachment(
    client: &reqwest::Client,
    aliases: &HashMap<String, Value>,
    args: &Value,
) -> Result<ToolResult, HandlerError> {
    let (base_url, token) = resolve_client(aliases, args)?;
    let issue_key = require_str(args, "issue_key")?;
    let file_path = require_str(args, "path")?;
    let url = format!("{base_url}/rest/api/2/issue/{issue_key}/attachments");
    let response = http::post_json(client, &url, auth(token), &json!({"path": file_path})).await?;
    Ok(ToolResult::ok(response.to_string()))
}

