//! Grafana tools (spec §6.3).
//!
//! Grafana dashboard URLs carry their own `base_url`/`uid`/`org_id`, which
//! the context projector fills in directly (spec §4.2/§4.6) — so the client
//! alias map here only ever supplies the auth token, never the base URL,
//! unless the caller never mentioned a URL at all.

use std::collections::HashMap;

use router_core::{HandlerError, ToolResult};
use serde_json::Value;

use crate::http::{self, Auth, require_str};

fn resolve(aliases: &HashMap<String, Value>, args: &Value) -> Result<(String, Option<String>), HandlerError> {
    if let Some(base_url) = args.get("base_url").and_then(Value::as_str) {
        let alias_name = args.get("client").and_then(Value::as_str).unwrap_or("default");
        let token = aliases
            .get(alias_name)
            .and_then(|entry| entry.get("token"))
            .and_then(Value::as_str)
            .map(str::to_string);
        return Ok((base_url.to_string(), token));
    }

    let (base_url, token) = http::resolve_client(aliases, args)?;
    Ok((base_url.to_string(), token.map(str::to_string)))
}

fn auth(token: &Option<String>) -> Auth<'_> {
    match token {
        Some(t) => Auth::Bearer(t),
        None => Auth::None,
    }
}

fn org_query(args: &Value) -> String {
    match args.get("org_id").and_then(Value::as_i64) {
        Some(org_id) => format!("?orgId={org_id}"),
        None => String::new(),
    }
}

pub(crate) async fn health(
    client: &reqwest::Client,
    aliases: &HashMap<String, Value>,
    args: &Value,
) -> Result<ToolResult, HandlerError> {
    let (base_url, token) = resolve(aliases, args)?;
    let url = format!("{base_url}/api/health");
    let body = http::get_json(client, &url, auth(&token)).await?;
    Ok(ToolResult::ok(body.to_string()))
}

pub(crate) async fn get_current_user(
    client: &reqwest::Client,
    aliases: &HashMap<String, Value>,
    args: &Value,
) -> Result<ToolResult, HandlerError> {
    let (base_url, token) = resolve(aliases, args)?;
    let url = format!("{base_url}/api/user");
    let body = http::get_json(client, &url, auth(&token)).await?;
    Ok(ToolResult::ok(body.to_string()))
}

pub(crate) async fn search(
    client: &reqwest::Client,
    aliases: &HashMap<String, Value>,
    args: &Value,
) -> Result<ToolResult, HandlerError> {
    let (base_url, token) = resolve(aliases, args)?;
    let query = args.get("query").and_then(Value::as_str).unwrap_or("");
    let url = format!("{base_url}/api/search?query={query}");
    let body = http::get_json(client, &url, auth(&token)).await?;
    Ok(ToolResult::ok(body.to_string()))
}

pub(crate) async fn get_dashboard(
    client: &reqwest::Client,
    aliases: &HashMap<String, Value>,
    args: &Value,
) -> Result<ToolResult, HandlerError> {
    let (base_url, token) = resolve(aliases, args)?;
    let uid = require_str(args, "uid")?;
    let url = format!("{base_url}/api/dashboards/uid/{uid}{}", org_query(args));
    let body = http::get_json(client, &url, auth(&token)).await?;
    Ok(ToolResult::ok(body.to_string()))
}

pub(crate) async fn get_dashboard_summary(
    client: &reqwest::Client,
    aliases: &HashMap<String, Value>,
    args: &Value,
) -> Result<ToolResult, HandlerError> {
    let (base_url, token) = resolve(aliases, args)?;
    let uid = require_str(args, "uid")?;
    let url = format!("{base_url}/api/dashboards/uid/{uid}{}", org_query(args));
    let body = http::get_json(client, &url, auth(&token)).await?;
    let dashboard = body.get("dashboard").cloned().unwrap_or(Value::Null);
    let panel_count = dashboard
        .get("panels")
        .and_then(Value::as_array)
        .map(Vec::len)
        .unwrap_or(0);
    Ok(ToolResult::ok(
        serde_json::json!({
            "title": dashboard.get("title"),
            "uid": dashboard.get("uid"),
            "panel_count": panel_count,
        })
        .to_string(),
    ))
}

pub(crate) async fn list_folders(
    client: &reqwest::Client,
    aliases: &HashMap<String, Value>,
    args: &Value,
) -> Result<ToolResult, HandlerError> {
    let (base_url, token) = resolve(aliases, args)?;
    let url = format!("{base_url}/api/folders");
    let body = http::get_json(client, &url, auth(&token)).await?;
    Ok(ToolResult::ok(body.to_string()))
}

pub(crate) async fn get_folder(
    client: &reqwest::Client,
    aliases: &HashMap<String, Value>,
    args: &Value,
) -> Result<ToolResult, HandlerError> {
    let (base_url, token) = resolve(aliases, args)?;
    let uid = require_str(args, "uid")?;
    let url = format!("{base_url}/api/folders/{uid}");
    let body = http::get_json(client, &url, auth(&token)).await?;
    Ok(ToolResult::ok(body.to_string()))
}

pub(crate) async fn list_datasources(
    client: &reqwest::Client,
    aliases: &HashMap<String, Value>,
    args: &Value,
) -> Result<ToolResult, HandlerError> {
    let (base_url, token) = resolve(aliases, args)?;
    let url = format!("{base_url}/api/datasources");
    let body = http::get_json(client, &url, auth(&token)).await?;
    Ok(ToolResult::ok(body.to_string()))
}

pub(crate) async fn get_datasource(
    client: &reqwest::Client,
    aliases: &HashMap<String, Value>,
    args: &Value,
) -> Result<ToolResult, HandlerError> {
    let (base_url, token) = resolve(aliases, args)?;
    let uid = require_str(args, "uid")?;
    let url = format!("{base_url}/api/datasources/uid/{uid}");
    let body = http::get_json(client, &url, auth(&token)).await?;
    Ok(ToolResult::ok(body.to_string()))
}

pub(crate) async fn query_annotations(
    client: &reqwest::Client,
    aliases: &HashMap<String, Value>,
    args: &Value,
) -> Result<ToolResult, HandlerError> {
    let (base_url, token) = resolve(aliases, args)?;
    let mut url = format!("{base_url}/api/annotations");
    if let Some(dashboard_uid) = args.get("dashboard_uid").and_then(Value::as_str) {
        url.push_str(&format!("?dashboardUID={dashboard_uid}"));
    }
    let body = http::get_json(client, &url, auth(&token)).await?;
    Ok(ToolResult::ok(body.to_string()))
}

pub(crate) async fn list_annotation_tags(
    client: &reqwest::Client,
    aliases: &HashMap<String, Value>,
    args: &Value,
) -> Result<ToolResult, HandlerError> {
    let (base_url, token) = resolve(aliases, args)?;
    let url = format!("{base_url}/api/annotations/tags");
    let body = http::get_json(client, &url, auth(&token)).await?;
    Ok(ToolResult::ok(body.to_string()))
}

pub(crate) async fn list_alerts(
    client: &reqwest::Client,
    aliases: &HashMap<String, Value>,
    args: &Value,
) -> Result<ToolResult, HandlerError> {
    let (base_url, token) = resolve(aliases, args)?;
    let url = format!("{base_url}/api/alerts");
    let body = http::get_json(client, &url, auth(&token)).await?;
    Ok(ToolResult::ok(body.to_string()))
}

pub(crate) async fn get_alert(
    client: &reqwest::Client,
    aliases: &HashMap<String, Value>,
    args: &Value,
) -> Result<ToolResult, HandlerError> {
    let (base_url, token) = resolve(aliases, args)?;
    let id = args
        .get("id")
        .and_then(Value::as_i64)
        .ok_or_else(|| HandlerError::InvalidArgs("missing required field: id".to_string()))?;
    let url = format!("{base_url}/api/alerts/{id}");
    let body = http::get_json(client, &url, auth(&token)).await?;
    Ok(ToolResult::ok(body.to_string()))
}

pub(crate) async fn list_alert_rules(
    client: &reqwest::Client,
    aliases: &HashMap<String, Value>,
    args: &Value,
) -> Result<ToolResult, HandlerError> {
    let (base_url, token) = resolve(aliases, args)?;
    let url = format!("{base_url}/api/v1/provisioning/alert-rules");
    let body = http::get_json(client, &url, auth(&token)).await?;
    Ok(ToolResult::ok(body.to_string()))
}

pub(crate) async fn get_alert_rule(
    client: &reqwest::Client,
    aliases: &HashMap<String, Value>,
    args: &Value,
) -> Result<ToolResult, HandlerError> {
    let (base_url, token) = resolve(aliases, args)?;
    let uid = require_str(args, "uid")?;
    let url = format!("{base_url}/api/v1/provisioning/alert-rules/{uid}");
    let body = http::get_json(client, &url, auth(&token)).await?;
    Ok(ToolResult::ok(body.to_string()))
}
