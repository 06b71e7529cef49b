//! Confluence tools (spec §6.3).

use std::collections::HashMap;

use router_core::{HandlerError, ToolResult};
use serde_json::{Value, json};

use crate::http::{self, Auth, require_str, resolve_client};

fn auth(token: Option<&str>) -> Auth<'_> {
    match token {
        Some(t) => Auth::Bearer(t),
        None => Auth::None,
    }
}

pub(crate) async fn list_spaces(
    client: &reqwest::Client,
    aliases: &HashMap<String, Value>,
    args: &Value,
) -> Result<ToolResult, HandlerError> {
    let (base_url, token) = resolve_client(aliases, args)?;
    let url = format!("{base_url}/rest/api/space");
    let body = http::get_json(client, &url, auth(token)).await?;
    Ok(ToolResult::ok(body.to_string()))
}

pub(crate) async fn get_page(
    client: &reqwest::Client,
    aliases: &HashMap<String, Value>,
    args: &Value,
) -> Result<ToolResult, HandlerError> {
    let (base_url, token) = resolve_client(aliases, args)?;
    let page_id = require_str(args, "page_id")?;
    let url = format!("{base_url}/rest/api/content/{page_id}?expand=body.storage,version");
    let body = http::get_json(client, &url, auth(token)).await?;
    Ok(ToolResult::ok(body.to_string()))
}

pub(crate) async fn get_page_by_title(
    client: &reqwest::Client,
    aliases: &HashMap<String, Value>,
    args: &Value,
) -> Result<ToolResult, HandlerError> {
    let (base_url, token) = resolve_client(aliases, args)?;
    let space_key = require_str(args, "space_key")?;
    let title = require_str(args, "title")?;
    let url = format!(
        "{base_url}/rest/api/content?spaceKey={space_key}&title={}&expand=body.storage",
        urlencoding::encode(title)
    );
    let body = http::get_json(client, &url, auth(token)).await?;
    Ok(ToolResult::ok(body.to_string()))
}

pub(crate) async fn search_cql(
    client: &reqwest::Client,
    aliases: &HashMap<String, Value>,
    args: &Value,
) -> Result<ToolResult, HandlerError> {
    let (base_url, token) = resolve_client(aliases, args)?;
    let cql = require_str(args, "cql")?;
    let start = args.get("start").and_then(Value::as_i64).unwrap_or(0);
    let limit = args.get("limit").and_then(Value::as_i64).unwrap_or(25);
    let url = format!(
        "{base_url}/rest/api/content/search?cql={}&start={start}&limit={limit}",
        urlencoding::encode(cql)
    );
    let body = http::get_json(client, &url, auth(token)).await?;
    Ok(ToolResult::ok(body.to_string()))
}

pub(crate) async fn get_page_children(
    client: &reqwest::Client,
    aliases: &HashMap<String, Value>,
    args: &Value,
) -> Result<ToolResult, HandlerError> {
    let (base_url, token) = resolve_client(aliases, args)?;
    let page_id = require_str(args, "page_id")?;
    let url = format!("{base_url}/rest/api/content/{page_id}/child/page");
    let body = http::get_json(client, &url, auth(token)).await?;
    Ok(ToolResult::ok(body.to_string()))
}

pub(crate) async fn list_page_attachments(
    client: &reqwest::Client,
    aliases: &HashMap<String, Value>,
    args: &Value,
) -> Result<ToolResult, HandlerError> {
    let (base_url, token) = resolve_client(aliases, args)?;
    let page_id = require_str(args, "page_id")?;
    let url = format!("{base_url}/rest/api/content/{page_id}/child/attachment");
    let body = http::get_json(client, &url, auth(token)).await?;
    Ok(ToolResult::ok(body.to_string()))
}

pub(crate) async fn download_attachment(
    client: &reqwest::Client,
    aliases: &HashMap<String, Value>,
    args: &Value,
) -> Result<ToolResult, HandlerError> {
    let (base_url, token) = resolve_client(aliases, args)?;
    let attachment_path = require_str(args, "download_path")?;
    let url = format!("{base_url}{attachment_path}");
    let text = http::get_text(client, &url, auth(token)).await?;
    Ok(ToolResult::ok(text))
}

/// Strips Confluence storage-format XHTML markup down to plain text. Pure —
/// no network call, unlike the rest of this module.
pub(crate) fn xhtml_to_text(args: &Value) -> Result<ToolResult, HandlerError> {
    let xhtml = require_str(args, "xhtml")?;
    let mut text = String::with_capacity(xhtml.len());
    let mut in_tag = false;
    for c in xhtml.chars() {
        match c {
            '<' => in_tag = true,
            '>' => in_tag = false,
            _ if !in_tag => text.push(c),
            _ => {}
        }
    }
    let collapsed: String = text.split_whitespace().collect::<Vec<_>>().join(" ");
    Ok(ToolResult::ok(json!({"text": collapsed}).to_string()))
}

