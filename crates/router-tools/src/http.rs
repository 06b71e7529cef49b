//! Shared REST plumbing for the Jira/Confluence/Grafana/GitHub handlers.
//!
//! Deliberately thin: spec §1 treats the individual upstream integration
//! handlers as external collaborators consumed through a uniform call
//! contract, not a component this repo needs a full REST client library
//! for. Every handler funnels through `get_json`/`post_json` so auth and
//! error shaping stay in one place.

use router_core::HandlerError;
use serde_json::Value;

pub(crate) enum Auth<'a> {
    None,
    Bearer(&'a str),
    Basic { user: &'a str, pass: &'a str },
}

pub(crate) async fn get_json(client: &reqwest::Client, url: &str, auth: Auth<'_>) -> Result<Value, HandlerError> {
    let mut request = client.get(url);
    request = apply_auth(request, auth);
    send(request).await
}

pub(crate) async fn get_text(client: &reqwest::Client, url: &str, auth: Auth<'_>) -> Result<String, HandlerError> {
    let mut request = client.get(url);
    request = apply_auth(request, auth);
    let response = request
        .send()
        .await
        .map_err(|err| HandlerError::Upstream(err.to_string()))?;
    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    if !status.is_success() {
        return Err(HandlerError::Upstream(format!("HTTP {status}: {body}")));
    }
    Ok(body)
}

pub(crate) async fn post_json(
    client: &reqwest::Client,
    url: &str,
    auth: Auth<'_>,
    body: &Value,
) -> Result<Value, HandlerError> {
    let mut request = client.post(url).json(body);
    request = apply_auth(request, auth);
    send(request).await
}

fn apply_auth(request: reqwest::RequestBuilder, auth: Auth<'_>) -> reqwest::RequestBuilder {
    match auth {
        Auth::None => request,
        Auth::Bearer(token) => request.bearer_auth(token),
        Auth::Basic { user, pass } => request.basic_auth(user, Some(pass)),
    }
}

async fn send(request: reqwest::RequestBuilder) -> Result<Value, HandlerError> {
    let response = request
        .send()
        .await
        .map_err(|err| HandlerError::Upstream(err.to_string()))?;

    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(HandlerError::Upstream(format!("HTTP {status}: {body}")));
    }

    response
        .json::<Value>()
        .await
        .map_err(|err| HandlerError::Upstream(format!("unparseable response: {err}")))
}

/// Resolve `(base_url, auth)` for a client-aliased domain (Jira/Confluence/
/// Grafana). `args.client` picks an entry out of the alias map loaded by
/// `router-config`; falls back to a `"default"` entry when absent.
pub(crate) fn resolve_client<'a>(
    aliases: &'a std::collections::HashMap<String, Value>,
    args: &Value,
) -> Result<(&'a str, Option<&'a str>), HandlerError> {
    let alias_name = args.get("client").and_then(Value::as_str).unwrap_or("default");
    let entry = aliases
        .get(alias_name)
        .ok_or_else(|| HandlerError::InvalidArgs(format!("unknown client alias: {alias_name}")))?;

    let base_url = entry
        .get("base_url")
        .and_then(Value::as_str)
        .ok_or_else(|| HandlerError::InvalidArgs(format!("client alias '{alias_name}' missing base_url")))?;
    let token = entry.get("token").and_then(Value::as_str);
    Ok((base_url, token))
}

pub(crate) fn require_str<'a>(args: &'a Value, key: &str) -> Result<&'a str, HandlerError> {
    args.get(key)
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| HandlerError::InvalidArgs(format!("missing required field: {key}")))
}

pub(crate) fn optional_i64(args: &Value, key: &str, default: i64) -> i64 {
    args.get(key).and_then(Value::as_i64).unwrap_or(default)
}
