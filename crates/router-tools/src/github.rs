//! GitHub PR read-only tools and Actions tools (spec §6.3).
//!
//! `repo`/`number` are filled by `router-core`'s context projector whenever
//! the input string carries a `github.com/.../pull/<n>` URL; handlers here
//! only require them to already be present in `args`.

use router_core::{HandlerError, ToolResult};
use serde_json::{Value, json};

use crate::http::{self, Auth, require_str};

const API_BASE: &str = "https://api.github.com";

fn auth(token: Option<&str>) -> Auth<'_> {
    match token {
        Some(t) => Auth::Bearer(t),
        None => Auth::None,
    }
}

fn repo_and_number(args: &Value) -> Result<(String, i64), HandlerError> {
    let repo = require_str(args, "repo")?.to_string();
    let number = args
        .get("number")
        .and_then(Value::as_i64)
        .ok_or_else(|| HandlerError::InvalidArgs("missing required field: number".to_string()))?;
    Ok((repo, number))
}

pub(crate) async fn get_pull_request_details(
    client: &reqwest::Client,
    token: Option<&str>,
    args: &Value,
) -> Result<ToolResult, HandlerError> {
    let (repo, number) = repo_and_number(args)?;
    let url = format!("{API_BASE}/repos/{repo}/pulls/{number}");
    let body = http::get_json(client, &url, auth(token)).await?;
    Ok(ToolResult::ok(body.to_string()))
}

pub(crate) async fn list_pull_request_files(
    client: &reqwest::Client,
    token: Option<&str>,
    args: &Value,
) -> Result<ToolResult, HandlerError> {
    let (repo, number) = repo_and_number(args)?;
    let page = http::optional_i64(args, "page", 1);
    let url = format!("{API_BASE}/repos/{repo}/pulls/{number}/files?page={page}&per_page=100");
    let body = http::get_json(client, &url, auth(token)).await?;
    let files = body.as_array().cloned().unwrap_or_default();
    let has_next = files.len() == 100;
    Ok(ToolResult::ok(
        json!({"files": files, "has_next": has_next, "next_page": page + 1}).to_string(),
    ))
}

pub(crate) async fn fetch_complete_pr_files(
    client: &reqwest::Client,
    token: Option<&str>,
    args: &Value,
) -> Result<ToolResult, HandlerError> {
    list_pull_request_files(client, token, args).await
}

pub(crate) async fn get_pull_request_diff(
    client: &reqwest::Client,
    token: Option<&str>,
    args: &Value,
) -> Result<ToolResult, HandlerError> {
    let (repo, number) = repo_and_number(args)?;
    let url = format!("{API_BASE}/repos/{repo}/pulls/{number}");
    let mut request = client.get(&url).header("Accept", "application/vnd.github.v3.diff");
    request = match token {
        Some(t) => request.bearer_auth(t),
        None => request,
    };
    let response = request.send().await.map_err(|err| HandlerError::Upstream(err.to_string()))?;
    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    if !status.is_success() {
        return Err(HandlerError::Upstream(format!("HTTP {status}: {body}")));
    }
    Ok(ToolResult::ok(body))
}

pub(crate) async fn fetch_complete_pr_diff(
    client: &reqwest::Client,
    token: Option<&str>,
    args: &Value,
) -> Result<ToolResult, HandlerError> {
    get_pull_request_diff(client, token, args).await
}

pub(crate) async fn get_pull_request_summary(
    client: &reqwest::Client,
    token: Option<&str>,
    args: &Value,
) -> Result<ToolResult, HandlerError> {
    let (repo, number) = repo_and_number(args)?;
    let url = format!("{API_BASE}/repos/{repo}/pulls/{number}");
    let pr = http::get_json(client, &url, auth(token)).await?;
    Ok(ToolResult::ok(
        json!({
            "title": pr.get("title"),
            "state": pr.get("state"),
            "additions": pr.get("additions"),
            "deletions": pr.get("deletions"),
            "changed_files": pr.get("changed_files"),
            "mergeable": pr.get("mergeable"),
        })
        .to_string(),
    ))
}

pub(crate) async fn get_pull_request_file_diff(
    client: &reqwest::Client,
    token: Option<&str>,
    args: &Value,
) -> Result<ToolResult, HandlerError> {
    let (repo, number) = repo_and_number(args)?;
    let path = require_str(args, "path")?;
    let url = format!("{API_BASE}/repos/{repo}/pulls/{number}/files?per_page=100");
    let body = http::get_json(client, &url, auth(token)).await?;
    let files = body.as_array().cloned().unwrap_or_default();
    match files.into_iter().find(|f| f.get("filename").and_then(Value::as_str) == Some(path)) {
        Some(file) => Ok(ToolResult::ok(file.to_string())),
        None => Err(HandlerError::NotFound(format!("file not in PR diff: {path}"))),
    }
}

pub(crate) async fn list_pull_request_commits(
    client: &reqwest::Client,
    token: Option<&str>,
    args: &Value,
) -> Result<ToolResult, HandlerError> {
    let (repo, number) = repo_and_number(args)?;
    let url = format!("{API_BASE}/repos/{repo}/pulls/{number}/commits?per_page=100");
    let body = http::get_json(client, &url, auth(token)).await?;
    Ok(ToolResult::ok(json!({"commits": body}).to_string()))
}

pub(crate) async fn get_pull_request_checks(
    client: &reqwest::Client,
    token: Option<&str>,
    args: &Value,
) -> Result<ToolResult, HandlerError> {
    let (repo, number) = repo_and_number(args)?;
    let pr_url = format!("{API_BASE}/repos/{repo}/pulls/{number}");
    let pr = http::get_json(client, &pr_url, auth(token)).await?;
    let sha = pr
        .get("head")
        .and_then(|h| h.get("sha"))
        .and_then(Value::as_str)
        .ok_or_else(|| HandlerError::Upstream("pull request has no head sha".to_string()))?;
    let checks_url = format!("{API_BASE}/repos/{repo}/commits/{sha}/check-runs");
    let body = http::get_json(client, &checks_url, auth(token)).await?;
    Ok(ToolResult::ok(body.to_string()))
}

pub(crate) async fn get_file_at_ref(
    client: &reqwest::Client,
    token: Option<&str>,
    args: &Value,
) -> Result<ToolResult, HandlerError> {
    let repo = require_str(args, "repo")?;
    let path = require_str(args, "path")?;
    let git_ref = require_str(args, "ref")?;
    let url = format!("{API_BASE}/repos/{repo}/contents/{path}?ref={git_ref}");
    let body = http::get_json(client, &url, auth(token)).await?;
    Ok(ToolResult::ok(body.to_string()))
}

pub(crate) async fn prepare_pull_request_review_bundle(
    client: &reqwest::Client,
    token: Option<&str>,
    args: &Value,
) -> Result<ToolResult, HandlerError> {
    let (repo, number) = repo_and_number(args)?;
    let details_url = format!("{API_BASE}/repos/{repo}/pulls/{number}");
    let files_url = format!("{API_BASE}/repos/{repo}/pulls/{number}/files?per_page=100");
    let commits_url = format!("{API_BASE}/repos/{repo}/pulls/{number}/commits?per_page=100");

    let details = http::get_json(client, &details_url, auth(token)).await?;
    let files = http::get_json(client, &files_url, auth(token)).await?;
    let commits = http::get_json(client, &commits_url, auth(token)).await?;

    Ok(ToolResult::ok(
        json!({"pull_request": details, "files": files, "commits": commits}).to_string(),
    ))
}

pub(crate) async fn list_workflow_runs(
    client: &reqwest::Client,
    token: Option<&str>,
    args: &Value,
) -> Result<ToolResult, HandlerError> {
    let repo = require_str(args, "repo")?;
    let page = http::optional_i64(args, "page", 1);
    let url = format!("{API_BASE}/repos/{repo}/actions/runs?page={page}&per_page=30");
    let body = http::get_json(client, &url, auth(token)).await?;
    Ok(ToolResult::ok(body.to_string()))
}

pub(crate) async fn list_workflow_jobs(
    client: &reqwest::Client,
    token: Option<&str>,
    args: &Value,
) -> Result<ToolResult, HandlerError> {
    let repo = require_str(args, "repo")?;
    let run_id = args
        .get("run_id")
        .and_then(Value::as_i64)
        .ok_or_else(|| HandlerError::InvalidArgs("missing required field: run_id".to_string()))?;
    let url = format!("{API_BASE}/repos/{repo}/actions/runs/{run_id}/jobs");
    let body = http::get_json(client, &url, auth(token)).await?;
    Ok(ToolResult::ok(body.to_string()))
}

pub(crate) async fn download_job_logs(
    client: &reqwest::Client,
    token: Option<&str>,
    args: &Value,
) -> Result<ToolResult, HandlerError> {
    let repo = require_str(args, "repo")?;
    let job_id = args
        .get("job_id")
        .and_then(Value::as_i64)
        .ok_or_else(|| HandlerError::InvalidArgs("missing required field: job_id".to_string()))?;
    let url = format!("{API_BASE}/repos/{repo}/actions/jobs/{job_id}/logs");
    let text = http::get_text(client, &url, auth(token)).await?;
    Ok(ToolResult::ok(text))
}
