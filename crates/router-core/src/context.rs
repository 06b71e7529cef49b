//! Deterministic context/prefix extractor (spec §4.2).
//!
//! Pure, regex-driven, never fails. Extracted values are additive: callers
//! merge them into an explicitly-provided context without ever overwriting
//! a key the caller already set (spec §8 "context injection monotonicity").

use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::sync::LazyLock;

static GITHUB_PR_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"github\.com/([\w.-]+)/([\w.-]+)/pull/(\d+)").expect("static regex")
});
static JIRA_KEY_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b([A-Z][A-Z0-9]+-[0-9]+)\b").expect("static regex"));
static CONFLUENCE_PAGE_PATH_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"/pages/(\d+)").expect("static regex"));
static CONFLUENCE_PAGE_QUERY_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[?&]pageId=(\d+)").expect("static regex"));
static GRAFANA_DASHBOARD_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(https?://[^/\s]+)/d/([\w-]+)(?:/[^\s?]*)?").expect("static regex"));
static GRAFANA_ORG_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[?&]orgId=(\d+)").expect("static regex"));
static CLIENT_PREFIX_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^(jira|confluence|grafana)\s+(\S+)\s*(.*)$").expect("static regex"));

/// Typed view over the entities a single input can carry. Every field is
/// optional; the extractor never fails, it only fills in what it finds.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct PlanningContext {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub github_repo: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub github_pr_number: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub jira_issue_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confluence_page_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub grafana_base_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub grafana_dashboard_uid: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub grafana_org_id: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub jira_client: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confluence_client: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub grafana_client: Option<String>,
}

/// Result of running the extractor over one input string: the typed
/// context plus the input with any leading `<domain> <alias>` prefix
/// stripped, ready to forward to the planner.
#[derive(Debug, Clone, PartialEq)]
pub struct ExtractedContext {
    pub context: PlanningContext,
    pub forwarded_input: String,
}

/// Entry point for spec §4.2.
pub fn extract(input: &str) -> ExtractedContext {
    let mut ctx = PlanningContext::default();
    let mut forwarded_input = input.to_string();

    if let Some(caps) = CLIENT_PREFIX_RE.captures(input) {
        let domain = caps.get(1).expect("group 1").as_str().to_lowercase();
        let alias = caps.get(2).expect("group 2").as_str().to_string();
        let rest = caps.get(3).map(|m| m.as_str()).unwrap_or("").to_string();
        match domain.as_str() {
            "jira" => ctx.jira_client = Some(alias),
            "confluence" => ctx.confluence_client = Some(alias),
            "grafana" => ctx.grafana_client = Some(alias),
            _ => {}
        }
        forwarded_input = rest;
    }

    if let Some(caps) = GITHUB_PR_RE.captures(input) {
        let owner = &caps[1];
        let repo = &caps[2];
        ctx.github_repo = Some(format!("{owner}/{repo}"));
        ctx.github_pr_number = caps[3].parse::<i64>().ok();
    }

    if let Some(caps) = JIRA_KEY_RE.captures(input) {
        ctx.jira_issue_key = Some(caps[1].to_string());
    }

    if let Some(caps) = CONFLUENCE_PAGE_PATH_RE
        .captures(input)
        .or_else(|| CONFLUENCE_PAGE_QUERY_RE.captures(input))
    {
        ctx.confluence_page_id = Some(caps[1].to_string());
    }

    if let Some(caps) = GRAFANA_DASHBOARD_RE.captures(input) {
        ctx.grafana_base_url = Some(caps[1].to_string());
        ctx.grafana_dashboard_uid = Some(caps[2].to_string());
        if let Some(org_caps) = GRAFANA_ORG_RE.captures(input) {
            ctx.grafana_org_id = org_caps[1].parse::<i64>().ok();
        }
    }

    ExtractedContext {
        context: ctx,
        forwarded_input,
    }
}

impl PlanningContext {
    /// Flatten into the `map<string, value>` shape spec §4.2 describes,
    /// skipping absent fields.
    pub fn to_map(&self) -> Map<String, Value> {
        let mut map = Map::new();
        macro_rules! put {
            ($field:expr, $key:literal) => {
                if let Some(v) = &$field {
                    map.insert($key.to_string(), Value::from(v.clone()));
                }
            };
        }
        put!(self.github_repo, "github_repo");
        put!(self.github_pr_number, "github_pr_number");
        put!(self.jira_issue_key, "jira_issue_key");
        put!(self.confluence_page_id, "confluence_page_id");
        put!(self.grafana_base_url, "grafana_base_url");
        put!(self.grafana_dashboard_uid, "grafana_dashboard_uid");
        put!(self.grafana_org_id, "grafana_org_id");
        put!(self.jira_client, "jira_client");
        put!(self.confluence_client, "confluence_client");
        put!(self.grafana_client, "grafana_client");
        map
    }

    /// Merge extracted fields into a caller-supplied context object.
    /// Never overwrites an already-present key (monotonicity, spec §8).
    pub fn merge_into(&self, caller_context: &mut Map<String, Value>) {
        for (key, value) in self.to_map() {
            caller_context.entry(key).or_insert(value);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_github_pr() {
        let out = extract("Summarize https://github.com/acme/widget/pull/42");
        assert_eq!(out.context.github_repo.as_deref(), Some("acme/widget"));
        assert_eq!(out.context.github_pr_number, Some(42));
    }

    #[test]
    fn extracts_jira_key() {
        let out = extract("what's the status of PROJ-123?");
        assert_eq!(out.context.jira_issue_key.as_deref(), Some("PROJ-123"));
    }

    #[test]
    fn extracts_confluence_page_from_path() {
        let out = extract("see https://wiki.example.com/pages/998877/Design");
        assert_eq!(out.context.confluence_page_id.as_deref(), Some("998877"));
    }

    #[test]
    fn extracts_confluence_page_from_query() {
        let out = extract("see https://wiki.example.com/view.action?pageId=55");
        assert_eq!(out.context.confluence_page_id.as_deref(), Some("55"));
    }

    #[test]
    fn extracts_grafana_dashboard() {
        let out = extract("https://grafana.example.com/d/abc123/my-dash?orgId=3");
        assert_eq!(
            out.context.grafana_base_url.as_deref(),
            Some("https://grafana.example.com")
        );
        assert_eq!(out.context.grafana_dashboard_uid.as_deref(), Some("abc123"));
        assert_eq!(out.context.grafana_org_id, Some(3));
    }

    #[test]
    fn strips_client_alias_prefix() {
        let out = extract("jira prod-alias find open bugs");
        assert_eq!(out.context.jira_client.as_deref(), Some("prod-alias"));
        assert_eq!(out.forwarded_input, "find open bugs");
    }

    #[test]
    fn merge_never_overwrites_caller_value() {
        let out = extract("PROJ-1");
        let mut caller = Map::new();
        caller.insert("jira_issue_key".to_string(), Value::from("EXPLICIT-9"));
        out.context.merge_into(&mut caller);
        assert_eq!(caller["jira_issue_key"], Value::from("EXPLICIT-9"));
    }
}
