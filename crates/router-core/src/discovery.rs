//! Discovery fast-path (spec §4.3).
//!
//! Recognizes help/search/describe intents and answers without calling the
//! planner. This is the only path guaranteed to work with no network
//! access, since it never touches the `Planner` capability.

use crate::plan::{ModelPlan, PlanStep};
use crate::tool::ToolSource;
use regex::Regex;
use serde_json::json;
use std::sync::LazyLock;

const DEFAULT_SEARCH_LIMIT: i64 = 20;

static HELP_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^\s*(help|tools|list tools)\s*$").expect("static regex"));
static DESCRIBE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^\s*describe[_ ]tool\s+(\S+)\s*$").expect("static regex"));
static SEARCH_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^\s*search[_ ]tools\s+(.+?)\s*$").expect("static regex"));
static AVAILABLE_FOR_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)which tools (?:are )?available (?:for|to) (.+?)\??\s*$").expect("static regex")
});

/// The plan plus an optional canned human answer the fast-path produced.
#[derive(Debug, Clone)]
pub struct FastPathMatch {
    pub plan: ModelPlan,
    pub answer: Option<String>,
}

fn search_tools_step(query: &str) -> PlanStep {
    PlanStep {
        name: "search_tools".to_string(),
        source: ToolSource::Local,
        args: json!({
            "query": query,
            "format": "text",
            "limit": DEFAULT_SEARCH_LIMIT,
        }),
        reason: Some("discovery fast-path".to_string()),
        parallel_group: None,
    }
}

fn describe_tool_step(name: &str) -> PlanStep {
    PlanStep {
        name: "describe_tool".to_string(),
        source: ToolSource::Local,
        args: json!({"name": name}),
        reason: Some("discovery fast-path".to_string()),
        parallel_group: None,
    }
}

/// Try to answer `input` without invoking the planner. Returns `None` if
/// nothing matches, in which case the caller should fall through to the
/// planner adapter.
pub fn try_fast_path(input: &str) -> Option<FastPathMatch> {
    if HELP_RE.is_match(input) {
        return Some(FastPathMatch {
            plan: ModelPlan::new(vec![search_tools_step("")], false),
            answer: Some("Here are the available tools.".to_string()),
        });
    }

    if let Some(caps) = DESCRIBE_RE.captures(input) {
        let name = caps[1].to_string();
        return Some(FastPathMatch {
            plan: ModelPlan::new(vec![describe_tool_step(&name)], false),
            answer: None,
        });
    }

    if let Some(caps) = SEARCH_RE.captures(input) {
        let query = caps[1].to_string();
        return Some(FastPathMatch {
            plan: ModelPlan::new(vec![search_tools_step(&query)], false),
            answer: None,
        });
    }

    if let Some(caps) = AVAILABLE_FOR_RE.captures(input) {
        let query = caps[1].to_string();
        return Some(FastPathMatch {
            plan: ModelPlan::new(vec![search_tools_step(&query)], false),
            answer: None,
        });
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn matches_search_tools_literal() {
        let m = try_fast_path("search tools grafana").expect("should match");
        assert_eq!(m.plan.steps.len(), 1);
        assert_eq!(m.plan.steps[0].name, "search_tools");
        assert_eq!(
            m.plan.steps[0].args,
            json!({"query": "grafana", "format": "text", "limit": 20})
        );
    }

    #[test]
    fn matches_help_literal() {
        let m = try_fast_path("help").expect("should match");
        assert_eq!(m.plan.steps[0].name, "search_tools");
        assert!(m.answer.is_some());
    }

    #[test]
    fn matches_describe_tool() {
        let m = try_fast_path("describe_tool jira_get_issue").expect("should match");
        assert_eq!(m.plan.steps[0].name, "describe_tool");
        assert_eq!(m.plan.steps[0].args, json!({"name": "jira_get_issue"}));
    }

    #[test]
    fn matches_natural_language_query() {
        let m = try_fast_path("which tools are available for grafana dashboards?")
            .expect("should match");
        assert_eq!(m.plan.steps[0].name, "search_tools");
        assert_eq!(m.plan.steps[0].args["query"], json!("grafana dashboards"));
    }

    #[test]
    fn does_not_match_unrelated_input() {
        assert!(try_fast_path("Summarize https://github.com/acme/widget/pull/42").is_none());
    }
}
