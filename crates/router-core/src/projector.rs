//! Context projector (spec §4.6).
//!
//! A post-validation pass: for every plan step whose name carries a known
//! domain prefix, fill missing argument fields from the extracted context.
//! Two rules keep this from ever overriding what the caller (or the
//! planner) explicitly asked for:
//!   - a field is only filled when absent, empty-string, or zero;
//!   - an explicit `base_url` always wins over an injected one.
//! Client alias injection additionally skips any step that already carries
//! a `client` or an explicit `base_url`, since both signal the caller
//! picked a specific upstream target already.

use crate::context::PlanningContext;
use crate::plan::{ModelPlan, PlanStep};
use serde_json::Value;

fn is_missing(args: &serde_json::Map<String, Value>, key: &str) -> bool {
    match args.get(key) {
        None => true,
        Some(Value::Null) => true,
        Some(Value::String(s)) => s.is_empty(),
        Some(Value::Number(n)) => n.as_i64() == Some(0) || n.as_u64() == Some(0),
        Some(_) => false,
    }
}

fn fill(args: &mut serde_json::Map<String, Value>, key: &str, value: Option<Value>) {
    if let Some(value) = value {
        if is_missing(args, key) {
            args.insert(key.to_string(), value);
        }
    }
}

/// Apply context projection to every step in `plan`, in place.
pub fn project(plan: &mut ModelPlan, context: &PlanningContext) {
    for step in &mut plan.steps {
        project_step(step, context);
    }
}

fn project_step(step: &mut PlanStep, context: &PlanningContext) {
    let Value::Object(args) = &mut step.args else {
        return;
    };

    if step.name.starts_with("get_pull_request")
        || step.name.starts_with("list_pull_request")
        || step.name.starts_with("fetch_complete_pr")
        || step.name.starts_with("prepare_pull_request")
        || step.name.starts_with("github_")
    {
        fill(args, "repo", context.github_repo.clone().map(Value::from));
        fill(
            args,
            "number",
            context.github_pr_number.map(Value::from),
        );
    }

    if step.name.starts_with("jira_") {
        fill(
            args,
            "issue_key",
            context.jira_issue_key.clone().map(Value::from),
        );
        project_client(args, context.jira_client.clone());
    }

    if step.name.starts_with("confluence_") {
        fill(
            args,
            "page_id",
            context.confluence_page_id.clone().map(Value::from),
        );
        project_client(args, context.confluence_client.clone());
    }

    if step.name.starts_with("grafana_") {
        // explicit base_url always wins, so we only ever fill when absent.
        fill(
            args,
            "base_url",
            context.grafana_base_url.clone().map(Value::from),
        );
        fill(
            args,
            "uid",
            context.grafana_dashboard_uid.clone().map(Value::from),
        );
        fill(args, "org_id", context.grafana_org_id.map(Value::from));
        project_client(args, context.grafana_client.clone());
    }
}

fn project_client(args: &mut serde_json::Map<String, Value>, alias: Option<String>) {
    let has_client = args.get("client").is_some_and(|v| !matches!(v, Value::Null));
    let has_explicit_base_url = args
        .get("base_url")
        .is_some_and(|v| matches!(v, Value::String(s) if !s.is_empty()));
    if has_client || has_explicit_base_url {
        return;
    }
    if let Some(alias) = alias {
        args.insert("client".to_string(), Value::from(alias));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tool::ToolSource;
    use serde_json::json;

    fn plan_with(name: &str, args: Value) -> ModelPlan {
        ModelPlan::new(
            vec![PlanStep {
                name: name.to_string(),
                source: ToolSource::Local,
                args,
                reason: None,
                parallel_group: None,
            }],
            false,
        )
    }

    #[test]
    fn fills_github_pr_fields_from_context() {
        let mut plan = plan_with("get_pull_request_details", json!({}));
        let ctx = PlanningContext {
            github_repo: Some("acme/widget".to_string()),
            github_pr_number: Some(42),
            ..Default::default()
        };
        project(&mut plan, &ctx);
        assert_eq!(plan.steps[0].args, json!({"repo": "acme/widget", "number": 42}));
    }

    #[test]
    fn explicit_base_url_wins_over_injection() {
        let mut plan = plan_with(
            "grafana_get_dashboard",
            json!({"base_url": "https://explicit.example.com"}),
        );
        let ctx = PlanningContext {
            grafana_base_url: Some("https://extracted.example.com".to_string()),
            ..Default::default()
        };
        project(&mut plan, &ctx);
        assert_eq!(
            plan.steps[0].args["base_url"],
            json!("https://explicit.example.com")
        );
    }

    #[test]
    fn client_alias_skips_when_client_already_set() {
        let mut plan = plan_with("jira_get_issue", json!({"client": "explicit"}));
        let ctx = PlanningContext {
            jira_client: Some("extracted".to_string()),
            ..Default::default()
        };
        project(&mut plan, &ctx);
        assert_eq!(plan.steps[0].args["client"], json!("explicit"));
    }
}
