//! Concrete `LocalToolHandlers` for the full built-in tool surface
//! (spec §6.3, SPEC_FULL.md §10). No transport or planning logic lives
//! here — this crate only answers `catalog()`/`call()` for `router-core`.

mod artifacts;
mod confluence;
mod github;
mod grafana;
mod http;
mod jira;
mod meta;

use std::sync::Arc;

use async_trait::async_trait;
use router_core::{ArtifactStore, CatalogItem, HandlerError, LocalToolHandlers, ToolResult, ToolSource};
use router_config::RouterConfig;
use serde_json::{Value, json};

pub struct RouterLocalTools {
    config: Arc<RouterConfig>,
    artifacts: Arc<ArtifactStore>,
    http: reqwest::Client,
    catalog: Vec<CatalogItem>,
}

impl RouterLocalTools {
    pub fn new(config: Arc<RouterConfig>, artifacts: Arc<ArtifactStore>) -> Self {
        Self {
            catalog: build_catalog(config.dev_mode),
            config,
            artifacts,
            http: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl LocalToolHandlers for RouterLocalTools {
    fn catalog(&self) -> Vec<CatalogItem> {
        self.catalog.clone()
    }

    async fn call(&self, name: &str, args: Value) -> Result<ToolResult, HandlerError> {
        let token = self.config.github_token.as_deref();
        match name {
            "search_tools" => meta::search_tools(&self.catalog, &args),
            "describe_tool" => meta::describe_tool(&self.catalog, &args),
            "execute_tool" => {
                let inner_name = args
                    .get("name")
                    .and_then(Value::as_str)
                    .ok_or_else(|| HandlerError::InvalidArgs("missing required field: name".to_string()))?
                    .to_string();
                if inner_name == "execute_tool" {
                    return Err(HandlerError::InvalidArgs("execute_tool cannot target itself".to_string()));
                }
                let inner_args = args.get("args").cloned().unwrap_or_else(|| json!({}));
                self.call(&inner_name, inner_args).await
            }

            "get_pull_request_details" => github::get_pull_request_details(&self.http, token, &args).await,
            "list_pull_request_files" => github::list_pull_request_files(&self.http, token, &args).await,
            "get_pull_request_diff" => github::get_pull_request_diff(&self.http, token, &args).await,
            "get_pull_request_summary" => github::get_pull_request_summary(&self.http, token, &args).await,
            "get_pull_request_file_diff" => github::get_pull_request_file_diff(&self.http, token, &args).await,
            "list_pull_request_commits" => github::list_pull_request_commits(&self.http, token, &args).await,
            "get_pull_request_checks" => github::get_pull_request_checks(&self.http, token, &args).await,
            "get_file_at_ref" => github::get_file_at_ref(&self.http, token, &args).await,
            "prepare_pull_request_review_bundle" => {
                github::prepare_pull_request_review_bundle(&self.http, token, &args).await
            }
            "fetch_complete_pr_diff" => github::fetch_complete_pr_diff(&self.http, token, &args).await,
            "fetch_complete_pr_files" => github::fetch_complete_pr_files(&self.http, token, &args).await,

            "github_list_workflow_runs" => github::list_workflow_runs(&self.http, token, &args).await,
            "github_list_workflow_jobs" => github::list_workflow_jobs(&self.http, token, &args).await,
            "github_download_job_logs" => github::download_job_logs(&self.http, token, &args).await,

            "jira_get_myself" => jira::get_myself(&self.http, &self.config.jira_aliases, &args).await,
            "jira_get_issue" => jira::get_issue(&self.http, &self.config.jira_aliases, &args).await,
            "jira_get_issue_bundle" => jira::get_issue_bundle(&self.http, &self.config.jira_aliases, &args).await,
            "jira_search_issues" => jira::search_issues(&self.http, &self.config.jira_aliases, &args).await,
            "jira_get_issue_comments" => jira::get_issue_comments(&self.http, &self.config.jira_aliases, &args).await,
            "jira_get_issue_transitions" => {
                jira::get_issue_transitions(&self.http, &self.config.jira_aliases, &args).await
            }
            "jira_list_projects" => jira::list_projects(&self.http, &self.config.jira_aliases, &args).await,
            "jira_export_tasks" => jira::export_tasks(&self.http, &self.config.jira_aliases, &args).await,
            "jira_add_comment" => jira::add_comment(&self.http, &self.config.jira_aliases, &args).await,
            "jira_transition_issue" => jira::transition_issue(&self.http, &self.config.jira_aliases, &args).await,
            "jira_create_issue" => jira::create_issue(&self.http, &self.config.jira_aliases, &args).await,
            "jira_update_issue" => jira::update_issue(&self.http, &self.config.jira_aliases, &args).await,
            "jira_add_attachment" => jira::add_attachment(&self.http, &self.config.jira_aliases, &args).await,

            "confluence_list_spaces" => confluence::list_spaces(&self.http, &self.config.confluence_aliases, &args).await,
            "confluence_get_page" => confluence::get_page(&self.http, &self.config.confluence_aliases, &args).await,
            "confluence_get_page_by_title" => {
                confluence::get_page_by_title(&self.http, &self.config.confluence_aliases, &args).await
            }
            "confluence_search_cql" => confluence::search_cql(&self.http, &self.config.confluence_aliases, &args).await,
            "confluence_get_page_children" => {
                confluence::get_page_children(&self.http, &self.config.confluence_aliases, &args).await
            }
            "confluence_list_page_attachments" => {
                confluence::list_page_attachments(&self.http, &self.config.confluence_aliases, &args).await
            }
            "confluence_download_attachment" => {
                confluence::download_attachment(&self.http, &self.config.confluence_aliases, &args).await
            }
            "confluence_xhtml_to_text" => confluence::xhtml_to_text(&args),

            "grafana_health" => grafana::health(&self.http, &self.config.grafana_aliases, &args).await,
            "grafana_get_current_user" => grafana::get_current_user(&self.http, &self.config.grafana_aliases, &args).await,
            "grafana_search" => grafana::search(&self.http, &self.config.grafana_aliases, &args).await,
            "grafana_get_dashboard" => grafana::get_dashboard(&self.http, &self.config.grafana_aliases, &args).await,
            "grafana_get_dashboard_summary" => {
                grafana::get_dashboard_summary(&self.http, &self.config.grafana_aliases, &args).await
            }
            "grafana_list_folders" => grafana::list_folders(&self.http, &self.config.grafana_aliases, &args).await,
            "grafana_get_folder" => grafana::get_folder(&self.http, &self.config.grafana_aliases, &args).await,
            "grafana_list_datasources" => grafana::list_datasources(&self.http, &self.config.grafana_aliases, &args).await,
            "grafana_get_datasource" => grafana::get_datasource(&self.http, &self.config.grafana_aliases, &args).await,
            "grafana_query_annotations" => {
                grafana::query_annotations(&self.http, &self.config.grafana_aliases, &args).await
            }
            "grafana_list_annotation_tags" => {
                grafana::list_annotation_tags(&self.http, &self.config.grafana_aliases, &args).await
            }
            "grafana_list_alerts" => grafana::list_alerts(&self.http, &self.config.grafana_aliases, &args).await,
            "grafana_get_alert" => grafana::get_alert(&self.http, &self.config.grafana_aliases, &args).await,
            "grafana_list_alert_rules" => grafana::list_alert_rules(&self.http, &self.config.grafana_aliases, &args).await,
            "grafana_get_alert_rule" => grafana::get_alert_rule(&self.http, &self.config.grafana_aliases, &args).await,

            "artifact_save_text" => artifacts::save_text(&self.artifacts, &args),
            "artifact_append_text" => artifacts::append_text(&self.artifacts, &args),
            "artifact_list" => artifacts::list(&self.artifacts, &args),
            "artifact_search" => artifacts::search(&self.artifacts, &args),

            _ => Err(HandlerError::NotFound(name.to_string())),
        }
    }
}

fn schema(properties: &[&str], required: &[&str]) -> Value {
    let props: serde_json::Map<String, Value> = properties
        .iter()
        .map(|name| ((*name).to_string(), json!({"type": ["string", "number", "boolean", "object"]})))
        .collect();
    json!({
        "type": "object",
        "properties": Value::Object(props),
        "required": required,
    })
}

fn item(name: &str, description: &str, category: &str, properties: &[&str], required: &[&str]) -> CatalogItem {
    CatalogItem {
        name: name.to_string(),
        description: description.to_string(),
        category: category.to_string(),
        source: ToolSource::Local,
        input_schema: schema(properties, required),
    }
}

fn build_catalog(dev_mode: bool) -> Vec<CatalogItem> {
    let mut items = vec![
        item("search_tools", "Search the tool catalog by keyword", "meta", &["query", "format", "limit"], &[]),
        item("describe_tool", "Describe a single tool's schema", "meta", &["name"], &["name"]),
        item(
            "execute_tool",
            "Invoke another local tool by name, bypassing the planner",
            "meta",
            &["name", "args"],
            &["name"],
        ),
        item(
            "get_pull_request_details",
            "Fetch a GitHub pull request's metadata",
            "github_pr",
            &["repo", "number"],
            &["repo", "number"],
        ),
        item(
            "list_pull_request_files",
            "List files changed in a pull request (one page)",
            "github_pr",
            &["repo", "number", "page"],
            &["repo", "number"],
        ),
        item(
            "get_pull_request_diff",
            "Fetch a pull request's unified diff",
            "github_pr",
            &["repo", "number"],
            &["repo", "number"],
        ),
        item(
            "get_pull_request_summary",
            "Fetch a compact summary of a pull request",
            "github_pr",
            &["repo", "number"],
            &["repo", "number"],
        ),
        item(
            "get_pull_request_file_diff",
            "Fetch the diff for a single file within a pull request",
            "github_pr",
            &["repo", "number", "path"],
            &["repo", "number", "path"],
        ),
        item(
            "list_pull_request_commits",
            "List commits on a pull request",
            "github_pr",
            &["repo", "number"],
            &["repo", "number"],
        ),
        item(
            "get_pull_request_checks",
            "Fetch check-run status for a pull request's head commit",
            "github_pr",
            &["repo", "number"],
            &["repo", "number"],
        ),
        item(
            "get_file_at_ref",
            "Fetch a file's contents at a given git ref",
            "github_pr",
            &["repo", "path", "ref"],
            &["repo", "path", "ref"],
        ),
        item(
            "prepare_pull_request_review_bundle",
            "Bundle PR details, files and commits into one review package",
            "github_pr",
            &["repo", "number"],
            &["repo", "number"],
        ),
        item(
            "fetch_complete_pr_diff",
            "Fetch a pull request's unified diff (continuation-aware alias)",
            "github_pr",
            &["repo", "number"],
            &["repo", "number"],
        ),
        item(
            "fetch_complete_pr_files",
            "List files changed in a pull request, paginated via auto-continuation",
            "github_pr",
            &["repo", "number", "page"],
            &["repo", "number"],
        ),
        item(
            "github_list_workflow_runs",
            "List GitHub Actions workflow runs for a repo",
            "github_actions",
            &["repo", "page"],
            &["repo"],
        ),
        item(
            "github_list_workflow_jobs",
            "List jobs for a GitHub Actions workflow run",
            "github_actions",
            &["repo", "run_id"],
            &["repo", "run_id"],
        ),
        item(
            "github_download_job_logs",
            "Download the raw log text for a workflow job",
            "github_actions",
            &["repo", "job_id"],
            &["repo", "job_id"],
        ),
        item("jira_get_myself", "Fetch the authenticated Jira user", "jira_read", &["client"], &[]),
        item("jira_get_issue", "Fetch a single Jira issue", "jira_read", &["issue_key", "client"], &["issue_key"]),
        item(
            "jira_get_issue_bundle",
            "Fetch an issue plus its comments and available transitions",
            "jira_read",
            &["issue_key", "client"],
            &["issue_key"],
        ),
        item(
            "jira_search_issues",
            "Search Jira issues with JQL",
            "jira_read",
            &["jql", "startAt", "maxResults", "client"],
            &["jql"],
        ),
        item(
            "jira_get_issue_comments",
            "List comments on a Jira issue",
            "jira_read",
            &["issue_key", "client"],
            &["issue_key"],
        ),
        item(
            "jira_get_issue_transitions",
            "List available transitions for a Jira issue",
            "jira_read",
            &["issue_key", "client"],
            &["issue_key"],
        ),
        item("jira_list_projects", "List Jira projects", "jira_read", &["client"], &[]),
        item(
            "jira_export_tasks",
            "Export Jira tasks matching a JQL filter",
            "jira_read",
            &["jql", "client"],
            &[],
        ),
        item(
            "jira_add_comment",
            "Add a comment to a Jira issue",
            "jira_write",
            &["issue_key", "body", "client"],
            &["issue_key", "body"],
        ),
        item(
            "jira_transition_issue",
            "Transition a Jira issue to a new status",
            "jira_write",
            &["issue_key", "transition_id", "client"],
            &["issue_key", "transition_id"],
        ),
        item(
            "jira_create_issue",
            "Create a new Jira issue",
            "jira_write",
            &["fields", "client"],
            &["fields"],
        ),
        item(
            "jira_update_issue",
            "Update fields on an existing Jira issue",
            "jira_write",
            &["issue_key", "fields", "client"],
            &["issue_key", "fields"],
        ),
        item(
            "jira_add_attachment",
            "Attach a file to a Jira issue",
            "jira_write",
            &["issue_key", "path", "client"],
            &["issue_key", "path"],
        ),
        item("confluence_list_spaces", "List Confluence spaces", "confluence", &["client"], &[]),
        item(
            "confluence_get_page",
            "Fetch a Confluence page by id",
            "confluence",
            &["page_id", "client"],
            &["page_id"],
        ),
        item(
            "confluence_get_page_by_title",
            "Fetch a Confluence page by space and title",
            "confluence",
            &["space_key", "title", "client"],
            &["space_key", "title"],
        ),
        item(
            "confluence_search_cql",
            "Search Confluence content with CQL",
            "confluence",
            &["cql", "start", "limit", "client"],
            &["cql"],
        ),
        item(
            "confluence_get_page_children",
            "List child pages of a Confluence page",
            "confluence",
            &["page_id", "client"],
            &["page_id"],
        ),
        item(
            "confluence_list_page_attachments",
            "List attachments on a Confluence page",
            "confluence",
            &["page_id", "client"],
            &["page_id"],
        ),
        item(
            "confluence_download_attachment",
            "Download a Confluence attachment's raw bytes",
            "confluence",
            &["download_path", "client"],
            &["download_path"],
        ),
        item(
            "confluence_xhtml_to_text",
            "Strip Confluence storage-format XHTML down to plain text",
            "confluence",
            &["xhtml"],
            &["xhtml"],
        ),
        item("grafana_health", "Fetch Grafana health status", "grafana", &["base_url", "client"], &[]),
        item(
            "grafana_get_current_user",
            "Fetch the authenticated Grafana user",
            "grafana",
            &["base_url", "client"],
            &[],
        ),
        item(
            "grafana_search",
            "Search Grafana dashboards and folders",
            "grafana",
            &["query", "base_url", "client"],
            &[],
        ),
        item(
            "grafana_get_dashboard",
            "Fetch a Grafana dashboard by uid",
            "grafana",
            &["uid", "base_url", "org_id", "client"],
            &["uid"],
        ),
        item(
            "grafana_get_dashboard_summary",
            "Fetch a compact summary of a Grafana dashboard",
            "grafana",
            &["uid", "base_url", "org_id", "client"],
            &["uid"],
        ),
        item("grafana_list_folders", "List Grafana folders", "grafana", &["base_url", "client"], &[]),
        item(
            "grafana_get_folder",
            "Fetch a Grafana folder by uid",
            "grafana",
            &["uid", "base_url", "client"],
            &["uid"],
        ),
        item(
            "grafana_list_datasources",
            "List Grafana datasources",
            "grafana",
            &["base_url", "client"],
            &[],
        ),
        item(
            "grafana_get_datasource",
            "Fetch a Grafana datasource by uid",
            "grafana",
            &["uid", "base_url", "client"],
            &["uid"],
        ),
        item(
            "grafana_query_annotations",
            "Query Grafana annotations",
            "grafana",
            &["dashboard_uid", "base_url", "client"],
            &[],
        ),
        item(
            "grafana_list_annotation_tags",
            "List Grafana annotation tags",
            "grafana",
            &["base_url", "client"],
            &[],
        ),
        item("grafana_list_alerts", "List legacy Grafana alerts", "grafana", &["base_url", "client"], &[]),
        item(
            "grafana_get_alert",
            "Fetch a legacy Grafana alert by id",
            "grafana",
            &["id", "base_url", "client"],
            &["id"],
        ),
        item(
            "grafana_list_alert_rules",
            "List unified Grafana alert rules",
            "grafana",
            &["base_url", "client"],
            &[],
        ),
        item(
            "grafana_get_alert_rule",
            "Fetch a unified Grafana alert rule by uid",
            "grafana",
            &["uid", "base_url", "client"],
            &["uid"],
        ),
        item(
            "artifact_save_text",
            "Save a text blob to the artifact store",
            "artifacts",
            &["text", "mime", "ext"],
            &["text"],
        ),
        item(
            "artifact_append_text",
            "Append text to an existing artifact, producing a new version",
            "artifacts",
            &["id", "text"],
            &["id", "text"],
        ),
        item("artifact_list", "List all artifacts created this process lifetime", "artifacts", &[], &[]),
        item("artifact_search", "Search artifacts by tool/mime/id substring", "artifacts", &["query"], &[]),
    ];

    if dev_mode {
        items.push(item(
            "_dev_catalog_marker",
            "Present only when ROUTER_DEV_MODE is enabled; marks dev-mode catalogs in tests",
            "meta",
            &[],
            &[],
        ));
    }

    items
}

#[cfg(test)]
mod tests {
    use super::*;
    use router_config::RouterConfig;

    fn tools() -> RouterLocalTools {
        let config = RouterConfig::default();
        let dir = tempfile::tempdir().unwrap();
        let artifacts = ArtifactStore::init_from_env(dir.path().to_path_buf(), 1024).unwrap();
        RouterLocalTools::new(Arc::new(config), Arc::new(artifacts))
    }

    #[test]
    fn catalog_never_contains_reserved_names() {
        let tools = tools();
        assert!(tools.catalog().iter().all(|item| item.name != "query" && item.name != "router"));
    }

    #[test]
    fn catalog_excludes_dev_marker_by_default() {
        let tools = tools();
        assert!(tools.catalog().iter().all(|item| item.name != "_dev_catalog_marker"));
    }

    #[tokio::test]
    async fn describe_tool_finds_known_tool() {
        let tools = tools();
        let result = tools.call("describe_tool", json!({"name": "jira_get_issue"})).await.unwrap();
        assert!(!result.is_error);
        assert!(result.content_text.contains("jira_get_issue"));
    }

    #[tokio::test]
    async fn describe_tool_errors_on_unknown_name() {
        let tools = tools();
        let result = tools.call("describe_tool", json!({"name": "nope"})).await;
        assert!(matches!(result, Err(HandlerError::NotFound(_))));
    }

    #[tokio::test]
    async fn unknown_tool_name_is_not_found() {
        let tools = tools();
        let result = tools.call("not_a_real_tool", json!({})).await;
        assert!(matches!(result, Err(HandlerError::NotFound(_))));
    }

    #[tokio::test]
    async fn artifact_round_trips_through_save_and_list() {
        let tools = tools();
        let saved = tools.call("artifact_save_text", json!({"text": "hello"})).await.unwrap();
        assert!(!saved.is_error);
        let listed = tools.call("artifact_list", json!({})).await.unwrap();
        assert!(listed.content_text.contains("hello") || listed.content_text.contains("artifacts"));
    }

    #[tokio::test]
    async fn confluence_xhtml_to_text_strips_tags() {
        let tools = tools();
        let result = tools
            .call("confluence_xhtml_to_text", json!({"xhtml": "<p>Hello <b>World</b></p>"}))
            .await
            .unwrap();
        assert_eq!(result.content_text, json!({"text": "Hello World"}).to_string());
    }

    #[tokio::test]
    async fn execute_tool_dispatches_to_named_tool() {
        let tools = tools();
        let result = tools
            .call("execute_tool", json!({"name": "describe_tool", "args": {"name": "jira_get_issue"}}))
            .await
            .unwrap();
        assert!(result.content_text.contains("jira_get_issue"));
    }
}
