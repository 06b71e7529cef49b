//! Assembles the planning-validation-execution engine from its concrete
//! collaborators (SPEC_FULL.md §2's repository-layout table).

use std::sync::Arc;

use anyhow::Context;
use router_config::RouterConfig;
use router_core::{ArtifactStore, Planner, PlannerAdapter, QueryEntrypoint, ReadOnlyPolicy, Summarizer};
use router_llm::{HttpPlanner, HttpSummarizer};
use router_tools::RouterLocalTools;
use router_upstream::StdioUpstreamRegistry;

/// Owns the upstream registry alongside the entrypoint so callers can
/// `shutdown_all` spawned MCP servers on process exit.
pub struct Wired {
    pub entrypoint: Arc<QueryEntrypoint>,
    pub upstream: Arc<StdioUpstreamRegistry>,
}

pub fn build(config: RouterConfig) -> anyhow::Result<Wired> {
    let config = Arc::new(config);

    let artifacts = Arc::new(
        ArtifactStore::init_from_env(config.artifact_root.clone(), config.artifact_inline_max_bytes)
            .context("failed to initialize artifact store")?,
    );

    let local = Arc::new(RouterLocalTools::new(config.clone(), artifacts.clone()));
    let upstream = Arc::new(StdioUpstreamRegistry::new(config.upstream_servers.clone()));

    let (planner, summarizer): (Option<Arc<PlannerAdapter>>, Option<Arc<dyn Summarizer>>) =
        if config.planner_configured() {
            let base_url = config.planner_url.clone().expect("planner_configured implies planner_url is set");
            let planner: Arc<dyn Planner> = Arc::new(HttpPlanner::new(
                base_url.clone(),
                config.planner_api_key.clone(),
                config.planner_model.clone(),
            ));
            let summarizer: Arc<dyn Summarizer> = Arc::new(HttpSummarizer::new(
                base_url,
                config.planner_api_key.clone(),
                config.summarizer_model.clone(),
            ));
            (Some(Arc::new(PlannerAdapter::new(planner))), Some(summarizer))
        } else {
            (None, None)
        };

    let entrypoint = Arc::new(QueryEntrypoint::new(
        local,
        upstream.clone(),
        upstream.clone(),
        planner,
        summarizer,
        artifacts,
        Arc::new(ReadOnlyPolicy),
        config.max_parallelism,
    ));

    Ok(Wired { entrypoint, upstream })
}
