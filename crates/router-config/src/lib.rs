//! Environment-driven process configuration (SPEC_FULL.md §10.3, §11).
//!
//! Mirrors the teacher's `HubConfig`/`GlobalConfig` split: a single struct
//! read once at process start, consulted everywhere else instead of each
//! collaborator reading `std::env` on its own.

use std::collections::HashMap;
use std::path::PathBuf;

use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;

const DEFAULT_PLANNER_MODEL: &str = "gpt-4o-mini";
const DEFAULT_ARTIFACT_INLINE_MAX_BYTES: usize = 65_536;
const DEFAULT_MAX_PARALLELISM: usize = 8;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid {domain} alias map: {source}")]
    InvalidAliasMap {
        domain: &'static str,
        source: serde_json::Error,
    },
    #[error("invalid ROUTER_UPSTREAM_SERVERS: {0}")]
    InvalidUpstreamServerList(serde_json::Error),
    #[error("invalid {0}: must be a valid integer")]
    InvalidInteger(&'static str),
}

/// One configured upstream MCP server, spawned over stdio by `router-upstream`.
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct UpstreamServerSpec {
    pub name: String,
    pub command: String,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default)]
    pub env: HashMap<String, String>,
}

#[derive(Debug, Clone)]
pub struct RouterConfig {
    pub planner_url: Option<String>,
    pub planner_api_key: Option<String>,
    pub planner_model: String,
    pub summarizer_model: String,
    pub dev_mode: bool,
    pub artifact_root: PathBuf,
    pub artifact_inline_max_bytes: usize,
    pub jira_aliases: HashMap<String, Value>,
    pub confluence_aliases: HashMap<String, Value>,
    pub grafana_aliases: HashMap<String, Value>,
    pub github_token: Option<String>,
    pub upstream_servers: Vec<UpstreamServerSpec>,
    pub max_parallelism: usize,
}

impl RouterConfig {
    pub fn load() -> Result<Self, ConfigError> {
        Self::from_env(|key| std::env::var(key).ok())
    }

    fn from_env(get: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let planner_model = get("ROUTER_PLANNER_MODEL").unwrap_or_else(|| DEFAULT_PLANNER_MODEL.to_string());
        let summarizer_model = get("ROUTER_SUMMARIZER_MODEL").unwrap_or_else(|| planner_model.clone());

        let dev_mode = get("ROUTER_DEV_MODE").is_some_and(|v| is_truthy(&v));

        let artifact_root = get("ROUTER_ARTIFACT_ROOT")
            .map(PathBuf::from)
            .unwrap_or_else(default_artifact_root);

        let artifact_inline_max_bytes = match get("ROUTER_ARTIFACT_INLINE_MAX_BYTES") {
            Some(raw) => raw
                .parse()
                .map_err(|_| ConfigError::InvalidInteger("ROUTER_ARTIFACT_INLINE_MAX_BYTES"))?,
            None => DEFAULT_ARTIFACT_INLINE_MAX_BYTES,
        };

        let max_parallelism = match get("ROUTER_MAX_PARALLELISM") {
            Some(raw) => raw
                .parse()
                .map_err(|_| ConfigError::InvalidInteger("ROUTER_MAX_PARALLELISM"))?,
            None => DEFAULT_MAX_PARALLELISM,
        };

        let upstream_servers = match get("ROUTER_UPSTREAM_SERVERS") {
            Some(raw) => {
                serde_json::from_str(&raw).map_err(ConfigError::InvalidUpstreamServerList)?
            }
            None => Vec::new(),
        };

        Ok(Self {
            planner_url: get("ROUTER_PLANNER_URL"),
            planner_api_key: get("ROUTER_PLANNER_API_KEY"),
            planner_model,
            summarizer_model,
            dev_mode,
            artifact_root,
            artifact_inline_max_bytes,
            jira_aliases: parse_alias_map("jira", get("ROUTER_JIRA_ALIASES"))?,
            confluence_aliases: parse_alias_map("confluence", get("ROUTER_CONFLUENCE_ALIASES"))?,
            grafana_aliases: parse_alias_map("grafana", get("ROUTER_GRAFANA_ALIASES"))?,
            github_token: get("ROUTER_GITHUB_TOKEN"),
            upstream_servers,
            max_parallelism,
        })
    }

    /// Planner/summarizer capabilities are only usable once an endpoint is set
    /// (SPEC_FULL.md §11, spec §6.4/§7 "configuration error").
    pub fn planner_configured(&self) -> bool {
        self.planner_url.is_some()
    }
}

impl Default for RouterConfig {
    /// All-defaults configuration, as if no `ROUTER_*` variable were set.
    /// Used by collaborator crates' tests that need a `RouterConfig` but
    /// don't care about its contents.
    fn default() -> Self {
        Self::from_env(|_| None).expect("default config must always parse")
    }
}

fn parse_alias_map(
    domain: &'static str,
    raw: Option<String>,
) -> Result<HashMap<String, Value>, ConfigError> {
    match raw {
        None => Ok(HashMap::new()),
        Some(s) => {
            serde_json::from_str(&s).map_err(|source| ConfigError::InvalidAliasMap { domain, source })
        }
    }
}

fn is_truthy(value: &str) -> bool {
    matches!(value.trim(), "1" | "true" | "TRUE" | "True" | "yes" | "on")
}

fn default_artifact_root() -> PathBuf {
    if let Some(dirs) = directories::ProjectDirs::from("", "", "router-proxy") {
        return dirs.cache_dir().join("artifacts");
    }
    PathBuf::from("/tmp")
        .join(format!("router-{}", effective_uid()))
        .join("artifacts")
}

fn effective_uid() -> u32 {
    #[cfg(unix)]
    {
        // SAFETY: geteuid has no preconditions and returns the caller's effective UID.
        unsafe { libc::geteuid() }
    }
    #[cfg(not(unix))]
    {
        0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn env_map(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
    }

    #[test]
    fn defaults_when_nothing_set() {
        let cfg = RouterConfig::from_env(|_| None).unwrap();
        assert!(!cfg.planner_configured());
        assert_eq!(cfg.planner_model, DEFAULT_PLANNER_MODEL);
        assert_eq!(cfg.summarizer_model, DEFAULT_PLANNER_MODEL);
        assert!(!cfg.dev_mode);
        assert_eq!(cfg.artifact_inline_max_bytes, DEFAULT_ARTIFACT_INLINE_MAX_BYTES);
        assert_eq!(cfg.max_parallelism, DEFAULT_MAX_PARALLELISM);
        assert!(cfg.upstream_servers.is_empty());
        assert!(cfg.jira_aliases.is_empty());
    }

    #[test]
    fn planner_url_enables_planner_configured() {
        let env = env_map(&[("ROUTER_PLANNER_URL", "https://api.example.com/v1")]);
        let cfg = RouterConfig::from_env(|k| env.get(k).cloned()).unwrap();
        assert!(cfg.planner_configured());
    }

    #[test]
    fn summarizer_model_falls_back_to_planner_model_override() {
        let env = env_map(&[("ROUTER_PLANNER_MODEL", "my-model")]);
        let cfg = RouterConfig::from_env(|k| env.get(k).cloned()).unwrap();
        assert_eq!(cfg.summarizer_model, "my-model");
    }

    #[test]
    fn dev_mode_accepts_common_truthy_spellings() {
        for value in ["1", "true", "TRUE", "yes", "on"] {
            let env = env_map(&[("ROUTER_DEV_MODE", value)]);
            let cfg = RouterConfig::from_env(|k| env.get(k).cloned()).unwrap();
            assert!(cfg.dev_mode, "expected {value} to be truthy");
        }
        let env = env_map(&[("ROUTER_DEV_MODE", "0")]);
        let cfg = RouterConfig::from_env(|k| env.get(k).cloned()).unwrap();
        assert!(!cfg.dev_mode);
    }

    #[test]
    fn parses_upstream_server_list() {
        let raw = r#"[{"name":"jira","command":"jira-mcp","args":["--stdio"]}]"#;
        let env = env_map(&[("ROUTER_UPSTREAM_SERVERS", raw)]);
        let cfg = RouterConfig::from_env(|k| env.get(k).cloned()).unwrap();
        assert_eq!(cfg.upstream_servers.len(), 1);
        assert_eq!(cfg.upstream_servers[0].name, "jira");
        assert_eq!(cfg.upstream_servers[0].command, "jira-mcp");
    }

    #[test]
    fn invalid_upstream_server_list_is_an_error() {
        let env = env_map(&[("ROUTER_UPSTREAM_SERVERS", "not json")]);
        let result = RouterConfig::from_env(|k| env.get(k).cloned());
        assert!(matches!(result, Err(ConfigError::InvalidUpstreamServerList(_))));
    }

    #[test]
    fn invalid_alias_map_is_an_error() {
        let env = env_map(&[("ROUTER_JIRA_ALIASES", "not json")]);
        let result = RouterConfig::from_env(|k| env.get(k).cloned());
        assert!(matches!(
            result,
            Err(ConfigError::InvalidAliasMap { domain: "jira", .. })
        ));
    }

    #[test]
    fn invalid_integer_is_an_error() {
        let env = env_map(&[("ROUTER_MAX_PARALLELISM", "eight")]);
        let result = RouterConfig::from_env(|k| env.get(k).cloned());
        assert!(matches!(result, Err(ConfigError::InvalidInteger(_))));
    }
}
