//! Tool catalog assembly (spec §3, §4.1).

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Names that must never appear in an assembled catalog, regardless of
/// where they come from. Prevents the proxy from recursing into itself.
pub const RESERVED_NAMES: &[&str] = &["query", "router"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ToolSource {
    Local,
    Upstream,
}

impl ToolSource {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Local => "local",
            Self::Upstream => "upstream",
        }
    }
}

impl std::fmt::Display for ToolSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single invocable tool, as exposed to the planner and validator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CatalogItem {
    pub name: String,
    pub description: String,
    pub category: String,
    pub source: ToolSource,
    pub input_schema: Value,
}

/// Result of the `UpstreamRegistry::list_active` / `get` capability (spec §6.2).
/// Distinct from `CatalogItem` because upstream tools are described by their
/// origin MCP server, not by this process.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpstreamTool {
    pub name: String,
    pub description: String,
    pub input_schema: Value,
}

/// Read-only snapshot of every invocable tool for a single request.
///
/// Built from two sources (spec §4.1): the hardcoded local catalog and the
/// active upstream registry. Never contains `query`/`router`. Rebuilding is
/// intentionally O(n) and cheap — the catalog is rebuilt once per request so
/// it always reflects the currently active upstream set.
#[derive(Debug, Clone, Default)]
pub struct ToolCatalog {
    items: Vec<CatalogItem>,
}

impl ToolCatalog {
    /// Assemble a catalog from a local item list plus the active upstream
    /// tools. Reserved names are dropped from both sources defensively.
    pub fn assemble(local: Vec<CatalogItem>, upstream: Vec<UpstreamTool>) -> Self {
        let mut items: Vec<CatalogItem> = local
            .into_iter()
            .filter(|item| !RESERVED_NAMES.contains(&item.name.as_str()))
            .collect();

        items.extend(
            upstream
                .into_iter()
                .filter(|tool| !RESERVED_NAMES.contains(&tool.name.as_str()))
                .map(|tool| CatalogItem {
                    name: tool.name,
                    description: tool.description,
                    category: "upstream".to_string(),
                    source: ToolSource::Upstream,
                    input_schema: tool.input_schema,
                }),
        );

        Self { items }
    }

    /// Snapshot as exposed to the planner / discovery fast-path.
    pub fn snapshot(&self) -> &[CatalogItem] {
        &self.items
    }

    pub fn find(&self, name: &str) -> Option<&CatalogItem> {
        self.items.iter().find(|item| item.name == name)
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}
