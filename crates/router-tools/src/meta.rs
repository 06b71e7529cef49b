//! Meta/discovery tools: `search_tools`, `describe_tool` (spec §6.3).
//!
//! Both operate over this crate's own catalog, not the merged catalog
//! `router-core::tool::ToolCatalog` assembles for a request — upstream
//! tools are added by the core after this process hands back its local
//! items, so these handlers only ever see local names.

use router_core::{CatalogItem, HandlerError, ToolResult};
use serde_json::{Value, json};

pub(crate) fn search_tools(catalog: &[CatalogItem], args: &Value) -> Result<ToolResult, HandlerError> {
    let query = args.get("query").and_then(Value::as_str).unwrap_or("").to_lowercase();
    let format = args.get("format").and_then(Value::as_str).unwrap_or("json");
    let limit = args.get("limit").and_then(Value::as_i64).unwrap_or(20).max(0) as usize;

    let matches: Vec<&CatalogItem> = catalog
        .iter()
        .filter(|item| {
            query.is_empty()
                || item.name.to_lowercase().contains(&query)
                || item.description.to_lowercase().contains(&query)
                || item.category.to_lowercase().contains(&query)
        })
        .take(limit)
        .collect();

    if format == "text" {
        let lines: Vec<String> = matches
            .iter()
            .map(|item| format!("{} ({}) - {}", item.name, item.category, item.description))
            .collect();
        return Ok(ToolResult::ok(lines.join("\n")));
    }

    let items: Vec<Value> = matches
        .iter()
        .map(|item| json!({"name": item.name, "category": item.category, "description": item.description}))
        .collect();
    Ok(ToolResult::ok(json!({"tools": items}).to_string()))
}

pub(crate) fn describe_tool(catalog: &[CatalogItem], args: &Value) -> Result<ToolResult, HandlerError> {
    let name = args
        .get("name")
        .and_then(Value::as_str)
        .ok_or_else(|| HandlerError::InvalidArgs("missing required field: name".to_string()))?;

    match catalog.iter().find(|item| item.name == name) {
        Some(item) => Ok(ToolResult::ok(
            json!({
                "name": item.name,
                "description": item.description,
                "category": item.category,
                "source": item.source.as_str(),
                "input_schema": item.input_schema,
            })
            .to_string(),
        )),
        None => Err(HandlerError::NotFound(name.to_string())),
    }
}
