//! Output shaper (spec §4.7).
//!
//! A pure transformation `shape(value, options) -> value'`. Applied by the
//! executor to every step result before it is either forwarded inline or
//! replaced by an artifact reference.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Keys kept by `view=metadata`, matched against the final path segment.
const METADATA_ALLOW_LIST: &[&str] = &["id", "name", "url", "status", "count", "total", "has_next"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum View {
    #[default]
    Full,
    Summary,
    Metadata,
    ErrorsOnly,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OutputOptions {
    #[serde(default)]
    pub view: View,
    #[serde(default)]
    pub include_fields: Vec<String>,
    #[serde(default)]
    pub exclude_fields: Vec<String>,
    #[serde(default)]
    pub max_items: Option<usize>,
    #[serde(default)]
    pub max_depth: Option<usize>,
    #[serde(default)]
    pub redact: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Key(String),
    Index(usize),
}

/// Parse a path in either dotted (`a.b[0].c`) or JSON-pointer (`/a/b/0/c`)
/// notation into a list of segments.
fn parse_path(path: &str) -> Vec<Segment> {
    if let Some(stripped) = path.strip_prefix('/') {
        return stripped
            .split('/')
            .filter(|s| !s.is_empty())
            .map(|s| match s.parse::<usize>() {
                Ok(i) => Segment::Index(i),
                Err(_) => Segment::Key(s.replace("~1", "/").replace("~0", "~")),
            })
            .collect();
    }

    let mut segments = Vec::new();
    for part in path.split('.') {
        if part.is_empty() {
            continue;
        }
        let mut rest = part;
        if let Some(bracket) = rest.find('[') {
            let key = &rest[..bracket];
            if !key.is_empty() {
                segments.push(Segment::Key(key.to_string()));
            }
            rest = &rest[bracket..];
            while let Some(open) = rest.find('[') {
                let close = match rest[open..].find(']') {
                    Some(c) => open + c,
                    None => break,
                };
                if let Ok(idx) = rest[open + 1..close].parse::<usize>() {
                    segments.push(Segment::Index(idx));
                }
                rest = &rest[close + 1..];
            }
        } else {
            segments.push(Segment::Key(rest.to_string()));
        }
    }
    segments
}

fn value_is_error_like(value: &Value) -> bool {
    match value {
        Value::Bool(b) => *b,
        Value::String(s) => {
            let lower = s.to_lowercase();
            lower.contains("error") || lower.contains("fail") || lower.contains("warn")
        }
        _ => false,
    }
}

fn apply_view(value: Value, view: View) -> Value {
    match view {
        View::Full => value,
        View::Summary => summarize(value, true),
        View::Metadata => match value {
            Value::Object(map) => Value::Object(
                map.into_iter()
                    .filter(|(k, _)| METADATA_ALLOW_LIST.contains(&k.as_str()) || k.starts_with("next_"))
                    .collect(),
            ),
            other => other,
        },
        View::ErrorsOnly => match value {
            Value::Object(map) => Value::Object(
                map.into_iter()
                    .filter(|(k, v)| {
                        let key_lower = k.to_lowercase();
                        key_lower.contains("error") || key_lower.contains("warning") || value_is_error_like(v)
                    })
                    .collect(),
            ),
            other => other,
        },
    }
}

fn summarize(value: Value, top_level: bool) -> Value {
    match value {
        Value::Object(map) => {
            if top_level {
                Value::Object(
                    map.into_iter()
                        .map(|(k, v)| (k, summarize_field(v)))
                        .collect(),
                )
            } else {
                Value::Object(Map::from_iter([(
                    "_summary".to_string(),
                    Value::String(format!("{{...{} keys}}", map.len())),
                )]))
            }
        }
        other => other,
    }
}

fn summarize_field(value: Value) -> Value {
    match value {
        Value::Array(items) => Value::from(items.len()),
        Value::Object(map) => Value::String(format!("{{...{} keys}}", map.len())),
        scalar => scalar,
    }
}

fn walk_include(value: &Value, allowed: &[Vec<Segment>], prefix: &mut Vec<Segment>) -> Value {
    match value {
        Value::Object(map) => {
            let mut out = Map::new();
            for (key, child) in map {
                prefix.push(Segment::Key(key.clone()));
                if path_is_allowed(prefix, allowed) {
                    out.insert(key.clone(), walk_include(child, allowed, prefix));
                }
                prefix.pop();
            }
            Value::Object(out)
        }
        Value::Array(items) => {
            let mut out = Vec::new();
            for (i, item) in items.iter().enumerate() {
                prefix.push(Segment::Index(i));
                if path_is_allowed(prefix, allowed) {
                    out.push(walk_include(item, allowed, prefix));
                }
                prefix.pop();
            }
            Value::Array(out)
        }
        scalar => scalar.clone(),
    }
}

/// A path is allowed if it is a prefix of, or prefixed by, any allow-listed
/// path — this lets a whitelist entry keep both ancestors (so the subtree
/// is reachable) and descendants (so the whole subtree survives).
fn path_is_allowed(current: &[Segment], allowed: &[Vec<Segment>]) -> bool {
    allowed.iter().any(|allowed_path| {
        let n = current.len().min(allowed_path.len());
        current[..n] == allowed_path[..n]
    })
}

fn path_matches(current: &[Segment], target: &[Segment]) -> bool {
    current == target
}

fn apply_exclude(value: Value, excluded: &[Vec<Segment>], prefix: &mut Vec<Segment>) -> Value {
    match value {
        Value::Object(map) => {
            let mut out = Map::new();
            for (key, child) in map {
                prefix.push(Segment::Key(key.clone()));
                if !excluded.iter().any(|p| path_matches(prefix, p)) {
                    out.insert(key, apply_exclude(child, excluded, prefix));
                }
                prefix.pop();
            }
            Value::Object(out)
        }
        Value::Array(items) => {
            let mut out = Vec::with_capacity(items.len());
            for (i, item) in items.into_iter().enumerate() {
                prefix.push(Segment::Index(i));
                if !excluded.iter().any(|p| path_matches(prefix, p)) {
                    out.push(apply_exclude(item, excluded, prefix));
                }
                prefix.pop();
            }
            Value::Array(out)
        }
        scalar => scalar,
    }
}

fn apply_redact(value: Value, targets: &[Vec<Segment>], prefix: &mut Vec<Segment>) -> Value {
    match value {
        Value::Object(map) => Value::Object(
            map.into_iter()
                .map(|(key, child)| {
                    prefix.push(Segment::Key(key.clone()));
                    let redacted = if targets.iter().any(|p| path_matches(prefix, p)) {
                        Value::String("[REDACTED]".to_string())
                    } else {
                        apply_redact(child, targets, prefix)
                    };
                    prefix.pop();
                    (key, redacted)
                })
                .collect(),
        ),
        Value::Array(items) => Value::Array(
            items
                .into_iter()
                .enumerate()
                .map(|(i, item)| {
                    prefix.push(Segment::Index(i));
                    let redacted = if targets.iter().any(|p| path_matches(prefix, p)) {
                        Value::String("[REDACTED]".to_string())
                    } else {
                        apply_redact(item, targets, prefix)
                    };
                    prefix.pop();
                    redacted
                })
                .collect(),
        ),
        scalar => scalar,
    }
}

fn apply_max_items(value: Value, max_items: usize) -> Value {
    match value {
        Value::Array(mut items) => {
            let original_len = items.len();
            if original_len > max_items {
                items.truncate(max_items);
                let mut items: Vec<Value> = items
                    .into_iter()
                    .map(|v| apply_max_items(v, max_items))
                    .collect();
                items.push(serde_json::json!({"_truncated": true, "original_length": original_len}));
                Value::Array(items)
            } else {
                Value::Array(items.into_iter().map(|v| apply_max_items(v, max_items)).collect())
            }
        }
        Value::Object(map) => Value::Object(
            map.into_iter()
                .map(|(k, v)| (k, apply_max_items(v, max_items)))
                .collect(),
        ),
        scalar => scalar,
    }
}

fn apply_max_depth(value: Value, max_depth: usize, depth: usize) -> Value {
    match value {
        Value::Object(map) => {
            if depth >= max_depth {
                Value::String("<truncated>".to_string())
            } else {
                Value::Object(
                    map.into_iter()
                        .map(|(k, v)| (k, apply_max_depth(v, max_depth, depth + 1)))
                        .collect(),
                )
            }
        }
        Value::Array(items) => {
            if depth >= max_depth {
                Value::String("<truncated>".to_string())
            } else {
                Value::Array(
                    items
                        .into_iter()
                        .map(|v| apply_max_depth(v, max_depth, depth + 1))
                        .collect(),
                )
            }
        }
        scalar => scalar,
    }
}

/// Apply every configured transformation to `value`, in the fixed order
/// view -> include -> exclude -> max_items -> max_depth -> redact.
pub fn shape(value: Value, options: &OutputOptions) -> Value {
    let mut value = apply_view(value, options.view);

    if !options.include_fields.is_empty() {
        let allowed: Vec<Vec<Segment>> = options.include_fields.iter().map(|p| parse_path(p)).collect();
        value = walk_include(&value, &allowed, &mut Vec::new());
    }

    if !options.exclude_fields.is_empty() {
        let excluded: Vec<Vec<Segment>> = options.exclude_fields.iter().map(|p| parse_path(p)).collect();
        value = apply_exclude(value, &excluded, &mut Vec::new());
    }

    if let Some(max_items) = options.max_items {
        value = apply_max_items(value, max_items);
    }

    if let Some(max_depth) = options.max_depth {
        value = apply_max_depth(value, max_depth, 0);
    }

    if !options.redact.is_empty() {
        let targets: Vec<Vec<Segment>> = options.redact.iter().map(|p| parse_path(p)).collect();
        value = apply_redact(value, &targets, &mut Vec::new());
    }

    value
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn full_view_is_identity() {
        let v = json!({"a": 1, "b": [1, 2, {"c": 3}]});
        assert_eq!(shape(v.clone(), &OutputOptions::default()), v);
    }

    #[test]
    fn summary_view_replaces_nested_objects_and_array_lengths() {
        let v = json!({"id": 1, "items": [1, 2, 3], "nested": {"x": 1, "y": 2}});
        let out = shape(
            v,
            &OutputOptions {
                view: View::Summary,
                ..Default::default()
            },
        );
        assert_eq!(out["id"], json!(1));
        assert_eq!(out["items"], json!(3));
        assert_eq!(out["nested"], json!("{...2 keys}"));
    }

    #[test]
    fn metadata_view_keeps_allow_listed_keys_only() {
        let v = json!({"id": 1, "secret": "x", "status": "open", "next_page": 2});
        let out = shape(
            v,
            &OutputOptions {
                view: View::Metadata,
                ..Default::default()
            },
        );
        assert_eq!(out, json!({"id": 1, "status": "open", "next_page": 2}));
    }

    #[test]
    fn errors_only_view_keeps_error_and_warning_keys() {
        let v = json!({"id": 1, "error": "boom", "warnings": ["x"], "ok": true});
        let out = shape(
            v,
            &OutputOptions {
                view: View::ErrorsOnly,
                ..Default::default()
            },
        );
        assert_eq!(out, json!({"error": "boom", "warnings": ["x"]}));
    }

    #[test]
    fn max_items_truncates_and_appends_marker() {
        let v = json!({"items": [1, 2, 3, 4, 5]});
        let out = shape(
            v,
            &OutputOptions {
                max_items: Some(2),
                ..Default::default()
            },
        );
        assert_eq!(
            out["items"],
            json!([1, 2, {"_truncated": true, "original_length": 5}])
        );
    }

    #[test]
    fn max_depth_truncates_deep_subtrees() {
        let v = json!({"a": {"b": {"c": 1}}});
        let out = shape(
            v,
            &OutputOptions {
                max_depth: Some(1),
                ..Default::default()
            },
        );
        assert_eq!(out, json!({"a": "<truncated>"}));
    }

    #[test]
    fn redact_replaces_leaf_at_dotted_path() {
        let v = json!({"user": {"token": "secret", "name": "bob"}});
        let out = shape(
            v,
            &OutputOptions {
                redact: vec!["user.token".to_string()],
                ..Default::default()
            },
        );
        assert_eq!(out["user"]["token"], json!("[REDACTED]"));
        assert_eq!(out["user"]["name"], json!("bob"));
    }

    #[test]
    fn redact_accepts_json_pointer_notation() {
        let v = json!({"items": [{"secret": "a"}, {"secret": "b"}]});
        let out = shape(
            v,
            &OutputOptions {
                redact: vec!["/items/0/secret".to_string()],
                ..Default::default()
            },
        );
        assert_eq!(out["items"][0]["secret"], json!("[REDACTED]"));
        assert_eq!(out["items"][1]["secret"], json!("b"));
    }

    #[test]
    fn include_fields_whitelist_drops_siblings() {
        let v = json!({"a": 1, "b": 2, "c": {"d": 3, "e": 4}});
        let out = shape(
            v,
            &OutputOptions {
                include_fields: vec!["c.d".to_string()],
                ..Default::default()
            },
        );
        assert_eq!(out, json!({"c": {"d": 3}}));
    }

    #[test]
    fn exclude_fields_removes_matching_path() {
        let v = json!({"a": 1, "b": {"secret": "x", "keep": "y"}});
        let out = shape(
            v,
            &OutputOptions {
                exclude_fields: vec!["b.secret".to_string()],
                ..Default::default()
            },
        );
        assert_eq!(out, json!({"a": 1, "b": {"keep": "y"}}));
    }
}
