//! Auto-continuation (spec §4.10).
//!
//! A pure function deciding whether a step's result implies there's more
//! to fetch. Idempotent in the sense that it never proposes the same args
//! twice in a row for a correct upstream: it only fires when at least one
//! cursor/offset-like field in the result actually changed.

use crate::plan::PlanStep;
use serde_json::{Map, Value};

const PAGE_STYLE_KEYS: &[(&str, &str)] = &[
    ("next_offset", "offset"),
    ("next_page", "page"),
    ("next_cursor", "cursor"),
    ("next_start", "start"),
];

fn as_bool(map: &Map<String, Value>, key: &str) -> Option<bool> {
    map.get(key).and_then(Value::as_bool)
}

fn as_i64(map: &Map<String, Value>, key: &str) -> Option<i64> {
    map.get(key).and_then(Value::as_i64)
}

/// Decide the next step, if any, given the current `step` and its parsed
/// result map. Returns `None` when there is nothing further to fetch.
pub fn continuation(step: &PlanStep, result_map: &Map<String, Value>) -> Option<PlanStep> {
    if as_bool(result_map, "has_next") == Some(true) {
        for (result_key, arg_key) in PAGE_STYLE_KEYS {
            if let Some(value) = result_map.get(*result_key) {
                return Some(with_arg(step, arg_key, value.clone()));
            }
        }
    }

    if let (Some(start_at), Some(max_results), Some(total)) = (
        as_i64(result_map, "startAt"),
        as_i64(result_map, "maxResults"),
        as_i64(result_map, "total"),
    ) {
        if start_at + max_results < total {
            return Some(with_arg(step, "startAt", Value::from(start_at + max_results)));
        }
    }

    None
}

fn with_arg(step: &PlanStep, key: &str, value: Value) -> PlanStep {
    let mut next = step.clone();
    if let Value::Object(args) = &mut next.args {
        args.insert(key.to_string(), value);
    }
    next
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tool::ToolSource;
    use serde_json::json;

    fn step(args: Value) -> PlanStep {
        PlanStep {
            name: "list_pull_request_files".to_string(),
            source: ToolSource::Local,
            args,
            reason: None,
            parallel_group: None,
        }
    }

    #[test]
    fn produces_page_continuation_when_has_next() {
        let s = step(json!({"page": 1}));
        let result = json!({"has_next": true, "next_page": 2}).as_object().unwrap().clone();
        let next = continuation(&s, &result).expect("should continue");
        assert_eq!(next.args["page"], json!(2));
    }

    #[test]
    fn no_continuation_when_has_next_false() {
        let s = step(json!({"page": 1}));
        let result = json!({"has_next": false}).as_object().unwrap().clone();
        assert!(continuation(&s, &result).is_none());
    }

    #[test]
    fn jira_style_continuation_without_has_next() {
        let s = step(json!({"startAt": 0, "maxResults": 50}));
        let result = json!({"startAt": 0, "maxResults": 50, "total": 120})
            .as_object()
            .unwrap()
            .clone();
        let next = continuation(&s, &result).expect("should continue");
        assert_eq!(next.args["startAt"], json!(50));
    }

    #[test]
    fn jira_style_stops_when_exhausted() {
        let s = step(json!({"startAt": 100, "maxResults": 50}));
        let result = json!({"startAt": 100, "maxResults": 50, "total": 120})
            .as_object()
            .unwrap()
            .clone();
        assert!(continuation(&s, &result).is_none());
    }
}
