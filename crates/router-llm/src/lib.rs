//! `Planner`/`Summarizer` against an OpenAI-compatible chat completion
//! endpoint (SPEC_FULL.md §10, §11).
//!
//! Both implementations issue a single non-streaming POST and parse
//! `choices[0].message.content` — the planner additionally requires that
//! content to be a JSON object matching [`router_core::ModelPlan`].

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use router_core::{CatalogItem, ModelPlan, Planner, PlannerError, RouterResult, Summarizer, SummarizerError};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

const DEFAULT_TIMEOUT_SECS: u64 = 60;
const PLANNER_MAX_COMPLETION_TOKENS: u32 = 4096;
const SUMMARIZER_MAX_COMPLETION_TOKENS: u32 = 1024;

#[derive(Debug, Error)]
pub enum LlmError {
    #[error("request to planner/summarizer endpoint failed: {0}")]
    RequestFailed(String),
    #[error("planner/summarizer endpoint returned HTTP {status}: {body}")]
    UnexpectedStatus { status: u16, body: String },
    #[error("planner/summarizer response was not valid JSON: {0}")]
    MalformedResponse(String),
    #[error("planner/summarizer response had no choices")]
    EmptyChoices,
}

impl From<LlmError> for PlannerError {
    fn from(err: LlmError) -> Self {
        match err {
            LlmError::RequestFailed(msg) => PlannerError::Unavailable(msg),
            LlmError::UnexpectedStatus { status, body } => {
                PlannerError::Unavailable(format!("HTTP {status}: {body}"))
            }
            LlmError::MalformedResponse(msg) => PlannerError::Unparseable(msg),
            LlmError::EmptyChoices => PlannerError::Unparseable("no choices in response".to_string()),
        }
    }
}

impl From<LlmError> for SummarizerError {
    fn from(err: LlmError) -> Self {
        match err {
            LlmError::RequestFailed(msg) => SummarizerError::Unavailable(msg),
            LlmError::UnexpectedStatus { status, body } => {
                SummarizerError::Unavailable(format!("HTTP {status}: {body}"))
            }
            LlmError::MalformedResponse(msg) => SummarizerError::Unavailable(msg),
            LlmError::EmptyChoices => SummarizerError::Unavailable("no choices in response".to_string()),
        }
    }
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage>,
    max_completion_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_format: Option<Value>,
}

#[derive(Serialize)]
struct ChatMessage {
    role: &'static str,
    content: String,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Option<Vec<ChatChoice>>,
    error: Option<ChatError>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatMessageResponse,
}

#[derive(Deserialize)]
struct ChatMessageResponse {
    content: Option<String>,
}

#[derive(Deserialize)]
struct ChatError {
    message: String,
}

async fn complete(
    client: &Client,
    base_url: &str,
    api_key: Option<&str>,
    model: &str,
    system: &str,
    user: String,
    max_completion_tokens: u32,
    json_mode: bool,
) -> Result<String, LlmError> {
    let body = ChatRequest {
        model,
        messages: vec![
            ChatMessage {
                role: "system",
                content: system.to_string(),
            },
            ChatMessage {
                role: "user",
                content: user,
            },
        ],
        max_completion_tokens,
        response_format: json_mode.then(|| serde_json::json!({"type": "json_object"})),
    };

    let url = format!("{}/chat/completions", base_url.trim_end_matches('/'));
    let mut request = client.post(&url).json(&body).timeout(Duration::from_secs(DEFAULT_TIMEOUT_SECS));
    if let Some(key) = api_key {
        request = request.header("Authorization", format!("Bearer {key}"));
    }

    let response = request.send().await.map_err(|err| LlmError::RequestFailed(err.to_string()))?;

    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(LlmError::UnexpectedStatus {
            status: status.as_u16(),
            body,
        });
    }

    let parsed: ChatResponse = response
        .json()
        .await
        .map_err(|err| LlmError::MalformedResponse(err.to_string()))?;

    if let Some(error) = parsed.error {
        return Err(LlmError::MalformedResponse(error.message));
    }

    parsed
        .choices
        .and_then(|choices| choices.into_iter().next())
        .and_then(|choice| choice.message.content)
        .ok_or(LlmError::EmptyChoices)
}

const PLANNER_SYSTEM_PROMPT: &str = "You plan tool invocations for an MCP aggregating proxy. \
Given a user request, the active context, and a catalog of available tools, respond with a single \
JSON object of the shape {\"steps\": [{\"name\": string, \"source\": \"local\"|\"upstream\", \"args\": object, \
\"reason\": string|null, \"parallel_group\": string|null}], \"final_answer_needed\": boolean}. \
Only use tool names present in the supplied catalog, in snake_case, exactly as given. Never invent a \
tool name. Respond with the JSON object and nothing else.";

pub struct HttpPlanner {
    client: Client,
    base_url: String,
    api_key: Option<String>,
    model: String,
}

impl HttpPlanner {
    pub fn new(base_url: String, api_key: Option<String>, model: String) -> Self {
        Self {
            client: Client::new(),
            base_url,
            api_key,
            model,
        }
    }
}

#[derive(Serialize)]
struct PlannerPrompt<'a> {
    input: &'a str,
    context: &'a Value,
    catalog: &'a [CatalogItem],
    max_steps: usize,
}

#[async_trait]
impl Planner for HttpPlanner {
    async fn plan(
        &self,
        input: &str,
        context: &Value,
        catalog: &[CatalogItem],
        max_steps: usize,
    ) -> Result<(ModelPlan, Value), PlannerError> {
        let prompt = PlannerPrompt {
            input,
            context,
            catalog,
            max_steps,
        };
        let user = serde_json::to_string(&prompt)
            .map_err(|err| PlannerError::Unparseable(format!("failed to encode planner prompt: {err}")))?;

        let content = complete(
            &self.client,
            &self.base_url,
            self.api_key.as_deref(),
            &self.model,
            PLANNER_SYSTEM_PROMPT,
            user,
            PLANNER_MAX_COMPLETION_TOKENS,
            true,
        )
        .await
        .map_err(LlmError::into)?;

        let raw: Value = serde_json::from_str(&content)
            .map_err(|err| PlannerError::Unparseable(format!("planner output was not valid JSON: {err}")))?;
        let plan: ModelPlan = serde_json::from_value(raw.clone())
            .map_err(|err| PlannerError::Unparseable(format!("planner output did not match plan schema: {err}")))?;

        Ok((plan, raw))
    }
}

const SUMMARIZER_SYSTEM_PROMPT: &str = "You summarize the result of an automated tool-execution run for \
the person who asked the original question. Be concise and factual; do not invent information that \
isn't present in the supplied result.";

pub struct HttpSummarizer {
    client: Client,
    base_url: String,
    api_key: Option<String>,
    model: String,
}

impl HttpSummarizer {
    pub fn new(base_url: String, api_key: Option<String>, model: String) -> Self {
        Self {
            client: Client::new(),
            base_url,
            api_key,
            model,
        }
    }
}

#[derive(Serialize)]
struct SummarizerPrompt<'a> {
    input: &'a str,
    result: &'a RouterResult,
}

#[async_trait]
impl Summarizer for HttpSummarizer {
    async fn summarize(&self, input: &str, result: &RouterResult) -> Result<String, SummarizerError> {
        let prompt = SummarizerPrompt { input, result };
        let user = serde_json::to_string(&prompt)
            .map_err(|err| SummarizerError::Unavailable(format!("failed to encode summarizer prompt: {err}")))?;

        complete(
            &self.client,
            &self.base_url,
            self.api_key.as_deref(),
            &self.model,
            SUMMARIZER_SYSTEM_PROMPT,
            user,
            SUMMARIZER_MAX_COMPLETION_TOKENS,
            false,
        )
        .await
        .map_err(LlmError::into)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use router_core::{PlanStep, ToolSource};

    #[test]
    fn planner_error_conversion_preserves_status() {
        let err: PlannerError = LlmError::UnexpectedStatus {
            status: 503,
            body: "down".to_string(),
        }
        .into();
        match err {
            PlannerError::Unavailable(msg) => assert!(msg.contains("503")),
            _ => panic!("expected Unavailable"),
        }
    }

    #[test]
    fn empty_choices_is_unparseable_for_planner() {
        let err: PlannerError = LlmError::EmptyChoices.into();
        assert!(matches!(err, PlannerError::Unparseable(_)));
    }

    #[test]
    fn empty_choices_is_unavailable_for_summarizer() {
        let err: SummarizerError = LlmError::EmptyChoices.into();
        assert!(matches!(err, SummarizerError::Unavailable(_)));
    }

    #[test]
    fn plan_step_round_trips_through_model_plan_schema() {
        let plan = ModelPlan::new(
            vec![PlanStep {
                name: "jira_get_issue".to_string(),
                source: ToolSource::Local,
                args: serde_json::json!({"issue_key": "ABC-1"}),
                reason: None,
                parallel_group: None,
            }],
            true,
        );
        let encoded = serde_json::to_string(&plan).unwrap();
        let decoded: ModelPlan = serde_json::from_str(&encoded).unwrap();
        assert_eq!(decoded.steps.len(), 1);
        assert_eq!(decoded.steps[0].name, "jira_get_issue");
    }
}
