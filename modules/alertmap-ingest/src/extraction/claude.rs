//! Claude-backed extraction client.
//!
//! Each stage forces a single tool call whose input schema is generated from
//! the stage's response type, then hands the tool input to the matching
//! parse function.

use std::time::Duration;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, CONTENT_TYPE};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::debug;

use alertmap_common::{Categorization, ExtractedLocations, FilteredMessage};

use super::schema::tool_input_schema;
use super::{parse, prompts, LocationExtractionClient};
use crate::error::StageError;

const ANTHROPIC_API_URL: &str = "https://api.anthropic.com/v1";
const ANTHROPIC_VERSION: &str = "2023-06-01";
const TOOL_NAME: &str = "structured_response";

/// Tool input shape for split/filter (tool inputs must be objects).
#[derive(Debug, Deserialize, JsonSchema)]
#[allow(dead_code)]
struct SplitResponse {
    messages: Vec<FilteredMessage>,
}

pub struct ClaudeExtractor {
    api_key: String,
    model: String,
    locality: String,
    base_url: String,
    http: reqwest::Client,
}

impl ClaudeExtractor {
    /// `timeout` bounds every HTTP round trip.
    pub fn new(
        api_key: impl Into<String>,
        model: impl Into<String>,
        locality: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self> {
        Ok(Self {
            api_key: api_key.into(),
            model: model.into(),
            locality: locality.into(),
            base_url: ANTHROPIC_API_URL.to_string(),
            http: reqwest::Client::builder().timeout(timeout).build()?,
        })
    }

    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }

    fn headers(&self) -> Result<HeaderMap> {
        let mut headers = HeaderMap::new();
        headers.insert("x-api-key", HeaderValue::from_str(&self.api_key)?);
        headers.insert("anthropic-version", HeaderValue::from_static(ANTHROPIC_VERSION));
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        Ok(headers)
    }

    /// Run one forced tool call and return the raw tool input.
    async fn structured(&self, system: String, text: &str, schema: Value) -> Result<Value> {
        let request = ChatRequest {
            model: &self.model,
            max_tokens: 4096,
            temperature: 0.0,
            system,
            messages: vec![WireMessage {
                role: "user",
                content: text,
            }],
            tools: vec![ToolDefinition {
                name: TOOL_NAME,
                description: "Return the structured result for the input text.",
                input_schema: schema,
            }],
            tool_choice: json!({"type": "tool", "name": TOOL_NAME}),
        };

        debug!(model = %self.model, chars = text.len(), "Claude extraction request");

        let response = self
            .http
            .post(format!("{}/messages", self.base_url))
            .headers(self.headers()?)
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await?;
            return Err(anyhow!("Claude API error ({}): {}", status, error_text));
        }

        let body: ChatResponse = response.json().await?;
        body.content
            .into_iter()
            .find_map(|block| match block {
                ContentBlock::ToolUse { input, .. } => Some(input),
                ContentBlock::Other => None,
            })
            .ok_or_else(|| anyhow!("No structured output in Claude response"))
    }
}

#[async_trait]
impl LocationExtractionClient for ClaudeExtractor {
    async fn filter_and_split(&self, text: &str) -> Result<Vec<FilteredMessage>, StageError> {
        let raw = self
            .structured(
                prompts::split_filter(&self.locality),
                text,
                tool_input_schema::<SplitResponse>(),
            )
            .await?;
        parse::parse_split(raw)
    }

    async fn categorize(&self, text: &str) -> Result<Categorization, StageError> {
        let raw = self
            .structured(
                prompts::categorize(&self.locality),
                text,
                tool_input_schema::<Categorization>(),
            )
            .await?;
        parse::parse_categorization(raw)
    }

    async fn extract_locations(&self, text: &str) -> Result<ExtractedLocations, StageError> {
        let raw = self
            .structured(
                prompts::extract_locations(&self.locality),
                text,
                tool_input_schema::<ExtractedLocations>(),
            )
            .await?;
        parse::parse_locations(raw)
    }
}

// ---------------------------------------------------------------------------
// Wire types
// ---------------------------------------------------------------------------

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    temperature: f32,
    system: String,
    messages: Vec<WireMessage<'a>>,
    tools: Vec<ToolDefinition>,
    tool_choice: Value,
}

#[derive(Serialize)]
struct WireMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Serialize)]
struct ToolDefinition {
    name: &'static str,
    description: &'static str,
    input_schema: Value,
}

#[derive(Deserialize)]
struct ChatResponse {
    #[serde(default)]
    content: Vec<ContentBlock>,
}

#[derive(Deserialize)]
#[serde(tag = "type")]
enum ContentBlock {
    #[serde(rename = "tool_use")]
    ToolUse { input: Value },
    #[serde(other)]
    Other,
}
