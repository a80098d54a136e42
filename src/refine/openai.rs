//! Chat-completions client for OpenAI-compatible endpoints.

use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, error};

use super::{clean_output, PromptSet, Refiner};
use crate::config::RefinerSettings;
use crate::retry::{ClientError, RetryPolicy};

pub struct OpenAiRefiner {
    client: Client,
    endpoint: String,
    model: String,
    max_tokens: u32,
    temperature: f64,
    prompts: PromptSet,
    retry: RetryPolicy,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: [ChatMessage<'a>; 2],
    max_tokens: u32,
    temperature: f64,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: AssistantMessage,
}

#[derive(Deserialize)]
struct AssistantMessage {
    content: Option<String>,
}

impl OpenAiRefiner {
    pub fn new(settings: &RefinerSettings, prompts: PromptSet, retry: RetryPolicy) -> Result<Self> {
        let api_key = settings
            .api_key
            .as_deref()
            .map(str::trim)
            .filter(|k| !k.is_empty())
            .context("missing OpenAI API key (set OPENAI_API_KEY)")?;
        anyhow::ensure!(!settings.model.trim().is_empty(), "missing OpenAI model name");
        let mut headers = HeaderMap::new();
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {}", api_key)).context("invalid OpenAI API key")?,
        );
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        let builder = Client::builder()
            .timeout(Duration::from_secs(settings.timeout_secs))
            .default_headers(headers);
        #[cfg(test)]
        let builder = builder.no_proxy();
        let client = builder
            .build()
            .context("failed to build OpenAI HTTP client")?;
        Ok(Self {
            client,
            endpoint: settings.api_url.clone(),
            model: settings.model.clone(),
            max_tokens: settings.max_tokens,
            temperature: settings.temperature,
            prompts,
            retry,
        })
    }

    async fn complete_once(&self, system: &str, user: &str) -> Result<String, ClientError> {
        let request = ChatRequest {
            model: &self.model,
            messages: [
                ChatMessage {
                    role: "system",
                    content: system,
                },
                ChatMessage {
                    role: "user",
                    content: user,
                },
            ],
            max_tokens: self.max_tokens,
            temperature: self.temperature,
        };
        let resp = self.client.post(&self.endpoint).json(&request).send().await?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp
                .text()
                .await
                .unwrap_or_else(|_| "<body unavailable>".to_string());
            return Err(ClientError::Status { status, body });
        }
        let parsed: ChatResponse = resp
            .json()
            .await
            .map_err(|e| ClientError::Malformed(e.to_string()))?;
        parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| ClientError::Malformed("no message content in first choice".into()))
    }

    async fn complete(&self, what: &str, system: &str, user: &str) -> Option<String> {
        match self.retry.run(what, || self.complete_once(system, user)).await {
            Ok(text) => {
                let cleaned = clean_output(&text);
                if cleaned.is_none() {
                    error!("{} returned an empty answer", what);
                }
                cleaned
            }
            Err(e) => {
                error!("{} failed: {}", what, e);
                None
            }
        }
    }
}

#[async_trait]
impl Refiner for OpenAiRefiner {
    async fn refine_title(&self, original_title: &str) -> Option<String> {
        debug!("Refining title {:?}", original_title);
        let user = self.prompts.title_prompt(original_title);
        self.complete("title refinement", &self.prompts.title_system, &user)
            .await
    }

    async fn refine_description(
        &self,
        original_description: &str,
        refined_title: &str,
    ) -> Option<String> {
        let user = self
            .prompts
            .description_prompt(original_description, refined_title);
        self.complete(
            "description refinement",
            &self.prompts.description_system,
            &user,
        )
        .await
    }
}
