// Code-generation collaborator: prompt construction and the completion client
use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use autojudge_common::config::Config;
use autojudge_common::types::{Language, TestResult};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

use crate::evaluator;

const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(300);

/// Text-completion backend
#[async_trait]
pub trait CodeGenerator: Send + Sync {
    async fn generate(&self, prompt: &str) -> Result<String>;
}

#[derive(Debug, Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    stream: bool,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    response: String,
}

/// Client for an Ollama-compatible `POST /api/generate`
#[derive(Debug, Clone)]
pub struct OllamaGenerator {
    client: Client,
    base_url: String,
    model: String,
}

impl OllamaGenerator {
    pub fn new(base_url: impl Into<String>, model: impl Into<String>) -> Result<Self> {
        let client = Client::builder()
            .timeout(DEFAULT_REQUEST_TIMEOUT)
            .build()
            .context("Failed to build generator HTTP client")?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            model: model.into(),
        })
    }

    pub fn from_config(config: &Config) -> Result<Self> {
        Self::new(&config.generator_url, &config.generator_model)
    }
}

#[async_trait]
impl CodeGenerator for OllamaGenerator {
    async fn generate(&self, prompt: &str) -> Result<String> {
        let url = format!("{}/api/generate", self.base_url);
        debug!(model = %self.model, prompt_len = prompt.len(), "Requesting completion");

        let response = self
            .client
            .post(&url)
            .json(&GenerateRequest {
                model: &self.model,
                prompt,
                stream: false,
            })
            .send()
            .await
            .with_context(|| format!("request to {} failed", url))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            bail!("generator returned HTTP {}: {}", status, body.trim());
        }

        let body: GenerateResponse = response
            .json()
            .await
            .context("malformed generator response")?;
        Ok(body.response)
    }
}

/// Prompt for one attempt.
///
/// `previous` is the result set of the immediately preceding attempt only;
/// its failing entries become the repair feedback.
pub fn build_prompt(statement: &str, language: Language, previous: &[TestResult]) -> String {
    let mut prompt = String::new();
    prompt.push_str("You are a competitive programming expert.\n");
    prompt.push_str(&format!("Return ONLY raw {} code.\n", language));
    prompt.push_str("Do NOT include markdown.\n");
    prompt.push_str("Do NOT include explanation.\n");
    prompt.push_str("Read input from standard input.\n\n");
    prompt.push_str(&format!("Problem:\n{}\n\n", statement));

    if !previous.is_empty() {
        prompt.push_str("Previous attempt failed. Fix the code.\n");
        for result in evaluator::failing(previous) {
            prompt.push_str(&format!("Input: {}\n", result.input));
            prompt.push_str(&format!("Expected: {}\n", result.expected));
            prompt.push_str(&format!("Got: {}\n\n", result.output));
        }
    }

    prompt
}
