// Remote sandbox transport: the whole batch is judged by an external service
use crate::provider::ExecutionProvider;
use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use autojudge_common::config::Config;
use autojudge_common::types::{Language, TestCase, TestResult};
use reqwest::{Client, StatusCode};
use serde::Serialize;
use std::time::{Duration, Instant};
use tracing::{info, instrument, warn};

const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(120);

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct RunRequest<'a> {
    code: &'a str,
    language: &'a str,
    test_cases: &'a [TestCase],
}

/// Client for the sandbox service's `POST /run`
#[derive(Debug, Clone)]
pub struct RemoteSandbox {
    client: Client,
    base_url: String,
}

impl RemoteSandbox {
    pub fn new(base_url: impl Into<String>, request_timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(request_timeout)
            .build()
            .context("Failed to build sandbox HTTP client")?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    pub fn from_config(config: &Config) -> Result<Self> {
        Self::new(&config.sandbox_url, DEFAULT_REQUEST_TIMEOUT)
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn try_execute(&self, code: &str, language: Language, cases: &[TestCase]) -> Result<Vec<TestResult>> {
        let url = format!("{}/run", self.base_url);
        let response = self
            .client
            .post(&url)
            .json(&RunRequest {
                code,
                language: language.as_str(),
                test_cases: cases,
            })
            .send()
            .await
            .with_context(|| format!("request to {} failed", url))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .context("failed to read response body")?;

        parse_response(status, &body, cases.len())
    }
}

/// Anything but a well-formed array with one result per case is a batch failure
fn parse_response(status: StatusCode, body: &str, expected_len: usize) -> Result<Vec<TestResult>> {
    let value: serde_json::Value = serde_json::from_str(body)
        .map_err(|_| anyhow!("malformed response body (HTTP {})", status))?;

    if let Some(error) = value.get("error") {
        let message = error.as_str().map(str::to_string).unwrap_or_else(|| error.to_string());
        bail!("{} (HTTP {})", message, status);
    }
    if !status.is_success() {
        bail!("HTTP {}", status);
    }

    let results: Vec<TestResult> =
        serde_json::from_value(value).context("malformed response body")?;
    if results.len() != expected_len {
        bail!(
            "expected {} results, service returned {}",
            expected_len,
            results.len()
        );
    }
    Ok(results)
}

#[async_trait]
impl ExecutionProvider for RemoteSandbox {
    fn name(&self) -> &'static str {
        "remote"
    }

    fn supports(&self, language: Language) -> bool {
        // The service accepts every language the model knows
        Language::ALL.contains(&language)
    }

    #[instrument(skip(self, code, cases), fields(language = %language, test_count = cases.len()))]
    async fn execute(&self, code: &str, language: Language, cases: &[TestCase]) -> Vec<TestResult> {
        let start = Instant::now();
        match self.try_execute(code, language, cases).await {
            Ok(results) => {
                info!(
                    passed = results.iter().filter(|r| r.passed).count(),
                    total = results.len(),
                    execution_ms = start.elapsed().as_millis() as u64,
                    "Remote round executed"
                );
                results
            }
            Err(e) => {
                warn!(error = %format!("{:#}", e), "Remote sandbox failed");
                vec![TestResult::synthetic(format!("Sandbox service error: {:#}", e))]
            }
        }
    }
}
