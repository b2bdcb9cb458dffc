/// Execution Providers
///
/// **Responsibility:**
/// One capability, `execute(code, language, cases) -> results`, with two
/// interchangeable backends:
/// - `LocalEngine`: build and run as child processes on this host (engine.rs)
/// - `RemoteSandbox`: delegate the whole batch to the sandbox service (remote.rs)
///
/// The repair loop and the submission endpoint only see this trait; which
/// backend is active is decided by `JUDGE_EXECUTOR`.

use crate::engine::LocalEngine;
use crate::language::LanguageConfigManager;
use crate::remote::RemoteSandbox;
use anyhow::Result;
use async_trait::async_trait;
use autojudge_common::config::{Config, ExecutorKind};
use autojudge_common::types::{Language, TestCase, TestResult};
use std::sync::Arc;
use tracing::info;

#[async_trait]
pub trait ExecutionProvider: Send + Sync {
    fn name(&self) -> &'static str;

    fn supports(&self, language: Language) -> bool;

    /// Never fails: every failure mode is reported as a TestResult
    async fn execute(&self, code: &str, language: Language, cases: &[TestCase]) -> Vec<TestResult>;
}

#[async_trait]
impl ExecutionProvider for LocalEngine {
    fn name(&self) -> &'static str {
        "local"
    }

    fn supports(&self, language: Language) -> bool {
        self.languages().supports(language)
    }

    async fn execute(&self, code: &str, language: Language, cases: &[TestCase]) -> Vec<TestResult> {
        LocalEngine::execute(self, code, language, cases).await
    }
}

/// Build the provider selected by the configuration
pub fn from_config(config: &Config) -> Result<Arc<dyn ExecutionProvider>> {
    let provider: Arc<dyn ExecutionProvider> = match config.executor {
        ExecutorKind::Local => {
            let languages = LanguageConfigManager::load_or_builtin(&config.languages_path)?;
            Arc::new(LocalEngine::from_config(config, languages))
        }
        ExecutorKind::Remote => Arc::new(RemoteSandbox::from_config(config)?),
    };

    info!(
        provider = provider.name(),
        timeout_ms = config.timeout.as_millis() as u64,
        "Execution provider ready"
    );
    Ok(provider)
}
