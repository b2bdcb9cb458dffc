// Runtime configuration, resolved from the environment once at start-up

use anyhow::{bail, Context, Result};
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

pub const DEFAULT_SANDBOX_URL: &str = "http://localhost:3001";
pub const DEFAULT_GENERATOR_URL: &str = "http://localhost:11434";
pub const DEFAULT_GENERATOR_MODEL: &str = "llama3.2";
pub const DEFAULT_TIMEOUT_MS: u64 = 2000;
pub const DEFAULT_BUILD_TIMEOUT_MS: u64 = 30_000;
pub const DEFAULT_MAX_ATTEMPTS: u32 = 5;
pub const DEFAULT_LANGUAGES_CONFIG: &str = "config/languages.json";
pub const DEFAULT_BIND_ADDR: &str = "0.0.0.0:8080";

/// Which execution provider judges submissions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutorKind {
    /// Build and run on this host as child processes
    Local,
    /// Delegate to the sandbox service at `sandbox_url`
    Remote,
}

impl FromStr for ExecutorKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "local" => Ok(ExecutorKind::Local),
            "remote" | "sandbox" => Ok(ExecutorKind::Remote),
            other => bail!("Invalid executor '{}' (valid options: local, remote)", other),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub executor: ExecutorKind,
    pub sandbox_url: String,
    pub generator_url: String,
    pub generator_model: String,
    pub timeout: Duration,
    pub build_timeout: Duration,
    pub max_attempts: u32,
    pub max_parallel: usize,
    pub languages_path: PathBuf,
    pub questions_path: Option<PathBuf>,
    pub redis_url: Option<String>,
    pub bind_addr: String,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build a config from an arbitrary key lookup; empty values count as unset
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let executor = match get("JUDGE_EXECUTOR") {
            Some(value) => value.parse()?,
            None => ExecutorKind::Local,
        };

        let timeout_ms = parse_or(&get, "JUDGE_TIMEOUT_MS", DEFAULT_TIMEOUT_MS)?;
        if timeout_ms == 0 {
            bail!("JUDGE_TIMEOUT_MS must be greater than zero");
        }
        let build_timeout_ms = parse_or(&get, "JUDGE_BUILD_TIMEOUT_MS", DEFAULT_BUILD_TIMEOUT_MS)?;
        let max_attempts = parse_or(&get, "JUDGE_MAX_ATTEMPTS", DEFAULT_MAX_ATTEMPTS)?;

        let default_parallel = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1);
        let max_parallel = parse_or(&get, "JUDGE_MAX_PARALLEL", default_parallel)?.max(1);

        Ok(Self {
            executor,
            sandbox_url: trim_url(get("SANDBOX_URL").unwrap_or_else(|| DEFAULT_SANDBOX_URL.to_string())),
            generator_url: trim_url(get("OLLAMA_URL").unwrap_or_else(|| DEFAULT_GENERATOR_URL.to_string())),
            generator_model: get("OLLAMA_MODEL").unwrap_or_else(|| DEFAULT_GENERATOR_MODEL.to_string()),
            timeout: Duration::from_millis(timeout_ms),
            build_timeout: Duration::from_millis(build_timeout_ms),
            max_attempts,
            max_parallel,
            languages_path: get("LANGUAGES_CONFIG")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_LANGUAGES_CONFIG)),
            questions_path: get("QUESTIONS_FILE").map(PathBuf::from),
            redis_url: get("REDIS_URL"),
            bind_addr: get("BIND_ADDR").unwrap_or_else(|| DEFAULT_BIND_ADDR.to_string()),
        })
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::from_lookup(|_| None).expect("defaults are always valid")
    }
}

fn parse_or<T, G>(get: &G, key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
    G: Fn(&str) -> Option<String>,
{
    match get(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .with_context(|| format!("Invalid value for {}: {:?}", key, raw)),
        None => Ok(default),
    }
}

fn trim_url(url: String) -> String {
    url.trim_end_matches('/').to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config_from(pairs: &[(&str, &str)]) -> Result<Config> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = config_from(&[]).unwrap();
        assert_eq!(config.executor, ExecutorKind::Local);
        assert_eq!(config.sandbox_url, DEFAULT_SANDBOX_URL);
        assert_eq!(config.generator_url, DEFAULT_GENERATOR_URL);
        assert_eq!(config.generator_model, "llama3.2");
        assert_eq!(config.timeout, Duration::from_secs(2));
        assert_eq!(config.max_attempts, 5);
        assert!(config.max_parallel >= 1);
        assert_eq!(config.languages_path, PathBuf::from("config/languages.json"));
        assert!(config.redis_url.is_none());
        assert!(config.questions_path.is_none());
    }

    #[test]
    fn test_overrides() {
        let config = config_from(&[
            ("JUDGE_EXECUTOR", "remote"),
            ("SANDBOX_URL", "http://sandbox:9000/"),
            ("JUDGE_TIMEOUT_MS", "500"),
            ("JUDGE_MAX_ATTEMPTS", "3"),
            ("JUDGE_MAX_PARALLEL", "0"),
            ("REDIS_URL", "redis://cache:6379"),
        ])
        .unwrap();
        assert_eq!(config.executor, ExecutorKind::Remote);
        assert_eq!(config.sandbox_url, "http://sandbox:9000");
        assert_eq!(config.timeout, Duration::from_millis(500));
        assert_eq!(config.max_attempts, 3);
        assert_eq!(config.max_parallel, 1);
        assert_eq!(config.redis_url.as_deref(), Some("redis://cache:6379"));
    }

    #[test]
    fn test_empty_values_fall_back_to_defaults() {
        let config = config_from(&[("SANDBOX_URL", "  "), ("JUDGE_EXECUTOR", "")]).unwrap();
        assert_eq!(config.sandbox_url, DEFAULT_SANDBOX_URL);
        assert_eq!(config.executor, ExecutorKind::Local);
    }

    #[test]
    fn test_invalid_values_rejected() {
        assert!(config_from(&[("JUDGE_TIMEOUT_MS", "soon")]).is_err());
        assert!(config_from(&[("JUDGE_TIMEOUT_MS", "0")]).is_err());
        assert!(config_from(&[("JUDGE_EXECUTOR", "docker")]).is_err());
    }
}
