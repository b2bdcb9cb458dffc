/// Local Execution Engine
///
/// **Core Responsibility:**
/// Prepare a candidate program once, run it against every test case in a
/// fresh child process, and return one TestResult per case.
///
/// **Round Lifecycle:**
/// 1. Reject unsupported languages and oversized sources
/// 2. Allocate an exclusive working area (removed on every exit path)
/// 3. Write the source, run the build step once if the language needs one
/// 4. Fan out one Execution Unit per test case, bounded by `max_parallel`
/// 5. Fan in results by case index, returned in test-case order
///
/// A build failure short-circuits the round into a single failing result
/// carrying the raw toolchain diagnostic; no case is attempted.
///
/// **Containment:**
/// Wall-clock limits, per-stream output caps and process-group teardown are
/// enforced here (process.rs). CPU/memory/network isolation is the job of
/// whatever runs this process (container, jail, remote sandbox).

use crate::evaluator::{self, RunOutput};
use crate::language::{LanguageConfig, LanguageConfigManager};
use crate::process::{self, Exit};
use crate::workspace::WorkArea;
use autojudge_common::config::{Config, DEFAULT_BUILD_TIMEOUT_MS, DEFAULT_TIMEOUT_MS};
use autojudge_common::types::{Language, TestCase, TestResult};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::process::Command;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, info, instrument, warn};

/// Safety limit to keep pathological submissions off the disk
pub const MAX_SOURCE_CODE_BYTES: usize = 1024 * 1024; // 1MB

/// Why a round never reached per-case execution
#[derive(Debug, Error)]
pub enum PrepareError {
    #[error("Unsupported language: {0}")]
    Unsupported(Language),
    #[error("Source code exceeds maximum size of {0} bytes")]
    SourceTooLarge(usize),
    #[error("Failed to create working directory: {0}")]
    WorkArea(#[source] std::io::Error),
    #[error("Failed to write source file: {0}")]
    WriteSource(#[source] std::io::Error),
    #[error("Invalid toolchain config: {0}")]
    Toolchain(String),
    /// Raw toolchain output, surfaced verbatim
    #[error("{0}")]
    Build(String),
}

impl PrepareError {
    pub fn kind(&self) -> &'static str {
        match self {
            PrepareError::Unsupported(_) => "unsupported",
            PrepareError::SourceTooLarge(_)
            | PrepareError::WorkArea(_)
            | PrepareError::WriteSource(_)
            | PrepareError::Toolchain(_) => "setup",
            PrepareError::Build(_) => "build",
        }
    }

    pub fn into_result(self) -> TestResult {
        TestResult::synthetic(self.to_string())
    }
}

/// Ready-to-run form of a candidate program: the resolved command line and
/// the working area it runs in. Only valid for the round that built it.
#[derive(Debug, Clone)]
pub struct PreparedArtifact {
    pub language: Language,
    pub program: String,
    pub args: Vec<String>,
    pub work_dir: PathBuf,
}

fn expand_placeholders(arg: &str, source: &Path, artifact: &Path, dir: &Path) -> String {
    arg.replace("{source}", &source.to_string_lossy())
        .replace("{artifact}", &artifact.to_string_lossy())
        .replace("{dir}", &dir.to_string_lossy())
}

/// Child-process execution engine
#[derive(Debug, Clone)]
pub struct LocalEngine {
    languages: Arc<LanguageConfigManager>,
    timeout: Duration,
    build_timeout: Duration,
    max_parallel: usize,
}

impl LocalEngine {
    pub fn new(languages: LanguageConfigManager) -> Self {
        Self {
            languages: Arc::new(languages),
            timeout: Duration::from_millis(DEFAULT_TIMEOUT_MS),
            build_timeout: Duration::from_millis(DEFAULT_BUILD_TIMEOUT_MS),
            max_parallel: std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1),
        }
    }

    pub fn from_config(config: &Config, languages: LanguageConfigManager) -> Self {
        Self::new(languages)
            .with_timeout(config.timeout)
            .with_build_timeout(config.build_timeout)
            .with_max_parallel(config.max_parallel)
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_build_timeout(mut self, build_timeout: Duration) -> Self {
        self.build_timeout = build_timeout;
        self
    }

    /// 1 runs cases sequentially
    pub fn with_max_parallel(mut self, max_parallel: usize) -> Self {
        self.max_parallel = max_parallel.max(1);
        self
    }

    pub fn languages(&self) -> &LanguageConfigManager {
        &self.languages
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Judge `code` against every case.
    ///
    /// Returns one result per case, or a single synthetic failing result if
    /// the round could not be prepared.
    #[instrument(skip(self, code, cases), fields(language = %language, test_count = cases.len()))]
    pub async fn execute(&self, code: &str, language: Language, cases: &[TestCase]) -> Vec<TestResult> {
        let start = Instant::now();

        let config = match self.languages.get_config(language) {
            Some(config) => config,
            None => {
                warn!("No toolchain configured; rejecting submission");
                return vec![PrepareError::Unsupported(language).into_result()];
            }
        };
        if code.len() > MAX_SOURCE_CODE_BYTES {
            return vec![PrepareError::SourceTooLarge(MAX_SOURCE_CODE_BYTES).into_result()];
        }

        // Dropped at the end of this call on every path, after all units are joined
        let area = match WorkArea::allocate() {
            Ok(area) => area,
            Err(e) => {
                warn!(error = %e, "Failed to allocate working area");
                return vec![PrepareError::WorkArea(e).into_result()];
            }
        };

        let artifact = match self.prepare(&area, language, config, code).await {
            Ok(artifact) => artifact,
            Err(e) => {
                warn!(
                    kind = e.kind(),
                    error_preview = e.to_string().lines().next().unwrap_or(""),
                    "Preparation failed; short-circuiting round"
                );
                return vec![e.into_result()];
            }
        };

        let results = self.run_all(artifact, cases).await;

        info!(
            passed = evaluator::count_passed(&results),
            total = results.len(),
            execution_ms = start.elapsed().as_millis() as u64,
            "Round executed"
        );

        results
    }

    /// Write the source into `area` and build it if the language needs it
    pub async fn prepare(
        &self,
        area: &WorkArea,
        language: Language,
        config: &LanguageConfig,
        code: &str,
    ) -> Result<PreparedArtifact, PrepareError> {
        let source = area
            .write_source(&config.source_file, code)
            .await
            .map_err(PrepareError::WriteSource)?;

        // Interpreted languages run the source file itself
        let artifact = config
            .artifact_file
            .as_ref()
            .map(|name| area.file(name))
            .unwrap_or_else(|| source.clone());

        let expand = |arg: &String| expand_placeholders(arg, &source, &artifact, area.path());

        if let Some(build) = &config.build {
            let argv: Vec<String> = build.iter().map(expand).collect();
            self.build(&argv, area.path()).await?;
        }

        let run: Vec<String> = config.run.iter().map(expand).collect();
        let (program, args) = run
            .split_first()
            .ok_or_else(|| PrepareError::Toolchain(format!("'{}' has an empty run command", config.name)))?;

        Ok(PreparedArtifact {
            language,
            program: program.clone(),
            args: args.to_vec(),
            work_dir: area.path().to_path_buf(),
        })
    }

    async fn build(&self, argv: &[String], dir: &Path) -> Result<(), PrepareError> {
        let start = Instant::now();
        let (program, args) = argv
            .split_first()
            .ok_or_else(|| PrepareError::Build("Empty build command".to_string()))?;

        let mut command = Command::new(program);
        command
            .args(args)
            .current_dir(dir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        let child = process::spawn(&mut command)
            .map_err(|e| PrepareError::Build(format!("Failed to launch build toolchain '{}': {}", program, e)))?;

        let finished = process::supervise(child, None, self.build_timeout).await;
        let build_ms = start.elapsed().as_millis() as u64;

        let status = match finished.exit {
            Exit::Exited(status) => status,
            Exit::WaitFailed(e) => return Err(PrepareError::Build(format!("Build process error: {}", e))),
            Exit::TimedOut => {
                return Err(PrepareError::Build(format!(
                    "Build timed out after {}ms",
                    self.build_timeout.as_millis()
                )))
            }
        };

        if status.success() {
            debug!(build_ms, "Build succeeded");
            return Ok(());
        }

        let mut diagnostic = finished.stdout.text;
        diagnostic.push_str(&finished.stderr.text);
        if finished.stdout.overflowed || finished.stderr.overflowed {
            diagnostic.push_str("\n[build output truncated]");
        }
        if diagnostic.trim().is_empty() {
            diagnostic = format!("Build failed with {}", status);
        }
        debug!(build_ms, status = %status, "Build failed");
        Err(PrepareError::Build(diagnostic))
    }

    async fn run_all(&self, artifact: PreparedArtifact, cases: &[TestCase]) -> Vec<TestResult> {
        let artifact = Arc::new(artifact);
        let permits = Arc::new(Semaphore::new(self.max_parallel));
        let mut units = JoinSet::new();

        for (index, case) in cases.iter().cloned().enumerate() {
            let artifact = Arc::clone(&artifact);
            let permits = Arc::clone(&permits);
            let timeout = self.timeout;
            units.spawn(async move {
                // The semaphore is never closed, so acquire only fails if that changes
                let _permit = permits.acquire_owned().await.ok();
                (index, run_one(&artifact, &case, timeout).await)
            });
        }

        // Single consumer; correlation travels with the result, not completion order
        let mut slots: Vec<Option<TestResult>> = vec![None; cases.len()];
        while let Some(joined) = units.join_next().await {
            match joined {
                Ok((index, result)) => slots[index] = Some(result),
                Err(e) => warn!(error = %e, "Execution unit panicked or was aborted"),
            }
        }

        slots
            .into_iter()
            .zip(cases)
            .map(|(slot, case)| {
                slot.unwrap_or_else(|| TestResult::for_case(case, "Internal error: execution unit aborted", false))
            })
            .collect()
    }
}

/// Execution Unit: one fresh process, one test case, one verdict
pub async fn run_one(artifact: &PreparedArtifact, case: &TestCase, timeout: Duration) -> TestResult {
    let start = Instant::now();
    let output = run_process(artifact, &case.input, timeout).await;
    let result = evaluator::evaluate_test(case, output);

    debug!(
        language = %artifact.language,
        passed = result.passed,
        execution_ms = start.elapsed().as_millis() as u64,
        "Test case executed"
    );
    result
}

async fn run_process(artifact: &PreparedArtifact, input: &str, limit: Duration) -> RunOutput {
    let mut command = Command::new(&artifact.program);
    command
        .args(&artifact.args)
        .current_dir(&artifact.work_dir)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());

    let child = match process::spawn(&mut command) {
        Ok(child) => child,
        Err(e) => return RunOutput::LaunchFailed(format!("Failed to start process: {}", e)),
    };

    let finished = process::supervise(child, Some(input.to_string()), limit).await;
    let overflowed = finished.overflowed();

    match finished.exit {
        Exit::TimedOut => RunOutput::TimedOut,
        _ if overflowed => RunOutput::OutputLimitExceeded,
        Exit::WaitFailed(e) => RunOutput::LaunchFailed(format!("Failed to wait for process: {}", e)),
        Exit::Exited(status) => RunOutput::Exited {
            success: status.success(),
            status: status.to_string(),
            stdout: finished.stdout.text,
            stderr: finished.stderr.text,
        },
    }
}
