/// Test Evaluator - Language-Agnostic Judging
///
/// **Core Responsibility:**
/// Turn the raw outcome of one process run into a TestResult, and reduce a
/// round's results to a single pass/fail verdict.
///
/// **Critical Properties:**
/// - Knows nothing about toolchains or processes
/// - Pure functions: (raw run outcome, test case) → TestResult
///
/// **Classification Priority:**
/// 1. Timeout
/// 2. Output limit
/// 3. Launch failure / abnormal exit
/// 4. Output comparison
///
/// **Normalization Rules:**
/// - Trim leading and trailing whitespace: YES
/// - Case sensitivity: YES (exact match required)
/// - Internal whitespace preserved
/// - Floating-point tolerance: NO

use autojudge_common::types::{TestCase, TestResult};

pub const TIME_LIMIT_EXCEEDED: &str = "Time Limit Exceeded";
pub const OUTPUT_LIMIT_EXCEEDED: &str = "Output Limit Exceeded";

/// Raw outcome of running one process against one input
/// Produced by the engine, consumed by the evaluator
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutput {
    /// Wall-clock limit elapsed; the process was killed
    TimedOut,
    /// Wrote more than the capture limit; the process was killed
    OutputLimitExceeded,
    /// The process could not be started
    LaunchFailed(String),
    Exited {
        success: bool,
        /// Human-readable exit status, e.g. "exit status: 1"
        status: String,
        stdout: String,
        stderr: String,
    },
}

/// Normalize output string for comparison
pub fn normalize_output(output: &str) -> &str {
    output.trim()
}

/// Classify one run
pub fn evaluate_test(case: &TestCase, output: RunOutput) -> TestResult {
    match output {
        RunOutput::TimedOut => TestResult::for_case(case, TIME_LIMIT_EXCEEDED, false),
        RunOutput::OutputLimitExceeded => TestResult::for_case(case, OUTPUT_LIMIT_EXCEEDED, false),
        RunOutput::LaunchFailed(description) => TestResult::for_case(case, description, false),
        RunOutput::Exited {
            success: false,
            status,
            stdout,
            stderr,
        } => {
            let captured = combine(&stdout, &stderr);
            let output = if captured.is_empty() {
                status
            } else {
                format!("{} | {}", status, captured)
            };
            TestResult::for_case(case, output, false)
        }
        RunOutput::Exited {
            success: true,
            stdout,
            ..
        } => {
            let actual = normalize_output(&stdout);
            let passed = actual == normalize_output(&case.expected);
            TestResult::for_case(case, actual, passed)
        }
    }
}

fn combine(stdout: &str, stderr: &str) -> String {
    let stdout = stdout.trim();
    let stderr = stderr.trim();
    match (stdout.is_empty(), stderr.is_empty()) {
        (true, true) => String::new(),
        (false, true) => stdout.to_string(),
        (true, false) => stderr.to_string(),
        (false, false) => format!("{}\n{}", stdout, stderr),
    }
}

/// Overall verdict of a round.
/// An empty list is a failure: no evidence of correctness.
pub fn summarize(results: &[TestResult]) -> bool {
    !results.is_empty() && results.iter().all(|r| r.passed)
}

pub fn failing(results: &[TestResult]) -> impl Iterator<Item = &TestResult> {
    results.iter().filter(|r| !r.passed)
}

pub fn count_passed(results: &[TestResult]) -> usize {
    results.iter().filter(|r| r.passed).count()
}
