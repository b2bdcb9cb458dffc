use serde::{Deserialize, Serialize};
use std::fmt;

/// Languages a submission may be written in.
///
/// Whether a language can actually be judged depends on the active execution
/// provider (a local toolchain must be configured, or the remote sandbox must
/// accept it).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    Go,
    Python,
    JavaScript,
    Java,
}

impl Language {
    pub const ALL: [Language; 4] = [
        Language::Go,
        Language::Python,
        Language::JavaScript,
        Language::Java,
    ];

    /// Parse a user-supplied language name (case-insensitive, common aliases accepted)
    pub fn parse(name: &str) -> Option<Self> {
        match name.trim().to_lowercase().as_str() {
            "go" | "golang" => Some(Language::Go),
            "python" | "python3" | "py" => Some(Language::Python),
            "javascript" | "js" | "node" => Some(Language::JavaScript),
            "java" => Some(Language::Java),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Language::Go => "go",
            Language::Python => "python",
            Language::JavaScript => "javascript",
            Language::Java => "java",
        }
    }

    /// Info-string tags that mark a fenced code block as this language
    pub fn fence_tags(&self) -> &'static [&'static str] {
        match self {
            Language::Go => &["go", "golang"],
            Language::Python => &["python", "python3", "py"],
            Language::JavaScript => &["javascript", "js", "node"],
            Language::Java => &["java"],
        }
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestCase {
    pub input: String,
    pub expected: String,
}

impl TestCase {
    pub fn new(input: impl Into<String>, expected: impl Into<String>) -> Self {
        Self {
            input: input.into(),
            expected: expected.into(),
        }
    }
}

/// Outcome of one test case in one round.
///
/// `output` holds the trimmed stdout on a clean run, otherwise a diagnostic:
/// the timeout marker, a process error description, or raw build output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestResult {
    pub input: String,
    pub expected: String,
    pub output: String,
    pub passed: bool,
}

impl TestResult {
    pub fn for_case(case: &TestCase, output: impl Into<String>, passed: bool) -> Self {
        Self {
            input: case.input.clone(),
            expected: case.expected.clone(),
            output: output.into(),
            passed,
        }
    }

    /// Single failing result standing in for a whole round
    /// (build failure, setup failure, unsupported language, collaborator failure)
    pub fn synthetic(output: impl Into<String>) -> Self {
        Self {
            input: String::new(),
            expected: String::new(),
            output: output.into(),
            passed: false,
        }
    }
}

/// A problem as held by the question store
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Question {
    pub id: String,
    #[serde(default)]
    pub statement: String,
    #[serde(rename = "testCases", alias = "test_cases")]
    pub test_cases: Vec<TestCase>,
}

/// One generate -> execute -> aggregate cycle of the repair loop
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoundOutcome {
    pub attempt: u32,
    pub code: String,
    pub results: Vec<TestResult>,
    pub success: bool,
}

pub const NO_TEST_CASES: &str = "No test cases found";

/// Final result of a repair-loop run
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SolveOutcome {
    pub attempts: u32,
    pub final_code: String,
    pub results: Vec<TestResult>,
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl SolveOutcome {
    pub fn no_test_cases() -> Self {
        Self::aborted(NO_TEST_CASES)
    }

    /// Terminated before any attempt was made
    pub fn aborted(error: impl Into<String>) -> Self {
        Self {
            attempts: 0,
            final_code: String::new(),
            results: Vec::new(),
            success: false,
            error: Some(error.into()),
        }
    }

    pub fn from_round(round: RoundOutcome) -> Self {
        Self {
            attempts: round.attempt,
            final_code: round.code,
            results: round.results,
            success: round.success,
            error: None,
        }
    }

    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }
}
