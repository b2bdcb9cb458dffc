/// Repair Loop
///
/// **Responsibility:**
/// Drive generate → execute → aggregate rounds until every test case passes
/// or the attempt ceiling is reached.
///
/// **Rules:**
/// - Attempts are strictly sequential; each depends on the previous one's failures
/// - Feedback is the failing results of the immediately preceding attempt only
/// - Every round rebuilds from its own candidate; nothing carries over but feedback
/// - Collaborator failures consume an attempt instead of aborting the loop
///
/// **Terminal States:**
/// - no test cases for the problem (zero attempts consumed)
/// - success (aggregator true), `attempts` = the succeeding round
/// - exhaustion, `attempts` = ceiling, last round's code and results

use crate::evaluator;
use crate::fence;
use crate::generator::{build_prompt, CodeGenerator};
use crate::provider::ExecutionProvider;
use autojudge_common::config::DEFAULT_MAX_ATTEMPTS;
use autojudge_common::store::QuestionStore;
use autojudge_common::types::{Language, Question, RoundOutcome, SolveOutcome, TestResult};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, instrument, warn};

#[derive(Clone)]
pub struct RepairLoop {
    store: Arc<dyn QuestionStore>,
    generator: Arc<dyn CodeGenerator>,
    executor: Arc<dyn ExecutionProvider>,
    max_attempts: u32,
}

impl RepairLoop {
    pub fn new(
        store: Arc<dyn QuestionStore>,
        generator: Arc<dyn CodeGenerator>,
        executor: Arc<dyn ExecutionProvider>,
    ) -> Self {
        Self {
            store,
            generator,
            executor,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
        }
    }

    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    pub async fn solve(&self, problem_id: &str, language: Language) -> SolveOutcome {
        self.solve_with_limit(problem_id, language, self.max_attempts).await
    }

    #[instrument(skip(self), fields(executor = self.executor.name()))]
    pub async fn solve_with_limit(&self, problem_id: &str, language: Language, max_attempts: u32) -> SolveOutcome {
        let question = match self.store.lookup(problem_id).await {
            Ok(Some(question)) if !question.test_cases.is_empty() => question,
            Ok(_) => {
                warn!("No test cases found; not attempting");
                return SolveOutcome::no_test_cases();
            }
            Err(e) => {
                warn!(error = %format!("{:#}", e), "Question lookup failed");
                return SolveOutcome::aborted(format!("Question lookup failed: {:#}", e));
            }
        };

        let mut last: Option<RoundOutcome> = None;

        for attempt in 1..=max_attempts {
            let previous = last.as_ref().map(|r| r.results.as_slice()).unwrap_or(&[]);
            let round = self.run_round(&question, language, attempt, previous).await;

            if round.success {
                info!(attempt, "All tests passed");
                return SolveOutcome::from_round(round);
            }
            last = Some(round);
        }

        warn!(max_attempts, "Max attempts reached");
        match last {
            Some(round) => SolveOutcome::from_round(round),
            None => SolveOutcome {
                attempts: 0,
                final_code: String::new(),
                results: Vec::new(),
                success: false,
                error: None,
            },
        }
    }

    async fn run_round(
        &self,
        question: &Question,
        language: Language,
        attempt: u32,
        previous: &[TestResult],
    ) -> RoundOutcome {
        let start = Instant::now();
        let prompt = build_prompt(&question.statement, language, previous);

        let (code, results) = match self.generator.generate(&prompt).await {
            Ok(response) => {
                let code = fence::extract_code(&response, language);
                debug!(attempt, code_len = code.len(), "Candidate generated");
                let results = self
                    .executor
                    .execute(&code, language, &question.test_cases)
                    .await;
                (code, results)
            }
            Err(e) => {
                warn!(attempt, error = %format!("{:#}", e), "Code generation failed");
                (
                    String::new(),
                    vec![TestResult::synthetic(format!("Code generation failed: {:#}", e))],
                )
            }
        };

        let success = evaluator::summarize(&results);
        info!(
            attempt,
            passed = evaluator::count_passed(&results),
            total = results.len(),
            success,
            round_ms = start.elapsed().as_millis() as u64,
            "Round complete"
        );

        RoundOutcome {
            attempt,
            code,
            results,
            success,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::{anyhow, Result};
    use async_trait::async_trait;
    use autojudge_common::store::InMemoryQuestionStore;
    use autojudge_common::types::{TestCase, NO_TEST_CASES};
    use std::collections::VecDeque;
    use std::sync::Mutex;

    /// Replays canned responses and records every prompt it receives
    struct ScriptedGenerator {
        responses: Mutex<VecDeque<Result<String>>>,
        prompts: Mutex<Vec<String>>,
    }

    impl ScriptedGenerator {
        fn new(responses: Vec<Result<String>>) -> Arc<Self> {
            Arc::new(Self {
                responses: Mutex::new(responses.into()),
                prompts: Mutex::new(Vec::new()),
            })
        }

        fn prompts(&self) -> Vec<String> {
            self.prompts.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl CodeGenerator for ScriptedGenerator {
        async fn generate(&self, prompt: &str) -> Result<String> {
            self.prompts.lock().unwrap().push(prompt.to_string());
            self.responses
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Err(anyhow!("script exhausted")))
        }
    }

    /// "Runs" a candidate by asking `judge` what it would print for each input
    struct FakeExecutor {
        judge: fn(&str, &TestCase) -> String,
        codes: Mutex<Vec<String>>,
    }

    impl FakeExecutor {
        fn new(judge: fn(&str, &TestCase) -> String) -> Arc<Self> {
            Arc::new(Self {
                judge,
                codes: Mutex::new(Vec::new()),
            })
        }

        fn codes(&self) -> Vec<String> {
            self.codes.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl ExecutionProvider for FakeExecutor {
        fn name(&self) -> &'static str {
            "fake"
        }

        fn supports(&self, _language: Language) -> bool {
            true
        }

        async fn execute(&self, code: &str, _language: Language, cases: &[TestCase]) -> Vec<TestResult> {
            self.codes.lock().unwrap().push(code.to_string());
            cases
                .iter()
                .map(|case| {
                    let output = (self.judge)(code, case);
                    let passed = output == case.expected;
                    TestResult::for_case(case, output, passed)
                })
                .collect()
        }
    }

    /// "good" solves everything, anything else echoes a wrong answer
    fn good_or_wrong(code: &str, case: &TestCase) -> String {
        if code == "good" {
            case.expected.clone()
        } else {
            "wrong".to_string()
        }
    }

    fn ok(responses: &[&str]) -> Vec<Result<String>> {
        responses.iter().map(|r| Ok(r.to_string())).collect()
    }

    fn repair_loop(generator: Arc<ScriptedGenerator>, executor: Arc<FakeExecutor>) -> RepairLoop {
        RepairLoop::new(Arc::new(InMemoryQuestionStore::seeded()), generator, executor)
    }

    #[tokio::test]
    async fn test_success_on_first_attempt() {
        let generator = ScriptedGenerator::new(ok(&["good", "never used"]));
        let executor = FakeExecutor::new(good_or_wrong);
        let outcome = repair_loop(generator.clone(), executor).solve("1", Language::Go).await;

        assert!(outcome.success);
        assert_eq!(outcome.attempts, 1);
        assert_eq!(outcome.final_code, "good");
        assert_eq!(outcome.results.len(), 5);
        assert!(outcome.results.iter().all(|r| r.passed));
        assert_eq!(generator.prompts().len(), 1);
    }

    #[tokio::test]
    async fn test_success_on_third_attempt_stops_generating() {
        let generator = ScriptedGenerator::new(ok(&["bad", "bad", "good", "never used"]));
        let executor = FakeExecutor::new(good_or_wrong);
        let outcome = repair_loop(generator.clone(), executor).solve("3", Language::Python).await;

        assert!(outcome.success);
        assert_eq!(outcome.attempts, 3);
        assert_eq!(generator.prompts().len(), 3);
    }

    #[tokio::test]
    async fn test_exhaustion_reports_last_round() {
        let generator = ScriptedGenerator::new(ok(&["bad1", "bad2", "bad3", "bad4", "bad5", "good"]));
        let executor = FakeExecutor::new(good_or_wrong);
        let outcome = repair_loop(generator.clone(), executor.clone())
            .solve("5", Language::Go)
            .await;

        assert!(!outcome.success);
        assert_eq!(outcome.attempts, 5);
        assert_eq!(outcome.final_code, "bad5");
        assert_eq!(outcome.results.len(), 5);
        assert!(outcome.error.is_none());
        assert_eq!(generator.prompts().len(), 5);
        assert_eq!(executor.codes().len(), 5);
    }

    #[tokio::test]
    async fn test_unknown_problem_consumes_no_attempts() {
        let generator = ScriptedGenerator::new(ok(&["good"]));
        let executor = FakeExecutor::new(good_or_wrong);
        let outcome = repair_loop(generator.clone(), executor.clone())
            .solve("999", Language::Go)
            .await;

        assert_eq!(outcome.attempts, 0);
        assert!(!outcome.success);
        assert_eq!(outcome.error.as_deref(), Some(NO_TEST_CASES));
        assert!(generator.prompts().is_empty());
        assert!(executor.codes().is_empty());
    }

    #[tokio::test]
    async fn test_empty_test_case_list_is_not_found() {
        let store = InMemoryQuestionStore::new([Question {
            id: "empty".to_string(),
            statement: "nothing".to_string(),
            test_cases: vec![],
        }]);
        let generator = ScriptedGenerator::new(ok(&["good"]));
        let outcome = RepairLoop::new(Arc::new(store), generator.clone(), FakeExecutor::new(good_or_wrong))
            .solve("empty", Language::Go)
            .await;
        assert!(outcome.is_error());
        assert!(generator.prompts().is_empty());
    }

    #[tokio::test]
    async fn test_buggy_even_odd_failure_fed_back_verbatim() {
        fn lowercase_odd(code: &str, case: &TestCase) -> String {
            if code == "good" {
                case.expected.clone()
            } else {
                "odd".to_string()
            }
        }
        let generator = ScriptedGenerator::new(ok(&["buggy", "good"]));
        let executor = FakeExecutor::new(lowercase_odd);
        let outcome = repair_loop(generator.clone(), executor).solve("7", Language::Go).await;

        assert!(outcome.success);
        assert_eq!(outcome.attempts, 2);

        let prompts = generator.prompts();
        assert!(!prompts[0].contains("Previous attempt failed"));
        assert!(prompts[1].contains("Input: 2\nExpected: Even\nGot: odd\n"));
    }

    #[tokio::test]
    async fn test_feedback_only_from_previous_round() {
        // First round fails input "2 3" only, second round fails "10 20" only
        fn staged(code: &str, case: &TestCase) -> String {
            match (code, case.input.as_str()) {
                ("first", "2 3") => "first-wrong".to_string(),
                ("second", "10 20") => "second-wrong".to_string(),
                _ => case.expected.clone(),
            }
        }
        let generator = ScriptedGenerator::new(ok(&["first", "second", "third"]));
        let executor = FakeExecutor::new(staged);
        let outcome = repair_loop(generator.clone(), executor).solve("1", Language::Go).await;

        assert!(outcome.success);
        assert_eq!(outcome.attempts, 3);
        let prompts = generator.prompts();
        assert!(prompts[1].contains("Got: first-wrong"));
        assert!(prompts[2].contains("Got: second-wrong"));
        assert!(!prompts[2].contains("first-wrong"));
    }

    #[tokio::test]
    async fn test_generation_failure_consumes_attempt() {
        let generator = ScriptedGenerator::new(vec![Err(anyhow!("connection refused")), Ok("good".to_string())]);
        let executor = FakeExecutor::new(good_or_wrong);
        let outcome = repair_loop(generator.clone(), executor.clone())
            .solve("1", Language::Go)
            .await;

        assert!(outcome.success);
        assert_eq!(outcome.attempts, 2);
        // Nothing was executed for the failed generation
        assert_eq!(executor.codes(), vec!["good"]);
        assert!(generator.prompts()[1].contains("Code generation failed: connection refused"));
    }

    #[tokio::test]
    async fn test_fenced_response_is_unwrapped_before_execution() {
        let generator = ScriptedGenerator::new(ok(&["Sure!\n```go\ngood\n```\nDone."]));
        let executor = FakeExecutor::new(good_or_wrong);
        let outcome = repair_loop(generator, executor.clone()).solve("1", Language::Go).await;

        assert!(outcome.success);
        assert_eq!(executor.codes(), vec!["good"]);
    }

    #[tokio::test]
    async fn test_zero_attempt_ceiling() {
        let generator = ScriptedGenerator::new(ok(&["good"]));
        let outcome = repair_loop(generator.clone(), FakeExecutor::new(good_or_wrong))
            .with_max_attempts(0)
            .solve("1", Language::Go)
            .await;

        assert_eq!(outcome.attempts, 0);
        assert!(!outcome.success);
        assert!(outcome.error.is_none());
        assert!(generator.prompts().is_empty());
    }
}
