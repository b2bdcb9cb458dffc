// HTTP route handlers for the AutoJudge API

use axum::{
    extract::State,
    http::{header, StatusCode},
    response::{IntoResponse, Json, Response},
};
use autojudge_common::types::{Language, Question, NO_TEST_CASES};
use autojudge_engine::evaluator;
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use std::time::Instant;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::metrics;
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct SubmitRequest {
    #[serde(default, rename = "quesId", alias = "ques_id")]
    pub ques_id: Option<String>,
    #[serde(default)]
    pub language: Option<String>,
    #[serde(default)]
    pub code: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct SolveRequest {
    #[serde(default, rename = "quesId", alias = "ques_id")]
    pub ques_id: Option<String>,
    #[serde(default)]
    pub language: Option<String>,
    #[serde(default, rename = "maxAttempts", alias = "max_attempts")]
    pub max_attempts: Option<u32>,
}

fn error_response(status: StatusCode, message: impl Into<String>) -> Response {
    (status, Json(json!({ "error": message.into() }))).into_response()
}

/// Present and non-blank
fn required<'a>(value: &'a Option<String>, field: &str) -> Result<&'a str, Response> {
    match value.as_deref().map(str::trim) {
        Some(v) if !v.is_empty() => Ok(v),
        _ => Err(error_response(
            StatusCode::BAD_REQUEST,
            format!("Missing required field: {}", field),
        )),
    }
}

fn resolve_language(state: &AppState, name: &str) -> Result<Language, Response> {
    match Language::parse(name) {
        Some(language) if state.executor.supports(language) => Ok(language),
        _ => Err(error_response(
            StatusCode::BAD_REQUEST,
            format!("Unsupported language: {}", name),
        )),
    }
}

async fn find_question(state: &AppState, ques_id: &str) -> Result<Question, Response> {
    match state.store.lookup(ques_id).await {
        Ok(Some(question)) if !question.test_cases.is_empty() => Ok(question),
        Ok(_) => Err(error_response(StatusCode::NOT_FOUND, NO_TEST_CASES)),
        Err(e) => {
            error!(ques_id = %ques_id, error = %format!("{:#}", e), "Question lookup failed");
            Err(error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("Failed to load question: {}", e),
            ))
        }
    }
}

/// POST /submit - Judge a submission against every test case of a question
pub async fn submit(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<SubmitRequest>,
) -> Response {
    let submission_id = Uuid::new_v4();

    let (ques_id, language, code) = match (
        required(&payload.ques_id, "quesId"),
        required(&payload.language, "language"),
        required(&payload.code, "code"),
    ) {
        (Ok(q), Ok(l), Ok(_)) => (q, l, payload.code.as_deref().unwrap_or_default()),
        (Err(r), _, _) | (_, Err(r), _) | (_, _, Err(r)) => return r,
    };

    let language = match resolve_language(&state, language) {
        Ok(language) => language,
        Err(response) => {
            warn!(submission_id = %submission_id, language = %language, "Rejected unsupported language");
            metrics::SUBMISSIONS_TOTAL.with_label_values(&["unknown", "rejected"]).inc();
            return response;
        }
    };

    let question = match find_question(&state, ques_id).await {
        Ok(question) => question,
        Err(response) => return response,
    };

    let start = Instant::now();
    let results = state.executor.execute(code, language, &question.test_cases).await;
    let elapsed = start.elapsed();

    let passed = evaluator::count_passed(&results);
    let accepted = evaluator::summarize(&results);

    info!(
        submission_id = %submission_id,
        ques_id = %ques_id,
        language = %language,
        passed,
        total = results.len(),
        accepted,
        execution_ms = elapsed.as_millis() as u64,
        "Submission judged"
    );

    let verdict = if accepted { "accepted" } else { "rejected" };
    metrics::SUBMISSIONS_TOTAL
        .with_label_values(&[language.as_str(), verdict])
        .inc();
    metrics::SUBMISSION_DURATION
        .with_label_values(&[language.as_str()])
        .observe(elapsed.as_secs_f64());
    for result in &results {
        metrics::TEST_CASES_TOTAL
            .with_label_values(&[language.as_str(), if result.passed { "true" } else { "false" }])
            .inc();
    }

    (StatusCode::OK, Json(results)).into_response()
}

/// POST /solve - Run the repair loop for a question
pub async fn solve(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<SolveRequest>,
) -> Response {
    let (ques_id, language) = match (
        required(&payload.ques_id, "quesId"),
        required(&payload.language, "language"),
    ) {
        (Ok(q), Ok(l)) => (q, l),
        (Err(r), _) | (_, Err(r)) => return r,
    };

    let language = match resolve_language(&state, language) {
        Ok(language) => language,
        Err(response) => return response,
    };

    // The configured limit is a ceiling; callers may only ask for fewer rounds
    let ceiling = state.repair.max_attempts();
    let max_attempts = payload.max_attempts.map_or(ceiling, |n| n.min(ceiling));

    info!(ques_id = %ques_id, language = %language, max_attempts, "Solve requested");
    let outcome = state
        .repair
        .solve_with_limit(ques_id, language, max_attempts)
        .await;

    let label = match (&outcome.error, outcome.success) {
        (Some(_), _) => "error",
        (None, true) => "solved",
        (None, false) => "exhausted",
    };
    metrics::SOLVES_TOTAL
        .with_label_values(&[language.as_str(), label])
        .inc();
    metrics::SOLVE_ATTEMPTS
        .with_label_values(&[label])
        .observe(outcome.attempts as f64);

    info!(
        ques_id = %ques_id,
        attempts = outcome.attempts,
        success = outcome.success,
        "Solve finished"
    );

    let status = match outcome.error.as_deref() {
        Some(NO_TEST_CASES) => StatusCode::NOT_FOUND,
        Some(_) => StatusCode::INTERNAL_SERVER_ERROR,
        None => StatusCode::OK,
    };
    (status, Json(outcome)).into_response()
}

/// GET /status - Health check endpoint
pub async fn health_check(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    (
        StatusCode::OK,
        Json(json!({
            "status": "ok",
            "executor": state.executor.name(),
        })),
    )
}

/// GET /metrics - Prometheus text exposition
pub async fn metrics() -> Response {
    match metrics::render() {
        Ok(body) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            body,
        )
            .into_response(),
        Err(e) => {
            error!(error = %e, "Failed to encode metrics");
            error_response(StatusCode::INTERNAL_SERVER_ERROR, "Failed to encode metrics")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::routes;
    use anyhow::anyhow;
    use async_trait::async_trait;
    use autojudge_common::store::InMemoryQuestionStore;
    use autojudge_common::types::{TestCase, TestResult};
    use autojudge_engine::{CodeGenerator, ExecutionProvider, RepairLoop};
    use axum::body::Body;
    use axum::http::Request;
    use http_body_util::BodyExt;
    use serde_json::Value;
    use tower::ServiceExt;

    /// Passes every case whose expected output appears in the code
    struct EchoExecutor;

    #[async_trait]
    impl ExecutionProvider for EchoExecutor {
        fn name(&self) -> &'static str {
            "echo"
        }

        fn supports(&self, language: Language) -> bool {
            language != Language::Java
        }

        async fn execute(&self, code: &str, _language: Language, cases: &[TestCase]) -> Vec<TestResult> {
            cases
                .iter()
                .map(|case| {
                    let passed = code.contains(&case.expected);
                    let output = if passed { case.expected.clone() } else { "nope".to_string() };
                    TestResult::for_case(case, output, passed)
                })
                .collect()
        }
    }

    struct FixedGenerator(&'static str);

    #[async_trait]
    impl CodeGenerator for FixedGenerator {
        async fn generate(&self, _prompt: &str) -> anyhow::Result<String> {
            if self.0.is_empty() {
                return Err(anyhow!("generator offline"));
            }
            Ok(self.0.to_string())
        }
    }

    /// Produces no results at all
    struct SilentExecutor;

    #[async_trait]
    impl ExecutionProvider for SilentExecutor {
        fn name(&self) -> &'static str {
            "silent"
        }

        fn supports(&self, _language: Language) -> bool {
            true
        }

        async fn execute(&self, _code: &str, _language: Language, _cases: &[TestCase]) -> Vec<TestResult> {
            Vec::new()
        }
    }

    fn submissions_counted(language: &str, verdict: &str) -> u64 {
        metrics::SUBMISSIONS_TOTAL.with_label_values(&[language, verdict]).get()
    }

    fn app(generated: &'static str) -> axum::Router {
        app_with(Arc::new(EchoExecutor), generated)
    }

    fn app_with(executor: Arc<dyn ExecutionProvider>, generated: &'static str) -> axum::Router {
        let store: Arc<dyn autojudge_common::store::QuestionStore> = Arc::new(InMemoryQuestionStore::seeded());
        let repair = RepairLoop::new(Arc::clone(&store), Arc::new(FixedGenerator(generated)), Arc::clone(&executor));
        routes::routes().with_state(Arc::new(AppState::new(store, executor, repair)))
    }

    async fn post_json(app: axum::Router, uri: &str, body: Value) -> (StatusCode, Value) {
        let request = Request::builder()
            .method("POST")
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap();
        let response = app.oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn test_submit_all_cases_judged() {
        let (status, body) = post_json(
            app(""),
            "/submit",
            json!({"quesId": "7", "language": "go", "code": "Even Odd"}),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        let results = body.as_array().unwrap();
        assert_eq!(results.len(), 5);
        assert!(results.iter().all(|r| r["passed"] == true));
        assert_eq!(results[0]["input"], "2");
    }

    #[tokio::test]
    async fn test_submit_partial_failure_still_ok() {
        let (status, body) = post_json(
            app(""),
            "/submit",
            json!({"quesId": "7", "language": "python", "code": "Even"}),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        let failed: Vec<&Value> = body.as_array().unwrap().iter().filter(|r| r["passed"] == false).collect();
        assert_eq!(failed.len(), 2);
        assert_eq!(failed[0]["output"], "nope");
    }

    #[tokio::test]
    async fn test_submit_missing_fields() {
        let (status, body) = post_json(app(""), "/submit", json!({"quesId": "1", "language": "go"})).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"].as_str().unwrap().contains("code"));

        let (status, _) = post_json(app(""), "/submit", json!({"quesId": " ", "language": "go", "code": "x"})).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_submit_unsupported_language() {
        let (status, _) = post_json(
            app(""),
            "/submit",
            json!({"quesId": "1", "language": "cobol", "code": "x"}),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        // Known language the active provider cannot run
        let (status, body) = post_json(
            app(""),
            "/submit",
            json!({"quesId": "1", "language": "java", "code": "x"}),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"].as_str().unwrap().contains("java"));
    }

    #[tokio::test]
    async fn test_submit_unknown_question() {
        let (status, body) = post_json(
            app(""),
            "/submit",
            json!({"quesId": "999", "language": "go", "code": "x"}),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"], NO_TEST_CASES);
    }

    #[tokio::test]
    async fn test_solve_success() {
        let (status, body) = post_json(
            app("```go\n5 30 0 350\n```"),
            "/solve",
            json!({"quesId": "1", "language": "go"}),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["success"], true);
        assert_eq!(body["attempts"], 1);
        assert_eq!(body["finalCode"], "5 30 0 350");
    }

    #[tokio::test]
    async fn test_solve_exhausts_custom_limit() {
        let (status, body) = post_json(
            app("wrong"),
            "/solve",
            json!({"quesId": "3", "language": "python", "maxAttempts": 2}),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["success"], false);
        assert_eq!(body["attempts"], 2);
        assert_eq!(body["results"].as_array().unwrap().len(), 5);
    }

    #[tokio::test]
    async fn test_solve_attempts_capped_at_configured_limit() {
        let (status, body) = post_json(
            app("wrong"),
            "/solve",
            json!({"quesId": "3", "language": "python", "maxAttempts": 1000000}),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["success"], false);
        assert_eq!(body["attempts"], 5);
    }

    #[tokio::test]
    async fn test_submit_without_results_is_rejected() {
        // Only this test submits javascript, so the counters are not shared
        let accepted = submissions_counted("javascript", "accepted");
        let rejected = submissions_counted("javascript", "rejected");

        let (status, body) = post_json(
            app_with(Arc::new(SilentExecutor), ""),
            "/submit",
            json!({"quesId": "1", "language": "javascript", "code": "x"}),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert!(body.as_array().unwrap().is_empty());
        assert_eq!(submissions_counted("javascript", "accepted"), accepted);
        assert_eq!(submissions_counted("javascript", "rejected"), rejected + 1);
    }

    #[tokio::test]
    async fn test_solve_unknown_question() {
        let (status, body) = post_json(app("x"), "/solve", json!({"quesId": "999", "language": "go"})).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["attempts"], 0);
        assert_eq!(body["error"], NO_TEST_CASES);
    }

    #[tokio::test]
    async fn test_status_and_metrics() {
        let response = app("")
            .oneshot(Request::builder().uri("/status").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        // Make sure at least one series exists before scraping
        post_json(app(""), "/submit", json!({"quesId": "1", "language": "go", "code": "5"})).await;

        let response = app("")
            .oneshot(Request::builder().uri("/metrics").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let text = String::from_utf8_lossy(&bytes);
        assert!(text.contains("autojudge_submissions_total"));
    }
}
