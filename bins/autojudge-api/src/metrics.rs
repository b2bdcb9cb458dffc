// Prometheus metrics exposed on GET /metrics
use lazy_static::lazy_static;
use prometheus::{
    register_histogram_vec, register_int_counter_vec, Encoder, HistogramVec, IntCounterVec, TextEncoder,
};

lazy_static! {
    pub static ref SUBMISSIONS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "autojudge_submissions_total",
        "Submissions judged, by language and verdict",
        &["language", "verdict"]
    )
    .expect("metric can be registered");

    pub static ref TEST_CASES_TOTAL: IntCounterVec = register_int_counter_vec!(
        "autojudge_test_cases_total",
        "Test results produced, by language and pass/fail",
        &["language", "passed"]
    )
    .expect("metric can be registered");

    pub static ref SUBMISSION_DURATION: HistogramVec = register_histogram_vec!(
        "autojudge_submission_duration_seconds",
        "Wall-clock time to judge one submission",
        &["language"],
        vec![0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0]
    )
    .expect("metric can be registered");

    pub static ref SOLVES_TOTAL: IntCounterVec = register_int_counter_vec!(
        "autojudge_solves_total",
        "Repair-loop runs, by language and outcome",
        &["language", "outcome"]
    )
    .expect("metric can be registered");

    pub static ref SOLVE_ATTEMPTS: HistogramVec = register_histogram_vec!(
        "autojudge_solve_attempts",
        "Attempts consumed per repair-loop run",
        &["outcome"],
        vec![0.0, 1.0, 2.0, 3.0, 4.0, 5.0, 10.0]
    )
    .expect("metric can be registered");
}

/// Render every registered metric in the text exposition format
pub fn render() -> Result<String, prometheus::Error> {
    let mut buffer = Vec::new();
    TextEncoder::new().encode(&prometheus::gather(), &mut buffer)?;
    Ok(String::from_utf8_lossy(&buffer).into_owned())
}
