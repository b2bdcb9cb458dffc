use crate::config::Config;
use crate::types::{Question, TestCase};
use anyhow::{Context, Result};
use async_trait::async_trait;
use redis::AsyncCommands;
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use tracing::info;

/// Redis key semantics for stored questions.
/// Keys are deterministic so the API, the CLI seeder and any external
/// loader agree on where a question lives.
pub const QUESTION_PREFIX: &str = "autojudge:question";

pub fn question_key(problem_id: &str) -> String {
    format!("{}:{}", QUESTION_PREFIX, problem_id)
}

/// Read-only source of problems and their test cases
#[async_trait]
pub trait QuestionStore: Send + Sync {
    /// `Ok(None)` when the problem does not exist
    async fn lookup(&self, problem_id: &str) -> Result<Option<Question>>;

    /// All known problem ids, where the backend can enumerate them
    async fn list(&self) -> Result<Vec<String>>;
}

/// In-process question table
#[derive(Debug, Clone, Default)]
pub struct InMemoryQuestionStore {
    questions: HashMap<String, Question>,
}

impl InMemoryQuestionStore {
    pub fn new(questions: impl IntoIterator<Item = Question>) -> Self {
        Self {
            questions: questions.into_iter().map(|q| (q.id.clone(), q)).collect(),
        }
    }

    /// Load a JSON array of questions
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read questions file {}", path.display()))?;
        let questions: Vec<Question> = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse questions file {}", path.display()))?;
        Ok(Self::new(questions))
    }

    /// The reference problem set
    pub fn seeded() -> Self {
        Self::new(seed_questions())
    }

    /// Every question, ordered by id
    pub fn questions(&self) -> Vec<Question> {
        let mut questions: Vec<Question> = self.questions.values().cloned().collect();
        questions.sort_by(|a, b| a.id.cmp(&b.id));
        questions
    }
}

#[async_trait]
impl QuestionStore for InMemoryQuestionStore {
    async fn lookup(&self, problem_id: &str) -> Result<Option<Question>> {
        Ok(self.questions.get(problem_id).cloned())
    }

    async fn list(&self) -> Result<Vec<String>> {
        let mut ids: Vec<String> = self.questions.keys().cloned().collect();
        ids.sort();
        Ok(ids)
    }
}

/// Questions stored as JSON strings under `autojudge:question:{id}`
#[derive(Clone)]
pub struct RedisQuestionStore {
    conn: redis::aio::ConnectionManager,
}

impl RedisQuestionStore {
    pub async fn connect(redis_url: &str) -> Result<Self> {
        let client = redis::Client::open(redis_url).context("Invalid Redis URL")?;
        let conn = redis::aio::ConnectionManager::new(client)
            .await
            .context("Failed to connect to Redis")?;
        Ok(Self { conn })
    }

    pub async fn put(&self, question: &Question) -> Result<()> {
        let payload = serde_json::to_string(question).context("Failed to serialize question")?;
        let mut conn = self.conn.clone();
        let _: () = conn
            .set(question_key(&question.id), payload)
            .await
            .context("Failed to store question")?;
        Ok(())
    }
}

#[async_trait]
impl QuestionStore for RedisQuestionStore {
    async fn lookup(&self, problem_id: &str) -> Result<Option<Question>> {
        let mut conn = self.conn.clone();
        let payload: Option<String> = conn
            .get(question_key(problem_id))
            .await
            .context("Failed to read question from Redis")?;

        match payload {
            Some(data) => {
                let question = serde_json::from_str(&data)
                    .with_context(|| format!("Malformed question payload for {}", problem_id))?;
                Ok(Some(question))
            }
            None => Ok(None),
        }
    }

    async fn list(&self) -> Result<Vec<String>> {
        let mut conn = self.conn.clone();
        let keys: Vec<String> = conn
            .keys(format!("{}:*", QUESTION_PREFIX))
            .await
            .context("Failed to list questions in Redis")?;
        let prefix = format!("{}:", QUESTION_PREFIX);
        let mut ids: Vec<String> = keys
            .into_iter()
            .filter_map(|k| k.strip_prefix(&prefix).map(str::to_string))
            .collect();
        ids.sort();
        Ok(ids)
    }
}

/// Pick the question backend: Redis when configured, then a questions file,
/// then the built-in problem set
pub async fn connect(config: &Config) -> Result<Arc<dyn QuestionStore>> {
    if let Some(url) = &config.redis_url {
        info!(redis_url = %url, "Using Redis question store");
        return Ok(Arc::new(RedisQuestionStore::connect(url).await?));
    }
    if let Some(path) = &config.questions_path {
        info!(path = %path.display(), "Using file-backed question store");
        return Ok(Arc::new(InMemoryQuestionStore::load(path)?));
    }
    info!("Using built-in question set");
    Ok(Arc::new(InMemoryQuestionStore::seeded()))
}

fn question(id: &str, statement: &str, cases: &[(&str, &str)]) -> Question {
    Question {
        id: id.to_string(),
        statement: statement.to_string(),
        test_cases: cases
            .iter()
            .map(|(input, expected)| TestCase::new(*input, *expected))
            .collect(),
    }
}

pub fn seed_questions() -> Vec<Question> {
    vec![
        question(
            "1",
            "Read two integers from standard input separated by space and print their sum.",
            &[("2 3", "5"), ("10 20", "30"), ("-4 9", "5"), ("0 0", "0"), ("100 250", "350")],
        ),
        question(
            "3",
            "Read two integers from standard input separated by space and print their product.",
            &[("2 3", "6"), ("4 5", "20"), ("-3 7", "-21"), ("0 99", "0"), ("12 12", "144")],
        ),
        question(
            "5",
            "Read an integer and print its factorial.",
            &[("0", "1"), ("1", "1"), ("5", "120"), ("7", "5040"), ("10", "3628800")],
        ),
        question(
            "7",
            "Read an integer and print Even if number is even else print Odd.",
            &[("2", "Even"), ("7", "Odd"), ("0", "Even"), ("15", "Odd"), ("100", "Even")],
        ),
    ]
}
