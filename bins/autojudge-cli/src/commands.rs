// CLI commands for judging, solving and managing AutoJudge
use anyhow::{bail, Context, Result};
use autojudge_common::config::Config;
use autojudge_common::store::{self, InMemoryQuestionStore, RedisQuestionStore};
use autojudge_common::types::{Language, SolveOutcome, TestResult};
use autojudge_engine::evaluator;
use autojudge_engine::language::LanguageConfigManager;
use autojudge_engine::{provider, OllamaGenerator, RepairLoop};
use std::fs;
use std::path::Path;
use std::sync::Arc;

fn parse_language(name: &str) -> Result<Language> {
    match Language::parse(name) {
        Some(language) => Ok(language),
        None => bail!(
            "Unknown language '{}'. Known: {}",
            name,
            Language::ALL.map(|l| l.as_str()).join(", ")
        ),
    }
}

/// Single-line preview of possibly multi-line output
fn preview(text: &str, limit: usize) -> String {
    let flat = text.replace('\n', "\\n");
    if flat.chars().count() > limit {
        format!("{}...", flat.chars().take(limit).collect::<String>())
    } else {
        flat
    }
}

fn format_results(results: &[TestResult]) -> String {
    let mut out = String::new();
    out.push_str(&format!("{:<4} {:<6} {:<20} {:<20} {}\n", "#", "PASS", "INPUT", "EXPECTED", "OUTPUT"));
    out.push_str(&format!("{}\n", "─".repeat(80)));
    for (idx, result) in results.iter().enumerate() {
        out.push_str(&format!(
            "{:<4} {:<6} {:<20} {:<20} {}\n",
            idx + 1,
            if result.passed { "✅" } else { "❌" },
            preview(&result.input, 18),
            preview(&result.expected, 18),
            preview(&result.output, 60),
        ));
    }
    let passed = evaluator::count_passed(results);
    out.push_str(&format!("\n{}/{} test case(s) passed\n", passed, results.len()));
    out
}

/// Judge a file; returns whether every test case passed
pub async fn run_submission(problem: &str, language: &str, file: &Path) -> Result<bool> {
    let language = parse_language(language)?;
    let code = fs::read_to_string(file)
        .with_context(|| format!("Failed to read source file: {}", file.display()))?;

    let config = Config::from_env()?;
    let store = store::connect(&config).await?;
    let executor = provider::from_config(&config)?;

    if !executor.supports(language) {
        bail!("Language '{}' is not supported by the {} executor", language, executor.name());
    }

    let question = match store.lookup(problem).await? {
        Some(q) if !q.test_cases.is_empty() => q,
        _ => bail!("No test cases found for problem '{}'", problem),
    };

    println!("🚀 Judging {} ({}) against problem {}", file.display(), language, problem);
    let results = executor.execute(&code, language, &question.test_cases).await;
    print!("{}", format_results(&results));

    let accepted = evaluator::summarize(&results);
    println!("{}", verdict(accepted));
    Ok(accepted)
}

fn verdict(accepted: bool) -> &'static str {
    if accepted {
        "✅ Accepted"
    } else {
        "❌ Rejected"
    }
}

fn format_outcome(outcome: &SolveOutcome) -> String {
    let mut out = String::new();
    if let Some(error) = &outcome.error {
        out.push_str(&format!("❌ {}\n", error));
        return out;
    }
    out.push_str(&format!(
        "{} after {} attempt(s)\n\n",
        if outcome.success { "✅ Solved" } else { "❌ Max attempts reached" },
        outcome.attempts
    ));
    out.push_str("📄 Final code:\n");
    out.push_str(&outcome.final_code);
    out.push_str("\n\n");
    out.push_str(&format_results(&outcome.results));
    out
}

/// Run the repair loop; returns whether the problem was solved
pub async fn solve_problem(problem: &str, language: &str, max_attempts: Option<u32>) -> Result<bool> {
    let language = parse_language(language)?;
    let config = Config::from_env()?;

    let store = store::connect(&config).await?;
    let executor = provider::from_config(&config)?;
    let generator = Arc::new(OllamaGenerator::from_config(&config)?);
    let max_attempts = max_attempts.unwrap_or(config.max_attempts);

    println!(
        "🤖 Solving problem {} in {} with {} (up to {} attempt(s))",
        problem, language, config.generator_model, max_attempts
    );

    let outcome = RepairLoop::new(store, generator, executor)
        .with_max_attempts(max_attempts)
        .solve(problem, language)
        .await;

    print!("{}", format_outcome(&outcome));
    Ok(outcome.success)
}

/// List problems held by the configured store
pub async fn list_problems() -> Result<()> {
    let config = Config::from_env()?;
    let store = store::connect(&config).await?;
    let ids = store.list().await?;

    if ids.is_empty() {
        println!("No problems found.");
        println!("\n💡 Load the built-in set with: autojudge-cli seed-redis");
        return Ok(());
    }

    println!("📋 Problems:\n");
    println!("{:<8} {:<8} {}", "ID", "CASES", "STATEMENT");
    println!("{}", "─".repeat(80));
    for id in &ids {
        if let Some(question) = store.lookup(id).await? {
            println!(
                "{:<8} {:<8} {}",
                question.id,
                question.test_cases.len(),
                preview(&question.statement, 60)
            );
        }
    }
    println!("\n✅ Total: {} problem(s)", ids.len());
    Ok(())
}

/// List toolchains the local executor would use
pub fn list_languages() -> Result<()> {
    let config = Config::from_env()?;
    let manager = LanguageConfigManager::load_or_builtin(&config.languages_path)?;

    println!("📋 Configured Languages ({}):\n", config.languages_path.display());
    println!("{:<12} {:<14} {:<30} {}", "NAME", "SOURCE", "BUILD", "RUN");
    println!("{}", "─".repeat(80));
    for language in manager.list_languages() {
        if let Some(lang) = manager.get_config(language) {
            println!(
                "{:<12} {:<14} {:<30} {}",
                lang.name,
                lang.source_file,
                lang.build.as_ref().map(|b| b.join(" ")).unwrap_or_else(|| "-".to_string()),
                lang.run.join(" ")
            );
        }
    }
    Ok(())
}

/// Push questions to Redis
pub async fn seed_redis(file: Option<&Path>) -> Result<()> {
    let config = Config::from_env()?;
    let redis_url = match &config.redis_url {
        Some(url) => url.clone(),
        None => bail!("REDIS_URL must be set to seed Redis"),
    };

    let source = match file {
        Some(path) => InMemoryQuestionStore::load(path)?,
        None => InMemoryQuestionStore::seeded(),
    };
    let redis = RedisQuestionStore::connect(&redis_url).await?;

    println!("📝 Seeding {}...", redis_url);
    let questions = source.questions();
    for question in &questions {
        redis.put(question).await?;
        println!("  ✅ {} ({} test case(s))", store::question_key(&question.id), question.test_cases.len());
    }
    println!("✅ Seeded {} problem(s)", questions.len());
    Ok(())
}

/// Write the built-in toolchains to `path`
pub fn init_config(path: &Path, force: bool) -> Result<()> {
    if path.exists() && !force {
        bail!("{} already exists (use --force to overwrite)", path.display());
    }

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
    }

    let json_content = LanguageConfigManager::builtin().to_json()?;
    fs::write(path, json_content)
        .with_context(|| format!("Failed to write {}", path.display()))?;

    println!("✅ Created: {}", path.display());
    println!("\n📋 Next steps:");
    println!("  1. Adjust build/run commands for the toolchains on this host");
    println!("  2. Point LANGUAGES_CONFIG at the file if it is not in the default location");
    Ok(())
}
