mod commands;

use anyhow::Result;
use autojudge_common::config::DEFAULT_LANGUAGES_CONFIG;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "autojudge-cli")]
#[command(about = "AutoJudge CLI - Judge submissions, run the repair loop, manage problems and toolchains", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Judge a source file against a problem's test cases
    Run {
        /// Problem id (e.g., 1, 7)
        #[arg(short, long)]
        problem: String,

        /// Language name (e.g., go, python)
        #[arg(short, long)]
        language: String,

        /// Path to the source file
        #[arg(short, long)]
        file: PathBuf,
    },

    /// Generate code for a problem until it passes or attempts run out
    Solve {
        /// Problem id
        #[arg(short, long)]
        problem: String,

        /// Language name
        #[arg(short, long, default_value = "go")]
        language: String,

        /// Override JUDGE_MAX_ATTEMPTS
        #[arg(short, long)]
        max_attempts: Option<u32>,
    },

    /// List problems in the configured question store
    Problems,

    /// List configured toolchains
    Languages,

    /// Load problems into Redis (built-in set when no file is given)
    SeedRedis {
        /// JSON array of questions
        #[arg(short, long)]
        file: Option<PathBuf>,
    },

    /// Write the built-in toolchain config to disk
    InitConfig {
        /// Output path
        #[arg(short, long, default_value = DEFAULT_LANGUAGES_CONFIG)]
        path: PathBuf,

        /// Overwrite an existing file
        #[arg(long, default_value = "false")]
        force: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn"))
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Run { problem, language, file } => {
            let passed = commands::run_submission(&problem, &language, &file).await?;
            if !passed {
                std::process::exit(1);
            }
        }
        Commands::Solve { problem, language, max_attempts } => {
            let solved = commands::solve_problem(&problem, &language, max_attempts).await?;
            if !solved {
                std::process::exit(1);
            }
        }
        Commands::Problems => {
            commands::list_problems().await?;
        }
        Commands::Languages => {
            commands::list_languages()?;
        }
        Commands::SeedRedis { file } => {
            commands::seed_redis(file.as_deref()).await?;
        }
        Commands::InitConfig { path, force } => {
            commands::init_config(&path, force)?;
        }
    }

    Ok(())
}
