//! Command-line front end for the sandboxed execution engine
//!
//! Submits a single job to the local container daemon and prints the verdict
//! in the same JSON shape the API layer returns. Useful for exercising a
//! harness build context by hand and for smoke-testing a deployment.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use judgebox_core::{ConfigLoader, JobExecutor, JudgeboxConfig};
use log::LevelFilter;
use std::path::{Path, PathBuf};

#[derive(Parser, Debug)]
#[clap(author, version, about = "Judgebox - run untrusted code in a sandbox and print the verdict")]
struct Cli {
    #[clap(subcommand)]
    command: Commands,

    #[clap(long, short, default_value = "judgebox.yaml", help = "Configuration file (defaults are used if it does not exist)")]
    config: PathBuf,

    #[clap(long, short, help = "Log level; overrides logging.level from the config file")]
    log_level: Option<String>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Grade code against a test specification
    Tests {
        #[clap(long, help = "File with the test specification")]
        tests: PathBuf,
        #[clap(long, help = "File with the source code")]
        code: PathBuf,
    },
    /// Run code with the given standard input
    Stdin {
        #[clap(long, help = "File fed to standard input (empty if omitted)")]
        stdin: Option<PathBuf>,
        #[clap(long, help = "File with the source code")]
        code: PathBuf,
    },
    /// Validate the configuration and check that the daemon is reachable
    Check,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = ConfigLoader::from_file_or_default(&cli.config)
        .await
        .with_context(|| format!("Failed to load configuration from {}", cli.config.display()))?;

    // Initialize logger
    let level = cli.log_level.as_deref().unwrap_or(&config.logging.level);
    let log_level_filter = level.parse().unwrap_or(LevelFilter::Info);
    env_logger::Builder::new()
        .filter_level(log_level_filter)
        .init();

    match cli.command {
        Commands::Tests { tests, code } => {
            let tests = read_input(&tests).await?;
            let code = read_input(&code).await?;
            let executor = connect(&config)?;
            let verdict = executor.submit_tests(tests, code).await?;
            println!("{}", serde_json::to_string_pretty(&verdict)?);
        }
        Commands::Stdin { stdin, code } => {
            let stdin = match stdin {
                Some(path) => read_input(&path).await?,
                None => String::new(),
            };
            let code = read_input(&code).await?;
            let executor = connect(&config)?;
            let verdict = executor.submit_stdin(stdin, code).await?;
            println!("{}", serde_json::to_string_pretty(&verdict)?);
        }
        Commands::Check => check(&config).await?,
    }

    Ok(())
}

fn connect(config: &JudgeboxConfig) -> Result<JobExecutor> {
    log::info!(
        "Connecting to container daemon (runtime: {}, memory limit: {} MiB, max concurrent: {})",
        if config.sandbox.runtime.is_empty() { "default" } else { config.sandbox.runtime.as_str() },
        config.sandbox.memory_limit_mb,
        config.admission.max_concurrent_executions
    );
    JobExecutor::connect(config).context("Failed to connect to the container daemon")
}

async fn check(config: &JudgeboxConfig) -> Result<()> {
    let build_context = &config.sandbox.build_context;
    for entry in [
        &config.sandbox.dockerfile,
        &config.sandbox.tests_entrypoint,
        &config.sandbox.stdin_entrypoint,
    ] {
        let path = build_context.join(entry);
        if !path.exists() {
            anyhow::bail!("Build context is missing {}", path.display());
        }
    }
    println!("Build context: {}", build_context.display());

    let executor = connect(config)?;
    executor
        .runtime()
        .ping()
        .await
        .context("Container daemon did not answer ping")?;
    println!("Container daemon: reachable");
    println!("Broker endpoint (task queue): {}", config.queue.broker_url);
    Ok(())
}

async fn read_input(path: &Path) -> Result<String> {
    tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("Failed to read {}", path.display()))
}
