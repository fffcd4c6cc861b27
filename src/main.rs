use anyhow::{Context, Result};
use clap::Parser;
use llm_optimizer::config::Config;
use llm_optimizer::lab::Executor;
use llm_optimizer::llm::GenerationClient;
use llm_optimizer::store::{load_champion, save_champion};
use llm_optimizer::{sanitize, OptimizationOutcome, Optimizer, ProblemSpec};
use std::fs;
use std::path::{Path, PathBuf};
use tracing_subscriber::filter::EnvFilter;

const DEFAULT_PROBLEM_PROMPT: &str = "
Write efficient Python code for calculating the sum of the first n prime numbers.

Requirements:
1. Include all necessary imports (math)
2. Include an optimized isprime() function
3. Main function must be named calculate_sum(n)
4. For n=10000, must output exactly 496165411
5. Code must be complete and runnable";

const DEFAULT_TEST_INPUT: i64 = 10_000;
const DEFAULT_EXPECTED_OUTPUT: &str = "496165411";

/// Starting point when no champion file exists.
const DEFAULT_SEED: &str = "
def calculate_sum(n):
    total = 0
    for i in range(n):
        total += i
    return total
";

#[derive(Parser, Debug)]
#[command(
    name = "llm-optimizer",
    about = "Iteratively ask a language model for faster, verified implementations",
    version
)]
struct Args {
    /// Config file (defaults to the user config directory)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Problem definition (TOML: prompt_text, test_input, expected_output, entry_point)
    #[arg(long)]
    problem: Option<PathBuf>,

    /// Number of generate/run rounds
    #[arg(short = 'n', long)]
    iterations: Option<usize>,

    /// Chat completions endpoint
    #[arg(long)]
    api_url: Option<String>,

    /// Model identifier sent with each request
    #[arg(long)]
    model: Option<String>,

    /// Where the best implementation is read from and saved to
    #[arg(long)]
    champion: Option<PathBuf>,

    /// Do not write the champion file at the end of the run
    #[arg(long)]
    no_save: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => Config::load_from(path)?,
        None => {
            tracing::debug!(path = %Config::config_location(), "loading config");
            Config::load()
        }
    };
    if let Some(url) = args.api_url {
        config.llm.api_url = url;
    }
    if let Some(model) = args.model {
        config.llm.model = model;
    }
    if let Some(path) = args.champion {
        config.run.champion_path = path;
    }
    let max_iterations = args.iterations.unwrap_or(config.run.max_iterations);

    let problem = match &args.problem {
        Some(path) => load_problem(path)?,
        None => ProblemSpec::new(
            DEFAULT_PROBLEM_PROMPT,
            DEFAULT_TEST_INPUT,
            DEFAULT_EXPECTED_OUTPUT,
        ),
    };

    let seed = match load_champion(&config.run.champion_path) {
        Some(stored) if !stored.code.source().trim().is_empty() => {
            tracing::info!(
                runtime_secs = stored.runtime_secs,
                path = %config.run.champion_path.display(),
                "found previous implementation"
            );
            stored.code
        }
        _ => {
            tracing::info!("starting with default initial implementation");
            sanitize::clean(DEFAULT_SEED, &problem.harness())
        }
    };

    let client = GenerationClient::new(config.llm.clone())?;
    let executor = Executor::new(config.sandbox.clone());
    let result = Optimizer::new(client, executor)
        .optimize(seed, &problem, max_iterations)
        .await;

    println!("\nFinal Results:");
    println!("Best implementation found:");
    println!("{}", result.best_code());
    match &result.outcome {
        OptimizationOutcome::Verified(champion) => {
            println!("Best execution time: {:.4}s", champion.elapsed_secs());
            if args.no_save {
                return Ok(());
            }
            save_champion(&config.run.champion_path, champion)?;
            println!(
                "\nBest implementation saved to '{}'",
                config.run.champion_path.display()
            );
        }
        OptimizationOutcome::NoneVerified { .. } => {
            println!("No implementation produced the expected output; nothing was saved.");
        }
    }

    Ok(())
}

fn load_problem(path: &Path) -> Result<ProblemSpec> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read problem file '{}'", path.display()))?;
    toml::from_str(&content)
        .with_context(|| format!("Failed to parse problem file '{}'", path.display()))
}
