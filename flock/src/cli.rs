use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use std::time::Duration;

fn parse_duration(input: &str) -> Result<Duration, String> {
    let s = input.trim();
    if s.is_empty() {
        return Err("duration cannot be empty (expected e.g. 10s, 250ms, 1m)".to_string());
    }

    // Bare numbers are seconds, as in plan files.
    if let Ok(secs) = s.parse::<u64>() {
        return Ok(Duration::from_secs(secs));
    }

    humantime::parse_duration(s)
        .map_err(|err| format!("invalid duration '{s}': {err} (expected e.g. 10s, 250ms, 1m)"))
}

fn parse_env_pair(input: &str) -> Result<(String, String), String> {
    let (k, v) = input
        .split_once('=')
        .ok_or_else(|| format!("invalid --env (expected KEY=VALUE): {input}"))?;
    if k.is_empty() {
        return Err(format!("invalid --env (empty KEY): {input}"));
    }
    Ok((k.to_string(), v.to_string()))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    /// Human-readable progress and summary.
    HumanReadable,
    /// Emit JSON progress and summary lines (NDJSON) to stdout.
    Json,
}

#[derive(Debug, Parser)]
#[command(
    name = "flock",
    author,
    version,
    about = "Declarative HTTP load testing",
    long_about = "flock drives a population of virtual users against an HTTP service.\n\nA YAML plan describes the scenario (an ordered list of request and sleep steps), the load profile (constant `vus`/`duration` or ramping `stages`) and pass/fail thresholds.\n\nRequest URLs, headers and bodies are templates: `${uuid}`, `${vu}`, `${iteration}`, `${timestamp}`, `${random}` and `${env.NAME}` are substituted per iteration.\n\nEnvironment variables from the current process are visible to the plan; the plan's `env` and `--env KEY=VALUE` add/override values, in that order.",
    after_help = "Examples:\n  flock run demos/get_all_tweets.yaml\n  flock run demos/create_tweets.yaml --vus 10 --duration 15s\n  flock run demos/create_user.yaml --env BASE_URL=http://localhost:8000 --output json\n  flock validate demos/create_user.yaml\n\nSet FLOCK_LOG (e.g. FLOCK_LOG=debug) to control diagnostic logging on stderr."
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run a load test plan
    #[command(
        long_about = "Run a plan and report latency, status and threshold results.\n\nCLI flags override values from the plan; `--vus`/`--duration` turn a staged plan into a constant one.\n\nExit codes: 0 success, 11 thresholds failed, 30 invalid input, 40 runtime error."
    )]
    Run(RunArgs),

    /// Check a plan without sending any requests
    Validate(ValidateArgs),
}

#[derive(Debug, Args)]
pub struct PlanArgs {
    /// Path to the plan (.yaml)
    pub plan: PathBuf,

    /// Add/override env vars visible to templates (repeatable, KEY=VALUE).
    /// CLI-provided vars override the plan's `env` and the current process env.
    #[arg(long = "env", value_name = "KEY=VALUE", value_parser = parse_env_pair)]
    pub env: Vec<(String, String)>,
}

#[derive(Debug, Args)]
pub struct RunArgs {
    #[command(flatten)]
    pub plan: PlanArgs,

    /// Number of virtual users
    #[arg(long)]
    pub vus: Option<u64>,

    /// Test duration (e.g. 10s, 250ms, 1m)
    #[arg(long, value_parser = parse_duration)]
    pub duration: Option<Duration>,

    /// Output format
    #[arg(long, value_enum, default_value_t = OutputFormat::HumanReadable)]
    pub output: OutputFormat,
}

#[derive(Debug, Args)]
pub struct ValidateArgs {
    #[command(flatten)]
    pub plan: PlanArgs,
}
