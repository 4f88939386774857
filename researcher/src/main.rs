//! Multi-round research orchestrator.
//!
//! `researcher run <QUERY>` plans, executes and evaluates research phases
//! against an OpenAI-compatible oracle, then prints the synthesized report.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use chrono::Utc;
use clap::{Parser, Subcommand};

use researcher::core::types::RunStatus;
use researcher::exit_codes;
use researcher::io::config::{
    CONFIG_FILE, ResearchConfig, load_config, resolve_api_key, write_config,
};
use researcher::io::openai::{OpenAiConfig, OpenAiOracle};
use researcher::io::run_log::write_run_artifacts;
use researcher::io::web::web_tools;
use researcher::logging;
use researcher::orchestrator::Orchestrator;

#[derive(Parser)]
#[command(
    name = "researcher",
    version,
    about = "Plan, execute and synthesize multi-round research"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Research a query and print the final report.
    Run {
        /// The research question.
        query: String,
        /// Config file (defaults apply when it does not exist).
        #[arg(short, long, default_value = CONFIG_FILE)]
        config: PathBuf,
        /// Directory for run_state.json, report.md and meta.json.
        #[arg(short, long)]
        out: Option<PathBuf>,
    },
    /// Write the default config file.
    Init {
        /// Overwrite an existing file.
        #[arg(short, long)]
        force: bool,
    },
}

#[tokio::main]
async fn main() {
    logging::init();
    let cli = Cli::parse();
    let code = match run(cli).await {
        Ok(code) => code,
        Err(err) => {
            eprintln!("{:#}", err);
            exit_codes::INVALID
        }
    };
    std::process::exit(code);
}

async fn run(cli: Cli) -> Result<i32> {
    match cli.command {
        Command::Run { query, config, out } => cmd_run(&query, &config, out.as_deref()).await,
        Command::Init { force } => cmd_init(force),
    }
}

async fn cmd_run(query: &str, config_path: &Path, out: Option<&Path>) -> Result<i32> {
    if query.trim().is_empty() {
        bail!("query must be non-empty");
    }
    // A missing .env is fine; the key may already be in the environment.
    let _ = dotenvy::dotenv();

    let cfg = load_config(config_path)?;
    let api_key = resolve_api_key(&cfg.oracle, |name| std::env::var(name).ok())?;
    let oracle = OpenAiOracle::new(OpenAiConfig {
        api_base: cfg.oracle.api_base.clone(),
        api_key,
        model: cfg.oracle.model.clone(),
        request_timeout: Duration::from_secs(cfg.oracle.request_timeout_secs),
    })
    .context("create oracle client")?;
    let tools = web_tools(&cfg.tools).context("create web tools")?;

    let started_at = Utc::now();
    let state = Orchestrator::new(Arc::new(oracle), Arc::new(tools), cfg)
        .run(query)
        .await;
    let finished_at = Utc::now();

    if let Some(dir) = out {
        write_run_artifacts(dir, &state, started_at, finished_at)?;
    }

    match (state.status, &state.final_report) {
        (RunStatus::Completed, Some(report)) => {
            println!("{report}");
            Ok(exit_codes::OK)
        }
        _ => {
            eprintln!("status: {}", state.status.as_str());
            for err in &state.errors {
                eprintln!("- {err}");
            }
            Ok(exit_codes::FAILED)
        }
    }
}

fn cmd_init(force: bool) -> Result<i32> {
    let path = Path::new(CONFIG_FILE);
    if path.exists() && !force {
        bail!("{} already exists (use --force to overwrite)", path.display());
    }
    write_config(path, &ResearchConfig::default())?;
    println!("wrote {}", path.display());
    Ok(exit_codes::OK)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_run_with_defaults() {
        let cli = Cli::parse_from(["researcher", "run", "What is QUIC?"]);
        match cli.command {
            Command::Run { query, config, out } => {
                assert_eq!(query, "What is QUIC?");
                assert_eq!(config, PathBuf::from(CONFIG_FILE));
                assert!(out.is_none());
            }
            Command::Init { .. } => panic!("expected run"),
        }
    }

    #[test]
    fn parse_run_with_config_and_out() {
        let cli = Cli::parse_from([
            "researcher",
            "run",
            "q",
            "--config",
            "custom.toml",
            "--out",
            "runs/1",
        ]);
        assert!(matches!(
            cli.command,
            Command::Run { config, out: Some(out), .. }
                if config == Path::new("custom.toml") && out == Path::new("runs/1")
        ));
    }

    #[test]
    fn parse_init() {
        let cli = Cli::parse_from(["researcher", "init"]);
        assert!(matches!(cli.command, Command::Init { force: false }));
    }

    #[test]
    fn parse_init_force() {
        let cli = Cli::parse_from(["researcher", "init", "--force"]);
        assert!(matches!(cli.command, Command::Init { force: true }));
    }

    #[test]
    fn run_requires_a_query() {
        assert!(Cli::try_parse_from(["researcher", "run"]).is_err());
    }
}
