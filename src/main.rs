use clap::Parser;
use colored::*;
use eyre::{Context, Result, eyre};
use log::{LevelFilter, info, warn};
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use squared::llm::OllamaClient;
use squared::puller::ModelPuller;
use squared::runner::{LoopOutcome, LoopRunner, TerminalSink, TerminalStyle};

mod cli;
mod config;

use cli::Cli;
use cli::commands::Commands;
use config::Config;

fn setup_logging() -> Result<()> {
    // Create log directory
    let log_dir = dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("squared")
        .join("logs");

    fs::create_dir_all(&log_dir).context("Failed to create log directory")?;

    let log_file = log_dir.join("squared.log");

    // Setup env_logger with file output
    let target = Box::new(
        fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&log_file)
            .context("Failed to open log file")?,
    );

    // The logger itself lets everything through unless RUST_LOG says otherwise;
    // the effective level is the global max level, adjusted once the config is loaded.
    env_logger::Builder::new()
        .filter_level(LevelFilter::Trace)
        .parse_default_env()
        .target(env_logger::Target::Pipe(target))
        .init();
    if !rust_log_set() {
        log::set_max_level(LevelFilter::Info);
    }

    info!("Logging initialized, writing to: {}", log_file.display());
    Ok(())
}

fn rust_log_set() -> bool {
    std::env::var_os("RUST_LOG").is_some()
}

/// Level named by `log_level` in the config; `None` when absent or unparseable
fn configured_level(level: Option<&str>) -> Option<LevelFilter> {
    level.and_then(|level| level.trim().parse().ok())
}

/// Apply the configured level unless RUST_LOG already decided it
fn apply_log_level(level: Option<&str>) {
    if rust_log_set() {
        return;
    }
    match configured_level(level) {
        Some(filter) => log::set_max_level(filter),
        None => {
            if let Some(level) = level {
                warn!("Unknown log_level {:?}, keeping info", level);
            }
        }
    }
}

async fn run_application(cli: &Cli, config: &Config) -> Result<()> {
    info!("Starting application");

    if cli.is_verbose() {
        println!("{}", "Verbose mode enabled".yellow());
    }

    match &cli.command {
        Commands::Start {
            model,
            max_attempts,
            prompt,
        } => handle_start_command(prompt, model.as_deref(), *max_attempts, config).await,
        Commands::Model { model } => handle_model_command(model, cli.config.as_ref()).await,
    }
}

async fn handle_start_command(
    prompt: &str,
    model: Option<&str>,
    max_attempts: Option<u32>,
    config: &Config,
) -> Result<()> {
    let runner_config = config.runner_config(model, max_attempts);
    let ollama_config = config.ollama_config();
    info!("Starting loop on {} via {}", runner_config.model, ollama_config.base_url);
    println!(
        "{} {} {}",
        "Model:".green(),
        runner_config.model,
        format!("({})", ollama_config.base_url).dimmed()
    );

    let backend = Arc::new(OllamaClient::new(ollama_config).context("Failed to create Ollama client")?);

    let interrupt = CancellationToken::new();
    let on_ctrl_c = interrupt.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            on_ctrl_c.cancel();
        }
    });

    let mut runner = LoopRunner::new(backend, runner_config, prompt, interrupt);
    let mut sink = TerminalSink::stdout(TerminalStyle::default());

    let outcome = runner.run(&mut sink).await.context("Loop failed")?;
    info!("Conversation ended with {} messages", runner.conversation().len());

    match outcome {
        LoopOutcome::Approved { attempts } => {
            println!("\n{} approved after {} attempt(s)", "Done:".green().bold(), attempts);
        }
        LoopOutcome::Interrupted { attempts } => {
            println!("\n{} after {} attempt(s)", "Stopped".yellow().bold(), attempts);
        }
        LoopOutcome::Exhausted { attempts } => {
            println!(
                "\n{} no approval after {} attempt(s)",
                "Gave up:".yellow().bold(),
                attempts
            );
        }
    }
    Ok(())
}

async fn handle_model_command(model: &str, config_path: Option<&PathBuf>) -> Result<()> {
    let puller = ModelPuller::default();
    println!("{} {}", "+".dimmed(), puller.command_line(model));
    puller.pull(model).await.context("Failed to pull model")?;

    let path = match config_path {
        Some(path) => path.clone(),
        None => Config::primary_path().ok_or_else(|| eyre!("Could not determine config directory"))?,
    };
    Config::save_default_model(&path, model)?;

    println!("{} {:?}", "default model →".green(), model);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    // Parse CLI arguments
    let cli = Cli::parse();

    // Setup logging first so config fallbacks are recorded
    setup_logging().context("Failed to setup logging")?;

    // Load configuration; `model` may be about to create the file named by -c
    let config = match cli.command {
        Commands::Model { .. } => Config::load_or_default(cli.config.as_ref()),
        _ => Config::load(cli.config.as_ref()),
    }
    .context("Failed to load configuration")?;
    apply_log_level(config.log_level.as_deref());

    info!("Starting with config from: {:?}", cli.config);

    // Run the main application logic
    if let Err(e) = run_application(&cli, &config).await {
        eprintln!("{} {:#}", "Error:".red().bold(), e);
        std::process::exit(1);
    }

    Ok(())
}
