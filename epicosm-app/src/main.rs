use anyhow::{Context, Result};
use clap::Parser;
use cli::{Cli, Command};
use epicosm_common::observability::{LogConfig, LogFormat, init_logging};
use epicosm_config::{EpicosmConfig, EpicosmConfigLoader};
use epicosm_harvest::HarvestError;
use runner::Runner;
use std::process::ExitCode;

mod cli;
mod runner;

/// Exit status when the upstream rejects the bearer token.
const EXIT_UNAUTHORIZED: u8 = 129;
/// Exit status after Ctrl-C.
const EXIT_INTERRUPTED: u8 = 130;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let cfg = match EpicosmConfigLoader::new().with_optional_file(&cli.config).load() {
        Ok(cfg) => cfg,
        Err(err) => {
            eprintln!("epicosm: configuration error in {}: {err}", cli.config.display());
            return ExitCode::FAILURE;
        }
    };

    match init_logging(log_config(&cfg)) {
        Ok(path) => tracing::info!(log_file = %path.display(), "epicosm.start"),
        Err(err) => eprintln!("epicosm: logging disabled: {err:#}"),
    }

    tokio::select! {
        res = run(cli.command, &cfg) => match res {
            Ok(()) => ExitCode::SUCCESS,
            Err(err) if is_unauthorized(&err) => {
                tracing::error!(error = %err, "epicosm.unauthorized");
                eprintln!("epicosm: {err:#}");
                ExitCode::from(EXIT_UNAUTHORIZED)
            }
            Err(err) => {
                tracing::error!(error = format!("{err:#}"), "epicosm.failed");
                eprintln!("epicosm: {err:#}");
                ExitCode::FAILURE
            }
        },
        _ = tokio::signal::ctrl_c() => {
            tracing::warn!("epicosm.interrupted");
            ExitCode::from(EXIT_INTERRUPTED)
        }
    }
}

async fn run(command: Command, cfg: &EpicosmConfig) -> Result<()> {
    let runner = Runner::from_config(cfg).await?;
    match command {
        Command::Harvest(args) => runner.harvest(&args).await.context("harvest")?,
        Command::Score {
            collection,
            algorithm,
        } => runner
            .score(collection, &algorithm)
            .await
            .with_context(|| format!("scoring {collection} with {algorithm}"))?,
    }
    Ok(())
}

fn log_config(cfg: &EpicosmConfig) -> LogConfig {
    LogConfig {
        log_dir: cfg.logging.dir.clone(),
        emit_stderr: cfg.logging.stderr,
        format: LogFormat::parse(&cfg.logging.format).unwrap_or(LogFormat::Text),
        default_filter: cfg.logging.filter.clone(),
        ..LogConfig::default()
    }
}

fn is_unauthorized(err: &anyhow::Error) -> bool {
    err.downcast_ref::<HarvestError>()
        .is_some_and(HarvestError::is_fatal)
}
