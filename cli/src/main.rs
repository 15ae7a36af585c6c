mod args;
mod console;

use clap::Parser;
use clap::error::ErrorKind;
use std::process::ExitCode;
use std::sync::Arc;
use tracing::{debug, info, level_filters::LevelFilter};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use application::{ApplicationError, GenerateDbService, RunSummary};
use args::{Cli, LogFormat};
use console::ConsoleReporter;
use infrastructure::{FileDocumentStore, StoreOptions};

const EXIT_OK: u8 = 0;
const EXIT_ERROR: u8 = 1;

// Application entry point
#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    // `--help` exits here, before any filesystem or store work
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            let _ = e.print();
            return ExitCode::from(parse_status(&e));
        }
    };
    init_logging(&cli);

    let result = run(&cli).await;
    match &result {
        Ok(summary) => {
            for line in console::summary_lines(summary) {
                println!("{}", line);
            }
            info!(failures = summary.failure_count(), "Run finished");
        }
        Err(e) => {
            debug!(error = ?e, "Run failed");
            eprintln!("error: {}", e);
        }
    }
    ExitCode::from(run_status(&result))
}

/// Help and version requests succeed; every other command-line error is a failure.
fn parse_status(err: &clap::Error) -> u8 {
    match err.kind() {
        ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => EXIT_OK,
        _ => EXIT_ERROR,
    }
}

/// Per-file failures live in the summary and leave the status untouched.
fn run_status(result: &Result<RunSummary, ApplicationError>) -> u8 {
    match result {
        Ok(_) => EXIT_OK,
        Err(_) => EXIT_ERROR,
    }
}

// --- Logger Initialization ---
fn init_logging(cli: &Cli) {
    let default_level = if cli.verbose {
        LevelFilter::INFO
    } else {
        LevelFilter::WARN
    };
    let filter: EnvFilter = EnvFilter::builder()
        .with_default_directive(default_level.into())
        .from_env_lossy();
    let registry = tracing_subscriber::registry().with(filter);
    match cli.log_format {
        LogFormat::Text => registry
            .with(fmt::layer().with_writer(std::io::stderr))
            .init(),
        LogFormat::Json => registry
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init(),
    }
}

async fn run(cli: &Cli) -> Result<RunSummary, ApplicationError> {
    let config = Arc::new(cli.run_config()?);
    info!(data_dir = %config.layout.data_dir.display(), simulate = config.simulate, "Starting import");

    // --- Dependency Injection ---
    let store = Arc::new(FileDocumentStore::new(StoreOptions {
        allow_external_access: true,
    }));
    let reporter = Arc::new(ConsoleReporter);

    GenerateDbService::new(config, store, reporter).run().await
}
