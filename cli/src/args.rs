use application::ApplicationError;
use clap::{Parser, ValueEnum};
use domain::RunConfig;
use std::path::PathBuf;

/// Import the casebooks data into two db files.
#[derive(Debug, Parser)]
#[command(name = "generate-db", version)]
pub struct Cli {
    /// Data directory of the Casebooks project
    #[arg(short = 'd', long, env = "CASEBOOK_DATA_DIR", value_name = "PATH")]
    pub data_dir: Option<PathBuf>,

    /// Simulate (don't alter anything)
    #[arg(short, long)]
    pub simulate: bool,

    /// Show progress
    #[arg(short, long)]
    pub verbose: bool,

    /// Format of diagnostic log output on stderr
    #[arg(long, env = "CASEBOOK_LOG_FORMAT", value_enum, default_value_t = LogFormat::Text)]
    pub log_format: LogFormat,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    Text,
    Json,
}

impl Cli {
    pub fn run_config(&self) -> Result<RunConfig, ApplicationError> {
        let data_dir = self.data_dir.clone().ok_or_else(|| {
            ApplicationError::InvalidInput(
                "a data directory is required (--data-dir or CASEBOOK_DATA_DIR)".to_string(),
            )
        })?;
        Ok(RunConfig::new(data_dir, self.simulate, self.verbose))
    }
}
