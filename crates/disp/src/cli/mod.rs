mod check;
mod run;

pub use check::CheckCommand;
pub use run::RunCommand;

use anyhow::Result;
use clap::{Parser, Subcommand};

/// disp - bounded-concurrency job dispatcher
#[derive(Parser)]
#[command(name = "disp")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

/// CLI commands.
#[derive(Subcommand)]
pub enum Commands {
    /// Run a simulated workload through a dispatcher.
    Run(RunCommand),

    /// Validate a configuration file and print the effective settings.
    Check(CheckCommand),
}

impl Cli {
    /// Execute the CLI command.
    pub async fn execute(self) -> Result<()> {
        match self.command {
            Commands::Run(cmd) => cmd.execute().await,
            Commands::Check(cmd) => cmd.execute(),
        }
    }
}

/// Load the config file if it exists, defaults otherwise.
pub(crate) fn load_config(path: &str) -> Result<disp::prelude::DispConfig> {
    let path = std::path::Path::new(path);
    if path.exists() {
        Ok(disp::prelude::DispConfig::from_file(path)?)
    } else {
        Ok(disp::prelude::DispConfig::default())
    }
}
