//! Tracing setup for the command line tool.
//!
//! `RUST_LOG` wins when set. Otherwise each `-v` raises the level from error
//! to trace, and without any flag logging stays off.

use std::fs::File;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;
use tracing::Level;
use tracing_subscriber::{EnvFilter, fmt};

#[derive(Debug, Clone, Default, Args)]
pub struct LogArgs {
    /// Increase logging verbosity (-v = error, -vv = warn, -vvv = info,
    /// -vvvv = debug, -vvvvv = trace)
    #[arg(short = 'v', action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Write logs to this file instead of stderr.
    #[arg(long = "log.file", visible_aliases = ["log-file"], value_name = "PATH", global = true)]
    pub log_file: Option<PathBuf>,

    /// Disable colors on stderr.
    #[arg(long = "log.no-color", visible_aliases = ["log-no-color"], global = true)]
    pub log_no_color: bool,
}

impl LogArgs {
    /// Installs the global subscriber. Targets are shown from debug up.
    pub fn init(&self) -> Result<()> {
        let filter = if std::env::var("RUST_LOG").is_ok() {
            EnvFilter::from_default_env()
        } else {
            EnvFilter::new(self.directive())
        };
        let show_target = self.verbose >= 4;

        let installed = if let Some(log_file) = &self.log_file {
            let file = File::create(log_file)
                .with_context(|| format!("failed to create log file {}", log_file.display()))?;
            fmt()
                .with_env_filter(filter)
                .with_target(show_target)
                .with_writer(file)
                .with_ansi(false)
                .try_init()
        } else {
            fmt()
                .with_env_filter(filter)
                .with_target(show_target)
                .with_writer(std::io::stderr)
                .with_ansi(!self.log_no_color)
                .try_init()
        };
        installed.map_err(|err| anyhow::anyhow!("failed to install logger: {err}"))
    }

    fn directive(&self) -> String {
        let level = match self.verbose {
            0 => return "off".to_string(),
            1 => Level::ERROR,
            2 => Level::WARN,
            3 => Level::INFO,
            4 => Level::DEBUG,
            _ => Level::TRACE,
        };
        format!("detguard={level}")
    }
}
