//! Command line interface.

pub mod command;

use std::{path::PathBuf, time::Duration};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};

use crate::config::Config;

#[derive(Parser)]
#[command(version, about, long_about = None)]
/// Compares projected snow water equivalent against station normals
pub struct Cli {
    /// TOML configuration file
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Directory the reports are written to
    #[arg(long, global = true)]
    pub output_dir: Option<PathBuf>,

    /// Directory downloaded grids are cached in
    #[arg(long, global = true)]
    pub cache_dir: Option<PathBuf>,

    /// Keep only basins whose HUC starts with this prefix (repeatable)
    #[arg(long = "basin", global = true)]
    pub basins: Vec<String>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the full comparison
    Run {},
    /// Download every ensemble member into the cache
    Fetch {},
    /// Summarise one time window
    Summary {
        /// Window label, e.g. `rcp85-2040-2069` or `2040-2069`
        #[arg(long)]
        window: String,
    },
    /// Get stations
    Stations {},
}

impl Cli {
    /// Loads the configuration file, if any, then applies command line
    /// overrides.
    pub fn load_config(&self) -> Result<Config> {
        let mut config = Config::load(self.config.as_deref()).context("Failed to load configuration")?;

        if let Some(dir) = &self.output_dir {
            config.output_dir = dir.clone();
        }
        if let Some(dir) = &self.cache_dir {
            config.cache_dir = dir.clone();
        }
        if !self.basins.is_empty() {
            config.basin_filter = self.basins.clone();
        }

        Ok(config)
    }
}

/// Creates a spinner.
pub fn create_spinner(message: String) -> ProgressBar {
    let bar = ProgressBar::new_spinner().with_message(message);
    bar.enable_steady_tick(Duration::from_millis(100));

    bar
}

/// Creates a progress bar.
pub fn create_progress_bar(size: u64, message: String) -> ProgressBar {
    let style = ProgressStyle::with_template("[{eta_precise}] {bar:40.cyan/blue} {msg}")
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("##-");

    ProgressBar::new(size).with_message(message).with_style(style)
}

// -- Tests -------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn should_override_config_from_flags() {
        let cli = Cli::try_parse_from([
            "swe-outlook",
            "run",
            "--output-dir",
            "/tmp/reports",
            "--basin",
            "1401",
            "--basin",
            "1019",
        ])
        .unwrap();

        let config = cli.load_config().unwrap();

        assert_eq!(config.output_dir, PathBuf::from("/tmp/reports"));
        assert_eq!(config.basin_filter, vec!["1401", "1019"]);
        assert!(matches!(cli.command, Commands::Run {}));
    }

    #[test]
    fn should_keep_defaults_without_flags() {
        let cli = Cli::try_parse_from(["swe-outlook", "summary", "--window", "2040-2069"]).unwrap();

        let config = cli.load_config().unwrap();

        assert_eq!(config.cache_dir, Config::default().cache_dir);
        assert!(config.basin_filter.is_empty());
        assert!(matches!(cli.command, Commands::Summary { ref window } if window == "2040-2069"));
    }

    #[test]
    fn should_require_window_for_summary() {
        assert!(Cli::try_parse_from(["swe-outlook", "summary"]).is_err());
    }
}
