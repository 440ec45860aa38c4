use std::path::PathBuf;

use anyhow::{bail, Result};
use clap::Parser;

use spoofmon::Config;

#[derive(Parser)]
#[command(name = "spoofmon")]
#[command(author, version, about = "flow-based IP spoofing detector")]
pub struct Cli {
    /// File with bogon prefixes (mandatory)
    #[arg(short = 'b', long, value_name = "FILE")]
    pub bogons: Option<PathBuf>,

    /// File with operator network prefixes
    #[arg(short = 'c', long, value_name = "FILE")]
    pub networks: Option<PathBuf>,

    /// Seconds before symmetric-routing witnesses are rewritten
    #[arg(short = 's', long, value_name = "SECS")]
    pub rewrite_window: Option<u64>,

    /// New flows allowed per watched prefix before reporting
    #[arg(short = 't', long, value_name = "COUNT")]
    pub threshold: Option<u64>,

    /// Path to a TOML configuration file
    #[arg(long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long)]
    pub debug: bool,
}

impl Cli {
    /// Resolve the effective configuration: file values first, command
    /// line flags on top. Refuses to proceed without a bogon file.
    pub fn build_config(&self) -> Result<Config> {
        let mut config = match &self.config {
            Some(path) => Config::from_file(path)?,
            None => Config::default(),
        };

        if let Some(path) = &self.bogons {
            config.prefixes.bogons = Some(path.clone());
        }
        if let Some(path) = &self.networks {
            config.prefixes.networks = Some(path.clone());
        }
        if let Some(secs) = self.rewrite_window {
            config.symmetry.rewrite_window_secs = secs;
        }
        if let Some(count) = self.threshold {
            config.newflow.threshold = count;
        }

        if config.prefixes.bogons.is_none() {
            bail!("bogon file not specified, unable to continue (use -b <FILE>)");
        }

        Ok(config)
    }
}
