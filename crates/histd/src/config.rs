//! Command-line configuration

use anyhow::{Context, Result};
use clap::Parser;
use histstore::{GridSpec, ScanOrder};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Bind address
    #[arg(short, long, default_value = "127.0.0.1:5000")]
    pub bind: String,

    /// Directory for uploaded containers
    #[arg(short, long, default_value = "./uploads")]
    pub uploads: PathBuf,

    /// Cached histograms per session
    #[arg(short, long, default_value_t = 1024)]
    pub cache_capacity: usize,

    /// Upload size limit in megabytes
    #[arg(long, default_value_t = 500)]
    pub max_upload_mb: usize,

    /// Default number of ieta rows
    #[arg(long, default_value_t = GridSpec::DEFAULT_N_IETA)]
    pub n_ieta: u32,

    /// Default number of iphi columns
    #[arg(long, default_value_t = GridSpec::DEFAULT_N_IPHI)]
    pub n_iphi: u32,

    /// Default first ieta (e.g. -48 for a symmetric detector)
    #[arg(long, default_value_t = 0, allow_negative_numbers = true)]
    pub ieta_min: i32,

    /// Default first iphi (e.g. 1 for 1-based numbering)
    #[arg(long, default_value_t = 0, allow_negative_numbers = true)]
    pub iphi_min: i32,

    /// Default positional scan order (ieta-major or iphi-major)
    #[arg(long, default_value = "ieta-major")]
    pub order: ScanOrder,

    /// Health check mode (for Docker)
    #[arg(long)]
    pub health: bool,
}

/// Validated server settings
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub bind: String,
    pub uploads: PathBuf,
    pub cache_capacity: usize,
    pub max_upload_bytes: usize,
    /// Used for any grid field an upload form leaves blank
    pub default_grid: GridSpec,
}

impl ServerConfig {
    pub fn from_args(args: &Args) -> Result<Self> {
        let default_grid = GridSpec::new(
            args.n_ieta,
            args.n_iphi,
            args.ieta_min,
            args.iphi_min,
            args.order,
        )
        .context("Invalid default grid")?;

        if args.cache_capacity == 0 {
            anyhow::bail!("Cache capacity must be greater than 0");
        }

        Ok(Self {
            bind: args.bind.clone(),
            uploads: args.uploads.clone(),
            cache_capacity: args.cache_capacity,
            max_upload_bytes: args.max_upload_mb.saturating_mul(1024 * 1024),
            default_grid,
        })
    }
}

#[cfg(test)]
impl ServerConfig {
    pub fn for_tests(uploads: PathBuf) -> Self {
        Self {
            bind: "127.0.0.1:0".to_string(),
            uploads,
            cache_capacity: 16,
            max_upload_bytes: 1024 * 1024,
            default_grid: GridSpec::default(),
        }
    }
}
