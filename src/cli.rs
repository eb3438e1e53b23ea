use clap::{Parser, ValueEnum};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::converter::SourceFormat;

/// Verbosity levels for output
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Serialize, Deserialize)]
pub enum VerbosityLevel {
    /// Only show fatal errors
    Quiet,
    /// Show the run summary
    #[default]
    Normal,
    /// Also list old-only, new-only and problem accessions
    Verbose,
    /// Show all available debugging information
    Debug,
}

impl VerbosityLevel {
    pub fn from_flags(verbose: bool, quiet: bool) -> Self {
        if quiet {
            VerbosityLevel::Quiet
        } else if verbose {
            VerbosityLevel::Verbose
        } else {
            VerbosityLevel::Normal
        }
    }

    /// Default log filter when `RUST_LOG` is not set
    pub fn log_filter(self) -> &'static str {
        match self {
            VerbosityLevel::Quiet => "error",
            VerbosityLevel::Normal => "info",
            VerbosityLevel::Verbose => "debug",
            VerbosityLevel::Debug => "trace",
        }
    }
}

/// How the run summary is rendered on stdout
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    #[default]
    Human,
    Json,
    Summary,
}

/// Verify that a sample metadata migration preserved every record
#[derive(Parser, Debug, Clone, Default)]
#[command(name = "sample-migration")]
#[command(about = "Compare the inventories and records of two sample metadata services")]
#[command(version)]
pub struct Cli {
    /// Base URL of the old system
    #[arg(long = "old")]
    pub old_url: Option<String>,

    /// Base URL of the new system
    #[arg(long = "new")]
    pub new_url: Option<String>,

    /// Document format served by the old system
    #[arg(long = "old-format", value_enum)]
    pub old_format: Option<SourceFormat>,

    /// Document format served by the new system
    #[arg(long = "new-format", value_enum)]
    pub new_format: Option<SourceFormat>,

    /// Only compare inventories, skip record comparison
    #[arg(long = "inventory-only")]
    pub inventory_only: bool,

    /// Compare a single accession and skip both crawls
    #[arg(long = "test-accession", value_name = "ACCESSION")]
    pub test_accession: Option<String>,

    /// Configuration file (TOML or JSON)
    #[arg(short = 'c', long = "config")]
    pub config: Option<PathBuf>,

    /// Newline-delimited accessions to leave out of the comparison
    #[arg(long = "ignore-list")]
    pub ignore_list: Option<PathBuf>,

    /// Inventory page size
    #[arg(long = "page-size")]
    pub page_size: Option<usize>,

    /// Capacity of each inventory queue
    #[arg(long = "queue-capacity")]
    pub queue_capacity: Option<usize>,

    /// Maximum number of accessions compared at once
    #[arg(long = "max-in-flight")]
    pub max_in_flight: Option<usize>,

    /// HTTP request timeout in seconds
    #[arg(long = "timeout")]
    pub timeout: Option<u64>,

    /// Number of retry attempts for failed requests
    #[arg(long = "retry-attempts")]
    pub retry_attempts: Option<u32>,

    /// Output format
    #[arg(long = "format", value_enum)]
    pub output_format: Option<OutputFormat>,

    /// Enable verbose output
    #[arg(short = 'v', long = "verbose")]
    pub verbose: bool,

    /// Quiet mode (fatal errors only)
    #[arg(short = 'q', long = "quiet", conflicts_with = "verbose")]
    pub quiet: bool,
}

impl Cli {
    pub fn parse_args() -> Self {
        Self::parse()
    }

    pub fn verbosity(&self) -> VerbosityLevel {
        VerbosityLevel::from_flags(self.verbose, self.quiet)
    }

    pub fn validate(&self) -> Result<(), String> {
        for (name, value) in [
            ("page size", self.page_size),
            ("queue capacity", self.queue_capacity),
            ("max in flight", self.max_in_flight),
        ] {
            if value == Some(0) {
                return Err(format!("The {} must be greater than 0", name));
            }
        }
        if self.inventory_only && self.test_accession.is_some() {
            return Err("--inventory-only cannot be combined with --test-accession".to_string());
        }
        Ok(())
    }
}
