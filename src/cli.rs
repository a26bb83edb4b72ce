//! Command-line front end.
//!
//! The CLI drives the engine the same way a host application does: it
//! starts a job, subscribes to status updates, waits, and fetches the
//! report.
//!
//! # Example
//!
//! ```bash
//! # Scan a directory and print duplicate sets
//! dupe-engine ~/Downloads
//!
//! # JSON output for scripting
//! dupe-engine ~/Downloads --json
//!
//! # Show a progress bar and skip small files
//! dupe-engine ~/Downloads --progress --min-size 1MB
//! ```

use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use bytesize::ByteSize;
use clap::{Parser, ValueEnum};

use crate::config::ScanConfig;
use crate::engine::Engine;
use crate::error::ExitCode;
use crate::logging::init_logging;
use crate::progress::Progress;
use crate::report::ScanReport;
use crate::scanner::PartialStrategy;
use crate::signal;
use crate::status::LifecycleState;

/// Find duplicate files and folders under a directory.
#[derive(Debug, Parser)]
#[command(name = "dupe-engine")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Directory to scan
    #[arg(value_name = "PATH", required_unless_present = "print_config")]
    pub path: Option<PathBuf>,

    /// Increase verbosity level (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Suppress all output except errors and results
    #[arg(short, long, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Print the report as JSON
    #[arg(long)]
    pub json: bool,

    /// Print errors as JSON objects on stderr
    #[arg(long)]
    pub json_errors: bool,

    /// Show a progress bar while scanning
    #[arg(long)]
    pub progress: bool,

    /// Configuration file (TOML)
    #[arg(long, value_name = "FILE", env = "DUPE_ENGINE_CONFIG")]
    pub config: Option<PathBuf>,

    /// Print the resolved configuration as TOML and exit
    #[arg(long)]
    pub print_config: bool,

    /// Minimum file size to consider (e.g., 1KB, 1MB, 1GB)
    ///
    /// Supports suffixes: B, KB, KiB, MB, MiB, GB, GiB, TB, TiB
    #[arg(long, value_name = "SIZE", value_parser = parse_size)]
    pub min_size: Option<u64>,

    /// Follow symbolic links during scan
    #[arg(long)]
    pub follow_symlinks: bool,

    /// Skip hidden files and directories
    #[arg(long)]
    pub skip_hidden: bool,

    /// Number of hashing threads
    #[arg(long, value_name = "N")]
    pub workers: Option<usize>,

    /// Bytes read per partial digest sample
    #[arg(long, value_name = "SIZE", value_parser = parse_size)]
    pub window: Option<u64>,

    /// Which parts of a file feed the partial digest
    #[arg(long, value_enum)]
    pub strategy: Option<StrategyArg>,

    /// Only group files that also share a file name
    #[arg(long)]
    pub by_filename: bool,

    /// Do not look for duplicated folders
    #[arg(long)]
    pub no_folders: bool,
}

/// Partial digest strategy flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum StrategyArg {
    /// First window only
    Prefix,
    /// First window plus tail and middle samples on large files
    Spread,
}

impl From<StrategyArg> for PartialStrategy {
    fn from(arg: StrategyArg) -> Self {
        match arg {
            StrategyArg::Prefix => Self::Prefix,
            StrategyArg::Spread => Self::Spread,
        }
    }
}

impl Cli {
    /// Apply command-line overrides on top of a loaded configuration.
    pub fn apply_overrides(&self, config: &mut ScanConfig) {
        if let Some(min_size) = self.min_size {
            config.min_file_size = min_size;
        }
        if self.follow_symlinks {
            config.follow_symlinks = true;
        }
        if self.skip_hidden {
            config.include_hidden = false;
        }
        if let Some(workers) = self.workers {
            config.worker_pool_size = Some(workers);
        }
        if let Some(window) = self.window {
            config.partial_hash_window_bytes = usize::try_from(window).unwrap_or(usize::MAX);
        }
        if let Some(strategy) = self.strategy {
            config.partial_strategy = strategy.into();
        }
        if self.by_filename {
            config.filter_by_filename = true;
        }
        if self.no_folders {
            config.detect_folders = false;
        }
    }
}

/// Parse a human-readable size string into bytes.
///
/// # Errors
///
/// Returns an error message if the number or suffix is invalid.
pub fn parse_size(s: &str) -> Result<u64, String> {
    let s = s.trim();
    if s.is_empty() {
        return Err("Size cannot be empty".to_string());
    }

    let (num_str, suffix) = match s.find(|c: char| !c.is_ascii_digit() && c != '.') {
        Some(idx) => (&s[..idx], s[idx..].trim().to_uppercase()),
        None => (s, String::new()),
    };

    let num: f64 = num_str
        .parse()
        .map_err(|_| format!("Invalid number: '{num_str}'"))?;

    let multiplier: u64 = match suffix.as_str() {
        "" | "B" => 1,
        "KB" | "K" => 1_000,
        "KIB" => 1_024,
        "MB" | "M" => 1_000_000,
        "MIB" => 1_048_576,
        "GB" | "G" => 1_000_000_000,
        "GIB" => 1_073_741_824,
        "TB" | "T" => 1_000_000_000_000,
        "TIB" => 1_099_511_627_776,
        _ => return Err(format!("Unknown size suffix: '{suffix}'")),
    };

    Ok((num * multiplier as f64) as u64)
}

/// Run the CLI and return the process exit code.
///
/// # Errors
///
/// Returns an error if configuration fails, the scan cannot start, or the
/// job fails.
pub fn run_app(cli: Cli) -> Result<ExitCode> {
    init_logging(cli.verbose, cli.quiet);

    let mut config = ScanConfig::load(cli.config.as_deref()).context("Failed to load configuration")?;
    cli.apply_overrides(&mut config);
    config.validate()?;

    if cli.print_config {
        print!("{}", config.to_toml().context("Failed to render configuration")?);
        return Ok(ExitCode::Success);
    }

    let Some(path) = cli.path.as_deref() else {
        bail!("No scan path given");
    };

    let engine = Engine::global();
    if let Err(e) = signal::install_handler(|| Engine::global().cancel()) {
        log::warn!("{}; Ctrl+C will terminate immediately", e);
    }

    if cli.progress && !cli.quiet {
        engine.set_status_sink(Arc::new(Progress::new(false)));
    }

    engine
        .start(path, config)
        .with_context(|| format!("Failed to start scan of {}", path.display()))?;

    let state = engine.wait(None);
    engine.clear_status_sink();

    match state {
        LifecycleState::Completed => {
            let report = engine.result()?;
            if cli.json {
                let json = serde_json::to_string_pretty(report.as_ref())
                    .context("Failed to serialize report")?;
                println!("{json}");
            } else {
                print_report(&report, cli.quiet)?;
            }
            Ok(if report.groups.is_empty() {
                ExitCode::NoDuplicates
            } else {
                ExitCode::Success
            })
        }
        LifecycleState::Cancelled => {
            if !cli.quiet {
                eprintln!("Scan cancelled.");
            }
            Ok(ExitCode::Interrupted)
        }
        other => {
            let status = engine.current_status();
            bail!(
                "Scan {}: {}",
                other,
                status.error.unwrap_or_else(|| "unknown error".to_string())
            )
        }
    }
}

/// Human-readable report on stdout.
fn print_report(report: &ScanReport, quiet: bool) -> Result<()> {
    let stdout = std::io::stdout();
    let mut out = stdout.lock();

    for (i, group) in report.groups.iter().enumerate() {
        writeln!(
            out,
            "Set {}: {} files, {} each, {} reclaimable [{}]",
            i + 1,
            group.count(),
            ByteSize::b(group.size),
            ByteSize::b(group.reclaimable()),
            &group.hash_hex()[..16]
        )?;
        for path in &group.paths {
            writeln!(out, "  {}", path.display())?;
        }
    }

    if !report.folders.is_empty() {
        writeln!(out)?;
        for (i, folder) in report.folders.iter().enumerate() {
            writeln!(
                out,
                "Folder set {}: {} folders, {} each",
                i + 1,
                folder.count(),
                ByteSize::b(folder.size)
            )?;
            for path in &folder.paths {
                writeln!(out, "  {}", path.display())?;
            }
        }
    }

    if !quiet {
        let summary = &report.summary;
        writeln!(out)?;
        writeln!(
            out,
            "Scanned {} files ({}) in {} ms: {} duplicate sets, {} folder sets, {} reclaimable",
            summary.files_scanned,
            summary.scanned_display(),
            summary.duration_ms,
            summary.file_sets,
            summary.folder_sets,
            summary.reclaimable_display()
        )?;
        if summary.skipped_paths + summary.failed_files > 0 {
            writeln!(
                out,
                "{} paths skipped, {} files unreadable",
                summary.skipped_paths, summary.failed_files
            )?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_size_bytes() {
        assert_eq!(parse_size("1024").unwrap(), 1024);
        assert_eq!(parse_size("1024B").unwrap(), 1024);
        assert_eq!(parse_size("0").unwrap(), 0);
    }

    #[test]
    fn test_parse_size_suffixes() {
        assert_eq!(parse_size("1KB").unwrap(), 1_000);
        assert_eq!(parse_size("1kib").unwrap(), 1_024);
        assert_eq!(parse_size("1MiB").unwrap(), 1_048_576);
        assert_eq!(parse_size("1.5MB").unwrap(), 1_500_000);
        assert_eq!(parse_size("1GiB").unwrap(), 1_073_741_824);
    }

    #[test]
    fn test_parse_size_invalid() {
        assert!(parse_size("").is_err());
        assert!(parse_size("abc").is_err());
        assert!(parse_size("10XB").is_err());
    }

    #[test]
    fn test_cli_parses_flags() {
        let cli = Cli::try_parse_from([
            "dupe-engine",
            "/tmp",
            "--json",
            "--min-size",
            "1KB",
            "--workers",
            "3",
            "--strategy",
            "spread",
            "--skip-hidden",
            "--no-folders",
        ])
        .unwrap();

        let mut config = ScanConfig::default();
        cli.apply_overrides(&mut config);

        assert!(cli.json);
        assert_eq!(config.min_file_size, 1_000);
        assert_eq!(config.worker_pool_size, Some(3));
        assert_eq!(config.partial_strategy, PartialStrategy::Spread);
        assert!(!config.include_hidden);
        assert!(!config.detect_folders);
        assert!(!config.filter_by_filename);
    }

    #[test]
    fn test_cli_requires_path() {
        assert!(Cli::try_parse_from(["dupe-engine"]).is_err());
        assert!(Cli::try_parse_from(["dupe-engine", "--print-config"]).is_ok());
    }

    #[test]
    fn test_quiet_conflicts_with_verbose() {
        assert!(Cli::try_parse_from(["dupe-engine", "/tmp", "-q", "-v"]).is_err());
    }

    #[test]
    fn test_overrides_leave_unset_fields() {
        let cli = Cli::try_parse_from(["dupe-engine", "/tmp"]).unwrap();
        let mut config = ScanConfig {
            min_file_size: 77,
            ..Default::default()
        };
        cli.apply_overrides(&mut config);
        assert_eq!(config.min_file_size, 77);
        assert_eq!(config, ScanConfig { min_file_size: 77, ..Default::default() });
    }
}
