//! Command-line interface for channeling.

use clap::{Parser, Subcommand};
use std::io;
use std::net::SocketAddr;
use std::path::PathBuf;

use crate::config::{self, Config};
use crate::graph;
use crate::report;
use crate::scan::Scanner;
use crate::web::{self, Dashboard};

/// Exit codes.
pub const EXIT_SUCCESS: i32 = 0;
pub const EXIT_ERROR: i32 = 2;

/// Static analysis of Go channel usage.
///
/// Scans a Go source tree for channel declarations, sends, receives and
/// select cases, flags channels that are never sent to or never received
/// from, and renders the result as a report, a DOT graph and an
/// interactive dashboard.
#[derive(Parser)]
#[command(name = "channeling")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Increase log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Analyze channel usage in a Go source tree
    #[command(visible_alias = "scan")]
    Analyze(AnalyzeArgs),
}

/// Arguments for the analyze command.
#[derive(Parser)]
pub struct AnalyzeArgs {
    /// Path to analyze (file or directory)
    pub path: PathBuf,

    /// Path to config YAML file (default: auto-discover)
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Output format: pretty or json
    #[arg(short, long, default_value = "pretty")]
    pub format: String,

    /// Number of parallel workers
    #[arg(short, long)]
    pub workers: Option<usize>,

    /// Glob for root-relative paths to skip (repeatable)
    #[arg(short, long)]
    pub exclude: Vec<String>,

    /// Where to write the DOT graph
    #[arg(short, long)]
    pub graph: Option<PathBuf>,

    /// Do not write the DOT graph
    #[arg(long)]
    pub no_graph: bool,

    /// Dashboard listen address
    #[arg(short, long)]
    pub listen: Option<String>,

    /// Exit after the report instead of serving the dashboard
    #[arg(long)]
    pub no_serve: bool,
}

impl AnalyzeArgs {
    /// Layer command-line flags over a loaded config.
    pub fn merge_into(&self, mut config: Config) -> Config {
        if let Some(workers) = self.workers {
            config.workers = Some(workers);
        }
        config.excluded_paths.extend(self.exclude.iter().cloned());
        if let Some(graph) = &self.graph {
            config.graph_output = Some(graph.clone());
        }
        if let Some(listen) = &self.listen {
            config.listen = Some(listen.clone());
        }
        if self.no_serve {
            config.serve = Some(false);
        }
        config
    }
}

/// Map `-v` occurrences to a default log filter.
pub fn default_log_filter(verbose: u8) -> &'static str {
    match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    }
}

/// Run the analyze command.
pub fn run_analyze(args: &AnalyzeArgs) -> anyhow::Result<i32> {
    if args.format != "pretty" && args.format != "json" {
        eprintln!(
            "Error: invalid format {:?}, must be 'pretty' or 'json'",
            args.format
        );
        return Ok(EXIT_ERROR);
    }

    let cwd = std::env::current_dir()?;
    let config = match Config::load(args.config.as_deref(), &cwd) {
        Ok(c) => args.merge_into(c),
        Err(e) => {
            eprintln!("Error: {}", e);
            return Ok(EXIT_ERROR);
        }
    };

    if let Err(e) = config::validate(&config) {
        eprintln!("Error: invalid config: {}", e);
        return Ok(EXIT_ERROR);
    }

    if !args.path.exists() {
        eprintln!("Error: cannot access path {:?}", args.path);
        return Ok(EXIT_ERROR);
    }

    let scanner = Scanner::new()
        .workers(config.workers())
        .queue_capacity(config.queue_capacity())
        .exclude(&config.excluded_paths)?;

    let outcome = match scanner.scan(&args.path) {
        Ok(outcome) => outcome,
        Err(e) => {
            eprintln!("Error: {}", e);
            return Ok(EXIT_ERROR);
        }
    };

    let path_str = args.path.to_string_lossy().to_string();
    match args.format.as_str() {
        "json" => report::write_json(&path_str, &outcome)?,
        _ => report::write_pretty(&mut io::stdout().lock(), &path_str, &outcome)?,
    }

    let mut exit_code = EXIT_SUCCESS;

    if !args.no_graph {
        let graph_path = config.graph_output();
        match graph::write_dot(&outcome.snapshot, &graph_path) {
            Ok(()) => {
                if args.format != "json" {
                    println!();
                    println!("Channel flow graph written to {}", graph_path.display());
                }
            }
            Err(e) => {
                eprintln!("Error: {}", e);
                exit_code = EXIT_ERROR;
            }
        }
    }

    if !config.should_serve() {
        return Ok(exit_code);
    }

    // validate() already checked the address parses.
    let addr: SocketAddr = config.listen().parse()?;
    let dashboard = Dashboard::from_snapshot(&outcome.snapshot)?;
    if let Err(e) = web::run(addr, dashboard) {
        eprintln!("Error: {}", e);
        return Ok(EXIT_ERROR);
    }

    Ok(exit_code)
}
