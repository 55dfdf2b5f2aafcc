//! Channeling - static analysis of Go channel usage.
//!
//! Channeling walks a Go source tree, finds every channel created with
//! `make(chan T)`, and records where each one is sent to, received from,
//! used in a `select`, returned from a function or passed into one. Each
//! channel is then classified as normal, dangling, send-only or
//! receive-only.
//!
//! # Architecture
//!
//! - `parser`: tree-sitter Go parsing
//! - `extract`: syntax-tree walk producing channel facts
//! - `registry`: concurrent name-keyed channel records and their snapshot
//! - `scan`: file discovery and the parallel worker pool
//! - `classify`: status derivation from send/receive counts
//! - `report`, `graph`, `web`: pretty/JSON report, DOT graph, dashboard
//! - `config`: YAML configuration
//!
//! Channels are matched by bare identifier only; two functions that each
//! declare `ch` share one record.

pub mod classify;
pub mod cli;
pub mod config;
pub mod extract;
pub mod graph;
pub mod parser;
pub mod registry;
pub mod report;
pub mod scan;
pub mod web;

pub use classify::{classify, ChannelStatus, StatusCounts};
pub use config::Config;
pub use extract::{analyze_file, AnalyzeError};
pub use parser::{GoParser, ParseError};
pub use registry::{ChannelRecord, ChannelRegistry, Location, RegistrySnapshot, UsageKind};
pub use scan::{ScanError, ScanOutcome, ScanStats, Scanner};
