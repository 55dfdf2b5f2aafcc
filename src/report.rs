//! Output formatting for scan results.
//!
//! Supports two output formats:
//! - Pretty: colored terminal output for human readability
//! - JSON: structured output for programmatic consumption

use colored::*;
use serde::Serialize;
use std::io::{self, Write};

use crate::classify::{classify_snapshot, ChannelStatus, ClassifiedChannel, StatusCounts};
use crate::registry::Location;
use crate::scan::ScanOutcome;

// =============================================================================
// JSON Format
// =============================================================================

#[derive(Serialize)]
pub struct JsonReport<'a> {
    pub version: &'static str,
    pub path: &'a str,
    pub files_scanned: usize,
    pub files_skipped: usize,
    pub channels: Vec<JsonChannel<'a>>,
    pub summary: StatusCounts,
}

#[derive(Serialize)]
pub struct JsonChannel<'a> {
    pub name: &'a str,
    #[serde(rename = "type")]
    pub type_name: String,
    pub element_type: &'a str,
    pub declaration: &'a Location,
    pub status: ChannelStatus,
    pub send_sites: &'a [Location],
    pub receive_sites: &'a [Location],
    pub returned_from: &'a [Location],
    pub passed_to: &'a [Location],
    pub files_referenced: &'a [String],
}

impl<'a> From<&ClassifiedChannel<'a>> for JsonChannel<'a> {
    fn from(channel: &ClassifiedChannel<'a>) -> Self {
        let record = channel.record;
        JsonChannel {
            name: &record.name,
            type_name: record.type_name(),
            element_type: &record.element_type,
            declaration: &record.declaration,
            status: channel.status,
            send_sites: &record.send_sites,
            receive_sites: &record.receive_sites,
            returned_from: &record.returned_from,
            passed_to: &record.passed_to,
            files_referenced: &record.files_referenced,
        }
    }
}

/// Render results as pretty-printed JSON.
pub fn render_json(path: &str, outcome: &ScanOutcome) -> serde_json::Result<String> {
    let classified = classify_snapshot(&outcome.snapshot);
    let report = JsonReport {
        version: env!("CARGO_PKG_VERSION"),
        path,
        files_scanned: outcome.stats.files_analyzed,
        files_skipped: outcome.stats.files_skipped,
        summary: StatusCounts::tally(&classified),
        channels: classified.iter().map(JsonChannel::from).collect(),
    };
    serde_json::to_string_pretty(&report)
}

/// Write results in JSON format to stdout.
pub fn write_json(path: &str, outcome: &ScanOutcome) -> anyhow::Result<()> {
    println!("{}", render_json(path, outcome)?);
    Ok(())
}

// =============================================================================
// Pretty Format
// =============================================================================

/// Write results in human-readable form.
pub fn write_pretty<W: Write>(out: &mut W, path: &str, outcome: &ScanOutcome) -> io::Result<()> {
    let classified = classify_snapshot(&outcome.snapshot);

    writeln!(out)?;
    writeln!(
        out,
        "{} {}  {}",
        "channeling".bold(),
        env!("CARGO_PKG_VERSION").dimmed(),
        path.blue()
    )?;
    write_file_summary(out, outcome)?;
    writeln!(out)?;

    if classified.is_empty() {
        writeln!(out, "No channels found in the analyzed code.")?;
        return Ok(());
    }

    writeln!(out, "{}", "Channel Analysis Results:".bold())?;
    writeln!(out, "========================")?;

    for channel in &classified {
        write_channel(out, channel)?;
    }

    writeln!(out)?;
    write_status_summary(out, &StatusCounts::tally(&classified))
}

fn write_file_summary<W: Write>(out: &mut W, outcome: &ScanOutcome) -> io::Result<()> {
    let stats = &outcome.stats;
    write!(out, "  {} files analyzed", stats.files_analyzed)?;
    if stats.files_skipped > 0 {
        write!(
            out,
            "  {}",
            format!("({} skipped)", stats.files_skipped).yellow()
        )?;
    }
    writeln!(out)
}

fn write_channel<W: Write>(out: &mut W, channel: &ClassifiedChannel<'_>) -> io::Result<()> {
    let record = channel.record;

    writeln!(out)?;
    writeln!(out, "Channel: {}", record.name.bold())?;
    writeln!(out, "Type: {}", record.type_name())?;
    writeln!(out, "Declaration: Declared at {}", record.declaration)?;
    write!(out, "Status: ")?;
    write_status(out, channel.status)?;
    writeln!(out)?;

    write_sites(out, "Send Operations:", &record.send_sites)?;
    write_sites(out, "Receive Operations:", &record.receive_sites)?;
    write_sites(out, "Returned From Functions:", &record.returned_from)?;
    write_sites(out, "Passed To Functions:", &record.passed_to)?;

    if record.files_referenced.len() > 1 {
        writeln!(out)?;
        writeln!(out, "Used In Files:")?;
        for file in &record.files_referenced {
            writeln!(out, "  - {}", file.blue())?;
        }
    }

    writeln!(out, "------------------------")
}

fn write_sites<W: Write>(out: &mut W, heading: &str, sites: &[Location]) -> io::Result<()> {
    if sites.is_empty() {
        return Ok(());
    }
    writeln!(out)?;
    writeln!(out, "{}", heading)?;
    for site in sites {
        if site.in_select {
            writeln!(out, "  - {}:{} {}", site.file, site.line, "(select)".dimmed())?;
        } else {
            writeln!(out, "  - {}", site)?;
        }
    }
    Ok(())
}

fn write_status<W: Write>(out: &mut W, status: ChannelStatus) -> io::Result<()> {
    match status {
        ChannelStatus::Normal => write!(out, "{}", status.as_str().green()),
        ChannelStatus::Dangling => write!(out, "{}", status.as_str().red()),
        ChannelStatus::SendOnly | ChannelStatus::ReceiveOnly => {
            write!(out, "{}", status.as_str().yellow())
        }
    }
}

fn write_status_summary<W: Write>(out: &mut W, counts: &StatusCounts) -> io::Result<()> {
    let plural = if counts.total() != 1 { "s" } else { "" };
    writeln!(out, "  {} ({} channel{}):", "Summary".bold(), counts.total(), plural)?;
    writeln!(out, "    {:<14} {:>3}", "normal", counts.normal)?;
    writeln!(out, "    {:<14} {:>3}", "dangling", counts.dangling)?;
    writeln!(out, "    {:<14} {:>3}", "send-only", counts.send_only)?;
    writeln!(out, "    {:<14} {:>3}", "receive-only", counts.receive_only)?;

    if counts.flagged() > 0 {
        writeln!(
            out,
            "  {}",
            format!("{} channel(s) need attention", counts.flagged()).yellow()
        )?;
    }
    Ok(())
}
