//! specimen-trace: inspect a provenance log from the command line.
//!
//! ```bash
//! specimen-trace lineage ab12cd34 --format text
//! specimen-trace descendants 3f1c...-ocr
//! specimen-trace stats --format json
//! specimen-trace --strict audit
//! ```

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use thiserror::Error;

use specimen_trace_lib::config;
use specimen_trace_lib::pipeline::provenance::{
    audit, render_audit, render_descendants, render_statistics, visualize_lineage, AuditConfig,
    FragmentLog, LineageGraph, LoadPolicy, ProvenanceError, ReportError, ReportFormat,
};

#[derive(Parser, Debug)]
#[command(name = "specimen-trace")]
#[command(about = "Trace and audit specimen digitization provenance")]
#[command(version)]
struct Cli {
    /// Provenance log (JSON Lines)
    #[arg(long, global = true, env = "SPECIMEN_TRACE_LOG")]
    log: Option<PathBuf>,

    /// Fail on the first malformed log line instead of skipping it
    #[arg(long, global = true)]
    strict: bool,

    /// Output format
    #[arg(long, global = true, value_enum, default_value_t = ReportFormat::Text)]
    format: ReportFormat,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Chain of custody for every fragment referencing a content hash
    Lineage {
        /// Content hash (substring of a source or output identifier)
        hash: String,
    },
    /// Everything derived from a fragment
    Descendants { fragment_id: String },
    /// Graph shape: counts, type histogram, max depth
    Stats,
    /// Orphans, missing quality metrics, timestamp ordering
    Audit,
}

#[derive(Error, Debug)]
enum CliError {
    #[error(transparent)]
    Provenance(#[from] ProvenanceError),

    #[error(transparent)]
    Report(#[from] ReportError),
}

fn main() -> ExitCode {
    specimen_trace_lib::init_tracing();

    let cli = Cli::parse();
    match run(cli) {
        Ok(output) => {
            print!("{output}");
            ExitCode::SUCCESS
        }
        Err(e) => {
            tracing::error!(error = %e, "specimen-trace failed");
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<String, CliError> {
    let format = cli.format;
    let policy = if cli.strict {
        LoadPolicy::Strict
    } else {
        LoadPolicy::from_env()
    };

    let log = FragmentLog::new(cli.log.unwrap_or_else(config::provenance_log_path));
    let report = log.load(policy)?;
    if !report.skipped.is_empty() {
        eprintln!(
            "warning: skipped {} malformed line(s) in {}",
            report.skipped.len(),
            log.path().display()
        );
    }
    let fragments = report.fragments;

    let output = match cli.command {
        Command::Lineage { hash } => visualize_lineage(&fragments, &hash, format)?,
        Command::Descendants { fragment_id } => {
            let graph = LineageGraph::build(&fragments);
            render_descendants(&fragment_id, &graph.descendants(&fragment_id), format)?
        }
        Command::Stats => render_statistics(&LineageGraph::build(&fragments).statistics(), format)?,
        Command::Audit => {
            let graph = LineageGraph::build(&fragments);
            render_audit(&audit(&graph, &AuditConfig::default()), format)?
        }
    };

    Ok(output)
}

#[cfg(test)]
mod tests {
    use super::*;
    use specimen_trace_lib::pipeline::provenance::FragmentBuilder;

    fn write_log(dir: &std::path::Path) -> PathBuf {
        let log = FragmentLog::new(dir.join("provenance.jsonl"));
        log.append(
            &FragmentBuilder::new("ocr", "vision_ocr")
                .fragment_id("f-ocr")
                .source("images/ab12cd34.jpg")
                .output("ocr/ab12cd34.txt")
                .timestamp("2026-03-01T10:00:00Z")
                .build(),
        )
        .unwrap();
        log.append(
            &FragmentBuilder::new("dwc_extraction", "field_extraction")
                .fragment_id("f-dwc")
                .source("ocr/ab12cd34.txt")
                .derived_from("f-ocr")
                .output("dwc/ab12cd34.json")
                .timestamp("2026-03-01T10:00:05Z")
                .build(),
        )
        .unwrap();
        log.path().to_path_buf()
    }

    fn run_args(args: &[&str]) -> Result<String, CliError> {
        run(Cli::try_parse_from(args).unwrap())
    }

    #[test]
    fn lineage_command_renders_chain() {
        let dir = tempfile::tempdir().unwrap();
        let log = write_log(dir.path());
        let log = log.to_str().unwrap();

        let text = run_args(&["specimen-trace", "--log", log, "lineage", "ab12cd34"]).unwrap();
        assert!(text.contains("Chain of custody for f-dwc [dwc_extraction]"));
    }

    #[test]
    fn global_flags_accepted_after_subcommand() {
        let dir = tempfile::tempdir().unwrap();
        let log = write_log(dir.path());
        let log = log.to_str().unwrap();

        let json = run_args(&[
            "specimen-trace", "stats", "--strict", "--log", log, "--format", "json",
        ])
        .unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["total_fragments"], 2);
        assert_eq!(value["max_depth"], 1);
    }

    #[test]
    fn descendants_and_audit_dispatch() {
        let dir = tempfile::tempdir().unwrap();
        let log = write_log(dir.path());
        let log = log.to_str().unwrap();

        let text = run_args(&["specimen-trace", "--log", log, "descendants", "f-ocr"]).unwrap();
        assert!(text.contains("f-dwc"));

        let json = run_args(&["specimen-trace", "--log", log, "--format", "json", "audit"]).unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["summary"]["total"], 1);
        assert_eq!(value["issues"][0]["type"], "missing_quality_metrics");
    }

    #[test]
    fn unknown_format_rejected_by_parser() {
        assert!(Cli::try_parse_from(["specimen-trace", "--format", "xml", "stats"]).is_err());
    }

    #[test]
    fn missing_log_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("absent.jsonl");

        let result = run_args(&["specimen-trace", "--log", missing.to_str().unwrap(), "stats"]);
        assert!(matches!(
            result,
            Err(CliError::Provenance(ProvenanceError::LogNotFound(_)))
        ));
    }
}
