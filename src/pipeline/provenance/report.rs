//! Human- and machine-readable lineage reports.

use std::fmt::{self, Write as _};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::audit::{AuditSummary, ConsistencyIssue};
use super::graph::{LineageGraph, LineageStatistics};
use super::types::ProvenanceFragment;
use super::ReportError;

const CONNECTOR: &str = "└─ ";
const INDENT: &str = "   ";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum ReportFormat {
    #[default]
    Text,
    Json,
}

impl ReportFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::Json => "json",
        }
    }
}

impl fmt::Display for ReportFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ReportFormat {
    type Err = ReportError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "text" => Ok(Self::Text),
            "json" => Ok(Self::Json),
            other => Err(ReportError::UnsupportedFormat(other.to_string())),
        }
    }
}

/// One step in a chain of custody.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChainEntry {
    pub fragment_id: String,
    #[serde(rename = "type")]
    pub fragment_type: String,
    pub operation: String,
    pub timestamp: String,
}

impl From<&ProvenanceFragment> for ChainEntry {
    fn from(fragment: &ProvenanceFragment) -> Self {
        Self {
            fragment_id: fragment.fragment_id.clone(),
            fragment_type: fragment.fragment_type.clone(),
            operation: fragment.process.operation.clone(),
            timestamp: fragment.timestamp.clone(),
        }
    }
}

/// Full lineage of one fragment that matched a content hash.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchLineage {
    pub fragment_id: String,
    #[serde(rename = "type")]
    pub fragment_type: String,
    pub chain: Vec<ChainEntry>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpecimenLineage {
    pub hash: String,
    pub match_count: usize,
    pub lineages: Vec<MatchLineage>,
}

/// Lineage of every fragment whose source or output identifier contains
/// `content_hash`. Identifiers often embed path context, so this is a
/// substring match. A blank hash matches nothing. Fragments are taken from
/// the built graph, so a duplicated id matches at most once, as its latest
/// record.
pub fn specimen_lineage(fragments: &[ProvenanceFragment], content_hash: &str) -> SpecimenLineage {
    let hash = content_hash.trim();
    if hash.is_empty() {
        tracing::warn!("Empty content hash, no lineage to report");
        return SpecimenLineage {
            hash: hash.to_string(),
            match_count: 0,
            lineages: vec![],
        };
    }

    let graph = LineageGraph::build(fragments);

    let lineages: Vec<MatchLineage> = graph
        .nodes()
        .filter(|f| f.references(hash))
        .map(|f| MatchLineage {
            fragment_id: f.fragment_id.clone(),
            fragment_type: f.fragment_type.clone(),
            chain: graph
                .lineage(&f.fragment_id)
                .into_iter()
                .map(ChainEntry::from)
                .collect(),
        })
        .collect();

    tracing::debug!(hash, matches = lineages.len(), "Specimen lineage resolved");

    SpecimenLineage {
        hash: hash.to_string(),
        match_count: lineages.len(),
        lineages,
    }
}

/// Render `specimen_lineage` as pretty JSON or an indented text listing.
pub fn visualize_lineage(
    fragments: &[ProvenanceFragment],
    content_hash: &str,
    format: ReportFormat,
) -> Result<String, ReportError> {
    let lineage = specimen_lineage(fragments, content_hash);
    match format {
        ReportFormat::Json => Ok(serde_json::to_string_pretty(&lineage)?),
        ReportFormat::Text => Ok(render_lineage_text(&lineage)),
    }
}

fn render_lineage_text(lineage: &SpecimenLineage) -> String {
    let mut out = String::new();

    if lineage.lineages.is_empty() {
        let _ = writeln!(out, "No provenance fragments found for {}", lineage.hash);
        return out;
    }

    let _ = writeln!(
        out,
        "Specimen {} ({} matching fragment{})",
        lineage.hash,
        lineage.match_count,
        if lineage.match_count == 1 { "" } else { "s" }
    );

    for entry in &lineage.lineages {
        let _ = writeln!(out);
        let _ = writeln!(
            out,
            "Chain of custody for {} [{}]",
            entry.fragment_id, entry.fragment_type
        );

        for (depth, step) in entry.chain.iter().enumerate() {
            let connector = if depth == 0 { "" } else { CONNECTOR };
            let _ = writeln!(
                out,
                "  {}{}{} {} ({}) @ {}",
                INDENT.repeat(depth.saturating_sub(1)),
                connector,
                step.fragment_type,
                step.fragment_id,
                step.operation,
                truncate_to_seconds(&step.timestamp)
            );
        }
    }

    out
}

/// `2026-03-01T10:00:00.123456Z` → `2026-03-01T10:00:00`.
pub fn truncate_to_seconds(timestamp: &str) -> &str {
    match timestamp.char_indices().nth(19) {
        Some((idx, _)) => &timestamp[..idx],
        None => timestamp,
    }
}

/// Fragments derived from `fragment_id`, in discovery order.
pub fn render_descendants(
    fragment_id: &str,
    descendants: &[&ProvenanceFragment],
    format: ReportFormat,
) -> Result<String, ReportError> {
    let entries: Vec<ChainEntry> = descendants.iter().map(|f| ChainEntry::from(*f)).collect();

    match format {
        ReportFormat::Json => Ok(serde_json::to_string_pretty(&serde_json::json!({
            "fragment_id": fragment_id,
            "descendant_count": entries.len(),
            "descendants": entries,
        }))?),
        ReportFormat::Text => {
            let mut out = String::new();
            let _ = writeln!(out, "Descendants of {} ({})", fragment_id, entries.len());
            for entry in &entries {
                let _ = writeln!(
                    out,
                    "  {} {} ({}) @ {}",
                    entry.fragment_type,
                    entry.fragment_id,
                    entry.operation,
                    truncate_to_seconds(&entry.timestamp)
                );
            }
            Ok(out)
        }
    }
}

pub fn render_statistics(
    stats: &LineageStatistics,
    format: ReportFormat,
) -> Result<String, ReportError> {
    match format {
        ReportFormat::Json => Ok(serde_json::to_string_pretty(stats)?),
        ReportFormat::Text => {
            let mut out = String::new();
            let _ = writeln!(out, "Provenance statistics");
            let _ = writeln!(out, "  fragments: {}", stats.total_fragments);
            let _ = writeln!(out, "  edges:     {}", stats.total_edges);
            let _ = writeln!(out, "  roots:     {}", stats.root_count);
            let _ = writeln!(out, "  leaves:    {}", stats.leaf_count);
            let _ = writeln!(out, "  max depth: {}", stats.max_depth);
            if !stats.fragment_types.is_empty() {
                let _ = writeln!(out, "  fragment types:");
                for (kind, count) in &stats.fragment_types {
                    let _ = writeln!(out, "    {kind}: {count}");
                }
            }
            Ok(out)
        }
    }
}

pub fn render_audit(
    issues: &[ConsistencyIssue],
    format: ReportFormat,
) -> Result<String, ReportError> {
    let summary = AuditSummary::from_issues(issues);

    match format {
        ReportFormat::Json => Ok(serde_json::to_string_pretty(&serde_json::json!({
            "summary": summary,
            "issues": issues,
        }))?),
        ReportFormat::Text => {
            let mut out = String::new();
            if summary.is_clean() {
                let _ = writeln!(out, "No consistency issues found");
                return Ok(out);
            }
            let _ = writeln!(
                out,
                "{} issue(s): {} error, {} warning, {} info",
                summary.total, summary.error, summary.warning, summary.info
            );
            for issue in issues {
                let _ = writeln!(
                    out,
                    "  [{}] {}: {}",
                    issue.severity.as_str(),
                    issue.kind.as_str(),
                    issue.message
                );
            }
            Ok(out)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::provenance::audit::{audit, AuditConfig};
    use crate::pipeline::provenance::types::FragmentBuilder;

    const HASH: &str = "ab12cd34";

    fn log() -> Vec<ProvenanceFragment> {
        vec![
            FragmentBuilder::new("image_ingest", "ingest")
                .fragment_id("f-img")
                .source(format!("uploads/{HASH}.jpg"))
                .output(format!("images/{HASH}.jpg"))
                .timestamp("2026-03-01T10:00:00.000001Z")
                .build(),
            FragmentBuilder::new("ocr", "vision_ocr")
                .fragment_id("f-ocr")
                .source(format!("images/{HASH}.jpg"))
                .derived_from("f-img")
                .output("ocr/run-7.txt")
                .timestamp("2026-03-01T10:00:02.500000Z")
                .build(),
            FragmentBuilder::new("dwc_extraction", "field_extraction")
                .fragment_id("f-dwc")
                .source("ocr/run-7.txt")
                .derived_from("f-ocr")
                .output("dwc/run-7.json")
                .timestamp("2026-03-01T10:00:09.000000Z")
                .build(),
            FragmentBuilder::new("ocr", "vision_ocr")
                .fragment_id("f-other")
                .source("images/ffff0000.jpg")
                .output("ocr/other.txt")
                .timestamp("2026-03-01T11:00:00Z")
                .build(),
        ]
    }

    #[test]
    fn matches_by_substring_in_either_identifier() {
        let lineage = specimen_lineage(&log(), HASH);

        assert_eq!(lineage.match_count, 2);
        let matched: Vec<&str> = lineage.lineages.iter().map(|l| l.fragment_id.as_str()).collect();
        assert_eq!(matched, vec!["f-img", "f-ocr"]);

        let chain: Vec<&str> = lineage.lineages[1]
            .chain
            .iter()
            .map(|c| c.fragment_id.as_str())
            .collect();
        assert_eq!(chain, vec!["f-img", "f-ocr"]);
        assert_eq!(lineage.lineages[1].chain[1].operation, "vision_ocr");
    }

    #[test]
    fn blank_hash_matches_nothing() {
        let lineage = specimen_lineage(&log(), "  ");
        assert_eq!(lineage.match_count, 0);
        assert_eq!(lineage.hash, "");
    }

    #[test]
    fn hash_is_reported_trimmed() {
        assert_eq!(specimen_lineage(&log(), " ab12cd34\n").hash, HASH);
    }

    #[test]
    fn duplicate_id_matches_once_as_latest_record() {
        let fragments = vec![
            FragmentBuilder::new("ocr", "vision_ocr")
                .fragment_id("x")
                .source(format!("images/{HASH}.jpg"))
                .output("ocr/x.txt")
                .timestamp("2026-03-01T10:00:00Z")
                .build(),
            FragmentBuilder::new("dwc_extraction", "field_extraction")
                .fragment_id("x")
                .source(format!("ocr/{HASH}.txt"))
                .output("dwc/x.json")
                .timestamp("2026-03-01T10:00:05Z")
                .build(),
        ];

        let lineage = specimen_lineage(&fragments, HASH);

        assert_eq!(lineage.match_count, 1);
        let matched = &lineage.lineages[0];
        assert_eq!(matched.fragment_type, "dwc_extraction");
        assert_eq!(matched.chain.len(), 1);
        assert_eq!(matched.chain[0].fragment_type, matched.fragment_type);
    }

    #[test]
    fn json_round_trip_preserves_chain() {
        let before = specimen_lineage(&log(), "run-7");
        let json = visualize_lineage(&log(), "run-7", ReportFormat::Json).unwrap();
        let after: SpecimenLineage = serde_json::from_str(&json).unwrap();

        assert_eq!(before, after);
        assert_eq!(after.lineages.last().unwrap().chain.len(), 3);
    }

    #[test]
    fn json_uses_type_key() {
        let json = visualize_lineage(&log(), HASH, ReportFormat::Json).unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["lineages"][0]["type"], "image_ingest");
        assert_eq!(value["lineages"][0]["chain"][0]["type"], "image_ingest");
    }

    #[test]
    fn text_indents_each_step_and_truncates_timestamps() {
        let text = visualize_lineage(&log(), "dwc/run-7", ReportFormat::Text).unwrap();
        let lines: Vec<&str> = text.lines().collect();

        assert!(lines[0].contains("1 matching fragment"));
        assert!(text.contains("  image_ingest f-img (ingest) @ 2026-03-01T10:00:00\n"));
        assert!(text.contains("  └─ ocr f-ocr (vision_ocr) @ 2026-03-01T10:00:02\n"));
        assert!(text.contains("     └─ dwc_extraction f-dwc (field_extraction) @ 2026-03-01T10:00:09\n"));
        assert!(!text.contains(".500000"));
    }

    #[test]
    fn text_reports_no_matches() {
        let text = visualize_lineage(&log(), "zzzz", ReportFormat::Text).unwrap();
        assert!(text.starts_with("No provenance fragments found for zzzz"));
    }

    #[test]
    fn format_parsing() {
        assert_eq!("JSON".parse::<ReportFormat>().unwrap(), ReportFormat::Json);
        assert_eq!("text".parse::<ReportFormat>().unwrap(), ReportFormat::Text);
        assert_eq!(ReportFormat::default().to_string(), "text");
        assert!(matches!(
            "xml".parse::<ReportFormat>(),
            Err(ReportError::UnsupportedFormat(f)) if f == "xml"
        ));
    }

    #[test]
    fn truncate_short_timestamp_unchanged() {
        assert_eq!(truncate_to_seconds("2026-03-01"), "2026-03-01");
        assert_eq!(truncate_to_seconds("2026-03-01T10:00:00Z"), "2026-03-01T10:00:00");
    }

    #[test]
    fn statistics_text_lists_types() {
        let stats = LineageGraph::build(&log()).statistics();
        let text = render_statistics(&stats, ReportFormat::Text).unwrap();
        assert!(text.contains("fragments: 4"));
        assert!(text.contains("    ocr: 2"));
        assert!(text.contains("max depth: 2"));
    }

    #[test]
    fn descendants_json_counts() {
        let graph = LineageGraph::build(&log());
        let descendants = graph.descendants("f-img");
        let json = render_descendants("f-img", &descendants, ReportFormat::Json).unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["descendant_count"], 2);
        assert_eq!(value["descendants"][1]["fragment_id"], "f-dwc");
    }

    #[test]
    fn audit_text_summarizes() {
        let mut fragments = log();
        fragments.push(
            FragmentBuilder::new("ocr", "vision_ocr")
                .fragment_id("f-lost")
                .derived_from("ghost")
                .timestamp("2026-03-01T12:00:00Z")
                .build(),
        );
        let issues = audit(&LineageGraph::build(&fragments), &AuditConfig::default());
        let text = render_audit(&issues, ReportFormat::Text).unwrap();

        assert!(text.contains("[warning] orphaned_fragment"));
        assert!(text.contains("[info] missing_quality_metrics"));
    }

    #[test]
    fn clean_audit_text() {
        let text = render_audit(&[], ReportFormat::Text).unwrap();
        assert_eq!(text.trim(), "No consistency issues found");
    }
}
