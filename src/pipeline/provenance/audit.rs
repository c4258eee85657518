use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use super::graph::LineageGraph;
use super::types::fragment_types;

// ---------------------------------------------------------------------------
// Issue types
// ---------------------------------------------------------------------------

/// How urgently an operator should look at an issue.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "snake_case")]
pub enum IssueSeverity {
    Info,
    Warning,
    Error,
}

impl IssueSeverity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Info => "info",
            Self::Warning => "warning",
            Self::Error => "error",
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum IssueKind {
    /// A recorded parent id that is not in the log.
    OrphanedFragment,
    /// A fragment type that should carry quality data has none.
    MissingQualityMetrics,
    /// A parent's timestamp sorts after its child's.
    TimestampViolation,
}

impl IssueKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::OrphanedFragment => "orphaned_fragment",
            Self::MissingQualityMetrics => "missing_quality_metrics",
            Self::TimestampViolation => "timestamp_violation",
        }
    }

    pub fn severity(&self) -> IssueSeverity {
        match self {
            Self::OrphanedFragment => IssueSeverity::Warning,
            Self::MissingQualityMetrics => IssueSeverity::Info,
            Self::TimestampViolation => IssueSeverity::Error,
        }
    }
}

/// One diagnostic finding. Never acted on automatically.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConsistencyIssue {
    #[serde(rename = "type")]
    pub kind: IssueKind,
    pub severity: IssueSeverity,
    /// Fragment ids involved: the subject first, then any related id.
    pub fragment_ids: Vec<String>,
    pub message: String,
}

impl ConsistencyIssue {
    fn new(kind: IssueKind, fragment_ids: Vec<String>, message: String) -> Self {
        Self {
            kind,
            severity: kind.severity(),
            fragment_ids,
            message,
        }
    }
}

/// Which fragment types must carry `quality_metrics`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditConfig {
    pub quality_required_types: BTreeSet<String>,
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            quality_required_types: [fragment_types::DWC_EXTRACTION, fragment_types::QC_VALIDATION]
                .into_iter()
                .map(String::from)
                .collect(),
        }
    }
}

/// Issue counts per severity.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditSummary {
    pub total: usize,
    pub info: usize,
    pub warning: usize,
    pub error: usize,
}

impl AuditSummary {
    pub fn from_issues(issues: &[ConsistencyIssue]) -> Self {
        let mut summary = Self::default();
        for issue in issues {
            summary.total += 1;
            match issue.severity {
                IssueSeverity::Info => summary.info += 1,
                IssueSeverity::Warning => summary.warning += 1,
                IssueSeverity::Error => summary.error += 1,
            }
        }
        summary
    }

    pub fn is_clean(&self) -> bool {
        self.total == 0
    }
}

// ---------------------------------------------------------------------------
// Audit
// ---------------------------------------------------------------------------

/// Run every check. Results are grouped by check, each in graph order.
pub fn audit(graph: &LineageGraph, config: &AuditConfig) -> Vec<ConsistencyIssue> {
    let mut issues = detect_orphaned_fragments(graph);
    issues.extend(detect_missing_quality_metrics(graph, config));
    issues.extend(detect_timestamp_violations(graph));

    let summary = AuditSummary::from_issues(&issues);
    if summary.is_clean() {
        tracing::info!(fragments = graph.len(), "Provenance audit clean");
    } else {
        tracing::warn!(
            fragments = graph.len(),
            errors = summary.error,
            warnings = summary.warning,
            info = summary.info,
            "Provenance audit found issues"
        );
    }

    issues
}

/// Fragments whose recorded parent is not in the log.
pub fn detect_orphaned_fragments(graph: &LineageGraph) -> Vec<ConsistencyIssue> {
    graph
        .nodes()
        .filter_map(|node| {
            let parent = graph.parent_of(&node.fragment_id)?;
            if graph.contains(parent) {
                return None;
            }
            Some(ConsistencyIssue::new(
                IssueKind::OrphanedFragment,
                vec![node.fragment_id.clone(), parent.to_string()],
                format!(
                    "Fragment {} references unknown parent {}",
                    node.fragment_id, parent
                ),
            ))
        })
        .collect()
}

/// Quality-bearing fragments with empty `quality_metrics`.
pub fn detect_missing_quality_metrics(
    graph: &LineageGraph,
    config: &AuditConfig,
) -> Vec<ConsistencyIssue> {
    graph
        .nodes()
        .filter(|node| {
            config.quality_required_types.contains(&node.fragment_type)
                && node.output.quality_metrics.is_empty()
        })
        .map(|node| {
            ConsistencyIssue::new(
                IssueKind::MissingQualityMetrics,
                vec![node.fragment_id.clone()],
                format!(
                    "{} fragment {} has no quality metrics",
                    node.fragment_type, node.fragment_id
                ),
            )
        })
        .collect()
}

/// Edges where the parent's timestamp sorts after the child's.
///
/// Compares raw strings, so every fragment must use the same ISO-8601 layout
/// and timezone for the result to mean anything.
pub fn detect_timestamp_violations(graph: &LineageGraph) -> Vec<ConsistencyIssue> {
    graph
        .edges()
        .iter()
        .filter_map(|edge| {
            let parent = graph.get(&edge.from)?;
            let child = graph.get(&edge.to)?;
            if parent.timestamp <= child.timestamp {
                return None;
            }
            Some(ConsistencyIssue::new(
                IssueKind::TimestampViolation,
                vec![child.fragment_id.clone(), parent.fragment_id.clone()],
                format!(
                    "Fragment {} ({}) predates its parent {} ({})",
                    child.fragment_id, child.timestamp, parent.fragment_id, parent.timestamp
                ),
            ))
        })
        .collect()
}
