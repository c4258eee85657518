//! Append-only provenance log (JSON Lines).
//!
//! Loading a line that is not valid JSON, or that lacks a required key, is
//! governed by one explicit `LoadPolicy` per load: fail the whole load, or
//! skip the line with a warning and record it in the `LoadReport`.

use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use super::types::ProvenanceFragment;
use super::ProvenanceError;
use crate::config;

/// What to do with a malformed log line.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoadPolicy {
    /// Any malformed line fails the whole load.
    Strict,
    /// Malformed lines are skipped and reported.
    #[default]
    SkipInvalid,
}

impl LoadPolicy {
    /// `Strict` when `SPECIMEN_TRACE_STRICT_LOAD` is truthy, else the default.
    pub fn from_env() -> Self {
        match config::env_flag(config::ENV_STRICT_LOAD) {
            Some(true) => Self::Strict,
            Some(false) => Self::SkipInvalid,
            None => Self::default(),
        }
    }
}

/// A line dropped under `LoadPolicy::SkipInvalid`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SkippedLine {
    /// 1-based line number.
    pub line: usize,
    pub reason: String,
}

/// Fragments in log order plus what was skipped on the way.
#[derive(Debug, Clone, Default, Serialize)]
pub struct LoadReport {
    pub fragments: Vec<ProvenanceFragment>,
    pub lines_read: usize,
    pub skipped: Vec<SkippedLine>,
}

/// Parse JSON Lines into fragments. Blank lines are ignored.
pub fn parse_fragments<R: BufRead>(
    reader: R,
    policy: LoadPolicy,
) -> Result<LoadReport, ProvenanceError> {
    let mut report = LoadReport::default();

    for (idx, line) in reader.lines().enumerate() {
        let line = line?;
        let line_no = idx + 1;
        if line.trim().is_empty() {
            continue;
        }
        report.lines_read += 1;

        let parsed = serde_json::from_str::<ProvenanceFragment>(&line)
            .map_err(|e| e.to_string())
            .and_then(|fragment| {
                fragment.validate().map_err(|e| e.to_string())?;
                Ok(fragment)
            });

        match parsed {
            Ok(fragment) => report.fragments.push(fragment),
            Err(reason) => match policy {
                LoadPolicy::Strict => {
                    return Err(ProvenanceError::LogFormat {
                        line: line_no,
                        reason,
                    });
                }
                LoadPolicy::SkipInvalid => {
                    tracing::warn!(line = line_no, reason = %reason, "Skipping malformed provenance record");
                    report.skipped.push(SkippedLine {
                        line: line_no,
                        reason,
                    });
                }
            },
        }
    }

    Ok(report)
}

/// Handle to a provenance log file.
#[derive(Debug, Clone)]
pub struct FragmentLog {
    path: PathBuf,
}

impl FragmentLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Log at `SPECIMEN_TRACE_LOG` or the default data directory.
    pub fn from_env() -> Self {
        Self::new(config::provenance_log_path())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the whole log. Every call re-reads the file.
    pub fn load(&self, policy: LoadPolicy) -> Result<LoadReport, ProvenanceError> {
        if !self.path.exists() {
            return Err(ProvenanceError::LogNotFound(self.path.clone()));
        }

        let file = File::open(&self.path)?;
        let report = parse_fragments(BufReader::new(file), policy)?;

        tracing::info!(
            path = %self.path.display(),
            fragments = report.fragments.len(),
            skipped = report.skipped.len(),
            policy = ?policy,
            "Provenance log loaded"
        );

        Ok(report)
    }

    /// Append one fragment as a single line. Creates the file and parent
    /// directories on first use.
    pub fn append(&self, fragment: &ProvenanceFragment) -> Result<(), ProvenanceError> {
        fragment.validate()?;

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let mut line = serde_json::to_string(fragment)?;
        line.push('\n');

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        file.write_all(line.as_bytes())?;

        tracing::debug!(
            fragment_id = %fragment.fragment_id,
            fragment_type = %fragment.fragment_type,
            path = %self.path.display(),
            "Provenance fragment appended"
        );

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::*;
    use crate::pipeline::provenance::types::FragmentBuilder;

    const GOOD: &str = r#"{"fragment_id":"f-1","fragment_type":"ocr","source":{"identifier":"img/a.jpg"},"output":{"identifier":"ocr/a.txt"},"process":{"operation":"tesseract"},"timestamp":"2026-03-01T10:00:00Z"}"#;
    const MISSING_OUTPUT: &str = r#"{"fragment_id":"f-2","fragment_type":"ocr","source":{"identifier":"img/b.jpg"},"process":{"operation":"tesseract"},"timestamp":"2026-03-01T10:00:01Z"}"#;

    fn log_text(lines: &[&str]) -> Cursor<String> {
        Cursor::new(lines.join("\n"))
    }

    #[test]
    fn strict_policy_fails_whole_load() {
        let err = parse_fragments(log_text(&[GOOD, MISSING_OUTPUT]), LoadPolicy::Strict)
            .unwrap_err();
        match err {
            ProvenanceError::LogFormat { line, reason } => {
                assert_eq!(line, 2);
                assert!(reason.contains("output"), "unexpected reason: {reason}");
            }
            other => panic!("expected LogFormat, got {other:?}"),
        }
    }

    #[test]
    fn lenient_policy_skips_and_reports() {
        let report = parse_fragments(
            log_text(&[GOOD, "not json", MISSING_OUTPUT]),
            LoadPolicy::SkipInvalid,
        )
        .unwrap();

        assert_eq!(report.fragments.len(), 1);
        assert_eq!(report.lines_read, 3);
        assert_eq!(report.skipped.len(), 2);
        assert_eq!(report.skipped[0].line, 2);
        assert_eq!(report.skipped[1].line, 3);
    }

    #[test]
    fn blank_lines_ignored() {
        let report = parse_fragments(log_text(&["", GOOD, "   ", ""]), LoadPolicy::Strict).unwrap();
        assert_eq!(report.fragments.len(), 1);
        assert_eq!(report.lines_read, 1);
    }

    #[test]
    fn empty_fragment_id_is_malformed() {
        let line = GOOD.replace("\"f-1\"", "\"\"");
        let result = parse_fragments(log_text(&[line.as_str()]), LoadPolicy::Strict);
        assert!(matches!(result, Err(ProvenanceError::LogFormat { line: 1, .. })));
    }

    #[test]
    fn default_policy_is_skip() {
        assert_eq!(LoadPolicy::default(), LoadPolicy::SkipInvalid);
    }

    #[test]
    fn policy_from_env_flag() {
        std::env::set_var(config::ENV_STRICT_LOAD, "yes");
        let strict = LoadPolicy::from_env();
        std::env::set_var(config::ENV_STRICT_LOAD, "0");
        let lenient = LoadPolicy::from_env();
        std::env::set_var(config::ENV_STRICT_LOAD, "sometimes");
        let unparsable = LoadPolicy::from_env();
        std::env::remove_var(config::ENV_STRICT_LOAD);

        assert_eq!(strict, LoadPolicy::Strict);
        assert_eq!(lenient, LoadPolicy::SkipInvalid);
        assert_eq!(unparsable, LoadPolicy::SkipInvalid);
    }

    #[test]
    fn append_then_load_preserves_order() {
        let dir = tempfile::tempdir().unwrap();
        let log = FragmentLog::new(dir.path().join("nested").join("provenance.jsonl"));

        let ocr = FragmentBuilder::new("ocr", "tesseract")
            .fragment_id("f-ocr")
            .source("img/ab12.jpg")
            .output("ocr/ab12.txt")
            .timestamp("2026-03-01T10:00:00Z")
            .build();
        let dwc = FragmentBuilder::new("dwc_extraction", "field_extraction")
            .fragment_id("f-dwc")
            .source("ocr/ab12.txt")
            .derived_from("f-ocr")
            .output("dwc/ab12.json")
            .timestamp("2026-03-01T10:00:05Z")
            .build();

        log.append(&ocr).unwrap();
        log.append(&dwc).unwrap();

        let report = log.load(LoadPolicy::Strict).unwrap();
        assert_eq!(report.fragments, vec![ocr, dwc]);
    }

    #[test]
    fn load_missing_file_errors() {
        let dir = tempfile::tempdir().unwrap();
        let log = FragmentLog::new(dir.path().join("absent.jsonl"));
        assert!(matches!(
            log.load(LoadPolicy::SkipInvalid),
            Err(ProvenanceError::LogNotFound(_))
        ));
    }

    #[test]
    fn append_rejects_invalid_fragment() {
        let dir = tempfile::tempdir().unwrap();
        let log = FragmentLog::new(dir.path().join("provenance.jsonl"));
        let bad = FragmentBuilder::new("ocr", "tesseract").fragment_id("").build();

        assert!(log.append(&bad).is_err());
        assert!(!log.path().exists());
    }
}
