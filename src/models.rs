//! Data models for the smell detector.
//!
//! This module contains the core data structures used throughout
//! the application: parsed smell records, per-model results, files
//! and the aggregate statistics of a run.

use crate::taxonomy::{Category, SmellType};
use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

/// Severity level of a smell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Severity {
    /// The model gave a severity outside the vocabulary
    Unknown,
    Low,
    Medium,
    High,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Unknown => write!(f, "Unknown"),
            Severity::Low => write!(f, "Low"),
            Severity::Medium => write!(f, "Medium"),
            Severity::High => write!(f, "High"),
        }
    }
}

impl From<&str> for Severity {
    fn from(s: &str) -> Self {
        match s.trim().to_lowercase().as_str() {
            "high" => Severity::High,
            "medium" | "moderate" => Severity::Medium,
            "low" => Severity::Low,
            _ => Severity::Unknown,
        }
    }
}

/// Where in the file a smell was reported.
///
/// Models answer either with a free-form string or with a structured
/// object; both end up here with `text` always populated.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Location {
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub function: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub class: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub line_start: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub line_end: Option<u32>,
}

impl Location {
    /// A location described only by free-form text.
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ..Self::default()
        }
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.text)
    }
}

/// A single code smell reported by one model for one file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SmellRecord {
    pub smell_type: SmellType,
    pub category: Category,
    pub location: Location,
    pub evidence: String,
    pub severity: Severity,
    pub justification: String,
    pub refactoring_suggestion: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refactored_example: Option<String>,
}

/// Outcome of asking one model about one file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelResult {
    pub model_name: String,
    pub file_path: String,
    pub success: bool,
    pub smells: Vec<SmellRecord>,
    /// Entries the parser rejected for missing required fields.
    #[serde(default)]
    pub dropped_entries: usize,
    /// Raw model output, kept for diagnostics.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub raw_response: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ModelResult {
    /// A successful result.
    pub fn succeeded(
        model_name: &str,
        file_path: &str,
        smells: Vec<SmellRecord>,
        dropped_entries: usize,
        raw_response: String,
    ) -> Self {
        Self {
            model_name: model_name.to_string(),
            file_path: file_path.to_string(),
            success: true,
            smells,
            dropped_entries,
            raw_response: Some(raw_response),
            error: None,
        }
    }

    /// A failed result with zero smells.
    pub fn failed(
        model_name: &str,
        file_path: &str,
        error: impl Into<String>,
        raw_response: Option<String>,
    ) -> Self {
        Self {
            model_name: model_name.to_string(),
            file_path: file_path.to_string(),
            success: false,
            smells: Vec::new(),
            dropped_entries: 0,
            raw_response,
            error: Some(error.into()),
        }
    }
}

/// A source file selected for analysis.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileRecord {
    /// Path relative to the releases directory.
    pub path: String,
    pub release_tag: String,
    /// Size in bytes.
    pub size: u64,
}

/// All model results for one file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileAnalysis {
    pub file: FileRecord,
    pub results: Vec<ModelResult>,
}

impl FileAnalysis {
    pub fn total_smells(&self) -> usize {
        self.results.iter().map(|r| r.smells.len()).sum()
    }

    pub fn failures(&self) -> usize {
        self.results.iter().filter(|r| !r.success).count()
    }
}

/// How many models agree on a finding, relative to how many were asked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Confidence {
    Low,
    Medium,
    High,
}

impl Confidence {
    /// Tier for `agreeing` out of `total` configured models.
    pub fn from_agreement(agreeing: usize, total: usize) -> Self {
        if total == 0 {
            return Confidence::Low;
        }
        let ratio = agreeing as f64 / total as f64;
        if ratio >= 1.0 {
            Confidence::High
        } else if ratio >= 0.5 {
            Confidence::Medium
        } else {
            Confidence::Low
        }
    }
}

impl fmt::Display for Confidence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Confidence::Low => write!(f, "Low"),
            Confidence::Medium => write!(f, "Medium"),
            Confidence::High => write!(f, "High"),
        }
    }
}

/// A smell independently reported by two or more models.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsensusEntry {
    pub file_path: String,
    pub smell_type: SmellType,
    /// Normalized location used for matching.
    pub location_key: String,
    /// Location text as the first contributing model phrased it.
    pub location: String,
    pub contributing_models: BTreeSet<String>,
    pub confidence: Confidence,
}

impl ConsensusEntry {
    pub fn agreement_count(&self) -> usize {
        self.contributing_models.len()
    }
}

/// Statistics for one model across all files.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ModelStats {
    /// Files with a successful result.
    pub files_analyzed: usize,
    pub failures: usize,
    pub total: usize,
    pub avg_per_file: f64,
    pub by_type: BTreeMap<String, usize>,
    pub by_severity: BTreeMap<String, usize>,
}

/// Statistics for one release.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReleaseStats {
    pub files_analyzed: usize,
    pub total: usize,
    pub avg_per_file: f64,
    pub by_type: BTreeMap<String, usize>,
}

/// A smell type and how often it was reported.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RankedType {
    pub smell_type: SmellType,
    pub count: usize,
}

/// The final output of an aggregation pass.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AggregateStats {
    pub models_compared: Vec<String>,
    pub total_files_analyzed: usize,
    pub files_with_failures: usize,
    pub by_model: BTreeMap<String, ModelStats>,
    pub by_release: BTreeMap<String, ReleaseStats>,
    pub top_types: Vec<RankedType>,
    pub consensus: Vec<ConsensusEntry>,
    /// Pairwise count of consensus findings shared by two models.
    pub agreement: BTreeMap<String, BTreeMap<String, usize>>,
    /// Findings that only one model reported.
    pub unique_findings: BTreeMap<String, usize>,
}

impl AggregateStats {
    pub fn total_smells(&self) -> usize {
        self.by_model.values().map(|s| s.total).sum()
    }

    pub fn total_failures(&self) -> usize {
        self.by_model.values().map(|s| s.failures).sum()
    }
}

/// Metadata about a run, printed in the text report.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunMetadata {
    pub generated_at: DateTime<Local>,
    pub releases_dir: String,
    pub files_discovered: usize,
    pub files_skipped: Vec<String>,
    pub cancelled: bool,
    pub duration_seconds: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_severity_from_str() {
        assert_eq!(Severity::from("High"), Severity::High);
        assert_eq!(Severity::from(" medium "), Severity::Medium);
        assert_eq!(Severity::from("LOW"), Severity::Low);
        assert_eq!(Severity::from("catastrophic"), Severity::Unknown);
    }

    #[test]
    fn test_severity_ordering() {
        assert!(Severity::Unknown < Severity::Low);
        assert!(Severity::Low < Severity::Medium);
        assert!(Severity::Medium < Severity::High);
    }

    #[test]
    fn test_confidence_tiers_with_three_models() {
        assert_eq!(Confidence::from_agreement(1, 3), Confidence::Low);
        assert_eq!(Confidence::from_agreement(2, 3), Confidence::Medium);
        assert_eq!(Confidence::from_agreement(3, 3), Confidence::High);
    }

    #[test]
    fn test_confidence_is_monotonic() {
        for total in 1..=8 {
            let mut previous = Confidence::Low;
            for agreeing in 0..=total {
                let tier = Confidence::from_agreement(agreeing, total);
                assert!(tier >= previous, "{agreeing}/{total} decreased");
                previous = tier;
            }
        }
    }

    #[test]
    fn test_failed_result_has_no_smells() {
        let result = ModelResult::failed("m", "a.py", "timeout", None);
        assert!(!result.success);
        assert!(result.smells.is_empty());
        assert_eq!(result.error.as_deref(), Some("timeout"));
    }
}
