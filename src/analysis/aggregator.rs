//! Smell aggregation, statistics and cross-model consensus.
//!
//! This module combines the results of every (model, file) pair into
//! per-model and per-release statistics, a ranking of smell types, and
//! the list of findings that several models reported independently.
//! The output is fully deterministic: all maps are ordered and ties are
//! broken by the canonical taxonomy order.

use crate::error::AggregationError;
use crate::models::{
    AggregateStats, Confidence, ConsensusEntry, FileAnalysis, Location, ModelStats, RankedType,
    ReleaseStats,
};
use crate::taxonomy::SmellType;
use regex::Regex;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::LazyLock;

static CALL_IDENT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b([A-Za-z_][A-Za-z0-9_]*)\(").expect("valid regex"));
static KEYWORD_IDENT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b(?:def|fn|func|function|method)\s+([A-Za-z_][A-Za-z0-9_]*)")
        .expect("valid regex")
});
static CLASS_IDENT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\bclass\s+([A-Za-z_][A-Za-z0-9_]*)").expect("valid regex"));
static LINE_HINT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\b(?:lines?\s*:?\s*|l)(\d+)").expect("valid regex"));

/// Consensus and ranking knobs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConsensusSettings {
    /// Line distance under which identifier-less locations still match.
    /// Zero means strict normalized equality.
    pub line_tolerance: u32,
    /// Length of the smell type ranking.
    pub top_n: usize,
}

impl Default for ConsensusSettings {
    fn default() -> Self {
        Self {
            line_tolerance: 0,
            top_n: 10,
        }
    }
}

/// A location reduced to what matters for matching.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocationKey {
    pub key: String,
    /// Whether `key` is a function or class identifier.
    pub has_identifier: bool,
    pub line: Option<u32>,
}

/// Normalize a location: identifier if one is named, else the
/// lower-cased text with whitespace removed.
pub fn normalize_location(location: &Location) -> LocationKey {
    let line = location.line_start.or_else(|| {
        LINE_HINT
            .captures(&location.text)
            .and_then(|c| c[1].parse().ok())
    });

    let identifier = location
        .function
        .as_deref()
        .and_then(clean_identifier)
        .or_else(|| capture(&KEYWORD_IDENT, &location.text))
        .or_else(|| capture(&CALL_IDENT, &location.text))
        .or_else(|| location.class.as_deref().and_then(clean_identifier))
        .or_else(|| capture(&CLASS_IDENT, &location.text));

    match identifier {
        Some(key) => LocationKey {
            key,
            has_identifier: true,
            line,
        },
        None => LocationKey {
            key: location
                .text
                .chars()
                .filter(|c| !c.is_whitespace())
                .collect::<String>()
                .to_lowercase(),
            has_identifier: false,
            line,
        },
    }
}

fn capture(re: &Regex, text: &str) -> Option<String> {
    re.captures(text)
        .and_then(|c| clean_identifier(c.get(1)?.as_str()))
}

fn clean_identifier(raw: &str) -> Option<String> {
    let name = raw.trim().trim_end_matches("()").trim();
    let name = name.rsplit('.').next().unwrap_or(name);
    (!name.is_empty()).then(|| name.to_lowercase())
}

/// Whether two normalized locations refer to the same finding.
pub fn locations_match(a: &LocationKey, b: &LocationKey, line_tolerance: u32) -> bool {
    if a.key == b.key {
        return true;
    }
    if line_tolerance == 0 || a.has_identifier || b.has_identifier {
        return false;
    }
    match (a.line, b.line) {
        (Some(x), Some(y)) => x.abs_diff(y) <= line_tolerance,
        _ => false,
    }
}

/// Aggregate all results of a run.
pub fn aggregate(
    analyses: &[FileAnalysis],
    models: &[String],
    settings: &ConsensusSettings,
) -> Result<AggregateStats, AggregationError> {
    validate_models(analyses, models)?;

    let by_model = model_statistics(analyses, models);

    let tallied: usize = by_model.values().map(|s| s.total).sum();
    let expected: usize = analyses.iter().map(FileAnalysis::total_smells).sum();
    if tallied != expected {
        return Err(AggregationError::CountMismatch { tallied, expected });
    }

    let findings = cluster_findings(analyses, settings.line_tolerance);

    let mut consensus = Vec::new();
    let mut unique_findings: BTreeMap<String, usize> =
        models.iter().map(|m| (m.clone(), 0)).collect();

    for finding in findings {
        if finding.models.len() >= 2 {
            consensus.push(ConsensusEntry {
                confidence: Confidence::from_agreement(finding.models.len(), models.len()),
                file_path: finding.file_path,
                smell_type: finding.smell_type,
                location_key: finding.anchor.key,
                location: finding.location_text,
                contributing_models: finding.models,
            });
        } else if let Some(model) = finding.models.into_iter().next() {
            *unique_findings.entry(model).or_insert(0) += 1;
        }
    }

    consensus.sort_by(|a, b| {
        a.file_path
            .cmp(&b.file_path)
            .then_with(|| a.smell_type.cmp(&b.smell_type))
            .then_with(|| a.location_key.cmp(&b.location_key))
    });

    let agreement = agreement_matrix(&consensus, models);

    Ok(AggregateStats {
        models_compared: models.to_vec(),
        total_files_analyzed: analyses
            .iter()
            .filter(|a| a.results.iter().any(|r| r.success))
            .count(),
        files_with_failures: analyses.iter().filter(|a| a.failures() > 0).count(),
        by_model,
        by_release: release_statistics(analyses),
        top_types: rank_types(analyses, settings.top_n),
        consensus,
        agreement,
        unique_findings,
    })
}

fn validate_models(analyses: &[FileAnalysis], models: &[String]) -> Result<(), AggregationError> {
    for analysis in analyses {
        for result in &analysis.results {
            if !models.contains(&result.model_name) {
                return Err(AggregationError::UnknownModel {
                    model: result.model_name.clone(),
                    file: analysis.file.path.clone(),
                });
            }
        }
    }
    Ok(())
}

/// Counts per model over successful results.
fn model_statistics(analyses: &[FileAnalysis], models: &[String]) -> BTreeMap<String, ModelStats> {
    let mut stats: BTreeMap<String, ModelStats> = models
        .iter()
        .map(|m| (m.clone(), ModelStats::default()))
        .collect();

    for result in analyses.iter().flat_map(|a| &a.results) {
        let Some(entry) = stats.get_mut(&result.model_name) else {
            continue;
        };
        if !result.success {
            entry.failures += 1;
            continue;
        }
        entry.files_analyzed += 1;
        entry.total += result.smells.len();
        for smell in &result.smells {
            *entry
                .by_type
                .entry(smell.smell_type.name().to_string())
                .or_insert(0) += 1;
            *entry
                .by_severity
                .entry(smell.severity.to_string())
                .or_insert(0) += 1;
        }
    }

    for entry in stats.values_mut() {
        entry.avg_per_file = average(entry.total, entry.files_analyzed);
    }

    stats
}

/// Counts per release tag over successful results.
fn release_statistics(analyses: &[FileAnalysis]) -> BTreeMap<String, ReleaseStats> {
    let mut stats: BTreeMap<String, ReleaseStats> = BTreeMap::new();

    for analysis in analyses {
        let successful: Vec<_> = analysis.results.iter().filter(|r| r.success).collect();
        if successful.is_empty() {
            continue;
        }

        let entry = stats.entry(analysis.file.release_tag.clone()).or_default();
        entry.files_analyzed += 1;
        for smell in successful.iter().flat_map(|r| &r.smells) {
            entry.total += 1;
            *entry
                .by_type
                .entry(smell.smell_type.name().to_string())
                .or_insert(0) += 1;
        }
    }

    for entry in stats.values_mut() {
        entry.avg_per_file = average(entry.total, entry.files_analyzed);
    }

    stats
}

/// Smell types by descending count, ties in canonical order.
fn rank_types(analyses: &[FileAnalysis], top_n: usize) -> Vec<RankedType> {
    let mut counts: BTreeMap<&SmellType, usize> = BTreeMap::new();
    for smell in analyses
        .iter()
        .flat_map(|a| &a.results)
        .filter(|r| r.success)
        .flat_map(|r| &r.smells)
    {
        *counts.entry(&smell.smell_type).or_insert(0) += 1;
    }

    // BTreeMap iteration is already canonical order; the stable sort keeps it for ties
    let mut ranked: Vec<RankedType> = counts
        .into_iter()
        .map(|(smell_type, count)| RankedType {
            smell_type: smell_type.clone(),
            count,
        })
        .collect();
    ranked.sort_by(|a, b| b.count.cmp(&a.count));
    ranked.truncate(top_n);
    ranked
}

/// One distinct finding within a file.
struct Finding {
    file_path: String,
    smell_type: SmellType,
    anchor: LocationKey,
    location_text: String,
    models: BTreeSet<String>,
}

/// Group successful records per file by smell type and matching location.
///
/// Records are visited in model order, then record order; each joins the
/// first finding whose anchor it matches.
fn cluster_findings(analyses: &[FileAnalysis], line_tolerance: u32) -> Vec<Finding> {
    let mut all = Vec::new();

    for analysis in analyses {
        let mut findings: Vec<Finding> = Vec::new();

        for result in analysis.results.iter().filter(|r| r.success) {
            for smell in &result.smells {
                let key = normalize_location(&smell.location);
                let existing = findings.iter_mut().find(|f| {
                    f.smell_type == smell.smell_type
                        && locations_match(&f.anchor, &key, line_tolerance)
                });

                match existing {
                    Some(finding) => {
                        finding.models.insert(result.model_name.clone());
                    }
                    None => findings.push(Finding {
                        file_path: analysis.file.path.clone(),
                        smell_type: smell.smell_type.clone(),
                        anchor: key,
                        location_text: smell.location.text.clone(),
                        models: BTreeSet::from([result.model_name.clone()]),
                    }),
                }
            }
        }

        all.extend(findings);
    }

    all
}

/// Pairwise count of consensus entries shared by two models.
fn agreement_matrix(
    consensus: &[ConsensusEntry],
    models: &[String],
) -> BTreeMap<String, BTreeMap<String, usize>> {
    let mut matrix: BTreeMap<String, BTreeMap<String, usize>> = models
        .iter()
        .map(|a| {
            let row = models
                .iter()
                .filter(|b| *b != a)
                .map(|b| (b.clone(), 0))
                .collect();
            (a.clone(), row)
        })
        .collect();

    for entry in consensus {
        for a in &entry.contributing_models {
            for b in &entry.contributing_models {
                if a == b {
                    continue;
                }
                if let Some(count) = matrix.get_mut(a).and_then(|row| row.get_mut(b)) {
                    *count += 1;
                }
            }
        }
    }

    matrix
}

/// Files with the most smells across all models.
pub fn most_smelly_files(analyses: &[FileAnalysis], n: usize) -> Vec<(&str, usize)> {
    let mut files: Vec<_> = analyses
        .iter()
        .map(|a| (a.file.path.as_str(), a.total_smells()))
        .filter(|(_, count)| *count > 0)
        .collect();

    files.sort_by_key(|(_, count)| std::cmp::Reverse(*count));
    files.truncate(n);
    files
}

fn average(total: usize, files: usize) -> f64 {
    if files == 0 {
        0.0
    } else {
        total as f64 / files as f64
    }
}
