//! Text and JSON report generation.
//!
//! This module renders aggregate statistics as a plain-text comparison
//! report and as pretty-printed JSON.

use crate::models::{AggregateStats, ConsensusEntry, RunMetadata};
use anyhow::Result;
use serde::Serialize;

const RULE_WIDTH: usize = 80;

/// Generate the complete text report.
pub fn generate_text_report(stats: &AggregateStats, metadata: &RunMetadata) -> String {
    let mut output = String::new();

    output.push_str(&generate_header(stats, metadata));
    output.push_str(&generate_model_section(stats));
    output.push_str(&generate_release_section(stats));
    output.push_str(&generate_top_types_section(stats));
    output.push_str(&generate_consensus_section(&stats.consensus));
    output.push_str(&generate_agreement_section(stats));
    output.push_str(&generate_failures_section(stats, metadata));

    output
}

/// Pretty-printed JSON for any serializable report payload.
pub fn generate_json<T: Serialize + ?Sized>(value: &T) -> Result<String> {
    serde_json::to_string_pretty(value).map_err(Into::into)
}

fn heading(title: &str) -> String {
    format!("\n{}\n{}\n", title, "-".repeat(RULE_WIDTH))
}

fn generate_header(stats: &AggregateStats, metadata: &RunMetadata) -> String {
    let rule = "=".repeat(RULE_WIDTH);
    let mut section = String::new();

    section.push_str(&format!("{rule}\n"));
    section.push_str("CODE SMELL ANALYSIS REPORT - MULTI-LLM COMPARISON\n");
    section.push_str(&format!("{rule}\n\n"));

    section.push_str(&format!(
        "Generated: {}\n",
        metadata.generated_at.format("%Y-%m-%d %H:%M:%S")
    ));
    section.push_str(&format!("Releases directory: {}\n", metadata.releases_dir));
    section.push_str(&format!(
        "Models compared: {}\n",
        stats.models_compared.join(", ")
    ));
    section.push_str(&format!(
        "Files discovered: {}\n",
        metadata.files_discovered
    ));
    section.push_str(&format!(
        "Files analyzed: {}\n",
        stats.total_files_analyzed
    ));
    section.push_str(&format!("Total smells: {}\n", stats.total_smells()));
    section.push_str(&format!("Duration: {:.1}s\n", metadata.duration_seconds));
    if metadata.cancelled {
        section.push_str("Status: CANCELLED (partial results)\n");
    }

    section
}

fn generate_model_section(stats: &AggregateStats) -> String {
    let mut section = heading("STATISTICS PER MODEL");

    for (model, model_stats) in &stats.by_model {
        section.push_str(&format!("\n{}:\n", model));
        section.push_str(&format!(
            "  Files analyzed: {}\n",
            model_stats.files_analyzed
        ));
        section.push_str(&format!("  Failed calls: {}\n", model_stats.failures));
        section.push_str(&format!("  Total smells: {}\n", model_stats.total));
        section.push_str(&format!(
            "  Average smells per file: {:.2}\n",
            model_stats.avg_per_file
        ));

        if !model_stats.by_severity.is_empty() {
            let severities: Vec<String> = model_stats
                .by_severity
                .iter()
                .map(|(severity, count)| format!("{severity}: {count}"))
                .collect();
            section.push_str(&format!("  By severity: {}\n", severities.join(", ")));
        }

        if !model_stats.by_type.is_empty() {
            section.push_str("  By type:\n");
            let mut types: Vec<_> = model_stats.by_type.iter().collect();
            types.sort_by_key(|(_, count)| std::cmp::Reverse(**count));
            for (smell_type, count) in types {
                section.push_str(&format!("    - {}: {}\n", smell_type, count));
            }
        }
    }

    section
}

fn generate_release_section(stats: &AggregateStats) -> String {
    let mut section = heading("STATISTICS PER RELEASE");

    if stats.by_release.is_empty() {
        section.push_str("\nNo release had a successful analysis.\n");
        return section;
    }

    for (release, release_stats) in &stats.by_release {
        section.push_str(&format!("\n{}:\n", release));
        section.push_str(&format!(
            "  Files analyzed: {}\n",
            release_stats.files_analyzed
        ));
        section.push_str(&format!("  Total smells: {}\n", release_stats.total));
        section.push_str(&format!(
            "  Average smells per file: {:.2}\n",
            release_stats.avg_per_file
        ));
    }

    section
}

fn generate_top_types_section(stats: &AggregateStats) -> String {
    let mut section = heading("TOP SMELL TYPES");

    if stats.top_types.is_empty() {
        section.push_str("\nNo smells reported.\n");
        return section;
    }

    section.push('\n');
    for (i, ranked) in stats.top_types.iter().enumerate() {
        section.push_str(&format!(
            "{:>3}. {}: {}\n",
            i + 1,
            ranked.smell_type,
            ranked.count
        ));
    }

    section
}

fn generate_consensus_section(consensus: &[ConsensusEntry]) -> String {
    let mut section = heading("CONSENSUS CODE SMELLS (detected by multiple models)");

    if consensus.is_empty() {
        section.push_str("\nNo code smells detected by multiple models.\n");
        return section;
    }

    // Stable sort keeps file/type/location order among equal agreement
    let mut entries: Vec<&ConsensusEntry> = consensus.iter().collect();
    entries.sort_by_key(|e| std::cmp::Reverse(e.agreement_count()));

    for entry in entries {
        section.push_str(&format!("\nFile: {}\n", entry.file_path));
        section.push_str(&format!("  Smell: {}\n", entry.smell_type));
        section.push_str(&format!("  Location: {}\n", entry.location));
        section.push_str(&format!(
            "  Detected by {} models: {}\n",
            entry.agreement_count(),
            entry
                .contributing_models
                .iter()
                .cloned()
                .collect::<Vec<_>>()
                .join(", ")
        ));
        section.push_str(&format!("  Confidence: {}\n", entry.confidence));
    }

    section
}

fn generate_agreement_section(stats: &AggregateStats) -> String {
    let mut section = heading("MODEL AGREEMENT");

    if stats.models_compared.len() < 2 {
        section.push_str("\nAgreement needs at least two models.\n");
        return section;
    }

    section.push('\n');
    for (model, row) in &stats.agreement {
        for (other, shared) in row {
            // Each pair once
            if model < other {
                section.push_str(&format!("{} <-> {}: {} shared\n", model, other, shared));
            }
        }
    }

    section.push_str("\nFindings reported by a single model:\n");
    for (model, count) in &stats.unique_findings {
        section.push_str(&format!("  {}: {}\n", model, count));
    }

    section
}

fn generate_failures_section(stats: &AggregateStats, metadata: &RunMetadata) -> String {
    let mut section = heading("FAILURES");

    section.push_str(&format!(
        "\nFailed model calls: {}\n",
        stats.total_failures()
    ));
    section.push_str(&format!(
        "Files with at least one failed call: {}\n",
        stats.files_with_failures
    ));
    for (model, model_stats) in &stats.by_model {
        section.push_str(&format!("  {}: {}\n", model, model_stats.failures));
    }

    section.push_str(&format!(
        "Unreadable files skipped: {}\n",
        metadata.files_skipped.len()
    ));
    for path in &metadata.files_skipped {
        section.push_str(&format!("  - {}\n", path));
    }

    section
}
