//! Writes run results to the output directory.

use super::generator::{generate_json, generate_text_report};
use crate::models::{AggregateStats, FileAnalysis, RunMetadata};
use anyhow::{Context, Result};
use std::fs::OpenOptions;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use tracing::info;

/// Timestamp used in output file names.
pub const TIMESTAMP_FORMAT: &str = "%Y%m%d_%H%M%S";

/// Paths of the files written by one run.
#[derive(Debug, Clone)]
pub struct WrittenReports {
    pub analysis: PathBuf,
    pub comparison: PathBuf,
    pub report: PathBuf,
}

/// Writes the three report files of a run.
pub struct ReportWriter {
    output_dir: PathBuf,
}

impl ReportWriter {
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
        }
    }

    /// Write `analysis_<ts>.json`, `comparison_<ts>.json` and `report_<ts>.txt`.
    pub fn write_all(
        &self,
        analyses: &[FileAnalysis],
        stats: &AggregateStats,
        metadata: &RunMetadata,
    ) -> Result<WrittenReports> {
        std::fs::create_dir_all(&self.output_dir).with_context(|| {
            format!(
                "Failed to create output directory: {}",
                self.output_dir.display()
            )
        })?;

        let ts = metadata.generated_at.format(TIMESTAMP_FORMAT).to_string();

        let analysis = self.write_new(&format!("analysis_{ts}"), "json", &generate_json(analyses)?)?;
        let comparison = self.write_new(&format!("comparison_{ts}"), "json", &generate_json(stats)?)?;
        let report = self.write_new(
            &format!("report_{ts}"),
            "txt",
            &generate_text_report(stats, metadata),
        )?;

        Ok(WrittenReports {
            analysis,
            comparison,
            report,
        })
    }

    /// Create `<stem>.<ext>`, or `<stem>_N.<ext>` if that name is taken.
    fn write_new(&self, stem: &str, ext: &str, content: &str) -> Result<PathBuf> {
        let mut attempt = 0u32;
        loop {
            let name = if attempt == 0 {
                format!("{stem}.{ext}")
            } else {
                format!("{stem}_{attempt}.{ext}")
            };
            let path = self.output_dir.join(name);

            match create_new(&path) {
                Ok(mut file) => {
                    file.write_all(content.as_bytes())
                        .with_context(|| format!("Failed to write {}", path.display()))?;
                    info!("Wrote {}", path.display());
                    return Ok(path);
                }
                Err(e) if e.kind() == ErrorKind::AlreadyExists => attempt += 1,
                Err(e) => {
                    return Err(e).with_context(|| format!("Failed to create {}", path.display()))
                }
            }
        }
    }
}

fn create_new(path: &Path) -> std::io::Result<std::fs::File> {
    OpenOptions::new().write(true).create_new(true).open(path)
}
