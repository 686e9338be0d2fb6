// Wipe report sink.
//
// The engine returns a WipeSummary and stops there; turning that summary
// into a persisted record is the front end's job, through this trait. The
// JSON sink mirrors the certificate layout TrustWipe has always emitted,
// minus any rendering.

use crate::engine::WipeSummary;
use chrono::Utc;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use uuid::Uuid;

/// Caller-supplied context recorded alongside the summary: device model,
/// serial, operator, whatever the front end knows.
pub type ReportMetadata = BTreeMap<String, String>;

pub trait ReportSink {
    fn record(&self, summary: &WipeSummary, metadata: &ReportMetadata) -> anyhow::Result<PathBuf>;
}

#[derive(Debug, Serialize)]
struct ReportDocument<'a> {
    report_id: Uuid,
    generated_at: String,
    summary: &'a WipeSummary,
    metadata: &'a ReportMetadata,
}

/// Writes one JSON file per completed job into a report directory.
pub struct JsonReportSink {
    directory: PathBuf,
}

impl JsonReportSink {
    pub fn new(directory: impl Into<PathBuf>) -> Self {
        Self {
            directory: directory.into(),
        }
    }

    /// Default report location: the user data dir, or ./trustwipe-reports
    /// when no home is available (e.g. running from a live system).
    pub fn default_directory() -> PathBuf {
        directories::ProjectDirs::from("", "", "trustwipe")
            .map(|dirs| dirs.data_dir().join("reports"))
            .unwrap_or_else(|| PathBuf::from("./trustwipe-reports"))
    }

    fn file_name(summary: &WipeSummary) -> String {
        let target = Path::new(&summary.target)
            .file_name()
            .map(|n| n.to_string_lossy().replace(' ', "_"))
            .unwrap_or_else(|| "target".to_string());
        format!(
            "trustwipe_report_{}_{}.json",
            target,
            summary.finished_at.format("%Y%m%d_%H%M%S")
        )
    }
}

impl ReportSink for JsonReportSink {
    fn record(&self, summary: &WipeSummary, metadata: &ReportMetadata) -> anyhow::Result<PathBuf> {
        fs::create_dir_all(&self.directory)?;

        let document = ReportDocument {
            report_id: Uuid::new_v4(),
            generated_at: Utc::now().to_rfc3339(),
            summary,
            metadata,
        };

        let path = self.directory.join(Self::file_name(summary));
        fs::write(&path, serde_json::to_string_pretty(&document)?)?;
        Ok(path)
    }
}
