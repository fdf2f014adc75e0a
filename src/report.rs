//! Downloadable reports: the plain-text narrative and the score CSV.

use crate::error::GraderError;
use crate::output::GradingReport;
use std::path::{Path, PathBuf};
use tracing::info;

/// File name offered for the text report.
pub const TEXT_REPORT_FILE: &str = "grading_results.txt";
/// File name offered for the score CSV.
pub const CSV_REPORT_FILE: &str = "student_scores.csv";

const RULE_WIDTH: usize = 50;

/// Full text report: the key, then each student's analysis and transcription.
///
/// ```text
/// Answer Sheet Analysis Results
///
/// Answer Key:
/// <key text>
///
///
/// ==================================================
/// Student: alice
/// Analysis:
/// <analysis>
/// Transcribed Answer:
/// <transcription>
/// ```
pub fn text_report(report: &GradingReport) -> String {
    let mut out = String::from("Answer Sheet Analysis Results\n\n");
    out.push_str(&format!("Answer Key:\n{}\n\n", report.answer_key.text));

    let rule = "=".repeat(RULE_WIDTH);
    for submission in &report.submissions {
        out.push_str(&format!("\n{}\n", rule));
        out.push_str(&format!("Student: {}\n", submission.name));
        if let Some(ref error) = submission.error {
            out.push_str(&format!("Error: {}\n", error));
        }
        out.push_str(&format!("Analysis:\n{}\n", submission.analysis));
        out.push_str(&format!("Transcribed Answer:\n{}\n", submission.text));
    }
    out
}

/// `Student Name,Score` with one row per student, score as scraped.
pub fn csv_report(report: &GradingReport) -> Result<String, GraderError> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    writer.write_record(["Student Name", "Score"])?;
    for submission in &report.submissions {
        writer.write_record([submission.name.as_str(), submission.score().as_str()])?;
    }
    let bytes = writer
        .into_inner()
        .map_err(|e| GraderError::Internal(format!("CSV flush failed: {}", e)))?;
    String::from_utf8(bytes).map_err(|e| GraderError::Internal(format!("CSV not UTF-8: {}", e)))
}

/// Write both reports into `dir`, creating it if needed.
///
/// Each file is written to a temporary sibling and renamed into place so a
/// crash never leaves a half-written report.
pub async fn write_reports(
    report: &GradingReport,
    dir: impl AsRef<Path>,
) -> Result<(PathBuf, PathBuf), GraderError> {
    let dir = dir.as_ref();
    tokio::fs::create_dir_all(dir)
        .await
        .map_err(|e| GraderError::ReportWriteFailed {
            path: dir.to_path_buf(),
            source: e,
        })?;

    let text_path = dir.join(TEXT_REPORT_FILE);
    write_atomic(&text_path, text_report(report).as_bytes()).await?;

    let csv_path = dir.join(CSV_REPORT_FILE);
    write_atomic(&csv_path, csv_report(report)?.as_bytes()).await?;

    info!("Reports written to {}", dir.display());
    Ok((text_path, csv_path))
}

async fn write_atomic(path: &Path, contents: &[u8]) -> Result<(), GraderError> {
    let tmp_path = path.with_extension("tmp");
    tokio::fs::write(&tmp_path, contents)
        .await
        .map_err(|e| GraderError::ReportWriteFailed {
            path: path.to_path_buf(),
            source: e,
        })?;
    tokio::fs::rename(&tmp_path, path)
        .await
        .map_err(|e| GraderError::ReportWriteFailed {
            path: path.to_path_buf(),
            source: e,
        })
}
