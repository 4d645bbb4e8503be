//! Plain CSV output.
//!
//! Fields are joined with commas as-is. Values containing commas or
//! newlines are not quoted, so such values shift the columns of their row.

use crate::error::SyncError;
use crate::models::MatchRule;
use crate::reconcile::MissingSet;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CsvReport {
    header: String,
    rows: Vec<String>,
}

impl CsvReport {
    pub fn new(header: impl Into<String>) -> Self {
        Self {
            header: header.into(),
            rows: Vec::new(),
        }
    }

    pub fn push_row<I, S>(&mut self, fields: I)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let row = fields
            .into_iter()
            .map(|field| field.as_ref().to_string())
            .collect::<Vec<_>>()
            .join(",");
        self.rows.push(row);
    }

    pub fn rows(&self) -> &[String] {
        &self.rows
    }

    /// `header\nrow\n...`, every line newline-terminated.
    pub fn render(&self) -> String {
        let mut out = String::with_capacity(self.header.len() + 1 + self.rows.len() * 32);
        out.push_str(&self.header);
        out.push('\n');
        for row in &self.rows {
            out.push_str(row);
            out.push('\n');
        }
        out
    }

    /// Writes the report into `dir`, creating the directory when needed.
    pub async fn write(&self, dir: &Path, file_name: &str) -> Result<PathBuf, SyncError> {
        tokio::fs::create_dir_all(dir).await?;
        let path = dir.join(file_name);
        tokio::fs::write(&path, self.render()).await?;
        tracing::info!(path = %path.display(), rows = self.rows.len(), "CSV file generated");
        Ok(path)
    }
}

/// One row per missing candidate, laid out by the rule's report layout.
///
/// The key column is the first extracted key: the parent order id, the
/// gateway transaction id, or the candidate's own `platform_id`.
pub fn missing_report(rule: &MatchRule, missing: &MissingSet) -> CsvReport {
    let mut report = CsvReport::new(rule.report.header);
    for entry in missing.iter() {
        let key = entry.primary_key().unwrap_or_default();
        if rule.report.detailed {
            let record = &entry.record;
            report.push_row([
                key,
                record.record_type().unwrap_or_default(),
                record.status().unwrap_or_default(),
                record.date().as_deref().unwrap_or_default(),
            ]);
        } else {
            report.push_row([key]);
        }
    }
    report
}
