//! Report rendering: missing-set CSVs and the monthly transaction summary
//! as CSV and PDF.

pub mod csv;
pub mod pdf;
pub mod summary;

pub use csv::{missing_report, CsvReport};
pub use pdf::PdfReport;
pub use summary::{
    format_currency, humanize_type, impact_for, summary_range, Impact, MonthSection,
    MonthlySummary, SummaryLine,
};
