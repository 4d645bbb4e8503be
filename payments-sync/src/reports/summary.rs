//! Monthly transaction summary: amounts per month and balance entry type.

use super::csv::CsvReport;
use super::pdf::{Align, PdfReport, MARGIN, PAGE_HEIGHT};
use crate::error::SyncError;
use crate::models::RecordKind;
use crate::services::{MonthlyTotal, RecordStore};
use chrono::{DateTime, Datelike, Duration, NaiveDate, TimeZone, Utc};
use serde::Serialize;
use std::collections::BTreeSet;
use tracing::instrument;

pub const SUMMARY_HEADER: &str = "Month,Type,Count,Total Amount";
pub const PDF_TITLE: &str = "Transaction Summary Report";
pub const MONTHLY_TOTAL_LABEL: &str = "Monthly Total";

const ROW_HEIGHT: f32 = 25.0;
const RULE_GAP: f32 = 10.0;
const FIRST_SECTION_Y: f32 = 150.0;
/// Sections never start below this line; they move to a fresh page instead.
const CONTENT_BOTTOM: f32 = PAGE_HEIGHT - 2.0 * MARGIN;

const COL_TYPE: f32 = 50.0;
const COL_COUNT: f32 = 200.0;
const COL_AMOUNT: f32 = 350.0;
const COL_IMPACT: f32 = 470.0;
const NUMERIC: Align = Align::Right { width: 100 };

/// How an entry type affects the account balance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Impact {
    Added,
    Subtracted,
    Excluded,
    Unknown,
}

impl Impact {
    pub fn label(&self) -> &'static str {
        match self {
            Impact::Added => "(Added)",
            Impact::Subtracted => "(Subtracted)",
            Impact::Excluded => "(Excluded)",
            Impact::Unknown => "(Unknown)",
        }
    }
}

/// Classifies a type label, raw (`payment_refund`) or humanized
/// (`Payment Refund`).
pub fn impact_for(entry_type: &str) -> Impact {
    let normalized = entry_type
        .to_lowercase()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join("_");

    match normalized.as_str() {
        "refund_failure" | "adjustment" | "charge" | "payment" | "transfer_refund" => {
            Impact::Added
        }
        "network_cost" | "payment_refund" | "stripe_fee" | "payment_failure_refund"
        | "payment_reversal" | "refund" | "stripe_fx_fee" | "tax_fee" => Impact::Subtracted,
        "reserved_funds" | "payout" | "transfer" => Impact::Excluded,
        _ => Impact::Unknown,
    }
}

/// `payment_refund` becomes `Payment Refund`. Absent types read `Unknown`.
pub fn humanize_type(entry_type: Option<&str>) -> String {
    let Some(raw) = entry_type.filter(|raw| !raw.is_empty()) else {
        return "Unknown".to_string();
    };

    let mut out = String::with_capacity(raw.len());
    let mut at_word_start = true;
    for ch in raw.chars() {
        let ch = if ch == '_' { ' ' } else { ch };
        if at_word_start && ch.is_alphanumeric() {
            out.extend(ch.to_uppercase());
        } else {
            out.push(ch);
        }
        at_word_start = !ch.is_alphanumeric();
    }
    out
}

/// Minor units as US dollars: `123456` becomes `$1,234.56`, `-100`
/// becomes `-$1.00`.
pub fn format_currency(minor_units: i64) -> String {
    let sign = if minor_units < 0 { "-" } else { "" };
    let abs = minor_units.unsigned_abs();
    let dollars = (abs / 100).to_string();
    let cents = abs % 100;

    let mut grouped = String::with_capacity(dollars.len() + dollars.len() / 3);
    for (i, digit) in dollars.chars().enumerate() {
        if i > 0 && (dollars.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(digit);
    }

    format!("{}${}.{:02}", sign, grouped, cents)
}

/// From the first day of the earliest record's month to the last
/// millisecond of the month before `now`. Without records the range starts
/// at the first of the current month.
pub fn summary_range(
    earliest: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
) -> (DateTime<Utc>, DateTime<Utc>) {
    let start = first_of_month(earliest.unwrap_or(now));
    let end = first_of_month(now) - Duration::milliseconds(1);
    (start, end)
}

/// `2024-03` becomes `March 2024`.
fn month_title(month: &str) -> String {
    NaiveDate::parse_from_str(&format!("{}-01", month), "%Y-%m-%d")
        .map(|date| date.format("%B %Y").to_string())
        .unwrap_or_else(|_| month.to_string())
}

fn first_of_month(at: DateTime<Utc>) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(at.year(), at.month(), 1, 0, 0, 0)
        .single()
        .unwrap_or(at)
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SummaryLine {
    pub entry_type: String,
    pub count: u64,
    /// Minor units.
    pub total: i64,
    pub impact: Impact,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MonthSection {
    /// `yyyy-MM`.
    pub month: String,
    pub lines: Vec<SummaryLine>,
}

impl MonthSection {
    /// `(count, total)` across every line of the month.
    pub fn subtotal(&self) -> (u64, i64) {
        self.lines
            .iter()
            .fold((0, 0), |(count, total), line| (count + line.count, total + line.total))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MonthlySummary {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub months: Vec<MonthSection>,
    /// Humanized types without an impact classification.
    pub unknown_types: BTreeSet<String>,
}

impl MonthlySummary {
    /// Groups store totals, already ordered by year, month and type, into
    /// month sections.
    pub fn from_totals(start: DateTime<Utc>, end: DateTime<Utc>, totals: Vec<MonthlyTotal>) -> Self {
        let mut months: Vec<MonthSection> = Vec::new();
        let mut unknown_types = BTreeSet::new();

        for total in totals {
            let month = format!("{:04}-{:02}", total.year, total.month);
            let entry_type = humanize_type(total.entry_type.as_deref());
            let impact = impact_for(&entry_type);
            if impact == Impact::Unknown {
                unknown_types.insert(entry_type.clone());
            }

            let line = SummaryLine {
                entry_type,
                count: total.count,
                total: total.total,
                impact,
            };
            match months.last_mut() {
                Some(section) if section.month == month => section.lines.push(line),
                _ => months.push(MonthSection {
                    month,
                    lines: vec![line],
                }),
            }
        }

        Self {
            start,
            end,
            months,
            unknown_types,
        }
    }

    /// `summary-YYYY-MM-to-YYYY-MM`.
    pub fn file_stem(&self) -> String {
        format!(
            "summary-{}-to-{}",
            self.start.format("%Y-%m"),
            self.end.format("%Y-%m")
        )
    }

    pub fn line_count(&self) -> usize {
        self.months.iter().map(|section| section.lines.len()).sum()
    }

    pub fn to_csv(&self) -> CsvReport {
        let mut report = CsvReport::new(SUMMARY_HEADER);
        for section in &self.months {
            for line in &section.lines {
                report.push_row([
                    section.month.clone(),
                    line.entry_type.clone(),
                    line.count.to_string(),
                    format_currency(line.total),
                ]);
            }
        }
        report
    }

    /// One section per month: a heading, a column header row, a row per
    /// type with its impact, and a `Monthly Total` row. A section that
    /// would run past the bottom margin starts on a new page.
    pub fn to_pdf(&self) -> PdfReport {
        let mut pdf = PdfReport::new(PDF_TITLE);
        pdf.text(PDF_TITLE, 0.0, MARGIN, 20.0, Align::Center);
        pdf.text(
            format!("{} to {}", self.start.format("%B %Y"), self.end.format("%B %Y")),
            0.0,
            MARGIN + 30.0,
            16.0,
            Align::Center,
        );

        let mut y = FIRST_SECTION_Y;
        for section in &self.months {
            let height = (section.lines.len() + 3) as f32 * ROW_HEIGHT;
            if y + height > CONTENT_BOTTOM {
                pdf.add_page();
                y = MARGIN;
            }

            pdf.text(month_title(&section.month), COL_TYPE, y, 16.0, Align::Left);
            y += ROW_HEIGHT;

            pdf.text("Transaction Type", COL_TYPE, y, 12.0, Align::Left);
            pdf.text("Count", COL_COUNT, y, 12.0, NUMERIC);
            pdf.text("Total Amount", COL_AMOUNT, y, 12.0, NUMERIC);
            pdf.text("Impact", COL_IMPACT, y, 12.0, Align::Left);
            y += ROW_HEIGHT;
            pdf.rule(y);
            y += RULE_GAP;

            for line in &section.lines {
                pdf.text(line.entry_type.as_str(), COL_TYPE, y, 10.0, Align::Left);
                pdf.text(line.count.to_string(), COL_COUNT, y, 10.0, NUMERIC);
                pdf.text(format_currency(line.total), COL_AMOUNT, y, 10.0, NUMERIC);
                pdf.text(line.impact.label(), COL_IMPACT, y, 10.0, Align::Left);
                y += ROW_HEIGHT;
            }
            pdf.rule(y);
            y += RULE_GAP;

            let (count, total) = section.subtotal();
            pdf.text(MONTHLY_TOTAL_LABEL, COL_TYPE, y, 12.0, Align::Left);
            pdf.text(count.to_string(), COL_COUNT, y, 12.0, NUMERIC);
            pdf.text(format_currency(total), COL_AMOUNT, y, 12.0, NUMERIC);
            y += ROW_HEIGHT * 2.0;
        }

        pdf
    }
}

/// Aggregates stored transactions into a [`MonthlySummary`].
#[instrument(skip(store))]
pub async fn generate(store: &dyn RecordStore, now: DateTime<Utc>) -> Result<MonthlySummary, SyncError> {
    let kind = RecordKind::Transactions;
    let earliest = store.earliest_created_at(kind).await?;
    let (start, end) = summary_range(earliest, now);
    tracing::info!(
        "Processing transactions from {} to {}",
        start.format("%b %Y"),
        end.format("%b %Y")
    );

    let totals = store.monthly_totals(kind, start, end).await?;
    tracing::info!(groups = totals.len(), "Aggregation complete");

    let summary = MonthlySummary::from_totals(start, end, totals);
    for section in &summary.months {
        let (count, total) = section.subtotal();
        tracing::info!(
            month = %section.month,
            count,
            total = %format_currency(total),
            "Monthly Total"
        );
    }
    if !summary.unknown_types.is_empty() {
        tracing::warn!(types = ?summary.unknown_types, "Detected transaction types without impact classification");
    }

    Ok(summary)
}
