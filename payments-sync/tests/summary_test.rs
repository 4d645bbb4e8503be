//! Monthly summary generation over stored balance transactions.

mod common;

use common::*;
use payments_sync::jobs::run_summary;
use payments_sync::models::RecordKind;
use payments_sync::reports::Impact;
use payments_sync::services::MemoryStore;
use std::sync::Arc;

#[tokio::test]
async fn summarizes_complete_months_only() {
    let store = Arc::new(MemoryStore::new());
    store.seed(
        RecordKind::Transactions,
        vec![
            balance("t1", "2024-01-05T12:00:00Z", "charge", 10_000),
            balance("t2", "2024-01-20T08:00:00Z", "charge", 2_500),
            balance("t3", "2024-01-22T16:45:00Z", "payment_refund", -1_500),
            balance("t4", "2024-02-03T00:00:00Z", "mystery_fee", 300),
            balance("t5", "2024-04-02T09:00:00Z", "charge", 999),
        ],
    );
    let dir = tempfile::tempdir().unwrap();
    let now = "2024-04-10T12:00:00Z".parse().unwrap();

    let outcome = run_summary(store, &settings(dir.path()), now).await.unwrap();
    let summary = &outcome.summary;

    assert_eq!(summary.file_stem(), "summary-2024-01-to-2024-03");
    assert_eq!(summary.months.len(), 2);
    assert_eq!(summary.months[0].subtotal(), (3, 11_000));
    assert_eq!(summary.months[0].lines[1].impact, Impact::Subtracted);
    assert!(summary.unknown_types.contains("Mystery Fee"));

    assert_eq!(
        outcome.report_path,
        dir.path().join("summary-2024-01-to-2024-03.csv")
    );
    assert_eq!(
        std::fs::read_to_string(&outcome.report_path).unwrap(),
        "Month,Type,Count,Total Amount\n\
         2024-01,Charge,2,$125.00\n\
         2024-01,Payment Refund,1,-$15.00\n\
         2024-02,Mystery Fee,1,$3.00\n"
    );

    assert_eq!(
        outcome.pdf_path,
        dir.path().join("summary-2024-01-to-2024-03.pdf")
    );
    let pdf = std::fs::read(&outcome.pdf_path).unwrap();
    assert!(pdf.starts_with(b"%PDF-"));

    let layout = summary.to_pdf();
    let texts: Vec<&str> = layout.texts().collect();
    assert_eq!(texts.iter().filter(|t| **t == "Monthly Total").count(), 2);
    for heading in ["January 2024", "February 2024"] {
        assert_eq!(texts.iter().filter(|t| **t == heading).count(), 1);
    }
    assert!(texts.contains(&"(Unknown)"));
}

#[tokio::test]
async fn empty_store_yields_an_empty_summary() {
    let dir = tempfile::tempdir().unwrap();
    let now = "2024-04-10T12:00:00Z".parse().unwrap();

    let outcome = run_summary(Arc::new(MemoryStore::new()), &settings(dir.path()), now)
        .await
        .unwrap();

    assert!(outcome.summary.months.is_empty());
    assert_eq!(outcome.summary.file_stem(), "summary-2024-04-to-2024-03");
    assert_eq!(
        std::fs::read_to_string(outcome.report_path).unwrap(),
        "Month,Type,Count,Total Amount\n"
    );
    assert!(outcome.pdf_path.exists());
}
