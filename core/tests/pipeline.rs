//! End-to-end runs: SQLite store → aggregate → CSV export → workbook.

use chrono::{TimeZone, Utc};
use rental_etl_core::{
    clock::FixedClock,
    config::{EmptyInputPolicy, EtlConfig},
    engine::EtlEngine,
    error::{ErrorKind, EtlError},
    source::VecSource,
    store::RentalStore,
};
use std::fs;
use std::path::Path;

// ── Helpers ──────────────────────────────────────────────────────────────────

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn engine(config: EtlConfig) -> EtlEngine {
    let at = Utc.with_ymd_and_hms(2024, 1, 15, 8, 0, 0).unwrap();
    EtlEngine::new(config, Box::new(FixedClock::new(at))).expect("engine")
}

/// Three customers in two countries; one customer has no address.
fn seeded_store() -> RentalStore {
    let store = RentalStore::in_memory().expect("in-memory store");
    store.migrate().expect("migration");

    store.insert_country(1, "Peru").unwrap();
    store.insert_country(2, "Japan").unwrap();
    store.insert_city(10, "Lima", Some(1)).unwrap();
    store.insert_city(20, "Ōsaka", Some(2)).unwrap();
    store.insert_address(100, "Av. Grau 1", Some(10)).unwrap();
    store.insert_address(200, "1-2 Umeda", Some(20)).unwrap();

    store.insert_customer(1, "ANA", "QUISPE", Some(100)).unwrap();
    store.insert_customer(2, "KENJI", "SATŌ", Some(200)).unwrap();
    store.insert_customer(3, "MARY", "SMITH", None).unwrap();

    store.insert_rental(500, "2005-05-24 22:53:30", 1).unwrap();
    store.insert_rental(501, "2005-05-25 10:00:00", 2).unwrap();
    store.insert_rental(502, "2005-05-26 10:00:00", 2).unwrap();
    store.insert_rental(503, "2005-05-27 10:00:00", 3).unwrap();

    store.insert_payment(1, 500, 10.5, "2005-05-24 23:00:00").unwrap();
    store.insert_payment(2, 500, 4.5, "2005-05-30 09:00:00").unwrap();
    store.insert_payment(3, 501, 2.99, "2005-05-25 10:05:00").unwrap();
    store.insert_payment(4, 502, 8.99, "2005-05-26 10:05:00").unwrap();
    store.insert_payment(5, 503, 0.99, "2005-05-27 10:05:00").unwrap();
    store
}

fn read(path: &Path) -> String {
    fs::read_to_string(path).unwrap()
}

// ── Tests ────────────────────────────────────────────────────────────────────

#[test]
fn full_run_writes_both_artifacts() {
    init_logging();
    let dir = tempfile::tempdir().unwrap();
    let config = EtlConfig::default_test(dir.path().join("out"));
    let store = seeded_store();

    let summary = engine(config.clone()).run(&store).expect("run");

    assert_eq!(summary.source, "sqlite");
    assert_eq!(summary.records, 5);
    assert_eq!(summary.customer_rows, 3);
    assert_eq!(summary.geography_rows, 3);
    assert_eq!(summary.top_countries, 2);
    assert!(summary.chart_included);
    assert_eq!(summary.total_revenue.to_string(), "27.97");

    let csv = read(&config.export_path);
    let lines: Vec<&str> = csv.lines().collect();
    assert_eq!(
        lines[0],
        "customer_id,customer_name,city,country,total_paid,rentals_count,avg_payment,last_rental"
    );
    assert_eq!(lines[1], "1,ANA QUISPE,Lima,Peru,15.0,1,7.50,2005-05-24");
    assert_eq!(lines[2], "2,KENJI SATŌ,Ōsaka,Japan,11.98,2,5.99,2005-05-26");
    assert_eq!(lines[3], "3,MARY SMITH,,,0.99,1,0.99,2005-05-27");
    assert_eq!(lines.len(), 4);

    let xlsx = fs::read(&config.report_path).unwrap();
    assert_eq!(&xlsx[..2], b"PK", "report is not a zip container");
}

#[test]
fn rerun_overwrites_with_identical_export() {
    let dir = tempfile::tempdir().unwrap();
    let config = EtlConfig::default_test(dir.path());
    let store = seeded_store();

    engine(config.clone()).run(&store).unwrap();
    let first = fs::read(&config.export_path).unwrap();
    engine(config.clone()).run(&store).unwrap();
    let second = fs::read(&config.export_path).unwrap();

    assert_eq!(first, second);
    let leftovers = fs::read_dir(dir.path())
        .unwrap()
        .filter(|e| e.as_ref().unwrap().file_name().to_string_lossy().ends_with(".tmp"))
        .count();
    assert_eq!(leftovers, 0);
}

/// A customer who moved between extractions shows up under the new address.
#[test]
fn moved_customer_reports_current_geography() {
    let dir = tempfile::tempdir().unwrap();
    let config = EtlConfig::default_test(dir.path());
    let store = seeded_store();
    store.move_customer(3, Some(100)).unwrap();

    let agg = engine(config).extract_and_aggregate(&store).unwrap();
    let mary = agg.customers.iter().find(|c| c.customer_id == 3).unwrap();
    assert_eq!(mary.city.as_deref(), Some("Lima"));
    assert_eq!(store.payment_count().unwrap(), 5);
}

#[test]
fn empty_source_is_allowed_by_default() {
    let dir = tempfile::tempdir().unwrap();
    let config = EtlConfig::default_test(dir.path());

    let summary = engine(config.clone()).run(&VecSource::default()).unwrap();

    assert_eq!(summary.records, 0);
    assert!(!summary.chart_included);
    assert_eq!(read(&config.export_path).lines().count(), 1, "header only");
    assert!(config.report_path.exists());
}

#[test]
fn strict_mode_fails_before_writing_anything() {
    let dir = tempfile::tempdir().unwrap();
    let config = EtlConfig {
        empty_input: EmptyInputPolicy::Reject,
        ..EtlConfig::default_test(dir.path())
    };

    let err = engine(config.clone()).run(&VecSource::default()).unwrap_err();

    assert!(matches!(err, EtlError::EmptyInput));
    assert!(!config.export_path.exists());
    assert!(!config.report_path.exists());
}

/// The report target is a directory, so the final rename fails. The export
/// from the earlier stage stays on disk; the run is still an error naming
/// the report path.
#[test]
fn report_failure_keeps_export_and_fails_run() {
    let dir = tempfile::tempdir().unwrap();
    let config = EtlConfig::default_test(dir.path());
    fs::create_dir_all(&config.report_path).unwrap();
    fs::write(config.report_path.join("occupied"), "x").unwrap();

    let err = engine(config.clone()).run(&seeded_store()).unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Write);
    match &err {
        EtlError::Write { path, .. } => assert_eq!(path, &config.report_path),
        other => panic!("unexpected error: {other}"),
    }
    assert!(read(&config.export_path).starts_with("customer_id,"));
}

#[test]
fn invalid_config_is_rejected_up_front() {
    let dir = tempfile::tempdir().unwrap();
    let config = EtlConfig {
        top_n: 0,
        ..EtlConfig::default_test(dir.path())
    };
    let result = EtlEngine::build(config);
    assert!(matches!(result, Err(EtlError::Config(_))));
}
