use chrono::{Duration, NaiveDate, TimeZone, Utc};
use payqr_core::store::day_file_name;
use payqr_core::{FsDayStore, TransactionLedger, TransactionRecord};
use std::fs;

fn ledger_in(dir: &std::path::Path) -> TransactionLedger<FsDayStore> {
    TransactionLedger::new(FsDayStore::open(dir).unwrap(), chrono_tz::Asia::Ho_Chi_Minh)
}

fn at(y: i32, m: u32, d: u32, h: u32, min: u32) -> f64 {
    chrono_tz::Asia::Ho_Chi_Minh
        .with_ymd_and_hms(y, m, d, h, min, 0)
        .unwrap()
        .timestamp() as f64
}

fn day(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

#[test]
fn test_day_file_layout_and_format() {
    let tmp = tempfile::tempdir().unwrap();
    let ledger = ledger_in(tmp.path());

    let saved = ledger
        .save(
            TransactionRecord::new("sale", "HD-001", 250_000.0)
                .with_timestamp(at(2026, 7, 14, 9, 30))
                .with_field("note", "Cà phê sữa đá"),
            Some(b"\x89PNG\r\n"),
            Some("PENDING"),
        )
        .unwrap();

    let day_path = tmp.path().join(day_file_name(day(2026, 7, 14)));
    let raw = fs::read_to_string(&day_path).unwrap();
    assert!(raw.starts_with("[\n  {"), "expected 2-space pretty JSON: {raw}");
    assert!(raw.contains("Cà phê sữa đá"), "non-ASCII must stay unescaped");
    assert!(raw.contains("\"order_status\": \"PENDING\""));

    let qr_path = std::path::PathBuf::from(saved.qr_path.unwrap());
    assert_eq!(
        qr_path.file_name().unwrap().to_str().unwrap(),
        "sale_20260714_093000_HD-001.png"
    );
    assert!(qr_path.starts_with(tmp.path().join("qr_codes")));
    assert_eq!(fs::read(qr_path).unwrap(), b"\x89PNG\r\n");
}

#[test]
fn test_repeat_save_keeps_single_entry_with_latest_fields() {
    let tmp = tempfile::tempdir().unwrap();
    let ledger = ledger_in(tmp.path());

    ledger
        .save(TransactionRecord::new("sale", "A", 1.0).with_timestamp(at(2026, 7, 1, 8, 0)), None, None)
        .unwrap();
    ledger
        .save(TransactionRecord::new("sale", "B", 2.0).with_timestamp(at(2026, 7, 1, 9, 0)), None, None)
        .unwrap();
    ledger
        .save(TransactionRecord::new("sale", "A", 3.0).with_timestamp(at(2026, 7, 1, 10, 0)), None, Some("PAID"))
        .unwrap();

    // fresh ledger over the same directory sees the persisted state
    let reopened = ledger_in(tmp.path());
    let records = reopened.query_by_date(day(2026, 7, 1));
    assert_eq!(records.len(), 2);
    assert_eq!((records[0].order_number.as_str(), records[0].amount), ("A", 3.0));
    assert_eq!(records[0].status(), "PAID");
    assert_eq!(records[1].order_number, "B");
}

#[test]
fn test_unreadable_day_degrades_to_empty() {
    let tmp = tempfile::tempdir().unwrap();
    let ledger = ledger_in(tmp.path());
    fs::write(tmp.path().join(day_file_name(day(2026, 7, 2))), "{broken").unwrap();

    assert!(ledger.query_by_date(day(2026, 7, 2)).is_empty());
    assert!(ledger.query_by_date(day(2026, 7, 3)).is_empty());
    assert!(!ledger.update_order_status("A", "PAID"));
    assert!(ledger.load_order_status_index(None, None).is_empty());
}

#[test]
fn test_save_into_corrupt_day_is_an_error() {
    let tmp = tempfile::tempdir().unwrap();
    let ledger = ledger_in(tmp.path());
    fs::write(tmp.path().join(day_file_name(day(2026, 7, 2))), "{broken").unwrap();

    let result = ledger.save(
        TransactionRecord::new("sale", "C", 1.0).with_timestamp(at(2026, 7, 2, 12, 0)),
        None,
        None,
    );
    assert!(result.is_err());
    assert_eq!(
        fs::read_to_string(tmp.path().join(day_file_name(day(2026, 7, 2)))).unwrap(),
        "{broken"
    );
}

#[test]
fn test_status_update_is_visible_to_index_and_today_lookup() {
    let tmp = tempfile::tempdir().unwrap();
    let ledger = ledger_in(tmp.path());
    let now = Utc::now().timestamp() as f64;
    let last_week = (Utc::now() - Duration::days(7)).timestamp() as f64;

    ledger
        .save(TransactionRecord::new("sale", "T1", 1.0).with_timestamp(now), None, None)
        .unwrap();
    ledger
        .save(TransactionRecord::new("sale", "W1", 1.0).with_timestamp(last_week), None, None)
        .unwrap();

    assert!(ledger.update_order_status("W1", "CANCELLED"));
    assert!(ledger.update_order_status("T1", "PAID"));

    let index = ledger.load_order_status_index(None, None);
    assert_eq!(index["W1"], "CANCELLED");
    assert_eq!(index["T1"], "PAID");
    assert_eq!(ledger.find_by_order("T1").unwrap().status(), "PAID");
    assert!(ledger.find_by_order("W1").is_none());
}

#[test]
fn test_off_schema_record_keeps_day_usable() {
    let tmp = tempfile::tempdir().unwrap();
    let ledger = ledger_in(tmp.path());
    let ts = at(2026, 9, 3, 10, 0);
    fs::write(
        tmp.path().join(day_file_name(day(2026, 9, 3))),
        format!(
            r#"[{{"type":"sale","amount":"50000","timestamp":{ts},"order_number":"A"}},
               {{"amount":1,"timestamp":{ts},"order_number":"B"}},
               {{"order_number":7,"amount":{{"vnd":3}}}}]"#
        ),
    )
    .unwrap();

    let records = ledger.query_by_date(day(2026, 9, 3));
    assert_eq!(records.len(), 3);
    assert_eq!(records[0].amount, 50_000.0);
    assert_eq!(records[1].kind, "");
    assert_eq!(records[2].order_number, "7");

    assert!(ledger.update_order_status("B", "PAID"));
    assert_eq!(ledger.query_by_date(day(2026, 9, 3))[1].status(), "PAID");

    ledger
        .save(
            TransactionRecord::new("sale", "C", 10_000.0).with_timestamp(ts + 60.0),
            None,
            None,
        )
        .unwrap();
    let index = ledger.load_order_status_index(None, None);
    assert_eq!(index.get("B").map(String::as_str), Some("PAID"));
    assert_eq!(ledger.query_by_date(day(2026, 9, 3)).len(), 4);
}
