//! Day-bucket storage behind the transaction ledger.
//!
//! `FsDayStore` keeps one `transactions_{YYYY-MM-DD}.json` file per day plus a
//! `qr_codes/` directory for QR images. `MemoryDayStore` holds the same data
//! in memory.

use anyhow::{Context, Result};
use chrono::NaiveDate;
use regex::Regex;
use std::cell::RefCell;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use crate::ledger::TransactionRecord;

pub const QR_DIR_NAME: &str = "qr_codes";

/// Capability set the ledger needs from storage.
pub trait DayStore {
    /// Records for `day`, or `Ok(None)` when the day has no bucket yet.
    fn read_day(&self, day: NaiveDate) -> Result<Option<Vec<TransactionRecord>>>;

    /// Replace the whole bucket for `day`.
    fn write_day(&self, day: NaiveDate, records: &[TransactionRecord]) -> Result<()>;

    /// Days that have a bucket, ascending.
    fn list_days(&self) -> Result<Vec<NaiveDate>>;

    /// Store a binary artifact (QR image) and return where it landed.
    fn write_artifact(&self, file_name: &str, bytes: &[u8]) -> Result<PathBuf>;
}

pub fn day_file_name(day: NaiveDate) -> String {
    format!("transactions_{}.json", day.format("%Y-%m-%d"))
}

#[derive(Debug, Clone)]
pub struct FsDayStore {
    base_dir: PathBuf,
    qr_dir: PathBuf,
}

impl FsDayStore {
    /// Open (creating if needed) a store rooted at `base_dir`.
    pub fn open(base_dir: impl Into<PathBuf>) -> Result<Self> {
        let base_dir = base_dir.into();
        let qr_dir = base_dir.join(QR_DIR_NAME);
        fs::create_dir_all(&qr_dir).with_context(|| format!("create {}", qr_dir.display()))?;
        Ok(Self { base_dir, qr_dir })
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    pub fn qr_dir(&self) -> &Path {
        &self.qr_dir
    }

    pub fn day_path(&self, day: NaiveDate) -> PathBuf {
        self.base_dir.join(day_file_name(day))
    }
}

impl DayStore for FsDayStore {
    fn read_day(&self, day: NaiveDate) -> Result<Option<Vec<TransactionRecord>>> {
        let p = self.day_path(day);
        if !p.exists() {
            return Ok(None);
        }
        let s = fs::read_to_string(&p).with_context(|| format!("read {}", p.display()))?;
        let records = serde_json::from_str(&s).with_context(|| format!("parse {}", p.display()))?;
        Ok(Some(records))
    }

    fn write_day(&self, day: NaiveDate, records: &[TransactionRecord]) -> Result<()> {
        let p = self.day_path(day);
        let json = serde_json::to_string_pretty(records).context("serialize transactions")?;
        fs::write(&p, json).with_context(|| format!("write {}", p.display()))?;
        Ok(())
    }

    fn list_days(&self) -> Result<Vec<NaiveDate>> {
        let re = Regex::new(r"^transactions_(\d{4}-\d{2}-\d{2})\.json$")?;
        let mut days = Vec::new();
        let entries = fs::read_dir(&self.base_dir)
            .with_context(|| format!("list {}", self.base_dir.display()))?;
        for entry in entries {
            let entry = entry?;
            let name = entry.file_name();
            let Some(caps) = name.to_str().and_then(|n| re.captures(n)) else {
                continue;
            };
            if let Ok(day) = NaiveDate::parse_from_str(&caps[1], "%Y-%m-%d") {
                days.push(day);
            }
        }
        days.sort();
        Ok(days)
    }

    fn write_artifact(&self, file_name: &str, bytes: &[u8]) -> Result<PathBuf> {
        let p = self.qr_dir.join(file_name);
        fs::write(&p, bytes).with_context(|| format!("write {}", p.display()))?;
        Ok(p)
    }
}

/// In-memory store; artifacts are kept under a virtual `qr_codes/` path.
#[derive(Debug, Default)]
pub struct MemoryDayStore {
    days: RefCell<BTreeMap<NaiveDate, Vec<TransactionRecord>>>,
    artifacts: RefCell<BTreeMap<PathBuf, Vec<u8>>>,
}

impl MemoryDayStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn artifact(&self, path: &Path) -> Option<Vec<u8>> {
        self.artifacts.borrow().get(path).cloned()
    }
}

impl DayStore for MemoryDayStore {
    fn read_day(&self, day: NaiveDate) -> Result<Option<Vec<TransactionRecord>>> {
        Ok(self.days.borrow().get(&day).cloned())
    }

    fn write_day(&self, day: NaiveDate, records: &[TransactionRecord]) -> Result<()> {
        self.days.borrow_mut().insert(day, records.to_vec());
        Ok(())
    }

    fn list_days(&self) -> Result<Vec<NaiveDate>> {
        Ok(self.days.borrow().keys().copied().collect())
    }

    fn write_artifact(&self, file_name: &str, bytes: &[u8]) -> Result<PathBuf> {
        let p = Path::new(QR_DIR_NAME).join(file_name);
        self.artifacts.borrow_mut().insert(p.clone(), bytes.to_vec());
        Ok(p)
    }
}
