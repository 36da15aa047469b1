use anyhow::{Result, bail};
use chrono::NaiveDate;
use clap::Subcommand;
use payqr_core::time::{local_from_epoch_secs, parse_timezone};
use payqr_core::{FsDayStore, TransactionLedger, TransactionRecord};
use std::path::Path;

use crate::config::{Config, load_config};
use crate::state::ensure_payqr_home;

#[derive(Subcommand, Debug)]
pub enum TxCommand {
    /// Transactions recorded on one day (default: today)
    Day {
        #[arg(long)]
        date: Option<NaiveDate>,
    },

    /// Transactions for every day in FROM..=TO
    Range {
        #[arg(long)]
        from: NaiveDate,
        #[arg(long)]
        to: NaiveDate,
    },

    /// Most recent transactions across all days
    Recent {
        #[arg(long, default_value_t = 10)]
        limit: usize,
    },

    /// Look up an order in today's transactions
    Find { order: String },

    /// Set the status of an order (first day file containing it)
    Status { order: String, status: String },

    /// Print order -> status, optionally bounded by epoch milliseconds
    Orders {
        #[arg(long, requires = "end_ms")]
        start_ms: Option<i64>,
        #[arg(long, requires = "start_ms")]
        end_ms: Option<i64>,
    },
}

pub fn open_ledger(cfg: &Config, home: &Path) -> Result<TransactionLedger<FsDayStore>> {
    let tz = parse_timezone(&cfg.storage.timezone)?;
    let store = FsDayStore::open(cfg.transactions_dir(home))?;
    Ok(TransactionLedger::new(store, tz))
}

pub fn run(cmd: TxCommand) -> Result<()> {
    let cfg = load_config()?;
    let home = ensure_payqr_home()?;
    let ledger = open_ledger(&cfg, &home)?;

    match cmd {
        TxCommand::Day { date } => {
            let day = date.unwrap_or_else(|| ledger.today());
            print_records(&ledger, &ledger.query_by_date(day));
        }
        TxCommand::Range { from, to } => {
            if from > to {
                bail!("--from {from} is after --to {to}");
            }
            print_records(&ledger, &ledger.query_by_range(from, to));
        }
        TxCommand::Recent { limit } => {
            print_records(&ledger, &ledger.recent_transactions(limit));
        }
        TxCommand::Find { order } => match ledger.find_by_order(&order) {
            Some(r) => print_records(&ledger, &[r]),
            None => println!("Order {order} not found today"),
        },
        TxCommand::Status { order, status } => {
            if !ledger.update_order_status(&order, &status) {
                bail!("order {order} not found");
            }
            println!("{order} -> {status}");
        }
        TxCommand::Orders { start_ms, end_ms } => {
            for (order, status) in ledger.load_order_status_index(start_ms, end_ms) {
                println!("{order}\t{status}");
            }
        }
    }

    Ok(())
}

fn print_records<S>(ledger: &TransactionLedger<S>, records: &[TransactionRecord])
where
    S: payqr_core::DayStore,
{
    if records.is_empty() {
        println!("No transactions");
        return;
    }
    for r in records {
        println!("{}", format_record(r, ledger.timezone()));
    }
}

fn format_record(r: &TransactionRecord, tz: chrono_tz::Tz) -> String {
    let when = r
        .timestamp
        .and_then(|t| local_from_epoch_secs(t, tz).ok())
        .map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string())
        .unwrap_or_else(|| "-".to_string());
    format!(
        "{when} | {:<8} | {:<16} | {:>12.0} | {:<10} | {}",
        r.kind,
        r.order_number,
        r.amount,
        r.status(),
        r.qr_path.as_deref().unwrap_or("-")
    )
}
