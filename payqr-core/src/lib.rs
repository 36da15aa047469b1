//! payqr-core: bank-name resolution and day-bucketed transaction storage

pub mod banks;
pub mod fuzzy;
pub mod ledger;
pub mod store;
pub mod time;

pub use banks::{BankDirectory, BankMatch, BankRecord, BankResolver, Lookup, MatchTier, FUZZY_THRESHOLD};
pub use fuzzy::{normalize, token_sort_ratio};
pub use ledger::{TransactionLedger, TransactionRecord, UNKNOWN_STATUS};
pub use store::{DayStore, FsDayStore, MemoryDayStore};
