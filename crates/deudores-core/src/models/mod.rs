//! Data models for the debtor backend.
//!
//! - `Debtor`, `Payment`: records as the API sends them
//! - `DebtorFilter`, `DebtorSortColumn`: in-memory filtering and sorting
//! - `export`: CSV rendering of a debtor list

pub mod debtor;
pub mod export;
pub mod filter;

pub use debtor::{parse_date, Debtor, NewPayment, Payment};
pub use filter::{sort_debtors, DebtorFilter, DebtorSortColumn, StatusCounts, StatusFilter};
