//! Read-side view of the ledger: conversion grouping, history filters, date buckets,
//! and monthly statistics. Everything here is a pure function over a transaction
//! snapshot.

mod bucket;
mod filter;
mod group;
mod stats;

pub use bucket::{bucket_by_date, DateBucket};
pub use filter::{apply_filters, FlowFilter, WalletFilter};
pub use group::{group_transactions, ConversionGrouper, HistoryGroup, DEFAULT_CONVERSION_WINDOW_MS};
pub use stats::{monthly_stats, monthly_stats_at, MonthlyStats};
