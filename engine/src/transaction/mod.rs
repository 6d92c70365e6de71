//! Query transactions: building, tracking and aggregating.
//!
//! - [`build_query_transaction`] turns a row query into a transaction.
//! - [`TransactionStore`] tracks transactions and enforces supersession.
//! - [`calculate_results_from_transactions`] folds completed transactions into
//!   one composite result per result type.

mod aggregate;
mod builder;
mod store;

pub use aggregate::{
    calculate_results_from_transactions, AggregationError, ComposedResults, TableResult,
};
pub use builder::{build_query_transaction, panel_id};
pub use store::TransactionStore;
