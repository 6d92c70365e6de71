//! Transaction store.
//!
//! Holds the in-flight and completed transactions of one explore pane and
//! enforces supersession: at most one transaction per `(row_index,
//! result_type)` pair, and only the newest one for a pair may complete.

use std::collections::HashMap;

use crate::models::{Query, QueryResult, QueryTransaction, ResultType, TransactionError};

type Pair = (usize, ResultType);

/// Transactions of one session plus the supersession generations per pair.
///
/// Every `start` stamps the transaction with a fresh generation from a
/// monotonic counter and records it as the current generation of its pair.
/// A completion is accepted only if the transaction still exists, is still
/// live, and carries its pair's current generation.
///
/// # Example
///
/// ```
/// use chrono::Utc;
/// use engine::models::{IntervalValues, Query, QueryOptions, QueryResult, RawTimeRange, ResultType};
/// use engine::transaction::{build_query_transaction, TransactionStore};
///
/// let build = || {
///     build_query_transaction(
///         &Query::from_expr("up"),
///         0,
///         ResultType::Graph,
///         &QueryOptions::for_result_type(ResultType::Graph),
///         &RawTimeRange::default(),
///         &IntervalValues::new("1s", 1000),
///         false,
///         Utc::now(),
///     )
///     .unwrap()
/// };
///
/// let mut store = TransactionStore::new();
/// let first = build();
/// let second = build();
/// let first_id = first.id.clone();
/// store.start(first);
/// store.start(second);
///
/// // The first transaction was superseded; its response is ignored.
/// assert!(!store.succeed(&first_id, QueryResult::Graph(vec![])));
/// assert_eq!(store.len(), 1);
/// ```
#[derive(Debug, Clone, Default)]
pub struct TransactionStore {
    transactions: Vec<QueryTransaction>,
    generations: HashMap<Pair, u64>,
    next_generation: u64,
}

impl TransactionStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns all transactions in insertion order.
    #[must_use]
    pub fn transactions(&self) -> &[QueryTransaction] {
        &self.transactions
    }

    /// Returns the transaction with the given id.
    #[must_use]
    pub fn get(&self, id: &str) -> Option<&QueryTransaction> {
        self.transactions.iter().find(|qt| qt.id == id)
    }

    /// Returns the number of transactions held.
    #[must_use]
    pub fn len(&self) -> usize {
        self.transactions.len()
    }

    /// Returns true if no transactions are held.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.transactions.is_empty()
    }

    /// Returns the number of transactions still waiting for a response.
    #[must_use]
    pub fn live_count(&self) -> usize {
        self.transactions.iter().filter(|qt| qt.is_live()).count()
    }

    /// Inserts a transaction, discarding every transaction of the same pair.
    ///
    /// Returns the generation assigned to the new transaction.
    pub fn start(&mut self, mut transaction: QueryTransaction) -> u64 {
        self.next_generation += 1;
        let generation = self.next_generation;
        let pair = transaction.pair();

        let before = self.transactions.len();
        self.transactions.retain(|qt| qt.pair() != pair);
        let superseded = before - self.transactions.len();

        transaction.generation = generation;
        self.generations.insert(pair, generation);

        tracing::debug!(
            id = %transaction.id,
            row_index = pair.0,
            result_type = %pair.1,
            generation,
            superseded,
            "Transaction started"
        );
        self.transactions.push(transaction);
        generation
    }

    /// Marks a transaction as succeeded.
    ///
    /// Returns `false` and changes nothing if the transaction was discarded,
    /// superseded, or already completed.
    pub fn succeed(&mut self, id: &str, result: QueryResult) -> bool {
        let Some(transaction) = self.accepting_mut(id) else {
            return false;
        };
        transaction.done = true;
        transaction.latency = transaction.issued_at.elapsed();
        transaction.result = Some(result);
        transaction.error = None;
        true
    }

    /// Marks a transaction as failed. The failed transaction is retained until
    /// its pair is started again.
    ///
    /// Returns `false` and changes nothing if the transaction was discarded,
    /// superseded, or already completed.
    pub fn fail(&mut self, id: &str, error: TransactionError) -> bool {
        let Some(transaction) = self.accepting_mut(id) else {
            return false;
        };
        transaction.done = true;
        transaction.latency = transaction.issued_at.elapsed();
        transaction.result = None;
        transaction.error = Some(error);
        true
    }

    fn accepting_mut(&mut self, id: &str) -> Option<&mut QueryTransaction> {
        let generations = &self.generations;
        let accepted = self.transactions.iter_mut().find(|qt| {
            qt.id == id && qt.is_live() && generations.get(&qt.pair()) == Some(&qt.generation)
        });
        if accepted.is_none() {
            tracing::debug!(id, "Ignoring completion of discarded or superseded transaction");
        }
        accepted
    }

    /// Removes all transactions issued for a row.
    ///
    /// Returns the number of transactions removed.
    pub fn discard_for_row(&mut self, row_index: usize) -> usize {
        self.generations.retain(|(row, _), _| *row != row_index);
        self.discard_where(|qt| qt.row_index == row_index)
    }

    /// Removes all transactions whose query key is no longer among `rows`.
    ///
    /// Returns the number of transactions removed.
    pub fn retain_rows(&mut self, rows: &[Query]) -> usize {
        let removed = self.discard_where(|qt| !rows.iter().any(|row| row.key == qt.query.key));
        self.prune_generations();
        removed
    }

    /// Removes all transactions of a result type.
    ///
    /// Returns the number of transactions removed.
    pub fn discard_by_result_type(&mut self, result_type: ResultType) -> usize {
        self.generations.retain(|(_, rt), _| *rt != result_type);
        self.discard_where(|qt| qt.result_type == result_type)
    }

    /// Removes scanning transactions that have not completed yet.
    ///
    /// Returns the number of transactions removed.
    pub fn discard_live_scanning(&mut self) -> usize {
        let removed = self.discard_where(|qt| qt.scanning && qt.is_live());
        self.prune_generations();
        removed
    }

    /// Shifts the row index of every transaction at or past `after_index` by
    /// `delta`, keeping in-flight work attributed to the right row after rows
    /// are inserted (`+1`) or removed (`-1`).
    pub fn remap_row_indices(&mut self, after_index: usize, delta: isize) {
        let shift = |row: usize| -> usize {
            if row >= after_index {
                row.saturating_add_signed(delta)
            } else {
                row
            }
        };

        for transaction in &mut self.transactions {
            transaction.row_index = shift(transaction.row_index);
        }
        self.generations = self
            .generations
            .drain()
            .map(|((row, rt), generation)| ((shift(row), rt), generation))
            .collect();
    }

    /// Removes every transaction.
    pub fn clear(&mut self) {
        self.transactions.clear();
        self.generations.clear();
    }

    fn discard_where(&mut self, predicate: impl Fn(&QueryTransaction) -> bool) -> usize {
        let before = self.transactions.len();
        self.transactions.retain(|qt| !predicate(qt));
        let removed = before - self.transactions.len();
        if removed > 0 {
            tracing::debug!(removed, "Discarded transactions");
        }
        removed
    }

    fn prune_generations(&mut self) {
        let transactions = &self.transactions;
        self.generations
            .retain(|pair, _| transactions.iter().any(|qt| qt.pair() == *pair));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{IntervalValues, QueryOptions, RawTimeRange, TimeSeries};
    use crate::transaction::build_query_transaction;
    use chrono::Utc;

    fn tx(query: &Query, row_index: usize, result_type: ResultType, scanning: bool) -> QueryTransaction {
        build_query_transaction(
            query,
            row_index,
            result_type,
            &QueryOptions::for_result_type(result_type),
            &RawTimeRange::default(),
            &IntervalValues::new("1s", 1000),
            scanning,
            Utc::now(),
        )
        .unwrap()
    }

    fn graph(name: &str) -> QueryResult {
        QueryResult::Graph(vec![TimeSeries::new(name, vec![(1.0, 0)])])
    }

    #[test]
    fn test_start_supersedes_same_pair_only() {
        let mut store = TransactionStore::new();
        let q = Query::from_expr("up").with_key("k0");
        let first = tx(&q, 0, ResultType::Graph, false);
        let other_type = tx(&q, 0, ResultType::Table, false);
        let other_row = tx(&q, 1, ResultType::Graph, false);
        let second = tx(&q, 0, ResultType::Graph, false);
        let first_id = first.id.clone();
        let second_id = second.id.clone();

        store.start(first);
        store.start(other_type);
        store.start(other_row);
        store.start(second);

        assert_eq!(store.len(), 3);
        assert!(store.get(&first_id).is_none());
        assert!(store.get(&second_id).is_some());
    }

    #[test]
    fn test_only_last_started_transaction_can_complete() {
        let mut store = TransactionStore::new();
        let q = Query::from_expr("up").with_key("k0");
        let ids: Vec<String> = (0..5)
            .map(|_| {
                let t = tx(&q, 0, ResultType::Graph, false);
                let id = t.id.clone();
                store.start(t);
                id
            })
            .collect();

        for id in ids.iter().rev() {
            store.succeed(id, graph(id));
        }

        let done: Vec<&QueryTransaction> =
            store.transactions().iter().filter(|qt| qt.done).collect();
        assert_eq!(done.len(), 1);
        assert_eq!(done[0].id, ids[4]);
    }

    #[test]
    fn test_completion_is_accepted_once() {
        let mut store = TransactionStore::new();
        let t = tx(&Query::from_expr("up"), 0, ResultType::Graph, false);
        let id = t.id.clone();
        store.start(t);

        assert!(store.succeed(&id, graph("a")));
        assert!(!store.fail(&id, TransactionError::new("late")));
        assert!(store.get(&id).unwrap().succeeded());
    }

    #[test]
    fn test_unknown_id_is_ignored() {
        let mut store = TransactionStore::new();
        assert!(!store.succeed("missing", graph("a")));
        assert!(!store.fail("missing", TransactionError::new("boom")));
    }

    #[test]
    fn test_failed_transaction_is_retained_until_superseded() {
        let mut store = TransactionStore::new();
        let q = Query::from_expr("up");
        let t = tx(&q, 0, ResultType::Graph, false);
        let id = t.id.clone();
        store.start(t);

        assert!(store.fail(&id, TransactionError::new("timeout")));
        let failed = store.get(&id).unwrap();
        assert!(failed.done);
        assert!(failed.result.is_none());
        assert_eq!(failed.error.as_ref().unwrap().message, "timeout");

        store.start(tx(&q, 0, ResultType::Graph, false));
        assert!(store.get(&id).is_none());
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_discard_by_result_type() {
        let mut store = TransactionStore::new();
        let q = Query::from_expr("up");
        store.start(tx(&q, 0, ResultType::Graph, false));
        store.start(tx(&q, 1, ResultType::Graph, false));
        store.start(tx(&q, 0, ResultType::Logs, false));

        assert_eq!(store.discard_by_result_type(ResultType::Graph), 2);
        assert_eq!(store.len(), 1);
        assert_eq!(store.transactions()[0].result_type, ResultType::Logs);
    }

    #[test]
    fn test_discarded_transaction_ignores_late_response() {
        let mut store = TransactionStore::new();
        let t = tx(&Query::from_expr("up"), 0, ResultType::Table, false);
        let id = t.id.clone();
        store.start(t);
        store.discard_by_result_type(ResultType::Table);

        assert!(!store.succeed(&id, QueryResult::Table(Default::default())));
        assert!(store.is_empty());
    }

    #[test]
    fn test_retain_rows_drops_transactions_of_removed_queries() {
        let mut store = TransactionStore::new();
        let a = Query::from_expr("a").with_key("ka");
        let b = Query::from_expr("b").with_key("kb");
        store.start(tx(&a, 0, ResultType::Graph, false));
        store.start(tx(&b, 1, ResultType::Graph, false));

        assert_eq!(store.retain_rows(&[b.clone()]), 1);
        assert_eq!(store.transactions()[0].query.key, "kb");
    }

    #[test]
    fn test_remove_row_remaps_later_rows() {
        let mut store = TransactionStore::new();
        let q = Query::from_expr("up");
        store.start(tx(&q, 0, ResultType::Graph, false));
        store.start(tx(&q, 1, ResultType::Graph, false));
        let last = tx(&q, 2, ResultType::Graph, false);
        let last_id = last.id.clone();
        store.start(last);

        store.discard_for_row(1);
        store.remap_row_indices(2, -1);

        let rows: Vec<usize> = store.transactions().iter().map(|qt| qt.row_index).collect();
        assert_eq!(rows, vec![0, 1]);
        // The remapped transaction still completes under its new index.
        assert!(store.succeed(&last_id, graph("c")));
    }

    #[test]
    fn test_insert_row_remaps_and_keeps_supersession() {
        let mut store = TransactionStore::new();
        let q = Query::from_expr("up");
        let moved = tx(&q, 1, ResultType::Graph, false);
        let moved_id = moved.id.clone();
        store.start(moved);

        store.remap_row_indices(1, 1);
        assert_eq!(store.get(&moved_id).unwrap().row_index, 2);

        // A new transaction for the inserted row does not supersede the moved one.
        store.start(tx(&q, 1, ResultType::Graph, false));
        assert!(store.succeed(&moved_id, graph("b")));

        // A new transaction for the moved row does.
        store.start(tx(&q, 2, ResultType::Graph, false));
        assert!(store.get(&moved_id).is_none());
    }

    #[test]
    fn test_discard_live_scanning_keeps_done_and_normal() {
        let mut store = TransactionStore::new();
        let q = Query::from_expr("up");
        let done_scan = tx(&q, 0, ResultType::Graph, true);
        let done_id = done_scan.id.clone();
        store.start(done_scan);
        store.succeed(&done_id, graph("a"));
        store.start(tx(&q, 0, ResultType::Table, true));
        store.start(tx(&q, 1, ResultType::Graph, false));

        assert_eq!(store.discard_live_scanning(), 1);
        assert_eq!(store.len(), 2);
        assert!(store.get(&done_id).is_some());
    }

    #[test]
    fn test_clear() {
        let mut store = TransactionStore::new();
        let t = tx(&Query::from_expr("up"), 0, ResultType::Graph, false);
        let id = t.id.clone();
        store.start(t);
        store.clear();

        assert!(store.is_empty());
        assert!(!store.succeed(&id, graph("a")));
    }
}
