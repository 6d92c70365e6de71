//! Async query execution for one explore pane.
//!
//! The runner owns the pane behind a mutex. A run builds one transaction per
//! row and shown result type, then spawns one tokio task per transaction.
//! Each task applies its own completion under the lock, so responses may
//! arrive in any order; superseded and discarded responses are ignored by
//! the transaction store. The lock is never held across an `.await`.

use chrono::Utc;
use serde::Serialize;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use thiserror::Error;
use tokio::task::JoinSet;

use super::event::ExploreEvent;
use super::state::ExploreSessionState;
use crate::datasource::{result_from_response, DataSource, DataSourceError};
use crate::history::{HistoryManager, KeyValueStoreError};
use crate::models::{
    has_non_empty_query, DataQueryRequest, HistoryItem, Query, QueryOptions, QueryTransaction, ResultType,
    TransactionError,
};
use crate::scan::{PreviousRangeScanner, RangeScanner};
use crate::time::{DateMathError, IntervalError};
use crate::transaction::build_query_transaction;
use crate::url::ExploreUrlState;

/// Errors that stop a run before or after its transactions execute.
///
/// Datasource failures are not among them; they become failed transactions.
#[derive(Debug, Error)]
pub enum RunnerError {
    /// The session lock was poisoned.
    #[error("Failed to acquire lock on explore session")]
    LockError,

    /// The query intervals could not be computed.
    #[error("Invalid query interval: {0}")]
    Interval(#[from] IntervalError),

    /// The time range could not be resolved.
    #[error("Invalid time range: {0}")]
    DateMath(#[from] DateMathError),

    /// History could not be persisted.
    #[error("History error: {0}")]
    History(#[from] KeyValueStoreError),
}

/// Outcome of one run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    /// Transactions issued.
    pub issued: usize,
    /// Accepted successful completions.
    pub succeeded: usize,
    /// Accepted failures.
    pub failed: usize,
    /// Completions ignored because their transaction was superseded or discarded.
    pub ignored: usize,
    /// True if any accepted result holds data.
    pub has_data: bool,
}

#[derive(Debug, Clone, Copy, Default)]
struct Completion {
    accepted: bool,
    succeeded: bool,
    has_data: bool,
}

/// Transactions of a run that are executing.
#[derive(Debug)]
pub struct PendingRun {
    tasks: JoinSet<Completion>,
    issued: usize,
    session: Arc<Mutex<ExploreSessionState>>,
    recorder: Option<(Arc<HistoryManager>, String, Vec<Query>)>,
}

impl PendingRun {
    /// Returns the number of transactions issued.
    #[must_use]
    pub fn issued(&self) -> usize {
        self.issued
    }

    /// Waits for every transaction of the run and records its queries in
    /// history once, whatever the outcome.
    ///
    /// # Errors
    ///
    /// Returns an error if history cannot be persisted.
    pub async fn wait(mut self) -> Result<RunSummary, RunnerError> {
        let mut summary = RunSummary {
            issued: self.issued,
            ..RunSummary::default()
        };

        while let Some(joined) = self.tasks.join_next().await {
            match joined {
                Ok(completion) if !completion.accepted => summary.ignored += 1,
                Ok(completion) if completion.succeeded => {
                    summary.succeeded += 1;
                    summary.has_data |= completion.has_data;
                }
                Ok(_) => summary.failed += 1,
                Err(error) => {
                    tracing::error!(%error, "Query task aborted");
                    summary.failed += 1;
                }
            }
        }

        if summary.issued > 0 {
            if let Some((manager, datasource_id, queries)) = self.recorder.take() {
                let current = lock(&self.session)?.history.clone();
                let history = manager.record(&current, &datasource_id, &queries)?;
                lock(&self.session)?.apply(ExploreEvent::UpdateHistory { history });
            }
        }

        tracing::info!(
            issued = summary.issued,
            succeeded = summary.succeeded,
            failed = summary.failed,
            ignored = summary.ignored,
            has_data = summary.has_data,
            "Run finished"
        );
        Ok(summary)
    }
}

/// Runs the queries of one pane against a datasource.
///
/// # Example
///
/// ```
/// use engine::datasource::TestDataSource;
/// use engine::models::Query;
/// use engine::session::{ExploreEvent, ExploreSessionState, QueryRunner};
/// use std::sync::Arc;
///
/// # tokio_test::block_on(async {
/// let runner = QueryRunner::new(Arc::new(TestDataSource::new("testdata")), ExploreSessionState::new());
/// runner.load_datasource().unwrap();
/// runner
///     .dispatch(ExploreEvent::SetQueries { queries: vec![Query::from_expr("up")] })
///     .unwrap();
///
/// let summary = runner.run_queries().await.unwrap();
/// assert!(summary.has_data);
/// # });
/// ```
pub struct QueryRunner {
    session: Arc<Mutex<ExploreSessionState>>,
    datasource: Arc<dyn DataSource>,
    history: Option<Arc<HistoryManager>>,
    timeout: Option<Duration>,
}

impl std::fmt::Debug for QueryRunner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueryRunner")
            .field("datasource", &self.datasource)
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

impl QueryRunner {
    /// Creates a runner for `state` querying `datasource`.
    #[must_use]
    pub fn new(datasource: Arc<dyn DataSource>, state: ExploreSessionState) -> Self {
        Self {
            session: Arc::new(Mutex::new(state)),
            datasource,
            history: None,
            timeout: None,
        }
    }

    /// Persists history through `manager`.
    #[must_use]
    pub fn with_history(mut self, manager: Arc<HistoryManager>) -> Self {
        self.history = Some(manager);
        self
    }

    /// Fails datasource calls that take longer than `timeout`.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Returns the shared session.
    #[must_use]
    pub fn session(&self) -> Arc<Mutex<ExploreSessionState>> {
        Arc::clone(&self.session)
    }

    /// Returns the datasource.
    #[must_use]
    pub fn datasource(&self) -> &Arc<dyn DataSource> {
        &self.datasource
    }

    /// Returns a copy of the current session.
    ///
    /// # Errors
    ///
    /// Returns an error if the session lock is poisoned.
    pub fn snapshot(&self) -> Result<ExploreSessionState, RunnerError> {
        Ok(lock(&self.session)?.clone())
    }

    /// Returns the URL state of the session.
    ///
    /// # Errors
    ///
    /// Returns an error if the session lock is poisoned.
    pub fn url_state(&self) -> Result<ExploreUrlState, RunnerError> {
        Ok(ExploreUrlState::from_session(&*lock(&self.session)?))
    }

    /// Applies an event to the session.
    ///
    /// # Errors
    ///
    /// Returns an error if the session lock is poisoned.
    pub fn dispatch(&self, event: ExploreEvent) -> Result<(), RunnerError> {
        lock(&self.session)?.apply(event);
        Ok(())
    }

    /// Loads the datasource into the session with its persisted history and
    /// remembers it as the last used datasource.
    ///
    /// A failed load is recorded in the session, which keeps its rows.
    ///
    /// # Errors
    ///
    /// Returns an error if history cannot be read or written.
    pub fn load_datasource(&self) -> Result<(), RunnerError> {
        self.dispatch(ExploreEvent::LoadDatasourcePending {
            requested_datasource_name: self.datasource.name().to_string(),
        })?;

        match self.persisted_history() {
            Ok(history) => self.dispatch(ExploreEvent::LoadDatasourceSuccess {
                datasource: Arc::clone(&self.datasource),
                history,
                now: Utc::now(),
            }),
            Err(error) => {
                self.dispatch(ExploreEvent::LoadDatasourceFailure {
                    error: error.to_string(),
                })?;
                Err(error)
            }
        }
    }

    fn persisted_history(&self) -> Result<Vec<HistoryItem>, RunnerError> {
        let Some(manager) = &self.history else {
            return Ok(Vec::new());
        };
        manager.set_last_used_datasource(self.datasource.name())?;
        Ok(manager.load(self.datasource.id())?)
    }

    /// Clears the history of the datasource, persisted and in the session.
    ///
    /// # Errors
    ///
    /// Returns an error if the persisted history cannot be deleted.
    pub fn clear_history(&self) -> Result<(), RunnerError> {
        if let Some(manager) = &self.history {
            manager.clear(self.datasource.id())?;
        }
        self.dispatch(ExploreEvent::ClearHistory)
    }

    /// Issues the transactions of a run and spawns their tasks.
    ///
    /// Must be called within a tokio runtime. Without any non-empty query the
    /// transactions are cleared and nothing is issued.
    ///
    /// # Errors
    ///
    /// Returns an error if the range or intervals cannot be resolved.
    pub fn start_run(&self) -> Result<PendingRun, RunnerError> {
        let now = Utc::now();
        let mut session = lock(&self.session)?;
        let mut tasks = JoinSet::new();

        if !has_non_empty_query(&session.queries) {
            session.apply(ExploreEvent::RunQueriesEmpty);
            return Ok(PendingRun {
                tasks,
                issued: 0,
                session: Arc::clone(&self.session),
                recorder: None,
            });
        }

        session.refresh_intervals(now)?;
        let scanning = session.is_scanning();
        let mut transactions: Vec<QueryTransaction> = Vec::new();
        for result_type in ResultType::ALL {
            if !session.wants(result_type) {
                continue;
            }
            let options = QueryOptions::for_result_type(result_type);
            for (row_index, query) in session.queries.iter().enumerate() {
                transactions.push(build_query_transaction(
                    query,
                    row_index,
                    result_type,
                    &options,
                    &session.range,
                    &session.query_intervals,
                    scanning,
                    now,
                )?);
            }
        }

        let issued = transactions.len();
        for transaction in transactions {
            let id = transaction.id.clone();
            let result_type = transaction.result_type;
            let request = transaction.options.clone();
            session.apply(ExploreEvent::QueryTransactionStart {
                transaction: Box::new(transaction),
            });
            tasks.spawn(execute(
                Arc::clone(&self.session),
                Arc::clone(&self.datasource),
                self.timeout,
                id,
                result_type,
                request,
            ));
        }

        let queries: Vec<Query> = session
            .queries
            .iter()
            .filter(|query| query.is_non_empty())
            .cloned()
            .collect();
        let recorder = self.history.as_ref().map(|manager| {
            (
                Arc::clone(manager),
                self.datasource.id().to_string(),
                queries,
            )
        });
        tracing::debug!(issued, scanning, "Run started");

        Ok(PendingRun {
            tasks,
            issued,
            session: Arc::clone(&self.session),
            recorder,
        })
    }

    /// Runs all queries and waits for every transaction.
    ///
    /// # Errors
    ///
    /// Returns an error if the run cannot be issued or history cannot be
    /// persisted.
    pub async fn run_queries(&self) -> Result<RunSummary, RunnerError> {
        self.start_run()?.wait().await
    }

    /// Starts a scan with `scanner`.
    ///
    /// # Errors
    ///
    /// Returns an error if the session lock is poisoned.
    pub fn start_scanning(&self, scanner: Arc<dyn RangeScanner>) -> Result<(), RunnerError> {
        self.dispatch(ExploreEvent::ScanStart { scanner })
    }

    /// Stops the scan, discarding scanning transactions still in flight.
    ///
    /// # Errors
    ///
    /// Returns an error if the session lock is poisoned.
    pub fn stop_scanning(&self) -> Result<(), RunnerError> {
        self.dispatch(ExploreEvent::ScanStop)
    }

    /// Performs one scan step and reruns the queries over the earlier range.
    ///
    /// A scan with [`PreviousRangeScanner`] is started if none is running.
    /// The scan stops once a step yields data; otherwise the caller decides
    /// whether to step again.
    ///
    /// # Errors
    ///
    /// Returns an error if the range cannot be resolved or the run fails.
    pub async fn scan_back(&self) -> Result<RunSummary, RunnerError> {
        {
            let mut session = lock(&self.session)?;
            if !session.is_scanning() {
                session.apply(ExploreEvent::ScanStart {
                    scanner: Arc::new(PreviousRangeScanner),
                });
            }
            let current = session.range.clone();
            if let Some(range) = session.scan.scan_step(&current, Utc::now())? {
                session.apply(ExploreEvent::ScanRange { range });
            }
        }

        let summary = self.run_queries().await?;
        if summary.has_data {
            self.stop_scanning()?;
        }
        Ok(summary)
    }
}

fn lock(
    session: &Mutex<ExploreSessionState>,
) -> Result<MutexGuard<'_, ExploreSessionState>, RunnerError> {
    session.lock().map_err(|_| RunnerError::LockError)
}

async fn execute(
    session: Arc<Mutex<ExploreSessionState>>,
    datasource: Arc<dyn DataSource>,
    timeout: Option<Duration>,
    id: String,
    result_type: ResultType,
    request: DataQueryRequest,
) -> Completion {
    let response = match timeout {
        Some(limit) => tokio::time::timeout(limit, datasource.query(request))
            .await
            .unwrap_or_else(|_| {
                Err(DataSourceError::Timeout(
                    u64::try_from(limit.as_millis()).unwrap_or(u64::MAX),
                ))
            }),
        None => datasource.query(request).await,
    };
    let outcome = response.and_then(|response| result_from_response(result_type, response));

    let Ok(mut session) = session.lock() else {
        tracing::error!(id = %id, "Session lock poisoned, dropping completion");
        return Completion::default();
    };

    let was_live = session
        .transactions
        .get(&id)
        .is_some_and(QueryTransaction::is_live);
    let (event, succeeded, has_data) = match outcome {
        Ok(result) => {
            let has_data = !result.is_empty();
            (ExploreEvent::QueryTransactionSuccess { id: id.clone(), result }, true, has_data)
        }
        Err(error) => {
            tracing::debug!(id = %id, %error, "Query failed");
            let error = TransactionError::new(error.to_string());
            (ExploreEvent::QueryTransactionFailure { id: id.clone(), error }, false, false)
        }
    };
    session.apply(event);
    let accepted = was_live && session.transactions.get(&id).is_some_and(|qt| qt.done);

    if !accepted {
        tracing::warn!(
            id = %id,
            %result_type,
            "Ignored response of superseded or discarded transaction"
        );
    }
    Completion {
        accepted,
        succeeded: accepted && succeeded,
        has_data: accepted && has_data,
    }
}
