//! Command implementations. Each returns a JSON value for printing.

use anyhow::Result;
use engine::chrono::Utc;
use engine::config::EngineConfig;
use engine::datasource::TestDataSource;
use engine::history::{FileKeyValueStore, HistoryManager, InMemoryKeyValueStore, KeyValueStore};
use engine::models::{HistoryItem, IntervalValues, Query, RawTimeRange, ResultType, TimeRange};
use engine::session::{ExploreEvent, ExploreSessionState, QueryRunner, RunSummary};
use engine::time::get_intervals;
use engine::transaction::ComposedResults;
use engine::url::{explore_url, try_parse_url_state, ExploreUrlState};
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;

use crate::{QueryArgs, RangeArgs};

/// Datasource used when none is given and none was used before.
const DEFAULT_DATASOURCE: &str = "testdata";

/// Settings shared by all commands.
pub struct CliContext {
    datasource: String,
    config: EngineConfig,
    history: Arc<HistoryManager>,
}

impl CliContext {
    /// Opens the history store and resolves the datasource, falling back to
    /// the last used one.
    pub fn new(datasource: Option<String>, config: EngineConfig) -> Result<Self> {
        let store: Arc<dyn KeyValueStore> = match &config.history_file {
            Some(path) => Arc::new(FileKeyValueStore::new(path.clone())),
            None => InMemoryKeyValueStore::new_shared(),
        };
        let history = Arc::new(HistoryManager::with_max_items(store, config.max_history));
        let datasource = match datasource {
            Some(name) => name,
            None => history
                .last_used_datasource()?
                .unwrap_or_else(|| DEFAULT_DATASOURCE.to_string()),
        };
        tracing::debug!(datasource = %datasource, "Using datasource");

        Ok(Self {
            datasource,
            config,
            history,
        })
    }

    /// Creates a runner with the rows and views of `args`.
    fn runner(&self, args: &QueryArgs) -> Result<QueryRunner> {
        let datasource = Arc::new(TestDataSource::new(self.datasource.clone()));
        let runner = QueryRunner::new(datasource, ExploreSessionState::with_config(&self.config))
            .with_history(Arc::clone(&self.history));
        runner.load_datasource()?;
        runner.dispatch(ExploreEvent::Initialize {
            queries: args.exprs.iter().map(Query::from_expr).collect(),
            range: args.range.raw(),
            ui: args.ui(),
            container_width: args.range.width,
        })?;
        Ok(runner)
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct RowError {
    row: usize,
    result_type: ResultType,
    message: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct QueryReport {
    summary: RunSummary,
    range: RawTimeRange,
    intervals: IntervalValues,
    results: ComposedResults,
    errors: Vec<RowError>,
    url: String,
}

impl QueryReport {
    fn from_runner(runner: &QueryRunner, summary: RunSummary) -> Result<Self> {
        let state = runner.snapshot()?;
        let errors = state
            .transactions
            .transactions()
            .iter()
            .filter_map(|qt| {
                qt.error.as_ref().map(|error| RowError {
                    row: qt.row_index,
                    result_type: qt.result_type,
                    message: error.to_string(),
                })
            })
            .collect();
        let url = explore_url(&ExploreUrlState::from_session(&state), None, true)?;

        Ok(Self {
            summary,
            range: state.range,
            intervals: state.query_intervals,
            results: state.results,
            errors,
            url,
        })
    }
}

pub async fn query(ctx: &CliContext, args: &QueryArgs) -> Result<Value> {
    let runner = ctx.runner(args)?;
    let summary = runner.run_queries().await?;
    Ok(serde_json::to_value(QueryReport::from_runner(&runner, summary)?)?)
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ScanStep {
    range: RawTimeRange,
    summary: RunSummary,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ScanReport {
    found: bool,
    steps: Vec<ScanStep>,
    result: QueryReport,
}

/// Steps back until a step yields data or `max_steps` is reached.
pub async fn scan(ctx: &CliContext, args: &QueryArgs, max_steps: usize) -> Result<Value> {
    let runner = ctx.runner(args)?;
    let mut steps = Vec::new();
    let mut last = RunSummary::default();

    for _ in 0..max_steps {
        last = runner.scan_back().await?;
        let range = runner.snapshot()?.range;
        tracing::info!(
            from = %range.from,
            to = %range.to,
            has_data = last.has_data,
            "Scanned range"
        );
        steps.push(ScanStep {
            range,
            summary: last,
        });
        if last.has_data {
            break;
        }
    }

    if !last.has_data {
        runner.stop_scanning()?;
        tracing::warn!(steps = steps.len(), "No data found");
    }
    Ok(serde_json::to_value(ScanReport {
        found: last.has_data,
        steps,
        result: QueryReport::from_runner(&runner, last)?,
    })?)
}

pub fn url_decode(param: &str) -> Result<Value> {
    Ok(serde_json::to_value(try_parse_url_state(param)?)?)
}

#[derive(Serialize)]
struct UrlReport {
    url: String,
    state: ExploreUrlState,
}

pub fn url_encode(ctx: &CliContext, args: &QueryArgs, compact: bool) -> Result<Value> {
    let state = ExploreUrlState {
        datasource: Some(ctx.datasource.clone()),
        queries: args.exprs.iter().map(Query::from_expr).collect(),
        range: args.range.raw(),
        ui: args.ui(),
    };
    let url = explore_url(&state, None, compact)?;
    Ok(serde_json::to_value(UrlReport { url, state })?)
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct IntervalReport {
    range: TimeRange,
    #[serde(flatten)]
    intervals: IntervalValues,
}

pub fn interval(range: &RangeArgs, min_interval: Option<&str>) -> Result<Value> {
    let now = Utc::now();
    let raw = range.raw();
    let intervals = get_intervals(&raw, min_interval, range.width, now)?;
    Ok(serde_json::to_value(IntervalReport {
        range: raw.resolve(now)?,
        intervals,
    })?)
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct HistoryReport {
    datasource: String,
    last_used_datasource: Option<String>,
    items: Vec<HistoryItem>,
}

pub fn history_show(ctx: &CliContext) -> Result<Value> {
    Ok(serde_json::to_value(HistoryReport {
        datasource: ctx.datasource.clone(),
        last_used_datasource: ctx.history.last_used_datasource()?,
        items: ctx.history.load(&ctx.datasource)?,
    })?)
}

pub fn history_clear(ctx: &CliContext) -> Result<Value> {
    ctx.history.clear(&ctx.datasource)?;
    history_show(ctx)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Cli;
    use clap::Parser;

    fn query_args(argv: &[&str]) -> QueryArgs {
        let mut full = vec!["explore", "query"];
        full.extend_from_slice(argv);
        match Cli::try_parse_from(full).unwrap().command {
            Some(crate::Commands::Query(args)) => args,
            _ => panic!("expected query command"),
        }
    }

    fn context(history_file: Option<std::path::PathBuf>) -> CliContext {
        let config = EngineConfig {
            history_file,
            ..EngineConfig::default()
        };
        CliContext::new(Some("testdata".to_string()), config).unwrap()
    }

    #[tokio::test]
    async fn test_query_reports_results_and_records_history() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = context(Some(dir.path().join("history.json")));

        let report = query(&ctx, &query_args(&["-e", "up", "-e", "down", "--no-logs"]))
            .await
            .unwrap();
        assert_eq!(report["summary"]["issued"], 4);
        assert_eq!(report["summary"]["succeeded"], 4);
        assert_eq!(report["results"]["graph_result"].as_array().unwrap().len(), 2);
        assert!(report["url"].as_str().unwrap().starts_with("/explore?left="));

        let history = history_show(&ctx).unwrap();
        assert_eq!(history["items"].as_array().unwrap().len(), 2);
        assert_eq!(history["lastUsedDatasource"], "testdata");

        let cleared = history_clear(&ctx).unwrap();
        assert!(cleared["items"].as_array().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_empty_row_runs_without_errors() {
        let ctx = context(None);
        let mut args = query_args(&["-e", "up", "--no-table", "--no-logs"]);
        args.exprs.push(String::new());

        let report = query(&ctx, &args).await.unwrap();
        assert!(report["errors"].as_array().unwrap().is_empty());
        assert_eq!(report["summary"]["issued"], 2);
    }

    #[tokio::test]
    async fn test_scan_finds_data_on_first_step() {
        let ctx = context(None);
        let report = scan(&ctx, &query_args(&["-e", "up", "--no-logs"]), 5)
            .await
            .unwrap();
        assert_eq!(report["found"], true);
        assert_eq!(report["steps"].as_array().unwrap().len(), 1);
    }

    #[test]
    fn test_url_encode_then_decode() {
        let ctx = context(None);
        let encoded = url_encode(&ctx, &query_args(&["-e", "up", "--from", "now-1h"]), true).unwrap();
        let url = encoded["url"].as_str().unwrap();
        let param = url.strip_prefix("/explore?left=").unwrap();

        let decoded = url_decode(param).unwrap();
        assert_eq!(decoded, encoded["state"]);
        assert_eq!(decoded["range"]["from"], "now-1h");
    }

    #[tokio::test]
    async fn test_datasource_falls_back_to_last_used() {
        let dir = tempfile::tempdir().unwrap();
        let config = EngineConfig {
            history_file: Some(dir.path().join("history.json")),
            ..EngineConfig::default()
        };

        let fresh = CliContext::new(None, config.clone()).unwrap();
        assert_eq!(fresh.datasource, DEFAULT_DATASOURCE);

        let prom = CliContext::new(Some("prom".to_string()), config.clone()).unwrap();
        query(&prom, &query_args(&["-e", "up"])).await.unwrap();

        let reopened = CliContext::new(None, config).unwrap();
        assert_eq!(reopened.datasource, "prom");
    }

    #[test]
    fn test_url_decode_rejects_garbage() {
        assert!(url_decode("not json").is_err());
    }

    #[test]
    fn test_interval_for_one_hour() {
        let range = RangeArgs {
            from: "now-1h".to_string(),
            to: "now".to_string(),
            width: 1000,
        };
        let report = interval(&range, None).unwrap();
        assert_eq!(report["interval"], "5s");
        assert_eq!(report["intervalMs"], 5000);

        let floored = interval(&range, Some("1m")).unwrap();
        assert_eq!(floored["interval"], "1m");
    }
}
