//! Explore CLI
//!
//! Command-line interface for the explore query engine.
//!
//! # Usage
//!
//! ```bash
//! explore --help
//! explore query -e 'rate(http_requests_total[5m])' --from now-1h
//! explore scan -e errors --max-steps 20
//! explore url decode '["now-1h","now","testdata",{"expr":"up"}]'
//! explore interval --from now-7d --width 1200
//! explore history show
//! ```

#![deny(unsafe_code)]

mod commands;

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use engine::config::EngineConfig;
use engine::models::{RawTimeRange, UiState, DEFAULT_RANGE_FROM, DEFAULT_RANGE_TO};
use std::path::PathBuf;

/// Explore CLI - run explore queries and inspect their state
#[derive(Parser)]
#[command(name = "explore")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Datasource to query; defaults to the last used one
    #[arg(short, long, global = true)]
    datasource: Option<String>,

    /// File backing query history; history is kept in memory when unset
    #[arg(long, global = true, env = "EXPLORE_HISTORY_FILE")]
    history_file: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run queries once and print the composed results
    Query(QueryArgs),

    /// Step back through time until the queries return data
    Scan {
        #[command(flatten)]
        query: QueryArgs,

        /// Give up after this many steps
        #[arg(long, default_value_t = 10)]
        max_steps: usize,
    },

    /// Decode or build explore URL state
    Url {
        #[command(subcommand)]
        command: UrlCommand,
    },

    /// Compute the query interval of a time range
    Interval {
        #[command(flatten)]
        range: RangeArgs,

        /// Minimum interval, e.g. 15s
        #[arg(long)]
        min_interval: Option<String>,
    },

    /// Show or clear query history
    History {
        #[command(subcommand)]
        command: HistoryCommand,
    },
}

#[derive(Subcommand)]
enum UrlCommand {
    /// Decode a `left` or `right` URL parameter
    Decode {
        /// Parameter value, percent-encoded or raw
        param: String,
    },

    /// Build an explore URL for the given queries
    Encode {
        #[command(flatten)]
        query: QueryArgs,

        /// Write the verbose object form instead of the compact array
        #[arg(long)]
        verbose: bool,
    },
}

#[derive(Subcommand)]
enum HistoryCommand {
    /// Print the history of the datasource
    Show,
    /// Forget the history of the datasource
    Clear,
}

/// Time range and resolution.
#[derive(Args, Clone)]
struct RangeArgs {
    /// Range start, absolute or relative
    #[arg(long, default_value = DEFAULT_RANGE_FROM)]
    from: String,

    /// Range end, absolute or relative
    #[arg(long, default_value = DEFAULT_RANGE_TO)]
    to: String,

    /// Width of the result area in pixels
    #[arg(long, default_value_t = 1000)]
    width: u32,
}

impl RangeArgs {
    fn raw(&self) -> RawTimeRange {
        RawTimeRange::new(self.from.clone(), self.to.clone())
    }
}

/// Query rows and visible views.
#[derive(Args, Clone)]
struct QueryArgs {
    /// Query expression, one row per flag
    #[arg(short, long = "expr", required = true)]
    exprs: Vec<String>,

    #[command(flatten)]
    range: RangeArgs,

    /// Hide the graph view
    #[arg(long)]
    no_graph: bool,

    /// Hide the table view
    #[arg(long)]
    no_table: bool,

    /// Hide the logs view
    #[arg(long)]
    no_logs: bool,
}

impl QueryArgs {
    fn ui(&self) -> UiState {
        UiState {
            showing_graph: !self.no_graph,
            showing_table: !self.no_table,
            showing_logs: !self.no_logs,
            ..UiState::default()
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let mut config = EngineConfig::from_env().context("Invalid configuration")?;
    if cli.history_file.is_some() {
        config.history_file.clone_from(&cli.history_file);
    }
    let ctx = commands::CliContext::new(cli.datasource, config)?;

    let output = match cli.command {
        Some(Commands::Query(args)) => commands::query(&ctx, &args).await?,
        Some(Commands::Scan { query, max_steps }) => commands::scan(&ctx, &query, max_steps).await?,
        Some(Commands::Url {
            command: UrlCommand::Decode { param },
        }) => commands::url_decode(&param)?,
        Some(Commands::Url {
            command: UrlCommand::Encode { query, verbose },
        }) => commands::url_encode(&ctx, &query, !verbose)?,
        Some(Commands::Interval {
            range,
            min_interval,
        }) => commands::interval(&range, min_interval.as_deref())?,
        Some(Commands::History {
            command: HistoryCommand::Show,
        }) => commands::history_show(&ctx)?,
        Some(Commands::History {
            command: HistoryCommand::Clear,
        }) => commands::history_clear(&ctx)?,
        None => {
            println!("Explore CLI v{}", env!("CARGO_PKG_VERSION"));
            println!("Use --help for usage information");
            return Ok(());
        }
    };

    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parse() {
        let cli = Cli::try_parse_from(["explore"]);
        assert!(cli.is_ok());
        assert!(cli.unwrap().datasource.is_none());
    }

    #[test]
    fn test_cli_query_command() {
        let cli = Cli::try_parse_from([
            "explore", "query", "-e", "up", "-e", "down", "--from", "now-1h", "--no-logs",
        ])
        .unwrap();
        let Some(Commands::Query(args)) = cli.command else {
            panic!("expected query command");
        };
        assert_eq!(args.exprs, vec!["up", "down"]);
        assert_eq!(args.range.raw(), RawTimeRange::new("now-1h", "now"));
        assert!(!args.ui().showing_logs);
        assert!(args.ui().showing_graph);
    }

    #[test]
    fn test_cli_query_requires_expr() {
        assert!(Cli::try_parse_from(["explore", "query"]).is_err());
    }

    #[test]
    fn test_cli_scan_command() {
        let cli = Cli::try_parse_from(["explore", "scan", "-e", "up", "--max-steps", "3"]).unwrap();
        assert!(matches!(cli.command, Some(Commands::Scan { max_steps: 3, .. })));
    }

    #[test]
    fn test_cli_url_commands() {
        let cli = Cli::try_parse_from(["explore", "url", "decode", "[]"]).unwrap();
        assert!(matches!(
            cli.command,
            Some(Commands::Url {
                command: UrlCommand::Decode { .. }
            })
        ));

        let cli = Cli::try_parse_from(["explore", "url", "encode", "-e", "up", "--verbose"]).unwrap();
        assert!(matches!(
            cli.command,
            Some(Commands::Url {
                command: UrlCommand::Encode { verbose: true, .. }
            })
        ));
    }

    #[test]
    fn test_cli_global_history_file() {
        let cli = Cli::try_parse_from([
            "explore",
            "history",
            "show",
            "--history-file",
            "/tmp/history.json",
            "-d",
            "prom",
        ])
        .unwrap();
        assert_eq!(cli.history_file, Some(PathBuf::from("/tmp/history.json")));
        assert_eq!(cli.datasource.as_deref(), Some("prom"));
        assert!(matches!(
            cli.command,
            Some(Commands::History {
                command: HistoryCommand::Show
            })
        ));
    }
}
