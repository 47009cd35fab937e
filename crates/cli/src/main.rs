mod commands;
mod state;

use std::path::PathBuf;
use std::process;

use cirrus_core::{CirrusConfig, Pipeline};
use cirrus_index::IndexReplicator;
use cirrus_storage::RecordType;
use clap::{Parser, Subcommand, ValueEnum};
use serde::Serialize;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::state::LocalState;

/// Output format for CLI responses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub(crate) enum OutputFormat {
    Text,
    Json,
}

/// Local harness for the cirrus ingest core.
#[derive(Parser)]
#[command(name = "cirrus", version, about = "Ingest metadata consistency core")]
struct Cli {
    /// State file holding the primary store, index and orchestrator
    #[arg(long, global = true, default_value = "cirrus-state.json")]
    state: PathBuf,

    /// TOML configuration file (defaults apply when omitted)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Output format (text or json)
    #[arg(long, global = true, default_value = "text", value_enum)]
    output: OutputFormat,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Ingest one workflow event (direct, notification or queue batch)
    Ingest {
        /// Path to the event JSON file
        event: PathBuf,
    },

    /// Rebuild index documents from the primary store
    Reindex {
        /// Record type to reindex; repeatable. Default: all types
        #[arg(long = "type")]
        record_types: Vec<RecordType>,
        /// Target index instead of the configured one
        #[arg(long)]
        index: Option<String>,
        /// Upserts in flight at once
        #[arg(long)]
        concurrency: Option<usize>,
    },

    /// Compare the primary store with the index
    Reconcile {
        /// Record type to compare
        #[arg(long = "type", default_value = "granule")]
        record_type: RecordType,
        /// Inclusive lower bound on updatedAt (epoch ms)
        #[arg(long)]
        start: Option<i64>,
        /// Inclusive upper bound on updatedAt (epoch ms)
        #[arg(long)]
        end: Option<i64>,
        /// Only records of this collection
        #[arg(long)]
        collection: Option<String>,
        /// Only records of this provider
        #[arg(long)]
        provider: Option<String>,
        /// Only the record with this ARN, granule id or PDR name
        #[arg(long)]
        id: Option<String>,
    },

    /// Repair executions stuck in the running state
    Sweep,
}

/// Everything a subcommand needs.
pub(crate) struct Context {
    pub(crate) state: LocalState,
    pub(crate) config: CirrusConfig,
    pub(crate) output: OutputFormat,
}

impl Context {
    pub(crate) fn replicator(&self) -> IndexReplicator {
        IndexReplicator::new(self.state.index.clone(), self.config.index.name.clone())
    }

    pub(crate) fn pipeline(&self) -> Result<Pipeline, String> {
        Pipeline::from_config(self.state.store.clone(), &self.replicator(), &self.config)
            .map_err(|e| format!("error building pipeline: {}", e))
    }

    /// Print `value` as pretty JSON, or `text` in text mode.
    pub(crate) fn emit<T: Serialize>(&self, value: &T, text: impl FnOnce() -> String) {
        match self.output {
            OutputFormat::Text => println!("{}", text()),
            OutputFormat::Json => match serde_json::to_string_pretty(value) {
                Ok(json) => println!("{}", json),
                Err(e) => report_error(&format!("serialization error: {}", e), self.output),
            },
        }
    }
}

fn init_tracing() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr),
        )
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();
}

fn main() {
    let Cli {
        state: state_path,
        config,
        output,
        command,
    } = Cli::parse();
    init_tracing();

    let config = match CirrusConfig::load(config.as_deref()) {
        Ok(config) => config,
        Err(e) => fail(&e.to_string(), output),
    };
    let state = match LocalState::load(&state_path) {
        Ok(state) => state,
        Err(msg) => fail(&msg, output),
    };
    let runtime = match tokio::runtime::Runtime::new() {
        Ok(runtime) => runtime,
        Err(e) => fail(&format!("failed to start runtime: {}", e), output),
    };

    let ctx = Context {
        state,
        config,
        output,
    };

    let (result, mutated) = runtime.block_on(async {
        match command {
            Commands::Ingest { event } => (commands::ingest::run(&ctx, &event).await, true),
            Commands::Reindex {
                record_types,
                index,
                concurrency,
            } => (
                commands::reindex::run(&ctx, record_types, index, concurrency).await,
                true,
            ),
            Commands::Reconcile {
                record_type,
                start,
                end,
                collection,
                provider,
                id,
            } => {
                let request = cirrus_ops::ReconcileRequest {
                    record_type,
                    start_time: start,
                    end_time: end,
                    collection_id: collection,
                    provider,
                    id,
                };
                (commands::reconcile::run(&ctx, request).await, false)
            }
            Commands::Sweep => (commands::sweep::run(&ctx).await, true),
        }
    });

    if mutated {
        if let Err(msg) = ctx.state.save(&state_path) {
            fail(&msg, ctx.output);
        }
    }
    if let Err(msg) = result {
        fail(&msg, ctx.output);
    }
}

pub(crate) fn report_error(msg: &str, output: OutputFormat) {
    match output {
        OutputFormat::Text => eprintln!("error: {}", msg),
        OutputFormat::Json => {
            eprintln!("{}", serde_json::json!({ "error": msg }));
        }
    }
}

fn fail(msg: &str, output: OutputFormat) -> ! {
    report_error(msg, output);
    process::exit(1);
}
