//! Thin command-line harness over `traceview-engine` (spec §6.2/§6.3):
//! open a trace, run the metadata sequence, fetch a time slice, run an
//! ad-hoc query, or write a trimmed export. Mirrors the shape of a GUI's
//! toolbar actions without any GUI attached.

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use colored::Colorize;
use traceview_common::{NodeId, SchemaIndex, Timestamp, TrackId};
use traceview_engine::context::EngineContext;
use traceview_engine::config::EngineConfig;
use traceview_engine::interner::StringInterner;
use traceview_engine::memory::MemoryManager;
use traceview_engine::model::trace::Trace;
use traceview_engine::orchestrator::{self, SliceOptions, SliceScope};
use traceview_engine::query::builder::rocpd;
use traceview_engine::store::{BackingStore, SqliteStore, StoreKind};
use traceview_engine::table::aggregate::{AggClause, AggCommand, AggSpec};

#[derive(Parser)]
#[command(name = "traceview", about = "Inspect and export rocpd/rocprof trace databases")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the read-metadata sequence and print a track summary.
    Metadata { path: PathBuf },
    /// Fetch a time slice across one or every track.
    Fetch {
        path: PathBuf,
        #[arg(long, default_value_t = 0)]
        start: i64,
        #[arg(long)]
        end: i64,
        #[arg(long, default_value_t = 1920)]
        pixels: u32,
        #[arg(long)]
        track: Option<u64>,
    },
    /// Run an ad-hoc tabular query through the packed-row table engine.
    Query {
        path: PathBuf,
        table: String,
        /// Columns to select, by their public schema name (e.g. id,name,duration).
        #[arg(long, value_delimiter = ',')]
        columns: Vec<String>,
        /// Group by this column and sum `--sum-column` instead of printing raw rows.
        #[arg(long)]
        group_by: Option<String>,
        #[arg(long)]
        sum_column: Option<String>,
        /// Write the result to this path as CSV instead of printing it.
        #[arg(long)]
        out: Option<PathBuf>,
    },
    /// Write a trimmed copy of the database covering `[start, end]`.
    Trim {
        path: PathBuf,
        #[arg(long)]
        start: i64,
        #[arg(long)]
        end: i64,
        #[arg(long)]
        out: PathBuf,
    },
}

async fn open_trace(path: &PathBuf) -> anyhow::Result<Arc<Trace>> {
    let store = SqliteStore::open(NodeId::new(0), path, StoreKind::AutoDetect).await?;
    let config = EngineConfig::load();
    let trace_size = std::fs::metadata(path).map(|m| m.len()).unwrap_or(0);
    let ctx = Arc::new(EngineContext::new(config));
    ctx.register_trace(trace_size);
    let memory = MemoryManager::new(ctx, trace_size);
    Ok(Arc::new(Trace::new(Arc::new(store), Arc::new(StringInterner::new()), memory)))
}

async fn load_metadata(trace: &Arc<Trace>) -> anyhow::Result<()> {
    let handle = orchestrator::future::spawn_job(trace.store().node_id(), "read_metadata", {
        let trace = Arc::clone(trace);
        move |reporter| async move { orchestrator::read_metadata(&trace, NodeId::new(0), &reporter).await }
    });
    handle.join().await?;
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();
    let cli = Cli::parse();

    match cli.command {
        Command::Metadata { path } => {
            let trace = open_trace(&path).await?;
            load_metadata(&trace).await?;
            println!("{} tracks, timeline {:?}", trace.track_count().to_string().green(), trace.timeline());
            for track in trace.tracks() {
                let props = track.properties();
                println!(
                    "  track {:>4}  {:?}  [{}, {}]  {} entries",
                    track.id.get(),
                    track.category,
                    props.min_timestamp,
                    props.max_timestamp,
                    props.num_entries
                );
            }
        }
        Command::Fetch { path, start, end, pixels, track } => {
            let trace = open_trace(&path).await?;
            load_metadata(&trace).await?;
            let (scope, tracks) = match track {
                Some(id) => (SliceScope::ByTrack, vec![TrackId::new(id)]),
                None => (SliceScope::AllTracks, vec![]),
            };
            let result = orchestrator::read_slice(
                &trace,
                Timestamp::new(start),
                Timestamp::new(end),
                &tracks,
                &SliceOptions { scope, pixels },
            )?;
            for (track_id, entries) in result {
                println!("track {}: {} entries", track_id.get(), entries.len());
            }
        }
        Command::Query { path, table, columns, group_by, sum_column, out } => {
            let trace = open_trace(&path).await?;
            let selected: Vec<(&str, SchemaIndex)> = columns
                .iter()
                .map(|name| {
                    SchemaIndex::from_public_name(name)
                        .map(|idx| (idx.public_name(), idx))
                        .ok_or_else(|| anyhow::anyhow!("unknown column {name}"))
                })
                .collect::<anyhow::Result<Vec<_>>>()?;
            let builder = rocpd::table_query(&table, &selected, &[]);
            let packed = orchestrator::execute_table_query(&trace, &builder).await?;

            match (group_by, sum_column) {
                (Some(group_col), Some(sum_col)) => {
                    let group_idx = SchemaIndex::from_public_name(&group_col).ok_or_else(|| anyhow::anyhow!("unknown column {group_col}"))?;
                    let sum_idx = SchemaIndex::from_public_name(&sum_col).ok_or_else(|| anyhow::anyhow!("unknown column {sum_col}"))?;
                    let spec = AggSpec::new(vec![
                        AggClause { command: AggCommand::Group, column: group_idx },
                        AggClause { command: AggCommand::Sum, column: sum_idx },
                    ])?;
                    for group in orchestrator::aggregate_table(&packed, &spec) {
                        println!("{}: {}", group.name, group.values[0]);
                    }
                }
                _ => match out {
                    Some(out_path) => {
                        orchestrator::export_table_csv_async(&trace, &packed, &out_path).await?;
                        println!("{} wrote {} rows to {}", "done:".green(), packed.row_count(), out_path.display());
                    }
                    None => {
                        println!("{} rows, {} columns", packed.row_count(), packed.column_count());
                    }
                },
            }
        }
        Command::Trim { path, start, end, out } => {
            let trace = open_trace(&path).await?;
            let handle = orchestrator::save_trimmed(trace, Timestamp::new(start), Timestamp::new(end), &out);
            handle.join().await?;
            println!("{} wrote trim to {}", "done:".green(), out.display());
        }
    }
    Ok(())
}
