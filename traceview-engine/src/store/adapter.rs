//! `BackingStore` (spec §4.1, §6.2), grounded on `cognitod::incidents`'s
//! `SqlitePool`-per-resource idiom, generalized to an async trait so
//! alternate backends (or a mock, in tests) can stand in for the concrete
//! `sqlx` adapter in `store::sqlite`.

use async_trait::async_trait;

use traceview_common::NodeId;

use crate::error::Result;

/// One column value as returned by a streamed row. NULLs are resolved
/// through the per-column fallback table (spec §4.1 "edge cases") before
/// they ever reach a `RowCallback` — this enum has no null variant.
#[derive(Debug, Clone, PartialEq)]
pub enum ColumnValue {
    Integer(i64),
    Real(f64),
    Text(String),
    Blob(Vec<u8>),
}

/// What a row callback returns to tell `execute` whether to keep streaming.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RowControl {
    Continue,
    Abort,
}

/// Per-column NULL handling (spec §4.1 "NULL column values are mapped
/// through a per-column fallback table").
#[derive(Debug, Clone)]
pub enum NullFallback {
    Integer(i64),
    Text(String),
    SkipRow,
}

/// How `open` should resolve the schema variant of a trace file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreKind {
    AutoDetect,
    Rocpd,
    Rocprof,
}

/// A column/type pair for `create_table`.
#[derive(Debug, Clone)]
pub struct ColumnDef {
    pub name: String,
    pub sql_type: &'static str,
}

/// The relational backend the engine's query layer talks to (spec §4.1).
/// One implementor per db-node; `traceview-engine` is generic over it so
/// the orchestrator, table engine, and side-channel loaders never touch
/// `sqlx` directly.
#[async_trait]
pub trait BackingStore: Send + Sync {
    /// Which schema variant this node was opened as — selects the
    /// `DbStringIdMap` remap path (spec §4.2) and the side-channel column
    /// names (spec §4.9).
    fn kind(&self) -> StoreKind;

    fn node_id(&self) -> NodeId;

    /// Streams rows produced by `sql`, expanding the literal `%GUID%` to
    /// this node's guid first (spec §4.1 "edge cases"). Stops early if
    /// `row_cb` returns `RowControl::Abort` or `cancel` fires.
    async fn execute(
        &self,
        sql: &str,
        row_cb: &mut (dyn FnMut(&[ColumnValue]) -> RowControl + Send),
        cancel: &std::sync::atomic::AtomicBool,
    ) -> Result<()>;

    /// Convenience wrapper over `execute` that buffers every row. Callers
    /// that need streaming (large slices, table queries) should use
    /// `execute` directly instead.
    async fn query_all(&self, sql: &str) -> Result<Vec<Vec<ColumnValue>>> {
        let mut rows = Vec::new();
        let cancel = std::sync::atomic::AtomicBool::new(false);
        self.execute(
            sql,
            &mut |row| {
                rows.push(row.to_vec());
                RowControl::Continue
            },
            &cancel,
        )
        .await?;
        Ok(rows)
    }

    /// Creates `name` with the given columns if absent (spec §4.1
    /// "create_table... for the event-level-cache feature").
    async fn create_table(&self, name: &str, columns: &[ColumnDef]) -> Result<()>;

    async fn drop_table(&self, name: &str) -> Result<()>;

    async fn drop_index(&self, name: &str) -> Result<()>;

    /// Runs `stmts` as one atomic BEGIN/COMMIT unit (spec §4.1
    /// "run_transaction").
    async fn run_transaction(&self, stmts: &[String]) -> Result<()>;

    /// Writes a full copy of the schema and every row overlapping
    /// `[start_ns, end_ns]` to `dest_path` (spec §6.3 "Trim output").
    async fn save_trimmed(&self, start_ns: i64, end_ns: i64, dest_path: &std::path::Path) -> Result<()>;
}
