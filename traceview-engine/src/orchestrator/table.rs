//! Ad-hoc tabular query execution (spec §4.7/§6.1's `build_table_query`,
//! `execute_query_async`, `export_table_csv_async` trio), the orchestrator
//! entry point that actually drives `table::row::PackedTable` and
//! `table::aggregate::AggregationWorker` against a live trace rather than
//! leaving them exercised only by their own unit tests.
//!
//! Interned-name columns (`SchemaIndex::is_interned_name`, spec §4.7
//! "String projection") are projected up front: a raw `Text` cell coming
//! back from the store is interned into the trace's shared `StringId`
//! space and stored as `CellValue::Integer` instead, so `sort_by_column`
//! and `GroupKey::from_cell` both compare the dense id rather than the
//! string. `export_table_csv_async` reverses the projection on the way out.

use std::path::Path;

use traceview_common::{SchemaIndex, StringId};

use crate::error::{EngineError, Result};
use crate::model::trace::Trace;
use crate::query::builder::QueryBuilder;
use crate::store::ColumnValue;
use crate::table::aggregate::{finalize, AggSpec, AggregatedGroup, AggregationWorker};
use crate::table::row::{CellValue, ColumnDef, PackedRow, PackedTable};

fn project_cell(trace: &Trace, schema_index: SchemaIndex, cell: ColumnValue) -> CellValue {
    if schema_index.is_interned_name() {
        if let ColumnValue::Text(s) = &cell {
            return CellValue::Integer(trace.interner().intern(s).get() as i64);
        }
    }
    cell
}

/// Runs `builder` against `trace`'s store and packs the result into a
/// `PackedTable` (spec's `execute_query_async`).
pub async fn execute_table_query(trace: &Trace, builder: &QueryBuilder) -> Result<PackedTable> {
    let sql = builder.build();
    let rows = trace.store().query_all(&sql).await?;

    let columns: Vec<ColumnDef> = builder
        .selected_columns()
        .iter()
        .map(|c| ColumnDef {
            name: c.alias.to_string(),
            schema_index: c.schema_index,
            column_type: c.schema_index.storage_type(),
        })
        .collect();

    let mut table = PackedTable::new(columns.clone());
    for row in rows {
        let cells: Vec<CellValue> = row.into_iter().zip(&columns).map(|(cell, col)| project_cell(trace, col.schema_index, cell)).collect();
        table.add_row(PackedRow::new(0, cells));
    }
    Ok(table)
}

/// Runs `spec` over an already-executed `table` (spec's worker-per-shard
/// design, collapsed to one worker since there is exactly one in-memory
/// table to scan here rather than several per-node federated results).
pub fn aggregate_table(table: &PackedTable, spec: &AggSpec) -> Vec<AggregatedGroup> {
    let mut worker = AggregationWorker::new(table, spec);
    for i in 0..table.row_count() {
        worker.aggregate_row(i);
    }
    finalize(spec, vec![worker.into_groups()])
}

fn csv_field(s: &str) -> String {
    if s.contains(',') || s.contains('"') || s.contains('\n') {
        format!("\"{}\"", s.replace('"', "\"\""))
    } else {
        s.to_string()
    }
}

fn cell_display(trace: &Trace, schema_index: SchemaIndex, cell: &CellValue) -> String {
    if schema_index.is_interned_name() {
        if let CellValue::Integer(id) = cell {
            return trace.interner().resolve(StringId::new(*id as u64)).unwrap_or_default();
        }
    }
    match cell {
        CellValue::Integer(v) => v.to_string(),
        CellValue::Real(v) => v.to_string(),
        CellValue::Text(s) => s.clone(),
        CellValue::Blob(_) => String::new(),
    }
}

/// Writes `table` to `dest` as CSV (spec's `export_table_csv_async`),
/// resolving interned-name columns back to their string form rather than
/// exporting the raw projected id.
pub async fn export_table_csv_async(trace: &Trace, table: &PackedTable, dest: &Path) -> Result<()> {
    let mut out = String::new();
    for (i, col) in table.columns.iter().enumerate() {
        if i > 0 {
            out.push(',');
        }
        out.push_str(&csv_field(&col.name));
    }
    out.push('\n');

    for row in &table.rows {
        for (i, (cell, col)) in row.cells.iter().zip(&table.columns).enumerate() {
            if i > 0 {
                out.push(',');
            }
            out.push_str(&csv_field(&cell_display(trace, col.schema_index, cell)));
        }
        out.push('\n');
    }

    tokio::fs::write(dest, out).await.map_err(|e| EngineError::ExportFailed(e.to_string()))
}
