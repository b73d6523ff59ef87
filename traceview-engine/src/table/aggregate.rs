//! Aggregation over a `PackedTable` (spec §4.7 "Aggregation"), grounded on
//! `rocprofvis_db_packed_storage.h`'s `Aggregation`/`ColumnAggr` and the
//! worker-private-map-then-merge shape its `SetupAggregation`/
//! `AggregateRow`/`FinalizeAggregation` trio implements.

use std::cmp::Ordering;
use std::collections::HashMap;

use traceview_common::SchemaIndex;

use crate::error::{EngineError, Result};
use crate::table::row::{CellValue, PackedTable};

/// One clause of an aggregation spec (spec §4.7 "command ∈ {Group, Count,
/// Avg, Min, Max, Sum}").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AggCommand {
    Group,
    Count,
    Sum,
    Min,
    Max,
    Avg,
}

#[derive(Debug, Clone)]
pub struct AggClause {
    pub command: AggCommand,
    pub column: SchemaIndex,
}

/// A parsed aggregation spec: exactly one `Group` clause, placed first
/// (spec §4.7 contract).
#[derive(Debug, Clone)]
pub struct AggSpec {
    pub clauses: Vec<AggClause>,
}

impl AggSpec {
    pub fn new(clauses: Vec<AggClause>) -> Result<Self> {
        match clauses.first() {
            Some(c) if c.command == AggCommand::Group => {}
            _ => return Err(EngineError::InvalidParameter("aggregation spec must start with a Group clause".into())),
        }
        if clauses.iter().filter(|c| c.command == AggCommand::Group).count() != 1 {
            return Err(EngineError::InvalidParameter("aggregation spec must have exactly one Group clause".into()));
        }
        Ok(AggSpec { clauses })
    }

    fn group_column(&self) -> SchemaIndex {
        self.clauses[0].column
    }

    fn value_clauses(&self) -> impl Iterator<Item = &AggClause> {
        self.clauses.iter().skip(1)
    }
}

/// Running per-column accumulator state for one group (spec's `ColumnAggr`,
/// minus the string-table indirection — the group key is carried directly
/// since Rust doesn't need the original's union-based `NumericWithType`).
#[derive(Debug, Clone, Default)]
struct Accumulator {
    count: u64,
    sum: f64,
    min: f64,
    max: f64,
    mean: f64,
}

impl Accumulator {
    fn observe(&mut self, value: f64) {
        if self.count == 0 {
            self.min = value;
            self.max = value;
        } else {
            self.min = self.min.min(value);
            self.max = self.max.max(value);
        }
        self.sum += value;
        self.count += 1;
        self.mean += (value - self.mean) / self.count as f64;
    }

    /// Combines another worker's accumulator for the same group (spec's
    /// combine table: Count/Sum additive, Min/Max pairwise, Avg a running
    /// mean reweighted by count).
    fn combine(&mut self, other: &Accumulator) {
        if other.count == 0 {
            return;
        }
        if self.count == 0 {
            *self = other.clone();
            return;
        }
        self.min = self.min.min(other.min);
        self.max = self.max.max(other.max);
        let total = self.count + other.count;
        self.mean = (self.mean * self.count as f64 + other.mean * other.count as f64) / total as f64;
        self.sum += other.sum;
        self.count = total;
    }
}

#[derive(Debug, Clone)]
pub struct AggregatedGroup {
    pub group_value: GroupKey,
    pub name: String,
    /// One value per non-group clause, in `AggSpec::clauses` order (after
    /// the leading `Group`).
    pub values: Vec<f64>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum GroupKey {
    Numeric(u64),
    Text(String),
}

impl GroupKey {
    fn from_cell(cell: &CellValue) -> Self {
        match cell {
            CellValue::Integer(v) => GroupKey::Numeric(*v as u64),
            CellValue::Real(v) => GroupKey::Numeric(v.to_bits()),
            CellValue::Text(s) => GroupKey::Text(s.clone()),
            CellValue::Blob(_) => GroupKey::Numeric(0),
        }
    }

    fn sort_key(&self) -> (u8, u64, &str) {
        match self {
            GroupKey::Numeric(v) => (0, *v, ""),
            GroupKey::Text(s) => (1, 0, s.as_str()),
        }
    }
}

fn cell_as_f64(cell: &CellValue) -> f64 {
    match cell {
        CellValue::Integer(v) => *v as f64,
        CellValue::Real(v) => *v,
        CellValue::Text(_) | CellValue::Blob(_) => 0.0,
    }
}

impl std::hash::Hash for GroupKey {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        match self {
            GroupKey::Numeric(v) => v.hash(state),
            GroupKey::Text(s) => s.hash(state),
        }
    }
}
impl Eq for GroupKey {}

/// One worker's private `group → accumulators` map (spec §4.7
/// "each worker keeps a private group_value → {count, name, per-column
/// accumulator} map").
pub struct AggregationWorker<'a> {
    table: &'a PackedTable,
    spec: &'a AggSpec,
    groups: HashMap<GroupKey, Vec<Accumulator>>,
    group_col_index: usize,
    value_col_indices: Vec<usize>,
}

impl<'a> AggregationWorker<'a> {
    pub fn new(table: &'a PackedTable, spec: &'a AggSpec) -> Self {
        let group_col_index = table
            .columns
            .iter()
            .position(|c| c.schema_index == spec.group_column())
            .unwrap_or(0);
        let value_col_indices = spec
            .value_clauses()
            .map(|clause| table.columns.iter().position(|c| c.schema_index == clause.column).unwrap_or(0))
            .collect();
        AggregationWorker {
            table,
            spec,
            groups: HashMap::new(),
            group_col_index,
            value_col_indices,
        }
    }

    /// Processes `row_index` into this worker's private map (spec's
    /// `AggregateRow`).
    pub fn aggregate_row(&mut self, row_index: usize) {
        let row = &self.table.rows[row_index];
        let Some(key_cell) = row.cells.get(self.group_col_index) else {
            return;
        };
        let key = GroupKey::from_cell(key_cell);
        let n = self.spec.clauses.len() - 1;
        let accumulators = self.groups.entry(key).or_insert_with(|| vec![Accumulator::default(); n]);
        for (slot, &col) in self.value_col_indices.iter().enumerate() {
            if let Some(cell) = row.cells.get(col) {
                accumulators[slot].observe(cell_as_f64(cell));
            }
        }
    }

    pub fn into_groups(self) -> HashMap<GroupKey, Vec<Accumulator>> {
        self.groups
    }
}

/// Merges every worker's private map and applies each clause's command to
/// produce one ordered result row per group (spec's `FinalizeAggregation`).
pub fn finalize(spec: &AggSpec, worker_maps: Vec<HashMap<GroupKey, Vec<Accumulator>>>) -> Vec<AggregatedGroup> {
    let mut merged: HashMap<GroupKey, Vec<Accumulator>> = HashMap::new();
    for map in worker_maps {
        for (key, accs) in map {
            let entry = merged.entry(key).or_insert_with(|| vec![Accumulator::default(); accs.len()]);
            for (slot, acc) in accs.iter().enumerate() {
                entry[slot].combine(acc);
            }
        }
    }

    let commands: Vec<AggCommand> = spec.value_clauses().map(|c| c.command).collect();
    let mut out: Vec<AggregatedGroup> = merged
        .into_iter()
        .map(|(group_value, accs)| {
            let values = accs
                .iter()
                .zip(&commands)
                .map(|(acc, cmd)| match cmd {
                    AggCommand::Count => acc.count as f64,
                    AggCommand::Sum => acc.sum,
                    AggCommand::Min => acc.min,
                    AggCommand::Max => acc.max,
                    AggCommand::Avg => acc.mean,
                    AggCommand::Group => 0.0,
                })
                .collect();
            let name = match &group_value {
                GroupKey::Text(s) => s.clone(),
                GroupKey::Numeric(v) => v.to_string(),
            };
            AggregatedGroup { group_value, name, values }
        })
        .collect();

    out.sort_by(|a, b| {
        a.group_value
            .sort_key()
            .partial_cmp(&b.group_value.sort_key())
            .unwrap_or(Ordering::Equal)
    });
    out
}

/// Re-sorts an already-finalized result by one aggregated column (spec's
/// `SortAggregationByColumn`); `column_index` indexes into
/// `AggregatedGroup::values` (not the group column).
pub fn sort_aggregation_by(groups: &mut [AggregatedGroup], column_index: usize, ascending: bool) {
    groups.sort_by(|a, b| {
        let cmp = a.values[column_index].partial_cmp(&b.values[column_index]).unwrap_or(Ordering::Equal);
        if ascending {
            cmp
        } else {
            cmp.reverse()
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::table::row::{ColumnDef, PackedRow};
    use traceview_common::ColumnType;

    fn col(name: &str, schema_index: SchemaIndex) -> ColumnDef {
        ColumnDef { name: name.to_string(), schema_index, column_type: ColumnType::Qword }
    }

    #[test]
    fn group_by_category_sums_duration() {
        let mut table = PackedTable::new(vec![col("id", SchemaIndex::Id), col("category", SchemaIndex::Category), col("duration", SchemaIndex::Duration)]);
        table.add_row(PackedRow::new(0, vec![CellValue::Integer(1), CellValue::Integer(10), CellValue::Integer(100)]));
        table.add_row(PackedRow::new(0, vec![CellValue::Integer(2), CellValue::Integer(10), CellValue::Integer(50)]));
        table.add_row(PackedRow::new(0, vec![CellValue::Integer(3), CellValue::Integer(20), CellValue::Integer(5)]));

        let spec = AggSpec::new(vec![
            AggClause { command: AggCommand::Group, column: SchemaIndex::Category },
            AggClause { command: AggCommand::Sum, column: SchemaIndex::Duration },
        ])
        .unwrap();

        let mut worker = AggregationWorker::new(&table, &spec);
        for i in 0..table.row_count() {
            worker.aggregate_row(i);
        }
        let groups = finalize(&spec, vec![worker.into_groups()]);
        assert_eq!(groups.len(), 2);
        let cat_10 = groups.iter().find(|g| g.group_value == GroupKey::Numeric(10)).unwrap();
        assert_eq!(cat_10.values[0], 150.0);
    }

    #[test]
    fn setup_rejects_spec_without_leading_group() {
        let err = AggSpec::new(vec![AggClause { command: AggCommand::Sum, column: SchemaIndex::Duration }]).unwrap_err();
        assert!(matches!(err, EngineError::InvalidParameter(_)));
    }

    #[test]
    fn combine_merges_two_workers_min_max_correctly() {
        let mut a = Accumulator::default();
        a.observe(10.0);
        a.observe(20.0);
        let mut b = Accumulator::default();
        b.observe(5.0);
        b.observe(30.0);
        a.combine(&b);
        assert_eq!(a.min, 5.0);
        assert_eq!(a.max, 30.0);
        assert_eq!(a.count, 4);
        assert!((a.mean - 16.25).abs() < 1e-9);
    }
}
