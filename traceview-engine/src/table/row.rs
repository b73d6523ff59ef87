//! `PackedRow`/`PackedTable` (spec §4.7), grounded on
//! `rocprofvis_db_packed_storage.h`'s `PackedRow`/`PackedTable`/
//! `MergedColumnDef`.
//!
//! The original packs cells into a raw little-endian byte buffer addressed
//! by `(offset, width)` so rows from different operation classes can share
//! storage. Rust's type system makes that unnecessary: a row here is a
//! typed `Vec<CellValue>` the width bookkeeping would otherwise exist only
//! to recover. `CellValue` reuses `crate::store::ColumnValue`'s shape so a
//! row straight off the backing store needs no repacking.

use std::cmp::Ordering;
use std::collections::HashSet;

use traceview_common::{ColumnType, SchemaIndex};

pub use crate::store::ColumnValue as CellValue;

/// One column's position and type within a `PackedTable`'s rows (the
/// original's `ColumnDef`, minus the byte offset — cells are indexed, not
/// addressed).
#[derive(Debug, Clone)]
pub struct ColumnDef {
    pub name: String,
    pub schema_index: SchemaIndex,
    pub column_type: ColumnType,
}

/// One operation-tagged row (spec §4.7 "the first byte is the operation
/// tag").
#[derive(Debug, Clone)]
pub struct PackedRow {
    pub operation: u8,
    pub cells: Vec<CellValue>,
}

impl PackedRow {
    pub fn new(operation: u8, cells: Vec<CellValue>) -> Self {
        PackedRow { operation, cells }
    }

    fn event_id_low32(&self, id_col: usize) -> u32 {
        match self.cells.get(id_col) {
            Some(CellValue::Integer(v)) => (*v as u64 & 0xFFFF_FFFF) as u32,
            _ => 0,
        }
    }
}

fn cell_numeric(cell: &CellValue) -> f64 {
    match cell {
        CellValue::Integer(v) => *v as f64,
        CellValue::Real(v) => *v,
        CellValue::Text(_) | CellValue::Blob(_) => f64::NAN,
    }
}

/// A result table for one ad-hoc query (spec §4.7). `track_id`/
/// `stream_track_id` tag which track(s) the rows came from, for
/// `remove_rows_for_tracks`.
pub struct PackedTable {
    pub columns: Vec<ColumnDef>,
    pub rows: Vec<PackedRow>,
    pub track_id: Option<u32>,
    pub stream_track_id: Option<u32>,
    id_column: usize,
    track_column: Option<usize>,
    stream_track_column: Option<usize>,
}

impl PackedTable {
    pub fn new(columns: Vec<ColumnDef>) -> Self {
        let id_column = columns.iter().position(|c| c.schema_index == SchemaIndex::Id).unwrap_or(0);
        let track_column = columns.iter().position(|c| c.schema_index == SchemaIndex::TrackId);
        let stream_track_column = columns.iter().position(|c| c.schema_index == SchemaIndex::StreamTrackId);
        PackedTable {
            columns,
            rows: Vec::new(),
            track_id: None,
            stream_track_id: None,
            id_column,
            track_column,
            stream_track_column,
        }
    }

    pub fn add_row(&mut self, row: PackedRow) {
        self.rows.push(row);
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    pub fn column_count(&self) -> usize {
        self.columns.len()
    }

    /// Stable sort by `(operation, event_id_low32)` (spec §4.7
    /// "sort_by_id").
    pub fn sort_by_id(&mut self) {
        let id_col = self.id_column;
        self.rows
            .sort_by_key(|row| (row.operation, row.event_id_low32(id_col)));
    }

    /// Drops rows whose `(operation, id)` repeats the previous row's, after
    /// a `sort_by_id` (spec §4.7 "adjacent event-id dedup, used after
    /// merging sub-tables").
    pub fn remove_duplicates(&mut self) {
        let id_col = self.id_column;
        let mut seen: Option<(u8, u32)> = None;
        self.rows.retain(|row| {
            let key = (row.operation, row.event_id_low32(id_col));
            if seen == Some(key) {
                false
            } else {
                seen = Some(key);
                true
            }
        });
    }

    /// Sorts rows by the named column: numerically for `Byte`/`Word`/
    /// `Dword`/`Qword`/`Double` columns, and by the raw interned id
    /// (already dense in first-seen order, spec §4.2) for name/category
    /// columns — i.e. the same comparison either way once cells are typed,
    /// which is why `CellValue` carries no separate "compare as string"
    /// path. Missing cells sort to the end regardless of direction.
    pub fn sort_by_column(&mut self, name: &str, ascending: bool) {
        let Some(col_idx) = self.columns.iter().position(|c| c.name == name) else {
            return;
        };
        self.rows.sort_by(|a, b| {
            let cmp = match (a.cells.get(col_idx), b.cells.get(col_idx)) {
                (Some(x), Some(y)) => cell_numeric(x).partial_cmp(&cell_numeric(y)).unwrap_or(Ordering::Equal),
                (Some(_), None) => Ordering::Less,
                (None, Some(_)) => Ordering::Greater,
                (None, None) => Ordering::Equal,
            };
            if ascending {
                cmp
            } else {
                cmp.reverse()
            }
        });
    }

    /// Drops rows whose track or stream-track column value is in `tracks`
    /// (spec §4.7 "remove_rows_for_tracks"). `remove_all` drops rows
    /// regardless of membership — used when a whole trace is being
    /// invalidated rather than one slice.
    pub fn remove_rows_for_tracks(&mut self, tracks: &HashSet<u32>, remove_all: bool) {
        if remove_all {
            self.rows.clear();
            return;
        }
        let track_col = self.track_column;
        let stream_col = self.stream_track_column;
        self.rows.retain(|row| {
            let matches = |col: Option<usize>| {
                col.and_then(|idx| row.cells.get(idx))
                    .and_then(|cell| match cell {
                        CellValue::Integer(v) => Some(*v as u32),
                        _ => None,
                    })
                    .map(|id| tracks.contains(&id))
                    .unwrap_or(false)
            };
            !(matches(track_col) || matches(stream_col))
        });
    }

    /// Unions `tables`' row sets into `self`. If any source table used a
    /// non-zero operation tag, also runs `sort_by_id` + `remove_duplicates`
    /// (spec §4.7 "merge... if any op > 0, also sort-by-id and dedup").
    pub fn merge(&mut self, tables: Vec<PackedTable>) {
        let mut any_nonzero_op = false;
        for table in tables {
            for row in table.rows {
                if row.operation != 0 {
                    any_nonzero_op = true;
                }
                self.rows.push(row);
            }
        }
        if any_nonzero_op {
            self.sort_by_id();
            self.remove_duplicates();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn col(name: &str, schema_index: SchemaIndex) -> ColumnDef {
        ColumnDef {
            name: name.to_string(),
            schema_index,
            column_type: schema_index.storage_type(),
        }
    }

    fn table() -> PackedTable {
        PackedTable::new(vec![
            col("id", SchemaIndex::Id),
            col("duration", SchemaIndex::Duration),
            col("__trackId", SchemaIndex::TrackId),
        ])
    }

    #[test]
    fn sort_by_id_orders_by_op_then_id() {
        let mut t = table();
        t.add_row(PackedRow::new(1, vec![CellValue::Integer(5), CellValue::Integer(10), CellValue::Integer(0)]));
        t.add_row(PackedRow::new(0, vec![CellValue::Integer(3), CellValue::Integer(20), CellValue::Integer(0)]));
        t.sort_by_id();
        assert_eq!(t.rows[0].operation, 0);
        assert_eq!(t.rows[1].operation, 1);
    }

    #[test]
    fn remove_duplicates_drops_adjacent_repeats_only() {
        let mut t = table();
        t.add_row(PackedRow::new(0, vec![CellValue::Integer(1), CellValue::Integer(1), CellValue::Integer(0)]));
        t.add_row(PackedRow::new(0, vec![CellValue::Integer(1), CellValue::Integer(2), CellValue::Integer(0)]));
        t.add_row(PackedRow::new(0, vec![CellValue::Integer(2), CellValue::Integer(3), CellValue::Integer(0)]));
        t.remove_duplicates();
        assert_eq!(t.row_count(), 2);
    }

    #[test]
    fn sort_by_column_puts_missing_cells_last() {
        let mut t = table();
        t.add_row(PackedRow::new(0, vec![CellValue::Integer(1), CellValue::Integer(50), CellValue::Integer(0)]));
        t.add_row(PackedRow::new(0, vec![CellValue::Integer(2), CellValue::Integer(10), CellValue::Integer(0)]));
        t.sort_by_column("duration", true);
        assert_eq!(t.rows[0].cells[1], CellValue::Integer(10));
    }

    #[test]
    fn remove_rows_for_tracks_filters_by_track_column() {
        let mut t = table();
        t.add_row(PackedRow::new(0, vec![CellValue::Integer(1), CellValue::Integer(1), CellValue::Integer(7)]));
        t.add_row(PackedRow::new(0, vec![CellValue::Integer(2), CellValue::Integer(1), CellValue::Integer(8)]));
        let mut tracks = HashSet::new();
        tracks.insert(7u32);
        t.remove_rows_for_tracks(&tracks, false);
        assert_eq!(t.row_count(), 1);
        assert_eq!(t.rows[0].cells[2], CellValue::Integer(8));
    }

    /// Testable property 10: an interned name/category column sorts by its
    /// `StringId` (first-seen insertion order), not by the string it names.
    /// "zebra" was interned first here and sorts before "apple" because its
    /// id is smaller, which a lexicographic sort would get backwards.
    #[test]
    fn sort_by_column_orders_interned_column_by_id_not_lexicographically() {
        let mut t = PackedTable::new(vec![
            col("id", SchemaIndex::Id),
            col("name", SchemaIndex::Name),
        ]);
        // zebra interned as id 0, apple as id 1 — reverse of lexicographic order.
        let zebra_id = 0i64;
        let apple_id = 1i64;
        t.add_row(PackedRow::new(0, vec![CellValue::Integer(1), CellValue::Integer(apple_id)]));
        t.add_row(PackedRow::new(0, vec![CellValue::Integer(2), CellValue::Integer(zebra_id)]));

        t.sort_by_column("name", true);

        assert_eq!(t.rows[0].cells[1], CellValue::Integer(zebra_id), "id 0 (zebra) sorts first by interner order");
        assert_eq!(t.rows[1].cells[1], CellValue::Integer(apple_id));
    }

    #[test]
    fn merge_dedups_same_op_same_id_rows_from_different_sources() {
        let mut base = table();
        let mut node_a = table();
        node_a.add_row(PackedRow::new(1, vec![CellValue::Integer(5), CellValue::Integer(1), CellValue::Integer(0)]));
        let mut node_b = table();
        node_b.add_row(PackedRow::new(1, vec![CellValue::Integer(5), CellValue::Integer(2), CellValue::Integer(0)]));
        base.merge(vec![node_a, node_b]);
        assert_eq!(base.row_count(), 1, "same (op, id) pair from two federated nodes collapses to one row");
    }
}
