//! SQL query builder (spec §4.8), grounded on `rocprofvis_db_query_builder.h`'s
//! per-query-kind `..._query_format` structs and the concrete `SELECT`
//! strings in `rocprofvis_db_rocpd.cpp` (track discovery, level, and slice
//! queries). The original has one format struct per table shape; this
//! collapses them to one fluent builder keyed by `QueryKind`, since Rust's
//! `String` building needs none of the fixed-size `parameters[N]` arrays
//! the original used to avoid C++ allocation churn.

use traceview_common::{ColumnMask, QueryKind, SchemaIndex};

/// One selected column plus the visibility the adapter should apply to it
/// (spec §4.8 "the builder also emits column masks").
#[derive(Debug, Clone)]
pub struct ColumnExpr {
    pub expr: String,
    pub alias: &'static str,
    pub schema_index: SchemaIndex,
    pub mask: ColumnMask,
}

impl ColumnExpr {
    pub fn visible(expr: impl Into<String>, schema_index: SchemaIndex) -> Self {
        ColumnExpr {
            expr: expr.into(),
            alias: schema_index.public_name(),
            schema_index,
            mask: ColumnMask::Visible,
        }
    }

    pub fn service(expr: impl Into<String>, schema_index: SchemaIndex) -> Self {
        ColumnExpr {
            expr: expr.into(),
            alias: schema_index.public_name(),
            schema_index,
            mask: ColumnMask::Service,
        }
    }

    pub fn timestamp(expr: impl Into<String>, schema_index: SchemaIndex) -> Self {
        ColumnExpr {
            expr: expr.into(),
            alias: schema_index.public_name(),
            schema_index,
            mask: ColumnMask::Timestamp,
        }
    }
}

/// A join fragment (`INNER JOIN ... ON ...`).
#[derive(Debug, Clone)]
pub struct Join {
    pub table: String,
    pub on: String,
}

/// Builds one `SELECT` string plus the column-mask vector the adapter needs
/// to hide service-only columns (spec §4.8). `%GUID%` expansion happens
/// downstream, in the backing store, not here — the builder never knows
/// which node it will run against.
#[derive(Debug, Clone)]
pub struct QueryBuilder {
    kind: QueryKind,
    columns: Vec<ColumnExpr>,
    from: Vec<String>,
    joins: Vec<Join>,
    wheres: Vec<String>,
    group_by: Vec<String>,
    order_by: Option<(String, bool)>,
    limit: Option<u64>,
    offset: Option<u64>,
    count_only: bool,
}

impl QueryBuilder {
    pub fn new(kind: QueryKind) -> Self {
        QueryBuilder {
            kind,
            columns: Vec::new(),
            from: Vec::new(),
            joins: Vec::new(),
            wheres: Vec::new(),
            group_by: Vec::new(),
            order_by: None,
            limit: None,
            offset: None,
            count_only: false,
        }
    }

    pub fn select(mut self, column: ColumnExpr) -> Self {
        self.columns.push(column);
        self
    }

    pub fn from(mut self, table: impl Into<String>) -> Self {
        self.from.push(table.into());
        self
    }

    pub fn join(mut self, table: impl Into<String>, on: impl Into<String>) -> Self {
        self.joins.push(Join { table: table.into(), on: on.into() });
        self
    }

    pub fn filter(mut self, predicate: impl Into<String>) -> Self {
        self.wheres.push(predicate.into());
        self
    }

    pub fn time_range(self, start_ns: i64, end_ns: i64) -> Self {
        self.filter(format!("start <= {end_ns} AND end >= {start_ns}"))
    }

    pub fn group_by(mut self, expr: impl Into<String>) -> Self {
        self.group_by.push(expr.into());
        self
    }

    pub fn order_by(mut self, column: impl Into<String>, ascending: bool) -> Self {
        self.order_by = Some((column.into(), ascending));
        self
    }

    pub fn limit(mut self, n: u64) -> Self {
        self.limit = Some(n);
        self
    }

    pub fn offset(mut self, n: u64) -> Self {
        self.offset = Some(n);
        self
    }

    pub fn count_only(mut self) -> Self {
        self.count_only = true;
        self
    }

    pub fn column_masks(&self) -> Vec<(SchemaIndex, ColumnMask)> {
        self.columns.iter().map(|c| (c.schema_index, c.mask)).collect()
    }

    /// The selected columns in select-list order, so a result-row packer
    /// can line each returned cell up with its `SchemaIndex`/alias without
    /// re-deriving the select list from the rendered SQL string.
    pub fn selected_columns(&self) -> &[ColumnExpr] {
        &self.columns
    }

    /// Renders the final SQL string. `%GUID%` literals inside `filter`/
    /// `from`/`join` fragments pass through untouched for the backing
    /// store to expand (spec §4.1 "edge cases").
    pub fn build(&self) -> String {
        let mut sql = String::from("SELECT ");
        if self.count_only {
            sql.push_str("COUNT(*) AS count");
        } else {
            let select_list: Vec<String> = self.columns.iter().map(|c| format!("{} AS {}", c.expr, c.alias)).collect();
            sql.push_str(&select_list.join(", "));
        }

        sql.push_str(" FROM ");
        sql.push_str(&self.from.join(", "));

        for join in &self.joins {
            sql.push_str(&format!(" INNER JOIN {} ON {}", join.table, join.on));
        }

        if !self.wheres.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&self.wheres.join(" AND "));
        }

        if !self.group_by.is_empty() && !self.count_only {
            sql.push_str(" GROUP BY ");
            sql.push_str(&self.group_by.join(", "));
        }

        if let Some((col, asc)) = &self.order_by {
            sql.push_str(&format!(" ORDER BY {} {}", col, if *asc { "ASC" } else { "DESC" }));
        }

        if let Some(limit) = self.limit {
            sql.push_str(&format!(" LIMIT {limit}"));
        }
        if let Some(offset) = self.offset {
            sql.push_str(&format!(" OFFSET {offset}"));
        }

        sql
    }

    pub fn kind(&self) -> QueryKind {
        self.kind
    }
}

/// Canned query builders for the shapes spec §4.8 names as complete:
/// track-query, level-query, slice-query (by-track and all-tracks),
/// dataflow-query, essential-data-query. Grounded on the concrete
/// `SELECT`s in `rocprofvis_db_rocpd.cpp`.
pub mod rocpd {
    use super::*;

    /// Discovers the unique (pid, tid) / (agent, queue) tuples for one
    /// category (`rocprofvis_db_rocpd.cpp`'s region/kernel-dispatch
    /// discovery queries).
    pub fn track_discovery(table: &str, key_columns: &[&str]) -> QueryBuilder {
        let mut b = QueryBuilder::new(QueryKind::TrackDiscovery).from(table);
        for (i, col) in key_columns.iter().enumerate() {
            b = b.select(ColumnExpr::service(*col, schema_for_key(i)));
        }
        b.group_by(key_columns.join(", "))
    }

    fn schema_for_key(i: usize) -> SchemaIndex {
        match i {
            0 => SchemaIndex::ProcessId,
            1 => SchemaIndex::ThreadId,
            _ => SchemaIndex::AgentAbsIndex,
        }
    }

    /// LOD-0 slice for every track in one query, rows tagged by track id
    /// (spec §9 resolution: `SliceAllTracks` is its own shape, not a
    /// parameterized variant of `SliceByTrack`).
    pub fn slice_all_tracks(table: &str, start_ns: i64, end_ns: i64) -> QueryBuilder {
        QueryBuilder::new(QueryKind::SliceAllTracks)
            .select(ColumnExpr::visible("id", SchemaIndex::Id))
            .select(ColumnExpr::visible("start", SchemaIndex::Start))
            .select(ColumnExpr::visible("end", SchemaIndex::End))
            .select(ColumnExpr::service("__trackId", SchemaIndex::TrackId))
            .from(table)
            .time_range(start_ns, end_ns)
            .order_by("start", true)
    }

    /// LOD-0 slice for one specific track.
    pub fn slice_by_track(table: &str, track_column: &str, track_id: u64, start_ns: i64, end_ns: i64) -> QueryBuilder {
        QueryBuilder::new(QueryKind::SliceByTrack)
            .select(ColumnExpr::visible("id", SchemaIndex::Id))
            .select(ColumnExpr::visible("start", SchemaIndex::Start))
            .select(ColumnExpr::visible("end", SchemaIndex::End))
            .from(table)
            .filter(format!("{track_column} = {track_id}"))
            .time_range(start_ns, end_ns)
            .order_by("start", true)
    }

    /// Per-event level precomputation input (spec §4.5 "Event-level
    /// precomputation").
    pub fn level_input(table: &str, track_column: &str, track_id: u64) -> QueryBuilder {
        QueryBuilder::new(QueryKind::Level)
            .select(ColumnExpr::visible("id", SchemaIndex::Id))
            .select(ColumnExpr::visible("start", SchemaIndex::Start))
            .select(ColumnExpr::visible("end", SchemaIndex::End))
            .from(table)
            .filter(format!("{track_column} = {track_id}"))
            .order_by("start", true)
    }

    /// Cross-track flow-record join (spec §4.9 Flow loader).
    pub fn dataflow(flow_table: &str) -> QueryBuilder {
        QueryBuilder::new(QueryKind::DataFlow)
            .select(ColumnExpr::service("source_event_id", SchemaIndex::Id))
            .select(ColumnExpr::service("target_track_id", SchemaIndex::TrackId))
            .select(ColumnExpr::visible("target_timestamp", SchemaIndex::Start))
            .from(flow_table)
    }

    /// Ad-hoc tabular query (spec §6.1 `build_table_query`): selects an
    /// arbitrary `(physical column, SchemaIndex)` list from one table, for
    /// the packed-row table engine to run and aggregate over. Unlike the
    /// other canned builders here, the column set isn't fixed — the caller
    /// (a CLI `query` invocation or a future details-pane request) picks it.
    pub fn table_query(table: &str, columns: &[(&str, SchemaIndex)], filters: &[String]) -> QueryBuilder {
        let mut b = QueryBuilder::new(QueryKind::Table).from(table);
        for (expr, schema_index) in columns {
            b = b.select(ColumnExpr::visible(*expr, *schema_index));
        }
        for filter in filters {
            b = b.filter(filter.clone());
        }
        b
    }

    /// Per-category extended-data tuples for one event (spec §4.9 ExtData
    /// loader).
    pub fn essential_data(table: &str, event_id: u64) -> QueryBuilder {
        QueryBuilder::new(QueryKind::EssentialData)
            .select(ColumnExpr::visible("symbol", SchemaIndex::Symbol))
            .select(ColumnExpr::visible("args", SchemaIndex::Name))
            .from(table)
            .filter(format!("event_id = {event_id}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn build_renders_select_from_where_order() {
        let sql = QueryBuilder::new(QueryKind::Table)
            .select(ColumnExpr::visible("duration", SchemaIndex::Duration))
            .from("rocpd_api")
            .filter("pid = 1")
            .order_by("duration", false)
            .limit(100)
            .build();
        assert_eq!(sql, "SELECT duration AS duration FROM rocpd_api WHERE pid = 1 ORDER BY duration DESC LIMIT 100");
    }

    #[test]
    fn count_only_ignores_group_by_and_columns() {
        let sql = QueryBuilder::new(QueryKind::Table)
            .select(ColumnExpr::visible("duration", SchemaIndex::Duration))
            .from("rocpd_api")
            .group_by("category")
            .count_only()
            .build();
        assert_eq!(sql, "SELECT COUNT(*) AS count FROM rocpd_api");
    }

    #[test]
    fn slice_all_tracks_tags_rows_with_service_track_column() {
        let builder = rocpd::slice_all_tracks("rocpd_api", 0, 1000);
        let masks = builder.column_masks();
        assert!(masks.iter().any(|(idx, mask)| *idx == SchemaIndex::TrackId && *mask == ColumnMask::Service));
        assert!(!builder.build().contains("%GUID%"));
    }
}
