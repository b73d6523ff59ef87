pub mod aggregate;
pub mod row;

pub use aggregate::{finalize, sort_aggregation_by, AggClause, AggCommand, AggSpec, AggregatedGroup, AggregationWorker, GroupKey};
pub use row::{CellValue, ColumnDef, PackedRow, PackedTable};
