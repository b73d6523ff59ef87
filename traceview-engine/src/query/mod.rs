pub mod builder;

pub use builder::{rocpd, ColumnExpr, Join, QueryBuilder};
