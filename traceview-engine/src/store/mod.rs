pub mod adapter;
pub mod sqlite;

pub use adapter::{BackingStore, ColumnDef, ColumnValue, NullFallback, RowControl, StoreKind};
pub use sqlite::SqliteStore;
