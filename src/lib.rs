//! # quartzite
//!
//! A safe, typed bridge to an embedded SQLite engine: handle lifetimes,
//! value marshalling, prepared statements, transactions, incremental BLOB
//! I/O, online backup, and the callback surfaces (user-defined functions,
//! the update hook, virtual-table modules) — all preserving the engine's
//! semantics while staying idiomatic Rust.
//!
//! This crate is the facade over the two workspace layers:
//!
//! - [`quartzite_core`] — connection, statement, row, value, and handle
//!   machinery
//! - [`quartzite_ext`] — host-callback registration (functions, hooks,
//!   virtual tables)
//!
//! # Example
//!
//! ```no_run
//! use quartzite::prelude::*;
//!
//! fn main() -> quartzite::Result<()> {
//!     let conn = Connection::open_memory()?;
//!     conn.exec_raw("CREATE TABLE users (id INTEGER PRIMARY KEY, name TEXT)")?;
//!
//!     conn.create_function1("shout", |s: String| s.to_uppercase())?;
//!     conn.execute("INSERT INTO users (name) VALUES (?1)", &["Alice".into()])?;
//!
//!     let row = conn.query_one("SELECT shout(name) FROM users")?.unwrap();
//!     assert_eq!(row.get_as::<String>(0)?, "ALICE");
//!     Ok(())
//! }
//! ```

pub use quartzite_core::{
   AutoVacuum, Backup, Blob, BlobMode, Column, ColumnMetadata, Connection, ConnectionConfig,
   ConnectionHandle, Error, FromSql, InterruptHandle, JournalMode, Result, Row, Statement,
   Synchronous, TempStore, ToSql, TransactionBehavior, Value,
};
pub use quartzite_ext::{
   ArrayRow, ArrayTable, ConstraintOp, ConstraintUsage, FunctionExt, Generator, HookAction,
   HookExt, IndexConstraint, IndexInfo, IndexOrderBy, ModuleExt, SchemaColumn, VtabChange,
   VtabModule,
};

/// Everything needed to use the bridge, in one import.
pub mod prelude {
   pub use quartzite_core::{
      Backup, BlobMode, Connection, ConnectionConfig, Error, FromSql, JournalMode, Result, Row,
      Statement, ToSql, Value,
   };
   pub use quartzite_ext::{
      ArrayTable, FunctionExt, Generator, HookAction, HookExt, ModuleExt, SchemaColumn,
      VtabModule,
   };
}
