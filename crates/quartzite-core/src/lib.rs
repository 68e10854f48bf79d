//! # quartzite-core
//!
//! The connection, statement, and value layer of the quartzite SQLite
//! bridge: a safe, typed wrapper over the vendored C engine that preserves
//! the engine's semantics while making handle lifetimes, value
//! marshalling, and row extraction idiomatic Rust.
//!
//! ## Core Types
//!
//! - **[`Connection`]**: one engine connection; statements, blobs, and
//!   backups are anchored to it
//! - **[`Statement`]**: prepared statement with typed binding and a row
//!   cursor
//! - **[`Row`]** / **[`Column`]**: materialized results with
//!   case-insensitive name lookup
//! - **[`Value`]**: the tagged union over SQLite's five storage classes
//! - **[`Blob`]** / **[`Backup`]**: incremental-I/O and online-backup
//!   state machines
//! - **[`Error`]**: uniform error taxonomy; engine codes pass through
//!   unchanged
//!
//! ## Architecture
//!
//! - **Ownership-ordered finalizers**: every child handle share-owns its
//!   parent connection handle, so engine resources release child-first
//! - **Copied rows**: row payloads are copied out of engine buffers, so
//!   rows outlive statement resets
//! - **Single-threaded per connection**: a `Connection` is `Send` but not
//!   `Sync`; cross-thread cancellation goes through
//!   [`InterruptHandle`]
//!
//! ## Usage
//!
//! ```no_run
//! use quartzite_core::{Connection, Value};
//!
//! fn main() -> quartzite_core::Result<()> {
//!     let conn = Connection::open_memory()?;
//!     conn.exec_raw("CREATE TABLE users (id INTEGER PRIMARY KEY, name TEXT)")?;
//!     conn.execute("INSERT INTO users (name) VALUES (?1)", &["Alice".into()])?;
//!
//!     conn.transaction(|c| {
//!         c.execute("INSERT INTO users (name) VALUES (?1)", &["Bob".into()])?;
//!         Ok(())
//!     })?;
//!
//!     for row in conn.query("SELECT id, name FROM users ORDER BY id")? {
//!         let id: i64 = row.get_as(0)?;
//!         let name: String = row.get_by_name_as("name")?;
//!         println!("{id}: {name}");
//!     }
//!     Ok(())
//! }
//! ```

mod backup;
mod blob;
mod config;
mod connection;
mod error;
mod handle;
mod pragma;
mod row;
mod statement;
mod transaction;
mod types;
mod value;

pub use backup::Backup;
pub use blob::{Blob, BlobMode};
pub use config::ConnectionConfig;
pub use connection::Connection;
pub use error::{Error, Result};
pub use handle::{ConnectionHandle, InterruptHandle};
pub use pragma::{AutoVacuum, JournalMode, Synchronous, TempStore};
pub use row::{Column, ColumnMetadata, Row};
pub use statement::Statement;
pub use transaction::TransactionBehavior;
pub use types::{FromSql, ToSql};
pub use value::Value;

// The extension crate builds its trampolines on the same bindings.
pub use libsqlite3_sys as ffi;
