//! The connection facade: open, close, exec, metadata, cancellation, and
//! whole-database serialization.

use std::cell::Cell;
use std::ffi::{CStr, CString, c_uint, c_void};
use std::marker::PhantomData;
use std::path::Path;
use std::ptr;
use std::sync::Arc;
use std::time::Duration;

use libsqlite3_sys as ffi;
use tracing::debug;

use crate::config::ConnectionConfig;
use crate::error::{Error, Result};
use crate::handle::{ConnectionHandle, InterruptHandle};
use crate::row::Row;
use crate::value::Value;

/// Convert a Rust string into a C string for the engine, rejecting interior
/// NUL bytes up front.
pub(crate) fn to_cstring(s: &str, what: &'static str) -> Result<CString> {
   CString::new(s).map_err(|_| Error::InvalidString { what })
}

/// A single connection to an SQLite database.
///
/// The connection is the root handle: statements, blobs, backups, and every
/// callback registration are anchored to it and share-own its underlying
/// engine handle, so finalization order is always child-before-parent.
///
/// A `Connection` is `Send` but not `Sync`: all operations on one connection
/// must come from one thread at a time. Cross-thread cancellation goes
/// through [`Connection::interrupt_handle`].
///
/// # Example
///
/// ```no_run
/// use quartzite_core::Connection;
///
/// # fn example() -> quartzite_core::Result<()> {
/// let conn = Connection::open_memory()?;
/// conn.exec_raw("CREATE TABLE users (id INTEGER PRIMARY KEY, name TEXT)")?;
/// conn.execute("INSERT INTO users (name) VALUES (?1)", &["Alice".into()])?;
///
/// for row in conn.query("SELECT id, name FROM users")? {
///     println!("{:?} {:?}", row.get(0), row.get_by_name("NAME"));
/// }
/// # Ok(())
/// # }
/// ```
pub struct Connection {
   handle: Arc<ConnectionHandle>,
   // Keeps the connection out of Sync: operations are single-threaded per
   // connection, only InterruptHandle may cross threads.
   _not_sync: PhantomData<Cell<()>>,
}

impl Connection {
   /// Open (creating if missing) a database file at `path`.
   pub fn open(path: impl AsRef<Path>) -> Result<Self> {
      let path = path.as_ref();
      let path_str = path.to_str().ok_or(Error::InvalidString {
         what: "database path",
      })?;
      Self::open_internal(path_str)
   }

   /// Open a fresh private in-memory database.
   pub fn open_memory() -> Result<Self> {
      Self::open_internal(":memory:")
   }

   /// Open a database file and apply `config` (busy timeout, foreign keys,
   /// requested journal mode) before returning.
   pub fn open_with(path: impl AsRef<Path>, config: &ConnectionConfig) -> Result<Self> {
      let conn = Self::open(path)?;
      conn.apply_config(config)?;
      Ok(conn)
   }

   /// Open an in-memory database and apply `config`.
   pub fn open_memory_with(config: &ConnectionConfig) -> Result<Self> {
      let conn = Self::open_memory()?;
      conn.apply_config(config)?;
      Ok(conn)
   }

   fn open_internal(path: &str) -> Result<Self> {
      let c_path = to_cstring(path, "database path")?;
      let mut db: *mut ffi::sqlite3 = ptr::null_mut();

      let rc = unsafe {
         ffi::sqlite3_open_v2(
            c_path.as_ptr(),
            &mut db,
            ffi::SQLITE_OPEN_READWRITE | ffi::SQLITE_OPEN_CREATE,
            ptr::null(),
         )
      };
      if rc != ffi::SQLITE_OK {
         // SAFETY: on failure db may still point at a half-open connection
         // carrying the error message; read it, then release.
         let err = unsafe { Error::from_engine(db, rc) };
         if !db.is_null() {
            unsafe {
               ffi::sqlite3_close(db);
            }
         }
         return Err(err);
      }

      debug!(path, "opened sqlite connection");
      Ok(Self {
         handle: Arc::new(ConnectionHandle::new(db)),
         _not_sync: PhantomData,
      })
   }

   fn apply_config(&self, config: &ConnectionConfig) -> Result<()> {
      if config.busy_timeout_ms > 0 {
         self.busy_timeout(Duration::from_millis(config.busy_timeout_ms))?;
      }
      self.set_foreign_keys(config.foreign_keys)?;
      if let Some(mode) = config.journal_mode {
         // The engine may adopt a different mode; that is reported through
         // set_journal_mode's return value, which open intentionally ignores.
         self.set_journal_mode(mode)?;
      }
      Ok(())
   }

   /// The shared low-level handle this connection is built on.
   ///
   /// Intended for extension layers (function/hook/module registration)
   /// that need the raw `sqlite3*`; everyday callers never need it.
   pub fn handle(&self) -> &Arc<ConnectionHandle> {
      &self.handle
   }

   /// Mark the connection closed.
   ///
   /// Subsequent operations fail with [`Error::ConnectionClosed`]. The
   /// engine handle itself is released when the last share-owner (this
   /// connection, outstanding statements, blobs, backups, interrupt
   /// handles) drops; `sqlite3_close_v2` semantics defer engine teardown
   /// until then anyway. Calling `close` twice is a no-op.
   pub fn close(&self) -> Result<()> {
      self.handle.mark_closed();
      Ok(())
   }

   /// True once [`close`](Self::close) has been called.
   pub fn is_closed(&self) -> bool {
      self.handle.is_closed()
   }

   /// Run one or more SQL statements, discarding any rows they produce.
   ///
   /// Intended for DDL and for fire-and-forget statements. The engine's
   /// error message is captured and returned on failure.
   pub fn exec_raw(&self, sql: &str) -> Result<()> {
      self.handle.ensure_open()?;
      let c_sql = to_cstring(sql, "sql")?;
      let mut errmsg: *mut std::ffi::c_char = ptr::null_mut();

      // SAFETY: the handle is open; errmsg is either NULL or an
      // engine-allocated string we must free.
      let rc = unsafe {
         ffi::sqlite3_exec(
            self.handle.as_ptr(),
            c_sql.as_ptr(),
            None,
            ptr::null_mut(),
            &mut errmsg,
         )
      };
      if rc != ffi::SQLITE_OK {
         let message = if errmsg.is_null() {
            String::from("SQL execution failed")
         } else {
            let msg = unsafe { CStr::from_ptr(errmsg) }
               .to_string_lossy()
               .into_owned();
            unsafe {
               ffi::sqlite3_free(errmsg as *mut c_void);
            }
            msg
         };
         return Err(Error::Sqlite { code: rc, message });
      }
      Ok(())
   }

   /// Run a one-shot statement with positional parameters and return the
   /// number of rows it changed.
   pub fn execute(&self, sql: &str, params: &[Value]) -> Result<i64> {
      let mut stmt = self.prepare(sql)?;
      stmt.bind_all(params)?;
      while stmt.step()? {}
      Ok(self.changes())
   }

   /// Prepare `sql`, iterate every row into memory, and finalize.
   ///
   /// Rows carry the column descriptors recorded at prepare time, and their
   /// payloads are copied out of the engine, so they outlive the statement.
   pub fn query(&self, sql: &str) -> Result<Vec<Row>> {
      self.query_with(sql, &[])
   }

   /// [`query`](Self::query) with positional parameters.
   pub fn query_with(&self, sql: &str, params: &[Value]) -> Result<Vec<Row>> {
      let mut stmt = self.prepare(sql)?;
      stmt.bind_all(params)?;
      let mut rows = Vec::new();
      while let Some(row) = stmt.next_row()? {
         rows.push(row);
      }
      Ok(rows)
   }

   /// Run a query and return its first row, if any. Further rows are
   /// ignored.
   pub fn query_one(&self, sql: &str) -> Result<Option<Row>> {
      self.query_one_with(sql, &[])
   }

   /// [`query_one`](Self::query_one) with positional parameters.
   pub fn query_one_with(&self, sql: &str, params: &[Value]) -> Result<Option<Row>> {
      let mut stmt = self.prepare(sql)?;
      stmt.bind_all(params)?;
      stmt.next_row()
   }

   /// Rowid assigned by the most recent successful INSERT.
   pub fn last_insert_rowid(&self) -> i64 {
      if self.handle.is_closed() {
         return 0;
      }
      unsafe { ffi::sqlite3_last_insert_rowid(self.handle.as_ptr()) }
   }

   /// Rows changed by the most recent non-trivial statement (a three-row
   /// `VALUES` insert reports 3).
   pub fn changes(&self) -> i64 {
      if self.handle.is_closed() {
         return 0;
      }
      unsafe { ffi::sqlite3_changes64(self.handle.as_ptr()) }
   }

   /// Rows changed since the connection was opened.
   pub fn total_changes(&self) -> i64 {
      if self.handle.is_closed() {
         return 0;
      }
      unsafe { ffi::sqlite3_total_changes64(self.handle.as_ptr()) }
   }

   /// How long the engine waits on a locked database before returning BUSY.
   pub fn busy_timeout(&self, timeout: Duration) -> Result<()> {
      self.handle.ensure_open()?;
      let ms = timeout.as_millis().min(i32::MAX as u128) as i32;
      let rc = unsafe { ffi::sqlite3_busy_timeout(self.handle.as_ptr(), ms) };
      if rc != ffi::SQLITE_OK {
         return Err(self.handle.last_error(rc));
      }
      Ok(())
   }

   /// Ask the engine to abort the in-flight statement at its next safe
   /// point. Callable on this thread; for cross-thread cancellation take an
   /// [`interrupt_handle`](Self::interrupt_handle).
   pub fn interrupt(&self) {
      if self.handle.is_closed() {
         return;
      }
      unsafe {
         ffi::sqlite3_interrupt(self.handle.as_ptr());
      }
   }

   /// True while the engine's interrupt flag is raised.
   pub fn is_interrupted(&self) -> bool {
      if self.handle.is_closed() {
         return false;
      }
      unsafe { ffi::sqlite3_is_interrupted(self.handle.as_ptr()) != 0 }
   }

   /// A cloneable, thread-safe handle that can interrupt this connection
   /// from another thread.
   pub fn interrupt_handle(&self) -> InterruptHandle {
      InterruptHandle::new(Arc::clone(&self.handle))
   }

   /// The engine's current printable error message.
   pub fn last_error_message(&self) -> String {
      if self.handle.is_closed() {
         return String::new();
      }
      let msg = unsafe { ffi::sqlite3_errmsg(self.handle.as_ptr()) };
      if msg.is_null() {
         String::new()
      } else {
         unsafe { CStr::from_ptr(msg) }.to_string_lossy().into_owned()
      }
   }

   /// The engine's current error code.
   pub fn last_error_code(&self) -> i32 {
      if self.handle.is_closed() {
         return 0;
      }
      unsafe { ffi::sqlite3_errcode(self.handle.as_ptr()) }
   }

   /// Serialize the named schema into a byte sequence in the engine's
   /// on-disk format. An empty database yields an empty byte sequence.
   pub fn serialize(&self, schema: &str) -> Result<Vec<u8>> {
      self.handle.ensure_open()?;
      let c_schema = to_cstring(schema, "schema name")?;
      let mut size: ffi::sqlite3_int64 = 0;

      // SAFETY: the handle is open; on success the engine hands us a
      // malloc'd buffer of `size` bytes that we must free.
      let buf = unsafe {
         ffi::sqlite3_serialize(self.handle.as_ptr(), c_schema.as_ptr(), &mut size, 0)
      };
      if buf.is_null() {
         if size <= 0 {
            return Ok(Vec::new());
         }
         return Err(Error::Sqlite {
            code: ffi::SQLITE_NOMEM,
            message: String::from("serialize failed: out of memory"),
         });
      }
      let bytes =
         unsafe { std::slice::from_raw_parts(buf as *const u8, size as usize) }.to_vec();
      unsafe {
         ffi::sqlite3_free(buf as *mut c_void);
      }
      Ok(bytes)
   }

   /// [`serialize`](Self::serialize) of the `main` schema.
   pub fn serialize_main(&self) -> Result<Vec<u8>> {
      self.serialize("main")
   }

   /// Replace this connection's `main` database with the serialized image
   /// in `bytes`.
   ///
   /// The bytes are copied into engine-allocated memory so the engine's
   /// free-on-close semantics apply; the caller's buffer is not retained.
   /// With `read_only` set, subsequent writes fail with the engine's
   /// read-only error.
   pub fn deserialize_into(&self, bytes: &[u8], read_only: bool) -> Result<()> {
      self.handle.ensure_open()?;
      let len = bytes.len();

      // SAFETY: the engine takes ownership of this allocation via
      // FREEONCLOSE, on success and on failure alike.
      let buf = unsafe { ffi::sqlite3_malloc64(len.max(1) as u64) } as *mut u8;
      if buf.is_null() {
         return Err(Error::Sqlite {
            code: ffi::SQLITE_NOMEM,
            message: String::from("deserialize failed: out of memory"),
         });
      }
      unsafe {
         ptr::copy_nonoverlapping(bytes.as_ptr(), buf, len);
      }

      let flags = ffi::SQLITE_DESERIALIZE_FREEONCLOSE
         | if read_only {
            ffi::SQLITE_DESERIALIZE_READONLY
         } else {
            ffi::SQLITE_DESERIALIZE_RESIZEABLE
         };
      let rc = unsafe {
         ffi::sqlite3_deserialize(
            self.handle.as_ptr(),
            c"main".as_ptr(),
            buf,
            len as ffi::sqlite3_int64,
            len as ffi::sqlite3_int64,
            flags as c_uint,
         )
      };
      if rc != ffi::SQLITE_OK {
         return Err(self.handle.last_error(rc));
      }
      debug!(bytes = len, read_only, "deserialized database image");
      Ok(())
   }

   /// Produce a fully independent in-memory copy of this connection's
   /// `main` database.
   pub fn try_clone(&self) -> Result<Connection> {
      let image = self.serialize_main()?;
      let copy = Connection::open_memory()?;
      copy.deserialize_into(&image, false)?;
      Ok(copy)
   }
}

#[cfg(test)]
mod tests {
   use super::*;

   #[test]
   fn test_open_memory_and_exec() {
      let conn = Connection::open_memory().unwrap();
      conn
         .exec_raw("CREATE TABLE t (id INTEGER PRIMARY KEY, v TEXT)")
         .unwrap();
      conn
         .exec_raw("INSERT INTO t (v) VALUES ('a'); INSERT INTO t (v) VALUES ('b')")
         .unwrap();
      assert_eq!(conn.last_insert_rowid(), 2);
      assert_eq!(conn.total_changes(), 2);
   }

   #[test]
   fn test_exec_raw_reports_engine_message() {
      let conn = Connection::open_memory().unwrap();
      let err = conn.exec_raw("NOT VALID SQL").unwrap_err();
      match err {
         Error::Sqlite { code, message } => {
            assert_eq!(code, ffi::SQLITE_ERROR);
            assert!(message.contains("syntax error"), "message: {message}");
         }
         other => panic!("expected engine error, got {other:?}"),
      }
   }

   #[test]
   fn test_closed_connection_errors() {
      let conn = Connection::open_memory().unwrap();
      conn.close().unwrap();
      // Close is idempotent.
      conn.close().unwrap();

      let result = conn.exec_raw("SELECT 1");
      assert!(matches!(result.unwrap_err(), Error::ConnectionClosed));
      assert!(matches!(
         conn.query("SELECT 1").unwrap_err(),
         Error::ConnectionClosed
      ));
      assert_eq!(conn.changes(), 0);
   }

   #[test]
   fn test_changes_reflects_last_statement() {
      let conn = Connection::open_memory().unwrap();
      conn.exec_raw("CREATE TABLE t (v INTEGER)").unwrap();
      conn
         .exec_raw("INSERT INTO t (v) VALUES (1), (2), (3)")
         .unwrap();
      assert_eq!(conn.changes(), 3, "multi-row VALUES insert counts all rows");

      conn.exec_raw("UPDATE t SET v = 0 WHERE v = 1").unwrap();
      assert_eq!(conn.changes(), 1);
      assert_eq!(conn.total_changes(), 4);
   }

   #[test]
   fn test_query_and_query_one() {
      let conn = Connection::open_memory().unwrap();
      conn.exec_raw("CREATE TABLE t (v TEXT)").unwrap();
      conn
         .execute("INSERT INTO t (v) VALUES (?1)", &["alpha".into()])
         .unwrap();
      conn
         .execute("INSERT INTO t (v) VALUES (?1)", &["beta".into()])
         .unwrap();

      let rows = conn.query("SELECT v FROM t ORDER BY v").unwrap();
      assert_eq!(rows.len(), 2);
      assert_eq!(rows[0].get(0), Some(&Value::Text("alpha".into())));

      let first = conn
         .query_one("SELECT v FROM t ORDER BY v")
         .unwrap()
         .expect("one row");
      assert_eq!(first.get(0), Some(&Value::Text("alpha".into())));

      let none = conn.query_one("SELECT v FROM t WHERE v = 'nope'").unwrap();
      assert!(none.is_none());
   }

   #[test]
   fn test_serialize_round_trip() {
      let conn = Connection::open_memory().unwrap();
      conn.exec_raw("CREATE TABLE t (v INTEGER)").unwrap();
      conn.exec_raw("INSERT INTO t VALUES (10), (20)").unwrap();

      let image = conn.serialize_main().unwrap();
      assert!(!image.is_empty());
      // Standard database header magic.
      assert!(image.starts_with(b"SQLite format 3\0"));

      let copy = Connection::open_memory().unwrap();
      copy.deserialize_into(&image, false).unwrap();
      let rows = copy.query("SELECT v FROM t ORDER BY v").unwrap();
      assert_eq!(rows.len(), 2);
      assert_eq!(rows[1].get(0), Some(&Value::Integer(20)));

      // The image survives a second serialize unchanged.
      let image2 = copy.serialize_main().unwrap();
      assert_eq!(image, image2);
   }

   #[test]
   fn test_serialize_empty_database() {
      let conn = Connection::open_memory().unwrap();
      let image = conn.serialize_main().unwrap();
      assert!(image.is_empty());
   }

   #[test]
   fn test_deserialize_read_only_rejects_writes() {
      let source = Connection::open_memory().unwrap();
      source.exec_raw("CREATE TABLE t (v INTEGER)").unwrap();
      source.exec_raw("INSERT INTO t VALUES (1)").unwrap();
      let image = source.serialize_main().unwrap();

      let conn = Connection::open_memory().unwrap();
      conn.deserialize_into(&image, true).unwrap();
      let rows = conn.query("SELECT v FROM t").unwrap();
      assert_eq!(rows.len(), 1);

      let err = conn.exec_raw("INSERT INTO t VALUES (2)").unwrap_err();
      assert!(err.sqlite_code().is_some(), "write should fail: {err:?}");
   }

   #[test]
   fn test_try_clone_is_independent() {
      let conn = Connection::open_memory().unwrap();
      conn.exec_raw("CREATE TABLE t (v INTEGER)").unwrap();
      conn.exec_raw("INSERT INTO t VALUES (1)").unwrap();

      let clone = conn.try_clone().unwrap();
      conn.exec_raw("INSERT INTO t VALUES (2)").unwrap();
      clone.exec_raw("INSERT INTO t VALUES (3)").unwrap();

      let original: Vec<i64> = conn
         .query("SELECT v FROM t ORDER BY v")
         .unwrap()
         .iter()
         .map(|r| r.get(0).unwrap().as_integer().unwrap())
         .collect();
      let cloned: Vec<i64> = clone
         .query("SELECT v FROM t ORDER BY v")
         .unwrap()
         .iter()
         .map(|r| r.get(0).unwrap().as_integer().unwrap())
         .collect();

      assert_eq!(original, vec![1, 2]);
      assert_eq!(cloned, vec![1, 3]);
   }

   #[test]
   fn test_interrupt_flag_visible() {
      let conn = Connection::open_memory().unwrap();
      assert!(!conn.is_interrupted());
      conn.interrupt();
      assert!(conn.is_interrupted());
   }

   #[test]
   fn test_open_with_config() {
      let config = ConnectionConfig {
         busy_timeout_ms: 100,
         foreign_keys: true,
         journal_mode: None,
      };
      let conn = Connection::open_memory_with(&config).unwrap();
      assert!(conn.foreign_keys().unwrap());
   }
}
