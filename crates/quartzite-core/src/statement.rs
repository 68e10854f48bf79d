//! Prepared statements: binding, stepping, and row extraction.
//!
//! A statement is a small state machine. It starts idle, moves to
//! row-available/done as it is stepped, returns to idle on reset, and any
//! step failure poisons it so that only finalize remains legal.

use std::ffi::{CStr, c_char, c_int};
use std::sync::Arc;

use libsqlite3_sys as ffi;

use crate::connection::{Connection, to_cstring};
use crate::error::{Error, Result};
use crate::handle::StatementHandle;
use crate::row::{Column, ColumnMetadata, Row};
use crate::types::{FromSql, ToSql};
use crate::value::Value;

/// Cursor position of a prepared statement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
   /// Prepared (or reset); no row is current.
   Idle,
   /// The last step produced a row that can be read.
   Row,
   /// The last step reached the end of results.
   Done,
   /// A step failed; only finalize is permitted.
   Poisoned,
}

/// Read an optional engine-owned C string into host memory.
unsafe fn opt_text(ptr: *const c_char) -> Option<String> {
   if ptr.is_null() {
      None
   } else {
      // SAFETY: the engine hands out NUL-terminated strings valid until the
      // next call on the same statement; we copy immediately.
      Some(unsafe { CStr::from_ptr(ptr) }.to_string_lossy().into_owned())
   }
}

impl Connection {
   /// Compile `sql` into a prepared [`Statement`].
   ///
   /// Column descriptors (names, declared types, origin metadata) are
   /// recorded once at prepare time and shared by every [`Row`] the
   /// statement later produces.
   pub fn prepare(&self, sql: &str) -> Result<Statement> {
      self.handle().ensure_open()?;
      let c_sql = to_cstring(sql, "sql")?;
      let mut stmt: *mut ffi::sqlite3_stmt = std::ptr::null_mut();

      // SAFETY: the connection is open; the engine copies the SQL text.
      let rc = unsafe {
         ffi::sqlite3_prepare_v2(
            self.handle().as_ptr(),
            c_sql.as_ptr(),
            -1,
            &mut stmt,
            std::ptr::null_mut(),
         )
      };
      if rc != ffi::SQLITE_OK {
         return Err(self.handle().last_error(rc));
      }
      if stmt.is_null() {
         // Whitespace or comments only: nothing was compiled.
         return Err(Error::Sqlite {
            code: ffi::SQLITE_ERROR,
            message: String::from("input contains no SQL statement"),
         });
      }

      // SAFETY: stmt is a freshly prepared statement.
      let count = unsafe { ffi::sqlite3_column_count(stmt) };
      let mut columns = Vec::with_capacity(count as usize);
      for idx in 0..count {
         let name = unsafe { opt_text(ffi::sqlite3_column_name(stmt, idx)) }.unwrap_or_default();
         let decl_type = unsafe { opt_text(ffi::sqlite3_column_decltype(stmt, idx)) };
         // The metadata entry points return NULL for expression and literal
         // columns; only base-table columns carry origin information.
         let metadata = ColumnMetadata::new(
            unsafe { opt_text(ffi::sqlite3_column_database_name(stmt, idx)) },
            unsafe { opt_text(ffi::sqlite3_column_table_name(stmt, idx)) },
            unsafe { opt_text(ffi::sqlite3_column_origin_name(stmt, idx)) },
         );
         columns.push(Column::new(name, decl_type, metadata));
      }

      Ok(Statement {
         handle: StatementHandle::new(stmt, Arc::clone(self.handle())),
         columns: Arc::new(columns),
         state: State::Idle,
      })
   }
}

/// A compiled SQL statement with bound parameters and a row cursor.
///
/// Bindings survive [`reset`](Self::reset);
/// [`clear_bindings`](Self::clear_bindings) explicitly zeroes them.
/// Finalization is idempotent and also happens on drop.
///
/// # Example
///
/// ```no_run
/// use quartzite_core::Connection;
///
/// # fn example() -> quartzite_core::Result<()> {
/// let conn = Connection::open_memory()?;
/// conn.exec_raw("CREATE TABLE t (a INTEGER, b TEXT)")?;
///
/// let mut stmt = conn.prepare("INSERT INTO t (a, b) VALUES (:a, :b)")?;
/// stmt.bind_all_named(&[(":a", 1.into()), (":b", "one".into())])?;
/// while stmt.step()? {}
/// # Ok(())
/// # }
/// ```
pub struct Statement {
   handle: StatementHandle,
   columns: Arc<Vec<Column>>,
   state: State,
}

impl Statement {
   fn ensure_usable(&self) -> Result<()> {
      if self.handle.is_finalized() {
         return Err(Error::HandleClosed("statement"));
      }
      self.handle.conn().ensure_open()
   }

   fn bind_rc(&self, idx: usize, rc: c_int) -> Result<()> {
      if rc != ffi::SQLITE_OK {
         return Err(Error::Bind {
            reason: format!(
               "binding parameter {idx} failed: {}",
               self.handle.conn().last_error(rc)
            ),
         });
      }
      Ok(())
   }

   /// Bind SQL NULL to the one-based parameter `idx`.
   pub fn bind_null(&mut self, idx: usize) -> Result<()> {
      self.bind_value(idx, &Value::Null)
   }

   /// Bind a 64-bit integer to the one-based parameter `idx`.
   pub fn bind_int(&mut self, idx: usize, value: i64) -> Result<()> {
      self.bind_value(idx, &Value::Integer(value))
   }

   /// Bind a float to the one-based parameter `idx`.
   pub fn bind_double(&mut self, idx: usize, value: f64) -> Result<()> {
      self.bind_value(idx, &Value::Real(value))
   }

   /// Bind text to the one-based parameter `idx`.
   pub fn bind_text(&mut self, idx: usize, value: &str) -> Result<()> {
      self.bind_value(idx, &Value::Text(value.to_string()))
   }

   /// Bind a blob to the one-based parameter `idx`.
   pub fn bind_blob(&mut self, idx: usize, value: &[u8]) -> Result<()> {
      self.bind_value(idx, &Value::Blob(value.to_vec()))
   }

   /// Bind a [`Value`], dispatching on its variant.
   pub fn bind_value(&mut self, idx: usize, value: &Value) -> Result<()> {
      self.ensure_usable()?;
      // SAFETY: the statement is live; the value's payload goes through the
      // transient pathway so the engine owns its own copy.
      let rc = unsafe { value.bind_to_statement(self.handle.as_ptr(), idx as c_int) };
      self.bind_rc(idx, rc)
   }

   /// Bind any [`ToSql`] host value.
   pub fn bind<T: ToSql>(&mut self, idx: usize, value: T) -> Result<()> {
      let value = value.to_sql()?;
      self.bind_value(idx, &value)
   }

   /// Resolve a named parameter (`:name`, `@name`, or `$name`, sigil
   /// included) to its one-based index.
   pub fn parameter_index(&self, name: &str) -> Result<usize> {
      self.ensure_usable()?;
      let c_name = to_cstring(name, "parameter name")?;
      // SAFETY: the statement is live.
      let idx =
         unsafe { ffi::sqlite3_bind_parameter_index(self.handle.as_ptr(), c_name.as_ptr()) };
      if idx == 0 {
         return Err(Error::Bind {
            reason: format!("unknown parameter name: {name}"),
         });
      }
      Ok(idx as usize)
   }

   /// Number of parameters in the statement.
   pub fn parameter_count(&self) -> usize {
      if self.handle.is_finalized() {
         return 0;
      }
      // SAFETY: the statement is live.
      unsafe { ffi::sqlite3_bind_parameter_count(self.handle.as_ptr()) as usize }
   }

   /// Bind `values` to parameters 1..=len by position.
   pub fn bind_all(&mut self, values: &[Value]) -> Result<()> {
      for (i, value) in values.iter().enumerate() {
         self.bind_value(i + 1, value)?;
      }
      Ok(())
   }

   /// Bind a set of (name, value) pairs by parameter name.
   pub fn bind_all_named(&mut self, pairs: &[(&str, Value)]) -> Result<()> {
      for (name, value) in pairs {
         let idx = self.parameter_index(name)?;
         self.bind_value(idx, value)?;
      }
      Ok(())
   }

   /// Reset every binding to NULL.
   pub fn clear_bindings(&mut self) -> Result<()> {
      self.ensure_usable()?;
      // SAFETY: the statement is live; clear_bindings cannot fail.
      unsafe {
         ffi::sqlite3_clear_bindings(self.handle.as_ptr());
      }
      Ok(())
   }

   /// Advance the cursor. Returns `true` while a row is available and
   /// `false` once the statement is done.
   ///
   /// A step failure poisons the statement: every later operation except
   /// [`finalize`](Self::finalize) fails with
   /// [`Error::StatementPoisoned`](crate::Error::StatementPoisoned).
   pub fn step(&mut self) -> Result<bool> {
      self.ensure_usable()?;
      match self.state {
         State::Poisoned => return Err(Error::StatementPoisoned),
         // Stepping past completion stays done; reset is the only way back.
         State::Done => return Ok(false),
         State::Idle | State::Row => {}
      }

      // SAFETY: the statement is live and not finalized.
      let rc = unsafe { ffi::sqlite3_step(self.handle.as_ptr()) };
      match rc {
         ffi::SQLITE_ROW => {
            self.state = State::Row;
            Ok(true)
         }
         ffi::SQLITE_DONE => {
            self.state = State::Done;
            Ok(false)
         }
         code => {
            self.state = State::Poisoned;
            Err(self.handle.conn().last_error(code))
         }
      }
   }

   /// Step and copy the current row out of the engine, or `None` once the
   /// statement is done.
   pub fn next_row(&mut self) -> Result<Option<Row>> {
      if !self.step()? {
         return Ok(None);
      }
      let count = self.columns.len();
      let mut values = Vec::with_capacity(count);
      for idx in 0..count {
         // SAFETY: a row is current and idx is within the column count.
         values.push(unsafe { Value::from_column(self.handle.as_ptr(), idx as c_int) });
      }
      Ok(Some(Row::new(values, Arc::clone(&self.columns))))
   }

   /// Read one cell of the current row.
   pub fn column_value(&self, idx: usize) -> Result<Value> {
      self.ensure_usable()?;
      if self.state != State::Row {
         return Err(Error::NoCurrentRow);
      }
      if idx >= self.columns.len() {
         return Err(Error::ColumnNotFound(format!("index {idx}")));
      }
      // SAFETY: a row is current and idx is within the column count.
      Ok(unsafe { Value::from_column(self.handle.as_ptr(), idx as c_int) })
   }

   /// Read one cell of the current row as a typed host value.
   pub fn column_get<T: FromSql>(&self, idx: usize) -> Result<T> {
      let value = self.column_value(idx)?;
      let name = self.column_name(idx).unwrap_or_default().to_string();
      T::from_sql(&value).map_err(|e| e.for_column(&name))
   }

   /// Number of result columns.
   pub fn column_count(&self) -> usize {
      self.columns.len()
   }

   /// Name of column `idx`, as reported at prepare time.
   pub fn column_name(&self, idx: usize) -> Option<&str> {
      self.columns.get(idx).map(|c| c.name())
   }

   /// The column descriptors recorded at prepare time.
   pub fn columns(&self) -> &[Column] {
      &self.columns
   }

   /// Origin metadata for column `idx` (absent for expression columns).
   pub fn column_metadata(&self, idx: usize) -> Option<&ColumnMetadata> {
      self.columns.get(idx).map(|c| c.metadata())
   }

   /// Return the cursor to idle. Bindings are retained.
   pub fn reset(&mut self) -> Result<()> {
      self.ensure_usable()?;
      if self.state == State::Poisoned {
         return Err(Error::StatementPoisoned);
      }
      // SAFETY: the statement is live.
      let rc = unsafe { ffi::sqlite3_reset(self.handle.as_ptr()) };
      if rc != ffi::SQLITE_OK {
         self.state = State::Poisoned;
         return Err(self.handle.conn().last_error(rc));
      }
      self.state = State::Idle;
      Ok(())
   }

   /// The SQL text this statement was compiled from.
   pub fn sql(&self) -> String {
      if self.handle.is_finalized() {
         return String::new();
      }
      // SAFETY: the statement is live.
      unsafe { opt_text(ffi::sqlite3_sql(self.handle.as_ptr())) }.unwrap_or_default()
   }

   /// Release the engine-side statement now rather than at drop.
   ///
   /// Idempotent through the handle: finalizing an already-finalized
   /// statement succeeds. This is the only operation legal on a poisoned
   /// statement.
   pub fn finalize(mut self) -> Result<()> {
      self.handle.finalize()
   }
}
