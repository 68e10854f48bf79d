//! A mutable in-memory virtual table backed by a row vector.

use std::sync::{Arc, Mutex, PoisonError};

use quartzite_core::{Error, Result, Value};

use crate::vtab::{SchemaColumn, VtabChange, VtabModule};

/// One stored row: its rowid and its column values.
#[derive(Debug, Clone, PartialEq)]
pub struct ArrayRow {
   pub rowid: i64,
   pub values: Vec<Value>,
}

struct TableState {
   rows: Vec<ArrayRow>,
   next_rowid: i64,
}

struct Shared {
   columns: Vec<SchemaColumn>,
   state: Mutex<TableState>,
}

/// A virtual-table module over a mutable in-memory sequence of rows.
///
/// Rows are addressed by auto-incrementing rowids. The handle is cheaply
/// cloneable and stays usable after registration, so rows can be changed
/// both through SQL (INSERT/UPDATE/DELETE on the virtual table) and
/// through the host-side [`insert`](Self::insert) /
/// [`update_row`](Self::update_row) / [`delete_row`](Self::delete_row)
/// API.
///
/// # Example
///
/// ```no_run
/// use quartzite_core::Connection;
/// use quartzite_ext::{ArrayTable, ModuleExt, SchemaColumn};
///
/// # fn example() -> quartzite_core::Result<()> {
/// let conn = Connection::open_memory()?;
/// let table = ArrayTable::new(vec![
///     SchemaColumn::new("id", "INTEGER"),
///     SchemaColumn::new("name", "TEXT"),
/// ]);
/// conn.create_module("people", table.clone())?;
/// conn.exec_raw("CREATE VIRTUAL TABLE people USING people")?;
///
/// table.insert(vec![1.into(), "Alice".into()]);
/// conn.exec_raw("INSERT INTO people (id, name) VALUES (2, 'Bob')")?;
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct ArrayTable {
   shared: Arc<Shared>,
}

impl ArrayTable {
   pub fn new(columns: Vec<SchemaColumn>) -> Self {
      Self {
         shared: Arc::new(Shared {
            columns,
            state: Mutex::new(TableState {
               rows: Vec::new(),
               next_rowid: 1,
            }),
         }),
      }
   }

   fn state(&self) -> std::sync::MutexGuard<'_, TableState> {
      self
         .shared
         .state
         .lock()
         .unwrap_or_else(PoisonError::into_inner)
   }

   /// Append a row, assigning the next rowid, and return it.
   pub fn insert(&self, values: Vec<Value>) -> i64 {
      let mut state = self.state();
      let rowid = state.next_rowid;
      state.next_rowid += 1;
      state.rows.push(ArrayRow { rowid, values });
      rowid
   }

   /// Replace the values of the row with `rowid`. Returns whether a row
   /// matched.
   pub fn update_row(&self, rowid: i64, values: Vec<Value>) -> bool {
      let mut state = self.state();
      match state.rows.iter_mut().find(|r| r.rowid == rowid) {
         Some(row) => {
            row.values = values;
            true
         }
         None => false,
      }
   }

   /// Remove the row with `rowid`. Returns whether a row matched.
   pub fn delete_row(&self, rowid: i64) -> bool {
      let mut state = self.state();
      let before = state.rows.len();
      state.rows.retain(|r| r.rowid != rowid);
      state.rows.len() != before
   }

   /// Snapshot of the current rows, in insertion order.
   pub fn rows(&self) -> Vec<ArrayRow> {
      self.state().rows.clone()
   }

   /// Number of rows currently stored.
   pub fn len(&self) -> usize {
      self.state().rows.len()
   }

   pub fn is_empty(&self) -> bool {
      self.len() == 0
   }

   fn insert_with_rowid(&self, rowid: Option<i64>, values: Vec<Value>) -> Result<i64> {
      let mut state = self.state();
      let rowid = match rowid {
         Some(explicit) => {
            if state.rows.iter().any(|r| r.rowid == explicit) {
               return Err(Error::Sqlite {
                  code: quartzite_core::ffi::SQLITE_CONSTRAINT,
                  message: format!("rowid {explicit} already exists"),
               });
            }
            state.next_rowid = state.next_rowid.max(explicit + 1);
            explicit
         }
         None => {
            let next = state.next_rowid;
            state.next_rowid += 1;
            next
         }
      };
      state.rows.push(ArrayRow { rowid, values });
      Ok(rowid)
   }
}

/// Cursor over a snapshot taken at filter time, so SQL-driven mutations
/// during a scan cannot shift cursor positions.
pub struct ArrayCursor {
   rows: Vec<ArrayRow>,
   pos: usize,
}

impl VtabModule for ArrayTable {
   type Cursor = ArrayCursor;

   fn schema(&self) -> Vec<SchemaColumn> {
      self.shared.columns.clone()
   }

   fn open(&self, _idx_num: i32, _idx_str: Option<&str>, _args: &[Value]) -> Result<ArrayCursor> {
      Ok(ArrayCursor {
         rows: self.rows(),
         pos: 0,
      })
   }

   fn next(&self, cursor: &mut ArrayCursor) -> Result<()> {
      cursor.pos += 1;
      Ok(())
   }

   fn eof(&self, cursor: &ArrayCursor) -> bool {
      cursor.pos >= cursor.rows.len()
   }

   fn column(&self, cursor: &ArrayCursor, idx: usize) -> Result<Value> {
      Ok(cursor
         .rows
         .get(cursor.pos)
         .and_then(|row| row.values.get(idx))
         .cloned()
         .unwrap_or(Value::Null))
   }

   fn rowid(&self, cursor: &ArrayCursor) -> Result<i64> {
      cursor
         .rows
         .get(cursor.pos)
         .map(|row| row.rowid)
         .ok_or(Error::NoCurrentRow)
   }

   fn update(&self, change: VtabChange) -> Result<Option<i64>> {
      match change {
         VtabChange::Insert { rowid, values } => self.insert_with_rowid(rowid, values).map(Some),
         VtabChange::Update {
            rowid,
            new_rowid,
            values,
         } => {
            let mut state = self.state();
            match state.rows.iter_mut().find(|r| r.rowid == rowid) {
               Some(row) => {
                  row.rowid = new_rowid;
                  row.values = values;
                  Ok(None)
               }
               None => Err(Error::Sqlite {
                  code: quartzite_core::ffi::SQLITE_ERROR,
                  message: format!("no row with rowid {rowid}"),
               }),
            }
         }
         VtabChange::Delete { rowid } => {
            self.delete_row(rowid);
            Ok(None)
         }
      }
   }
}
