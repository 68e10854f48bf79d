//! A read-only virtual table over a lazily generated sequence.

use quartzite_core::{Result, Value};

use crate::vtab::{SchemaColumn, VtabModule};

/// A read-only virtual-table module producing rows from an
/// init → has-more → current → advance sequence.
///
/// Each scan seeds a fresh state with `init` and walks it lazily, so
/// unbounded sequences work as long as the query limits what it reads.
/// Rowids auto-increment from 1 per scan unless
/// [`with_rowid`](Self::with_rowid) installs a custom function. Writes
/// fail read-only (the module keeps the default
/// [`VtabModule::update`]).
///
/// # Example
///
/// ```no_run
/// use quartzite_core::{Connection, Value};
/// use quartzite_ext::{Generator, ModuleExt, SchemaColumn};
///
/// # fn example() -> quartzite_core::Result<()> {
/// let conn = Connection::open_memory()?;
/// let squares = Generator::new(
///     vec![SchemaColumn::new("n", "INTEGER"), SchemaColumn::new("sq", "INTEGER")],
///     || 1i64,
///     |n| *n <= 10,
///     |n| vec![Value::Integer(*n), Value::Integer(n * n)],
///     |n| *n += 1,
/// );
/// conn.create_module("squares", squares)?;
/// conn.exec_raw("CREATE VIRTUAL TABLE squares USING squares")?;
/// let rows = conn.query("SELECT sq FROM squares")?;
/// assert_eq!(rows.len(), 10);
/// # Ok(())
/// # }
/// ```
pub struct Generator<S> {
   columns: Vec<SchemaColumn>,
   init: Box<dyn Fn() -> S + Send>,
   has_more: Box<dyn Fn(&S) -> bool + Send>,
   current: Box<dyn Fn(&S) -> Vec<Value> + Send>,
   advance: Box<dyn Fn(&mut S) + Send>,
   rowid: Option<Box<dyn Fn(&S) -> i64 + Send>>,
}

impl<S: Send + 'static> Generator<S> {
   pub fn new(
      columns: Vec<SchemaColumn>,
      init: impl Fn() -> S + Send + 'static,
      has_more: impl Fn(&S) -> bool + Send + 'static,
      current: impl Fn(&S) -> Vec<Value> + Send + 'static,
      advance: impl Fn(&mut S) + Send + 'static,
   ) -> Self {
      Self {
         columns,
         init: Box::new(init),
         has_more: Box::new(has_more),
         current: Box::new(current),
         advance: Box::new(advance),
         rowid: None,
      }
   }

   /// Derive row identifiers from the state instead of auto-assigning.
   pub fn with_rowid(mut self, rowid: impl Fn(&S) -> i64 + Send + 'static) -> Self {
      self.rowid = Some(Box::new(rowid));
      self
   }
}

/// Scan state: the generator state, the auto-assigned row number, and the
/// current row.
///
/// The row is materialized once per cursor position (the engine reads
/// columns one `column` call at a time) and is `None` at end of sequence.
pub struct GeneratorCursor<S> {
   state: S,
   auto_rowid: i64,
   row: Option<Vec<Value>>,
}

impl<S: Send + 'static> Generator<S> {
   fn materialize(&self, state: &S) -> Option<Vec<Value>> {
      if (self.has_more)(state) {
         Some((self.current)(state))
      } else {
         None
      }
   }
}

impl<S: Send + 'static> VtabModule for Generator<S> {
   type Cursor = GeneratorCursor<S>;

   fn schema(&self) -> Vec<SchemaColumn> {
      self.columns.clone()
   }

   fn open(
      &self,
      _idx_num: i32,
      _idx_str: Option<&str>,
      _args: &[Value],
   ) -> Result<GeneratorCursor<S>> {
      let state = (self.init)();
      let row = self.materialize(&state);
      Ok(GeneratorCursor {
         state,
         auto_rowid: 1,
         row,
      })
   }

   fn next(&self, cursor: &mut GeneratorCursor<S>) -> Result<()> {
      (self.advance)(&mut cursor.state);
      cursor.auto_rowid += 1;
      cursor.row = self.materialize(&cursor.state);
      Ok(())
   }

   fn eof(&self, cursor: &GeneratorCursor<S>) -> bool {
      cursor.row.is_none()
   }

   fn column(&self, cursor: &GeneratorCursor<S>, idx: usize) -> Result<Value> {
      Ok(cursor
         .row
         .as_ref()
         .and_then(|row| row.get(idx))
         .cloned()
         .unwrap_or(Value::Null))
   }

   fn rowid(&self, cursor: &GeneratorCursor<S>) -> Result<i64> {
      Ok(match &self.rowid {
         Some(f) => f(&cursor.state),
         None => cursor.auto_rowid,
      })
   }
}

#[cfg(test)]
mod tests {
   use super::*;

   fn counting_generator(limit: i64) -> Generator<i64> {
      Generator::new(
         vec![SchemaColumn::new("n", "INTEGER")],
         move || 1i64,
         move |n| *n <= limit,
         |n| vec![Value::Integer(*n)],
         |n| *n += 1,
      )
   }

   #[test]
   fn test_sequence_walk() {
      let generator = counting_generator(3);
      let mut cursor = generator.open(0, None, &[]).unwrap();

      let mut seen = Vec::new();
      while !generator.eof(&cursor) {
         seen.push((
            generator.rowid(&cursor).unwrap(),
            generator.column(&cursor, 0).unwrap(),
         ));
         generator.next(&mut cursor).unwrap();
      }

      assert_eq!(
         seen,
         vec![
            (1, Value::Integer(1)),
            (2, Value::Integer(2)),
            (3, Value::Integer(3)),
         ]
      );
   }

   #[test]
   fn test_each_scan_reinitializes_state() {
      let generator = counting_generator(2);
      let mut first = generator.open(0, None, &[]).unwrap();
      while !generator.eof(&first) {
         generator.next(&mut first).unwrap();
      }
      // A second cursor starts from init again.
      let second = generator.open(0, None, &[]).unwrap();
      assert!(!generator.eof(&second));
      assert_eq!(generator.column(&second, 0).unwrap(), Value::Integer(1));
   }

   #[test]
   fn test_custom_rowid_overrides_auto() {
      let generator = counting_generator(3).with_rowid(|n| n * 100);
      let cursor = generator.open(0, None, &[]).unwrap();
      assert_eq!(generator.rowid(&cursor).unwrap(), 100);
   }

   #[test]
   fn test_missing_column_reads_null() {
      let generator = counting_generator(1);
      let cursor = generator.open(0, None, &[]).unwrap();
      assert_eq!(generator.column(&cursor, 5).unwrap(), Value::Null);
   }

   #[test]
   fn test_writes_are_rejected() {
      use crate::vtab::VtabChange;
      let generator = counting_generator(1);
      let err = generator
         .update(VtabChange::Delete { rowid: 1 })
         .unwrap_err();
      assert!(matches!(err, quartzite_core::Error::ReadOnly));
   }
}
