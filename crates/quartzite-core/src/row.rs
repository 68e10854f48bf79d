//! Rows and column descriptors produced by the statement engine.

use std::sync::Arc;

use indexmap::IndexMap;

use crate::error::{Error, Result};
use crate::types::FromSql;
use crate::value::Value;

/// Origin metadata for a result column.
///
/// All fields are absent for expression and literal columns; columns sourced
/// directly from a base table carry the database, table, and original column
/// name as reported by the engine's column-metadata entry points.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ColumnMetadata {
   database: Option<String>,
   table: Option<String>,
   origin: Option<String>,
}

impl ColumnMetadata {
   pub(crate) fn new(
      database: Option<String>,
      table: Option<String>,
      origin: Option<String>,
   ) -> Self {
      Self {
         database,
         table,
         origin,
      }
   }

   /// Database name (`main`, `temp`, or an attached schema).
   pub fn database(&self) -> Option<&str> {
      self.database.as_deref()
   }

   /// Source table name.
   pub fn table(&self) -> Option<&str> {
      self.table.as_deref()
   }

   /// Column name in the source table (before any `AS` alias).
   pub fn origin(&self) -> Option<&str> {
      self.origin.as_deref()
   }
}

/// Descriptor of one result column, captured at prepare time.
#[derive(Debug, Clone)]
pub struct Column {
   name: String,
   decl_type: Option<String>,
   metadata: ColumnMetadata,
}

impl Column {
   pub(crate) fn new(name: String, decl_type: Option<String>, metadata: ColumnMetadata) -> Self {
      Self {
         name,
         decl_type,
         metadata,
      }
   }

   /// Column name exactly as the engine reported it (case preserved).
   pub fn name(&self) -> &str {
      &self.name
   }

   /// Declared type from the table definition, if any.
   pub fn decl_type(&self) -> Option<&str> {
      self.decl_type.as_deref()
   }

   /// Origin metadata (absent for expression columns).
   pub fn metadata(&self) -> &ColumnMetadata {
      &self.metadata
   }
}

/// One materialized result row.
///
/// The row owns copies of its cell payloads, so it remains valid after the
/// producing statement is reset or finalized. Column descriptors are shared
/// with the statement that produced the row.
#[derive(Debug, Clone)]
pub struct Row {
   values: Vec<Value>,
   columns: Arc<Vec<Column>>,
}

impl Row {
   pub(crate) fn new(values: Vec<Value>, columns: Arc<Vec<Column>>) -> Self {
      Self { values, columns }
   }

   /// Number of columns.
   pub fn len(&self) -> usize {
      self.values.len()
   }

   /// True for zero-column rows.
   pub fn is_empty(&self) -> bool {
      self.values.is_empty()
   }

   /// Cell at `idx`, or `None` when the index is out of range.
   pub fn get(&self, idx: usize) -> Option<&Value> {
      self.values.get(idx)
   }

   /// Cell under the named column. Lookup is ASCII case-insensitive; the
   /// first matching column wins.
   pub fn get_by_name(&self, name: &str) -> Option<&Value> {
      self.column_index(name).and_then(|idx| self.values.get(idx))
   }

   /// Index of the named column (ASCII case-insensitive).
   pub fn column_index(&self, name: &str) -> Option<usize> {
      self
         .columns
         .iter()
         .position(|c| c.name().eq_ignore_ascii_case(name))
   }

   /// Typed extraction of the cell at `idx`.
   ///
   /// NULL in a non-optional target fails with
   /// [`Error::UnexpectedNull`](crate::Error::UnexpectedNull) carrying the
   /// column name; a stored type the target cannot represent fails with
   /// [`Error::TypeMismatch`](crate::Error::TypeMismatch).
   pub fn get_as<T: FromSql>(&self, idx: usize) -> Result<T> {
      let value = self
         .values
         .get(idx)
         .ok_or_else(|| Error::ColumnNotFound(format!("index {idx}")))?;
      let name = self
         .columns
         .get(idx)
         .map(|c| c.name())
         .unwrap_or_default()
         .to_string();
      T::from_sql(value).map_err(|e| e.for_column(&name))
   }

   /// Typed extraction of the cell under the named column.
   pub fn get_by_name_as<T: FromSql>(&self, name: &str) -> Result<T> {
      let idx = self
         .column_index(name)
         .ok_or_else(|| Error::ColumnNotFound(name.to_string()))?;
      self.get_as(idx)
   }

   /// Name of column `idx`.
   pub fn column_name(&self, idx: usize) -> Option<&str> {
      self.columns.get(idx).map(|c| c.name())
   }

   /// All column names, in result order.
   pub fn column_names(&self) -> Vec<&str> {
      self.columns.iter().map(|c| c.name()).collect()
   }

   /// The column descriptors for this row.
   pub fn columns(&self) -> &[Column] {
      &self.columns
   }

   /// The cells of this row, in column order.
   pub fn values(&self) -> &[Value] {
      &self.values
   }

   /// Convert into an ordered name → value map.
   ///
   /// Column order is preserved. If two columns share a name, the later one
   /// wins, matching map-insertion semantics.
   pub fn into_map(self) -> IndexMap<String, Value> {
      let mut map = IndexMap::with_capacity(self.values.len());
      for (column, value) in self.columns.iter().zip(self.values) {
         map.insert(column.name().to_string(), value);
      }
      map
   }
}

#[cfg(test)]
mod tests {
   use super::*;

   fn sample_row() -> Row {
      let columns = Arc::new(vec![
         Column::new("Id".into(), Some("INTEGER".into()), ColumnMetadata::default()),
         Column::new("Name".into(), Some("TEXT".into()), ColumnMetadata::default()),
         Column::new("payload".into(), None, ColumnMetadata::default()),
      ]);
      Row::new(
         vec![
            Value::Integer(7),
            Value::Text("ada".into()),
            Value::Null,
         ],
         columns,
      )
   }

   #[test]
   fn test_index_access() {
      let row = sample_row();
      assert_eq!(row.len(), 3);
      assert_eq!(row.get(0), Some(&Value::Integer(7)));
      assert_eq!(row.get(3), None);
   }

   #[test]
   fn test_name_lookup_is_case_insensitive() {
      let row = sample_row();
      assert_eq!(row.get_by_name("id"), Some(&Value::Integer(7)));
      assert_eq!(row.get_by_name("NAME"), Some(&Value::Text("ada".into())));
      assert_eq!(row.get_by_name("PayLoad"), Some(&Value::Null));
      assert_eq!(row.get_by_name("missing"), None);
      // Case is preserved on the descriptor itself.
      assert_eq!(row.column_name(0), Some("Id"));
   }

   #[test]
   fn test_typed_extraction() {
      let row = sample_row();
      assert_eq!(row.get_as::<i64>(0).unwrap(), 7);
      assert_eq!(row.get_by_name_as::<String>("name").unwrap(), "ada");
      assert_eq!(row.get_as::<Option<i64>>(2).unwrap(), None);
   }

   #[test]
   fn test_null_into_required_type_names_the_column() {
      let row = sample_row();
      let err = row.get_as::<i64>(2).unwrap_err();
      assert!(
         matches!(err, Error::UnexpectedNull { ref column } if column == "payload"),
         "got {err:?}"
      );
   }

   #[test]
   fn test_type_mismatch_reports_both_names() {
      let row = sample_row();
      let err = row.get_as::<i64>(1).unwrap_err();
      match err {
         Error::TypeMismatch { expected, actual } => {
            assert_eq!(expected, "integer");
            assert_eq!(actual, "text");
         }
         other => panic!("expected TypeMismatch, got {other:?}"),
      }
   }

   #[test]
   fn test_missing_column_errors() {
      let row = sample_row();
      assert!(matches!(
         row.get_as::<i64>(9).unwrap_err(),
         Error::ColumnNotFound(_)
      ));
      assert!(matches!(
         row.get_by_name_as::<i64>("ghost").unwrap_err(),
         Error::ColumnNotFound(_)
      ));
   }

   #[test]
   fn test_into_map_preserves_order() {
      let map = sample_row().into_map();
      let keys: Vec<&str> = map.keys().map(String::as_str).collect();
      assert_eq!(keys, vec!["Id", "Name", "payload"]);
      assert_eq!(map["Name"], Value::Text("ada".into()));
   }
}
