//! The tagged SQLite value union and its marshalling to and from the engine.
//!
//! Every engine-side `sqlite3_value` maps to exactly one [`Value`] variant.
//! Text and blob payloads are copied out of engine-owned buffers (length
//! taken from the engine, so embedded zero bytes survive) and copied back in
//! through the transient pathway, never aliased into host memory.

use std::ffi::{c_char, c_int};

use libsqlite3_sys as ffi;

/// A single SQLite value.
///
/// Covers the engine's five storage classes. Integers are 64-bit signed,
/// reals are IEEE-754 binary64, text is UTF-8, blobs are arbitrary bytes
/// (zero-length blobs are preserved as blobs, not collapsed to NULL).
#[derive(Debug, Clone)]
pub enum Value {
   Null,
   Integer(i64),
   Real(f64),
   Text(String),
   Blob(Vec<u8>),
}

impl PartialEq for Value {
   fn eq(&self, other: &Self) -> bool {
      match (self, other) {
         (Value::Null, Value::Null) => true,
         (Value::Integer(a), Value::Integer(b)) => a == b,
         // Two NaNs compare equal so round-tripped values stay comparable.
         (Value::Real(a), Value::Real(b)) => a == b || (a.is_nan() && b.is_nan()),
         (Value::Text(a), Value::Text(b)) => a == b,
         (Value::Blob(a), Value::Blob(b)) => a == b,
         _ => false,
      }
   }
}

impl Value {
   /// Returns true if this value is NULL.
   pub fn is_null(&self) -> bool {
      matches!(self, Value::Null)
   }

   /// Attempts to get this value as an integer.
   pub fn as_integer(&self) -> Option<i64> {
      match self {
         Value::Integer(i) => Some(*i),
         _ => None,
      }
   }

   /// Attempts to get this value as a float.
   pub fn as_real(&self) -> Option<f64> {
      match self {
         Value::Real(r) => Some(*r),
         _ => None,
      }
   }

   /// Attempts to get this value as a string reference.
   pub fn as_text(&self) -> Option<&str> {
      match self {
         Value::Text(s) => Some(s),
         _ => None,
      }
   }

   /// Attempts to get this value as a blob reference.
   pub fn as_blob(&self) -> Option<&[u8]> {
      match self {
         Value::Blob(b) => Some(b),
         _ => None,
      }
   }

   /// The storage-class name, used in type-mismatch diagnostics.
   pub fn type_name(&self) -> &'static str {
      match self {
         Value::Null => "null",
         Value::Integer(_) => "integer",
         Value::Real(_) => "real",
         Value::Text(_) => "text",
         Value::Blob(_) => "blob",
      }
   }

   /// Extracts a value from a raw `sqlite3_value` pointer.
   ///
   /// Text and blob payloads are read with the pointer *and* the byte count
   /// from the engine, so embedded zero bytes are preserved, then copied into
   /// host-owned storage.
   ///
   /// # Safety
   ///
   /// The pointer must be valid for the duration of the call (SQLite
   /// guarantees this inside function and hook callbacks).
   pub unsafe fn from_raw(value: *mut ffi::sqlite3_value) -> Self {
      if value.is_null() {
         return Value::Null;
      }

      // SAFETY: value is non-null and valid for the duration of the callback
      // that handed it to us.
      match unsafe { ffi::sqlite3_value_type(value) } {
         ffi::SQLITE_NULL => Value::Null,
         ffi::SQLITE_INTEGER => Value::Integer(unsafe { ffi::sqlite3_value_int64(value) }),
         ffi::SQLITE_FLOAT => Value::Real(unsafe { ffi::sqlite3_value_double(value) }),
         ffi::SQLITE_TEXT => {
            let text = unsafe { ffi::sqlite3_value_text(value) };
            let len = unsafe { ffi::sqlite3_value_bytes(value) } as usize;
            if text.is_null() {
               Value::Null
            } else {
               // SAFETY: the engine guarantees len readable bytes at text.
               let bytes = unsafe { std::slice::from_raw_parts(text, len) };
               Value::Text(String::from_utf8_lossy(bytes).into_owned())
            }
         }
         ffi::SQLITE_BLOB => {
            let blob = unsafe { ffi::sqlite3_value_blob(value) };
            let len = unsafe { ffi::sqlite3_value_bytes(value) } as usize;
            if blob.is_null() || len == 0 {
               Value::Blob(Vec::new())
            } else {
               // SAFETY: the engine guarantees len readable bytes at blob.
               let bytes = unsafe { std::slice::from_raw_parts(blob as *const u8, len) };
               Value::Blob(bytes.to_vec())
            }
         }
         _ => Value::Null,
      }
   }

   /// Reads column `idx` of the statement's current row by its engine type
   /// tag, copying the payload out of the engine-owned buffer.
   ///
   /// # Safety
   ///
   /// `stmt` must be a valid prepared statement positioned on a row, and
   /// `idx` must be a valid zero-based column index.
   pub(crate) unsafe fn from_column(stmt: *mut ffi::sqlite3_stmt, idx: c_int) -> Self {
      // SAFETY: stmt is valid and positioned on a row per the caller contract.
      match unsafe { ffi::sqlite3_column_type(stmt, idx) } {
         ffi::SQLITE_NULL => Value::Null,
         ffi::SQLITE_INTEGER => Value::Integer(unsafe { ffi::sqlite3_column_int64(stmt, idx) }),
         ffi::SQLITE_FLOAT => Value::Real(unsafe { ffi::sqlite3_column_double(stmt, idx) }),
         ffi::SQLITE_TEXT => {
            let text = unsafe { ffi::sqlite3_column_text(stmt, idx) };
            let len = unsafe { ffi::sqlite3_column_bytes(stmt, idx) } as usize;
            if text.is_null() {
               Value::Null
            } else {
               let bytes = unsafe { std::slice::from_raw_parts(text, len) };
               Value::Text(String::from_utf8_lossy(bytes).into_owned())
            }
         }
         ffi::SQLITE_BLOB => {
            let blob = unsafe { ffi::sqlite3_column_blob(stmt, idx) };
            let len = unsafe { ffi::sqlite3_column_bytes(stmt, idx) } as usize;
            if blob.is_null() || len == 0 {
               Value::Blob(Vec::new())
            } else {
               let bytes = unsafe { std::slice::from_raw_parts(blob as *const u8, len) };
               Value::Blob(bytes.to_vec())
            }
         }
         _ => Value::Null,
      }
   }

   /// Writes this value into a function result slot via the matching
   /// `sqlite3_result_*` setter. Byte payloads go through the transient
   /// pathway so the engine makes its own copy.
   ///
   /// # Safety
   ///
   /// `ctx` must be the context pointer of a function callback that is
   /// currently executing.
   pub unsafe fn apply_to_context(&self, ctx: *mut ffi::sqlite3_context) {
      // SAFETY: ctx is a live callback context per the caller contract.
      unsafe {
         match self {
            Value::Null => ffi::sqlite3_result_null(ctx),
            Value::Integer(i) => ffi::sqlite3_result_int64(ctx, *i),
            Value::Real(r) => ffi::sqlite3_result_double(ctx, *r),
            Value::Text(s) => ffi::sqlite3_result_text(
               ctx,
               s.as_ptr() as *const c_char,
               s.len() as c_int,
               ffi::SQLITE_TRANSIENT(),
            ),
            Value::Blob(b) if b.is_empty() => ffi::sqlite3_result_zeroblob(ctx, 0),
            Value::Blob(b) => ffi::sqlite3_result_blob(
               ctx,
               b.as_ptr() as *const std::ffi::c_void,
               b.len() as c_int,
               ffi::SQLITE_TRANSIENT(),
            ),
         }
      }
   }

   /// Binds this value to parameter `idx` (one-based) via the matching
   /// `sqlite3_bind_*` setter, returning the engine's result code.
   ///
   /// An empty blob binds through `sqlite3_bind_zeroblob`; binding a NULL
   /// pointer with length zero would collapse it to SQL NULL.
   ///
   /// # Safety
   ///
   /// `stmt` must be a valid prepared statement.
   pub(crate) unsafe fn bind_to_statement(&self, stmt: *mut ffi::sqlite3_stmt, idx: c_int) -> c_int {
      // SAFETY: stmt is a valid prepared statement per the caller contract.
      unsafe {
         match self {
            Value::Null => ffi::sqlite3_bind_null(stmt, idx),
            Value::Integer(i) => ffi::sqlite3_bind_int64(stmt, idx, *i),
            Value::Real(r) => ffi::sqlite3_bind_double(stmt, idx, *r),
            Value::Text(s) => ffi::sqlite3_bind_text(
               stmt,
               idx,
               s.as_ptr() as *const c_char,
               s.len() as c_int,
               ffi::SQLITE_TRANSIENT(),
            ),
            Value::Blob(b) if b.is_empty() => ffi::sqlite3_bind_zeroblob(stmt, idx, 0),
            Value::Blob(b) => ffi::sqlite3_bind_blob(
               stmt,
               idx,
               b.as_ptr() as *const std::ffi::c_void,
               b.len() as c_int,
               ffi::SQLITE_TRANSIENT(),
            ),
         }
      }
   }
}

impl From<i32> for Value {
   fn from(v: i32) -> Self {
      Value::Integer(v as i64)
   }
}

impl From<i64> for Value {
   fn from(v: i64) -> Self {
      Value::Integer(v)
   }
}

impl From<f64> for Value {
   fn from(v: f64) -> Self {
      Value::Real(v)
   }
}

impl From<&str> for Value {
   fn from(v: &str) -> Self {
      Value::Text(v.to_string())
   }
}

impl From<String> for Value {
   fn from(v: String) -> Self {
      Value::Text(v)
   }
}

impl From<&[u8]> for Value {
   fn from(v: &[u8]) -> Self {
      Value::Blob(v.to_vec())
   }
}

impl From<Vec<u8>> for Value {
   fn from(v: Vec<u8>) -> Self {
      Value::Blob(v)
   }
}

impl From<bool> for Value {
   fn from(v: bool) -> Self {
      Value::Integer(v as i64)
   }
}

impl<T: Into<Value>> From<Option<T>> for Value {
   fn from(v: Option<T>) -> Self {
      match v {
         Some(inner) => inner.into(),
         None => Value::Null,
      }
   }
}

#[cfg(test)]
mod tests {
   use super::*;

   #[test]
   fn test_value_from_null_pointer() {
      let value = unsafe { Value::from_raw(std::ptr::null_mut()) };
      assert_eq!(value, Value::Null);
   }

   #[test]
   fn test_equality_per_variant() {
      assert_eq!(Value::Null, Value::Null);
      assert_eq!(Value::Integer(42), Value::Integer(42));
      assert_ne!(Value::Integer(42), Value::Integer(43));
      assert_eq!(Value::Text("a".into()), Value::Text("a".into()));
      assert_eq!(Value::Blob(vec![0, 1]), Value::Blob(vec![0, 1]));
      assert_ne!(Value::Integer(0), Value::Null);
      // Integer and real never compare equal, even for the same number.
      assert_ne!(Value::Integer(1), Value::Real(1.0));
   }

   #[test]
   fn test_nan_reals_compare_equal() {
      assert_eq!(Value::Real(f64::NAN), Value::Real(f64::NAN));
      assert_ne!(Value::Real(f64::NAN), Value::Real(0.0));
      assert_eq!(Value::Real(1.5), Value::Real(1.5));
   }

   #[test]
   fn test_accessors() {
      assert!(Value::Null.is_null());
      assert_eq!(Value::Integer(7).as_integer(), Some(7));
      assert_eq!(Value::Real(2.5).as_real(), Some(2.5));
      assert_eq!(Value::Text("hi".into()).as_text(), Some("hi"));
      assert_eq!(Value::Blob(vec![9]).as_blob(), Some(&[9u8][..]));
      assert_eq!(Value::Text("hi".into()).as_integer(), None);
   }

   #[test]
   fn test_type_names() {
      assert_eq!(Value::Null.type_name(), "null");
      assert_eq!(Value::Integer(0).type_name(), "integer");
      assert_eq!(Value::Real(0.0).type_name(), "real");
      assert_eq!(Value::Text(String::new()).type_name(), "text");
      assert_eq!(Value::Blob(Vec::new()).type_name(), "blob");
   }

   #[test]
   fn test_from_conversions() {
      assert_eq!(Value::from(5i64), Value::Integer(5));
      assert_eq!(Value::from(5i32), Value::Integer(5));
      assert_eq!(Value::from(true), Value::Integer(1));
      assert_eq!(Value::from(false), Value::Integer(0));
      assert_eq!(Value::from("x"), Value::Text("x".into()));
      assert_eq!(Value::from(vec![1u8, 2]), Value::Blob(vec![1, 2]));
      assert_eq!(Value::from(None::<i64>), Value::Null);
      assert_eq!(Value::from(Some(3i64)), Value::Integer(3));
   }
}
