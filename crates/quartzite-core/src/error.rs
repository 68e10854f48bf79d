//! Error types for quartzite-core

use std::ffi::CStr;

use libsqlite3_sys as ffi;

/// Result type alias for bridge operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that may occur when working with the bridge.
///
/// Engine-originated failures carry the SQLite result code unchanged so
/// callers can dispatch on it (e.g. retry on `SQLITE_BUSY`).
#[derive(Debug, thiserror::Error)]
pub enum Error {
   /// Error surfaced by the SQLite engine, with its result code and message.
   #[error("sqlite error {code}: {message}")]
   Sqlite {
      /// The engine's primary result code (e.g. 5 for `SQLITE_BUSY`).
      code: i32,
      /// The engine's printable error message.
      message: String,
   },

   /// Parameter binding failed: unknown parameter name, index out of range,
   /// or a value the engine refused.
   #[error("parameter bind failed: {reason}")]
   Bind { reason: String },

   /// Typed extraction of a cell whose stored type does not match.
   #[error("type mismatch: expected {expected}, got {actual}")]
   TypeMismatch { expected: String, actual: String },

   /// By-name or by-index column lookup missed.
   #[error("column not found: {0}")]
   ColumnNotFound(String),

   /// Typed extraction of SQL NULL into a non-optional type.
   #[error("unexpected NULL in column {column}")]
   UnexpectedNull { column: String },

   /// Operation on a connection that has been closed.
   #[error("connection has been closed")]
   ConnectionClosed,

   /// Operation on a closed or finalized child handle (statement, blob, backup).
   #[error("attempted to use a closed {0} handle")]
   HandleClosed(&'static str),

   /// A step on this statement previously failed; only finalize is permitted.
   #[error("statement is poisoned by an earlier step failure")]
   StatementPoisoned,

   /// Attempt to write through a read-only surface.
   #[error("write attempted on a read-only surface")]
   ReadOnly,

   /// Row data was requested while the statement has no current row.
   #[error("statement has no current row")]
   NoCurrentRow,

   /// A name or path contained an interior NUL byte and cannot cross the
   /// C boundary.
   #[error("{what} contains an interior NUL byte")]
   InvalidString { what: &'static str },
}

impl Error {
   /// Build an engine error from a result code and the connection's current
   /// error message.
   ///
   /// # Safety
   ///
   /// `db` must be a valid pointer to an open sqlite3 connection.
   pub(crate) unsafe fn from_engine(db: *mut ffi::sqlite3, code: i32) -> Self {
      let message = if db.is_null() {
         String::from("out of memory")
      } else {
         // SAFETY: db is a valid connection pointer; sqlite3_errmsg never
         // returns NULL for an open connection.
         let msg = unsafe { ffi::sqlite3_errmsg(db) };
         if msg.is_null() {
            String::from("unknown error")
         } else {
            unsafe { CStr::from_ptr(msg) }.to_string_lossy().into_owned()
         }
      };
      Error::Sqlite { code, message }
   }

   /// Extract a structured error code from the error type.
   ///
   /// Engine errors yield `SQLITE_<code>`; bridge-specific errors yield a
   /// stable machine-readable tag.
   pub fn code(&self) -> String {
      match self {
         Error::Sqlite { code, .. } => format!("SQLITE_{}", code),
         Error::Bind { .. } => "BIND_ERROR".to_string(),
         Error::TypeMismatch { .. } => "TYPE_MISMATCH".to_string(),
         Error::ColumnNotFound(_) => "COLUMN_NOT_FOUND".to_string(),
         Error::UnexpectedNull { .. } => "UNEXPECTED_NULL".to_string(),
         Error::ConnectionClosed => "CONNECTION_CLOSED".to_string(),
         Error::HandleClosed(_) => "HANDLE_CLOSED".to_string(),
         Error::StatementPoisoned => "STATEMENT_POISONED".to_string(),
         Error::ReadOnly => "READ_ONLY".to_string(),
         Error::NoCurrentRow => "NO_CURRENT_ROW".to_string(),
         Error::InvalidString { .. } => "INVALID_STRING".to_string(),
      }
   }

   /// The raw SQLite result code, if this error originated in the engine.
   pub fn sqlite_code(&self) -> Option<i32> {
      match self {
         Error::Sqlite { code, .. } => Some(*code),
         _ => None,
      }
   }

   /// True if the engine reported `SQLITE_BUSY` or `SQLITE_LOCKED`; such
   /// errors are transient and the operation may be retried.
   pub fn is_busy(&self) -> bool {
      matches!(
         self.sqlite_code(),
         Some(ffi::SQLITE_BUSY) | Some(ffi::SQLITE_LOCKED)
      )
   }

   /// Fill in the column name on extraction errors that were produced
   /// without one (the `FromSql` impls do not know the column they serve).
   pub(crate) fn for_column(self, name: &str) -> Self {
      match self {
         Error::UnexpectedNull { .. } => Error::UnexpectedNull {
            column: name.to_string(),
         },
         other => other,
      }
   }
}

#[cfg(test)]
mod tests {
   use super::*;

   #[test]
   fn test_code_sqlite() {
      let err = Error::Sqlite {
         code: 5,
         message: "database is locked".into(),
      };
      assert_eq!(err.code(), "SQLITE_5");
      assert_eq!(err.sqlite_code(), Some(5));
      assert!(err.is_busy());
   }

   #[test]
   fn test_code_bridge_errors() {
      assert_eq!(Error::ConnectionClosed.code(), "CONNECTION_CLOSED");
      assert_eq!(Error::HandleClosed("blob").code(), "HANDLE_CLOSED");
      assert_eq!(Error::ReadOnly.code(), "READ_ONLY");
      assert_eq!(
         Error::ColumnNotFound("nope".into()).code(),
         "COLUMN_NOT_FOUND"
      );
   }

   #[test]
   fn test_is_busy_only_for_transient_codes() {
      let locked = Error::Sqlite {
         code: ffi::SQLITE_LOCKED,
         message: "table locked".into(),
      };
      assert!(locked.is_busy());

      let misuse = Error::Sqlite {
         code: ffi::SQLITE_MISUSE,
         message: "misuse".into(),
      };
      assert!(!misuse.is_busy());
      assert!(!Error::ReadOnly.is_busy());
   }

   #[test]
   fn test_for_column_fills_null_errors() {
      let err = Error::UnexpectedNull {
         column: String::new(),
      }
      .for_column("age");
      assert!(matches!(err, Error::UnexpectedNull { ref column } if column == "age"));

      // Other variants pass through untouched.
      let err = Error::ReadOnly.for_column("age");
      assert!(matches!(err, Error::ReadOnly));
   }

   #[test]
   fn test_display_messages() {
      let err = Error::UnexpectedNull {
         column: "name".into(),
      };
      assert!(err.to_string().contains("name"));

      let err = Error::TypeMismatch {
         expected: "integer".into(),
         actual: "text".into(),
      };
      assert!(err.to_string().contains("integer"));
      assert!(err.to_string().contains("text"));
   }
}
