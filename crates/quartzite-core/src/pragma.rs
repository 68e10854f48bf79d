//! Typed PRAGMA accessors.
//!
//! Every setter reads the state back (or uses the row the pragma itself
//! returns) and reports the mode the engine actually adopted — the engine
//! silently rejects some combinations, e.g. WAL on an in-memory database.

use serde::{Deserialize, Serialize};

use crate::connection::Connection;
use crate::error::{Error, Result};
use crate::types::FromSql;
use crate::value::Value;

/// Journal mode of a database.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JournalMode {
   Delete,
   Truncate,
   Persist,
   Memory,
   Wal,
   Off,
}

impl JournalMode {
   /// Parse the engine's spelling, case-insensitively.
   pub fn parse(s: &str) -> Option<Self> {
      match s.to_ascii_lowercase().as_str() {
         "delete" => Some(JournalMode::Delete),
         "truncate" => Some(JournalMode::Truncate),
         "persist" => Some(JournalMode::Persist),
         "memory" => Some(JournalMode::Memory),
         "wal" => Some(JournalMode::Wal),
         "off" => Some(JournalMode::Off),
         _ => None,
      }
   }

   pub fn as_str(self) -> &'static str {
      match self {
         JournalMode::Delete => "delete",
         JournalMode::Truncate => "truncate",
         JournalMode::Persist => "persist",
         JournalMode::Memory => "memory",
         JournalMode::Wal => "wal",
         JournalMode::Off => "off",
      }
   }
}

/// `PRAGMA synchronous` levels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Synchronous {
   Off = 0,
   Normal = 1,
   Full = 2,
   Extra = 3,
}

impl Synchronous {
   fn from_i64(v: i64) -> Option<Self> {
      match v {
         0 => Some(Synchronous::Off),
         1 => Some(Synchronous::Normal),
         2 => Some(Synchronous::Full),
         3 => Some(Synchronous::Extra),
         _ => None,
      }
   }
}

/// `PRAGMA temp_store` settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TempStore {
   Default = 0,
   File = 1,
   Memory = 2,
}

impl TempStore {
   fn from_i64(v: i64) -> Option<Self> {
      match v {
         0 => Some(TempStore::Default),
         1 => Some(TempStore::File),
         2 => Some(TempStore::Memory),
         _ => None,
      }
   }
}

/// `PRAGMA auto_vacuum` settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AutoVacuum {
   None = 0,
   Full = 1,
   Incremental = 2,
}

impl AutoVacuum {
   fn from_i64(v: i64) -> Option<Self> {
      match v {
         0 => Some(AutoVacuum::None),
         1 => Some(AutoVacuum::Full),
         2 => Some(AutoVacuum::Incremental),
         _ => None,
      }
   }
}

fn bad_pragma_value<T>(pragma: &str, value: &Value) -> Result<T> {
   Err(Error::TypeMismatch {
      expected: format!("{pragma} value"),
      actual: match value {
         Value::Text(s) => format!("text {s:?}"),
         Value::Integer(i) => format!("integer {i}"),
         other => other.type_name().to_string(),
      },
   })
}

impl Connection {
   /// Read a single-value pragma.
   fn pragma_value(&self, pragma: &str) -> Result<Value> {
      let row = self.query_one(&format!("PRAGMA {pragma}"))?;
      Ok(row
         .and_then(|r| r.get(0).cloned())
         .unwrap_or(Value::Null))
   }

   fn pragma_i64(&self, pragma: &str) -> Result<i64> {
      let value = self.pragma_value(pragma)?;
      i64::from_sql(&value).or_else(|_| bad_pragma_value(pragma, &value))
   }

   /// Current journal mode of the `main` database.
   pub fn journal_mode(&self) -> Result<JournalMode> {
      let value = self.pragma_value("journal_mode")?;
      match value.as_text().and_then(JournalMode::parse) {
         Some(mode) => Ok(mode),
         None => bad_pragma_value("journal_mode", &value),
      }
   }

   /// Request a journal mode and return the mode the engine adopted
   /// (in-memory databases, for instance, never enter WAL).
   pub fn set_journal_mode(&self, mode: JournalMode) -> Result<JournalMode> {
      let value = self.pragma_value(&format!("journal_mode = {}", mode.as_str()))?;
      match value.as_text().and_then(JournalMode::parse) {
         Some(adopted) => Ok(adopted),
         None => bad_pragma_value("journal_mode", &value),
      }
   }

   /// Current synchronous level.
   pub fn synchronous(&self) -> Result<Synchronous> {
      let value = self.pragma_value("synchronous")?;
      let n = i64::from_sql(&value).or_else(|_| bad_pragma_value("synchronous", &value))?;
      Synchronous::from_i64(n).map_or_else(|| bad_pragma_value("synchronous", &value), Ok)
   }

   /// Set the synchronous level and return the adopted value.
   pub fn set_synchronous(&self, level: Synchronous) -> Result<Synchronous> {
      self.exec_raw(&format!("PRAGMA synchronous = {}", level as i64))?;
      self.synchronous()
   }

   /// Whether foreign-key enforcement is on.
   pub fn foreign_keys(&self) -> Result<bool> {
      Ok(self.pragma_i64("foreign_keys")? != 0)
   }

   /// Switch foreign-key enforcement and return the adopted state.
   pub fn set_foreign_keys(&self, on: bool) -> Result<bool> {
      self.exec_raw(&format!("PRAGMA foreign_keys = {}", on as i64))?;
      self.foreign_keys()
   }

   /// Page-cache size. Positive counts pages, negative counts kibibytes.
   pub fn cache_size(&self) -> Result<i64> {
      self.pragma_i64("cache_size")
   }

   /// Set the page-cache size and return the adopted value.
   pub fn set_cache_size(&self, size: i64) -> Result<i64> {
      self.exec_raw(&format!("PRAGMA cache_size = {size}"))?;
      self.cache_size()
   }

   /// Where temporary tables and indexes are kept.
   pub fn temp_store(&self) -> Result<TempStore> {
      let value = self.pragma_value("temp_store")?;
      let n = i64::from_sql(&value).or_else(|_| bad_pragma_value("temp_store", &value))?;
      TempStore::from_i64(n).map_or_else(|| bad_pragma_value("temp_store", &value), Ok)
   }

   /// Set the temp-store location and return the adopted value.
   pub fn set_temp_store(&self, store: TempStore) -> Result<TempStore> {
      self.exec_raw(&format!("PRAGMA temp_store = {}", store as i64))?;
      self.temp_store()
   }

   /// Auto-vacuum mode of the `main` database.
   pub fn auto_vacuum(&self) -> Result<AutoVacuum> {
      let value = self.pragma_value("auto_vacuum")?;
      let n = i64::from_sql(&value).or_else(|_| bad_pragma_value("auto_vacuum", &value))?;
      AutoVacuum::from_i64(n).map_or_else(|| bad_pragma_value("auto_vacuum", &value), Ok)
   }

   /// Set the auto-vacuum mode and return the adopted value. Switching an
   /// existing database between none and full only takes effect after a
   /// VACUUM; the adopted value reflects that.
   pub fn set_auto_vacuum(&self, mode: AutoVacuum) -> Result<AutoVacuum> {
      self.exec_raw(&format!("PRAGMA auto_vacuum = {}", mode as i64))?;
      self.auto_vacuum()
   }

   /// Page size in bytes.
   pub fn page_size(&self) -> Result<i64> {
      self.pragma_i64("page_size")
   }

   /// Request a page size and return the adopted value. Takes effect on an
   /// empty database or after a VACUUM.
   pub fn set_page_size(&self, bytes: i64) -> Result<i64> {
      self.exec_raw(&format!("PRAGMA page_size = {bytes}"))?;
      self.page_size()
   }

   /// Maximum number of pages the database may grow to.
   pub fn max_page_count(&self) -> Result<i64> {
      self.pragma_i64("max_page_count")
   }

   /// Set the page limit and return the adopted value.
   pub fn set_max_page_count(&self, pages: i64) -> Result<i64> {
      let value = self.pragma_value(&format!("max_page_count = {pages}"))?;
      i64::from_sql(&value).or_else(|_| bad_pragma_value("max_page_count", &value))
   }

   /// Number of pages in the `main` database. Read-only counter.
   pub fn page_count(&self) -> Result<i64> {
      self.pragma_i64("page_count")
   }

   /// Number of unused pages. Read-only counter.
   pub fn freelist_count(&self) -> Result<i64> {
      self.pragma_i64("freelist_count")
   }

   /// Text encoding of the database (`UTF-8`, `UTF-16le`, or `UTF-16be`).
   pub fn encoding(&self) -> Result<String> {
      let value = self.pragma_value("encoding")?;
      value
         .as_text()
         .map(str::to_string)
         .map_or_else(|| bad_pragma_value("encoding", &value), Ok)
   }
}

#[cfg(test)]
mod tests {
   use super::*;

   #[test]
   fn test_journal_mode_parse_is_case_insensitive() {
      assert_eq!(JournalMode::parse("WAL"), Some(JournalMode::Wal));
      assert_eq!(JournalMode::parse("wal"), Some(JournalMode::Wal));
      assert_eq!(JournalMode::parse("Delete"), Some(JournalMode::Delete));
      assert_eq!(JournalMode::parse("bogus"), None);
   }

   #[test]
   fn test_memory_database_reports_adopted_journal_mode() {
      let conn = Connection::open_memory().unwrap();
      assert_eq!(conn.journal_mode().unwrap(), JournalMode::Memory);

      // The engine refuses WAL on an in-memory database and says so.
      let adopted = conn.set_journal_mode(JournalMode::Wal).unwrap();
      assert_eq!(adopted, JournalMode::Memory);

      // Off is accepted.
      let adopted = conn.set_journal_mode(JournalMode::Off).unwrap();
      assert_eq!(adopted, JournalMode::Off);
   }

   #[test]
   fn test_synchronous_round_trip() {
      let conn = Connection::open_memory().unwrap();
      let adopted = conn.set_synchronous(Synchronous::Normal).unwrap();
      assert_eq!(adopted, Synchronous::Normal);
      assert_eq!(conn.synchronous().unwrap(), Synchronous::Normal);

      let adopted = conn.set_synchronous(Synchronous::Extra).unwrap();
      assert_eq!(adopted, Synchronous::Extra);
   }

   #[test]
   fn test_foreign_keys_toggle() {
      let conn = Connection::open_memory().unwrap();
      assert!(conn.set_foreign_keys(true).unwrap());
      assert!(conn.foreign_keys().unwrap());
      assert!(!conn.set_foreign_keys(false).unwrap());
   }

   #[test]
   fn test_cache_size_accepts_negative_kibibytes() {
      let conn = Connection::open_memory().unwrap();
      assert_eq!(conn.set_cache_size(-4000).unwrap(), -4000);
      assert_eq!(conn.set_cache_size(500).unwrap(), 500);
   }

   #[test]
   fn test_temp_store_round_trip() {
      let conn = Connection::open_memory().unwrap();
      assert_eq!(
         conn.set_temp_store(TempStore::Memory).unwrap(),
         TempStore::Memory
      );
      assert_eq!(conn.temp_store().unwrap(), TempStore::Memory);
   }

   #[test]
   fn test_auto_vacuum_on_fresh_database() {
      let conn = Connection::open_memory().unwrap();
      let adopted = conn.set_auto_vacuum(AutoVacuum::Full).unwrap();
      assert_eq!(adopted, AutoVacuum::Full);
   }

   #[test]
   fn test_page_counters() {
      let conn = Connection::open_memory().unwrap();
      conn.exec_raw("CREATE TABLE t (v INTEGER)").unwrap();
      assert!(conn.page_count().unwrap() >= 1);
      assert!(conn.freelist_count().unwrap() >= 0);
      assert!(conn.page_size().unwrap() >= 512);
   }

   #[test]
   fn test_max_page_count_set_returns_adopted() {
      let conn = Connection::open_memory().unwrap();
      assert_eq!(conn.set_max_page_count(1000).unwrap(), 1000);
      assert_eq!(conn.max_page_count().unwrap(), 1000);
   }

   #[test]
   fn test_encoding_reads_utf8() {
      let conn = Connection::open_memory().unwrap();
      assert_eq!(conn.encoding().unwrap(), "UTF-8");
   }
}
