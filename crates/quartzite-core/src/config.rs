//! Configuration applied when opening a connection

use serde::{Deserialize, Serialize};

use crate::pragma::JournalMode;

/// Configuration for a [`Connection`](crate::Connection) opened through
/// [`Connection::open_with`](crate::Connection::open_with).
///
/// # Examples
///
/// ```
/// use quartzite_core::ConnectionConfig;
///
/// // Use defaults
/// let config = ConnectionConfig::default();
///
/// // Override just one field
/// let config = ConnectionConfig {
///     busy_timeout_ms: 250,
///     ..Default::default()
/// };
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectionConfig {
   /// How long the engine waits on a locked database before returning BUSY,
   /// in milliseconds. Zero disables the wait.
   ///
   /// Default: 5000
   pub busy_timeout_ms: u64,

   /// Whether foreign-key enforcement is switched on at open.
   ///
   /// Default: true
   pub foreign_keys: bool,

   /// Journal mode to request at open. `None` keeps the engine default.
   /// The engine may adopt a different mode (e.g. in-memory databases
   /// cannot enter WAL); read it back with
   /// [`Connection::journal_mode`](crate::Connection::journal_mode) if it matters.
   ///
   /// Default: None
   pub journal_mode: Option<JournalMode>,
}

impl Default for ConnectionConfig {
   fn default() -> Self {
      Self {
         busy_timeout_ms: 5000,
         foreign_keys: true,
         journal_mode: None,
      }
   }
}
