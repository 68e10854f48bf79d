//! Scoped transactions and savepoints.
//!
//! The body runs inside BEGIN/COMMIT (or SAVEPOINT/RELEASE); any error or
//! panic unwinds through a guard that issues the rollback. Rollback is
//! best-effort: if it also fails, the original error wins and the rollback
//! failure is logged.

use tracing::error;

use crate::connection::Connection;
use crate::error::Result;

/// Locking behavior of an explicit transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionBehavior {
   /// Take locks lazily, on first use.
   Deferred,
   /// Take a reserved lock immediately.
   Immediate,
   /// Take an exclusive lock immediately.
   Exclusive,
}

impl TransactionBehavior {
   fn begin_sql(self) -> &'static str {
      match self {
         TransactionBehavior::Deferred => "BEGIN DEFERRED",
         TransactionBehavior::Immediate => "BEGIN IMMEDIATE",
         TransactionBehavior::Exclusive => "BEGIN EXCLUSIVE",
      }
   }
}

/// Issues the rollback statement on drop unless disarmed.
struct RollbackGuard<'c> {
   conn: &'c Connection,
   sql: String,
   armed: bool,
}

impl Drop for RollbackGuard<'_> {
   fn drop(&mut self) {
      if !self.armed {
         return;
      }
      if let Err(e) = self.conn.exec_raw(&self.sql) {
         // Best effort only: the original error (or panic) is already on
         // its way to the caller.
         error!("rollback failed during transaction unwind: {e}");
      }
   }
}

impl Connection {
   fn run_scoped<T>(
      &self,
      begin: &str,
      commit: &str,
      rollback: &str,
      body: impl FnOnce(&Connection) -> Result<T>,
   ) -> Result<T> {
      self.exec_raw(begin)?;
      let mut guard = RollbackGuard {
         conn: self,
         sql: rollback.to_string(),
         armed: true,
      };

      let value = body(self)?;
      self.exec_raw(commit)?;
      guard.armed = false;
      Ok(value)
   }

   /// Run `body` inside `BEGIN TRANSACTION` … `COMMIT`.
   ///
   /// On any error from the body (or from the commit itself) the
   /// transaction is rolled back and the error is re-propagated. A panic
   /// in the body rolls back as well before unwinding.
   pub fn transaction<T>(&self, body: impl FnOnce(&Connection) -> Result<T>) -> Result<T> {
      self.run_scoped("BEGIN TRANSACTION", "COMMIT", "ROLLBACK", body)
   }

   /// [`transaction`](Self::transaction) with an explicit locking behavior.
   pub fn transaction_with<T>(
      &self,
      behavior: TransactionBehavior,
      body: impl FnOnce(&Connection) -> Result<T>,
   ) -> Result<T> {
      self.run_scoped(behavior.begin_sql(), "COMMIT", "ROLLBACK", body)
   }

   /// A deferred transaction, suited to read-only work.
   pub fn read_transaction<T>(&self, body: impl FnOnce(&Connection) -> Result<T>) -> Result<T> {
      self.transaction_with(TransactionBehavior::Deferred, body)
   }

   /// An immediate transaction, taking the write lock up front.
   pub fn write_transaction<T>(&self, body: impl FnOnce(&Connection) -> Result<T>) -> Result<T> {
      self.transaction_with(TransactionBehavior::Immediate, body)
   }

   /// An exclusive transaction.
   pub fn exclusive_transaction<T>(
      &self,
      body: impl FnOnce(&Connection) -> Result<T>,
   ) -> Result<T> {
      self.transaction_with(TransactionBehavior::Exclusive, body)
   }

   /// Run `body` inside `SAVEPOINT name` … `RELEASE SAVEPOINT name`,
   /// rolling back to the savepoint on error.
   ///
   /// Savepoints nest, so this composes with an enclosing
   /// [`transaction`](Self::transaction) for partial rollback. The name is
   /// an opaque identifier chosen by the caller and is not validated or
   /// quoted here.
   pub fn with_savepoint<T>(
      &self,
      name: &str,
      body: impl FnOnce(&Connection) -> Result<T>,
   ) -> Result<T> {
      self.run_scoped(
         &format!("SAVEPOINT {name}"),
         &format!("RELEASE SAVEPOINT {name}"),
         &format!("ROLLBACK TO SAVEPOINT {name}"),
         body,
      )
   }
}
