//! Safe wrappers around the engine's opaque handles.
//!
//! Every child handle (statement, blob, backup) share-owns its parent
//! [`ConnectionHandle`], so the connection's finalizer can only run after
//! every child has released its engine resource. All finalizers are
//! idempotent and cooperate with the explicit close/finish APIs.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use libsqlite3_sys as ffi;
use tracing::debug;

use crate::error::{Error, Result};

/// Owner of a raw `sqlite3*` connection pointer.
///
/// The handle is the single point of release for the engine connection:
/// `sqlite3_close_v2` runs exactly once, when the last share-owner drops.
/// The explicit [`Connection::close`](crate::Connection::close) API only
/// flips the closed flag — close-v2 semantics already defer teardown while
/// statements are outstanding, and deferring the call to the final drop
/// keeps cross-thread [`InterruptHandle`]s valid for their whole lifetime.
#[derive(Debug)]
pub struct ConnectionHandle {
   db: *mut ffi::sqlite3,
   closed: AtomicBool,
}

// SAFETY: the raw pointer is only dereferenced through methods that take
// &self, and the engine is compiled thread-safe enough for the two calls
// that may cross threads (sqlite3_interrupt, sqlite3_is_interrupted).
// Everything else is serialized by the owning Connection, which is Send
// but deliberately not Sync.
unsafe impl Send for ConnectionHandle {}
unsafe impl Sync for ConnectionHandle {}

impl ConnectionHandle {
   pub(crate) fn new(db: *mut ffi::sqlite3) -> Self {
      Self {
         db,
         closed: AtomicBool::new(false),
      }
   }

   /// The raw connection pointer.
   ///
   /// The pointer stays valid for as long as this handle is alive. Callers
   /// performing engine calls must first check [`ensure_open`](Self::ensure_open)
   /// and must not hand the pointer to another thread.
   pub fn as_ptr(&self) -> *mut ffi::sqlite3 {
      self.db
   }

   /// True once the owning connection has been closed.
   pub fn is_closed(&self) -> bool {
      self.closed.load(Ordering::SeqCst)
   }

   pub(crate) fn mark_closed(&self) {
      self.closed.store(true, Ordering::SeqCst);
   }

   /// Fails with [`Error::ConnectionClosed`] once the connection is closed.
   pub fn ensure_open(&self) -> Result<()> {
      if self.is_closed() {
         return Err(Error::ConnectionClosed);
      }
      Ok(())
   }

   /// Build an engine error carrying `code` and the connection's current
   /// error message.
   pub fn last_error(&self, code: i32) -> Error {
      // SAFETY: the handle is alive, so the connection pointer is valid.
      unsafe { Error::from_engine(self.db, code) }
   }
}

impl Drop for ConnectionHandle {
   fn drop(&mut self) {
      if !self.db.is_null() {
         debug!("closing sqlite connection");
         // SAFETY: we are the sole owner of the pointer and this is the
         // only place it is released. close_v2 defers if the engine still
         // tracks unfinalized statements.
         unsafe {
            ffi::sqlite3_close(self.db);
         }
      }
   }
}

/// Cross-thread cancellation handle for a connection.
///
/// Obtained from [`Connection::interrupt_handle`](crate::Connection::interrupt_handle).
/// Cloneable and safe to use from any thread; the underlying connection
/// pointer stays valid because the handle share-owns it.
#[derive(Clone)]
pub struct InterruptHandle {
   conn: Arc<ConnectionHandle>,
}

impl InterruptHandle {
   pub(crate) fn new(conn: Arc<ConnectionHandle>) -> Self {
      Self { conn }
   }

   /// Request that the connection's in-flight statement abort at the
   /// engine's next safe point with an interrupt error.
   pub fn interrupt(&self) {
      if self.conn.is_closed() {
         return;
      }
      // SAFETY: sqlite3_interrupt is documented as callable from any
      // thread; the pointer is valid while the Arc is held.
      unsafe {
         ffi::sqlite3_interrupt(self.conn.as_ptr());
      }
   }
}

/// Owner of a raw `sqlite3_stmt*`, finalized at most once.
pub(crate) struct StatementHandle {
   stmt: *mut ffi::sqlite3_stmt,
   conn: Arc<ConnectionHandle>,
   finalized: bool,
}

// SAFETY: access is serialized by the owning Statement (Send, not Sync).
unsafe impl Send for StatementHandle {}

impl StatementHandle {
   pub(crate) fn new(stmt: *mut ffi::sqlite3_stmt, conn: Arc<ConnectionHandle>) -> Self {
      Self {
         stmt,
         conn,
         finalized: false,
      }
   }

   pub(crate) fn as_ptr(&self) -> *mut ffi::sqlite3_stmt {
      self.stmt
   }

   pub(crate) fn conn(&self) -> &Arc<ConnectionHandle> {
      &self.conn
   }

   pub(crate) fn is_finalized(&self) -> bool {
      self.finalized
   }

   /// Release the engine-side statement. Idempotent: the second and later
   /// calls succeed without touching the engine.
   pub(crate) fn finalize(&mut self) -> Result<()> {
      if self.finalized {
         return Ok(());
      }
      self.finalized = true;
      // SAFETY: stmt was produced by prepare and has not been finalized.
      let rc = unsafe { ffi::sqlite3_finalize(self.stmt) };
      self.stmt = std::ptr::null_mut();
      if rc != ffi::SQLITE_OK {
         return Err(self.conn.last_error(rc));
      }
      Ok(())
   }
}

impl Drop for StatementHandle {
   fn drop(&mut self) {
      let _ = self.finalize();
   }
}

/// Owner of a raw `sqlite3_blob*`, closed at most once.
#[derive(Debug)]
pub(crate) struct BlobHandle {
   blob: *mut ffi::sqlite3_blob,
   conn: Arc<ConnectionHandle>,
   closed: bool,
}

// SAFETY: access is serialized by the owning Blob (Send, not Sync).
unsafe impl Send for BlobHandle {}

impl BlobHandle {
   pub(crate) fn new(blob: *mut ffi::sqlite3_blob, conn: Arc<ConnectionHandle>) -> Self {
      Self {
         blob,
         conn,
         closed: false,
      }
   }

   pub(crate) fn as_ptr(&self) -> *mut ffi::sqlite3_blob {
      self.blob
   }

   pub(crate) fn conn(&self) -> &Arc<ConnectionHandle> {
      &self.conn
   }

   pub(crate) fn is_closed(&self) -> bool {
      self.closed
   }

   /// Close the engine-side blob handle. Idempotent.
   pub(crate) fn close(&mut self) -> Result<()> {
      if self.closed {
         return Ok(());
      }
      self.closed = true;
      // SAFETY: blob was produced by blob_open and has not been closed.
      let rc = unsafe { ffi::sqlite3_blob_close(self.blob) };
      self.blob = std::ptr::null_mut();
      if rc != ffi::SQLITE_OK {
         return Err(self.conn.last_error(rc));
      }
      Ok(())
   }
}

impl Drop for BlobHandle {
   fn drop(&mut self) {
      let _ = self.close();
   }
}

/// Owner of a raw `sqlite3_backup*`, finished at most once.
///
/// Both ends of the copy are share-owned so neither connection can be
/// finalized while the backup is in flight.
#[derive(Debug)]
pub(crate) struct BackupHandle {
   backup: *mut ffi::sqlite3_backup,
   dest: Arc<ConnectionHandle>,
   src: Arc<ConnectionHandle>,
   finished: bool,
}

// SAFETY: access is serialized by the owning Backup (Send, not Sync).
unsafe impl Send for BackupHandle {}

impl BackupHandle {
   pub(crate) fn new(
      backup: *mut ffi::sqlite3_backup,
      dest: Arc<ConnectionHandle>,
      src: Arc<ConnectionHandle>,
   ) -> Self {
      Self {
         backup,
         dest,
         src,
         finished: false,
      }
   }

   pub(crate) fn as_ptr(&self) -> *mut ffi::sqlite3_backup {
      self.backup
   }

   pub(crate) fn dest(&self) -> &Arc<ConnectionHandle> {
      &self.dest
   }

   pub(crate) fn src(&self) -> &Arc<ConnectionHandle> {
      &self.src
   }

   pub(crate) fn is_finished(&self) -> bool {
      self.finished
   }

   /// Release the engine-side backup state. Idempotent.
   pub(crate) fn finish(&mut self) -> Result<()> {
      if self.finished {
         return Ok(());
      }
      self.finished = true;
      // SAFETY: backup was produced by backup_init and has not been finished.
      let rc = unsafe { ffi::sqlite3_backup_finish(self.backup) };
      self.backup = std::ptr::null_mut();
      if rc != ffi::SQLITE_OK {
         return Err(self.dest.last_error(rc));
      }
      Ok(())
   }
}

impl Drop for BackupHandle {
   fn drop(&mut self) {
      let _ = self.finish();
   }
}
