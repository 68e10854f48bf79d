//! Online backup between two connections.
//!
//! The protocol is init → step… → finish. Steps that fail with BUSY or
//! LOCKED are transient: the caller may retry after a delay (the bridge
//! does not retry on its own). Any other step failure is fatal.

use std::ffi::c_int;
use std::sync::Arc;

use libsqlite3_sys as ffi;
use tracing::debug;

use crate::connection::{Connection, to_cstring};
use crate::error::{Error, Result};
use crate::handle::BackupHandle;

/// An in-flight online backup.
///
/// Page counts are only meaningful after the first [`step`](Self::step).
#[derive(Debug)]
pub struct Backup {
   handle: BackupHandle,
   stepped: bool,
}

impl Backup {
   /// Start a backup of `src`'s `main` database into `dest`'s `main`.
   pub fn init(dest: &Connection, src: &Connection) -> Result<Self> {
      Self::init_with_names(dest, "main", src, "main")
   }

   /// Start a backup between named schemas of two connections.
   pub fn init_with_names(
      dest: &Connection,
      dest_name: &str,
      src: &Connection,
      src_name: &str,
   ) -> Result<Self> {
      dest.handle().ensure_open()?;
      src.handle().ensure_open()?;
      let c_dest = to_cstring(dest_name, "destination schema")?;
      let c_src = to_cstring(src_name, "source schema")?;

      // SAFETY: both connections are open; names are valid C strings.
      let backup = unsafe {
         ffi::sqlite3_backup_init(
            dest.handle().as_ptr(),
            c_dest.as_ptr(),
            src.handle().as_ptr(),
            c_src.as_ptr(),
         )
      };
      if backup.is_null() {
         // The failure reason lands on the destination connection.
         let code = dest.last_error_code();
         let code = if code == ffi::SQLITE_OK {
            ffi::SQLITE_ERROR
         } else {
            code
         };
         return Err(dest.handle().last_error(code));
      }

      debug!("backup started");
      Ok(Self {
         handle: BackupHandle::new(
            backup,
            Arc::clone(dest.handle()),
            Arc::clone(src.handle()),
         ),
         stepped: false,
      })
   }

   fn ensure_active(&self) -> Result<()> {
      if self.handle.is_finished() {
         return Err(Error::HandleClosed("backup"));
      }
      self.handle.dest().ensure_open()?;
      self.handle.src().ensure_open()
   }

   /// Copy up to `pages` pages. A negative count copies everything that
   /// remains.
   ///
   /// Returns `true` while pages remain and `false` once the copy is
   /// complete. BUSY/LOCKED errors are retryable (see
   /// [`Error::is_busy`](crate::Error::is_busy)); all others are fatal.
   pub fn step(&mut self, pages: i32) -> Result<bool> {
      self.ensure_active()?;
      // SAFETY: the backup handle is live.
      let rc = unsafe { ffi::sqlite3_backup_step(self.handle.as_ptr(), pages as c_int) };
      self.stepped = true;
      match rc {
         ffi::SQLITE_OK => Ok(true),
         ffi::SQLITE_DONE => Ok(false),
         code => Err(self.handle.dest().last_error(code)),
      }
   }

   /// Pages still to be copied. Zero before the first step.
   pub fn remaining(&self) -> i64 {
      if self.handle.is_finished() {
         return 0;
      }
      // SAFETY: the backup handle is live.
      unsafe { ffi::sqlite3_backup_remaining(self.handle.as_ptr()) as i64 }
   }

   /// Total pages in the source database, as of the last step.
   pub fn page_count(&self) -> i64 {
      if self.handle.is_finished() {
         return 0;
      }
      // SAFETY: the backup handle is live.
      unsafe { ffi::sqlite3_backup_pagecount(self.handle.as_ptr()) as i64 }
   }

   /// Percent complete in `[0, 100]`. Reports 100 when the source has no
   /// pages at all.
   pub fn progress(&self) -> f64 {
      let total = self.page_count();
      if total == 0 {
         return 100.0;
      }
      let copied = total - self.remaining();
      (copied as f64 / total as f64) * 100.0
   }

   /// Whether [`step`](Self::step) has run at least once (page counts are
   /// meaningless before that).
   pub fn has_stepped(&self) -> bool {
      self.stepped
   }

   /// Release the engine-side backup state. Idempotent; also runs on drop.
   pub fn finish(&mut self) -> Result<()> {
      self.handle.finish()
   }

   /// Copy everything in one step, then finish.
   pub fn run_all(mut self) -> Result<()> {
      self.step(-1)?;
      self.finish()
   }
}
