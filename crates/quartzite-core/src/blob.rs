//! Incremental BLOB I/O.
//!
//! A [`Blob`] is tied to one row/column. Its size is fixed for the
//! lifetime of the handle (growing a blob requires a SQL UPDATE);
//! [`Blob::reopen`] repoints the same handle at another row of the same
//! table and column, which is much cheaper than reopening when iterating a
//! collection of large blobs.

use std::ffi::{c_int, c_void};
use std::sync::Arc;

use libsqlite3_sys as ffi;
use serde::{Deserialize, Serialize};

use crate::connection::{Connection, to_cstring};
use crate::error::{Error, Result};
use crate::handle::BlobHandle;

/// Access mode for [`Connection::open_blob`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BlobMode {
   ReadOnly = 0,
   ReadWrite = 1,
}

impl Connection {
   /// Open an incremental handle onto the blob stored in
   /// `table.column` at `rowid` in the `main` database.
   pub fn open_blob(
      &self,
      table: &str,
      column: &str,
      rowid: i64,
      mode: BlobMode,
   ) -> Result<Blob> {
      self.open_blob_in("main", table, column, rowid, mode)
   }

   /// [`open_blob`](Self::open_blob) against an attached schema.
   pub fn open_blob_in(
      &self,
      db_name: &str,
      table: &str,
      column: &str,
      rowid: i64,
      mode: BlobMode,
   ) -> Result<Blob> {
      self.handle().ensure_open()?;
      let c_db = to_cstring(db_name, "database name")?;
      let c_table = to_cstring(table, "table name")?;
      let c_column = to_cstring(column, "column name")?;

      let mut blob: *mut ffi::sqlite3_blob = std::ptr::null_mut();
      // SAFETY: the connection is open and all names are valid C strings.
      let rc = unsafe {
         ffi::sqlite3_blob_open(
            self.handle().as_ptr(),
            c_db.as_ptr(),
            c_table.as_ptr(),
            c_column.as_ptr(),
            rowid,
            mode as c_int,
            &mut blob,
         )
      };
      if rc != ffi::SQLITE_OK {
         return Err(self.handle().last_error(rc));
      }

      Ok(Blob {
         handle: BlobHandle::new(blob, Arc::clone(self.handle())),
      })
   }
}

/// An open incremental-I/O handle onto one blob cell.
#[derive(Debug)]
pub struct Blob {
   handle: BlobHandle,
}

impl Blob {
   fn ensure_open(&self) -> Result<()> {
      if self.handle.is_closed() {
         return Err(Error::HandleClosed("blob"));
      }
      self.handle.conn().ensure_open()
   }

   /// Size of the underlying blob in bytes. Fixed for the handle's
   /// lifetime.
   pub fn bytes(&self) -> Result<usize> {
      self.ensure_open()?;
      // SAFETY: the blob handle is open.
      Ok(unsafe { ffi::sqlite3_blob_bytes(self.handle.as_ptr()) } as usize)
   }

   /// Read exactly `len` bytes starting at `offset`.
   ///
   /// Fails with the engine's error when `offset + len` exceeds the blob's
   /// size.
   pub fn read(&self, offset: usize, len: usize) -> Result<Vec<u8>> {
      self.ensure_open()?;
      let mut buf = vec![0u8; len];
      // SAFETY: buf has exactly len writable bytes; the engine checks the
      // range against the blob size.
      let rc = unsafe {
         ffi::sqlite3_blob_read(
            self.handle.as_ptr(),
            buf.as_mut_ptr() as *mut c_void,
            len as c_int,
            offset as c_int,
         )
      };
      if rc != ffi::SQLITE_OK {
         return Err(self.handle.conn().last_error(rc));
      }
      Ok(buf)
   }

   /// Write `data` starting at `offset`.
   ///
   /// The write must fit inside the blob's current size; this API cannot
   /// grow a blob.
   pub fn write(&mut self, offset: usize, data: &[u8]) -> Result<()> {
      self.ensure_open()?;
      // SAFETY: data is readable for its full length; the engine checks
      // the range and the handle's writability.
      let rc = unsafe {
         ffi::sqlite3_blob_write(
            self.handle.as_ptr(),
            data.as_ptr() as *const c_void,
            data.len() as c_int,
            offset as c_int,
         )
      };
      if rc != ffi::SQLITE_OK {
         return Err(self.handle.conn().last_error(rc));
      }
      Ok(())
   }

   /// Point this handle at a different row of the same table and column.
   pub fn reopen(&mut self, rowid: i64) -> Result<()> {
      self.ensure_open()?;
      // SAFETY: the blob handle is open.
      let rc = unsafe { ffi::sqlite3_blob_reopen(self.handle.as_ptr(), rowid) };
      if rc != ffi::SQLITE_OK {
         return Err(self.handle.conn().last_error(rc));
      }
      Ok(())
   }

   /// Close the handle. Idempotent; also runs on drop. Reads and writes
   /// after close fail with
   /// [`Error::HandleClosed`](crate::Error::HandleClosed).
   pub fn close(&mut self) -> Result<()> {
      self.handle.close()
   }
}
