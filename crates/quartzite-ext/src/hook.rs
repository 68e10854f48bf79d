//! Update-hook registration.
//!
//! One slot per connection: installing a hook replaces the previous one and
//! reclaims its context from the user-data pointer the engine hands back.
//! Hooks run synchronously during the row change, before the writing
//! statement returns, and must not run SQL on the same connection.

use std::ffi::{CStr, c_char, c_int, c_void};
use std::panic::{AssertUnwindSafe, catch_unwind};

use libsqlite3_sys as ffi;
use tracing::{debug, error};

use quartzite_core::{Connection, Result};

/// Kind of row change reported to an update hook.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HookAction {
   Insert,
   Update,
   Delete,
}

impl HookAction {
   fn from_code(op: c_int) -> Option<Self> {
      match op {
         ffi::SQLITE_INSERT => Some(HookAction::Insert),
         ffi::SQLITE_UPDATE => Some(HookAction::Update),
         ffi::SQLITE_DELETE => Some(HookAction::Delete),
         _ => None,
      }
   }
}

struct HookContext {
   callback: Box<dyn Fn(HookAction, &str, i64) + Send>,
}

unsafe extern "C" fn update_hook_trampoline(
   user_data: *mut c_void,
   op: c_int,
   _database: *const c_char,
   table: *const c_char,
   rowid: ffi::sqlite3_int64,
) {
   if user_data.is_null() || table.is_null() {
      return;
   }

   // Catch any panics to prevent unwinding across the FFI boundary. The
   // engine accepts no errors from this hook, so failures are logged and
   // swallowed.
   let outcome = catch_unwind(AssertUnwindSafe(|| {
      // SAFETY: user_data is the HookContext installed by set_update_hook
      // and stays alive until replaced or cleared.
      let context = unsafe { &*(user_data as *const HookContext) };

      let Some(action) = HookAction::from_code(op) else {
         return;
      };
      // SAFETY: table is a NUL-terminated string valid for this callback.
      let table = unsafe { CStr::from_ptr(table) }.to_string_lossy();
      (context.callback)(action, &table, rowid);
   }));

   if outcome.is_err() {
      error!("panic in update hook callback (absorbed)");
   }
}

/// Reclaim the context of a previously installed hook, if any.
unsafe fn reclaim_previous(prev: *mut c_void) {
   if !prev.is_null() {
      // SAFETY: prev was created by Box::into_raw in set_update_hook.
      drop(unsafe { Box::from_raw(prev as *mut HookContext) });
   }
}

/// Update-hook registration on a [`Connection`].
pub trait HookExt {
   /// Install `f` as the connection's update hook, replacing any prior
   /// hook. The callback receives the change kind, the table name, and the
   /// rowid, in row-modification order, synchronously during the change.
   ///
   /// The callback must not execute SQL on this connection. To observe
   /// state from outside, capture shared storage (e.g. an
   /// `Arc<Mutex<Vec<_>>>`) and push into it.
   fn set_update_hook<F>(&self, f: F) -> Result<()>
   where
      F: Fn(HookAction, &str, i64) + Send + 'static;

   /// Remove the update hook and release its context.
   fn clear_update_hook(&self) -> Result<()>;
}

impl HookExt for Connection {
   fn set_update_hook<F>(&self, f: F) -> Result<()>
   where
      F: Fn(HookAction, &str, i64) + Send + 'static,
   {
      self.handle().ensure_open()?;
      let context = Box::new(HookContext {
         callback: Box::new(f),
      });
      let context_ptr = Box::into_raw(context) as *mut c_void;

      // SAFETY: the connection is open. The engine passes context_ptr back
      // to the trampoline and returns the previous slot's pointer, which we
      // reclaim — single-slot replacement semantics.
      let prev = unsafe {
         ffi::sqlite3_update_hook(
            self.handle().as_ptr(),
            Some(update_hook_trampoline),
            context_ptr,
         )
      };
      unsafe { reclaim_previous(prev) };
      debug!("update hook installed");
      Ok(())
   }

   fn clear_update_hook(&self) -> Result<()> {
      self.handle().ensure_open()?;
      // SAFETY: installing a null hook removes it; the returned pointer is
      // the context we installed earlier.
      let prev = unsafe {
         ffi::sqlite3_update_hook(self.handle().as_ptr(), None, std::ptr::null_mut())
      };
      unsafe { reclaim_previous(prev) };
      debug!("update hook cleared");
      Ok(())
   }
}
