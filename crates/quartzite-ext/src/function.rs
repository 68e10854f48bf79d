//! User-defined scalar and aggregate SQL functions.
//!
//! Host callbacks are boxed into a heap context handed to the engine as
//! user data together with a destroy function. The destroy function is the
//! only path that drops the host callbacks — the engine invokes it when the
//! registration is replaced, removed, or the connection closes — so the
//! bridge never frees a context the engine may still call into.

use std::ffi::{c_char, c_int, c_void};
use std::panic::{AssertUnwindSafe, catch_unwind};

use libsqlite3_sys as ffi;
use tracing::{debug, error};

use quartzite_core::{Connection, Error, FromSql, Result, Value};

/// Read the argument array of a function invocation into host values.
unsafe fn collect_args(argc: c_int, argv: *mut *mut ffi::sqlite3_value) -> Vec<Value> {
   let mut args = Vec::with_capacity(argc as usize);
   for i in 0..argc {
      // SAFETY: the engine passes argc valid value pointers.
      args.push(unsafe { Value::from_raw(*argv.add(i as usize)) });
   }
   args
}

/// Set the per-call error slot; the engine copies the message.
unsafe fn set_error(ctx: *mut ffi::sqlite3_context, message: &str) {
   // SAFETY: ctx is the live context of the current call.
   unsafe {
      ffi::sqlite3_result_error(
         ctx,
         message.as_ptr() as *const c_char,
         message.len() as c_int,
      );
   }
}

struct ScalarContext {
   func: Box<dyn Fn(&[Value]) -> Result<Value> + Send>,
}

struct AggregateContext {
   init: Box<dyn Fn() -> Value + Send>,
   step: Box<dyn Fn(Value, &[Value]) -> Result<Value> + Send>,
   finish: Box<dyn Fn(Value) -> Result<Value> + Send>,
}

unsafe extern "C" fn scalar_trampoline(
   ctx: *mut ffi::sqlite3_context,
   argc: c_int,
   argv: *mut *mut ffi::sqlite3_value,
) {
   let outcome = catch_unwind(AssertUnwindSafe(|| {
      // SAFETY: user_data is the ScalarContext installed at registration;
      // it stays alive until the engine runs the destroy callback.
      let data = unsafe { &*(ffi::sqlite3_user_data(ctx) as *const ScalarContext) };
      let args = unsafe { collect_args(argc, argv) };
      (data.func)(&args)
   }));

   match outcome {
      Ok(Ok(value)) => unsafe { value.apply_to_context(ctx) },
      Ok(Err(e)) => unsafe { set_error(ctx, &e.to_string()) },
      Err(_) => {
         // Absorb the panic to keep it from unwinding across the FFI
         // boundary; the statement fails with this message instead.
         error!("panic in scalar function callback (absorbed)");
         unsafe { set_error(ctx, "host function panicked") }
      }
   }
}

unsafe extern "C" fn aggregate_step_trampoline(
   ctx: *mut ffi::sqlite3_context,
   argc: c_int,
   argv: *mut *mut ffi::sqlite3_value,
) {
   let outcome = catch_unwind(AssertUnwindSafe(|| {
      // SAFETY: user_data is the AggregateContext installed at registration.
      let data = unsafe { &*(ffi::sqlite3_user_data(ctx) as *const AggregateContext) };
      let args = unsafe { collect_args(argc, argv) };

      // One pointer-sized slot per aggregation, zero-initialized by the
      // engine on first use and freed by the engine after xFinal.
      let slot = unsafe {
         ffi::sqlite3_aggregate_context(ctx, std::mem::size_of::<*mut Value>() as c_int)
      } as *mut *mut Value;
      if slot.is_null() {
         unsafe { ffi::sqlite3_result_error_nomem(ctx) };
         return Ok(());
      }

      // Lazily allocate the accumulator on the first step. The slot is
      // nulled before step runs: if step fails or panics, the accumulator
      // is already released and xFinal sees an empty slot (NULL result)
      // instead of a dangling pointer.
      let acc = unsafe {
         if (*slot).is_null() {
            (data.init)()
         } else {
            let boxed = Box::from_raw(*slot);
            *slot = std::ptr::null_mut();
            *boxed
         }
      };
      match (data.step)(acc, &args) {
         Ok(next) => unsafe {
            *slot = Box::into_raw(Box::new(next));
            Ok(())
         },
         Err(e) => Err(e),
      }
   }));

   match outcome {
      Ok(Ok(())) => {}
      Ok(Err(e)) => unsafe { set_error(ctx, &e.to_string()) },
      Err(_) => {
         error!("panic in aggregate step callback (absorbed)");
         unsafe { set_error(ctx, "host function panicked") }
      }
   }
}

unsafe extern "C" fn aggregate_final_trampoline(ctx: *mut ffi::sqlite3_context) {
   let outcome = catch_unwind(AssertUnwindSafe(|| {
      // SAFETY: user_data is the AggregateContext installed at registration.
      let data = unsafe { &*(ffi::sqlite3_user_data(ctx) as *const AggregateContext) };

      // Passing size 0 avoids allocating when no row was ever stepped:
      // zero scanned rows leave the slot unset and the result is NULL.
      let slot = unsafe { ffi::sqlite3_aggregate_context(ctx, 0) } as *mut *mut Value;
      if slot.is_null() || unsafe { (*slot).is_null() } {
         return Ok(Value::Null);
      }
      // SAFETY: the slot holds the Box installed by the step trampoline;
      // taking it here releases the accumulator on every exit path.
      let acc = unsafe {
         let boxed = Box::from_raw(*slot);
         *slot = std::ptr::null_mut();
         *boxed
      };
      (data.finish)(acc)
   }));

   match outcome {
      Ok(Ok(value)) => unsafe { value.apply_to_context(ctx) },
      Ok(Err(e)) => unsafe { set_error(ctx, &e.to_string()) },
      Err(_) => {
         error!("panic in aggregate final callback (absorbed)");
         unsafe { set_error(ctx, "host function panicked") }
      }
   }
}

unsafe extern "C" fn destroy_scalar_context(ptr: *mut c_void) {
   if !ptr.is_null() {
      // SAFETY: ptr came from Box::into_raw at registration; the engine
      // calls this exactly once, after the last possible invocation.
      drop(unsafe { Box::from_raw(ptr as *mut ScalarContext) });
   }
}

unsafe extern "C" fn destroy_aggregate_context(ptr: *mut c_void) {
   if !ptr.is_null() {
      // SAFETY: see destroy_scalar_context.
      drop(unsafe { Box::from_raw(ptr as *mut AggregateContext) });
   }
}

/// Registration of host functions on a [`Connection`].
pub trait FunctionExt {
   /// Register a scalar function. `arity` of −1 accepts any argument count.
   ///
   /// The callback runs synchronously on whichever thread is stepping the
   /// statement and must not run SQL on the same connection. Returning an
   /// error fails the calling statement with the error's message.
   fn create_scalar_function<F>(&self, name: &str, arity: i32, f: F) -> Result<()>
   where
      F: Fn(&[Value]) -> Result<Value> + Send + 'static;

   /// Register an aggregate function as an `init`/`step`/`final` triple.
   ///
   /// The accumulator is allocated lazily on the first step of each call
   /// site; with zero scanned rows, `final` is never handed an accumulator
   /// and the aggregate yields NULL.
   fn create_aggregate_function<I, S, F>(
      &self,
      name: &str,
      arity: i32,
      init: I,
      step: S,
      finish: F,
   ) -> Result<()>
   where
      I: Fn() -> Value + Send + 'static,
      S: Fn(Value, &[Value]) -> Result<Value> + Send + 'static,
      F: Fn(Value) -> Result<Value> + Send + 'static;

   /// Register a one-argument typed function. An argument that fails
   /// conversion yields SQL NULL rather than an error, consistent with
   /// SQL's treatment of untypable operands.
   fn create_function1<A, R, F>(&self, name: &str, f: F) -> Result<()>
   where
      A: FromSql,
      R: Into<Value>,
      F: Fn(A) -> R + Send + 'static;

   /// Register a two-argument typed function (see
   /// [`create_function1`](Self::create_function1)).
   fn create_function2<A, B, R, F>(&self, name: &str, f: F) -> Result<()>
   where
      A: FromSql,
      B: FromSql,
      R: Into<Value>,
      F: Fn(A, B) -> R + Send + 'static;

   /// Register a three-argument typed function (see
   /// [`create_function1`](Self::create_function1)).
   fn create_function3<A, B, C, R, F>(&self, name: &str, f: F) -> Result<()>
   where
      A: FromSql,
      B: FromSql,
      C: FromSql,
      R: Into<Value>,
      F: Fn(A, B, C) -> R + Send + 'static;

   /// De-register the function with this name and arity. The engine
   /// releases the old context through its destroy callback.
   fn remove_function(&self, name: &str, arity: i32) -> Result<()>;
}

fn function_name(name: &str) -> Result<std::ffi::CString> {
   std::ffi::CString::new(name).map_err(|_| Error::InvalidString {
      what: "function name",
   })
}

impl FunctionExt for Connection {
   fn create_scalar_function<F>(&self, name: &str, arity: i32, f: F) -> Result<()>
   where
      F: Fn(&[Value]) -> Result<Value> + Send + 'static,
   {
      self.handle().ensure_open()?;
      let c_name = function_name(name)?;
      let data = Box::new(ScalarContext { func: Box::new(f) });
      let data = Box::into_raw(data) as *mut c_void;

      // SAFETY: the connection is open. Ownership of `data` transfers to
      // the engine; destroy_scalar_context reclaims it.
      let rc = unsafe {
         ffi::sqlite3_create_function_v2(
            self.handle().as_ptr(),
            c_name.as_ptr(),
            arity as c_int,
            ffi::SQLITE_UTF8,
            data,
            Some(scalar_trampoline),
            None,
            None,
            Some(destroy_scalar_context),
         )
      };
      if rc != ffi::SQLITE_OK {
         return Err(self.handle().last_error(rc));
      }
      debug!(name, arity, "registered scalar function");
      Ok(())
   }

   fn create_aggregate_function<I, S, F>(
      &self,
      name: &str,
      arity: i32,
      init: I,
      step: S,
      finish: F,
   ) -> Result<()>
   where
      I: Fn() -> Value + Send + 'static,
      S: Fn(Value, &[Value]) -> Result<Value> + Send + 'static,
      F: Fn(Value) -> Result<Value> + Send + 'static,
   {
      self.handle().ensure_open()?;
      let c_name = function_name(name)?;
      let data = Box::new(AggregateContext {
         init: Box::new(init),
         step: Box::new(step),
         finish: Box::new(finish),
      });
      let data = Box::into_raw(data) as *mut c_void;

      // SAFETY: as in create_scalar_function; aggregate registrations pass
      // step/final callbacks instead of a scalar one.
      let rc = unsafe {
         ffi::sqlite3_create_function_v2(
            self.handle().as_ptr(),
            c_name.as_ptr(),
            arity as c_int,
            ffi::SQLITE_UTF8,
            data,
            None,
            Some(aggregate_step_trampoline),
            Some(aggregate_final_trampoline),
            Some(destroy_aggregate_context),
         )
      };
      if rc != ffi::SQLITE_OK {
         return Err(self.handle().last_error(rc));
      }
      debug!(name, arity, "registered aggregate function");
      Ok(())
   }

   fn create_function1<A, R, F>(&self, name: &str, f: F) -> Result<()>
   where
      A: FromSql,
      R: Into<Value>,
      F: Fn(A) -> R + Send + 'static,
   {
      self.create_scalar_function(name, 1, move |args| {
         let Ok(a) = A::from_sql(&args[0]) else {
            return Ok(Value::Null);
         };
         Ok(f(a).into())
      })
   }

   fn create_function2<A, B, R, F>(&self, name: &str, f: F) -> Result<()>
   where
      A: FromSql,
      B: FromSql,
      R: Into<Value>,
      F: Fn(A, B) -> R + Send + 'static,
   {
      self.create_scalar_function(name, 2, move |args| {
         let (Ok(a), Ok(b)) = (A::from_sql(&args[0]), B::from_sql(&args[1])) else {
            return Ok(Value::Null);
         };
         Ok(f(a, b).into())
      })
   }

   fn create_function3<A, B, C, R, F>(&self, name: &str, f: F) -> Result<()>
   where
      A: FromSql,
      B: FromSql,
      C: FromSql,
      R: Into<Value>,
      F: Fn(A, B, C) -> R + Send + 'static,
   {
      self.create_scalar_function(name, 3, move |args| {
         let (Ok(a), Ok(b), Ok(c)) = (
            A::from_sql(&args[0]),
            B::from_sql(&args[1]),
            C::from_sql(&args[2]),
         ) else {
            return Ok(Value::Null);
         };
         Ok(f(a, b, c).into())
      })
   }

   fn remove_function(&self, name: &str, arity: i32) -> Result<()> {
      self.handle().ensure_open()?;
      let c_name = function_name(name)?;

      // SAFETY: registering with no callbacks de-registers; the engine
      // runs the previous registration's destroy callback.
      let rc = unsafe {
         ffi::sqlite3_create_function_v2(
            self.handle().as_ptr(),
            c_name.as_ptr(),
            arity as c_int,
            ffi::SQLITE_UTF8,
            std::ptr::null_mut(),
            None,
            None,
            None,
            None,
         )
      };
      if rc != ffi::SQLITE_OK {
         return Err(self.handle().last_error(rc));
      }
      debug!(name, arity, "removed function");
      Ok(())
   }
}
