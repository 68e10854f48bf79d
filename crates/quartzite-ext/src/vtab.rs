//! Virtual-table modules: host-defined tables behind the engine's
//! xCreate/xBestIndex/xFilter cursor protocol.
//!
//! A host implements [`VtabModule`]; the bridge supplies every engine-side
//! C trampoline, marshalling constraint info, filter arguments, column
//! results, and row changes between the two worlds. The cursor value is an
//! associated type owned by the host; the bridge stores it opaquely inside
//! the engine's cursor allocation.

use std::ffi::{CStr, CString, c_char, c_int, c_void};
use std::panic::{AssertUnwindSafe, catch_unwind};

use libsqlite3_sys as ffi;
use tracing::{debug, error};

use quartzite_core::{Connection, Error, Result, Value};

/// One column of a virtual table's schema.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchemaColumn {
   pub name: String,
   pub decl_type: String,
   /// Hidden columns are usable in constraints but omitted from `SELECT *`.
   pub hidden: bool,
}

impl SchemaColumn {
   pub fn new(name: impl Into<String>, decl_type: impl Into<String>) -> Self {
      Self {
         name: name.into(),
         decl_type: decl_type.into(),
         hidden: false,
      }
   }

   pub fn hidden(name: impl Into<String>, decl_type: impl Into<String>) -> Self {
      Self {
         name: name.into(),
         decl_type: decl_type.into(),
         hidden: true,
      }
   }
}

/// Comparison operator of a WHERE-clause constraint offered to
/// [`VtabModule::best_index`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConstraintOp {
   Eq,
   Gt,
   Le,
   Lt,
   Ge,
   Match,
   Like,
   Glob,
   Regexp,
   Ne,
   IsNot,
   IsNotNull,
   IsNull,
   Is,
   Limit,
   Offset,
   /// An operator this bridge has no name for; the raw engine code.
   Other(u8),
}

impl ConstraintOp {
   fn from_code(op: u8) -> Self {
      match op as i32 {
         x if x == ffi::SQLITE_INDEX_CONSTRAINT_EQ as i32 => ConstraintOp::Eq,
         x if x == ffi::SQLITE_INDEX_CONSTRAINT_GT as i32 => ConstraintOp::Gt,
         x if x == ffi::SQLITE_INDEX_CONSTRAINT_LE as i32 => ConstraintOp::Le,
         x if x == ffi::SQLITE_INDEX_CONSTRAINT_LT as i32 => ConstraintOp::Lt,
         x if x == ffi::SQLITE_INDEX_CONSTRAINT_GE as i32 => ConstraintOp::Ge,
         x if x == ffi::SQLITE_INDEX_CONSTRAINT_MATCH as i32 => ConstraintOp::Match,
         x if x == ffi::SQLITE_INDEX_CONSTRAINT_LIKE as i32 => ConstraintOp::Like,
         x if x == ffi::SQLITE_INDEX_CONSTRAINT_GLOB as i32 => ConstraintOp::Glob,
         x if x == ffi::SQLITE_INDEX_CONSTRAINT_REGEXP as i32 => ConstraintOp::Regexp,
         x if x == ffi::SQLITE_INDEX_CONSTRAINT_NE as i32 => ConstraintOp::Ne,
         x if x == ffi::SQLITE_INDEX_CONSTRAINT_ISNOT as i32 => ConstraintOp::IsNot,
         x if x == ffi::SQLITE_INDEX_CONSTRAINT_ISNOTNULL as i32 => ConstraintOp::IsNotNull,
         x if x == ffi::SQLITE_INDEX_CONSTRAINT_ISNULL as i32 => ConstraintOp::IsNull,
         x if x == ffi::SQLITE_INDEX_CONSTRAINT_IS as i32 => ConstraintOp::Is,
         x if x == ffi::SQLITE_INDEX_CONSTRAINT_LIMIT as i32 => ConstraintOp::Limit,
         x if x == ffi::SQLITE_INDEX_CONSTRAINT_OFFSET as i32 => ConstraintOp::Offset,
         _ => ConstraintOp::Other(op),
      }
   }
}

/// A WHERE-clause constraint the planner is considering.
#[derive(Debug, Clone)]
pub struct IndexConstraint {
   /// Column index (zero-based; −1 for the rowid).
   pub column: i32,
   pub op: ConstraintOp,
   pub usable: bool,
}

/// One ORDER BY term of the query.
#[derive(Debug, Clone)]
pub struct IndexOrderBy {
   pub column: i32,
   pub desc: bool,
}

/// Per-constraint output of [`VtabModule::best_index`].
#[derive(Debug, Clone, Default)]
pub struct ConstraintUsage {
   /// One-based position in the `args` array passed to
   /// [`VtabModule::open`]; 0 leaves the constraint unconsumed.
   pub argv_index: i32,
   /// When set, the module guarantees the constraint holds and the engine
   /// skips its own re-check.
   pub omit: bool,
}

/// Planning information exchanged with the engine.
///
/// The bridge fills `constraints` and `order_by`; the module fills the
/// rest. The defaults describe a minimally-correct full table scan with
/// high cost, so a module that never touches the planner still works.
#[derive(Debug, Clone)]
pub struct IndexInfo {
   pub constraints: Vec<IndexConstraint>,
   pub order_by: Vec<IndexOrderBy>,
   pub constraint_usage: Vec<ConstraintUsage>,
   pub idx_num: i32,
   pub idx_str: Option<String>,
   pub order_by_consumed: bool,
   pub estimated_cost: f64,
   pub estimated_rows: i64,
}

impl IndexInfo {
   fn new(constraints: Vec<IndexConstraint>, order_by: Vec<IndexOrderBy>) -> Self {
      let usage_len = constraints.len();
      Self {
         constraints,
         order_by,
         constraint_usage: vec![ConstraintUsage::default(); usage_len],
         idx_num: 0,
         idx_str: None,
         order_by_consumed: false,
         estimated_cost: 1_000_000.0,
         estimated_rows: 1_000_000,
      }
   }
}

/// A row change decoded from the engine's xUpdate argument rules.
#[derive(Debug, Clone)]
pub enum VtabChange {
   Insert {
      /// Explicit rowid from the statement, if any.
      rowid: Option<i64>,
      values: Vec<Value>,
   },
   Update {
      rowid: i64,
      new_rowid: i64,
      values: Vec<Value>,
   },
   Delete {
      rowid: i64,
   },
}

/// A host-defined virtual-table module.
///
/// Registered per connection through
/// [`ModuleExt::create_module`]; the engine owns the registration and
/// releases it (through the bridge's destructor) at de-registration or
/// connection close.
///
/// At minimum implement `schema`, `open`, `next`, `eof`, `column`, and
/// `rowid`. `best_index` defaults to a full-scan plan and `update`
/// defaults to rejecting writes.
pub trait VtabModule: Send + 'static {
   /// Per-query cursor state, produced by [`open`](Self::open).
   type Cursor: Send + 'static;

   /// The ordered column list declared to the engine.
   fn schema(&self) -> Vec<SchemaColumn>;

   /// Query planning. Modules that can serve constraints fill in
   /// `constraint_usage` (one-based `argv_index` per consumed constraint),
   /// `idx_num`/`idx_str`, and the cost estimates.
   fn best_index(&self, _info: &mut IndexInfo) -> Result<()> {
      Ok(())
   }

   /// Begin a scan with the parameters chosen by `best_index`. `args`
   /// carries the constraint values in `argv_index` order.
   fn open(&self, idx_num: i32, idx_str: Option<&str>, args: &[Value]) -> Result<Self::Cursor>;

   /// Advance to the next row.
   fn next(&self, cursor: &mut Self::Cursor) -> Result<()>;

   /// Whether the cursor has moved past the last row.
   fn eof(&self, cursor: &Self::Cursor) -> bool;

   /// Value of column `idx` of the current row.
   fn column(&self, cursor: &Self::Cursor, idx: usize) -> Result<Value>;

   /// Rowid of the current row.
   fn rowid(&self, cursor: &Self::Cursor) -> Result<i64>;

   /// Apply a row change. The default rejects writes, making the table
   /// read-only.
   ///
   /// For an insert, the returned rowid is handed back to the engine so
   /// `last_insert_rowid` reflects it.
   fn update(&self, _change: VtabChange) -> Result<Option<i64>> {
      Err(Error::ReadOnly)
   }
}

struct ModuleState<M: VtabModule> {
   module: M,
}

#[repr(C)]
struct VtabInstance<M: VtabModule> {
   /// Must be first so the engine's `sqlite3_vtab*` is also a pointer to
   /// this struct.
   base: ffi::sqlite3_vtab,
   state: *const ModuleState<M>,
}

#[repr(C)]
struct CursorInstance<M: VtabModule> {
   /// Must be first, mirroring `VtabInstance::base`.
   base: ffi::sqlite3_vtab_cursor,
   cursor: Option<M::Cursor>,
}

/// Copy `s` into an engine-allocated NUL-terminated string (the engine
/// frees it with `sqlite3_free`).
unsafe fn engine_string(s: &str) -> *mut c_char {
   // SAFETY: sqlite3_malloc64 memory is writable for the requested size.
   unsafe {
      let buf = ffi::sqlite3_malloc64((s.len() + 1) as u64) as *mut u8;
      if buf.is_null() {
         return std::ptr::null_mut();
      }
      std::ptr::copy_nonoverlapping(s.as_ptr(), buf, s.len());
      buf.add(s.len()).write(0);
      buf as *mut c_char
   }
}

/// Record `message` on the table instance for the engine to surface.
unsafe fn set_vtab_error(vtab: *mut ffi::sqlite3_vtab, message: &str) {
   // SAFETY: vtab is the live instance for the failing call; a previous
   // message must be released with sqlite3_free before being replaced.
   unsafe {
      if !(*vtab).zErrMsg.is_null() {
         ffi::sqlite3_free((*vtab).zErrMsg as *mut c_void);
      }
      (*vtab).zErrMsg = engine_string(message);
   }
}

fn error_code(e: &Error) -> c_int {
   match e {
      Error::ReadOnly => ffi::SQLITE_READONLY,
      Error::Sqlite { code, .. } => *code,
      _ => ffi::SQLITE_ERROR,
   }
}

unsafe fn module_of<M: VtabModule>(vtab: *mut ffi::sqlite3_vtab) -> &'static M {
   // SAFETY: vtab was allocated by x_create as a VtabInstance<M>, and the
   // module state outlives every table instance (the engine disconnects
   // instances before destroying the module registration).
   unsafe { &(*(*(vtab as *mut VtabInstance<M>)).state).module }
}

unsafe fn cursor_parts<M: VtabModule>(
   cursor: *mut ffi::sqlite3_vtab_cursor,
) -> (&'static M, &'static mut Option<M::Cursor>) {
   // SAFETY: cursor was allocated by x_open as a CursorInstance<M>, and
   // the engine serializes operations on a single cursor.
   unsafe {
      let instance = &mut *(cursor as *mut CursorInstance<M>);
      let module = module_of::<M>(instance.base.pVtab);
      (module, &mut instance.cursor)
   }
}

unsafe extern "C" fn x_create<M: VtabModule>(
   db: *mut ffi::sqlite3,
   aux: *mut c_void,
   _argc: c_int,
   _argv: *const *const c_char,
   pp_vtab: *mut *mut ffi::sqlite3_vtab,
   pz_err: *mut *mut c_char,
) -> c_int {
   let outcome = catch_unwind(AssertUnwindSafe(|| {
      let state = aux as *const ModuleState<M>;
      // SAFETY: aux is the ModuleState installed at registration.
      let columns = unsafe { &(*state).module }.schema();

      // Assemble the declaration the engine parses for column names and
      // types. Identifier escaping is the caller's concern.
      let mut body = String::new();
      for (i, col) in columns.iter().enumerate() {
         if i > 0 {
            body.push_str(", ");
         }
         body.push_str(&col.name);
         if !col.decl_type.is_empty() {
            body.push(' ');
            body.push_str(&col.decl_type);
         }
         if col.hidden {
            body.push_str(" HIDDEN");
         }
      }
      let sql = format!("CREATE TABLE x({body})");
      let Ok(c_sql) = CString::new(sql) else {
         return Err(ffi::SQLITE_ERROR);
      };

      // SAFETY: db is the connection the engine is creating the table on.
      let rc = unsafe { ffi::sqlite3_declare_vtab(db, c_sql.as_ptr()) };
      if rc != ffi::SQLITE_OK {
         return Err(rc);
      }

      let instance = Box::new(VtabInstance::<M> {
         // SAFETY: sqlite3_vtab is a plain C struct the engine fills in.
         base: unsafe { std::mem::zeroed() },
         state,
      });
      // SAFETY: pp_vtab is the engine's out-pointer for the new instance.
      unsafe {
         *pp_vtab = Box::into_raw(instance) as *mut ffi::sqlite3_vtab;
      }
      Ok(())
   }));

   match outcome {
      Ok(Ok(())) => ffi::SQLITE_OK,
      Ok(Err(rc)) => rc,
      Err(_) => {
         error!("panic in virtual-table create callback (absorbed)");
         // SAFETY: pz_err is the engine's out-pointer for an error string.
         unsafe {
            if !pz_err.is_null() {
               *pz_err = engine_string("virtual-table module panicked");
            }
         }
         ffi::SQLITE_ERROR
      }
   }
}

unsafe extern "C" fn x_disconnect<M: VtabModule>(vtab: *mut ffi::sqlite3_vtab) -> c_int {
   if !vtab.is_null() {
      // SAFETY: vtab was allocated by x_create; the engine calls exactly
      // one of xDisconnect/xDestroy per instance.
      unsafe {
         let instance = Box::from_raw(vtab as *mut VtabInstance<M>);
         if !instance.base.zErrMsg.is_null() {
            ffi::sqlite3_free(instance.base.zErrMsg as *mut c_void);
         }
      }
   }
   ffi::SQLITE_OK
}

unsafe extern "C" fn x_best_index<M: VtabModule>(
   vtab: *mut ffi::sqlite3_vtab,
   info_ptr: *mut ffi::sqlite3_index_info,
) -> c_int {
   let outcome = catch_unwind(AssertUnwindSafe(|| {
      // SAFETY: info_ptr is the engine's planning struct for this call.
      let info = unsafe { &mut *info_ptr };

      let mut constraints = Vec::with_capacity(info.nConstraint as usize);
      for i in 0..info.nConstraint as usize {
         // SAFETY: aConstraint has nConstraint entries.
         let c = unsafe { &*info.aConstraint.add(i) };
         constraints.push(IndexConstraint {
            column: c.iColumn,
            op: ConstraintOp::from_code(c.op),
            usable: c.usable != 0,
         });
      }
      let mut order_by = Vec::with_capacity(info.nOrderBy as usize);
      for i in 0..info.nOrderBy as usize {
         // SAFETY: aOrderBy has nOrderBy entries.
         let o = unsafe { &*info.aOrderBy.add(i) };
         order_by.push(IndexOrderBy {
            column: o.iColumn,
            desc: o.desc != 0,
         });
      }

      let mut host_info = IndexInfo::new(constraints, order_by);
      let module = unsafe { module_of::<M>(vtab) };
      if let Err(e) = module.best_index(&mut host_info) {
         unsafe { set_vtab_error(vtab, &e.to_string()) };
         return Err(error_code(&e));
      }

      let usable = host_info.constraint_usage.len().min(info.nConstraint as usize);
      for i in 0..usable {
         let usage = &host_info.constraint_usage[i];
         // SAFETY: aConstraintUsage has nConstraint entries.
         unsafe {
            let out = &mut *info.aConstraintUsage.add(i);
            out.argvIndex = usage.argv_index;
            out.omit = usage.omit as u8;
         }
      }
      info.idxNum = host_info.idx_num;
      if let Some(idx_str) = &host_info.idx_str {
         // SAFETY: the engine frees idxStr because needToFreeIdxStr is set.
         info.idxStr = unsafe { engine_string(idx_str) };
         info.needToFreeIdxStr = 1;
      }
      info.orderByConsumed = host_info.order_by_consumed as c_int;
      info.estimatedCost = host_info.estimated_cost;
      info.estimatedRows = host_info.estimated_rows;
      Ok(())
   }));

   match outcome {
      Ok(Ok(())) => ffi::SQLITE_OK,
      Ok(Err(rc)) => rc,
      Err(_) => {
         error!("panic in virtual-table best_index callback (absorbed)");
         ffi::SQLITE_ERROR
      }
   }
}

unsafe extern "C" fn x_open<M: VtabModule>(
   _vtab: *mut ffi::sqlite3_vtab,
   pp_cursor: *mut *mut ffi::sqlite3_vtab_cursor,
) -> c_int {
   let instance = Box::new(CursorInstance::<M> {
      // SAFETY: sqlite3_vtab_cursor is a plain C struct the engine fills in.
      base: unsafe { std::mem::zeroed() },
      cursor: None,
   });
   // SAFETY: pp_cursor is the engine's out-pointer for the new cursor.
   unsafe {
      *pp_cursor = Box::into_raw(instance) as *mut ffi::sqlite3_vtab_cursor;
   }
   ffi::SQLITE_OK
}

unsafe extern "C" fn x_close<M: VtabModule>(cursor: *mut ffi::sqlite3_vtab_cursor) -> c_int {
   if !cursor.is_null() {
      // SAFETY: cursor was allocated by x_open.
      drop(unsafe { Box::from_raw(cursor as *mut CursorInstance<M>) });
   }
   ffi::SQLITE_OK
}

unsafe extern "C" fn x_filter<M: VtabModule>(
   cursor: *mut ffi::sqlite3_vtab_cursor,
   idx_num: c_int,
   idx_str: *const c_char,
   argc: c_int,
   argv: *mut *mut ffi::sqlite3_value,
) -> c_int {
   let outcome = catch_unwind(AssertUnwindSafe(|| {
      let (module, slot) = unsafe { cursor_parts::<M>(cursor) };

      let idx_str = if idx_str.is_null() {
         None
      } else {
         // SAFETY: idx_str is the NUL-terminated string from best_index.
         Some(unsafe { CStr::from_ptr(idx_str) }.to_string_lossy())
      };
      let mut args = Vec::with_capacity(argc as usize);
      for i in 0..argc as usize {
         // SAFETY: argv has argc valid value pointers.
         args.push(unsafe { Value::from_raw(*argv.add(i)) });
      }

      match module.open(idx_num, idx_str.as_deref(), &args) {
         Ok(host_cursor) => {
            *slot = Some(host_cursor);
            Ok(())
         }
         Err(e) => {
            unsafe { set_vtab_error((*cursor).pVtab, &e.to_string()) };
            Err(error_code(&e))
         }
      }
   }));

   match outcome {
      Ok(Ok(())) => ffi::SQLITE_OK,
      Ok(Err(rc)) => rc,
      Err(_) => {
         error!("panic in virtual-table filter callback (absorbed)");
         ffi::SQLITE_ERROR
      }
   }
}

unsafe extern "C" fn x_next<M: VtabModule>(cursor: *mut ffi::sqlite3_vtab_cursor) -> c_int {
   let outcome = catch_unwind(AssertUnwindSafe(|| {
      let (module, slot) = unsafe { cursor_parts::<M>(cursor) };
      let Some(host_cursor) = slot.as_mut() else {
         return Err(ffi::SQLITE_MISUSE);
      };
      match module.next(host_cursor) {
         Ok(()) => Ok(()),
         Err(e) => {
            unsafe { set_vtab_error((*cursor).pVtab, &e.to_string()) };
            Err(error_code(&e))
         }
      }
   }));

   match outcome {
      Ok(Ok(())) => ffi::SQLITE_OK,
      Ok(Err(rc)) => rc,
      Err(_) => {
         error!("panic in virtual-table next callback (absorbed)");
         ffi::SQLITE_ERROR
      }
   }
}

unsafe extern "C" fn x_eof<M: VtabModule>(cursor: *mut ffi::sqlite3_vtab_cursor) -> c_int {
   let outcome = catch_unwind(AssertUnwindSafe(|| {
      let (module, slot) = unsafe { cursor_parts::<M>(cursor) };
      match slot.as_ref() {
         Some(host_cursor) => module.eof(host_cursor),
         None => true,
      }
   }));

   match outcome {
      Ok(at_end) => at_end as c_int,
      Err(_) => {
         error!("panic in virtual-table eof callback (absorbed)");
         1
      }
   }
}

unsafe extern "C" fn x_column<M: VtabModule>(
   cursor: *mut ffi::sqlite3_vtab_cursor,
   ctx: *mut ffi::sqlite3_context,
   idx: c_int,
) -> c_int {
   let outcome = catch_unwind(AssertUnwindSafe(|| {
      let (module, slot) = unsafe { cursor_parts::<M>(cursor) };
      let Some(host_cursor) = slot.as_ref() else {
         return Err(ffi::SQLITE_MISUSE);
      };
      match module.column(host_cursor, idx as usize) {
         Ok(value) => {
            // SAFETY: ctx is the result slot for this column read.
            unsafe { value.apply_to_context(ctx) };
            Ok(())
         }
         Err(e) => {
            unsafe { set_vtab_error((*cursor).pVtab, &e.to_string()) };
            Err(error_code(&e))
         }
      }
   }));

   match outcome {
      Ok(Ok(())) => ffi::SQLITE_OK,
      Ok(Err(rc)) => rc,
      Err(_) => {
         error!("panic in virtual-table column callback (absorbed)");
         ffi::SQLITE_ERROR
      }
   }
}

unsafe extern "C" fn x_rowid<M: VtabModule>(
   cursor: *mut ffi::sqlite3_vtab_cursor,
   p_rowid: *mut ffi::sqlite3_int64,
) -> c_int {
   let outcome = catch_unwind(AssertUnwindSafe(|| {
      let (module, slot) = unsafe { cursor_parts::<M>(cursor) };
      let Some(host_cursor) = slot.as_ref() else {
         return Err(ffi::SQLITE_MISUSE);
      };
      match module.rowid(host_cursor) {
         Ok(rowid) => {
            // SAFETY: p_rowid is the engine's out-pointer.
            unsafe { *p_rowid = rowid };
            Ok(())
         }
         Err(e) => {
            unsafe { set_vtab_error((*cursor).pVtab, &e.to_string()) };
            Err(error_code(&e))
         }
      }
   }));

   match outcome {
      Ok(Ok(())) => ffi::SQLITE_OK,
      Ok(Err(rc)) => rc,
      Err(_) => {
         error!("panic in virtual-table rowid callback (absorbed)");
         ffi::SQLITE_ERROR
      }
   }
}

unsafe extern "C" fn x_update<M: VtabModule>(
   vtab: *mut ffi::sqlite3_vtab,
   argc: c_int,
   argv: *mut *mut ffi::sqlite3_value,
   p_rowid: *mut ffi::sqlite3_int64,
) -> c_int {
   let outcome = catch_unwind(AssertUnwindSafe(|| {
      let module = unsafe { module_of::<M>(vtab) };

      let mut args = Vec::with_capacity(argc as usize);
      for i in 0..argc as usize {
         // SAFETY: argv has argc valid value pointers.
         args.push(unsafe { Value::from_raw(*argv.add(i)) });
      }

      // Decode per the engine's xUpdate rules: a single argument is a
      // delete; a NULL first argument is an insert; otherwise an update.
      let change = if args.len() == 1 {
         VtabChange::Delete {
            rowid: args[0].as_integer().unwrap_or(0),
         }
      } else if args[0].is_null() {
         VtabChange::Insert {
            rowid: args[1].as_integer(),
            values: args[2..].to_vec(),
         }
      } else {
         let rowid = args[0].as_integer().unwrap_or(0);
         VtabChange::Update {
            rowid,
            new_rowid: args[1].as_integer().unwrap_or(rowid),
            values: args[2..].to_vec(),
         }
      };
      let inserting = matches!(change, VtabChange::Insert { .. });

      match module.update(change) {
         Ok(new_rowid) => {
            if inserting
               && let Some(rowid) = new_rowid
            {
               // SAFETY: p_rowid is the engine's out-pointer for the
               // rowid of an inserted row.
               unsafe {
                  if !p_rowid.is_null() {
                     *p_rowid = rowid;
                  }
               }
            }
            Ok(())
         }
         Err(e) => {
            unsafe { set_vtab_error(vtab, &e.to_string()) };
            Err(error_code(&e))
         }
      }
   }));

   match outcome {
      Ok(Ok(())) => ffi::SQLITE_OK,
      Ok(Err(rc)) => rc,
      Err(_) => {
         error!("panic in virtual-table update callback (absorbed)");
         ffi::SQLITE_ERROR
      }
   }
}

unsafe extern "C" fn destroy_module_state<M: VtabModule>(ptr: *mut c_void) {
   if !ptr.is_null() {
      // SAFETY: ptr came from Box::into_raw at registration; the engine
      // calls this once, after all table instances are disconnected.
      drop(unsafe { Box::from_raw(ptr as *mut ModuleState<M>) });
   }
}

fn module_definition<M: VtabModule>() -> ffi::sqlite3_module {
   // SAFETY: zeroing leaves every unimplemented callback as None.
   let mut def: ffi::sqlite3_module = unsafe { std::mem::zeroed() };
   def.iVersion = 1;
   def.xCreate = Some(x_create::<M>);
   def.xConnect = Some(x_create::<M>);
   def.xBestIndex = Some(x_best_index::<M>);
   def.xDisconnect = Some(x_disconnect::<M>);
   def.xDestroy = Some(x_disconnect::<M>);
   def.xOpen = Some(x_open::<M>);
   def.xClose = Some(x_close::<M>);
   def.xFilter = Some(x_filter::<M>);
   def.xNext = Some(x_next::<M>);
   def.xEof = Some(x_eof::<M>);
   def.xColumn = Some(x_column::<M>);
   def.xRowid = Some(x_rowid::<M>);
   def.xUpdate = Some(x_update::<M>);
   def
}

/// Virtual-table module registration on a [`Connection`].
pub trait ModuleExt {
   /// Register `module` under `name`, after which
   /// `CREATE VIRTUAL TABLE t USING name` binds tables to it.
   ///
   /// The module (and every callback closure it owns) is released by the
   /// engine-invoked destructor when the registration is replaced or the
   /// connection closes.
   fn create_module<M: VtabModule>(&self, name: &str, module: M) -> Result<()>;
}

impl ModuleExt for Connection {
   fn create_module<M: VtabModule>(&self, name: &str, module: M) -> Result<()> {
      self.handle().ensure_open()?;
      let c_name = CString::new(name).map_err(|_| Error::InvalidString {
         what: "module name",
      })?;

      let state = Box::new(ModuleState { module });
      // The C module definition must stay valid for as long as the
      // registration might be used; one small leaked allocation per
      // create_module call keeps it trivially immortal.
      let def: &'static ffi::sqlite3_module = Box::leak(Box::new(module_definition::<M>()));

      // SAFETY: the connection is open; ownership of the state box moves
      // to the engine, which releases it via destroy_module_state.
      let rc = unsafe {
         ffi::sqlite3_create_module_v2(
            self.handle().as_ptr(),
            c_name.as_ptr(),
            def,
            Box::into_raw(state) as *mut c_void,
            Some(destroy_module_state::<M>),
         )
      };
      if rc != ffi::SQLITE_OK {
         return Err(self.handle().last_error(rc));
      }
      debug!(name, "registered virtual-table module");
      Ok(())
   }
}
