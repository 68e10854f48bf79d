//! # quartzite-ext
//!
//! Host-callback bridges for the quartzite SQLite bridge: user-defined
//! functions, the update hook, and virtual-table modules.
//!
//! Everything here operates on the raw engine handle exposed by
//! [`quartzite_core::Connection::handle`], installing C trampolines whose
//! contexts are boxed host callbacks. Contexts are released only by the
//! engine-invoked destructors (or, for the single-slot update hook, when a
//! replacement reclaims the previous slot), so the engine can never call
//! into freed memory.
//!
//! ## Registration surfaces
//!
//! - **[`FunctionExt`]**: scalar and aggregate SQL functions, typed
//!   one/two/three-argument adapters, de-registration
//! - **[`HookExt`]**: the update hook (insert/update/delete notifications)
//! - **[`ModuleExt`]**: virtual-table modules implementing [`VtabModule`]
//!
//! ## Ready-made modules
//!
//! - **[`ArrayTable`]**: a mutable in-memory table addressable from SQL
//!   and from the host side
//! - **[`Generator`]**: a read-only lazily generated sequence
//!
//! All host callbacks run synchronously on the thread stepping the
//! statement and must not execute SQL on the same connection. Panics are
//! caught at the FFI boundary, logged, and surfaced as statement errors
//! where the engine accepts one.

mod array_table;
mod function;
mod generator;
mod hook;
mod vtab;

pub use array_table::{ArrayRow, ArrayTable};
pub use function::FunctionExt;
pub use generator::Generator;
pub use hook::{HookAction, HookExt};
pub use vtab::{
   ConstraintOp, ConstraintUsage, IndexConstraint, IndexInfo, IndexOrderBy, ModuleExt,
   SchemaColumn, VtabChange, VtabModule,
};
