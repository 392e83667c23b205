//! Validation layer for the HALO loader.
//!
//! Tracks the lifetime of every issued handle and checks the handle
//! arguments of each entry point before the call reaches a backend.
//! The two halves are:
//!
//! - [`HandleTracker`]: validity, dependency edges, and the open/closed
//!   state of recordable handles.
//! - [`ValidationLayer`]: the generic prologue/epilogue routine that
//!   entry points drive with [`OpDescriptor`] and [`HandleArg`] roles.
//!
//! All checks run synchronously on the calling thread, and a rejected
//! call never mutates tracker state.

pub mod checks;
pub mod tracker;

pub use checks::{HandleArg, OpDescriptor, ValidationConfig, ValidationLayer};
pub use tracker::HandleTracker;
