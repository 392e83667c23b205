//! Application-facing entry points, one module per object category.
//!
//! Every operation follows the same shape: validation prologue over the
//! call's handle roles, routing to the owning backend, the backend
//! call, then the lifecycle epilogue on success.

mod command;
mod context;
mod device;
mod driver;
mod image;
mod module;
mod queue;
mod sync;
