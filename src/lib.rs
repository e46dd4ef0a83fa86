//! Purpose: Single-resolution promise engine with then-able assimilation.
//! Exports: `api` (handles, engine, payload traits, errors), `conformance` (manifest runner).
//! Role: Library backing the `resolvent` CLI and integration tests.
//! Invariants: Engine state is single-threaded (`Rc`); handles are not `Send`.
//! Invariants: Failures surface as rejected promises, never as panics or `Err` from settling.
pub mod api;
pub mod conformance;
mod core;
