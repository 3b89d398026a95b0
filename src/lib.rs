//! Purpose: Shared library crate used by the `student-registry` CLI and tests.
//! Exports: `core` (store, validation, errors) and `api` (registry operations, remote client).
//! Role: Backs the HTTP server and the CLI client commands.
//! Invariants: The store is an explicit value owned by its caller; there is no global state.
//! Invariants: Core modules prefer explicit inputs/outputs over hidden state.
pub mod api;
pub mod core;
