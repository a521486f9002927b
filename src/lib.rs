//! Purpose: Library crate backing the `dexaudit` CLI and its tests.
//! Exports: `core` (stores, key schema, audit engines, errors) and `report` (rendering).
//! Role: Read-only audits of a node store and its paired matcher store.
//! Invariants: No code path writes to a store.
//! Invariants: Store-level failures are returned as `core::error::Error`; only the binary exits.
pub mod core;
pub mod report;
