// Core modules: store access, key schema, value decoding, and the two audit engines.
pub mod aggregate;
pub mod error;
pub mod reconcile;
pub mod schema;
pub mod store;
pub mod timestamp;
