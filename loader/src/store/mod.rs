//! Table stores the loaders run against.
//!
//! [`TableStore`] is implemented by [`postgres::PgTableStore`] for real loads and by
//! [`memory::MemoryTableStore`] for tests and dry runs.

mod base;
pub mod memory;
pub mod postgres;

pub use base::{KeyConstraint, KeyGroup, TableStore};
