//! Row and batch types moved between the normalizer, the loaders and the stores.
//!
//! Table naming and column schema types live in the `postgres` crate and are re-exported here.

mod batch;
mod cell;
mod table_row;

pub use batch::*;
pub use cell::*;
pub use table_row::*;

// Re-exports.
pub use postgres::schema::*;
