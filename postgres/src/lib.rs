//! Postgres helpers shared by the loader crates: table naming and column schemas,
//! connection pools, and test database management.

pub mod schema;
pub mod sqlx;
