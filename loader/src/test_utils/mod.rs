pub mod database;
pub mod failpoints;
