#[path = "../common/mod.rs"]
mod common;

mod postgres_store_test;
mod postgres_swap_test;
mod postgres_upsert_test;
