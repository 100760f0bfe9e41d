#[path = "../common/mod.rs"]
mod common;

mod load_test;
