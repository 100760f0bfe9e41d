mod connect;
#[cfg(feature = "test-utils")]
pub mod test_utils;

pub use connect::connect_to_database;
