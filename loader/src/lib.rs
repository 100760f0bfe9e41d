//! Idempotent table loads.
//!
//! A load installs new data into a target table inside one transaction so that readers
//! never see a partial result and re-running it never duplicates rows. Two loads exist:
//!
//! - [`load::upsert::UpsertLoader`] stages a [`types::Batch`] (usually produced by
//!   [`normalize::DailySeriesNormalizer`]) and merges it into the target on its key.
//! - [`load::swap::SwapLoader`] materializes a query into a shadow table and swaps it
//!   with the target.
//!
//! Both check logical key uniqueness before the new data becomes visible, and both run
//! against any [`store::TableStore`].

pub mod error;
pub mod failpoints;
pub mod load;
mod macros;
pub mod normalize;
pub mod store;
#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;
pub mod transaction;
pub mod types;
pub mod validation;
