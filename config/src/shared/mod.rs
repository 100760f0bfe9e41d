mod base;
mod connection;
mod jobs;
mod table;

pub use base::*;
pub use connection::*;
pub use jobs::*;
pub use table::*;
