mod backup;
mod base;
mod connection;
mod repository;
mod worker;

pub use backup::*;
pub use base::*;
pub use connection::*;
pub use repository::*;
pub use worker::*;
