//! Typed entity storage on top of a partitioned key-value table store.
//!
//! Entity types are mapped to rows by an [`entity::EntityDescriptor`], which decides how
//! the partition and row keys are derived ([`keys`]) and how members become properties
//! ([`codec`]). [`repository::EntityRepository`] persists entities with save modifiers and
//! optimistic concurrency, [`query`] turns member conditions into store filters, and
//! [`backup`] copies whole accounts in bounded, resumable invocations.

pub mod backup;
pub mod codec;
pub mod concurrency;
pub mod entity;
pub mod error;
#[cfg(feature = "failpoints")]
pub mod failpoints;
pub mod keys;
mod macros;
pub mod query;
pub mod repository;
pub mod store;
#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;
pub mod types;
