//! Helpers shared by unit and integration tests.
//!
//! - [`fault`] wraps tables and accounts to inject store failures.
//! - [`entities`] holds small entity types with ready-made descriptors.
//! - [`backup`] wires a backup service to in-memory accounts.
//! - [`failpoints`] configures failpoints for the duration of a test.

pub mod backup;
pub mod entities;
#[cfg(feature = "failpoints")]
pub mod failpoints;
pub mod fault;
