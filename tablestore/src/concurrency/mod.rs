//! Retry helpers shared by the backup engine.

pub mod backoff;
