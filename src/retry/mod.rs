//! Retry Module
//!
//! Bounded exponential backoff for transient (timeout / network) failures.

pub mod policy;

pub use policy::{RetryExecutor, RetryPolicy};
