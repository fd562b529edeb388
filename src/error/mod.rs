//! Error Handling Module
//!
//! - Core error types (`LlmError`, `ErrorCategory`)
//! - User-facing messages and upstream HTTP classification
//! - Conversions from common error types
//!
//! # Example
//!
//! ```rust,ignore
//! use chatrelay::error::{LlmError, ErrorCategory};
//!
//! let error = LlmError::api_error(429, "slow down");
//! assert_eq!(error.category(), ErrorCategory::RateLimit);
//! assert!(!error.is_retryable());
//! ```

mod conversions;
pub mod helpers;
pub mod types;

pub use helpers::*;
pub use types::*;
