//! Resilience helpers for the pipeline services
//!
//! - **Retry**: bounded retry with exponential backoff and jitter, used for
//!   startup checks against Kafka and ClickHouse
//! - **Backoff**: consecutive-failure tracker for long-running loops
//! - **Timeout**: time limits on external calls
//!
//! # Example: startup check with retry
//!
//! ```rust,no_run
//! use resilience::{with_retry, RetryConfig};
//!
//! #[tokio::main]
//! async fn main() {
//!     let result = with_retry(RetryConfig::default(), "broker metadata", || async {
//!         // Your broker call here
//!         Ok::<_, String>(())
//!     })
//!     .await;
//! }
//! ```

pub mod backoff;
pub mod retry;
pub mod timeout;

// Re-export main types for convenience
pub use backoff::Backoff;
pub use retry::{with_retry, RetryConfig, RetryError};
pub use timeout::{with_timeout, TimeoutError};
