//! Fixed-window rate limiting.

pub mod limiter;
pub mod store;

pub use limiter::{RateConcern, RateLimiter};
pub use store::{Admission, CounterStore, MemoryCounterStore, WindowState};
