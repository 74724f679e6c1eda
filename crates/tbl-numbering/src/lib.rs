//! Sequential numbering for billing documents.
//!
//! One durable counter per (numbering domain, period), advanced only by an
//! atomic compare-and-swap on the store. Numbers are never derived from
//! clocks or randomness and never cached in memory, so concurrent callers
//! (threads or restarts) always receive distinct, gapless, increasing values.
//!
//! Each rendered series (`{prefix}{period_short}`) is owned by exactly one
//! counter, so identifiers never repeat across domains or periods.

pub mod allocator;
pub mod config;
pub mod error;

pub use allocator::{SequenceAllocator, SequenceCounter, SequenceKey};
pub use config::{AllocatorConfig, NumberFormat};
pub use error::{NumberingError, NumberingResult};
