//! Utility functions for the Cinder token tracker.
//!
//! This module is organized into focused submodules:
//!
//! - [`conversion`] - Decimal parsing and ratio helpers (raw amounts, percentages)
//! - [`retry`] - Bounded retry with exponential backoff for collaborator calls
//! - [`time`] - Wall-clock helpers

mod conversion;
mod retry;
mod time;

// ============================================
// Re-exports
// ============================================

// Conversion utilities
pub use conversion::{parse_decimal, percentage, ratio_or_zero, ui_amount_from_raw};

// Retry utilities
pub use retry::{retry_with_backoff, RetryPolicy};

// Time utilities
pub use time::{now_ms, now_secs};
