//! ticksched Property-Based Tests
//!
//! Standalone test suite using proptest for scheduling invariants.
//!
//! # Usage
//!
//! ```bash
//! cargo test -p ticksched-property-tests                     # All suites
//! cargo test -p ticksched-property-tests --test prop_timing  # One suite
//! PROPTEST_CASES=1000 cargo test -p ticksched-property-tests # More cases
//! ```
//!
//! # Test Suites
//!
//! - `table`: first-free allocation, capacity, slot reuse
//! - `timing`: activation ticks for any delay/period
//! - `dispatch`: slot order, fault isolation, one-shot retirement
//! - `guard`: busy ticks never start a second pass

// Re-export for convenience in tests
pub use ticksched::*;
