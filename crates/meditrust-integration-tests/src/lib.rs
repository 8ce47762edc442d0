//! Integration test crate for MediTrust.
//!
//! This crate has no library code. It only contains integration tests that
//! exercise end-to-end flows across the workspace crates: registration,
//! tiered reads, the two-signature approval and chain audits against SQLite.
//!
//! Run all integration tests:
//! ```sh
//! cargo test -p meditrust-integration-tests
//! ```
