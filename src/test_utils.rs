//! Test doubles shared by unit tests, integration tests, doc tests and benches.
//!
//! Compiled only for the crate's own tests or with the `test-utils` feature.

pub mod memory;
