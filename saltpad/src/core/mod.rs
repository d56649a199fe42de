//! Deterministic, pure logic for interpreting salt returns.
//!
//! Core modules must be free of I/O side effects. They operate on in-memory
//! data structures and return deterministic outputs suitable for tests.

pub mod aggregate;
pub mod classifier;
pub mod render;
pub mod selection;
pub mod step_id;
pub mod types;
