//! Test utilities for the message store
//!
//! Fixtures for building message DAGs and opening throwaway stores, plus
//! assertions that keep page and hash comparisons readable.

pub mod assertions;
pub mod fixtures;

pub use assertions::*;
pub use fixtures::*;
