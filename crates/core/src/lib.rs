//! Vigil domain types.
//!
//! Pure data structures and rules shared by every other crate: report
//! lifecycle status, report configuration and content, and the compiled
//! security dataset. This crate has no database or network dependencies.

pub mod dataset;
pub mod error;
pub mod report;
pub mod status;
pub mod types;
