//! Vigil report worker.
//!
//! Polls for pending reports, runs them through the generation pipeline
//! and keeps the caches swept. The binary entrypoint lives in `main.rs`.

pub mod background;
pub mod config;
pub mod dispatcher;
