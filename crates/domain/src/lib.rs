//! Shared types for the Tidemark telemetry agent: the error type, structured
//! trace events, and the configuration model.

pub mod config;
pub mod error;
pub mod trace;
