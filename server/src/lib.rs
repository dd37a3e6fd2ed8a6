//! Wiring for the dispensary server binary.
//!
//! The binary itself lives in `main.rs`; this library holds the pieces that
//! are worth testing on their own: environment configuration and the HTTP
//! client for the appointment service.

#![forbid(unsafe_code)]

pub mod config;
pub mod encounters;

pub use config::Config;
pub use encounters::HttpEncounterDirectory;
