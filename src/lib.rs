//! AutoSentinel Library
//!
//! Multi-source price monitoring with threshold-gated state updates

pub mod config;
pub mod engine;
pub mod error;
pub mod ledger;
pub mod oracle;
pub mod orchestrator;
pub mod persistence;
pub mod store;
pub mod types;
