//! Relayer operations - Library interface
//!
//! Re-exports internal modules for use in integration tests.

pub mod accessor;
pub mod bitmap;
pub mod config;
pub mod contracts;
pub mod desired;
pub mod error;
pub mod evm;
pub mod metrics;
pub mod output;
pub mod reconciler;
pub mod registry;
pub mod scheduler;
pub mod server;
pub mod types;
pub mod verifier;
