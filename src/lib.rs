//! CGM dashboard backend.
//!
//! Polls per-patient Nightscout-style endpoints on a fixed period, merges
//! the readings into one classified series, and serves trend and table
//! projections plus a refresh stream over HTTP.

pub mod aggregate;
pub mod config;
pub mod error;
pub mod fetch;
pub mod metrics;
pub mod roster;
pub mod scheduler;
pub mod server;
pub mod types;
pub mod views;

#[cfg(test)]
pub(crate) mod testutil;
