//! Composition and lifecycle layer of a block relay.
//!
//! The relay serves a proposer-facing and a builder-facing API behind one
//! listener and keeps a sliding baseline of submitted payload sizes to flag
//! anomalous bids.

pub mod api;
pub mod beacon;
pub mod config;
pub mod core;
pub mod datastore;
pub mod logging;
pub mod orchestration;
pub mod service;
pub(crate) mod utils;
