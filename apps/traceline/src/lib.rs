//! # Traceline Application Library
//!
//! Wires the deterministic lineage core into an HTTP server, a sync
//! client, and a CLI. Integration tests drive the router through this
//! crate.

pub mod api;
pub mod cli;
pub mod client;
pub mod config;
