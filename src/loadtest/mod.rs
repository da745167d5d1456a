//! Load testing engine for HTTP endpoints.
//!
//! Provides typed TOML configuration, a pluggable request target,
//! transport error classification, nearest-rank latency aggregation,
//! and the run controller with its progress and persistence sinks.

pub mod aggregator;
pub mod config;
pub mod controller;
pub mod dispatcher;
pub mod display;
pub mod error;
pub mod outcome;
pub mod sink;
pub mod store;
pub mod summary;
pub mod target;
