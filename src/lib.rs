//! stresslab: bounded-concurrency HTTP load generation with live progress.
//!
//! The [`loadtest`] module holds the engine: a [`Dispatcher`](loadtest::dispatcher::Dispatcher)
//! that issues a fixed request budget under a concurrency cap, an
//! [`Aggregator`](loadtest::aggregator::Aggregator) that folds outcomes into
//! snapshots and a terminal summary, and a
//! [`Controller`](loadtest::controller::Controller) that drives one run from
//! `pending` to a terminal state.

pub mod loadtest;
