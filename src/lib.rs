//! # handoff
//!
//! Bounded concurrent work queue with completion hand-off.
//!
//! Units of work run on worker threads with a fixed concurrency bound; every
//! result is marshalled back to a single serialized completion sink that
//! owns all display-side state. Two jobs are built on it: a long counting
//! calculation and a batch of parallel downloads.

pub mod config;
pub mod engine;
pub mod error;
pub mod event;
pub mod job;
pub mod model;
pub mod service;
pub mod telemetry;
