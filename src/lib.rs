//! lics-sync Library
//!
//! Concurrent engine shared by the LiCSAR mirror (`lics-fetch`) and the
//! archive metadata harvester (`lics-meta`): interleaved job partitioning,
//! a lane pool with cooperative cancellation, shared progress accounting and
//! idempotent HTTP transfers.

pub mod cancel;
pub mod cli;
pub mod config;
pub mod harvest;
pub mod http;
pub mod job;
pub mod logger;
pub mod manifest;
pub mod partition;
pub mod paths;
pub mod pool;
pub mod progress;
pub mod transfer;
