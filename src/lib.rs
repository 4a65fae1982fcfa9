//! shroud - parallel in-place file encryption.
//!
//! A controller process distributes per-file encrypt/decrypt jobs to a fixed
//! pool of forked worker processes over a bounded queue in POSIX shared
//! memory. The [`pool`] module is the queue and process-pool core; [`cipher`]
//! is the task executor the workers delegate to.

pub mod cipher;
pub mod cli;
pub mod error;
pub mod keys;
pub mod logging;
pub mod pool;
