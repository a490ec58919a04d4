//! Incremental, rate-limited, resumable sync of calendar-partitioned personal
//! data from a remote API.
//!
//! The pieces, leaves first:
//! - [`ratelimit`]: request budgets per realm over a rolling window
//! - [`cache`]: append-only response log with a trust policy
//! - [`catalog`]: the table of resources and their partitioning
//! - [`sync`]: the state machine that ties them together
//! - [`driver`]: a local suspend/resume loop and output store

pub mod cache;
pub mod catalog;
pub mod clock;
pub mod config;
pub mod db;
pub mod driver;
pub mod error;
pub mod logging;
pub mod ratelimit;
pub mod remote;
pub mod sync;

pub use error::{Result, SyncError};
pub use sync::{SyncEngine, SyncOutcome, SyncOutput};
