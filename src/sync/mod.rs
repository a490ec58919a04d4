//! Incremental, resumable synchronization.

mod engine;
mod merge;
mod output;

pub use engine::{Suspension, SyncEngine, SyncOutcome, SyncSettings};
pub use merge::{carry_over, merge};
pub use output::{ResourceData, SyncOutput};
