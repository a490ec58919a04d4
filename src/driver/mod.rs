//! Local task driver: the loop that re-invokes the engine after suspensions
//! and the store its outputs persist to.

mod runner;
mod store;

pub use runner::{next_countdown, Runner};
pub use store::{FileOutputStore, OutputStore};
