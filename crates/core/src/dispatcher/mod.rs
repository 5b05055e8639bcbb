//! Admission control and concurrent job scheduling.
//!
//! The [`Dispatcher`] turns inbound events into jobs, caps how many run at
//! once, and makes sure every admitted job produces exactly one outcome even
//! if its task panics.

mod config;
mod pool;
mod types;

pub use config::{DispatcherConfig, OverflowPolicy};
pub use pool::Dispatcher;
pub use types::{DispatchOutcome, DispatcherStatus};
