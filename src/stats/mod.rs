//! Statistics and metrics
//!
//! Provides observability into the type cache and remote calls.

pub mod metrics;

pub use metrics::{AcceleratorStats, RemotingStats};
pub(crate) use metrics::{AcceleratorCounters, RemotingCounters};
