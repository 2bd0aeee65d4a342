//! Periodic access-token refresh

mod scheduler;

pub use scheduler::{CycleReport, RefreshConfig, RefreshScheduler, MAX_REFRESH_THRESHOLD};
