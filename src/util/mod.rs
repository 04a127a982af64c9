//! Shared helpers

pub mod id;
pub mod logging;
pub mod rate_limit;
pub mod time;
