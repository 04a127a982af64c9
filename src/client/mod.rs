//! Headless session driver

pub mod runner;

pub use runner::{run_session, ClientError, SessionConfig, SessionReport};
