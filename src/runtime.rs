//! Runtime glue: configuration, progress tracking, telemetry and the runner
//! that sequences ecosystems.

pub mod config;
pub mod progress;
pub mod runner;
pub mod telemetry;
