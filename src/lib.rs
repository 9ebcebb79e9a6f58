pub mod call;
pub mod config;
pub mod error;
pub mod metrics;
pub mod poll;
pub mod probe;
pub mod session;
pub mod telemetry;
