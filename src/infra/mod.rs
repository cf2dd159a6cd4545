//! Infrastructure adapters and runtime bootstrap.

pub mod error;
pub mod kv;
pub mod telemetry;
pub mod upstream;
