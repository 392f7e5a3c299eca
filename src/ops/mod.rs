// Operations
pub mod telemetry;
