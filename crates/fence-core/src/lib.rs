pub mod battery;
pub mod doctor;
pub mod engine;
pub mod geo;
pub mod session;
pub mod telemetry;
pub mod vehicle;
