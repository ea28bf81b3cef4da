// Market data domain
pub mod market;

// Feature contract and prediction payloads
pub mod ml;

// Port interfaces
pub mod ports;

// Domain-specific error types
pub mod errors;
