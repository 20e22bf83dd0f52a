//! Hardware device support: transport boundary, session state machine and
//! the signing engine that drives per-app device flows.

pub mod engine;
pub mod session;
pub mod transport;
