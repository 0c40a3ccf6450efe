//! Service plumbing shared by Cermont binaries: tracing setup, health probes,
//! request ids and serde helpers.

pub mod health;
pub mod middleware;
pub mod serde;
pub mod tracing;
