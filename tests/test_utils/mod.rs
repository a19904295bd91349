pub mod fixtures;
pub mod gated;

pub use fixtures::{client_with, durable_config, memory_config, track_numbered};
pub use gated::{Gate, GatedTransport, gated};
