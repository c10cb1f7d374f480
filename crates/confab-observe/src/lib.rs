//! Observability for Confab: tracing subscriber initialization and a
//! latency observer fed by the engine's event bus.

pub mod latency;
pub mod tracing_setup;
