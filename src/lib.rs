//! Per-light color and intensity control for an effect server.
//!
//! Edits go into a [`model::LightState`] owned by a [`controller::Controller`],
//! which debounces them and sends the whole state as one effect server v1
//! packet over UDP.

pub mod client;
pub mod config;
pub mod controller;
pub mod listener;
pub mod model;
pub mod parser;
pub mod protocol;

/// Install the tracing subscriber used by the binaries.
///
/// Honors `RUST_LOG`, defaulting to `info`.
pub fn init_logging() {
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}
