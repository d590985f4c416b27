//! fleetscale-core — shared building blocks for the fleetscale control loop.
//!
//! - [`types`]: the per-check data model (samples, observations, decisions).
//! - [`config`]: the `fleetscale.toml` document and its validation.
//! - [`http`]: a minimal JSON-over-HTTP/1 client with a hard deadline, used
//!   for both the decision service and the orchestrator API.

pub mod config;
pub mod http;
pub mod types;

pub use config::{ConfigError, FleetscaleConfig, PolicyStrategy};
pub use types::*;
