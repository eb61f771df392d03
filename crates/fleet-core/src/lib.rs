//! fleet-core — shared configuration for the ollama-fleet control plane.
//!
//! `FleetConfig` is loaded from a `fleet.toml` file. Every field has a
//! default, so an empty file (or no file at all) yields a working
//! single-node setup.

pub mod config;

pub use config::{
    ConfigError, FleetConfig, MetricsConfig, ProbeKind, ScalingSection, ServerConfig,
    WorkerConfig,
};
