//! fleet.toml configuration parser.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

/// Configuration validation errors.
#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("scaling.interval_secs must be greater than zero")]
    ZeroInterval,

    #[error("scaling.request_divisor must be greater than zero")]
    ZeroDivisor,

    #[error("scaling.vram_budget_mb must be positive, got {0}")]
    InvalidVramBudget(f64),

    #[error("scaling.vram_headroom must be within (0, 1], got {0}")]
    InvalidHeadroom(f64),

    #[error("workers.base_port must be non-zero")]
    ZeroBasePort,

    #[error("workers.command_timeout_secs must be greater than zero")]
    ZeroCommandTimeout,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct FleetConfig {
    pub server: ServerConfig,
    pub scaling: ScalingSection,
    pub workers: WorkerConfig,
    pub metrics: MetricsConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ServerConfig {
    /// Port the HTTP front door listens on.
    pub port: u16,
    /// Maximum accepted request body for `/v1/generate`, in bytes.
    pub max_body_bytes: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: 8080,
            max_body_bytes: 16 * 1024 * 1024,
        }
    }
}

/// Tunables for the periodic scaling cycle.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ScalingSection {
    pub interval_secs: u64,
    /// GPU utilization (percent) above which one extra worker is wanted.
    pub gpu_threshold_pct: f64,
    /// Request count above which demand adds workers.
    pub request_threshold: u64,
    /// Requests per additional worker once over the threshold.
    pub request_divisor: u64,
    /// VRAM each worker is assumed to need, in MB.
    pub vram_budget_mb: f64,
    /// Fraction of the VRAM reading usable for workers.
    pub vram_headroom: f64,
}

impl Default for ScalingSection {
    fn default() -> Self {
        Self {
            interval_secs: 30,
            gpu_threshold_pct: 70.0,
            request_threshold: 10,
            request_divisor: 5,
            vram_budget_mb: 4000.0,
            vram_headroom: 0.9,
        }
    }
}

impl ScalingSection {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }
}

/// How worker containers are launched and addressed.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct WorkerConfig {
    /// First host port handed out to a worker.
    pub base_port: u16,
    /// Host the router hands out in worker endpoints.
    pub host: String,
    pub image: String,
    /// Port the inference server listens on inside the container.
    pub container_port: u16,
    pub name_prefix: String,
    /// Trigger `ollama pull <model>` after the container starts.
    pub pull_on_start: bool,
    /// Upper bound for a single `docker` invocation.
    pub command_timeout_secs: u64,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            base_port: 11434,
            host: "127.0.0.1".to_string(),
            image: "ollama/ollama".to_string(),
            container_port: 11434,
            name_prefix: "ollama".to_string(),
            pull_on_start: true,
            command_timeout_secs: 120,
        }
    }
}

impl WorkerConfig {
    pub fn command_timeout(&self) -> Duration {
        Duration::from_secs(self.command_timeout_secs)
    }
}

/// Which GPU telemetry source to read.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "kebab-case")]
pub enum ProbeKind {
    #[default]
    NvidiaSmi,
    /// Constant reading taken from `static_gpu_pct` / `static_vram_mb`.
    Static,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct MetricsConfig {
    pub probe: ProbeKind,
    pub static_gpu_pct: f64,
    pub static_vram_mb: f64,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            probe: ProbeKind::NvidiaSmi,
            static_gpu_pct: 0.0,
            static_vram_mb: 0.0,
        }
    }
}

impl FleetConfig {
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> anyhow::Result<Self> {
        let config: FleetConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_toml_string(&self) -> anyhow::Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Reject values that would make the scaling arithmetic meaningless.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let s = &self.scaling;
        if s.interval_secs == 0 {
            return Err(ConfigError::ZeroInterval);
        }
        if s.request_divisor == 0 {
            return Err(ConfigError::ZeroDivisor);
        }
        if !(s.vram_budget_mb.is_finite() && s.vram_budget_mb > 0.0) {
            return Err(ConfigError::InvalidVramBudget(s.vram_budget_mb));
        }
        if !(s.vram_headroom > 0.0 && s.vram_headroom <= 1.0) {
            return Err(ConfigError::InvalidHeadroom(s.vram_headroom));
        }
        if self.workers.base_port == 0 {
            return Err(ConfigError::ZeroBasePort);
        }
        if self.workers.command_timeout_secs == 0 {
            return Err(ConfigError::ZeroCommandTimeout);
        }
        Ok(())
    }
}
