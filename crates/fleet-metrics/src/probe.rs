//! GPU telemetry probes.
//!
//! A probe never fails from the caller's point of view: any error is
//! logged and reported as a zeroed reading, which biases the scaling
//! loop towards not scaling up.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::process::Command;
use tracing::{debug, warn};

/// One GPU reading, shared by every model in a scaling cycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ScalingMetrics {
    pub gpu_utilization_pct: f64,
    pub vram_used_mb: f64,
}

/// Source of GPU telemetry.
#[async_trait]
pub trait MetricsProbe: Send + Sync {
    /// Current reading; zeroed if the source is unavailable.
    async fn read(&self) -> ScalingMetrics;
}

/// Why a probe produced no reading.
#[derive(Debug, Error)]
pub enum ProbeError {
    #[error("failed to run {command}: {source}")]
    Spawn {
        command: String,
        source: std::io::Error,
    },

    #[error("{command} timed out after {timeout:?}")]
    Timeout { command: String, timeout: Duration },

    #[error("{command} exited with {status}: {stderr}")]
    Exit {
        command: String,
        status: std::process::ExitStatus,
        stderr: String,
    },

    #[error("unparseable probe output: {0}")]
    Parse(String),
}

/// Reads utilization and memory from `nvidia-smi`.
pub struct NvidiaSmiProbe {
    command: String,
    timeout: Duration,
}

impl NvidiaSmiProbe {
    pub fn new() -> Self {
        Self {
            command: "nvidia-smi".to_string(),
            timeout: Duration::from_secs(5),
        }
    }

    /// Use a different binary path (e.g. a wrapper script).
    pub fn with_command(mut self, command: impl Into<String>) -> Self {
        self.command = command.into();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    async fn query(&self) -> Result<ScalingMetrics, ProbeError> {
        let output = Command::new(&self.command)
            .args([
                "--query-gpu=utilization.gpu,memory.used",
                "--format=csv,noheader,nounits",
            ])
            .kill_on_drop(true)
            .output();

        let output = tokio::time::timeout(self.timeout, output)
            .await
            .map_err(|_| ProbeError::Timeout {
                command: self.command.clone(),
                timeout: self.timeout,
            })?
            .map_err(|source| ProbeError::Spawn {
                command: self.command.clone(),
                source,
            })?;

        if !output.status.success() {
            return Err(ProbeError::Exit {
                command: self.command.clone(),
                status: output.status,
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        parse_nvidia_smi(&String::from_utf8_lossy(&output.stdout))
    }
}

impl Default for NvidiaSmiProbe {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl MetricsProbe for NvidiaSmiProbe {
    async fn read(&self) -> ScalingMetrics {
        match self.query().await {
            Ok(metrics) => {
                debug!(
                    gpu_pct = metrics.gpu_utilization_pct,
                    vram_mb = metrics.vram_used_mb,
                    "gpu metrics read"
                );
                metrics
            }
            Err(e) => {
                warn!(error = %e, "failed to get GPU metrics");
                ScalingMetrics::default()
            }
        }
    }
}

/// Parse `utilization.gpu,memory.used` CSV rows, one per GPU.
///
/// Multiple GPUs are folded into a single reading: mean utilization and
/// total memory used.
pub fn parse_nvidia_smi(output: &str) -> Result<ScalingMetrics, ProbeError> {
    let mut util_sum = 0.0;
    let mut vram_sum = 0.0;
    let mut gpus = 0u32;

    for line in output.lines().map(str::trim).filter(|l| !l.is_empty()) {
        let mut fields = line.split(',').map(str::trim);
        let (Some(util), Some(vram)) = (fields.next(), fields.next()) else {
            return Err(ProbeError::Parse(line.to_string()));
        };
        let util: f64 = util
            .parse()
            .map_err(|_| ProbeError::Parse(line.to_string()))?;
        let vram: f64 = vram
            .parse()
            .map_err(|_| ProbeError::Parse(line.to_string()))?;
        util_sum += util;
        vram_sum += vram;
        gpus += 1;
    }

    if gpus == 0 {
        return Err(ProbeError::Parse("no GPU rows".to_string()));
    }

    Ok(ScalingMetrics {
        gpu_utilization_pct: util_sum / f64::from(gpus),
        vram_used_mb: vram_sum,
    })
}

/// Returns a fixed reading that can be swapped at runtime.
#[derive(Clone, Default)]
pub struct StaticProbe {
    reading: Arc<Mutex<ScalingMetrics>>,
}

impl StaticProbe {
    pub fn new(gpu_utilization_pct: f64, vram_used_mb: f64) -> Self {
        Self {
            reading: Arc::new(Mutex::new(ScalingMetrics {
                gpu_utilization_pct,
                vram_used_mb,
            })),
        }
    }

    pub fn set(&self, metrics: ScalingMetrics) {
        *self.reading.lock().unwrap_or_else(PoisonError::into_inner) = metrics;
    }
}

#[async_trait]
impl MetricsProbe for StaticProbe {
    async fn read(&self) -> ScalingMetrics {
        *self.reading.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
