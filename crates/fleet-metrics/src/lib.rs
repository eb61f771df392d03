//! fleet-metrics — the signals the scaling loop reads.
//!
//! # Architecture
//!
//! ```text
//! DemandTracker
//!   ├── record()  ← called per routed request
//!   └── drain()   → read-and-reset once per scaling cycle
//!
//! MetricsProbe
//!   ├── NvidiaSmiProbe  (nvidia-smi CSV query)
//!   └── StaticProbe     (fixed reading, for tests and GPU-less hosts)
//!
//! Prometheus exposition
//!   └── render_prometheus() → text/plain for /metrics endpoint
//! ```

pub mod demand;
pub mod probe;
pub mod prometheus;

pub use demand::DemandTracker;
pub use probe::{MetricsProbe, NvidiaSmiProbe, ProbeError, ScalingMetrics, StaticProbe};
pub use prometheus::{render_prometheus, Exposition};
