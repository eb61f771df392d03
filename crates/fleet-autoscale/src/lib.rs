//! fleet-autoscale — demand and GPU driven worker scaling.
//!
//! Every cycle drains request counts, reads the GPU once, and reconciles
//! each registered model towards a desired worker count.
//!
//! # Scaling Algorithm
//!
//! ```text
//! base = 1
//! if gpu_utilization_pct > gpu_threshold (70):  base += 1
//! if requests > request_threshold (10):         base += requests / divisor (5)
//!
//! max_by_vram = floor(vram_used_mb * headroom (0.9) / vram_budget_mb (4000))
//! desired     = min(base, max_by_vram)
//! target      = max(desired, 1)          // an active model keeps a worker
//! ```
//!
//! Scale-up starts `target - workers` new workers and gives up on the
//! first failure. Scale-down stops the most recently added workers first.

pub mod policy;
pub mod scaler;

pub use policy::ScalingPolicy;
pub use scaler::{CycleReport, ModelOutcome, ScalingEngine, ScalingStatus};
