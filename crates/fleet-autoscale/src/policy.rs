//! Desired worker count arithmetic.

use fleet_core::ScalingSection;
use fleet_metrics::ScalingMetrics;

/// Thresholds that turn demand and GPU load into a worker count.
#[derive(Debug, Clone, PartialEq)]
pub struct ScalingPolicy {
    pub gpu_threshold_pct: f64,
    pub request_threshold: u64,
    pub request_divisor: u64,
    pub vram_budget_mb: f64,
    pub vram_headroom: f64,
}

impl Default for ScalingPolicy {
    fn default() -> Self {
        Self::from(&ScalingSection::default())
    }
}

impl From<&ScalingSection> for ScalingPolicy {
    fn from(s: &ScalingSection) -> Self {
        Self {
            gpu_threshold_pct: s.gpu_threshold_pct,
            request_threshold: s.request_threshold,
            request_divisor: s.request_divisor,
            vram_budget_mb: s.vram_budget_mb,
            vram_headroom: s.vram_headroom,
        }
    }
}

impl ScalingPolicy {
    /// Workers wanted by load alone, before the VRAM cap.
    pub fn base_worker_count(&self, requests: u64, metrics: &ScalingMetrics) -> usize {
        let mut base: usize = 1;
        if metrics.gpu_utilization_pct > self.gpu_threshold_pct {
            base += 1;
        }
        if requests > self.request_threshold {
            let extra = requests.checked_div(self.request_divisor).unwrap_or(0);
            base = base.saturating_add(usize::try_from(extra).unwrap_or(usize::MAX));
        }
        base
    }

    /// How many workers the VRAM reading can hold. Zero when the reading
    /// is missing, negative or not a number.
    pub fn max_by_vram(&self, metrics: &ScalingMetrics) -> usize {
        let cap = (metrics.vram_used_mb * self.vram_headroom / self.vram_budget_mb).floor();
        if cap.is_finite() && cap > 0.0 {
            cap as usize
        } else {
            0
        }
    }

    /// Raw desired count: `min(base, max_by_vram)`. May be zero; the
    /// engine never reduces an active model below one worker.
    pub fn desired_worker_count(&self, requests: u64, metrics: &ScalingMetrics) -> usize {
        self.base_worker_count(requests, metrics)
            .min(self.max_by_vram(metrics))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn metrics(gpu: f64, vram: f64) -> ScalingMetrics {
        ScalingMetrics {
            gpu_utilization_pct: gpu,
            vram_used_mb: vram,
        }
    }

    const AMPLE_VRAM: f64 = 1_000_000.0;

    #[test]
    fn zero_reading_desires_zero() {
        let policy = ScalingPolicy::default();
        assert_eq!(policy.desired_worker_count(0, &metrics(0.0, 0.0)), 0);
        assert_eq!(policy.max_by_vram(&metrics(0.0, 0.0)), 0);
    }

    #[test]
    fn idle_model_with_vram_wants_one() {
        let policy = ScalingPolicy::default();
        assert_eq!(policy.desired_worker_count(0, &metrics(0.0, AMPLE_VRAM)), 1);
    }

    #[test]
    fn eleven_requests_add_two() {
        let policy = ScalingPolicy::default();
        assert_eq!(policy.base_worker_count(11, &metrics(0.0, 0.0)), 3);
        assert_eq!(policy.desired_worker_count(11, &metrics(0.0, AMPLE_VRAM)), 3);
    }

    #[test]
    fn request_threshold_is_exclusive() {
        let policy = ScalingPolicy::default();
        assert_eq!(policy.base_worker_count(10, &metrics(0.0, 0.0)), 1);
    }

    #[test]
    fn gpu_threshold_is_exclusive() {
        let policy = ScalingPolicy::default();
        assert_eq!(policy.base_worker_count(0, &metrics(70.0, 0.0)), 1);
        assert_eq!(policy.base_worker_count(0, &metrics(70.1, 0.0)), 2);
    }

    #[test]
    fn busy_gpu_and_demand_capped_by_vram() {
        let policy = ScalingPolicy::default();
        // 1 + 1 (gpu) + 12/5 = 4; cap = floor(20000 * 0.9 / 4000) = 4.
        assert_eq!(policy.desired_worker_count(12, &metrics(80.0, 20000.0)), 4);
        // cap = floor(8000 * 0.9 / 4000) = 1.
        assert_eq!(policy.desired_worker_count(12, &metrics(80.0, 8000.0)), 1);
    }

    #[test]
    fn nonsense_vram_caps_to_zero() {
        let policy = ScalingPolicy::default();
        assert_eq!(policy.max_by_vram(&metrics(0.0, -5000.0)), 0);
        assert_eq!(policy.max_by_vram(&metrics(0.0, f64::NAN)), 0);
        assert_eq!(policy.max_by_vram(&metrics(0.0, f64::INFINITY)), 0);
    }

    #[test]
    fn huge_demand_saturates() {
        let policy = ScalingPolicy::default();
        let base = policy.base_worker_count(u64::MAX, &metrics(99.0, 0.0));
        assert!(base > 1000);
    }

    #[test]
    fn from_config_section() {
        let mut section = ScalingSection::default();
        section.request_divisor = 2;
        section.vram_budget_mb = 8000.0;
        let policy = ScalingPolicy::from(&section);

        assert_eq!(policy.base_worker_count(12, &metrics(0.0, 0.0)), 7);
        assert_eq!(policy.max_by_vram(&metrics(0.0, 20000.0)), 2);
    }
}
