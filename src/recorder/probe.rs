use std::sync::Arc;

use anyhow::Result;
use log::warn;
use rand::Rng;

/// Source of the per-interval activity signal. A real implementation asks the
/// OS for input/idle state; it may block, so it is always called off the
/// async executor.
pub trait ActivityProbe: Send + Sync + 'static {
    fn sample(&self) -> Result<bool>;
}

/// Random signal, active with a fixed probability. Stands in for OS input
/// detection.
#[derive(Debug, Clone)]
pub struct SyntheticProbe {
    active_ratio: f64,
}

impl SyntheticProbe {
    pub fn new(active_ratio: f64) -> Self {
        Self {
            active_ratio: active_ratio.clamp(0.0, 1.0),
        }
    }
}

impl Default for SyntheticProbe {
    fn default() -> Self {
        Self::new(0.7)
    }
}

impl ActivityProbe for SyntheticProbe {
    fn sample(&self) -> Result<bool> {
        Ok(rand::thread_rng().gen_bool(self.active_ratio))
    }
}

/// Samples the probe; any failure, including a panic inside the probe,
/// counts as an inactive interval.
pub(crate) async fn sample_probe(probe: Arc<dyn ActivityProbe>) -> bool {
    match tokio::task::spawn_blocking(move || probe.sample()).await {
        Ok(Ok(active)) => active,
        Ok(Err(err)) => {
            warn!("Activity probe failed, recording inactive interval: {err:#}");
            false
        }
        Err(join_err) => {
            warn!("Activity probe worker failed, recording inactive interval: {join_err}");
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::anyhow;

    struct Failing;

    impl ActivityProbe for Failing {
        fn sample(&self) -> Result<bool> {
            Err(anyhow!("input device unavailable"))
        }
    }

    struct Panicking;

    impl ActivityProbe for Panicking {
        fn sample(&self) -> Result<bool> {
            panic!("probe exploded")
        }
    }

    #[tokio::test]
    async fn failures_degrade_to_inactive() {
        assert!(!sample_probe(Arc::new(Failing)).await);
        assert!(!sample_probe(Arc::new(Panicking)).await);
    }

    #[tokio::test]
    async fn synthetic_probe_respects_extreme_ratios() {
        assert!(sample_probe(Arc::new(SyntheticProbe::new(1.0))).await);
        assert!(!sample_probe(Arc::new(SyntheticProbe::new(0.0))).await);
    }
}
