//! Worker bookkeeping: the state enum from §4.4 and the pure recycle
//! decision the coordinator consults on every return.

use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::render::engine::RenderEngine;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerState {
    Warming,
    Idle,
    Leased,
    Recycling,
    Dead,
}

/// Everything the coordinator tracks about one live worker besides its
/// current state (the coordinator itself tracks state via which collection
/// the worker id lives in — see `pool::Pool`).
pub struct WorkerMeta {
    pub engine: Arc<dyn RenderEngine>,
    pub use_count: u32,
    pub launched_at: Instant,
}

impl WorkerMeta {
    pub fn new(engine: Arc<dyn RenderEngine>) -> Self {
        Self {
            engine,
            use_count: 0,
            launched_at: Instant::now(),
        }
    }

    pub fn age(&self) -> Duration {
        self.launched_at.elapsed()
    }
}

/// `leased -> idle` vs `leased -> recycling` per §4.4: crossing either
/// threshold, or the renderer reporting the worker broken, forces recycling.
pub fn should_recycle(meta: &WorkerMeta, broken: bool, max_uses: u32, max_age: Duration) -> bool {
    broken || meta.use_count >= max_uses || meta.age() >= max_age
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::engine::FakeEngine;
    use crate::render::engine::EngineRenderOutput;

    fn fake_meta() -> WorkerMeta {
        let engine = FakeEngine::new(EngineRenderOutput {
            status_code: 200,
            final_url: "https://example.com/".into(),
            redirect_url: None,
            markup: String::new(),
            screenshot: None,
            broken: false,
        });
        WorkerMeta::new(Arc::new(engine))
    }

    #[test]
    fn broken_always_recycles() {
        let meta = fake_meta();
        assert!(should_recycle(&meta, true, 1000, Duration::from_secs(3600)));
    }

    #[test]
    fn use_count_threshold_recycles() {
        let mut meta = fake_meta();
        meta.use_count = 500;
        assert!(should_recycle(&meta, false, 500, Duration::from_secs(3600)));
        meta.use_count = 499;
        assert!(!should_recycle(&meta, false, 500, Duration::from_secs(3600)));
    }

    #[test]
    fn age_threshold_recycles() {
        let meta = fake_meta();
        assert!(should_recycle(&meta, false, 1000, Duration::from_secs(0)));
    }
}
