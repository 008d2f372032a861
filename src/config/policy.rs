use std::time::Duration;

/// Timing and abuse-guard knobs for the report pipeline.
#[derive(Debug, Clone, Copy)]
pub struct PipelinePolicy {
    pub triage_timeout_ms: u64,
    pub triage_stale_after_seconds: u64,
    pub anon_duplicate_window_seconds: u64,
    pub anon_duplicate_radius_meters: f64,
}

impl Default for PipelinePolicy {
    fn default() -> Self {
        Self {
            triage_timeout_ms: 5_000,
            triage_stale_after_seconds: 600,
            anon_duplicate_window_seconds: 1_800,
            anon_duplicate_radius_meters: 150.0,
        }
    }
}

impl PipelinePolicy {
    pub fn triage_timeout(&self) -> Duration {
        Duration::from_millis(self.triage_timeout_ms)
    }

    pub fn triage_stale_after(&self) -> time::Duration {
        time::Duration::seconds(self.triage_stale_after_seconds as i64)
    }

    pub fn anon_duplicate_window(&self) -> time::Duration {
        time::Duration::seconds(self.anon_duplicate_window_seconds as i64)
    }
}
