//! # Protocol Configuration

use std::time::Duration;

/// Tunables for the consensus engine (§4.13). `max_phase_ahead` bounds how
/// far into the future an incoming `Propose` may point before it is
/// discarded as noise or an attack; `remove_older_than_phases` bounds how
/// long a decided phase's bookkeeping survives the reaper.
#[derive(Debug, Clone)]
pub struct ProtocolConfig {
    /// Reaper cadence.
    pub cleanup_interval: Duration,
    /// Sync retry cadence while inactive. Jittered ±50% at each reschedule.
    pub sync_retry_interval: Duration,
    /// Reaper window: phases more than this far behind `current_phase` are
    /// dropped.
    pub remove_older_than_phases: u64,
    /// Far-future proposal rejection threshold.
    pub max_phase_ahead: u64,
    /// Seeds the deterministic jitter applied to `sync_retry_interval` so
    /// tests can reproduce a specific retry schedule. `coin_flip` itself
    /// never consults this: it is a pure function of the phase number.
    pub randomization_seed: Option<u64>,
}

impl Default for ProtocolConfig {
    fn default() -> Self {
        Self {
            cleanup_interval: Duration::from_secs(30),
            sync_retry_interval: Duration::from_millis(2000),
            remove_older_than_phases: 1000,
            max_phase_ahead: 100,
            randomization_seed: None,
        }
    }
}

impl ProtocolConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_cleanup_interval(mut self, interval: Duration) -> Self {
        self.cleanup_interval = interval;
        self
    }

    pub fn with_sync_retry_interval(mut self, interval: Duration) -> Self {
        self.sync_retry_interval = interval;
        self
    }

    pub fn with_remove_older_than_phases(mut self, phases: u64) -> Self {
        self.remove_older_than_phases = phases;
        self
    }

    pub fn with_max_phase_ahead(mut self, phases: u64) -> Self {
        self.max_phase_ahead = phases;
        self
    }

    pub fn with_randomization_seed(mut self, seed: u64) -> Self {
        self.randomization_seed = Some(seed);
        self
    }
}
