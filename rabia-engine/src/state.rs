//! # Engine State
//!
//! The mutable state exclusively owned and written by the engine's single
//! serial executor (§3, §5). Everything here is read concurrently for
//! metrics purposes only through atomically-publishable snapshots
//! (`EngineState::statistics`); all writes happen on the executor task.

use bytes::Bytes;
use dashmap::DashMap;
use rabia_core::messages::{ProtocolMessage, QuorumState, SubmitCommands};
use rabia_core::metrics::EngineStatistics;
use rabia_core::persistence::SavedState;
use rabia_core::phase::PhaseState;
use rabia_core::{Batch, CorrelationId, NodeId, PhaseId, RabiaError, Result, StateValue};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use tokio::sync::oneshot;

/// State held behind the engine's serial executor. `current_phase`,
/// `last_committed_phase`, `is_in_phase`, and `active` are plain atomics so
/// a metrics reader can snapshot them without locking the executor, but the
/// executor itself is still their only writer.
pub struct EngineState {
    current_phase: AtomicU64,
    last_committed_phase: AtomicU64,
    is_in_phase: AtomicBool,
    active: AtomicBool,
    locked_value: Mutex<Option<StateValue>>,

    pub phases: DashMap<PhaseId, PhaseState>,
    pub pending_batches: DashMap<CorrelationId, Batch>,
    pub pending_results: DashMap<CorrelationId, oneshot::Sender<Result<Vec<Bytes>>>>,
    pub sync_responses: DashMap<NodeId, SavedState>,
}

impl EngineState {
    pub fn new() -> Self {
        Self {
            current_phase: AtomicU64::new(0),
            last_committed_phase: AtomicU64::new(0),
            is_in_phase: AtomicBool::new(false),
            active: AtomicBool::new(false),
            locked_value: Mutex::new(None),
            phases: DashMap::new(),
            pending_batches: DashMap::new(),
            pending_results: DashMap::new(),
            sync_responses: DashMap::new(),
        }
    }

    pub fn current_phase(&self) -> PhaseId {
        PhaseId::new(self.current_phase.load(Ordering::Acquire))
    }

    pub fn set_current_phase(&self, phase: PhaseId) {
        self.current_phase.store(phase.value(), Ordering::Release);
    }

    pub fn last_committed_phase(&self) -> PhaseId {
        PhaseId::new(self.last_committed_phase.load(Ordering::Acquire))
    }

    /// Monotonic commit: never lets `last_committed_phase` decrease.
    pub fn commit_phase(&self, phase: PhaseId) {
        let mut current = self.last_committed_phase.load(Ordering::Acquire);
        while phase.value() > current {
            match self.last_committed_phase.compare_exchange_weak(
                current,
                phase.value(),
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => return,
                Err(actual) => current = actual,
            }
        }
    }

    pub fn reset_committed_phase(&self) {
        self.last_committed_phase.store(0, Ordering::Release);
    }

    pub fn is_in_phase(&self) -> bool {
        self.is_in_phase.load(Ordering::Acquire)
    }

    pub fn set_in_phase(&self, value: bool) {
        self.is_in_phase.store(value, Ordering::Release);
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    pub fn set_active(&self, value: bool) {
        self.active.store(value, Ordering::Release);
    }

    pub fn take_locked_value(&self) -> Option<StateValue> {
        self.locked_value.lock().take()
    }

    pub fn set_locked_value(&self, value: StateValue) {
        *self.locked_value.lock() = Some(value);
    }

    pub fn clear_locked_value(&self) {
        *self.locked_value.lock() = None;
    }

    pub fn get_or_create_phase(&self, phase: PhaseId) -> dashmap::mapref::one::RefMut<'_, PhaseId, PhaseState> {
        self.phases.entry(phase).or_insert_with(|| PhaseState::new(phase))
    }

    /// Smallest pending batch in `Batch`'s total order, or `None` if empty.
    pub fn smallest_pending_batch(&self) -> Option<Batch> {
        self.pending_batches
            .iter()
            .map(|entry| entry.value().clone())
            .min()
    }

    pub fn insert_pending_batch(&self, batch: Batch) {
        self.pending_batches.entry(batch.correlation_id).or_insert(batch);
    }

    pub fn remove_pending_batch(&self, correlation_id: &CorrelationId) {
        self.pending_batches.remove(correlation_id);
    }

    pub fn register_pending_result(
        &self,
        correlation_id: CorrelationId,
        reply: oneshot::Sender<Result<Vec<Bytes>>>,
    ) {
        self.pending_results.insert(correlation_id, reply);
    }

    pub fn resolve_pending_result(&self, correlation_id: &CorrelationId, results: Vec<Bytes>) {
        if let Some((_, reply)) = self.pending_results.remove(correlation_id) {
            let _ = reply.send(Ok(results));
        }
    }

    /// Fails every outstanding completion handle with `NodeInactive` and
    /// drops them, used on the disconnect path (§4.11).
    pub fn fail_all_pending_results(&self, node_id: NodeId) {
        for (_, reply) in self.pending_results.clone().into_iter() {
            let _ = reply.send(Err(RabiaError::NodeInactive(node_id)));
        }
        self.pending_results.clear();
    }

    /// Removes phase bookkeeping more than `window` phases behind
    /// `current_phase` (§4.12).
    pub fn reap_old_phases(&self, window: u64) -> usize {
        let current = self.current_phase().value();
        let mut removed = 0;
        self.phases.retain(|phase, _| {
            let keep = phase.value() >= current || current - phase.value() <= window;
            if !keep {
                removed += 1;
            }
            keep
        });
        removed
    }

    pub fn reset_for_disconnect(&self) {
        self.phases.clear();
        self.pending_batches.clear();
        self.set_current_phase(PhaseId::ZERO);
        self.set_in_phase(false);
        self.clear_locked_value();
    }

    pub fn statistics(&self) -> EngineStatistics {
        EngineStatistics {
            current_phase: self.current_phase(),
            last_committed_phase: self.last_committed_phase(),
            pending_batch_count: self.pending_batches.len(),
            tracked_phase_count: self.phases.len(),
            active: self.is_active(),
            has_quorum: self.is_active(),
        }
    }
}

impl Default for EngineState {
    fn default() -> Self {
        Self::new()
    }
}

/// `dashmap::mapref::one::RefMut` doesn't implement `Clone`, so callers that
/// need an owned copy of the current proposal/vote bookkeeping outside the
/// entry's lifetime should clone the dereferenced `PhaseState` explicitly.
pub type PhaseEntry<'a> = dashmap::mapref::one::RefMut<'a, PhaseId, PhaseState>;

/// Commands the engine's serial executor consumes, in FIFO order (§4.2).
/// Every state-mutating operation is represented as a variant here so the
/// single executor task remains the sole writer of `EngineState`.
pub enum EngineCommand {
    Network(ProtocolMessage),
    Submit(SubmitCommands),
    Quorum(QuorumState),
    GetStatistics(oneshot::Sender<EngineStatistics>),
    Shutdown,
}

pub type EngineCommandSender = tokio::sync::mpsc::UnboundedSender<EngineCommand>;
pub type EngineCommandReceiver = tokio::sync::mpsc::UnboundedReceiver<EngineCommand>;
