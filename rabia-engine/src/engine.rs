//! # Consensus Engine
//!
//! The single serial executor that owns `EngineState` and drives every
//! protocol handler (§4.2-4.12). One `tokio::task` per engine: a
//! `tokio::select!` loop over the command queue and the periodic reaper /
//! sync-retry tickers, mirroring the teacher's `RabiaEngine::run` shape but
//! replacing its randomized voting with the deterministic algorithm in
//! `rabia_core::phase::PhaseState`.

use crate::config::ProtocolConfig;
use crate::state::{EngineCommand, EngineCommandReceiver, EngineCommandSender, EngineState};
use bytes::Bytes;
use rabia_core::messages::{
    DecisionMessage, MessageBody, NewBatchMessage, ProposeMessage, ProtocolMessage, QuorumState,
    SubmitCommands, SyncRequestMessage, SyncResponseMessage, VoteRound1Message, VoteRound2Message,
};
use rabia_core::metrics::{EngineStatistics, MetricsHook, NoopMetricsHook};
use rabia_core::network::{NetworkTransport, Topology};
use rabia_core::persistence::{PersistenceLayer, SavedState};
use rabia_core::state_machine::StateMachine;
use rabia_core::validation::Validator;
use rabia_core::{Batch, NodeId, PhaseId, RabiaError, Result, StateValue};
use parking_lot::Mutex as SyncMutex;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{oneshot, Mutex};
use tracing::{debug, error, info, warn};

/// A cheap, cloneable capability for talking to a running engine. The
/// engine task itself owns the only `EngineCommandReceiver`; every other
/// caller (network layer, client code, schedulers) holds an `EngineHandle`.
#[derive(Clone)]
pub struct EngineHandle {
    command_tx: EngineCommandSender,
}

impl EngineHandle {
    /// Submits a batch of commands and awaits the decided result.
    pub async fn apply(&self, commands: Vec<rabia_core::Command>) -> Result<Vec<Bytes>> {
        if commands.is_empty() {
            return Err(RabiaError::CommandBatchIsEmpty);
        }
        let (reply_tx, reply_rx) = oneshot::channel();
        self.command_tx
            .send(EngineCommand::Submit(SubmitCommands::with_reply(commands, reply_tx)))
            .map_err(|_| RabiaError::internal("engine has shut down"))?;
        reply_rx
            .await
            .map_err(|_| RabiaError::internal("engine dropped the completion handle"))?
    }

    /// Submits a batch of commands without waiting for the decided result.
    pub fn submit(&self, commands: Vec<rabia_core::Command>) -> Result<()> {
        if commands.is_empty() {
            return Err(RabiaError::CommandBatchIsEmpty);
        }
        self.command_tx
            .send(EngineCommand::Submit(SubmitCommands::fire_and_forget(commands)))
            .map_err(|_| RabiaError::internal("engine has shut down"))
    }

    /// Delivers an inbound protocol message from the network collaborator.
    pub fn deliver(&self, message: ProtocolMessage) -> Result<()> {
        self.command_tx
            .send(EngineCommand::Network(message))
            .map_err(|_| RabiaError::internal("engine has shut down"))
    }

    /// Notifies the engine of a topology change (§4.11).
    pub fn notify_quorum(&self, state: QuorumState) -> Result<()> {
        self.command_tx
            .send(EngineCommand::Quorum(state))
            .map_err(|_| RabiaError::internal("engine has shut down"))
    }

    pub async fn statistics(&self) -> Result<EngineStatistics> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.command_tx
            .send(EngineCommand::GetStatistics(reply_tx))
            .map_err(|_| RabiaError::internal("engine has shut down"))?;
        reply_rx
            .await
            .map_err(|_| RabiaError::internal("engine dropped the statistics reply"))
    }

    pub fn shutdown(&self) {
        let _ = self.command_tx.send(EngineCommand::Shutdown);
    }
}

/// The consensus engine. Generic over its four narrow collaborators so
/// tests can plug in in-memory doubles (`rabia-testing`) while production
/// code plugs in real ones.
pub struct RabiaEngine<SM, NT, TP, PL, MH = NoopMetricsHook>
where
    SM: StateMachine,
    NT: NetworkTransport,
    TP: Topology,
    PL: PersistenceLayer,
    MH: MetricsHook,
{
    node_id: NodeId,
    config: ProtocolConfig,
    state: Arc<EngineState>,
    state_machine: Mutex<SM>,
    network: Arc<NT>,
    topology: Arc<TP>,
    persistence: Arc<PL>,
    metrics: Arc<MH>,
    rng: SyncMutex<StdRng>,
    command_tx: EngineCommandSender,
    command_rx: EngineCommandReceiver,
}

impl<SM, NT, TP, PL> RabiaEngine<SM, NT, TP, PL, NoopMetricsHook>
where
    SM: StateMachine,
    NT: NetworkTransport,
    TP: Topology,
    PL: PersistenceLayer,
{
    pub fn new(
        config: ProtocolConfig,
        state_machine: SM,
        network: Arc<NT>,
        topology: Arc<TP>,
        persistence: Arc<PL>,
    ) -> (Self, EngineHandle) {
        Self::with_metrics(config, state_machine, network, topology, persistence, Arc::new(NoopMetricsHook))
    }
}

impl<SM, NT, TP, PL, MH> RabiaEngine<SM, NT, TP, PL, MH>
where
    SM: StateMachine,
    NT: NetworkTransport,
    TP: Topology,
    PL: PersistenceLayer,
    MH: MetricsHook,
{
    pub fn with_metrics(
        config: ProtocolConfig,
        state_machine: SM,
        network: Arc<NT>,
        topology: Arc<TP>,
        persistence: Arc<PL>,
        metrics: Arc<MH>,
    ) -> (Self, EngineHandle) {
        let node_id = topology.self_id();
        let rng = match config.randomization_seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        let (command_tx, command_rx) = tokio::sync::mpsc::unbounded_channel();
        let handle = EngineHandle {
            command_tx: command_tx.clone(),
        };
        let engine = Self {
            node_id,
            config,
            state: Arc::new(EngineState::new()),
            state_machine: Mutex::new(state_machine),
            network,
            topology,
            persistence,
            metrics,
            rng: SyncMutex::new(rng),
            command_tx,
            command_rx,
        };
        (engine, handle)
    }

    /// `sync_retry_interval` jittered by ±50%, reseeded from
    /// `config.randomization_seed` when set so tests can reproduce a
    /// specific retry schedule (§4.13, §9a).
    fn jittered_sync_interval(&self) -> Duration {
        let factor: f64 = self.rng.lock().gen_range(0.5..1.5);
        let millis = (self.config.sync_retry_interval.as_millis() as f64 * factor).max(1.0);
        Duration::from_millis(millis as u64)
    }

    /// The engine's main loop: one task, serial FIFO command processing,
    /// periodic reaper and sync-retry ticks (§4.2, §5).
    pub async fn run(mut self) {
        let mut cleanup_ticker = tokio::time::interval(self.config.cleanup_interval);
        let mut sync_sleep = Box::pin(tokio::time::sleep(self.jittered_sync_interval()));

        loop {
            tokio::select! {
                command = self.command_rx.recv() => {
                    match command {
                        Some(EngineCommand::Shutdown) | None => {
                            self.handle_disconnect().await;
                            break;
                        }
                        Some(command) => self.dispatch(command).await,
                    }
                }
                _ = cleanup_ticker.tick() => {
                    let removed = self.state.reap_old_phases(self.config.remove_older_than_phases);
                    if removed > 0 {
                        debug!(removed, "phase reaper collected stale phases");
                    }
                }
                _ = &mut sync_sleep => {
                    self.synchronize_if_inactive().await;
                    sync_sleep.as_mut().reset(tokio::time::Instant::now() + self.jittered_sync_interval());
                }
            }
        }
    }

    async fn dispatch(&self, command: EngineCommand) {
        match command {
            EngineCommand::Network(message) => self.handle_message(message).await,
            EngineCommand::Submit(submit) => self.handle_submit(submit).await,
            EngineCommand::Quorum(QuorumState::Established) => self.handle_established().await,
            EngineCommand::Quorum(QuorumState::Disappeared) => self.handle_disconnect().await,
            EngineCommand::GetStatistics(reply) => {
                let stats = self.state.statistics();
                self.metrics.record(stats);
                let _ = reply.send(stats);
            }
            EngineCommand::Shutdown => unreachable!("handled in run()'s select loop"),
        }
    }

    async fn broadcast(&self, body: MessageBody) {
        let message = ProtocolMessage::new(self.node_id, body);
        if let Err(err) = self.network.broadcast(message).await {
            warn!(error = %err, "broadcast failed");
        }
    }

    // ---- §4.3 client submission ----

    async fn handle_submit(&self, submit: SubmitCommands) {
        if submit.commands.is_empty() {
            if let Some(reply) = submit.reply {
                let _ = reply.send(Err(RabiaError::CommandBatchIsEmpty));
            }
            return;
        }
        if !self.state.is_active() {
            if let Some(reply) = submit.reply {
                let _ = reply.send(Err(RabiaError::NodeInactive(self.node_id)));
            }
            return;
        }

        let batch = Batch::new(
            rabia_core::CorrelationId::new(),
            rabia_core::monotonic_nanos(),
            submit.commands,
        );
        if let Err(err) = batch.validate() {
            if let Some(reply) = submit.reply {
                let _ = reply.send(Err(err));
            }
            return;
        }

        self.state.insert_pending_batch(batch.clone());
        if let Some(reply) = submit.reply {
            self.state.register_pending_result(batch.correlation_id, reply);
        }
        if !self.state.is_in_phase() {
            self.start_phase().await;
        }
        self.broadcast(MessageBody::NewBatch(NewBatchMessage { batch })).await;
    }

    // ---- §4.4 phase entry ----

    async fn start_phase(&self) {
        if self.state.is_in_phase() {
            return;
        }
        let Some(batch) = self.state.smallest_pending_batch() else {
            return;
        };
        self.state.set_in_phase(true);
        let phase = self.state.current_phase();
        self.register_own_proposal(phase, batch.clone());
        self.broadcast(MessageBody::Propose(ProposeMessage { phase, batch })).await;
        self.consume_locked_value(phase).await;
    }

    fn register_own_proposal(&self, phase: PhaseId, batch: Batch) {
        self.state.get_or_create_phase(phase).register_proposal(self.node_id, batch);
    }

    async fn consume_locked_value(&self, phase: PhaseId) {
        if let Some(value) = self.state.take_locked_value() {
            self.state.get_or_create_phase(phase).register_round1_vote(self.node_id, value);
            self.broadcast(MessageBody::VoteRound1(VoteRound1Message { phase, value })).await;
        }
    }

    // ---- message dispatch ----

    async fn handle_message(&self, message: ProtocolMessage) {
        let sender = message.from;
        match message.body {
            MessageBody::Propose(body) => self.handle_propose(sender, body).await,
            MessageBody::VoteRound1(body) => self.handle_vote_round1(sender, body).await,
            MessageBody::VoteRound2(body) => self.handle_vote_round2(sender, body).await,
            MessageBody::Decision(body) => self.handle_remote_decision(body).await,
            MessageBody::SyncRequest(_) => self.handle_sync_request(sender).await,
            MessageBody::SyncResponse(body) => self.handle_sync_response(sender, body).await,
            MessageBody::NewBatch(body) => self.handle_new_batch(body).await,
        }
    }

    // ---- §4.5 propose handler ----

    async fn handle_propose(&self, sender: NodeId, msg: ProposeMessage) {
        if !self.state.is_active() {
            debug!(%sender, "ignoring Propose: node inactive");
            return;
        }
        let current = self.state.current_phase();
        if msg.phase < current {
            debug!(phase = %msg.phase, %current, "ignoring stale Propose");
            return;
        }
        if msg.phase.distance_from(current) > self.config.max_phase_ahead {
            warn!(phase = %msg.phase, %current, "ignoring far-future Propose");
            return;
        }

        if msg.phase == current && !self.state.is_in_phase() {
            self.start_phase().await;
        }

        self.state.get_or_create_phase(msg.phase).register_proposal(sender, msg.batch);

        if msg.phase == current && self.state.is_in_phase() {
            let maybe_vote = {
                let phase_state = self.state.get_or_create_phase(msg.phase);
                let q = self.topology.quorum_size();
                if !phase_state.has_voted_round1(self.node_id) && phase_state.has_quorum_proposals(q) {
                    Some(phase_state.evaluate_initial_vote(q))
                } else {
                    None
                }
            };
            if let Some(value) = maybe_vote {
                self.state.get_or_create_phase(msg.phase).register_round1_vote(self.node_id, value);
                self.broadcast(MessageBody::VoteRound1(VoteRound1Message { phase: msg.phase, value })).await;
            }
        }
    }

    // ---- §4.6 round-1 vote handler ----

    async fn handle_vote_round1(&self, sender: NodeId, msg: VoteRound1Message) {
        if !self.state.is_active() {
            return;
        }
        self.state.get_or_create_phase(msg.phase).register_round1_vote(sender, msg.value);

        let current = self.state.current_phase();
        if !(self.state.is_in_phase() && msg.phase == current) {
            return;
        }

        let fast_path = {
            let phase_state = self.state.get_or_create_phase(msg.phase);
            let s = self.topology.super_majority_size();
            if !phase_state.is_decided() && !phase_state.has_voted_round2(self.node_id) {
                phase_state.super_majority_round1_value(s)
            } else {
                None
            }
        };
        if let Some(value) = fast_path {
            let batch = {
                let phase_state = self.state.get_or_create_phase(msg.phase);
                if value == StateValue::V1 {
                    phase_state.find_agreed_proposal()
                } else {
                    Batch::empty()
                }
            };
            info!(phase = %msg.phase, %value, "fast-path decision reached");
            self.broadcast(MessageBody::Decision(DecisionMessage {
                phase: msg.phase,
                value,
                batch: batch.clone(),
            }))
            .await;
            self.apply_decision(msg.phase, value, batch).await;
            return;
        }

        let round2_vote = {
            let phase_state = self.state.get_or_create_phase(msg.phase);
            let q = self.topology.quorum_size();
            if !phase_state.has_voted_round2(self.node_id) && phase_state.has_round1_majority_votes(q) {
                Some(phase_state.evaluate_round2_vote(q))
            } else {
                None
            }
        };
        if let Some(value) = round2_vote {
            self.state.get_or_create_phase(msg.phase).register_round2_vote(self.node_id, value);
            self.broadcast(MessageBody::VoteRound2(VoteRound2Message { phase: msg.phase, value })).await;
        }
    }

    // ---- §4.7 round-2 vote handler ----

    async fn handle_vote_round2(&self, sender: NodeId, msg: VoteRound2Message) {
        if !self.state.is_active() {
            return;
        }
        self.state.get_or_create_phase(msg.phase).register_round2_vote(sender, msg.value);

        let current = self.state.current_phase();
        if !(self.state.is_in_phase() && msg.phase == current) {
            return;
        }

        let decision = {
            let phase_state = self.state.get_or_create_phase(msg.phase);
            let f_plus_one = self.topology.f_plus_one();
            let q = self.topology.quorum_size();
            if !phase_state.is_decided() && phase_state.has_round2_majority_votes(q) {
                Some(phase_state.process_round2_completion(f_plus_one, q))
            } else {
                None
            }
        };
        if let Some((value, batch)) = decision {
            info!(phase = %msg.phase, %value, "round-2 decision reached");
            self.broadcast(MessageBody::Decision(DecisionMessage {
                phase: msg.phase,
                value,
                batch: batch.clone(),
            }))
            .await;
            self.apply_decision(msg.phase, value, batch).await;
        }
    }

    // ---- §4.8 decision handler (local and remote) ----

    async fn handle_remote_decision(&self, msg: DecisionMessage) {
        if !self.state.is_active() {
            debug!(phase = %msg.phase, "ignoring Decision: node inactive");
            return;
        }
        self.apply_decision(msg.phase, msg.value, msg.batch).await;
    }

    async fn apply_decision(&self, phase: PhaseId, value: StateValue, batch: Batch) {
        let already_decided = self.state.get_or_create_phase(phase).try_mark_decided();
        if already_decided {
            return;
        }

        if value == StateValue::V1 && !batch.commands.is_empty() {
            let results = {
                let mut state_machine = self.state_machine.lock().await;
                state_machine.process(&batch.commands).await
            };
            match results {
                Ok(results) => {
                    self.state.commit_phase(phase);
                    self.state.remove_pending_batch(&batch.correlation_id);
                    self.state.resolve_pending_result(&batch.correlation_id, results);
                }
                Err(err) => error!(error = %err, %phase, "state machine failed to process decided batch"),
            }
        }

        self.state.set_current_phase(phase.successor());
        self.state.set_in_phase(false);
        self.state.set_locked_value(value);

        if self.state.smallest_pending_batch().is_some() {
            self.start_phase().await;
        }
    }

    // ---- §4.9 new batch handler ----

    async fn handle_new_batch(&self, msg: NewBatchMessage) {
        self.state.insert_pending_batch(msg.batch);

        let current = self.state.current_phase();
        if self.state.is_active() && self.state.is_in_phase() {
            let missing = !self.state.get_or_create_phase(current).has_proposal_from(self.node_id);
            if missing {
                if let Some(batch) = self.state.smallest_pending_batch() {
                    self.register_own_proposal(current, batch.clone());
                    self.broadcast(MessageBody::Propose(ProposeMessage { phase: current, batch })).await;
                }
            }
        } else {
            self.start_phase().await;
        }
    }

    // ---- §4.10 synchronization subsystem ----

    async fn synchronize_if_inactive(&self) {
        if self.state.is_active() {
            return;
        }
        self.state.sync_responses.clear();
        self.broadcast(MessageBody::SyncRequest(SyncRequestMessage)).await;
    }

    async fn handle_sync_request(&self, requester: NodeId) {
        let state = if self.state.is_active() {
            let snapshot = {
                let state_machine = self.state_machine.lock().await;
                state_machine.make_snapshot().await
            };
            match snapshot {
                Ok(snapshot) => SavedState::new(
                    snapshot,
                    self.state.last_committed_phase(),
                    self.state.pending_batches.iter().map(|entry| entry.value().clone()).collect(),
                ),
                Err(err) => {
                    error!(error = %err, %requester, "snapshot failed while answering SyncRequest");
                    return;
                }
            }
        } else {
            match self.persistence.load().await {
                Ok(Some(saved)) => saved,
                Ok(None) => SavedState::empty(),
                Err(err) => {
                    error!(error = %err, "persistence load failed while answering SyncRequest");
                    SavedState::empty()
                }
            }
        };

        if let Err(err) = self
            .network
            .send(
                requester,
                ProtocolMessage::new(self.node_id, MessageBody::SyncResponse(SyncResponseMessage { state })),
            )
            .await
        {
            warn!(error = %err, %requester, "failed to send SyncResponse");
        }
    }

    async fn handle_sync_response(&self, sender: NodeId, msg: SyncResponseMessage) {
        if self.state.is_active() {
            return;
        }
        self.state.sync_responses.insert(sender, msg.state);

        let required = self.topology.active_quorum_size();
        if self.state.sync_responses.len() < required {
            return;
        }

        let candidate = self
            .state
            .sync_responses
            .iter()
            .max_by_key(|entry| entry.value().last_committed_phase)
            .map(|entry| entry.value().clone());

        let Some(candidate) = candidate else {
            return;
        };

        if candidate.snapshot.is_empty() {
            self.state.sync_responses.clear();
            self.activate().await;
            return;
        }

        let restored = {
            let mut state_machine = self.state_machine.lock().await;
            state_machine.restore_snapshot(&candidate.snapshot).await
        };
        match restored {
            Ok(()) => {
                self.state.set_current_phase(candidate.last_committed_phase);
                self.state.commit_phase(candidate.last_committed_phase);
                for batch in candidate.pending_batches {
                    self.state.insert_pending_batch(batch);
                }
                let saved = SavedState::new(
                    candidate.snapshot,
                    candidate.last_committed_phase,
                    self.state.pending_batches.iter().map(|entry| entry.value().clone()).collect(),
                );
                if let Err(err) = self.persistence.save(&saved).await {
                    warn!(error = %err, "failed to persist restored state");
                }
                self.activate().await;
            }
            Err(err) => {
                error!(error = %err, "restoreSnapshot failed; remaining inactive");
            }
        }
    }

    async fn activate(&self) {
        self.state.set_active(true);
        self.state.sync_responses.clear();
        info!(node = %self.node_id, "node activated");
        self.start_phase().await;
    }

    // ---- §4.11 topology events ----

    async fn handle_established(&self) {
        info!("quorum established; starting synchronization");
        self.synchronize_if_inactive().await;
    }

    async fn handle_disconnect(&self) {
        if !self.state.is_active() {
            return;
        }
        self.state.set_active(false);
        warn!(node = %self.node_id, "quorum disappeared; deactivating");

        let snapshot = {
            let state_machine = self.state_machine.lock().await;
            state_machine.make_snapshot().await
        };
        let snapshot = match snapshot {
            Ok(snapshot) => snapshot,
            Err(err) => {
                error!(error = %err, "snapshot failed during disconnect");
                rabia_core::state_machine::Snapshot::empty()
            }
        };
        let saved = SavedState::new(
            snapshot,
            self.state.last_committed_phase(),
            self.state.pending_batches.iter().map(|entry| entry.value().clone()).collect(),
        );
        if let Err(err) = self.persistence.save(&saved).await {
            error!(error = %err, "persistence save failed during disconnect");
        }

        self.state.reset_for_disconnect();
        {
            let mut state_machine = self.state_machine.lock().await;
            state_machine.reset().await;
        }
        self.state.fail_all_pending_results(self.node_id);
    }
}
