//! # Protocol Messages
//!
//! Wire and local-control messages exchanged between replicas during a run
//! of the consensus protocol (§6 of the protocol design).

use crate::persistence::SavedState;
use crate::{Batch, Command, NodeId, PhaseId, StateValue};
use serde::{Deserialize, Serialize};

/// An envelope carrying a single protocol message, tagged with its sender.
///
/// `Propose`/`VoteRound1`/`VoteRound2`/`Decision`/`SyncResponse` drive a round
/// to completion; `SyncRequest`/`NewBatch` are asynchronous and carry no
/// round-driving obligation on their own.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProtocolMessage {
    pub id: uuid::Uuid,
    pub from: NodeId,
    pub body: MessageBody,
}

impl ProtocolMessage {
    pub fn new(from: NodeId, body: MessageBody) -> Self {
        Self {
            id: uuid::Uuid::new_v4(),
            from,
            body,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum MessageBody {
    Propose(ProposeMessage),
    VoteRound1(VoteRound1Message),
    VoteRound2(VoteRound2Message),
    Decision(DecisionMessage),
    SyncRequest(SyncRequestMessage),
    SyncResponse(SyncResponseMessage),
    NewBatch(NewBatchMessage),
}

/// `Propose(sender, phase, batch)`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProposeMessage {
    pub phase: PhaseId,
    pub batch: Batch,
}

/// `VoteRound1(sender, phase, value ∈ {V0, V1})`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VoteRound1Message {
    pub phase: PhaseId,
    pub value: StateValue,
}

/// `VoteRound2(sender, phase, value ∈ {V0, V1, VQuestion})`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VoteRound2Message {
    pub phase: PhaseId,
    pub value: StateValue,
}

/// `Decision(sender, phase, value, batch)`. `batch` is empty iff `value == V0`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecisionMessage {
    pub phase: PhaseId,
    pub value: StateValue,
    pub batch: Batch,
}

/// `SyncRequest(sender)`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncRequestMessage;

/// `SyncResponse(sender, savedState)`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncResponseMessage {
    pub state: SavedState,
}

/// `NewBatch(sender, batch)`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewBatchMessage {
    pub batch: Batch,
}

/// Local control event: a topology change observed by the engine.
///
/// Never serialized onto the wire; delivered to the engine's command queue
/// by the topology collaborator (§4.11).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuorumState {
    Established,
    Disappeared,
}

/// Local control event: a client submission (§4.3). Carries an optional
/// completion handle that `apply` uses to await the decided result; bare
/// `SubmitCommands` fire-and-forget calls omit it.
#[derive(Debug)]
pub struct SubmitCommands {
    pub commands: Vec<Command>,
    pub reply: Option<tokio::sync::oneshot::Sender<crate::Result<Vec<bytes::Bytes>>>>,
}

impl SubmitCommands {
    pub fn fire_and_forget(commands: Vec<Command>) -> Self {
        Self {
            commands,
            reply: None,
        }
    }

    pub fn with_reply(
        commands: Vec<Command>,
        reply: tokio::sync::oneshot::Sender<crate::Result<Vec<bytes::Bytes>>>,
    ) -> Self {
        Self {
            commands,
            reply: Some(reply),
        }
    }
}
