//! # Phase State and Pure Evaluation
//!
//! Per-phase vote bookkeeping and the pure functions that turn collected
//! votes into the next outbound vote or a decision (§4.1).

use crate::{Batch, CorrelationId, NodeId, PhaseId, StateValue};
use std::collections::HashMap;

/// Vote and proposal bookkeeping for a single consensus phase.
///
/// All mutators are idempotent first-wins: a node's second attempt to
/// register a proposal or vote for a phase it already voted in has no
/// effect. `decided` only ever transitions `false -> true`.
#[derive(Debug, Clone)]
pub struct PhaseState {
    phase: PhaseId,
    proposals: HashMap<NodeId, Batch>,
    round1_votes: HashMap<NodeId, StateValue>,
    round2_votes: HashMap<NodeId, StateValue>,
    decided: bool,
}

impl PhaseState {
    pub fn new(phase: PhaseId) -> Self {
        Self {
            phase,
            proposals: HashMap::new(),
            round1_votes: HashMap::new(),
            round2_votes: HashMap::new(),
            decided: false,
        }
    }

    pub fn phase(&self) -> PhaseId {
        self.phase
    }

    // --- queries ---

    pub fn has_proposal_from(&self, node: NodeId) -> bool {
        self.proposals.contains_key(&node)
    }

    pub fn proposal_count(&self) -> usize {
        self.proposals.len()
    }

    pub fn has_quorum_proposals(&self, q: usize) -> bool {
        self.proposal_count() >= q
    }

    pub fn has_voted_round1(&self, node: NodeId) -> bool {
        self.round1_votes.contains_key(&node)
    }

    pub fn has_voted_round2(&self, node: NodeId) -> bool {
        self.round2_votes.contains_key(&node)
    }

    pub fn is_decided(&self) -> bool {
        self.decided
    }

    pub fn count_round1(&self, value: StateValue) -> usize {
        self.round1_votes.values().filter(|v| **v == value).count()
    }

    pub fn count_round2(&self, value: StateValue) -> usize {
        self.round2_votes.values().filter(|v| **v == value).count()
    }

    pub fn has_round1_majority_votes(&self, q: usize) -> bool {
        self.round1_votes.len() >= q
    }

    pub fn has_round2_majority_votes(&self, q: usize) -> bool {
        self.round2_votes.len() >= q
    }

    // --- mutators (idempotent, first-wins) ---

    /// Registers `node`'s proposal. No-op if `node` already proposed.
    pub fn register_proposal(&mut self, node: NodeId, batch: Batch) {
        self.proposals.entry(node).or_insert(batch);
    }

    /// Registers `node`'s round-1 vote. No-op if `node` already voted round 1.
    pub fn register_round1_vote(&mut self, node: NodeId, value: StateValue) {
        self.round1_votes.entry(node).or_insert(value);
    }

    /// Registers `node`'s round-2 vote. No-op if `node` already voted round 2.
    pub fn register_round2_vote(&mut self, node: NodeId, value: StateValue) {
        self.round2_votes.entry(node).or_insert(value);
    }

    /// Atomically transitions `decided` from `false` to `true`, returning the
    /// prior value. A caller sees `true` here exactly when some earlier call
    /// already committed a decision for this phase.
    pub fn try_mark_decided(&mut self) -> bool {
        let prior = self.decided;
        self.decided = true;
        prior
    }

    // --- pure evaluation ---

    /// Groups collected proposals by correlation id (ignoring the empty
    /// batch) and votes `V1` iff some group reached size `>= q`.
    pub fn evaluate_initial_vote(&self, q: usize) -> StateValue {
        let mut groups: HashMap<CorrelationId, usize> = HashMap::new();
        for batch in self.proposals.values() {
            if batch.is_empty() {
                continue;
            }
            *groups.entry(batch.correlation_id).or_insert(0) += 1;
        }
        if groups.values().any(|&count| count >= q) {
            StateValue::V1
        } else {
            StateValue::V0
        }
    }

    /// Returns the round-1 value that reached the super-majority threshold
    /// `s = n - f`, if any.
    pub fn super_majority_round1_value(&self, s: usize) -> Option<StateValue> {
        if self.count_round1(StateValue::V1) >= s {
            Some(StateValue::V1)
        } else if self.count_round1(StateValue::V0) >= s {
            Some(StateValue::V0)
        } else {
            None
        }
    }

    /// Round-2 vote derived from the collected round-1 votes.
    pub fn evaluate_round2_vote(&self, q: usize) -> StateValue {
        if self.count_round1(StateValue::V0) >= q {
            StateValue::V0
        } else if self.count_round1(StateValue::V1) >= q {
            StateValue::V1
        } else {
            StateValue::VQuestion
        }
    }

    /// Resolves the outcome of round 2 into a decided `(value, batch)` pair,
    /// falling back to the deterministic coin flip when neither value
    /// reached `f + 1`. `q` is unused by the threshold checks themselves but
    /// taken for symmetry with `evaluate_round2_vote` and future callers.
    pub fn process_round2_completion(&self, f_plus_one: usize, _q: usize) -> (StateValue, Batch) {
        let value = if self.count_round2(StateValue::V1) >= f_plus_one {
            StateValue::V1
        } else if self.count_round2(StateValue::V0) >= f_plus_one {
            StateValue::V0
        } else {
            self.coin_flip()
        };
        let batch = if value == StateValue::V1 {
            self.find_agreed_proposal()
        } else {
            Batch::empty()
        };
        (value, batch)
    }

    /// Groups non-empty proposals by correlation id and returns the first
    /// batch of the largest group, tiebreaking on correlation id's total
    /// order. Returns the empty batch if there is no non-empty proposal.
    pub fn find_agreed_proposal(&self) -> Batch {
        let mut groups: HashMap<CorrelationId, Vec<&Batch>> = HashMap::new();
        for batch in self.proposals.values() {
            if batch.is_empty() {
                continue;
            }
            groups.entry(batch.correlation_id).or_default().push(batch);
        }
        groups
            .into_iter()
            .max_by(|(cid_a, batches_a), (cid_b, batches_b)| {
                batches_a.len().cmp(&batches_b.len()).then_with(|| cid_a.cmp(cid_b))
            })
            .and_then(|(_, batches)| batches.into_iter().next().cloned())
            .unwrap_or_else(Batch::empty)
    }

    /// Deterministic coin flip keyed on bit 0 of the phase value: even phases
    /// flip `V0`, odd phases flip `V1`. Every node computes the same value
    /// for the same phase without any communication.
    pub fn coin_flip(&self) -> StateValue {
        if self.phase.value() % 2 == 0 {
            StateValue::V0
        } else {
            StateValue::V1
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Command;

    fn node(n: u32) -> NodeId {
        NodeId::from(n)
    }

    #[test]
    fn proposal_registration_is_first_wins() {
        let mut state = PhaseState::new(PhaseId::new(0));
        let a = Batch::new(CorrelationId::new(), 1, vec![Command::new("a")]);
        let b = Batch::new(CorrelationId::new(), 2, vec![Command::new("b")]);
        state.register_proposal(node(1), a.clone());
        state.register_proposal(node(1), b);
        assert_eq!(state.proposals.get(&node(1)), Some(&a));
    }

    #[test]
    fn evaluate_initial_vote_needs_quorum_sized_group() {
        let mut state = PhaseState::new(PhaseId::new(0));
        let cid = CorrelationId::new();
        let batch = Batch::new(cid, 1, vec![Command::new("x")]);
        state.register_proposal(node(1), batch.clone());
        state.register_proposal(node(2), batch.clone());
        state.register_proposal(node(3), Batch::new(CorrelationId::new(), 2, vec![Command::new("y")]));
        assert_eq!(state.evaluate_initial_vote(2), StateValue::V1);
        assert_eq!(state.evaluate_initial_vote(3), StateValue::V0);
    }

    #[test]
    fn try_mark_decided_only_trips_once() {
        let mut state = PhaseState::new(PhaseId::new(0));
        assert!(!state.try_mark_decided());
        assert!(state.try_mark_decided());
        assert!(state.is_decided());
    }

    #[test]
    fn coin_flip_is_a_function_of_phase_parity() {
        assert_eq!(PhaseState::new(PhaseId::new(0)).coin_flip(), StateValue::V0);
        assert_eq!(PhaseState::new(PhaseId::new(1)).coin_flip(), StateValue::V1);
        assert_eq!(PhaseState::new(PhaseId::new(42)).coin_flip(), StateValue::V0);
    }

    #[test]
    fn find_agreed_proposal_breaks_ties_on_correlation_id() {
        let mut state = PhaseState::new(PhaseId::new(0));
        let cid_low = CorrelationId(uuid::Uuid::from_u128(1));
        let cid_high = CorrelationId(uuid::Uuid::from_u128(2));
        let low = Batch::new(cid_low, 1, vec![Command::new("low")]);
        let high = Batch::new(cid_high, 2, vec![Command::new("high")]);
        state.register_proposal(node(1), low);
        state.register_proposal(node(2), high.clone());
        assert_eq!(state.find_agreed_proposal(), high);
    }

    #[test]
    fn find_agreed_proposal_empty_when_no_non_empty_proposal() {
        let state = PhaseState::new(PhaseId::new(0));
        assert!(state.find_agreed_proposal().is_empty());
    }
}

#[cfg(test)]
mod proptests {
    use super::*;
    use crate::Command;
    use proptest::prelude::*;

    fn arb_value() -> impl Strategy<Value = StateValue> {
        prop_oneof![
            Just(StateValue::V0),
            Just(StateValue::V1),
            Just(StateValue::VQuestion),
        ]
    }

    proptest! {
        /// §8 round-trip property: whichever vote a node registers first for
        /// a phase is the one that sticks, no matter how many times (or with
        /// what values) it tries again.
        #[test]
        fn register_round1_vote_is_first_wins(
            first in arb_value().prop_filter("round1 excludes VQuestion", |v| *v != StateValue::VQuestion),
            rest in prop::collection::vec(arb_value().prop_filter("round1 excludes VQuestion", |v| *v != StateValue::VQuestion), 0..8),
        ) {
            let mut state = PhaseState::new(PhaseId::new(0));
            let voter = NodeId::from(1u32);
            state.register_round1_vote(voter, first);
            for value in rest {
                state.register_round1_vote(voter, value);
            }
            prop_assert_eq!(state.count_round1(first), 1);
        }

        #[test]
        fn register_round2_vote_is_first_wins(
            first in arb_value(),
            rest in prop::collection::vec(arb_value(), 0..8),
        ) {
            let mut state = PhaseState::new(PhaseId::new(0));
            let voter = NodeId::from(1u32);
            state.register_round2_vote(voter, first);
            for value in rest {
                state.register_round2_vote(voter, value);
            }
            prop_assert_eq!(state.count_round2(first), 1);
        }

        /// `register_proposal` is first-wins regardless of how many distinct
        /// correlation ids a node's later attempts carry.
        #[test]
        fn register_proposal_is_first_wins(attempts in 1..8usize) {
            let mut state = PhaseState::new(PhaseId::new(0));
            let proposer = NodeId::from(1u32);
            let first = Batch::new(CorrelationId::new(), 1, vec![Command::new("first")]);
            state.register_proposal(proposer, first.clone());
            for i in 0..attempts {
                let later = Batch::new(CorrelationId::new(), (i + 2) as u64, vec![Command::new("later")]);
                state.register_proposal(proposer, later);
            }
            prop_assert_eq!(state.proposal_count(), 1);
            prop_assert!(state.has_proposal_from(proposer));
        }

        /// `try_mark_decided` only ever reports `false` (transitioned) once;
        /// every subsequent call for the same phase reports `true` (already
        /// decided) no matter how many times it's called.
        #[test]
        fn try_mark_decided_transitions_exactly_once(extra_calls in 0..16usize) {
            let mut state = PhaseState::new(PhaseId::new(0));
            prop_assert!(!state.try_mark_decided());
            for _ in 0..extra_calls {
                prop_assert!(state.try_mark_decided());
            }
            prop_assert!(state.is_decided());
        }

        /// Coin-flip determinism (§8): the outcome is a pure function of the
        /// phase's numeric value (its parity) and nothing else — two phase
        /// states for the same phase id always agree, regardless of what
        /// votes or proposals have been registered on either.
        #[test]
        fn coin_flip_is_a_deterministic_function_of_phase_value(phase_value in any::<u64>()) {
            let a = PhaseState::new(PhaseId::new(phase_value));
            let mut b = PhaseState::new(PhaseId::new(phase_value));
            b.register_proposal(NodeId::from(1u32), Batch::new(CorrelationId::new(), 1, vec![Command::new("x")]));
            b.register_round1_vote(NodeId::from(2u32), StateValue::V1);

            prop_assert_eq!(a.coin_flip(), b.coin_flip());
            let expected = if phase_value % 2 == 0 { StateValue::V0 } else { StateValue::V1 };
            prop_assert_eq!(a.coin_flip(), expected);
        }
    }
}
