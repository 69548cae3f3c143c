//! Idempotent producer fence.
//!
//! Kafka-style exactly-once at the single-writer level: each append may carry
//! a `(producer_id, epoch, seq)` triple, and the per-stream table decides
//! whether it is fresh, a retry, or a zombie. Recording an accepted claim
//! happens in the same critical section as the log append.

use std::collections::HashMap;

/// Producer identity carried on an append.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProducerClaim {
    pub producer_id: String,
    pub epoch: u64,
    pub seq: u64,
}

/// Fence state for one producer on one stream.
///
/// The epoch is non-decreasing over time; `last_seq` is non-decreasing within
/// an epoch.
#[derive(Debug, Clone)]
pub struct ProducerState {
    pub epoch: u64,
    pub last_seq: u64,
    /// Offset acknowledged for `(epoch, last_seq)`, replayed on duplicates.
    pub last_offset: String,
    pub last_updated_ms: i64,
}

/// Outcome of checking a claim against the fence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FenceDecision {
    /// Fresh claim; commit and record.
    Accepted,
    /// Same `(epoch, seq)` retried; replay the recorded acknowledgement.
    Duplicate { offset: String },
    /// The claimant has been fenced out by a newer epoch.
    StaleEpoch { current_epoch: u64 },
    /// Sequence jumped ahead within the epoch.
    SequenceGap { expected: u64, received: u64 },
    /// Sequence fell behind the last acknowledged one.
    SequenceBehind { last_seq: u64, received: u64 },
}

/// Per-stream table of producer fence state.
#[derive(Debug, Default)]
pub struct ProducerTable {
    producers: HashMap<String, ProducerState>,
}

impl ProducerTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Decide what to do with an incoming claim. Read-only; callers commit
    /// via [`ProducerTable::record`] once the append is in the log.
    pub fn check(&self, claim: &ProducerClaim) -> FenceDecision {
        let Some(state) = self.producers.get(&claim.producer_id) else {
            return FenceDecision::Accepted;
        };
        if claim.epoch > state.epoch {
            return FenceDecision::Accepted;
        }
        if claim.epoch < state.epoch {
            return FenceDecision::StaleEpoch {
                current_epoch: state.epoch,
            };
        }
        if claim.seq == state.last_seq + 1 {
            FenceDecision::Accepted
        } else if claim.seq == state.last_seq {
            FenceDecision::Duplicate {
                offset: state.last_offset.clone(),
            }
        } else if claim.seq > state.last_seq {
            FenceDecision::SequenceGap {
                expected: state.last_seq + 1,
                received: claim.seq,
            }
        } else {
            FenceDecision::SequenceBehind {
                last_seq: state.last_seq,
                received: claim.seq,
            }
        }
    }

    /// Record an accepted claim together with the offset it produced.
    pub fn record(&mut self, claim: &ProducerClaim, offset: String, now_ms: i64) {
        self.producers.insert(
            claim.producer_id.clone(),
            ProducerState {
                epoch: claim.epoch,
                last_seq: claim.seq,
                last_offset: offset,
                last_updated_ms: now_ms,
            },
        );
    }

    /// Drop producers idle past the window. Piggy-backed on appends; one scan
    /// bounded by the number of distinct producers.
    pub fn collect_idle(&mut self, now_ms: i64, idle_ms: i64) -> usize {
        let before = self.producers.len();
        self.producers
            .retain(|_, state| now_ms - state.last_updated_ms < idle_ms);
        before - self.producers.len()
    }

    pub fn len(&self) -> usize {
        self.producers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.producers.is_empty()
    }
}
