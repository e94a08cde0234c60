//! Per-task runtime state.
//!
//! A [`TaskState`] pairs an immutable activity stream with the mutable
//! bookkeeping the allocator maintains for it: a cursor into the stream,
//! the units it currently holds per resource type, the ceilings it has
//! declared, wait/total cycle counters, and its lifecycle state.
//!
//! The claim ledger is deliberately not publicly writable. Claimed units
//! exist in exactly two places (here and in the resource pool), and the
//! `ResourceManager` is the only code allowed to move units between them,
//! so the two ledgers cannot drift apart.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::program::{Activity, ResourceId, TaskId, TaskProgram};

/// Lifecycle of a task within a run.
///
/// `Ready` and `Blocked` alternate freely; `Terminated` and `Aborted` are
/// terminal. An aborted task counts as finished for scheduling purposes.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Lifecycle {
    Ready,
    Blocked,
    Terminated,
    Aborted,
}

/// Why a task was aborted rather than run to completion.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum AbortReason {
    /// FIFO chose this task as the victim to break a deadlock.
    DeadlockVictim,
    /// Banker pre-flight rejection: the declared ceiling can never be met.
    UnsatisfiableClaim {
        resource: ResourceId,
        claim: u32,
        total: u32,
    },
    /// Banker protocol violation: a request would push the task past its
    /// own declared ceiling.
    MaximumExceeded {
        resource: ResourceId,
        requested: u32,
        held: u32,
        maximum: u32,
    },
}

impl std::fmt::Display for AbortReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::DeadlockVictim => write!(f, "aborted to break a deadlock"),
            Self::UnsatisfiableClaim {
                resource,
                claim,
                total,
            } => write!(
                f,
                "claim for resource {resource} ({claim}) exceeds units present ({total})"
            ),
            Self::MaximumExceeded {
                resource,
                requested,
                held,
                maximum,
            } => write!(
                f,
                "request for {requested} of resource {resource} exceeds declared \
                 maximum ({held} held, {maximum} maximum)"
            ),
        }
    }
}

/// Runtime state of one task.
#[derive(Clone, Debug)]
pub struct TaskState {
    id: TaskId,
    code: Vec<Activity>,
    pc: usize,
    claims: BTreeMap<ResourceId, u32>,
    maximums: BTreeMap<ResourceId, u32>,
    wait_time: u64,
    total_time: u64,
    compute_remaining: Option<u32>,
    state: Lifecycle,
    abort_reason: Option<AbortReason>,
}

impl TaskState {
    pub fn new(program: TaskProgram) -> Self {
        Self {
            id: program.id,
            code: program.code,
            pc: 0,
            claims: BTreeMap::new(),
            maximums: BTreeMap::new(),
            wait_time: 0,
            total_time: 0,
            compute_remaining: None,
            state: Lifecycle::Ready,
            abort_reason: None,
        }
    }

    #[inline]
    pub fn id(&self) -> TaskId {
        self.id
    }

    /// Head activity, or `None` when the script is exhausted.
    #[inline]
    pub fn next_activity(&self) -> Option<&Activity> {
        self.code.get(self.pc)
    }

    /// Pop the head activity, exposing the one after it.
    pub fn advance(&mut self) {
        debug_assert!(self.pc < self.code.len());
        self.pc += 1;
    }

    pub fn state(&self) -> Lifecycle {
        self.state
    }

    /// True once the task is terminated or aborted.
    #[inline]
    pub fn is_finished(&self) -> bool {
        matches!(self.state, Lifecycle::Terminated | Lifecycle::Aborted)
    }

    pub fn is_blocked(&self) -> bool {
        self.state == Lifecycle::Blocked
    }

    pub fn block(&mut self) {
        debug_assert!(!self.is_finished());
        self.state = Lifecycle::Blocked;
    }

    pub fn unblock(&mut self) {
        if self.state == Lifecycle::Blocked {
            self.state = Lifecycle::Ready;
        }
    }

    /// Terminal transition for a task that ran its script to the end.
    pub fn terminate(&mut self) {
        debug_assert!(!self.is_finished());
        self.state = Lifecycle::Terminated;
    }

    /// Terminal transition for a task removed from the run.
    pub fn abort(&mut self, reason: AbortReason) {
        debug_assert!(!self.is_finished());
        self.state = Lifecycle::Aborted;
        self.abort_reason = Some(reason);
    }

    pub fn abort_reason(&self) -> Option<AbortReason> {
        self.abort_reason
    }

    /// Charge one cycle of elapsed time.
    pub fn credit_cycle(&mut self) {
        self.total_time += 1;
    }

    /// Charge one cycle of waiting (on top of elapsed time).
    pub fn credit_wait(&mut self) {
        self.wait_time += 1;
    }

    pub fn wait_time(&self) -> u64 {
        self.wait_time
    }

    pub fn total_time(&self) -> u64 {
        self.total_time
    }

    /// Share of elapsed time spent waiting, or `None` before any time has
    /// been charged.
    pub fn wait_percentage(&self) -> Option<f64> {
        if self.total_time == 0 {
            return None;
        }
        Some(self.wait_time as f64 / self.total_time as f64 * 100.0)
    }

    /// Run one cycle of a COMPUTE activity of `cycles` length.
    ///
    /// The remaining-cycle counter is armed on the first visit and cleared
    /// when it reaches zero. Returns true when the activity is done.
    pub fn compute_step(&mut self, cycles: u32) -> bool {
        debug_assert!(cycles >= 1);
        let remaining = self.compute_remaining.get_or_insert(cycles);
        *remaining -= 1;
        if *remaining == 0 {
            self.compute_remaining = None;
            true
        } else {
            false
        }
    }

    /// Units of `resource` this task currently holds.
    pub fn claim_of(&self, resource: ResourceId) -> u32 {
        self.claims.get(&resource).copied().unwrap_or(0)
    }

    /// All non-zero claims, keyed by resource type.
    pub fn claims(&self) -> impl Iterator<Item = (ResourceId, u32)> + '_ {
        self.claims
            .iter()
            .filter(|(_, &units)| units > 0)
            .map(|(&id, &units)| (id, units))
    }

    /// Declared ceiling for `resource`, zero if never initiated.
    pub fn maximum_of(&self, resource: ResourceId) -> u32 {
        self.maximums.get(&resource).copied().unwrap_or(0)
    }

    pub fn set_maximum(&mut self, resource: ResourceId, maximum: u32) {
        self.maximums.insert(resource, maximum);
    }

    /// Ledger hook for `ResourceManager::claim`. Callers outside the
    /// manager must go through the manager so the pool stays reconciled.
    pub(crate) fn add_claim(&mut self, resource: ResourceId, units: u32) {
        *self.claims.entry(resource).or_insert(0) += units;
    }

    /// Ledger hook for `ResourceManager::release`.
    pub(crate) fn remove_claim(&mut self, resource: ResourceId, units: u32) {
        let held = self.claims.entry(resource).or_insert(0);
        debug_assert!(*held >= units);
        *held -= units;
    }
}
