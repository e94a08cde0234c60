//! The cycle-driven allocation engine.
//!
//! [`Simulation`] owns the task set and the resource pools and advances a
//! logical cycle counter. Each cycle runs six phases in a fixed order:
//! initiates, requests (previously blocked tasks first, in the order they
//! blocked), releases, computes, deadlock handling, and cycle close (pop
//! the head activity of every task that made progress, then process
//! terminates, which consume no tick). The order is load-bearing: a unit
//! released this cycle can unblock a requester no earlier than the next
//! cycle, and the deadlock detector sees which releases are imminent.
//!
//! Policies differ only where spec'd: how a task is admitted at INITIATE,
//! whether a REQUEST is granted, and what (if anything) breaks a deadlock.
//! Those three decisions live behind the [`Policy`] strategy trait;
//! everything else is shared.

pub mod banker;
pub mod fifo;

pub use banker::Banker;
pub use fifo::Fifo;

use std::fmt;
use std::mem;

use serde::{Deserialize, Serialize};

use crate::program::{Activity, Program, ResourceId};
use crate::report::RunReport;
use crate::resources::{ResourceError, ResourceManager};
use crate::task::{AbortReason, TaskState};

/// Knobs for a simulation run.
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct SimConfig {
    /// Upper bound on cycles before the run is declared stalled. Guards
    /// against workloads FIFO cannot untangle (its detector only breaks
    /// same-type conflicts) and requests that can never be satisfied.
    pub max_cycles: u64,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            max_cycles: 100_000,
        }
    }
}

/// Failures that end a run without a report.
#[derive(Debug)]
#[non_exhaustive]
pub enum SimError {
    /// A ledger operation was mis-called; see [`ResourceError`].
    Resource(ResourceError),
    /// Unfinished tasks remained after `max_cycles` cycles.
    Stalled { cycle: u64 },
}

impl fmt::Display for SimError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Resource(err) => write!(f, "ledger error: {err}"),
            Self::Stalled { cycle } => {
                write!(f, "no progress possible after {cycle} cycles")
            }
        }
    }
}

impl std::error::Error for SimError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Resource(err) => Some(err),
            Self::Stalled { .. } => None,
        }
    }
}

impl From<ResourceError> for SimError {
    fn from(err: ResourceError) -> Self {
        Self::Resource(err)
    }
}

/// INITIATE-phase decision.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Admission {
    Admitted,
    /// Pre-flight rejection; the task is aborted before holding anything.
    Rejected(AbortReason),
}

/// REQUEST-phase decision.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Grant {
    /// Units transferred; the task advances this cycle.
    Granted,
    /// Not now; the task waits blocked and retries next cycle.
    Denied,
    /// Protocol violation; the task is aborted.
    Refused(AbortReason),
}

/// The policy-specific third of the engine: admission, granting, and
/// deadlock resolution. Implementations must not touch ledgers except
/// through the [`ResourceManager`].
pub trait Policy {
    fn name(&self) -> &'static str;

    /// Handle an INITIATE head declaring `claim` units of `resource`.
    fn admit(
        &self,
        manager: &mut ResourceManager,
        tasks: &mut [TaskState],
        idx: usize,
        resource: ResourceId,
        claim: u32,
    ) -> Result<Admission, ResourceError>;

    /// Handle a REQUEST head for `units` of `resource`.
    fn grant(
        &self,
        manager: &mut ResourceManager,
        tasks: &mut [TaskState],
        idx: usize,
        resource: ResourceId,
        units: u32,
    ) -> Result<Grant, ResourceError>;

    /// Pick victims to abort when blocked tasks can make no progress.
    /// `blocked` lists task indices in the order they blocked; `advancing`
    /// lists tasks that already made progress this cycle.
    fn break_deadlock(
        &self,
        tasks: &[TaskState],
        blocked: &[usize],
        advancing: &[usize],
    ) -> Vec<usize>;
}

/// A single run of one workload under one policy.
pub struct Simulation<P: Policy> {
    policy: P,
    cfg: SimConfig,
    manager: ResourceManager,
    tasks: Vec<TaskState>,
    /// Task indices in the order they became blocked.
    blocked: Vec<usize>,
    /// Tasks whose head activity completed this cycle; popped at close.
    advance: Vec<usize>,
    cycle: u64,
}

impl<P: Policy> Simulation<P> {
    pub fn new(program: &Program, policy: P, cfg: SimConfig) -> Self {
        Self {
            policy,
            cfg,
            manager: ResourceManager::from_specs(&program.resources),
            tasks: program.tasks.iter().cloned().map(TaskState::new).collect(),
            blocked: Vec::new(),
            advance: Vec::new(),
            cycle: 0,
        }
    }

    pub fn cycle(&self) -> u64 {
        self.cycle
    }

    pub fn tasks(&self) -> &[TaskState] {
        &self.tasks
    }

    pub fn manager(&self) -> &ResourceManager {
        &self.manager
    }

    /// True once every task is terminated or aborted.
    pub fn is_complete(&self) -> bool {
        self.tasks.iter().all(TaskState::is_finished)
    }

    /// Run to completion and summarize.
    pub fn run(mut self) -> Result<RunReport, SimError> {
        while self.step()? {
            if self.cycle >= self.cfg.max_cycles && !self.is_complete() {
                return Err(SimError::Stalled { cycle: self.cycle });
            }
        }
        Ok(self.report())
    }

    /// Advance one cycle. Returns false when nothing was left to do.
    pub fn step(&mut self) -> Result<bool, SimError> {
        if self.is_complete() {
            return Ok(false);
        }

        self.phase_initiates()?;
        self.phase_requests()?;
        self.phase_releases()?;
        self.phase_computes();
        self.phase_deadlocks()?;

        self.cycle += 1;
        let advance = mem::take(&mut self.advance);
        for idx in advance {
            self.tasks[idx].advance();
        }
        self.phase_terminates()?;
        Ok(true)
    }

    /// Summary of the run so far.
    pub fn report(&self) -> RunReport {
        RunReport::collect(self.policy.name(), self.cycle, &self.tasks)
    }

    /// Unfinished tasks whose head activity matches `pred`, in index order.
    fn tasks_at(&self, pred: fn(&Activity) -> bool) -> Vec<usize> {
        self.tasks
            .iter()
            .enumerate()
            .filter(|(_, t)| !t.is_finished() && t.next_activity().is_some_and(|a| pred(a)))
            .map(|(idx, _)| idx)
            .collect()
    }

    fn phase_initiates(&mut self) -> Result<(), SimError> {
        for idx in self.tasks_at(|a| matches!(a, Activity::Initiate { .. })) {
            let Some(&Activity::Initiate { resource, claim }) = self.tasks[idx].next_activity()
            else {
                continue;
            };
            match self
                .policy
                .admit(&mut self.manager, &mut self.tasks, idx, resource, claim)?
            {
                Admission::Admitted => {
                    self.advance.push(idx);
                    self.tasks[idx].credit_cycle();
                }
                Admission::Rejected(reason) => self.abort_task(idx, reason)?,
            }
        }
        Ok(())
    }

    fn phase_requests(&mut self) -> Result<(), SimError> {
        // Blocked tasks retry first, in the order they blocked, so a task
        // cannot be starved by later arrivals at the same pool.
        let mut visited = Vec::new();
        let retry_queue = self.blocked.clone();
        for idx in retry_queue {
            if self.tasks[idx].is_finished() {
                continue;
            }
            self.service_request(idx)?;
            visited.push(idx);
        }
        for idx in self.tasks_at(|a| matches!(a, Activity::Request { .. })) {
            if !visited.contains(&idx) {
                self.service_request(idx)?;
            }
        }
        Ok(())
    }

    fn service_request(&mut self, idx: usize) -> Result<(), SimError> {
        let Some(&Activity::Request { resource, units }) = self.tasks[idx].next_activity()
        else {
            return Ok(());
        };
        match self
            .policy
            .grant(&mut self.manager, &mut self.tasks, idx, resource, units)?
        {
            Grant::Granted => {
                self.blocked.retain(|&i| i != idx);
                self.tasks[idx].unblock();
                self.advance.push(idx);
                self.tasks[idx].credit_cycle();
            }
            Grant::Denied => {
                self.tasks[idx].credit_wait();
                if !self.blocked.contains(&idx) {
                    self.blocked.push(idx);
                }
                self.tasks[idx].block();
                self.tasks[idx].credit_cycle();
            }
            Grant::Refused(reason) => self.abort_task(idx, reason)?,
        }
        Ok(())
    }

    fn phase_releases(&mut self) -> Result<(), SimError> {
        for idx in self.tasks_at(|a| matches!(a, Activity::Release { .. })) {
            let Some(&Activity::Release { resource, units }) = self.tasks[idx].next_activity()
            else {
                continue;
            };
            self.manager
                .release(&mut self.tasks[idx], resource, units)?;
            self.advance.push(idx);
            self.tasks[idx].credit_cycle();
        }
        Ok(())
    }

    fn phase_computes(&mut self) {
        for idx in self.tasks_at(|a| matches!(a, Activity::Compute { .. })) {
            let Some(&Activity::Compute { cycles }) = self.tasks[idx].next_activity() else {
                continue;
            };
            if self.tasks[idx].compute_step(cycles) {
                self.advance.push(idx);
            }
            self.tasks[idx].credit_cycle();
        }
    }

    fn phase_deadlocks(&mut self) -> Result<(), SimError> {
        let victims = self
            .policy
            .break_deadlock(&self.tasks, &self.blocked, &self.advance);
        for idx in victims {
            self.abort_task(idx, AbortReason::DeadlockVictim)?;
        }
        Ok(())
    }

    /// Terminates consume no tick: a task whose freshly exposed head is
    /// TERMINATE finishes at the close of the same cycle.
    fn phase_terminates(&mut self) -> Result<(), SimError> {
        for idx in self.tasks_at(|a| matches!(a, Activity::Terminate)) {
            self.manager.release_all(&mut self.tasks[idx])?;
            self.tasks[idx].terminate();
        }
        Ok(())
    }

    fn abort_task(&mut self, idx: usize, reason: AbortReason) -> Result<(), SimError> {
        let task = &mut self.tasks[idx];
        self.manager.release_all(task)?;
        task.abort(reason);
        self.blocked.retain(|&i| i != idx);
        Ok(())
    }
}
