//! First-come-first-served allocation.
//!
//! Requests are granted greedily whenever the pool has enough units, so
//! the policy can drive the system into deadlock. A reactive detector
//! breaks same-type conflicts by aborting the earlier-recorded waiter;
//! conflicts across distinct types are outside its reach and end in the
//! engine's stall guard instead.

use std::collections::{BTreeMap, BTreeSet};

use crate::program::{Activity, ResourceId};
use crate::resources::{ResourceError, ResourceManager};
use crate::task::TaskState;

use super::{Admission, Grant, Policy};

/// Greedy policy; efficient, deadlock-prone.
#[derive(Clone, Copy, Debug, Default)]
pub struct Fifo;

impl Policy for Fifo {
    fn name(&self) -> &'static str {
        "FIFO"
    }

    /// FIFO has no admission control; the ceiling is recorded but unused.
    fn admit(
        &self,
        _manager: &mut ResourceManager,
        tasks: &mut [TaskState],
        idx: usize,
        resource: ResourceId,
        claim: u32,
    ) -> Result<Admission, ResourceError> {
        tasks[idx].set_maximum(resource, claim);
        Ok(Admission::Admitted)
    }

    fn grant(
        &self,
        manager: &mut ResourceManager,
        tasks: &mut [TaskState],
        idx: usize,
        resource: ResourceId,
        units: u32,
    ) -> Result<Grant, ResourceError> {
        if manager.claim(&mut tasks[idx], resource, units)? {
            Ok(Grant::Granted)
        } else {
            Ok(Grant::Denied)
        }
    }

    /// Deadlock detection fires only when every pending requester is stuck:
    /// at least two tasks blocked, no fewer blocked tasks than pending
    /// requesters, and two requesters waiting on the same type that nothing
    /// is about to release this cycle. Of each conflicting pair the
    /// earlier-recorded waiter is the victim; releasing its holdings lets
    /// the survivor proceed next cycle.
    fn break_deadlock(
        &self,
        tasks: &[TaskState],
        blocked: &[usize],
        advancing: &[usize],
    ) -> Vec<usize> {
        let requesters: Vec<usize> = tasks
            .iter()
            .enumerate()
            .filter(|(_, t)| {
                !t.is_finished() && matches!(t.next_activity(), Some(Activity::Request { .. }))
            })
            .map(|(idx, _)| idx)
            .collect();
        if blocked.len() < 2 || blocked.len() < requesters.len() {
            return Vec::new();
        }

        let releasing: BTreeSet<ResourceId> = tasks
            .iter()
            .filter(|t| !t.is_finished())
            .filter_map(|t| match t.next_activity() {
                Some(&Activity::Release { resource, .. }) => Some(resource),
                _ => None,
            })
            .collect();

        let mut victims = Vec::new();
        let mut waiting: BTreeMap<ResourceId, usize> = BTreeMap::new();
        for idx in requesters {
            let Some(&Activity::Request { resource, .. }) = tasks[idx].next_activity() else {
                continue;
            };
            if advancing.contains(&idx) || releasing.contains(&resource) {
                continue;
            }
            if let Some(earlier) = waiting.insert(resource, idx) {
                victims.push(earlier);
            }
        }
        victims
    }
}
