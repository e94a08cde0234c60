//! Banker's-algorithm allocation.
//!
//! Conservative counterpart to [`super::Fifo`]: a task must declare a
//! claim ceiling per resource type at INITIATE, and a request is granted
//! only when the resulting state passes the safety check — some ordering
//! of remaining completions must still exist. Unsafe states are never
//! entered, so the deadlock phase has nothing to do.

use crate::program::ResourceId;
use crate::resources::{ResourceError, ResourceManager};
use crate::task::{AbortReason, TaskState};

use super::{Admission, Grant, Policy};

/// Safety-checked policy; deadlock-free by construction.
#[derive(Clone, Copy, Debug, Default)]
pub struct Banker;

impl Policy for Banker {
    fn name(&self) -> &'static str {
        "BANKER'S"
    }

    /// A ceiling above the pool's total can never be honored, so the task
    /// is rejected before it holds anything.
    fn admit(
        &self,
        manager: &mut ResourceManager,
        tasks: &mut [TaskState],
        idx: usize,
        resource: ResourceId,
        claim: u32,
    ) -> Result<Admission, ResourceError> {
        let total = manager
            .resource(resource)
            .ok_or(ResourceError::UnknownResource(resource))?
            .total_units();
        if claim > total {
            return Ok(Admission::Rejected(AbortReason::UnsatisfiableClaim {
                resource,
                claim,
                total,
            }));
        }
        tasks[idx].set_maximum(resource, claim);
        Ok(Admission::Admitted)
    }

    /// Requesting past the task's own ceiling is a protocol violation and
    /// aborts the task; otherwise the grant goes through only if the
    /// safety check approves the hypothetical state.
    fn grant(
        &self,
        manager: &mut ResourceManager,
        tasks: &mut [TaskState],
        idx: usize,
        resource: ResourceId,
        units: u32,
    ) -> Result<Grant, ResourceError> {
        let held = tasks[idx].claim_of(resource);
        let maximum = tasks[idx].maximum_of(resource);
        if held.saturating_add(units) > maximum {
            return Ok(Grant::Refused(AbortReason::MaximumExceeded {
                resource,
                requested: units,
                held,
                maximum,
            }));
        }

        if manager.grant_is_safe(tasks, idx, resource, units)?
            && manager.claim(&mut tasks[idx], resource, units)?
        {
            Ok(Grant::Granted)
        } else {
            Ok(Grant::Denied)
        }
    }

    /// Nothing to break: unsafe states are refused at grant time.
    fn break_deadlock(
        &self,
        _tasks: &[TaskState],
        _blocked: &[usize],
        _advancing: &[usize],
    ) -> Vec<usize> {
        Vec::new()
    }
}
