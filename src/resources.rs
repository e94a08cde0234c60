//! Resource pools and the manager that owns every ledger mutation.
//!
//! Claimed units exist in two ledgers at once: the pool's available count
//! and the holding task's claim map. [`ResourceManager`] is the single
//! mutator of both, and every operation either applies to both ledgers or
//! to neither. Running out of units is an ordinary outcome (`Ok(false)`
//! from [`ResourceManager::claim`]); anything that would desynchronize the
//! ledgers is a [`ResourceError`] and aborts the run.
//!
//! The Banker safety check ([`ResourceManager::grant_is_safe`]) runs the
//! classical safety algorithm on value-semantics clones of the manager and
//! the task set, so a hypothetical grant can never leak into live state.

use std::collections::BTreeMap;
use std::fmt;

use crate::program::{ResourceId, ResourceSpec};
use crate::task::TaskState;

/// Ledger-consistency failures. Always a bug in the caller, never an
/// ordinary contention outcome.
#[derive(Debug)]
#[non_exhaustive]
pub enum ResourceError {
    /// No pool exists for the named resource type.
    UnknownResource(ResourceId),
    /// A task tried to return more units than it holds.
    OverRelease {
        resource: ResourceId,
        held: u32,
        released: u32,
    },
    /// A release would push the pool above its total.
    PoolOverflow {
        resource: ResourceId,
        available: u32,
        total: u32,
        released: u32,
    },
}

impl fmt::Display for ResourceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnknownResource(id) => write!(f, "unknown resource type {id}"),
            Self::OverRelease {
                resource,
                held,
                released,
            } => write!(
                f,
                "released {released} units of resource {resource} but only {held} are held"
            ),
            Self::PoolOverflow {
                resource,
                available,
                total,
                released,
            } => write!(
                f,
                "releasing {released} units of resource {resource} would exceed the pool \
                 ({available} available of {total} total)"
            ),
        }
    }
}

impl std::error::Error for ResourceError {}

/// One pool of interchangeable units of a single type.
#[derive(Clone, Copy, Debug)]
pub struct Resource {
    id: ResourceId,
    total: u32,
    available: u32,
}

impl Resource {
    pub fn new(id: ResourceId, total: u32) -> Self {
        Self {
            id,
            total,
            available: total,
        }
    }

    pub fn id(&self) -> ResourceId {
        self.id
    }

    pub fn total_units(&self) -> u32 {
        self.total
    }

    pub fn available_units(&self) -> u32 {
        self.available
    }
}

/// Owner of all resource pools and sole mutator of claim state.
#[derive(Clone, Debug, Default)]
pub struct ResourceManager {
    resources: BTreeMap<ResourceId, Resource>,
}

impl ResourceManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_specs(specs: &[ResourceSpec]) -> Self {
        let mut manager = Self::new();
        for spec in specs {
            manager.add(Resource::new(spec.id, spec.total));
        }
        manager
    }

    pub fn add(&mut self, resource: Resource) {
        self.resources.insert(resource.id(), resource);
    }

    pub fn resource(&self, id: ResourceId) -> Option<&Resource> {
        self.resources.get(&id)
    }

    /// All pools in id order.
    pub fn resources(&self) -> impl Iterator<Item = &Resource> {
        self.resources.values()
    }

    /// Move `units` of `resource` from the pool to `task`.
    ///
    /// `Ok(false)` when fewer than `units` are available; neither ledger
    /// moves in that case.
    pub fn claim(
        &mut self,
        task: &mut TaskState,
        resource: ResourceId,
        units: u32,
    ) -> Result<bool, ResourceError> {
        let pool = self
            .resources
            .get_mut(&resource)
            .ok_or(ResourceError::UnknownResource(resource))?;
        if units > pool.available {
            return Ok(false);
        }
        pool.available -= units;
        task.add_claim(resource, units);
        Ok(true)
    }

    /// Move `units` of `resource` from `task` back to the pool.
    ///
    /// Returning units the task does not hold is a ledger error, not a
    /// contention outcome; nothing moves on failure.
    pub fn release(
        &mut self,
        task: &mut TaskState,
        resource: ResourceId,
        units: u32,
    ) -> Result<(), ResourceError> {
        let held = task.claim_of(resource);
        let pool = self
            .resources
            .get_mut(&resource)
            .ok_or(ResourceError::UnknownResource(resource))?;
        if units > held {
            return Err(ResourceError::OverRelease {
                resource,
                held,
                released: units,
            });
        }
        if units > pool.total - pool.available {
            return Err(ResourceError::PoolOverflow {
                resource,
                available: pool.available,
                total: pool.total,
                released: units,
            });
        }
        pool.available += units;
        task.remove_claim(resource, units);
        Ok(())
    }

    /// Return every unit `task` holds to the pools. Used on terminate and
    /// on abort.
    pub fn release_all(&mut self, task: &mut TaskState) -> Result<(), ResourceError> {
        let held: Vec<(ResourceId, u32)> = task.claims().collect();
        for (resource, units) in held {
            self.release(task, resource, units)?;
        }
        Ok(())
    }

    /// Banker safety check: would granting `units` of `resource` to
    /// `tasks[idx]` leave the system in a safe state?
    ///
    /// Works entirely on clones. The hypothetical grant is applied first;
    /// if it cannot be applied, or the task's remaining need for the
    /// claimed type no longer fits in the pool, the state is unsafe.
    /// Otherwise the classical safety scan runs: retire any unfinished
    /// task whose remaining need for every type fits the available pools,
    /// release its claims, and repeat. Safe iff every task retires.
    ///
    /// Safety is a global property of the whole claim matrix, so this is
    /// re-run from scratch for every request; there is no incremental form.
    pub fn grant_is_safe(
        &self,
        tasks: &[TaskState],
        idx: usize,
        resource: ResourceId,
        units: u32,
    ) -> Result<bool, ResourceError> {
        let mut manager = self.clone();
        let mut tasks: Vec<TaskState> = tasks.to_vec();

        if !manager.claim(&mut tasks[idx], resource, units)? {
            return Ok(false);
        }
        let need = tasks[idx]
            .maximum_of(resource)
            .saturating_sub(tasks[idx].claim_of(resource));
        let available = manager
            .resource(resource)
            .ok_or(ResourceError::UnknownResource(resource))?
            .available_units();
        if need > available {
            return Ok(false);
        }

        manager.all_can_finish(&mut tasks)
    }

    /// Safety scan body; consumes the cloned state.
    fn all_can_finish(&mut self, tasks: &mut [TaskState]) -> Result<bool, ResourceError> {
        loop {
            let mut retired = false;
            for idx in 0..tasks.len() {
                if tasks[idx].is_finished() {
                    continue;
                }
                let fits = self.resources.values().all(|pool| {
                    let need = tasks[idx]
                        .maximum_of(pool.id())
                        .saturating_sub(tasks[idx].claim_of(pool.id()));
                    need <= pool.available
                });
                if fits {
                    self.release_all(&mut tasks[idx])?;
                    tasks[idx].terminate();
                    retired = true;
                }
            }
            if !retired {
                break;
            }
        }
        Ok(tasks.iter().all(TaskState::is_finished))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::program::{TaskId, TaskProgram};

    fn manager(totals: &[u32]) -> ResourceManager {
        let specs: Vec<ResourceSpec> = totals
            .iter()
            .enumerate()
            .map(|(i, &total)| ResourceSpec {
                id: ResourceId(i as u32 + 1),
                total,
            })
            .collect();
        ResourceManager::from_specs(&specs)
    }

    fn task(id: u32) -> TaskState {
        TaskState::new(TaskProgram {
            id: TaskId(id),
            code: Vec::new(),
        })
    }

    fn conserved(manager: &ResourceManager, tasks: &[&TaskState]) -> bool {
        manager.resources().all(|pool| {
            let claimed: u32 = tasks
                .iter()
                .filter(|t| !t.is_finished())
                .map(|t| t.claim_of(pool.id()))
                .sum();
            pool.available_units() + claimed == pool.total_units()
        })
    }

    #[test]
    fn claim_moves_both_ledgers_together() {
        let mut m = manager(&[4]);
        let mut t = task(1);
        assert!(m.claim(&mut t, ResourceId(1), 3).unwrap());
        assert_eq!(t.claim_of(ResourceId(1)), 3);
        assert_eq!(m.resource(ResourceId(1)).unwrap().available_units(), 1);
        assert!(conserved(&m, &[&t]));
    }

    #[test]
    fn insufficient_units_is_a_clean_refusal() {
        let mut m = manager(&[2]);
        let mut t = task(1);
        assert!(!m.claim(&mut t, ResourceId(1), 3).unwrap());
        assert_eq!(t.claim_of(ResourceId(1)), 0);
        assert_eq!(m.resource(ResourceId(1)).unwrap().available_units(), 2);
    }

    #[test]
    fn over_release_fails_and_leaves_ledgers_untouched() {
        let mut m = manager(&[4]);
        let mut t = task(1);
        m.claim(&mut t, ResourceId(1), 2).unwrap();
        let err = m.release(&mut t, ResourceId(1), 3).unwrap_err();
        assert!(matches!(err, ResourceError::OverRelease { held: 2, .. }));
        assert_eq!(t.claim_of(ResourceId(1)), 2);
        assert_eq!(m.resource(ResourceId(1)).unwrap().available_units(), 2);
        assert!(conserved(&m, &[&t]));
    }

    #[test]
    fn unknown_resource_is_an_error_not_a_refusal() {
        let mut m = manager(&[1]);
        let mut t = task(1);
        assert!(matches!(
            m.claim(&mut t, ResourceId(9), 1),
            Err(ResourceError::UnknownResource(ResourceId(9)))
        ));
    }

    #[test]
    fn release_all_drains_every_claim() {
        let mut m = manager(&[3, 2]);
        let mut t = task(1);
        m.claim(&mut t, ResourceId(1), 2).unwrap();
        m.claim(&mut t, ResourceId(2), 2).unwrap();
        m.release_all(&mut t).unwrap();
        assert_eq!(t.claim_of(ResourceId(1)), 0);
        assert_eq!(t.claim_of(ResourceId(2)), 0);
        assert_eq!(m.resource(ResourceId(1)).unwrap().available_units(), 3);
        assert_eq!(m.resource(ResourceId(2)).unwrap().available_units(), 2);
    }

    #[test]
    fn grant_is_safe_accepts_a_completable_ordering() {
        // Total 3; both tasks hold 1 with a ceiling of 2. Granting one more
        // unit to t1 lets it finish and return two units, which covers t2.
        let mut m = manager(&[3]);
        let mut t1 = task(1);
        let mut t2 = task(2);
        t1.set_maximum(ResourceId(1), 2);
        t2.set_maximum(ResourceId(1), 2);
        m.claim(&mut t1, ResourceId(1), 1).unwrap();
        m.claim(&mut t2, ResourceId(1), 1).unwrap();
        let tasks = vec![t1, t2];
        assert!(m.grant_is_safe(&tasks, 0, ResourceId(1), 1).unwrap());
    }

    #[test]
    fn grant_is_safe_rejects_when_no_task_can_finish() {
        // Same layout but ceilings of 3: after the grant neither task's
        // remaining need fits in the empty pool.
        let mut m = manager(&[3]);
        let mut t1 = task(1);
        let mut t2 = task(2);
        t1.set_maximum(ResourceId(1), 3);
        t2.set_maximum(ResourceId(1), 3);
        m.claim(&mut t1, ResourceId(1), 1).unwrap();
        m.claim(&mut t2, ResourceId(1), 1).unwrap();
        let tasks = vec![t1, t2];
        assert!(!m.grant_is_safe(&tasks, 0, ResourceId(1), 1).unwrap());
    }

    #[test]
    fn grant_is_safe_rejects_unclaimable_units() {
        let mut m = manager(&[2]);
        let mut t1 = task(1);
        t1.set_maximum(ResourceId(1), 2);
        m.claim(&mut t1, ResourceId(1), 1).unwrap();
        let tasks = vec![t1];
        assert!(!m.grant_is_safe(&tasks, 0, ResourceId(1), 2).unwrap());
    }

    #[test]
    fn grant_is_safe_never_mutates_live_state() {
        let mut m = manager(&[3]);
        let mut t1 = task(1);
        let mut t2 = task(2);
        t1.set_maximum(ResourceId(1), 2);
        t2.set_maximum(ResourceId(1), 2);
        m.claim(&mut t1, ResourceId(1), 1).unwrap();
        let tasks = vec![t1, t2];
        let _ = m.grant_is_safe(&tasks, 1, ResourceId(1), 1).unwrap();
        assert_eq!(m.resource(ResourceId(1)).unwrap().available_units(), 2);
        assert_eq!(tasks[0].claim_of(ResourceId(1)), 1);
        assert_eq!(tasks[1].claim_of(ResourceId(1)), 0);
        assert!(!tasks[0].is_finished() && !tasks[1].is_finished());
    }
}
