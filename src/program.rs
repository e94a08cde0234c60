//! Workload definitions for the allocation simulator.
//!
//! A workload is a fixed set of resource pools plus one scripted activity
//! stream per task. Programs are immutable once built; the simulator keeps
//! all mutable state in [`crate::task::TaskState`].

use serde::{Deserialize, Serialize};

/// 1-based resource-type identifier, as written in the input script.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct ResourceId(pub u32);

/// 1-based task identifier, as written in the input script.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct TaskId(pub u32);

impl TaskId {
    /// 0-based slot of this task in the simulation's task vector.
    #[inline]
    pub fn index(self) -> usize {
        debug_assert!(self.0 >= 1);
        (self.0 - 1) as usize
    }
}

impl std::fmt::Display for ResourceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::fmt::Display for TaskId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One resource pool: a type and its total unit count.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceSpec {
    pub id: ResourceId,
    pub total: u32,
}

/// One scripted operation in a task's activity stream.
///
/// Only the fields meaningful to each operation exist on its variant.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Activity {
    /// Declare a claim ceiling on one resource type. The Banker policy
    /// admits or rejects the task on this ceiling; FIFO records it and
    /// otherwise ignores it.
    Initiate { resource: ResourceId, claim: u32 },
    /// Ask for units of one resource type. The task blocks until granted.
    Request { resource: ResourceId, units: u32 },
    /// Return previously granted units to the pool.
    Release { resource: ResourceId, units: u32 },
    /// Spin for a fixed number of cycles without touching resources.
    Compute { cycles: u32 },
    /// End of the task's script.
    Terminate,
}

/// A single task's scripted activity stream.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TaskProgram {
    pub id: TaskId,
    pub code: Vec<Activity>,
}

/// A complete simulation workload: resource pools plus task programs.
///
/// Task programs are stored in id order; `tasks[i].id.index() == i`.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Program {
    pub resources: Vec<ResourceSpec>,
    pub tasks: Vec<TaskProgram>,
}
