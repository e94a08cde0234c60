//! Textual workload scripts.
//!
//! The grammar is a flat whitespace-separated token stream:
//!
//! ```text
//! numTasks numResourceTypes total(1) ... total(numResourceTypes)
//! initiate  T R C    # task T declares claim ceiling C on resource R
//! request   T R N    # task T asks for N units of resource R
//! release   T R N    # task T returns N units of resource R
//! compute   T N      # task T computes for N cycles (N >= 1)
//! terminate T
//! ```
//!
//! Resource ids run `1..=numResourceTypes` and task ids `1..=numTasks`;
//! anything else — unknown verbs, malformed numbers, truncated lines,
//! out-of-range ids, `compute 0` — is a [`ScriptError`] surfaced before
//! simulation starts.

use std::fmt;

use crate::program::{Activity, Program, ResourceId, ResourceSpec, TaskId, TaskProgram};

/// Load-time grammar violations.
#[derive(Debug, PartialEq, Eq)]
#[non_exhaustive]
pub enum ScriptError {
    /// The token stream ended where `expected` should have been.
    UnexpectedEnd { expected: &'static str },
    /// A token that should have been a number was not.
    InvalidNumber {
        expected: &'static str,
        token: String,
    },
    /// A verb outside the five known activity kinds.
    UnknownVerb(String),
    TaskOutOfRange { id: u32, count: u32 },
    ResourceOutOfRange { id: u32, count: u32 },
    /// A zero-length compute would never finish.
    ZeroComputeCycles { task: TaskId },
}

impl fmt::Display for ScriptError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnexpectedEnd { expected } => {
                write!(f, "script ended where {expected} was expected")
            }
            Self::InvalidNumber { expected, token } => {
                write!(f, "expected {expected}, found {token:?}")
            }
            Self::UnknownVerb(verb) => write!(f, "{verb:?} is not a valid activity type"),
            Self::TaskOutOfRange { id, count } => {
                write!(f, "task {id} is out of range (script declares {count} tasks)")
            }
            Self::ResourceOutOfRange { id, count } => write!(
                f,
                "resource {id} is out of range (script declares {count} resource types)"
            ),
            Self::ZeroComputeCycles { task } => {
                write!(f, "task {task} computes for zero cycles")
            }
        }
    }
}

impl std::error::Error for ScriptError {}

/// Parse a workload script into a [`Program`].
pub fn parse_program(input: &str) -> Result<Program, ScriptError> {
    let mut tokens = input.split_whitespace();

    let num_tasks = next_number(&mut tokens, "task count")?;
    let num_resources = next_number(&mut tokens, "resource-type count")?;

    let mut resources = Vec::with_capacity(num_resources as usize);
    for id in 1..=num_resources {
        let total = next_number(&mut tokens, "resource total")?;
        resources.push(ResourceSpec {
            id: ResourceId(id),
            total,
        });
    }

    let mut tasks: Vec<TaskProgram> = (1..=num_tasks)
        .map(|id| TaskProgram {
            id: TaskId(id),
            code: Vec::new(),
        })
        .collect();

    while let Some(verb) = tokens.next() {
        let task = next_number(&mut tokens, "task id")?;
        if task == 0 || task > num_tasks {
            return Err(ScriptError::TaskOutOfRange {
                id: task,
                count: num_tasks,
            });
        }
        let task_id = TaskId(task);

        let activity = match verb {
            "initiate" => {
                let resource = next_resource(&mut tokens, num_resources)?;
                let claim = next_number(&mut tokens, "claim ceiling")?;
                Activity::Initiate { resource, claim }
            }
            "request" => {
                let resource = next_resource(&mut tokens, num_resources)?;
                let units = next_number(&mut tokens, "unit count")?;
                Activity::Request { resource, units }
            }
            "release" => {
                let resource = next_resource(&mut tokens, num_resources)?;
                let units = next_number(&mut tokens, "unit count")?;
                Activity::Release { resource, units }
            }
            "compute" => {
                let cycles = next_number(&mut tokens, "cycle count")?;
                if cycles == 0 {
                    return Err(ScriptError::ZeroComputeCycles { task: task_id });
                }
                Activity::Compute { cycles }
            }
            "terminate" => Activity::Terminate,
            other => return Err(ScriptError::UnknownVerb(other.to_string())),
        };
        tasks[task_id.index()].code.push(activity);
    }

    Ok(Program { resources, tasks })
}

fn next_number<'a>(
    tokens: &mut impl Iterator<Item = &'a str>,
    expected: &'static str,
) -> Result<u32, ScriptError> {
    let token = tokens
        .next()
        .ok_or(ScriptError::UnexpectedEnd { expected })?;
    token.parse().map_err(|_| ScriptError::InvalidNumber {
        expected,
        token: token.to_string(),
    })
}

fn next_resource<'a>(
    tokens: &mut impl Iterator<Item = &'a str>,
    count: u32,
) -> Result<ResourceId, ScriptError> {
    let id = next_number(tokens, "resource id")?;
    if id == 0 || id > count {
        return Err(ScriptError::ResourceOutOfRange { id, count });
    }
    Ok(ResourceId(id))
}
