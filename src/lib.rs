//! Discrete-cycle resource-allocation simulator.
//!
//! ## Scope
//! This crate replays scripted workloads — a fixed set of tasks, each with
//! an ordered stream of resource operations — against finite typed resource
//! pools, under two allocation policies: greedy first-come-first-served
//! ([`Fifo`]), which can deadlock, and Banker's algorithm ([`Banker`]),
//! which refuses any grant that would leave the system in an unsafe state.
//!
//! ## Key invariants
//! - Claimed units live in two ledgers (pool and task); the
//!   [`ResourceManager`] is the sole mutator of both and moves them
//!   atomically, so `total = available + Σ claims` holds at every cycle
//!   boundary.
//! - The safety check runs on value-semantics clones; hypothetical grants
//!   never touch live state.
//! - Unsafe grants (Banker) and deadlock victims (FIFO) are simulation
//!   outcomes recorded in the report, never errors; ledger misuse is a
//!   hard [`ResourceError`].
//!
//! ## Cycle flow
//! `initiates -> requests (blocked first) -> releases -> computes ->
//! deadlock handling -> cycle close (advance, then terminates)`
//!
//! ## Notable entry points
//! - [`script::parse_program`]: text script to [`Program`].
//! - [`Simulation`] with a [`Policy`]: one run over one workload.
//! - [`RunReport`]: per-task and aggregate wait statistics.

pub mod allocator;
pub mod program;
pub mod report;
pub mod resources;
pub mod script;
pub mod task;

pub use allocator::{Admission, Banker, Fifo, Grant, Policy, SimConfig, SimError, Simulation};
pub use program::{Activity, Program, ResourceId, ResourceSpec, TaskId, TaskProgram};
pub use report::{RunReport, TaskOutcome, TaskReport};
pub use resources::{Resource, ResourceError, ResourceManager};
pub use script::{parse_program, ScriptError};
pub use task::{AbortReason, Lifecycle, TaskState};
