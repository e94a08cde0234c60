//! Property tests for the safety check and ledger reconciliation.
//!
//! Workloads are generated well-formed by construction: every declared
//! ceiling fits its pool, no request exceeds the ceiling, and no release
//! exceeds what the task holds at that point in its script. Under those
//! conditions a correct Banker must run every workload to completion —
//! any stall would mean the safety check approved a grant it should not
//! have.

use proptest::prelude::*;

use allocator_rs::{
    Activity, Banker, Fifo, Policy, Program, ResourceId, ResourceSpec, SimConfig, SimError,
    Simulation, TaskId, TaskOutcome, TaskProgram,
};

#[derive(Clone, Debug)]
enum OpSeed {
    Request { resource: usize, amount: u32 },
    Release { resource: usize, amount: u32 },
    Compute { cycles: u32 },
}

fn op_strategy(num_resources: usize) -> impl Strategy<Value = OpSeed> {
    prop_oneof![
        (0..num_resources, 1u32..=3)
            .prop_map(|(resource, amount)| OpSeed::Request { resource, amount }),
        (0..num_resources, 1u32..=3)
            .prop_map(|(resource, amount)| OpSeed::Release { resource, amount }),
        (1u32..=3).prop_map(|cycles| OpSeed::Compute { cycles }),
    ]
}

/// Clamp raw op seeds into a script that never over-requests or
/// over-releases, tracking what the task would hold at each point.
fn build_program(totals: &[u32], seeds: Vec<(Vec<u32>, Vec<OpSeed>)>) -> Program {
    let resources: Vec<ResourceSpec> = totals
        .iter()
        .enumerate()
        .map(|(i, &total)| ResourceSpec {
            id: ResourceId(i as u32 + 1),
            total,
        })
        .collect();

    let mut tasks = Vec::new();
    for (t, (raw_claims, ops)) in seeds.into_iter().enumerate() {
        let mut code = Vec::new();
        let mut maximums = vec![0u32; totals.len()];
        for (r, &raw) in raw_claims.iter().enumerate() {
            let claim = raw.min(totals[r]);
            maximums[r] = claim;
            code.push(Activity::Initiate {
                resource: ResourceId(r as u32 + 1),
                claim,
            });
        }
        let mut held = vec![0u32; totals.len()];
        for op in ops {
            match op {
                OpSeed::Request { resource, amount } => {
                    let units = amount.min(maximums[resource] - held[resource]);
                    if units > 0 {
                        held[resource] += units;
                        code.push(Activity::Request {
                            resource: ResourceId(resource as u32 + 1),
                            units,
                        });
                    }
                }
                OpSeed::Release { resource, amount } => {
                    let units = amount.min(held[resource]);
                    if units > 0 {
                        held[resource] -= units;
                        code.push(Activity::Release {
                            resource: ResourceId(resource as u32 + 1),
                            units,
                        });
                    }
                }
                OpSeed::Compute { cycles } => code.push(Activity::Compute { cycles }),
            }
        }
        code.push(Activity::Terminate);
        tasks.push(TaskProgram {
            id: TaskId(t as u32 + 1),
            code,
        });
    }

    Program { resources, tasks }
}

fn program_strategy() -> impl Strategy<Value = Program> {
    (1usize..=3).prop_flat_map(|num_resources| {
        (
            prop::collection::vec(1u32..=5, num_resources),
            prop::collection::vec(
                (
                    prop::collection::vec(0u32..=5, num_resources),
                    prop::collection::vec(op_strategy(num_resources), 0..8),
                ),
                1..=4,
            ),
        )
            .prop_map(|(totals, seeds)| build_program(&totals, seeds))
    })
}

fn conserved<P: Policy>(sim: &Simulation<P>) -> bool {
    sim.manager().resources().all(|pool| {
        let claimed: u32 = sim
            .tasks()
            .iter()
            .filter(|t| !t.is_finished())
            .map(|t| t.claim_of(pool.id()))
            .sum();
        pool.available_units() + claimed == pool.total_units()
    })
}

proptest! {
    /// Banker never deadlocks: every well-formed workload runs to
    /// completion with no aborts. A stall here means the safety check
    /// approved a grant that later wedged the system.
    #[test]
    fn banker_completes_every_well_formed_workload(program in program_strategy()) {
        let report = Simulation::new(&program, Banker, SimConfig { max_cycles: 10_000 })
            .run()
            .expect("banker stalled or corrupted a ledger");
        for task in &report.tasks {
            prop_assert!(
                matches!(task.outcome, TaskOutcome::Completed { .. }),
                "task {} was aborted under banker", task.id
            );
        }
        prop_assert!(report.wait_time <= report.total_time);
    }

    /// Pool and task ledgers stay reconciled at every cycle boundary,
    /// under both policies, including across deadlock-victim aborts.
    #[test]
    fn ledgers_stay_reconciled_under_both_policies(program in program_strategy()) {
        let mut banker = Simulation::new(&program, Banker, SimConfig { max_cycles: 10_000 });
        while banker.step().unwrap() {
            prop_assert!(conserved(&banker), "banker leaked at cycle {}", banker.cycle());
        }

        let mut fifo = Simulation::new(&program, Fifo, SimConfig { max_cycles: 10_000 });
        for _ in 0..2_000 {
            if !fifo.step().unwrap() {
                break;
            }
            prop_assert!(conserved(&fifo), "fifo leaked at cycle {}", fifo.cycle());
        }
    }

    /// FIFO on the same workloads either finishes (possibly after aborting
    /// deadlock victims) or stalls; it must never report a ledger error,
    /// since the scripts are well-formed by construction.
    #[test]
    fn fifo_fails_only_by_stalling(program in program_strategy()) {
        match Simulation::new(&program, Fifo, SimConfig { max_cycles: 10_000 }).run() {
            Ok(_) => {}
            Err(SimError::Stalled { .. }) => {}
            Err(err) => prop_assert!(false, "unexpected failure: {err}"),
        }
    }
}
