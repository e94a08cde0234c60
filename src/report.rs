//! Run summaries.
//!
//! A [`RunReport`] is the externally visible outcome of a run: per-task
//! elapsed/waiting cycles and an aggregate over the tasks that finished
//! normally. Aborted tasks appear with their reason in place of timing and
//! are excluded from the aggregate. Reports serialize to JSON for tooling
//! and render to the plain-text table the CLI prints.

use std::fmt::Write as _;

use serde::{Deserialize, Serialize};

use crate::program::TaskId;
use crate::task::{AbortReason, TaskState};

/// How one task ended.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub enum TaskOutcome {
    Completed {
        total_time: u64,
        wait_time: u64,
        wait_percentage: f64,
    },
    Aborted {
        reason: AbortReason,
    },
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct TaskReport {
    pub id: TaskId,
    pub outcome: TaskOutcome,
}

/// Summary of one policy's run over one workload.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RunReport {
    pub policy: String,
    pub cycles: u64,
    pub tasks: Vec<TaskReport>,
    /// Cycles elapsed, summed over non-aborted tasks.
    pub total_time: u64,
    /// Cycles spent waiting, summed over non-aborted tasks.
    pub wait_time: u64,
    pub wait_percentage: f64,
}

impl RunReport {
    pub fn collect(policy: &str, cycles: u64, tasks: &[TaskState]) -> Self {
        let mut total_time = 0;
        let mut wait_time = 0;
        let mut reports = Vec::with_capacity(tasks.len());
        for task in tasks {
            let outcome = match task.abort_reason() {
                Some(reason) => TaskOutcome::Aborted { reason },
                None => {
                    total_time += task.total_time();
                    wait_time += task.wait_time();
                    TaskOutcome::Completed {
                        total_time: task.total_time(),
                        wait_time: task.wait_time(),
                        wait_percentage: task.wait_percentage().unwrap_or(0.0),
                    }
                }
            };
            reports.push(TaskReport {
                id: task.id(),
                outcome,
            });
        }
        let wait_percentage = if total_time == 0 {
            0.0
        } else {
            wait_time as f64 / total_time as f64 * 100.0
        };
        Self {
            policy: policy.to_string(),
            cycles,
            tasks: reports,
            total_time,
            wait_time,
            wait_percentage,
        }
    }

    /// Plain-text summary table. Percentages are rounded half-up to whole
    /// percent; abort reasons precede the table.
    pub fn render(&self) -> String {
        let mut out = String::new();
        for task in &self.tasks {
            if let TaskOutcome::Aborted { reason } = task.outcome {
                let _ = writeln!(out, "Task {} {}", task.id, reason);
            }
        }
        for task in &self.tasks {
            match task.outcome {
                TaskOutcome::Completed {
                    total_time,
                    wait_time,
                    wait_percentage,
                } => {
                    let _ = writeln!(
                        out,
                        "Task {}\t\t{}\t{}\t{}%",
                        task.id,
                        total_time,
                        wait_time,
                        round_half_up(wait_percentage)
                    );
                }
                TaskOutcome::Aborted { .. } => {
                    let _ = writeln!(out, "Task {}\t\taborted", task.id);
                }
            }
        }
        let _ = write!(
            out,
            "total\t\t{}\t{}\t{}%",
            self.total_time,
            self.wait_time,
            round_half_up(self.wait_percentage)
        );
        out
    }
}

fn round_half_up(percentage: f64) -> u64 {
    percentage.round() as u64
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::program::{Activity, TaskProgram};

    #[test]
    fn percentages_round_half_up() {
        assert_eq!(round_half_up(100.0 / 6.0), 17);
        assert_eq!(round_half_up(12.5), 13);
        assert_eq!(round_half_up(100.0 / 3.0), 33);
        assert_eq!(round_half_up(0.0), 0);
    }

    #[test]
    fn aborted_tasks_are_excluded_from_totals() {
        let mut done = TaskState::new(TaskProgram {
            id: TaskId(1),
            code: vec![Activity::Terminate],
        });
        for _ in 0..4 {
            done.credit_cycle();
        }
        done.credit_wait();
        done.terminate();

        let mut dead = TaskState::new(TaskProgram {
            id: TaskId(2),
            code: vec![Activity::Terminate],
        });
        dead.credit_cycle();
        dead.credit_wait();
        dead.abort(AbortReason::DeadlockVictim);

        let report = RunReport::collect("FIFO", 5, &[done, dead]);
        assert_eq!(report.total_time, 4);
        assert_eq!(report.wait_time, 1);
        assert!(matches!(
            report.tasks[1].outcome,
            TaskOutcome::Aborted { .. }
        ));

        let text = report.render();
        assert!(text.contains("Task 1\t\t4\t1\t25%"));
        assert!(text.contains("Task 2\t\taborted"));
        assert!(text.ends_with("total\t\t4\t1\t25%"));
    }
}
