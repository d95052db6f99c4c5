//! Integer programming capability used by the optimizer
//!
//! The optimizer only builds an [`IntegerProgram`]; solving it is delegated
//! to an [`IntegerSolver`]. [`MicrolpSolver`] is the default backend.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::thread;
use std::time::{Duration, Instant};

use thiserror::Error;
use tracing::{debug, warn};

/// One non-negative integer decision variable
#[derive(Debug, Clone, PartialEq)]
pub struct ProgramVariable {
    pub name: String,
    /// Objective coefficient (minimized)
    pub cost: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Relation {
    AtLeast,
    AtMost,
}

/// `Σ coefficient × variable  (≥ | ≤)  rhs`
#[derive(Debug, Clone, PartialEq)]
pub struct LinearConstraint {
    pub label: String,
    /// (variable index, coefficient)
    pub terms: Vec<(usize, f64)>,
    pub relation: Relation,
    pub rhs: f64,
}

/// A minimization problem over non-negative integer variables
#[derive(Debug, Clone, Default, PartialEq)]
pub struct IntegerProgram {
    pub variables: Vec<ProgramVariable>,
    pub constraints: Vec<LinearConstraint>,
}

impl IntegerProgram {
    pub fn add_variable(&mut self, name: impl Into<String>, cost: f64) -> usize {
        self.variables.push(ProgramVariable {
            name: name.into(),
            cost,
        });
        self.variables.len() - 1
    }

    pub fn add_constraint(
        &mut self,
        label: impl Into<String>,
        terms: Vec<(usize, f64)>,
        relation: Relation,
        rhs: f64,
    ) {
        self.constraints.push(LinearConstraint {
            label: label.into(),
            terms,
            relation,
            rhs,
        });
    }

    pub fn constraint(&self, label: &str) -> Option<&LinearConstraint> {
        self.constraints.iter().find(|c| c.label == label)
    }
}

/// Values chosen by a solver, indexed like the program's variables.
/// `None` means the solver reported no value for that variable.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Assignment {
    pub values: Vec<Option<f64>>,
}

impl Assignment {
    pub fn value(&self, index: usize) -> Option<f64> {
        self.values.get(index).copied().flatten()
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum SolveFailure {
    #[error("problem is infeasible")]
    Infeasible,

    #[error("problem is unbounded")]
    Unbounded,

    #[error("solve was cancelled")]
    Cancelled,

    #[error("solve timed out")]
    TimedOut,

    #[error("solver backend failed: {0}")]
    Backend(String),
}

/// Shared flag a caller flips to abandon a running solve
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Caller limits for one blocking solve
#[derive(Debug, Clone, Default)]
pub struct SolveControl {
    pub deadline: Option<Instant>,
    pub cancel: Option<CancelToken>,
}

impl SolveControl {
    pub fn new(timeout: Option<Duration>, cancel: Option<CancelToken>) -> Self {
        Self {
            deadline: timeout.map(|t| Instant::now() + t),
            cancel,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.as_ref().is_some_and(CancelToken::is_cancelled)
    }

    pub fn is_expired(&self) -> bool {
        self.deadline.is_some_and(|deadline| Instant::now() >= deadline)
    }

    /// The failure to report if the solve must stop now
    pub fn interruption(&self) -> Option<SolveFailure> {
        if self.is_cancelled() {
            Some(SolveFailure::Cancelled)
        } else if self.is_expired() {
            Some(SolveFailure::TimedOut)
        } else {
            None
        }
    }
}

pub trait IntegerSolver {
    /// Minimize the program's objective, blocking until done or interrupted
    fn solve(&self, program: &IntegerProgram, control: &SolveControl) -> Result<Assignment, SolveFailure>;
}

/// Branch-and-bound backend over the pure-Rust `microlp` crate.
///
/// Variables are only limited by microlp's integer range (`i32::MAX`).
/// microlp cannot be interrupted: when the caller's deadline or cancel token
/// fires, `solve` returns at once but the abandoned solve keeps running on
/// its thread until it finishes, and its result is dropped.
#[derive(Debug, Clone)]
pub struct MicrolpSolver {
    /// How often the caller's limits are checked while the backend works
    pub poll_interval: Duration,
}

impl Default for MicrolpSolver {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(20),
        }
    }
}

impl MicrolpSolver {
    fn solve_blocking(program: &IntegerProgram) -> Result<Assignment, SolveFailure> {
        use microlp::{ComparisonOp, OptimizationDirection, Problem};

        let mut problem = Problem::new(OptimizationDirection::Minimize);
        let vars: Vec<_> = program
            .variables
            .iter()
            .map(|v| problem.add_integer_var(v.cost, (0, i32::MAX)))
            .collect();

        for constraint in &program.constraints {
            let terms: Vec<_> = constraint
                .terms
                .iter()
                .map(|&(index, coefficient)| (vars[index], coefficient))
                .collect();
            let op = match constraint.relation {
                Relation::AtLeast => ComparisonOp::Ge,
                Relation::AtMost => ComparisonOp::Le,
            };
            problem.add_constraint(&terms[..], op, constraint.rhs);
        }

        match problem.solve() {
            Ok(solution) => Ok(Assignment {
                values: vars.iter().map(|&var| Some(solution[var])).collect(),
            }),
            Err(microlp::Error::Infeasible) => Err(SolveFailure::Infeasible),
            Err(microlp::Error::Unbounded) => Err(SolveFailure::Unbounded),
            #[allow(unreachable_patterns)]
            Err(other) => Err(SolveFailure::Backend(other.to_string())),
        }
    }
}

impl IntegerSolver for MicrolpSolver {
    fn solve(&self, program: &IntegerProgram, control: &SolveControl) -> Result<Assignment, SolveFailure> {
        if let Some(failure) = control.interruption() {
            return Err(failure);
        }

        let (sender, receiver) = mpsc::channel();
        let owned = program.clone();
        thread::Builder::new()
            .name("microlp-solve".to_string())
            .spawn(move || {
                let _ = sender.send(Self::solve_blocking(&owned));
            })
            .map_err(|e| SolveFailure::Backend(format!("could not start solver thread: {e}")))?;

        await_result(&receiver, control, self.poll_interval)
    }
}

/// Wait for a backend result, giving up as soon as `control` says so
fn await_result(
    receiver: &mpsc::Receiver<Result<Assignment, SolveFailure>>,
    control: &SolveControl,
    poll_interval: Duration,
) -> Result<Assignment, SolveFailure> {
    let started = Instant::now();
    loop {
        match receiver.recv_timeout(poll_interval) {
            Ok(result) => {
                debug!(
                    event = "solver_finished",
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    ok = result.is_ok(),
                );
                return result;
            }
            Err(RecvTimeoutError::Timeout) => {
                if let Some(failure) = control.interruption() {
                    warn!(event = "solver_interrupted", reason = %failure);
                    return Err(failure);
                }
            }
            Err(RecvTimeoutError::Disconnected) => {
                return Err(SolveFailure::Backend(
                    "solver thread exited without a result".to_string(),
                ));
            }
        }
    }
}
