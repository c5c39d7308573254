use good_lp::solvers::highs::highs;
use good_lp::{ResolutionError, SolverModel, variables};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::model::Model;
use crate::report::SolveReport;
use crate::variables::DecisionVariables;
use crate::{constraints, objective, report};

#[derive(Debug, Error)]
pub enum SolveError {
    /// A scaled coefficient or coefficient sum left the i64 range while the
    /// model was being built. The inputs are too large for the integer
    /// formulation.
    #[error("scaled value out of range while building {context}")]
    Overflow { context: String },

    /// The solver rejected or failed on the model. Infeasibility is not an
    /// error; it is reported as [`Placement::Infeasible`].
    #[error("solver resolution failed: {0}")]
    Resolution(#[from] ResolutionError),
}

/// Options controlling the solve behaviour.
pub struct SolveOptions {
    /// Maximum wall-clock seconds the solver may run before returning the
    /// best feasible solution found so far.
    pub time_limit_seconds: Option<f64>,
}

impl Default for SolveOptions {
    fn default() -> Self {
        Self {
            time_limit_seconds: Some(30.0),
        }
    }
}

/// Outcome of one scheduling run.
#[derive(Debug)]
pub enum Placement {
    /// A feasible (or optimal) assignment was found.
    Solved(SolveReport),
    /// The constraints admit no assignment. Returned as data so callers can
    /// relax and retry.
    Infeasible,
}

/// Owns the problem description for the duration of a solve. Construction
/// and invocation are single-threaded; the only blocking point is the solver
/// call under its time limit.
pub struct Scheduler {
    model: Model,
}

impl Scheduler {
    pub fn new(model: Model) -> Self {
        Self { model }
    }

    pub fn model(&self) -> &Model {
        &self.model
    }

    /// Build the placement problem and hand it to the solver.
    ///
    /// Variables are allocated up front, the objective is fixed when the
    /// problem is instantiated, and the constraint families are added on top.
    pub fn solve(&self, options: &SolveOptions) -> Result<Placement, SolveError> {
        info!(
            servers = self.model.servers.len(),
            processes = self.model.processes.len(),
            replicas = self.model.total_replicas(),
            "starting solve"
        );

        let mut vars = variables!();
        let dv = DecisionVariables::layout(&mut vars, &self.model);
        let objective = objective::build(&self.model, &dv);

        let mut problem = vars.maximise(objective).using(highs);
        if let Some(limit) = options.time_limit_seconds {
            problem = problem.set_time_limit(limit);
        }
        let problem = constraints::apply(problem, &self.model, &dv)?;

        debug!("solving MILP");
        match problem.solve() {
            Ok(solution) => {
                info!("solve complete");
                Ok(Placement::Solved(report::extract(
                    &self.model,
                    &dv,
                    &solution,
                )))
            }
            Err(ResolutionError::Infeasible) => {
                warn!("no feasible solution found, constraints may be over-tight");
                Ok(Placement::Infeasible)
            }
            Err(other) => Err(SolveError::Resolution(other)),
        }
    }
}
