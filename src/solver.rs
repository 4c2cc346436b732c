use std::time::Duration;

use good_lp::{coin_cbc, ResolutionError, Solver, SolverModel};

use crate::error::Error;
use crate::layout::Layout;
use crate::model::BalancerModel;

/// Knobs for the hand-off to the solving backend.
#[derive(Clone, Copy, Debug, Default)]
pub struct SolveOptions {
    /// Wall-clock budget for the solve. When it runs out, the best incumbent
    /// found so far is decoded; if there is none, the solve fails with
    /// [`Error::TimeLimit`]. `None` lets the solver run to optimality.
    pub time_limit: Option<Duration>,
    /// Number of solver threads; the backend picks when `None`.
    pub threads: Option<u32>,
}

impl BalancerModel<'_> {
    /// Solve this model with the default CBC backend and decode the result,
    /// consuming the model.
    ///
    /// Blocks for the duration of the solve (bounded only by
    /// [`SolveOptions::time_limit`]); the model and graph are not shared, so
    /// independent instances may solve concurrently.
    pub fn solve(self, options: SolveOptions) -> Result<Layout, Error> {
        let BalancerModel { graph, costs, vars, objective, constraints, catalog, .. } = self;

        let mut model = vars.minimise(objective).using(coin_cbc);
        if let Some(limit) = options.time_limit {
            model.set_parameter("seconds", &format!("{}", limit.as_secs_f64()));
        }
        if let Some(threads) = options.threads {
            model.set_parameter("threads", &threads.to_string());
        }
        for constraint in constraints {
            model.add_constraint(constraint);
        }

        log::info!("invoking CBC");
        match model.solve() {
            Ok(solution) => Layout::decode(graph, &catalog, &costs, &solution),
            Err(e) => Err(map_resolution_error(e, options.time_limit.is_some())),
        }
    }

    /// Solve with a caller-supplied `good_lp` backend instead of CBC. No
    /// backend parameters are applied; bring the solver pre-configured.
    pub fn solve_with<S>(self, solver: S) -> Result<Layout, Error>
    where
        S: Solver,
        S::Model: SolverModel<Error = ResolutionError>,
    {
        let BalancerModel { graph, costs, vars, objective, constraints, catalog, .. } = self;

        let mut model = vars.minimise(objective).using(solver);
        for constraint in constraints {
            model.add_constraint(constraint);
        }

        match model.solve() {
            Ok(solution) => Layout::decode(graph, &catalog, &costs, &solution),
            Err(e) => Err(map_resolution_error(e, false)),
        }
    }
}

/// Surface the backend's verdict verbatim; the engine never repairs or
/// relaxes an infeasible model.
fn map_resolution_error(e: ResolutionError, budgeted: bool) -> Error {
    match e {
        ResolutionError::Infeasible => Error::Infeasible,
        ResolutionError::Unbounded => Error::Unbounded,
        // CBC reports an exhausted budget with no incumbent as a plain
        // resolution failure; with a budget set, that is a timeout
        other if budgeted => {
            log::warn!("solver stopped without incumbent: {other}");
            Error::TimeLimit
        }
        other => Error::Solver(other.to_string()),
    }
}
