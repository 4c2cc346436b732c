use thiserror::Error;

/// Reasons synthesis may fail, from malformed input through to solver verdicts.
#[derive(Debug, Error)]
pub enum Error {
    /// The problem parameters do not describe a valid grid topology, e.g. a
    /// lane row outside the grid height. Always a caller error; detected
    /// before any model is built.
    #[error("invalid topology: {0}")]
    InvalidTopology(String),
    /// The solver proved that no legal balanced layout exists for this
    /// instance, e.g. the grid is too small or the underground range too short.
    #[error("no balanced layout exists for this instance")]
    Infeasible,
    /// The solver reported the model as unbounded. Should not happen for a
    /// well-formed instance since all costs are non-negative.
    #[error("model is unbounded")]
    Unbounded,
    /// The time budget ran out before the solver found any feasible layout.
    #[error("time budget exhausted without a feasible layout")]
    TimeLimit,
    /// The solving backend failed for a reason of its own.
    #[error("solver failure: {0}")]
    Solver(String),
    /// A claimed solution violates the placement-exclusivity invariant. This
    /// indicates a constraint-modeling bug, not a caller error.
    #[error("inconsistent solution: {0}")]
    InternalInconsistency(String),
}
