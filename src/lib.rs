#![warn(missing_docs)]

//! # `splitflow`
//!
//! A synthesizer for evenly balanced belt-network layouts on a discrete grid,
//! as found in belt-based logistics simulations: belts move material one
//! direction per tile, underground belts jump several tiles without occupying
//! them, and splitters merge and split flow 50/50 between two adjacent lanes.
//! Given grid dimensions, input and output lane rows, an underground range,
//! and a [`CostTable`], the engine finds the cheapest physical layout in
//! which every output lane receives an equal share of every input lane's
//! flow — or proves that none exists.
//!
//! Begin by building a [`BalancerGraph`] from a [`ProblemSpec`], turn it into
//! a [`BalancerModel`], and call [`solve()`](BalancerModel::solve), yielding a
//! [`Layout`] mapping tiles to placed entities with per-move flow values.
//!
//! # Internals
//! This crate is driven by expressing the problem as a mixed-integer
//! multi-commodity flow model, handing it to an external MILP solver through
//! [`good_lp`](https://docs.rs/good_lp), and re-expressing the solved
//! variables as a layout.
//!
//! The encoding works as follows:
//!
//! Every physically legal movement is pre-enumerated as an edge ([`Move`]) of
//! a directed graph over grid tiles, plus one virtual port node per lane.
//! Adjacent steps are belt moves, longer straight jumps underground moves,
//! and the two diagonals `(x, y) → (x + 1, y ± 1)` model a splitter's
//! balancing connection. Constraints are then keyed by node and edge
//! attributes:
//!
//! 1. Each tile hosts at most one entity, and material may only ride a move
//!    whose tile endpoints are occupied, with at most one active non-splitter
//!    move each way per tile.
//! 2. Underground moves demand their entry flag and a straight-through belt
//!    landing; splitter diagonals demand their fragment, fragments pair up
//!    vertically, and an active splitter output carries exactly half the
//!    combined inflow (big-M-relaxed while inactive).
//! 3. Flow is tracked per *commodity* — one per input lane, purely to prove
//!    balance. It conserves at every tile; each input port emits the output
//!    lane count of its own commodity, and each output port absorbs exactly
//!    one unit of every commodity. A feasible assignment therefore *is* a
//!    balanced layout, and the objective simply minimizes material cost.
//!
//! The solver is a black box behind `good_lp`'s model interface; infeasible,
//! unbounded, and out-of-budget verdicts surface as [`Error`] variants.

pub use cost::CostTable;
pub use error::Error;
pub use graph::{BalancerGraph, Move, MoveKind, NodeId, ProblemSpec};
pub use layout::{EntityKind, Layout, MoveFlow, Placement};
pub use location::{Dimension, Direction, Location, SplitterSide};
pub use model::BalancerModel;
pub use solver::SolveOptions;

mod cost;
mod error;
mod graph;
mod layout;
mod location;
mod model;
mod solver;
mod tests;
