use std::collections::BTreeMap;
use std::fmt::{Display, Formatter};

use good_lp::{Solution, Variable};
use itertools::Itertools;
use ndarray::Array2;

use crate::cost::CostTable;
use crate::error::Error;
use crate::graph::{BalancerGraph, Move, NodeId};
use crate::location::{Dimension, Direction, Location, SplitterSide};
use crate::model::VariableCatalog;

/// Binary variables at or above this count as set; CBC returns integral
/// values only up to its own tolerance.
const BINARY_THRESHOLD: f64 = 0.5;

/// The concrete device occupying a tile.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EntityKind {
    /// A transport belt.
    Belt,
    /// An underground entry jumping `range` tiles to its landing belt.
    UndergroundEntry {
        /// Jump length in tiles.
        range: usize,
    },
    /// One fragment of a splitter pair.
    Splitter {
        /// Which half of the pair this tile hosts.
        side: SplitterSide,
    },
}

/// A decoded per-tile placement.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Placement {
    /// What the tile hosts.
    pub kind: EntityKind,
    /// The direction the device faces. Splitters always face
    /// [`Right`](Direction::Right); a belt carrying no flow defaults to it.
    pub direction: Direction,
}

/// One activated move together with its per-commodity flow.
#[derive(Clone, Debug)]
pub struct MoveFlow {
    /// Source node.
    pub from: NodeId,
    /// Destination node.
    pub to: NodeId,
    /// The move's graph attributes.
    pub movement: Move,
    /// Flow riding this move, indexed by commodity (input-lane position).
    pub flows: Vec<f64>,
}

/// A solved physical layout: a read-only projection of the model's final
/// variable values, for downstream renderers and encoders.
pub struct Layout {
    dims: (Dimension, Dimension),
    entities: BTreeMap<Location, Placement>,
    flows: Vec<MoveFlow>,
    objective: f64,
}

impl Layout {
    /// Project a solved assignment back onto the grid.
    ///
    /// Pure and total over any assignment satisfying the model's invariants;
    /// a tile with more than one live entity kind means the constraint set
    /// itself is wrong, and fails loudly as
    /// [`InternalInconsistency`](Error::InternalInconsistency) instead of
    /// picking one.
    pub(crate) fn decode(
        graph: &BalancerGraph,
        catalog: &VariableCatalog,
        costs: &CostTable,
        solution: &impl Solution,
    ) -> Result<Self, Error> {
        let set = |v: Variable| solution.value(v) > BINARY_THRESHOLD;

        let mut entities = BTreeMap::new();
        let mut objective = 0.0;
        for tile in graph.tiles() {
            let belt = set(catalog.belt[&tile]);
            let undergrounds = catalog
                .underground_at(tile)
                .filter(|(_, v)| set(**v))
                .map(|((_, direction, range), _)| (*direction, *range))
                .collect_vec();
            let fragments = catalog
                .fragments_at(tile)
                .filter(|(_, v)| set(**v))
                .map(|((_, side), _)| *side)
                .collect_vec();

            let live = usize::from(belt) + undergrounds.len() + fragments.len();
            if live > 1 {
                return Err(Error::InternalInconsistency(format!(
                    "tile ({}, {}) hosts {live} entities at once",
                    tile.0, tile.1
                )));
            }

            // precedence: underground entry, then belt, then splitter
            let placement = if let Some(&(direction, range)) = undergrounds.first() {
                objective += costs.underground;
                Some(Placement { kind: EntityKind::UndergroundEntry { range }, direction })
            } else if belt {
                objective += costs.belt;
                Some(Placement { kind: EntityKind::Belt, direction: belt_direction(graph, catalog, solution, tile)? })
            } else if let Some(&side) = fragments.first() {
                objective += costs.splitter;
                Some(Placement { kind: EntityKind::Splitter { side }, direction: Direction::Right })
            } else {
                None
            };
            if let Some(placement) = placement {
                entities.insert(tile, placement);
            }
        }

        let lanes = graph.inputs().len();
        let mut flows = Vec::new();
        for (from, to, movement) in graph.all_moves() {
            if set(catalog.active[&(from, to)]) {
                flows.push(MoveFlow {
                    from,
                    to,
                    movement: *movement,
                    flows: (0..lanes)
                        .map(|b| solution.value(catalog.flow[&((from, to), b)]))
                        .collect(),
                });
            }
        }

        log::debug!(
            "decoded layout: {} entities, {} active moves, objective {objective}",
            entities.len(),
            flows.len()
        );

        Ok(Self { dims: graph.dims(), entities, flows, objective })
    }

    /// Grid dimensions as `(width, height)`.
    pub fn dims(&self) -> (Dimension, Dimension) {
        self.dims
    }

    /// The entity at `tile`, or [`None`] for an unoccupied tile.
    pub fn entity_at(&self, tile: Location) -> Option<&Placement> {
        self.entities.get(&tile)
    }

    /// All occupied tiles with their placements, in row-major order.
    pub fn entities(&self) -> impl Iterator<Item = (Location, &Placement)> {
        self.entities.iter().map(|(tile, p)| (*tile, p))
    }

    /// Every activated move with its per-commodity flow.
    pub fn flows(&self) -> &[MoveFlow] {
        &self.flows
    }

    /// The solved objective: the literal sum of the cost-table prices of
    /// everything placed.
    pub fn objective(&self) -> f64 {
        self.objective
    }
}

/// A belt faces wherever its active outgoing move goes; two active outgoing
/// moves on one belt mean the single-direction constraints are broken.
fn belt_direction(
    graph: &BalancerGraph,
    catalog: &VariableCatalog,
    solution: &impl Solution,
    tile: Location,
) -> Result<Direction, Error> {
    let outgoing = graph
        .moves_out(NodeId::Tile(tile))
        .filter(|(_, _, m)| !m.is_splitter())
        .filter(|(from, to, _)| solution.value(catalog.active[&(*from, *to)]) > BINARY_THRESHOLD)
        .map(|(_, _, m)| m.direction)
        .collect_vec();
    match outgoing.as_slice() {
        [] => Ok(Direction::Right),
        [direction] => Ok(*direction),
        _ => Err(Error::InternalInconsistency(format!(
            "belt at ({}, {}) has {} active outgoing moves",
            tile.0,
            tile.1,
            outgoing.len()
        ))),
    }
}

impl Display for Layout {
    /// Dump the grid as ASCII, top row first: `.` empty, `^ v < >` belts,
    /// `U D L R` underground entries, `S`/`s` right/left splitter fragments.
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let (w, h) = (self.dims.0.get(), self.dims.1.get());
        let mut grid = Array2::from_elem((h, w), '.');
        for (Location(x, y), placement) in self.entities() {
            grid[(y, x)] = match placement.kind {
                EntityKind::Belt => match placement.direction {
                    Direction::Up => '^',
                    Direction::Down => 'v',
                    Direction::Left => '<',
                    Direction::Right => '>',
                },
                EntityKind::UndergroundEntry { .. } => placement.direction.letter(),
                EntityKind::Splitter { side: SplitterSide::Right } => 'S',
                EntityKind::Splitter { side: SplitterSide::Left } => 's',
            };
        }

        for y in (0..h).rev() {
            for x in 0..w {
                write!(f, "{}", grid[(y, x)])?;
            }
            writeln!(f)?;
        }
        Ok(())
    }
}
