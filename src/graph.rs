use std::num::NonZero;

use petgraph::graphmap::DiGraphMap;
use petgraph::Direction::Incoming;
use strum::VariantArray;

use crate::error::Error;
use crate::location::{Dimension, Direction, Location, SplitterSide};

/// Node identity in the reachability graph.
///
/// Ports carry the *position* of their lane in the caller's lane list, not
/// the lane row, so duplicate rows yield distinct ports (and, for inputs,
/// distinct commodities).
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub enum NodeId {
    /// A grid tile.
    Tile(Location),
    /// The virtual source node of the `i`-th input lane.
    Input(usize),
    /// The virtual sink node of the `j`-th output lane.
    Output(usize),
}

/// The physical device class a move rides on.
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub enum MoveKind {
    /// An adjacent transport-belt step. Port boundary links are belt moves.
    Belt,
    /// An underground jump over `range - 1` intermediate tiles.
    Underground,
    /// A splitter's diagonal balancing connection.
    Splitter,
}

/// A directed candidate connection between two nodes, tagged with the
/// attributes the model keys its constraints by.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub struct Move {
    /// Device class of the move.
    pub kind: MoveKind,
    /// Direction travelled; for splitter moves, the vertical sense of the
    /// diagonal (the horizontal component is always `+x`).
    pub direction: Direction,
    /// Distance in tiles; `1` except for underground jumps.
    pub range: usize,
}

impl Move {
    /// Whether this is a splitter's diagonal balancing move.
    pub fn is_splitter(&self) -> bool {
        self.kind == MoveKind::Splitter
    }

    /// The fragment side gating this move, if it is a splitter move.
    pub fn splitter_side(&self) -> Option<SplitterSide> {
        match self.kind {
            MoveKind::Splitter => SplitterSide::from_diagonal_direction(self.direction),
            _ => None,
        }
    }
}

/// Parameters of one synthesis instance.
#[derive(Clone, Debug)]
pub struct ProblemSpec {
    /// Grid width `n`; tiles span `0 ≤ x < n`.
    pub width: Dimension,
    /// Grid height `m`; tiles span `0 ≤ y < m`.
    pub height: Dimension,
    /// Rows of the input lanes feeding column `0`. Duplicates permitted.
    pub inputs: Vec<usize>,
    /// Rows of the output lanes draining column `n - 1`. Duplicates permitted.
    pub outputs: Vec<usize>,
    /// Longest underground jump, in tiles. `1` disables undergrounds.
    pub max_underground_range: NonZero<usize>,
}

impl ProblemSpec {
    fn validate(&self) -> Result<(), Error> {
        if self.inputs.is_empty() || self.outputs.is_empty() {
            return Err(Error::InvalidTopology(
                "at least one input and one output lane are required".into(),
            ));
        }
        for &row in self.inputs.iter().chain(self.outputs.iter()) {
            if row >= self.height.get() {
                return Err(Error::InvalidTopology(format!(
                    "lane row {row} outside grid height {}",
                    self.height
                )));
            }
        }
        Ok(())
    }
}

/// The reachability graph of one instance: a node per tile plus a virtual
/// port per lane, and an edge per physically legal [`Move`].
///
/// Construction is deterministic; nodes and moves iterate in the order they
/// were emitted, so variable naming downstream is reproducible.
pub struct BalancerGraph {
    pub(crate) graph: DiGraphMap<NodeId, Move>,
    dims: (Dimension, Dimension),
    inputs: Vec<usize>,
    outputs: Vec<usize>,
    max_underground_range: usize,
}

impl BalancerGraph {
    /// Build the reachability graph for `spec`.
    ///
    /// Emits, for every tile and every `1 ≤ r ≤ max_underground_range`, the
    /// four directional moves of length `r` whose destination is in-grid
    /// (`r = 1` are belt moves, longer ones underground jumps); the two
    /// diagonal splitter moves for every tile short of the rightmost column;
    /// and one boundary move per port. No move connects two ports.
    pub fn build(spec: &ProblemSpec) -> Result<Self, Error> {
        spec.validate()?;

        let (w, h) = (spec.width.get(), spec.height.get());
        let max_range = spec.max_underground_range.get();
        let mut graph = DiGraphMap::with_capacity(
            w * h + spec.inputs.len() + spec.outputs.len(),
            // directional moves dominate; splitter and boundary moves are noise
            4 * w * h * max_range,
        );

        // tiles first, row-major, so node iteration order matches emission
        for x in 0..w {
            for y in 0..h {
                graph.add_node(NodeId::Tile(Location(x, y)));
            }
        }

        for r in 1..=max_range {
            let kind = if r == 1 { MoveKind::Belt } else { MoveKind::Underground };
            for &direction in Direction::VARIANTS {
                for x in 0..w {
                    for y in 0..h {
                        let from = Location(x, y);
                        let to = direction.attempt_from(from, r);
                        if to.in_grid((spec.width, spec.height)) {
                            graph.add_edge(
                                NodeId::Tile(from),
                                NodeId::Tile(to),
                                Move { kind, direction, range: r },
                            );
                        }
                    }
                }
            }
        }

        // diagonal splitter moves; none leave the rightmost column
        for x in 0..w.saturating_sub(1) {
            for y in 0..h {
                if y + 1 < h {
                    graph.add_edge(
                        NodeId::Tile(Location(x, y)),
                        NodeId::Tile(Location(x + 1, y + 1)),
                        Move { kind: MoveKind::Splitter, direction: Direction::Up, range: 1 },
                    );
                }
                if y > 0 {
                    graph.add_edge(
                        NodeId::Tile(Location(x, y)),
                        NodeId::Tile(Location(x + 1, y - 1)),
                        Move { kind: MoveKind::Splitter, direction: Direction::Down, range: 1 },
                    );
                }
            }
        }

        for (i, &row) in spec.inputs.iter().enumerate() {
            graph.add_edge(
                NodeId::Input(i),
                NodeId::Tile(Location(0, row)),
                Move { kind: MoveKind::Belt, direction: Direction::Right, range: 1 },
            );
        }
        for (j, &row) in spec.outputs.iter().enumerate() {
            graph.add_edge(
                NodeId::Tile(Location(w - 1, row)),
                NodeId::Output(j),
                Move { kind: MoveKind::Belt, direction: Direction::Right, range: 1 },
            );
        }

        log::debug!(
            "built {}x{} balancer graph: {} nodes, {} moves",
            w,
            h,
            graph.node_count(),
            graph.edge_count()
        );

        Ok(Self {
            graph,
            dims: (spec.width, spec.height),
            inputs: spec.inputs.clone(),
            outputs: spec.outputs.clone(),
            max_underground_range: max_range,
        })
    }

    /// Grid dimensions as `(width, height)`.
    pub fn dims(&self) -> (Dimension, Dimension) {
        self.dims
    }

    /// Rows of the input lanes, in caller order. Commodity `b` is the flow
    /// originating at `inputs()[b]`.
    pub fn inputs(&self) -> &[usize] {
        &self.inputs
    }

    /// Rows of the output lanes, in caller order.
    pub fn outputs(&self) -> &[usize] {
        &self.outputs
    }

    /// Longest underground jump this graph admits.
    pub fn max_underground_range(&self) -> usize {
        self.max_underground_range
    }

    /// All tiles, in row-major emission order.
    pub fn tiles(&self) -> impl Iterator<Item = Location> + '_ {
        let (w, h) = (self.dims.0.get(), self.dims.1.get());
        (0..w).flat_map(move |x| (0..h).map(move |y| Location(x, y)))
    }

    /// Every move in the graph as `(from, to, move)`.
    pub fn all_moves(&self) -> impl Iterator<Item = (NodeId, NodeId, &Move)> {
        self.graph.all_edges()
    }

    /// Moves leaving `node`.
    pub fn moves_out(&self, node: NodeId) -> impl Iterator<Item = (NodeId, NodeId, &Move)> {
        self.graph.edges(node)
    }

    /// Moves entering `node`.
    pub fn moves_in(&self, node: NodeId) -> impl Iterator<Item = (NodeId, NodeId, &Move)> {
        self.graph.edges_directed(node, Incoming)
    }

    /// A non-splitter move leaving `tile` with the given direction and
    /// range, if one exists. Boundary moves into ports count as belt moves
    /// of range 1; an exit tile shared by duplicate output lanes carries one
    /// boundary move per port, and the first in emission order (lowest port
    /// position) is returned.
    pub fn directed_out_move(
        &self,
        tile: Location,
        direction: Direction,
        range: usize,
    ) -> Option<(NodeId, NodeId, &Move)> {
        self.moves_out(NodeId::Tile(tile))
            .find(|(_, _, m)| !m.is_splitter() && m.direction == direction && m.range == range)
    }

    /// The diagonal move gated by the given fragment side at `tile`, if it
    /// exists (it never does in the rightmost column or off the grid's
    /// vertical edges).
    pub fn splitter_out_move(
        &self,
        tile: Location,
        side: SplitterSide,
    ) -> Option<(NodeId, NodeId, &Move)> {
        self.moves_out(NodeId::Tile(tile))
            .find(|(_, _, m)| m.splitter_side() == Some(side))
    }

    /// Whether a splitter fragment of the given side may be placed at `tile`,
    /// i.e. its partner tile is in-grid.
    pub fn fragment_placeable(&self, tile: Location, side: SplitterSide) -> bool {
        side.diagonal_direction()
            .attempt_from(tile, 1)
            .in_grid(self.dims)
    }
}
