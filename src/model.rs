use std::collections::BTreeMap;

use good_lp::{variable, Constraint, Expression, IntoAffineExpression, ProblemVariables, Variable};
use itertools::Itertools;
use strum::VariantArray;

use crate::cost::CostTable;
use crate::graph::{BalancerGraph, MoveKind, NodeId};
use crate::location::{Direction, Location, SplitterSide};

/// A move's identity as its ordered endpoint pair. The graph holds at most
/// one move per ordered pair, so this is unambiguous.
pub(crate) type MoveId = (NodeId, NodeId);

/// Handles of every decision variable, keyed by the value it decides.
///
/// Each map holds a variable for every combination actually reachable in the
/// graph and no other: underground entries only where the jump lands
/// in-grid, fragments only where the partner tile exists.
pub(crate) struct VariableCatalog {
    /// tile hosts a transport belt
    pub(crate) belt: BTreeMap<Location, Variable>,
    /// tile hosts an underground entry facing `direction`, jumping `range`
    pub(crate) underground: BTreeMap<(Location, Direction, usize), Variable>,
    /// tile hosts the given splitter fragment
    pub(crate) splitter: BTreeMap<(Location, SplitterSide), Variable>,
    /// material physically rides this move
    pub(crate) active: BTreeMap<MoveId, Variable>,
    /// how much of commodity `b` rides this move
    pub(crate) flow: BTreeMap<(MoveId, usize), Variable>,
}

impl VariableCatalog {
    /// Sum of all entity placements at `tile`; at most 1 in a feasible model.
    fn occupancy(&self, tile: Location) -> Expression {
        let mut occ = Expression::from(0.0);
        occ += self.belt[&tile];
        for (_, u) in self.underground_at(tile) {
            occ += *u;
        }
        for (_, s) in self.fragments_at(tile) {
            occ += *s;
        }
        occ
    }

    pub(crate) fn underground_at(
        &self,
        tile: Location,
    ) -> impl Iterator<Item = (&(Location, Direction, usize), &Variable)> {
        self.underground
            .range((tile, Direction::Up, 0)..=(tile, Direction::Right, usize::MAX))
    }

    pub(crate) fn fragments_at(
        &self,
        tile: Location,
    ) -> impl Iterator<Item = (&(Location, SplitterSide), &Variable)> {
        self.splitter
            .range((tile, SplitterSide::Left)..=(tile, SplitterSide::Right))
    }

    /// Total inflow of commodity `b` at `node` across every incoming move.
    fn inflow(&self, graph: &BalancerGraph, node: NodeId, b: usize) -> Expression {
        graph
            .moves_in(node)
            .map(|(from, to, _)| self.flow[&((from, to), b)])
            .sum()
    }

    fn outflow(&self, graph: &BalancerGraph, node: NodeId, b: usize) -> Expression {
        graph
            .moves_out(node)
            .map(|(from, to, _)| self.flow[&((from, to), b)])
            .sum()
    }
}

fn node_tag(node: NodeId) -> String {
    match node {
        NodeId::Tile(Location(x, y)) => format!("{x}_{y}"),
        NodeId::Input(i) => format!("in{i}"),
        NodeId::Output(j) => format!("out{j}"),
    }
}

/// The mixed-integer model of one instance: decision variables, a
/// minimize-cost objective, and the full legality-and-balance constraint
/// set, held in `good_lp`'s solver-neutral intermediate form.
///
/// Feasible integral solutions correspond exactly to legal balanced layouts;
/// see the crate docs for the encoding. Built once per instance and consumed
/// by [`solve`](BalancerModel::solve).
pub struct BalancerModel<'g> {
    pub(crate) graph: &'g BalancerGraph,
    pub(crate) costs: CostTable,
    pub(crate) big_m: f64,
    pub(crate) vars: ProblemVariables,
    pub(crate) objective: Expression,
    pub(crate) constraints: Vec<Constraint>,
    pub(crate) catalog: VariableCatalog,
}

impl<'g> BalancerModel<'g> {
    /// Build the full model over `graph`, with the big-M constant of the
    /// splitter-balance relaxation at its default: the output-lane count,
    /// which is the largest flow any single move can carry.
    pub fn build(graph: &'g BalancerGraph, costs: &CostTable) -> Self {
        Self::build_with_big_m(graph, costs, graph.outputs().len() as f64)
    }

    /// Build the model with an explicit big-M constant, for tuning against a
    /// solver's numeric tolerance. Anything below the output-lane count can
    /// cut off legal layouts.
    pub fn build_with_big_m(graph: &'g BalancerGraph, costs: &CostTable, big_m: f64) -> Self {
        let mut vars = ProblemVariables::new();
        let catalog = declare_variables(graph, &mut vars);
        let objective = build_objective(costs, &catalog);

        let lane_count = graph.outputs().len() as f64;
        let mut constraints = Vec::new();
        push_placement_rows(graph, &catalog, &mut constraints);
        push_direction_rows(graph, &catalog, &mut constraints);
        push_arc_entity_rows(graph, &catalog, &mut constraints);
        push_underground_rows(graph, &catalog, &mut constraints);
        push_lane_entry_rows(graph, &catalog, &mut constraints);
        push_splitter_rows(graph, &catalog, big_m, &mut constraints);
        push_flow_rows(graph, &catalog, lane_count, &mut constraints);
        push_port_rows(graph, &catalog, lane_count, &mut constraints);

        log::info!(
            "balancer model: {} belt + {} underground + {} splitter + {} activation binaries, \
             {} flow variables, {} constraints",
            catalog.belt.len(),
            catalog.underground.len(),
            catalog.splitter.len(),
            catalog.active.len(),
            catalog.flow.len(),
            constraints.len()
        );

        Self {
            graph,
            costs: *costs,
            big_m,
            vars,
            objective,
            constraints,
            catalog,
        }
    }

    /// The big-M constant the splitter-balance relaxation was built with.
    pub fn big_m(&self) -> f64 {
        self.big_m
    }

    /// Number of constraint rows in the model.
    pub fn constraint_count(&self) -> usize {
        self.constraints.len()
    }
}

fn declare_variables(graph: &BalancerGraph, vars: &mut ProblemVariables) -> VariableCatalog {
    let mut belt = BTreeMap::new();
    let mut underground = BTreeMap::new();
    let mut splitter = BTreeMap::new();

    // tiles in row-major order so variable numbering is reproducible
    for tile in graph.tiles() {
        let Location(x, y) = tile;
        belt.insert(tile, vars.add(variable().binary().name(format!("b_{x}_{y}"))));

        for &direction in Direction::VARIANTS {
            for r in 2..=graph.max_underground_range() {
                if graph.directed_out_move(tile, direction, r).is_some() {
                    let name = format!("u_{x}_{y}_{}_{r}", direction.letter());
                    underground.insert((tile, direction, r), vars.add(variable().binary().name(name)));
                }
            }
        }

        for &side in SplitterSide::VARIANTS {
            if graph.fragment_placeable(tile, side) {
                let name = format!("s_{x}_{y}_{}", side.letter());
                splitter.insert((tile, side), vars.add(variable().binary().name(name)));
            }
        }
    }

    let mut active = BTreeMap::new();
    let mut flow = BTreeMap::new();
    for (from, to, _) in graph.all_moves() {
        let tag = format!("{}_{}", node_tag(from), node_tag(to));
        active.insert((from, to), vars.add(variable().binary().name(format!("a_{tag}"))));
        for b in 0..graph.inputs().len() {
            let f = vars.add(variable().min(0.0).name(format!("f_{tag}_{b}")));
            flow.insert(((from, to), b), f);
        }
    }

    VariableCatalog { belt, underground, splitter, active, flow }
}

/// Minimize the summed material cost of everything placed.
fn build_objective(costs: &CostTable, catalog: &VariableCatalog) -> Expression {
    let mut objective = Expression::from(0.0);
    for v in catalog.belt.values() {
        objective += costs.belt * *v;
    }
    for v in catalog.underground.values() {
        objective += costs.underground * *v;
    }
    for v in catalog.splitter.values() {
        objective += costs.splitter * *v;
    }
    objective
}

/// Each tile hosts at most one entity.
fn push_placement_rows(graph: &BalancerGraph, catalog: &VariableCatalog, out: &mut Vec<Constraint>) {
    for tile in graph.tiles() {
        out.push(catalog.occupancy(tile).leq(1.0));
    }
}

/// At most one active non-splitter move out of and into each tile, at most
/// one active splitter move either way, and every splitter move gated by
/// its fragment.
fn push_direction_rows(graph: &BalancerGraph, catalog: &VariableCatalog, out: &mut Vec<Constraint>) {
    for tile in graph.tiles() {
        let node = NodeId::Tile(tile);

        for splitterness in [false, true] {
            let outgoing = graph
                .moves_out(node)
                .filter(|(_, _, m)| m.is_splitter() == splitterness)
                .map(|(from, to, _)| catalog.active[&(from, to)])
                .collect_vec();
            if !outgoing.is_empty() {
                out.push(outgoing.into_iter().sum::<Expression>().leq(1.0));
            }

            let incoming = graph
                .moves_in(node)
                .filter(|(_, _, m)| m.is_splitter() == splitterness)
                .map(|(from, to, _)| catalog.active[&(from, to)])
                .collect_vec();
            if !incoming.is_empty() {
                out.push(incoming.into_iter().sum::<Expression>().leq(1.0));
            }
        }

        for (from, to, m) in graph.moves_out(node).filter(|(_, _, m)| m.is_splitter()) {
            let side = m.splitter_side().expect("splitter move has a side");
            let gate = catalog.splitter[&(tile, side)];
            out.push(catalog.active[&(from, to)].into_expression().leq(gate));
        }
    }
}

/// An active move requires an entity at each of its tile endpoints; arcs
/// cannot float over empty tiles. Port endpoints are exempt.
fn push_arc_entity_rows(graph: &BalancerGraph, catalog: &VariableCatalog, out: &mut Vec<Constraint>) {
    for (from, to, _) in graph.all_moves() {
        let a = catalog.active[&(from, to)];
        for endpoint in [from, to] {
            if let NodeId::Tile(tile) = endpoint {
                out.push((a.into_expression() - catalog.occupancy(tile)).leq(0.0));
            }
        }
    }
}

/// Underground moves require their entry flag and a straight-through belt
/// landing; an entry shadows the same-direction adjacent move.
fn push_underground_rows(graph: &BalancerGraph, catalog: &VariableCatalog, out: &mut Vec<Constraint>) {
    for (from, to, m) in graph.all_moves().filter(|(_, _, m)| m.kind == MoveKind::Underground) {
        let (NodeId::Tile(v), NodeId::Tile(w)) = (from, to) else {
            unreachable!("underground moves connect tiles only");
        };
        let a = catalog.active[&(from, to)];

        out.push(a.into_expression().leq(catalog.underground[&(v, m.direction, m.range)]));
        // the exit is an ordinary belt...
        out.push(a.into_expression().leq(catalog.belt[&w]));
        // ...which carries the flow onward without bending
        for (f2, t2, m2) in graph.moves_out(NodeId::Tile(w)) {
            if !m2.is_splitter() && m2.direction != m.direction {
                out.push((a.into_expression() + catalog.active[&(f2, t2)]).leq(1.0));
            }
        }
    }

    // an entry and the adjacent belt move in its direction occupy the same
    // physical footprint
    for tile in graph.tiles() {
        for &direction in Direction::VARIANTS {
            let entries = catalog
                .underground_at(tile)
                .filter(|((_, d, _), _)| *d == direction)
                .map(|(_, v)| *v)
                .collect_vec();
            if entries.is_empty() {
                continue;
            }
            if let Some((f, t, _)) = graph.directed_out_move(tile, direction, 1) {
                let mut row = catalog.active[&(f, t)].into_expression();
                for entry in entries {
                    row += entry;
                }
                out.push(row.leq(1.0));
            }
        }
    }
}

/// Flow enters a lane moving along it: the entry tile of an active input
/// boundary move may not turn the flow off the lane direction. This is what
/// leaves a width-1 grid with mismatched lane rows unroutable.
fn push_lane_entry_rows(graph: &BalancerGraph, catalog: &VariableCatalog, out: &mut Vec<Constraint>) {
    for i in 0..graph.inputs().len() {
        let (from, to, m) = graph
            .moves_out(NodeId::Input(i))
            .exactly_one()
            .ok()
            .expect("input port has exactly one boundary move");
        let a_in = catalog.active[&(from, to)];
        let NodeId::Tile(entry) = to else {
            unreachable!("boundary moves land on tiles");
        };

        for (f2, t2, m2) in graph.moves_out(NodeId::Tile(entry)) {
            if !m2.is_splitter() && m2.direction != m.direction {
                out.push((a_in.into_expression() + catalog.active[&(f2, t2)]).leq(1.0));
            }
        }
    }
}

/// Fragments pair up vertically, and each active splitter output carries
/// exactly half the combined inflow, big-M-relaxed when inactive or when no
/// fragment is placed.
fn push_splitter_rows(
    graph: &BalancerGraph,
    catalog: &VariableCatalog,
    big_m: f64,
    out: &mut Vec<Constraint>,
) {
    for tile in graph.tiles() {
        if graph.fragment_placeable(tile, SplitterSide::Right) {
            let partner = Location(tile.0, tile.1 + 1);
            let right = catalog.splitter[&(tile, SplitterSide::Right)];
            let left = catalog.splitter[&(partner, SplitterSide::Left)];
            out.push((right.into_expression() - left).eq(0.0));
        }
    }

    let lanes = graph.inputs().len();
    for tile in graph.tiles() {
        let fragments = catalog.fragments_at(tile).map(|(k, v)| (k.1, *v)).collect_vec();
        if fragments.is_empty() {
            continue;
        }

        // a fragment's outputs: its own diagonal, and the shared straight
        // move (which is the boundary move in the last column)
        let mut outputs: Vec<(MoveId, Vec<Variable>)> = Vec::new();
        for (side, gate) in &fragments {
            if let Some((f, t, _)) = graph.splitter_out_move(tile, *side) {
                outputs.push(((f, t), vec![*gate]));
            }
        }
        if let Some((f, t, _)) = graph.directed_out_move(tile, Direction::Right, 1) {
            outputs.push(((f, t), fragments.iter().map(|(_, v)| *v).collect_vec()));
        }

        for (move_id, gates) in outputs {
            let a = catalog.active[&move_id];
            for b in 0..lanes {
                let inflow = catalog.inflow(graph, NodeId::Tile(tile), b);
                let flow = catalog.flow[&(move_id, b)];

                // |flow - inflow/2| <= M * ((1 - active) + (1 - gate)),
                // written with the relaxation terms moved left
                let mut upper = flow.into_expression() - inflow.clone() * 0.5;
                let mut lower = inflow * 0.5 - flow;
                for side in [&mut upper, &mut lower] {
                    *side += big_m * a;
                    for gate in &gates {
                        *side += big_m * *gate;
                    }
                }
                out.push(upper.leq(2.0 * big_m));
                out.push(lower.leq(2.0 * big_m));
            }
        }
    }
}

/// Flow fits under the lane count, vanishes on inactive moves, and conserves
/// per commodity at every tile.
fn push_flow_rows(
    graph: &BalancerGraph,
    catalog: &VariableCatalog,
    lane_count: f64,
    out: &mut Vec<Constraint>,
) {
    let lanes = graph.inputs().len();
    for (from, to, _) in graph.all_moves() {
        let move_id = (from, to);
        let a = catalog.active[&move_id];

        let total: Expression = (0..lanes).map(|b| catalog.flow[&(move_id, b)]).sum();
        out.push(total.leq(lane_count));
        for b in 0..lanes {
            let f = catalog.flow[&(move_id, b)];
            out.push((f.into_expression() - lane_count * a).leq(0.0));
        }
    }

    for tile in graph.tiles() {
        for b in 0..lanes {
            let node = NodeId::Tile(tile);
            out.push((catalog.inflow(graph, node, b) - catalog.outflow(graph, node, b)).eq(0.0));
        }
    }
}

/// Each input port emits the full lane count of its own commodity and none
/// of any other; each output port absorbs exactly one unit of every
/// commodity. Together these are the balance law.
fn push_port_rows(
    graph: &BalancerGraph,
    catalog: &VariableCatalog,
    lane_count: f64,
    out: &mut Vec<Constraint>,
) {
    let lanes = graph.inputs().len();
    for i in 0..lanes {
        let (from, to, _) = graph
            .moves_out(NodeId::Input(i))
            .exactly_one()
            .ok()
            .expect("input port has exactly one boundary move");
        for b in 0..lanes {
            let f = catalog.flow[&((from, to), b)];
            let supply = if b == i { lane_count } else { 0.0 };
            out.push(f.into_expression().eq(supply));
        }
    }

    for j in 0..graph.outputs().len() {
        let (from, to, _) = graph
            .moves_in(NodeId::Output(j))
            .exactly_one()
            .ok()
            .expect("output port has exactly one boundary move");
        for b in 0..lanes {
            out.push(catalog.flow[&((from, to), b)].into_expression().eq(1.0));
        }
    }
}
