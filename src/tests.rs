#[cfg(test)]
mod tests {
    use std::num::NonZero;
    use std::time::Duration;

    use good_lp::{Solution, SolutionStatus, Variable};

    use crate::graph::{BalancerGraph, MoveKind, NodeId, ProblemSpec};
    use crate::layout::{EntityKind, Layout};
    use crate::location::{Direction, Location, SplitterSide};
    use crate::model::BalancerModel;
    use crate::solver::SolveOptions;
    use crate::{CostTable, Error};

    const TOL: f64 = 1e-6;

    fn spec(w: usize, h: usize, inputs: &[usize], outputs: &[usize], range: usize) -> ProblemSpec {
        ProblemSpec {
            width: NonZero::new(w).unwrap(),
            height: NonZero::new(h).unwrap(),
            inputs: inputs.to_vec(),
            outputs: outputs.to_vec(),
            max_underground_range: NonZero::new(range).unwrap(),
        }
    }

    /// A fixed assignment standing in for a solver, for decoder tests.
    /// Unmentioned variables read as 0.
    struct MapSolution(Vec<(Variable, f64)>);

    impl Solution for MapSolution {
        fn status(&self) -> SolutionStatus {
            SolutionStatus::Optimal
        }

        fn value(&self, variable: Variable) -> f64 {
            self.0
                .iter()
                .find(|(v, _)| *v == variable)
                .map(|(_, value)| *value)
                .unwrap_or(0.0)
        }
    }

    #[test]
    fn moves_stay_in_grid() {
        let graph = BalancerGraph::build(&spec(4, 3, &[0], &[2], 3)).unwrap();

        for (from, to, movement) in graph.all_moves() {
            assert!(
                matches!(from, NodeId::Tile(_)) || matches!(to, NodeId::Tile(_)),
                "move {from:?} -> {to:?} connects two ports"
            );
            for endpoint in [from, to] {
                if let NodeId::Tile(tile) = endpoint {
                    assert!(tile.0 < 4 && tile.1 < 3, "move endpoint {tile:?} out of grid");
                }
            }
            assert!(movement.range >= 1 && movement.range <= 3);
            if movement.kind == MoveKind::Underground {
                assert!(movement.range > 1);
            } else {
                assert_eq!(movement.range, 1);
            }
        }

        // boundary moves sit where the lanes are
        assert!(graph
            .moves_out(NodeId::Input(0))
            .eq([(NodeId::Input(0), NodeId::Tile(Location(0, 0)), &crate::Move {
                kind: MoveKind::Belt,
                direction: Direction::Right,
                range: 1,
            })]));
        assert_eq!(graph.moves_in(NodeId::Output(0)).count(), 1);
    }

    #[test]
    fn underground_moves_match_range() {
        let graph = BalancerGraph::build(&spec(5, 1, &[0], &[0], 3)).unwrap();

        let origin = Location(0, 0);
        assert_eq!(
            graph.directed_out_move(origin, Direction::Right, 1).unwrap().2.kind,
            MoveKind::Belt
        );
        for r in 2..=3 {
            let (_, to, movement) = graph.directed_out_move(origin, Direction::Right, r).unwrap();
            assert_eq!(movement.kind, MoveKind::Underground);
            assert_eq!(to, NodeId::Tile(Location(r, 0)));
        }
        assert!(graph.directed_out_move(origin, Direction::Right, 4).is_none());
        assert!(graph.directed_out_move(origin, Direction::Up, 1).is_none());
        assert!(graph.directed_out_move(origin, Direction::Left, 1).is_none());
    }

    #[test]
    fn splitter_moves_skip_boundaries() {
        let graph = BalancerGraph::build(&spec(3, 3, &[1], &[1], 1)).unwrap();

        let (_, to, movement) = graph.splitter_out_move(Location(0, 0), SplitterSide::Right).unwrap();
        assert_eq!(to, NodeId::Tile(Location(1, 1)));
        assert!(movement.is_splitter());
        assert_eq!(movement.splitter_side(), Some(SplitterSide::Right));

        // no diagonal off the grid's vertical edges, none out of the last column
        assert!(graph.splitter_out_move(Location(0, 0), SplitterSide::Left).is_none());
        assert!(graph.splitter_out_move(Location(0, 2), SplitterSide::Right).is_none());
        assert!(graph.splitter_out_move(Location(2, 1), SplitterSide::Right).is_none());
        assert!(graph.splitter_out_move(Location(2, 1), SplitterSide::Left).is_none());
    }

    #[test]
    fn lane_outside_grid_is_rejected() {
        assert!(matches!(
            BalancerGraph::build(&spec(3, 3, &[3], &[0], 1)),
            Err(Error::InvalidTopology(_))
        ));
        assert!(matches!(
            BalancerGraph::build(&spec(3, 3, &[0], &[0, 5], 1)),
            Err(Error::InvalidTopology(_))
        ));
    }

    #[test]
    fn empty_lane_lists_are_rejected() {
        assert!(matches!(
            BalancerGraph::build(&spec(3, 3, &[], &[0], 1)),
            Err(Error::InvalidTopology(_))
        ));
    }

    #[test]
    fn duplicate_lanes_make_distinct_ports() {
        let graph = BalancerGraph::build(&spec(3, 3, &[1, 1], &[0, 2], 1)).unwrap();

        for i in 0..2 {
            let (_, to, _) = graph.moves_out(NodeId::Input(i)).next().unwrap();
            assert_eq!(to, NodeId::Tile(Location(0, 1)));
        }
        let boundary_ins = graph
            .moves_in(NodeId::Tile(Location(0, 1)))
            .filter(|(from, _, _)| matches!(from, NodeId::Input(_)))
            .count();
        assert_eq!(boundary_ins, 2);

        // duplicate output rows share an exit tile; the directional lookup
        // settles on the first-emitted port's boundary move
        let graph = BalancerGraph::build(&spec(3, 3, &[1], &[2, 2], 1)).unwrap();
        let exit = Location(2, 2);
        let boundary_outs = graph
            .moves_out(NodeId::Tile(exit))
            .filter(|(_, to, _)| matches!(to, NodeId::Output(_)))
            .count();
        assert_eq!(boundary_outs, 2);
        let (_, to, movement) = graph.directed_out_move(exit, Direction::Right, 1).unwrap();
        assert_eq!(to, NodeId::Output(0));
        assert_eq!(movement.kind, MoveKind::Belt);
    }

    #[test]
    fn catalog_covers_reachable_combinations_exactly() {
        let costs = CostTable::default();
        let graph = BalancerGraph::build(&spec(5, 2, &[0], &[1], 3)).unwrap();
        let model = BalancerModel::build(&graph, &costs);

        for tile in graph.tiles() {
            for direction in [Direction::Up, Direction::Down, Direction::Left, Direction::Right] {
                for r in 2..=3 {
                    let reachable = graph.directed_out_move(tile, direction, r).is_some();
                    let declared = model.catalog.underground.contains_key(&(tile, direction, r));
                    assert_eq!(reachable, declared, "underground ({tile:?}, {direction:?}, {r})");
                }
            }
            for side in [SplitterSide::Left, SplitterSide::Right] {
                assert_eq!(
                    graph.fragment_placeable(tile, side),
                    model.catalog.splitter.contains_key(&(tile, side)),
                    "fragment ({tile:?}, {side:?})"
                );
            }
        }
    }

    #[test]
    fn big_m_defaults_to_output_lane_count() {
        let costs = CostTable::default();
        let graph = BalancerGraph::build(&spec(3, 3, &[1], &[1, 2], 1)).unwrap();
        assert_eq!(BalancerModel::build(&graph, &costs).big_m(), 2.0);
        assert_eq!(BalancerModel::build_with_big_m(&graph, &costs, 7.5).big_m(), 7.5);
    }

    #[test]
    fn decode_reads_back_entities() {
        let costs = CostTable::default();
        let graph = BalancerGraph::build(&spec(2, 2, &[0], &[1], 1)).unwrap();
        let model = BalancerModel::build(&graph, &costs);
        let catalog = &model.catalog;

        let belt_move = (NodeId::Tile(Location(0, 0)), NodeId::Tile(Location(1, 0)));
        let solution = MapSolution(vec![
            (catalog.belt[&Location(0, 0)], 1.0),
            (catalog.splitter[&(Location(1, 0), SplitterSide::Right)], 1.0),
            (catalog.splitter[&(Location(1, 1), SplitterSide::Left)], 1.0),
            (catalog.active[&belt_move], 1.0),
            (catalog.flow[&(belt_move, 0)], 1.0),
        ]);

        let layout = Layout::decode(&graph, catalog, &costs, &solution).unwrap();
        assert_eq!(
            *layout.entity_at(Location(0, 0)).unwrap(),
            crate::Placement { kind: EntityKind::Belt, direction: Direction::Right }
        );
        assert_eq!(
            layout.entity_at(Location(1, 0)).unwrap().kind,
            EntityKind::Splitter { side: SplitterSide::Right }
        );
        assert_eq!(
            layout.entity_at(Location(1, 1)).unwrap().kind,
            EntityKind::Splitter { side: SplitterSide::Left }
        );
        assert!(layout.entity_at(Location(0, 1)).is_none());

        assert!((layout.objective() - (costs.belt + 2.0 * costs.splitter)).abs() < TOL);
        assert_eq!(layout.flows().len(), 1);
        assert_eq!(layout.flows()[0].from, belt_move.0);
        assert!((layout.flows()[0].flows[0] - 1.0).abs() < TOL);

        assert_eq!(format!("{layout}"), ".s\n>S\n");
    }

    #[test]
    fn decode_rejects_double_occupancy() {
        let costs = CostTable::default();
        let graph = BalancerGraph::build(&spec(3, 1, &[0], &[0], 2)).unwrap();
        let model = BalancerModel::build(&graph, &costs);

        let solution = MapSolution(vec![
            (model.catalog.belt[&Location(0, 0)], 1.0),
            (model.catalog.underground[&(Location(0, 0), Direction::Right, 2)], 1.0),
        ]);
        assert!(matches!(
            Layout::decode(&graph, &model.catalog, &costs, &solution),
            Err(Error::InternalInconsistency(_))
        ));
    }

    #[test]
    fn decode_rejects_forked_belt() {
        let costs = CostTable::default();
        let graph = BalancerGraph::build(&spec(2, 2, &[0], &[1], 1)).unwrap();
        let model = BalancerModel::build(&graph, &costs);

        let solution = MapSolution(vec![
            (model.catalog.belt[&Location(0, 0)], 1.0),
            (model.catalog.active[&(NodeId::Tile(Location(0, 0)), NodeId::Tile(Location(1, 0)))], 1.0),
            (model.catalog.active[&(NodeId::Tile(Location(0, 0)), NodeId::Tile(Location(0, 1)))], 1.0),
        ]);
        assert!(matches!(
            Layout::decode(&graph, &model.catalog, &costs, &solution),
            Err(Error::InternalInconsistency(_))
        ));
    }

    /// Sum of in- minus out-flow per tile and commodity over the decoded
    /// active moves; zero everywhere in a conserving solution.
    fn conservation_residual(layout: &Layout, tile: Location, commodity: usize) -> f64 {
        let mut residual = 0.0;
        for mf in layout.flows() {
            if mf.to == NodeId::Tile(tile) {
                residual += mf.flows[commodity];
            }
            if mf.from == NodeId::Tile(tile) {
                residual -= mf.flows[commodity];
            }
        }
        residual
    }

    #[test]
    fn straight_lane_passes_through() {
        let costs = CostTable::default();
        let graph = BalancerGraph::build(&spec(1, 1, &[0], &[0], 1)).unwrap();
        let layout = BalancerModel::build(&graph, &costs)
            .solve(SolveOptions::default())
            .unwrap();

        assert_eq!(
            layout.entity_at(Location(0, 0)).unwrap().kind,
            EntityKind::Belt
        );
        assert!((layout.objective() - costs.belt).abs() < TOL);
        assert_eq!(format!("{layout}"), ">\n");

        let to_output = layout
            .flows()
            .iter()
            .find(|mf| mf.to == NodeId::Output(0))
            .unwrap();
        assert!((to_output.flows[0] - 1.0).abs() < TOL);
    }

    #[test]
    fn splitter_balances_one_lane_onto_two() {
        let costs = CostTable::default();
        let graph = BalancerGraph::build(&spec(3, 3, &[1], &[1, 2], 1)).unwrap();
        let layout = BalancerModel::build(&graph, &costs)
            .solve(SolveOptions::default())
            .unwrap();

        // both outputs get one unit of the single commodity
        for j in 0..2 {
            let to_output = layout
                .flows()
                .iter()
                .find(|mf| mf.to == NodeId::Output(j))
                .expect("output lane is fed");
            assert!((to_output.flows[0] - 1.0).abs() < TOL, "output {j} unbalanced");
        }

        // a splitter pair is the only way to duplicate a lane, and its
        // fragments come paired
        let fragments = layout
            .entities()
            .filter_map(|(tile, p)| match p.kind {
                EntityKind::Splitter { side } => Some((tile, side)),
                _ => None,
            })
            .collect::<Vec<_>>();
        assert!(!fragments.is_empty());
        assert_eq!(fragments.len() % 2, 0);
        for (tile, side) in &fragments {
            let partner = match side {
                SplitterSide::Right => Location(tile.0, tile.1 + 1),
                SplitterSide::Left => Location(tile.0, tile.1 - 1),
            };
            let partner_side = match side {
                SplitterSide::Right => SplitterSide::Left,
                SplitterSide::Left => SplitterSide::Right,
            };
            assert_eq!(
                layout.entity_at(partner).unwrap().kind,
                EntityKind::Splitter { side: partner_side },
                "unpaired fragment at {tile:?}"
            );
        }

        // flow conserves at every tile
        for tile in graph.tiles() {
            assert!(conservation_residual(&layout, tile, 0).abs() < TOL, "leak at {tile:?}");
        }

        // cheapest layout: three belts feeding and draining one splitter pair
        assert!((layout.objective() - (3.0 * costs.belt + 2.0 * costs.splitter)).abs() < TOL);
        assert!(format!("{layout}").contains('S'));
    }

    #[test]
    fn two_lane_balancer_mixes_both_commodities() {
        let costs = CostTable::default();
        let graph = BalancerGraph::build(&spec(2, 2, &[0, 1], &[0, 1], 1)).unwrap();
        let layout = BalancerModel::build(&graph, &costs)
            .solve(SolveOptions::default())
            .unwrap();

        // every output takes exactly one unit of each input's commodity
        for j in 0..2 {
            let to_output = layout
                .flows()
                .iter()
                .find(|mf| mf.to == NodeId::Output(j))
                .expect("output lane is fed");
            for b in 0..2 {
                assert!(
                    (to_output.flows[b] - 1.0).abs() < TOL,
                    "output {j} holds {} of commodity {b}",
                    to_output.flows[b]
                );
            }
        }

        // each input emits only its own commodity, two units of it
        for i in 0..2 {
            let from_input = layout
                .flows()
                .iter()
                .find(|mf| mf.from == NodeId::Input(i))
                .expect("input lane is drained");
            for b in 0..2 {
                let expected = if b == i { 2.0 } else { 0.0 };
                assert!((from_input.flows[b] - expected).abs() < TOL);
            }
        }

        for tile in graph.tiles() {
            for b in 0..2 {
                assert!(conservation_residual(&layout, tile, b).abs() < TOL, "leak at {tile:?}");
            }
        }

        // no diagonal leaves the last column, so the pair sits on the entry
        // tiles and the exit tiles are plain belts
        assert_eq!(
            layout.entity_at(Location(0, 0)).unwrap().kind,
            EntityKind::Splitter { side: SplitterSide::Right }
        );
        assert_eq!(
            layout.entity_at(Location(0, 1)).unwrap().kind,
            EntityKind::Splitter { side: SplitterSide::Left }
        );
        assert!((layout.objective() - (2.0 * costs.belt + 2.0 * costs.splitter)).abs() < TOL);
    }

    #[test]
    fn width_one_cannot_cross_rows() {
        let costs = CostTable::default();
        let graph = BalancerGraph::build(&spec(1, 2, &[0], &[1], 1)).unwrap();
        assert!(matches!(
            BalancerModel::build(&graph, &costs).solve(SolveOptions::default()),
            Err(Error::Infeasible)
        ));
    }

    #[test]
    fn doubled_costs_double_the_objective() {
        let base = CostTable::default();
        let doubled = base.scaled(2.0);
        let problem = spec(3, 3, &[1], &[1, 2], 1);

        let graph = BalancerGraph::build(&problem).unwrap();
        let cheap = BalancerModel::build(&graph, &base)
            .solve(SolveOptions::default())
            .unwrap();
        let dear = BalancerModel::build(&graph, &doubled)
            .solve(SolveOptions::default())
            .unwrap();

        assert!((dear.objective() - 2.0 * cheap.objective()).abs() < TOL);
    }

    #[test]
    fn underground_jump_wins_when_belts_cost_more() {
        // make belts expensive enough that a jump over the middle pays off
        let costs = CostTable { belt: 10.0, underground: 1.0, splitter: 20.0 };
        let graph = BalancerGraph::build(&spec(4, 1, &[0], &[0], 2)).unwrap();
        let layout = BalancerModel::build(&graph, &costs)
            .solve(SolveOptions { time_limit: Some(Duration::from_secs(60)), threads: None })
            .unwrap();

        let entry = layout
            .entities()
            .find(|(_, p)| matches!(p.kind, EntityKind::UndergroundEntry { .. }))
            .expect("an underground entry is placed");
        assert_eq!(entry.1.direction, Direction::Right);

        // entry plus two belts, whichever tile the jump starts from
        assert_eq!(layout.entities().count(), 3);
        assert!((layout.objective() - (costs.underground + 2.0 * costs.belt)).abs() < TOL);

        let to_output = layout
            .flows()
            .iter()
            .find(|mf| mf.to == NodeId::Output(0))
            .unwrap();
        assert!((to_output.flows[0] - 1.0).abs() < TOL);
    }
}
