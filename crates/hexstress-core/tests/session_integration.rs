//! End-to-end session tests driving a [`World`] through input events and
//! fixed ticks the way an embedding frontend would.

use hexstress_core::{
    AgentState, HexStressConfig, Occupant, SimEvent, TileId, World, find_path,
};

fn seeded_config(seed: u64) -> HexStressConfig {
    HexStressConfig {
        rng_seed: Some(seed),
        ..HexStressConfig::default()
    }
}

/// Any tile whose shortest route from the agent spans exactly `hops` hops.
fn tile_at_hops(world: &World, hops: usize) -> TileId {
    let start = world.agent().current_tile();
    world
        .board()
        .ids()
        .find(|&id| {
            find_path(world.board(), start, id)
                .map(|p| p.len() == hops + 1)
                .unwrap_or(false)
        })
        .expect("tile at requested hop distance")
}

#[test]
fn confirmed_navigation_walks_three_hops_and_idles() {
    let mut world = World::new(seeded_config(5)).expect("world");
    let goal = tile_at_hops(&world, 3);

    world.pointer_entered(goal);
    assert!(world.agent().preview_enabled());
    assert_eq!(world.agent().preview_path().len(), 4);
    assert!(world.confirm());
    assert_eq!(world.agent().state(), AgentState::Moving);

    let budget = world.config().hop_interval_ticks as usize * 3 + 2;
    for _ in 0..budget {
        world.step();
        if world.agent().state() == AgentState::Idle {
            break;
        }
    }
    assert_eq!(world.agent().state(), AgentState::Idle);
    assert_eq!(world.agent().current_tile(), goal);
    assert!(world.agent().route().is_empty());
}

#[test]
fn repeat_confirm_after_arrival_keeps_the_agent_in_place() {
    let mut world = World::new(seeded_config(5)).expect("world");
    let goal = tile_at_hops(&world, 3);
    world.pointer_entered(goal);
    assert!(world.confirm());

    let budget = world.config().hop_interval_ticks as usize * 3 + 2;
    for _ in 0..budget {
        world.step();
        if world.agent().state() == AgentState::Idle {
            break;
        }
    }
    assert_eq!(world.agent().current_tile(), goal);

    // The walked route is spent; without a new hover there is nothing
    // for a second confirm to act on.
    assert!(!world.confirm());
    for _ in 0..world.config().hop_interval_ticks {
        world.step();
    }
    assert_eq!(world.agent().state(), AgentState::Idle);
    assert_eq!(world.agent().current_tile(), goal);
}

#[test]
fn overstressed_agent_flees_back_to_home() {
    let mut world = World::new(seeded_config(13)).expect("world");
    let away = tile_at_hops(&world, 3);
    world.place_agent(away).expect("place");
    world.set_agent_stress(0.9);

    world.step();
    assert_eq!(world.agent().state(), AgentState::Fleeing);
    let route = world.agent().route();
    assert_eq!(route.front(), Some(&away));
    assert_eq!(route.back(), Some(&world.board().home()));

    let budget = world.config().hop_interval_ticks as usize * 8;
    for _ in 0..budget {
        world.step();
        if world.agent().state() != AgentState::Fleeing {
            break;
        }
    }
    assert_eq!(world.agent().state(), AgentState::Idle);
    assert_eq!(world.agent().current_tile(), world.board().home());
}

#[test]
fn spent_session_puts_the_agent_to_sleep() {
    let config = HexStressConfig {
        rng_seed: Some(3),
        factor_budget: 0,
        sworm_budget: 0,
        ..HexStressConfig::default()
    };
    let mut world = World::new(config).expect("world");

    let events = world.step();
    assert!(events.events.contains(&SimEvent::AgentSlept));
    assert_eq!(world.agent().state(), AgentState::Sleeping);

    // Terminal: further ticks change nothing about the agent.
    for _ in 0..50 {
        let events = world.step();
        assert!(events.events.is_empty());
        assert_eq!(world.agent().state(), AgentState::Sleeping);
    }
}

#[test]
fn engaging_a_factor_eliminates_it_and_relieves_the_board() {
    let mut world = World::new(seeded_config(29)).expect("world");
    let k_before = world.board().distance_stress_factor();
    let home = world.board().home();
    let factor = world.spawn_stress_factor_at(home).expect("factor");

    let mut elimination = None;
    for _ in 0..400 {
        let events = world.step();
        for event in events.events {
            if let SimEvent::StressFactorEliminated { factor: f, tile } = event {
                assert!(elimination.is_none(), "at most one elimination");
                elimination = Some((f, tile));
            }
        }
    }
    assert_eq!(elimination, Some((factor, home)));
    assert!(world.board().tile(home).expect("home").is_free());
    assert!(world.board().distance_stress_factor() < k_before);
    assert_eq!(world.progress().factors_eliminated, 1);
}

/// Scripted full session on a small board: provoke the spawner, hunt the
/// only stress factor, return home, and wait out the residual stress.
#[test]
fn full_session_runs_through_to_sleep() {
    let config = HexStressConfig {
        diameter: 5,
        rng_seed: Some(17),
        factor_budget: 1,
        max_concurrent_factors: 1,
        sworm_budget: 0,
        agent_pressure: 0.05,
        ..HexStressConfig::default()
    };
    let mut world = World::new(config).expect("world");
    let home = world.board().home();

    let mut slept = false;
    for _ in 0..20_000 {
        if world.agent().state() == AgentState::Idle {
            let current = world.agent().current_tile();
            let factor_tile = world.board().tiles().find_map(|(id, tile)| {
                matches!(tile.occupant, Occupant::StressFactor(_)).then_some(id)
            });
            let destination = if !world.agent().first_action_taken() {
                // Poke the spawner awake with a first move.
                Some(world.board().neighbors(home)[0])
            } else {
                match factor_tile {
                    Some(tile) if tile != current => Some(tile),
                    Some(_) => None,
                    None if current != home => Some(home),
                    None => None,
                }
            };
            if let Some(goal) = destination {
                world.pointer_entered(goal);
                world.confirm();
            }
        }

        let events = world.step();
        if events.events.contains(&SimEvent::AgentSlept) {
            slept = true;
            break;
        }
    }

    assert!(slept, "session should reach the sleeping state");
    assert_eq!(world.agent().state(), AgentState::Sleeping);
    assert_eq!(world.agent().current_tile(), home);
    assert_eq!(world.progress().factors_eliminated, 1);
    assert_eq!(world.progress().factors_remaining, 0);
    assert!(world.board().max_stress_level() < 1e-2);
}

#[test]
fn identically_seeded_sessions_agree_tick_for_tick() {
    let mut world_a = World::new(seeded_config(21)).expect("world_a");
    let mut world_b = World::new(seeded_config(21)).expect("world_b");
    for world in [&mut world_a, &mut world_b] {
        let target = world.board().neighbors(world.board().home())[2];
        world.pointer_entered(target);
        assert!(world.confirm());
    }

    for _ in 0..800 {
        let events_a = world_a.step();
        let events_b = world_b.step();
        assert_eq!(events_a, events_b);
    }
    let history_a: Vec<_> = world_a.history().cloned().collect();
    let history_b: Vec<_> = world_b.history().cloned().collect();
    assert_eq!(history_a, history_b);
}
