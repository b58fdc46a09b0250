use std::f32::consts::FRAC_PI_2;

use mmo_monster_combat_server::collaborators::{
    CombatTarget, DamageLog, ProjectileLog, TableDamagePipeline, TargetRegistry, TargetTable,
};
use mmo_monster_combat_server::config::{
    AttackCondition, AttackDef, AttackKind, AttackTable, EngineConfig, SpeciesDef, SpeciesTable,
};
use mmo_monster_combat_server::engine::{
    Collaborators, CombatEngine, CombatEngineOptions, PlayerAttack,
};
use mmo_monster_combat_server::geometry::Hitbox;
use mmo_monster_combat_server::pathfinding::GridPathfinder;
use mmo_monster_combat_server::terrain::{GridTerrain, Terrain};
use mmo_monster_combat_server::types::{
    DamageType, MonsterId, MonsterState, RuntimeEvent, TargetId, Vec2,
};

const DT: u64 = 50;

struct World {
    engine: CombatEngine,
    targets: TargetTable,
    damage: DamageLog,
    projectiles: ProjectileLog,
}

fn attack(name: &str, kind: AttackKind, range: f32, windup_ms: u64, recovery_ms: u64) -> AttackDef {
    AttackDef {
        name: name.to_string(),
        kind,
        damage: 10,
        range,
        cooldown_ms: 2_000,
        windup_ms,
        recovery_ms,
        priority: 0,
        condition: AttackCondition::Always,
        damage_type: DamageType::Physical,
        stun_ms: 0,
    }
}

fn species(name: &str, move_speed: f32, aggro_range: f32, primary: AttackDef) -> SpeciesDef {
    SpeciesDef {
        name: name.to_string(),
        weight: 1.0,
        max_hp: 40,
        move_speed,
        aggro_range,
        collision_radius: 12.0,
        attacks: AttackTable {
            primary: Some(primary),
            special1: None,
            special2: None,
        },
    }
}

fn world_with(terrain: GridTerrain, species: Vec<SpeciesDef>, seed: u64) -> World {
    let targets = TargetTable::new();
    let pipeline = TableDamagePipeline::new(targets.clone());
    let damage = pipeline.log();
    let projectiles = ProjectileLog::default();
    let engine = CombatEngine::new(
        Collaborators {
            terrain: Box::new(terrain),
            pathfinder: Box::new(GridPathfinder::default()),
            targets: Box::new(targets.clone()),
            damage: Box::new(pipeline),
            projectiles: Box::new(projectiles.clone()),
        },
        CombatEngineOptions {
            seed,
            config: EngineConfig {
                spawn_interval_ms: 0,
                ..EngineConfig::default()
            },
            species: SpeciesTable::new(species),
        },
    );
    World {
        engine,
        targets,
        damage,
        projectiles,
    }
}

fn world(species: Vec<SpeciesDef>) -> World {
    world_with(GridTerrain::open(100, 40, 32.0), species, 5)
}

fn bite() -> AttackDef {
    attack("bite", AttackKind::Melee { width: 40.0 }, 60.0, 300, 200)
}

fn state(world: &World, id: MonsterId) -> MonsterState {
    world.engine.monster(id).expect("monster").state
}

#[test]
fn chasing_moves_exactly_move_speed_and_attacks_within_range() {
    let mut w = world(vec![species(
        "hound",
        5.0,
        600.0,
        attack("maul", AttackKind::Melee { width: 40.0 }, 100.0, 200, 200),
    )]);
    w.targets.upsert(CombatTarget::new(1, Vec2::new(500.0, 0.0), 100));
    let id = w
        .engine
        .create_monster(Some("hound"), Some(Vec2::new(0.0, 0.0)))
        .expect("spawn");

    w.engine.step(DT);
    assert_eq!(state(&w, id), MonsterState::Chasing);

    w.engine.step(DT);
    let monster = w.engine.monster(id).expect("monster");
    assert_eq!(monster.state, MonsterState::Chasing);
    assert_eq!(monster.position, Vec2::new(5.0, 0.0));

    let mut previous = monster.position;
    for _ in 0..200 {
        w.engine.step(DT);
        let monster = w.engine.monster(id).expect("monster");
        let distance = monster.position.distance(Vec2::new(500.0, 0.0));
        if monster.state == MonsterState::Attacking {
            assert!(distance <= 100.0);
            assert_eq!(monster.position, Vec2::new(400.0, 0.0));
            return;
        }
        assert_eq!(monster.state, MonsterState::Chasing);
        assert!((monster.position.x - previous.x - 5.0).abs() < 1e-4);
        previous = monster.position;
    }
    panic!("monster never started attacking");
}

#[test]
fn lethal_damage_marks_dying_same_tick_and_despawns_after_exact_grace() {
    let mut w = world(vec![species("wolf", 4.0, 400.0, bite())]);
    let id = w
        .engine
        .create_monster(Some("wolf"), Some(Vec2::new(300.0, 300.0)))
        .expect("spawn");
    w.engine.step(DT);

    let hit = PlayerAttack {
        name: "blade".to_string(),
        origin: Vec2::new(260.0, 300.0),
        angle: 0.0,
        shape: Hitbox::Circle { radius: 50.0 },
        damage: 100,
        damage_type: DamageType::Physical,
        stun_ms: 0,
    };
    assert_eq!(w.engine.resolve_player_attack(TargetId(9), &hit), vec![id]);
    assert_eq!(state(&w, id), MonsterState::Dying);
    let killed_at = w.engine.now_ms();
    let grace = w.engine.config.death_grace_ms;

    while w.engine.now_ms() + DT < killed_at + grace {
        w.engine.step(DT);
        assert_eq!(state(&w, id), MonsterState::Dying);
    }
    w.engine.step(DT);
    assert_eq!(w.engine.now_ms(), killed_at + grace);
    assert!(w.engine.monster(id).is_none());
}

#[test]
fn kill_mid_windup_never_reaches_the_damage_pipeline() {
    let mut w = world(vec![species("wolf", 4.0, 400.0, bite())]);
    w.targets.upsert(CombatTarget::new(1, Vec2::new(140.0, 100.0), 100));
    let id = w
        .engine
        .create_monster(Some("wolf"), Some(Vec2::new(100.0, 100.0)))
        .expect("spawn");
    w.engine.step(DT);
    w.engine.step(DT);
    assert_eq!(state(&w, id), MonsterState::Attacking);

    assert!(w.engine.apply_monster_damage(id, 999, 0, None));
    for _ in 0..40 {
        w.engine.step(DT);
    }
    assert!(w.damage.is_empty());
    assert_eq!(w.targets.get(TargetId(1)).map(|t| t.hp), Some(100));
}

#[test]
fn stun_before_projectile_release_launches_nothing() {
    let mut w = world(vec![species(
        "archer",
        3.0,
        500.0,
        attack("arrow", AttackKind::Projectile { speed: 12.0 }, 300.0, 400, 200),
    )]);
    w.targets.upsert(CombatTarget::new(1, Vec2::new(300.0, 100.0), 100));
    let id = w
        .engine
        .create_monster(Some("archer"), Some(Vec2::new(100.0, 100.0)))
        .expect("spawn");
    w.engine.step(DT);
    w.engine.step(DT);
    assert_eq!(state(&w, id), MonsterState::Attacking);

    assert!(w.engine.stun_monster(id, 1_000));
    for _ in 0..6 {
        w.engine.step(DT);
    }
    assert!(w.projectiles.is_empty());
}

#[test]
fn monsters_only_die_after_hp_reaches_zero() {
    let mut w = world(vec![species("wolf", 4.0, 400.0, bite())]);
    w.targets.upsert(CombatTarget::new(1, Vec2::new(400.0, 400.0), 1_000));
    let ids: Vec<MonsterId> = (0..6)
        .map(|i| {
            w.engine
                .create_monster(Some("wolf"), Some(Vec2::new(200.0 + i as f32 * 30.0, 380.0)))
                .expect("spawn")
        })
        .collect();

    for tick in 0..120u64 {
        if tick % 7 == 0 {
            let swing = PlayerAttack {
                name: "cleave".to_string(),
                origin: Vec2::new(400.0, 400.0),
                angle: std::f32::consts::PI,
                shape: Hitbox::Cone {
                    range: 160.0,
                    angle: FRAC_PI_2,
                },
                damage: 6,
                damage_type: DamageType::Physical,
                stun_ms: 150,
            };
            w.engine.resolve_player_attack(TargetId(1), &swing);
        }
        w.engine.step(DT);
        for event in w.engine.drain_events() {
            if let RuntimeEvent::MonsterKilled { monster_id, .. } = event {
                if let Some(monster) = w.engine.monster(monster_id) {
                    assert!(monster.hp <= 0);
                }
            }
        }
        for id in &ids {
            if let Some(monster) = w.engine.monster(*id) {
                assert_eq!(monster.state == MonsterState::Dying, monster.hp <= 0);
            }
        }
    }
}

#[test]
fn stun_recovery_resumes_only_a_live_target_in_aggro_range() {
    let mut w = world(vec![species("wolf", 4.0, 400.0, bite())]);
    w.targets.upsert(CombatTarget::new(1, Vec2::new(350.0, 200.0), 100));
    w.targets.upsert(CombatTarget::new(2, Vec2::new(100.0, 520.0), 100));
    let id = w
        .engine
        .create_monster(Some("wolf"), Some(Vec2::new(100.0, 200.0)))
        .expect("spawn");
    w.engine.step(DT);
    assert_eq!(
        w.engine.monster(id).expect("monster").target,
        Some(TargetId(1))
    );

    w.engine.stun_monster(id, 200);
    w.targets.set_hp(TargetId(1), 0);
    for _ in 0..4 {
        w.engine.step(DT);
    }
    let monster = w.engine.monster(id).expect("monster");
    assert_eq!(monster.state, MonsterState::Chasing);
    assert_eq!(monster.target, Some(TargetId(2)));
}

#[test]
fn multi_hit_lands_three_times_two_hundred_ms_apart_along_a_fixed_line() {
    let mut w = world(vec![species(
        "brute",
        3.0,
        400.0,
        attack(
            "rampage",
            AttackKind::MultiHit {
                hits: 3,
                interval_ms: 200,
                radius: 200.0,
                charge_speed: 4.0,
            },
            120.0,
            300,
            200,
        ),
    )]);
    w.targets.upsert(CombatTarget::new(1, Vec2::new(150.0, 100.0), 100));
    let id = w
        .engine
        .create_monster(Some("brute"), Some(Vec2::new(100.0, 100.0)))
        .expect("spawn");
    w.engine.step(DT);
    w.engine.step(DT);
    assert_eq!(state(&w, id), MonsterState::Attacking);
    w.engine.drain_events();

    w.targets.set_position(TargetId(1), Vec2::new(150.0, 180.0));
    let mut hit_times = Vec::new();
    for _ in 0..30 {
        w.engine.step(DT);
        let now = w.engine.now_ms();
        for event in w.engine.drain_events() {
            if matches!(event, RuntimeEvent::AttackDamage { .. }) {
                hit_times.push(now);
            }
        }
        let monster = w.engine.monster(id).expect("monster");
        if monster.state == MonsterState::Attacking {
            assert_eq!(monster.position.y, 100.0);
        }
    }
    assert_eq!(hit_times.len(), 3);
    assert_eq!(hit_times[1] - hit_times[0], 200);
    assert_eq!(hit_times[2] - hit_times[1], 200);
    assert_eq!(w.targets.get(TargetId(1)).map(|t| t.hp), Some(70));
}

#[test]
fn far_monster_sleeps_and_wakes_at_exactly_three_view_distances() {
    let mut w = world(vec![species("wolf", 4.0, 400.0, bite())]);
    w.targets.upsert(CombatTarget::new(1, Vec2::new(16.0, 100.0), 100));
    let id = w
        .engine
        .create_monster(Some("wolf"), Some(Vec2::new(2_500.0, 100.0)))
        .expect("spawn");

    w.engine.step(DT);
    let monster = w.engine.monster(id).expect("monster");
    assert_eq!(monster.state, MonsterState::Dormant);
    assert_eq!(monster.velocity, Vec2::ZERO);

    let edge = 2_500.0 - 3.0 * w.engine.config.base_view_distance;
    w.targets.set_position(TargetId(1), Vec2::new(edge, 100.0));
    w.engine.step(DT);
    assert_eq!(state(&w, id), MonsterState::Idle);
}

#[test]
fn random_spawns_without_targets_stay_on_walkable_ground() {
    let layout = "\
################
#....#.........#
#....#..####...#
#..............#
####.#####.#####
#....#.........#
################";
    let terrain = GridTerrain::parse(layout, 32.0).expect("layout");
    let mut w = world_with(terrain, vec![species("wolf", 4.0, 400.0, bite())], 77);
    let bounds = w.engine.terrain().bounds();
    for id in w.engine.spawn_batch(40) {
        let p = w.engine.monster(id).expect("monster").position;
        assert!(p.x >= 0.0 && p.y >= 0.0 && p.x < bounds.x && p.y < bounds.y);
        assert!(w.engine.terrain().is_walkable(p.x, p.y));
    }
}

#[test]
fn player_cone_includes_monsters_on_its_edge() {
    let mut w = world(vec![species("wolf", 4.0, 400.0, bite())]);
    let inside = w
        .engine
        .create_monster(Some("wolf"), Some(Vec2::new(612.0, 500.0)))
        .expect("spawn");
    let beyond = w
        .engine
        .create_monster(Some("wolf"), Some(Vec2::new(613.0, 500.0)))
        .expect("spawn");
    let behind = w
        .engine
        .create_monster(Some("wolf"), Some(Vec2::new(450.0, 500.0)))
        .expect("spawn");
    let swing = PlayerAttack {
        name: "arc".to_string(),
        origin: Vec2::new(500.0, 500.0),
        angle: 0.0,
        shape: Hitbox::Cone {
            range: 100.0,
            angle: FRAC_PI_2,
        },
        damage: 1,
        damage_type: DamageType::Physical,
        stun_ms: 0,
    };
    let hit = w.engine.resolve_player_attack(TargetId(1), &swing);
    assert!(hit.contains(&inside));
    assert!(!hit.contains(&beyond));
    assert!(!hit.contains(&behind));
}

fn pack_outcome(creation_order: &[usize]) -> (Vec<(u64, Vec2, i32, MonsterState)>, Vec<i32>) {
    let spots = [
        Vec2::new(220.0, 300.0),
        Vec2::new(380.0, 300.0),
        Vec2::new(300.0, 220.0),
        Vec2::new(300.0, 420.0),
    ];
    let mut w = world(vec![
        species("wolf", 4.0, 400.0, bite()),
        species(
            "caster",
            3.0,
            400.0,
            attack(
                "burst",
                AttackKind::CircleAoe {
                    radius: 80.0,
                    offset: 0.0,
                },
                150.0,
                250,
                250,
            ),
        ),
    ]);
    w.targets.upsert(CombatTarget::new(1, Vec2::new(300.0, 300.0), 120));
    w.targets.upsert(CombatTarget::new(2, Vec2::new(330.0, 310.0), 90));
    for &slot in creation_order {
        let name = if slot % 2 == 0 { "wolf" } else { "caster" };
        w.engine
            .create_monster(Some(name), Some(spots[slot]))
            .expect("spawn");
    }
    for _ in 0..80 {
        w.engine.step(DT);
    }
    let mut monsters: Vec<_> = w
        .engine
        .monsters()
        .map(|m| (m.key, m.position, m.hp, m.state))
        .collect();
    monsters.sort_by_key(|m| m.0);
    let mut hp: Vec<i32> = w.targets.targets().iter().map(|t| t.hp).collect();
    hp.sort_unstable();
    (monsters, hp)
}

#[test]
fn combat_outcome_does_not_depend_on_creation_order() {
    let forward = pack_outcome(&[0, 1, 2, 3]);
    let reversed = pack_outcome(&[3, 2, 1, 0]);
    let shuffled = pack_outcome(&[2, 0, 3, 1]);
    assert_eq!(forward, reversed);
    assert_eq!(forward, shuffled);
    assert_ne!(forward.1, vec![90, 120]);
}

#[test]
fn same_seed_replays_identically() {
    let run = |seed: u64| {
        let mut w = world_with(
            GridTerrain::arena(48, 48, 32.0),
            mmo_monster_combat_server::config::default_species(),
            seed,
        );
        w.targets.upsert(CombatTarget::new(1, Vec2::new(600.0, 600.0), 300));
        w.targets.upsert(CombatTarget::new(2, Vec2::new(900.0, 700.0), 300));
        w.engine.spawn_batch(25);
        let mut frames = Vec::new();
        for tick in 0..150u64 {
            let drift = (tick as f32 * 0.05).sin() * 120.0;
            w.targets
                .set_position(TargetId(2), Vec2::new(900.0 + drift, 700.0));
            w.engine.step(DT);
            frames.push(serde_json::to_string(&w.engine.build_snapshot(true)).expect("snapshot"));
        }
        (frames, w.damage.len(), w.projectiles.len())
    };
    assert_eq!(run(31), run(31));
}
