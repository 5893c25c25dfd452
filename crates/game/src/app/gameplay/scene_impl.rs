use bastion_engine::{
    world_to_grid, BlobStorage, EnemyArchetype, GridCoord, ProxyRegistry, Scene, SceneCommand,
    Vec2, GRID_SIZE,
};
use tracing::{debug, info, warn};

use super::enemy::SpawnConfig;
use super::simulation::{Simulation, TickReport};
use super::tower::TowerKind;

/// Player damage taken per enemy that reaches the end of the path.
pub(crate) const ARRIVAL_DAMAGE: f32 = 10.0;
/// Grid units the player walks per tick while fetching loot.
const PLAYER_WALK_SPEED: f32 = 0.1;
/// `delta_factor` 1.0 corresponds to one tick at this rate.
const REFERENCE_TPS: f32 = 60.0;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(crate) struct SceneStats {
    pub(crate) spawned: u32,
    pub(crate) defeated: u32,
    pub(crate) arrived: u32,
    pub(crate) pickups_spawned: u32,
    pub(crate) pickups_collected: u32,
}

impl SceneStats {
    fn record(&mut self, report: &TickReport) {
        self.defeated += report.defeats.len() as u32;
        self.arrived += report.arrivals.len() as u32;
        self.pickups_spawned += report.spawned_pickups.len() as u32;
    }
}

/// Headless demo: enemies walk one path past a fixed tower layout while the
/// player fetches whatever they drop.
pub(crate) struct DefenseScene<S> {
    sim: Simulation<S>,
    path: Vec<GridCoord>,
    archetypes: Vec<EnemyArchetype>,
    tower_layout: Vec<(TowerKind, GridCoord)>,
    spawn_cursor: usize,
    ticks_until_spawn: u64,
    summary_interval_ticks: u64,
    stats: SceneStats,
}

impl<S: BlobStorage> DefenseScene<S> {
    pub(crate) fn new(
        sim: Simulation<S>,
        path: Vec<GridCoord>,
        archetypes: Vec<EnemyArchetype>,
        tower_layout: Vec<(TowerKind, GridCoord)>,
        summary_interval_ticks: u64,
    ) -> Self {
        Self {
            sim,
            path,
            archetypes,
            tower_layout,
            spawn_cursor: 0,
            ticks_until_spawn: 0,
            summary_interval_ticks,
            stats: SceneStats::default(),
        }
    }

    pub(crate) fn simulation(&self) -> &Simulation<S> {
        &self.sim
    }

    pub(crate) fn stats(&self) -> SceneStats {
        self.stats
    }

    fn spawn_next_enemy(&mut self, world: &mut ProxyRegistry) {
        let config = match self.archetypes.get(self.spawn_cursor) {
            Some(archetype) => SpawnConfig::from_archetype(self.path.clone(), archetype),
            None => SpawnConfig::new(self.path.clone()),
        };
        if !self.archetypes.is_empty() {
            self.spawn_cursor = (self.spawn_cursor + 1) % self.archetypes.len();
        }
        match self.sim.spawn_enemy(config, world) {
            Ok(_) => self.stats.spawned += 1,
            Err(error) => warn!(error = %error, "enemy_spawn_failed"),
        }
    }

    /// Leaked enemies hurt the player and leave the field.
    fn resolve_arrivals(&mut self, report: &TickReport, world: &mut ProxyRegistry) {
        for enemy_id in &report.arrivals {
            if !self.sim.remove_enemy(*enemy_id, world) {
                continue;
            }
            self.sim.player_mut().take_damage(ARRIVAL_DAMAGE);
            info!(
                enemy_id = enemy_id.0,
                player_health = self.sim.player().health(),
                "enemy_reached_goal"
            );
        }
    }

    fn walk_toward_oldest_pickup(&mut self) {
        let Some(pickup) = self.sim.pickups().first() else {
            return;
        };
        let target = world_to_grid(pickup.position());
        let player = self.sim.player_mut();
        let distance = player.position.distance(target);
        if distance <= PLAYER_WALK_SPEED {
            player.position = target;
        } else {
            let t = PLAYER_WALK_SPEED / distance;
            player.position = player.position.lerp(target, t);
        }
    }

    fn collect_nearby_pickups(&mut self, world: &mut ProxyRegistry) {
        for pickup_id in self.sim.pickups_near_player() {
            match self.sim.collect_pickup(pickup_id, None, world) {
                Ok(applied) => {
                    self.stats.pickups_collected += 1;
                    debug!(target = ?applied.target, durable = applied.durable, "auto_collected");
                }
                Err(error) => debug!(error = %error, "auto_collect_skipped"),
            }
        }
    }

    fn log_summary(&self, event: &'static str) {
        info!(
            tick = self.sim.ticks(),
            spawned = self.stats.spawned,
            defeated = self.stats.defeated,
            arrived = self.stats.arrived,
            live_enemies = self.sim.enemies().len(),
            pickups_spawned = self.stats.pickups_spawned,
            pickups_collected = self.stats.pickups_collected,
            coins = self.sim.coins(),
            player_health = self.sim.player().health(),
            "{}",
            event
        );
    }
}

impl<S: BlobStorage> Scene for DefenseScene<S> {
    fn load(&mut self, world: &mut ProxyRegistry) {
        self.stats = SceneStats::default();
        self.spawn_cursor = 0;
        self.ticks_until_spawn = 0;
        let layout = self.tower_layout.clone();
        for (kind, position) in layout {
            if let Err(error) = self.sim.place_tower(kind, position, world) {
                warn!(kind = ?kind, error = %error, "tower_placement_failed");
            }
        }
        info!(
            path_points = self.path.len(),
            archetypes = self.archetypes.len(),
            towers = self.sim.towers().len(),
            player_max_health = self.sim.player().max_health(),
            "scene_load"
        );
    }

    fn update(&mut self, fixed_dt_seconds: f32, world: &mut ProxyRegistry) -> SceneCommand {
        if self.ticks_until_spawn == 0 {
            self.spawn_next_enemy(world);
            self.ticks_until_spawn = self.sim.config().enemy_spawn_interval_ticks.max(1);
        }
        self.ticks_until_spawn -= 1;

        let report = self.sim.tick(fixed_dt_seconds * REFERENCE_TPS, world);
        self.stats.record(&report);
        self.resolve_arrivals(&report, world);
        self.walk_toward_oldest_pickup();
        self.collect_nearby_pickups(world);

        if self.summary_interval_ticks > 0 && self.sim.ticks() % self.summary_interval_ticks == 0 {
            self.log_summary("scene_summary");
        }
        if self.sim.player().health() <= 0.0 {
            info!(tick = self.sim.ticks(), "player_defeated");
            return SceneCommand::Stop;
        }
        SceneCommand::None
    }

    fn unload(&mut self, world: &mut ProxyRegistry) {
        self.log_summary("scene_unload");
        world.clear();
    }
}

/// Archer and Mage hug the first two bends of `path`, offset one tile off
/// the route. The Healer stands beside the player's spawn so it is in
/// range from the first tick.
pub(crate) fn default_tower_layout(
    path: &[GridCoord],
    player_spawn: Vec2,
) -> Vec<(TowerKind, GridCoord)> {
    let kinds = [TowerKind::Archer, TowerKind::Mage];
    let mut layout: Vec<(TowerKind, GridCoord)> = path
        .windows(2)
        .zip(kinds)
        .map(|(segment, kind)| {
            let (from, to) = (segment[0], segment[1]);
            let mid = Vec2::new(
                (from.x as f32 + to.x as f32) / 2.0,
                (from.y as f32 + to.y as f32) / 2.0,
            );
            let beside = if from.x == to.x {
                GridCoord::new(mid.x as u32 + 1, mid.y as u32)
            } else {
                GridCoord::new(mid.x as u32, mid.y as u32 + 1)
            };
            (kind, beside)
        })
        .collect();

    let spawn = GridCoord::new(player_spawn.x.round() as u32, player_spawn.y.round() as u32);
    let healer = HEALER_OFFSETS
        .iter()
        .filter_map(|&(dx, dy)| offset_tile(spawn, dx, dy))
        .find(|tile| !on_path(path, *tile) && layout.iter().all(|(_, placed)| placed != tile));
    match healer {
        Some(tile) => layout.push((TowerKind::Healer, tile)),
        None => warn!(x = spawn.x, y = spawn.y, "healer_slot_unavailable"),
    }
    layout
}

const HEALER_OFFSETS: [(i64, i64); 4] = [(0, 1), (1, 0), (0, -1), (-1, 0)];

fn offset_tile(tile: GridCoord, dx: i64, dy: i64) -> Option<GridCoord> {
    let x = u32::try_from(i64::from(tile.x) + dx).ok()?;
    let y = u32::try_from(i64::from(tile.y) + dy).ok()?;
    (x < GRID_SIZE && y < GRID_SIZE).then_some(GridCoord::new(x, y))
}

/// Path segments are axis-aligned, so each one covers its bounding box.
fn on_path(path: &[GridCoord], tile: GridCoord) -> bool {
    if let [only] = path {
        return *only == tile;
    }
    path.windows(2).any(|segment| {
        let (from, to) = (segment[0], segment[1]);
        (from.x.min(to.x)..=from.x.max(to.x)).contains(&tile.x)
            && (from.y.min(to.y)..=from.y.max(to.y)).contains(&tile.y)
    })
}

#[cfg(test)]
mod tests {
    use std::path::Path;

    use bastion_engine::{compile_content_str, grid_to_world, MemoryBlobStorage, ProxyKind};
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    use super::super::persistence::PersistenceStore;
    use super::super::progression::ProgressionEngine;
    use super::super::simulation::SimConfig;
    use super::*;

    fn scene(
        storage: &MemoryBlobStorage,
        path: Vec<GridCoord>,
        archetypes: Vec<EnemyArchetype>,
        layout: Vec<(TowerKind, GridCoord)>,
    ) -> DefenseScene<&MemoryBlobStorage> {
        let raw = include_str!("../../../../../assets/base/loot.xml");
        let catalog = compile_content_str(Path::new("loot.xml"), raw)
            .expect("loot compiles")
            .into_loot_catalog();
        let engine = ProgressionEngine::new(catalog, PersistenceStore::new(storage));
        let config = SimConfig {
            enemy_spawn_interval_ticks: 5,
            ..SimConfig::default()
        };
        let sim = Simulation::new(config, engine, Box::new(StdRng::seed_from_u64(3)));
        DefenseScene::new(sim, path, archetypes, layout, 0)
    }

    #[test]
    fn load_places_layout_towers() {
        let storage = MemoryBlobStorage::default();
        let path = vec![GridCoord::new(0, 10), GridCoord::new(12, 10), GridCoord::new(12, 24)];
        let layout = default_tower_layout(&path, SimConfig::default().player_spawn);
        let mut scene = scene(&storage, path, Vec::new(), layout);
        let mut world = ProxyRegistry::default();

        scene.load(&mut world);
        world.apply_pending();

        assert_eq!(world.count_of_kind(ProxyKind::Tower), 3);
        assert_eq!(scene.simulation().towers().len(), 3);
    }

    #[test]
    fn default_layout_stays_off_path() {
        let path = vec![
            GridCoord::new(0, 10),
            GridCoord::new(12, 10),
            GridCoord::new(12, 24),
            GridCoord::new(30, 24),
        ];
        let layout = default_tower_layout(&path, Vec2::new(25.0, 25.0));
        assert_eq!(
            layout,
            vec![
                (TowerKind::Archer, GridCoord::new(6, 11)),
                (TowerKind::Mage, GridCoord::new(13, 17)),
                (TowerKind::Healer, GridCoord::new(25, 26)),
            ]
        );
        assert!(layout.iter().all(|(_, tile)| !on_path(&path, *tile)));
    }

    #[test]
    fn default_healer_covers_player_spawn() {
        let spawn = SimConfig::default().player_spawn;
        let path = vec![GridCoord::new(0, 26), GridCoord::new(40, 26)];
        let layout = default_tower_layout(&path, spawn);

        let (_, healer) = layout
            .iter()
            .find(|(kind, _)| *kind == TowerKind::Healer)
            .expect("healer placed");
        assert_eq!(*healer, GridCoord::new(26, 25));
        assert!(healer.to_vec2().distance(spawn) <= TowerKind::Healer.range());
    }

    #[test]
    fn healer_tops_up_player_standing_at_spawn() {
        let storage = MemoryBlobStorage::default();
        let path = vec![GridCoord::new(0, 0), GridCoord::new(0, 49)];
        let layout = default_tower_layout(&path, SimConfig::default().player_spawn);
        let mut scene = scene(&storage, path, Vec::new(), layout);
        let mut world = ProxyRegistry::default();
        scene.load(&mut world);
        scene.sim.player_mut().take_damage(5.0);
        let hurt = scene.simulation().player().health();

        scene.update(1.0 / 60.0, &mut world);

        assert!(scene.simulation().player().health() > hurt);
    }

    #[test]
    fn leaked_enemy_damages_player_and_is_removed() {
        let storage = MemoryBlobStorage::default();
        let path = vec![GridCoord::new(0, 0), GridCoord::new(1, 0)];
        let mut scene = scene(&storage, path, Vec::new(), Vec::new());
        let mut world = ProxyRegistry::default();
        scene.load(&mut world);

        for _ in 0..40 {
            scene.update(1.0 / 60.0, &mut world);
            world.apply_pending();
        }

        let stats = scene.stats();
        assert!(stats.arrived >= 1);
        let expected = 100.0 - ARRIVAL_DAMAGE * stats.arrived as f32;
        assert!((scene.simulation().player().health() - expected).abs() < 1e-4);
        assert_eq!(
            scene.simulation().enemies().len() as u32,
            stats.spawned - stats.arrived
        );
    }

    #[test]
    fn enemy_killed_at_the_goal_does_not_hurt_player() {
        let storage = MemoryBlobStorage::default();
        let path = vec![GridCoord::new(5, 6), GridCoord::new(5, 7)];
        let layout = vec![(TowerKind::Mage, GridCoord::new(5, 5))];
        let mut scene = scene(&storage, path.clone(), Vec::new(), layout);
        let mut world = ProxyRegistry::default();
        scene.load(&mut world);
        scene.ticks_until_spawn = 10;
        scene
            .sim
            .spawn_enemy(
                SpawnConfig::new(path).with_speed(1.0).with_max_health(0.05),
                &mut world,
            )
            .expect("spawn");

        scene.update(1.0 / 60.0, &mut world);

        let stats = scene.stats();
        assert_eq!(stats.defeated, 1);
        assert_eq!(stats.arrived, 0);
        assert_eq!(scene.simulation().player().health(), 100.0);
    }

    #[test]
    fn scene_stops_when_player_falls() {
        let storage = MemoryBlobStorage::default();
        let path = vec![GridCoord::new(0, 0)];
        let mut scene = scene(&storage, path, Vec::new(), Vec::new());
        let mut world = ProxyRegistry::default();
        scene.load(&mut world);
        scene.sim.player_mut().take_damage(95.0);

        assert_eq!(scene.update(1.0 / 60.0, &mut world), SceneCommand::Stop);
    }

    #[test]
    fn player_fetches_and_collects_dropped_loot() {
        let storage = MemoryBlobStorage::default();
        let path = vec![GridCoord::new(0, 0), GridCoord::new(0, 49)];
        let mut scene = scene(&storage, path, Vec::new(), Vec::new());
        let mut world = ProxyRegistry::default();
        scene.load(&mut world);
        let drop_pos = grid_to_world(Vec2::new(25.0, 20.0));
        scene
            .sim
            .spawn_loot(Some("gold_hoard"), drop_pos, &mut world)
            .expect("spawned");

        for _ in 0..60 {
            scene.update(1.0 / 60.0, &mut world);
            world.apply_pending();
        }

        assert_eq!(scene.stats().pickups_collected, 1);
        assert!(scene.simulation().pickups().is_empty());
        assert_eq!(
            scene.simulation().progression().state().player.upgrades,
            vec!["gold_hoard".to_string()]
        );
    }
}
