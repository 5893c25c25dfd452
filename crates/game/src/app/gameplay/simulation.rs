use std::collections::HashSet;

use bastion_engine::{
    grid_to_world, BlobStorage, EffectStat, GridCoord, LootTargetKind, ProxyIdAllocator,
    ProxySink, Vec2, Vec3, GRID_SIZE,
};
use rand::RngCore;
use thiserror::Error;
use tracing::{debug, info, warn};

use super::enemy::{DefeatPayout, Enemy, EnemyId, SpawnConfig, SpawnError, TravelState};
use super::loot::{LootPickup, PickupId};
use super::player::{Player, DEFAULT_PLAYER_MAX_HEALTH};
use super::progression::{AppliedLoot, LootTarget, ProgressionEngine, ProgressionError};
use super::tower::{Tower, TowerContext, TowerKey, TowerKind};

/// Gameplay tunables that are not content.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct SimConfig {
    pub(crate) player_max_health: f32,
    pub(crate) player_spawn: Vec2,
    /// Seconds of pickup animation per unit of `delta_factor`.
    pub(crate) pickup_anim_seconds: f32,
    /// Planar world distance within which the player picks loot up.
    pub(crate) pickup_reach: f32,
    pub(crate) enemy_spawn_interval_ticks: u64,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            player_max_health: DEFAULT_PLAYER_MAX_HEALTH,
            player_spawn: Vec2::new(25.0, 25.0),
            pickup_anim_seconds: 1.0 / 60.0,
            pickup_reach: 1.5,
            enemy_spawn_interval_ticks: 90,
        }
    }
}

#[derive(Debug, Error)]
pub(crate) enum SimulationError {
    #[error(transparent)]
    Spawn(#[from] SpawnError),
    #[error("tile ({x}, {y}) is outside the grid")]
    OutOfBounds { x: u32, y: u32 },
    #[error("tile ({x}, {y}) already holds a tower")]
    TileOccupied { x: u32, y: u32 },
    #[error("no loot pickup with id {0:?}")]
    UnknownPickup(PickupId),
    #[error("no tower with key '{0}'")]
    UnknownTower(TowerKey),
    #[error("loot '{loot_id}' needs a tower but none is placed")]
    NoTowerForLoot { loot_id: String },
    #[error(transparent)]
    Progression(#[from] ProgressionError),
}

/// What happened during one tick, in the order it happened.
#[derive(Debug, Clone, Default, PartialEq)]
pub(crate) struct TickReport {
    pub(crate) defeats: Vec<(EnemyId, DefeatPayout)>,
    pub(crate) arrivals: Vec<EnemyId>,
    pub(crate) spawned_pickups: Vec<PickupId>,
    pub(crate) coins_credited: u64,
}

/// Owns every live gameplay entity and drives them one tick at a time.
/// Visual proxies are pushed to the `ProxySink` handed to each call; the
/// simulation never reads scene state back.
pub(crate) struct Simulation<S> {
    config: SimConfig,
    player: Player,
    enemies: Vec<Enemy>,
    towers: Vec<Tower>,
    pickups: Vec<LootPickup>,
    progression: ProgressionEngine<S>,
    rng: Box<dyn RngCore>,
    proxy_ids: ProxyIdAllocator,
    next_enemy_id: u64,
    next_pickup_id: u64,
    arrivals_reported: HashSet<EnemyId>,
    coins: u64,
    ticks: u64,
}

impl<S: BlobStorage> Simulation<S> {
    pub(crate) fn new(
        config: SimConfig,
        progression: ProgressionEngine<S>,
        rng: Box<dyn RngCore>,
    ) -> Self {
        let player = Player::new(config.player_spawn, config.player_max_health);
        Self {
            config,
            player,
            enemies: Vec::new(),
            towers: Vec::new(),
            pickups: Vec::new(),
            progression,
            rng,
            proxy_ids: ProxyIdAllocator::default(),
            next_enemy_id: 0,
            next_pickup_id: 0,
            arrivals_reported: HashSet::new(),
            coins: 0,
            ticks: 0,
        }
    }

    pub(crate) fn config(&self) -> &SimConfig {
        &self.config
    }

    pub(crate) fn player(&self) -> &Player {
        &self.player
    }

    pub(crate) fn player_mut(&mut self) -> &mut Player {
        &mut self.player
    }

    pub(crate) fn enemies(&self) -> &[Enemy] {
        &self.enemies
    }

    pub(crate) fn towers(&self) -> &[Tower] {
        &self.towers
    }

    pub(crate) fn pickups(&self) -> &[LootPickup] {
        &self.pickups
    }

    pub(crate) fn progression(&self) -> &ProgressionEngine<S> {
        &self.progression
    }

    pub(crate) fn coins(&self) -> u64 {
        self.coins
    }

    pub(crate) fn ticks(&self) -> u64 {
        self.ticks
    }

    pub(crate) fn spawn_enemy(
        &mut self,
        config: SpawnConfig,
        sink: &mut dyn ProxySink,
    ) -> Result<EnemyId, SimulationError> {
        let id = EnemyId(self.next_enemy_id);
        let enemy = Enemy::spawn(id, self.proxy_ids.allocate(), config, &mut *self.rng)?;
        self.next_enemy_id += 1;
        sink.add(enemy.proxy());
        debug!(
            enemy_id = id.0,
            max_health = enemy.max_health(),
            coin_drop = enemy.coin_drop(),
            "enemy_spawned"
        );
        self.enemies.push(enemy);
        Ok(id)
    }

    /// Places a tower with the modifiers its persisted history grants.
    pub(crate) fn place_tower(
        &mut self,
        kind: TowerKind,
        position: GridCoord,
        sink: &mut dyn ProxySink,
    ) -> Result<TowerKey, SimulationError> {
        if position.x >= GRID_SIZE || position.y >= GRID_SIZE {
            return Err(SimulationError::OutOfBounds {
                x: position.x,
                y: position.y,
            });
        }
        if self.towers.iter().any(|tower| tower.position() == position) {
            return Err(SimulationError::TileOccupied {
                x: position.x,
                y: position.y,
            });
        }

        let key = TowerKey::for_tile(position);
        let modifiers = self.progression.tower_modifiers(&key);
        let tower = Tower::new(kind, position, modifiers, self.proxy_ids.allocate());
        sink.add(tower.proxy());
        info!(
            tower = %key,
            kind = ?tower.kind(),
            level = tower.level(),
            damage_multiplier = tower.modifiers().multiplier(EffectStat::Damage),
            "tower_placed"
        );
        self.towers.push(tower);
        Ok(key)
    }

    /// Takes an enemy off the field, e.g. after the driver handled its
    /// arrival. Returns `false` for an unknown id.
    pub(crate) fn remove_enemy(&mut self, id: EnemyId, sink: &mut dyn ProxySink) -> bool {
        let Some(index) = self.enemies.iter().position(|enemy| enemy.id() == id) else {
            return false;
        };
        let enemy = self.enemies.remove(index);
        sink.remove(enemy.proxy());
        self.arrivals_reported.remove(&id);
        true
    }

    pub(crate) fn tick(&mut self, delta_factor: f32, sink: &mut dyn ProxySink) -> TickReport {
        self.ticks += 1;
        let mut report = TickReport::default();

        for enemy in &mut self.enemies {
            enemy.advance(delta_factor);
            sink.sync(enemy.proxy());
            if enemy.is_alive()
                && enemy.travel_state() == TravelState::Arrived
                && self.arrivals_reported.insert(enemy.id())
            {
                report.arrivals.push(enemy.id());
            }
        }

        for tower in &self.towers {
            let mut ctx = TowerContext {
                player: &mut self.player,
                enemies: &mut self.enemies,
                rng: &mut *self.rng,
                defeats: &mut report.defeats,
            };
            tower.apply(&mut ctx);
        }

        let defeats = std::mem::take(&mut report.defeats);
        for (enemy_id, payout) in &defeats {
            let credited = credit_coins(payout.coins, self.gold_bonus());
            self.coins += credited;
            report.coins_credited += credited;
            info!(
                enemy_id = enemy_id.0,
                coins = payout.coins,
                credited,
                loot = payout.loot.is_some(),
                "enemy_defeated"
            );
            let Some(loot) = &payout.loot else {
                continue;
            };
            if let Some(pickup_id) = self.spawn_loot(loot.id.as_deref(), loot.pos, sink) {
                report.spawned_pickups.push(pickup_id);
            }
        }
        report
            .arrivals
            .retain(|arrived| !defeats.iter().any(|(defeated, _)| defeated == arrived));
        report.defeats = defeats;

        let reported = &mut self.arrivals_reported;
        self.enemies.retain(|enemy| {
            if enemy.is_alive() {
                return true;
            }
            sink.remove(enemy.proxy());
            reported.remove(&enemy.id());
            false
        });

        let anim_dt = self.config.pickup_anim_seconds * delta_factor;
        for pickup in &mut self.pickups {
            pickup.update(anim_dt);
            sink.sync(pickup.proxy());
        }

        if !report.defeats.is_empty() || !report.arrivals.is_empty() {
            debug!(
                tick = self.ticks,
                defeats = report.defeats.len(),
                arrivals = report.arrivals.len(),
                pickups = report.spawned_pickups.len(),
                "tick_events"
            );
        }
        report
    }

    /// Pickups whose planar world distance to the player is within reach.
    pub(crate) fn pickups_near_player(&self) -> Vec<PickupId> {
        let player_pos = grid_to_world(self.player.position);
        self.pickups
            .iter()
            .filter(|pickup| pickup.position().planar_distance(player_pos) <= self.config.pickup_reach)
            .map(LootPickup::id)
            .collect()
    }

    /// Resolves a pickup into a permanent upgrade. Tower loot goes to
    /// `tower_choice`, or to the tower nearest the pickup when none is
    /// given. On error the pickup stays in the world.
    pub(crate) fn collect_pickup(
        &mut self,
        pickup_id: PickupId,
        tower_choice: Option<&TowerKey>,
        sink: &mut dyn ProxySink,
    ) -> Result<AppliedLoot, SimulationError> {
        let index = self
            .pickups
            .iter()
            .position(|pickup| pickup.id() == pickup_id && !pickup.is_collected())
            .ok_or(SimulationError::UnknownPickup(pickup_id))?;
        let def_id = self.pickups[index].def_id().to_string();
        let def = self
            .progression
            .catalog()
            .get(&def_id)
            .map_err(ProgressionError::from)?;
        let label = def.label.clone();
        let description = def.description.clone().unwrap_or_default();

        let target = match def.target {
            LootTargetKind::Player => LootTarget::Player,
            LootTargetKind::TowerIndividual => {
                let key = match tower_choice {
                    Some(key) => {
                        if !self.towers.iter().any(|tower| tower.key() == key) {
                            return Err(SimulationError::UnknownTower(key.clone()));
                        }
                        key.clone()
                    }
                    None => self
                        .nearest_tower(self.pickups[index].position())
                        .ok_or_else(|| SimulationError::NoTowerForLoot {
                            loot_id: def_id.clone(),
                        })?,
                };
                LootTarget::Tower(key)
            }
        };

        let applied = self.progression.apply_loot(&target, &def_id)?;
        if let LootTarget::Tower(key) = &applied.target {
            if let Some(tower) = self.towers.iter_mut().find(|tower| tower.key() == key) {
                tower.set_modifiers(applied.modifiers.clone());
            }
        }

        let mut pickup = self.pickups.remove(index);
        pickup.mark_collected();
        sink.remove(pickup.proxy());
        info!(
            pickup_id = pickup_id.0,
            loot_id = %def_id,
            label = %label,
            description = %description,
            durable = applied.durable,
            "pickup_collected"
        );
        Ok(applied)
    }

    fn gold_bonus(&self) -> f32 {
        self.progression
            .player_modifiers()
            .bonus(EffectStat::GoldPercent)
    }

    /// First placed tower wins a distance tie.
    fn nearest_tower(&self, point: Vec3) -> Option<TowerKey> {
        let mut best: Option<(&Tower, f32)> = None;
        for tower in &self.towers {
            let distance = tower.proxy().transform.position.planar_distance(point);
            match best {
                Some((_, best_distance)) if distance >= best_distance => {}
                _ => best = Some((tower, distance)),
            }
        }
        best.map(|(tower, _)| tower.key().clone())
    }

    /// Drops a pickup at `pos`. `def_id: None` rolls a rarity-weighted
    /// persistent definition.
    pub(crate) fn spawn_loot(
        &mut self,
        def_id: Option<&str>,
        pos: Vec3,
        sink: &mut dyn ProxySink,
    ) -> Option<PickupId> {
        let catalog = self.progression.catalog();
        let def = match def_id {
            Some(id) => match catalog.get(id) {
                Ok(def) => def,
                Err(_) => {
                    warn!(loot_id = id, "loot_drop_unknown_id");
                    return None;
                }
            },
            None => match catalog.roll_random(&mut *self.rng) {
                Some(def) => def,
                None => {
                    warn!("loot_drop_catalog_empty");
                    return None;
                }
            },
        };
        let (def_id, label) = (def.id.clone(), def.label.clone());

        let id = PickupId(self.next_pickup_id);
        self.next_pickup_id += 1;
        let pickup = LootPickup::new(id, self.proxy_ids.allocate(), def_id, pos);
        sink.add(pickup.proxy());
        info!(
            pickup_id = id.0,
            loot_id = pickup.def_id(),
            label = %label,
            "loot_spawned"
        );
        self.pickups.push(pickup);
        Some(id)
    }
}

/// Coins after the player's `goldPercent` bonus, rounded down.
pub(crate) fn credit_coins(coins: u32, gold_bonus: f32) -> u64 {
    (coins as f32 * (1.0 + gold_bonus)).max(0.0).floor() as u64
}
