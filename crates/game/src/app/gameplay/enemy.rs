use bastion_engine::{
    grid_to_world, EnemyArchetype, GridCoord, ProxyId, ProxyKind, Vec2, Vec3, VisualProxy,
};
use rand::Rng;
use thiserror::Error;

pub(crate) const DEFAULT_MAX_HEALTH: f32 = 10.0;
pub(crate) const DEFAULT_MAX_COINS: u32 = 5;
pub(crate) const DEFAULT_SPEED: f32 = 0.03;
pub(crate) const DEFAULT_LOOT_CHANCE: f32 = 0.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub(crate) struct EnemyId(pub(crate) u64);

/// Everything needed to put an enemy on the field. Only `path` is
/// required; the rest fall back to the `DEFAULT_*` values.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct SpawnConfig {
    pub(crate) path: Vec<GridCoord>,
    pub(crate) max_health: Option<f32>,
    pub(crate) max_coins: Option<u32>,
    pub(crate) speed: Option<f32>,
    pub(crate) carries_loot_id: Option<String>,
    pub(crate) loot_chance: Option<f32>,
}

impl SpawnConfig {
    pub(crate) fn new(path: Vec<GridCoord>) -> Self {
        Self {
            path,
            max_health: None,
            max_coins: None,
            speed: None,
            carries_loot_id: None,
            loot_chance: None,
        }
    }

    pub(crate) fn from_archetype(path: Vec<GridCoord>, archetype: &EnemyArchetype) -> Self {
        Self {
            path,
            max_health: Some(archetype.max_health),
            max_coins: Some(archetype.max_coins),
            speed: Some(archetype.speed),
            carries_loot_id: archetype.carries_loot.clone(),
            loot_chance: Some(archetype.loot_chance),
        }
    }
}

#[cfg(test)]
impl SpawnConfig {
    pub(crate) fn with_max_health(mut self, max_health: f32) -> Self {
        self.max_health = Some(max_health);
        self
    }

    pub(crate) fn with_max_coins(mut self, max_coins: u32) -> Self {
        self.max_coins = Some(max_coins);
        self
    }

    pub(crate) fn with_speed(mut self, speed: f32) -> Self {
        self.speed = Some(speed);
        self
    }

    pub(crate) fn with_carried_loot(mut self, loot_id: impl Into<String>) -> Self {
        self.carries_loot_id = Some(loot_id.into());
        self
    }

    pub(crate) fn with_loot_chance(mut self, loot_chance: f32) -> Self {
        self.loot_chance = Some(loot_chance);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub(crate) enum SpawnError {
    #[error("enemy path must contain at least one point")]
    EmptyPath,
    #[error("enemy maxHealth must be finite and > 0, got {0}")]
    InvalidMaxHealth(f32),
    #[error("enemy speed must be finite and > 0, got {0}")]
    InvalidSpeed(f32),
    #[error("enemy lootChance must be within [0, 1], got {0}")]
    InvalidLootChance(f32),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum TravelState {
    Traveling,
    Arrived,
}

/// Loot announced by a defeat. `id: None` asks the spawn site to roll a
/// concrete definition from the catalog.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct LootReference {
    pub(crate) id: Option<String>,
    pub(crate) pos: Vec3,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct DefeatPayout {
    pub(crate) coins: u32,
    pub(crate) loot: Option<LootReference>,
}

#[derive(Debug, Clone)]
pub(crate) struct Enemy {
    id: EnemyId,
    path: Vec<GridCoord>,
    current_step: usize,
    progress: f32,
    speed: f32,
    health: f32,
    max_health: f32,
    coin_drop: u32,
    carries_loot_id: Option<String>,
    loot_chance: f32,
    has_dropped_loot: bool,
    defeated: bool,
    proxy: VisualProxy,
}

impl Enemy {
    /// The coin drop is rolled here, uniformly in `[0, max_coins]`.
    pub(crate) fn spawn<R: Rng + ?Sized>(
        id: EnemyId,
        proxy_id: ProxyId,
        config: SpawnConfig,
        rng: &mut R,
    ) -> Result<Self, SpawnError> {
        if config.path.is_empty() {
            return Err(SpawnError::EmptyPath);
        }
        let max_health = config.max_health.unwrap_or(DEFAULT_MAX_HEALTH);
        if !max_health.is_finite() || max_health <= 0.0 {
            return Err(SpawnError::InvalidMaxHealth(max_health));
        }
        let speed = config.speed.unwrap_or(DEFAULT_SPEED);
        if !speed.is_finite() || speed <= 0.0 {
            return Err(SpawnError::InvalidSpeed(speed));
        }
        let loot_chance = config.loot_chance.unwrap_or(DEFAULT_LOOT_CHANCE);
        if !(0.0..=1.0).contains(&loot_chance) {
            return Err(SpawnError::InvalidLootChance(loot_chance));
        }
        let max_coins = config.max_coins.unwrap_or(DEFAULT_MAX_COINS);

        let start = grid_to_world(config.path[0].to_vec2());
        Ok(Self {
            id,
            path: config.path,
            current_step: 0,
            progress: 0.0,
            speed,
            health: max_health,
            max_health,
            coin_drop: rng.gen_range(0..=max_coins),
            carries_loot_id: config.carries_loot_id,
            loot_chance,
            has_dropped_loot: false,
            defeated: false,
            proxy: VisualProxy::new(proxy_id, ProxyKind::Enemy, "enemy", start),
        })
    }

    pub(crate) fn id(&self) -> EnemyId {
        self.id
    }

    pub(crate) fn proxy(&self) -> &VisualProxy {
        &self.proxy
    }

    #[cfg(test)]
    pub(crate) fn current_step(&self) -> usize {
        self.current_step
    }

    #[cfg(test)]
    pub(crate) fn progress(&self) -> f32 {
        self.progress
    }

    pub(crate) fn health(&self) -> f32 {
        self.health
    }

    pub(crate) fn max_health(&self) -> f32 {
        self.max_health
    }

    pub(crate) fn coin_drop(&self) -> u32 {
        self.coin_drop
    }

    pub(crate) fn is_alive(&self) -> bool {
        !self.defeated
    }

    #[cfg(test)]
    pub(crate) fn has_dropped_loot(&self) -> bool {
        self.has_dropped_loot
    }

    pub(crate) fn travel_state(&self) -> TravelState {
        if self.current_step + 1 < self.path.len() {
            TravelState::Traveling
        } else {
            TravelState::Arrived
        }
    }

    /// Interpolated position in grid units.
    pub(crate) fn grid_position(&self) -> Vec2 {
        let here = self.path[self.current_step].to_vec2();
        match self.path.get(self.current_step + 1) {
            Some(next) => here.lerp(next.to_vec2(), self.progress),
            None => here,
        }
    }

    pub(crate) fn world_position(&self) -> Vec3 {
        grid_to_world(self.grid_position())
    }

    /// One movement step. Reaching the next waypoint drops any overshoot:
    /// progress restarts at zero on the following segment.
    pub(crate) fn advance(&mut self, delta_factor: f32) {
        if self.defeated || self.travel_state() == TravelState::Arrived {
            return;
        }

        self.progress += self.speed * delta_factor;
        if self.progress >= 1.0 {
            self.progress = 0.0;
            self.current_step += 1;
        }
        debug_assert!(
            (0.0..1.0).contains(&self.progress),
            "progress {} left unresolved",
            self.progress
        );
        self.proxy.transform.position = self.world_position();
    }

    /// Subtracts `amount`, flooring health at zero. Returns the defeat
    /// payout exactly once: on the call that brings health to zero. Calls
    /// on an already defeated enemy are no-ops.
    pub(crate) fn apply_damage<R: Rng + ?Sized>(
        &mut self,
        amount: f32,
        rng: &mut R,
    ) -> Option<DefeatPayout> {
        debug_assert!(amount >= 0.0, "negative damage {amount}");
        if self.defeated {
            return None;
        }

        self.health = (self.health - amount).max(0.0);
        if self.health > 0.0 {
            return None;
        }
        self.defeated = true;
        Some(self.resolve_defeat(rng))
    }

    fn resolve_defeat<R: Rng + ?Sized>(&mut self, rng: &mut R) -> DefeatPayout {
        let loot = if self.has_dropped_loot {
            None
        } else {
            self.has_dropped_loot = true;
            let pos = self.world_position();
            if let Some(id) = &self.carries_loot_id {
                Some(LootReference {
                    id: Some(id.clone()),
                    pos,
                })
            } else if self.loot_chance > 0.0 && rng.gen::<f32>() < self.loot_chance {
                Some(LootReference { id: None, pos })
            } else {
                None
            }
        };

        DefeatPayout {
            coins: self.coin_drop,
            loot,
        }
    }
}
