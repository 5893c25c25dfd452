use std::fmt;

use bastion_engine::{grid_to_world, EffectStat, GridCoord, ProxyId, ProxyKind, Vec2, VisualProxy};
use rand::RngCore;

use super::enemy::{DefeatPayout, Enemy, EnemyId};
use super::player::Player;
use super::progression::ModifierSet;

pub(crate) const HEALER_RANGE: f32 = 3.0;
pub(crate) const HEALER_HEAL_PER_TICK: f32 = 0.05;
pub(crate) const MAGE_RANGE: f32 = 3.0;
pub(crate) const MAGE_DAMAGE_PER_TICK: f32 = 0.1;
pub(crate) const ARCHER_RANGE: f32 = 4.0;
pub(crate) const ARCHER_DAMAGE_PER_TICK: f32 = 0.2;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) enum TowerKind {
    Healer,
    Mage,
    Archer,
}

impl TowerKind {
    pub(crate) fn range(self) -> f32 {
        match self {
            Self::Healer => HEALER_RANGE,
            Self::Mage => MAGE_RANGE,
            Self::Archer => ARCHER_RANGE,
        }
    }

    fn debug_name(self) -> &'static str {
        match self {
            Self::Healer => "healer_tower",
            Self::Mage => "mage_tower",
            Self::Archer => "archer_tower",
        }
    }
}

/// Identifies a tower in the persisted upgrade history. Towers are
/// permanent and one tile holds at most one tower, so the tile is the key.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub(crate) struct TowerKey(String);

impl TowerKey {
    pub(crate) fn for_tile(position: GridCoord) -> Self {
        Self(format!("tower_{}_{}", position.x, position.y))
    }

    #[cfg(test)]
    pub(crate) fn from_raw(raw: &str) -> Self {
        Self(raw.to_string())
    }

    pub(crate) fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TowerKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Where a tower stands and how far it reaches, in grid units.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct Reach {
    pub(crate) origin: Vec2,
    pub(crate) range: f32,
}

impl Reach {
    pub(crate) fn distance_to(&self, point: Vec2) -> f32 {
        self.origin.distance(point)
    }

    pub(crate) fn contains(&self, point: Vec2) -> bool {
        self.distance_to(point) <= self.range
    }
}

/// What a tower sees and may change during one tick. Defeats caused by the
/// tower are appended to `defeats` in the order they happen.
pub(crate) struct TowerContext<'a> {
    pub(crate) player: &'a mut Player,
    pub(crate) enemies: &'a mut [Enemy],
    pub(crate) rng: &'a mut dyn RngCore,
    pub(crate) defeats: &'a mut Vec<(EnemyId, DefeatPayout)>,
}

#[derive(Debug, Clone)]
pub(crate) struct Tower {
    key: TowerKey,
    position: GridCoord,
    level: u32,
    kind: TowerKind,
    modifiers: ModifierSet,
    proxy: VisualProxy,
}

impl Tower {
    pub(crate) fn new(
        kind: TowerKind,
        position: GridCoord,
        modifiers: ModifierSet,
        proxy_id: ProxyId,
    ) -> Self {
        Self {
            key: TowerKey::for_tile(position),
            position,
            level: 1,
            kind,
            modifiers,
            proxy: VisualProxy::new(
                proxy_id,
                ProxyKind::Tower,
                kind.debug_name(),
                grid_to_world(position.to_vec2()),
            ),
        }
    }

    pub(crate) fn key(&self) -> &TowerKey {
        &self.key
    }

    pub(crate) fn kind(&self) -> TowerKind {
        self.kind
    }

    pub(crate) fn level(&self) -> u32 {
        self.level
    }

    pub(crate) fn position(&self) -> GridCoord {
        self.position
    }

    pub(crate) fn proxy(&self) -> &VisualProxy {
        &self.proxy
    }

    pub(crate) fn modifiers(&self) -> &ModifierSet {
        &self.modifiers
    }

    pub(crate) fn set_modifiers(&mut self, modifiers: ModifierSet) {
        self.modifiers = modifiers;
    }

    pub(crate) fn reach(&self) -> Reach {
        Reach {
            origin: self.position.to_vec2(),
            range: self.kind.range(),
        }
    }

    fn damage_multiplier(&self) -> f32 {
        self.modifiers.multiplier(EffectStat::Damage)
    }

    /// Runs this tower's effect for one tick. Targets out of range are
    /// silently ignored.
    pub(crate) fn apply(&self, ctx: &mut TowerContext<'_>) {
        match self.kind {
            TowerKind::Healer => self.heal_player(ctx),
            TowerKind::Mage => self.blast_enemies_in_range(ctx),
            TowerKind::Archer => self.shoot_nearest_enemy(ctx),
        }
    }

    fn heal_player(&self, ctx: &mut TowerContext<'_>) {
        if self.reach().contains(ctx.player.position) {
            ctx.player.heal(HEALER_HEAL_PER_TICK);
        }
    }

    /// Every live enemy in range takes the full hit.
    fn blast_enemies_in_range(&self, ctx: &mut TowerContext<'_>) {
        let reach = self.reach();
        let damage = MAGE_DAMAGE_PER_TICK * self.damage_multiplier();
        for enemy in ctx.enemies.iter_mut() {
            if !enemy.is_alive() || !reach.contains(enemy.grid_position()) {
                continue;
            }
            if let Some(payout) = enemy.apply_damage(damage, &mut *ctx.rng) {
                ctx.defeats.push((enemy.id(), payout));
            }
        }
    }

    /// The nearest live enemy is chosen first, range is checked after.
    fn shoot_nearest_enemy(&self, ctx: &mut TowerContext<'_>) {
        let reach = self.reach();
        let Some((index, distance)) = select_nearest(reach.origin, ctx.enemies) else {
            return;
        };
        if distance > reach.range {
            return;
        }
        let damage = ARCHER_DAMAGE_PER_TICK * self.damage_multiplier();
        let enemy = &mut ctx.enemies[index];
        if let Some(payout) = enemy.apply_damage(damage, &mut *ctx.rng) {
            ctx.defeats.push((enemy.id(), payout));
        }
    }
}

/// Index and distance of the live enemy closest to `origin`. Ties keep the
/// earliest enemy in slice order.
pub(crate) fn select_nearest(origin: Vec2, enemies: &[Enemy]) -> Option<(usize, f32)> {
    let mut best: Option<(usize, f32)> = None;
    for (index, enemy) in enemies.iter().enumerate() {
        if !enemy.is_alive() {
            continue;
        }
        let distance = origin.distance(enemy.grid_position());
        match best {
            Some((_, best_distance)) if distance >= best_distance => {}
            _ => best = Some((index, distance)),
        }
    }
    best
}
