use std::collections::{BTreeMap, HashMap};
use std::fmt;

use rand::Rng;
use thiserror::Error;

use crate::app::Vec2;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct GridCoord {
    pub x: u32,
    pub y: u32,
}

impl GridCoord {
    pub const fn new(x: u32, y: u32) -> Self {
        Self { x, y }
    }

    pub fn to_vec2(self) -> Vec2 {
        Vec2 {
            x: self.x as f32,
            y: self.y as f32,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LootTargetKind {
    Player,
    TowerIndividual,
}

impl LootTargetKind {
    pub fn as_token(self) -> &'static str {
        match self {
            Self::Player => "Player",
            Self::TowerIndividual => "TowerIndividual",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EffectOp {
    Multiply,
    Add,
}

impl EffectOp {
    /// Neutral element for folding effects of this kind together.
    pub fn identity(self) -> f32 {
        match self {
            Self::Multiply => 1.0,
            Self::Add => 0.0,
        }
    }

    pub fn fold(self, accumulated: f32, value: f32) -> f32 {
        match self {
            Self::Multiply => accumulated * value,
            Self::Add => accumulated + value,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum EffectStat {
    Damage,
    FireRate,
    PlayerDamage,
    GoldPercent,
}

impl EffectStat {
    pub fn from_token(token: &str) -> Option<Self> {
        match token {
            "damage" => Some(Self::Damage),
            "fireRate" => Some(Self::FireRate),
            "playerDamage" => Some(Self::PlayerDamage),
            "goldPercent" => Some(Self::GoldPercent),
            _ => None,
        }
    }

    pub fn as_token(self) -> &'static str {
        match self {
            Self::Damage => "damage",
            Self::FireRate => "fireRate",
            Self::PlayerDamage => "playerDamage",
            Self::GoldPercent => "goldPercent",
        }
    }

    /// Which kind of entity can carry a modifier for this stat.
    pub fn target_kind(self) -> LootTargetKind {
        match self {
            Self::Damage | Self::FireRate => LootTargetKind::TowerIndividual,
            Self::PlayerDamage | Self::GoldPercent => LootTargetKind::Player,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LootEffect {
    pub op: EffectOp,
    pub stat: EffectStat,
    pub value: f32,
}

impl fmt::Display for LootEffect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let prefix = match self.op {
            EffectOp::Multiply => "mul",
            EffectOp::Add => "add",
        };
        write!(f, "{}_{}={}", prefix, self.stat.as_token(), self.value)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Rarity {
    Common,
    Uncommon,
    Rare,
    Epic,
}

impl Rarity {
    pub fn from_token(token: &str) -> Option<Self> {
        match token {
            "Common" => Some(Self::Common),
            "Uncommon" => Some(Self::Uncommon),
            "Rare" => Some(Self::Rare),
            "Epic" => Some(Self::Epic),
            _ => None,
        }
    }

    /// Relative weight of one definition of this rarity in a chance drop.
    pub fn drop_weight(self) -> u32 {
        match self {
            Self::Common => 60,
            Self::Uncommon => 30,
            Self::Rare => 9,
            Self::Epic => 1,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct LootDef {
    pub id: String,
    pub label: String,
    pub description: Option<String>,
    pub target: LootTargetKind,
    pub effect: LootEffect,
    /// Most entries of this effect that count toward one entity's active
    /// modifier. `None` is uncapped.
    pub stack_cap: Option<u32>,
    pub rarity: Rarity,
    pub persistent: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CatalogError {
    #[error("loot definition not found: {id}")]
    NotFound { id: String },
}

#[derive(Debug, Default, Clone)]
pub struct LootCatalog {
    defs: BTreeMap<String, LootDef>,
}

impl LootCatalog {
    pub fn from_defs(defs: impl IntoIterator<Item = LootDef>) -> Self {
        Self {
            defs: defs.into_iter().map(|def| (def.id.clone(), def)).collect(),
        }
    }

    pub fn get(&self, id: &str) -> Result<&LootDef, CatalogError> {
        self.defs.get(id).ok_or_else(|| CatalogError::NotFound { id: id.to_string() })
    }

    pub fn contains(&self, id: &str) -> bool {
        self.defs.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.defs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.defs.is_empty()
    }

    /// Picks a concrete definition for a chance drop that did not name one.
    /// Each definition is weighted by [`Rarity::drop_weight`], so two
    /// uncommon items are together as likely as one item at twice the
    /// weight. Non-persistent definitions are never rolled.
    pub fn roll_random<R: Rng + ?Sized>(&self, rng: &mut R) -> Option<&LootDef> {
        let total: u32 = self
            .droppable()
            .map(|def| def.rarity.drop_weight())
            .sum();
        if total == 0 {
            return None;
        }

        let mut roll = rng.gen_range(0..total);
        for def in self.droppable() {
            let weight = def.rarity.drop_weight();
            if roll < weight {
                return Some(def);
            }
            roll -= weight;
        }
        None
    }

    fn droppable(&self) -> impl Iterator<Item = &LootDef> {
        self.defs.values().filter(|def| def.persistent)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct EnemyArchetype {
    pub def_name: String,
    pub max_health: f32,
    pub max_coins: u32,
    pub speed: f32,
    pub carries_loot: Option<String>,
    pub loot_chance: f32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PathDef {
    pub def_name: String,
    pub points: Vec<GridCoord>,
}

#[derive(Debug, Default, Clone)]
pub struct ContentDatabase {
    loot: LootCatalog,
    enemies: Vec<EnemyArchetype>,
    enemy_index_by_name: HashMap<String, usize>,
    paths: BTreeMap<String, PathDef>,
}

impl ContentDatabase {
    pub(crate) fn new(
        loot: LootCatalog,
        enemies: Vec<EnemyArchetype>,
        paths: Vec<PathDef>,
    ) -> Self {
        let enemy_index_by_name = enemies
            .iter()
            .enumerate()
            .map(|(idx, def)| (def.def_name.clone(), idx))
            .collect();
        Self {
            loot,
            enemies,
            enemy_index_by_name,
            paths: paths
                .into_iter()
                .map(|path| (path.def_name.clone(), path))
                .collect(),
        }
    }

    pub fn loot_catalog(&self) -> &LootCatalog {
        &self.loot
    }

    pub fn into_loot_catalog(self) -> LootCatalog {
        self.loot
    }

    pub fn enemy(&self, def_name: &str) -> Option<&EnemyArchetype> {
        self.enemy_index_by_name
            .get(def_name)
            .and_then(|idx| self.enemies.get(*idx))
    }

    pub fn enemies(&self) -> &[EnemyArchetype] {
        &self.enemies
    }

    pub fn path(&self, def_name: &str) -> Option<&PathDef> {
        self.paths.get(def_name)
    }
}

#[cfg(test)]
mod tests {
    use rand::rngs::mock::StepRng;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    use super::*;

    fn def(id: &str, rarity: Rarity) -> LootDef {
        LootDef {
            id: id.to_string(),
            label: id.to_string(),
            description: None,
            target: LootTargetKind::Player,
            effect: LootEffect {
                op: EffectOp::Add,
                stat: EffectStat::GoldPercent,
                value: 0.2,
            },
            stack_cap: None,
            rarity,
            persistent: true,
        }
    }

    #[test]
    fn get_unknown_id_is_not_found() {
        let catalog = LootCatalog::from_defs([def("gold_hoard", Rarity::Uncommon)]);
        assert!(catalog.get("gold_hoard").is_ok());
        assert_eq!(
            catalog.get("missing"),
            Err(CatalogError::NotFound {
                id: "missing".to_string()
            })
        );
    }

    #[test]
    fn roll_on_empty_catalog_yields_nothing() {
        let catalog = LootCatalog::default();
        let mut rng = StdRng::seed_from_u64(7);
        assert!(catalog.roll_random(&mut rng).is_none());
    }

    #[test]
    fn roll_skips_non_persistent_defs() {
        let mut temporary = def("a_temp", Rarity::Common);
        temporary.persistent = false;
        let catalog = LootCatalog::from_defs([temporary, def("b_keep", Rarity::Epic)]);
        let mut rng = StdRng::seed_from_u64(3);
        for _ in 0..20 {
            let rolled = catalog.roll_random(&mut rng).expect("rolled");
            assert_eq!(rolled.id, "b_keep");
        }
    }

    #[test]
    fn roll_with_zero_draw_picks_first_weighted_entry() {
        let catalog =
            LootCatalog::from_defs([def("b_rare", Rarity::Rare), def("a_common", Rarity::Common)]);
        let mut rng = StepRng::new(0, 0);
        let rolled = catalog.roll_random(&mut rng).expect("rolled");
        assert_eq!(rolled.id, "a_common");
    }

    #[test]
    fn roll_favors_common_over_rare() {
        let catalog =
            LootCatalog::from_defs([def("common", Rarity::Common), def("rare", Rarity::Rare)]);
        let mut rng = StdRng::seed_from_u64(11);
        let mut common = 0;
        for _ in 0..2000 {
            if catalog.roll_random(&mut rng).expect("rolled").id == "common" {
                common += 1;
            }
        }
        assert!(common > 1500, "common rolled {common} times");
    }

    #[test]
    fn effect_fold_respects_op() {
        assert!((EffectOp::Multiply.fold(2.0, 1.5) - 3.0).abs() < f32::EPSILON);
        assert!((EffectOp::Add.fold(0.2, 0.2) - 0.4).abs() < 1e-6);
        assert!((EffectOp::Multiply.identity() - 1.0).abs() < f32::EPSILON);
    }

    #[test]
    fn effect_displays_as_its_content_token() {
        let effect = LootEffect {
            op: EffectOp::Multiply,
            stat: EffectStat::Damage,
            value: 1.12,
        };
        assert_eq!(effect.to_string(), "mul_damage=1.12");
    }
}
