use std::collections::{BTreeMap, HashMap};

use bastion_engine::{
    BlobStorage, CatalogError, EffectOp, EffectStat, LootCatalog, LootEffect, LootTargetKind,
};
use thiserror::Error;
use tracing::{info, warn};

use super::persistence::{PersistedState, PersistenceStore};
use super::tower::TowerKey;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub(crate) enum LootTarget {
    Player,
    Tower(TowerKey),
}

/// Active modifiers of one entity. Multiplicative and additive effects are
/// kept apart so an unset stat reads as its neutral value.
#[derive(Debug, Clone, Default, PartialEq)]
pub(crate) struct ModifierSet {
    multipliers: BTreeMap<EffectStat, f32>,
    bonuses: BTreeMap<EffectStat, f32>,
}

impl ModifierSet {
    /// Defaults to 1 when no multiplicative effect is active.
    pub(crate) fn multiplier(&self, stat: EffectStat) -> f32 {
        self.multipliers
            .get(&stat)
            .copied()
            .unwrap_or(EffectOp::Multiply.identity())
    }

    /// Defaults to 0 when no additive effect is active.
    pub(crate) fn bonus(&self, stat: EffectStat) -> f32 {
        self.bonuses
            .get(&stat)
            .copied()
            .unwrap_or(EffectOp::Add.identity())
    }

    #[cfg(test)]
    pub(crate) fn is_empty(&self) -> bool {
        self.multipliers.is_empty() && self.bonuses.is_empty()
    }

    fn fold(&mut self, effect: LootEffect) {
        let slot = match effect.op {
            EffectOp::Multiply => &mut self.multipliers,
            EffectOp::Add => &mut self.bonuses,
        };
        let current = slot.entry(effect.stat).or_insert(effect.op.identity());
        *current = effect.op.fold(*current, effect.value);
    }
}

/// Rebuilds the active modifiers of one entity from its upgrade history.
/// Entries past an effect's stack cap stay in the history but add nothing;
/// ids the catalog no longer knows, or that belong to the other target
/// class, are skipped.
pub(crate) fn replay_modifiers(
    catalog: &LootCatalog,
    target_kind: LootTargetKind,
    history: &[String],
) -> ModifierSet {
    let mut modifiers = ModifierSet::default();
    let mut applied_by_effect = HashMap::<(EffectOp, EffectStat), u32>::new();

    for id in history {
        let def = match catalog.get(id) {
            Ok(def) => def,
            Err(error) => {
                warn!(loot_id = %id, error = %error, "replay_skipped_unknown_loot");
                continue;
            }
        };
        if def.target != target_kind {
            warn!(
                loot_id = %id,
                expected = target_kind.as_token(),
                actual = def.target.as_token(),
                "replay_skipped_wrong_target"
            );
            continue;
        }

        let applied = applied_by_effect
            .entry((def.effect.op, def.effect.stat))
            .or_insert(0);
        if def.stack_cap.is_some_and(|cap| *applied >= cap) {
            continue;
        }
        *applied += 1;
        modifiers.fold(def.effect);
    }

    modifiers
}

#[derive(Debug, Clone, PartialEq, Error)]
pub(crate) enum ProgressionError {
    #[error(transparent)]
    UnknownLoot(#[from] CatalogError),
    #[error("loot '{loot_id}' upgrades an individual tower and needs a tower target")]
    TowerTargetRequired { loot_id: String },
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct AppliedLoot {
    pub(crate) target: LootTarget,
    pub(crate) modifiers: ModifierSet,
    /// False when the loot only lives in memory for now: the save failed,
    /// or the definition is not persistent.
    pub(crate) durable: bool,
}

/// Turns collected loot into permanent upgrades. Owns the persisted
/// history, and derives every active modifier set from it.
pub(crate) struct ProgressionEngine<S> {
    catalog: LootCatalog,
    store: PersistenceStore<S>,
    state: PersistedState,
    session_only: PersistedState,
    player_modifiers: ModifierSet,
}

impl<S: BlobStorage> ProgressionEngine<S> {
    pub(crate) fn new(catalog: LootCatalog, store: PersistenceStore<S>) -> Self {
        let state = store.load();
        let mut engine = Self {
            catalog,
            store,
            state,
            session_only: PersistedState::default(),
            player_modifiers: ModifierSet::default(),
        };
        engine.player_modifiers = engine.recompute(&LootTarget::Player);
        info!(
            loot_defs = engine.catalog.len(),
            player_upgrades = engine.state.player.upgrades.len(),
            "progression_ready"
        );
        engine
    }

    pub(crate) fn catalog(&self) -> &LootCatalog {
        &self.catalog
    }

    pub(crate) fn state(&self) -> &PersistedState {
        &self.state
    }

    pub(crate) fn player_modifiers(&self) -> &ModifierSet {
        &self.player_modifiers
    }

    pub(crate) fn tower_modifiers(&self, tower: &TowerKey) -> ModifierSet {
        self.recompute(&LootTarget::Tower(tower.clone()))
    }

    /// Records `def_id` against the effective target, persists the history
    /// and returns the target's recomputed modifiers. Player loot always
    /// lands on the player, whatever `target` says.
    pub(crate) fn apply_loot(
        &mut self,
        target: &LootTarget,
        def_id: &str,
    ) -> Result<AppliedLoot, ProgressionError> {
        let def = self.catalog.get(def_id)?;
        let persistent = def.persistent;
        let effect = def.effect;
        let effective = match (def.target, target) {
            (LootTargetKind::Player, _) => LootTarget::Player,
            (LootTargetKind::TowerIndividual, LootTarget::Tower(key)) => {
                LootTarget::Tower(key.clone())
            }
            (LootTargetKind::TowerIndividual, LootTarget::Player) => {
                return Err(ProgressionError::TowerTargetRequired {
                    loot_id: def_id.to_string(),
                })
            }
        };

        let durable = if persistent {
            history_mut(&mut self.state, &effective).push(def_id.to_string());
            self.store.save(&self.state)
        } else {
            history_mut(&mut self.session_only, &effective).push(def_id.to_string());
            false
        };

        let modifiers = self.recompute(&effective);
        if effective == LootTarget::Player {
            self.player_modifiers = modifiers.clone();
        }
        info!(
            loot_id = def_id,
            target = ?effective,
            effect = %effect,
            durable,
            "loot_applied"
        );

        Ok(AppliedLoot {
            target: effective,
            modifiers,
            durable,
        })
    }

    fn recompute(&self, target: &LootTarget) -> ModifierSet {
        let (kind, persisted, session) = match target {
            LootTarget::Player => (
                LootTargetKind::Player,
                self.state.player.upgrades.as_slice(),
                self.session_only.player.upgrades.as_slice(),
            ),
            LootTarget::Tower(key) => (
                LootTargetKind::TowerIndividual,
                self.state.tower_history(key.as_str()),
                self.session_only.tower_history(key.as_str()),
            ),
        };
        if session.is_empty() {
            return replay_modifiers(&self.catalog, kind, persisted);
        }
        let combined = persisted
            .iter()
            .chain(session)
            .cloned()
            .collect::<Vec<_>>();
        replay_modifiers(&self.catalog, kind, &combined)
    }
}

fn history_mut<'a>(state: &'a mut PersistedState, target: &LootTarget) -> &'a mut Vec<String> {
    match target {
        LootTarget::Player => &mut state.player.upgrades,
        LootTarget::Tower(key) => state.towers.entry(key.as_str().to_string()).or_default(),
    }
}
