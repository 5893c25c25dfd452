use bastion_engine::Vec2;

pub(crate) const DEFAULT_PLAYER_MAX_HEALTH: f32 = 100.0;

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Player {
    pub(crate) position: Vec2,
    health: f32,
    max_health: f32,
}

impl Player {
    pub(crate) fn new(position: Vec2, max_health: f32) -> Self {
        debug_assert!(max_health > 0.0);
        Self {
            position,
            health: max_health,
            max_health,
        }
    }

    pub(crate) fn health(&self) -> f32 {
        self.health
    }

    pub(crate) fn max_health(&self) -> f32 {
        self.max_health
    }

    /// Healing never lifts health above `max_health`.
    pub(crate) fn heal(&mut self, amount: f32) {
        self.health = (self.health + amount).min(self.max_health);
    }

    pub(crate) fn take_damage(&mut self, amount: f32) {
        self.health = (self.health - amount).max(0.0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn heal_clamps_to_max() {
        let mut player = Player::new(Vec2::default(), 10.0);
        player.take_damage(0.02);
        player.heal(0.05);
        assert_eq!(player.health(), player.max_health());
    }

    #[test]
    fn damage_floors_at_zero() {
        let mut player = Player::new(Vec2::default(), 3.0);
        player.take_damage(5.0);
        assert_eq!(player.health(), 0.0);
    }
}
