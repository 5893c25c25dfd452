use bastion_engine::{ProxyId, ProxyKind, Vec3, VisualProxy};

pub(crate) const PICKUP_HOVER_HEIGHT: f32 = 0.5;
const BOB_FREQUENCY: f32 = 2.0;
const BOB_AMPLITUDE: f32 = 0.002;
const SPIN_PER_UPDATE: f32 = 0.02;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub(crate) struct PickupId(pub(crate) u64);

/// A dropped loot item waiting on the field. It only animates; collecting
/// it is the simulation's job.
#[derive(Debug, Clone)]
pub(crate) struct LootPickup {
    id: PickupId,
    def_id: String,
    position: Vec3,
    collected: bool,
    elapsed: f32,
    proxy: VisualProxy,
}

impl LootPickup {
    pub(crate) fn new(id: PickupId, proxy_id: ProxyId, def_id: String, drop_pos: Vec3) -> Self {
        let position = Vec3::new(drop_pos.x, drop_pos.y + PICKUP_HOVER_HEIGHT, drop_pos.z);
        Self {
            id,
            def_id,
            position,
            collected: false,
            elapsed: 0.0,
            proxy: VisualProxy::new(proxy_id, ProxyKind::Loot, "loot_pickup", position),
        }
    }

    pub(crate) fn id(&self) -> PickupId {
        self.id
    }

    pub(crate) fn def_id(&self) -> &str {
        &self.def_id
    }

    pub(crate) fn position(&self) -> Vec3 {
        self.position
    }

    pub(crate) fn is_collected(&self) -> bool {
        self.collected
    }

    pub(crate) fn mark_collected(&mut self) {
        self.collected = true;
    }

    pub(crate) fn proxy(&self) -> &VisualProxy {
        &self.proxy
    }

    /// Bob and spin. Collected pickups stop animating.
    pub(crate) fn update(&mut self, dt: f32) {
        if self.collected {
            return;
        }
        self.elapsed += dt;
        self.position.y += (self.elapsed * BOB_FREQUENCY).sin() * BOB_AMPLITUDE;
        self.proxy.transform.position = self.position;
        self.proxy.transform.rotation_y_radians += SPIN_PER_UPDATE;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pickup() -> LootPickup {
        LootPickup::new(
            PickupId(1),
            ProxyId(7),
            "powercore_module".to_string(),
            Vec3::new(2.0, 0.5, -3.0),
        )
    }

    #[test]
    fn spawns_hovering_above_drop_point() {
        let pickup = pickup();
        assert_eq!(pickup.position(), Vec3::new(2.0, 1.0, -3.0));
        assert_eq!(pickup.proxy().transform.position, pickup.position());
        assert_eq!(pickup.proxy().kind, ProxyKind::Loot);
        assert!(!pickup.is_collected());
    }

    #[test]
    fn update_bobs_and_spins_proxy() {
        let mut pickup = pickup();
        pickup.update(0.5);
        let expected_y = 1.0 + (1.0f32).sin() * BOB_AMPLITUDE;
        assert!((pickup.position().y - expected_y).abs() < 1e-6);
        assert!((pickup.proxy().transform.rotation_y_radians - SPIN_PER_UPDATE).abs() < 1e-6);
        assert_eq!(pickup.position().x, 2.0);
    }

    #[test]
    fn collected_pickup_is_frozen() {
        let mut pickup = pickup();
        pickup.mark_collected();
        pickup.update(0.5);
        assert_eq!(pickup.position(), Vec3::new(2.0, 1.0, -3.0));
        assert_eq!(pickup.proxy().transform.rotation_y_radians, 0.0);
    }
}
