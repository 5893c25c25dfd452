/// Side length of the square play grid, in tiles.
pub const GRID_SIZE: u32 = 50;
pub const TILE_SIZE: f32 = 1.0;
/// Height at which ground units are anchored in world space.
const GROUND_ANCHOR_Y: f32 = 0.5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SceneCommand {
    None,
    Stop,
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Vec2 {
    pub x: f32,
    pub y: f32,
}

impl Vec2 {
    pub const fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    pub fn distance(self, other: Vec2) -> f32 {
        let dx = other.x - self.x;
        let dy = other.y - self.y;
        (dx * dx + dy * dy).sqrt()
    }

    pub fn lerp(self, end: Vec2, t: f32) -> Vec2 {
        Vec2 {
            x: self.x + (end.x - self.x) * t,
            y: self.y + (end.y - self.y) * t,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Vec3 {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Vec3 {
    pub const fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }

    /// Distance measured on the ground plane, ignoring height.
    pub fn planar_distance(self, other: Vec3) -> f32 {
        let dx = other.x - self.x;
        let dz = other.z - self.z;
        (dx * dx + dz * dz).sqrt()
    }
}

/// Maps a (possibly fractional) grid position to the center of its tile in
/// world space. Grid `y` becomes world `z`; the grid is centered on the
/// world origin.
pub fn grid_to_world(grid: Vec2) -> Vec3 {
    let half = GRID_SIZE as f32 / 2.0;
    Vec3 {
        x: (grid.x - half) * TILE_SIZE + TILE_SIZE * 0.5,
        y: GROUND_ANCHOR_Y,
        z: (grid.y - half) * TILE_SIZE + TILE_SIZE * 0.5,
    }
}

/// Inverse of [`grid_to_world`] on the ground plane; height is ignored.
pub fn world_to_grid(world: Vec3) -> Vec2 {
    let half = GRID_SIZE as f32 / 2.0;
    Vec2 {
        x: (world.x - TILE_SIZE * 0.5) / TILE_SIZE + half,
        y: (world.z - TILE_SIZE * 0.5) / TILE_SIZE + half,
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Transform {
    pub position: Vec3,
    pub rotation_y_radians: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ProxyId(pub u64);

#[derive(Debug, Default)]
pub struct ProxyIdAllocator {
    next: u64,
}

impl ProxyIdAllocator {
    pub fn allocate(&mut self) -> ProxyId {
        let id = ProxyId(self.next);
        self.next = self.next.saturating_add(1);
        id
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProxyKind {
    Enemy,
    Tower,
    Loot,
}

/// Stand-in for whatever the presentation layer draws for a simulated
/// object. The simulation owns its proxies and only ever pushes them to or
/// pulls them from a [`ProxySink`].
#[derive(Debug, Clone, PartialEq)]
pub struct VisualProxy {
    pub id: ProxyId,
    pub kind: ProxyKind,
    pub debug_name: &'static str,
    pub transform: Transform,
}

impl VisualProxy {
    pub fn new(id: ProxyId, kind: ProxyKind, debug_name: &'static str, position: Vec3) -> Self {
        Self {
            id,
            kind,
            debug_name,
            transform: Transform {
                position,
                rotation_y_radians: 0.0,
            },
        }
    }
}

pub trait ProxySink {
    fn add(&mut self, proxy: &VisualProxy);

    fn remove(&mut self, proxy: &VisualProxy);

    /// Motion update for a proxy that is already attached.
    fn sync(&mut self, _proxy: &VisualProxy) {}
}

/// Headless sink that mirrors attached proxies. Adds and removes are
/// deferred until [`ProxyRegistry::apply_pending`], matching a frame
/// boundary in a real renderer.
#[derive(Debug, Default)]
pub struct ProxyRegistry {
    proxies: Vec<VisualProxy>,
    pending_adds: Vec<VisualProxy>,
    pending_removes: Vec<ProxyId>,
}

impl ProxyRegistry {
    pub fn apply_pending(&mut self) {
        if !self.pending_removes.is_empty() {
            self.pending_removes.sort();
            self.pending_removes.dedup();
            let pending = &self.pending_removes;
            self.proxies
                .retain(|proxy| pending.binary_search(&proxy.id).is_err());
            self.pending_adds
                .retain(|proxy| pending.binary_search(&proxy.id).is_err());
            self.pending_removes.clear();
        }

        self.proxies.append(&mut self.pending_adds);
    }

    pub fn clear(&mut self) {
        self.proxies.clear();
        self.pending_adds.clear();
        self.pending_removes.clear();
    }

    pub fn proxy_count(&self) -> usize {
        self.proxies.len()
    }

    pub fn count_of_kind(&self, kind: ProxyKind) -> usize {
        self.proxies
            .iter()
            .filter(|proxy| proxy.kind == kind)
            .count()
    }

    pub fn find(&self, id: ProxyId) -> Option<&VisualProxy> {
        self.proxies.iter().find(|proxy| proxy.id == id)
    }
}

impl ProxySink for ProxyRegistry {
    fn add(&mut self, proxy: &VisualProxy) {
        self.pending_adds.push(proxy.clone());
    }

    fn remove(&mut self, proxy: &VisualProxy) {
        self.pending_removes.push(proxy.id);
    }

    fn sync(&mut self, proxy: &VisualProxy) {
        if let Some(existing) = self
            .proxies
            .iter_mut()
            .chain(self.pending_adds.iter_mut())
            .find(|existing| existing.id == proxy.id)
        {
            existing.transform = proxy.transform;
        }
    }
}

pub trait Scene {
    fn load(&mut self, world: &mut ProxyRegistry);

    fn update(&mut self, fixed_dt_seconds: f32, world: &mut ProxyRegistry) -> SceneCommand;

    fn unload(&mut self, world: &mut ProxyRegistry);
}
