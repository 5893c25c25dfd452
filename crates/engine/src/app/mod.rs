mod loop_runner;
mod scene;

pub use loop_runner::{run_headless, LoopConfig, LoopSummary};
pub use scene::{
    grid_to_world, world_to_grid, ProxyId, ProxyIdAllocator, ProxyKind, ProxyRegistry, ProxySink,
    Scene, SceneCommand, Transform, Vec2, Vec3, VisualProxy, GRID_SIZE, TILE_SIZE,
};
