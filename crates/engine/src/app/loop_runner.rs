use tracing::{debug, info};

use super::scene::{ProxyRegistry, Scene, SceneCommand};

#[derive(Debug, Clone)]
pub struct LoopConfig {
    pub target_tps: u32,
    pub max_ticks: u64,
    pub summary_log_interval_ticks: u64,
}

impl Default for LoopConfig {
    fn default() -> Self {
        Self {
            target_tps: 60,
            max_ticks: 3600,
            summary_log_interval_ticks: 600,
        }
    }
}

impl LoopConfig {
    pub fn fixed_dt_seconds(&self) -> f32 {
        1.0 / self.target_tps.max(1) as f32
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoopSummary {
    pub ticks_run: u64,
    pub stopped_by_scene: bool,
}

/// Drives `scene` for at most `config.max_ticks` fixed steps without a
/// window or wall clock. Every tick runs to completion before the next one
/// starts, and pending proxy changes are applied between ticks.
pub fn run_headless(
    config: &LoopConfig,
    scene: &mut dyn Scene,
    world: &mut ProxyRegistry,
) -> LoopSummary {
    let fixed_dt_seconds = config.fixed_dt_seconds();
    info!(
        target_tps = config.target_tps,
        max_ticks = config.max_ticks,
        fixed_dt_seconds,
        "headless_loop_start"
    );

    scene.load(world);
    world.apply_pending();

    let mut ticks_run = 0u64;
    let mut stopped_by_scene = false;
    while ticks_run < config.max_ticks {
        let command = scene.update(fixed_dt_seconds, world);
        world.apply_pending();
        ticks_run += 1;

        if config.summary_log_interval_ticks > 0
            && ticks_run % config.summary_log_interval_ticks == 0
        {
            debug!(
                tick = ticks_run,
                proxy_count = world.proxy_count(),
                "headless_loop_progress"
            );
        }

        if command == SceneCommand::Stop {
            stopped_by_scene = true;
            break;
        }
    }

    scene.unload(world);
    world.apply_pending();

    info!(ticks_run, stopped_by_scene, "headless_loop_finished");
    LoopSummary {
        ticks_run,
        stopped_by_scene,
    }
}
