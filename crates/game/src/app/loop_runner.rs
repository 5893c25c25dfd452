use std::process::ExitCode;

use bastion_engine::{run_headless, ProxyRegistry};
use tracing::info;

use super::bootstrap::AppWiring;

pub(crate) fn run(mut app: AppWiring) -> ExitCode {
    let mut world = ProxyRegistry::default();
    let summary = run_headless(&app.config, &mut app.scene, &mut world);

    let stats = app.scene.stats();
    let sim = app.scene.simulation();
    info!(
        ticks_run = summary.ticks_run,
        stopped_by_scene = summary.stopped_by_scene,
        defeated = stats.defeated,
        arrived = stats.arrived,
        pickups_collected = stats.pickups_collected,
        coins = sim.coins(),
        player_upgrades = sim.progression().state().player.upgrades.len(),
        tower_histories = sim.progression().state().towers.len(),
        "run_summary"
    );

    ExitCode::SUCCESS
}
