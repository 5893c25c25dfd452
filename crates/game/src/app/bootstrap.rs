use bastion_engine::{
    compile_content_dir, resolve_app_paths, AppPaths, ContentLoadError, FileBlobStorage,
    LoopConfig, StartupError,
};
use rand::rngs::StdRng;
use rand::SeedableRng;
use thiserror::Error;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use super::gameplay::{
    default_tower_layout, DefenseScene, PersistenceStore, ProgressionEngine, SimConfig,
    Simulation,
};

const TICKS_ENV_VAR: &str = "BASTION_TICKS";
const SEED_ENV_VAR: &str = "BASTION_SEED";
const MAIN_PATH_DEF: &str = "path.main";
const SAVE_FILE_NAME: &str = "progression.json";

#[derive(Debug, Error)]
pub(crate) enum BootstrapError {
    #[error(transparent)]
    Startup(#[from] StartupError),
    #[error(transparent)]
    Content(#[from] ContentLoadError),
    #[error("content defines no PathDef named '{0}'")]
    MissingPath(&'static str),
}

/// Values read from the environment on top of the built-in defaults.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(crate) struct EnvOverrides {
    pub(crate) max_ticks: Option<u64>,
    pub(crate) seed: Option<u64>,
}

impl EnvOverrides {
    fn from_env() -> Self {
        Self {
            max_ticks: parse_u64_var(TICKS_ENV_VAR, std::env::var(TICKS_ENV_VAR).ok().as_deref()),
            seed: parse_u64_var(SEED_ENV_VAR, std::env::var(SEED_ENV_VAR).ok().as_deref()),
        }
    }
}

pub(crate) struct AppWiring {
    pub(crate) config: LoopConfig,
    pub(crate) scene: DefenseScene<FileBlobStorage>,
}

pub(crate) fn build_app() -> Result<AppWiring, BootstrapError> {
    init_tracing();
    info!("=== Bastion Startup ===");

    let paths = resolve_app_paths()?;
    build_app_for_paths(&paths, EnvOverrides::from_env())
}

/// Everything after path resolution. Content errors are fatal here so a
/// broken loot reference never reaches the first tick.
pub(crate) fn build_app_for_paths(
    paths: &AppPaths,
    overrides: EnvOverrides,
) -> Result<AppWiring, BootstrapError> {
    let content = compile_content_dir(&paths.base_content_dir)?;
    let path = content
        .path(MAIN_PATH_DEF)
        .ok_or(BootstrapError::MissingPath(MAIN_PATH_DEF))?
        .points
        .clone();
    let archetypes = content.enemies().to_vec();

    let mut config = LoopConfig::default();
    if let Some(max_ticks) = overrides.max_ticks {
        config.max_ticks = max_ticks;
    }
    let rng = match overrides.seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    };

    let storage = FileBlobStorage::new(paths.saves_dir.join(SAVE_FILE_NAME));
    log_save_location(&storage);
    let store = PersistenceStore::new(storage);
    let progression = ProgressionEngine::new(content.into_loot_catalog(), store);
    let sim_config = SimConfig::default();
    let layout = default_tower_layout(&path, sim_config.player_spawn);
    let sim = Simulation::new(sim_config, progression, Box::new(rng));

    let scene = DefenseScene::new(
        sim,
        path,
        archetypes,
        layout,
        config.summary_log_interval_ticks,
    );

    Ok(AppWiring { config, scene })
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .compact()
        .init();
}

fn log_save_location(storage: &FileBlobStorage) {
    let path = storage.path();
    info!(path = %path.display(), exists = path.is_file(), "save_location");
}

/// A malformed value is ignored with a warning; the default stays in force.
fn parse_u64_var(var: &'static str, raw: Option<&str>) -> Option<u64> {
    let raw = raw?.trim();
    if raw.is_empty() {
        return None;
    }
    match raw.parse::<u64>() {
        Ok(value) => Some(value),
        Err(error) => {
            warn!(var, value = raw, error = %error, "env_override_ignored");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use bastion_engine::{app_paths_for_root, Scene};
    use tempfile::TempDir;

    use super::*;

    fn seeded_root() -> (TempDir, AppPaths) {
        let temp = TempDir::new().expect("temp");
        let paths = app_paths_for_root(temp.path().to_path_buf()).expect("paths");
        fs::create_dir_all(&paths.base_content_dir).expect("mkdir");
        for (name, raw) in [
            ("loot.xml", include_str!("../../../../assets/base/loot.xml")),
            ("enemies.xml", include_str!("../../../../assets/base/enemies.xml")),
            ("paths.xml", include_str!("../../../../assets/base/paths.xml")),
        ] {
            fs::write(paths.base_content_dir.join(name), raw).expect("write");
        }
        (temp, paths)
    }

    #[test]
    fn parse_u64_var_accepts_numbers_only() {
        assert_eq!(parse_u64_var(TICKS_ENV_VAR, Some(" 120 ")), Some(120));
        assert_eq!(parse_u64_var(TICKS_ENV_VAR, Some("")), None);
        assert_eq!(parse_u64_var(TICKS_ENV_VAR, Some("ten")), None);
        assert_eq!(parse_u64_var(TICKS_ENV_VAR, None), None);
    }

    #[test]
    fn shipped_content_wires_a_runnable_scene() {
        let (_temp, paths) = seeded_root();
        let overrides = EnvOverrides {
            max_ticks: Some(42),
            seed: Some(7),
        };
        let mut app = build_app_for_paths(&paths, overrides).expect("app");
        assert_eq!(app.config.max_ticks, 42);

        let mut world = bastion_engine::ProxyRegistry::default();
        app.scene.load(&mut world);
        assert_eq!(app.scene.simulation().towers().len(), 3);
    }

    #[test]
    fn missing_main_path_is_fatal() {
        let (_temp, paths) = seeded_root();
        fs::remove_file(paths.base_content_dir.join("paths.xml")).expect("remove");
        let err = build_app_for_paths(&paths, EnvOverrides::default())
            .err()
            .expect("missing path");
        assert!(matches!(err, BootstrapError::MissingPath(MAIN_PATH_DEF)));
    }

    #[test]
    fn unknown_carried_loot_fails_startup() {
        let (_temp, paths) = seeded_root();
        fs::write(
            paths.base_content_dir.join("zz_extra.xml"),
            "<Defs><EnemyDef><defName>enemy.courier</defName>\
             <carriesLoot>no_such_loot</carriesLoot></EnemyDef></Defs>",
        )
        .expect("write");
        let err = build_app_for_paths(&paths, EnvOverrides::default())
            .err()
            .expect("bad reference");
        assert!(matches!(err, BootstrapError::Content(_)));
    }
}
