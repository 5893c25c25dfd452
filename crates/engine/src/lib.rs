use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use thiserror::Error;

pub mod app;
pub mod content;
pub mod storage;

pub use app::{
    grid_to_world, run_headless, world_to_grid, LoopConfig, LoopSummary, ProxyId,
    ProxyIdAllocator, ProxyKind, ProxyRegistry, ProxySink, Scene, SceneCommand, Transform, Vec2,
    Vec3, VisualProxy, GRID_SIZE, TILE_SIZE,
};
pub use content::{
    compile_content_dir, compile_content_str, CatalogError, ContentCompileError,
    ContentDatabase, ContentErrorCode, ContentLoadError, EffectOp, EffectStat, EnemyArchetype,
    GridCoord, LootCatalog, LootDef, LootEffect, LootTargetKind, PathDef, Rarity,
    SourceLocation,
};
pub use storage::{BlobStorage, FileBlobStorage, MemoryBlobStorage, StorageError};

pub const ROOT_ENV_VAR: &str = "BASTION_ROOT";

#[derive(Debug, Clone)]
pub struct AppPaths {
    pub base_content_dir: PathBuf,
    pub saves_dir: PathBuf,
}

#[derive(Debug, Error)]
pub enum StartupError {
    #[error("failed to read {var}: {source}")]
    EnvVar {
        var: &'static str,
        #[source]
        source: env::VarError,
    },
    #[error("failed to resolve current executable path: {0}")]
    CurrentExe(#[source] std::io::Error),
    #[error("failed to create saves directory at {path}: {source}")]
    CreateSavesDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("BASTION_ROOT does not point at a directory with assets/base: {path}")]
    InvalidEnvRoot { path: PathBuf },
    #[error("no assets/base found above {start_dir}; set BASTION_ROOT")]
    RootNotFound { start_dir: PathBuf },
}

pub fn resolve_app_paths() -> Result<AppPaths, StartupError> {
    let root = resolve_root()?;
    app_paths_for_root(root)
}

/// Content is read from `assets/base`; saves go under `cache/saves`, which
/// is created if missing.
pub fn app_paths_for_root(root: PathBuf) -> Result<AppPaths, StartupError> {
    let base_content_dir = content_dir(&root);
    let saves_dir = root.join("cache").join("saves");

    fs::create_dir_all(&saves_dir).map_err(|source| StartupError::CreateSavesDir {
        path: saves_dir.clone(),
        source,
    })?;

    Ok(AppPaths {
        base_content_dir,
        saves_dir,
    })
}

fn resolve_root() -> Result<PathBuf, StartupError> {
    match env::var(ROOT_ENV_VAR) {
        Ok(value) => {
            let path = PathBuf::from(value);
            if has_content(&path) {
                Ok(path)
            } else {
                Err(StartupError::InvalidEnvRoot { path })
            }
        }
        Err(env::VarError::NotPresent) => {
            let exe = env::current_exe().map_err(StartupError::CurrentExe)?;
            let found = exe
                .ancestors()
                .skip(1)
                .find(|candidate| has_content(candidate))
                .map(Path::to_path_buf);
            found.ok_or(StartupError::RootNotFound { start_dir: exe })
        }
        Err(source) => Err(StartupError::EnvVar {
            var: ROOT_ENV_VAR,
            source,
        }),
    }
}

fn content_dir(root: &Path) -> PathBuf {
    root.join("assets").join("base")
}

fn has_content(root: &Path) -> bool {
    content_dir(root).is_dir()
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;

    use super::*;

    #[test]
    fn root_without_base_content_is_rejected() {
        let temp = TempDir::new().expect("temp");
        fs::create_dir_all(temp.path().join("assets")).expect("assets");
        assert!(!has_content(temp.path()));
    }

    #[test]
    fn root_with_base_content_is_accepted() {
        let temp = TempDir::new().expect("temp");
        fs::create_dir_all(temp.path().join("assets").join("base")).expect("base");
        assert!(has_content(temp.path()));
    }

    #[test]
    fn app_paths_create_saves_dir() {
        let temp = TempDir::new().expect("temp");
        let paths = app_paths_for_root(temp.path().to_path_buf()).expect("paths");
        assert!(paths.saves_dir.is_dir());
        assert!(paths.base_content_dir.ends_with(Path::new("assets").join("base")));
    }
}
