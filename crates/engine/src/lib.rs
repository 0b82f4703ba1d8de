use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use thiserror::Error;

pub mod app;
pub mod assets;
pub mod bridge;
pub mod draw;
pub mod level;
pub mod session;
pub mod tiles;

pub use app::{
    run_app, run_headless, AppError, FrameCanvas, InputAction, InputSnapshot, LoopConfig,
    LoopMetricsSnapshot, RenderError, Renderer,
};
pub use assets::{AssetError, AssetSource, FsAssetSource, MemoryAssetSource, TileImage};
pub use bridge::{
    channel, BridgeConfig, BridgeError, BridgeHandle, Command, CommandInbox, CommandRequest,
    CommandResponse, HeroCommand,
};
pub use draw::{DrawCall, DrawRecorder, DrawTarget};
pub use level::{Direction, HeroError, Level, LevelDescription, LevelLoadError, ObjectKind, Vec2};
pub use session::{Session, SessionConfig};
pub use tiles::{Tile, TileFactory, Tileset};

pub const ROOT_ENV_VAR: &str = "DUNGEON_ROOT";

#[derive(Debug, Clone)]
pub struct AppPaths {
    pub root: PathBuf,
    pub levels_dir: PathBuf,
}

#[derive(Debug, Error)]
pub enum StartupError {
    #[error("failed to read environment variable {var}: {source}")]
    EnvVar {
        var: &'static str,
        #[source]
        source: env::VarError,
    },
    #[error("failed to resolve current executable path: {0}")]
    CurrentExe(#[source] std::io::Error),
    #[error("current executable path has no parent directory: {0}")]
    ExeHasNoParent(PathBuf),
    #[error(
        "DUNGEON_ROOT is set but does not point to a valid dungeon root: {path}\n\
A valid root contains a levels/ directory."
    )]
    InvalidEnvRoot { path: PathBuf },
    #[error(
        "Could not find a levels/ directory walking upward from {start_dir}\n\
Set {env_var} explicitly, for example:\n\
Bash/zsh: export {env_var}=\"/path/to/dungeon\""
    )]
    RootNotFound {
        start_dir: PathBuf,
        env_var: &'static str,
    },
}

/// The asset root is `DUNGEON_ROOT` when set, else the first ancestor of the
/// executable or the working directory that holds a `levels/` directory.
pub fn resolve_app_paths() -> Result<AppPaths, StartupError> {
    let root = resolve_root()?;
    let levels_dir = root.join(LEVELS_DIR_NAME);
    Ok(AppPaths { root, levels_dir })
}

const LEVELS_DIR_NAME: &str = "levels";

fn resolve_root() -> Result<PathBuf, StartupError> {
    match env::var(ROOT_ENV_VAR) {
        Ok(value) => {
            let normalized = normalize_path(Path::new(&value));
            if is_root_marker(&normalized) {
                Ok(normalized)
            } else {
                Err(StartupError::InvalidEnvRoot { path: normalized })
            }
        }
        Err(env::VarError::NotPresent) => {
            let exe = env::current_exe().map_err(StartupError::CurrentExe)?;
            let exe_dir = exe
                .parent()
                .map(Path::to_path_buf)
                .ok_or_else(|| StartupError::ExeHasNoParent(exe.clone()))?;
            let cwd = env::current_dir().ok();

            let candidates = exe_dir
                .ancestors()
                .chain(cwd.iter().flat_map(|dir| dir.ancestors()));
            find_root(candidates).ok_or_else(|| StartupError::RootNotFound {
                start_dir: normalize_path(&exe_dir),
                env_var: ROOT_ENV_VAR,
            })
        }
        Err(source) => Err(StartupError::EnvVar {
            var: ROOT_ENV_VAR,
            source,
        }),
    }
}

fn find_root<'a>(mut candidates: impl Iterator<Item = &'a Path>) -> Option<PathBuf> {
    candidates
        .find(|candidate| is_root_marker(candidate))
        .map(normalize_path)
}

fn is_root_marker(path: &Path) -> bool {
    path.join(LEVELS_DIR_NAME).is_dir()
}

fn normalize_path(path: &Path) -> PathBuf {
    fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf())
}
