use std::path::PathBuf;
use std::sync::Arc;

use dungeon_engine::{
    channel, resolve_app_paths, AssetSource, BridgeConfig, FsAssetSource, LoopConfig, Session,
    SessionConfig, StartupError,
};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use super::thruport::{self, Thruport, ThruportConfig};

const LEVEL_ENV_VAR: &str = "DUNGEON_LEVEL";
const HEADLESS_ENV_VAR: &str = "DUNGEON_HEADLESS";

pub(crate) struct AppWiring {
    pub(crate) config: LoopConfig,
    pub(crate) session: Session,
    pub(crate) thruport: Thruport,
    pub(crate) headless: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct RuntimeConfig {
    initial_level: Option<PathBuf>,
    headless: bool,
    thruport: ThruportConfig,
}

impl RuntimeConfig {
    fn from_env() -> Self {
        Self::from_values(
            std::env::var(LEVEL_ENV_VAR).ok().as_deref(),
            std::env::var(HEADLESS_ENV_VAR).ok().as_deref(),
            ThruportConfig::from_env(),
        )
    }

    fn from_values(
        raw_level: Option<&str>,
        raw_headless: Option<&str>,
        thruport: ThruportConfig,
    ) -> Self {
        let initial_level = raw_level
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .map(PathBuf::from);
        Self {
            initial_level,
            headless: parse_headless_flag(raw_headless),
            thruport,
        }
    }
}

fn parse_headless_flag(raw: Option<&str>) -> bool {
    match raw.map(str::trim) {
        None | Some("") | Some("0") => false,
        Some("1") => true,
        Some(value) => {
            warn!(value, fallback = false, "headless_flag_invalid_using_default");
            false
        }
    }
}

pub(crate) fn build_app() -> Result<AppWiring, StartupError> {
    init_tracing();
    info!("=== Dungeon Startup ===");

    let paths = resolve_app_paths()?;
    info!(root = %paths.root.display(), "asset_root_resolved");
    let runtime = RuntimeConfig::from_env();

    let assets: Arc<dyn AssetSource> = Arc::new(FsAssetSource::new(paths.root.clone()));
    let (bridge, inbox) = channel(BridgeConfig::default());
    let mut session = Session::new(
        SessionConfig {
            levels_dir: paths.levels_dir,
            initial_level: runtime.initial_level,
        },
        assets,
        inbox,
    );
    if let Err(err) = session.start() {
        warn!(error = %err, "initial_level_unreadable");
    }

    let thruport = thruport::initialize(runtime.thruport, bridge);

    Ok(AppWiring {
        config: LoopConfig::default(),
        session,
        thruport,
        headless: runtime.headless,
    })
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_names(true)
        .compact()
        .init();
}

#[cfg(test)]
mod tests {
    use super::*;

    fn thruport_off() -> ThruportConfig {
        ThruportConfig {
            enabled: false,
            port: 3000,
        }
    }

    #[test]
    fn level_path_is_trimmed_and_blank_means_none() {
        let config = RuntimeConfig::from_values(Some(" levels/one.json "), None, thruport_off());
        assert_eq!(config.initial_level, Some(PathBuf::from("levels/one.json")));

        let config = RuntimeConfig::from_values(Some("  "), None, thruport_off());
        assert_eq!(config.initial_level, None);
    }

    #[test]
    fn headless_only_on_explicit_one() {
        assert!(!parse_headless_flag(None));
        assert!(!parse_headless_flag(Some("0")));
        assert!(parse_headless_flag(Some("1")));
        assert!(!parse_headless_flag(Some("yes")));
    }
}
