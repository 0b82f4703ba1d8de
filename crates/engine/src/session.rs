//! The simulation session: the current level, its pending loads and the
//! command inbox, advanced only from fixed steps.

use std::path::{Path, PathBuf};
use std::sync::mpsc::{self, Receiver, TryRecvError};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::app::{InputAction, InputSnapshot};
use crate::assets::{AssetError, AssetSource};
use crate::bridge::{apply_hero_command, Command, CommandInbox, CommandResponse};
use crate::draw::DrawTarget;
use crate::level::{Direction, Level, LevelDescription, LevelLoadError};

const LOAD_FAILED_MESSAGE: &str = "Error: Level could not be loaded.";
const LOAD_SUPERSEDED_MESSAGE: &str = "Error: Level load superseded by a newer request.";

#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Prefix tileset `source` paths are resolved against for levels that
    /// arrive over the bridge.
    pub levels_dir: PathBuf,
    /// Level file loaded at startup; tilesets resolve next to it.
    pub initial_level: Option<PathBuf>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            levels_dir: PathBuf::from("levels"),
            initial_level: None,
        }
    }
}

/// A level description plus the directory its tileset paths are relative to.
#[derive(Debug, Clone)]
struct LevelSource {
    description: Arc<LevelDescription>,
    path_prefix: PathBuf,
}

struct PendingLoad {
    request_id: Option<String>,
    source: LevelSource,
    receiver: Receiver<Result<Level, LevelLoadError>>,
}

pub struct Session {
    config: SessionConfig,
    assets: Arc<dyn AssetSource>,
    inbox: CommandInbox,
    level: Option<Level>,
    loaded_from: Option<LevelSource>,
    pending_load: Option<PendingLoad>,
    completion_logged: bool,
    loads_completed: u64,
}

impl Session {
    pub fn new(config: SessionConfig, assets: Arc<dyn AssetSource>, inbox: CommandInbox) -> Self {
        Self {
            config,
            assets,
            inbox,
            level: None,
            loaded_from: None,
            pending_load: None,
            completion_logged: false,
            loads_completed: 0,
        }
    }

    /// Reads the configured initial level and starts loading it.
    pub fn start(&mut self) -> Result<(), AssetError> {
        let Some(path) = self.config.initial_level.clone() else {
            info!("session_started_without_level");
            return Ok(());
        };
        let description = LevelDescription::read(&path, self.assets.as_ref())?;
        let path_prefix = path.parent().map(Path::to_path_buf).unwrap_or_default();
        info!(path = %path.display(), "initial_level_requested");
        self.begin_load(
            None,
            LevelSource {
                description: Arc::new(description),
                path_prefix,
            },
        );
        Ok(())
    }

    pub fn level(&self) -> Option<&Level> {
        self.level.as_ref()
    }

    pub fn is_loading(&self) -> bool {
        self.pending_load.is_some()
    }

    /// Number of loads (including resets) that produced a level.
    pub fn loads_completed(&self) -> u64 {
        self.loads_completed
    }

    /// One simulation step: finish loads, apply commands, then local input,
    /// then advance the level by `dt`.
    pub fn fixed_update(&mut self, dt: Duration, input: &InputSnapshot) {
        self.poll_pending_load();
        for envelope in self.inbox.drain() {
            self.handle_command(envelope.request_id, envelope.command);
        }
        self.apply_local_input(input);

        let Some(level) = self.level.as_mut() else {
            return;
        };
        level.update(dt);
        if !self.completion_logged && level.is_complete() {
            self.completion_logged = true;
            info!("level_complete");
        }
    }

    pub fn render(&self, target: &mut dyn DrawTarget) {
        if let Some(level) = &self.level {
            level.draw(target);
        }
    }

    pub fn brightness(&self) -> f32 {
        self.level.as_ref().map_or(1.0, Level::brightness)
    }

    pub fn pixel_size(&self) -> Option<(u32, u32)> {
        self.level.as_ref().map(Level::pixel_size)
    }

    pub fn title(&self) -> String {
        match &self.level {
            None if self.is_loading() => "Dungeon (loading)".to_string(),
            None => "Dungeon".to_string(),
            Some(level) if level.is_complete() => "Dungeon - goal reached".to_string(),
            Some(level) => match level.hero_character() {
                Some(hero) => format!("Dungeon - {}", hero.hero_name()),
                None => "Dungeon".to_string(),
            },
        }
    }

    /// Answers everything still outstanding and refuses further commands.
    pub fn shutdown(&mut self) {
        if let Some(pending) = self.pending_load.take() {
            if let Some(request_id) = pending.request_id {
                self.inbox.respond(
                    &request_id,
                    CommandResponse::failure("Error: Simulation is not running.", String::new()),
                );
            }
        }
        let failed = self.inbox.close();
        info!(failed_requests = failed, "session_shutdown");
    }

    fn handle_command(&mut self, request_id: String, command: Command) {
        debug!(request_id = %request_id, command = command.name(), "session_command");
        match command {
            Command::LoadLevel(description) => {
                let source = LevelSource {
                    description: Arc::from(description),
                    path_prefix: self.config.levels_dir.clone(),
                };
                self.begin_load(Some(request_id), source);
            }
            Command::ResetLevel => match self.loaded_from.clone() {
                Some(source) => self.begin_load(Some(request_id), source),
                None => {
                    self.inbox.respond(
                        &request_id,
                        CommandResponse::rejected("No level has been loaded yet."),
                    );
                }
            },
            Command::Hero(hero) => {
                let response = apply_hero_command(self.level.as_mut(), &hero);
                self.inbox.respond(&request_id, response);
            }
        }
    }

    fn begin_load(&mut self, request_id: Option<String>, source: LevelSource) {
        if let Some(previous) = self.pending_load.take() {
            if let Some(previous_id) = previous.request_id {
                self.inbox.respond(
                    &previous_id,
                    CommandResponse::failure(LOAD_SUPERSEDED_MESSAGE, String::new()),
                );
            }
        }

        let (sender, receiver) = mpsc::channel();
        let assets = Arc::clone(&self.assets);
        let worker_source = source.clone();
        let spawned = thread::Builder::new()
            .name("level-loader".to_string())
            .spawn(move || {
                let result = Level::from_description(
                    &worker_source.description,
                    &worker_source.path_prefix,
                    assets.as_ref(),
                );
                let _ = sender.send(result);
            });
        if let Err(err) = spawned {
            warn!(error = %err, "level_loader_spawn_failed");
            if let Some(request_id) = request_id {
                self.inbox.respond(
                    &request_id,
                    CommandResponse::failure(LOAD_FAILED_MESSAGE, err.to_string()),
                );
            }
            return;
        }
        self.pending_load = Some(PendingLoad {
            request_id,
            source,
            receiver,
        });
    }

    fn poll_pending_load(&mut self) {
        let Some(pending) = self.pending_load.as_ref() else {
            return;
        };
        let result = match pending.receiver.try_recv() {
            Ok(result) => Some(result),
            Err(TryRecvError::Empty) => return,
            Err(TryRecvError::Disconnected) => None,
        };
        let Some(PendingLoad {
            request_id, source, ..
        }) = self.pending_load.take()
        else {
            return;
        };

        let response = match result {
            None => {
                warn!("level_loader_exited_without_result");
                CommandResponse::failure(LOAD_FAILED_MESSAGE, "level loader stopped unexpectedly")
            }
            Some(Ok(level)) => {
                self.level = Some(level);
                self.loaded_from = Some(source);
                self.completion_logged = false;
                self.loads_completed += 1;
                CommandResponse::ok_with_message(true, "Level loaded.")
            }
            Some(Err(err)) => {
                warn!(error = %err, "level_load_failed");
                CommandResponse::failure(LOAD_FAILED_MESSAGE, err.to_string())
            }
        };
        if let Some(request_id) = request_id {
            self.inbox.respond(&request_id, response);
        }
    }

    fn apply_local_input(&mut self, input: &InputSnapshot) {
        let Some(level) = self.level.as_mut() else {
            return;
        };
        let direction = [
            (InputAction::MoveNorth, Direction::North),
            (InputAction::MoveSouth, Direction::South),
            (InputAction::MoveWest, Direction::West),
            (InputAction::MoveEast, Direction::East),
        ]
        .into_iter()
        .find(|(action, _)| input.pressed(*action))
        .map(|(_, direction)| direction);

        let outcome = if let Some(direction) = direction {
            level.move_hero(direction).map(|_| ())
        } else if input.pressed(InputAction::TurnLeft) {
            level.turn_hero_left().map(|_| ())
        } else if input.pressed(InputAction::Interact) {
            level.hero_interact().map(|_| ())
        } else {
            return;
        };
        if let Err(err) = outcome {
            debug!(reason = %err, "local_input_rejected");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bridge::{channel, BridgeConfig, BridgeHandle};
    use crate::level::fixtures;

    const STEP: Duration = Duration::from_millis(16);

    fn session_with(config: SessionConfig) -> (Session, BridgeHandle) {
        let (handle, inbox) = channel(BridgeConfig::default());
        let session = Session::new(config, Arc::new(fixtures::assets()), inbox);
        (session, handle)
    }

    fn preload(session: &mut Session) {
        let source = LevelSource {
            description: Arc::new(fixtures::description()),
            path_prefix: PathBuf::from("levels"),
        };
        session.begin_load(None, source);
        finish_loading(session);
    }

    fn finish_loading(session: &mut Session) {
        for _ in 0..500 {
            session.fixed_update(STEP, &InputSnapshot::empty());
            if !session.is_loading() {
                return;
            }
            thread::sleep(Duration::from_millis(2));
        }
        panic!("level never finished loading");
    }

    #[test]
    fn starts_empty_without_initial_level() {
        let (mut session, _handle) = session_with(SessionConfig::default());
        session.start().expect("start");
        assert!(session.level().is_none());
        assert_eq!(session.brightness(), 1.0);
        assert_eq!(session.title(), "Dungeon");
    }

    #[test]
    fn missing_initial_level_is_an_asset_error() {
        let (mut session, _handle) = session_with(SessionConfig {
            initial_level: Some(PathBuf::from("levels/missing.json")),
            ..SessionConfig::default()
        });
        assert!(session.start().is_err());
    }

    #[test]
    fn local_keys_walk_the_hero() {
        let (mut session, _handle) = session_with(SessionConfig::default());
        preload(&mut session);

        let press = InputSnapshot::empty().with_pressed(InputAction::MoveSouth);
        session.fixed_update(STEP, &press);
        for _ in 0..40 {
            session.fixed_update(STEP, &InputSnapshot::empty());
        }
        let hero = session.level().and_then(Level::hero).expect("hero");
        assert_eq!(hero.position.y, 64.0);
    }

    #[test]
    fn reaching_goal_updates_title() {
        let (mut session, _handle) = session_with(SessionConfig::default());
        preload(&mut session);
        for _ in 0..2 {
            session.fixed_update(
                STEP,
                &InputSnapshot::empty().with_pressed(InputAction::MoveSouth),
            );
            for _ in 0..40 {
                session.fixed_update(STEP, &InputSnapshot::empty());
            }
        }
        assert!(session.level().is_some_and(Level::is_complete));
        assert_eq!(session.title(), "Dungeon - goal reached");
    }

    #[test]
    fn interact_key_lights_torch() {
        let (mut session, _handle) = session_with(SessionConfig::default());
        preload(&mut session);
        let turn = InputSnapshot::empty().with_pressed(InputAction::TurnLeft);
        session.fixed_update(STEP, &turn);
        session.fixed_update(STEP, &turn);
        session.fixed_update(
            STEP,
            &InputSnapshot::empty().with_pressed(InputAction::Interact),
        );
        assert_eq!(session.brightness(), 1.0);
    }
}
