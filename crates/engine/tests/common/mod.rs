#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use dungeon_engine::{
    channel, run_headless, BridgeConfig, BridgeHandle, LoopConfig, MemoryAssetSource, Session,
    SessionConfig,
};
use image::{Rgba, RgbaImage};
use serde_json::Value as JsonValue;

pub const LEVEL_JSON: &str = include_str!("../fixtures/level.json");
pub const TILESET_JSON: &str = include_str!("../fixtures/dungeon_tiles.json");

pub fn assets() -> MemoryAssetSource {
    MemoryAssetSource::new()
        .with_text("tilesets/dungeon_tiles.json", TILESET_JSON)
        .with_text("levels/level.json", LEVEL_JSON)
        .with_image(
            "tilesets/dungeon_tiles.png",
            RgbaImage::from_pixel(128, 64, Rgba([90, 80, 70, 255])),
        )
}

pub fn level_value() -> JsonValue {
    serde_json::from_str(LEVEL_JSON).expect("fixture level is JSON")
}

/// A headless simulation on its own thread.
pub struct RunningSim {
    pub handle: BridgeHandle,
    shutdown: Arc<AtomicBool>,
    runner: Option<JoinHandle<()>>,
}

impl RunningSim {
    pub fn start(session_config: SessionConfig) -> Self {
        let (handle, inbox) = channel(BridgeConfig {
            response_timeout: Duration::from_secs(10),
            ..BridgeConfig::default()
        });
        let mut session = Session::new(session_config, Arc::new(assets()), inbox);
        session.start().expect("session starts");
        let shutdown = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&shutdown);
        let runner = thread::spawn(move || run_headless(LoopConfig::default(), session, flag));
        Self {
            handle,
            shutdown,
            runner: Some(runner),
        }
    }

    pub fn stop(&mut self) {
        self.shutdown.store(true, Ordering::SeqCst);
        if let Some(runner) = self.runner.take() {
            runner.join().expect("sim thread exits");
        }
    }
}

impl Drop for RunningSim {
    fn drop(&mut self) {
        self.stop();
    }
}
