//! The shared six-by-six test dungeon, served from memory.

use std::path::Path;

use image::{Rgba, RgbaImage};

use crate::assets::MemoryAssetSource;

use super::{Level, LevelDescription};

pub(crate) const LEVEL_JSON: &str = include_str!("../../tests/fixtures/level.json");
pub(crate) const TILESET_JSON: &str = include_str!("../../tests/fixtures/dungeon_tiles.json");

pub(crate) fn assets() -> MemoryAssetSource {
    MemoryAssetSource::new()
        .with_text("tilesets/dungeon_tiles.json", TILESET_JSON)
        .with_image(
            "tilesets/dungeon_tiles.png",
            RgbaImage::from_pixel(128, 64, Rgba([200, 180, 160, 255])),
        )
}

pub(crate) fn description() -> LevelDescription {
    LevelDescription::from_json_str(LEVEL_JSON).expect("fixture level parses")
}

pub(crate) fn level() -> Level {
    Level::from_description(&description(), Path::new("levels"), &assets())
        .expect("fixture level loads")
}
