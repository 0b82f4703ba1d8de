//! Serde model of the Tiled-style JSON level description.

use std::path::Path;

use serde::Deserialize;
use serde_json::Value as JsonValue;

use crate::assets::{AssetError, AssetSource};
use crate::tiles::{PropertyDescription, TilesetRef};

pub const TILE_LAYER_TYPE: &str = "tilelayer";
pub const OBJECT_LAYER_TYPE: &str = "objectgroup";

#[derive(Debug, Clone, Deserialize)]
pub struct LevelDescription {
    pub width: u32,
    pub height: u32,
    pub tilewidth: u32,
    pub tileheight: u32,
    #[serde(default)]
    pub layers: Vec<LayerDescription>,
    #[serde(default)]
    pub tilesets: Vec<TilesetRef>,
    #[serde(default)]
    pub properties: Vec<PropertyDescription>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LayerDescription {
    #[serde(default)]
    pub id: u32,
    #[serde(default)]
    pub name: String,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default = "default_true")]
    pub visible: bool,
    #[serde(default = "default_opacity")]
    pub opacity: f32,
    #[serde(default)]
    pub x: i32,
    #[serde(default)]
    pub y: i32,
    #[serde(default)]
    pub offsetx: f32,
    #[serde(default)]
    pub offsety: f32,
    #[serde(default)]
    pub width: u32,
    #[serde(default)]
    pub height: u32,
    #[serde(default)]
    pub data: Vec<u32>,
    #[serde(default)]
    pub objects: Vec<ObjectDescription>,
    #[serde(default)]
    pub properties: Vec<PropertyDescription>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ObjectDescription {
    pub id: u32,
    #[serde(default)]
    pub name: String,
    #[serde(default, rename = "type")]
    pub kind: Option<String>,
    #[serde(default)]
    pub class: Option<String>,
    pub x: f32,
    pub y: f32,
    #[serde(default)]
    pub width: f32,
    #[serde(default)]
    pub height: f32,
    #[serde(default = "default_true")]
    pub visible: bool,
    #[serde(default)]
    pub gid: Option<u32>,
    #[serde(default)]
    pub properties: Vec<PropertyDescription>,
}

impl ObjectDescription {
    /// Explicit object type, `class` taking over when `type` is absent or
    /// empty.
    pub fn explicit_type(&self) -> Option<&str> {
        [self.kind.as_deref(), self.class.as_deref()]
            .into_iter()
            .flatten()
            .find(|name| !name.is_empty())
    }
}

fn default_true() -> bool {
    true
}

fn default_opacity() -> f32 {
    1.0
}

impl LevelDescription {
    pub fn from_json_str(text: &str) -> Result<Self, serde_path_to_error::Error<serde_json::Error>> {
        let mut deserializer = serde_json::Deserializer::from_str(text);
        serde_path_to_error::deserialize(&mut deserializer)
    }

    pub fn from_value(value: JsonValue) -> Result<Self, serde_path_to_error::Error<serde_json::Error>> {
        serde_path_to_error::deserialize(value)
    }

    pub fn read(path: &Path, assets: &dyn AssetSource) -> Result<Self, AssetError> {
        let text = assets.read_text(path)?;
        Self::from_json_str(&text).map_err(|source| AssetError::Json {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn pixel_width(&self) -> u32 {
        self.width.saturating_mul(self.tilewidth)
    }

    pub fn pixel_height(&self) -> u32 {
        self.height.saturating_mul(self.tileheight)
    }
}
