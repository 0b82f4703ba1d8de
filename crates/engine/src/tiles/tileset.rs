use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;
use tracing::{debug, warn};

use crate::assets::{normalize_asset_path, sibling_asset_path, AssetError, AssetSource, TileImage};

use super::properties::{properties_from_descriptions, PropertyDescription};
use super::{AnimatedTile, AnimationFrame, Properties, SourceRect, Tile, Visual};

/// A level's reference to an external tileset description.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct TilesetRef {
    pub source: String,
    pub firstgid: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TilesetDescription {
    #[serde(default)]
    pub name: String,
    pub columns: u32,
    pub image: String,
    #[serde(default)]
    pub imagewidth: u32,
    #[serde(default)]
    pub imageheight: u32,
    #[serde(default)]
    pub margin: u32,
    #[serde(default)]
    pub spacing: u32,
    pub tilecount: u32,
    pub tilewidth: u32,
    pub tileheight: u32,
    #[serde(default)]
    pub tileoffset: Option<TileOffsetDescription>,
    #[serde(default)]
    pub tiles: Vec<TileDescription>,
}

#[derive(Debug, Clone, Copy, Default, Deserialize)]
pub struct TileOffsetDescription {
    #[serde(default)]
    pub x: i32,
    #[serde(default)]
    pub y: i32,
}

/// A "special" tile entry carrying custom metadata.
#[derive(Debug, Clone, Deserialize)]
pub struct TileDescription {
    pub id: u32,
    #[serde(default, rename = "type")]
    pub kind: Option<String>,
    #[serde(default)]
    pub class: Option<String>,
    #[serde(default)]
    pub animation: Vec<FrameDescription>,
    #[serde(default)]
    pub properties: Vec<PropertyDescription>,
}

#[derive(Debug, Clone, Copy, Deserialize)]
pub struct FrameDescription {
    pub tileid: u32,
    pub duration: u32,
}

/// A sheet of uniformly sized tiles cut from one image.
#[derive(Debug, Clone)]
pub struct Tileset {
    name: String,
    source_path: PathBuf,
    first_gid: u32,
    columns: u32,
    margin: u32,
    spacing: u32,
    tile_width: u32,
    tile_height: u32,
    tile_count: u32,
    image: TileImage,
    tiles: Vec<Arc<Tile>>,
}

impl Tileset {
    /// Loads the description at `path_prefix/sheet_path` and the image it
    /// names (relative to the description), then synthesizes every tile.
    pub fn create(
        sheet_path: &str,
        first_gid: u32,
        path_prefix: &Path,
        assets: &dyn AssetSource,
        set_id: usize,
    ) -> Result<Self, AssetError> {
        let path = normalize_asset_path(&path_prefix.join(sheet_path));
        let text = assets.read_text(&path)?;
        let mut deserializer = serde_json::Deserializer::from_str(&text);
        let description: TilesetDescription = serde_path_to_error::deserialize(&mut deserializer)
            .map_err(|source| AssetError::Json {
                path: path.clone(),
                source,
            })?;
        let image_path = sibling_asset_path(&path, &description.image);
        let image = assets.load_image(&image_path)?;
        if description.imagewidth != 0
            && (description.imagewidth, description.imageheight) != image.dimensions()
        {
            warn!(
                path = %image_path.display(),
                declared_width = description.imagewidth,
                declared_height = description.imageheight,
                actual_width = image.width(),
                actual_height = image.height(),
                "tileset_image_size_mismatch"
            );
        }
        debug!(
            path = %path.display(),
            first_gid,
            tile_count = description.tilecount,
            "tileset_loaded"
        );
        Ok(Self::from_description(
            description,
            path,
            first_gid,
            Arc::new(image),
            set_id,
        ))
    }

    pub fn from_description(
        description: TilesetDescription,
        source_path: PathBuf,
        first_gid: u32,
        image: TileImage,
        set_id: usize,
    ) -> Self {
        let columns = description.columns.max(1);
        let offset = description.tileoffset.unwrap_or_default();
        let tile_count = grid_capacity(&description, columns, image.height());
        if tile_count < description.tilecount {
            warn!(
                tileset = %description.name,
                declared = description.tilecount,
                kept = tile_count,
                "tileset_tile_count_exceeds_image"
            );
        }
        let step_x = description.tilewidth.saturating_add(description.spacing);
        let step_y = description.tileheight.saturating_add(description.spacing);
        let mut tiles = Vec::with_capacity(tile_count as usize);
        for local_id in 0..tile_count {
            let col = local_id % columns;
            let row = local_id / columns;
            tiles.push(Tile {
                set_id,
                local_id,
                region: SourceRect {
                    x: description.margin.saturating_add(col.saturating_mul(step_x)),
                    y: description.margin.saturating_add(row.saturating_mul(step_y)),
                    width: description.tilewidth,
                    height: description.tileheight,
                },
                draw_offset: (offset.x, offset.y),
                visible: true,
                kind: String::new(),
                properties: Properties::new(),
                animation: Vec::new(),
            });
        }

        for special in &description.tiles {
            let Some(tile) = tiles.get_mut(special.id as usize) else {
                warn!(
                    tileset = %description.name,
                    tile_id = special.id,
                    tile_count,
                    "tileset_special_tile_out_of_range"
                );
                continue;
            };
            tile.kind = special
                .kind
                .clone()
                .or_else(|| special.class.clone())
                .unwrap_or_default();
            tile.properties = properties_from_descriptions(&special.properties);
            tile.animation = special
                .animation
                .iter()
                .map(|frame| AnimationFrame {
                    tile_id: frame.tileid,
                    duration_ms: frame.duration,
                })
                .collect();
        }

        Self {
            name: description.name,
            source_path,
            first_gid,
            columns,
            margin: description.margin,
            spacing: description.spacing,
            tile_width: description.tilewidth,
            tile_height: description.tileheight,
            tile_count,
            image,
            tiles: tiles.into_iter().map(Arc::new).collect(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn source_path(&self) -> &Path {
        &self.source_path
    }

    pub fn first_gid(&self) -> u32 {
        self.first_gid
    }

    pub fn columns(&self) -> u32 {
        self.columns
    }

    pub fn margin(&self) -> u32 {
        self.margin
    }

    pub fn spacing(&self) -> u32 {
        self.spacing
    }

    pub fn tile_width(&self) -> u32 {
        self.tile_width
    }

    pub fn tile_height(&self) -> u32 {
        self.tile_height
    }

    pub fn tile_count(&self) -> u32 {
        self.tile_count
    }

    pub fn image(&self) -> &TileImage {
        &self.image
    }

    pub fn tiles(&self) -> &[Arc<Tile>] {
        &self.tiles
    }

    pub fn tile(&self, local_id: u32) -> Option<&Arc<Tile>> {
        self.tiles.get(local_id as usize)
    }

    pub fn contains_gid(&self, gid: u32) -> bool {
        gid >= self.first_gid && gid - self.first_gid < self.tile_count
    }

    pub fn tile_by_global_id(&self, gid: u32) -> Option<&Arc<Tile>> {
        if !self.contains_gid(gid) {
            return None;
        }
        self.tile(gid - self.first_gid)
    }

    /// First tile whose `type` is `kind` and whose `state` property is `state`.
    pub fn tile_by_type_and_state(&self, kind: &str, state: &str) -> Option<&Arc<Tile>> {
        self.tiles
            .iter()
            .find(|tile| tile.kind == kind && tile.state() == Some(state))
    }

    /// Wraps `tile` in an [`AnimatedTile`] when it carries an animation
    /// descriptor; frames that do not resolve in this tileset are dropped.
    pub fn visual_for(&self, tile: &Arc<Tile>) -> Visual {
        if !tile.is_animated() {
            return Visual::Static(Arc::clone(tile));
        }
        let mut frames = Vec::with_capacity(tile.animation.len());
        for frame in &tile.animation {
            match self.tile(frame.tile_id) {
                Some(frame_tile) => frames.push((
                    Arc::clone(frame_tile),
                    Duration::from_millis(u64::from(frame.duration_ms)),
                )),
                None => warn!(
                    tileset = %self.name,
                    tile_id = tile.local_id,
                    frame_tile_id = frame.tile_id,
                    "animation_frame_unresolved_skipped"
                ),
            }
        }
        match AnimatedTile::new(Arc::clone(tile), frames) {
            Some(animated) => Visual::Animated(animated),
            None => Visual::Static(Arc::clone(tile)),
        }
    }
}

/// Declared tile count, limited to the rows of tiles the image can hold.
fn grid_capacity(description: &TilesetDescription, columns: u32, image_height: u32) -> u32 {
    let step = u64::from(description.tileheight.max(1)) + u64::from(description.spacing);
    let usable = u64::from(image_height.saturating_sub(description.margin))
        + u64::from(description.spacing);
    let rows = (usable / step).max(1);
    let capacity = rows.saturating_mul(u64::from(columns));
    u32::try_from(capacity.min(u64::from(description.tilecount))).unwrap_or(u32::MAX)
}
