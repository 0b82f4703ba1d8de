use std::path::Path;
use std::time::Duration;

use thiserror::Error;
use tracing::{debug, info, warn};

use crate::assets::{AssetError, AssetSource};
use crate::draw::DrawTarget;
use crate::tiles::{properties_from_descriptions, Properties, TileFactory};

use super::character::Character;
use super::format::{LayerDescription, LevelDescription, OBJECT_LAYER_TYPE, TILE_LAYER_TYPE};
use super::geometry::{Direction, Vec2};
use super::layer::{Layer, LayerInfo, LayerKind, ObjectLayer, TileLayer};
use super::object_factory::{ObjectFactory, HERO_OBJECT_NAME};
use super::objects::{GameObject, InteractOutcome, ObjectId, ObjectKind, ObjectState};
use super::registry::{ObjectHandle, ObjectRegistry};

/// Switch chains longer than this are cut off.
const MAX_FORWARD_DEPTH: usize = 8;
pub const MAX_TILE_SIZE: u32 = 1024;
/// Per axis, in pixels.
pub const MAX_LEVEL_PIXELS: u32 = 16_384;

#[derive(Debug, Error)]
pub enum LevelLoadError {
    #[error(transparent)]
    Asset(#[from] AssetError),
    #[error("level has no tilesets")]
    NoTilesets,
    #[error("level tile size must be non-zero, got {width}x{height}")]
    InvalidTileSize { width: u32, height: u32 },
    #[error("level size must be non-zero, got {width}x{height}")]
    InvalidDimensions { width: u32, height: u32 },
    #[error("tile size {width}x{height} exceeds {MAX_TILE_SIZE} pixels")]
    TileTooLarge { width: u32, height: u32 },
    #[error("level is {width}x{height} pixels, more than {MAX_LEVEL_PIXELS} per side")]
    LevelTooLarge { width: u64, height: u64 },
    #[error("tile layer {name:?} has {actual} cells, expected {expected}")]
    InvalidLayerSize {
        name: String,
        expected: usize,
        actual: usize,
    },
}

/// Command-time rejections. These never abort anything; the display text is
/// what a caller is shown.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HeroError {
    #[error("The level has no hero.")]
    NoHero,
    #[error("The hero is still moving.")]
    Moving,
    #[error("The hero cannot move {0}: the way is blocked.")]
    Blocked(Direction),
    #[error("There is nothing in front of the hero.")]
    NothingInFront,
    #[error("{name} cannot be interacted with.")]
    NotInteractive { name: String },
    #[error("Switch target {0} does not exist.")]
    SwitchTargetMissing(ObjectId),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InteractReport {
    pub target: ObjectId,
    pub kind: ObjectKind,
    pub outcome: InteractOutcome,
    /// Objects reached through switch `controls` links, in order.
    pub forwarded: Vec<(ObjectId, InteractOutcome)>,
}

/// A fully assembled, playable level.
#[derive(Debug)]
pub struct Level {
    width: u32,
    height: u32,
    tile_width: u32,
    tile_height: u32,
    layers: Vec<Layer>,
    tiles: TileFactory,
    registry: ObjectRegistry,
    hero: Option<ObjectHandle>,
    goal: Option<ObjectHandle>,
    properties: Properties,
}

impl Level {
    /// Loads every tileset (relative to `path_prefix`) and assembles the level.
    pub fn from_description(
        description: &LevelDescription,
        path_prefix: &Path,
        assets: &dyn AssetSource,
    ) -> Result<Self, LevelLoadError> {
        validate_dimensions(description)?;
        if description.tilesets.is_empty() {
            return Err(LevelLoadError::NoTilesets);
        }
        let tiles = TileFactory::load(&description.tilesets, path_prefix, assets)?;
        Self::assemble(description, tiles)
    }

    /// Assembles a level from already loaded tilesets.
    pub fn assemble(
        description: &LevelDescription,
        tiles: TileFactory,
    ) -> Result<Self, LevelLoadError> {
        validate_dimensions(description)?;
        if tiles.is_empty() {
            return Err(LevelLoadError::NoTilesets);
        }

        let mut objects = ObjectFactory::new();
        let mut layers = Vec::with_capacity(description.layers.len());
        for layer_description in &description.layers {
            let info = layer_info(layer_description, description);
            let kind = match layer_description.kind.as_str() {
                TILE_LAYER_TYPE => {
                    let expected = info.width as usize * info.height as usize;
                    if layer_description.data.len() != expected {
                        return Err(LevelLoadError::InvalidLayerSize {
                            name: info.name.clone(),
                            expected,
                            actual: layer_description.data.len(),
                        });
                    }
                    let mut grid = TileLayer::from_gids(
                        info.width,
                        info.height,
                        &layer_description.data,
                        &tiles,
                    );
                    grid.wrap_animated_tiles(&tiles);
                    LayerKind::Tiles(grid)
                }
                OBJECT_LAYER_TYPE => {
                    let layer_index = layers.len();
                    let built = layer_description
                        .objects
                        .iter()
                        .enumerate()
                        .map(|(index, object)| {
                            let handle = ObjectHandle {
                                layer: layer_index,
                                index,
                            };
                            objects.create(object, &tiles, handle)
                        })
                        .collect();
                    LayerKind::Objects(ObjectLayer::new(built))
                }
                other => {
                    warn!(layer = %info.name, layer_type = other, "layer_type_unsupported");
                    continue;
                }
            };
            layers.push(Layer { info, kind });
        }

        let registry = objects.into_registry();
        let hero = find_hero(&registry, &layers);
        if hero.is_none() {
            warn!(name = HERO_OBJECT_NAME, "level_hero_missing");
        }
        let goal = registry.by_kind(ObjectKind::Goal).first().copied();
        if goal.is_none() {
            warn!("level_goal_missing");
        }

        let level = Self {
            width: description.width,
            height: description.height,
            tile_width: description.tilewidth,
            tile_height: description.tileheight,
            layers,
            tiles,
            registry,
            hero,
            goal,
            properties: properties_from_descriptions(&description.properties),
        };
        info!(
            width = level.width,
            height = level.height,
            layer_count = level.layers.len(),
            object_count = level.registry.len(),
            tileset_count = level.tiles.tilesets().len(),
            "level_loaded"
        );
        Ok(level)
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn tile_width(&self) -> u32 {
        self.tile_width
    }

    pub fn tile_height(&self) -> u32 {
        self.tile_height
    }

    pub fn pixel_size(&self) -> (u32, u32) {
        (
            self.width.saturating_mul(self.tile_width),
            self.height.saturating_mul(self.tile_height),
        )
    }

    pub fn layers(&self) -> &[Layer] {
        &self.layers
    }

    pub fn tiles(&self) -> &TileFactory {
        &self.tiles
    }

    pub fn registry(&self) -> &ObjectRegistry {
        &self.registry
    }

    pub fn properties(&self) -> &Properties {
        &self.properties
    }

    pub fn object(&self, handle: ObjectHandle) -> Option<&GameObject> {
        self.layers.get(handle.layer)?.as_objects()?.get(handle.index)
    }

    pub fn object_mut(&mut self, handle: ObjectHandle) -> Option<&mut GameObject> {
        match &mut self.layers.get_mut(handle.layer)?.kind {
            LayerKind::Objects(objects) => objects.get_mut(handle.index),
            LayerKind::Tiles(_) => None,
        }
    }

    pub fn object_by_id(&self, id: ObjectId) -> Option<&GameObject> {
        self.object(self.registry.by_id(id)?)
    }

    pub fn object_by_name(&self, name: &str) -> Option<&GameObject> {
        self.object(self.registry.by_name(name)?)
    }

    pub fn objects_of_kind(&self, kind: ObjectKind) -> impl Iterator<Item = &GameObject> {
        self.registry
            .by_kind(kind)
            .iter()
            .filter_map(|handle| self.object(*handle))
    }

    pub fn hero(&self) -> Option<&GameObject> {
        self.object(self.hero?)
    }

    pub fn hero_character(&self) -> Option<&Character> {
        self.hero()?.character()
    }

    pub fn goal(&self) -> Option<&GameObject> {
        self.object(self.goal?)
    }

    /// First object, in layer then list order, whose footprint holds the point.
    pub fn object_at(&self, x: f32, y: f32) -> Option<ObjectHandle> {
        self.object_at_excluding(x, y, None)
    }

    fn object_at_excluding(
        &self,
        x: f32,
        y: f32,
        excluded: Option<ObjectHandle>,
    ) -> Option<ObjectHandle> {
        for (layer_index, layer) in self.layers.iter().enumerate() {
            let Some(objects) = layer.as_objects() else {
                continue;
            };
            for (index, object) in objects.objects().iter().enumerate() {
                let handle = ObjectHandle {
                    layer: layer_index,
                    index,
                };
                if Some(handle) != excluded && object.is_at_position(x, y) {
                    return Some(handle);
                }
            }
        }
        None
    }

    /// Collision at a world point. Anything outside the map collides.
    pub fn is_collision(&self, x: f32, y: f32) -> bool {
        let Some((col, row)) = self.cell_at(x, y) else {
            return true;
        };
        for layer in &self.layers {
            match &layer.kind {
                LayerKind::Tiles(tiles) => {
                    if layer.info.is_collision_layer() && tiles.is_occupied(col, row) {
                        return true;
                    }
                }
                LayerKind::Objects(objects) => {
                    let blocked = objects
                        .objects()
                        .iter()
                        .any(|object| object.is_at_position(x, y) && object.is_collision());
                    if blocked {
                        return true;
                    }
                }
            }
        }
        false
    }

    fn cell_at(&self, x: f32, y: f32) -> Option<(u32, u32)> {
        if !x.is_finite() || !y.is_finite() || x < 0.0 || y < 0.0 {
            return None;
        }
        let col = (x / self.tile_width as f32).floor() as u32;
        let row = (y / self.tile_height as f32).floor() as u32;
        (col < self.width && row < self.height).then_some((col, row))
    }

    /// Hero and goal stand on exactly the same coordinates.
    pub fn is_complete(&self) -> bool {
        match (self.hero(), self.goal()) {
            (Some(hero), Some(goal)) => hero.position == goal.position,
            _ => false,
        }
    }

    /// Fraction of torches burning; 1.0 without torches.
    pub fn brightness(&self) -> f32 {
        let mut total = 0usize;
        let mut burning = 0usize;
        for torch in self.objects_of_kind(ObjectKind::Torch) {
            total += 1;
            if torch.state() == Some(ObjectState::Burning) {
                burning += 1;
            }
        }
        if total == 0 {
            1.0
        } else {
            burning as f32 / total as f32
        }
    }

    pub fn update(&mut self, dt: Duration) {
        for layer in &mut self.layers {
            layer.update(dt);
        }
    }

    pub fn draw(&self, target: &mut dyn DrawTarget) {
        for layer in &self.layers {
            layer.draw(target, &self.tiles, self.tile_width, self.tile_height);
        }
    }

    fn standing_hero(&self) -> Result<(ObjectHandle, &GameObject, &Character), HeroError> {
        let handle = self.hero.ok_or(HeroError::NoHero)?;
        let object = self.object(handle).ok_or(HeroError::NoHero)?;
        let character = object.character().ok_or(HeroError::NoHero)?;
        Ok((handle, object, character))
    }

    fn hero_character_mut(&mut self) -> Result<&mut Character, HeroError> {
        let handle = self.hero.ok_or(HeroError::NoHero)?;
        self.object_mut(handle)
            .and_then(GameObject::character_mut)
            .ok_or(HeroError::NoHero)
    }

    /// Bottom-left corner of the tile one step from the hero.
    fn step_from(&self, position: Vec2, direction: Direction) -> Vec2 {
        let offset = direction.offset(self.tile_width as f32, self.tile_height as f32);
        Vec2::new(position.x + offset.x, position.y + offset.y)
    }

    /// Centre of the tile whose bottom-left corner is `corner`.
    fn tile_centre(&self, corner: Vec2) -> Vec2 {
        Vec2::new(
            corner.x + self.tile_width as f32 / 2.0,
            corner.y - self.tile_height as f32 / 2.0,
        )
    }

    fn front_point(&self) -> Result<Vec2, HeroError> {
        let (_, object, character) = self.standing_hero()?;
        Ok(self.tile_centre(self.step_from(object.position, character.facing())))
    }

    /// Starts a one-tile move. A blocked move still turns the hero.
    pub fn move_hero(&mut self, direction: Direction) -> Result<Vec2, HeroError> {
        let (_, object, character) = self.standing_hero()?;
        if character.is_moving() {
            return Err(HeroError::Moving);
        }
        let from = object.position;
        let to = self.step_from(from, direction);
        let probe = self.tile_centre(to);
        let blocked = self.is_collision(probe.x, probe.y);

        let character = self.hero_character_mut()?;
        if blocked {
            character.face(direction);
            debug!(direction = %direction, "hero_move_blocked");
            return Err(HeroError::Blocked(direction));
        }
        character.begin_move(from, to, direction);
        debug!(direction = %direction, to_x = to.x, to_y = to.y, "hero_move_started");
        Ok(to)
    }

    pub fn move_hero_forward(&mut self) -> Result<Vec2, HeroError> {
        let facing = self.standing_hero()?.2.facing();
        self.move_hero(facing)
    }

    pub fn turn_hero_left(&mut self) -> Result<Direction, HeroError> {
        let character = self.hero_character_mut()?;
        if !character.turn_left() {
            return Err(HeroError::Moving);
        }
        Ok(character.facing())
    }

    pub fn configure_hero(&mut self, hero_name: &str, type_number: u32) -> Result<(), HeroError> {
        let handle = self.hero.ok_or(HeroError::NoHero)?;
        let tiles = &self.tiles;
        let layer = self.layers.get_mut(handle.layer).ok_or(HeroError::NoHero)?;
        let LayerKind::Objects(objects) = &mut layer.kind else {
            return Err(HeroError::NoHero);
        };
        let character = objects
            .get_mut(handle.index)
            .and_then(GameObject::character_mut)
            .ok_or(HeroError::NoHero)?;
        character.configure(hero_name, type_number, tiles);
        Ok(())
    }

    pub fn is_hero_moving(&self) -> Result<bool, HeroError> {
        Ok(self.standing_hero()?.2.is_moving())
    }

    pub fn is_hero_facing(&self, direction: Direction) -> Result<bool, HeroError> {
        Ok(self.standing_hero()?.2.facing() == direction)
    }

    pub fn is_hero_at_goal(&self) -> Result<bool, HeroError> {
        self.standing_hero()?;
        Ok(self.is_complete())
    }

    pub fn is_collision_in_front(&self) -> Result<bool, HeroError> {
        let point = self.front_point()?;
        Ok(self.is_collision(point.x, point.y))
    }

    /// Whether an object of `kind` occupies the tile in front of the hero.
    pub fn is_object_in_front(&self, kind: ObjectKind) -> Result<bool, HeroError> {
        let (hero, _, _) = self.standing_hero()?;
        let point = self.front_point()?;
        let found = self.layers.iter().enumerate().any(|(layer_index, layer)| {
            layer.as_objects().is_some_and(|objects| {
                objects.objects().iter().enumerate().any(|(index, object)| {
                    let handle = ObjectHandle {
                        layer: layer_index,
                        index,
                    };
                    handle != hero && object.kind == kind && object.is_at_position(point.x, point.y)
                })
            })
        });
        Ok(found)
    }

    /// Interacts with whatever stands in front of the hero, following switch
    /// `controls` links.
    pub fn hero_interact(&mut self) -> Result<InteractReport, HeroError> {
        let (hero, _, character) = self.standing_hero()?;
        if character.is_moving() {
            return Err(HeroError::Moving);
        }
        let point = self.front_point()?;
        let handle = self
            .object_at_excluding(point.x, point.y, Some(hero))
            .ok_or(HeroError::NothingInFront)?;
        let object = self.object_mut(handle).ok_or(HeroError::NothingInFront)?;
        let outcome = object.interact();
        if outcome == InteractOutcome::NotInteractive {
            return Err(HeroError::NotInteractive {
                name: display_name(object),
            });
        }
        let target = object.id;
        let kind = object.kind;
        debug!(target, kind = %kind, outcome = ?outcome, "hero_interacted");

        let mut report = InteractReport {
            target,
            kind,
            outcome,
            forwarded: Vec::new(),
        };
        let mut next = forward_target(object, outcome);
        while let Some(id) = next {
            if report.forwarded.len() >= MAX_FORWARD_DEPTH {
                warn!(switch = target, depth = MAX_FORWARD_DEPTH, "switch_chain_truncated");
                break;
            }
            let Some(linked) = self
                .registry
                .by_id(id)
                .and_then(|handle| self.object_mut(handle))
            else {
                warn!(switch = target, controls = id, "switch_target_missing");
                return Err(HeroError::SwitchTargetMissing(id));
            };
            let linked_outcome = linked.interact();
            report.forwarded.push((id, linked_outcome));
            next = forward_target(linked, linked_outcome);
        }
        Ok(report)
    }
}

fn forward_target(object: &GameObject, outcome: InteractOutcome) -> Option<ObjectId> {
    let changed = matches!(outcome, InteractOutcome::Changed { .. });
    (object.kind == ObjectKind::TwoWaySwitch && changed)
        .then(|| object.controls())
        .flatten()
}

fn display_name(object: &GameObject) -> String {
    if object.name.is_empty() {
        format!("{} {}", object.kind, object.id)
    } else {
        object.name.clone()
    }
}

fn validate_dimensions(description: &LevelDescription) -> Result<(), LevelLoadError> {
    if description.tilewidth == 0 || description.tileheight == 0 {
        return Err(LevelLoadError::InvalidTileSize {
            width: description.tilewidth,
            height: description.tileheight,
        });
    }
    if description.width == 0 || description.height == 0 {
        return Err(LevelLoadError::InvalidDimensions {
            width: description.width,
            height: description.height,
        });
    }
    if description.tilewidth > MAX_TILE_SIZE || description.tileheight > MAX_TILE_SIZE {
        return Err(LevelLoadError::TileTooLarge {
            width: description.tilewidth,
            height: description.tileheight,
        });
    }
    let pixel_width = u64::from(description.width) * u64::from(description.tilewidth);
    let pixel_height = u64::from(description.height) * u64::from(description.tileheight);
    let limit = u64::from(MAX_LEVEL_PIXELS);
    if pixel_width > limit || pixel_height > limit {
        return Err(LevelLoadError::LevelTooLarge {
            width: pixel_width,
            height: pixel_height,
        });
    }
    Ok(())
}

fn layer_info(layer: &LayerDescription, level: &LevelDescription) -> LayerInfo {
    let (width, height) = if layer.width == 0 || layer.height == 0 {
        (level.width, level.height)
    } else {
        (layer.width, layer.height)
    };
    LayerInfo {
        id: layer.id,
        name: layer.name.clone(),
        visible: layer.visible,
        opacity: layer.opacity.clamp(0.0, 1.0),
        offset: (
            layer
                .x
                .saturating_mul(level.tilewidth as i32)
                .saturating_add(layer.offsetx.round() as i32),
            layer
                .y
                .saturating_mul(level.tileheight as i32)
                .saturating_add(layer.offsety.round() as i32),
        ),
        width,
        height,
        properties: properties_from_descriptions(&layer.properties),
    }
}

/// The object named `MainCharacter`, else the first character placed.
fn find_hero(registry: &ObjectRegistry, layers: &[Layer]) -> Option<ObjectHandle> {
    let is_character = |handle: &ObjectHandle| {
        layers
            .get(handle.layer)
            .and_then(Layer::as_objects)
            .and_then(|objects| objects.get(handle.index))
            .is_some_and(|object| object.character().is_some())
    };
    registry
        .all_by_name(HERO_OBJECT_NAME)
        .iter()
        .copied()
        .find(|handle| is_character(handle))
        .or_else(|| {
            registry
                .by_kind(ObjectKind::Character)
                .iter()
                .copied()
                .find(|handle| is_character(handle))
        })
}
