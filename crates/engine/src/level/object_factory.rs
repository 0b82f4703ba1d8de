use std::sync::Arc;

use tracing::warn;

use crate::tiles::{properties_from_descriptions, Properties, Tile, TileFactory, STATE_PROPERTY};

use super::character::{parse_character_state, Character, DEFAULT_TYPE_NUMBER};
use super::format::ObjectDescription;
use super::geometry::{Direction, Vec2};
use super::objects::{GameObject, ObjectBody, ObjectKind, ObjectState, StateVisuals, StatefulBody};
use super::registry::{ObjectHandle, ObjectRegistry};

/// Name of the object that becomes the player-controlled hero.
pub const HERO_OBJECT_NAME: &str = "MainCharacter";

const FACING_PROPERTY: &str = "facing";
const TYPE_NUMBER_PROPERTY: &str = "typeNumber";
const HERO_NAME_PROPERTY: &str = "heroName";

/// Builds game objects from their descriptions and registers each one.
#[derive(Debug, Default)]
pub struct ObjectFactory {
    registry: ObjectRegistry,
}

impl ObjectFactory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn create(
        &mut self,
        description: &ObjectDescription,
        tiles: &TileFactory,
        handle: ObjectHandle,
    ) -> GameObject {
        let object = build_object(description, tiles);
        self.registry.register(&object, handle);
        object
    }

    pub fn registry(&self) -> &ObjectRegistry {
        &self.registry
    }

    pub fn into_registry(self) -> ObjectRegistry {
        self.registry
    }
}

/// The object's kind: explicit `type`/`class` first, then the default tile's
/// `type`. Unknown names fall back to a plain decoration.
pub fn resolve_kind(description: &ObjectDescription, default_tile: Option<&Arc<Tile>>) -> ObjectKind {
    if description.name == HERO_OBJECT_NAME {
        return ObjectKind::Character;
    }
    let type_name = description
        .explicit_type()
        .or_else(|| default_tile.map(|tile| tile.kind.as_str()))
        .filter(|name| !name.is_empty());
    let Some(type_name) = type_name else {
        return ObjectKind::Decoration;
    };
    match ObjectKind::from_type_name(type_name) {
        Some(kind) => kind,
        None => {
            warn!(
                id = description.id,
                name = %description.name,
                type_name,
                "object_type_unknown"
            );
            ObjectKind::Decoration
        }
    }
}

fn build_object(description: &ObjectDescription, tiles: &TileFactory) -> GameObject {
    let default_tile = description
        .gid
        .and_then(|gid| tiles.tile_by_global_id(gid))
        .cloned();
    let kind = resolve_kind(description, default_tile.as_ref());
    let properties = properties_from_descriptions(&description.properties);
    let position = Vec2::new(description.x, description.y);

    let (tile_width, tile_height) = default_tile
        .as_ref()
        .map(|tile| (tile.region.width as f32, tile.region.height as f32))
        .unwrap_or((0.0, 0.0));
    let width = if description.width > 0.0 {
        description.width
    } else {
        tile_width
    };
    let height = if description.height > 0.0 {
        description.height
    } else {
        tile_height
    };

    let body = match kind {
        ObjectKind::Character => ObjectBody::Character(Box::new(build_character(
            description,
            &properties,
            default_tile.as_deref(),
            position,
            tiles,
        ))),
        ObjectKind::Decoration => {
            ObjectBody::Decoration(default_tile.as_ref().map(|tile| tiles.visual_for(tile)))
        }
        stateful => {
            let state = initial_state(stateful, description, &properties, default_tile.as_deref());
            let visuals = StateVisuals::resolve(stateful, &description.name, tiles);
            ObjectBody::Stateful(StatefulBody::new(state, visuals))
        }
    };

    GameObject {
        id: description.id,
        name: description.name.clone(),
        kind,
        position,
        width,
        height,
        visible: description.visible,
        properties,
        body,
    }
}

/// Object `state` property, else the default tile's state, else the first
/// state the kind declares.
fn initial_state(
    kind: ObjectKind,
    description: &ObjectDescription,
    properties: &Properties,
    default_tile: Option<&Tile>,
) -> ObjectState {
    let declared = kind.states();
    let fallback = declared.first().copied().unwrap_or(ObjectState::Default);
    let requested = properties
        .get_str(STATE_PROPERTY)
        .or_else(|| default_tile.and_then(Tile::state));
    let Some(requested) = requested else {
        return fallback;
    };
    match ObjectState::from_name(requested).filter(|state| declared.contains(state)) {
        Some(state) => state,
        None => {
            warn!(
                id = description.id,
                name = %description.name,
                kind = %kind,
                state = requested,
                "object_initial_state_unknown"
            );
            fallback
        }
    }
}

fn build_character(
    description: &ObjectDescription,
    properties: &Properties,
    default_tile: Option<&Tile>,
    position: Vec2,
    tiles: &TileFactory,
) -> Character {
    let from_tile = default_tile
        .and_then(Tile::state)
        .and_then(parse_character_state);
    let facing = properties
        .get_str(FACING_PROPERTY)
        .and_then(Direction::from_name)
        .or(from_tile.map(|(_, facing, _)| facing))
        .unwrap_or(Direction::South);
    let type_number = properties
        .get_u32(TYPE_NUMBER_PROPERTY)
        .or(from_tile.map(|(_, _, type_number)| type_number))
        .unwrap_or(DEFAULT_TYPE_NUMBER);
    let hero_name = properties
        .get_str(HERO_NAME_PROPERTY)
        .unwrap_or(description.name.as_str());
    Character::new(hero_name, facing, type_number, position, tiles)
}
