mod character;
mod format;
mod geometry;
mod layer;
#[allow(clippy::module_inception)]
mod level;
mod object_factory;
mod objects;
mod registry;

#[cfg(test)]
pub(crate) mod fixtures;

pub use character::{
    character_state_name, parse_character_state, Activity, Character, CHARACTER_TYPE,
    DEFAULT_TYPE_NUMBER, MOVE_DURATION,
};
pub use format::{
    LayerDescription, LevelDescription, ObjectDescription, OBJECT_LAYER_TYPE, TILE_LAYER_TYPE,
};
pub use geometry::{Direction, Vec2};
pub use layer::{Layer, LayerInfo, LayerKind, ObjectLayer, TileCell, TileLayer};
pub use level::{
    HeroError, InteractReport, Level, LevelLoadError, MAX_LEVEL_PIXELS, MAX_TILE_SIZE,
};
pub use object_factory::{resolve_kind, ObjectFactory, HERO_OBJECT_NAME};
pub use objects::{
    GameObject, InteractOutcome, Interaction, KindBehavior, ObjectBody, ObjectId, ObjectKind,
    ObjectState, StateVisuals, StatefulBody, CONTROLS_PROPERTY,
};
pub use registry::{ObjectHandle, ObjectRegistry};
