mod factory;
mod properties;
mod tile;
mod tileset;

pub use factory::{GidLookup, TileFactory, GID_MASK};
pub use properties::{properties_from_descriptions, Properties, PropertyDescription, PropertyValue};
pub use tile::{
    AnimatedTile, AnimationFrame, SourceRect, Tile, Visual, COLLISION_PROPERTY, STATE_PROPERTY,
};
pub use tileset::{
    FrameDescription, TileDescription, TileOffsetDescription, Tileset, TilesetDescription,
    TilesetRef,
};
