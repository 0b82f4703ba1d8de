use std::path::Path;
use std::sync::Arc;

use tracing::warn;

use crate::assets::{AssetError, AssetSource, TileImage};

use super::{Tile, Tileset, TilesetRef, Visual};

/// Tiled stores horizontal/vertical/diagonal flip flags in the top bits.
pub const GID_MASK: u32 = 0x1FFF_FFFF;

#[derive(Debug, Clone, Copy)]
pub enum GidLookup<'a> {
    Empty,
    Found {
        tileset: &'a Tileset,
        tile: &'a Arc<Tile>,
    },
    Unknown(u32),
}

/// All tilesets loaded for one level, in declaration order.
#[derive(Debug, Clone, Default)]
pub struct TileFactory {
    tilesets: Vec<Tileset>,
}

impl TileFactory {
    /// Loads every referenced tileset. Any failure aborts the whole set.
    pub fn load(
        refs: &[TilesetRef],
        path_prefix: &Path,
        assets: &dyn AssetSource,
    ) -> Result<Self, AssetError> {
        let mut tilesets = Vec::with_capacity(refs.len());
        for (set_id, reference) in refs.iter().enumerate() {
            let tileset = Tileset::create(
                &reference.source,
                reference.firstgid,
                path_prefix,
                assets,
                set_id,
            )?;
            tilesets.push(tileset);
        }
        Ok(Self { tilesets })
    }

    /// `tilesets[i]` must have been built with `set_id == i`.
    pub fn from_tilesets(tilesets: Vec<Tileset>) -> Self {
        Self { tilesets }
    }

    pub fn tilesets(&self) -> &[Tileset] {
        &self.tilesets
    }

    pub fn is_empty(&self) -> bool {
        self.tilesets.is_empty()
    }

    pub fn tileset(&self, set_id: usize) -> Option<&Tileset> {
        self.tilesets.get(set_id)
    }

    pub fn image_for(&self, tile: &Tile) -> Option<&TileImage> {
        self.tileset(tile.set_id).map(Tileset::image)
    }

    pub fn resolve_global_id(&self, raw_gid: u32) -> GidLookup<'_> {
        let gid = raw_gid & GID_MASK;
        if gid == 0 {
            return GidLookup::Empty;
        }
        for tileset in &self.tilesets {
            if let Some(tile) = tileset.tile_by_global_id(gid) {
                return GidLookup::Found { tileset, tile };
            }
        }
        GidLookup::Unknown(gid)
    }

    /// Gid 0 is "no tile" and resolves silently to `None`.
    pub fn tile_by_global_id(&self, raw_gid: u32) -> Option<&Arc<Tile>> {
        match self.resolve_global_id(raw_gid) {
            GidLookup::Found { tile, .. } => Some(tile),
            GidLookup::Empty => None,
            GidLookup::Unknown(gid) => {
                warn!(gid, tileset_count = self.tilesets.len(), "tile_lookup_missing");
                None
            }
        }
    }

    pub fn tile_by_type_and_state(&self, kind: &str, state: &str) -> Option<&Arc<Tile>> {
        self.tilesets
            .iter()
            .find_map(|tileset| tileset.tile_by_type_and_state(kind, state))
    }

    pub fn visual_for(&self, tile: &Arc<Tile>) -> Visual {
        match self.tileset(tile.set_id) {
            Some(tileset) => tileset.visual_for(tile),
            None => Visual::Static(Arc::clone(tile)),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use image::RgbaImage;

    use super::*;
    use crate::tiles::TilesetDescription;

    fn tileset(set_id: usize, first_gid: u32, tilecount: u32, tiles: &str) -> Tileset {
        let json = format!(
            r#"{{"name":"set{set_id}","columns":4,"image":"s.png","tilecount":{tilecount},
                "tilewidth":16,"tileheight":16,"tiles":{tiles}}}"#
        );
        let description: TilesetDescription = serde_json::from_str(&json).expect("description");
        Tileset::from_description(
            description,
            PathBuf::from(format!("set{set_id}.json")),
            first_gid,
            Arc::new(RgbaImage::new(64, 64)),
            set_id,
        )
    }

    fn factory() -> TileFactory {
        TileFactory::from_tilesets(vec![
            tileset(0, 1, 8, "[]"),
            tileset(
                1,
                9,
                4,
                r#"[{"id":2,"type":"Door","properties":[{"name":"state","type":"string","value":"open"}]}]"#,
            ),
        ])
    }

    #[test]
    fn global_ids_resolve_across_tilesets() {
        let factory = factory();
        match factory.resolve_global_id(3) {
            GidLookup::Found { tileset, tile } => {
                assert_eq!(tileset.first_gid(), 1);
                assert_eq!(tile.local_id, 2);
            }
            other => panic!("unexpected {other:?}"),
        }
        let tile = factory.tile_by_global_id(11).expect("second set");
        assert_eq!((tile.set_id, tile.local_id), (1, 2));
    }

    #[test]
    fn gid_zero_is_empty_and_out_of_range_is_unknown() {
        let factory = factory();
        assert!(matches!(factory.resolve_global_id(0), GidLookup::Empty));
        assert!(matches!(factory.resolve_global_id(13), GidLookup::Unknown(13)));
        assert!(factory.tile_by_global_id(0).is_none());
        assert!(factory.tile_by_global_id(99).is_none());
    }

    #[test]
    fn flip_flags_are_stripped() {
        let factory = factory();
        let flipped = 0x8000_0000 | 3;
        assert_eq!(
            factory.tile_by_global_id(flipped).map(|tile| tile.local_id),
            Some(2)
        );
    }

    #[test]
    fn type_and_state_search_spans_tilesets() {
        let factory = factory();
        let door = factory
            .tile_by_type_and_state("Door", "open")
            .expect("door tile");
        assert_eq!(door.set_id, 1);
        assert!(factory.image_for(door).is_some());
    }
}
