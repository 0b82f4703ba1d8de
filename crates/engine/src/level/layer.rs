use std::sync::Arc;
use std::time::Duration;

use tracing::warn;

use crate::draw::DrawTarget;
use crate::tiles::{AnimatedTile, Properties, Tile, TileFactory, Visual, COLLISION_PROPERTY};

use super::objects::GameObject;

#[derive(Debug, Clone)]
pub struct LayerInfo {
    pub id: u32,
    pub name: String,
    pub visible: bool,
    pub opacity: f32,
    pub offset: (i32, i32),
    pub width: u32,
    pub height: u32,
    pub properties: Properties,
}

impl LayerInfo {
    /// Layers carrying a truthy `collision` property block every non-empty
    /// cell.
    pub fn is_collision_layer(&self) -> bool {
        self.properties.get_bool(COLLISION_PROPERTY).unwrap_or(false)
    }
}

#[derive(Debug)]
pub struct Layer {
    pub info: LayerInfo,
    pub kind: LayerKind,
}

#[derive(Debug)]
pub enum LayerKind {
    Tiles(TileLayer),
    Objects(ObjectLayer),
}

impl Layer {
    pub fn update(&mut self, dt: Duration) {
        match &mut self.kind {
            LayerKind::Tiles(tiles) => tiles.update(dt),
            LayerKind::Objects(objects) => objects.update(dt),
        }
    }

    pub fn draw(
        &self,
        target: &mut dyn DrawTarget,
        factory: &TileFactory,
        tile_width: u32,
        tile_height: u32,
    ) {
        if !self.info.visible {
            return;
        }
        match &self.kind {
            LayerKind::Tiles(tiles) => {
                tiles.draw(target, factory, &self.info, tile_width, tile_height)
            }
            LayerKind::Objects(objects) => objects.draw(target, factory, &self.info),
        }
    }

    pub fn as_tiles(&self) -> Option<&TileLayer> {
        match &self.kind {
            LayerKind::Tiles(tiles) => Some(tiles),
            LayerKind::Objects(_) => None,
        }
    }

    pub fn as_objects(&self) -> Option<&ObjectLayer> {
        match &self.kind {
            LayerKind::Objects(objects) => Some(objects),
            LayerKind::Tiles(_) => None,
        }
    }
}

#[derive(Debug, Clone)]
pub enum TileCell {
    Empty,
    Static(Arc<Tile>),
    /// Index into the owning layer's animation table. Cells showing the same
    /// animated tile share one clock.
    Animated(usize),
}

#[derive(Debug, Clone)]
pub struct TileLayer {
    width: u32,
    height: u32,
    cells: Vec<TileCell>,
    animations: Vec<AnimatedTile>,
}

impl TileLayer {
    /// Resolves `data[row * width + col]` for every cell. Missing entries
    /// and unresolvable gids leave the cell empty.
    pub fn from_gids(width: u32, height: u32, data: &[u32], factory: &TileFactory) -> Self {
        let cell_count = width as usize * height as usize;
        let mut cells = Vec::with_capacity(cell_count);
        for index in 0..cell_count {
            let gid = data.get(index).copied().unwrap_or(0);
            let cell = match factory.tile_by_global_id(gid) {
                Some(tile) => TileCell::Static(Arc::clone(tile)),
                None => TileCell::Empty,
            };
            cells.push(cell);
        }
        Self {
            width,
            height,
            cells,
            animations: Vec::new(),
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    fn index(&self, col: u32, row: u32) -> Option<usize> {
        (col < self.width && row < self.height)
            .then(|| row as usize * self.width as usize + col as usize)
    }

    pub fn cell(&self, col: u32, row: u32) -> Option<&TileCell> {
        self.index(col, row).map(|index| &self.cells[index])
    }

    /// The tile occupying a cell; for animated cells, the animation's base
    /// tile.
    pub fn get_tile_at(&self, row: u32, col: u32) -> Option<&Arc<Tile>> {
        let Some(cell) = self.cell(col, row) else {
            warn!(
                row,
                col,
                width = self.width,
                height = self.height,
                "tile_layer_lookup_out_of_range"
            );
            return None;
        };
        match cell {
            TileCell::Empty => None,
            TileCell::Static(tile) => Some(tile),
            TileCell::Animated(index) => self.animations.get(*index).map(AnimatedTile::base),
        }
    }

    pub fn is_occupied(&self, col: u32, row: u32) -> bool {
        matches!(
            self.cell(col, row),
            Some(TileCell::Static(_)) | Some(TileCell::Animated(_))
        )
    }

    pub fn replace_tile(&mut self, col: u32, row: u32, cell: TileCell) -> bool {
        match self.index(col, row) {
            Some(index) => {
                self.cells[index] = cell;
                true
            }
            None => {
                warn!(row, col, "tile_layer_replace_out_of_range");
                false
            }
        }
    }

    pub fn add_animation(&mut self, animation: AnimatedTile) -> usize {
        self.animations.push(animation);
        self.animations.len() - 1
    }

    pub fn animation_count(&self) -> usize {
        self.animations.len()
    }

    /// Swaps every static cell whose tile carries an animation descriptor for
    /// a shared animated wrapper.
    pub fn wrap_animated_tiles(&mut self, factory: &TileFactory) {
        let mut by_tile: Vec<(usize, u32, usize)> = Vec::new();
        for row in 0..self.height {
            for col in 0..self.width {
                let Some(TileCell::Static(tile)) = self.cell(col, row) else {
                    continue;
                };
                if !tile.is_animated() {
                    continue;
                }
                let key = (tile.set_id, tile.local_id);
                let existing = by_tile
                    .iter()
                    .find(|(set_id, local_id, _)| (*set_id, *local_id) == key)
                    .map(|(_, _, index)| *index);
                let index = match existing {
                    Some(index) => index,
                    None => {
                        let tile = Arc::clone(tile);
                        let Visual::Animated(animation) = factory.visual_for(&tile) else {
                            continue;
                        };
                        let index = self.add_animation(animation);
                        by_tile.push((key.0, key.1, index));
                        index
                    }
                };
                self.replace_tile(col, row, TileCell::Animated(index));
            }
        }
    }

    pub fn update(&mut self, dt: Duration) {
        for animation in &mut self.animations {
            animation.advance(dt);
        }
    }

    fn draw(
        &self,
        target: &mut dyn DrawTarget,
        factory: &TileFactory,
        info: &LayerInfo,
        tile_width: u32,
        tile_height: u32,
    ) {
        for row in 0..self.height {
            for col in 0..self.width {
                let tile = match self.cell(col, row) {
                    Some(TileCell::Static(tile)) => tile,
                    Some(TileCell::Animated(index)) => match self.animations.get(*index) {
                        Some(animation) => animation.current_frame(),
                        None => continue,
                    },
                    Some(TileCell::Empty) | None => continue,
                };
                if !tile.visible {
                    continue;
                }
                let Some(image) = factory.image_for(tile) else {
                    continue;
                };
                // Bottom-left of the tile sits on the bottom-left of its cell.
                let cell_left = i64::from(col) * i64::from(tile_width);
                let cell_bottom = (i64::from(row) + 1) * i64::from(tile_height);
                let dest_x = saturate_i32(
                    i64::from(info.offset.0) + cell_left + i64::from(tile.draw_offset.0),
                );
                let dest_y = saturate_i32(
                    i64::from(info.offset.1) + cell_bottom - i64::from(tile.region.height)
                        + i64::from(tile.draw_offset.1),
                );
                target.draw_tile(image, tile.region, dest_x, dest_y, info.opacity);
            }
        }
    }
}

#[derive(Debug, Default)]
pub struct ObjectLayer {
    objects: Vec<GameObject>,
}

impl ObjectLayer {
    pub fn new(objects: Vec<GameObject>) -> Self {
        Self { objects }
    }

    pub fn objects(&self) -> &[GameObject] {
        &self.objects
    }

    pub fn objects_mut(&mut self) -> &mut [GameObject] {
        &mut self.objects
    }

    pub fn get(&self, index: usize) -> Option<&GameObject> {
        self.objects.get(index)
    }

    pub fn get_mut(&mut self, index: usize) -> Option<&mut GameObject> {
        self.objects.get_mut(index)
    }

    pub fn update(&mut self, dt: Duration) {
        for object in &mut self.objects {
            object.update(dt);
        }
    }

    fn draw(&self, target: &mut dyn DrawTarget, factory: &TileFactory, info: &LayerInfo) {
        for object in &self.objects {
            object.draw(target, factory, info.offset, info.opacity);
        }
    }
}

fn saturate_i32(value: i64) -> i32 {
    value.clamp(i64::from(i32::MIN), i64::from(i32::MAX)) as i32
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use image::RgbaImage;

    use super::*;
    use crate::draw::DrawRecorder;
    use crate::tiles::{Tileset, TilesetDescription};

    fn factory() -> TileFactory {
        let description: TilesetDescription = serde_json::from_str(
            r#"{"columns":4,"image":"t.png","tilecount":8,"tilewidth":16,"tileheight":16,
                "tiles":[{"id":3,"animation":[{"tileid":3,"duration":100},{"tileid":4,"duration":100}]}]}"#,
        )
        .expect("description");
        TileFactory::from_tilesets(vec![Tileset::from_description(
            description,
            PathBuf::from("t.json"),
            1,
            Arc::new(RgbaImage::new(64, 32)),
            0,
        )])
    }

    fn info() -> LayerInfo {
        LayerInfo {
            id: 1,
            name: "ground".to_string(),
            visible: true,
            opacity: 0.5,
            offset: (0, 0),
            width: 3,
            height: 2,
            properties: Properties::new(),
        }
    }

    #[test]
    fn cells_resolve_row_major_gids() {
        let factory = factory();
        let layer = TileLayer::from_gids(3, 2, &[1, 0, 2, 0, 3, 0], &factory);
        assert_eq!(layer.get_tile_at(0, 0).map(|t| t.local_id), Some(0));
        assert!(layer.get_tile_at(0, 1).is_none());
        assert_eq!(layer.get_tile_at(0, 2).map(|t| t.local_id), Some(1));
        assert_eq!(layer.get_tile_at(1, 1).map(|t| t.local_id), Some(2));
    }

    #[test]
    fn out_of_range_lookup_is_absent() {
        let factory = factory();
        let layer = TileLayer::from_gids(3, 2, &[1; 6], &factory);
        assert!(layer.get_tile_at(2, 0).is_none());
        assert!(layer.get_tile_at(0, 3).is_none());
        assert!(!layer.is_occupied(3, 0));
    }

    #[test]
    fn animated_cells_share_one_wrapper() {
        let factory = factory();
        let mut layer = TileLayer::from_gids(3, 2, &[4, 4, 1, 0, 4, 0], &factory);
        layer.wrap_animated_tiles(&factory);
        assert_eq!(layer.animation_count(), 1);
        assert!(matches!(layer.cell(0, 0), Some(TileCell::Animated(0))));
        assert!(matches!(layer.cell(1, 1), Some(TileCell::Animated(0))));
        assert!(matches!(layer.cell(2, 0), Some(TileCell::Static(_))));
        assert_eq!(layer.get_tile_at(0, 0).map(|t| t.local_id), Some(3));
    }

    #[test]
    fn draw_emits_bottom_anchored_calls_with_layer_opacity() {
        let factory = factory();
        let mut layer = TileLayer::from_gids(3, 2, &[0, 0, 0, 0, 4, 0], &factory);
        layer.wrap_animated_tiles(&factory);
        layer.update(Duration::from_millis(100));

        let mut recorder = DrawRecorder::new();
        layer.draw(&mut recorder, &factory, &info(), 16, 16);
        assert_eq!(recorder.calls.len(), 1);
        let call = recorder.calls[0];
        assert_eq!((call.dest_x, call.dest_y), (16, 16));
        // second frame, local id 4: row 1, col 0
        assert_eq!((call.source.x, call.source.y), (0, 16));
        assert_eq!(call.opacity, 0.5);
    }
}
