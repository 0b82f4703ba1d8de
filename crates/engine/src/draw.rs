use crate::assets::TileImage;
use crate::tiles::SourceRect;

/// The draw contract layers and objects render through.
///
/// `dest_x`/`dest_y` are the top-left pixel of the destination rectangle,
/// which has the size of `source`.
pub trait DrawTarget {
    fn draw_tile(
        &mut self,
        image: &TileImage,
        source: SourceRect,
        dest_x: i32,
        dest_y: i32,
        opacity: f32,
    );
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DrawCall {
    pub source: SourceRect,
    pub dest_x: i32,
    pub dest_y: i32,
    pub opacity: f32,
}

/// Records draw calls instead of rasterizing them.
#[derive(Debug, Default)]
pub struct DrawRecorder {
    pub calls: Vec<DrawCall>,
}

impl DrawRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn calls_at(&self, dest_x: i32, dest_y: i32) -> impl Iterator<Item = &DrawCall> {
        self.calls
            .iter()
            .filter(move |call| call.dest_x == dest_x && call.dest_y == dest_y)
    }
}

impl DrawTarget for DrawRecorder {
    fn draw_tile(
        &mut self,
        _image: &TileImage,
        source: SourceRect,
        dest_x: i32,
        dest_y: i32,
        opacity: f32,
    ) {
        self.calls.push(DrawCall {
            source,
            dest_x,
            dest_y,
            opacity,
        });
    }
}
