use std::sync::Arc;
use std::time::Duration;

use super::Properties;

/// Property that marks a tile (or an object's current visual) as solid.
pub const COLLISION_PROPERTY: &str = "collision";
/// Property naming the object state a tile depicts.
pub const STATE_PROPERTY: &str = "state";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SourceRect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AnimationFrame {
    pub tile_id: u32,
    pub duration_ms: u32,
}

/// Immutable drawable unit: a region of one tileset image plus metadata.
///
/// Tiles are owned by their [`Tileset`](super::Tileset) and shared by `Arc`
/// with every layer cell and object that shows them.
#[derive(Debug, Clone, PartialEq)]
pub struct Tile {
    pub set_id: usize,
    pub local_id: u32,
    pub region: SourceRect,
    pub draw_offset: (i32, i32),
    pub visible: bool,
    pub kind: String,
    pub properties: Properties,
    pub animation: Vec<AnimationFrame>,
}

impl Tile {
    pub fn state(&self) -> Option<&str> {
        self.properties.get_str(STATE_PROPERTY)
    }

    pub fn is_collision(&self) -> Option<bool> {
        self.properties.get_bool(COLLISION_PROPERTY)
    }

    pub fn is_animated(&self) -> bool {
        !self.animation.is_empty()
    }
}

/// A cyclic sequence of tiles. `base` is the tile that carried the
/// animation descriptor; its identity and properties stand for the whole
/// animation.
#[derive(Debug, Clone)]
pub struct AnimatedTile {
    base: Arc<Tile>,
    frames: Vec<(Arc<Tile>, Duration)>,
    current: usize,
    elapsed: Duration,
}

const MIN_FRAME_DURATION: Duration = Duration::from_millis(1);

impl AnimatedTile {
    /// Returns `None` for an empty frame list. Zero durations are raised to
    /// one millisecond so that every frame is shown.
    pub fn new(base: Arc<Tile>, frames: Vec<(Arc<Tile>, Duration)>) -> Option<Self> {
        if frames.is_empty() {
            return None;
        }
        let frames = frames
            .into_iter()
            .map(|(tile, duration)| (tile, duration.max(MIN_FRAME_DURATION)))
            .collect();
        Some(Self {
            base,
            frames,
            current: 0,
            elapsed: Duration::ZERO,
        })
    }

    pub fn base(&self) -> &Arc<Tile> {
        &self.base
    }

    pub fn frame_count(&self) -> usize {
        self.frames.len()
    }

    pub fn current_index(&self) -> usize {
        self.current
    }

    pub fn current_frame(&self) -> &Arc<Tile> {
        &self.frames[self.current].0
    }

    pub fn advance(&mut self, dt: Duration) {
        self.elapsed = self.elapsed.saturating_add(dt);
        loop {
            let frame_duration = self.frames[self.current].1;
            if self.elapsed < frame_duration {
                break;
            }
            self.elapsed -= frame_duration;
            self.current = (self.current + 1) % self.frames.len();
        }
    }

    pub fn reset(&mut self) {
        self.current = 0;
        self.elapsed = Duration::ZERO;
    }
}

/// What a layer cell or object state draws.
#[derive(Debug, Clone)]
pub enum Visual {
    Static(Arc<Tile>),
    Animated(AnimatedTile),
}

impl Visual {
    /// The tile whose metadata describes this visual.
    pub fn tile(&self) -> &Arc<Tile> {
        match self {
            Visual::Static(tile) => tile,
            Visual::Animated(animated) => animated.base(),
        }
    }

    /// The tile to draw this frame.
    pub fn frame(&self) -> &Arc<Tile> {
        match self {
            Visual::Static(tile) => tile,
            Visual::Animated(animated) => animated.current_frame(),
        }
    }

    pub fn advance(&mut self, dt: Duration) {
        if let Visual::Animated(animated) = self {
            animated.advance(dt);
        }
    }

    pub fn restart(&mut self) {
        if let Visual::Animated(animated) = self {
            animated.reset();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tile(local_id: u32) -> Arc<Tile> {
        Arc::new(Tile {
            set_id: 0,
            local_id,
            region: SourceRect {
                x: local_id * 16,
                y: 0,
                width: 16,
                height: 16,
            },
            draw_offset: (0, 0),
            visible: true,
            kind: String::new(),
            properties: Properties::new(),
            animation: Vec::new(),
        })
    }

    fn three_frame_animation() -> AnimatedTile {
        AnimatedTile::new(
            tile(0),
            vec![
                (tile(0), Duration::from_millis(100)),
                (tile(1), Duration::from_millis(50)),
                (tile(2), Duration::from_millis(100)),
            ],
        )
        .expect("animation")
    }

    #[test]
    fn empty_frame_list_is_rejected() {
        assert!(AnimatedTile::new(tile(0), Vec::new()).is_none());
    }

    #[test]
    fn frames_advance_on_their_own_durations() {
        let mut animation = three_frame_animation();
        animation.advance(Duration::from_millis(99));
        assert_eq!(animation.current_frame().local_id, 0);
        animation.advance(Duration::from_millis(1));
        assert_eq!(animation.current_frame().local_id, 1);
        animation.advance(Duration::from_millis(50));
        assert_eq!(animation.current_frame().local_id, 2);
    }

    #[test]
    fn index_wraps_modulo_frame_count() {
        let mut animation = three_frame_animation();
        animation.advance(Duration::from_millis(250));
        assert_eq!(animation.current_index(), 0);
        animation.advance(Duration::from_millis(1_250));
        assert_eq!(animation.current_index(), 0);
    }

    #[test]
    fn large_step_skips_multiple_frames() {
        let mut animation = three_frame_animation();
        animation.advance(Duration::from_millis(160));
        assert_eq!(animation.current_index(), 2);
    }

    #[test]
    fn zero_duration_frames_still_cycle() {
        let mut animation =
            AnimatedTile::new(tile(0), vec![(tile(0), Duration::ZERO), (tile(1), Duration::ZERO)])
                .expect("animation");
        animation.advance(Duration::from_millis(1));
        assert_eq!(animation.current_index(), 1);
    }

    #[test]
    fn animated_visual_reports_base_identity_and_current_frame() {
        let mut visual = Visual::Animated(three_frame_animation());
        visual.advance(Duration::from_millis(120));
        assert_eq!(visual.tile().local_id, 0);
        assert_eq!(visual.frame().local_id, 1);
        visual.restart();
        assert_eq!(visual.frame().local_id, 0);
    }
}
