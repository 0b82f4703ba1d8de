use std::fmt;

/// World-space position in pixels. For placed objects `y` is the bottom edge.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Vec2 {
    pub x: f32,
    pub y: f32,
}

impl Vec2 {
    pub const fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    pub fn lerp(self, target: Vec2, t: f32) -> Vec2 {
        Vec2 {
            x: self.x + (target.x - self.x) * t,
            y: self.y + (target.y - self.y) * t,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    South,
    East,
    North,
    West,
}

impl Direction {
    pub const ALL: [Direction; 4] = [
        Direction::South,
        Direction::East,
        Direction::North,
        Direction::West,
    ];

    pub const fn index(self) -> usize {
        match self {
            Direction::South => 0,
            Direction::East => 1,
            Direction::North => 2,
            Direction::West => 3,
        }
    }

    pub const fn name(self) -> &'static str {
        match self {
            Direction::South => "south",
            Direction::East => "east",
            Direction::North => "north",
            Direction::West => "west",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|direction| direction.name().eq_ignore_ascii_case(name))
    }

    /// Counter-clockwise: north, west, south, east, north.
    pub const fn turned_left(self) -> Self {
        match self {
            Direction::North => Direction::West,
            Direction::West => Direction::South,
            Direction::South => Direction::East,
            Direction::East => Direction::North,
        }
    }

    /// One tile step in world pixels (y grows southwards).
    pub fn offset(self, tile_width: f32, tile_height: f32) -> Vec2 {
        match self {
            Direction::South => Vec2::new(0.0, tile_height),
            Direction::East => Vec2::new(tile_width, 0.0),
            Direction::North => Vec2::new(0.0, -tile_height),
            Direction::West => Vec2::new(-tile_width, 0.0),
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
