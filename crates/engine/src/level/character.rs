use std::fmt;
use std::time::Duration;

use tracing::{debug, warn};

use crate::tiles::{TileFactory, Visual};

use super::geometry::{Direction, Vec2};

/// Time one step of one tile takes.
pub const MOVE_DURATION: Duration = Duration::from_millis(500);
/// Tile type carrying the character sprite states.
pub const CHARACTER_TYPE: &str = "Character";
pub const DEFAULT_TYPE_NUMBER: u32 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Activity {
    Standing,
    Walking,
}

impl Activity {
    pub const ALL: [Activity; 2] = [Activity::Standing, Activity::Walking];

    const fn index(self) -> usize {
        match self {
            Activity::Standing => 0,
            Activity::Walking => 1,
        }
    }

    pub const fn name(self) -> &'static str {
        match self {
            Activity::Standing => "standing",
            Activity::Walking => "walking",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|activity| activity.name() == name)
    }
}

impl fmt::Display for Activity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Composite state string, e.g. `walking_north_2`.
pub fn character_state_name(activity: Activity, facing: Direction, type_number: u32) -> String {
    format!("{activity}_{facing}_{type_number}")
}

pub fn parse_character_state(name: &str) -> Option<(Activity, Direction, u32)> {
    let mut parts = name.split('_');
    let activity = Activity::from_name(parts.next()?)?;
    let facing = Direction::from_name(parts.next()?)?;
    let type_number = parts.next()?.parse().ok()?;
    parts.next().is_none().then_some((activity, facing, type_number))
}

#[derive(Debug, Clone, Default)]
struct CharacterVisuals {
    slots: [[Option<Visual>; 4]; 2],
}

impl CharacterVisuals {
    fn resolve(type_number: u32, factory: &TileFactory) -> Self {
        let mut visuals = Self::default();
        for activity in Activity::ALL {
            for facing in Direction::ALL {
                let state = character_state_name(activity, facing, type_number);
                match factory.tile_by_type_and_state(CHARACTER_TYPE, &state) {
                    Some(tile) => {
                        visuals.slots[activity.index()][facing.index()] =
                            Some(factory.visual_for(tile));
                    }
                    None => warn!(state = %state, "character_state_tile_missing"),
                }
            }
        }
        visuals
    }

    fn get(&self, activity: Activity, facing: Direction) -> Option<&Visual> {
        self.slots[activity.index()][facing.index()].as_ref()
    }

    fn get_mut(&mut self, activity: Activity, facing: Direction) -> Option<&mut Visual> {
        self.slots[activity.index()][facing.index()].as_mut()
    }
}

/// The hero: movement interpolation plus the activity/facing state machine.
///
/// Position itself lives on the owning [`GameObject`](super::GameObject);
/// [`Character::update`] takes the current position and returns the next.
#[derive(Debug, Clone)]
pub struct Character {
    hero_name: String,
    type_number: u32,
    activity: Activity,
    facing: Direction,
    move_start: Vec2,
    target: Vec2,
    progress: Duration,
    visuals: CharacterVisuals,
}

impl Character {
    pub fn new(
        hero_name: impl Into<String>,
        facing: Direction,
        type_number: u32,
        position: Vec2,
        factory: &TileFactory,
    ) -> Self {
        Self {
            hero_name: hero_name.into(),
            type_number,
            activity: Activity::Standing,
            facing,
            move_start: position,
            target: position,
            progress: Duration::ZERO,
            visuals: CharacterVisuals::resolve(type_number, factory),
        }
    }

    pub fn hero_name(&self) -> &str {
        &self.hero_name
    }

    pub fn type_number(&self) -> u32 {
        self.type_number
    }

    pub fn activity(&self) -> Activity {
        self.activity
    }

    pub fn facing(&self) -> Direction {
        self.facing
    }

    pub fn target(&self) -> Vec2 {
        self.target
    }

    pub fn is_moving(&self) -> bool {
        self.activity == Activity::Walking
    }

    pub fn state_name(&self) -> String {
        character_state_name(self.activity, self.facing, self.type_number)
    }

    pub fn visual(&self) -> Option<&Visual> {
        self.visuals.get(self.activity, self.facing)
    }

    /// Renames the hero and switches sprite set, re-resolving every visual.
    pub fn configure(&mut self, hero_name: &str, type_number: u32, factory: &TileFactory) {
        self.hero_name = hero_name.to_string();
        if type_number != self.type_number {
            self.type_number = type_number;
            self.visuals = CharacterVisuals::resolve(type_number, factory);
        }
        debug!(hero = %self.hero_name, type_number, "character_configured");
    }

    /// Starts a one-tile move. Rejected without any change while walking.
    pub fn begin_move(&mut self, from: Vec2, to: Vec2, direction: Direction) -> bool {
        if self.is_moving() {
            return false;
        }
        self.facing = direction;
        self.move_start = from;
        self.target = to;
        self.progress = Duration::ZERO;
        self.set_activity(Activity::Walking);
        true
    }

    /// Changes facing without moving, e.g. after bumping into a wall.
    pub fn face(&mut self, direction: Direction) -> bool {
        if self.is_moving() {
            return false;
        }
        self.facing = direction;
        self.restart_visual();
        true
    }

    pub fn turn_left(&mut self) -> bool {
        self.face(self.facing.turned_left())
    }

    /// Advances the current move by `dt` and returns the new position. The
    /// final step lands exactly on the target.
    pub fn update(&mut self, dt: Duration, position: Vec2) -> Vec2 {
        let activity = self.activity;
        let facing = self.facing;
        if let Some(visual) = self.visuals.get_mut(activity, facing) {
            visual.advance(dt);
        }
        if !self.is_moving() {
            return position;
        }
        self.progress = self.progress.saturating_add(dt);
        if self.progress >= MOVE_DURATION {
            self.move_start = self.target;
            self.progress = Duration::ZERO;
            self.set_activity(Activity::Standing);
            return self.target;
        }
        let t = self.progress.as_secs_f32() / MOVE_DURATION.as_secs_f32();
        self.move_start.lerp(self.target, t)
    }

    fn set_activity(&mut self, activity: Activity) {
        self.activity = activity;
        self.restart_visual();
    }

    fn restart_visual(&mut self) {
        let (activity, facing) = (self.activity, self.facing);
        if let Some(visual) = self.visuals.get_mut(activity, facing) {
            visual.restart();
        }
    }
}
