use std::fmt;
use std::time::Duration;

use tracing::warn;

use crate::draw::DrawTarget;
use crate::tiles::{Properties, TileFactory, Visual, COLLISION_PROPERTY};

use super::character::Character;
use super::geometry::Vec2;

pub type ObjectId = u32;

/// Object property naming the object a switch forwards `interact` to.
pub const CONTROLS_PROPERTY: &str = "controls";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ObjectKind {
    Decoration,
    Torch,
    TwoWaySwitch,
    Door,
    VerticalDoor,
    Grille,
    VerticalGrille,
    Chest,
    Jug,
    Goal,
    Character,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ObjectState {
    Burning,
    Off,
    Left,
    Right,
    Open,
    Closed,
    Unbroken,
    Broken,
    Default,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Interaction {
    None,
    /// Flip between the two declared states.
    Toggle,
    /// Advance from the first declared state to the second, which is terminal.
    OneWay,
}

#[derive(Debug)]
pub struct KindBehavior {
    pub type_name: &'static str,
    pub states: &'static [ObjectState],
    pub interaction: Interaction,
}

const OPENABLE: &[ObjectState] = &[ObjectState::Closed, ObjectState::Open];

static BEHAVIORS: [KindBehavior; 11] = [
    KindBehavior {
        type_name: "",
        states: &[],
        interaction: Interaction::None,
    },
    KindBehavior {
        type_name: "Torch",
        states: &[ObjectState::Burning, ObjectState::Off],
        interaction: Interaction::Toggle,
    },
    KindBehavior {
        type_name: "TwoWaySwitch",
        states: &[ObjectState::Left, ObjectState::Right],
        interaction: Interaction::Toggle,
    },
    KindBehavior {
        type_name: "Door",
        states: OPENABLE,
        interaction: Interaction::Toggle,
    },
    KindBehavior {
        type_name: "VerticalDoor",
        states: OPENABLE,
        interaction: Interaction::Toggle,
    },
    KindBehavior {
        type_name: "Grille",
        states: OPENABLE,
        interaction: Interaction::Toggle,
    },
    KindBehavior {
        type_name: "VerticalGrille",
        states: OPENABLE,
        interaction: Interaction::Toggle,
    },
    KindBehavior {
        type_name: "Chest",
        states: OPENABLE,
        interaction: Interaction::Toggle,
    },
    KindBehavior {
        type_name: "Jug",
        states: &[ObjectState::Unbroken, ObjectState::Broken],
        interaction: Interaction::OneWay,
    },
    KindBehavior {
        type_name: "Goal",
        states: &[ObjectState::Default],
        interaction: Interaction::None,
    },
    KindBehavior {
        type_name: "Character",
        states: &[],
        interaction: Interaction::None,
    },
];

impl ObjectKind {
    pub const ALL: [ObjectKind; 11] = [
        ObjectKind::Decoration,
        ObjectKind::Torch,
        ObjectKind::TwoWaySwitch,
        ObjectKind::Door,
        ObjectKind::VerticalDoor,
        ObjectKind::Grille,
        ObjectKind::VerticalGrille,
        ObjectKind::Chest,
        ObjectKind::Jug,
        ObjectKind::Goal,
        ObjectKind::Character,
    ];

    const fn index(self) -> usize {
        match self {
            ObjectKind::Decoration => 0,
            ObjectKind::Torch => 1,
            ObjectKind::TwoWaySwitch => 2,
            ObjectKind::Door => 3,
            ObjectKind::VerticalDoor => 4,
            ObjectKind::Grille => 5,
            ObjectKind::VerticalGrille => 6,
            ObjectKind::Chest => 7,
            ObjectKind::Jug => 8,
            ObjectKind::Goal => 9,
            ObjectKind::Character => 10,
        }
    }

    pub fn behavior(self) -> &'static KindBehavior {
        &BEHAVIORS[self.index()]
    }

    /// Maps a Tiled type name to its kind. Unknown names yield `None`.
    pub fn from_type_name(name: &str) -> Option<Self> {
        if name.is_empty() {
            return None;
        }
        Self::ALL
            .into_iter()
            .find(|kind| kind.behavior().type_name == name)
    }

    pub fn type_name(self) -> &'static str {
        self.behavior().type_name
    }

    pub fn states(self) -> &'static [ObjectState] {
        self.behavior().states
    }

    pub fn is_stateful(self) -> bool {
        !self.states().is_empty()
    }

    /// The state `interact` moves to from `current`, if any.
    pub fn interact_transition(self, current: ObjectState) -> Option<ObjectState> {
        let states = self.states();
        match (self.behavior().interaction, states) {
            (Interaction::Toggle, [first, second]) if current == *first => Some(*second),
            (Interaction::Toggle, [first, second]) if current == *second => Some(*first),
            (Interaction::OneWay, [first, second]) if current == *first => Some(*second),
            _ => None,
        }
    }
}

impl fmt::Display for ObjectKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ObjectKind::Decoration => f.write_str("Decoration"),
            other => f.write_str(other.type_name()),
        }
    }
}

impl ObjectState {
    pub const COUNT: usize = 9;

    pub const ALL: [ObjectState; Self::COUNT] = [
        ObjectState::Burning,
        ObjectState::Off,
        ObjectState::Left,
        ObjectState::Right,
        ObjectState::Open,
        ObjectState::Closed,
        ObjectState::Unbroken,
        ObjectState::Broken,
        ObjectState::Default,
    ];

    pub const fn index(self) -> usize {
        match self {
            ObjectState::Burning => 0,
            ObjectState::Off => 1,
            ObjectState::Left => 2,
            ObjectState::Right => 3,
            ObjectState::Open => 4,
            ObjectState::Closed => 5,
            ObjectState::Unbroken => 6,
            ObjectState::Broken => 7,
            ObjectState::Default => 8,
        }
    }

    pub const fn name(self) -> &'static str {
        match self {
            ObjectState::Burning => "burning",
            ObjectState::Off => "off",
            ObjectState::Left => "left",
            ObjectState::Right => "right",
            ObjectState::Open => "open",
            ObjectState::Closed => "closed",
            ObjectState::Unbroken => "unbroken",
            ObjectState::Broken => "broken",
            ObjectState::Default => "default",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|state| state.name() == name)
    }
}

impl fmt::Display for ObjectState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Per-state visuals resolved once at construction.
#[derive(Debug, Clone, Default)]
pub struct StateVisuals {
    slots: [Option<Visual>; ObjectState::COUNT],
}

impl StateVisuals {
    /// Resolves a visual for every state `kind` declares. Missing tiles are
    /// reported and leave the slot empty.
    pub fn resolve(kind: ObjectKind, object_name: &str, factory: &TileFactory) -> Self {
        let mut visuals = Self::default();
        for state in kind.states() {
            match factory.tile_by_type_and_state(kind.type_name(), state.name()) {
                Some(tile) => visuals.slots[state.index()] = Some(factory.visual_for(tile)),
                None => warn!(
                    object = object_name,
                    kind = %kind,
                    state = %state,
                    "object_state_tile_missing"
                ),
            }
        }
        visuals
    }

    pub fn get(&self, state: ObjectState) -> Option<&Visual> {
        self.slots[state.index()].as_ref()
    }

    pub fn get_mut(&mut self, state: ObjectState) -> Option<&mut Visual> {
        self.slots[state.index()].as_mut()
    }
}

#[derive(Debug, Clone)]
pub struct StatefulBody {
    state: ObjectState,
    visuals: StateVisuals,
}

impl StatefulBody {
    pub fn new(state: ObjectState, visuals: StateVisuals) -> Self {
        Self { state, visuals }
    }

    pub fn state(&self) -> ObjectState {
        self.state
    }

    pub fn visual(&self) -> Option<&Visual> {
        self.visuals.get(self.state)
    }
}

#[derive(Debug, Clone)]
pub enum ObjectBody {
    Decoration(Option<Visual>),
    Stateful(StatefulBody),
    Character(Box<Character>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InteractOutcome {
    Changed {
        from: ObjectState,
        to: ObjectState,
    },
    /// Interactive, but already in a terminal state.
    Unchanged(ObjectState),
    NotInteractive,
}

#[derive(Debug, Clone)]
pub struct GameObject {
    pub id: ObjectId,
    pub name: String,
    pub kind: ObjectKind,
    pub position: Vec2,
    pub width: f32,
    pub height: f32,
    pub visible: bool,
    pub properties: Properties,
    pub body: ObjectBody,
}

impl GameObject {
    pub fn state(&self) -> Option<ObjectState> {
        match &self.body {
            ObjectBody::Stateful(body) => Some(body.state),
            _ => None,
        }
    }

    pub fn state_name(&self) -> String {
        match &self.body {
            ObjectBody::Stateful(body) => body.state.name().to_string(),
            ObjectBody::Character(character) => character.state_name(),
            ObjectBody::Decoration(_) => String::new(),
        }
    }

    pub fn visual(&self) -> Option<&Visual> {
        match &self.body {
            ObjectBody::Decoration(visual) => visual.as_ref(),
            ObjectBody::Stateful(body) => body.visual(),
            ObjectBody::Character(character) => character.visual(),
        }
    }

    pub fn character(&self) -> Option<&Character> {
        match &self.body {
            ObjectBody::Character(character) => Some(character),
            _ => None,
        }
    }

    pub fn character_mut(&mut self) -> Option<&mut Character> {
        match &mut self.body {
            ObjectBody::Character(character) => Some(character),
            _ => None,
        }
    }

    /// Switches to `state` if this object's kind declares it. Anything else
    /// is a logged no-op; returns whether the state changed.
    pub fn set_state(&mut self, state: ObjectState) -> bool {
        let ObjectBody::Stateful(body) = &mut self.body else {
            warn!(
                object = %self.name,
                kind = %self.kind,
                state = %state,
                "object_state_unsupported"
            );
            return false;
        };
        if !self.kind.states().contains(&state) {
            warn!(
                object = %self.name,
                kind = %self.kind,
                state = %state,
                "object_state_unknown"
            );
            return false;
        }
        if body.state == state {
            return false;
        }
        body.state = state;
        if let Some(visual) = body.visuals.get_mut(state) {
            visual.restart();
        }
        true
    }

    pub fn set_state_by_name(&mut self, name: &str) -> bool {
        match ObjectState::from_name(name) {
            Some(state) => self.set_state(state),
            None => {
                warn!(object = %self.name, state = name, "object_state_unknown");
                false
            }
        }
    }

    pub fn interact(&mut self) -> InteractOutcome {
        let Some(current) = self.state() else {
            return InteractOutcome::NotInteractive;
        };
        if self.kind.behavior().interaction == Interaction::None {
            return InteractOutcome::NotInteractive;
        }
        match self.kind.interact_transition(current) {
            Some(next) => {
                self.set_state(next);
                InteractOutcome::Changed {
                    from: current,
                    to: next,
                }
            }
            None => InteractOutcome::Unchanged(current),
        }
    }

    /// Id of the object a switch forwards to.
    pub fn controls(&self) -> Option<ObjectId> {
        self.properties.get_u32(CONTROLS_PROPERTY)
    }

    /// Half-open footprint `[x, x + w) x [y - h, y)`; `y` is the bottom edge.
    pub fn is_at_position(&self, x: f32, y: f32) -> bool {
        let left = self.position.x;
        let bottom = self.position.y;
        x >= left && x < left + self.width && y >= bottom - self.height && y < bottom
    }

    /// The current visual's `collision` property wins over the object's own.
    pub fn is_collision(&self) -> bool {
        self.visual()
            .and_then(|visual| visual.tile().is_collision())
            .or_else(|| self.properties.get_bool(COLLISION_PROPERTY))
            .unwrap_or(false)
    }

    pub fn update(&mut self, dt: Duration) {
        match &mut self.body {
            ObjectBody::Decoration(visual) => {
                if let Some(visual) = visual {
                    visual.advance(dt);
                }
            }
            ObjectBody::Stateful(body) => {
                let state = body.state;
                if let Some(visual) = body.visuals.get_mut(state) {
                    visual.advance(dt);
                }
            }
            ObjectBody::Character(character) => {
                self.position = character.update(dt, self.position);
            }
        }
    }

    pub fn draw(
        &self,
        target: &mut dyn DrawTarget,
        factory: &TileFactory,
        layer_offset: (i32, i32),
        opacity: f32,
    ) {
        if !self.visible {
            return;
        }
        let Some(visual) = self.visual() else {
            return;
        };
        let tile = visual.frame();
        if !tile.visible {
            return;
        }
        let Some(image) = factory.image_for(tile) else {
            return;
        };
        let tile_height = i32::try_from(tile.region.height).unwrap_or(i32::MAX);
        let dest_x = layer_offset
            .0
            .saturating_add(self.position.x.round() as i32)
            .saturating_add(tile.draw_offset.0);
        let dest_y = layer_offset
            .1
            .saturating_add(self.position.y.round() as i32)
            .saturating_sub(tile_height)
            .saturating_add(tile.draw_offset.1);
        target.draw_tile(image, tile.region, dest_x, dest_y, opacity);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stateful(kind: ObjectKind, state: ObjectState) -> GameObject {
        GameObject {
            id: 1,
            name: format!("{kind}"),
            kind,
            position: Vec2::new(16.0, 32.0),
            width: 16.0,
            height: 16.0,
            visible: true,
            properties: Properties::new(),
            body: ObjectBody::Stateful(StatefulBody::new(state, StateVisuals::default())),
        }
    }

    #[test]
    fn type_names_map_to_kinds() {
        assert_eq!(ObjectKind::from_type_name("Torch"), Some(ObjectKind::Torch));
        assert_eq!(
            ObjectKind::from_type_name("VerticalGrille"),
            Some(ObjectKind::VerticalGrille)
        );
        assert_eq!(ObjectKind::from_type_name("Dragon"), None);
        assert_eq!(ObjectKind::from_type_name(""), None);
    }

    #[test]
    fn toggles_flip_between_declared_states() {
        let mut torch = stateful(ObjectKind::Torch, ObjectState::Off);
        assert_eq!(
            torch.interact(),
            InteractOutcome::Changed {
                from: ObjectState::Off,
                to: ObjectState::Burning
            }
        );
        torch.interact();
        assert_eq!(torch.state(), Some(ObjectState::Off));

        for kind in [
            ObjectKind::Door,
            ObjectKind::VerticalDoor,
            ObjectKind::Grille,
            ObjectKind::VerticalGrille,
            ObjectKind::Chest,
        ] {
            let mut object = stateful(kind, ObjectState::Closed);
            object.interact();
            assert_eq!(object.state(), Some(ObjectState::Open), "{kind}");
            object.interact();
            assert_eq!(object.state(), Some(ObjectState::Closed), "{kind}");
        }
    }

    #[test]
    fn broken_jug_stays_broken() {
        let mut jug = stateful(ObjectKind::Jug, ObjectState::Unbroken);
        jug.interact();
        assert_eq!(jug.state(), Some(ObjectState::Broken));
        assert_eq!(jug.interact(), InteractOutcome::Unchanged(ObjectState::Broken));
        assert_eq!(jug.state(), Some(ObjectState::Broken));
    }

    #[test]
    fn goal_is_not_interactive() {
        let mut goal = stateful(ObjectKind::Goal, ObjectState::Default);
        assert_eq!(goal.interact(), InteractOutcome::NotInteractive);
    }

    #[test]
    fn undeclared_state_is_a_no_op() {
        let mut door = stateful(ObjectKind::Door, ObjectState::Closed);
        assert!(!door.set_state(ObjectState::Burning));
        assert!(!door.set_state_by_name("ajar"));
        assert_eq!(door.state(), Some(ObjectState::Closed));
        assert!(door.set_state(ObjectState::Open));
    }

    #[test]
    fn footprint_is_half_open_above_the_bottom_edge() {
        let door = stateful(ObjectKind::Door, ObjectState::Closed);
        assert!(door.is_at_position(16.0, 16.0));
        assert!(door.is_at_position(31.9, 31.9));
        assert!(!door.is_at_position(32.0, 24.0));
        assert!(!door.is_at_position(24.0, 32.0));
        assert!(!door.is_at_position(15.9, 24.0));
    }

    #[test]
    fn collision_falls_back_to_object_property() {
        let mut door = stateful(ObjectKind::Door, ObjectState::Closed);
        assert!(!door.is_collision());
        door.properties
            .insert(COLLISION_PROPERTY, crate::tiles::PropertyValue::Bool(true));
        assert!(door.is_collision());
    }
}
