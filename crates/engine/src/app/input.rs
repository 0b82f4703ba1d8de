use winit::event::{ElementState, KeyEvent};
use winit::keyboard::{KeyCode, PhysicalKey};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InputAction {
    MoveNorth,
    MoveSouth,
    MoveWest,
    MoveEast,
    TurnLeft,
    Interact,
    Quit,
}

const ACTION_COUNT: usize = 7;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(crate) struct ActionStates {
    down: [bool; ACTION_COUNT],
}

impl ActionStates {
    pub(crate) fn set(&mut self, action: InputAction, is_down: bool) {
        self.down[action.index()] = is_down;
    }

    pub(crate) fn is_down(&self, action: InputAction) -> bool {
        self.down[action.index()]
    }
}

impl InputAction {
    pub const ALL: [InputAction; ACTION_COUNT] = [
        InputAction::MoveNorth,
        InputAction::MoveSouth,
        InputAction::MoveWest,
        InputAction::MoveEast,
        InputAction::TurnLeft,
        InputAction::Interact,
        InputAction::Quit,
    ];

    const fn index(self) -> usize {
        match self {
            InputAction::MoveNorth => 0,
            InputAction::MoveSouth => 1,
            InputAction::MoveWest => 2,
            InputAction::MoveEast => 3,
            InputAction::TurnLeft => 4,
            InputAction::Interact => 5,
            InputAction::Quit => 6,
        }
    }

    fn from_physical_key(key: PhysicalKey) -> Option<Self> {
        let PhysicalKey::Code(code) = key else {
            return None;
        };
        let action = match code {
            KeyCode::KeyW | KeyCode::ArrowUp => InputAction::MoveNorth,
            KeyCode::KeyS | KeyCode::ArrowDown => InputAction::MoveSouth,
            KeyCode::KeyA | KeyCode::ArrowLeft => InputAction::MoveWest,
            KeyCode::KeyD | KeyCode::ArrowRight => InputAction::MoveEast,
            KeyCode::KeyQ => InputAction::TurnLeft,
            KeyCode::KeyE | KeyCode::Space => InputAction::Interact,
            KeyCode::Escape => InputAction::Quit,
            _ => return None,
        };
        Some(action)
    }
}

/// Input as seen by one fixed step: actions pressed since the previous step.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct InputSnapshot {
    quit_requested: bool,
    pressed: ActionStates,
}

impl InputSnapshot {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn with_pressed(mut self, action: InputAction) -> Self {
        self.pressed.set(action, true);
        if action == InputAction::Quit {
            self.quit_requested = true;
        }
        self
    }

    pub fn pressed(&self, action: InputAction) -> bool {
        self.pressed.is_down(action)
    }

    pub fn quit_requested(&self) -> bool {
        self.quit_requested
    }
}

/// Folds window key events into per-step snapshots. A held key yields one
/// press edge, not one per step.
#[derive(Debug, Default)]
pub(crate) struct InputCollector {
    pub(crate) quit_requested: bool,
    down: ActionStates,
    pressed_edges: ActionStates,
}

impl InputCollector {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn mark_quit_requested(&mut self) {
        self.quit_requested = true;
    }

    pub(crate) fn handle_keyboard_input(&mut self, key_event: &KeyEvent) {
        let is_pressed = key_event.state == ElementState::Pressed;
        self.update_action_state_from_physical_key(key_event.physical_key, is_pressed);
    }

    pub(crate) fn update_action_state_from_physical_key(
        &mut self,
        key: PhysicalKey,
        is_pressed: bool,
    ) {
        let Some(action) = InputAction::from_physical_key(key) else {
            return;
        };
        if is_pressed && !self.down.is_down(action) {
            self.pressed_edges.set(action, true);
        }
        self.down.set(action, is_pressed);
        if action == InputAction::Quit && is_pressed {
            self.mark_quit_requested();
        }
    }

    pub(crate) fn snapshot_for_tick(&mut self) -> InputSnapshot {
        let snapshot = InputSnapshot {
            quit_requested: self.quit_requested,
            pressed: self.pressed_edges,
        };
        self.pressed_edges = ActionStates::default();
        snapshot
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(code: KeyCode) -> PhysicalKey {
        PhysicalKey::Code(code)
    }

    #[test]
    fn press_is_edge_triggered_for_single_tick() {
        let mut input = InputCollector::new();
        input.update_action_state_from_physical_key(key(KeyCode::KeyQ), true);
        let first = input.snapshot_for_tick();
        let second = input.snapshot_for_tick();
        assert!(first.pressed(InputAction::TurnLeft));
        assert!(!second.pressed(InputAction::TurnLeft));
    }

    #[test]
    fn held_key_does_not_spam_press_edges() {
        let mut input = InputCollector::new();
        input.update_action_state_from_physical_key(key(KeyCode::ArrowUp), true);
        let first = input.snapshot_for_tick();
        input.update_action_state_from_physical_key(key(KeyCode::ArrowUp), true);
        let second = input.snapshot_for_tick();
        input.update_action_state_from_physical_key(key(KeyCode::ArrowUp), false);
        input.update_action_state_from_physical_key(key(KeyCode::ArrowUp), true);
        let third = input.snapshot_for_tick();
        assert!(first.pressed(InputAction::MoveNorth));
        assert!(!second.pressed(InputAction::MoveNorth));
        assert!(third.pressed(InputAction::MoveNorth));
    }

    #[test]
    fn wasd_and_arrow_keys_map_to_directions() {
        let mut input = InputCollector::new();
        input.update_action_state_from_physical_key(key(KeyCode::KeyD), true);
        input.update_action_state_from_physical_key(key(KeyCode::ArrowLeft), true);
        input.update_action_state_from_physical_key(key(KeyCode::Space), true);
        let snapshot = input.snapshot_for_tick();
        assert!(snapshot.pressed(InputAction::MoveEast));
        assert!(snapshot.pressed(InputAction::MoveWest));
        assert!(snapshot.pressed(InputAction::Interact));
        assert!(!snapshot.pressed(InputAction::MoveSouth));
    }

    #[test]
    fn escape_requests_quit() {
        let mut input = InputCollector::new();
        input.update_action_state_from_physical_key(key(KeyCode::Escape), true);
        assert!(input.quit_requested);
        assert!(input.snapshot_for_tick().quit_requested());
    }

    #[test]
    fn unmapped_keys_are_ignored() {
        let mut input = InputCollector::new();
        input.update_action_state_from_physical_key(key(KeyCode::F5), true);
        assert_eq!(input.snapshot_for_tick(), InputSnapshot::empty());
    }
}
