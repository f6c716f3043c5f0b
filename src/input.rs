// Keyboard state polled by the scene each frame

use std::collections::HashSet;
use winit::event::ElementState;
use winit::keyboard::KeyCode;

/// Camera controls, decoupled from the physical keys that drive them
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Action {
    Forward,
    Back,
    Left,
    Right,
    Up,
    Down,
    YawLeft,
    YawRight,
    PitchUp,
    PitchDown,
}

impl Action {
    pub fn from_key(key: KeyCode) -> Option<Self> {
        Some(match key {
            KeyCode::KeyW => Action::Forward,
            KeyCode::KeyS => Action::Back,
            KeyCode::KeyA => Action::Left,
            KeyCode::KeyD => Action::Right,
            KeyCode::Space => Action::Up,
            KeyCode::ControlLeft => Action::Down,
            KeyCode::ArrowLeft => Action::YawLeft,
            KeyCode::ArrowRight => Action::YawRight,
            KeyCode::ArrowUp => Action::PitchUp,
            KeyCode::ArrowDown => Action::PitchDown,
            _ => return None,
        })
    }
}

/// Set of actions whose keys are currently held
#[derive(Debug, Default, Clone)]
pub struct InputState {
    held: HashSet<Action>,
}

impl InputState {
    pub fn handle_key(&mut self, key: KeyCode, state: ElementState) {
        if let Some(action) = Action::from_key(key) {
            match state {
                ElementState::Pressed => self.press(action),
                ElementState::Released => self.release(action),
            }
        }
    }

    pub fn press(&mut self, action: Action) {
        self.held.insert(action);
    }

    pub fn release(&mut self, action: Action) {
        self.held.remove(&action);
    }

    pub fn is_held(&self, action: Action) -> bool {
        self.held.contains(&action)
    }

    /// +1 when only `positive` is held, -1 when only `negative` is, else 0
    pub fn axis(&self, positive: Action, negative: Action) -> f32 {
        (self.is_held(positive) as i32 - self.is_held(negative) as i32) as f32
    }

    /// Forget everything, e.g. when the window loses focus
    pub fn clear(&mut self) {
        self.held.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn press_and_release_track_held_keys() {
        let mut input = InputState::default();
        input.handle_key(KeyCode::KeyW, ElementState::Pressed);
        assert!(input.is_held(Action::Forward));
        assert_eq!(input.axis(Action::Forward, Action::Back), 1.0);

        input.handle_key(KeyCode::KeyS, ElementState::Pressed);
        assert_eq!(input.axis(Action::Forward, Action::Back), 0.0);

        input.handle_key(KeyCode::KeyW, ElementState::Released);
        assert_eq!(input.axis(Action::Forward, Action::Back), -1.0);
    }

    #[test]
    fn unmapped_keys_are_ignored() {
        let mut input = InputState::default();
        input.handle_key(KeyCode::KeyQ, ElementState::Pressed);
        assert!(input.held.is_empty());
    }
}
