use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// A high-level action produced by the desktop front end.
///
/// The race consumes actions, never raw input events, so key bindings can
/// change without touching game logic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Action {
    /// Drive forward along +z.
    Accelerate,
    /// Shift toward +x.
    SteerLeft,
    /// Shift toward -x.
    SteerRight,
    /// Driving only happens while this is held (primary mouse button).
    Engage,
    /// Leave a finished race and start over.
    Restart,
}

/// Set of actions held during the current update.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InputState {
    held: BTreeSet<Action>,
}

impl InputState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_actions(actions: impl IntoIterator<Item = Action>) -> Self {
        Self {
            held: actions.into_iter().collect(),
        }
    }

    pub fn press(&mut self, action: Action) {
        self.held.insert(action);
    }

    pub fn release(&mut self, action: Action) {
        self.held.remove(&action);
    }

    /// Press or release depending on `pressed`.
    pub fn set(&mut self, action: Action, pressed: bool) {
        if pressed {
            self.press(action);
        } else {
            self.release(action);
        }
    }

    pub fn is_held(&self, action: Action) -> bool {
        self.held.contains(&action)
    }

    pub fn clear(&mut self) {
        self.held.clear();
    }
}
