//! Live pressed-key tracking.
//!
//! [`PressedState`] is updated only by the dispatcher, from the raw event
//! stream, and read from any thread. A key is present exactly while its
//! last observed transition was a Down.

use crate::event::{Button, Direction, Event, KeyCode, KeyEvent, names_match};
use parking_lot::RwLock;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};

/// Currently held keys and buttons.
#[derive(Debug, Default)]
pub struct PressedState {
    keys: RwLock<HashMap<KeyCode, KeyEvent>>,
    buttons: RwLock<HashSet<Button>>,
    caps_lock: AtomicBool,
}

impl PressedState {
    /// Create an empty state.
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply one raw event.
    pub fn update(&self, event: &Event) {
        match event {
            Event::Key(key) => match key.direction {
                Direction::Down => {
                    let newly_pressed = self.keys.write().insert(key.code, key.clone()).is_none();
                    if newly_pressed && key.name == "caps lock" {
                        self.caps_lock.fetch_xor(true, Ordering::SeqCst);
                    }
                }
                Direction::Up => {
                    self.keys.write().remove(&key.code);
                }
            },
            Event::Button(button) => match button.direction {
                Direction::Down => {
                    self.buttons.write().insert(button.button);
                }
                Direction::Up => {
                    self.buttons.write().remove(&button.button);
                }
            },
            Event::Move(_) | Event::Wheel(_) => {}
        }
    }

    /// Check if a physical key is held.
    pub fn is_code_pressed(&self, code: KeyCode) -> bool {
        self.keys.read().contains_key(&code)
    }

    /// Check if any held key carries `name` (sided variants included).
    pub fn is_name_pressed(&self, name: &str) -> bool {
        self.keys.read().values().any(|e| names_match(name, &e.name))
    }

    /// Check if a mouse button is held.
    pub fn is_button_pressed(&self, button: Button) -> bool {
        self.buttons.read().contains(&button)
    }

    /// Check if any mouse button is held.
    pub fn is_any_button_pressed(&self) -> bool {
        !self.buttons.read().is_empty()
    }

    /// Check if either shift key is held.
    pub fn is_shift_held(&self) -> bool {
        self.is_name_pressed("shift")
    }

    /// Caps lock toggle state as inferred from observed presses.
    pub fn is_caps_lock_on(&self) -> bool {
        self.caps_lock.load(Ordering::SeqCst)
    }

    /// Held key codes, sorted.
    pub fn codes(&self) -> Vec<KeyCode> {
        let mut codes: Vec<KeyCode> = self.keys.read().keys().copied().collect();
        codes.sort();
        codes
    }

    /// Canonical names of the held keys, ordered by code.
    pub fn names(&self) -> Vec<String> {
        let keys = self.keys.read();
        let mut held: Vec<&KeyEvent> = keys.values().collect();
        held.sort_by_key(|e| e.code);
        held.into_iter().map(|e| e.name.clone()).collect()
    }

    /// Number of held keys.
    pub fn len(&self) -> usize {
        self.keys.read().len()
    }

    /// Check if no key is held.
    pub fn is_empty(&self) -> bool {
        self.keys.read().is_empty()
    }

    /// Forget everything (used when the capture thread restarts).
    pub fn clear(&self) {
        self.keys.write().clear();
        self.buttons.write().clear();
        self.caps_lock.store(false, Ordering::SeqCst);
    }
}
