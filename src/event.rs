//! Event model shared by the dispatcher, the matchers and the recorder.
//!
//! Events are plain immutable values. Timestamps are seconds on a
//! process-wide monotonic clock (see [`now`]), so differences between two
//! events are always meaningful regardless of wall-clock adjustments.

use crate::names::normalize_name;
use std::fmt;
use std::sync::OnceLock;
use std::time::Instant;

#[cfg(feature = "recorder")]
use serde::{Deserialize, Serialize};

static CLOCK_ORIGIN: OnceLock<Instant> = OnceLock::new();

/// Seconds elapsed on the monotonic clock used for event timestamps.
pub fn now() -> f64 {
    CLOCK_ORIGIN.get_or_init(Instant::now).elapsed().as_secs_f64()
}

/// Opaque platform-stable identifier of a physical key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "recorder", derive(Serialize, Deserialize))]
pub struct KeyCode(pub u32);

impl fmt::Display for KeyCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u32> for KeyCode {
    fn from(code: u32) -> Self {
        KeyCode(code)
    }
}

/// Whether a key or button went down or up.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "recorder", derive(Serialize, Deserialize))]
pub enum Direction {
    /// Pressed.
    Down,
    /// Released.
    Up,
}

/// Mouse button identifiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "recorder", derive(Serialize, Deserialize))]
pub enum Button {
    /// Left mouse button (Button 1).
    Left,
    /// Right mouse button (Button 2).
    Right,
    /// Middle mouse button (Button 3).
    Middle,
    /// Extra button 1 (typically back).
    X1,
    /// Extra button 2 (typically forward).
    X2,
    /// Unknown or unsupported button.
    Unknown(u8),
}

impl Button {
    /// Get the button number (1-indexed).
    pub fn number(&self) -> u8 {
        match self {
            Button::Left => 1,
            Button::Right => 2,
            Button::Middle => 3,
            Button::X1 => 4,
            Button::X2 => 5,
            Button::Unknown(n) => *n,
        }
    }

    /// Create a Button from a number (1-indexed).
    pub fn from_number(n: u8) -> Self {
        match n {
            1 => Button::Left,
            2 => Button::Right,
            3 => Button::Middle,
            4 => Button::X1,
            5 => Button::X2,
            _ => Button::Unknown(n),
        }
    }
}

/// A key transition.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "recorder", derive(Serialize, Deserialize))]
pub struct KeyEvent {
    /// Down or up.
    pub direction: Direction,
    /// Physical key.
    pub code: KeyCode,
    /// Canonical (normalized, lower-case) key name, e.g. `"a"`, `"left shift"`.
    pub name: String,
    /// Monotonic timestamp in seconds.
    pub time: f64,
}

impl KeyEvent {
    /// Build a key event, normalizing the platform-reported name.
    pub fn new(direction: Direction, code: KeyCode, name: &str, time: f64) -> Self {
        Self {
            direction,
            code,
            name: normalize_name(name),
            time,
        }
    }

    /// Returns true if this event represents the key described by `token`.
    ///
    /// A token is either a decimal key code (`"30"`) or a key name. Names
    /// match the canonical name exactly or with a `left `/`right ` prefix, so
    /// `"shift"` matches both shift keys.
    pub fn matches(&self, token: &str) -> bool {
        if let Ok(code) = token.trim().parse::<u32>() {
            return self.code.0 == code;
        }
        names_match(&normalize_name(token), &self.name)
    }
}

/// Returns true if `event_name` is `token_name` or one of its sided variants.
pub(crate) fn names_match(token_name: &str, event_name: &str) -> bool {
    if token_name == event_name {
        return true;
    }
    event_name
        .strip_prefix("left ")
        .or_else(|| event_name.strip_prefix("right "))
        .is_some_and(|base| base == token_name)
}

/// A mouse button transition.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "recorder", derive(Serialize, Deserialize))]
pub struct ButtonEvent {
    /// Down or up.
    pub direction: Direction,
    /// Which button.
    pub button: Button,
    /// Monotonic timestamp in seconds.
    pub time: f64,
}

/// Absolute pointer motion.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "recorder", derive(Serialize, Deserialize))]
pub struct MoveEvent {
    /// X coordinate (screen coordinates).
    pub x: f64,
    /// Y coordinate (screen coordinates).
    pub y: f64,
    /// Monotonic timestamp in seconds.
    pub time: f64,
}

/// Wheel rotation.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "recorder", derive(Serialize, Deserialize))]
pub struct WheelEvent {
    /// Amount of rotation (positive is away from the user).
    pub delta: f64,
    /// Monotonic timestamp in seconds.
    pub time: f64,
}

/// A complete input event.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "recorder", derive(Serialize, Deserialize))]
pub enum Event {
    /// Keyboard key transition.
    Key(KeyEvent),
    /// Mouse button transition.
    Button(ButtonEvent),
    /// Pointer motion.
    Move(MoveEvent),
    /// Wheel rotation.
    Wheel(WheelEvent),
}

impl Event {
    /// Create a key pressed event stamped with the current time.
    pub fn key_down(code: KeyCode, name: &str) -> Self {
        Event::Key(KeyEvent::new(Direction::Down, code, name, now()))
    }

    /// Create a key released event stamped with the current time.
    pub fn key_up(code: KeyCode, name: &str) -> Self {
        Event::Key(KeyEvent::new(Direction::Up, code, name, now()))
    }

    /// Create a button pressed event stamped with the current time.
    pub fn button_down(button: Button) -> Self {
        Event::Button(ButtonEvent {
            direction: Direction::Down,
            button,
            time: now(),
        })
    }

    /// Create a button released event stamped with the current time.
    pub fn button_up(button: Button) -> Self {
        Event::Button(ButtonEvent {
            direction: Direction::Up,
            button,
            time: now(),
        })
    }

    /// Create a pointer motion event stamped with the current time.
    pub fn moved(x: f64, y: f64) -> Self {
        Event::Move(MoveEvent { x, y, time: now() })
    }

    /// Create a wheel event stamped with the current time.
    pub fn wheel(delta: f64) -> Self {
        Event::Wheel(WheelEvent { delta, time: now() })
    }

    /// Timestamp of the event.
    pub fn time(&self) -> f64 {
        match self {
            Event::Key(e) => e.time,
            Event::Button(e) => e.time,
            Event::Move(e) => e.time,
            Event::Wheel(e) => e.time,
        }
    }

    /// The key payload, if this is a keyboard event.
    pub fn as_key(&self) -> Option<&KeyEvent> {
        match self {
            Event::Key(e) => Some(e),
            _ => None,
        }
    }

    /// Down/Up for key and button events.
    pub fn direction(&self) -> Option<Direction> {
        match self {
            Event::Key(e) => Some(e.direction),
            Event::Button(e) => Some(e.direction),
            _ => None,
        }
    }

    /// Check if this is a keyboard event.
    pub fn is_keyboard(&self) -> bool {
        matches!(self, Event::Key(_))
    }

    /// Check if this is a mouse event.
    pub fn is_mouse(&self) -> bool {
        !self.is_keyboard()
    }

    /// Keyboard events compare against the token (see [`KeyEvent::matches`]);
    /// mouse events never match a key token.
    pub fn matches(&self, token: &str) -> bool {
        self.as_key().is_some_and(|e| e.matches(token))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_button_numbers() {
        for n in 1..=5 {
            assert_eq!(Button::from_number(n).number(), n);
        }
        assert_eq!(Button::from_number(9), Button::Unknown(9));
    }

    #[test]
    fn test_matches_name_code_and_sides() {
        let event = KeyEvent::new(Direction::Down, KeyCode(42), "Left Shift", 0.0);
        assert_eq!(event.name, "left shift");
        assert!(event.matches("shift"));
        assert!(event.matches("left shift"));
        assert!(event.matches("SHIFT"));
        assert!(event.matches("42"));
        assert!(!event.matches("right shift"));
        assert!(!event.matches("43"));
        assert!(!event.matches("ctrl"));
    }

    #[test]
    fn test_matches_aliases() {
        let event = KeyEvent::new(Direction::Down, KeyCode(1), "esc", 0.0);
        assert!(event.matches("escape"));
        let space = KeyEvent::new(Direction::Down, KeyCode(57), " ", 0.0);
        assert_eq!(space.name, "space");
        assert!(space.matches("spacebar"));
    }

    #[test]
    fn test_mouse_events_never_match_keys() {
        let event = Event::button_down(Button::Left);
        assert!(event.is_mouse());
        assert!(!event.matches("a"));
        assert_eq!(event.direction(), Some(Direction::Down));
        assert_eq!(Event::moved(1.0, 2.0).direction(), None);
    }

    #[test]
    fn test_clock_is_monotonic() {
        let a = now();
        let b = now();
        assert!(b >= a);
    }
}
