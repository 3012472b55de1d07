//! Event recording and playback.
//!
//! [`Keyboard::record`](crate::Keyboard::record) captures events until a stop
//! hotkey, and [`Keyboard::start_recording`](crate::Keyboard::start_recording)
//! / [`Keyboard::stop_recording`](crate::Keyboard::stop_recording) capture an
//! open-ended session. Playback replays the events through the backend,
//! keeping the original spacing scaled by a speed factor.
//!
//! # Example
//!
//! ```no_run
//! # fn demo(keyboard: &keyhook::Keyboard) -> keyhook::Result<()> {
//! let events = keyboard.record("esc")?;
//! keyboard.play(&events, 2.0)?;
//!
//! let strings = keyhook::recorder::typed_strings(&events, true);
//! println!("{strings:?}");
//! # Ok(())
//! # }
//! ```

use crate::error::{Error, Result};
use crate::event::{Direction, Event};
use crate::hook::{EventHandler, GrabHandler, HandlerId, Observer};
use crate::simulate::Simulator;
use log::debug;
use parking_lot::Mutex;
#[cfg(feature = "recorder")]
use serde::{Deserialize, Serialize};
#[cfg(feature = "recorder")]
use std::path::Path;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, SystemTime};

/// A complete recording of input events.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "recorder", derive(Serialize, Deserialize))]
pub struct Recording {
    /// Recorded events, in capture order.
    pub events: Vec<Event>,
    /// When the recording was created.
    pub created_at: SystemTime,
    /// Optional description.
    pub description: Option<String>,
}

impl Recording {
    /// Create a new empty recording.
    pub fn new() -> Self {
        Self::from_events(Vec::new())
    }

    /// Wrap captured events.
    pub fn from_events(events: Vec<Event>) -> Self {
        Self {
            events,
            created_at: SystemTime::now(),
            description: None,
        }
    }

    /// Set a description for this recording.
    pub fn with_description(mut self, desc: impl Into<String>) -> Self {
        self.description = Some(desc.into());
        self
    }

    /// Time between the first and last event, saturating at
    /// [`Duration::MAX`].
    pub fn duration(&self) -> Duration {
        match (self.events.first(), self.events.last()) {
            (Some(first), Some(last)) => {
                Duration::try_from_secs_f64((last.time() - first.time()).max(0.0))
                    .unwrap_or(Duration::MAX)
            }
            _ => Duration::ZERO,
        }
    }

    /// Get the number of events in this recording.
    pub fn event_count(&self) -> usize {
        self.events.len()
    }

    /// Save the recording to a file (JSON format).
    #[cfg(feature = "recorder")]
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let json = serde_json::to_string_pretty(self)
            .map_err(|e| Error::Other(format!("Failed to serialize recording: {}", e)))?;
        std::fs::write(path, json)
            .map_err(|e| Error::Other(format!("Failed to write recording file: {}", e)))?;
        Ok(())
    }

    /// Load a recording from a file (JSON format).
    #[cfg(feature = "recorder")]
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let json = std::fs::read_to_string(path)
            .map_err(|e| Error::Other(format!("Failed to read recording file: {}", e)))?;
        serde_json::from_str(&json)
            .map_err(|e| Error::Other(format!("Failed to deserialize recording: {}", e)))
    }
}

impl Default for Recording {
    fn default() -> Self {
        Self::new()
    }
}

impl From<Vec<Event>> for Recording {
    fn from(events: Vec<Event>) -> Self {
        Self::from_events(events)
    }
}

/// Appends every event not rejected by `exclude` to a shared buffer.
pub(crate) struct RecordingHandler<F> {
    pub(crate) events: Arc<Mutex<Vec<Event>>>,
    pub(crate) exclude: F,
}

impl<F> EventHandler for RecordingHandler<F>
where
    F: Fn(&Event) -> bool + Send + Sync,
{
    fn handle_event(&self, event: &Event) {
        if !(self.exclude)(event) {
            self.events.lock().push(event.clone());
        }
    }
}

/// Replay `events` with the held keys stashed around the playback.
///
/// Gaps between events are divided by `speed`; zero or a negative speed
/// replays with no delay at all.
pub(crate) fn play(simulator: &Simulator, events: &[Event], speed: f64) -> Result<()> {
    let _synthetic = simulator.dispatcher().synthetic();
    let held = simulator.stash()?;
    let replayed = replay(simulator, events, speed);
    let restored = simulator.restore(&held);
    replayed.and(restored)
}

/// Pause before each event. Gaps too long to sleep are rejected before
/// anything is replayed.
fn delays(events: &[Event], speed: f64) -> Result<Vec<Duration>> {
    let mut last_time: Option<f64> = None;
    let mut delays = Vec::with_capacity(events.len());
    for event in events {
        let gap = match last_time {
            Some(last) if speed > 0.0 => (event.time() - last) / speed,
            _ => 0.0,
        };
        last_time = Some(event.time());
        if gap > 0.0 {
            let delay = Duration::try_from_secs_f64(gap).map_err(|_| {
                Error::Other(format!("cannot wait {gap} seconds between replayed events"))
            })?;
            delays.push(delay);
        } else {
            delays.push(Duration::ZERO);
        }
    }
    Ok(delays)
}

fn replay(simulator: &Simulator, events: &[Event], speed: f64) -> Result<()> {
    let backend = simulator.backend();
    let delays = delays(events, speed)?;
    debug!("replaying {} events at speed {speed}", events.len());

    for (event, delay) in events.iter().zip(delays) {
        if !delay.is_zero() {
            thread::sleep(delay);
        }

        match event {
            Event::Key(key) => match key.direction {
                Direction::Down => backend.press(key.code)?,
                Direction::Up => backend.release(key.code)?,
            },
            Event::Button(button) => match button.direction {
                Direction::Down => backend.press_button(button.button)?,
                Direction::Up => backend.release_button(button.button)?,
            },
            Event::Move(motion) => backend.move_to(motion.x, motion.y)?,
            Event::Wheel(wheel) => backend.wheel(wheel.delta)?,
        }
    }
    Ok(())
}

/// Reconstruct the strings typed in a sequence of key events.
///
/// Shift and caps lock decide the case of letters; any key without a
/// single-character name (enter, tab, arrows...) ends the current string.
/// With `allow_backspace`, backspace removes the last character instead.
///
/// ```
/// use keyhook::event::{Event, KeyCode};
/// use keyhook::recorder::typed_strings;
///
/// let events = [
///     Event::key_down(KeyCode(1), "h"),
///     Event::key_down(KeyCode(2), "i"),
///     Event::key_down(KeyCode(3), "enter"),
///     Event::key_down(KeyCode(2), "i"),
/// ];
/// assert_eq!(typed_strings(&events, true), vec!["hi", "i"]);
/// ```
pub fn typed_strings(events: &[Event], allow_backspace: bool) -> Vec<String> {
    let mut strings = Vec::new();
    let mut current = String::new();
    let mut shift = false;
    let mut caps_lock = false;

    for key in events.iter().filter_map(Event::as_key) {
        let down = key.direction == Direction::Down;
        let name = if key.name == "space" { " " } else { key.name.as_str() };

        if key.name.contains("shift") {
            shift = down;
        } else if key.name == "caps lock" {
            if down {
                caps_lock = !caps_lock;
            }
        } else if allow_backspace && key.name == "backspace" {
            if down {
                current.pop();
            }
        } else if down {
            let mut chars = name.chars();
            match (chars.next(), chars.next()) {
                (Some(ch), None) if shift ^ caps_lock => current.extend(ch.to_uppercase()),
                (Some(ch), None) => current.push(ch),
                _ => strings.push(std::mem::take(&mut current)),
            }
        }
    }
    strings.push(current);
    strings
}

/// An open-ended recording: the appending handler and its buffer.
pub(crate) type Session = (HandlerId, Arc<Mutex<Vec<Event>>>);

/// Record everything except events rejected by `exclude`.
pub(crate) fn recording_handler<F>(exclude: F) -> (Arc<dyn GrabHandler>, Arc<Mutex<Vec<Event>>>)
where
    F: Fn(&Event) -> bool + Send + Sync + 'static,
{
    let events = Arc::new(Mutex::new(Vec::new()));
    let handler = Observer(RecordingHandler {
        events: Arc::clone(&events),
        exclude,
    });
    (Arc::new(handler), events)
}

impl<F> RecordingHandler<F> {
    #[cfg(test)]
    fn len(&self) -> usize {
        self.events.lock().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::{Button, KeyCode};
    use crate::hook::Dispatcher;
    use crate::testing::{FakeBackend, Synth, code, key, key_at};
    use std::time::Instant;

    use Direction::{Down, Up};

    fn simulator() -> (Arc<FakeBackend>, Simulator) {
        let backend = Arc::new(FakeBackend::new());
        let dispatcher = Arc::new(Dispatcher::new());
        backend.echo_into(&dispatcher);
        (backend.clone(), Simulator::new(backend, dispatcher))
    }

    #[test]
    fn test_recording_new() {
        let recording = Recording::new();
        assert!(recording.events.is_empty());
        assert_eq!(recording.duration(), Duration::ZERO);
        assert_eq!(recording.event_count(), 0);
    }

    #[test]
    fn test_recording_duration() {
        let recording = Recording::from(vec![
            key_at(Down, "a", 10.0),
            key_at(Up, "a", 10.5),
            key_at(Down, "b", 15.0),
        ])
        .with_description("Test macro");
        assert_eq!(recording.duration(), Duration::from_secs(5));
        assert_eq!(recording.description, Some("Test macro".to_string()));
    }

    #[test]
    fn test_duration_saturates() {
        let recording = Recording::from(vec![key_at(Down, "a", 0.0), key_at(Up, "a", f64::INFINITY)]);
        assert_eq!(recording.duration(), Duration::MAX);

        let recording = Recording::from(vec![key_at(Down, "a", 0.0), key_at(Up, "a", 1e300)]);
        assert_eq!(recording.duration(), Duration::MAX);
    }

    #[cfg(feature = "recorder")]
    #[test]
    fn test_save_load_roundtrip() {
        use crate::event::{ButtonEvent, MoveEvent, WheelEvent};

        let recording = Recording::from(vec![
            key_at(Down, "a", 1.0),
            key_at(Up, "a", 1.25),
            Event::Button(ButtonEvent {
                direction: Down,
                button: Button::Right,
                time: 1.5,
            }),
            Event::Button(ButtonEvent {
                direction: Up,
                button: Button::Right,
                time: 1.75,
            }),
            Event::Move(MoveEvent {
                x: 100.0,
                y: 200.5,
                time: 2.0,
            }),
            Event::Wheel(WheelEvent {
                delta: -3.0,
                time: 2.5,
            }),
        ])
        .with_description("roundtrip");

        let path = std::env::temp_dir().join(format!(
            "keyhook-recording-{}-{:?}.json",
            std::process::id(),
            std::thread::current().id()
        ));
        recording.save(&path).unwrap();
        let loaded = Recording::load(&path).unwrap();
        let _ = std::fs::remove_file(&path);

        assert_eq!(loaded.events, recording.events);
        assert_eq!(loaded.description.as_deref(), Some("roundtrip"));
        assert_eq!(loaded.created_at, recording.created_at);
    }

    #[cfg(feature = "recorder")]
    #[test]
    fn test_load_missing_file() {
        let path = std::env::temp_dir().join("keyhook-recording-does-not-exist.json");
        assert!(matches!(Recording::load(&path), Err(Error::Other(_))));
    }

    #[test]
    fn test_recording_handler_filters() {
        let handler = RecordingHandler {
            events: Arc::new(Mutex::new(Vec::new())),
            exclude: |event: &Event| event.is_mouse(),
        };
        handler.handle_event(&key(Down, "a"));
        handler.handle_event(&Event::moved(1.0, 2.0));
        handler.handle_event(&key(Up, "a"));
        assert_eq!(handler.len(), 2);
    }

    #[test]
    fn test_play_without_delay_reproduces_calls() {
        let (backend, simulator) = simulator();
        let events = vec![
            key_at(Down, "a", 0.0),
            key_at(Up, "a", 5.0),
            Event::button_down(Button::Left),
            Event::button_up(Button::Left),
            Event::moved(3.0, 4.0),
            Event::wheel(-1.0),
        ];

        let start = Instant::now();
        play(&simulator, &events, 0.0).unwrap();
        assert!(start.elapsed() < Duration::from_secs(2));
        assert_eq!(
            backend.take_calls(),
            vec![
                Synth::Press(code("a")),
                Synth::Release(code("a")),
                Synth::PressButton(Button::Left),
                Synth::ReleaseButton(Button::Left),
                Synth::MoveTo(3.0, 4.0),
                Synth::Wheel(-1.0),
            ]
        );
    }

    #[test]
    fn test_play_keeps_spacing() {
        let (_, simulator) = simulator();
        let events = vec![key_at(Down, "a", 1.0), key_at(Up, "a", 1.2)];

        let start = Instant::now();
        play(&simulator, &events, 1.0).unwrap();
        assert!(start.elapsed() >= Duration::from_millis(200));

        let start = Instant::now();
        play(&simulator, &events, 4.0).unwrap();
        let elapsed = start.elapsed();
        assert!(elapsed >= Duration::from_millis(50));
        assert!(elapsed < Duration::from_millis(200));
    }

    #[test]
    fn test_play_rejects_unsleepable_gap() {
        let (backend, simulator) = simulator();
        let events = vec![key_at(Down, "a", 0.0), key_at(Up, "a", 1.0)];

        let played = play(&simulator, &events, 1e-300);
        assert!(matches!(played, Err(Error::Other(_))));
        assert!(backend.take_calls().is_empty());
        assert!(simulator.dispatcher().pressed().is_empty());

        let events = vec![key_at(Down, "a", 0.0), key_at(Up, "a", f64::INFINITY)];
        assert!(play(&simulator, &events, 1.0).is_err());
        play(&simulator, &events, 0.0).unwrap();
        assert_eq!(
            backend.take_calls(),
            vec![Synth::Press(code("a")), Synth::Release(code("a"))]
        );
    }

    #[test]
    fn test_play_restores_held_keys() {
        let (backend, simulator) = simulator();
        simulator.dispatcher().dispatch(&key(Down, "shift"));

        play(&simulator, &[key_at(Down, "x", 0.0), key_at(Up, "x", 0.1)], -1.0).unwrap();
        assert_eq!(
            backend.take_calls(),
            vec![
                Synth::Release(code("left shift")),
                Synth::Press(code("x")),
                Synth::Release(code("x")),
                Synth::Press(code("left shift")),
            ]
        );
    }

    #[test]
    fn test_typed_strings() {
        let tap = |name: &str| vec![key(Down, name), key(Up, name)];
        let mut events = Vec::new();
        events.extend(tap("h"));
        events.push(key(Down, "shift"));
        events.extend(tap("i"));
        events.push(key(Up, "shift"));
        events.extend(tap("space"));
        events.extend(tap("x"));
        events.extend(tap("backspace"));
        events.extend(tap("caps lock"));
        events.extend(tap("y"));
        events.extend(tap("enter"));
        events.extend(tap("z"));

        // Caps lock is still on for the last string.
        assert_eq!(typed_strings(&events, true), vec!["hI Y", "Z"]);
        assert_eq!(typed_strings(&events, false), vec!["hI x", "Y", "Z"]);
    }

    #[test]
    fn test_typed_strings_ignores_mouse() {
        let events = vec![
            Event::key_down(KeyCode(1), "a"),
            Event::button_down(Button::Left),
            Event::key_down(KeyCode(2), "b"),
        ];
        assert_eq!(typed_strings(&events, true), vec!["ab"]);
    }
}
