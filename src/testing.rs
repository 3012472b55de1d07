//! Deterministic backend for unit tests.
//!
//! Key codes come from a fixed table so tests never depend on the machine's
//! layout. Every synthesized call is recorded; with echo enabled, synthesized
//! key and button transitions are fed back into an attached dispatcher the
//! way a real OS hook would report them.

use crate::backend::Backend;
use crate::error::{Error, Result};
use crate::event::{Button, ButtonEvent, Direction, Event, KeyCode, KeyEvent, names_match, now};
use crate::hook::{Dispatcher, Propagation};
use crate::names::normalize_name;
use std::sync::{Arc, Condvar, Mutex, Weak};

/// A synthesized call.
#[derive(Debug, Clone, PartialEq)]
pub enum Synth {
    Press(KeyCode),
    Release(KeyCode),
    PressButton(Button),
    ReleaseButton(Button),
    MoveTo(f64, f64),
    MoveRelative(f64, f64),
    Wheel(f64),
    Unicode(char),
}

const NAMED: &[(u32, &str)] = &[
    (1, "esc"),
    (14, "backspace"),
    (15, "tab"),
    (28, "enter"),
    (29, "left ctrl"),
    (97, "right ctrl"),
    (42, "left shift"),
    (54, "right shift"),
    (56, "left alt"),
    (100, "alt gr"),
    (125, "left windows"),
    (57, "space"),
    (58, "caps lock"),
    (59, "f1"),
    (104, "page up"),
    (109, "page down"),
    (400, ","),
    (401, "."),
    (402, "-"),
    (403, "+"),
    (404, "/"),
];

fn table() -> Vec<(KeyCode, String)> {
    let mut entries: Vec<(KeyCode, String)> = NAMED
        .iter()
        .map(|(code, name)| (KeyCode(*code), name.to_string()))
        .collect();
    for (i, ch) in ('a'..='z').enumerate() {
        entries.push((KeyCode(200 + i as u32), ch.to_string()));
    }
    for (i, ch) in ('0'..='9').enumerate() {
        entries.push((KeyCode(300 + i as u32), ch.to_string()));
    }
    entries
}

/// Code of the first key carrying exactly `name`.
pub fn code(name: &str) -> KeyCode {
    let name = normalize_name(name);
    let entries = table();
    let exact = entries.iter().find(|(_, n)| *n == name);
    let sided = entries.iter().find(|(_, n)| names_match(&name, n));
    match exact.or(sided) {
        Some((code, _)) => *code,
        None => panic!("no fake key named {name:?}"),
    }
}

/// Canonical name of a fake key code.
pub fn name_of(code: KeyCode) -> String {
    table()
        .into_iter()
        .find(|(c, _)| *c == code)
        .map(|(_, n)| n)
        .unwrap_or_else(|| format!("unknown {code}"))
}

/// Key event for `name` at an explicit time.
pub fn key_at(direction: Direction, name: &str, time: f64) -> Event {
    let code = code(name);
    Event::Key(KeyEvent::new(direction, code, &name_of(code), time))
}

/// Key event for `name` stamped now.
pub fn key(direction: Direction, name: &str) -> Event {
    key_at(direction, name, now())
}

#[derive(Default)]
struct PumpState {
    stop_requested: bool,
    listen_calls: usize,
}

/// Recording backend with a fixed key table.
#[derive(Default)]
pub struct FakeBackend {
    calls: Mutex<Vec<Synth>>,
    pump: Mutex<PumpState>,
    wake: Condvar,
    echo: Mutex<Option<Weak<Dispatcher>>>,
}

impl FakeBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed synthesized transitions back into `dispatcher`.
    pub fn echo_into(&self, dispatcher: &Arc<Dispatcher>) {
        *self.echo.lock().unwrap() = Some(Arc::downgrade(dispatcher));
    }

    /// Drain the recorded calls.
    pub fn take_calls(&self) -> Vec<Synth> {
        std::mem::take(&mut *self.calls.lock().unwrap())
    }

    /// Drain key presses/releases as `(direction, name)` pairs.
    pub fn take_keys(&self) -> Vec<(Direction, String)> {
        self.take_calls()
            .into_iter()
            .filter_map(|call| match call {
                Synth::Press(code) => Some((Direction::Down, name_of(code))),
                Synth::Release(code) => Some((Direction::Up, name_of(code))),
                _ => None,
            })
            .collect()
    }

    pub fn listen_calls(&self) -> usize {
        self.pump.lock().unwrap().listen_calls
    }

    fn record(&self, call: Synth) {
        self.calls.lock().unwrap().push(call.clone());
        let target = self.echo.lock().unwrap().as_ref().and_then(Weak::upgrade);
        let Some(dispatcher) = target else {
            return;
        };
        let event = match call {
            Synth::Press(code) => Event::Key(KeyEvent::new(Direction::Down, code, &name_of(code), now())),
            Synth::Release(code) => Event::Key(KeyEvent::new(Direction::Up, code, &name_of(code), now())),
            Synth::PressButton(button) => Event::Button(ButtonEvent {
                direction: Direction::Down,
                button,
                time: now(),
            }),
            Synth::ReleaseButton(button) => Event::Button(ButtonEvent {
                direction: Direction::Up,
                button,
                time: now(),
            }),
            _ => return,
        };
        dispatcher.dispatch(&event);
    }
}

impl Backend for FakeBackend {
    fn listen(&self, _dispatch: &(dyn Fn(&Event) -> Propagation + Send + Sync)) -> Result<()> {
        let mut pump = self.pump.lock().unwrap();
        pump.listen_calls += 1;
        while !pump.stop_requested {
            pump = self.wake.wait(pump).unwrap();
        }
        pump.stop_requested = false;
        Ok(())
    }

    fn stop(&self) -> Result<()> {
        self.pump.lock().unwrap().stop_requested = true;
        self.wake.notify_all();
        Ok(())
    }

    fn press(&self, code: KeyCode) -> Result<()> {
        self.record(Synth::Press(code));
        Ok(())
    }

    fn release(&self, code: KeyCode) -> Result<()> {
        self.record(Synth::Release(code));
        Ok(())
    }

    fn press_button(&self, button: Button) -> Result<()> {
        self.record(Synth::PressButton(button));
        Ok(())
    }

    fn release_button(&self, button: Button) -> Result<()> {
        self.record(Synth::ReleaseButton(button));
        Ok(())
    }

    fn move_to(&self, x: f64, y: f64) -> Result<()> {
        self.record(Synth::MoveTo(x, y));
        Ok(())
    }

    fn move_relative(&self, dx: f64, dy: f64) -> Result<()> {
        self.record(Synth::MoveRelative(dx, dy));
        Ok(())
    }

    fn wheel(&self, delta: f64) -> Result<()> {
        self.record(Synth::Wheel(delta));
        Ok(())
    }

    fn map_char(&self, ch: char) -> Result<(KeyCode, Vec<KeyCode>)> {
        let lower: String = ch.to_lowercase().collect();
        let entry = table().into_iter().find(|(_, n)| *n == normalize_name(&lower));
        match entry {
            Some((code, _)) if ch.is_uppercase() => Ok((code, vec![KeyCode(42)])),
            Some((code, _)) => Ok((code, Vec::new())),
            None => Err(Error::UnmappableCharacter(ch)),
        }
    }

    fn type_unicode(&self, ch: char) -> Result<()> {
        self.record(Synth::Unicode(ch));
        Ok(())
    }

    fn key_codes(&self, name: &str) -> Vec<KeyCode> {
        table()
            .into_iter()
            .filter(|(_, n)| names_match(name, n))
            .map(|(code, _)| code)
            .collect()
    }
}
