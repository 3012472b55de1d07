//! Multi-step hotkeys.
//!
//! A hotkey such as `"ctrl+shift+m, ctrl+space"` is a sequence of steps; each
//! step is a chord of tokens that must be held at the same time, and each
//! token is the set of physical keys that may satisfy it (`"ctrl"` is either
//! control key). [`canonicalize`] turns user input into that structure and
//! [`HotkeyState::advance`] runs one registration's state machine.

use crate::backend::Backend;
use crate::error::{Error, Result};
use crate::event::{Direction, Event, KeyCode, KeyEvent, names_match};
use crate::hook::{GrabHandler, Propagation};
use crate::names::normalize_name;
use crate::state::PressedState;
use crate::worker::{Callback, Worker};
use log::debug;
use parking_lot::Mutex;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// User-facing hotkey description, before canonicalization.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HotkeySpec {
    /// Textual form: `+` joins keys of a step, `,` separates steps.
    Text(String),
    /// Already split into steps of raw key codes.
    Codes(Vec<Vec<KeyCode>>),
}

impl From<&str> for HotkeySpec {
    fn from(text: &str) -> Self {
        HotkeySpec::Text(text.to_string())
    }
}

impl From<String> for HotkeySpec {
    fn from(text: String) -> Self {
        HotkeySpec::Text(text)
    }
}

impl From<KeyCode> for HotkeySpec {
    fn from(code: KeyCode) -> Self {
        HotkeySpec::Codes(vec![vec![code]])
    }
}

impl From<Vec<KeyCode>> for HotkeySpec {
    fn from(chord: Vec<KeyCode>) -> Self {
        HotkeySpec::Codes(vec![chord])
    }
}

impl From<Vec<Vec<KeyCode>>> for HotkeySpec {
    fn from(steps: Vec<Vec<KeyCode>>) -> Self {
        HotkeySpec::Codes(steps)
    }
}

impl fmt::Display for HotkeySpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HotkeySpec::Text(text) => f.write_str(text),
            HotkeySpec::Codes(steps) => {
                let steps: Vec<String> = steps
                    .iter()
                    .map(|chord| {
                        let codes: Vec<String> = chord.iter().map(KeyCode::to_string).collect();
                        codes.join("+")
                    })
                    .collect();
                f.write_str(&steps.join(", "))
            }
        }
    }
}

/// One key position in a chord; any of its codes satisfies it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyToken {
    /// Canonical name, when the token was given by name.
    pub name: Option<String>,
    /// Physical keys carrying that name.
    pub codes: Vec<KeyCode>,
}

impl KeyToken {
    /// Token for a single raw code.
    pub fn from_code(code: KeyCode) -> Self {
        Self {
            name: None,
            codes: vec![code],
        }
    }

    /// Resolve a key name through the backend.
    ///
    /// Single characters the backend has no name for are tried through
    /// `map_char`, so layout-specific keys such as `ç` still resolve.
    pub fn resolve(name: &str, backend: &dyn Backend) -> Result<Self> {
        let name = normalize_name(name);
        let mut codes = backend.key_codes(&name);
        if codes.is_empty() {
            let mut chars = name.chars();
            if let (Some(ch), None) = (chars.next(), chars.next())
                && let Ok((code, _)) = backend.map_char(ch)
            {
                codes.push(code);
            }
        }
        if codes.is_empty() {
            return Err(Error::UnknownToken(name));
        }
        Ok(Self {
            name: Some(name),
            codes,
        })
    }

    /// Check if the event is one of this token's keys.
    pub fn matches(&self, event: &KeyEvent) -> bool {
        self.codes.contains(&event.code)
            || self
                .name
                .as_deref()
                .is_some_and(|name| names_match(name, &event.name))
    }

    /// Check if any of this token's keys is currently held.
    pub fn is_pressed(&self, pressed: &PressedState) -> bool {
        self.codes.iter().any(|code| pressed.is_code_pressed(*code))
            || self
                .name
                .as_deref()
                .is_some_and(|name| pressed.is_name_pressed(name))
    }

    /// The code used when synthesizing this token.
    pub fn primary_code(&self) -> KeyCode {
        self.codes[0]
    }
}

/// A chord: every token must be held simultaneously.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Step {
    /// Tokens of the chord, in the order given.
    pub tokens: Vec<KeyToken>,
}

impl Step {
    /// Check if the event belongs to this chord.
    pub fn expects(&self, event: &KeyEvent) -> bool {
        self.tokens.iter().any(|token| token.matches(event))
    }

    /// Check if the whole chord is held, counting `event` as held.
    pub fn is_held(&self, pressed: &PressedState, event: &KeyEvent) -> bool {
        self.tokens
            .iter()
            .all(|token| token.is_pressed(pressed) || token.matches(event))
    }
}

/// A canonical hotkey: a non-empty sequence of non-empty chords.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Hotkey {
    text: String,
    steps: Vec<Step>,
}

impl Hotkey {
    /// The text the hotkey was registered with.
    pub fn text(&self) -> &str {
        &self.text
    }

    /// The chords, in order.
    pub fn steps(&self) -> &[Step] {
        &self.steps
    }

    /// Check if this is a single chord.
    pub fn is_single_step(&self) -> bool {
        self.steps.len() == 1
    }
}

impl fmt::Display for Hotkey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text)
    }
}

/// Split a textual hotkey into steps of normalized key names.
///
/// Whitespace around keys is ignored. A lone character is always a single key,
/// so `"+"` and `","` name those keys; inside combinations use `plus` and
/// `comma`.
pub fn parse(text: &str) -> Result<Vec<Vec<String>>> {
    if text.chars().count() == 1 || !(text.contains('+') || text.contains(',')) {
        let name = if text.chars().count() == 1 {
            text.to_string()
        } else {
            text.trim().to_string()
        };
        if name.is_empty() {
            return Err(Error::InvalidSpec("empty hotkey".into()));
        }
        return Ok(vec![vec![normalize_name(&name)]]);
    }

    text.split(',')
        .map(|step| {
            step.split('+')
                .map(|part| {
                    let part = part.trim();
                    if part.is_empty() {
                        Err(Error::InvalidSpec(format!("empty key in hotkey {text:?}")))
                    } else {
                        Ok(normalize_name(part))
                    }
                })
                .collect()
        })
        .collect()
}

/// Turn a hotkey description into resolved steps.
pub fn canonicalize(spec: impl Into<HotkeySpec>, backend: &dyn Backend) -> Result<Hotkey> {
    let spec = spec.into();
    let steps: Vec<Step> = match &spec {
        HotkeySpec::Text(text) => parse(text)?
            .iter()
            .map(|names| {
                let tokens = names
                    .iter()
                    .map(|name| KeyToken::resolve(name, backend))
                    .collect::<Result<Vec<_>>>()?;
                Ok(Step { tokens })
            })
            .collect::<Result<_>>()?,
        HotkeySpec::Codes(chords) => chords
            .iter()
            .map(|chord| Step {
                tokens: chord.iter().copied().map(KeyToken::from_code).collect(),
            })
            .collect(),
    };

    if steps.is_empty() {
        return Err(Error::InvalidSpec(format!("hotkey {spec} has no steps")));
    }
    if steps.iter().any(|step| step.tokens.is_empty()) {
        return Err(Error::InvalidSpec(format!("hotkey {spec} has an empty step")));
    }
    Ok(Hotkey {
        text: spec.to_string(),
        steps,
    })
}

/// Registration options for [`Keyboard::add_hotkey`](crate::Keyboard::add_hotkey).
#[derive(Debug, Clone, PartialEq)]
pub struct HotkeyOptions {
    /// Suppress the event that completes the hotkey.
    pub blocking: bool,
    /// Maximum gap between steps; `None` never expires.
    pub timeout: Option<Duration>,
    /// Fire on the first key release after the last step instead of on the
    /// press completing it.
    pub trigger_on_release: bool,
}

impl Default for HotkeyOptions {
    fn default() -> Self {
        Self {
            blocking: false,
            timeout: Some(Duration::from_secs(1)),
            trigger_on_release: false,
        }
    }
}

impl HotkeyOptions {
    /// Set whether the completing event is suppressed.
    pub fn blocking(mut self, blocking: bool) -> Self {
        self.blocking = blocking;
        self
    }

    /// Set the step timeout; zero means never.
    pub fn timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout.filter(|t| !t.is_zero());
        self
    }

    /// Fire on release instead of press.
    pub fn trigger_on_release(mut self, on_release: bool) -> Self {
        self.trigger_on_release = on_release;
        self
    }
}

/// Progress of one registration through its steps.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct HotkeyState {
    /// Index of the step being waited for.
    pub step: usize,
    /// Time of the last expected key press.
    pub last_time: f64,
}

impl HotkeyState {
    /// Feed one key event; returns true when the hotkey fires.
    ///
    /// A key that breaks a partial sequence resets the machine and is then
    /// evaluated once more from step zero, so it can start a new attempt.
    pub fn advance(
        &mut self,
        steps: &[Step],
        options: &HotkeyOptions,
        event: &KeyEvent,
        pressed: &PressedState,
    ) -> bool {
        let count = steps.len();

        if event.direction == Direction::Up {
            if options.trigger_on_release && self.step == count {
                self.step = 0;
                return true;
            }
            return false;
        }

        // Completed in release mode: waiting for the key to come up.
        if options.trigger_on_release && self.step >= count {
            return false;
        }

        for _ in 0..2 {
            let timed_out = self.step > 0
                && options
                    .timeout
                    .is_some_and(|t| event.time - self.last_time > t.as_secs_f64());
            let unexpected = !steps[self.step].expects(event);

            if unexpected || timed_out {
                if self.step > 0 {
                    self.step = 0;
                    continue;
                }
                return false;
            }

            self.last_time = event.time;
            if steps[self.step].is_held(pressed, event) {
                self.step += 1;
                if !options.trigger_on_release && self.step == count {
                    self.step = 0;
                    return true;
                }
            }
            return false;
        }
        false
    }
}

/// Dispatch handler driving one hotkey registration.
pub(crate) struct HotkeyHandler {
    pub(crate) hotkey: Hotkey,
    pub(crate) options: HotkeyOptions,
    pub(crate) state: Mutex<HotkeyState>,
    pub(crate) pressed: Arc<PressedState>,
    pub(crate) callback: Callback,
    pub(crate) worker: Arc<Worker>,
}

impl GrabHandler for HotkeyHandler {
    fn handle_event(&self, event: &Event) -> Propagation {
        let Event::Key(key) = event else {
            return Propagation::Pass;
        };
        let fired = self
            .state
            .lock()
            .advance(self.hotkey.steps(), &self.options, key, &self.pressed);
        if !fired {
            return Propagation::Pass;
        }
        debug!("hotkey {} triggered", self.hotkey);
        self.worker
            .schedule(format!("hotkey {}", self.hotkey), Arc::clone(&self.callback));
        Propagation::from(self.options.blocking)
    }
}
