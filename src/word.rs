//! Typed-word detection.
//!
//! A word listener accumulates the characters typed since the last
//! non-character key and fires when a trigger key (space by default) is
//! pressed right after the word. Matching is case sensitive; letters are
//! cased by the live shift and caps lock state.

use crate::event::{Direction, Event, KeyEvent, names_match};
use crate::hook::{GrabHandler, Propagation};
use crate::names::{is_modifier, normalize_name};
use crate::state::PressedState;
use crate::worker::{Callback, Worker};
use log::debug;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;

/// Registration options for word listeners and abbreviations.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct WordOptions {
    /// Keys that complete a word. Empty means the configured default.
    pub triggers: Vec<String>,
    /// Also fire when the typed text only ends with the word.
    pub match_suffix: bool,
    /// Maximum gap between characters; `None` never expires. Unset means
    /// the configured default.
    pub timeout: Option<Option<Duration>>,
}

impl WordOptions {
    /// Keys that complete the word, replacing the configured default.
    pub fn triggers<I, S>(mut self, triggers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.triggers = triggers.into_iter().map(Into::into).collect();
        self
    }

    /// Fire when the typed text ends with the word.
    pub fn match_suffix(mut self, match_suffix: bool) -> Self {
        self.match_suffix = match_suffix;
        self
    }

    /// Set the character timeout; zero means never.
    pub fn timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = Some(timeout.filter(|t| !t.is_zero()));
        self
    }
}

/// Per-registration matcher state.
#[derive(Debug, Clone)]
pub struct WordMatcher {
    word: String,
    triggers: Vec<String>,
    match_suffix: bool,
    timeout: Option<f64>,
    buffer: String,
    last_time: Option<f64>,
}

impl WordMatcher {
    /// Matcher for `word` completed by any of `triggers`; a `None` timeout
    /// never discards the buffer.
    pub fn new(
        word: impl Into<String>,
        triggers: &[String],
        match_suffix: bool,
        timeout: Option<Duration>,
    ) -> Self {
        Self {
            word: word.into(),
            triggers: triggers.iter().map(|t| normalize_name(t)).collect(),
            match_suffix,
            timeout: timeout.map(|t| t.as_secs_f64()),
            buffer: String::new(),
            last_time: None,
        }
    }

    /// The word being listened for.
    pub fn word(&self) -> &str {
        &self.word
    }

    /// Characters typed since the last reset.
    pub fn buffer(&self) -> &str {
        &self.buffer
    }

    fn is_match(&self) -> bool {
        self.buffer == self.word || (self.match_suffix && self.buffer.ends_with(&self.word))
    }

    fn is_trigger(&self, event: &KeyEvent) -> bool {
        self.triggers.iter().any(|t| names_match(t, &event.name))
    }

    /// Feed one key event; returns true when the word was completed.
    ///
    /// `uppercase` is whether a typed letter comes out in upper case
    /// (shift and caps lock combined).
    pub fn feed(&mut self, event: &KeyEvent, uppercase: bool) -> bool {
        if event.direction == Direction::Up || is_modifier(&event.name) {
            return false;
        }

        if self.is_match() && self.is_trigger(event) {
            self.buffer.clear();
            return true;
        }

        let mut chars = event.name.chars();
        let (Some(ch), None) = (chars.next(), chars.next()) else {
            self.buffer.clear();
            return false;
        };

        if let (Some(timeout), Some(last)) = (self.timeout, self.last_time)
            && event.time - last > timeout
        {
            self.buffer.clear();
        }
        self.last_time = Some(event.time);
        if uppercase {
            self.buffer.extend(ch.to_uppercase());
        } else {
            self.buffer.push(ch);
        }
        false
    }
}

/// Dispatch handler for one word registration.
pub(crate) struct WordHandler {
    pub(crate) matcher: Mutex<WordMatcher>,
    pub(crate) pressed: Arc<PressedState>,
    pub(crate) callback: Callback,
    pub(crate) worker: Arc<Worker>,
}

impl GrabHandler for WordHandler {
    fn handle_event(&self, event: &Event) -> Propagation {
        let Event::Key(key) = event else {
            return Propagation::Pass;
        };
        let uppercase = self.pressed.is_shift_held() ^ self.pressed.is_caps_lock_on();
        let mut matcher = self.matcher.lock();
        if matcher.feed(key, uppercase) {
            debug!("word {:?} typed", matcher.word());
            self.worker
                .schedule(format!("word {:?}", matcher.word()), Arc::clone(&self.callback));
        }
        Propagation::Pass
    }
}
