//! Input synthesis that leaves the user's held keys alone.
//!
//! Everything here runs inside a synthetic span of the dispatcher: echoes of
//! injected keys keep the pressed state accurate but never reach handlers, so
//! typing an abbreviation cannot re-trigger a hotkey or word listener.

use crate::backend::Backend;
use crate::error::{Error, Result};
use crate::event::KeyCode;
use crate::hook::Dispatcher;
use crate::hotkey::{HotkeySpec, canonicalize};
use crate::names::normalize_name;
use log::{debug, warn};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

/// Backend wrapper for synthesized input.
pub(crate) struct Simulator {
    backend: Arc<dyn Backend>,
    dispatcher: Arc<Dispatcher>,
}

impl Simulator {
    pub(crate) fn new(backend: Arc<dyn Backend>, dispatcher: Arc<Dispatcher>) -> Self {
        Self {
            backend,
            dispatcher,
        }
    }

    pub(crate) fn backend(&self) -> &Arc<dyn Backend> {
        &self.backend
    }

    pub(crate) fn dispatcher(&self) -> &Arc<Dispatcher> {
        &self.dispatcher
    }

    /// Release every held key and return them sorted.
    pub(crate) fn stash(&self) -> Result<Vec<KeyCode>> {
        let _synthetic = self.dispatcher.synthetic();
        let held = self.dispatcher.pressed().codes();
        for code in &held {
            self.backend.release(*code)?;
        }
        debug!("stashed {} held keys", held.len());
        Ok(held)
    }

    /// Make the held keys exactly `keys`, touching only the difference.
    pub(crate) fn restore(&self, keys: &[KeyCode]) -> Result<()> {
        let _synthetic = self.dispatcher.synthetic();
        let current = self.dispatcher.pressed().codes();
        for code in current.iter().filter(|code| !keys.contains(code)) {
            self.backend.release(*code)?;
        }
        for code in keys.iter().filter(|code| !current.contains(code)) {
            self.backend.press(*code)?;
        }
        Ok(())
    }

    /// Press and/or release a hotkey: each step's keys go down in order and
    /// come up in reverse.
    pub(crate) fn send(&self, spec: impl Into<HotkeySpec>, press: bool, release: bool) -> Result<()> {
        let hotkey = canonicalize(spec, self.backend.as_ref())?;
        let _synthetic = self.dispatcher.synthetic();
        for step in hotkey.steps() {
            if press {
                for token in &step.tokens {
                    self.backend.press(token.primary_code())?;
                }
            }
            if release {
                for token in step.tokens.iter().rev() {
                    self.backend.release(token.primary_code())?;
                }
            }
        }
        Ok(())
    }

    /// Type `text` with the held keys stashed for the duration.
    ///
    /// Characters the layout cannot produce fall back to Unicode injection;
    /// with `exact` every character is injected that way.
    pub(crate) fn write(&self, text: &str, delay: Duration, exact: bool) -> Result<()> {
        let _synthetic = self.dispatcher.synthetic();
        let held = self.stash()?;
        let typed = self.type_chars(text, delay, exact);
        let restored = self.restore(&held);
        typed.and(restored)
    }

    fn type_chars(&self, text: &str, delay: Duration, exact: bool) -> Result<()> {
        for ch in text.chars() {
            if exact {
                self.backend.type_unicode(ch)?;
            } else if let Some(code) = self.named_key(ch) {
                self.tap(code, &[])?;
            } else {
                match self.backend.map_char(ch) {
                    Ok((code, modifiers)) => self.tap(code, &modifiers)?,
                    Err(Error::UnmappableCharacter(_)) => {
                        warn!("no key produces {ch:?}, injecting it as unicode");
                        self.backend.type_unicode(ch)?;
                    }
                    Err(e) => return Err(e),
                }
            }
            if !delay.is_zero() {
                thread::sleep(delay);
            }
        }
        Ok(())
    }

    /// Keys typed by name rather than by character (`\n`, `\t`, space...).
    fn named_key(&self, ch: char) -> Option<KeyCode> {
        let name = normalize_name(ch.encode_utf8(&mut [0; 4]));
        if name.chars().count() < 2 {
            return None;
        }
        self.backend.key_codes(&name).first().copied()
    }

    fn tap(&self, code: KeyCode, modifiers: &[KeyCode]) -> Result<()> {
        if self.dispatcher.pressed().is_code_pressed(code) {
            self.backend.release(code)?;
        }
        for modifier in modifiers {
            self.backend.press(*modifier)?;
        }
        self.backend.press(code)?;
        self.backend.release(code)?;
        for modifier in modifiers.iter().rev() {
            self.backend.release(*modifier)?;
        }
        Ok(())
    }
}
