//! # keyhook
//!
//! Global keyboard and mouse hooks with hotkeys, typed-word listeners,
//! key-sequence suppression and record/playback.
//!
//! ## Features
//!
//! - Multi-step hotkeys (`"ctrl+k, ctrl+c"`) with optional blocking
//! - Word listeners and abbreviations that expand as you type
//! - Suppression of whole key sequences with per-sequence timeouts
//! - Input synthesis that stashes and restores the user's held keys
//! - Recording and timed playback of input
//! - Pluggable OS layer through the [`Backend`] trait
//!
//! ## Quick Start
//!
//! ### Hotkeys
//!
//! ```no_run
//! use keyhook::{Config, Keyboard};
//! # fn demo(backend: std::sync::Arc<dyn keyhook::Backend>) -> keyhook::Result<()> {
//! let keyboard = Keyboard::new(backend, Config::default())?;
//!
//! keyboard.add_hotkey("ctrl+alt+t", || println!("hotkey"))?;
//! keyboard.add_abbreviation("tm", "\u{2122}", Default::default())?;
//! keyboard.wait("esc")?;
//! # Ok(())
//! # }
//! ```
//!
//! ### Observing and Grabbing Events
//!
//! ```no_run
//! use keyhook::{Event, Propagation};
//! # fn demo(keyboard: &keyhook::Keyboard) -> keyhook::Result<()> {
//! keyboard.hook(|event: &Event| println!("{event:?}"))?;
//!
//! // Block F1, pass everything else through.
//! keyboard.grab(|event: &Event| Propagation::from(event.matches("f1")))?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Architecture
//!
//! A [`Keyboard`] owns a [`hook::Dispatcher`]: every captured event first
//! updates the shared [`state::PressedState`] and then runs through the
//! registered handlers in order until one suppresses it. Handlers run on the
//! capture thread, so hotkey and word callbacks are handed to a
//! [`worker::Worker`], which starts each one on a thread of its own. Input
//! injected by the library itself is
//! dispatched inside a synthetic span and never reaches handlers.

pub mod backend;
pub mod channel;
pub mod config;
pub mod error;
pub mod event;
pub mod hook;
pub mod hotkey;
pub mod keyboard;
pub mod names;
pub mod recorder;
pub mod state;
pub mod suppress;
pub mod word;
pub mod worker;

mod simulate;
#[cfg(test)]
mod testing;

// Re-exports
pub use backend::Backend;
pub use config::Config;
pub use error::{Error, Result};
pub use event::{Button, Direction, Event, KeyCode, KeyEvent};
pub use hook::{EventHandler, GrabHandler, HandlerId, Propagation};
pub use hotkey::{Hotkey, HotkeyOptions, HotkeySpec};
pub use keyboard::Keyboard;
pub use names::shortcut_name;
pub use recorder::Recording;
pub use word::WordOptions;
