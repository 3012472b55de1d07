//! Platform boundary.
//!
//! The engine never talks to the operating system directly. Hook
//! installation, the native event pump and input synthesis are provided by a
//! [`Backend`] implementation, one per target platform.

use crate::error::Result;
use crate::event::{Button, Event, KeyCode};
use crate::hook::Propagation;

/// Native input capture and synthesis primitives.
///
/// Implementations must be usable from several threads at once: `listen`
/// runs on the dedicated capture thread while synthesis calls arrive from
/// caller threads and the callback worker.
pub trait Backend: Send + Sync {
    /// Run the native event pump, invoking `dispatch` synchronously for every
    /// captured event until [`Backend::stop`] is called.
    ///
    /// When `dispatch` returns [`Propagation::Suppress`] the backend should
    /// keep the event from reaching other applications if the platform
    /// allows it.
    fn listen(&self, dispatch: &(dyn Fn(&Event) -> Propagation + Send + Sync)) -> Result<()>;

    /// Make a running `listen` return.
    fn stop(&self) -> Result<()>;

    /// Synthesize a key press.
    fn press(&self, code: KeyCode) -> Result<()>;

    /// Synthesize a key release.
    fn release(&self, code: KeyCode) -> Result<()>;

    /// Synthesize a mouse button press.
    fn press_button(&self, button: Button) -> Result<()>;

    /// Synthesize a mouse button release.
    fn release_button(&self, button: Button) -> Result<()>;

    /// Move the pointer to absolute screen coordinates.
    fn move_to(&self, x: f64, y: f64) -> Result<()>;

    /// Move the pointer relative to its current position.
    fn move_relative(&self, dx: f64, dy: f64) -> Result<()>;

    /// Spin the wheel.
    fn wheel(&self, delta: f64) -> Result<()>;

    /// Resolve a printable character to the key and modifier chord producing
    /// it on the active layout.
    ///
    /// Fails with [`Error::UnmappableCharacter`](crate::Error::UnmappableCharacter)
    /// when no key produces `ch`.
    fn map_char(&self, ch: char) -> Result<(KeyCode, Vec<KeyCode>)>;

    /// Inject a character directly, bypassing the layout.
    fn type_unicode(&self, ch: char) -> Result<()>;

    /// All physical keys carrying a canonical name (e.g. both shift keys for
    /// `"shift"`). Empty when the name is unknown.
    fn key_codes(&self, name: &str) -> Vec<KeyCode>;
}
