//! The [`Keyboard`] facade.
//!
//! One `Keyboard` owns all process-scoped hook state: the listener registry,
//! the pressed-key tracker, hotkey and word registrations, the suppression
//! table and the callback worker. The capture thread is started lazily by the
//! first registration.

use crate::backend::Backend;
use crate::config::Config;
use crate::error::{Error, Result};
use crate::event::{Button, Direction, Event, KeyCode, KeyEvent};
use crate::hook::{Dispatcher, EventHandler, GrabHandler, HandlerId, Hook, Observer, Propagation};
use crate::hotkey::{Hotkey, HotkeyHandler, HotkeyOptions, HotkeySpec, HotkeyState, canonicalize};
use crate::names::shortcut_name;
use crate::recorder::{self, Recording, Session, recording_handler};
use crate::simulate::Simulator;
use crate::state::PressedState;
use crate::suppress::SuppressionTable;
use crate::word::{WordHandler, WordMatcher, WordOptions};
use crate::worker::{Callback, Worker};
use log::{debug, warn};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::mpsc;
use std::sync::{Arc, Weak};
use std::time::Duration;

/// Global keyboard and mouse hook engine.
///
/// # Example
///
/// ```no_run
/// use keyhook::{Config, HotkeyOptions, Keyboard};
/// # fn demo(backend: std::sync::Arc<dyn keyhook::Backend>) -> keyhook::Result<()> {
/// let keyboard = Keyboard::new(backend, Config::default())?;
///
/// keyboard.add_hotkey("ctrl+shift+a", || println!("pressed"))?;
/// keyboard.add_hotkey_with("ctrl+k, ctrl+c", HotkeyOptions::default().blocking(true), || {
///     println!("chord sequence")
/// })?;
/// keyboard.add_abbreviation("@@", "john@example.com", Default::default())?;
///
/// keyboard.wait("esc")?;
/// # Ok(())
/// # }
/// ```
pub struct Keyboard {
    config: Config,
    backend: Arc<dyn Backend>,
    dispatcher: Arc<Dispatcher>,
    hook: Hook,
    worker: Arc<Worker>,
    simulator: Arc<Simulator>,
    suppression: Arc<SuppressionTable>,
    suppression_handler: Mutex<Option<HandlerId>>,
    hotkeys: Mutex<HashMap<HandlerId, Hotkey>>,
    words: Mutex<HashMap<String, HandlerId>>,
    recording: Mutex<Option<Session>>,
}

impl Keyboard {
    /// Create an engine on top of `backend`. No thread captures input until
    /// the first handler is registered.
    pub fn new(backend: Arc<dyn Backend>, config: Config) -> Result<Self> {
        let dispatcher = Arc::new(Dispatcher::new());
        let hook = Hook::new(
            Arc::clone(&backend),
            Arc::clone(&dispatcher),
            config.capture_thread_name.clone(),
        );
        let worker = Arc::new(Worker::spawn(
            config.worker_thread_name.clone(),
            config.callback_delay,
        )?);
        let simulator = Arc::new(Simulator::new(Arc::clone(&backend), Arc::clone(&dispatcher)));

        Ok(Self {
            config,
            backend,
            dispatcher,
            hook,
            worker,
            simulator,
            suppression: Arc::new(SuppressionTable::new()),
            suppression_handler: Mutex::new(None),
            hotkeys: Mutex::new(HashMap::new()),
            words: Mutex::new(HashMap::new()),
            recording: Mutex::new(None),
        })
    }

    /// Settings this engine was created with.
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Registry every captured event goes through.
    pub(crate) fn dispatcher(&self) -> &Arc<Dispatcher> {
        &self.dispatcher
    }

    /// Feed one event through the registry as if it had been captured.
    pub fn dispatch(&self, event: &Event) -> Propagation {
        self.dispatcher.dispatch(event)
    }

    /// Live pressed-key state.
    pub fn pressed(&self) -> &PressedState {
        self.dispatcher.pressed()
    }

    /// Start capturing if needed, then append `handler`.
    pub(crate) fn register(&self, handler: Arc<dyn GrabHandler>) -> Result<HandlerId> {
        self.hook.start_if_necessary()?;
        Ok(self.dispatcher.add_handler(handler))
    }

    // ---- listener registry -------------------------------------------------

    /// Observe every event. Runs on the capture thread; keep it short.
    pub fn hook<H: EventHandler + 'static>(&self, handler: H) -> Result<HandlerId> {
        self.register(Arc::new(Observer(handler)))
    }

    /// Observe every event with the ability to suppress it.
    pub fn grab<H: GrabHandler + 'static>(&self, handler: H) -> Result<HandlerId> {
        self.register(Arc::new(handler))
    }

    /// Call `callback` for every key press.
    pub fn on_press<F>(&self, callback: F) -> Result<HandlerId>
    where
        F: Fn(&KeyEvent) + Send + Sync + 'static,
    {
        self.on_direction(Direction::Down, callback)
    }

    /// Call `callback` for every key release.
    pub fn on_release<F>(&self, callback: F) -> Result<HandlerId>
    where
        F: Fn(&KeyEvent) + Send + Sync + 'static,
    {
        self.on_direction(Direction::Up, callback)
    }

    fn on_direction<F>(&self, direction: Direction, callback: F) -> Result<HandlerId>
    where
        F: Fn(&KeyEvent) + Send + Sync + 'static,
    {
        self.hook(move |event: &Event| {
            if let Event::Key(key) = event
                && key.direction == direction
            {
                callback(key);
            }
        })
    }

    /// Call `callback` for presses and releases of one key.
    pub fn hook_key<F>(&self, key: impl Into<HotkeySpec>, callback: F) -> Result<HandlerId>
    where
        F: Fn(&KeyEvent) + Send + Sync + 'static,
    {
        let hotkey = canonicalize(key, self.backend.as_ref())?;
        let token = match hotkey.steps() {
            [step] if step.tokens.len() == 1 => step.tokens[0].clone(),
            _ => {
                return Err(Error::InvalidSpec(format!("{hotkey} is not a single key")));
            }
        };
        self.hook(move |event: &Event| {
            if let Event::Key(key) = event
                && token.matches(key)
            {
                callback(key);
            }
        })
    }

    /// Remove any handler, hotkey or word listener by id.
    pub fn unhook(&self, id: HandlerId) -> Result<()> {
        self.dispatcher.remove_handler(id)?;
        self.hotkeys.lock().remove(&id);
        self.words.lock().retain(|_, existing| *existing != id);
        let mut suppression = self.suppression_handler.lock();
        if *suppression == Some(id) {
            *suppression = None;
        }
        Ok(())
    }

    /// Remove every handler, hotkey, word listener, suppressed sequence and
    /// recording session.
    pub fn unhook_all(&self) {
        self.dispatcher.clear_handlers();
        self.hotkeys.lock().clear();
        self.words.lock().clear();
        self.suppression_handler.lock().take();
        self.suppression.suppress_none();
        self.recording.lock().take();
        debug!("removed all handlers");
    }

    // ---- pressed state -----------------------------------------------------

    /// Check if a key or chord is currently held.
    ///
    /// `"shift"` is held when either shift key is; `"ctrl+a"` needs both.
    /// Sequences (`"a, b"`) are rejected.
    pub fn is_pressed(&self, key: impl Into<HotkeySpec>) -> Result<bool> {
        let hotkey = canonicalize(key, self.backend.as_ref())?;
        let [step] = hotkey.steps() else {
            return Err(Error::InvalidSpec(format!(
                "{hotkey} is a sequence, not a single chord"
            )));
        };
        let pressed = self.dispatcher.pressed();
        Ok(step.tokens.iter().all(|token| token.is_pressed(pressed)))
    }

    /// Check if a mouse button is currently held.
    pub fn is_button_pressed(&self, button: Button) -> bool {
        self.dispatcher.pressed().is_button_pressed(button)
    }

    /// Held keys rendered as a shortcut, e.g. `"ctrl+shift+a"`.
    pub fn current_shortcut_name(&self) -> String {
        shortcut_name(self.dispatcher.pressed().names())
    }

    // ---- hotkeys -----------------------------------------------------------

    /// Options for [`add_hotkey_with`](Self::add_hotkey_with) carrying the
    /// configured defaults.
    pub fn hotkey_options(&self) -> HotkeyOptions {
        HotkeyOptions {
            timeout: self.config.effective_hotkey_timeout(),
            ..HotkeyOptions::default()
        }
    }

    /// Run `callback` on a callback thread whenever `hotkey` is typed.
    pub fn add_hotkey<F>(&self, hotkey: impl Into<HotkeySpec>, callback: F) -> Result<HandlerId>
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.add_hotkey_with(hotkey, self.hotkey_options(), callback)
    }

    /// [`add_hotkey`](Self::add_hotkey) with explicit options.
    pub fn add_hotkey_with<F>(
        &self,
        hotkey: impl Into<HotkeySpec>,
        mut options: HotkeyOptions,
        callback: F,
    ) -> Result<HandlerId>
    where
        F: Fn() + Send + Sync + 'static,
    {
        let hotkey = canonicalize(hotkey, self.backend.as_ref())?;
        options.timeout = options.timeout.filter(|t| !t.is_zero());
        let handler = HotkeyHandler {
            hotkey: hotkey.clone(),
            options,
            state: Mutex::new(HotkeyState::default()),
            pressed: Arc::clone(self.dispatcher.pressed()),
            callback: Arc::new(callback),
            worker: Arc::clone(&self.worker),
        };
        let id = self.register(Arc::new(handler))?;
        debug!("hotkey {hotkey} registered as {id}");
        self.hotkeys.lock().insert(id, hotkey);
        Ok(id)
    }

    /// Remove a hotkey registration.
    pub fn remove_hotkey(&self, id: HandlerId) -> Result<()> {
        if self.hotkeys.lock().remove(&id).is_none() {
            return Err(Error::NotFound(format!("hotkey {id}")));
        }
        self.dispatcher.remove_handler(id)
    }

    /// Remove every hotkey registration.
    pub fn clear_all_hotkeys(&self) {
        let ids: Vec<HandlerId> = self.hotkeys.lock().drain().map(|(id, _)| id).collect();
        for id in ids {
            let _ = self.dispatcher.remove_handler(id);
        }
    }

    /// Registered hotkeys, by handler id.
    pub fn hotkeys(&self) -> Vec<(HandlerId, Hotkey)> {
        let mut hotkeys: Vec<(HandlerId, Hotkey)> = self
            .hotkeys
            .lock()
            .iter()
            .map(|(id, hotkey)| (*id, hotkey.clone()))
            .collect();
        hotkeys.sort_by_key(|(id, _)| *id);
        hotkeys
    }

    // ---- suppression -------------------------------------------------------

    /// Suppress every key of `keys` typed in order, each within `timeout` of
    /// the previous one. The first key of any sequence is always suppressed.
    pub fn suppress_sequence(&self, keys: &[KeyCode], timeout: Option<Duration>) -> Result<()> {
        self.suppression.suppress_sequence(keys, timeout)?;
        let mut installed = self.suppression_handler.lock();
        if installed.is_none() {
            let table: Arc<dyn GrabHandler> = self.suppression.clone();
            *installed = Some(self.register(table)?);
        }
        Ok(())
    }

    /// Remove one suppressed sequence.
    pub fn unsuppress_sequence(&self, keys: &[KeyCode]) -> Result<()> {
        self.suppression.unsuppress_sequence(keys)
    }

    /// Stop suppressing anything.
    pub fn suppress_none(&self) {
        self.suppression.suppress_none();
    }

    // ---- words -------------------------------------------------------------

    /// Run `callback` when `word` is typed followed by a trigger key.
    pub fn add_word_listener<F>(
        &self,
        word: &str,
        callback: F,
        options: WordOptions,
    ) -> Result<HandlerId>
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.add_word_handler(word, Arc::new(callback), options)
    }

    /// Replace `source` with `replacement` whenever it is typed as a word.
    ///
    /// The typed word and its trigger are erased with backspaces and the
    /// replacement typed in their place.
    pub fn add_abbreviation(
        &self,
        source: &str,
        replacement: &str,
        options: WordOptions,
    ) -> Result<HandlerId> {
        let erase = "\u{8}".repeat(source.chars().count() + 1);
        let text = format!("{erase}{replacement}");
        let simulator: Weak<Simulator> = Arc::downgrade(&self.simulator);
        let callback: Callback = Arc::new(move || {
            let Some(simulator) = simulator.upgrade() else {
                return;
            };
            if let Err(e) = simulator.write(&text, Duration::ZERO, false) {
                warn!("abbreviation replacement failed: {e}");
            }
        });
        self.add_word_handler(source, callback, options)
    }

    fn add_word_handler(
        &self,
        word: &str,
        callback: Callback,
        options: WordOptions,
    ) -> Result<HandlerId> {
        if word.is_empty() {
            return Err(Error::InvalidSpec("empty word".into()));
        }
        let triggers = if options.triggers.is_empty() {
            self.config.word_triggers.clone()
        } else {
            options.triggers
        };
        let timeout = match options.timeout {
            Some(timeout) => timeout.filter(|t| !t.is_zero()),
            None => self.config.effective_word_timeout(),
        };

        let mut words = self.words.lock();
        if words.contains_key(word) {
            return Err(Error::DuplicateRegistration(format!("word {word:?}")));
        }
        let handler = WordHandler {
            matcher: Mutex::new(WordMatcher::new(word, &triggers, options.match_suffix, timeout)),
            pressed: Arc::clone(self.dispatcher.pressed()),
            callback,
            worker: Arc::clone(&self.worker),
        };
        let id = self.register(Arc::new(handler))?;
        words.insert(word.to_string(), id);
        debug!("word listener {word:?} registered as {id}");
        Ok(id)
    }

    /// Remove a word listener or abbreviation by id.
    pub fn remove_word_listener(&self, id: HandlerId) -> Result<()> {
        let mut words = self.words.lock();
        let before = words.len();
        words.retain(|_, existing| *existing != id);
        if words.len() == before {
            return Err(Error::NotFound(format!("word listener {id}")));
        }
        drop(words);
        self.dispatcher.remove_handler(id)
    }

    /// Remove a word listener or abbreviation by its word.
    pub fn remove_word(&self, word: &str) -> Result<()> {
        let id = self
            .words
            .lock()
            .remove(word)
            .ok_or_else(|| Error::NotFound(format!("word {word:?}")))?;
        self.dispatcher.remove_handler(id)
    }

    // ---- synthesis ---------------------------------------------------------

    /// Release every held key; returns them for [`restore`](Self::restore).
    pub fn stash(&self) -> Result<Vec<KeyCode>> {
        self.simulator.stash()
    }

    /// Make exactly `keys` held again.
    pub fn restore(&self, keys: &[KeyCode]) -> Result<()> {
        self.simulator.restore(keys)
    }

    /// Press and release a hotkey, step by step.
    pub fn send(&self, hotkey: impl Into<HotkeySpec>) -> Result<()> {
        self.simulator.send(hotkey, true, true)
    }

    /// Press the keys of a hotkey without releasing them.
    pub fn press(&self, hotkey: impl Into<HotkeySpec>) -> Result<()> {
        self.simulator.send(hotkey, true, false)
    }

    /// Release the keys of a hotkey.
    pub fn release(&self, hotkey: impl Into<HotkeySpec>) -> Result<()> {
        self.simulator.send(hotkey, false, true)
    }

    /// Type `text`. Held keys are released first and pressed again after.
    pub fn write(&self, text: &str) -> Result<()> {
        self.simulator.write(text, Duration::ZERO, false)
    }

    /// Type `text` pausing `delay` after each character; `exact` injects
    /// every character as unicode instead of through the layout.
    pub fn write_with(&self, text: &str, delay: Duration, exact: bool) -> Result<()> {
        self.simulator.write(text, delay, exact)
    }

    // ---- blocking helpers --------------------------------------------------

    /// Block until `hotkey` is typed.
    ///
    /// Safe to call from a hotkey or word callback, which then keeps its own
    /// thread blocked while other callbacks go on running.
    pub fn wait(&self, hotkey: impl Into<HotkeySpec>) -> Result<()> {
        let (tx, rx) = mpsc::sync_channel(1);
        let id = self.add_hotkey(hotkey, move || {
            let _ = tx.try_send(());
        })?;
        rx.recv()
            .map_err(|_| Error::Other("hotkey removed while waiting".into()))?;
        self.remove_hotkey(id)
    }

    /// Block until an event accepted by `filter` arrives and return it.
    pub fn read_event<F>(&self, filter: F) -> Result<Event>
    where
        F: Fn(&Event) -> bool + Send + Sync + 'static,
    {
        let (tx, rx) = mpsc::sync_channel(1);
        let id = self.hook(move |event: &Event| {
            if filter(event) {
                let _ = tx.try_send(event.clone());
            }
        })?;
        let event = rx
            .recv()
            .map_err(|_| Error::Other("handler removed while waiting".into()))?;
        self.unhook(id)?;
        Ok(event)
    }

    // ---- record / play -----------------------------------------------------

    /// Record every event until `until` is typed.
    pub fn record(&self, until: impl Into<HotkeySpec>) -> Result<Vec<Event>> {
        self.record_filtered(until, |_: &Event| false)
    }

    /// Record until `until` is typed, leaving out events `exclude` accepts.
    pub fn record_filtered<F>(&self, until: impl Into<HotkeySpec>, exclude: F) -> Result<Vec<Event>>
    where
        F: Fn(&Event) -> bool + Send + Sync + 'static,
    {
        let (handler, events) = recording_handler(exclude);
        let id = self.register(handler)?;
        let waited = self.wait(until);
        let unhooked = self.dispatcher.remove_handler(id);
        waited.and(unhooked)?;
        let recorded = std::mem::take(&mut *events.lock());
        debug!("recorded {} events", recorded.len());
        Ok(recorded)
    }

    /// Start an open-ended recording.
    pub fn start_recording(&self) -> Result<()> {
        let mut session = self.recording.lock();
        if session.is_some() {
            return Err(Error::AlreadyRunning);
        }
        let (handler, events) = recording_handler(|_: &Event| false);
        let id = self.register(handler)?;
        *session = Some((id, events));
        Ok(())
    }

    /// Finish the recording started by [`start_recording`](Self::start_recording).
    pub fn stop_recording(&self) -> Result<Recording> {
        let (id, events) = self.recording.lock().take().ok_or(Error::NotRunning)?;
        self.dispatcher.remove_handler(id)?;
        let recorded = std::mem::take(&mut *events.lock());
        Ok(Recording::from_events(recorded))
    }

    /// Check if an open-ended recording is in progress.
    pub fn is_recording(&self) -> bool {
        self.recording.lock().is_some()
    }

    /// Replay events; `speed` scales the original gaps, zero or below means
    /// no delay. Held keys are stashed around the playback.
    pub fn play(&self, events: &[Event], speed: f64) -> Result<()> {
        recorder::play(&self.simulator, events, speed)
    }

    // ---- lifecycle ---------------------------------------------------------

    /// Stop the capture thread and the callback worker.
    pub fn shutdown(&self) -> Result<()> {
        if self.hook.is_running() {
            self.hook.stop()?;
        }
        self.worker.shutdown()
    }
}

impl Drop for Keyboard {
    fn drop(&mut self) {
        if let Err(e) = self.shutdown() {
            debug!("shutdown on drop failed: {e}");
        }
    }
}
