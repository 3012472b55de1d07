//! Listener registry and capture thread.
//!
//! [`Dispatcher`] owns the ordered handler list and the pressed-key state and
//! runs every handler synchronously for each captured event. [`Hook`] starts
//! the backend's blocking event pump on a dedicated capture thread, once,
//! the first time a handler is registered.

use crate::backend::Backend;
use crate::error::{Error, Result};
use crate::event::Event;
use crate::state::PressedState;
use log::{debug, error, trace};
use parking_lot::{Mutex, RwLock};
use std::any::Any;
use std::fmt;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::thread::{self, JoinHandle};

/// What should happen to an event after a handler has seen it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Propagation {
    /// Deliver to later handlers and to the rest of the system.
    #[default]
    Pass,
    /// Stop here: later handlers are skipped and the backend is asked to
    /// drop the event.
    Suppress,
}

impl Propagation {
    /// Check if the event is suppressed.
    pub fn is_suppress(self) -> bool {
        self == Propagation::Suppress
    }
}

impl From<bool> for Propagation {
    fn from(suppress: bool) -> Self {
        if suppress {
            Propagation::Suppress
        } else {
            Propagation::Pass
        }
    }
}

/// Trait for handling input events (listen-only mode).
///
/// Events are always passed through to later handlers.
pub trait EventHandler: Send + Sync {
    /// Called when an input event occurs.
    fn handle_event(&self, event: &Event);
}

/// Implement EventHandler for closures.
impl<F> EventHandler for F
where
    F: Fn(&Event) + Send + Sync,
{
    fn handle_event(&self, event: &Event) {
        self(event);
    }
}

/// Trait for handling input events with the ability to suppress them.
///
/// Return [`Propagation::Suppress`] to stop the event at this handler.
pub trait GrabHandler: Send + Sync {
    /// Called when an input event occurs.
    fn handle_event(&self, event: &Event) -> Propagation;
}

/// Implement GrabHandler for closures.
impl<F> GrabHandler for F
where
    F: Fn(&Event) -> Propagation + Send + Sync,
{
    fn handle_event(&self, event: &Event) -> Propagation {
        self(event)
    }
}

/// Adapts a listen-only handler to the registry's handler type.
pub(crate) struct Observer<H>(pub(crate) H);

impl<H: EventHandler> GrabHandler for Observer<H> {
    fn handle_event(&self, event: &Event) -> Propagation {
        self.0.handle_event(event);
        Propagation::Pass
    }
}

/// Identity of a registered handler, returned by registration calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct HandlerId(u64);

impl fmt::Display for HandlerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "handler#{}", self.0)
    }
}

type HandlerList = Arc<Vec<(HandlerId, Arc<dyn GrabHandler>)>>;

/// Ordered handler list plus pressed-key tracking.
///
/// The list is copy-on-write: mutations build a new list under `writer` and
/// publish it with a single pointer swap, so dispatch never observes a
/// half-applied registration and only holds the read lock long enough to
/// clone an `Arc`.
pub struct Dispatcher {
    handlers: RwLock<HandlerList>,
    writer: Mutex<()>,
    next_id: AtomicU64,
    pressed: Arc<PressedState>,
    synthetic: AtomicUsize,
}

impl Default for Dispatcher {
    fn default() -> Self {
        Self::new()
    }
}

impl Dispatcher {
    /// Create an empty dispatcher.
    pub fn new() -> Self {
        Self {
            handlers: RwLock::new(Arc::new(Vec::new())),
            writer: Mutex::new(()),
            next_id: AtomicU64::new(1),
            pressed: Arc::new(PressedState::new()),
            synthetic: AtomicUsize::new(0),
        }
    }

    /// The pressed-key state maintained from dispatched events.
    pub fn pressed(&self) -> &Arc<PressedState> {
        &self.pressed
    }

    /// Append a handler; it runs after every handler added before it.
    pub fn add_handler(&self, handler: Arc<dyn GrabHandler>) -> HandlerId {
        let id = HandlerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let _guard = self.writer.lock();
        let mut list = Vec::clone(&self.handlers.read());
        list.push((id, handler));
        *self.handlers.write() = Arc::new(list);
        debug!("registered {id}");
        id
    }

    /// Remove a handler by identity.
    pub fn remove_handler(&self, id: HandlerId) -> Result<()> {
        let _guard = self.writer.lock();
        let mut list = Vec::clone(&self.handlers.read());
        let before = list.len();
        list.retain(|(existing, _)| *existing != id);
        if list.len() == before {
            return Err(Error::NotFound(id.to_string()));
        }
        *self.handlers.write() = Arc::new(list);
        debug!("removed {id}");
        Ok(())
    }

    /// Remove every handler.
    pub fn clear_handlers(&self) {
        let _guard = self.writer.lock();
        *self.handlers.write() = Arc::new(Vec::new());
    }

    /// Number of registered handlers.
    pub fn handler_count(&self) -> usize {
        self.handlers.read().len()
    }

    /// Process one captured event.
    ///
    /// Updates the pressed state, then runs the handlers in registration
    /// order until one suppresses the event. A panicking handler is logged
    /// and skipped; the remaining handlers still run.
    pub fn dispatch(&self, event: &Event) -> Propagation {
        self.pressed.update(event);

        if self.synthetic.load(Ordering::SeqCst) > 0 {
            trace!("synthetic {event:?}");
            return Propagation::Pass;
        }
        trace!("dispatch {event:?}");

        let handlers = Arc::clone(&self.handlers.read());
        for (id, handler) in handlers.iter() {
            match catch_unwind(AssertUnwindSafe(|| handler.handle_event(event))) {
                Ok(Propagation::Suppress) => {
                    trace!("{id} suppressed {event:?}");
                    return Propagation::Suppress;
                }
                Ok(Propagation::Pass) => {}
                Err(panic) => {
                    error!("{id} panicked on {event:?}: {}", panic_message(&*panic));
                }
            }
        }
        Propagation::Pass
    }

    /// Mark the current span as self-injected input.
    ///
    /// While the guard lives, dispatched events still update the pressed
    /// state but are not shown to handlers.
    pub(crate) fn synthetic(&self) -> SyntheticGuard<'_> {
        self.synthetic.fetch_add(1, Ordering::SeqCst);
        SyntheticGuard { dispatcher: self }
    }
}

/// Ends a synthetic span on drop.
pub(crate) struct SyntheticGuard<'a> {
    dispatcher: &'a Dispatcher,
}

impl Drop for SyntheticGuard<'_> {
    fn drop(&mut self) {
        self.dispatcher.synthetic.fetch_sub(1, Ordering::SeqCst);
    }
}

pub(crate) fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

/// Capture thread running the backend's event pump.
pub struct Hook {
    backend: Arc<dyn Backend>,
    dispatcher: Arc<Dispatcher>,
    running: Arc<AtomicBool>,
    thread_handle: Mutex<Option<JoinHandle<()>>>,
    thread_name: String,
}

impl Hook {
    /// Create a stopped hook feeding `dispatcher`.
    pub fn new(
        backend: Arc<dyn Backend>,
        dispatcher: Arc<Dispatcher>,
        thread_name: impl Into<String>,
    ) -> Self {
        Self {
            backend,
            dispatcher,
            running: Arc::new(AtomicBool::new(false)),
            thread_handle: Mutex::new(None),
            thread_name: thread_name.into(),
        }
    }

    /// Start the capture thread unless it is already running.
    pub fn start_if_necessary(&self) -> Result<()> {
        if self.running.swap(true, Ordering::SeqCst) {
            return Ok(());
        }

        // Reset state before starting
        self.dispatcher.pressed().clear();

        let backend = Arc::clone(&self.backend);
        let dispatcher = Arc::clone(&self.dispatcher);
        let running = Arc::clone(&self.running);
        let spawned = thread::Builder::new()
            .name(self.thread_name.clone())
            .spawn(move || {
                debug!("capture thread started");
                let dispatch = move |event: &Event| dispatcher.dispatch(event);
                if let Err(e) = backend.listen(&dispatch) {
                    error!("event pump failed: {e}");
                }
                running.store(false, Ordering::SeqCst);
                debug!("capture thread finished");
            });

        match spawned {
            Ok(handle) => {
                *self.thread_handle.lock() = Some(handle);
                Ok(())
            }
            Err(e) => {
                self.running.store(false, Ordering::SeqCst);
                Err(Error::HookStartFailed(e.to_string()))
            }
        }
    }

    /// Stop the event pump and join the capture thread.
    pub fn stop(&self) -> Result<()> {
        if !self.running.swap(false, Ordering::SeqCst) {
            return Err(Error::NotRunning);
        }

        self.backend.stop()?;

        if let Some(handle) = self.thread_handle.lock().take() {
            handle
                .join()
                .map_err(|_| Error::ThreadError("failed to join capture thread".into()))?;
        }

        Ok(())
    }

    /// Check if the capture thread is running.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }
}

impl Drop for Hook {
    fn drop(&mut self) {
        if self.is_running() {
            let _ = self.stop();
        }
    }
}
