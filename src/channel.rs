//! Channel-based event receiving.
//!
//! These functions register a handler that forwards captured events into a
//! channel, so events can be consumed on any thread instead of inside a
//! callback on the capture thread. The handler is removed when the returned
//! [`ChannelHandle`] is stopped or dropped.
//!
//! # Example (Sync)
//!
//! ```no_run
//! use keyhook::channel::listen_channel;
//! use std::time::Duration;
//!
//! # fn demo(keyboard: &keyhook::Keyboard) -> keyhook::Result<()> {
//! let (handle, rx) = listen_channel(keyboard, 100)?;
//!
//! while let Ok(event) = rx.recv_timeout(Duration::from_secs(10)) {
//!     println!("{event:?}");
//! }
//!
//! handle.stop()?;
//! # Ok(())
//! # }
//! ```
//!
//! # Example (Async with Tokio)
//!
//! ```ignore
//! use keyhook::channel::listen_async_channel;
//!
//! async fn run(keyboard: &keyhook::Keyboard) {
//!     let (_handle, mut rx) = listen_async_channel(keyboard, 100).unwrap();
//!     while let Some(event) = rx.recv().await {
//!         println!("{event:?}");
//!     }
//! }
//! ```

use crate::Keyboard;
use crate::error::Result;
use crate::event::Event;
use crate::hook::{Dispatcher, EventHandler, GrabHandler, HandlerId, Observer, Propagation};
use std::sync::mpsc::{self, Receiver, Sender, SyncSender};
use std::sync::{Arc, Weak};

/// Registration of a channel-feeding handler.
///
/// The handler is unregistered when the handle is dropped.
pub struct ChannelHandle {
    dispatcher: Weak<Dispatcher>,
    id: Option<HandlerId>,
}

impl ChannelHandle {
    fn new(keyboard: &Keyboard, id: HandlerId) -> Self {
        Self {
            dispatcher: Arc::downgrade(keyboard.dispatcher()),
            id: Some(id),
        }
    }

    /// The registered handler.
    pub fn id(&self) -> Option<HandlerId> {
        self.id
    }

    /// Stop forwarding events.
    pub fn stop(mut self) -> Result<()> {
        self.stop_inner()
    }

    /// Check if events are still being forwarded.
    pub fn is_active(&self) -> bool {
        self.id.is_some() && self.dispatcher.strong_count() > 0
    }

    fn stop_inner(&mut self) -> Result<()> {
        let Some(id) = self.id.take() else {
            return Ok(());
        };
        match self.dispatcher.upgrade() {
            Some(dispatcher) => dispatcher.remove_handler(id),
            // Keyboard already gone, and its handlers with it.
            None => Ok(()),
        }
    }
}

impl Drop for ChannelHandle {
    fn drop(&mut self) {
        let _ = self.stop_inner();
    }
}

/// Handler that sends events to a bounded sync channel.
struct ChannelHandler {
    sender: SyncSender<Event>,
}

impl EventHandler for ChannelHandler {
    fn handle_event(&self, event: &Event) {
        // Never block the capture thread: a full channel drops the event.
        let _ = self.sender.try_send(event.clone());
    }
}

/// Handler that sends events to an unbounded sync channel.
struct UnboundedChannelHandler {
    sender: Sender<Event>,
}

impl EventHandler for UnboundedChannelHandler {
    fn handle_event(&self, event: &Event) {
        let _ = self.sender.send(event.clone());
    }
}

/// Forward events to a bounded channel.
///
/// Events arriving while `capacity` events are waiting are dropped.
pub fn listen_channel(
    keyboard: &Keyboard,
    capacity: usize,
) -> Result<(ChannelHandle, Receiver<Event>)> {
    let (sender, receiver) = mpsc::sync_channel(capacity);
    let id = keyboard.register(Arc::new(Observer(ChannelHandler { sender })))?;
    Ok((ChannelHandle::new(keyboard, id), receiver))
}

/// Forward events to an unbounded channel.
///
/// No event is dropped; a slow consumer makes the queue grow.
pub fn listen_unbounded_channel(keyboard: &Keyboard) -> Result<(ChannelHandle, Receiver<Event>)> {
    let (sender, receiver) = mpsc::channel();
    let id = keyboard.register(Arc::new(Observer(UnboundedChannelHandler { sender })))?;
    Ok((ChannelHandle::new(keyboard, id), receiver))
}

/// Handler for grab mode with a filter function and channel.
struct GrabChannelHandler<F>
where
    F: Fn(&Event) -> bool + Send + Sync,
{
    sender: SyncSender<Event>,
    filter: F,
}

impl<F> GrabHandler for GrabChannelHandler<F>
where
    F: Fn(&Event) -> bool + Send + Sync,
{
    fn handle_event(&self, event: &Event) -> Propagation {
        // Send event to channel regardless of filter result
        let _ = self.sender.try_send(event.clone());
        Propagation::from(!(self.filter)(event))
    }
}

/// Forward events to a bounded channel, suppressing those `filter` rejects.
///
/// `filter` runs synchronously on the capture thread and returns `true` to
/// let the event through. Every event is sent to the channel, suppressed or
/// not.
///
/// ```no_run
/// use keyhook::channel::grab_channel;
///
/// # fn demo(keyboard: &keyhook::Keyboard) -> keyhook::Result<()> {
/// // Block F1, pass everything else through.
/// let (_handle, rx) = grab_channel(keyboard, 100, |event| !event.matches("f1"))?;
/// for event in rx.iter() {
///     println!("{event:?}");
/// }
/// # Ok(())
/// # }
/// ```
pub fn grab_channel<F>(
    keyboard: &Keyboard,
    capacity: usize,
    filter: F,
) -> Result<(ChannelHandle, Receiver<Event>)>
where
    F: Fn(&Event) -> bool + Send + Sync + 'static,
{
    let (sender, receiver) = mpsc::sync_channel(capacity);
    let id = keyboard.register(Arc::new(GrabChannelHandler { sender, filter }))?;
    Ok((ChannelHandle::new(keyboard, id), receiver))
}

#[cfg(feature = "tokio")]
pub use tokio_channel::*;

#[cfg(feature = "tokio")]
mod tokio_channel {
    use super::*;
    use tokio::sync::mpsc as tokio_mpsc;

    /// Handler that sends events to a tokio async channel.
    struct TokioChannelHandler {
        sender: tokio_mpsc::Sender<Event>,
    }

    impl EventHandler for TokioChannelHandler {
        fn handle_event(&self, event: &Event) {
            let _ = self.sender.try_send(event.clone());
        }
    }

    /// Forward events to a bounded tokio channel.
    pub fn listen_async_channel(
        keyboard: &Keyboard,
        capacity: usize,
    ) -> Result<(ChannelHandle, tokio_mpsc::Receiver<Event>)> {
        let (sender, receiver) = tokio_mpsc::channel(capacity);
        let id = keyboard.register(Arc::new(Observer(TokioChannelHandler { sender })))?;
        Ok((ChannelHandle::new(keyboard, id), receiver))
    }

    /// Handler for grab mode with tokio channel.
    struct TokioGrabChannelHandler<F>
    where
        F: Fn(&Event) -> bool + Send + Sync,
    {
        sender: tokio_mpsc::Sender<Event>,
        filter: F,
    }

    impl<F> GrabHandler for TokioGrabChannelHandler<F>
    where
        F: Fn(&Event) -> bool + Send + Sync,
    {
        fn handle_event(&self, event: &Event) -> Propagation {
            let _ = self.sender.try_send(event.clone());
            Propagation::from(!(self.filter)(event))
        }
    }

    /// Forward events to a tokio channel, suppressing those `filter` rejects.
    pub fn grab_async_channel<F>(
        keyboard: &Keyboard,
        capacity: usize,
        filter: F,
    ) -> Result<(ChannelHandle, tokio_mpsc::Receiver<Event>)>
    where
        F: Fn(&Event) -> bool + Send + Sync + 'static,
    {
        let (sender, receiver) = tokio_mpsc::channel(capacity);
        let id = keyboard.register(Arc::new(TokioGrabChannelHandler { sender, filter }))?;
        Ok((ChannelHandle::new(keyboard, id), receiver))
    }

    #[cfg(test)]
    mod tests {
        use super::*;
        use crate::Config;
        use crate::event::Direction;
        use crate::testing::{FakeBackend, key};

        #[tokio::test]
        async fn test_async_channel_receives_events() {
            let keyboard = Keyboard::new(Arc::new(FakeBackend::new()), Config::default()).unwrap();
            let (_handle, mut rx) = listen_async_channel(&keyboard, 8).unwrap();

            keyboard.dispatch(&key(Direction::Down, "a"));
            let event = rx.recv().await.unwrap();
            assert!(event.matches("a"));
        }
    }
}
