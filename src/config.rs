//! Engine configuration.

#[cfg(feature = "recorder")]
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Settings fixed when a [`Keyboard`](crate::Keyboard) is created.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "recorder", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "recorder", serde(default))]
pub struct Config {
    /// Delay before a hotkey or word callback is started.
    pub callback_delay: Duration,
    /// Default maximum gap between hotkey steps; `None` never expires.
    pub hotkey_timeout: Option<Duration>,
    /// Default maximum gap between typed characters of a word.
    pub word_timeout: Option<Duration>,
    /// Keys that complete a word when none are given at registration.
    pub word_triggers: Vec<String>,
    /// Name of the thread running the platform event pump.
    pub capture_thread_name: String,
    /// Name of the threads running user callbacks.
    pub worker_thread_name: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            callback_delay: Duration::from_millis(1),
            hotkey_timeout: Some(Duration::from_secs(1)),
            word_timeout: Some(Duration::from_secs(2)),
            word_triggers: vec!["space".to_string()],
            capture_thread_name: "keyhook-capture".to_string(),
            worker_thread_name: "keyhook-callbacks".to_string(),
        }
    }
}

/// Zero means "never expires".
fn non_zero(timeout: Option<Duration>) -> Option<Duration> {
    timeout.filter(|t| !t.is_zero())
}

impl Config {
    /// Set the delay before a callback is started.
    pub fn with_callback_delay(mut self, delay: Duration) -> Self {
        self.callback_delay = delay;
        self
    }

    /// Set the default step timeout for hotkeys; zero means never.
    pub fn with_hotkey_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.hotkey_timeout = non_zero(timeout);
        self
    }

    /// Set the default character timeout for words; zero means never.
    pub fn with_word_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.word_timeout = non_zero(timeout);
        self
    }

    /// Set the default keys that complete a word.
    pub fn with_word_triggers<I, S>(mut self, triggers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.word_triggers = triggers.into_iter().map(Into::into).collect();
        self
    }

    /// Name the capture thread.
    pub fn with_capture_thread_name(mut self, name: impl Into<String>) -> Self {
        self.capture_thread_name = name.into();
        self
    }

    /// Name the callback threads.
    pub fn with_worker_thread_name(mut self, name: impl Into<String>) -> Self {
        self.worker_thread_name = name.into();
        self
    }

    /// Hotkey timeout after zero normalization.
    pub(crate) fn effective_hotkey_timeout(&self) -> Option<Duration> {
        non_zero(self.hotkey_timeout)
    }

    /// Word timeout after zero normalization.
    pub(crate) fn effective_word_timeout(&self) -> Option<Duration> {
        non_zero(self.word_timeout)
    }
}
