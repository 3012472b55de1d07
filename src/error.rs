//! Error types for the hook engine.

use thiserror::Error;

/// Result type alias for keyhook operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while registering, dispatching or synthesizing input.
#[derive(Debug, Error)]
pub enum Error {
    /// A hotkey or word registration is malformed (e.g. an empty step).
    #[error("invalid specification: {0}")]
    InvalidSpec(String),

    /// A key name could not be resolved to any physical key.
    #[error("unknown key: {0:?}")]
    UnknownToken(String),

    /// The active layout has no key producing this character.
    #[error("character {0:?} is not available on the current layout")]
    UnmappableCharacter(char),

    /// The same pattern is already registered.
    #[error("already registered: {0}")]
    DuplicateRegistration(String),

    /// The handle was never registered or was already removed.
    #[error("not found: {0}")]
    NotFound(String),

    /// Hook is already running.
    #[error("hook is already running")]
    AlreadyRunning,

    /// Hook is not running.
    #[error("hook is not running")]
    NotRunning,

    /// Failed to start the hook.
    #[error("failed to start hook: {0}")]
    HookStartFailed(String),

    /// Failed to simulate an event.
    #[error("failed to simulate event: {0}")]
    SimulateFailed(String),

    /// Platform-specific error.
    #[error("platform error: {0}")]
    Platform(String),

    /// Thread-related error.
    #[error("thread error: {0}")]
    ThreadError(String),

    /// The requested feature is not supported by the backend.
    #[error("not supported: {0}")]
    NotSupported(String),

    /// Other errors.
    #[error("{0}")]
    Other(String),
}
