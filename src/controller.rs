use std::time::Duration;

use crate::command::Command;
use crate::types::UserControlCode;

/// Severity of a line handed to [HostController::add_log]
#[derive(Debug, Eq, PartialEq, Clone, Copy, PartialOrd, Ord, Hash)]
pub enum LogLevel {
    Error,
    Warning,
    Notice,
    /// bus traffic in wire notation
    Traffic,
    Debug,
}

/// A remote control key, with how long it was held.
#[derive(Debug, Eq, PartialEq, Clone, Copy)]
pub struct Keypress {
    pub keycode: UserControlCode,
    pub duration: Duration,
}

/// One [HostController] notification as a value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HostEvent {
    Log(LogLevel, String),
    /// key released
    Key,
    Keypress(Keypress),
    Command(Command),
    CurrentButton(UserControlCode),
}

/**
 * The host application.
 *
 * Receives logs, key events and every command addressed to us.
 * All calls are notifications, the processor does not depend on any result.
 * They are made from the protocol thread, so keep them short.
 */
pub trait HostController: Send + Sync {
    fn add_log(&self, level: LogLevel, message: &str);
    /// The key that is currently held was released.
    fn add_key(&self);
    fn add_keypress(&self, key: Keypress);
    /// A command for us or for everyone was received.
    fn add_command(&self, command: &Command);
    /// A key is being held down.
    fn set_current_button(&self, code: UserControlCode);
    /// Called once per main loop iteration.
    fn check_keypress_timeout(&self);
}

/// Ignores everything. Logging still goes to `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoController;

impl HostController for NoController {
    fn add_log(&self, _level: LogLevel, _message: &str) {}
    fn add_key(&self) {}
    fn add_keypress(&self, _key: Keypress) {}
    fn add_command(&self, _command: &Command) {}
    fn set_current_button(&self, _code: UserControlCode) {}
    fn check_keypress_timeout(&self) {}
}
