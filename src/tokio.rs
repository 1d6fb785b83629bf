use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};

use crate::command::Command;
use crate::controller::{HostController, HostEvent, Keypress, LogLevel};
use crate::types::UserControlCode;

/**
 * Hands every host notification to async code.
 *
 * ```no_run
 * # use cec_control::{tokio::ChannelController, Config, HostEvent, Processor, SerialAdapter};
 * # async fn run() -> cec_control::Result<()> {
 * let (controller, mut events) = ChannelController::new();
 * let cec = Processor::new(SerialAdapter::open("/dev/ttyACM0")?, controller, Config::default())?;
 * cec.start()?;
 * while let Some(event) = events.recv().await {
 *     if let HostEvent::Command(cmd) = event {
 *         println!("{cmd:?}");
 *     }
 * }
 * # Ok(())
 * # }
 * ```
 */
#[derive(Debug, Clone)]
pub struct ChannelController {
    events: UnboundedSender<HostEvent>,
    /// lowest level that is still forwarded
    log_level: LogLevel,
}

impl ChannelController {
    pub fn new() -> (Self, UnboundedReceiver<HostEvent>) {
        Self::with_log_level(LogLevel::Notice)
    }
    /// Only forward log lines of `level` or more severe.
    pub fn with_log_level(level: LogLevel) -> (Self, UnboundedReceiver<HostEvent>) {
        let (events, rx) = unbounded_channel();
        (
            Self {
                events,
                log_level: level,
            },
            rx,
        )
    }
    fn send(&self, event: HostEvent) {
        // nobody listening anymore
        let _ = self.events.send(event);
    }
}

impl HostController for ChannelController {
    fn add_log(&self, level: LogLevel, message: &str) {
        if level <= self.log_level {
            self.send(HostEvent::Log(level, message.to_string()));
        }
    }
    fn add_key(&self) {
        self.send(HostEvent::Key);
    }
    fn add_keypress(&self, key: Keypress) {
        self.send(HostEvent::Keypress(key));
    }
    fn add_command(&self, command: &Command) {
        self.send(HostEvent::Command(command.clone()));
    }
    fn set_current_button(&self, code: UserControlCode) {
        self.send(HostEvent::CurrentButton(code));
    }
    fn check_keypress_timeout(&self) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::LogicalAddress;

    #[test]
    fn forwards_events_above_level() {
        let (controller, mut rx) = ChannelController::with_log_level(LogLevel::Warning);
        controller.add_log(LogLevel::Debug, "dropped");
        controller.add_log(LogLevel::Error, "kept");
        controller.add_command(&Command::poll(LogicalAddress::Tv, LogicalAddress::Playback1));
        drop(controller);
        assert_eq!(
            rx.try_recv().ok(),
            Some(HostEvent::Log(LogLevel::Error, "kept".to_string()))
        );
        assert!(matches!(rx.try_recv(), Ok(HostEvent::Command(cmd)) if cmd.is_poll()));
        assert!(rx.try_recv().is_err());
    }
}
