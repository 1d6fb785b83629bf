use crate::adapter::{AdapterMessage, MessageCode};
use crate::command::Command;
use crate::types::LogicalAddress;

/// Builds [Command]s from frame-start and frame-data adapter messages.
#[derive(Debug, Clone)]
pub struct FrameAssembler {
    current: Command,
}

impl Default for FrameAssembler {
    fn default() -> Self {
        Self {
            current: Command::poll(LogicalAddress::Broadcast, LogicalAddress::Broadcast),
        }
    }
}

impl FrameAssembler {
    pub fn new() -> Self {
        Self::default()
    }
    /// Feed one adapter message. Returns the command once its last byte arrived.
    ///
    /// Messages that are not frame related or too short are ignored.
    pub fn push(&mut self, msg: &AdapterMessage) -> Option<Command> {
        match msg.code() {
            MessageCode::FrameStart => {
                self.current = Command::poll(LogicalAddress::Broadcast, LogicalAddress::Broadcast);
                if msg.len() < 2 {
                    return None;
                }
                self.current.initiator = msg.initiator();
                self.current.destination = msg.destination();
                self.current.ack = msg.ack();
                self.current.eom = msg.eom();
                // a header with eom set is a poll
                self.current.eom.then(|| self.current.clone())
            }
            MessageCode::FrameData => {
                if msg.len() < 2 {
                    return None;
                }
                self.current.push(msg.data(1));
                self.current.eom = msg.eom();
                self.current.eom.then(|| self.current.clone())
            }
            _ => None,
        }
    }
}
