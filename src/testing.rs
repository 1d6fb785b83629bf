//! Scripted adapter and host for unit tests.
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;

use crate::adapter::{
    decode, AdapterMessage, AdapterTransport, MessageCode, MessageState, OutboundMessage,
    SendConfirmation,
};
use crate::command::Command;
use crate::controller::{HostController, HostEvent, Keypress, LogLevel};
use crate::error::{Error, Result};
use crate::types::{LogicalAddress, LogicalAddressMask, UserControlCode};

#[derive(Default)]
struct MockState {
    closed: bool,
    /// leave the transmit result to the test
    manual: bool,
    /// peers that acknowledge
    present: LogicalAddressMask,
    inbound: VecDeque<AdapterMessage>,
    written: Vec<OutboundMessage>,
}

/// Acks commands to present peers and broadcasts, fails everything else.
#[derive(Default, Clone)]
pub struct MockTransport(Arc<Mutex<MockState>>);

impl MockTransport {
    pub fn new(present: &[LogicalAddress]) -> Self {
        let mock = Self::default();
        for address in present {
            mock.0.lock().present |= LogicalAddressMask::of(*address);
        }
        mock
    }
    /// Stop answering transmits. Replies have to be queued with [Self::push_inbound].
    pub fn manual_acks(&self) {
        self.0.lock().manual = true;
    }
    pub fn close(&self) {
        self.0.lock().closed = true;
    }
    pub fn push_inbound(&self, msg: AdapterMessage) {
        self.0.lock().inbound.push_back(msg);
    }
    /// Queue `command` the way the adapter would deliver it.
    pub fn push_frame(&self, command: &Command) {
        for msg in frame_messages(command) {
            self.push_inbound(msg);
        }
    }
    /// Every command written so far, oldest first.
    pub fn sent(&self) -> Vec<Command> {
        self.0
            .lock()
            .written
            .iter()
            .filter_map(|m| m.command().cloned())
            .collect()
    }
    /// Every ack mask written so far, oldest first.
    pub fn ack_masks(&self) -> Vec<u16> {
        self.0
            .lock()
            .written
            .iter()
            .filter(|m| m.command().is_none())
            .filter_map(|m| {
                let mut bytes = m.as_bytes().to_vec();
                let msg = decode(&mut bytes).pop()?;
                (msg.code() == MessageCode::SetAckMask)
                    .then(|| u16::from_be_bytes([msg.data(1), msg.data(2)]))
            })
            .collect()
    }
    pub fn clear_sent(&self) {
        self.0.lock().written.clear();
    }
}

impl AdapterTransport for MockTransport {
    fn is_open(&self) -> bool {
        !self.0.lock().closed
    }
    fn write(&self, message: &OutboundMessage) -> Result<SendConfirmation> {
        let mut state = self.0.lock();
        if state.closed {
            return Err(Error::NotOpen);
        }
        state.written.push(message.clone());
        if let Some(cmd) = message.command() {
            if !state.manual && !message.transmit_timeout.is_zero() {
                if cmd.is_broadcast() || state.present.has(cmd.destination) {
                    for _ in 0..message.expected_accepts() {
                        state.inbound.push_back(code(MessageCode::CommandAccepted));
                    }
                    state.inbound.push_back(code(MessageCode::TransmitSucceeded));
                } else {
                    state.inbound.push_back(code(MessageCode::TransmitFailedAck));
                }
            }
        }
        Ok(SendConfirmation::done(MessageState::Sent))
    }
    fn read(&self, timeout: Duration) -> Result<Option<AdapterMessage>> {
        if let Some(msg) = self.0.lock().inbound.pop_front() {
            return Ok(Some(msg));
        }
        std::thread::sleep(timeout.min(Duration::from_millis(10)));
        Ok(None)
    }
}

pub fn code(code: MessageCode) -> AdapterMessage {
    AdapterMessage::with_code(code, false, false, &[])
}

/// frame-start with the header, then one frame-data per byte
pub fn frame_messages(command: &Command) -> Vec<AdapterMessage> {
    let mut bytes: Vec<u8> = command.raw_opcode().into_iter().collect();
    bytes.extend_from_slice(command.parameters());
    let mut out = vec![AdapterMessage::with_code(
        MessageCode::FrameStart,
        bytes.is_empty(),
        true,
        &[command.header()],
    )];
    for (i, b) in bytes.iter().enumerate() {
        out.push(AdapterMessage::with_code(
            MessageCode::FrameData,
            i + 1 == bytes.len(),
            true,
            &[*b],
        ));
    }
    out
}

/// Keeps every notification.
#[derive(Default, Clone)]
pub struct RecordingController(Arc<Mutex<Vec<HostEvent>>>);

impl RecordingController {
    pub fn events(&self) -> Vec<HostEvent> {
        self.0.lock().clone()
    }
    pub fn commands(&self) -> Vec<Command> {
        self.0
            .lock()
            .iter()
            .filter_map(|e| match e {
                HostEvent::Command(cmd) => Some(cmd.clone()),
                _ => None,
            })
            .collect()
    }
}

impl HostController for RecordingController {
    fn add_log(&self, level: LogLevel, message: &str) {
        self.0.lock().push(HostEvent::Log(level, message.to_string()));
    }
    fn add_key(&self) {
        self.0.lock().push(HostEvent::Key);
    }
    fn add_keypress(&self, key: Keypress) {
        self.0.lock().push(HostEvent::Keypress(key));
    }
    fn add_command(&self, command: &Command) {
        self.0.lock().push(HostEvent::Command(command.clone()));
    }
    fn set_current_button(&self, code: UserControlCode) {
        self.0.lock().push(HostEvent::CurrentButton(code));
    }
    fn check_keypress_timeout(&self) {}
}
