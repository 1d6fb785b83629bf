/*!
 * The USB-CEC adapter protocol as seen by the processor.
 *
 * On the wire every adapter message is `MSGSTART code [data] MSGEND` with
 * the bytes in between escaped. Outbound CEC commands become one such chunk
 * per CEC byte, preceded by a chunk that sets the ack polarity.
 */
use std::fmt;
use std::time::Duration;

use crossbeam::channel::{bounded, Receiver, RecvTimeoutError, Sender};
use num_enum::{FromPrimitive, IntoPrimitive};

use crate::command::Command;
use crate::error::Result;
use crate::types::LogicalAddress;

pub const MSGSTART: u8 = 0xff;
pub const MSGEND: u8 = 0xfe;
pub const MSGESC: u8 = 0xfd;
pub const ESCOFFSET: u8 = 3;

/// flag on the code byte: last byte of a CEC frame
pub const MSGCODE_FRAME_EOM: u8 = 0x80;
/// flag on the code byte: the frame was acked
pub const MSGCODE_FRAME_ACK: u8 = 0x40;

/// Adapter level message code. Not the same namespace as [Opcode](crate::Opcode).
#[derive(Debug, Eq, PartialEq, FromPrimitive, IntoPrimitive, Clone, Copy)]
#[repr(u8)]
pub enum MessageCode {
    #[num_enum(default)]
    Nothing = 0,
    Ping = 1,
    TimeoutError = 2,
    HighError = 3,
    LowError = 4,
    FrameStart = 5,
    FrameData = 6,
    ReceiveFailed = 7,
    CommandAccepted = 8,
    CommandRejected = 9,
    SetAckMask = 10,
    Transmit = 11,
    TransmitEom = 12,
    TransmitIdletime = 13,
    TransmitAckPolarity = 14,
    TransmitLineTimeout = 15,
    TransmitSucceeded = 16,
    TransmitFailedLine = 17,
    TransmitFailedAck = 18,
    TransmitFailedTimeoutData = 19,
    TransmitFailedTimeoutLine = 20,
    FirmwareVersion = 21,
    StartBootloader = 22,
}
impl MessageCode {
    pub fn is_error(self) -> bool {
        matches!(
            self,
            Self::TimeoutError
                | Self::HighError
                | Self::LowError
                | Self::ReceiveFailed
                | Self::CommandRejected
                | Self::TransmitLineTimeout
                | Self::TransmitFailedLine
                | Self::TransmitFailedAck
                | Self::TransmitFailedTimeoutData
                | Self::TransmitFailedTimeoutLine
        )
    }
}

/// A message received from the adapter, markers removed and unescaped.
///
/// Byte 0 is the [MessageCode] plus the eom/ack flags.
#[derive(Clone, PartialEq, Eq, Default)]
pub struct AdapterMessage(Vec<u8>);

impl AdapterMessage {
    pub fn new(payload: Vec<u8>) -> Self {
        Self(payload)
    }
    /// A message with `code`, optional flags and data.
    pub fn with_code(code: MessageCode, eom: bool, ack: bool, data: &[u8]) -> Self {
        let mut first = u8::from(code);
        if eom {
            first |= MSGCODE_FRAME_EOM;
        }
        if ack {
            first |= MSGCODE_FRAME_ACK;
        }
        let mut v = Vec::with_capacity(data.len() + 1);
        v.push(first);
        v.extend_from_slice(data);
        Self(v)
    }
    pub fn code(&self) -> MessageCode {
        match self.0.first() {
            Some(b) => MessageCode::from(b & !(MSGCODE_FRAME_EOM | MSGCODE_FRAME_ACK)),
            None => MessageCode::Nothing,
        }
    }
    #[inline]
    pub fn eom(&self) -> bool {
        self.0.first().is_some_and(|b| b & MSGCODE_FRAME_EOM != 0)
    }
    #[inline]
    pub fn ack(&self) -> bool {
        self.0.first().is_some_and(|b| b & MSGCODE_FRAME_ACK != 0)
    }
    #[inline]
    pub fn is_error(&self) -> bool {
        self.code().is_error()
    }
    /// high nibble of byte 1 on a frame start
    pub fn initiator(&self) -> LogicalAddress {
        LogicalAddress::from_nibble(self.data(1) >> 4)
    }
    /// low nibble of byte 1 on a frame start
    pub fn destination(&self) -> LogicalAddress {
        LogicalAddress::from_nibble(self.data(1))
    }
    /// byte at `pos`, 0 if the message is shorter
    #[inline]
    pub fn data(&self, pos: usize) -> u8 {
        self.0.get(pos).copied().unwrap_or_default()
    }
    #[inline]
    pub fn len(&self) -> usize {
        self.0.len()
    }
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Debug for AdapterMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self.code())?;
        if self.eom() {
            f.write_str(" eom")?;
        }
        if self.ack() {
            f.write_str(" ack")?;
        }
        for b in self.0.iter().skip(1) {
            write!(f, " {:02x}", b)?;
        }
        Ok(())
    }
}

/// Transmission state of one [OutboundMessage].
#[derive(Debug, Eq, PartialEq, Clone, Copy)]
pub enum MessageState {
    Waiting,
    Sent,
    Error,
    TimedOut,
}

/// The encoded bytes of one outbound adapter message.
#[derive(Debug, Clone, Default)]
pub struct OutboundMessage {
    bytes: Vec<u8>,
    /// number of `MSGSTART .. MSGEND` chunks
    chunks: usize,
    /// the CEC command this was encoded from
    command: Option<Command>,
    /// zero: only wait until the adapter wrote it
    pub transmit_timeout: Duration,
}

impl OutboundMessage {
    /// Encode `command` as adapter chunks.
    pub fn from_command(command: &Command) -> Self {
        let mut msg = Self {
            transmit_timeout: command.transmit_timeout,
            command: Some(command.clone()),
            ..Default::default()
        };
        // ack polarity is high for broadcasts, low otherwise
        msg.push_chunk(MessageCode::TransmitAckPolarity, command.is_broadcast() as u8);

        let params = command.parameters();
        let header_is_last = command.raw_opcode().is_none();
        msg.push_chunk(transmit_code(header_is_last), command.header());
        if let Some(opcode) = command.raw_opcode() {
            msg.push_chunk(transmit_code(params.is_empty()), opcode);
            for (i, b) in params.iter().enumerate() {
                msg.push_chunk(transmit_code(i + 1 == params.len()), *b);
            }
        }
        msg
    }
    /// Tell the adapter which logical addresses to acknowledge.
    pub fn ack_mask(mask: u16) -> Self {
        let mut msg = Self::default();
        msg.bytes.push(MSGSTART);
        msg.push_escaped(MessageCode::SetAckMask.into());
        let [hi, lo] = mask.to_be_bytes();
        msg.push_escaped(hi);
        msg.push_escaped(lo);
        msg.bytes.push(MSGEND);
        msg.chunks = 1;
        msg
    }
    fn push_chunk(&mut self, code: MessageCode, data: u8) {
        self.bytes.push(MSGSTART);
        self.push_escaped(code.into());
        self.push_escaped(data);
        self.bytes.push(MSGEND);
        self.chunks += 1;
    }
    /// Append `byte`, escaping it if it collides with a marker.
    pub fn push_escaped(&mut self, byte: u8) {
        if byte >= MSGESC {
            self.bytes.push(MSGESC);
            self.bytes.push(byte - ESCOFFSET);
        } else {
            self.bytes.push(byte);
        }
    }
    #[inline]
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }
    /// encoded length, markers and escapes included
    #[inline]
    pub fn len(&self) -> usize {
        self.bytes.len()
    }
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
    /// How many command-accepted replies the adapter sends before it reports
    /// the transmit result. Same as `len() / 4` unless bytes were escaped.
    #[inline]
    pub fn expected_accepts(&self) -> usize {
        self.chunks
    }
    pub fn command(&self) -> Option<&Command> {
        self.command.as_ref()
    }
}

fn transmit_code(last: bool) -> MessageCode {
    if last {
        MessageCode::TransmitEom
    } else {
        MessageCode::Transmit
    }
}

/// Split a byte stream into adapter messages.
///
/// Complete messages are removed from `buf` and returned. Bytes before a start
/// marker are dropped, an incomplete tail is left in `buf`.
pub fn decode(buf: &mut Vec<u8>) -> Vec<AdapterMessage> {
    let mut out = Vec::new();
    let mut consumed = 0;
    let mut current: Option<Vec<u8>> = None;
    let mut escaped = false;
    for (i, b) in buf.iter().copied().enumerate() {
        match (b, current.as_mut()) {
            (MSGSTART, _) => {
                current = Some(Vec::new());
                escaped = false;
                consumed = i;
            }
            (MSGEND, Some(payload)) => {
                out.push(AdapterMessage(std::mem::take(payload)));
                current = None;
                consumed = i + 1;
            }
            (MSGESC, Some(_)) => escaped = true,
            (b, Some(payload)) => {
                if escaped {
                    payload.push(b + ESCOFFSET);
                    escaped = false;
                } else {
                    payload.push(b);
                }
            }
            (_, None) => consumed = i + 1,
        }
    }
    buf.drain(..consumed);
    out
}

/// Upper bound on [SendConfirmation::wait] when transmitting.
///
/// Transports normally resolve the confirmation as soon as the bytes are
/// written. A transport that never does is treated as [MessageState::TimedOut].
pub const SEND_CONFIRMATION_TIMEOUT: Duration = Duration::from_secs(1);

/// Resolves once the adapter reports what happened to a written message.
pub struct SendConfirmation(Receiver<MessageState>);

impl SendConfirmation {
    /// The sender half goes to whoever writes the message out.
    pub fn channel() -> (Sender<MessageState>, Self) {
        let (tx, rx) = bounded(1);
        (tx, Self(rx))
    }
    /// Already resolved with `state`.
    pub fn done(state: MessageState) -> Self {
        let (tx, rx) = Self::channel();
        let _ = tx.send(state);
        rx
    }
    /// Block for at most `timeout`.
    pub fn wait(&self, timeout: Duration) -> MessageState {
        match self.0.recv_timeout(timeout) {
            Ok(state) => state,
            Err(RecvTimeoutError::Timeout) => MessageState::TimedOut,
            Err(RecvTimeoutError::Disconnected) => MessageState::Error,
        }
    }
}

/// Byte level link to the adapter hardware.
pub trait AdapterTransport: Send + Sync {
    fn is_open(&self) -> bool;
    /// Queue `message` for the adapter without waiting for it to go out.
    fn write(&self, message: &OutboundMessage) -> Result<SendConfirmation>;
    /// Next complete message, `None` if nothing arrived within `timeout`.
    fn read(&self, timeout: Duration) -> Result<Option<AdapterMessage>>;
}
