use std::fmt;
use std::time::Duration;

use num_enum::TryFromPrimitiveError;

use crate::types::{LogicalAddress, Opcode, PhysicalAddress};

/// A CEC frame has room for a header, an opcode and 14 parameter bytes.
pub const MAX_PARAMETERS: usize = 14;
/// How long a transmit waits for the adapter to report the ack, unless told otherwise.
pub const DEFAULT_TRANSMIT_TIMEOUT: Duration = Duration::from_millis(1000);

/// One CEC message: header, optional opcode and parameters.
///
/// A command without opcode is a poll.
#[derive(Clone, PartialEq, Eq)]
pub struct Command {
    pub initiator: LogicalAddress,
    pub destination: LogicalAddress,
    opcode: Option<u8>,
    parameters: [u8; MAX_PARAMETERS],
    len: u8,
    /// ack bit of the frame this was assembled from
    pub ack: bool,
    /// end of message bit of the last frame
    pub eom: bool,
    /// Zero means: don't wait for the adapter to report an ack.
    pub transmit_timeout: Duration,
}

impl Command {
    /// A poll message from `initiator` to `destination`
    pub fn poll(initiator: LogicalAddress, destination: LogicalAddress) -> Self {
        Self {
            initiator,
            destination,
            opcode: None,
            parameters: [0; MAX_PARAMETERS],
            len: 0,
            ack: false,
            eom: false,
            transmit_timeout: DEFAULT_TRANSMIT_TIMEOUT,
        }
    }
    /// A message with `opcode` and no parameters yet
    pub fn format(initiator: LogicalAddress, destination: LogicalAddress, opcode: Opcode) -> Self {
        let mut cmd = Self::poll(initiator, destination);
        cmd.opcode = Some(opcode.into());
        cmd
    }
    /// A message with `opcode` and `data` as parameters. Excess data is dropped.
    pub fn with_parameters(
        initiator: LogicalAddress,
        destination: LogicalAddress,
        opcode: Opcode,
        data: &[u8],
    ) -> Self {
        let mut cmd = Self::format(initiator, destination, opcode);
        for b in data {
            cmd.push_parameter(*b);
        }
        cmd
    }
    /// Append a frame byte: the first one is the opcode, the rest are parameters.
    ///
    /// Returns false if the message is full.
    pub fn push(&mut self, byte: u8) -> bool {
        if self.opcode.is_none() {
            self.opcode = Some(byte);
            true
        } else {
            self.push_parameter(byte)
        }
    }
    /// Returns false if the message is full.
    pub fn push_parameter(&mut self, byte: u8) -> bool {
        let len = self.len as usize;
        if len >= MAX_PARAMETERS {
            return false;
        }
        self.parameters[len] = byte;
        self.len += 1;
        true
    }
    /// return the opcode of the message, None for poll
    pub fn opcode(&self) -> Option<Result<Opcode, TryFromPrimitiveError<Opcode>>> {
        self.opcode.map(Opcode::try_from)
    }
    /// The opcode byte as received, even if we don't know it.
    #[inline]
    pub fn raw_opcode(&self) -> Option<u8> {
        self.opcode
    }
    #[inline]
    pub fn parameters(&self) -> &[u8] {
        &self.parameters[..self.len as usize]
    }
    #[inline]
    pub fn is_poll(&self) -> bool {
        self.opcode.is_none()
    }
    /// return true if this is a broadcast message
    #[inline]
    pub fn is_broadcast(&self) -> bool {
        self.destination == LogicalAddress::Broadcast
    }
    /// initiator in the high nibble, destination in the low one
    #[inline]
    pub fn header(&self) -> u8 {
        u8::from(self.initiator) << 4 | u8::from(self.destination)
    }
    /// Big endian physical address starting at parameter `pos`.
    pub fn physical_address_at(&self, pos: usize) -> Option<PhysicalAddress> {
        match self.parameters().get(pos..pos + 2) {
            Some([hi, lo]) => Some(u16::from_be_bytes([*hi, *lo])),
            _ => None,
        }
    }
}

/// wire notation: `4f:82:10:00`
impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02x}", self.header())?;
        if let Some(op) = self.opcode {
            write!(f, ":{:02x}", op)?;
        }
        for b in self.parameters() {
            write!(f, ":{:02x}", b)?;
        }
        Ok(())
    }
}

impl fmt::Debug for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.opcode() {
            Some(Ok(op)) => write!(
                f,
                "{:?} -> {:?}: {:?} {:x?}",
                self.initiator,
                self.destination,
                op,
                self.parameters()
            ),
            _ => write!(f, "{:?} -> {:?}: {}", self.initiator, self.destination, self),
        }
    }
}
