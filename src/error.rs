use crate::adapter::{MessageCode, MessageState};
use crate::types::{DeviceType, LogicalAddress};

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("connection is closed")]
    NotOpen,
    #[error("adapter i/o: {0}")]
    Io(#[from] std::io::Error),
    #[error("adapter did not accept the message")]
    WriteRejected,
    #[error("command was not sent ({0:?})")]
    NotSent(MessageState),
    #[error("did not receive ack")]
    NoAck,
    #[error("adapter reported {0:?} while waiting for ack")]
    AckError(MessageCode),
    #[error("processor is not running")]
    NotRunning,
    #[error("processor was already started")]
    AlreadyStarted,
    #[error("could not create a processor thread")]
    StartFailed,
    #[error("could not detect our logical addresses")]
    AddressAllocation,
    #[error("no free physical address on hdmi port {0}")]
    PhysicalAddress(u8),
    #[error("invalid hdmi port {0}")]
    InvalidHdmiPort(u8),
    #[error("no device of type {0:?}")]
    NoSuchDevice(DeviceType),
    #[error("{} ({:X}) is not the active source", .0.name(), u8::from(*.0))]
    NotActiveSource(LogicalAddress),
    #[error("{} ({:X}) does not support {feature}", .address.name(), u8::from(*.address))]
    Unsupported {
        address: LogicalAddress,
        feature: &'static str,
    },
}
