#![cfg_attr(docsrs, feature(doc_cfg))]
/*!
 * Control an HDMI-CEC bus through a USB-CEC adapter in pure rust.
 *
 * Create a [Processor] on top of an [AdapterTransport] (usually a [SerialAdapter])
 * and [start](Processor::start) it. It claims logical and physical addresses,
 * answers the requests other devices send to us and keeps a view of the bus.
 * Everything addressed to us is handed to your [HostController].
 *
 * ```no_run
 * # use cec_control::{Config, DeviceType, LogicalAddress, NoController, Processor, SerialAdapter};
 * # fn main() -> cec_control::Result<()> {
 * let config = Config {
 *     device_name: "Kodi".into(),
 *     device_types: vec![DeviceType::Playback],
 *     ..Config::default()
 * };
 * let cec = Processor::new(SerialAdapter::open("/dev/ttyACM0")?, NoController, config)?;
 * cec.start()?;
 * cec.set_active_source(None)?;
 * println!("volume {:x}", cec.volume_up()?);
 * println!("TV is {:?}", cec.device_power_status(LogicalAddress::Tv));
 * # Ok(())
 * # }
 * ```
 */
pub mod adapter;
mod command;
mod config;
mod controller;
mod device;
mod error;
mod frame;
mod handler;
mod processor;
mod serial;
mod types;

#[cfg(test)]
mod testing;

#[cfg(feature = "tokio")]
#[cfg_attr(docsrs, doc(cfg(feature = "tokio")))]
pub mod tokio;

pub use adapter::{
    AdapterMessage, AdapterTransport, MessageCode, MessageState, OutboundMessage,
    SendConfirmation, SEND_CONFIRMATION_TIMEOUT,
};
pub use command::{Command, DEFAULT_TRANSMIT_TIMEOUT, MAX_PARAMETERS};
pub use config::{Config, MAX_DEVICE_TYPES};
pub use controller::{HostController, HostEvent, Keypress, LogLevel, NoController};
pub use device::{
    AudioState, BusDevice, DeckState, DeviceRole, Registry, AUDIO_MUTE, AUDIO_STATUS_UNKNOWN,
};
pub use error::{Error, Result};
pub use frame::FrameAssembler;
pub use handler::CommandHandler;
pub use processor::{Lifecycle, Link, Processor};
pub use serial::SerialAdapter;
pub use types::{
    AbortReason, DeckControlMode, DeckInfo, DeviceStatus, DeviceType, LogicalAddress,
    LogicalAddressMask, LogicalAddresses, MenuLanguage, MenuRequestType, MenuState, Opcode,
    OsdName, OsdStr, PhysicalAddress, PowerStatus, SystemAudioStatus, UserControlCode, VendorId,
    Version, PHYSICAL_ADDRESS_UNKNOWN,
};
