/*!
 * The sixteen logical address slots and what we know about each of them.
 */
use std::time::{Duration, Instant};

use crate::command::Command;
use crate::config::Config;
use crate::controller::LogLevel;
use crate::error::{Error, Result};
use crate::processor::Link;
use crate::types::{
    AbortReason, DeckControlMode, DeckInfo, DeviceStatus, DeviceType, LogicalAddress, LogicalAddresses,
    MenuLanguage, MenuState, Opcode, OsdName, PhysicalAddress, PowerStatus, SystemAudioStatus,
    UserControlCode, VendorId, Version, PHYSICAL_ADDRESS_UNKNOWN,
};

/// minimum time between two vendor id requests to the same device
const VENDOR_POLL_INTERVAL: Duration = Duration::from_secs(5);
/// audio status before the audio system reported one
pub const AUDIO_STATUS_UNKNOWN: u8 = 0x7f;
/// mute bit of the audio status
pub const AUDIO_MUTE: u8 = 0x80;

/// State of a playback or recording deck
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeckState {
    pub control_mode: DeckControlMode,
    pub info: DeckInfo,
}
impl Default for DeckState {
    fn default() -> Self {
        Self {
            control_mode: DeckControlMode::Stop,
            info: DeckInfo::Stop,
        }
    }
}

/// State of an audio system
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AudioState {
    /// volume in the low 7 bits, [AUDIO_MUTE] on top
    pub status: u8,
    pub system_audio: SystemAudioStatus,
}
impl Default for AudioState {
    fn default() -> Self {
        Self {
            status: AUDIO_STATUS_UNKNOWN,
            system_audio: SystemAudioStatus::Off,
        }
    }
}

/// What a slot can do, with the state that only some roles have.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceRole {
    Tv,
    Playback(DeckState),
    Recording(DeckState),
    Tuner,
    AudioSystem(AudioState),
    Generic,
}

impl DeviceRole {
    pub fn for_address(address: LogicalAddress) -> Self {
        match address.device_type() {
            DeviceType::Tv => Self::Tv,
            DeviceType::Playback => Self::Playback(DeckState::default()),
            DeviceType::Recording => Self::Recording(DeckState::default()),
            DeviceType::Tuner => Self::Tuner,
            DeviceType::AudioSystem => Self::AudioSystem(AudioState::default()),
            DeviceType::Reserved => Self::Generic,
        }
    }
    pub fn device_type(&self) -> DeviceType {
        match self {
            Self::Tv => DeviceType::Tv,
            Self::Playback(_) => DeviceType::Playback,
            Self::Recording(_) => DeviceType::Recording,
            Self::Tuner => DeviceType::Tuner,
            Self::AudioSystem(_) => DeviceType::AudioSystem,
            Self::Generic => DeviceType::Reserved,
        }
    }
    /// `None` unless this is a playback or recording device
    pub fn deck(&self) -> Option<&DeckState> {
        match self {
            Self::Playback(deck) | Self::Recording(deck) => Some(deck),
            _ => None,
        }
    }
    pub fn deck_mut(&mut self) -> Option<&mut DeckState> {
        match self {
            Self::Playback(deck) | Self::Recording(deck) => Some(deck),
            _ => None,
        }
    }
    /// `None` unless this is an audio system
    pub fn audio(&self) -> Option<&AudioState> {
        match self {
            Self::AudioSystem(audio) => Some(audio),
            _ => None,
        }
    }
    pub fn audio_mut(&mut self) -> Option<&mut AudioState> {
        match self {
            Self::AudioSystem(audio) => Some(audio),
            _ => None,
        }
    }
}

/// One logical address slot: a peer on the bus or one of ours.
#[derive(Debug, Clone)]
pub struct BusDevice {
    address: LogicalAddress,
    role: DeviceRole,
    physical_address: PhysicalAddress,
    status: DeviceStatus,
    power: PowerStatus,
    cec_version: Version,
    vendor: VendorId,
    osd_name: OsdName,
    menu_language: MenuLanguage,
    menu_state: MenuState,
    active_source: bool,
    stream_path: PhysicalAddress,
    last_active: Option<Instant>,
    last_vendor_poll: Option<Instant>,
}

impl BusDevice {
    pub fn new(address: LogicalAddress) -> Self {
        let role = DeviceRole::for_address(address);
        Self {
            address,
            role,
            // only the TV has a known place in the topology
            physical_address: if role == DeviceRole::Tv {
                0
            } else {
                PHYSICAL_ADDRESS_UNKNOWN
            },
            status: DeviceStatus::Unknown,
            power: PowerStatus::Unknown,
            cec_version: Version::Unknown,
            vendor: VendorId::UNKNOWN,
            osd_name: OsdName::from(address.name()),
            menu_language: MenuLanguage::unknown(),
            menu_state: MenuState::Activated,
            active_source: false,
            stream_path: 0,
            last_active: None,
            last_vendor_poll: None,
        }
    }

    #[inline]
    pub fn address(&self) -> LogicalAddress {
        self.address
    }
    #[inline]
    pub fn role(&self) -> &DeviceRole {
        &self.role
    }
    #[inline]
    pub fn role_mut(&mut self) -> &mut DeviceRole {
        &mut self.role
    }
    #[inline]
    pub fn device_type(&self) -> DeviceType {
        self.role.device_type()
    }
    #[inline]
    pub fn physical_address(&self) -> PhysicalAddress {
        self.physical_address
    }
    #[inline]
    pub fn status(&self) -> DeviceStatus {
        self.status
    }
    #[inline]
    pub fn power_status(&self) -> PowerStatus {
        self.power
    }
    #[inline]
    pub fn cec_version(&self) -> Version {
        self.cec_version
    }
    #[inline]
    pub fn vendor_id(&self) -> VendorId {
        self.vendor
    }
    pub fn osd_name(&self) -> &OsdName {
        &self.osd_name
    }
    pub fn menu_language(&self) -> &MenuLanguage {
        &self.menu_language
    }
    #[inline]
    pub fn menu_state(&self) -> MenuState {
        self.menu_state
    }
    #[inline]
    pub fn is_active_source(&self) -> bool {
        self.active_source
    }
    #[inline]
    pub fn stream_path(&self) -> PhysicalAddress {
        self.stream_path
    }

    pub fn set_physical_address(&mut self, address: PhysicalAddress) {
        self.physical_address = address;
    }
    /// Returns true if the status changed.
    pub fn set_power_status(&mut self, power: PowerStatus) -> bool {
        let changed = self.power != power;
        self.power = power;
        changed
    }
    /// Returns true if the vendor changed.
    pub fn set_vendor_id(&mut self, vendor: VendorId) -> bool {
        let changed = self.vendor != vendor;
        self.vendor = vendor;
        changed
    }
    pub fn set_osd_name(&mut self, name: OsdName) {
        self.osd_name = name;
    }
    pub fn set_menu_language(&mut self, language: MenuLanguage) {
        self.menu_language = language;
    }
    pub fn set_menu_state(&mut self, state: MenuState) {
        self.menu_state = state;
    }
    pub fn set_cec_version(&mut self, version: Version) {
        self.cec_version = version;
    }
    pub fn set_status(&mut self, status: DeviceStatus) {
        self.status = status;
    }
    /// A routing change reported by this device.
    pub fn set_stream_path(&mut self, new: PhysicalAddress, _old: PhysicalAddress) {
        self.stream_path = new;
        if new > 0 {
            self.power = PowerStatus::On;
        }
    }
    /// A command from this device was just received.
    pub fn mark_active(&mut self, now: Instant) {
        self.last_active = Some(now);
        if self.status != DeviceStatus::HandledByThisLibrary {
            self.status = DeviceStatus::Present;
        }
    }

    fn log_transmit(&self, link: &Link, destination: LogicalAddress, what: std::fmt::Arguments<'_>) {
        link.log(
            LogLevel::Notice,
            format_args!(
                "<< {} ({:X}) -> {} ({:X}): {}",
                self.address.name(),
                u8::from(self.address),
                destination.name(),
                u8::from(destination),
                what
            ),
        );
    }

    /// Broadcast that we are the active source.
    pub fn transmit_active_source(&self, link: &Link) -> Result<()> {
        if !self.active_source {
            link.log(
                LogLevel::Debug,
                format_args!("'{}' is not the active source", self.address.name()),
            );
            return Err(Error::NotActiveSource(self.address));
        }
        self.log_transmit(
            link,
            LogicalAddress::Broadcast,
            format_args!("active source ({:04x})", self.physical_address),
        );
        link.transmit(&Command::with_parameters(
            self.address,
            LogicalAddress::Broadcast,
            Opcode::ActiveSource,
            &self.physical_address.to_be_bytes(),
        ))
    }
    pub fn transmit_menu_state(&self, link: &Link, destination: LogicalAddress) -> Result<()> {
        self.log_transmit(link, destination, format_args!("menu state {:?}", self.menu_state));
        link.transmit(&Command::with_parameters(
            self.address,
            destination,
            Opcode::MenuStatus,
            &[self.menu_state.into()],
        ))
    }
    /// Playback and recording devices only
    pub fn transmit_deck_status(&self, link: &Link, destination: LogicalAddress) -> Result<()> {
        let deck = self.role.deck().ok_or(Error::Unsupported {
            address: self.address,
            feature: "deck status",
        })?;
        self.log_transmit(link, destination, format_args!("deck status {:?}", deck.info));
        link.transmit(&Command::with_parameters(
            self.address,
            destination,
            Opcode::DeckStatus,
            &[deck.info.into()],
        ))
    }
    pub fn transmit_power_state(&self, link: &Link, destination: LogicalAddress) -> Result<()> {
        self.log_transmit(link, destination, format_args!("power state {:?}", self.power));
        link.transmit(&Command::with_parameters(
            self.address,
            destination,
            Opcode::ReportPowerStatus,
            &[self.power.into()],
        ))
    }
    pub fn transmit_osd_name(&self, link: &Link, destination: LogicalAddress) -> Result<()> {
        self.log_transmit(link, destination, format_args!("OSD name '{}'", self.osd_name));
        link.transmit(&Command::with_parameters(
            self.address,
            destination,
            Opcode::SetOsdName,
            self.osd_name.as_bytes(),
        ))
    }
    pub fn transmit_cec_version(&self, link: &Link, destination: LogicalAddress) -> Result<()> {
        self.log_transmit(link, destination, format_args!("cec version {:?}", self.cec_version));
        link.transmit(&Command::with_parameters(
            self.address,
            destination,
            Opcode::CecVersion,
            &[self.cec_version.into()],
        ))
    }
    /// Broadcast our physical address and device type.
    pub fn transmit_physical_address(&self, link: &Link) -> Result<()> {
        self.log_transmit(
            link,
            LogicalAddress::Broadcast,
            format_args!("physical address {:04x}", self.physical_address),
        );
        let [hi, lo] = self.physical_address.to_be_bytes();
        link.transmit(&Command::with_parameters(
            self.address,
            LogicalAddress::Broadcast,
            Opcode::ReportPhysicalAddr,
            &[hi, lo, self.device_type().into()],
        ))
    }
    /// Without a vendor id, the request is answered with a feature abort.
    pub fn transmit_vendor_id(&self, link: &Link, destination: LogicalAddress) -> Result<()> {
        if self.vendor.is_unknown() {
            self.log_transmit(link, destination, format_args!("vendor id feature abort"));
            link.transmit_abort(
                self.address,
                destination,
                Opcode::GiveDeviceVendorId as u8,
                AbortReason::Unrecognized,
            )?;
            return Err(Error::Unsupported {
                address: self.address,
                feature: "vendor id",
            });
        }
        self.log_transmit(link, destination, format_args!("vendor id {:06x}", self.vendor.0));
        link.transmit(&Command::with_parameters(
            self.address,
            destination,
            Opcode::DeviceVendorId,
            &self.vendor.to_bytes(),
        ))
    }
    /// Audio systems only
    pub fn transmit_audio_status(&self, link: &Link, destination: LogicalAddress) -> Result<()> {
        let audio = self.audio("audio status")?;
        self.log_transmit(link, destination, format_args!("audio status {:02x}", audio.status));
        link.transmit(&Command::with_parameters(
            self.address,
            destination,
            Opcode::ReportAudioStatus,
            &[audio.status],
        ))
    }
    /// Audio systems only
    pub fn transmit_system_audio_mode_status(
        &self,
        link: &Link,
        destination: LogicalAddress,
    ) -> Result<()> {
        let audio = self.audio("system audio mode")?;
        self.log_transmit(
            link,
            destination,
            format_args!("system audio mode status {:?}", audio.system_audio),
        );
        link.transmit(&Command::with_parameters(
            self.address,
            destination,
            Opcode::SystemAudioModeStatus,
            &[audio.system_audio.into()],
        ))
    }
    /// Audio systems only
    pub fn transmit_set_system_audio_mode(
        &self,
        link: &Link,
        destination: LogicalAddress,
    ) -> Result<()> {
        let audio = self.audio("system audio mode")?;
        self.log_transmit(
            link,
            destination,
            format_args!("set system audio mode {:?}", audio.system_audio),
        );
        link.transmit(&Command::with_parameters(
            self.address,
            destination,
            Opcode::SetSystemAudioMode,
            &[audio.system_audio.into()],
        ))
    }
    /// Tell the TV we are no longer showing anything.
    pub fn transmit_inactive_view(&self, link: &Link) -> Result<()> {
        self.log_transmit(
            link,
            LogicalAddress::Tv,
            format_args!("inactive view ({:04x})", self.physical_address),
        );
        link.transmit(&Command::with_parameters(
            self.address,
            LogicalAddress::Tv,
            Opcode::InactiveSource,
            &self.physical_address.to_be_bytes(),
        ))
    }
    /// Ok if `destination` acknowledged the poll.
    pub fn transmit_poll(&self, link: &Link, destination: LogicalAddress) -> Result<()> {
        self.log_transmit(link, destination, format_args!("POLL"));
        link.transmit(&Command::poll(self.address, destination))
    }
    /// A key press followed by its release, sent to `destination`.
    pub fn transmit_key(
        &self,
        link: &Link,
        destination: LogicalAddress,
        key: UserControlCode,
    ) -> Result<()> {
        self.log_transmit(link, destination, format_args!("key {:?}", key));
        link.transmit(&Command::with_parameters(
            self.address,
            destination,
            Opcode::UserControlPressed,
            &[key.into()],
        ))?;
        link.transmit(&Command::format(
            self.address,
            destination,
            Opcode::UserControlReleased,
        ))
    }

    fn audio(&self, feature: &'static str) -> Result<&AudioState> {
        self.role.audio().ok_or(Error::Unsupported {
            address: self.address,
            feature,
        })
    }

    /// Ask a quiet peer for its vendor id, at most every few seconds.
    ///
    /// Only devices that sent something and did not report a vendor yet are asked.
    pub fn poll_vendor_id(&mut self, link: &Link, from: LogicalAddress, now: Instant) {
        if self.address == LogicalAddress::Broadcast
            || self.last_active.is_none()
            || !self.vendor.is_unknown()
            || link.is_monitoring()
        {
            return;
        }
        if self
            .last_vendor_poll
            .is_some_and(|last| now.duration_since(last) < VENDOR_POLL_INTERVAL)
        {
            return;
        }
        self.last_vendor_poll = Some(now);
        link.log(
            LogLevel::Notice,
            format_args!(
                "<< requesting vendor ID of '{}' ({:X})",
                self.address.name(),
                u8::from(self.address)
            ),
        );
        if let Err(e) = link.transmit(&Command::format(from, self.address, Opcode::GiveDeviceVendorId)) {
            link.log(LogLevel::Debug, format_args!("vendor id request failed: {e}"));
        }
    }
}

/**
 * All sixteen slots, the addresses we claimed and our configuration.
 *
 * Owned by the processor and only lent out for the duration of one call.
 */
#[derive(Debug)]
pub struct Registry {
    devices: [BusDevice; 16],
    ours: LogicalAddresses,
    config: Config,
}

impl Registry {
    pub fn new(config: Config) -> Self {
        Self {
            devices: std::array::from_fn(|i| BusDevice::new(LogicalAddress::ALL[i])),
            ours: LogicalAddresses::new(),
            config,
        }
    }
    #[inline]
    pub fn device(&self, address: LogicalAddress) -> &BusDevice {
        &self.devices[address.index()]
    }
    #[inline]
    pub fn device_mut(&mut self, address: LogicalAddress) -> &mut BusDevice {
        &mut self.devices[address.index()]
    }
    pub fn devices(&self) -> impl Iterator<Item = &BusDevice> {
        self.devices.iter()
    }
    #[inline]
    pub fn ours(&self) -> &LogicalAddresses {
        &self.ours
    }
    #[inline]
    pub fn is_ours(&self, address: LogicalAddress) -> bool {
        self.ours.contains(address)
    }
    pub fn config(&self) -> &Config {
        &self.config
    }
    pub fn config_mut(&mut self) -> &mut Config {
        &mut self.config
    }
    pub fn primary(&self) -> Option<&BusDevice> {
        self.ours.primary().map(|a| self.device(a))
    }

    /// The device at `address`, preferring our primary device.
    ///
    /// Never matches [PHYSICAL_ADDRESS_UNKNOWN].
    pub fn by_physical(&self, address: PhysicalAddress) -> Option<LogicalAddress> {
        if address == PHYSICAL_ADDRESS_UNKNOWN {
            return None;
        }
        if let Some(primary) = self.primary() {
            if primary.physical_address == address {
                return Some(primary.address);
            }
        }
        self.devices
            .iter()
            .find(|d| d.physical_address == address)
            .map(|d| d.address)
    }
    /// First slot of that type
    pub fn by_type(&self, device_type: DeviceType) -> Option<LogicalAddress> {
        self.devices
            .iter()
            .find(|d| d.device_type() == device_type)
            .map(|d| d.address)
    }
    /// First of our own slots of that type
    pub fn own_by_type(&self, device_type: DeviceType) -> Option<LogicalAddress> {
        self.ours
            .iter()
            .find(|a| self.device(*a).device_type() == device_type)
    }

    /// Make `address` the only active source and switch it on.
    pub fn set_active_device(&mut self, address: LogicalAddress) {
        for device in self.devices.iter_mut() {
            device.active_source = device.address == address;
        }
        self.device_mut(address).power = PowerStatus::On;
    }
    /// Mark the device at `address` as the active source.
    ///
    /// Returns false if no device has that physical address.
    pub fn set_stream_path(&mut self, address: PhysicalAddress) -> bool {
        match self.by_physical(address) {
            Some(device) => {
                self.set_active_device(device);
                true
            }
            None => false,
        }
    }

    /// Claim `address` if no one answers a poll to it.
    pub fn try_claim(&mut self, link: &Link, address: LogicalAddress) -> bool {
        link.log(
            LogLevel::Debug,
            format_args!("trying logical address '{}'", address.name()),
        );
        match self.device(address).transmit_poll(link, address) {
            Ok(()) => {
                link.log(
                    LogLevel::Debug,
                    format_args!("logical address '{}' already taken", address.name()),
                );
                self.device_mut(address).status = DeviceStatus::Present;
                return false;
            }
            Err(Error::NoAck | Error::AckError(_)) => {}
            Err(e) => {
                link.log(
                    LogLevel::Error,
                    format_args!("could not poll '{}': {e}", address.name()),
                );
                return false;
            }
        }
        link.log(
            LogLevel::Notice,
            format_args!("using logical address '{}'", address.name()),
        );
        let first = self.ours.is_empty();
        let (version, vendor) = (self.config.cec_version, self.config.vendor_id);
        let name = OsdName::from(self.config.device_name.as_str());
        let device = self.device_mut(address);
        device.status = DeviceStatus::HandledByThisLibrary;
        device.power = PowerStatus::On;
        device.cec_version = version;
        device.vendor = vendor;
        if first {
            // OSD name and active source only for the primary device
            device.osd_name = name;
            device.active_source = true;
        }
        self.ours.set(address);
        if let Err(e) = link.set_ack_mask(self.ours.ack_mask()) {
            link.log(LogLevel::Error, format_args!("could not set the ackmask: {e}"));
        }
        true
    }
    /// Take `address` without asking the bus and make it primary.
    ///
    /// It takes over the physical address and the active source flag of our
    /// previous primary device.
    pub fn claim_fixed(&mut self, address: LogicalAddress) {
        let (version, vendor) = (self.config.cec_version, self.config.vendor_id);
        let name = OsdName::from(self.config.device_name.as_str());
        let physical = self
            .primary()
            .map_or(PHYSICAL_ADDRESS_UNKNOWN, |d| d.physical_address);
        for own in self.ours.iter() {
            self.devices[own.index()].active_source = false;
        }
        let device = self.device_mut(address);
        device.physical_address = physical;
        device.status = DeviceStatus::HandledByThisLibrary;
        device.power = PowerStatus::On;
        device.cec_version = version;
        device.vendor = vendor;
        device.osd_name = name;
        device.active_source = true;
        self.ours.set_primary(address);
    }
    /// Claim one address per requested device type.
    ///
    /// Returns false if any requested type found no free address.
    pub fn allocate_logical(&mut self, link: &Link) -> bool {
        self.ours.clear();
        let types = self.config.device_types().to_vec();
        let mut ok = true;
        for (i, device_type) in types.into_iter().enumerate() {
            if device_type == DeviceType::Reserved {
                continue;
            }
            link.log(
                LogLevel::Debug,
                format_args!("detecting logical address for device {i}: {device_type:?}"),
            );
            let found = device_type
                .candidates()
                .iter()
                .any(|candidate| self.try_claim(link, *candidate));
            if !found {
                link.log(
                    LogLevel::Warning,
                    format_args!("no free logical address for {device_type:?}"),
                );
            }
            ok &= found;
        }
        ok && !self.ours.is_empty()
    }

    /// True if a device other than ours uses `address`.
    pub fn physical_address_in_use(&self, address: PhysicalAddress) -> bool {
        self.devices
            .iter()
            .any(|d| !self.ours.contains(d.address) && d.physical_address == address)
    }
    /// First free address below `port`, going from `p.0.0.0` down to `p.p.p.p`.
    pub fn probe_physical_address(&self, link: &Link, port: u8) -> Option<PhysicalAddress> {
        let mut address: PhysicalAddress = 0;
        for pos in (0..4).rev() {
            address += (port as u16) << (pos * 4);
            link.log(
                LogLevel::Debug,
                format_args!("checking physical address {address:04x}"),
            );
            if !self.physical_address_in_use(address) {
                return Some(address);
            }
            link.log(
                LogLevel::Debug,
                format_args!("physical address {address:04x} is in use"),
            );
        }
        None
    }
    /// Give all our devices `address`, then announce the active view there.
    pub fn set_physical_address(&mut self, link: &Link, address: PhysicalAddress) -> Result<()> {
        if self.ours.is_empty() {
            return Err(Error::AddressAllocation);
        }
        link.log(
            LogLevel::Debug,
            format_args!("setting physical address to {address:04x}"),
        );
        for own in self.ours.iter() {
            self.devices[own.index()].physical_address = address;
        }
        self.set_active_view(link)
    }

    /// Our device of `device_type` (primary if none) becomes the active source.
    pub fn set_active_source(&mut self, link: &Link, device_type: Option<DeviceType>) -> Result<()> {
        let primary = self.ours.primary().ok_or(Error::NotRunning)?;
        let address = device_type
            .and_then(|t| self.own_by_type(t))
            .unwrap_or(primary);
        self.set_active_device(address);
        self.device(address).transmit_active_source(link)
    }
    /// [Self::set_active_source] with the first configured type
    pub fn set_active_view(&mut self, link: &Link) -> Result<()> {
        let first = self.config.device_types().first().copied();
        self.set_active_source(link, first)
    }

    /// Poll `destination` from our primary address, remembering whether it answered.
    pub fn poll(&mut self, link: &Link, destination: LogicalAddress) -> bool {
        let Some(primary) = self.primary() else {
            return false;
        };
        let present = primary.transmit_poll(link, destination).is_ok();
        if !self.is_ours(destination) {
            self.device_mut(destination).status = if present {
                DeviceStatus::Present
            } else {
                DeviceStatus::NotPresent
            };
        }
        present
    }
    /// Send `key` from our primary address to the audio system and return its last audio status.
    pub fn audio_key(&self, link: &Link, key: UserControlCode) -> Result<u8> {
        let primary = self.primary().ok_or(Error::NotRunning)?;
        let audio = self
            .by_type(DeviceType::AudioSystem)
            .map(|address| self.device(address))
            .filter(|audio| audio.status == DeviceStatus::Present)
            .ok_or(Error::NoSuchDevice(DeviceType::AudioSystem))?;
        primary.transmit_key(link, audio.address, key)?;
        Ok(audio
            .role
            .audio()
            .map_or(AUDIO_STATUS_UNKNOWN, |state| state.status))
    }

    /// Periodic vendor id requests to every slot that is not ours.
    pub fn poll_vendor_ids(&mut self, link: &Link, now: Instant) {
        let Some(from) = self.ours.primary() else {
            return;
        };
        for address in LogicalAddress::ALL {
            if !self.ours.contains(address) {
                self.devices[address.index()].poll_vendor_id(link, from, now);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::controller::NoController;
    use crate::testing::MockTransport;

    fn link(mock: &MockTransport) -> Link {
        Link::new(Box::new(mock.clone()), Box::new(NoController))
    }

    #[test]
    fn claim_skips_taken_addresses() {
        let mock = MockTransport::new(&[LogicalAddress::Playback1]);
        let link = link(&mock);
        let mut registry = Registry::new(Config {
            device_name: "Kodi".to_string(),
            device_types: vec![DeviceType::Playback, DeviceType::Recording],
            ..Config::default()
        });
        assert!(registry.allocate_logical(&link));

        assert_eq!(registry.ours().primary(), Some(LogicalAddress::Playback2));
        assert!(registry.is_ours(LogicalAddress::Recording1));
        assert!(!registry.is_ours(LogicalAddress::Playback1));
        assert_eq!(
            registry.device(LogicalAddress::Playback1).status(),
            DeviceStatus::Present
        );
        let primary = registry.device(LogicalAddress::Playback2);
        assert_eq!(primary.status(), DeviceStatus::HandledByThisLibrary);
        assert_eq!(primary.osd_name().as_bytes(), b"Kodi");
        assert!(primary.is_active_source());
        let second = registry.device(LogicalAddress::Recording1);
        assert_eq!(second.osd_name().as_bytes(), b"Recorder 1");
        assert!(!second.is_active_source());
        assert_eq!(mock.ack_masks(), vec![0x100, 0x102]);
    }

    #[test]
    fn allocation_fails_if_a_role_is_full() {
        let mock = MockTransport::new(&[
            LogicalAddress::Playback1,
            LogicalAddress::Playback2,
            LogicalAddress::Playback3,
        ]);
        let link = link(&mock);
        let mut registry = Registry::new(Config::default());
        assert!(!registry.allocate_logical(&link));
        assert!(registry.ours().is_empty());
        assert!(mock.ack_masks().is_empty());
        assert_eq!(mock.sent().len(), 3);
        assert!(mock.sent().iter().all(Command::is_poll));
    }

    #[test]
    fn probe_skips_foreign_addresses() {
        let mock = MockTransport::default();
        let link = link(&mock);
        let mut registry = Registry::new(Config::default());
        registry
            .device_mut(LogicalAddress::Tuner1)
            .set_physical_address(0x2000);
        registry
            .device_mut(LogicalAddress::Playback1)
            .set_physical_address(0x2200);
        assert_eq!(registry.probe_physical_address(&link, 2), Some(0x2220));
        assert_eq!(registry.probe_physical_address(&link, 3), Some(0x3000));

        // our own address does not count
        registry.claim_fixed(LogicalAddress::Playback1);
        assert_eq!(registry.probe_physical_address(&link, 2), Some(0x2200));

        registry
            .device_mut(LogicalAddress::Recording1)
            .set_physical_address(0x2200);
        registry
            .device_mut(LogicalAddress::Tuner2)
            .set_physical_address(0x2220);
        registry
            .device_mut(LogicalAddress::Tuner3)
            .set_physical_address(0x2222);
        assert_eq!(registry.probe_physical_address(&link, 2), None);
    }

    #[test]
    fn stream_path_marks_one_active_source() {
        let mut registry = Registry::new(Config::default());
        registry
            .device_mut(LogicalAddress::Playback1)
            .set_physical_address(0x1000);
        assert!(registry.set_stream_path(0x1000));
        let playback = registry.device(LogicalAddress::Playback1);
        assert!(playback.is_active_source());
        assert_eq!(playback.power_status(), PowerStatus::On);

        assert!(registry.set_stream_path(0x0000));
        assert!(registry.device(LogicalAddress::Tv).is_active_source());
        assert!(!registry.device(LogicalAddress::Playback1).is_active_source());
        assert_eq!(registry.devices().filter(|d| d.is_active_source()).count(), 1);

        assert!(!registry.set_stream_path(0x3000));
        assert!(registry.device(LogicalAddress::Tv).is_active_source());
    }

    #[test]
    fn physical_address_needs_a_logical_one() {
        let mock = MockTransport::default();
        let link = link(&mock);
        let mut registry = Registry::new(Config::default());
        assert!(matches!(
            registry.set_physical_address(&link, 0x1000),
            Err(Error::AddressAllocation)
        ));
        assert!(mock.sent().is_empty());

        registry.claim_fixed(LogicalAddress::Playback1);
        registry.set_physical_address(&link, 0x1000).unwrap();
        assert_eq!(registry.primary().map(|d| d.physical_address()), Some(0x1000));
        let sent = mock.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].raw_opcode(), Some(Opcode::ActiveSource.into()));
        assert_eq!(sent[0].parameters(), &[0x10, 0x00]);
        assert!(sent[0].is_broadcast());
    }

    #[test]
    fn unknown_vendor_is_aborted() {
        let mock = MockTransport::new(&[LogicalAddress::Tv]);
        let link = link(&mock);
        let device = BusDevice::new(LogicalAddress::Playback1);
        assert!(matches!(
            device.transmit_vendor_id(&link, LogicalAddress::Tv),
            Err(Error::Unsupported { .. })
        ));
        let sent = mock.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].raw_opcode(), Some(Opcode::FeatureAbort.into()));
        assert_eq!(
            sent[0].parameters(),
            &[
                u8::from(Opcode::GiveDeviceVendorId),
                u8::from(AbortReason::Unrecognized)
            ]
        );
    }

    #[test]
    fn deck_status_needs_a_deck() {
        let mock = MockTransport::new(&[LogicalAddress::Tv]);
        let link = link(&mock);
        let tuner = BusDevice::new(LogicalAddress::Tuner1);
        assert!(matches!(
            tuner.transmit_deck_status(&link, LogicalAddress::Tv),
            Err(Error::Unsupported { .. })
        ));
        let playback = BusDevice::new(LogicalAddress::Playback1);
        playback
            .transmit_deck_status(&link, LogicalAddress::Tv)
            .unwrap();
        assert_eq!(mock.sent()[0].parameters(), &[u8::from(DeckInfo::Stop)]);
    }

    #[test]
    fn vendor_polling_is_rate_limited() {
        let mock = MockTransport::new(&[LogicalAddress::Tv]);
        let link = link(&mock);
        let mut registry = Registry::new(Config::default());
        registry.claim_fixed(LogicalAddress::Playback1);
        let now = Instant::now();
        registry.device_mut(LogicalAddress::Tv).mark_active(now);

        let requests = |mock: &MockTransport| {
            mock.sent()
                .iter()
                .filter(|c| c.raw_opcode() == Some(Opcode::GiveDeviceVendorId.into()))
                .map(|c| (c.initiator, c.destination))
                .collect::<Vec<_>>()
        };
        registry.poll_vendor_ids(&link, now);
        assert_eq!(
            requests(&mock),
            vec![(LogicalAddress::Playback1, LogicalAddress::Tv)]
        );
        registry.poll_vendor_ids(&link, now + Duration::from_secs(1));
        assert_eq!(requests(&mock).len(), 1);
        registry.poll_vendor_ids(&link, now + Duration::from_secs(6));
        assert_eq!(requests(&mock).len(), 2);

        // known vendors are left alone
        registry
            .device_mut(LogicalAddress::Tv)
            .set_vendor_id(VendorId::LG);
        registry.poll_vendor_ids(&link, now + Duration::from_secs(20));
        assert_eq!(requests(&mock).len(), 2);
    }
}
