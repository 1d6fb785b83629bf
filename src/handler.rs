use crate::command::Command;
use crate::controller::LogLevel;
use crate::device::{BusDevice, Registry};
use crate::error::Result;
use crate::processor::Link;
use crate::types::{
    AbortReason, DeckControlMode, LogicalAddress, MenuLanguage, MenuRequestType, MenuState,
    Opcode, OsdName, PowerStatus, SystemAudioStatus, UserControlCode, VendorId, Version,
};

/**
 * Interprets one received command from the point of view of the device it came from.
 *
 * Borrows the registry and the link for a single [CommandHandler::handle] call.
 */
pub struct CommandHandler<'a> {
    device: LogicalAddress,
    registry: &'a mut Registry,
    link: &'a Link,
}

impl<'a> CommandHandler<'a> {
    pub fn new(device: LogicalAddress, registry: &'a mut Registry, link: &'a Link) -> Self {
        Self {
            device,
            registry,
            link,
        }
    }

    /// Apply `command`. Returns false if it was not understood or not valid here.
    ///
    /// Commands for us or for everyone are passed on to the host either way.
    pub fn handle(&mut self, command: &Command) -> bool {
        let handled = match command.opcode() {
            Some(Ok(opcode)) => {
                self.link.log(
                    LogLevel::Notice,
                    format_args!(
                        ">> {} ({:X}) -> {} ({:X}): {} ({:02X})",
                        command.initiator.name(),
                        u8::from(command.initiator),
                        command.destination.name(),
                        u8::from(command.destination),
                        opcode.name(),
                        u8::from(opcode)
                    ),
                );
                self.dispatch(opcode, command)
            }
            _ => self.unhandled(command),
        };

        if command.is_broadcast() || self.registry.is_ours(command.destination) {
            self.link.controller().add_command(command);
        }
        handled
    }

    fn dispatch(&mut self, opcode: Opcode, command: &Command) -> bool {
        match opcode {
            Opcode::ReportPowerStatus => self.report_power_status(command),
            Opcode::CecVersion => self.cec_version(command),
            Opcode::DeviceVendorId => self.device_vendor_id(command),
            Opcode::ReportPhysicalAddr => self.report_physical_address(command),
            Opcode::SetMenuLanguage => self.set_menu_language(command),
            Opcode::SetOsdName => self.set_osd_name(command),

            Opcode::GivePhysicalAddr => {
                self.give(command, |d, link, _| d.transmit_physical_address(link))
            }
            Opcode::GiveOsdName => self.give(command, |d, link, to| d.transmit_osd_name(link, to)),
            Opcode::GiveDeviceVendorId => {
                self.give(command, |d, link, to| d.transmit_vendor_id(link, to))
            }
            Opcode::GiveDevicePowerStatus => {
                self.give(command, |d, link, to| d.transmit_power_state(link, to))
            }
            Opcode::GetCecVersion => {
                self.give(command, |d, link, to| d.transmit_cec_version(link, to))
            }
            Opcode::GiveDeckStatus => {
                self.give(command, |d, link, to| d.transmit_deck_status(link, to))
            }
            Opcode::GiveAudioStatus => {
                self.give(command, |d, link, to| d.transmit_audio_status(link, to))
            }
            Opcode::GiveSystemAudioModeStatus => self.give(command, |d, link, to| {
                d.transmit_system_audio_mode_status(link, to)
            }),

            Opcode::ActiveSource => self.active_source(command),
            Opcode::ImageViewOn | Opcode::TextViewOn => self.view_on(command),
            Opcode::SetStreamPath => self.set_stream_path(command),
            Opcode::RoutingChange => self.routing_change(command),
            Opcode::RoutingInformation => self.routing_information(command),
            Opcode::RequestActiveSource => self.request_active_source(command),
            Opcode::Standby => self.standby(command),

            Opcode::DeckControl => self.deck_control(command),
            Opcode::MenuRequest => self.menu_request(command),
            Opcode::UserControlPressed => self.user_control_pressed(command),
            Opcode::UserControlReleased => self.user_control_released(command),
            Opcode::VendorCommandWithId => self.vendor_command_with_id(command),

            Opcode::SystemAudioModeRequest => self.system_audio_mode_request(command),
            Opcode::SystemAudioModeStatus => self.system_audio_mode_status(command),
            Opcode::ReportAudioStatus => self.report_audio_status(command),

            _ => self.unhandled(command),
        }
    }

    fn unhandled(&self, command: &Command) -> bool {
        match command.raw_opcode() {
            Some(opcode) => self.link.log(
                LogLevel::Debug,
                format_args!(
                    "unhandled command with opcode {:02x} from address {:X}",
                    opcode,
                    u8::from(command.initiator)
                ),
            ),
            None => self.link.log(
                LogLevel::Debug,
                format_args!("poll from address {:X}", u8::from(command.initiator)),
            ),
        }
        false
    }

    fn report_power_status(&mut self, command: &Command) -> bool {
        let [status] = command.parameters() else {
            return false;
        };
        let Ok(status) = PowerStatus::try_from(*status) else {
            return false;
        };
        if self.registry.device_mut(self.device).set_power_status(status) {
            self.link.log(
                LogLevel::Debug,
                format_args!(
                    "{} ({:X}): power status changed to {:?}",
                    self.device.name(),
                    u8::from(self.device),
                    status
                ),
            );
        }
        true
    }

    fn cec_version(&mut self, command: &Command) -> bool {
        let [version] = command.parameters() else {
            return false;
        };
        let Ok(version) = Version::try_from(*version) else {
            return false;
        };
        self.registry.device_mut(self.device).set_cec_version(version);
        true
    }

    fn device_vendor_id(&mut self, command: &Command) -> bool {
        let Some(vendor) = VendorId::from_bytes(command.parameters()) else {
            self.link
                .log(LogLevel::Warning, format_args!("invalid vendor ID received"));
            return false;
        };
        if self.registry.device_mut(self.device).set_vendor_id(vendor) {
            self.link.log(
                LogLevel::Debug,
                format_args!(
                    "{} ({:X}): vendor = {:06x}",
                    self.device.name(),
                    u8::from(self.device),
                    vendor.0
                ),
            );
        }
        true
    }

    fn report_physical_address(&mut self, command: &Command) -> bool {
        if command.parameters().len() != 3 {
            return false;
        }
        let Some(address) = command.physical_address_at(0) else {
            return false;
        };
        if self.registry.is_ours(self.device) {
            return true;
        }
        let ours = self.registry.primary().map(|d| d.physical_address());
        self.registry
            .device_mut(self.device)
            .set_physical_address(address);
        if ours == Some(address) {
            // no topology detection: move out of the way by one level
            let moved = address.wrapping_add(0x100);
            self.link.log(
                LogLevel::Warning,
                format_args!(
                    "{} reported our physical address {address:04x}, using {moved:04x}",
                    self.device.name()
                ),
            );
            if let Err(e) = self.registry.set_physical_address(self.link, moved) {
                self.link.log(
                    LogLevel::Debug,
                    format_args!("could not announce {moved:04x}: {e}"),
                );
            }
        }
        true
    }

    fn set_menu_language(&mut self, command: &Command) -> bool {
        if command.parameters().is_empty() {
            return false;
        }
        let language = MenuLanguage::from(command.parameters());
        self.link.log(
            LogLevel::Debug,
            format_args!(
                "{} ({:X}): menu language set to '{}'",
                self.device.name(),
                u8::from(self.device),
                language
            ),
        );
        self.registry
            .device_mut(self.device)
            .set_menu_language(language);
        true
    }

    fn set_osd_name(&mut self, command: &Command) -> bool {
        if command.parameters().is_empty() {
            return false;
        }
        self.registry
            .device_mut(self.device)
            .set_osd_name(OsdName::from(command.parameters()));
        true
    }

    /// Answer a request addressed to one of our devices.
    fn give<F>(&self, command: &Command, reply: F) -> bool
    where
        F: FnOnce(&BusDevice, &Link, LogicalAddress) -> Result<()>,
    {
        if !self.registry.is_ours(command.destination) {
            return false;
        }
        reply(
            self.registry.device(command.destination),
            self.link,
            command.initiator,
        )
        .is_ok()
    }

    fn active_source(&mut self, command: &Command) -> bool {
        if command.parameters().len() != 2 {
            return false;
        }
        match command.physical_address_at(0) {
            Some(address) => self.registry.set_stream_path(address),
            None => false,
        }
    }

    fn view_on(&mut self, _command: &Command) -> bool {
        self.registry.set_active_device(self.device);
        true
    }

    fn set_stream_path(&mut self, command: &Command) -> bool {
        let Some(address) = command.physical_address_at(0) else {
            return false;
        };
        self.link.log(
            LogLevel::Debug,
            format_args!(
                ">> {:X} sets stream path to physical address {address:04x}",
                u8::from(command.initiator)
            ),
        );
        if !self.registry.set_stream_path(address) {
            return false;
        }
        let Some(device) = self.registry.by_physical(address) else {
            return false;
        };
        if !self.registry.is_ours(device) {
            return true;
        }
        let device = self.registry.device(device);
        device
            .transmit_active_source(self.link)
            .and_then(|_| device.transmit_menu_state(self.link, command.initiator))
            .is_ok()
    }

    fn routing_change(&mut self, command: &Command) -> bool {
        if command.parameters().len() != 4 {
            return false;
        }
        match (command.physical_address_at(0), command.physical_address_at(2)) {
            (Some(old), Some(new)) => {
                self.registry
                    .device_mut(self.device)
                    .set_stream_path(new, old);
                true
            }
            _ => false,
        }
    }

    fn routing_information(&mut self, command: &Command) -> bool {
        if command.parameters().len() != 2 {
            return false;
        }
        match command.physical_address_at(0) {
            Some(address) => self.registry.set_stream_path(address),
            None => false,
        }
    }

    fn request_active_source(&mut self, command: &Command) -> bool {
        self.link.log(
            LogLevel::Debug,
            format_args!(">> {:X} requests active source", u8::from(command.initiator)),
        );
        let ours: Vec<_> = self.registry.ours().iter().collect();
        for address in ours.into_iter().rev() {
            // only the active one sends anything
            let _ = self
                .registry
                .device(address)
                .transmit_active_source(self.link);
        }
        true
    }

    fn standby(&mut self, _command: &Command) -> bool {
        self.registry
            .device_mut(self.device)
            .set_power_status(PowerStatus::Standby);
        true
    }

    fn deck_control(&mut self, command: &Command) -> bool {
        let Some(mode) = command.parameters().first() else {
            return false;
        };
        let Ok(mode) = DeckControlMode::try_from(*mode) else {
            return false;
        };
        match self
            .registry
            .device_mut(command.destination)
            .role_mut()
            .deck_mut()
        {
            Some(deck) => {
                deck.control_mode = mode;
                true
            }
            None => false,
        }
    }

    fn menu_request(&mut self, command: &Command) -> bool {
        if !self.registry.is_ours(command.destination) {
            return false;
        }
        let Some(request) = command.parameters().first() else {
            return false;
        };
        let device = self.registry.device_mut(command.destination);
        match MenuRequestType::try_from(*request) {
            Ok(MenuRequestType::Activate) => device.set_menu_state(MenuState::Activated),
            Ok(MenuRequestType::Deactivate) => device.set_menu_state(MenuState::Deactivated),
            Ok(MenuRequestType::Query) => {}
            Err(_) => return false,
        }
        self.registry
            .device(command.destination)
            .transmit_menu_state(self.link, command.initiator)
            .is_ok()
    }

    fn user_control_pressed(&mut self, command: &Command) -> bool {
        if !self.registry.is_ours(command.destination) {
            return false;
        }
        let Some(code) = command.parameters().first().copied() else {
            return false;
        };
        let controller = self.link.controller();
        // a new press ends the previous one
        controller.add_key();
        if code > UserControlCode::MAX {
            return false;
        }
        let Ok(key) = UserControlCode::try_from(code) else {
            return false;
        };
        self.link
            .log(LogLevel::Debug, format_args!("key pressed: {key:?} ({code:x})"));
        if key.is_power_on() {
            self.registry
                .device_mut(command.destination)
                .set_power_status(PowerStatus::On);
        }
        controller.set_current_button(key);
        true
    }

    fn user_control_released(&mut self, command: &Command) -> bool {
        if self.registry.is_ours(command.destination) {
            self.link.controller().add_key();
        }
        true
    }

    fn vendor_command_with_id(&mut self, command: &Command) -> bool {
        if !self.registry.is_ours(command.destination) {
            return true;
        }
        if let Err(e) = self.link.transmit_abort(
            command.destination,
            command.initiator,
            Opcode::VendorCommandWithId.into(),
            AbortReason::Refused,
        ) {
            self.link
                .log(LogLevel::Debug, format_args!("could not refuse vendor command: {e}"));
        }
        true
    }

    fn system_audio_mode_request(&mut self, command: &Command) -> bool {
        if !self.registry.is_ours(command.destination) {
            return false;
        }
        let mode = if command.physical_address_at(0).is_some() {
            SystemAudioStatus::On
        } else {
            SystemAudioStatus::Off
        };
        match self
            .registry
            .device_mut(command.destination)
            .role_mut()
            .audio_mut()
        {
            Some(audio) => audio.system_audio = mode,
            None => return false,
        }
        self.registry
            .device(command.destination)
            .transmit_set_system_audio_mode(self.link, command.initiator)
            .is_ok()
    }

    fn system_audio_mode_status(&mut self, command: &Command) -> bool {
        let Some(mode) = command.parameters().first() else {
            return false;
        };
        let Ok(mode) = SystemAudioStatus::try_from(*mode) else {
            return false;
        };
        match self.registry.device_mut(self.device).role_mut().audio_mut() {
            Some(audio) => {
                audio.system_audio = mode;
                true
            }
            None => false,
        }
    }

    fn report_audio_status(&mut self, command: &Command) -> bool {
        let [status] = command.parameters() else {
            return false;
        };
        match self.registry.device_mut(self.device).role_mut().audio_mut() {
            Some(audio) => {
                audio.status = *status;
                true
            }
            None => false,
        }
    }
}
