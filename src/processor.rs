/*!
 * The protocol thread and everything that talks to the adapter.
 *
 * [Processor] owns the [Registry] and the thread. [Link] is the part that is
 * shared with every transmitting caller: the adapter, the host controller
 * and the single transmit lock.
 */
use std::collections::VecDeque;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex, MutexGuard};

use crate::adapter::{
    AdapterTransport, MessageCode, MessageState, OutboundMessage, SEND_CONFIRMATION_TIMEOUT,
};
use crate::command::Command;
use crate::config::{check_hdmi_port, Config};
use crate::controller::{HostController, Keypress, LogLevel};
use crate::device::{DeckState, Registry};
use crate::error::{Error, Result};
use crate::frame::FrameAssembler;
use crate::handler::CommandHandler;
use crate::types::{
    AbortReason, DeckControlMode, DeckInfo, DeviceStatus, DeviceType, LogicalAddress,
    LogicalAddressMask, LogicalAddresses, MenuLanguage, MenuState, Opcode, OsdName,
    PhysicalAddress, PowerStatus, UserControlCode, VendorId, Version,
};

/// how long the main loop waits for adapter traffic
const READ_TIMEOUT: Duration = Duration::from_millis(50);
/// pause between the steps of the main loop
const LOOP_SLEEP: Duration = Duration::from_millis(5);

struct IoState {
    frames: FrameAssembler,
    /// commands that arrived while we waited for an ack
    pending: VecDeque<Command>,
}

/// The adapter and the host, plus the lock that serializes all transmits.
pub struct Link {
    transport: Box<dyn AdapterTransport>,
    controller: Box<dyn HostController>,
    io: Mutex<IoState>,
    monitoring: AtomicBool,
}

impl Link {
    pub fn new(transport: Box<dyn AdapterTransport>, controller: Box<dyn HostController>) -> Self {
        Self {
            transport,
            controller,
            io: Mutex::new(IoState {
                frames: FrameAssembler::new(),
                pending: VecDeque::new(),
            }),
            monitoring: AtomicBool::new(false),
        }
    }
    pub fn controller(&self) -> &dyn HostController {
        self.controller.as_ref()
    }
    #[inline]
    pub fn is_open(&self) -> bool {
        self.transport.is_open()
    }
    #[inline]
    pub fn is_monitoring(&self) -> bool {
        self.monitoring.load(Ordering::Relaxed)
    }
    fn set_monitoring(&self, enable: bool) {
        self.monitoring.store(enable, Ordering::Relaxed);
    }

    /// Emit to `tracing` and to the host.
    pub fn log(&self, level: LogLevel, args: fmt::Arguments<'_>) {
        let line = args.to_string();
        match level {
            LogLevel::Error => tracing::error!("{line}"),
            LogLevel::Warning => tracing::warn!("{line}"),
            LogLevel::Notice => tracing::info!("{line}"),
            LogLevel::Debug => tracing::debug!("{line}"),
            LogLevel::Traffic => tracing::trace!("{line}"),
        }
        self.controller.add_log(level, &line);
    }

    /**
     * Send `command` and wait for the result.
     *
     * Blocks until the adapter took the message and, unless the command's
     * `transmit_timeout` is zero, until the adapter reported the ack.
     * Only one transmit is on the way at any time.
     */
    pub fn transmit(&self, command: &Command) -> Result<()> {
        self.log(LogLevel::Traffic, format_args!("<< {command}"));
        let msg = OutboundMessage::from_command(command);
        let mut io = self.io.lock();
        self.transmit_message(&mut io, &msg)
    }

    /// Feature-abort `opcode` towards `destination`.
    pub fn transmit_abort(
        &self,
        initiator: LogicalAddress,
        destination: LogicalAddress,
        opcode: u8,
        reason: AbortReason,
    ) -> Result<()> {
        self.log(
            LogLevel::Debug,
            format_args!("<< transmitting abort message ({opcode:02x}, {reason:?})"),
        );
        self.transmit(&Command::with_parameters(
            initiator,
            destination,
            Opcode::FeatureAbort,
            &[opcode, reason.into()],
        ))
    }

    /// Tell the adapter which addresses to acknowledge.
    pub fn set_ack_mask(&self, mask: u16) -> Result<()> {
        self.log(LogLevel::Debug, format_args!("setting ackmask to {mask:04x}"));
        let msg = OutboundMessage::ack_mask(mask);
        let mut io = self.io.lock();
        self.transmit_message(&mut io, &msg).inspect_err(|e| {
            self.log(LogLevel::Error, format_args!("could not set the ackmask: {e}"))
        })
    }

    fn transmit_message(&self, io: &mut IoState, msg: &OutboundMessage) -> Result<()> {
        if !self.transport.is_open() {
            self.log(LogLevel::Error, format_args!("connection is closed"));
            return Err(Error::NotOpen);
        }
        let confirmation = self.transport.write(msg).inspect_err(|e| {
            self.log(LogLevel::Error, format_args!("could not write to the adapter: {e}"))
        })?;
        match confirmation.wait(SEND_CONFIRMATION_TIMEOUT) {
            MessageState::Sent => {}
            MessageState::Error => {
                self.log(LogLevel::Error, format_args!("adapter rejected the command"));
                return Err(Error::WriteRejected);
            }
            state => {
                self.log(LogLevel::Error, format_args!("command was not sent"));
                return Err(Error::NotSent(state));
            }
        }
        if msg.transmit_timeout.is_zero() {
            return Ok(());
        }
        self.wait_for_transmit_succeeded(io, msg.expected_accepts(), msg.transmit_timeout)
            .inspect_err(|e| self.log(LogLevel::Debug, format_args!("did not receive ack: {e}")))
    }

    /**
     * Wait for `accepts` command-accepted replies followed by transmit-succeeded.
     *
     * Frames that arrive in the meantime are assembled and queued.
     */
    fn wait_for_transmit_succeeded(
        &self,
        io: &mut IoState,
        accepts: usize,
        timeout: Duration,
    ) -> Result<()> {
        let deadline = Instant::now() + timeout;
        let mut left = accepts;
        loop {
            let now = Instant::now();
            if now >= deadline {
                return Err(Error::NoAck);
            }
            let Some(msg) = self.transport.read(deadline - now)? else {
                continue;
            };
            if msg.is_error() {
                self.log(LogLevel::Warning, format_args!("{msg:?}"));
                return Err(Error::AckError(msg.code()));
            }
            self.log(LogLevel::Debug, format_args!("{msg:?}"));
            match msg.code() {
                MessageCode::CommandAccepted => left = left.saturating_sub(1),
                MessageCode::TransmitSucceeded if left == 0 => return Ok(()),
                MessageCode::TransmitSucceeded => {
                    self.log(
                        LogLevel::Warning,
                        format_args!("transmit succeeded with {left} bytes not accepted"),
                    );
                    return Err(Error::NoAck);
                }
                _ => {
                    if let Some(cmd) = io.frames.push(&msg) {
                        io.pending.push_back(cmd);
                    }
                }
            }
        }
    }

    /// A queued command, else whatever completes within `timeout`.
    fn next_command(&self, timeout: Duration) -> Result<Option<Command>> {
        let mut io = self.io.lock();
        if let Some(cmd) = io.pending.pop_front() {
            return Ok(Some(cmd));
        }
        if !self.transport.is_open() {
            return Ok(None);
        }
        match self.transport.read(timeout)? {
            Some(msg) => {
                let level = if msg.is_error() {
                    LogLevel::Warning
                } else {
                    LogLevel::Debug
                };
                self.log(level, format_args!("{msg:?}"));
                Ok(io.frames.push(&msg))
            }
            None => Ok(None),
        }
    }
}

/// Where the protocol thread is in its life
#[derive(Debug, Eq, PartialEq, Clone, Copy)]
pub enum Lifecycle {
    Created,
    Starting,
    Running,
    Stopping,
    Stopped,
}

struct LifecycleState {
    lifecycle: Lifecycle,
    /// why the thread did not reach `Running`
    failure: Option<Error>,
}

struct Shared {
    link: Link,
    registry: Mutex<Registry>,
    state: Mutex<LifecycleState>,
    changed: Condvar,
}

/**
 * A CEC participant on the bus behind one adapter.
 *
 * ```no_run
 * # use cec_control::{Config, Processor, NoController, SerialAdapter};
 * let adapter = SerialAdapter::open("/dev/ttyACM0")?;
 * let cec = Processor::new(adapter, NoController, Config::default())?;
 * cec.start()?;
 * cec.set_active_view()?;
 * # Ok::<(), cec_control::Error>(())
 * ```
 */
pub struct Processor {
    shared: Arc<Shared>,
    thread: Mutex<Option<JoinHandle<()>>>,
}

impl Processor {
    pub fn new<T, C>(transport: T, controller: C, config: Config) -> Result<Self>
    where
        T: AdapterTransport + 'static,
        C: HostController + 'static,
    {
        config.validate()?;
        Ok(Self {
            shared: Arc::new(Shared {
                link: Link::new(Box::new(transport), Box::new(controller)),
                registry: Mutex::new(Registry::new(config)),
                state: Mutex::new(LifecycleState {
                    lifecycle: Lifecycle::Created,
                    failure: None,
                }),
                changed: Condvar::new(),
            }),
            thread: Mutex::new(None),
        })
    }

    /**
     * Start the protocol thread.
     *
     * Blocks until our logical and physical addresses are set up.
     */
    pub fn start(&self) -> Result<()> {
        let link = &self.shared.link;
        let mut state = self.shared.state.lock();
        if state.lifecycle != Lifecycle::Created {
            return Err(Error::AlreadyStarted);
        }
        if !link.is_open() {
            link.log(LogLevel::Error, format_args!("connection is closed"));
            return Err(Error::NotOpen);
        }
        state.lifecycle = Lifecycle::Starting;

        let shared = self.shared.clone();
        let spawned = thread::Builder::new()
            .name("cec processor".to_string())
            .spawn(move || shared.run());
        match spawned {
            Ok(handle) => *self.thread.lock() = Some(handle),
            Err(e) => {
                state.lifecycle = Lifecycle::Stopped;
                link.log(
                    LogLevel::Error,
                    format_args!("could not create a processor thread: {e}"),
                );
                return Err(Error::StartFailed);
            }
        }

        while state.lifecycle == Lifecycle::Starting {
            self.shared.changed.wait(&mut state);
        }
        if state.lifecycle == Lifecycle::Running {
            return Ok(());
        }
        let failure = state.failure.take().unwrap_or(Error::NotRunning);
        drop(state);
        link.log(LogLevel::Error, format_args!("could not start: {failure}"));
        self.join();
        Err(failure)
    }

    /// Stop the protocol thread and wait for it to exit.
    pub fn stop(&self) {
        {
            let mut state = self.shared.state.lock();
            match state.lifecycle {
                Lifecycle::Stopped => return,
                Lifecycle::Created => {
                    state.lifecycle = Lifecycle::Stopped;
                    return;
                }
                _ => state.lifecycle = Lifecycle::Stopping,
            }
            self.shared.changed.notify_all();
        }
        self.join();
        self.shared.state.lock().lifecycle = Lifecycle::Stopped;
    }

    fn join(&self) {
        let handle = self.thread.lock().take();
        if let Some(handle) = handle {
            if handle.join().is_err() {
                self.shared
                    .link
                    .log(LogLevel::Error, format_args!("processor thread panicked"));
            }
        }
    }

    pub fn lifecycle(&self) -> Lifecycle {
        self.shared.state.lock().lifecycle
    }
    #[inline]
    pub fn is_running(&self) -> bool {
        self.lifecycle() == Lifecycle::Running
    }

    fn registry(&self) -> MutexGuard<'_, Registry> {
        self.shared.registry.lock()
    }
    fn running(&self) -> Result<MutexGuard<'_, Registry>> {
        if self.is_running() {
            Ok(self.registry())
        } else {
            Err(Error::NotRunning)
        }
    }
    fn link(&self) -> &Link {
        &self.shared.link
    }

    /// Send a raw command. Works as soon as the adapter is open.
    pub fn transmit(&self, command: &Command) -> Result<()> {
        self.link().transmit(command)
    }
    /// Feature-abort `opcode` from our primary address.
    pub fn transmit_abort(
        &self,
        destination: LogicalAddress,
        opcode: Opcode,
        reason: AbortReason,
    ) -> Result<()> {
        let primary = self.running()?.ours().primary().ok_or(Error::NotRunning)?;
        self.link()
            .transmit_abort(primary, destination, opcode.into(), reason)
    }

    /// Our device of that type (else the primary one) becomes the active source.
    pub fn set_active_source(&self, device_type: Option<DeviceType>) -> Result<()> {
        self.running()?.set_active_source(self.link(), device_type)
    }
    /// Make the first configured device type the active source.
    pub fn set_active_view(&self) -> Result<()> {
        self.running()?.set_active_view(self.link())
    }
    /// Tell the TV that we no longer are the source.
    pub fn set_inactive_view(&self) -> Result<()> {
        let registry = self.running()?;
        let primary = registry.primary().ok_or(Error::NotRunning)?;
        primary.transmit_inactive_view(self.link())
    }
    /// Mark the device at `address` as the active source.
    pub fn set_stream_path(&self, address: PhysicalAddress) -> bool {
        self.registry().set_stream_path(address)
    }

    /// Use HDMI port `port` of the device we are connected to.
    ///
    /// While running, this probes for a new physical address.
    pub fn set_hdmi_port(&self, port: u8) -> Result<()> {
        check_hdmi_port(port)?;
        let link = self.link();
        link.log(LogLevel::Debug, format_args!("setting HDMI port to {port}"));
        let mut registry = self.registry();
        registry.config_mut().hdmi_port = port;
        if !self.is_running() {
            return Ok(());
        }
        let address = registry
            .probe_physical_address(link, port)
            .ok_or(Error::PhysicalAddress(port))?;
        registry.set_physical_address(link, address)
    }
    pub fn set_physical_address(&self, address: PhysicalAddress) -> Result<()> {
        self.running()?.set_physical_address(self.link(), address)
    }
    /// Make `address` our primary logical address.
    pub fn set_logical_address(&self, address: LogicalAddress) -> Result<()> {
        let mut registry = self.registry();
        if registry.ours().primary() == Some(address) {
            return Ok(());
        }
        let link = self.link();
        link.log(
            LogLevel::Notice,
            format_args!("<< setting primary logical address to {:X}", u8::from(address)),
        );
        registry.claim_fixed(address);
        link.set_ack_mask(registry.ours().ack_mask())
    }

    /// Set the menu state of all our devices, optionally telling the TV.
    pub fn set_menu_state(&self, state: MenuState, send_update: bool) -> Result<()> {
        let mut registry = self.registry();
        let ours: Vec<_> = registry.ours().iter().collect();
        for address in ours {
            registry.device_mut(address).set_menu_state(state);
        }
        if !send_update {
            return Ok(());
        }
        let primary = registry.primary().ok_or(Error::NotRunning)?;
        primary.transmit_menu_state(self.link(), LogicalAddress::Tv)
    }
    pub fn set_deck_control_mode(&self, mode: DeckControlMode, send_update: bool) -> Result<()> {
        self.update_deck(send_update, |deck| deck.control_mode = mode)
    }
    pub fn set_deck_info(&self, info: DeckInfo, send_update: bool) -> Result<()> {
        self.update_deck(send_update, |deck| deck.info = info)
    }
    fn update_deck(
        &self,
        send_update: bool,
        update: impl FnOnce(&mut DeckState),
    ) -> Result<()> {
        let mut registry = self.registry();
        let address = registry
            .own_by_type(DeviceType::Playback)
            .ok_or(Error::NoSuchDevice(DeviceType::Playback))?;
        let device = registry.device_mut(address);
        let deck = device.role_mut().deck_mut().ok_or(Error::Unsupported {
            address,
            feature: "deck control",
        })?;
        update(deck);
        if send_update {
            registry
                .device(address)
                .transmit_deck_status(self.link(), LogicalAddress::Tv)?;
        }
        Ok(())
    }

    /// Hand a finished key press to the host, as if it came from the bus.
    pub fn add_keypress(&self, key: Keypress) {
        self.link().controller().add_keypress(key);
    }

    /// Listen only: acknowledge nothing and leave every command unhandled.
    pub fn switch_monitoring(&self, enable: bool) -> Result<()> {
        let link = self.link();
        link.log(
            LogLevel::Notice,
            format_args!(
                "== {} monitoring mode ==",
                if enable { "enabling" } else { "disabling" }
            ),
        );
        let registry = self.registry();
        link.set_monitoring(enable);
        if enable {
            link.set_ack_mask(0)
        } else {
            link.set_ack_mask(registry.ours().ack_mask())
        }
    }
    #[inline]
    pub fn is_monitoring(&self) -> bool {
        self.link().is_monitoring()
    }

    /// Returns true if `address` acknowledged a poll.
    pub fn poll_device(&self, address: LogicalAddress) -> bool {
        if address == LogicalAddress::Broadcast {
            return false;
        }
        self.registry().poll(self.link(), address)
    }

    /// Returns the last audio status reported by the audio system.
    pub fn volume_up(&self) -> Result<u8> {
        self.running()?.audio_key(self.link(), UserControlCode::VolumeUp)
    }
    pub fn volume_down(&self) -> Result<u8> {
        self.running()?.audio_key(self.link(), UserControlCode::VolumeDown)
    }
    pub fn mute_audio(&self) -> Result<u8> {
        self.running()?.audio_key(self.link(), UserControlCode::Mute)
    }

    pub fn device_cec_version(&self, address: LogicalAddress) -> Version {
        self.registry().device(address).cec_version()
    }
    /// `None` until the device told us
    pub fn device_menu_language(&self, address: LogicalAddress) -> Option<MenuLanguage> {
        let registry = self.registry();
        let language = registry.device(address).menu_language();
        (!language.is_unknown()).then(|| language.clone())
    }
    pub fn device_vendor_id(&self, address: LogicalAddress) -> VendorId {
        self.registry().device(address).vendor_id()
    }
    pub fn device_power_status(&self, address: LogicalAddress) -> PowerStatus {
        self.registry().device(address).power_status()
    }
    pub fn device_osd_name(&self, address: LogicalAddress) -> OsdName {
        self.registry().device(address).osd_name().clone()
    }
    pub fn device_physical_address(&self, address: LogicalAddress) -> PhysicalAddress {
        self.registry().device(address).physical_address()
    }
    /// Devices that answered or sent something, broadcast excluded.
    pub fn active_devices(&self) -> LogicalAddressMask {
        self.registry()
            .devices()
            .filter(|d| d.address() != LogicalAddress::Broadcast)
            .filter(|d| d.status() == DeviceStatus::Present)
            .fold(LogicalAddressMask::empty(), |mask, d| {
                mask | LogicalAddressMask::of(d.address())
            })
    }
    pub fn is_active_device(&self, address: LogicalAddress) -> bool {
        self.registry().device(address).status() == DeviceStatus::Present
    }
    pub fn is_active_device_type(&self, device_type: DeviceType) -> bool {
        self.registry().devices().any(|d| {
            d.address() != LogicalAddress::Broadcast
                && d.device_type() == device_type
                && d.status() == DeviceStatus::Present
        })
    }
    /// Physical address of our primary device
    pub fn physical_address(&self) -> Option<PhysicalAddress> {
        self.registry().primary().map(|d| d.physical_address())
    }
    pub fn logical_addresses(&self) -> LogicalAddresses {
        *self.registry().ours()
    }
}

impl Drop for Processor {
    fn drop(&mut self) {
        self.stop();
    }
}

impl Shared {
    fn lifecycle(&self) -> Lifecycle {
        self.state.lock().lifecycle
    }

    fn run(self: Arc<Self>) {
        let started = self.startup();
        {
            let mut state = self.state.lock();
            match started {
                Ok(()) if state.lifecycle == Lifecycle::Starting => {
                    state.lifecycle = Lifecycle::Running;
                }
                Ok(()) => {}
                Err(e) => {
                    state.lifecycle = Lifecycle::Stopped;
                    state.failure = Some(e);
                }
            }
            self.changed.notify_all();
            if state.lifecycle != Lifecycle::Running {
                return;
            }
        }
        self.link
            .log(LogLevel::Debug, format_args!("processor thread started"));

        while self.lifecycle() == Lifecycle::Running {
            self.step();
        }
        self.link
            .log(LogLevel::Debug, format_args!("processor thread stopped"));
    }

    /// Logical addresses, ack mask, physical address.
    fn startup(&self) -> Result<()> {
        let link = &self.link;
        let mut registry = self.registry.lock();
        if registry.ours().is_empty() {
            match registry.config().logical_address {
                Some(address) => registry.claim_fixed(address),
                None => {
                    if !registry.allocate_logical(link) {
                        link.log(
                            LogLevel::Error,
                            format_args!("could not detect our logical addresses"),
                        );
                        return Err(Error::AddressAllocation);
                    }
                }
            }
        }
        link.set_ack_mask(registry.ours().ack_mask())?;

        let port = registry.config().hdmi_port;
        let address = match registry.config().physical_address {
            Some(address) => address,
            None => registry
                .probe_physical_address(link, port)
                .ok_or(Error::PhysicalAddress(port))?,
        };
        if let Err(e) = registry.set_physical_address(link, address) {
            link.log(
                LogLevel::Warning,
                format_args!("could not announce the active view: {e}"),
            );
        }
        Ok(())
    }

    /// One main loop iteration
    fn step(&self) {
        match self.link.next_command(READ_TIMEOUT) {
            Ok(Some(command)) => self.dispatch(&command),
            Ok(None) => {}
            Err(e) => self
                .link
                .log(LogLevel::Warning, format_args!("could not read: {e}")),
        }
        thread::sleep(LOOP_SLEEP);
        self.link.controller().check_keypress_timeout();
        self.registry
            .lock()
            .poll_vendor_ids(&self.link, Instant::now());
        thread::sleep(LOOP_SLEEP);
    }

    fn dispatch(&self, command: &Command) {
        self.link
            .log(LogLevel::Traffic, format_args!(">> {command}"));
        if self.link.is_monitoring() {
            return;
        }
        let mut registry = self.registry.lock();
        registry
            .device_mut(command.initiator)
            .mark_active(Instant::now());
        CommandHandler::new(command.initiator, &mut registry, &self.link).handle(command);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::controller::NoController;
    use crate::testing::{code, frame_messages, MockTransport, RecordingController};

    fn link(mock: &MockTransport) -> Link {
        Link::new(Box::new(mock.clone()), Box::new(NoController))
    }
    fn give_osd_name() -> Command {
        Command::format(LogicalAddress::Playback1, LogicalAddress::Tv, Opcode::GiveOsdName)
    }
    /// Call `check` until it holds or two seconds passed.
    fn eventually(check: impl Fn() -> bool) -> bool {
        let deadline = Instant::now() + Duration::from_secs(2);
        while Instant::now() < deadline {
            if check() {
                return true;
            }
            thread::sleep(Duration::from_millis(10));
        }
        check()
    }

    #[test]
    fn transmit_waits_for_every_accept() {
        let mock = MockTransport::new(&[LogicalAddress::Tv]);
        let link = link(&mock);
        link.transmit(&give_osd_name()).unwrap();
        assert_eq!(mock.sent(), vec![give_osd_name()]);
    }

    #[test]
    fn missing_accepts_are_no_ack() {
        let mock = MockTransport::new(&[LogicalAddress::Tv]);
        mock.manual_acks();
        // three chunks, only two accepted
        mock.push_inbound(code(MessageCode::CommandAccepted));
        mock.push_inbound(code(MessageCode::CommandAccepted));
        mock.push_inbound(code(MessageCode::TransmitSucceeded));
        let link = link(&mock);
        assert!(matches!(link.transmit(&give_osd_name()), Err(Error::NoAck)));
    }

    #[test]
    fn failed_ack_is_reported() {
        let mock = MockTransport::new(&[]);
        let link = link(&mock);
        assert!(matches!(
            link.transmit(&give_osd_name()),
            Err(Error::AckError(MessageCode::TransmitFailedAck))
        ));
    }

    #[test]
    fn silent_adapter_times_out() {
        let mock = MockTransport::new(&[LogicalAddress::Tv]);
        mock.manual_acks();
        let link = link(&mock);
        let mut command = give_osd_name();
        command.transmit_timeout = Duration::from_millis(50);
        assert!(matches!(link.transmit(&command), Err(Error::NoAck)));
    }

    #[test]
    fn keypresses_go_to_the_host() {
        let host = RecordingController::default();
        let cec = Processor::new(MockTransport::default(), host.clone(), Config::default()).unwrap();
        let key = Keypress {
            keycode: UserControlCode::Select,
            duration: Duration::from_millis(300),
        };
        cec.add_keypress(key);
        assert_eq!(host.events(), vec![crate::controller::HostEvent::Keypress(key)]);
    }

    #[test]
    fn closed_adapter() {
        let mock = MockTransport::new(&[LogicalAddress::Tv]);
        mock.close();
        let link = link(&mock);
        assert!(matches!(link.transmit(&give_osd_name()), Err(Error::NotOpen)));
        assert!(matches!(link.next_command(READ_TIMEOUT), Ok(None)));
    }

    #[test]
    fn frames_during_ack_wait_are_kept_in_order() {
        let mock = MockTransport::new(&[LogicalAddress::Tv]);
        mock.manual_acks();
        let standby = Command::format(LogicalAddress::Tv, LogicalAddress::Broadcast, Opcode::Standby);
        for msg in frame_messages(&standby) {
            mock.push_inbound(msg);
        }
        for _ in 0..3 {
            mock.push_inbound(code(MessageCode::CommandAccepted));
        }
        mock.push_inbound(code(MessageCode::TransmitSucceeded));
        let link = link(&mock);
        link.transmit(&give_osd_name()).unwrap();

        let later = Command::format(LogicalAddress::Tv, LogicalAddress::Playback1, Opcode::GiveOsdName);
        mock.push_frame(&later);
        let mut received = Vec::new();
        for _ in 0..10 {
            if let Some(cmd) = link.next_command(READ_TIMEOUT).unwrap() {
                received.push(cmd.to_string());
            }
        }
        assert_eq!(received, vec!["0f:36", "04:46"]);
    }

    #[test]
    fn start_claims_addresses_and_announces() {
        let mock = MockTransport::new(&[LogicalAddress::Tv]);
        let cec = Processor::new(mock.clone(), NoController, Config::default()).unwrap();
        assert_eq!(cec.lifecycle(), Lifecycle::Created);
        assert!(matches!(cec.set_active_view(), Err(Error::NotRunning)));

        cec.start().unwrap();
        assert!(cec.is_running());
        assert_eq!(cec.logical_addresses().primary(), Some(LogicalAddress::Playback1));
        assert_eq!(cec.physical_address(), Some(0x1000));
        assert_eq!(mock.ack_masks().last(), Some(&0x10));
        let announce = Command::with_parameters(
            LogicalAddress::Playback1,
            LogicalAddress::Broadcast,
            Opcode::ActiveSource,
            &[0x10, 0x00],
        );
        assert!(mock.sent().contains(&announce));

        assert!(matches!(cec.start(), Err(Error::AlreadyStarted)));
        cec.stop();
        assert_eq!(cec.lifecycle(), Lifecycle::Stopped);
        assert!(matches!(cec.start(), Err(Error::AlreadyStarted)));
    }

    #[test]
    fn fixed_addresses_skip_negotiation() {
        let mock = MockTransport::new(&[LogicalAddress::Tv]);
        let config = Config {
            logical_address: Some(LogicalAddress::Playback2),
            physical_address: Some(0x2100),
            ..Config::default()
        };
        let cec = Processor::new(mock.clone(), NoController, config).unwrap();
        cec.start().unwrap();
        assert_eq!(cec.logical_addresses().primary(), Some(LogicalAddress::Playback2));
        assert_eq!(cec.physical_address(), Some(0x2100));
        assert!(!mock.sent().iter().any(Command::is_poll));
        assert_eq!(mock.ack_masks(), vec![0x100]);
    }

    #[test]
    fn start_fails_without_free_address() {
        let mock = MockTransport::new(&[LogicalAddress::AudioSystem]);
        let config = Config {
            device_types: vec![DeviceType::AudioSystem],
            ..Config::default()
        };
        let cec = Processor::new(mock, NoController, config).unwrap();
        assert!(matches!(cec.start(), Err(Error::AddressAllocation)));
        assert_eq!(cec.lifecycle(), Lifecycle::Stopped);
        assert!(!cec.is_running());
    }

    #[test]
    fn start_fails_on_closed_adapter() {
        let mock = MockTransport::default();
        mock.close();
        let cec = Processor::new(mock, NoController, Config::default()).unwrap();
        assert!(matches!(cec.start(), Err(Error::NotOpen)));
        assert_eq!(cec.lifecycle(), Lifecycle::Created);
    }

    #[test]
    fn invalid_port_is_rejected() {
        let config = Config {
            hdmi_port: 0,
            ..Config::default()
        };
        assert!(matches!(
            Processor::new(MockTransport::default(), NoController, config),
            Err(Error::InvalidHdmiPort(0))
        ));
    }

    #[test]
    fn running_processor_handles_commands() {
        let mock = MockTransport::new(&[LogicalAddress::Tv]);
        let host = RecordingController::default();
        let cec = Processor::new(mock.clone(), host.clone(), Config::default()).unwrap();
        cec.start().unwrap();

        let standby = Command::format(LogicalAddress::Tv, LogicalAddress::Broadcast, Opcode::Standby);
        mock.push_frame(&standby);
        let request = Command::format(LogicalAddress::Tv, LogicalAddress::Playback1, Opcode::GiveOsdName);
        mock.push_frame(&request);

        let reply = Command::with_parameters(
            LogicalAddress::Playback1,
            LogicalAddress::Tv,
            Opcode::SetOsdName,
            b"CEC Control",
        );
        assert!(eventually(|| mock.sent().contains(&reply)));
        assert_eq!(cec.device_power_status(LogicalAddress::Tv), PowerStatus::Standby);
        assert!(cec.is_active_device(LogicalAddress::Tv));
        let seen = || -> Vec<String> { host.commands().iter().map(Command::to_string).collect() };
        assert!(eventually(|| seen() == ["0f:36", "04:46"]));
        cec.stop();
    }

    #[test]
    fn monitoring_only_listens() {
        let mock = MockTransport::new(&[LogicalAddress::Tv]);
        let host = RecordingController::default();
        let cec = Processor::new(mock.clone(), host.clone(), Config::default()).unwrap();
        cec.start().unwrap();
        mock.clear_sent();

        cec.switch_monitoring(true).unwrap();
        assert!(cec.is_monitoring());
        assert_eq!(mock.ack_masks(), vec![0]);
        mock.push_frame(&Command::format(
            LogicalAddress::Tv,
            LogicalAddress::Playback1,
            Opcode::GiveOsdName,
        ));
        thread::sleep(Duration::from_millis(200));
        assert!(mock.sent().is_empty());
        assert!(host.commands().is_empty());

        cec.switch_monitoring(false).unwrap();
        assert_eq!(mock.ack_masks(), vec![0, 0x10]);
    }

    #[test]
    fn volume_needs_an_audio_system() {
        let mock = MockTransport::new(&[LogicalAddress::Tv, LogicalAddress::AudioSystem]);
        let cec = Processor::new(mock.clone(), NoController, Config::default()).unwrap();
        assert!(matches!(cec.volume_up(), Err(Error::NotRunning)));
        cec.start().unwrap();
        assert!(matches!(
            cec.volume_up(),
            Err(Error::NoSuchDevice(DeviceType::AudioSystem))
        ));

        assert!(cec.poll_device(LogicalAddress::AudioSystem));
        mock.clear_sent();
        assert_eq!(cec.mute_audio().unwrap(), crate::device::AUDIO_STATUS_UNKNOWN);
        let keys: Vec<_> = mock.sent().iter().map(|c| c.to_string()).collect();
        assert_eq!(keys, vec!["45:44:43", "45:45"]);
    }

    /// What went out with `opcode`, as wire strings.
    fn sent_with(mock: &MockTransport, opcode: Opcode) -> Vec<String> {
        mock.sent()
            .iter()
            .filter(|c| c.raw_opcode() == Some(opcode.into()))
            .map(Command::to_string)
            .collect()
    }

    #[test]
    fn primary_can_move_at_runtime() {
        let mock = MockTransport::new(&[LogicalAddress::Tv]);
        let cec = Processor::new(mock.clone(), NoController, Config::default()).unwrap();
        cec.start().unwrap();
        cec.set_logical_address(LogicalAddress::Playback2).unwrap();
        assert_eq!(cec.logical_addresses().primary(), Some(LogicalAddress::Playback2));
        assert!(cec.logical_addresses().contains(LogicalAddress::Playback1));
        assert_eq!(mock.ack_masks().last(), Some(&0x110));
        assert_eq!(cec.physical_address(), Some(0x1000));
        let active: Vec<_> = cec
            .registry()
            .devices()
            .filter(|d| d.is_active_source())
            .map(|d| d.address())
            .collect();
        assert_eq!(active, vec![LogicalAddress::Playback2]);

        mock.clear_sent();
        mock.push_frame(&Command::format(
            LogicalAddress::Tv,
            LogicalAddress::Broadcast,
            Opcode::RequestActiveSource,
        ));
        assert!(eventually(|| !sent_with(&mock, Opcode::ActiveSource).is_empty()));
        thread::sleep(Duration::from_millis(100));
        assert_eq!(sent_with(&mock, Opcode::ActiveSource), vec!["8f:82:10:00"]);
        cec.stop();
    }

    #[test]
    fn hdmi_port_changes_the_physical_address() {
        let mock = MockTransport::new(&[LogicalAddress::Tv]);
        let cec = Processor::new(mock.clone(), NoController, Config::default()).unwrap();
        assert!(matches!(cec.set_hdmi_port(0), Err(Error::InvalidHdmiPort(0))));
        cec.set_hdmi_port(3).unwrap();
        assert!(mock.sent().is_empty());

        cec.start().unwrap();
        assert_eq!(cec.physical_address(), Some(0x3000));
        mock.clear_sent();
        cec.set_hdmi_port(2).unwrap();
        assert_eq!(cec.physical_address(), Some(0x2000));
        assert!(sent_with(&mock, Opcode::ActiveSource).contains(&"4f:82:20:00".to_string()));
        cec.stop();
    }

    #[test]
    fn menu_state_update_is_optional() {
        let mock = MockTransport::new(&[LogicalAddress::Tv]);
        let cec = Processor::new(mock.clone(), NoController, Config::default()).unwrap();
        assert!(matches!(
            cec.set_menu_state(MenuState::Activated, true),
            Err(Error::NotRunning)
        ));
        cec.start().unwrap();
        mock.clear_sent();

        cec.set_menu_state(MenuState::Deactivated, false).unwrap();
        assert_eq!(
            cec.registry().device(LogicalAddress::Playback1).menu_state(),
            MenuState::Deactivated
        );
        assert!(sent_with(&mock, Opcode::MenuStatus).is_empty());

        cec.set_menu_state(MenuState::Activated, true).unwrap();
        assert_eq!(sent_with(&mock, Opcode::MenuStatus), vec!["40:8e:00"]);
        cec.stop();
    }

    #[test]
    fn deck_state_updates() {
        let mock = MockTransport::new(&[LogicalAddress::Tv]);
        let cec = Processor::new(mock.clone(), NoController, Config::default()).unwrap();
        cec.start().unwrap();
        mock.clear_sent();

        cec.set_deck_control_mode(DeckControlMode::Eject, false).unwrap();
        cec.set_deck_info(DeckInfo::Play, true).unwrap();
        let deck = cec
            .registry()
            .device(LogicalAddress::Playback1)
            .role()
            .deck()
            .copied();
        assert_eq!(deck.map(|d| d.control_mode), Some(DeckControlMode::Eject));
        assert_eq!(deck.map(|d| d.info), Some(DeckInfo::Play));
        assert_eq!(sent_with(&mock, Opcode::DeckStatus), vec!["40:1b:11"]);
        cec.stop();

        let config = Config {
            device_types: vec![DeviceType::Tuner],
            ..Config::default()
        };
        let tuner = Processor::new(MockTransport::new(&[LogicalAddress::Tv]), NoController, config)
            .unwrap();
        tuner.start().unwrap();
        assert!(matches!(
            tuner.set_deck_info(DeckInfo::Play, false),
            Err(Error::NoSuchDevice(DeviceType::Playback))
        ));
        tuner.stop();
    }

    #[test]
    fn abort_and_inactive_view_come_from_the_primary() {
        let mock = MockTransport::new(&[LogicalAddress::Tv]);
        let cec = Processor::new(mock.clone(), NoController, Config::default()).unwrap();
        assert!(matches!(
            cec.transmit_abort(LogicalAddress::Tv, Opcode::GiveDeckStatus, AbortReason::Refused),
            Err(Error::NotRunning)
        ));
        assert!(matches!(cec.set_inactive_view(), Err(Error::NotRunning)));
        cec.start().unwrap();
        mock.clear_sent();

        cec.transmit_abort(LogicalAddress::Tv, Opcode::GiveDeckStatus, AbortReason::Refused)
            .unwrap();
        assert_eq!(sent_with(&mock, Opcode::FeatureAbort), vec!["40:00:1a:04"]);
        cec.set_inactive_view().unwrap();
        assert_eq!(sent_with(&mock, Opcode::InactiveSource), vec!["40:9d:10:00"]);
        cec.stop();
    }
}
