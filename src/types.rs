//https://www.avsforum.com/attachments/hdmi-cec-v1-3a-specifications-pdf.2579760/

use bitflags::bitflags;
use num_enum::{FromPrimitive, IntoPrimitive, TryFromPrimitive};
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/**
 * The logical addresses defined by CEC 1.3a.
 *
 * Every address 0-14 names a role slot on the bus. 15 is the broadcast
 * pseudo-address when used as destination (and "unregistered" as initiator).
 */
#[derive(Debug, Eq, PartialEq, Hash, FromPrimitive, IntoPrimitive, Clone, Copy, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[repr(u8)]
pub enum LogicalAddress {
    Tv = 0,
    Recording1 = 1,
    Recording2 = 2,
    Tuner1 = 3,
    Playback1 = 4,
    AudioSystem = 5,
    Tuner2 = 6,
    Tuner3 = 7,
    Playback2 = 8,
    Recording3 = 9,
    Tuner4 = 10,
    Playback3 = 11,
    Reserved1 = 12,
    Reserved2 = 13,
    FreeUse = 14,
    /// as destination: everyone. as initiator: unregistered
    #[num_enum(default)]
    Broadcast = 15,
}

impl LogicalAddress {
    /// All sixteen addresses in slot order.
    pub const ALL: [LogicalAddress; 16] = [
        Self::Tv,
        Self::Recording1,
        Self::Recording2,
        Self::Tuner1,
        Self::Playback1,
        Self::AudioSystem,
        Self::Tuner2,
        Self::Tuner3,
        Self::Playback2,
        Self::Recording3,
        Self::Tuner4,
        Self::Playback3,
        Self::Reserved1,
        Self::Reserved2,
        Self::FreeUse,
        Self::Broadcast,
    ];

    /// Address from the low 4 bits of `nibble`. Every value has a variant.
    #[inline]
    pub fn from_nibble(nibble: u8) -> Self {
        Self::from(nibble & 0xf)
    }
    #[inline]
    pub fn index(self) -> usize {
        u8::from(self) as usize
    }
    /// The device type that owns this slot.
    pub fn device_type(self) -> DeviceType {
        match self {
            Self::Tv => DeviceType::Tv,
            Self::Recording1 | Self::Recording2 | Self::Recording3 => DeviceType::Recording,
            Self::Tuner1 | Self::Tuner2 | Self::Tuner3 | Self::Tuner4 => DeviceType::Tuner,
            Self::Playback1 | Self::Playback2 | Self::Playback3 => DeviceType::Playback,
            Self::AudioSystem => DeviceType::AudioSystem,
            _ => DeviceType::Reserved,
        }
    }
    /// Human readable name, used in log lines.
    pub fn name(self) -> &'static str {
        match self {
            Self::Tv => "TV",
            Self::Recording1 => "Recorder 1",
            Self::Recording2 => "Recorder 2",
            Self::Tuner1 => "Tuner 1",
            Self::Playback1 => "Playback 1",
            Self::AudioSystem => "Audio",
            Self::Tuner2 => "Tuner 2",
            Self::Tuner3 => "Tuner 3",
            Self::Playback2 => "Playback 2",
            Self::Recording3 => "Recorder 3",
            Self::Tuner4 => "Tuner 4",
            Self::Playback3 => "Playback 3",
            Self::Reserved1 => "Reserved 1",
            Self::Reserved2 => "Reserved 2",
            Self::FreeUse => "Free use",
            Self::Broadcast => "Broadcast",
        }
    }
}

bitflags! {
    /// Membership bitmask over [LogicalAddress]. Bit `n` is address `n`.
    ///
    /// This is also the ack mask handed to the adapter.
    #[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct LogicalAddressMask: u16 {
        const Tv            = (1 << 0);
        const Recording1    = (1 << 1);
        const Recording2    = (1 << 2);
        const Recording3    = (1 << 9);
        const Tuner1        = (1 << 3);
        const Tuner2        = (1 << 6);
        const Tuner3        = (1 << 7);
        const Tuner4        = (1 << 10);
        const Playback1     = (1 << 4);
        const Playback2     = (1 << 8);
        const Playback3     = (1 << 11);
        const AudioSystem   = (1 << 5);
        const Reserved1     = (1 << 12);
        const Reserved2     = (1 << 13);
        const FreeUse       = (1 << 14);
        const Broadcast     = (1 << 15);
    }
}
impl LogicalAddressMask {
    #[inline]
    pub fn of(address: LogicalAddress) -> Self {
        Self::from_bits_retain(1 << u8::from(address))
    }
    #[inline]
    pub fn has(&self, address: LogicalAddress) -> bool {
        self.contains(Self::of(address))
    }
}

/// The logical addresses claimed by this instance, plus the primary one.
///
/// The primary address, if set, is always a member of the set.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct LogicalAddresses {
    primary: Option<LogicalAddress>,
    mask: LogicalAddressMask,
}

impl LogicalAddresses {
    pub fn new() -> Self {
        Self::default()
    }
    pub fn clear(&mut self) {
        *self = Self::default();
    }
    /// Add `address`. The first address added becomes primary.
    pub fn set(&mut self, address: LogicalAddress) {
        if self.primary.is_none() {
            self.primary = Some(address);
        }
        self.mask |= LogicalAddressMask::of(address);
    }
    /// Make `address` the primary address, adding it if needed.
    pub fn set_primary(&mut self, address: LogicalAddress) {
        self.primary = Some(address);
        self.mask |= LogicalAddressMask::of(address);
    }
    pub fn unset(&mut self, address: LogicalAddress) {
        self.mask.remove(LogicalAddressMask::of(address));
        if self.primary == Some(address) {
            let next = self.iter().next();
            self.primary = next;
        }
    }
    #[inline]
    pub fn primary(&self) -> Option<LogicalAddress> {
        self.primary
    }
    #[inline]
    pub fn contains(&self, address: LogicalAddress) -> bool {
        self.mask.has(address)
    }
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.mask.is_empty()
    }
    #[inline]
    pub fn mask(&self) -> LogicalAddressMask {
        self.mask
    }
    /// The mask the adapter should acknowledge for.
    #[inline]
    pub fn ack_mask(&self) -> u16 {
        self.mask.bits()
    }
    /// Members in slot order.
    pub fn iter(&self) -> impl Iterator<Item = LogicalAddress> + '_ {
        LogicalAddress::ALL
            .into_iter()
            .filter(move |a| self.mask.has(*a))
    }
}

/// 16 bit HDMI topology path `a.b.c.d`, one nibble per level. The root (TV) is `0x0000`.
pub type PhysicalAddress = u16;
/// nothing connected / not known yet
pub const PHYSICAL_ADDRESS_UNKNOWN: PhysicalAddress = 0xffff;

/// Primary Device Type Operand (prim_devtype)
#[derive(Debug, Eq, PartialEq, Hash, TryFromPrimitive, IntoPrimitive, Copy, Clone)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[repr(u8)]
pub enum DeviceType {
    Tv = 0,
    Recording = 1,
    Reserved = 2,
    Tuner = 3,
    Playback = 4,
    AudioSystem = 5,
}
impl DeviceType {
    /// The addresses a device of this type may claim, in the order they are tried.
    pub fn candidates(self) -> &'static [LogicalAddress] {
        use LogicalAddress::*;
        match self {
            DeviceType::Tv => &[Tv],
            DeviceType::Recording => &[Recording1, Recording2, Recording3],
            DeviceType::Tuner => &[Tuner1, Tuner2, Tuner3, Tuner4],
            DeviceType::Playback => &[Playback1, Playback2, Playback3],
            DeviceType::AudioSystem => &[AudioSystem],
            DeviceType::Reserved => &[],
        }
    }
}

/// CEC Version Operand for [Opcode::CecVersion]
#[derive(Debug, Eq, PartialEq, TryFromPrimitive, IntoPrimitive, Copy, Clone)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[repr(u8)]
pub enum Version {
    Unknown = 0,
    V1_2 = 1,
    V1_2A = 2,
    V1_3 = 3,
    V1_3A = 4,
    V1_4 = 5,
    V2_0 = 6,
}

#[derive(Debug, Eq, PartialEq, TryFromPrimitive, IntoPrimitive, Clone, Copy)]
#[repr(u8)]
pub enum Opcode {
    /* One Touch Play Feature */
    /// A source announces it is streaming.
    /// __Parameters:__ 2byte - physical address of active source
    ActiveSource = 0x82,
    /// Sent by a source to the TV when it enters the active state.
    ImageViewOn = 0x04,
    /// As [Opcode::ImageViewOn], but also removes menus from the TV's display.
    TextViewOn = 0x0d,

    /* Routing Control Feature */
    /// __Parameters:__ 2byte - physical address of active source
    InactiveSource = 0x9d,
    RequestActiveSource = 0x85,
    /// __Parameters:__
    /// - 2byte - old physical address
    /// - 2byte - new physical address
    RoutingChange = 0x80,
    /// __Parameters:__ 2byte - physical address
    RoutingInformation = 0x81,
    /// __Parameters:__ 2byte - physical address
    SetStreamPath = 0x86,

    /* Standby Feature */
    Standby = 0x36,

    /* One Touch Record Feature */
    RecordOff = 0x0b,
    RecordOn = 0x09,
    RecordStatus = 0x0a,
    RecordTvScreen = 0x0f,

    /* Timer Programming Feature */
    ClearAnalogueTimer = 0x33,
    ClearDigitalTimer = 0x99,
    ClearExtTimer = 0xa1,
    SetAnalogueTimer = 0x34,
    SetDigitalTimer = 0x97,
    SetExtTimer = 0xa2,
    SetTimerProgramTitle = 0x67,
    TimerClearedStatus = 0x43,
    TimerStatus = 0x35,

    /* System Information Feature */
    /// __Parameters:__ [Version]
    CecVersion = 0x9e,
    GetCecVersion = 0x9f,
    GivePhysicalAddr = 0x83,
    GetMenuLanguage = 0x91,
    /// __Parameters:__
    /// - 2b physical address
    /// - 1b [DeviceType]
    ReportPhysicalAddr = 0x84,
    /// __Parameters:__ 3 byte ISO 639-2 language code
    SetMenuLanguage = 0x32,

    /* Deck Control Feature */
    /// __Parameters:__ [DeckControlMode]
    DeckControl = 0x42,
    /// __Parameters:__ [DeckInfo]
    DeckStatus = 0x1b,
    GiveDeckStatus = 0x1a,
    Play = 0x41,

    /* Tuner Control Feature */
    GiveTunerDeviceStatus = 0x08,
    SelectAnalogueService = 0x92,
    SelectDigitalService = 0x93,
    TunerDeviceStatus = 0x07,
    TunerStepDecrement = 0x06,
    TunerStepIncrement = 0x05,

    /* Vendor Specific Commands Feature */
    /// __Parameters:__ 3 byte vendor id
    DeviceVendorId = 0x87,
    GiveDeviceVendorId = 0x8c,
    VendorCommand = 0x89,
    /// __Parameters:__
    /// - 3 byte vendor id
    /// - vendor specific
    VendorCommandWithId = 0xa0,
    VendorRemoteButtonDown = 0x8a,
    VendorRemoteButtonUp = 0x8b,

    /* OSD Display Feature */
    SetOsdString = 0x64,
    /* Device OSD Transfer Feature */
    GiveOsdName = 0x46,
    /// __Parameters:__ up to 14 byte name, not terminated
    SetOsdName = 0x47,

    /* Device Menu Control Feature */
    /// __Parameters:__ [MenuRequestType]
    MenuRequest = 0x8d,
    /// __Parameters:__ [MenuState]
    MenuStatus = 0x8e,
    /// __Parameters:__ [UserControlCode]
    UserControlPressed = 0x44,
    UserControlReleased = 0x45,

    /* Power Status Feature */
    GiveDevicePowerStatus = 0x8f,
    /// __Parameters:__ [PowerStatus]
    ReportPowerStatus = 0x90,

    /* General Protocol Messages */
    /// __Parameters:__
    /// - [Opcode] that was refused
    /// - [AbortReason]
    FeatureAbort = 0x00,
    Abort = 0xff,

    /* System Audio Control Feature */
    GiveAudioStatus = 0x71,
    GiveSystemAudioModeStatus = 0x7d,
    /// __Parameters:__ 1 byte, bit 7 mute, bits 0-6 volume in percent
    ReportAudioStatus = 0x7a,
    /// __Parameters:__ [SystemAudioStatus]
    SetSystemAudioMode = 0x72,
    /// __Parameters:__ 2b physical address of the audio source, or nothing to end system audio mode
    SystemAudioModeRequest = 0x70,
    /// __Parameters:__ [SystemAudioStatus]
    SystemAudioModeStatus = 0x7e,

    /* Audio Rate Control Feature */
    SetAudioRate = 0x9a,
}
impl Opcode {
    pub fn name(self) -> &'static str {
        match self {
            Self::ActiveSource => "active source",
            Self::ImageViewOn => "image view on",
            Self::TextViewOn => "text view on",
            Self::InactiveSource => "inactive source",
            Self::RequestActiveSource => "request active source",
            Self::RoutingChange => "routing change",
            Self::RoutingInformation => "routing information",
            Self::SetStreamPath => "set stream path",
            Self::Standby => "standby",
            Self::RecordOff => "record off",
            Self::RecordOn => "record on",
            Self::RecordStatus => "record status",
            Self::RecordTvScreen => "record tv screen",
            Self::ClearAnalogueTimer => "clear analogue timer",
            Self::ClearDigitalTimer => "clear digital timer",
            Self::ClearExtTimer => "clear external timer",
            Self::SetAnalogueTimer => "set analogue timer",
            Self::SetDigitalTimer => "set digital timer",
            Self::SetExtTimer => "set external timer",
            Self::SetTimerProgramTitle => "set timer program title",
            Self::TimerClearedStatus => "timer cleared status",
            Self::TimerStatus => "timer status",
            Self::CecVersion => "cec version",
            Self::GetCecVersion => "get cec version",
            Self::GivePhysicalAddr => "give physical address",
            Self::GetMenuLanguage => "get menu language",
            Self::ReportPhysicalAddr => "report physical address",
            Self::SetMenuLanguage => "set menu language",
            Self::DeckControl => "deck control",
            Self::DeckStatus => "deck status",
            Self::GiveDeckStatus => "give deck status",
            Self::Play => "play",
            Self::GiveTunerDeviceStatus => "give tuner status",
            Self::SelectAnalogueService => "select analogue service",
            Self::SelectDigitalService => "select digital service",
            Self::TunerDeviceStatus => "tuner device status",
            Self::TunerStepDecrement => "tuner step decrement",
            Self::TunerStepIncrement => "tuner step increment",
            Self::DeviceVendorId => "device vendor id",
            Self::GiveDeviceVendorId => "give device vendor id",
            Self::VendorCommand => "vendor command",
            Self::VendorCommandWithId => "vendor command with id",
            Self::VendorRemoteButtonDown => "vendor remote button down",
            Self::VendorRemoteButtonUp => "vendor remote button up",
            Self::SetOsdString => "set osd string",
            Self::GiveOsdName => "give osd name",
            Self::SetOsdName => "set osd name",
            Self::MenuRequest => "menu request",
            Self::MenuStatus => "menu status",
            Self::UserControlPressed => "user control pressed",
            Self::UserControlReleased => "user control release",
            Self::GiveDevicePowerStatus => "give device power status",
            Self::ReportPowerStatus => "report power status",
            Self::FeatureAbort => "feature abort",
            Self::Abort => "abort",
            Self::GiveAudioStatus => "give audio status",
            Self::GiveSystemAudioModeStatus => "give audio mode status",
            Self::ReportAudioStatus => "report audio status",
            Self::SetSystemAudioMode => "set system audio mode",
            Self::SystemAudioModeRequest => "system audio mode request",
            Self::SystemAudioModeStatus => "system audio mode status",
            Self::SetAudioRate => "set audio rate",
        }
    }
}

#[derive(Debug, Eq, PartialEq, TryFromPrimitive, IntoPrimitive, Clone, Copy)]
#[repr(u8)]
pub enum UserControlCode {
    Select = 0x00,
    Up = 0x01,
    Down = 0x02,
    Left = 0x03,
    Right = 0x04,
    RightUp = 0x05,
    RightDown = 0x06,
    LeftUp = 0x07,
    LeftDown = 0x08,
    RootMenu = 0x09,
    SetupMenu = 0x0a,
    ContentsMenu = 0x0b,
    FavoriteMenu = 0x0c,
    Exit = 0x0d,
    // reserved: 0x0E ... 0x1F
    Number0 = 0x20,
    Number1 = 0x21,
    Number2 = 0x22,
    Number3 = 0x23,
    Number4 = 0x24,
    Number5 = 0x25,
    Number6 = 0x26,
    Number7 = 0x27,
    Number8 = 0x28,
    Number9 = 0x29,
    Dot = 0x2a,
    Enter = 0x2b,
    Clear = 0x2c,
    NextFavorite = 0x2f,
    ChannelUp = 0x30,
    ChannelDown = 0x31,
    PreviousChannel = 0x32,
    SoundSelect = 0x33,
    InputSelect = 0x34,
    DisplayInformation = 0x35,
    Help = 0x36,
    PageUp = 0x37,
    PageDown = 0x38,
    // reserved: 0x39 ... 0x3F
    Power = 0x40,
    VolumeUp = 0x41,
    VolumeDown = 0x42,
    Mute = 0x43,
    Play = 0x44,
    Stop = 0x45,
    Pause = 0x46,
    Record = 0x47,
    Rewind = 0x48,
    FastForward = 0x49,
    Eject = 0x4a,
    Forward = 0x4b,
    Backward = 0x4c,
    StopRecord = 0x4d,
    PauseRecord = 0x4e,
    // reserved: 0x4F
    Angle = 0x50,
    SubPicture = 0x51,
    VideoOnDemand = 0x52,
    ElectronicProgramGuide = 0x53,
    TimerProgramming = 0x54,
    InitialConfiguration = 0x55,
    // reserved: 0x56 ... 0x5F
    PlayFunction = 0x60,
    PausePlayFunction = 0x61,
    RecordFunction = 0x62,
    PauseRecordFunction = 0x63,
    StopFunction = 0x64,
    MuteFunction = 0x65,
    RestoreVolumeFunction = 0x66,
    TuneFunction = 0x67,
    SelectMediaFunction = 0x68,
    SelectAvInputFunction = 0x69,
    SelectAudioInputFunction = 0x6a,
    PowerToggleFunction = 0x6b,
    PowerOffFunction = 0x6c,
    PowerOnFunction = 0x6d,
    // reserved: 0x6E ... 0x70
    F1Blue = 0x71,
    F2Red = 0x72,
    F3Green = 0x73,
    F4Yellow = 0x74,
    F5 = 0x75,
    Data = 0x76,
    // reserved: 0x77 ... 0xFF
}
impl UserControlCode {
    /// highest code with a meaning
    pub const MAX: u8 = 0x76;

    /// Codes that switch the receiving device on.
    #[inline]
    pub fn is_power_on(self) -> bool {
        matches!(self, Self::Power | Self::PowerOnFunction)
    }
}

#[derive(Debug, Eq, PartialEq, TryFromPrimitive, IntoPrimitive, Clone, Copy)]
#[repr(u8)]
pub enum AbortReason {
    Unrecognized = 0,
    WrongMode = 1,
    NoSource = 2,
    InvalidOp = 3,
    Refused = 4,
    Other = 5,
}

#[derive(Debug, Eq, PartialEq, TryFromPrimitive, IntoPrimitive, Clone, Copy)]
#[repr(u8)]
pub enum DeckControlMode {
    SkipForwardWind = 1,
    SkipReverseRewind = 2,
    Stop = 3,
    Eject = 4,
}

#[derive(Debug, Eq, PartialEq, TryFromPrimitive, IntoPrimitive, Clone, Copy)]
#[repr(u8)]
pub enum DeckInfo {
    Play = 0x11,
    Record = 0x12,
    PlayRev = 0x13,
    Still = 0x14,
    Slow = 0x15,
    SlowRev = 0x16,
    FastFwd = 0x17,
    FastRev = 0x18,
    NoMedia = 0x19,
    Stop = 0x1a,
    SkipFwd = 0x1b,
    SkipRev = 0x1c,
    IndexSearchFwd = 0x1d,
    IndexSearchRev = 0x1e,
    Other = 0x1f,
}

#[derive(Debug, Eq, PartialEq, TryFromPrimitive, IntoPrimitive, Clone, Copy)]
#[repr(u8)]
pub enum MenuRequestType {
    Activate = 0x00,
    Deactivate = 0x01,
    Query = 0x02,
}

#[derive(Debug, Eq, PartialEq, TryFromPrimitive, IntoPrimitive, Clone, Copy)]
#[repr(u8)]
pub enum MenuState {
    Activated = 0x00,
    Deactivated = 0x01,
}

// ---  Power Status Operand (pwr_state)  ---
#[derive(Debug, Eq, PartialEq, TryFromPrimitive, IntoPrimitive, Clone, Copy)]
#[repr(u8)]
pub enum PowerStatus {
    On = 0,
    Standby = 1,
    InTransitionStandbyToOn = 2,
    InTransitionOnToStandby = 3,
    /// never reported by a device, we just don't know yet
    Unknown = 0x99,
}

#[derive(Debug, Eq, PartialEq, TryFromPrimitive, IntoPrimitive, Clone, Copy)]
#[repr(u8)]
pub enum SystemAudioStatus {
    Off = 0,
    On = 1,
}

/// What we know about the presence of a device on the bus.
#[derive(Debug, Eq, PartialEq, Clone, Copy, Default)]
pub enum DeviceStatus {
    #[default]
    Unknown,
    Present,
    NotPresent,
    /// one of our own logical addresses
    HandledByThisLibrary,
}

/// 24 bit IEEE OUI of a device vendor.
#[derive(Debug, Default, Eq, PartialEq, Hash, Clone, Copy)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[repr(transparent)]
pub struct VendorId(pub u32);
impl VendorId {
    pub const UNKNOWN: VendorId = VendorId(0);
    pub const SAMSUNG: VendorId = VendorId(0x00f0);
    pub const LG: VendorId = VendorId(0xe091);
    pub const PANASONIC: VendorId = VendorId(0x8045);
    pub const PIONEER: VendorId = VendorId(0xe036);
    pub const ONKYO: VendorId = VendorId(0x09b0);

    /// big endian wire form
    pub fn to_bytes(self) -> [u8; 3] {
        let [_, a, b, c] = self.0.to_be_bytes();
        [a, b, c]
    }
    /// parse the first three bytes of `value`
    pub fn from_bytes(value: &[u8]) -> Option<Self> {
        match value {
            [a, b, c, ..] => Some(Self(u32::from_be_bytes([0, *a, *b, *c]))),
            _ => None,
        }
    }
    pub fn is_unknown(self) -> bool {
        self == Self::UNKNOWN
    }
}

/**
 * Fixed length text as used by the OSD name and menu language operands.
 *
 * Shorter text is NUL padded. Text of exactly `MAX` bytes has no terminator.
 * ```
 * # use cec_control::OsdName;
 * let name = OsdName::from("pi4");
 * assert_eq!(name.as_ref(), "pi4");
 * assert_eq!(name.as_bytes(), b"pi4");
 * ```
 */
#[derive(Clone, PartialEq, Eq)]
pub struct OsdStr<const MAX: usize>([u8; MAX]);

/// OSD name of a device
pub type OsdName = OsdStr<14>;
/// ISO 639-2 code, `???` while unknown
pub type MenuLanguage = OsdStr<3>;

impl<const MAX: usize> OsdStr<MAX> {
    /// bytes up to (not including) the first NUL
    pub fn as_bytes(&self) -> &[u8] {
        let len = self.0.iter().position(|b| *b == 0).unwrap_or(MAX);
        &self.0[..len]
    }
    pub fn is_empty(&self) -> bool {
        self.0[0] == 0
    }
}

impl MenuLanguage {
    pub fn unknown() -> Self {
        Self(*b"???")
    }
    pub fn is_unknown(&self) -> bool {
        self.0 == *b"???"
    }
}

// from Command parameters to OsdStr
impl<const MAX: usize> From<&[u8]> for OsdStr<MAX> {
    fn from(value: &[u8]) -> Self {
        let mut osd = OsdStr::default();
        let len = MAX.min(value.len());
        osd.0[..len].copy_from_slice(&value[..len]);
        osd
    }
}

impl<const MAX: usize> From<&str> for OsdStr<MAX> {
    fn from(value: &str) -> Self {
        value.as_bytes().into()
    }
}

// from OsdStr to &str
impl<const MAX: usize> AsRef<str> for OsdStr<MAX> {
    fn as_ref(&self) -> &str {
        std::str::from_utf8(self.as_bytes()).unwrap_or_default()
    }
}
impl<const MAX: usize> std::fmt::Display for OsdStr<MAX> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_ref())
    }
}
impl<const MAX: usize> std::fmt::Debug for OsdStr<MAX> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_ref())
    }
}

impl<const MAX: usize> Default for OsdStr<MAX> {
    fn default() -> Self {
        Self([0; MAX])
    }
}
