#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::types::{DeviceType, LogicalAddress, PhysicalAddress, VendorId, Version};

/// at most this many device types are taken from [Config::device_types]
pub const MAX_DEVICE_TYPES: usize = 5;

/**
 * What the processor should present itself as.
 * ```
 * # use cec_control::{Config, DeviceType};
 * let config = Config {
 *     device_name: "Kodi".to_string(),
 *     device_types: vec![DeviceType::Recording],
 *     hdmi_port: 2,
 *     ..Default::default()
 * };
 * assert!(config.validate().is_ok());
 * ```
 */
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize), serde(default))]
pub struct Config {
    /// OSD name of the primary device. Only 14 bytes are used.
    pub device_name: String,
    /// requested roles, in the order addresses are claimed
    pub device_types: Vec<DeviceType>,
    /// skip negotiation and use this address
    pub logical_address: Option<LogicalAddress>,
    /// skip probing the HDMI port and use this address
    pub physical_address: Option<PhysicalAddress>,
    /// HDMI input of the device we are connected to, 1-9
    pub hdmi_port: u8,
    pub cec_version: Version,
    pub vendor_id: VendorId,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            device_name: "CEC Control".to_string(),
            device_types: vec![DeviceType::Playback],
            logical_address: None,
            physical_address: None,
            hdmi_port: 1,
            cec_version: Version::V1_3A,
            vendor_id: VendorId::UNKNOWN,
        }
    }
}

impl Config {
    pub fn validate(&self) -> Result<()> {
        check_hdmi_port(self.hdmi_port)
    }
    /// the requested roles that count
    pub fn device_types(&self) -> &[DeviceType] {
        let len = self.device_types.len().min(MAX_DEVICE_TYPES);
        &self.device_types[..len]
    }
}

pub(crate) fn check_hdmi_port(port: u8) -> Result<()> {
    if (1..=9).contains(&port) {
        Ok(())
    } else {
        Err(Error::InvalidHdmiPort(port))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ports_out_of_range() {
        for port in [0, 10, 0xff] {
            let config = Config {
                hdmi_port: port,
                ..Default::default()
            };
            assert!(matches!(config.validate(), Err(Error::InvalidHdmiPort(p)) if p == port));
        }
        assert!(Config::default().validate().is_ok());
    }

    #[test]
    fn device_types_are_capped() {
        let config = Config {
            device_types: vec![DeviceType::Playback; 7],
            ..Default::default()
        };
        assert_eq!(config.device_types().len(), MAX_DEVICE_TYPES);
    }
}
