/*!
 * Claim a playback address, become the active source and switch the TV back off
 */
use std::{thread::sleep, time::Duration};

use cec_control::*;
use tracing_subscriber::EnvFilter;

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let config = Config {
        device_name: "pi4".to_string(),
        device_types: vec![DeviceType::Playback],
        cec_version: Version::V1_4,
        ..Config::default()
    };
    let cec = Processor::new(SerialAdapter::open("/dev/ttyACM0")?, NoController, config)?;
    cec.start()?;
    println!(
        "we are {:?} at {:04x}",
        cec.logical_addresses().primary(),
        cec.physical_address().unwrap_or(PHYSICAL_ADDRESS_UNKNOWN)
    );

    // wake the TV and switch to our input
    cec.transmit(&Command::format(
        cec.logical_addresses().primary().unwrap_or(LogicalAddress::Broadcast),
        LogicalAddress::Tv,
        Opcode::ImageViewOn,
    ))?;
    cec.set_active_source(None)?;

    sleep(Duration::from_secs(10));

    if cec.poll_device(LogicalAddress::AudioSystem) {
        let volume = cec.volume_up()?;
        println!("volume {}%", volume & 0x7f);
    }
    println!("TV: {:?} {:?}", cec.device_osd_name(LogicalAddress::Tv), cec.device_power_status(LogicalAddress::Tv));

    sleep(Duration::from_secs(10));

    cec.set_inactive_view()?;
    cec.transmit(&Command::format(
        cec.logical_addresses().primary().unwrap_or(LogicalAddress::Broadcast),
        LogicalAddress::Tv,
        Opcode::Standby,
    ))?;
    cec.stop();
    Ok(())
}
