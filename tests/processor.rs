use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::thread::sleep;
use std::time::{Duration, Instant};

use cec_control::*;

/// A bus with a TV at 0.0.0.0 that answers the usual questions.
#[derive(Clone, Default)]
struct Tv {
    inbound: Arc<Mutex<VecDeque<AdapterMessage>>>,
    sent: Arc<Mutex<Vec<Command>>>,
}

impl Tv {
    fn frame(&self, command: &Command) {
        let mut bytes: Vec<u8> = command.raw_opcode().into_iter().collect();
        bytes.extend_from_slice(command.parameters());
        let mut inbound = self.inbound.lock().unwrap();
        inbound.push_back(AdapterMessage::with_code(
            MessageCode::FrameStart,
            bytes.is_empty(),
            true,
            &[command.header()],
        ));
        for (i, b) in bytes.iter().enumerate() {
            inbound.push_back(AdapterMessage::with_code(
                MessageCode::FrameData,
                i + 1 == bytes.len(),
                true,
                &[*b],
            ));
        }
    }
    fn sent(&self) -> Vec<String> {
        self.sent.lock().unwrap().iter().map(|c| c.to_string()).collect()
    }
    fn wait_for(&self, wire: &str) -> bool {
        let deadline = Instant::now() + Duration::from_secs(2);
        while Instant::now() < deadline {
            if self.sent().iter().any(|s| s == wire) {
                return true;
            }
            sleep(Duration::from_millis(10));
        }
        false
    }
}

impl AdapterTransport for Tv {
    fn is_open(&self) -> bool {
        true
    }
    fn write(&self, message: &OutboundMessage) -> Result<SendConfirmation> {
        let Some(command) = message.command() else {
            return Ok(SendConfirmation::done(MessageState::Sent));
        };
        self.sent.lock().unwrap().push(command.clone());
        let mut inbound = self.inbound.lock().unwrap();
        let acked = command.is_broadcast() || command.destination == LogicalAddress::Tv;
        if acked {
            for _ in 0..message.expected_accepts() {
                inbound.push_back(AdapterMessage::with_code(
                    MessageCode::CommandAccepted,
                    false,
                    false,
                    &[],
                ));
            }
        }
        let result = if acked {
            MessageCode::TransmitSucceeded
        } else {
            MessageCode::TransmitFailedAck
        };
        inbound.push_back(AdapterMessage::with_code(result, false, false, &[]));
        Ok(SendConfirmation::done(MessageState::Sent))
    }
    fn read(&self, timeout: Duration) -> Result<Option<AdapterMessage>> {
        if let Some(msg) = self.inbound.lock().unwrap().pop_front() {
            return Ok(Some(msg));
        }
        sleep(timeout.min(Duration::from_millis(5)));
        Ok(None)
    }
}

fn start(config: Config) -> (Tv, Processor) {
    let tv = Tv::default();
    let cec = Processor::new(tv.clone(), NoController, config).unwrap();
    cec.start().unwrap();
    (tv, cec)
}

#[test]
fn playback_device_joins_the_bus() {
    let (tv, cec) = start(Config {
        device_name: "pi4".to_string(),
        ..Config::default()
    });
    assert_eq!(cec.logical_addresses().primary(), Some(LogicalAddress::Playback1));
    assert_eq!(cec.physical_address(), Some(0x1000));
    // poll for our own address, then the active source announcement
    assert_eq!(tv.sent(), ["44", "4f:82:10:00"]);

    tv.frame(&Command::format(
        LogicalAddress::Tv,
        LogicalAddress::Playback1,
        Opcode::GiveOsdName,
    ));
    assert!(tv.wait_for("40:47:70:69:34"));

    tv.frame(&Command::format(
        LogicalAddress::Tv,
        LogicalAddress::Playback1,
        Opcode::GivePhysicalAddr,
    ));
    assert!(tv.wait_for("4f:84:10:00:04"));
}

#[test]
fn tv_takes_over_and_gives_back() {
    let (tv, cec) = start(Config::default());
    let announcements = |tv: &Tv| tv.sent().iter().filter(|s| *s == "4f:82:10:00").count();
    assert_eq!(announcements(&tv), 1);

    // the TV switches to its own tuner, so we must not answer
    tv.frame(&Command::with_parameters(
        LogicalAddress::Tv,
        LogicalAddress::Broadcast,
        Opcode::ActiveSource,
        &[0x00, 0x00],
    ));
    tv.frame(&Command::format(
        LogicalAddress::Tv,
        LogicalAddress::Broadcast,
        Opcode::RequestActiveSource,
    ));
    tv.frame(&Command::format(
        LogicalAddress::Tv,
        LogicalAddress::Playback1,
        Opcode::GiveDevicePowerStatus,
    ));
    assert!(tv.wait_for("40:90:00"));
    assert_eq!(announcements(&tv), 1);

    // back to our input
    tv.frame(&Command::with_parameters(
        LogicalAddress::Tv,
        LogicalAddress::Broadcast,
        Opcode::SetStreamPath,
        &[0x10, 0x00],
    ));
    assert!(tv.wait_for("40:8e:00"));
    assert_eq!(announcements(&tv), 2);
    assert!(cec.is_active_device(LogicalAddress::Tv));
    cec.stop();
    assert_eq!(cec.lifecycle(), Lifecycle::Stopped);
}

#[test]
fn standby_is_tracked() {
    let (tv, cec) = start(Config::default());
    tv.frame(&Command::with_parameters(
        LogicalAddress::Tv,
        LogicalAddress::Playback1,
        Opcode::ReportPowerStatus,
        &[PowerStatus::On.into()],
    ));
    tv.frame(&Command::format(
        LogicalAddress::Tv,
        LogicalAddress::Broadcast,
        Opcode::Standby,
    ));
    let deadline = Instant::now() + Duration::from_secs(2);
    while cec.device_power_status(LogicalAddress::Tv) != PowerStatus::Standby {
        assert!(Instant::now() < deadline, "standby was not recorded");
        sleep(Duration::from_millis(10));
    }
    assert!(cec.active_devices().has(LogicalAddress::Tv));
}
