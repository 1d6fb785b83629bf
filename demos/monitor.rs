/*!
 * Print all bus traffic without taking part in it
 */
use std::{thread::sleep, time::Duration};

use cec_control::*;
use tracing_subscriber::EnvFilter;

struct Printer;

impl HostController for Printer {
    fn add_log(&self, _level: LogLevel, _message: &str) {}
    fn add_key(&self) {}
    fn add_keypress(&self, _key: Keypress) {}
    fn add_command(&self, command: &Command) {
        println!("{command}\t{command:?}");
    }
    fn set_current_button(&self, _code: UserControlCode) {}
    fn check_keypress_timeout(&self) {}
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let port = std::env::args().nth(1).unwrap_or("/dev/ttyACM0".to_string());
    let cec = Processor::new(SerialAdapter::open(port)?, Printer, Config::default())?;
    cec.start()?;
    cec.switch_monitoring(true)?;

    loop {
        sleep(Duration::from_secs(10));
        println!("active devices: {:?}", cec.active_devices());
    }
}
