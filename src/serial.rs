use std::fs::File;
use std::io::{Read, Write};
use std::os::fd::AsFd;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use nix::poll::{poll, PollFd, PollFlags, PollTimeout};
use nix::sys::termios::{cfmakeraw, cfsetspeed, tcgetattr, tcsetattr, BaudRate, SetArg};
use parking_lot::Mutex;

use crate::adapter::{
    decode, AdapterMessage, AdapterTransport, MessageState, OutboundMessage, SendConfirmation,
};
use crate::error::{Error, Result};

struct ReadState {
    /// bytes of an incomplete message
    buf: Vec<u8>,
    /// decoded, not yet returned
    ready: std::collections::VecDeque<AdapterMessage>,
}

/// A USB-CEC adapter behind a CDC-ACM tty, e.g. `/dev/ttyACM0`.
pub struct SerialAdapter {
    file: File,
    read: Mutex<ReadState>,
    write: Mutex<()>,
    /// cleared once the tty went away
    open: AtomicBool,
}

impl SerialAdapter {
    /**
     * Open the tty and switch it to raw 38400 baud.
     * ```no_run
     * # use cec_control::SerialAdapter;
     * let adapter = SerialAdapter::open("/dev/ttyACM0")?;
     * # Ok::<(), cec_control::Error>(())
     * ```
     */
    pub fn open<P: AsRef<std::path::Path>>(path: P) -> Result<Self> {
        let file = std::fs::OpenOptions::new()
            .read(true)
            .write(true)
            .open(path)?;
        let mut tty = tcgetattr(file.as_fd()).map_err(std::io::Error::from)?;
        cfmakeraw(&mut tty);
        cfsetspeed(&mut tty, BaudRate::B38400).map_err(std::io::Error::from)?;
        tcsetattr(file.as_fd(), SetArg::TCSANOW, &tty).map_err(std::io::Error::from)?;
        Ok(Self {
            file,
            read: Mutex::new(ReadState {
                buf: Vec::with_capacity(64),
                ready: Default::default(),
            }),
            write: Mutex::new(()),
            open: AtomicBool::new(true),
        })
    }

    /// Wait for at most `timeout` for the tty to become readable.
    fn wait_readable(&self, timeout: Duration) -> Result<bool> {
        let ms = u16::try_from(timeout.as_millis()).unwrap_or(u16::MAX);
        let mut fds = [PollFd::new(self.file.as_fd(), PollFlags::POLLIN)];
        let n = poll(&mut fds, PollTimeout::from(ms)).map_err(std::io::Error::from)?;
        Ok(n > 0
            && fds[0]
                .revents()
                .is_some_and(|r| r.intersects(PollFlags::POLLIN)))
    }
}

impl AdapterTransport for SerialAdapter {
    fn is_open(&self) -> bool {
        self.open.load(Ordering::Relaxed)
    }

    fn write(&self, message: &OutboundMessage) -> Result<SendConfirmation> {
        let _guard = self.write.lock();
        let written = (&self.file)
            .write_all(message.as_bytes())
            .and_then(|_| (&self.file).flush());
        if let Err(e) = written {
            if e.kind() == std::io::ErrorKind::BrokenPipe {
                self.open.store(false, Ordering::Relaxed);
            }
            return Err(e.into());
        }
        Ok(SendConfirmation::done(MessageState::Sent))
    }

    fn read(&self, timeout: Duration) -> Result<Option<AdapterMessage>> {
        let deadline = Instant::now() + timeout;
        let mut state = self.read.lock();
        loop {
            if let Some(msg) = state.ready.pop_front() {
                return Ok(Some(msg));
            }
            let now = Instant::now();
            if now >= deadline || !self.wait_readable(deadline - now)? {
                return Ok(None);
            }
            let mut chunk = [0u8; 64];
            let n = (&self.file).read(&mut chunk)?;
            if n == 0 {
                // unplugged
                self.open.store(false, Ordering::Relaxed);
                return Err(Error::NotOpen);
            }
            state.buf.extend_from_slice(&chunk[..n]);
            let decoded = decode(&mut state.buf);
            state.ready.extend(decoded);
        }
    }
}
