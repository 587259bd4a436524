// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Blocking byte channels to hardware.

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use parking_lot::Mutex;

use crate::error::HardwareError;

/// A blocking channel to one piece of hardware.
///
/// Transports are only used from timer callbacks, under the driver's
/// hardware lock, so they need not be `Sync`.
pub trait Transport: Send {
    /// Opens the channel.
    ///
    /// # Errors
    ///
    /// Returns an error if the hardware cannot be reached.
    fn open(&mut self) -> Result<(), HardwareError>;

    /// Closes the channel. Closing a closed channel is not an error.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying close fails.
    fn close(&mut self) -> Result<(), HardwareError>;

    /// Whether the channel is open.
    fn is_open(&self) -> bool;

    /// Writes `data`, returning the number of bytes written.
    ///
    /// # Errors
    ///
    /// Returns an error if the channel is closed or the write fails.
    fn write(&mut self, data: &[u8]) -> Result<usize, HardwareError>;

    /// Reads into `buf`, waiting at most `timeout` for the first byte.
    ///
    /// # Errors
    ///
    /// Returns [`HardwareError::Timeout`] if nothing arrives in time.
    fn read(&mut self, buf: &mut [u8], timeout: Duration) -> Result<usize, HardwareError>;

    /// Device-specific control request, in the style of `ioctl`.
    ///
    /// # Errors
    ///
    /// Returns [`HardwareError::Rejected`] for unsupported requests.
    fn control(&mut self, request: u32, argument: u32) -> Result<u32, HardwareError> {
        let _ = argument;
        Err(HardwareError::Rejected(format!(
            "control request {request:#x} not supported"
        )))
    }

    /// Writes a newline-terminated command and reads one reply line.
    ///
    /// # Errors
    ///
    /// Propagates write and read errors; a reply that is not UTF-8 is
    /// [`HardwareError::Rejected`].
    fn query(&mut self, command: &str, timeout: Duration) -> Result<String, HardwareError> {
        self.write(format!("{command}\n").as_bytes())?;
        let mut reply = Vec::new();
        let mut byte = [0_u8; 1];
        loop {
            let read = self.read(&mut byte, timeout)?;
            if read == 0 || byte[0] == b'\n' {
                break;
            }
            reply.push(byte[0]);
        }
        String::from_utf8(reply)
            .map(|line| line.trim_end_matches('\r').to_string())
            .map_err(|_| HardwareError::Rejected("reply is not UTF-8".to_string()))
    }
}

type Responder = Box<dyn FnMut(&str) -> Result<String, HardwareError> + Send>;

struct MockState {
    open: bool,
    fail_open: Option<HardwareError>,
    responder: Responder,
    pending: VecDeque<u8>,
    partial: Vec<u8>,
    commands: Vec<String>,
    latency: Duration,
}

/// A scripted transport.
///
/// Each newline-terminated command written is handed to a responder
/// closure whose reply (plus newline) becomes readable. Clones share
/// state, so a test can keep one clone to inspect traffic while the
/// driver owns another.
///
/// # Examples
///
/// ```
/// use std::time::Duration;
/// use astrobus::device::{MockTransport, Transport};
///
/// let mut transport = MockTransport::new(|command| Ok(format!("echo {command}")));
/// transport.open().unwrap();
/// let reply = transport.query("PING", Duration::from_millis(10)).unwrap();
/// assert_eq!(reply, "echo PING");
/// assert_eq!(transport.commands(), vec!["PING"]);
/// ```
#[derive(Clone)]
pub struct MockTransport {
    state: Arc<Mutex<MockState>>,
    in_flight: Arc<AtomicUsize>,
    max_in_flight: Arc<AtomicUsize>,
}

impl MockTransport {
    /// Creates a transport answering commands with `responder`.
    pub fn new<F>(responder: F) -> Self
    where
        F: FnMut(&str) -> Result<String, HardwareError> + Send + 'static,
    {
        Self {
            state: Arc::new(Mutex::new(MockState {
                open: false,
                fail_open: None,
                responder: Box::new(responder),
                pending: VecDeque::new(),
                partial: Vec::new(),
                commands: Vec::new(),
                latency: Duration::ZERO,
            })),
            in_flight: Arc::new(AtomicUsize::new(0)),
            max_in_flight: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// A simulated focuser.
    ///
    /// Understands `POS?`, `MOVE <n>`, `MOVING?`, `STOP` and `TEMP?`.
    /// Each `POS?` while moving advances the position by up to `speed`
    /// steps toward the target.
    #[must_use]
    pub fn focuser(start: i64, speed: i64) -> Self {
        let mut position = start;
        let mut target = start;
        Self::new(move |command| {
            let mut words = command.split_whitespace();
            match (words.next(), words.next()) {
                (Some("POS?"), None) => {
                    let step = (target - position).clamp(-speed, speed);
                    position += step;
                    Ok(position.to_string())
                }
                (Some("MOVING?"), None) => Ok(u8::from(position != target).to_string()),
                (Some("MOVE"), Some(value)) => {
                    target = value
                        .parse()
                        .map_err(|_| HardwareError::Rejected(format!("bad target '{value}'")))?;
                    Ok("OK".to_string())
                }
                (Some("STOP"), None) => {
                    target = position;
                    Ok("OK".to_string())
                }
                (Some("TEMP?"), None) => Ok("21.5".to_string()),
                _ => Err(HardwareError::Rejected(format!("unknown command '{command}'"))),
            }
        })
    }

    /// Makes the next `open` calls fail with `error`.
    #[must_use]
    pub fn failing_open(self, error: HardwareError) -> Self {
        self.state.lock().fail_open = Some(error);
        self
    }

    /// Delays every reply by `latency`.
    #[must_use]
    pub fn with_latency(self, latency: Duration) -> Self {
        self.state.lock().latency = latency;
        self
    }

    /// Commands written so far, without newlines.
    #[must_use]
    pub fn commands(&self) -> Vec<String> {
        self.state.lock().commands.clone()
    }

    /// The highest number of overlapping transactions observed.
    #[must_use]
    pub fn max_concurrency(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    fn enter(&self) -> InFlight<'_> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        InFlight(&self.in_flight)
    }
}

struct InFlight<'a>(&'a AtomicUsize);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

impl Transport for MockTransport {
    fn open(&mut self) -> Result<(), HardwareError> {
        let mut state = self.state.lock();
        if let Some(error) = state.fail_open.clone() {
            return Err(error);
        }
        state.open = true;
        Ok(())
    }

    fn close(&mut self) -> Result<(), HardwareError> {
        let mut state = self.state.lock();
        state.open = false;
        state.pending.clear();
        state.partial.clear();
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.state.lock().open
    }

    fn write(&mut self, data: &[u8]) -> Result<usize, HardwareError> {
        let _in_flight = self.enter();
        let latency = self.state.lock().latency;
        if !latency.is_zero() {
            std::thread::sleep(latency);
        }
        let mut state = self.state.lock();
        if !state.open {
            return Err(HardwareError::NotOpen);
        }
        for &byte in data {
            if byte == b'\n' {
                let line = String::from_utf8_lossy(&state.partial).into_owned();
                state.partial.clear();
                state.commands.push(line.clone());
                let reply = (state.responder)(&line)?;
                state.pending.extend(reply.bytes());
                state.pending.push_back(b'\n');
            } else {
                state.partial.push(byte);
            }
        }
        Ok(data.len())
    }

    fn read(&mut self, buf: &mut [u8], timeout: Duration) -> Result<usize, HardwareError> {
        let mut state = self.state.lock();
        if !state.open {
            return Err(HardwareError::NotOpen);
        }
        if state.pending.is_empty() {
            return Err(HardwareError::Timeout(timeout));
        }
        let count = buf.len().min(state.pending.len());
        for slot in buf.iter_mut().take(count) {
            if let Some(byte) = state.pending.pop_front() {
                *slot = byte;
            }
        }
        Ok(count)
    }
}

impl std::fmt::Debug for MockTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockTransport")
            .field("open", &self.is_open())
            .field("max_concurrency", &self.max_concurrency())
            .finish_non_exhaustive()
    }
}
