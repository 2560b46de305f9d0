// SFC-Ostack: Service Function Chains on OpenStack
// Copyright (C) 2021  Tibor Schneider
//
// This program is free software; you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation; either version 2 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along
// with this program; if not, write to the Free Software Foundation, Inc.,
// 51 Franklin Street, Fifth Floor, Boston, MA 02110-1301 USA.

//! # Readiness Barrier
//!
//! Each member sends a UDP datagram containing `ready` to the manager as soon as its init script
//! is done. The barrier blocks until one signal per member was received. The listener must be
//! started before the servers are created, otherwise early signals are lost. Dropping a
//! [`ReadinessListener`] stops its thread and releases the socket.

use crate::config::ManagerConfig;

use log::*;
use std::collections::HashSet;
use std::io::ErrorKind;
use std::net::{IpAddr, SocketAddr, UdpSocket};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{Receiver, RecvTimeoutError};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use thiserror::Error;

/// Payload of a readiness signal
pub const READY_SIGNAL: &str = "ready";

const MAX_DATAGRAM_SIZE: usize = 1024;

/// Longest time the listener thread blocks before it checks whether it was cancelled
const CANCEL_CHECK_INTERVAL: Duration = Duration::from_millis(100);

/// # Readiness Error
#[derive(Debug, Error)]
pub enum ReadinessError {
    /// Not all members reported in time
    #[error("Timeout while waiting for ready signals: received {received} out of {expected}")]
    Timeout {
        /// Number of signals received
        received: usize,
        /// Number of signals expected
        expected: usize,
    },
    /// The source of signals is gone
    #[error("The signal source is disconnected")]
    Disconnected,
    /// The listener thread panicked
    #[error("The readiness listener panicked")]
    ListenerPanicked,
    /// The listener was stopped before all signals arrived
    #[error("The readiness listener was cancelled")]
    Cancelled,
    /// IO Error of the socket
    #[error("IO Error: {0}")]
    Io(#[from] std::io::Error),
}

/// Message received by the barrier
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Signal {
    /// Address of the sender, if known
    pub sender: Option<SocketAddr>,
    /// Raw payload
    pub payload: Vec<u8>,
}

impl Signal {
    /// Create a ready signal from the given sender
    pub fn ready(sender: Option<SocketAddr>) -> Self {
        Self { sender, payload: READY_SIGNAL.as_bytes().to_vec() }
    }

    /// Returns true if the payload is a ready signal. Surrounding whitespace is ignored.
    pub fn is_ready(&self) -> bool {
        String::from_utf8_lossy(&self.payload).trim() == READY_SIGNAL
    }
}

/// Something that delivers signals
pub trait SignalSource {
    /// Block until the next signal arrives. Returns `Ok(None)` if the timeout elapsed first.
    fn recv_signal(&mut self, timeout: Option<Duration>) -> Result<Option<Signal>, ReadinessError>;
}

impl SignalSource for UdpSocket {
    fn recv_signal(&mut self, timeout: Option<Duration>) -> Result<Option<Signal>, ReadinessError> {
        // a zero timeout is rejected by the socket
        self.set_read_timeout(timeout.map(|t| t.max(Duration::from_millis(1))))?;
        let mut buf = [0u8; MAX_DATAGRAM_SIZE];
        match self.recv_from(&mut buf) {
            Ok((len, sender)) => {
                Ok(Some(Signal { sender: Some(sender), payload: buf[..len].to_vec() }))
            }
            Err(e) if e.kind() == ErrorKind::WouldBlock || e.kind() == ErrorKind::TimedOut => {
                Ok(None)
            }
            Err(e) => Err(e.into()),
        }
    }
}

impl SignalSource for Receiver<Signal> {
    fn recv_signal(&mut self, timeout: Option<Duration>) -> Result<Option<Signal>, ReadinessError> {
        match timeout {
            Some(timeout) => match self.recv_timeout(timeout) {
                Ok(signal) => Ok(Some(signal)),
                Err(RecvTimeoutError::Timeout) => Ok(None),
                Err(RecvTimeoutError::Disconnected) => Err(ReadinessError::Disconnected),
            },
            None => self.recv().map(Some).map_err(|_| ReadinessError::Disconnected),
        }
    }
}

/// Socket of a background listener, which gives up as soon as `stop` is set.
#[derive(Debug)]
struct CancellableSocket {
    socket: UdpSocket,
    stop: Arc<AtomicBool>,
}

impl SignalSource for CancellableSocket {
    fn recv_signal(&mut self, timeout: Option<Duration>) -> Result<Option<Signal>, ReadinessError> {
        if self.stop.load(Ordering::Relaxed) {
            return Err(ReadinessError::Cancelled);
        }
        let slice = timeout.map_or(CANCEL_CHECK_INTERVAL, |t| t.min(CANCEL_CHECK_INTERVAL));
        self.socket.recv_signal(Some(slice))
    }
}

/// # Readiness Barrier
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReadinessBarrier {
    timeout: Option<Duration>,
    dedup: bool,
}

impl ReadinessBarrier {
    /// Barrier without timeout, counting every signal.
    pub fn new() -> Self {
        Self::default()
    }

    /// Barrier configured from the manager settings
    pub fn from_config(config: &ManagerConfig) -> Self {
        Self::new().with_timeout(config.ready_timeout()).dedup_senders(config.dedup_ready_signals)
    }

    /// Give up after the timeout
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    /// Count at most one signal per sender address
    pub fn dedup_senders(mut self, dedup: bool) -> Self {
        self.dedup = dedup;
        self
    }

    /// Block until `expected` ready signals were received from `source`. Returns the time waited.
    /// Messages other than `ready` are ignored.
    pub fn wait_for_ready<S: SignalSource>(
        &self,
        expected: usize,
        source: &mut S,
    ) -> Result<Duration, ReadinessError> {
        let start = Instant::now();
        let mut received = 0;
        let mut senders: HashSet<IpAddr> = HashSet::new();
        while received < expected {
            let remaining = match self.timeout {
                Some(timeout) => {
                    let elapsed = start.elapsed();
                    if elapsed >= timeout {
                        warn!("Received only {} out of {} ready signals", received, expected);
                        return Err(ReadinessError::Timeout { received, expected });
                    }
                    Some(timeout - elapsed)
                }
                None => None,
            };
            let signal = match source.recv_signal(remaining)? {
                Some(signal) => signal,
                None => continue,
            };
            if !signal.is_ready() {
                debug!("Ignoring unexpected message from {:?}", signal.sender);
                continue;
            }
            if self.dedup {
                if let Some(sender) = signal.sender {
                    if !senders.insert(sender.ip()) {
                        debug!("Ignoring duplicate ready signal from {}", sender);
                        continue;
                    }
                }
            }
            received += 1;
            debug!("Ready signal {}/{} from {:?}", received, expected, signal.sender);
        }
        Ok(start.elapsed())
    }

    /// Bind the UDP socket in the current thread, and wait for the signals in a new thread.
    pub fn listen(
        &self,
        addr: SocketAddr,
        expected: usize,
    ) -> Result<ReadinessListener, ReadinessError> {
        let socket = UdpSocket::bind(addr)?;
        let addr = socket.local_addr()?;
        let stop = Arc::new(AtomicBool::new(false));
        let mut source = CancellableSocket { socket, stop: stop.clone() };
        let barrier = *self;
        info!("Waiting for {} ready signals on {}", expected, addr);
        let handle = thread::spawn(move || barrier.wait_for_ready(expected, &mut source));
        Ok(ReadinessListener { addr, stop, handle: Some(handle) })
    }
}

/// Readiness barrier running in the background. Dropping it without [`join`](Self::join) stops
/// the thread and closes the socket.
#[derive(Debug)]
pub struct ReadinessListener {
    addr: SocketAddr,
    stop: Arc<AtomicBool>,
    handle: Option<JoinHandle<Result<Duration, ReadinessError>>>,
}

impl ReadinessListener {
    /// Address on which the signals are received
    pub fn local_addr(&self) -> SocketAddr {
        self.addr
    }

    /// Block until the barrier is done
    pub fn join(mut self) -> Result<Duration, ReadinessError> {
        match self.handle.take().map(JoinHandle::join) {
            Some(Ok(result)) => result,
            Some(Err(_)) => Err(ReadinessError::ListenerPanicked),
            None => Err(ReadinessError::Cancelled),
        }
    }

    /// Stop waiting, and block until the thread is gone.
    fn stop_thread(&mut self) {
        if let Some(handle) = self.handle.take() {
            self.stop.store(true, Ordering::Relaxed);
            if handle.join().is_err() {
                warn!("The readiness listener on {} panicked", self.addr);
            }
            debug!("Stopped the readiness listener on {}", self.addr);
        }
    }
}

impl Drop for ReadinessListener {
    fn drop(&mut self) {
        self.stop_thread();
    }
}
