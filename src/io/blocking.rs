// Copyright 2022 Matthew Ingwersen.
//
// Licensed under the Apache License, Version 2.0 (the "License"); you
// may not use this file except in compliance with the License. You may
// obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or
// implied. See the License for the specific language governing
// permissions and limitations under the License.

//! Implementation of the blocking I/O provider.

// NOTE: Unlike a receive failure, a failed send is never fatal. On
// Linux, an ICMP port unreachable message from an earlier send can also
// surface as an error from the *next* receive, so receive errors are
// logged and the loop goes on as well.

use std::io;
use std::net::{SocketAddr, UdpSocket};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Instant;

use log::{debug, error};

use super::SWEEP_INTERVAL;
use crate::message::MAX_MESSAGE_SIZE;
use crate::server::{Datagram, Server};

/// A blocking I/O provider.
///
/// This provider uses a blocking UDP socket, served by a single thread.
/// The socket's read timeout is [`SWEEP_INTERVAL`], so the thread wakes
/// up at least that often to sweep expired sessions and to check for
/// shutdown.
pub struct BlockingIoProvider {
    socket: UdpSocket,
}

impl BlockingIoProvider {
    /// Creates a new `BlockingIoProvider`. This call binds the UDP
    /// socket in preparation, but does not start the server.
    pub fn bind(addr: SocketAddr) -> io::Result<Self> {
        let socket = UdpSocket::bind(addr)?;
        socket.set_read_timeout(Some(SWEEP_INTERVAL))?;
        Ok(Self { socket })
    }

    /// Returns the address the socket is bound to.
    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.socket.local_addr()
    }

    /// Starts the server on a new thread.
    ///
    /// The returned [`BlockingShutdownController`] must be held as long
    /// as the server should be running, since dropping it will trigger
    /// shutdown.
    pub fn start(self, server: &Arc<Server>) -> io::Result<BlockingShutdownController> {
        let shutting_down = Arc::new(AtomicBool::new(false));
        let flag = shutting_down.clone();
        let server = server.clone();
        let thread = thread::Builder::new()
            .name("udp".to_owned())
            .spawn(move || run_udp_loop(&flag, &server, &self.socket))?;
        Ok(BlockingShutdownController {
            shutting_down,
            thread: Some(thread),
        })
    }
}

/// Controls the shutdown of a [`BlockingIoProvider`]'s thread.
#[must_use]
pub struct BlockingShutdownController {
    shutting_down: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
}

impl BlockingShutdownController {
    /// Requests that the server thread stop, and then waits for it to
    /// finish. This takes at most about one [`SWEEP_INTERVAL`].
    pub fn shut_down(mut self) {
        self.shutting_down.store(true, Ordering::Relaxed);
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                error!("the UDP thread panicked");
            }
        }
    }
}

impl Drop for BlockingShutdownController {
    fn drop(&mut self) {
        self.shutting_down.store(true, Ordering::Relaxed);
    }
}

/// The UDP receive/handle/send loop.
fn run_udp_loop(shutting_down: &AtomicBool, server: &Server, socket: &UdpSocket) {
    let mut received_buf = vec![0; MAX_MESSAGE_SIZE];
    let mut last_sweep = Instant::now();

    while !shutting_down.load(Ordering::Relaxed) {
        // If interrupted, we skip the rest of the receive handling and
        // check whether we're shutting down again before retrying.
        match socket.recv_from(&mut received_buf) {
            Ok((received_len, src)) => {
                if let Some(datagram) =
                    server.handle_message(&received_buf[..received_len], src, Instant::now())
                {
                    send(socket, &datagram);
                }
            }
            Err(e) if is_timeout_or_interruption(&e) => (),
            Err(e) => error!("I/O error receiving on the UDP socket: {}", e),
        }

        let now = Instant::now();
        if now.duration_since(last_sweep) >= SWEEP_INTERVAL {
            for datagram in server.expire_sessions(now) {
                send(socket, &datagram);
            }
            last_sweep = now;
        }
    }
    debug!("UDP thread shutting down");
}

fn is_timeout_or_interruption(e: &io::Error) -> bool {
    matches!(
        e.kind(),
        io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut | io::ErrorKind::Interrupted
    )
}

/// Sends `datagram`, logging (and otherwise ignoring) any error.
fn send(socket: &UdpSocket, datagram: &Datagram) {
    if let Err(e) = retry_if_interrupted(|| socket.send_to(&datagram.octets, datagram.dest)) {
        error!("I/O error sending to {}: {}", datagram.dest, e);
    }
}

/// Executes `f`, retrying the operation if it is interrupted.
fn retry_if_interrupted<F, R>(mut f: F) -> io::Result<R>
where
    F: FnMut() -> io::Result<R>,
{
    loop {
        match f() {
            Ok(r) => return Ok(r),
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
}

////////////////////////////////////////////////////////////////////////
// TESTS                                                              //
////////////////////////////////////////////////////////////////////////
