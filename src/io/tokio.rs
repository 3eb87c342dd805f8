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

//! Implementation of the Tokio I/O provider.

use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use log::{debug, error};
use tokio::net::UdpSocket;
use tokio::sync::{broadcast, mpsc};
use tokio::time::{interval, MissedTickBehavior};

use super::SWEEP_INTERVAL;
use crate::message::MAX_MESSAGE_SIZE;
use crate::server::{Datagram, Server};

/// A Tokio I/O provider.
///
/// This provider uses asynchronous I/O and runs the server as a task on
/// a Tokio runtime. Datagrams are handled on the receiving task itself;
/// a [`tokio::time::Interval`] drives the session sweep.
///
/// The `TokioIoProvider` supports graceful shutdown. To initiate a
/// graceful shutdown, use the [`TokioShutdownController`] returned by
/// [`TokioIoProvider::start`].
pub struct TokioIoProvider {
    socket: UdpSocket,
}

impl TokioIoProvider {
    /// Creates a new `TokioIoProvider`. This call binds the UDP socket
    /// in preparation, but does not start the server. This function
    /// requires that the Tokio runtime be active.
    pub async fn bind(addr: SocketAddr) -> io::Result<Self> {
        let socket = UdpSocket::bind(addr).await?;
        Ok(Self { socket })
    }

    /// Returns the address the socket is bound to.
    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.socket.local_addr()
    }

    /// Starts the server on the active Tokio runtime.
    ///
    /// This spawns a task on the active Tokio runtime and then returns
    /// a [`TokioShutdownController`] that can be used to shut it down
    /// at a later time. (The [`TokioShutdownController`] must be held as
    /// long as the server should be running, since dropping it will
    /// trigger shutdown.)
    pub fn start(self, server: &Arc<Server>) -> TokioShutdownController {
        let (shutdown_controller, shutdown_handle) = make_shutdown_channels();
        tokio::spawn(run_udp_loop(shutdown_handle, server.clone(), self.socket));
        shutdown_controller
    }
}

/// What woke up the UDP loop.
enum Event {
    Shutdown,
    Sweep,
    Received(io::Result<(usize, SocketAddr)>),
}

/// The UDP receive/handle/send loop.
async fn run_udp_loop(mut shutdown: ShutdownHandle, server: Arc<Server>, socket: UdpSocket) {
    let mut received_buf = vec![0; MAX_MESSAGE_SIZE];
    let mut sweep = interval(SWEEP_INTERVAL);
    sweep.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        let event = tokio::select! {
            _ = shutdown.request_receiver.recv() => Event::Shutdown,
            _ = sweep.tick() => Event::Sweep,
            res = socket.recv_from(&mut received_buf) => Event::Received(res),
        };

        match event {
            Event::Shutdown => break,
            Event::Sweep => {
                for datagram in server.expire_sessions(Instant::now()) {
                    send(&socket, &datagram).await;
                }
            }
            Event::Received(Ok((received_len, src))) => {
                if let Some(datagram) =
                    server.handle_message(&received_buf[..received_len], src, Instant::now())
                {
                    send(&socket, &datagram).await;
                }
            }
            Event::Received(Err(e)) => error!("I/O error receiving on the UDP socket: {e}"),
        }
    }

    debug!("UDP task shutting down");
    drop(shutdown.wait_sender);
}

/// Sends `datagram`, logging (and otherwise ignoring) any error.
async fn send(socket: &UdpSocket, datagram: &Datagram) {
    if let Err(e) = socket.send_to(&datagram.octets, datagram.dest).await {
        error!("I/O error sending to {}: {e}", datagram.dest);
    }
}

/// Controls the shutdown of a server's Tokio task.
///
/// Use [`TokioShutdownController::shut_down`] or its blocking variant,
/// [`TokioShutdownController::blocking_shut_down`], to initiate
/// shutdown and wait for its completion. Dropping the controller will
/// also trigger shutdown (but will not wait for it to complete).
#[must_use]
pub struct TokioShutdownController {
    request_sender: broadcast::Sender<()>,
    wait_receiver: mpsc::Receiver<()>,
}

impl TokioShutdownController {
    /// Requests that the running server task shut down, and then waits
    /// for it to terminate.
    pub async fn shut_down(mut self) {
        drop(self.request_sender);
        let _ = self.wait_receiver.recv().await;
    }

    /// The blocking variant of [`TokioShutdownController::shut_down`].
    pub fn blocking_shut_down(mut self) {
        drop(self.request_sender);
        let _ = self.wait_receiver.blocking_recv();
    }
}

/// A handle held by the server task to interact with the graceful
/// shutdown mechanism.
///
/// The task listens for shutdown by waiting for every sender attached
/// to `request_receiver` to close. Holding `wait_sender` prevents
/// graceful shutdown from completing until the task is done.
struct ShutdownHandle {
    request_receiver: broadcast::Receiver<()>,
    wait_sender: mpsc::Sender<()>,
}

/// Produces a [`TokioShutdownController`] and the [`ShutdownHandle`]
/// connected to it.
fn make_shutdown_channels() -> (TokioShutdownController, ShutdownHandle) {
    let (request_sender, request_receiver) = broadcast::channel(1);
    let (wait_sender, wait_receiver) = mpsc::channel(1);
    let controller = TokioShutdownController {
        request_sender,
        wait_receiver,
    };
    let handle = ShutdownHandle {
        request_receiver,
        wait_sender,
    };
    (controller, handle)
}

////////////////////////////////////////////////////////////////////////
// TESTS                                                              //
////////////////////////////////////////////////////////////////////////

#[cfg(test)]
mod tests {
    use std::net::{IpAddr, Ipv4Addr};
    use std::time::Duration;

    use super::*;
    use crate::class::Class;
    use crate::message::{Header, Message, Question, Rcode};
    use crate::rr::Type;
    use crate::zone::ZoneTree;

    #[tokio::test]
    async fn answers_and_shuts_down() {
        let apex = "utexas.edu.".parse().unwrap();
        let mut zones = ZoneTree::new();
        zones.create_zone(&apex).unwrap();
        let server = Arc::new(Server::new(Arc::new(zones)));

        let localhost = SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), 0);
        let provider = TokioIoProvider::bind(localhost).await.unwrap();
        let server_addr = provider.local_addr().unwrap();
        let controller = provider.start(&server);

        let client = UdpSocket::bind(localhost).await.unwrap();
        let query = Message {
            header: Header {
                id: 0x0bad,
                ..Header::default()
            },
            question: Some(Question {
                qname: "nosuch.utexas.edu.".parse().unwrap(),
                qtype: Type::A,
                qclass: Class::IN,
            }),
            ..Message::default()
        };
        let mut buf = vec![0; MAX_MESSAGE_SIZE];
        let len = query.encode(&mut buf).unwrap();
        client.send_to(&buf[..len], server_addr).await.unwrap();

        let (len, _) = tokio::time::timeout(Duration::from_secs(5), client.recv_from(&mut buf))
            .await
            .unwrap()
            .unwrap();
        let response = Message::decode(&buf[..len]).unwrap();
        assert_eq!(response.header.id, 0x0bad);
        assert_eq!(response.header.rcode, Rcode::NxDomain);

        controller.shut_down().await;
    }
}
