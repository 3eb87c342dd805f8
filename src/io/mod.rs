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

//! I/O providers for running [`Server`s](crate::server::Server).
//!
//! The [`Server`](crate::server::Server) structure and its methods
//! implement the processing logic of the nameserver abstracted from
//! underlying network I/O. Therefore, to actually run a
//! [`Server`](crate::server::Server), an I/O provider is needed.
//!
//! The providers here take a [`Server`](crate::server::Server) and,
//! when run, receive datagrams on a UDP socket, hand them to the
//! server, and send whatever it returns. They also call
//! [`Server::expire_sessions`](crate::server::Server::expire_sessions)
//! every [`SWEEP_INTERVAL`], so that clients of iterative lookups that
//! never get an upstream response are still answered. The providers
//! differ in the I/O APIs used: [`BlockingIoProvider`] runs a thread
//! on the standard library's blocking sockets, while
//! [`TokioIoProvider`] (with the `tokio` feature) runs a Tokio task.

use std::time::Duration;

mod blocking;
#[cfg(feature = "tokio")]
mod tokio;

pub use blocking::{BlockingIoProvider, BlockingShutdownController};
#[cfg(feature = "tokio")]
pub use self::tokio::{TokioIoProvider, TokioShutdownController};

/// How often timed-out sessions are swept.
pub const SWEEP_INTERVAL: Duration = Duration::from_millis(250);
