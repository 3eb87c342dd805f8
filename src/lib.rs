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

//! Hopper is a small DNS nameserver.
//!
//! It answers queries from zones held in memory and, when a query
//! falls into a zone delegated elsewhere, resolves it iteratively by
//! chasing referrals from other nameservers, relaying the final answer
//! together with records naming the server that gave it.
//!
//! The pieces, from the bottom up:
//!
//! * [`name`], [`class`] and [`rr`] model domain names and resource
//!   records.
//! * [`message`] reads and writes DNS messages on the wire.
//! * [`zone`] stores zone data in a tree and finds zones and cuts.
//! * [`session`] tracks in-flight iterative lookups by transaction ID.
//! * [`server`] ties these together into message-handling logic that
//!   is independent of any network API.
//! * [`io`] runs a [`server::Server`] on a UDP socket.

pub mod class;
pub mod io;
pub mod message;
pub mod name;
pub mod rr;
pub mod server;
pub mod session;
mod util;
pub mod zone;
