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

//! Tracking of in-flight iterative queries.
//!
//! When this server follows a delegation on a client's behalf, it sends
//! its own query to the delegated nameserver under a fresh random
//! transaction ID. A [`Session`] remembers everything needed to relay
//! the eventual answer back: who asked, under what ID, and which server
//! was asked. The [`SessionTracker`] maps the internal IDs to sessions.

use std::collections::HashMap;
use std::net::{Ipv4Addr, SocketAddr};
use std::time::Instant;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::message::Question;
use crate::name::Name;

/// How many random IDs are tried before falling back to a scan.
const RANDOM_ID_ATTEMPTS: usize = 16;

/// The client side of a session: where to send the answer, and the
/// header fields to restore in it.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Client {
    pub addr: SocketAddr,
    pub id: u16,
    pub rd: bool,
}

/// Where a session stands.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum SessionState {
    /// The first query has gone out to the delegate found in our own
    /// zones.
    AwaitingDelegateResponse,

    /// A referral was received and the query re-sent to the next
    /// delegate.
    FollowingReferral,
}

/// One in-flight iterative query.
#[derive(Clone, Debug)]
pub struct Session {
    pub client: Client,
    pub question: Question,
    pub delegate_ip: Ipv4Addr,
    pub delegate_domain: Name,
    pub referrals: usize,
    pub deadline: Instant,
    pub state: SessionState,
}

/// The table of in-flight sessions, keyed by internal transaction ID.
pub struct SessionTracker {
    sessions: HashMap<u16, Session>,
    rng: StdRng,
}

impl SessionTracker {
    /// Creates an empty tracker whose IDs come from an entropy-seeded
    /// generator.
    pub fn new() -> Self {
        Self {
            sessions: HashMap::new(),
            rng: StdRng::from_entropy(),
        }
    }

    /// Creates an empty tracker with a deterministic ID sequence.
    pub fn with_seed(seed: u64) -> Self {
        Self {
            sessions: HashMap::new(),
            rng: StdRng::seed_from_u64(seed),
        }
    }

    /// Starts a session, returning its internal ID, or `None` if every
    /// ID is taken.
    pub fn begin(
        &mut self,
        client: Client,
        question: Question,
        delegate_ip: Ipv4Addr,
        delegate_domain: Name,
        deadline: Instant,
    ) -> Option<u16> {
        let id = self.allocate_id()?;
        self.sessions.insert(
            id,
            Session {
                client,
                question,
                delegate_ip,
                delegate_domain,
                referrals: 0,
                deadline,
                state: SessionState::AwaitingDelegateResponse,
            },
        );
        Some(id)
    }

    pub fn get(&self, id: u16) -> Option<&Session> {
        self.sessions.get(&id)
    }

    /// Points session `id` at a new delegate after a referral, counting
    /// the hop and pushing back the deadline.
    pub fn follow_referral(
        &mut self,
        id: u16,
        delegate_ip: Ipv4Addr,
        delegate_domain: Name,
        deadline: Instant,
    ) -> Option<&Session> {
        let session = self.sessions.get_mut(&id)?;
        session.delegate_ip = delegate_ip;
        session.delegate_domain = delegate_domain;
        session.referrals += 1;
        session.deadline = deadline;
        session.state = SessionState::FollowingReferral;
        Some(session)
    }

    /// Removes and returns session `id`, once it is resolved.
    pub fn finish(&mut self, id: u16) -> Option<Session> {
        self.sessions.remove(&id)
    }

    /// Removes and returns every session whose deadline is not after
    /// `now`.
    pub fn expire(&mut self, now: Instant) -> Vec<(u16, Session)> {
        let expired: Vec<u16> = self
            .sessions
            .iter()
            .filter(|(_, session)| session.deadline <= now)
            .map(|(id, _)| *id)
            .collect();
        expired
            .into_iter()
            .filter_map(|id| self.sessions.remove(&id).map(|session| (id, session)))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Picks an unused ID. Random guesses almost always succeed; the
    /// scan only matters when the table is nearly full.
    fn allocate_id(&mut self) -> Option<u16> {
        for _ in 0..RANDOM_ID_ATTEMPTS {
            let id = self.rng.gen();
            if !self.sessions.contains_key(&id) {
                return Some(id);
            }
        }
        let start: u16 = self.rng.gen();
        (0..=u16::MAX)
            .map(|offset| start.wrapping_add(offset))
            .find(|id| !self.sessions.contains_key(id))
    }
}

impl Default for SessionTracker {
    fn default() -> Self {
        Self::new()
    }
}

////////////////////////////////////////////////////////////////////////
// TESTS                                                              //
////////////////////////////////////////////////////////////////////////
