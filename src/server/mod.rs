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

//! The processing logic of the nameserver.
//!
//! The [`Server`] structure is the heart of this module; see its
//! documentation for details.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use log::{debug, info, warn};

use crate::class::Class;
use crate::message::{
    writer, Header, Message, Opcode, Question, Rcode, Reader, Writer, MAX_MESSAGE_SIZE,
};
use crate::name::Name;
use crate::rr::{Rdata, Record, Ttl};
use crate::session::{Client, Session, SessionTracker};
use crate::zone::ZoneTree;

mod query;

pub use query::{resolve, write_response, Delegation, Outcome};

/// The default time to wait for a delegate to respond.
pub const DEFAULT_SESSION_TIMEOUT: Duration = Duration::from_secs(3);

/// The default number of referrals a session may follow.
pub const DEFAULT_MAX_REFERRALS: usize = 16;

/// The default port that delegates are assumed to listen on.
pub const DEFAULT_UPSTREAM_PORT: u16 = 53;

////////////////////////////////////////////////////////////////////////
// SERVER PUBLIC API AND CORE MESSAGE-HANDLING LOGIC                  //
////////////////////////////////////////////////////////////////////////

/// A nameserver, abstracted from any underlying network I/O provider.
///
/// The [`Server`] structure implements the message-processing logic of
/// the nameserver. It receives and parses DNS messages through the
/// [`Server::handle_message`] method, and returns the datagram (if any)
/// that should be sent in reply. An underlying network I/O provider is
/// responsible for receiving these messages from the network and for
/// sending the datagrams that the [`Server`] produces.
///
/// Queries are answered from an immutable [`ZoneTree`]. When a query
/// falls into a delegated zone, the [`Server`] by default resolves it
/// iteratively: it forwards the question to the delegate, follows any
/// further referrals, and finally relays the answer to the client
/// along with records naming the server that gave it. Each such lookup
/// is a session in a [`SessionTracker`], correlated with upstream
/// responses by an internal transaction ID. Since an upstream server
/// may never respond, the I/O provider must call
/// [`Server::expire_sessions`] periodically.
///
/// With iterative resolution turned off, delegations are returned to
/// the client as referrals, the way an authoritative parent server
/// answers.
pub struct Server {
    zones: Arc<ZoneTree>,
    sessions: Mutex<SessionTracker>,
    iterative: bool,
    session_timeout: Duration,
    max_referrals: usize,
    upstream_port: u16,
}

/// A message for the I/O provider to send.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Datagram {
    pub dest: SocketAddr,
    pub octets: Vec<u8>,
}

impl Server {
    /// Creates a new `Server` that will serve the provided zones.
    pub fn new(zones: Arc<ZoneTree>) -> Self {
        Self::with_sessions(zones, SessionTracker::new())
    }

    /// Creates a new `Server` with the provided session table. This is
    /// mostly useful for getting reproducible transaction IDs.
    pub fn with_sessions(zones: Arc<ZoneTree>, sessions: SessionTracker) -> Self {
        Self {
            zones,
            sessions: Mutex::new(sessions),
            iterative: true,
            session_timeout: DEFAULT_SESSION_TIMEOUT,
            max_referrals: DEFAULT_MAX_REFERRALS,
            upstream_port: DEFAULT_UPSTREAM_PORT,
        }
    }

    /// Returns the zones the `Server` serves.
    pub fn zones(&self) -> &Arc<ZoneTree> {
        &self.zones
    }

    /// Sets whether delegations are resolved iteratively (the default)
    /// or returned to the client as referrals.
    pub fn set_iterative(&mut self, iterative: bool) {
        self.iterative = iterative;
    }

    pub fn session_timeout(&self) -> Duration {
        self.session_timeout
    }

    /// Sets how long each delegate has to respond before the client is
    /// sent a SERVFAIL.
    pub fn set_session_timeout(&mut self, timeout: Duration) {
        self.session_timeout = timeout;
    }

    /// Sets how many referrals a single session may follow.
    pub fn set_max_referrals(&mut self, max_referrals: usize) {
        self.max_referrals = max_referrals;
    }

    /// Sets the port that queries to delegates are sent to.
    pub fn set_upstream_port(&mut self, port: u16) {
        self.upstream_port = port;
    }

    /// Returns the number of sessions awaiting a response.
    pub fn active_sessions(&self) -> usize {
        self.lock_sessions().len()
    }

    /// Handles a received DNS message. This is the API through which
    /// I/O providers submit messages.
    ///
    /// `received` contains the message received from `source`, and
    /// `now` is the time it was received, which is used to set session
    /// deadlines. Queries (QR=0) are answered; responses (QR=1) are
    /// matched against the session table.
    pub fn handle_message(
        &self,
        received: &[u8],
        source: SocketAddr,
        now: Instant,
    ) -> Option<Datagram> {
        let source = normalize_source(source);
        let reader = match Reader::try_from(received) {
            Ok(reader) => reader,
            Err(e) => {
                debug!("dropping malformed message from {}: {}", source, e);
                return None;
            }
        };
        if reader.qr() {
            self.handle_response(received, source, now)
        } else {
            self.handle_query(reader, source, now)
        }
    }

    /// Fails every session whose deadline has passed, returning a
    /// SERVFAIL response for each one's client. Responses that arrive
    /// for these sessions later will not match anything.
    pub fn expire_sessions(&self, now: Instant) -> Vec<Datagram> {
        let expired = self.lock_sessions().expire(now);
        expired
            .into_iter()
            .filter_map(|(id, session)| {
                info!(
                    "session {}: {} ({}) did not respond to {}; sending SERVFAIL to {}",
                    id, session.delegate_domain, session.delegate_ip, session.question,
                    session.client.addr,
                );
                servfail(&session)
            })
            .collect()
    }

    fn lock_sessions(&self) -> MutexGuard<SessionTracker> {
        self.sessions.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

////////////////////////////////////////////////////////////////////////
// QUERY HANDLING                                                     //
////////////////////////////////////////////////////////////////////////

impl Server {
    /// Handles a query from a client.
    fn handle_query(
        &self,
        mut received: Reader,
        source: SocketAddr,
        now: Instant,
    ) -> Option<Datagram> {
        let mut octets = vec![0; MAX_MESSAGE_SIZE];
        let mut response = Writer::try_from(octets.as_mut_slice()).ok()?;
        response.set_id(received.id());
        response.set_qr(true);
        response.set_opcode(received.opcode());

        let delegation = if received.opcode() != Opcode::Query {
            response.set_rcode(Rcode::NotImp);
            None
        } else {
            // RD is only defined for opcode QUERY, so it is only copied
            // here.
            response.set_rd(received.rd());
            match received.qdcount() {
                0 => {
                    response.set_rcode(Rcode::FormErr);
                    None
                }
                1 => {
                    let question = match received.read_question() {
                        Ok(question) => question,
                        Err(e) => {
                            debug!("dropping query from {} with bad question: {}", source, e);
                            return None;
                        }
                    };
                    if response.add_question(&question).is_err() {
                        response.set_rcode(Rcode::ServFail);
                        None
                    } else {
                        self.answer_query(&mut response, question)
                    }
                }
                _ => {
                    debug!("dropping query from {} with multiple questions", source);
                    return None;
                }
            }
        };

        // A delegation we can resolve ourselves: the response written
        // so far is discarded in favor of a query to the delegate.
        if let Some((question, delegate_ip, delegate_domain)) = delegation {
            let client = Client {
                addr: source,
                id: received.id(),
                rd: received.rd(),
            };
            drop(response);
            return self.begin_session(client, question, delegate_ip, delegate_domain, now);
        }

        let len = response.finish();
        octets.truncate(len);
        Some(Datagram {
            dest: source,
            octets,
        })
    }

    /// Writes the response to a query whose question has been read.
    /// If the answer is a delegation to be resolved iteratively, the
    /// question and the delegate are returned instead.
    fn answer_query(
        &self,
        response: &mut Writer,
        question: Question,
    ) -> Option<(Question, Ipv4Addr, Name)> {
        if question.qclass != Class::IN {
            response.set_rcode(Rcode::Refused);
            return None;
        }

        let outcome = resolve(&self.zones, &question);
        if self.iterative {
            if let Outcome::Delegation(ref delegation) = outcome {
                return match (delegation.delegate_ip, &delegation.delegate_domain) {
                    (Some(ip), Some(domain)) => Some((question, ip, domain.clone())),
                    _ => {
                        info!("no glue to follow the delegation for {}", question);
                        response.set_rcode(Rcode::ServFail);
                        None
                    }
                };
            }
        }

        if let Err(e) = write_response(response, &outcome) {
            warn!("failed to write the response to {}: {}", question, e);
            response.clear_records();
            response.set_aa(false);
            response.set_rcode(Rcode::ServFail);
        }
        None
    }

    /// Starts a session and builds the first query to the delegate.
    fn begin_session(
        &self,
        client: Client,
        question: Question,
        delegate_ip: Ipv4Addr,
        delegate_domain: Name,
        now: Instant,
    ) -> Option<Datagram> {
        let deadline = now + self.session_timeout;
        let begun = self.lock_sessions().begin(
            client,
            question.clone(),
            delegate_ip,
            delegate_domain.clone(),
            deadline,
        );
        match begun {
            Some(id) => {
                debug!(
                    "session {}: asking {} ({}) about {} for {}",
                    id, delegate_domain, delegate_ip, question, client.addr,
                );
                self.upstream_query(id, &question, delegate_ip)
            }
            None => {
                warn!("session table is full; sending SERVFAIL to {}", client.addr);
                let header = Header {
                    id: client.id,
                    qr: true,
                    rd: client.rd,
                    rcode: Rcode::ServFail,
                    ..Header::default()
                };
                encode_datagram(client.addr, &question_only(header, question))
            }
        }
    }

    /// Builds the query for `question` that session `id` sends to the
    /// delegate at `ip`.
    fn upstream_query(&self, id: u16, question: &Question, ip: Ipv4Addr) -> Option<Datagram> {
        let header = Header {
            id,
            rd: true,
            ..Header::default()
        };
        let dest = SocketAddr::new(IpAddr::V4(ip), self.upstream_port);
        encode_datagram(dest, &question_only(header, question.clone()))
    }
}

////////////////////////////////////////////////////////////////////////
// RESPONSE HANDLING                                                  //
////////////////////////////////////////////////////////////////////////

impl Server {
    /// Handles a response from a delegate.
    ///
    /// A response is only accepted if its ID belongs to a session, it
    /// comes from that session's current delegate, and it carries the
    /// session's question. Anything else is dropped without touching
    /// the session, so that a forged or stray response cannot end it.
    fn handle_response(
        &self,
        received: &[u8],
        source: SocketAddr,
        now: Instant,
    ) -> Option<Datagram> {
        let message = match Message::decode(received) {
            Ok(message) => message,
            Err(e) => {
                debug!("dropping malformed response from {}: {}", source, e);
                return None;
            }
        };
        let id = message.header.id;

        let mut sessions = self.lock_sessions();
        let session = match sessions.get(id) {
            Some(session) => session,
            None => {
                debug!("dropping response {} from {}: no such session", id, source);
                return None;
            }
        };
        let expected_source = SocketAddr::new(IpAddr::V4(session.delegate_ip), self.upstream_port);
        if source != expected_source {
            warn!(
                "session {}: dropping response from {}, expected {}",
                id, source, expected_source,
            );
            return None;
        }
        if message.question.as_ref() != Some(&session.question) {
            warn!("session {}: dropping response from {} with the wrong question", id, source);
            return None;
        }

        if is_referral(&message) {
            if let Some(referral) = message.referral(&session.question.qname) {
                if session.referrals >= self.max_referrals {
                    info!("session {}: too many referrals; giving up", id);
                    let session = sessions.finish(id)?;
                    return servfail(&session);
                }
                let ip = match referral.ip {
                    Some(ip) => ip,
                    None => {
                        info!(
                            "session {}: referral to {} has no glue; giving up",
                            id, referral.domain,
                        );
                        let session = sessions.finish(id)?;
                        return servfail(&session);
                    }
                };
                let deadline = now + self.session_timeout;
                let session = sessions.follow_referral(id, ip, referral.domain, deadline)?;
                debug!(
                    "session {}: referred to {} ({})",
                    id, session.delegate_domain, session.delegate_ip,
                );
                let question = session.question.clone();
                drop(sessions);
                return self.upstream_query(id, &question, ip);
            }
        }

        let session = sessions.finish(id)?;
        drop(sessions);
        debug!(
            "session {}: relaying answer from {} to {}",
            id, session.delegate_domain, session.client.addr,
        );
        relay(message, &session)
    }
}

/// Checks whether a response only points somewhere else.
fn is_referral(message: &Message) -> bool {
    message.answers.is_empty() && !message.header.aa && message.header.rcode == Rcode::NoError
}

/// Builds the response relayed to a session's client: the delegate's
/// response with the client's ID and RD bit, plus records naming the
/// delegate. If that doesn't fit, the provenance A record and then the
/// rest of the additional section are dropped before giving up with a
/// SERVFAIL.
fn relay(mut message: Message, session: &Session) -> Option<Datagram> {
    message.header.id = session.client.id;
    message.header.rd = session.client.rd;
    message.authority.push(Record::new(
        session.question.qname.clone(),
        Ttl::DEFAULT,
        Rdata::Ns(session.delegate_domain.clone()),
    ));
    message.additional.push(Record::new(
        session.delegate_domain.clone(),
        Ttl::DEFAULT,
        Rdata::A(session.delegate_ip),
    ));

    for attempt in 0..3 {
        match try_encode(session.client.addr, &message) {
            Err(writer::Error::Truncation) => match attempt {
                0 => {
                    message.additional.pop();
                }
                _ => message.additional.clear(),
            },
            Err(e) => {
                warn!("failed to relay the response to {}: {}", session.question, e);
                break;
            }
            Ok(datagram) => return Some(datagram),
        }
    }
    servfail(session)
}

/// Builds the SERVFAIL sent to a session's client when the session
/// fails.
fn servfail(session: &Session) -> Option<Datagram> {
    let header = Header {
        id: session.client.id,
        qr: true,
        rd: session.client.rd,
        rcode: Rcode::ServFail,
        ..Header::default()
    };
    encode_datagram(session.client.addr, &question_only(header, session.question.clone()))
}

////////////////////////////////////////////////////////////////////////
// HELPERS                                                            //
////////////////////////////////////////////////////////////////////////

fn question_only(header: Header, question: Question) -> Message {
    Message {
        header,
        question: Some(question),
        ..Message::default()
    }
}

fn try_encode(dest: SocketAddr, message: &Message) -> writer::Result<Datagram> {
    let mut octets = vec![0; MAX_MESSAGE_SIZE];
    let len = message.encode(&mut octets)?;
    octets.truncate(len);
    Ok(Datagram { dest, octets })
}

/// Encodes a message that is known to be small. A failure here means
/// something is badly wrong, so it is logged and nothing is sent.
fn encode_datagram(dest: SocketAddr, message: &Message) -> Option<Datagram> {
    match try_encode(dest, message) {
        Ok(datagram) => Some(datagram),
        Err(e) => {
            warn!("failed to encode a message for {}: {}", dest, e);
            None
        }
    }
}

/// Converts IPv4-mapped IPv6 source addresses (which dual-stack sockets
/// produce) back to IPv4, so they compare equal to delegate addresses.
fn normalize_source(source: SocketAddr) -> SocketAddr {
    match source {
        SocketAddr::V6(v6) => match v6.ip().to_ipv4_mapped() {
            Some(ipv4) => SocketAddr::new(IpAddr::V4(ipv4), v6.port()),
            None => source,
        },
        SocketAddr::V4(_) => source,
    }
}

////////////////////////////////////////////////////////////////////////
// TESTS                                                              //
////////////////////////////////////////////////////////////////////////

#[cfg(test)]
mod tests {
    use std::net::Ipv6Addr;

    use lazy_static::lazy_static;

    use super::*;
    use crate::rr::Type;

    fn name(text: &str) -> Name {
        text.parse().unwrap()
    }

    fn zones() -> Arc<ZoneTree> {
        let utexas = name("utexas.edu.");
        let mut tree = ZoneTree::new();
        tree.create_zone(&utexas).unwrap();
        tree.add_record(&utexas, "www", Some(Ipv4Addr::new(40, 0, 0, 10)), None)
            .unwrap();
        tree.add_record(&utexas, "cs", None, Some(&name("ns.cs.utexas.edu.")))
            .unwrap();
        tree.add_record(&utexas, "ns.cs", Some(Ipv4Addr::new(10, 0, 0, 30)), None)
            .unwrap();
        tree.add_record(&utexas, "ece", None, Some(&name("ns.ece.utexas.edu.")))
            .unwrap();
        Arc::new(tree)
    }

    fn server() -> Server {
        Server::with_sessions(zones(), SessionTracker::with_seed(7))
    }

    fn addr(ip: [u8; 4], port: u16) -> SocketAddr {
        SocketAddr::new(IpAddr::V4(Ipv4Addr::from(ip)), port)
    }

    lazy_static! {
        static ref CLIENT: SocketAddr = addr([192, 0, 2, 1], 40000);
        static ref OTHER_CLIENT: SocketAddr = addr([192, 0, 2, 2], 40001);
        static ref NS_CS: SocketAddr = addr([10, 0, 0, 30], 53);
        static ref NS_DEEP: SocketAddr = addr([10, 0, 0, 50], 53);
    }

    fn question(qname: &str) -> Question {
        Question {
            qname: name(qname),
            qtype: Type::A,
            qclass: Class::IN,
        }
    }

    fn encode(message: &Message) -> Vec<u8> {
        let mut octets = vec![0; MAX_MESSAGE_SIZE];
        let len = message.encode(&mut octets).unwrap();
        octets.truncate(len);
        octets
    }

    fn query(id: u16, qname: &str) -> Vec<u8> {
        encode(&Message {
            header: Header {
                id,
                rd: true,
                ..Header::default()
            },
            question: Some(question(qname)),
            ..Message::default()
        })
    }

    /// Builds a delegate's authoritative answer to `query`.
    fn answer(query: &Message, ip: Ipv4Addr) -> Vec<u8> {
        let question = query.question.clone().unwrap();
        encode(&Message {
            header: Header {
                id: query.header.id,
                qr: true,
                aa: true,
                ..Header::default()
            },
            answers: vec![Record::new(question.qname.clone(), Ttl::DEFAULT, Rdata::A(ip))],
            question: Some(question),
            ..Message::default()
        })
    }

    /// Builds a delegate's referral response to `query`, pointing at
    /// `ns.deep.example.` with or without glue.
    fn referral(query: &Message, glue: bool) -> Vec<u8> {
        let question = query.question.clone().unwrap();
        let target = name("ns.deep.example.");
        let additional = if glue {
            vec![Record::new(
                target.clone(),
                Ttl::DEFAULT,
                Rdata::A(Ipv4Addr::new(10, 0, 0, 50)),
            )]
        } else {
            Vec::new()
        };
        encode(&Message {
            header: Header {
                id: query.header.id,
                qr: true,
                ..Header::default()
            },
            authority: vec![Record::new(
                question.qname.clone(),
                Ttl::DEFAULT,
                Rdata::Ns(target),
            )],
            additional,
            question: Some(question),
            ..Message::default()
        })
    }

    fn decode(datagram: &Datagram) -> Message {
        Message::decode(&datagram.octets).unwrap()
    }

    #[test]
    fn authoritative_answer_end_to_end() {
        let server = server();
        let datagram = server
            .handle_message(&query(0x1234, "www.utexas.edu."), *CLIENT, Instant::now())
            .unwrap();
        assert_eq!(datagram.dest, *CLIENT);
        let response = decode(&datagram);
        assert_eq!(response.header.id, 0x1234);
        assert!(response.header.qr);
        assert!(response.header.aa);
        assert!(response.header.rd);
        assert_eq!(response.header.rcode, Rcode::NoError);
        assert_eq!(response.question, Some(question("www.utexas.edu.")));
        assert_eq!(response.answers.len(), 1);
        assert_eq!(response.answers[0].rdata, Rdata::A(Ipv4Addr::new(40, 0, 0, 10)));
    }

    #[test]
    fn missing_name_is_nxdomain() {
        let server = server();
        let datagram = server
            .handle_message(&query(1, "nosuch.utexas.edu."), *CLIENT, Instant::now())
            .unwrap();
        let response = decode(&datagram);
        assert!(response.header.aa);
        assert_eq!(response.header.rcode, Rcode::NxDomain);
    }

    #[test]
    fn malformed_messages_are_dropped() {
        let server = server();
        assert!(server
            .handle_message(b"\x12\x34\x01", *CLIENT, Instant::now())
            .is_none());
        let mut truncated = query(1, "www.utexas.edu.");
        truncated.truncate(truncated.len() - 3);
        assert!(server
            .handle_message(&truncated, *CLIENT, Instant::now())
            .is_none());
    }

    #[test]
    fn unsupported_queries_get_error_rcodes() {
        let server = server();

        let status = encode(&Message {
            header: Header {
                id: 1,
                opcode: Opcode::Status,
                ..Header::default()
            },
            ..Message::default()
        });
        let datagram = server.handle_message(&status, *CLIENT, Instant::now()).unwrap();
        assert_eq!(decode(&datagram).header.rcode, Rcode::NotImp);

        let empty = encode(&Message {
            header: Header {
                id: 2,
                ..Header::default()
            },
            ..Message::default()
        });
        let datagram = server.handle_message(&empty, *CLIENT, Instant::now()).unwrap();
        assert_eq!(decode(&datagram).header.rcode, Rcode::FormErr);

        let chaos = encode(&Message {
            header: Header {
                id: 3,
                ..Header::default()
            },
            question: Some(Question {
                qclass: Class::CH,
                ..question("www.utexas.edu.")
            }),
            ..Message::default()
        });
        let datagram = server.handle_message(&chaos, *CLIENT, Instant::now()).unwrap();
        assert_eq!(decode(&datagram).header.rcode, Rcode::Refused);
    }

    #[test]
    fn delegation_is_resolved_iteratively() {
        let server = server();
        let now = Instant::now();
        let upstream = server
            .handle_message(&query(0x1111, "aquila.cs.utexas.edu."), *CLIENT, now)
            .unwrap();
        assert_eq!(upstream.dest, *NS_CS);
        let upstream = decode(&upstream);
        assert!(!upstream.header.qr);
        assert!(upstream.header.rd);
        assert_eq!(upstream.question, Some(question("aquila.cs.utexas.edu.")));
        assert_eq!(server.active_sessions(), 1);

        let datagram = server
            .handle_message(&answer(&upstream, Ipv4Addr::new(10, 0, 0, 99)), *NS_CS, now)
            .unwrap();
        assert_eq!(datagram.dest, *CLIENT);
        assert_eq!(server.active_sessions(), 0);

        let response = decode(&datagram);
        assert_eq!(response.header.id, 0x1111);
        assert!(response.header.rd);
        assert_eq!(response.answers.len(), 1);
        assert_eq!(
            response.authority.last().unwrap(),
            &Record::new(
                name("aquila.cs.utexas.edu."),
                Ttl::DEFAULT,
                Rdata::Ns(name("ns.cs.utexas.edu.")),
            )
        );
        assert_eq!(
            response.additional.last().unwrap(),
            &Record::new(
                name("ns.cs.utexas.edu."),
                Ttl::DEFAULT,
                Rdata::A(Ipv4Addr::new(10, 0, 0, 30)),
            )
        );
    }

    #[test]
    fn out_of_order_responses_reach_the_right_clients() {
        let server = server();
        let now = Instant::now();
        let first = server
            .handle_message(&query(0xaaaa, "aquila.cs.utexas.edu."), *CLIENT, now)
            .map(|d| decode(&d))
            .unwrap();
        let second = server
            .handle_message(&query(0xbbbb, "vega.cs.utexas.edu."), *OTHER_CLIENT, now)
            .map(|d| decode(&d))
            .unwrap();
        assert_ne!(first.header.id, second.header.id);

        let datagram = server
            .handle_message(&answer(&second, Ipv4Addr::new(10, 0, 0, 2)), *NS_CS, now)
            .unwrap();
        assert_eq!(datagram.dest, *OTHER_CLIENT);
        let response = decode(&datagram);
        assert_eq!(response.header.id, 0xbbbb);
        assert_eq!(response.question, Some(question("vega.cs.utexas.edu.")));

        let datagram = server
            .handle_message(&answer(&first, Ipv4Addr::new(10, 0, 0, 1)), *NS_CS, now)
            .unwrap();
        assert_eq!(datagram.dest, *CLIENT);
        let response = decode(&datagram);
        assert_eq!(response.header.id, 0xaaaa);
        assert_eq!(response.answers[0].rdata, Rdata::A(Ipv4Addr::new(10, 0, 0, 1)));
    }

    #[test]
    fn spoofed_responses_are_ignored() {
        let server = server();
        let now = Instant::now();
        let upstream = server
            .handle_message(&query(1, "aquila.cs.utexas.edu."), *CLIENT, now)
            .map(|d| decode(&d))
            .unwrap();
        let good_answer = answer(&upstream, Ipv4Addr::new(10, 0, 0, 99));

        // Wrong source address.
        let spoofer = SocketAddr::new(IpAddr::V4(Ipv4Addr::new(203, 0, 113, 9)), 53);
        assert!(server.handle_message(&good_answer, spoofer, now).is_none());
        let wrong_port = SocketAddr::new(IpAddr::V4(Ipv4Addr::new(10, 0, 0, 30)), 5353);
        assert!(server.handle_message(&good_answer, wrong_port, now).is_none());

        // Wrong question.
        let mut other_question = upstream.clone();
        other_question.question = Some(question("vega.cs.utexas.edu."));
        let bad_answer = answer(&other_question, Ipv4Addr::new(10, 0, 0, 99));
        assert!(server.handle_message(&bad_answer, *NS_CS, now).is_none());

        // Unknown ID.
        let mut other_id = upstream.clone();
        other_id.header.id = upstream.header.id.wrapping_add(1);
        let stray = answer(&other_id, Ipv4Addr::new(10, 0, 0, 99));
        assert!(server.handle_message(&stray, *NS_CS, now).is_none());

        assert_eq!(server.active_sessions(), 1);
        assert!(server.handle_message(&good_answer, *NS_CS, now).is_some());
        assert_eq!(server.active_sessions(), 0);
    }

    #[test]
    fn mapped_ipv6_source_is_accepted() {
        let server = server();
        let now = Instant::now();
        let upstream = server
            .handle_message(&query(1, "aquila.cs.utexas.edu."), *CLIENT, now)
            .map(|d| decode(&d))
            .unwrap();
        let mapped = SocketAddr::new(
            IpAddr::V6(Ipv4Addr::new(10, 0, 0, 30).to_ipv6_mapped()),
            53,
        );
        assert!(server
            .handle_message(&answer(&upstream, Ipv4Addr::new(10, 0, 0, 99)), mapped, now)
            .is_some());
        let unmapped = SocketAddr::new(IpAddr::V6(Ipv6Addr::LOCALHOST), 53);
        assert_eq!(normalize_source(unmapped), unmapped);
    }

    #[test]
    fn referrals_are_followed() {
        let server = server();
        let now = Instant::now();
        let upstream = server
            .handle_message(&query(0x4242, "aquila.cs.utexas.edu."), *CLIENT, now)
            .map(|d| decode(&d))
            .unwrap();

        let next = server
            .handle_message(&referral(&upstream, true), *NS_CS, now)
            .unwrap();
        assert_eq!(next.dest, *NS_DEEP);
        let next = decode(&next);
        assert_eq!(next.header.id, upstream.header.id);
        assert_eq!(next.question, upstream.question);

        // The old delegate is no longer trusted.
        let answer_octets = answer(&next, Ipv4Addr::new(10, 0, 0, 77));
        assert!(server.handle_message(&answer_octets, *NS_CS, now).is_none());

        let datagram = server
            .handle_message(&answer_octets, *NS_DEEP, now)
            .unwrap();
        let response = decode(&datagram);
        assert_eq!(response.header.id, 0x4242);
        assert_eq!(
            response.additional.last().unwrap(),
            &Record::new(
                name("ns.deep.example."),
                Ttl::DEFAULT,
                Rdata::A(Ipv4Addr::new(10, 0, 0, 50)),
            )
        );
    }

    #[test]
    fn referral_outside_qname_is_not_followed() {
        let server = server();
        let now = Instant::now();
        let upstream = server
            .handle_message(&query(0x77, "aquila.cs.utexas.edu."), *CLIENT, now)
            .map(|d| decode(&d))
            .unwrap();
        let octets = encode(&Message {
            header: Header {
                id: upstream.header.id,
                qr: true,
                ..Header::default()
            },
            authority: vec![Record::new(
                name("example.com."),
                Ttl::DEFAULT,
                Rdata::Ns(name("ns.deep.example.")),
            )],
            additional: vec![Record::new(
                name("ns.deep.example."),
                Ttl::DEFAULT,
                Rdata::A(Ipv4Addr::new(10, 0, 0, 50)),
            )],
            question: upstream.question.clone(),
            ..Message::default()
        });

        let datagram = server.handle_message(&octets, *NS_CS, now).unwrap();
        assert_eq!(datagram.dest, *CLIENT);
        assert_eq!(decode(&datagram).header.id, 0x77);
        assert_eq!(server.active_sessions(), 0);
    }

    #[test]
    fn referral_hop_limit_is_enforced() {
        let mut server = server();
        server.set_max_referrals(1);
        let now = Instant::now();
        let upstream = server
            .handle_message(&query(9, "aquila.cs.utexas.edu."), *CLIENT, now)
            .map(|d| decode(&d))
            .unwrap();
        let next = server
            .handle_message(&referral(&upstream, true), *NS_CS, now)
            .map(|d| decode(&d))
            .unwrap();

        let datagram = server
            .handle_message(&referral(&next, true), *NS_DEEP, now)
            .unwrap();
        assert_eq!(datagram.dest, *CLIENT);
        let response = decode(&datagram);
        assert_eq!(response.header.id, 9);
        assert_eq!(response.header.rcode, Rcode::ServFail);
        assert_eq!(server.active_sessions(), 0);
    }

    #[test]
    fn referral_without_glue_fails() {
        let server = server();
        let now = Instant::now();
        let upstream = server
            .handle_message(&query(5, "aquila.cs.utexas.edu."), *CLIENT, now)
            .map(|d| decode(&d))
            .unwrap();
        let datagram = server
            .handle_message(&referral(&upstream, false), *NS_CS, now)
            .unwrap();
        assert_eq!(datagram.dest, *CLIENT);
        assert_eq!(decode(&datagram).header.rcode, Rcode::ServFail);
        assert_eq!(server.active_sessions(), 0);
    }

    #[test]
    fn delegation_without_glue_fails() {
        let server = server();
        let datagram = server
            .handle_message(&query(6, "www.ece.utexas.edu."), *CLIENT, Instant::now())
            .unwrap();
        assert_eq!(datagram.dest, *CLIENT);
        assert_eq!(decode(&datagram).header.rcode, Rcode::ServFail);
        assert_eq!(server.active_sessions(), 0);
    }

    #[test]
    fn timeout_sends_one_servfail() {
        let server = server();
        let now = Instant::now();
        let upstream = server
            .handle_message(&query(0x7777, "aquila.cs.utexas.edu."), *CLIENT, now)
            .map(|d| decode(&d))
            .unwrap();

        assert!(server.expire_sessions(now + Duration::from_secs(1)).is_empty());
        let expired = server.expire_sessions(now + DEFAULT_SESSION_TIMEOUT);
        assert_eq!(expired.len(), 1);
        assert_eq!(expired[0].dest, *CLIENT);
        let response = decode(&expired[0]);
        assert_eq!(response.header.id, 0x7777);
        assert_eq!(response.header.rcode, Rcode::ServFail);
        assert_eq!(response.question, Some(question("aquila.cs.utexas.edu.")));

        let late = answer(&upstream, Ipv4Addr::new(10, 0, 0, 99));
        assert!(server
            .handle_message(&late, *NS_CS, now + Duration::from_secs(4))
            .is_none());
        assert!(server.expire_sessions(now + Duration::from_secs(10)).is_empty());
    }

    #[test]
    fn authoritative_mode_returns_referrals() {
        let mut server = server();
        server.set_iterative(false);
        let datagram = server
            .handle_message(&query(3, "aquila.cs.utexas.edu."), *CLIENT, Instant::now())
            .unwrap();
        assert_eq!(datagram.dest, *CLIENT);
        let response = decode(&datagram);
        assert!(!response.header.aa);
        assert!(response.header.ra);
        assert_eq!(response.authority.len(), 1);
        assert_eq!(response.additional.len(), 1);
        assert_eq!(server.active_sessions(), 0);
    }
}
