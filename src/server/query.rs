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

//! Answering a question from the zone tree.
//!
//! [`resolve`] decides what the answer is, and [`write_response`] puts
//! that decision into a response message. Keeping the two apart lets
//! the [`Server`](super::Server) act on a delegation (by following it)
//! instead of just writing it out.

use std::net::Ipv4Addr;

use crate::message::{writer, Question, Rcode, Writer};
use crate::name::Name;
use crate::rr::{Rdata, Record, Rrset, Type};
use crate::zone::{FindMode, ZoneNode, ZoneTree};

/// What the zone tree has to say about a question.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Outcome {
    /// Records of the requested type at the requested name.
    Answer(Vec<Record>),

    /// The name lies in (or at) a delegated child zone.
    Delegation(Delegation),

    /// Nothing matching was found.
    NxDomain,
}

/// The data needed to refer a client to a child zone, or to continue
/// resolution there.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Delegation {
    /// The NS records at the cut.
    pub ns: Vec<Record>,

    /// A records for the nameservers named in `ns`.
    pub glue: Vec<Record>,

    /// The first glue address found, which is where an iterative query
    /// goes next.
    pub delegate_ip: Option<Ipv4Addr>,

    /// The nameserver `delegate_ip` belongs to.
    pub delegate_domain: Option<Name>,
}

/// Looks up `question` in `tree`.
///
/// 1. The zone owning QNAME is located. If there is none, the result is
///    [`Outcome::NxDomain`].
/// 2. The zone's tree is searched for QNAME, stopping at any cut.
/// 3. If the search stopped at a cut above QNAME, QNAME has been
///    delegated.
/// 4. On an exact match, the RRset of type QTYPE is the answer (every
///    RRset, for QTYPE `ANY`).
/// 5. An exact match at a cut without records of type QTYPE is also
///    treated as delegated.
/// 6. Anything else is [`Outcome::NxDomain`]. This includes a name that
///    exists but has no records of type QTYPE.
pub fn resolve(tree: &ZoneTree, question: &Question) -> Outcome {
    let qname = &question.qname;
    let zone = match tree.find_zone(qname) {
        Some(zone) => zone,
        None => return Outcome::NxDomain,
    };
    let found = match zone.root.find(qname, zone.relative_len, FindMode::Record) {
        Some(found) => found,
        None => return Outcome::NxDomain,
    };
    let node = found.node;

    if node.zone.is_some() && found.remaining > 0 {
        return delegation(tree, qname, found.remaining, node).unwrap_or(Outcome::NxDomain);
    }

    if found.remaining == 0 {
        let answers = answer_records(node, question);
        if !answers.is_empty() {
            return Outcome::Answer(answers);
        }
        if node.zone.is_some() {
            if let Some(outcome) = delegation(tree, qname, 0, node) {
                return outcome;
            }
        }
    }

    Outcome::NxDomain
}

/// Builds the answer for an exact match. Records carry QNAME as the
/// client spelled it.
fn answer_records(node: &ZoneNode, question: &Question) -> Vec<Record> {
    let to_records = |rrset: &Rrset| {
        rrset
            .rdatas
            .iter()
            .map(|rdata| Record::new(question.qname.clone(), rrset.ttl, rdata.clone()))
            .collect::<Vec<_>>()
    };
    if question.qtype == Type::ANY {
        node.rrsets.iter().flat_map(to_records).collect()
    } else {
        node.rrsets
            .lookup(question.qtype)
            .map(to_records)
            .unwrap_or_default()
    }
}

/// Builds the delegation at `cut`, which stands for QNAME with its
/// first `remaining` labels removed. Returns `None` if there is no NS
/// set to refer to.
fn delegation(tree: &ZoneTree, qname: &Name, remaining: usize, cut: &ZoneNode) -> Option<Outcome> {
    let child_apex = qname.superdomain(remaining)?;
    let ns_rrset = cut
        .zone
        .as_deref()
        .and_then(|sub_zone| sub_zone.rrsets.lookup(Type::NS))
        .or_else(|| cut.rrsets.lookup(Type::NS))?;

    let mut ns = Vec::with_capacity(ns_rrset.rdatas.len());
    let mut glue = Vec::new();
    let mut delegate = None;
    for rdata in &ns_rrset.rdatas {
        ns.push(Record::new(child_apex.clone(), ns_rrset.ttl, rdata.clone()));
        if let Rdata::Ns(ref target) = rdata {
            if let Some(found) = tree.glue_addresses(target) {
                for ip in found.addresses {
                    delegate.get_or_insert_with(|| (ip, target.clone()));
                    glue.push(Record::new(target.clone(), found.ttl, Rdata::A(ip)));
                }
            }
        }
    }

    let (delegate_ip, delegate_domain) = match delegate {
        Some((ip, domain)) => (Some(ip), Some(domain)),
        None => (None, None),
    };
    Some(Outcome::Delegation(Delegation {
        ns,
        glue,
        delegate_ip,
        delegate_domain,
    }))
}

/// Writes `outcome` into a response whose header (ID, opcode, RD, QR)
/// and question have already been written.
///
/// Glue that doesn't fit is left out. If the answer or the NS records
/// themselves don't fit, the response is turned into a SERVFAIL with
/// just the question.
pub fn write_response(response: &mut Writer, outcome: &Outcome) -> writer::Result<()> {
    let fits = match outcome {
        Outcome::Answer(answers) => {
            response.set_aa(true);
            response.set_rcode(Rcode::NoError);
            execute_allowing_truncation(|| {
                answers
                    .iter()
                    .try_for_each(|record| response.add_answer(record))
            })?
        }
        Outcome::Delegation(delegation) => {
            response.set_aa(false);
            response.set_ra(true);
            response.set_rcode(Rcode::NoError);
            let fits = execute_allowing_truncation(|| {
                delegation
                    .ns
                    .iter()
                    .try_for_each(|record| response.add_authority(record))
            })?;
            if fits {
                for record in &delegation.glue {
                    execute_allowing_truncation(|| response.add_additional(record))?;
                }
            }
            fits
        }
        Outcome::NxDomain => {
            response.set_aa(true);
            response.set_rcode(Rcode::NxDomain);
            true
        }
    };

    if !fits {
        response.clear_records();
        response.set_aa(false);
        response.set_rcode(Rcode::ServFail);
    }
    Ok(())
}

/// Executes `f`, without returning an error if `f` itself fails with
/// [`writer::Error::Truncation`]. On success, this returns `Ok(true)`
/// if everything fit and `Ok(false)` if not.
fn execute_allowing_truncation(f: impl FnOnce() -> writer::Result<()>) -> writer::Result<bool> {
    match f() {
        Err(writer::Error::Truncation) => Ok(false),
        result => result.and(Ok(true)),
    }
}

////////////////////////////////////////////////////////////////////////
// TESTS                                                              //
////////////////////////////////////////////////////////////////////////

#[cfg(test)]
mod tests {
    use lazy_static::lazy_static;

    use super::*;
    use crate::class::Class;
    use crate::message::{Message, Reader};
    use crate::rr::Ttl;

    lazy_static! {
        static ref UTEXAS: Name = "utexas.edu.".parse().unwrap();
        static ref NS_CS: Name = "ns.cs.utexas.edu.".parse().unwrap();
        static ref TREE: ZoneTree = {
            let mut tree = ZoneTree::new();
            tree.create_zone(&UTEXAS).unwrap();
            tree.add_record(&UTEXAS, "www", Some(Ipv4Addr::new(40, 0, 0, 10)), None)
                .unwrap();
            tree.add_record(&UTEXAS, "cs", None, Some(&NS_CS)).unwrap();
            tree.add_record(&UTEXAS, "ns.cs", Some(Ipv4Addr::new(10, 0, 0, 30)), None)
                .unwrap();
            tree.add_record(&UTEXAS, "cs", Some(Ipv4Addr::new(10, 0, 0, 31)), None)
                .unwrap();
            tree.add_record(&UTEXAS, "multi", Some(Ipv4Addr::new(10, 1, 0, 1)), None)
                .unwrap();
            tree.add_record(&UTEXAS, "multi", Some(Ipv4Addr::new(10, 1, 0, 2)), None)
                .unwrap();

            let arpa: Name = "in-addr.arpa.".parse().unwrap();
            tree.create_zone(&arpa).unwrap();
            let cs: Name = "cs.utexas.edu.".parse().unwrap();
            tree.add_ptr_record(&arpa, Ipv4Addr::new(40, 0, 0, 10), &cs)
                .unwrap();
            tree
        };
    }

    fn question(qname: &str, qtype: Type) -> Question {
        Question {
            qname: qname.parse().unwrap(),
            qtype,
            qclass: Class::IN,
        }
    }

    #[test]
    fn exact_match_answers() {
        let outcome = resolve(&TREE, &question("WWW.utexas.edu.", Type::A));
        let expected = Record::new(
            "WWW.utexas.edu.".parse().unwrap(),
            Ttl::DEFAULT,
            Rdata::A(Ipv4Addr::new(40, 0, 0, 10)),
        );
        assert_eq!(outcome, Outcome::Answer(vec![expected]));
    }

    #[test]
    fn whole_rrset_is_returned_in_order() {
        match resolve(&TREE, &question("multi.utexas.edu.", Type::A)) {
            Outcome::Answer(answers) => {
                let ips: Vec<_> = answers.iter().map(|r| r.rdata.clone()).collect();
                assert_eq!(
                    ips,
                    [
                        Rdata::A(Ipv4Addr::new(10, 1, 0, 1)),
                        Rdata::A(Ipv4Addr::new(10, 1, 0, 2))
                    ]
                );
            }
            other => panic!("expected an answer, got {other:?}"),
        }
    }

    #[test]
    fn missing_names_and_types_are_nxdomain() {
        assert_eq!(
            resolve(&TREE, &question("nosuch.utexas.edu.", Type::A)),
            Outcome::NxDomain
        );
        assert_eq!(
            resolve(&TREE, &question("www.utexas.edu.", Type::MX)),
            Outcome::NxDomain
        );
        assert_eq!(
            resolve(&TREE, &question("www.example.com.", Type::A)),
            Outcome::NxDomain
        );
    }

    #[test]
    fn names_below_cut_are_delegated() {
        let outcome = resolve(&TREE, &question("aquila.cs.utexas.edu.", Type::A));
        let delegation = match outcome {
            Outcome::Delegation(delegation) => delegation,
            other => panic!("expected a delegation, got {other:?}"),
        };
        assert_eq!(delegation.delegate_ip, Some(Ipv4Addr::new(10, 0, 0, 30)));
        assert_eq!(delegation.delegate_domain, Some(NS_CS.clone()));
        assert_eq!(delegation.ns.len(), 1);
        assert_eq!(delegation.ns[0].owner, "cs.utexas.edu.".parse().unwrap());
        assert_eq!(delegation.glue.len(), 1);
    }

    #[test]
    fn glue_keeps_its_configured_ttl() {
        let mut tree = ZoneTree::new();
        tree.create_zone(&UTEXAS).unwrap();
        let ttl = Ttl::from(600);
        tree.add_rdata(&UTEXAS, "cs", Rdata::Ns(NS_CS.clone()), ttl)
            .unwrap();
        tree.add_rdata(&UTEXAS, "ns.cs", Rdata::A(Ipv4Addr::new(10, 0, 0, 30)), ttl)
            .unwrap();
        match resolve(&tree, &question("aquila.cs.utexas.edu.", Type::A)) {
            Outcome::Delegation(delegation) => {
                assert_eq!(delegation.ns[0].ttl, ttl);
                assert_eq!(delegation.glue[0].ttl, ttl);
            }
            other => panic!("expected a delegation, got {other:?}"),
        }
    }

    #[test]
    fn exact_match_at_cut() {
        // The parent has an A record at the cut, so that is answered.
        assert!(matches!(
            resolve(&TREE, &question("cs.utexas.edu.", Type::A)),
            Outcome::Answer(_)
        ));
        // Anything else at the cut is delegated.
        assert!(matches!(
            resolve(&TREE, &question("cs.utexas.edu.", Type::TXT)),
            Outcome::Delegation(_)
        ));
    }

    #[test]
    fn ptr_lookup_works() {
        let outcome = resolve(&TREE, &question("10.0.0.40.in-addr.arpa.", Type::PTR));
        let expected = Record::new(
            "10.0.0.40.in-addr.arpa.".parse().unwrap(),
            Ttl::DEFAULT,
            Rdata::Ptr("cs.utexas.edu.".parse().unwrap()),
        );
        assert_eq!(outcome, Outcome::Answer(vec![expected]));
    }

    /// Writes the response to `qname`/`qtype` with a message size limit
    /// of `limit` and decodes it again.
    fn respond(qname: &str, qtype: Type, limit: usize) -> Message {
        let question = question(qname, qtype);
        let outcome = resolve(&TREE, &question);
        let mut buf = [0; 512];
        let mut writer = Writer::new(&mut buf, limit).unwrap();
        writer.set_qr(true);
        writer.add_question(&question).unwrap();
        write_response(&mut writer, &outcome).unwrap();
        let len = writer.finish();
        assert!(Reader::try_from(&buf[..len]).is_ok());
        Message::decode(&buf[..len]).unwrap()
    }

    #[test]
    fn answer_response_is_authoritative() {
        let response = respond("www.utexas.edu.", Type::A, 512);
        assert!(response.header.aa);
        assert_eq!(response.header.rcode, Rcode::NoError);
        assert_eq!(response.answers.len(), 1);

        let response = respond("nosuch.utexas.edu.", Type::A, 512);
        assert!(response.header.aa);
        assert_eq!(response.header.rcode, Rcode::NxDomain);
        assert!(response.answers.is_empty());
    }

    #[test]
    fn delegation_response_has_glue() {
        let response = respond("aquila.cs.utexas.edu.", Type::A, 512);
        assert!(!response.header.aa);
        assert!(response.header.ra);
        assert_eq!(response.authority.len(), 1);
        assert_eq!(response.additional.len(), 1);
        assert_eq!(
            response.additional[0].rdata,
            Rdata::A(Ipv4Addr::new(10, 0, 0, 30))
        );
    }

    #[test]
    fn glue_is_omitted_under_tight_limit() {
        // Header (12), question (26) and the NS record (2 + 10 + 5).
        let response = respond("aquila.cs.utexas.edu.", Type::A, 12 + 26 + 17);
        assert_eq!(response.header.rcode, Rcode::NoError);
        assert_eq!(response.authority.len(), 1);
        assert!(response.additional.is_empty());
    }

    #[test]
    fn servfail_when_authority_does_not_fit() {
        let response = respond("aquila.cs.utexas.edu.", Type::A, 12 + 26 + 10);
        assert_eq!(response.header.rcode, Rcode::ServFail);
        assert!(response.question.is_some());
        assert!(response.authority.is_empty());
    }
}
