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

//! Implementation of reading and writing of DNS messages.
//!
//! [`Reader`] and [`Writer`] work directly on buffers, one question or
//! record at a time. [`Message`] is the owned form built on top of
//! them, used wherever a whole message needs to be inspected (such as
//! a response relayed from another server).

use std::net::Ipv4Addr;

mod constants;
mod opcode;
mod question;
mod rcode;
pub mod reader;
pub mod writer;
pub use constants::MAX_MESSAGE_SIZE;
pub use opcode::Opcode;
pub use question::Question;
pub use rcode::Rcode;
pub use reader::Reader;
pub use writer::Writer;

use crate::name::Name;
use crate::rr::{Rdata, Record};

////////////////////////////////////////////////////////////////////////
// HEADERS                                                            //
////////////////////////////////////////////////////////////////////////

/// The fields of a message header other than the section counts, which
/// always follow from the sections themselves.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub struct Header {
    pub id: u16,
    pub qr: bool,
    pub opcode: Opcode,
    pub aa: bool,
    pub tc: bool,
    pub rd: bool,
    pub ra: bool,
    pub ad: bool,
    pub cd: bool,
    pub rcode: Rcode,
}

impl Default for Header {
    fn default() -> Self {
        Self {
            id: 0,
            qr: false,
            opcode: Opcode::Query,
            aa: false,
            tc: false,
            rd: false,
            ra: false,
            ad: false,
            cd: false,
            rcode: Rcode::NoError,
        }
    }
}

impl From<&Reader<'_>> for Header {
    fn from(reader: &Reader) -> Self {
        Self {
            id: reader.id(),
            qr: reader.qr(),
            opcode: reader.opcode(),
            aa: reader.aa(),
            tc: reader.tc(),
            rd: reader.rd(),
            ra: reader.ra(),
            ad: reader.ad(),
            cd: reader.cd(),
            rcode: reader.rcode(),
        }
    }
}

////////////////////////////////////////////////////////////////////////
// MESSAGES                                                           //
////////////////////////////////////////////////////////////////////////

/// A fully decoded DNS message.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct Message {
    pub header: Header,
    pub question: Option<Question>,
    pub answers: Vec<Record>,
    pub authority: Vec<Record>,
    pub additional: Vec<Record>,
}

impl Message {
    /// Decodes a whole message. At most one question is accepted, and
    /// nothing may follow the last record the header counts for.
    pub fn decode(octets: &[u8]) -> reader::Result<Self> {
        let mut reader = Reader::try_from(octets)?;
        let question = match reader.qdcount() {
            0 => None,
            1 => Some(reader.read_question()?),
            _ => return Err(reader::Error::TooManyQuestions),
        };
        let (ancount, nscount, arcount) = (reader.ancount(), reader.nscount(), reader.arcount());
        let answers = read_section(&mut reader, ancount)?;
        let authority = read_section(&mut reader, nscount)?;
        let additional = read_section(&mut reader, arcount)?;
        if !reader.at_eom() {
            return Err(reader::Error::TrailingData);
        }
        Ok(Self {
            header: Header::from(&reader),
            question,
            answers,
            authority,
            additional,
        })
    }

    /// Encodes the message into `buf`, returning its length. The whole
    /// buffer is available; a message that doesn't fit fails with
    /// [`writer::Error::Truncation`].
    pub fn encode(&self, buf: &mut [u8]) -> writer::Result<usize> {
        let mut writer = Writer::try_from(buf)?;
        writer.set_header(&self.header);
        if let Some(ref question) = self.question {
            writer.add_question(question)?;
        }
        for record in &self.answers {
            writer.add_answer(record)?;
        }
        for record in &self.authority {
            writer.add_authority(record)?;
        }
        for record in &self.additional {
            writer.add_additional(record)?;
        }
        Ok(writer.finish())
    }

    /// Extracts where a referral response for `qname` points.
    ///
    /// Only authority NS records owned by `qname` or one of its
    /// ancestors are considered. The first one whose target has an
    /// address in the additional section wins. Failing that, the first
    /// NS target is returned without an address. Messages without any
    /// such NS records are not referrals.
    pub fn referral(&self, qname: &Name) -> Option<Referral> {
        let mut first_without_glue = None;
        for record in &self.authority {
            if !qname.eq_or_subdomain_of(&record.owner) {
                continue;
            }
            if let Rdata::Ns(ref target) = record.rdata {
                if let Some(ip) = self.glue_for(target) {
                    return Some(Referral {
                        domain: target.clone(),
                        ip: Some(ip),
                    });
                }
                first_without_glue.get_or_insert(target);
            }
        }
        first_without_glue.map(|target| Referral {
            domain: target.clone(),
            ip: None,
        })
    }

    fn glue_for(&self, target: &Name) -> Option<Ipv4Addr> {
        self.additional.iter().find_map(|record| match record.rdata {
            Rdata::A(ip) if record.owner == *target => Some(ip),
            _ => None,
        })
    }
}

fn read_section(reader: &mut Reader, count: u16) -> reader::Result<Vec<Record>> {
    (0..count).map(|_| reader.read_rr()).collect()
}

/// The next server to ask, taken from a referral response.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Referral {
    pub domain: Name,
    pub ip: Option<Ipv4Addr>,
}

////////////////////////////////////////////////////////////////////////
// TESTS                                                              //
////////////////////////////////////////////////////////////////////////
