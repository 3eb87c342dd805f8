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

//! Implementation of the [`Writer`] type to write on-the-wire DNS
//! messages.

use std::collections::HashMap;
use std::fmt;

use super::constants::*;
use super::{Header, Question, Rcode};
use crate::name::Name;
use crate::rr::{Rdata, Record};

////////////////////////////////////////////////////////////////////////
// WRITER                                                             //
////////////////////////////////////////////////////////////////////////

/// A "frame" around a buffer that serializes a DNS message into it.
///
/// A `Writer` is constructed using [`Writer::new`] (to set a message
/// size limit smaller than the underlying buffer) or with its
/// [`TryFrom`] implementation (which uses the whole buffer). Either
/// way the limit must leave room for the 12-octet header, which starts
/// out zeroed.
///
/// Header fields can be set at any time. The question and records are
/// written sequentially, so they must be added in message order:
/// question, answer, authority, additional. Going backwards fails with
/// [`Error::OutOfOrder`].
///
/// Every addition is atomic. If it fails (most importantly with
/// [`Error::Truncation`], when the message would outgrow its limit)
/// the `Writer` is left exactly as it was before the call.
pub struct Writer<'a> {
    octets: &'a mut [u8],
    cursor: usize,
    limit: usize,
    rr_start: usize,
    section: Section,
    qdcount: u16,
    ancount: u16,
    nscount: u16,
    arcount: u16,
    compression: HashMap<Name, u16>,
}

/// The section of the message a [`Writer`] is currently serializing.
#[derive(Clone, Copy, Debug, Eq, Ord, PartialEq, PartialOrd)]
enum Section {
    Question,
    Answer,
    Authority,
    Additional,
}

impl<'a> Writer<'a> {
    /// Creates a new `Writer` from the underlying buffer `octets`. The
    /// message size is limited to `limit` or `octets.len()`, whichever
    /// is smaller. If that is too small to hold a header, this fails.
    pub fn new(octets: &'a mut [u8], limit: usize) -> Result<Self> {
        let limit = limit.min(octets.len());
        if limit < HEADER_SIZE {
            Err(Error::Truncation)
        } else {
            octets[0..HEADER_SIZE].fill(0);
            Ok(Self {
                octets,
                cursor: HEADER_SIZE,
                limit,
                rr_start: HEADER_SIZE,
                section: Section::Question,
                qdcount: 0,
                ancount: 0,
                nscount: 0,
                arcount: 0,
                compression: HashMap::new(),
            })
        }
    }

    /// Sets the 16-bit ID of the message.
    pub fn set_id(&mut self, id: u16) {
        self.write_u16(ID_START, id);
    }

    /// Sets or clears the QR (query response) bit.
    pub fn set_qr(&mut self, qr: bool) {
        self.set_flag(QR_BYTE, QR_MASK, qr);
    }

    /// Sets the message's opcode.
    pub fn set_opcode(&mut self, opcode: super::Opcode) {
        self.octets[OPCODE_BYTE] &= !OPCODE_MASK;
        self.octets[OPCODE_BYTE] |= (u8::from(opcode) << OPCODE_SHIFT) & OPCODE_MASK;
    }

    /// Sets or clears the AA (authoritative answer) bit.
    pub fn set_aa(&mut self, aa: bool) {
        self.set_flag(AA_BYTE, AA_MASK, aa);
    }

    /// Sets or clears the TC (truncation) bit.
    pub fn set_tc(&mut self, tc: bool) {
        self.set_flag(TC_BYTE, TC_MASK, tc);
    }

    /// Sets or clears the RD (recursion desired) bit.
    pub fn set_rd(&mut self, rd: bool) {
        self.set_flag(RD_BYTE, RD_MASK, rd);
    }

    /// Sets or clears the RA (recursion available) bit.
    pub fn set_ra(&mut self, ra: bool) {
        self.set_flag(RA_BYTE, RA_MASK, ra);
    }

    /// Sets or clears the AD (authentic data) bit.
    pub fn set_ad(&mut self, ad: bool) {
        self.set_flag(AD_BYTE, AD_MASK, ad);
    }

    /// Sets or clears the CD (checking disabled) bit.
    pub fn set_cd(&mut self, cd: bool) {
        self.set_flag(CD_BYTE, CD_MASK, cd);
    }

    /// Sets the message's RCODE.
    pub fn set_rcode(&mut self, rcode: Rcode) {
        self.octets[RCODE_BYTE] &= !RCODE_MASK;
        self.octets[RCODE_BYTE] |= u8::from(rcode) & RCODE_MASK;
    }

    /// Returns the message's current RCODE.
    pub fn rcode(&self) -> Rcode {
        (self.octets[RCODE_BYTE] & RCODE_MASK).into()
    }

    /// Writes every field of `header` at once.
    pub fn set_header(&mut self, header: &Header) {
        self.set_id(header.id);
        self.set_qr(header.qr);
        self.set_opcode(header.opcode);
        self.set_aa(header.aa);
        self.set_tc(header.tc);
        self.set_rd(header.rd);
        self.set_ra(header.ra);
        self.set_ad(header.ad);
        self.set_cd(header.cd);
        self.set_rcode(header.rcode);
    }

    /// Returns the current number of answer RRs in the message.
    pub fn ancount(&self) -> u16 {
        self.ancount
    }

    /// Returns the current number of authority RRs in the message.
    pub fn nscount(&self) -> u16 {
        self.nscount
    }

    /// Returns the current number of additional RRs in the message.
    pub fn arcount(&self) -> u16 {
        self.arcount
    }

    /// Adds a question to message. This must be used before any
    /// resource records are added.
    pub fn add_question(&mut self, question: &Question) -> Result<()> {
        if self.section != Section::Question {
            return Err(Error::OutOfOrder);
        }
        let new_qdcount = self.qdcount.checked_add(1).ok_or(Error::CountOverflow)?;
        self.with_rollback(|this| {
            this.write_name(&question.qname)?;
            this.try_push_u16(question.qtype.into())?;
            this.try_push_u16(question.qclass.into())
        })?;
        self.qdcount = new_qdcount;
        self.rr_start = self.cursor;
        Ok(())
    }

    /// Adds a record to the answer section.
    pub fn add_answer(&mut self, record: &Record) -> Result<()> {
        self.add_rr(Section::Answer, record)
    }

    /// Adds a record to the authority section.
    pub fn add_authority(&mut self, record: &Record) -> Result<()> {
        self.add_rr(Section::Authority, record)
    }

    /// Adds a record to the additional section.
    pub fn add_additional(&mut self, record: &Record) -> Result<()> {
        self.add_rr(Section::Additional, record)
    }

    /// Removes every record added so far, keeping the header and the
    /// question. This is how a response that cannot fit is turned into
    /// an error response.
    pub fn clear_records(&mut self) {
        self.ancount = 0;
        self.nscount = 0;
        self.arcount = 0;
        self.cursor = self.rr_start;
        self.section = Section::Question;
        let rr_start = self.rr_start;
        self.compression
            .retain(|_, pointer| (*pointer as usize) < rr_start);
    }

    /// Writes the section counts and returns the length of the
    /// finished message.
    pub fn finish(mut self) -> usize {
        self.write_u16(QDCOUNT_START, self.qdcount);
        self.write_u16(ANCOUNT_START, self.ancount);
        self.write_u16(NSCOUNT_START, self.nscount);
        self.write_u16(ARCOUNT_START, self.arcount);
        self.cursor
    }

    /// Adds `record` to `section`, which must not come before the
    /// current section.
    fn add_rr(&mut self, section: Section, record: &Record) -> Result<()> {
        if section < self.section {
            return Err(Error::OutOfOrder);
        }
        let count = match section {
            Section::Answer => self.ancount,
            Section::Authority => self.nscount,
            Section::Additional => self.arcount,
            Section::Question => return Err(Error::OutOfOrder),
        };
        let new_count = count.checked_add(1).ok_or(Error::CountOverflow)?;

        self.with_rollback(|this| {
            this.write_name(&record.owner)?;
            this.try_push_u16(record.rr_type().into())?;
            this.try_push_u16(record.class.into())?;
            this.try_push_u32(record.ttl.into())?;
            let rdlength_position = this.cursor;
            this.try_push_u16(0)?;
            this.write_rdata(&record.rdata)?;
            let rdlength = this.cursor - rdlength_position - 2;
            let rdlength = u16::try_from(rdlength).or(Err(Error::InvalidRdata))?;
            this.write_u16(rdlength_position, rdlength);
            Ok(())
        })?;

        self.section = section;
        match section {
            Section::Answer => self.ancount = new_count,
            Section::Authority => self.nscount = new_count,
            _ => self.arcount = new_count,
        }
        Ok(())
    }

    /// Writes RDATA. Names in the types defined by RFC 1035 are
    /// compressed; RFC 3597 § 4 forbids it for anything newer.
    fn write_rdata(&mut self, rdata: &Rdata) -> Result<()> {
        match rdata {
            Rdata::A(addr) => self.try_push(&addr.octets()),
            Rdata::Aaaa(addr) => self.try_push(&addr.octets()),
            Rdata::Ns(name) | Rdata::Cname(name) | Rdata::Ptr(name) => self.write_name(name),
            Rdata::Mx {
                preference,
                exchange,
            } => {
                self.try_push_u16(*preference)?;
                self.write_name(exchange)
            }
            Rdata::Txt(strings) => {
                for string in strings {
                    let len = u8::try_from(string.len()).or(Err(Error::InvalidRdata))?;
                    self.try_push(&[len])?;
                    self.try_push(string)?;
                }
                Ok(())
            }
            Rdata::Soa {
                mname,
                rname,
                serial,
                refresh,
                retry,
                expire,
                minimum,
            } => {
                self.write_name(mname)?;
                self.write_name(rname)?;
                for value in [serial, refresh, retry, expire, minimum] {
                    self.try_push_u32(*value)?;
                }
                Ok(())
            }
            Rdata::Unknown { octets, .. } => self.try_push(octets),
        }
    }

    /// Writes `name` at the cursor, ending it with a pointer to the
    /// longest suffix already in the message. Every new suffix that
    /// lands within pointer range is remembered for later names.
    fn write_name(&mut self, name: &Name) -> Result<()> {
        for skip in 0..name.len() {
            let suffix = match name.superdomain(skip) {
                Some(suffix) => suffix,
                None => break,
            };
            if let Some(&pointer) = self.compression.get(&suffix) {
                return self.try_push_u16(0xc000 | pointer);
            }
            if self.cursor <= POINTER_MAX {
                self.compression.insert(suffix, self.cursor as u16);
            }
            let label = &name[skip];
            self.try_push(&[label.len() as u8])?;
            self.try_push(label.octets())?;
        }
        self.try_push(&[0])
    }

    /// Executes `f(self)`, restoring the section, cursor and compression
    /// state first if the result is an error.
    fn with_rollback<F, T>(&mut self, f: F) -> Result<T>
    where
        F: FnOnce(&mut Self) -> Result<T>,
    {
        let saved_section = self.section;
        let saved_cursor = self.cursor;
        let result = f(self);
        if result.is_err() {
            self.section = saved_section;
            self.cursor = saved_cursor;
            self.compression
                .retain(|_, pointer| (*pointer as usize) < saved_cursor);
        }
        result
    }

    fn set_flag(&mut self, byte: usize, mask: u8, value: bool) {
        if value {
            self.octets[byte] |= mask;
        } else {
            self.octets[byte] &= !mask;
        }
    }

    /// Tries to write `data` to the underlying buffer at the current
    /// cursor, failing if there is not sufficient space.
    fn try_push(&mut self, data: &[u8]) -> Result<()> {
        if self.limit - self.cursor >= data.len() {
            self.octets[self.cursor..self.cursor + data.len()].copy_from_slice(data);
            self.cursor += data.len();
            Ok(())
        } else {
            Err(Error::Truncation)
        }
    }

    fn try_push_u16(&mut self, data: u16) -> Result<()> {
        self.try_push(&data.to_be_bytes())
    }

    fn try_push_u32(&mut self, data: u32) -> Result<()> {
        self.try_push(&data.to_be_bytes())
    }

    /// Writes `data` in network byte order at `position`, which must
    /// already be within the written part of the buffer.
    fn write_u16(&mut self, position: usize, data: u16) {
        self.octets[position..position + 2].copy_from_slice(&data.to_be_bytes());
    }
}

impl<'a> TryFrom<&'a mut [u8]> for Writer<'a> {
    type Error = Error;

    fn try_from(octets: &'a mut [u8]) -> Result<Self> {
        let limit = octets.len();
        Self::new(octets, limit)
    }
}

impl fmt::Debug for Writer<'_> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("Writer")
            .field("cursor", &self.cursor)
            .field("limit", &self.limit)
            .field("section", &self.section)
            .field("qdcount", &self.qdcount)
            .field("ancount", &self.ancount)
            .field("nscount", &self.nscount)
            .field("arcount", &self.arcount)
            .finish()
    }
}

////////////////////////////////////////////////////////////////////////
// ERRORS                                                             //
////////////////////////////////////////////////////////////////////////

/// An error signaling that a [`Writer`] operation failed.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum Error {
    /// A section count would have overflowed.
    CountOverflow,

    /// The message would have exceeded its size limit.
    Truncation,

    /// A question or record was added after a later section had been
    /// started.
    OutOfOrder,

    /// RDATA could not be serialized (e.g. a TXT string over 255
    /// octets).
    InvalidRdata,
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            Self::CountOverflow => f.write_str("record count would overflow"),
            Self::Truncation => f.write_str("message would be truncated"),
            Self::OutOfOrder => f.write_str("question or record serialized out of order"),
            Self::InvalidRdata => f.write_str("invalid RDATA"),
        }
    }
}

impl std::error::Error for Error {}

/// The type returned by fallible [`Writer`] methods.
pub type Result<T> = std::result::Result<T, Error>;

////////////////////////////////////////////////////////////////////////
// TESTS                                                              //
////////////////////////////////////////////////////////////////////////

#[cfg(test)]
mod tests {
    use std::net::Ipv4Addr;

    use lazy_static::lazy_static;

    use super::super::tests::EXAMPLE_COM_NS_RESPONSE;
    use super::super::Opcode;
    use super::*;
    use crate::class::Class;
    use crate::rr::{Ttl, Type};

    lazy_static! {
        static ref NAME: Name = "hopper.test.".parse().unwrap();
        static ref QUESTION: Question = Question {
            qname: NAME.clone(),
            qtype: Type::A,
            qclass: Class::IN,
        };
        static ref RECORD: Record = Record::new(
            NAME.clone(),
            Ttl::from(3600),
            Rdata::A(Ipv4Addr::new(127, 0, 0, 1)),
        );
    }

    #[test]
    fn writer_works() {
        let mut buf = vec![0; 512];
        let mut writer = Writer::try_from(buf.as_mut_slice()).unwrap();
        writer.set_id(0x0703);
        writer.set_opcode(Opcode::Query);
        writer.set_qr(true);
        writer.set_aa(true);
        writer.set_rcode(Rcode::NoError);
        writer.add_question(&QUESTION).unwrap();
        writer.add_answer(&RECORD).unwrap();
        let len = writer.finish();
        assert_eq!(
            &buf[0..len],
            b"\x07\x03\x84\x00\x00\x01\x00\x01\x00\x00\x00\x00\
              \x06hopper\x04test\x00\x00\x01\x00\x01\
              \xc0\x0c\x00\x01\x00\x01\x00\x00\x0e\x10\x00\x04\
              \x7f\x00\x00\x01"
        );
    }

    #[test]
    fn writer_compresses_rdata_names() {
        let owner: Name = "example.com.".parse().unwrap();
        let mut buf = [0; 512];
        let mut writer = Writer::try_from(buf.as_mut_slice()).unwrap();
        writer.set_id(0x0703);
        writer.set_qr(true);
        writer.set_aa(true);
        writer.set_rd(true);
        writer
            .add_question(&Question {
                qname: owner.clone(),
                qtype: Type::NS,
                qclass: Class::IN,
            })
            .unwrap();
        for target in ["a.iana-servers.net.", "b.iana-servers.net."] {
            let rdata = Rdata::Ns(target.parse().unwrap());
            writer
                .add_answer(&Record::new(owner.clone(), Ttl::from(86400), rdata))
                .unwrap();
        }
        let len = writer.finish();
        assert_eq!(&buf[..len], EXAMPLE_COM_NS_RESPONSE);
    }

    #[test]
    fn writer_enforces_ordering() {
        let mut buf = [0; 512];
        let mut writer = Writer::try_from(buf.as_mut_slice()).unwrap();
        writer.add_question(&QUESTION).unwrap();
        writer.add_additional(&RECORD).unwrap();
        assert_eq!(writer.add_authority(&RECORD), Err(Error::OutOfOrder));
        assert_eq!(writer.add_answer(&RECORD), Err(Error::OutOfOrder));
        assert_eq!(writer.add_question(&QUESTION), Err(Error::OutOfOrder));
        writer.add_additional(&RECORD).unwrap();
        assert_eq!(writer.arcount(), 2);
    }

    #[test]
    fn writer_rolls_back_on_truncation() {
        // Header (12) + question (17) + one compressed A record (16),
        // with ten octets to spare.
        let mut buf = [0; 512];
        let mut writer = Writer::new(buf.as_mut_slice(), 12 + 17 + 16 + 10).unwrap();
        writer.add_question(&QUESTION).unwrap();
        writer.add_answer(&RECORD).unwrap();
        assert_eq!(writer.add_answer(&RECORD), Err(Error::Truncation));
        assert_eq!(writer.ancount(), 1);

        // This one gets as far as the TTL before running out of room.
        let other = Record::new(
            "x.hopper.test.".parse().unwrap(),
            Ttl::from(3600),
            Rdata::A(Ipv4Addr::LOCALHOST),
        );
        assert_eq!(writer.add_authority(&other), Err(Error::Truncation));
        let len = writer.finish();
        assert_eq!(len, 45);
        assert_eq!(&buf[6..8], b"\x00\x01");
        assert_eq!(&buf[8..10], b"\x00\x00");
    }

    #[test]
    fn clear_records_keeps_question() {
        let mut buf = [0; 512];
        let mut writer = Writer::try_from(buf.as_mut_slice()).unwrap();
        writer.add_question(&QUESTION).unwrap();
        writer.add_answer(&RECORD).unwrap();
        writer.add_additional(&RECORD).unwrap();
        writer.clear_records();
        writer.set_rcode(Rcode::ServFail);
        writer.add_answer(&RECORD).unwrap();
        let len = writer.finish();
        assert_eq!(len, 12 + 17 + 16);
        assert_eq!(buf[3], 0x02);
        assert_eq!(&buf[6..12], b"\x00\x01\x00\x00\x00\x00");
    }

    #[test]
    fn writer_rejects_short_buffers() {
        let mut buf = [0; 11];
        assert_eq!(
            Writer::try_from(buf.as_mut_slice()).err(),
            Some(Error::Truncation)
        );
        let mut buf = [0; 512];
        assert_eq!(
            Writer::new(buf.as_mut_slice(), 11).err(),
            Some(Error::Truncation)
        );
    }
}
