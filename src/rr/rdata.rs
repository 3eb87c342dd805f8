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

//! The [`Rdata`] type and its wire parsing.

use std::fmt;
use std::net::{Ipv4Addr, Ipv6Addr};

use super::Type;
use crate::name::{self, Name};

/// The longest a TXT `<character-string>` can be.
pub const MAX_CHARACTER_STRING_LEN: usize = 255;

/// The data of a resource record.
///
/// Types this server knows how to serve get a structured variant.
/// Everything else is carried as [`Rdata::Unknown`], whose octets are
/// passed through unchanged ([RFC 3597]). Embedded names are decoded
/// (and decompressed) on reading; the [`Writer`](crate::message::Writer)
/// recompresses them where RFC 3597 § 4 allows.
///
/// [RFC 3597]: https://datatracker.ietf.org/doc/html/rfc3597
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Rdata {
    A(Ipv4Addr),
    Aaaa(Ipv6Addr),
    Ns(Name),
    Cname(Name),
    Ptr(Name),
    Mx {
        preference: u16,
        exchange: Name,
    },
    Txt(Vec<Vec<u8>>),
    Soa {
        mname: Name,
        rname: Name,
        serial: u32,
        refresh: u32,
        retry: u32,
        expire: u32,
        minimum: u32,
    },
    Unknown {
        rr_type: Type,
        octets: Vec<u8>,
    },
}

impl Rdata {
    /// Builds TXT RDATA out of `strings`. Each one must fit in a
    /// `<character-string>`, and there must be at least one.
    pub fn txt<I, S>(strings: I) -> Result<Self, ReadRdataError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<[u8]>,
    {
        let strings: Vec<Vec<u8>> = strings
            .into_iter()
            .map(|s| s.as_ref().to_vec())
            .collect();
        if strings.is_empty() {
            Err(ReadRdataError::UnexpectedEom)
        } else if strings.iter().any(|s| s.len() > MAX_CHARACTER_STRING_LEN) {
            Err(ReadRdataError::Other)
        } else {
            Ok(Self::Txt(strings))
        }
    }

    /// Returns the RR type this RDATA belongs to.
    pub fn rr_type(&self) -> Type {
        match self {
            Self::A(_) => Type::A,
            Self::Aaaa(_) => Type::AAAA,
            Self::Ns(_) => Type::NS,
            Self::Cname(_) => Type::CNAME,
            Self::Ptr(_) => Type::PTR,
            Self::Mx { .. } => Type::MX,
            Self::Txt(_) => Type::TXT,
            Self::Soa { .. } => Type::SOA,
            Self::Unknown { rr_type, .. } => *rr_type,
        }
    }

    /// Reads RDATA of type `rr_type` that begins at index `start` of
    /// `message` and is `rdlength` octets long.
    ///
    /// The whole message is needed since embedded names may be
    /// compressed. Every octet of the RDATA must be accounted for:
    /// fixed-size types must have exactly the right length, and
    /// names must end exactly where the RDATA (or the next field)
    /// does.
    pub fn read(
        rr_type: Type,
        message: &[u8],
        start: usize,
        rdlength: u16,
    ) -> Result<Self, ReadRdataError> {
        let end = start + rdlength as usize;
        let rdata = message.get(start..end).ok_or(ReadRdataError::UnexpectedEom)?;

        match rr_type {
            Type::A => {
                let octets: [u8; 4] = rdata.try_into().map_err(|_| ReadRdataError::Other)?;
                Ok(Self::A(octets.into()))
            }
            Type::AAAA => {
                let octets: [u8; 16] = rdata.try_into().map_err(|_| ReadRdataError::Other)?;
                Ok(Self::Aaaa(octets.into()))
            }
            Type::NS => read_single_name(message, start, end).map(Self::Ns),
            Type::CNAME => read_single_name(message, start, end).map(Self::Cname),
            Type::PTR => read_single_name(message, start, end).map(Self::Ptr),
            Type::MX => {
                let preference = read_u16(rdata)?;
                let exchange = read_single_name(message, start + 2, end)?;
                Ok(Self::Mx {
                    preference,
                    exchange,
                })
            }
            Type::TXT => read_txt(rdata),
            Type::SOA => {
                let (mname, mname_len) = read_name(message, start, end)?;
                let (rname, rname_len) = read_name(message, start + mname_len, end)?;
                let fixed = &rdata[mname_len + rname_len..];
                if fixed.len() != 20 {
                    return Err(ReadRdataError::Other);
                }
                Ok(Self::Soa {
                    mname,
                    rname,
                    serial: read_u32(&fixed[0..])?,
                    refresh: read_u32(&fixed[4..])?,
                    retry: read_u32(&fixed[8..])?,
                    expire: read_u32(&fixed[12..])?,
                    minimum: read_u32(&fixed[16..])?,
                })
            }
            _ => Ok(Self::Unknown {
                rr_type,
                octets: rdata.to_vec(),
            }),
        }
    }
}

/// Reads a name at `start` that must not run past `end`, returning it
/// with the number of octets it took up.
fn read_name(message: &[u8], start: usize, end: usize) -> Result<(Name, usize), ReadRdataError> {
    let (name, len) = Name::try_from_compressed(message, start)?;
    if start + len > end {
        Err(ReadRdataError::UnexpectedEom)
    } else {
        Ok((name, len))
    }
}

/// Reads a name at `start` that must end exactly at `end`.
fn read_single_name(message: &[u8], start: usize, end: usize) -> Result<Name, ReadRdataError> {
    let (name, len) = read_name(message, start, end)?;
    if start + len == end {
        Ok(name)
    } else {
        Err(ReadRdataError::Other)
    }
}

fn read_txt(mut rdata: &[u8]) -> Result<Rdata, ReadRdataError> {
    let mut strings = Vec::new();
    while let Some((&len, rest)) = rdata.split_first() {
        let string = rest
            .get(..len as usize)
            .ok_or(ReadRdataError::UnexpectedEom)?;
        strings.push(string.to_vec());
        rdata = &rest[len as usize..];
    }
    if strings.is_empty() {
        Err(ReadRdataError::UnexpectedEom)
    } else {
        Ok(Rdata::Txt(strings))
    }
}

fn read_u16(octets: &[u8]) -> Result<u16, ReadRdataError> {
    match octets.get(0..2) {
        Some(&[hi, lo]) => Ok(u16::from_be_bytes([hi, lo])),
        _ => Err(ReadRdataError::UnexpectedEom),
    }
}

fn read_u32(octets: &[u8]) -> Result<u32, ReadRdataError> {
    match octets.get(0..4) {
        Some(&[a, b, c, d]) => Ok(u32::from_be_bytes([a, b, c, d])),
        _ => Err(ReadRdataError::UnexpectedEom),
    }
}

////////////////////////////////////////////////////////////////////////
// PRESENTATION FORMAT                                                //
////////////////////////////////////////////////////////////////////////

impl fmt::Display for Rdata {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::A(addr) => write!(f, "{addr}"),
            Self::Aaaa(addr) => write!(f, "{addr}"),
            Self::Ns(name) | Self::Cname(name) | Self::Ptr(name) => write!(f, "{name}"),
            Self::Mx {
                preference,
                exchange,
            } => write!(f, "{preference} {exchange}"),
            Self::Txt(strings) => {
                for (i, string) in strings.iter().enumerate() {
                    if i > 0 {
                        f.write_str(" ")?;
                    }
                    write_character_string(f, string)?;
                }
                Ok(())
            }
            Self::Soa {
                mname,
                rname,
                serial,
                refresh,
                retry,
                expire,
                minimum,
            } => write!(
                f,
                "{mname} {rname} {serial} {refresh} {retry} {expire} {minimum}"
            ),
            Self::Unknown { octets, .. } => {
                // RFC 3597 § 5 generic encoding.
                write!(f, "\\# {}", octets.len())?;
                if !octets.is_empty() {
                    f.write_str(" ")?;
                    for octet in octets {
                        write!(f, "{octet:02x}")?;
                    }
                }
                Ok(())
            }
        }
    }
}

fn write_character_string(f: &mut fmt::Formatter, string: &[u8]) -> fmt::Result {
    f.write_str("\"")?;
    for &octet in string {
        if octet == b'"' || octet == b'\\' {
            write!(f, "\\{}", octet as char)?;
        } else if (0x20..0x7f).contains(&octet) {
            write!(f, "{}", octet as char)?;
        } else {
            write!(f, "\\{octet:03}")?;
        }
    }
    f.write_str("\"")
}

////////////////////////////////////////////////////////////////////////
// ERRORS                                                             //
////////////////////////////////////////////////////////////////////////

/// An error signaling that RDATA could not be read or built.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum ReadRdataError {
    InvalidName(name::Error),
    UnexpectedEom,
    Other,
}

impl fmt::Display for ReadRdataError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::InvalidName(err) => write!(f, "invalid embedded domain name: {err}"),
            Self::UnexpectedEom => f.write_str("unexpected end of RDATA"),
            Self::Other => f.write_str("invalid RDATA"),
        }
    }
}

impl std::error::Error for ReadRdataError {}

impl From<name::Error> for ReadRdataError {
    fn from(err: name::Error) -> Self {
        Self::InvalidName(err)
    }
}

////////////////////////////////////////////////////////////////////////
// TESTS                                                              //
////////////////////////////////////////////////////////////////////////
