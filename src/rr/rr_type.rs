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

//! The [`Type`] structure for RR types.

use std::fmt;
use std::str::FromStr;

use crate::util::parse_generic_mnemonic;

/// The type of a resource record (or the QTYPE of a question).
///
/// On the wire this is a `u16`, so `Type` wraps one. Constants cover
/// the types this server understands, plus `OPT` (which shows up in
/// the additional section of many queries) and the `ANY` QTYPE. Any
/// other value still round-trips and displays in the RFC 3597 generic
/// form.
#[derive(Clone, Copy, Eq, Hash, PartialEq, PartialOrd, Ord)]
pub struct Type(u16);

impl Type {
    pub const A: Type = Type(1);
    pub const NS: Type = Type(2);
    pub const CNAME: Type = Type(5);
    pub const SOA: Type = Type(6);
    pub const PTR: Type = Type(12);
    pub const MX: Type = Type(15);
    pub const TXT: Type = Type(16);
    pub const AAAA: Type = Type(28);
    pub const OPT: Type = Type(41);
    pub const ANY: Type = Type(255);
}

impl From<u16> for Type {
    fn from(raw: u16) -> Self {
        Self(raw)
    }
}

impl From<Type> for u16 {
    fn from(rr_type: Type) -> Self {
        rr_type.0
    }
}

impl FromStr for Type {
    type Err = &'static str;

    fn from_str(text: &str) -> Result<Self, Self::Err> {
        match text.to_ascii_uppercase().as_str() {
            "A" => Ok(Self::A),
            "NS" => Ok(Self::NS),
            "CNAME" => Ok(Self::CNAME),
            "SOA" => Ok(Self::SOA),
            "PTR" => Ok(Self::PTR),
            "MX" => Ok(Self::MX),
            "TXT" => Ok(Self::TXT),
            "AAAA" => Ok(Self::AAAA),
            "OPT" => Ok(Self::OPT),
            "ANY" => Ok(Self::ANY),
            _ => parse_generic_mnemonic(text, "TYPE")
                .unwrap_or(Err("unknown type"))
                .map(Self),
        }
    }
}

impl fmt::Debug for Type {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{self}")
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let mnemonic = match *self {
            Self::A => "A",
            Self::NS => "NS",
            Self::CNAME => "CNAME",
            Self::SOA => "SOA",
            Self::PTR => "PTR",
            Self::MX => "MX",
            Self::TXT => "TXT",
            Self::AAAA => "AAAA",
            Self::OPT => "OPT",
            Self::ANY => "ANY",
            Self(value) => return write!(f, "TYPE{value}"),
        };
        f.write_str(mnemonic)
    }
}

////////////////////////////////////////////////////////////////////////
// TESTS                                                              //
////////////////////////////////////////////////////////////////////////

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mnemonics_round_trip() {
        for rr_type in [Type::A, Type::AAAA, Type::NS, Type::PTR, Type::MX] {
            assert_eq!(rr_type.to_string().parse::<Type>(), Ok(rr_type));
        }
        assert_eq!("aaaa".parse::<Type>(), Ok(Type::AAAA));
    }

    #[test]
    fn unknown_types_use_generic_form() {
        assert_eq!(Type::from(0xff00).to_string(), "TYPE65280");
        assert_eq!("TYPE12".parse::<Type>(), Ok(Type::PTR));
        assert!("NOPE".parse::<Type>().is_err());
    }
}
