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

//! Data structures and routines for handling DNS resource records.

use std::fmt;

use crate::class::Class;
use crate::name::Name;

mod rdata;
mod rr_type;
mod rrset;
mod ttl;
pub use rdata::{Rdata, ReadRdataError, MAX_CHARACTER_STRING_LEN};
pub use rr_type::Type;
pub use rrset::{Rrset, RrsetList, TtlMismatch};
pub use ttl::Ttl;

/// A complete resource record, as read from or written to a message.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Record {
    pub owner: Name,
    pub class: Class,
    pub ttl: Ttl,
    pub rdata: Rdata,
}

impl Record {
    /// Creates a record of class IN.
    pub fn new(owner: Name, ttl: Ttl, rdata: Rdata) -> Self {
        Self {
            owner,
            class: Class::IN,
            ttl,
            rdata,
        }
    }

    pub fn rr_type(&self) -> Type {
        self.rdata.rr_type()
    }
}

impl fmt::Display for Record {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "{} {} {} {} {}",
            self.owner,
            self.ttl,
            self.class,
            self.rr_type(),
            self.rdata
        )
    }
}
