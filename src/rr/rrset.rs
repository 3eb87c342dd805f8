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

//! In-memory storage for RRsets.

use std::fmt;

use super::{Rdata, Ttl, Type};

/// An RRset as stored at a node of a zone.
///
/// The owner and class aren't stored; those are implied by where the
/// RRset lives. RDATA is kept in the order it was added.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Rrset {
    pub rr_type: Type,
    pub ttl: Ttl,
    pub rdatas: Vec<Rdata>,
}

/// All of the RRsets at one node, in the order their types were first
/// added.
#[derive(Clone, Debug, Default)]
pub struct RrsetList {
    rrsets: Vec<Rrset>,
}

impl RrsetList {
    /// Adds `rdata` to the RRset of its type.
    ///
    /// This fails if the RRset already exists with a different TTL.
    /// RDATA equal to something already in the RRset is silently
    /// ignored.
    pub fn add(&mut self, rdata: Rdata, ttl: Ttl) -> Result<(), TtlMismatch> {
        let rr_type = rdata.rr_type();
        match self.rrsets.iter_mut().find(|r| r.rr_type == rr_type) {
            Some(rrset) if rrset.ttl != ttl => Err(TtlMismatch),
            Some(rrset) => {
                if !rrset.rdatas.contains(&rdata) {
                    rrset.rdatas.push(rdata);
                }
                Ok(())
            }
            None => {
                self.rrsets.push(Rrset {
                    rr_type,
                    ttl,
                    rdatas: vec![rdata],
                });
                Ok(())
            }
        }
    }

    /// Looks up the [`Rrset`] of type `rr_type`.
    pub fn lookup(&self, rr_type: Type) -> Option<&Rrset> {
        self.rrsets.iter().find(|r| r.rr_type == rr_type)
    }

    /// Returns an iterator over the [`Rrset`]s.
    pub fn iter(&self) -> std::slice::Iter<Rrset> {
        self.rrsets.iter()
    }

    pub fn is_empty(&self) -> bool {
        self.rrsets.is_empty()
    }
}

/// Returned when a record's TTL differs from that of the RRset it
/// would join.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub struct TtlMismatch;

impl fmt::Display for TtlMismatch {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("TTL does not match the rest of the RRset")
    }
}

impl std::error::Error for TtlMismatch {}

////////////////////////////////////////////////////////////////////////
// TESTS                                                              //
////////////////////////////////////////////////////////////////////////
