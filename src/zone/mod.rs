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

//! Implementation of the in-memory zone tree.
//!
//! Every zone this server is authoritative for hangs off a single
//! [`ZoneTree`]. The tree is filled in once at startup through the
//! configuration methods below, then shared read-only (behind an
//! `Arc`) by everything that answers queries.

use std::collections::HashMap;
use std::net::Ipv4Addr;

use crate::name::Name;
use crate::rr::{Rdata, Ttl};

mod error;
mod lookup;
mod node;
pub use error::Error;
pub use lookup::{Glue, ZoneMatch};
pub use node::{FindMode, Found, ZoneNode};

/// The tree of all zones, plus an index of zone apexes.
///
/// Registered zones anchor their own sub-trees on nodes of the
/// top-level tree. Adding NS records below an apex creates a cut: the
/// node for the delegated name gets a sub-tree of its own, holding the
/// child zone's data. The index records, for each apex, whether it is
/// top-level or a cut within some parent zone, so a zone's sub-tree can
/// always be reached again by walking from the root.
#[derive(Debug, Default)]
pub struct ZoneTree {
    root: ZoneNode,
    apexes: HashMap<Name, ApexLocation>,
}

/// Where a zone's sub-tree is attached.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum ApexLocation {
    TopLevel,
    Cut { parent: Name },
}

impl ZoneTree {
    /// Creates an empty `ZoneTree`.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a new, empty top-level zone.
    pub fn create_zone(&mut self, apex: &Name) -> Result<(), Error> {
        if self.apexes.contains_key(apex) {
            return Err(Error::ZoneExists);
        }
        self.root.add(apex, apex.len()).zone = Some(Box::default());
        self.apexes.insert(apex.clone(), ApexLocation::TopLevel);
        Ok(())
    }

    /// Adds an A record, an NS record, or both at `sub` (relative to
    /// `apex`; the empty string means the apex itself), with the
    /// default TTL.
    ///
    /// An NS record below the apex delegates `sub`: see
    /// [`ZoneTree::add_rdata`].
    pub fn add_record(
        &mut self,
        apex: &Name,
        sub: &str,
        ipv4: Option<Ipv4Addr>,
        ns: Option<&Name>,
    ) -> Result<(), Error> {
        if let Some(ip) = ipv4 {
            self.add_rdata(apex, sub, Rdata::A(ip), Ttl::DEFAULT)?;
        }
        if let Some(target) = ns {
            self.add_rdata(apex, sub, Rdata::Ns(target.clone()), Ttl::DEFAULT)?;
        }
        Ok(())
    }

    /// Adds a PTR record for `ip` pointing at `target`. The owner is
    /// the reverse-lookup name of `ip` under `apex` (normally
    /// `in-addr.arpa.`).
    pub fn add_ptr_record(
        &mut self,
        apex: &Name,
        ip: Ipv4Addr,
        target: &Name,
    ) -> Result<(), Error> {
        let owner = Name::reverse_ipv4(ip, apex)?;
        self.add_rdata_at(apex, &owner, Rdata::Ptr(target.clone()), Ttl::DEFAULT)
    }

    /// Adds any record at `sub` (relative to `apex`, as in
    /// [`ZoneTree::add_record`]).
    ///
    /// NS records owned by a name below the apex create a zone cut
    /// there. The NS record is stored both at the node in the parent
    /// zone and at the apex of the child zone, and the child zone is
    /// registered so that records can be added to it in turn. NS
    /// records at the apex itself are simply stored.
    pub fn add_rdata(
        &mut self,
        apex: &Name,
        sub: &str,
        rdata: Rdata,
        ttl: Ttl,
    ) -> Result<(), Error> {
        let owner = if sub.is_empty() || sub == "@" {
            apex.clone()
        } else {
            sub.parse::<Name>()?.concat(apex)?
        };
        self.add_rdata_at(apex, &owner, rdata, ttl)
    }

    /// Returns where the zone at `apex` is attached, if it is
    /// registered.
    pub fn apex_location(&self, apex: &Name) -> Option<&ApexLocation> {
        self.apexes.get(apex)
    }

    /// Returns an iterator over every registered apex, top-level and
    /// delegated.
    pub fn apexes(&self) -> impl Iterator<Item = (&Name, &ApexLocation)> {
        self.apexes.iter()
    }

    fn add_rdata_at(
        &mut self,
        apex: &Name,
        owner: &Name,
        rdata: Rdata,
        ttl: Ttl,
    ) -> Result<(), Error> {
        let creates_cut = matches!(rdata, Rdata::Ns(_)) && owner != apex;
        let zone = self.zone_mut(apex)?;
        let node = zone.add(owner, owner.len() - apex.len());
        if creates_cut {
            node.zone
                .get_or_insert_with(Box::default)
                .rrsets
                .add(rdata.clone(), ttl)?;
        }
        node.rrsets.add(rdata, ttl)?;
        if creates_cut {
            self.apexes
                .entry(owner.clone())
                .or_insert_with(|| ApexLocation::Cut {
                    parent: apex.clone(),
                });
        }
        Ok(())
    }

    /// Finds the sub-tree of the zone at `apex`, following the chain of
    /// parents recorded in the index down from the top-level tree.
    fn zone_mut(&mut self, apex: &Name) -> Result<&mut ZoneNode, Error> {
        let mut chain = vec![apex.clone()];
        let mut current = apex;
        while let ApexLocation::Cut { parent } =
            self.apexes.get(current).ok_or(Error::NoSuchZone)?
        {
            chain.push(parent.clone());
            current = parent;
        }

        // The chain is child-first, so popping walks downward.
        let mut parent = chain.pop().ok_or(Error::NoSuchZone)?;
        let mut zone = self
            .root
            .descendant_mut(&parent, parent.len())
            .and_then(|node| node.zone.as_deref_mut())
            .ok_or(Error::NoSuchZone)?;
        while let Some(child) = chain.pop() {
            zone = zone
                .descendant_mut(&child, child.len() - parent.len())
                .and_then(|node| node.zone.as_deref_mut())
                .ok_or(Error::NoSuchZone)?;
            parent = child;
        }
        Ok(zone)
    }
}

////////////////////////////////////////////////////////////////////////
// TESTS                                                              //
////////////////////////////////////////////////////////////////////////

#[cfg(test)]
mod tests {
    use lazy_static::lazy_static;

    use super::*;
    use crate::rr::Type;

    lazy_static! {
        static ref UTEXAS: Name = "utexas.edu.".parse().unwrap();
        static ref CS: Name = "cs.utexas.edu.".parse().unwrap();
        static ref NS_CS: Name = "ns.cs.utexas.edu.".parse().unwrap();
        static ref ARPA: Name = "in-addr.arpa.".parse().unwrap();
    }

    fn new_tree() -> ZoneTree {
        let mut tree = ZoneTree::new();
        tree.create_zone(&UTEXAS).unwrap();
        tree
    }

    #[test]
    fn create_zone_rejects_duplicates() {
        let mut tree = new_tree();
        assert_eq!(tree.create_zone(&UTEXAS), Err(Error::ZoneExists));
    }

    #[test]
    fn add_record_requires_zone() {
        let mut tree = new_tree();
        let ip = Some(Ipv4Addr::new(10, 0, 0, 1));
        assert_eq!(
            tree.add_record(&"example.com.".parse().unwrap(), "www", ip, None),
            Err(Error::NoSuchZone)
        );
        assert_eq!(
            tree.add_record(&UTEXAS, "bad..label", ip, None),
            Err(Error::InvalidName(crate::name::Error::NullNonTerminal))
        );
    }

    #[test]
    fn add_rdata_rejects_ttl_mismatch() {
        let mut tree = new_tree();
        let ip = Ipv4Addr::new(10, 0, 0, 40);
        tree.add_rdata(&UTEXAS, "www", Rdata::A(ip), Ttl::from(60))
            .unwrap();
        assert_eq!(
            tree.add_record(&UTEXAS, "www", Some(ip), None),
            Err(Error::TtlMismatch)
        );
    }

    #[test]
    fn ns_below_apex_creates_cut() {
        let mut tree = new_tree();
        tree.add_record(&UTEXAS, "cs", None, Some(&NS_CS)).unwrap();
        assert_eq!(
            tree.apex_location(&CS),
            Some(&ApexLocation::Cut {
                parent: UTEXAS.clone()
            })
        );

        // The delegated zone can now take records of its own.
        tree.add_record(&CS, "www", Some(Ipv4Addr::new(10, 0, 1, 1)), None)
            .unwrap();
        let cs_zone = tree.zone_mut(&CS).unwrap();
        assert!(cs_zone.rrsets.lookup(Type::NS).is_some());
        let www: Name = "www.cs.utexas.edu.".parse().unwrap();
        let node = cs_zone.descendant_mut(&www, 1).unwrap();
        assert!(node.rrsets.lookup(Type::A).is_some());

        // The parent keeps its copy of the NS set at the cut.
        let parent = tree.zone_mut(&UTEXAS).unwrap();
        let cut = parent.descendant_mut(&CS, 1).unwrap();
        assert!(cut.rrsets.lookup(Type::NS).is_some());
        assert!(cut.zone.is_some());
    }

    #[test]
    fn ns_at_apex_does_not_create_cut() {
        let mut tree = new_tree();
        tree.add_record(&UTEXAS, "", None, Some(&NS_CS)).unwrap();
        assert_eq!(tree.apexes().count(), 1);
        let zone = tree.zone_mut(&UTEXAS).unwrap();
        assert!(zone.rrsets.lookup(Type::NS).is_some());
        assert!(zone.zone.is_none());
    }

    #[test]
    fn ptr_records_use_reverse_names() {
        let mut tree = new_tree();
        tree.create_zone(&ARPA).unwrap();
        tree.add_ptr_record(&ARPA, Ipv4Addr::new(10, 0, 0, 40), &UTEXAS)
            .unwrap();
        let owner: Name = "40.0.0.10.in-addr.arpa.".parse().unwrap();
        let zone = tree.zone_mut(&ARPA).unwrap();
        let node = zone.descendant_mut(&owner, 4).unwrap();
        assert_eq!(
            node.rrsets.lookup(Type::PTR).unwrap().rdatas,
            [Rdata::Ptr(UTEXAS.clone())]
        );
    }
}
