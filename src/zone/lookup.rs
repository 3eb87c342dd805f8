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

//! Read-only lookups on a built [`ZoneTree`].

use std::net::Ipv4Addr;

use super::{FindMode, ZoneNode, ZoneTree};
use crate::name::Name;
use crate::rr::{Rdata, RrsetList, Ttl, Type};

/// The zone that owns some name, as returned by [`ZoneTree::find_zone`].
#[derive(Debug)]
pub struct ZoneMatch<'a> {
    /// The zone's apex.
    pub apex: Name,

    /// The root of the zone's sub-tree, which stands for the apex.
    pub root: &'a ZoneNode,

    /// How many labels of the name lie below the apex.
    pub relative_len: usize,
}

impl ZoneTree {
    /// Finds the deepest registered top-level zone containing `name`.
    pub fn find_zone(&self, name: &Name) -> Option<ZoneMatch> {
        let found = self.root.find(name, name.len(), FindMode::ZoneApex)?;
        Some(ZoneMatch {
            apex: name.superdomain(found.remaining)?,
            root: found.node.zone.as_deref()?,
            relative_len: found.remaining,
        })
    }

    /// Returns the addresses of every A record owned by `target`, for
    /// use as glue, along with the TTL of their RRset.
    ///
    /// Glue normally sits below a zone cut, where authoritative lookups
    /// never go, so this walks the parent zone's tree exactly and
    /// ignores cuts. If the parent doesn't have the records, the child
    /// zone's own tree is tried.
    pub fn glue_addresses(&self, target: &Name) -> Option<Glue> {
        let zone = self.find_zone(target)?;
        collect_glue(zone.root, target, zone.relative_len)
    }
}

/// The A records found for a nameserver by [`ZoneTree::glue_addresses`].
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Glue {
    pub ttl: Ttl,
    pub addresses: Vec<Ipv4Addr>,
}

/// Looks for A records at the node `n_labels` labels of `name` below
/// `node`, falling back to each cut's sub-tree on the way back up.
fn collect_glue(node: &ZoneNode, name: &Name, n_labels: usize) -> Option<Glue> {
    let found = if n_labels == 0 {
        a_records(&node.rrsets)
    } else {
        node.children
            .get(&name[n_labels - 1])
            .and_then(|child| collect_glue(child, name, n_labels - 1))
    };
    found.or_else(|| {
        node.zone
            .as_deref()
            .and_then(|sub_zone| collect_glue(sub_zone, name, n_labels))
    })
}

fn a_records(rrsets: &RrsetList) -> Option<Glue> {
    let rrset = rrsets.lookup(Type::A)?;
    let addresses: Vec<Ipv4Addr> = rrset
        .rdatas
        .iter()
        .filter_map(|rdata| match rdata {
            Rdata::A(ip) => Some(*ip),
            _ => None,
        })
        .collect();
    if addresses.is_empty() {
        None
    } else {
        Some(Glue {
            ttl: rrset.ttl,
            addresses,
        })
    }
}

////////////////////////////////////////////////////////////////////////
// TESTS                                                              //
////////////////////////////////////////////////////////////////////////

#[cfg(test)]
mod tests {
    use lazy_static::lazy_static;

    use super::*;

    lazy_static! {
        static ref UTEXAS: Name = "utexas.edu.".parse().unwrap();
        static ref CS: Name = "cs.utexas.edu.".parse().unwrap();
        static ref ECE: Name = "ece.utexas.edu.".parse().unwrap();
        static ref TREE: ZoneTree = {
            let mut tree = ZoneTree::new();
            tree.create_zone(&UTEXAS).unwrap();
            let ns_cs: Name = "ns.cs.utexas.edu.".parse().unwrap();
            let ns_ece: Name = "ns.ece.utexas.edu.".parse().unwrap();
            tree.add_record(&UTEXAS, "cs", None, Some(&ns_cs)).unwrap();
            tree.add_record(&UTEXAS, "ns.cs", Some(Ipv4Addr::new(10, 0, 0, 30)), None)
                .unwrap();
            tree.add_record(&UTEXAS, "ece", None, Some(&ns_ece)).unwrap();
            tree.add_record(&ECE, "ns", Some(Ipv4Addr::new(10, 0, 0, 31)), None)
                .unwrap();
            tree
        };
    }

    #[test]
    fn find_zone_works() {
        let name: Name = "www.cs.utexas.edu.".parse().unwrap();
        let zone = TREE.find_zone(&name).unwrap();
        assert_eq!(zone.apex, *UTEXAS);
        assert_eq!(zone.relative_len, 2);
        assert!(TREE.find_zone(&"example.com.".parse().unwrap()).is_none());
    }

    #[test]
    fn glue_below_cut_in_parent() {
        let target: Name = "ns.cs.utexas.edu.".parse().unwrap();
        let glue = TREE.glue_addresses(&target).unwrap();
        assert_eq!(glue.addresses, [Ipv4Addr::new(10, 0, 0, 30)]);
        assert_eq!(glue.ttl, Ttl::DEFAULT);
    }

    #[test]
    fn glue_falls_back_to_child_zone() {
        let target: Name = "ns.ece.utexas.edu.".parse().unwrap();
        assert_eq!(
            TREE.glue_addresses(&target).unwrap().addresses,
            [Ipv4Addr::new(10, 0, 0, 31)]
        );
        assert_eq!(TREE.glue_addresses(&CS), None);
    }

    #[test]
    fn glue_carries_rrset_ttl() {
        let mut tree = ZoneTree::new();
        tree.create_zone(&UTEXAS).unwrap();
        let ns_cs: Name = "ns.cs.utexas.edu.".parse().unwrap();
        let ttl = Ttl::from(600);
        tree.add_rdata(&UTEXAS, "cs", Rdata::Ns(ns_cs.clone()), ttl)
            .unwrap();
        tree.add_rdata(&UTEXAS, "ns.cs", Rdata::A(Ipv4Addr::new(10, 0, 0, 30)), ttl)
            .unwrap();
        assert_eq!(
            tree.glue_addresses(&ns_cs),
            Some(Glue {
                ttl,
                addresses: vec![Ipv4Addr::new(10, 0, 0, 30)],
            })
        );
    }
}
