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

//! Implements zone loading.

use anyhow::{anyhow, Context, Result};
use log::debug;

use hopper::name::Name;
use hopper::rr::{Rdata, Ttl};
use hopper::zone::{ApexLocation, ZoneTree};

use crate::config::{RecordConfig, ZoneConfig};

/// Builds the zone tree from the configured zones.
///
/// Zones are loaded in order. A zone whose apex was already delegated
/// by an NS record in an earlier zone is filled in as that child zone;
/// any other apex becomes a new top-level zone.
pub fn load(zones: &[ZoneConfig]) -> Result<ZoneTree> {
    let mut tree = ZoneTree::new();
    for zone_config in zones {
        let apex = &zone_config.apex.0;
        debug!("Loading {}.", apex);
        load_zone(&mut tree, zone_config).with_context(|| format!("failed to load {}", apex))?;
    }
    Ok(tree)
}

fn load_zone(tree: &mut ZoneTree, zone_config: &ZoneConfig) -> Result<()> {
    let apex = &zone_config.apex.0;
    match tree.apex_location(apex) {
        Some(ApexLocation::Cut { parent }) => {
            debug!("{} is delegated from {}; loading it as a child zone.", apex, parent);
        }
        Some(ApexLocation::TopLevel) => return Err(anyhow!("the zone is configured twice")),
        None => tree.create_zone(apex)?,
    }

    for record in &zone_config.records {
        let ttl = record.ttl.or(zone_config.ttl).map(Ttl::from);
        add_records(tree, apex, ttl, record).with_context(|| {
            if record.name.is_empty() {
                String::from("failed to add records at the apex")
            } else {
                format!("failed to add records at {}", record.name)
            }
        })?;
    }

    for ptr in &zone_config.ptr {
        tree.add_ptr_record(apex, ptr.ip, &ptr.target.0)
            .with_context(|| format!("failed to add the PTR record for {}", ptr.ip))?;
    }
    Ok(())
}

/// Adds the records that one `[[zones.records]]` entry describes.
/// Without a TTL, the A and NS records go through
/// [`ZoneTree::add_record`] and get its default TTL.
fn add_records(
    tree: &mut ZoneTree,
    apex: &Name,
    ttl: Option<Ttl>,
    record: &RecordConfig,
) -> Result<()> {
    let sub = record.name.as_str();
    let ns = record.ns.as_ref().map(|ns| &ns.0);
    match ttl {
        None => tree.add_record(apex, sub, record.ip, ns)?,
        Some(ttl) => {
            if let Some(ip) = record.ip {
                tree.add_rdata(apex, sub, Rdata::A(ip), ttl)?;
            }
            if let Some(ns) = ns {
                tree.add_rdata(apex, sub, Rdata::Ns(ns.clone()), ttl)?;
            }
        }
    }

    let ttl = ttl.unwrap_or_default();
    if let Some(ipv6) = record.ipv6 {
        tree.add_rdata(apex, sub, Rdata::Aaaa(ipv6), ttl)?;
    }
    if let Some(ref cname) = record.cname {
        tree.add_rdata(apex, sub, Rdata::Cname(cname.0.clone()), ttl)?;
    }
    if let Some(ref txt) = record.txt {
        let rdata = Rdata::txt(txt).map_err(|e| anyhow!("invalid TXT record: {}", e))?;
        tree.add_rdata(apex, sub, rdata, ttl)?;
    }
    if let Some(ref mx) = record.mx {
        let rdata = Rdata::Mx {
            preference: mx.preference,
            exchange: mx.exchange.0.clone(),
        };
        tree.add_rdata(apex, sub, rdata, ttl)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::net::Ipv4Addr;

    use hopper::class::Class;
    use hopper::message::Question;
    use hopper::rr::Type;
    use hopper::server::{resolve, Outcome};

    use super::*;
    use crate::config;

    fn load_str(text: &str) -> Result<ZoneTree> {
        load(&config::parse(text)?.zones)
    }

    fn lookup(tree: &ZoneTree, qname: &str, qtype: Type) -> Outcome {
        let question = Question {
            qname: qname.parse().unwrap(),
            qtype,
            qclass: Class::IN,
        };
        resolve(tree, &question)
    }

    #[test]
    fn records_are_loaded() {
        let tree = load_str(
            r#"
[[zones]]
apex = "utexas.edu"

  [[zones.records]]
  name = "www"
  ip = "40.0.0.10"
  ipv6 = "2001:db8::10"

  [[zones.records]]
  name = "mail"
  ttl = 60
  ip = "40.0.0.25"
  txt = ["v=spf1 -all"]

[[zones]]
apex = "in-addr.arpa"

  [[zones.ptr]]
  ip = "40.0.0.10"
  target = "www.utexas.edu"
"#,
        )
        .unwrap();

        match lookup(&tree, "www.utexas.edu.", Type::A) {
            Outcome::Answer(records) => {
                assert_eq!(records[0].rdata, Rdata::A(Ipv4Addr::new(40, 0, 0, 10)));
                assert_eq!(records[0].ttl, Ttl::DEFAULT);
            }
            other => panic!("expected an answer, got {:?}", other),
        }
        assert!(matches!(
            lookup(&tree, "www.utexas.edu.", Type::AAAA),
            Outcome::Answer(_)
        ));
        match lookup(&tree, "mail.utexas.edu.", Type::TXT) {
            Outcome::Answer(records) => assert_eq!(records[0].ttl, Ttl::from(60)),
            other => panic!("expected an answer, got {:?}", other),
        }
        assert!(matches!(
            lookup(&tree, "10.0.0.40.in-addr.arpa.", Type::PTR),
            Outcome::Answer(_)
        ));
    }

    #[test]
    fn delegated_zone_is_loaded_as_child() {
        let tree = load_str(
            r#"
[[zones]]
apex = "utexas.edu"

  [[zones.records]]
  name = "cs"
  ns = "ns.cs.utexas.edu"

[[zones]]
apex = "cs.utexas.edu"

  [[zones.records]]
  name = "aquila"
  ip = "50.0.0.20"
"#,
        )
        .unwrap();
        let cs: Name = "cs.utexas.edu.".parse().unwrap();
        assert_eq!(
            tree.apex_location(&cs),
            Some(&ApexLocation::Cut {
                parent: "utexas.edu.".parse().unwrap()
            })
        );
        // Lookups still go through the parent, which delegates.
        assert!(matches!(
            lookup(&tree, "aquila.cs.utexas.edu.", Type::A),
            Outcome::Delegation(_)
        ));
    }

    #[test]
    fn bad_zones_are_fatal() {
        let duplicate = "[[zones]]\napex = \"a\"\n[[zones]]\napex = \"a\"\n";
        assert!(load_str(duplicate).is_err());

        let mismatch = r#"
[[zones]]
apex = "a"
  [[zones.records]]
  name = "x"
  ip = "10.0.0.1"
  [[zones.records]]
  name = "x"
  ip = "10.0.0.2"
  ttl = 5
"#;
        assert!(load_str(mismatch).is_err());
    }
}
