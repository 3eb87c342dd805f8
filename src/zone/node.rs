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

//! Implementation of the [`ZoneNode`] structure, one node of the
//! in-memory DNS tree.

use std::collections::HashMap;

use crate::name::{LabelBuf, Name};
use crate::rr::RrsetList;

/// A node in the DNS tree.
///
/// A node owns the RRsets at its name and its children, keyed by the
/// next label down. A node may also own a whole sub-tree in `zone`:
/// in the top-level tree this marks a registered zone apex, and inside
/// a zone it marks a cut where authority passes to a child zone. The
/// root of that sub-tree stands for the same name as the node holding
/// it.
#[derive(Debug, Default)]
pub struct ZoneNode {
    pub rrsets: RrsetList,
    pub children: HashMap<LabelBuf, ZoneNode>,
    pub zone: Option<Box<ZoneNode>>,
}

/// How [`ZoneNode::find`] treats zone boundaries.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum FindMode {
    /// Walk the top-level tree, looking for the deepest node that
    /// anchors a zone.
    ZoneApex,

    /// Walk a zone's own tree, stopping at the first node below the
    /// starting node that carries a further cut.
    Record,
}

/// The result of [`ZoneNode::find`].
#[derive(Debug)]
pub struct Found<'a> {
    /// The deepest node matched.
    pub node: &'a ZoneNode,

    /// How many leading labels of the name were left unmatched. Zero
    /// means an exact hit.
    pub remaining: usize,
}

impl ZoneNode {
    /// Gets or creates the descendant standing for the first `n_labels`
    /// labels of `name`, creating any nodes in between. `self` stands
    /// for what is left of `name` after those labels.
    pub fn add(&mut self, name: &Name, n_labels: usize) -> &mut ZoneNode {
        if n_labels == 0 {
            self
        } else {
            self.children
                .entry(name[n_labels - 1].to_owned())
                .or_default()
                .add(name, n_labels - 1)
        }
    }

    /// Like [`ZoneNode::add`], but doesn't create anything.
    pub fn descendant_mut(&mut self, name: &Name, n_labels: usize) -> Option<&mut ZoneNode> {
        let mut node = self;
        for level in (0..n_labels).rev() {
            node = node.children.get_mut(&name[level])?;
        }
        Some(node)
    }

    /// Walks down from `self` along the first `n_labels` labels of
    /// `name`, right to left, as far as `mode` allows.
    ///
    /// In [`FindMode::ZoneApex`] mode the result is the deepest node on
    /// the path that anchors a zone (possibly `self`), or `None` if
    /// there is none. In [`FindMode::Record`] mode there is always a
    /// result.
    pub fn find(&self, name: &Name, n_labels: usize, mode: FindMode) -> Option<Found> {
        let mut node = self;
        let mut best = match mode {
            FindMode::ZoneApex if self.zone.is_none() => None,
            _ => Some(Found {
                node: self,
                remaining: n_labels,
            }),
        };

        for level in (0..n_labels).rev() {
            node = match node.children.get(&name[level]) {
                Some(child) => child,
                None => break,
            };
            let here = Found {
                node,
                remaining: level,
            };
            match mode {
                FindMode::ZoneApex if node.zone.is_some() => best = Some(here),
                FindMode::ZoneApex => (),
                FindMode::Record if node.zone.is_some() => return Some(here),
                FindMode::Record => best = Some(here),
            }
        }
        best
    }
}

////////////////////////////////////////////////////////////////////////
// TESTS                                                              //
////////////////////////////////////////////////////////////////////////
