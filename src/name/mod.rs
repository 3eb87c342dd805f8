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

//! Domain names and their labels.

use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::iter::{self, FusedIterator};
use std::net::Ipv4Addr;
use std::ops::Index;
use std::str::FromStr;

use arrayvec::ArrayVec;

mod error;
mod label;
mod wire;
pub use error::Error;
pub use label::{Label, LabelBuf};

/// The maximum length of a label, not counting its length octet.
const MAX_LABEL_LEN: usize = 63;

/// The maximum length of a name's uncompressed wire form.
const MAX_WIRE_LEN: usize = 255;

/// The most non-null labels that fit in [`MAX_WIRE_LEN`] octets.
const MAX_N_LABELS: usize = (MAX_WIRE_LEN - 1) / 2;

////////////////////////////////////////////////////////////////////////
// NAME STRUCTURE                                                     //
////////////////////////////////////////////////////////////////////////

/// A domain name.
///
/// A `Name` is an ordered sequence of non-empty labels, most specific
/// first. The root is the empty sequence. Internally a `Name` keeps its
/// uncompressed wire form (RFC 1035 § 3.1, terminating null label
/// included) together with the offset of each label in it, both stored
/// inline.
///
/// Names come from text through [`FromStr`], from the wire through
/// [`Name::try_from_compressed`] and [`Name::try_from_uncompressed`],
/// or from other names through operations like [`Name::concat`] and
/// [`Name::prepend_label`]. A `Name` is never modified once built.
///
/// Comparison and hashing are ASCII-case-insensitive; the case of the
/// original octets is kept for display and for the wire.
#[derive(Clone)]
pub struct Name {
    wire: ArrayVec<u8, MAX_WIRE_LEN>,
    offsets: ArrayVec<u8, MAX_N_LABELS>,
}

/// Assembles a [`Name`] one label at a time, enforcing the length
/// limits as it goes.
struct Builder {
    wire: ArrayVec<u8, MAX_WIRE_LEN>,
    offsets: ArrayVec<u8, MAX_N_LABELS>,
}

impl Builder {
    fn new() -> Self {
        Self {
            wire: ArrayVec::new(),
            offsets: ArrayVec::new(),
        }
    }

    fn push(&mut self, label: &[u8]) -> Result<(), Error> {
        if label.is_empty() {
            return Err(Error::NullNonTerminal);
        } else if label.len() > MAX_LABEL_LEN {
            return Err(Error::LabelTooLong);
        } else if self.wire.len() + 1 + label.len() >= MAX_WIRE_LEN {
            // One octet stays reserved for the null label.
            return Err(Error::NameTooLong);
        }
        self.offsets.push(self.wire.len() as u8);
        self.wire.push(label.len() as u8);
        self.wire.extend(label.iter().copied());
        Ok(())
    }

    fn finish(mut self) -> Name {
        self.wire.push(0);
        Name {
            wire: self.wire,
            offsets: self.offsets,
        }
    }
}

////////////////////////////////////////////////////////////////////////
// NAME PUBLIC API                                                    //
////////////////////////////////////////////////////////////////////////

#[allow(clippy::len_without_is_empty)] // is_root() plays that role.
impl Name {
    /// Returns the root name `.`.
    pub fn root() -> Self {
        Builder::new().finish()
    }

    /// Builds a name from its labels, most specific first.
    pub fn from_labels<'a, I>(labels: I) -> Result<Self, Error>
    where
        I: IntoIterator<Item = &'a [u8]>,
    {
        let mut builder = Builder::new();
        for label in labels {
            builder.push(label)?;
        }
        Ok(builder.finish())
    }

    /// Parses a possibly-compressed name at index `start` of `message`.
    /// See [`wire::parse_compressed`] for how pointers are validated.
    /// Returns the name and the number of octets it occupies at
    /// `start`.
    pub fn try_from_compressed(message: &[u8], start: usize) -> Result<(Self, usize), Error> {
        wire::parse_compressed(message, start)
    }

    /// Parses an uncompressed name at the beginning of `octets`,
    /// returning it and its length in octets.
    pub fn try_from_uncompressed(octets: &[u8]) -> Result<(Self, usize), Error> {
        wire::parse_uncompressed(octets)
    }

    /// Builds the reverse-lookup name for `addr` beneath `apex`. Each
    /// octet of the address becomes a label, last octet first, so
    /// `40.0.0.10` under `in-addr.arpa.` gives
    /// `10.0.0.40.in-addr.arpa.`.
    pub fn reverse_ipv4(addr: Ipv4Addr, apex: &Name) -> Result<Self, Error> {
        addr.octets()
            .iter()
            .try_fold(apex.clone(), |name, octet| {
                name.prepend_label(octet.to_string().as_bytes())
            })
    }

    /// Returns whether this is the root name.
    pub fn is_root(&self) -> bool {
        self.offsets.is_empty()
    }

    /// Returns the number of (non-null) labels in the name.
    pub fn len(&self) -> usize {
        self.offsets.len()
    }

    /// Returns an iterator over the labels, most specific first.
    pub fn labels(&self) -> Labels {
        Labels {
            name: self,
            front: 0,
            back: self.len(),
        }
    }

    /// Returns the uncompressed wire form of the name.
    pub fn wire_repr(&self) -> &[u8] {
        &self.wire
    }

    /// Returns whether this name equals `other` or lies beneath it.
    pub fn eq_or_subdomain_of(&self, other: &Name) -> bool {
        self.len() >= other.len()
            && self
                .labels()
                .rev()
                .zip(other.labels().rev())
                .all(|(a, b)| a == b)
    }

    /// If this name is `apex` or lies beneath it, returns how many
    /// leading labels remain once `apex` is removed.
    pub fn relative_len(&self, apex: &Name) -> Option<usize> {
        self.eq_or_subdomain_of(apex)
            .then(|| self.len() - apex.len())
    }

    /// Removes `suffix` from the end of the name and returns the
    /// leading labels as a name of their own. Returns `None` if
    /// `suffix` is not a suffix of this name.
    pub fn strip_suffix(&self, suffix: &Name) -> Option<Name> {
        let n = self.relative_len(suffix)?;
        Name::from_labels(self.labels().take(n).map(Label::octets)).ok()
    }

    /// Returns the superdomain left after skipping the first `skip`
    /// labels, or `None` if the name has fewer than `skip` labels.
    /// Skipping every label yields the root.
    pub fn superdomain(&self, skip: usize) -> Option<Name> {
        if skip > self.len() {
            return None;
        }
        Name::from_labels(self.labels().skip(skip).map(Label::octets)).ok()
    }

    /// Appends `suffix` to this name, as in `www` + `utexas.edu.`.
    pub fn concat(&self, suffix: &Name) -> Result<Name, Error> {
        Name::from_labels(self.labels().chain(suffix.labels()).map(Label::octets))
    }

    /// Returns a new name with `label` inserted in front.
    pub fn prepend_label(&self, label: &[u8]) -> Result<Name, Error> {
        Name::from_labels(iter::once(label).chain(self.labels().map(Label::octets)))
    }
}

impl Index<usize> for Name {
    type Output = Label;

    fn index(&self, index: usize) -> &Label {
        let offset = self.offsets[index] as usize;
        let len = self.wire[offset] as usize;
        Label::from_unchecked(&self.wire[offset + 1..offset + 1 + len])
    }
}

impl fmt::Display for Name {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        if self.is_root() {
            return f.write_str(".");
        }
        for label in self.labels() {
            write!(f, "{}.", label)?;
        }
        Ok(())
    }
}

impl fmt::Debug for Name {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "\"{}\"", self)
    }
}

impl PartialEq for Name {
    fn eq(&self, other: &Self) -> bool {
        self.len() == other.len() && self.labels().zip(other.labels()).all(|(a, b)| a == b)
    }
}

impl Eq for Name {}

impl PartialOrd for Name {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Names are ordered canonically per [RFC 4034 § 6.1]: label by label,
/// starting from the least specific.
///
/// [RFC 4034 § 6.1]: https://datatracker.ietf.org/doc/html/rfc4034#section-6.1
impl Ord for Name {
    fn cmp(&self, other: &Self) -> Ordering {
        self.labels()
            .rev()
            .zip(other.labels().rev())
            .map(|(a, b)| a.cmp(b))
            .find(|ordering| ordering.is_ne())
            .unwrap_or_else(|| self.len().cmp(&other.len()))
    }
}

impl Hash for Name {
    fn hash<H: Hasher>(&self, state: &mut H) {
        state.write_usize(self.len());
        for label in self.labels() {
            label.hash(state);
        }
    }
}

////////////////////////////////////////////////////////////////////////
// ITERATION OVER A NAME'S LABELS                                     //
////////////////////////////////////////////////////////////////////////

/// An iterator over the [`Label`]s of a [`Name`], created by
/// [`Name::labels`]. The null label is not included.
#[derive(Clone, Debug)]
pub struct Labels<'a> {
    name: &'a Name,
    front: usize,
    back: usize,
}

impl<'a> Iterator for Labels<'a> {
    type Item = &'a Label;

    fn next(&mut self) -> Option<Self::Item> {
        if self.front < self.back {
            self.front += 1;
            Some(&self.name[self.front - 1])
        } else {
            None
        }
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let len = self.back - self.front;
        (len, Some(len))
    }
}

impl DoubleEndedIterator for Labels<'_> {
    fn next_back(&mut self) -> Option<Self::Item> {
        if self.back > self.front {
            self.back -= 1;
            Some(&self.name[self.back])
        } else {
            None
        }
    }
}

impl ExactSizeIterator for Labels<'_> {}

impl FusedIterator for Labels<'_> {}

////////////////////////////////////////////////////////////////////////
// PARSING OF NAMES FROM RUST STRINGS                                 //
////////////////////////////////////////////////////////////////////////

/// Parses a dotted name. The trailing dot is optional; the result is
/// always absolute. Escapes follow [RFC 4343 § 2.1]: `\.`, `\\` and
/// `\DDD` with a three-digit decimal value.
///
/// [RFC 4343 § 2.1]: https://datatracker.ietf.org/doc/html/rfc4343#section-2.1
impl FromStr for Name {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.is_empty() {
            return Err(Error::StrEmpty);
        } else if !s.is_ascii() {
            return Err(Error::StrNotAscii);
        } else if s == "." {
            return Ok(Name::root());
        }

        let mut builder = Builder::new();
        let mut label = ArrayVec::<u8, MAX_LABEL_LEN>::new();
        let mut remaining = s.as_bytes();
        while let Some((&octet, rest)) = remaining.split_first() {
            remaining = rest;
            let value = match octet {
                b'.' => {
                    builder.push(&label)?;
                    label.clear();
                    continue;
                }
                b'\\' => {
                    let (value, consumed) = parse_escape(remaining)?;
                    remaining = &remaining[consumed..];
                    value
                }
                _ => octet,
            };
            label.try_push(value).or(Err(Error::LabelTooLong))?;
        }
        if !label.is_empty() {
            builder.push(&label)?;
        }
        Ok(builder.finish())
    }
}

/// Parses the body of an escape sequence (whatever follows the
/// backslash), returning the octet it denotes and how many octets of
/// `remaining` it used.
fn parse_escape(remaining: &[u8]) -> Result<(u8, usize), Error> {
    match remaining {
        [] => Err(Error::InvalidEscape),
        [first, ..] if first.is_ascii_digit() => {
            let digits = remaining.get(0..3).ok_or(Error::InvalidEscape)?;
            if !digits.iter().all(u8::is_ascii_digit) {
                return Err(Error::InvalidEscape);
            }
            let value = digits
                .iter()
                .fold(0u16, |acc, digit| acc * 10 + (digit - b'0') as u16);
            u8::try_from(value)
                .map(|value| (value, 3))
                .or(Err(Error::InvalidEscape))
        }
        [first, ..] => Ok((*first, 1)),
    }
}

////////////////////////////////////////////////////////////////////////
// TESTS                                                              //
////////////////////////////////////////////////////////////////////////
