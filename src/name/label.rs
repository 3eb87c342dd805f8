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

//! The [`Label`] and [`LabelBuf`] types.

use std::borrow::Borrow;
use std::cmp::Ordering;
use std::convert::TryFrom;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::ops::Deref;

use arrayvec::ArrayVec;

use super::{Error, MAX_LABEL_LEN};

////////////////////////////////////////////////////////////////////////
// LABELS                                                             //
////////////////////////////////////////////////////////////////////////

/// A single label of a domain name, borrowed.
///
/// `Label` wraps `[u8]` and can only be built from slices of at most
/// 63 octets. Following [RFC 1034 § 3.1] and [RFC 4343], comparison
/// and hashing ignore ASCII case, while the octets themselves keep
/// whatever case they were given.
///
/// [RFC 1034 § 3.1]: https://datatracker.ietf.org/doc/html/rfc1034#section-3.1
/// [RFC 4343]: https://datatracker.ietf.org/doc/html/rfc4343
#[repr(transparent)]
pub struct Label {
    octets: [u8],
}

#[allow(clippy::len_without_is_empty)]
impl Label {
    /// Wraps `octets` as a `Label` without checking the length. Only
    /// for use inside the `name` module, after the length is known to
    /// be valid.
    pub(super) fn from_unchecked(octets: &[u8]) -> &Self {
        // SAFETY: Label is repr(transparent) over [u8], so the pointer
        // cast preserves layout and the slice metadata.
        unsafe { &*(octets as *const [u8] as *const Label) }
    }

    /// Returns the number of octets in the label.
    pub fn len(&self) -> usize {
        self.octets.len()
    }

    /// Returns the octets of the label.
    pub fn octets(&self) -> &[u8] {
        &self.octets
    }
}

impl<'a> TryFrom<&'a [u8]> for &'a Label {
    type Error = Error;

    fn try_from(octets: &'a [u8]) -> Result<Self, Self::Error> {
        if octets.len() > MAX_LABEL_LEN {
            Err(Error::LabelTooLong)
        } else {
            Ok(Label::from_unchecked(octets))
        }
    }
}

impl<'a> TryFrom<&'a str> for &'a Label {
    type Error = Error;

    fn try_from(text: &'a str) -> Result<Self, Self::Error> {
        <&Label>::try_from(text.as_bytes())
    }
}

impl ToOwned for Label {
    type Owned = LabelBuf;

    fn to_owned(&self) -> LabelBuf {
        let mut octets = ArrayVec::new();
        // The length was checked when this Label was made.
        octets.extend(self.octets.iter().copied());
        LabelBuf { octets }
    }
}

/// Labels are displayed in the master-file style of RFC 1035 § 5.1:
/// `.` and `\` are backslash-escaped, other graphic ASCII characters
/// appear as-is, and anything else becomes `\DDD` (decimal).
impl fmt::Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        for &octet in self.octets() {
            match octet {
                b'.' | b'\\' => write!(f, "\\{}", octet as char)?,
                _ if octet.is_ascii_graphic() => write!(f, "{}", octet as char)?,
                _ => write!(f, "\\{:03}", octet)?,
            }
        }
        Ok(())
    }
}

impl fmt::Debug for Label {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "\"{}\"", self)
    }
}

impl PartialEq for Label {
    fn eq(&self, other: &Self) -> bool {
        self.octets.eq_ignore_ascii_case(&other.octets)
    }
}

impl Eq for Label {}

impl PartialOrd for Label {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Labels are ordered as left-justified unsigned octet strings with
/// uppercase ASCII folded to lowercase, as in [RFC 4034 § 6.1].
///
/// [RFC 4034 § 6.1]: https://datatracker.ietf.org/doc/html/rfc4034#section-6.1
impl Ord for Label {
    fn cmp(&self, other: &Self) -> Ordering {
        let lhs = self.octets.iter().map(u8::to_ascii_lowercase);
        let rhs = other.octets.iter().map(u8::to_ascii_lowercase);
        lhs.cmp(rhs)
    }
}

impl Hash for Label {
    fn hash<H: Hasher>(&self, state: &mut H) {
        // Must agree with the case-insensitive Eq.
        state.write_usize(self.octets.len());
        for octet in self.octets.iter() {
            state.write_u8(octet.to_ascii_lowercase());
        }
    }
}

////////////////////////////////////////////////////////////////////////
// LABEL BUFFERS                                                      //
////////////////////////////////////////////////////////////////////////

/// An owned [`Label`], stored inline. Zone tree nodes use these as the
/// keys of their child maps.
#[derive(Clone)]
pub struct LabelBuf {
    octets: ArrayVec<u8, MAX_LABEL_LEN>,
}

impl TryFrom<&[u8]> for LabelBuf {
    type Error = Error;

    fn try_from(octets: &[u8]) -> Result<Self, Self::Error> {
        <&Label>::try_from(octets).map(ToOwned::to_owned)
    }
}

impl TryFrom<&str> for LabelBuf {
    type Error = Error;

    fn try_from(text: &str) -> Result<Self, Self::Error> {
        Self::try_from(text.as_bytes())
    }
}

impl Deref for LabelBuf {
    type Target = Label;

    fn deref(&self) -> &Label {
        Label::from_unchecked(&self.octets)
    }
}

impl Borrow<Label> for LabelBuf {
    fn borrow(&self) -> &Label {
        self
    }
}

impl fmt::Display for LabelBuf {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        fmt::Display::fmt(self.deref(), f)
    }
}

impl fmt::Debug for LabelBuf {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        fmt::Debug::fmt(self.deref(), f)
    }
}

// Eq, Ord and Hash must match Label's exactly so that a HashMap keyed
// by LabelBuf can be queried with a &Label.
impl PartialEq for LabelBuf {
    fn eq(&self, other: &Self) -> bool {
        self.deref() == other.deref()
    }
}

impl Eq for LabelBuf {}

impl PartialOrd for LabelBuf {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for LabelBuf {
    fn cmp(&self, other: &Self) -> Ordering {
        self.deref().cmp(other.deref())
    }
}

impl Hash for LabelBuf {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.deref().hash(state)
    }
}

////////////////////////////////////////////////////////////////////////
// TESTS                                                              //
////////////////////////////////////////////////////////////////////////

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::hash_map::DefaultHasher;
    use std::collections::HashMap;

    fn hash_of<T: Hash + ?Sized>(value: &T) -> u64 {
        let mut hasher = DefaultHasher::new();
        value.hash(&mut hasher);
        hasher.finish()
    }

    #[test]
    fn label_length_limit_is_enforced() {
        let octets = [b'x'; MAX_LABEL_LEN + 1];
        assert!(<&Label>::try_from(&octets[..MAX_LABEL_LEN]).is_ok());
        assert_eq!(
            <&Label>::try_from(&octets[..]).err(),
            Some(Error::LabelTooLong)
        );
        assert_eq!(
            LabelBuf::try_from(&octets[..]).err(),
            Some(Error::LabelTooLong)
        );
    }

    #[test]
    fn comparison_and_hashing_ignore_case() {
        let upper = <&Label>::try_from("UTEXAS").unwrap();
        let lower = <&Label>::try_from("utexas").unwrap();
        assert_eq!(upper, lower);
        assert_eq!(hash_of(upper), hash_of(lower));
        assert_eq!(upper.octets(), b"UTEXAS");
    }

    #[test]
    fn labelbuf_keys_can_be_queried_by_label() {
        let mut map = HashMap::new();
        map.insert(LabelBuf::try_from("www").unwrap(), 1);
        assert_eq!(map.get(<&Label>::try_from("WWW").unwrap()), Some(&1));
    }

    #[test]
    fn ordering_is_canonical() {
        let labels = ["a", "Z", "zABC", "\u{7f}"];
        for pair in labels.windows(2) {
            let lhs = <&Label>::try_from(pair[0]).unwrap();
            let rhs = <&Label>::try_from(pair[1]).unwrap();
            assert!(lhs < rhs, "{:?} should sort before {:?}", lhs, rhs);
        }
    }

    #[test]
    fn display_escapes_special_octets() {
        let label = <&Label>::try_from(&b"a.b\\c\x00"[..]).unwrap();
        assert_eq!(label.to_string(), "a\\.b\\\\c\\000");
    }
}
