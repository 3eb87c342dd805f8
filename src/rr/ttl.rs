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

//! The [`Ttl`] structure for record TTLs.

use std::fmt;
use std::time::Duration;

/// The time to live of a resource record, in seconds.
///
/// [RFC 2181 § 8] settles the TTL as an unsigned value in
/// 0..=2³¹ - 1 carried in a 32-bit field, and says that a received
/// value with the top bit set is to be read as zero. `Ttl::from(u32)`
/// does exactly that, so a `Ttl` never has its top bit set.
///
/// [RFC 2181 § 8]: https://datatracker.ietf.org/doc/html/rfc2181#section-8
#[derive(Clone, Copy, Eq, Hash, PartialEq, PartialOrd, Ord)]
pub struct Ttl(u32);

impl Ttl {
    /// The TTL given to configured records that don't name their own,
    /// and to the provenance records added to relayed answers.
    pub const DEFAULT: Ttl = Ttl(3600);

    /// Returns the TTL as a [`Duration`].
    pub fn as_duration(self) -> Duration {
        Duration::from_secs(self.0.into())
    }
}

impl Default for Ttl {
    fn default() -> Self {
        Self::DEFAULT
    }
}

impl From<u32> for Ttl {
    fn from(raw: u32) -> Self {
        if raw > i32::MAX as u32 {
            Self(0)
        } else {
            Self(raw)
        }
    }
}

impl From<Ttl> for u32 {
    fn from(ttl: Ttl) -> Self {
        ttl.0
    }
}

impl fmt::Debug for Ttl {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for Ttl {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn top_bit_values_read_as_zero() {
        assert_eq!(u32::from(Ttl::from(86400)), 86400);
        assert_eq!(u32::from(Ttl::from(i32::MAX as u32)), i32::MAX as u32);
        assert_eq!(u32::from(Ttl::from(0x8000_0000)), 0);
    }

    #[test]
    fn default_is_one_hour() {
        assert_eq!(Ttl::default().as_duration(), Duration::from_secs(3600));
    }
}
