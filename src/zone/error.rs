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

//! Implementation of the [`Error`] type for zone configuration errors.

use std::fmt;

use crate::name;
use crate::rr::TtlMismatch;

/// Errors that arise while building a [`ZoneTree`](super::ZoneTree).
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum Error {
    NoSuchZone,
    ZoneExists,
    TtlMismatch,
    InvalidName(name::Error),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            Self::NoSuchZone => f.write_str("no zone with that apex has been created"),
            Self::ZoneExists => f.write_str("a zone with that apex already exists"),
            Self::TtlMismatch => f.write_str(
                "the record's TTL does not match the TTL of existing records in the same RRset",
            ),
            Self::InvalidName(err) => write!(f, "invalid domain name: {err}"),
        }
    }
}

impl From<TtlMismatch> for Error {
    fn from(_: TtlMismatch) -> Self {
        Self::TtlMismatch
    }
}

impl From<name::Error> for Error {
    fn from(err: name::Error) -> Self {
        Self::InvalidName(err)
    }
}

impl std::error::Error for Error {}
