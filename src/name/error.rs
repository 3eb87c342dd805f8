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

//! The [`Error`] type for problems building or parsing names.

use std::fmt;

/// An error encountered while constructing a [`Name`](super::Name) or
/// a label, from text or from the wire.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum Error {
    /// A `\` escape in a textual name was malformed.
    InvalidEscape,

    /// A compression pointer did not point strictly backward. Since
    /// every pointer in a chain must move toward the start of the
    /// message, this is also how loops are caught.
    InvalidPointer,

    /// A label was longer than 63 octets.
    LabelTooLong,

    /// The name is longer than 255 octets on the wire.
    NameTooLong,

    /// An empty label appeared somewhere other than the end.
    NullNonTerminal,

    /// The text to parse was empty.
    StrEmpty,

    /// The text to parse contained non-ASCII characters.
    StrNotAscii,

    /// The buffer ended in the middle of the name.
    UnexpectedEom,
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            Self::InvalidEscape => f.write_str("invalid escape sequence"),
            Self::InvalidPointer => f.write_str("compression pointer does not point backward"),
            Self::LabelTooLong => f.write_str("label is longer than 63 octets"),
            Self::NameTooLong => f.write_str("name is longer than 255 octets on the wire"),
            Self::NullNonTerminal => f.write_str("empty label before the end of the name"),
            Self::StrEmpty => f.write_str("string was empty"),
            Self::StrNotAscii => f.write_str("string was not ASCII"),
            Self::UnexpectedEom => f.write_str("unexpected end of message in name"),
        }
    }
}

impl std::error::Error for Error {}
