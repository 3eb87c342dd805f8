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

//! Parsing of names in their on-the-wire form.

use super::{Builder, Error, Name, MAX_LABEL_LEN};

/// Flag bits marking a length octet as a compression pointer.
const POINTER_FLAGS: u8 = 0xc0;

/// Parses an uncompressed name at the start of `octets`, returning the
/// name and the number of octets it occupied. Anything after the name
/// is ignored.
pub fn parse_uncompressed(octets: &[u8]) -> Result<(Name, usize), Error> {
    let mut builder = Builder::new();
    let mut index = 0;
    loop {
        let len = *octets.get(index).ok_or(Error::UnexpectedEom)? as usize;
        if len == 0 {
            return Ok((builder.finish(), index + 1));
        } else if len > MAX_LABEL_LEN {
            return Err(Error::LabelTooLong);
        }
        let label = octets
            .get(index + 1..index + 1 + len)
            .ok_or(Error::UnexpectedEom)?;
        builder.push(label)?;
        index += 1 + len;
    }
}

/// Parses a possibly-compressed name starting at index `start` of
/// `message`, following pointers. Pointer targets are indices into
/// `message`, so this is normally handed the whole DNS message.
///
/// The second value returned is the number of octets the name takes up
/// at `start` itself: everything up to and including the first pointer,
/// or the whole name if it has no pointers.
///
/// Each pointer must refer to an offset before the start of the run of
/// labels that contains it (RFC 1035 § 4.1.4 only allows pointers to
/// *prior* occurrences). Chains therefore strictly decrease and cannot
/// loop.
pub fn parse_compressed(message: &[u8], start: usize) -> Result<(Name, usize), Error> {
    let mut builder = Builder::new();
    let mut chunk_start = start;
    let mut index = start;
    let mut first_chunk_len = None;

    loop {
        let len = *message.get(index).ok_or(Error::UnexpectedEom)?;
        if len & POINTER_FLAGS == POINTER_FLAGS {
            let low = *message.get(index + 1).ok_or(Error::UnexpectedEom)?;
            let pointer = u16::from_be_bytes([len & !POINTER_FLAGS, low]) as usize;
            if pointer >= chunk_start {
                return Err(Error::InvalidPointer);
            }
            first_chunk_len.get_or_insert(index + 2 - start);
            chunk_start = pointer;
            index = pointer;
        } else if len as usize > MAX_LABEL_LEN {
            // 0x40 and 0x80 are reserved label types.
            return Err(Error::LabelTooLong);
        } else if len == 0 {
            let consumed = first_chunk_len.unwrap_or_else(|| index + 1 - start);
            return Ok((builder.finish(), consumed));
        } else {
            let end = index + 1 + len as usize;
            let label = message.get(index + 1..end).ok_or(Error::UnexpectedEom)?;
            builder.push(label)?;
            index = end;
        }
    }
}

////////////////////////////////////////////////////////////////////////
// TESTS                                                              //
////////////////////////////////////////////////////////////////////////
