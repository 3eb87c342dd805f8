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

//! Crate-private utilities.

/// Parses the RFC 3597 § 5 generic form of a type or class mnemonic,
/// such as `TYPE65280` or `CLASS1`. `prefix` is the expected
/// (case-insensitive) prefix. Returns `None` if `text` does not start
/// with the prefix at all.
pub fn parse_generic_mnemonic(text: &str, prefix: &str) -> Option<Result<u16, &'static str>> {
    let head = text.get(..prefix.len())?;
    if !head.eq_ignore_ascii_case(prefix) {
        return None;
    }
    Some(
        text[prefix.len()..]
            .parse()
            .or(Err("value is not a valid unsigned 16-bit integer")),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generic_mnemonics_parse() {
        assert_eq!(parse_generic_mnemonic("type65280", "TYPE"), Some(Ok(65280)));
        assert!(matches!(
            parse_generic_mnemonic("TYPE70000", "TYPE"),
            Some(Err(_))
        ));
        assert_eq!(parse_generic_mnemonic("MX", "TYPE"), None);
    }
}
