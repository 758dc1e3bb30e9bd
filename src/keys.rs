// Copyright (C) 2025  Tom Waddington
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published
// by the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program.  If not, see <https://www.gnu.org/licenses/>.

//! Key-combination and interval-table parsing
//!
//! Combinations are `+`-separated tokens: a single character is a literal
//! key, anything longer is a named special key ("escape", "page_down", ...).
//! Interval tables are comma-separated millisecond values, one per
//! adjacency in the sequence.

use nom::{
    IResult, Parser,
    bytes::complete::take_while1,
    character::complete::{char, space0},
    combinator::all_consuming,
    multi::separated_list1,
    sequence::delimited,
};
use thiserror::Error;

use crate::types::{DEFAULT_DELAY_MS, KeyToken};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum KeyError {
    #[error("empty key combination")]
    Empty,
    #[error("invalid key combination '{0}'")]
    Invalid(String),
    #[error("'{0}' is not a single key")]
    NotSingleKey(String),
}

fn parse_token(input: &str) -> IResult<&str, KeyToken> {
    let (input, raw) = take_while1(|c: char| c != '+' && !c.is_whitespace())(input)?;
    let mut chars = raw.chars();
    let token = match (chars.next(), chars.next()) {
        (Some(c), None) => KeyToken::Char(c),
        _ => KeyToken::Named(raw.to_ascii_lowercase()),
    };
    Ok((input, token))
}

fn parse_tokens(input: &str) -> IResult<&str, Vec<KeyToken>> {
    separated_list1(delimited(space0, char('+'), space0), parse_token).parse(input)
}

/// Parse a combination string like "ctrl+shift+s" into an ordered key
/// sequence. Whitespace around the separators is ignored.
pub fn parse_combination(input: &str) -> Result<Vec<KeyToken>, KeyError> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Err(KeyError::Empty);
    }
    match all_consuming(parse_tokens).parse(trimmed) {
        Ok((_, keys)) => Ok(keys),
        Err(_) => Err(KeyError::Invalid(trimmed.to_string())),
    }
}

/// Parse a combination that must resolve to exactly one token, e.g. the
/// key that ends a recording session.
pub fn parse_single_key(input: &str) -> Result<KeyToken, KeyError> {
    let mut tokens = parse_combination(input)?;
    if tokens.len() != 1 {
        return Err(KeyError::NotSingleKey(input.trim().to_string()));
    }
    Ok(tokens.remove(0))
}

/// Parse a comma-separated interval table. Malformed entries are replaced
/// with the default delay rather than aborting the run.
pub fn parse_intervals(input: &str) -> Vec<u64> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Vec::new();
    }
    trimmed
        .split(',')
        .map(|entry| entry.trim().parse().unwrap_or(DEFAULT_DELAY_MS))
        .collect()
}

/// One entry per adjacency, so N keys always get N rows (a single key
/// gets one self-loop row).
pub fn uniform_intervals(key_count: usize, delay_ms: u64) -> Vec<u64> {
    vec![delay_ms; key_count]
}

/// Render a sequence back into the `+`-separated form accepted by
/// [`parse_combination`].
pub fn format_combination(keys: &[KeyToken]) -> String {
    keys.iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("+")
}
