// Barline
// Copyright (C) 2021  Wesley Merkel
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License
// along with this program.  If not, see <https://www.gnu.org/licenses/>.

//! Text front ends for patterns.
//!
//! Three notations are understood:
//!
//! * Hexadecimal onset tokens for [`PatternArray::hex`](super::PatternArray::hex). Every digit is
//!   four onsets, most significant bit first, so `"A"` is `x-x-` and `"F0"` is `xxxx----`.
//! * Step strings for [`PatternArray::xox`](super::PatternArray::xox), where `x` is an onset and
//!   anything else is a rest.
//! * Pattern strings for [`PatternArray::sequence`](super::PatternArray::sequence), described on
//!   [`parse`].

use super::{Cycle, Slot};
use std::str::FromStr;
use thiserror::Error;

/// Subdivision limit for nested groups, per cycle.
const MAX_RESOLUTION: usize = 1 << 12;

/// How deeply groups may be nested.
const MAX_DEPTH: usize = 64;

/// A token accepted by [`PatternArray::hex`](super::PatternArray::hex).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HexToken {
    Number(i64),
    Digits(String),
}

impl From<i32> for HexToken {
    fn from(number: i32) -> HexToken {
        HexToken::Number(number.into())
    }
}

impl From<i64> for HexToken {
    fn from(number: i64) -> HexToken {
        HexToken::Number(number)
    }
}

impl From<&str> for HexToken {
    fn from(digits: &str) -> HexToken {
        HexToken::Digits(digits.to_owned())
    }
}

impl From<String> for HexToken {
    fn from(digits: String) -> HexToken {
        HexToken::Digits(digits)
    }
}

/// A token accepted by [`PatternArray::xox`](super::PatternArray::xox).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum XoxToken {
    Text(String),
    Bits(Vec<bool>),
}

impl From<&str> for XoxToken {
    fn from(text: &str) -> XoxToken {
        XoxToken::Text(text.to_owned())
    }
}

impl From<String> for XoxToken {
    fn from(text: String) -> XoxToken {
        XoxToken::Text(text)
    }
}

impl From<Vec<bool>> for XoxToken {
    fn from(bits: Vec<bool>) -> XoxToken {
        XoxToken::Bits(bits)
    }
}

impl From<i32> for XoxToken {
    /// A single number is a one step token: an onset unless it is zero.
    fn from(bit: i32) -> XoxToken {
        XoxToken::Bits(vec![bit != 0])
    }
}

impl From<i64> for XoxToken {
    /// A single number is a one step token: an onset unless it is zero.
    fn from(bit: i64) -> XoxToken {
        XoxToken::Bits(vec![bit != 0])
    }
}

impl From<Vec<i32>> for XoxToken {
    /// Non-zero numbers are onsets.
    fn from(bits: Vec<i32>) -> XoxToken {
        XoxToken::Bits(bits.into_iter().map(|bit| bit != 0).collect())
    }
}

impl From<Vec<i64>> for XoxToken {
    /// Non-zero numbers are onsets.
    fn from(bits: Vec<i64>) -> XoxToken {
        XoxToken::Bits(bits.into_iter().map(|bit| bit != 0).collect())
    }
}

/// Expands a hex token into onsets. Malformed tokens are logged and produce no onsets.
pub fn hex_bits(token: &HexToken) -> Vec<bool> {
    let digits = match token {
        HexToken::Number(number) if *number < 0 => {
            log::warn!("hex: ignoring negative number {}", number);
            return Vec::new();
        }
        HexToken::Number(number) => format!("{:x}", number),
        HexToken::Digits(digits) => digits.clone(),
    };

    let mut bits = Vec::with_capacity(digits.len() * 4);
    for c in digits.chars().filter(|c| !c.is_whitespace()) {
        let nibble = match c.to_digit(16) {
            Some(nibble) => nibble,
            None => {
                log::warn!("hex: invalid digit {:?} in {:?}", c, digits);
                return Vec::new();
            }
        };
        bits.extend((0..4).rev().map(|shift| (nibble >> shift) & 1 == 1));
    }
    bits
}

/// Expands an xox token into onsets.
pub fn xox_bits(token: &XoxToken) -> Vec<bool> {
    match token {
        XoxToken::Text(text) => text
            .chars()
            .filter(|c| !c.is_whitespace())
            .map(|c| c == 'x')
            .collect(),
        XoxToken::Bits(bits) => bits.clone(),
    }
}

/// The error returned by [`parse`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("unmatched `[`")]
    UnclosedGroup,
    #[error("unmatched `]`")]
    UnopenedGroup,
    #[error("`|` inside a group")]
    BarInGroup,
    #[error("cannot parse token {0:?}")]
    Token(String),
    #[error("groups are nested too finely")]
    TooFine,
    #[error("groups are nested more than {} deep", MAX_DEPTH)]
    TooDeep,
}

/// Parses a pattern string into cycles.
///
/// Tokens are separated by whitespace. `~`, `.` and `_` are rests, anything else is parsed with
/// [`FromStr`]. Square brackets group tokens into a single step that is subdivided evenly, and `|`
/// starts a new cycle. Nested groups are laid out on the finest grid the cycle needs:
///
/// ```
/// use barline::pattern::{notation::parse, Slot};
///
/// let cycles = parse::<u8>("1 [2 3] | 4 ~").unwrap();
///
/// assert_eq!(
///     cycles,
///     vec![
///         vec![Slot::Value(1), Slot::Rest, Slot::Value(2), Slot::Value(3)],
///         vec![Slot::Value(4), Slot::Rest],
///     ]
/// );
/// ```
pub fn parse<T: FromStr>(text: &str) -> Result<Vec<Cycle<T>>, ParseError> {
    let mut tokens = tokenize(text).into_iter().peekable();
    let mut cycles = Vec::new();
    loop {
        let steps = parse_steps(&mut tokens, 0)?;
        cycles.push(SlotTree::Branch(steps).flatten()?);
        match tokens.next() {
            Some(Token::Bar) => continue,
            Some(Token::Close) => return Err(ParseError::UnopenedGroup),
            _ => return Ok(cycles),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Token {
    Open,
    Close,
    Bar,
    Word(String),
}

fn tokenize(text: &str) -> Vec<Token> {
    let mut tokens = Vec::new();
    let mut word = String::new();
    for c in text.chars() {
        let token = match c {
            '[' => Some(Token::Open),
            ']' => Some(Token::Close),
            '|' => Some(Token::Bar),
            c if c.is_whitespace() => None,
            c => {
                word.push(c);
                continue;
            }
        };
        if !word.is_empty() {
            tokens.push(Token::Word(std::mem::take(&mut word)));
        }
        tokens.extend(token);
    }
    if !word.is_empty() {
        tokens.push(Token::Word(word));
    }
    tokens
}

fn parse_steps<T, I>(
    tokens: &mut std::iter::Peekable<I>,
    depth: usize,
) -> Result<Vec<SlotTree<T>>, ParseError>
where
    T: FromStr,
    I: Iterator<Item = Token>,
{
    let mut steps = Vec::new();
    loop {
        match tokens.peek() {
            None => {
                return if depth == 0 {
                    Ok(steps)
                } else {
                    Err(ParseError::UnclosedGroup)
                }
            }
            Some(Token::Bar) if depth > 0 => return Err(ParseError::BarInGroup),
            Some(Token::Bar) | Some(Token::Close) => return Ok(steps),
            _ => {}
        }
        match tokens.next() {
            Some(Token::Open) if depth >= MAX_DEPTH => return Err(ParseError::TooDeep),
            Some(Token::Open) => {
                let group = parse_steps(tokens, depth + 1)?;
                match tokens.next() {
                    Some(Token::Close) => steps.push(SlotTree::Branch(group)),
                    _ => return Err(ParseError::UnclosedGroup),
                }
            }
            Some(Token::Word(word)) => steps.push(SlotTree::Leaf(parse_word(&word)?)),
            _ => unreachable!("bars and closing brackets are handled above"),
        }
    }
}

fn parse_word<T: FromStr>(word: &str) -> Result<Slot<T>, ParseError> {
    match word {
        "~" | "." | "_" => Ok(Slot::Rest),
        word => word
            .parse()
            .map(Slot::Value)
            .map_err(|_| ParseError::Token(word.to_owned())),
    }
}

/// Nested steps of a single cycle.
///
/// A branch divides its step evenly between its children; a leaf fills its step with one slot.
#[derive(Debug, Clone, PartialEq, Eq)]
enum SlotTree<T> {
    Leaf(Slot<T>),
    Branch(Vec<SlotTree<T>>),
}

impl<T> SlotTree<T> {
    /// The number of evenly spaced slots needed to place every leaf exactly.
    fn resolution(&self) -> Result<usize, ParseError> {
        match self {
            SlotTree::Leaf(_) => Ok(1),
            SlotTree::Branch(children) if children.is_empty() => Ok(1),
            SlotTree::Branch(children) => {
                let mut common = 1;
                for child in children {
                    common = lcm(common, child.resolution()?);
                    if common > MAX_RESOLUTION {
                        return Err(ParseError::TooFine);
                    }
                }
                let resolution = common * children.len();
                if resolution > MAX_RESOLUTION {
                    return Err(ParseError::TooFine);
                }
                Ok(resolution)
            }
        }
    }

    fn flatten(self) -> Result<Cycle<T>, ParseError> {
        if let SlotTree::Branch(children) = &self {
            if children.is_empty() {
                return Ok(Vec::new());
            }
        }
        let width = self.resolution()?;
        let mut slots = Vec::with_capacity(width);
        self.flatten_into(width, &mut slots);
        Ok(slots)
    }

    fn flatten_into(self, width: usize, slots: &mut Cycle<T>) {
        match self {
            SlotTree::Leaf(slot) => {
                slots.push(slot);
                slots.extend((1..width).map(|_| Slot::Rest));
            }
            SlotTree::Branch(children) if children.is_empty() => {
                slots.extend((0..width).map(|_| Slot::Rest));
            }
            SlotTree::Branch(children) => {
                let width = width / children.len();
                for child in children {
                    child.flatten_into(width, slots);
                }
            }
        }
    }
}

fn lcm(a: usize, b: usize) -> usize {
    a / gcd(a, b) * b
}

pub(crate) fn gcd(mut a: usize, mut b: usize) -> usize {
    while b != 0 {
        let r = a % b;
        a = b;
        b = r;
    }
    a
}
