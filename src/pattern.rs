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

//! Cyclic patterns and the transformations that reshape them.
//!
//! A [`PatternArray`] describes one musical idea as an ordered list of *cycles*. Each cycle is an
//! ordered list of [`Slot`]s and each slot either holds a value or is a rest. A cycle is played
//! over exactly one bar, with its slots dividing the bar evenly, so a cycle of four slots plays
//! quarter notes and a cycle of eight slots plays eighth notes.
//!
//! Indexing is cyclic in both dimensions. Asking for cycle 9 of a three cycle pattern returns
//! cycle 0, and the same is true for slots within a cycle. Lookups never fail.
//!
//! # Examples
//!
//! ```
//! use barline::pattern::{PatternArray, Slot};
//!
//! let pattern = PatternArray::new(vec![Slot::values(vec![60])])
//!     .note(vec![Slot::values(vec![60, 64, 67]), vec![Slot::Value(72)]])
//!     .reverse();
//!
//! assert_eq!(pattern.len(), 2);
//! assert_eq!(pattern.at(0, 0), Slot::Value(&72));
//! assert_eq!(pattern.at(1, 0), Slot::Value(&67));
//! assert_eq!(pattern.at(7, 5), Slot::Value(&60));
//! ```
//!
//! # Transformations
//!
//! Transformations consume the pattern and return a rebuilt one so they can be chained. None of
//! them fail: invalid arguments are ignored with a warning and leave the pattern unchanged.

use std::str::FromStr;

pub mod euclid;
pub mod notation;

pub use euclid::Spread;
pub use notation::{HexToken, XoxToken};

/// The largest group size accepted by [`PatternArray::fast`], [`PatternArray::slow`] and
/// [`PatternArray::chop`]. Larger factors are clamped to it with a warning.
pub const MAX_FACTOR: usize = 1024;

/// The most slots [`PatternArray::stretch`] and [`PatternArray::euclid`] build into one cycle.
pub const MAX_SLOTS: usize = 65_536;

/// One addressable position in a cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Slot<T> {
    /// No onset at this position.
    Rest,
    /// An onset carrying a value.
    Value(T),
}

impl<T> Slot<T> {
    /// Builds a cycle with one onset per value.
    pub fn values<I>(values: I) -> Vec<Slot<T>>
    where
        I: IntoIterator<Item = T>,
    {
        values.into_iter().map(Slot::Value).collect()
    }

    pub fn as_ref(&self) -> Slot<&T> {
        match self {
            Slot::Rest => Slot::Rest,
            Slot::Value(value) => Slot::Value(value),
        }
    }

    pub fn value(&self) -> Option<&T> {
        match self {
            Slot::Rest => None,
            Slot::Value(value) => Some(value),
        }
    }

    pub fn into_value(self) -> Option<T> {
        match self {
            Slot::Rest => None,
            Slot::Value(value) => Some(value),
        }
    }

    pub fn is_rest(&self) -> bool {
        matches!(self, Slot::Rest)
    }
}

impl<T: Clone> Slot<&T> {
    pub fn cloned(self) -> Slot<T> {
        match self {
            Slot::Rest => Slot::Rest,
            Slot::Value(value) => Slot::Value(value.clone()),
        }
    }
}

impl<T> Default for Slot<T> {
    fn default() -> Slot<T> {
        Slot::Rest
    }
}

impl<T> From<Option<T>> for Slot<T> {
    fn from(value: Option<T>) -> Slot<T> {
        value.map_or(Slot::Rest, Slot::Value)
    }
}

/// One bar's worth of slots.
pub type Cycle<T> = Vec<Slot<T>>;

impl<T> From<Slot<T>> for Vec<Slot<T>> {
    /// A single slot is a one-slot cycle.
    fn from(slot: Slot<T>) -> Vec<Slot<T>> {
        vec![slot]
    }
}

/// An ordered list of cycles with cyclic addressing.
///
/// The array always has at least one cycle. Until a value is set it falls back to the default
/// value given to [`PatternArray::new`], and a transformation that produces no cycles at all also
/// falls back to the default.
#[derive(Debug, Clone, PartialEq)]
pub struct PatternArray<T> {
    value: Option<Vec<Cycle<T>>>,
    default_value: Vec<Cycle<T>>,
    // Rests inserted by `slow` sit off the grid of this many slots. `fast` may remove them again.
    spread: usize,
}

impl<T: Clone> Default for PatternArray<T> {
    fn default() -> PatternArray<T> {
        PatternArray::new(Vec::new())
    }
}

impl<T: Clone> PatternArray<T> {
    /// Creates an array that has not been given a value yet.
    ///
    /// An empty `default_value` is replaced by a single empty cycle.
    pub fn new(default_value: Vec<Cycle<T>>) -> PatternArray<T> {
        let default_value = if default_value.is_empty() {
            vec![Vec::new()]
        } else {
            default_value
        };
        PatternArray {
            value: None,
            default_value,
            spread: 1,
        }
    }

    /// The active cycles.
    pub fn cycles(&self) -> &[Cycle<T>] {
        match &self.value {
            Some(cycles) => cycles,
            None => &self.default_value,
        }
    }

    /// The number of active cycles. Never zero.
    #[allow(clippy::len_without_is_empty)]
    pub fn len(&self) -> usize {
        self.cycles().len()
    }

    /// Returns the cycle at `index`, wrapping modulo the number of cycles.
    pub fn cycle(&self, index: i64) -> &[Slot<T>] {
        let cycles = self.cycles();
        &cycles[wrap(index, cycles.len())]
    }

    /// Returns the slot at `cycle`/`slot`, wrapping both indices.
    ///
    /// An empty cycle reads as a rest at every index.
    pub fn at(&self, cycle: i64, slot: i64) -> Slot<&T> {
        let cycle = self.cycle(cycle);
        if cycle.is_empty() {
            return Slot::Rest;
        }
        cycle[wrap(slot, cycle.len())].as_ref()
    }

    /// Replaces the active value with the given cycles.
    ///
    /// Each item is either a single [`Slot`], which becomes a one-slot cycle, or a list of slots.
    pub fn note<I, C>(mut self, cycles: I) -> Self
    where
        I: IntoIterator<Item = C>,
        C: Into<Cycle<T>>,
    {
        self.set(cycles.into_iter().map(Into::into).collect());
        self
    }

    /// Speeds the pattern up by playing `n` consecutive cycles in the time of one.
    ///
    /// Factors are rounded to the nearest whole group size. A factor below one is the same as
    /// [`slow`](PatternArray::slow) by its reciprocal, and non-positive factors are ignored.
    ///
    /// Rests written into the pattern are kept. Only the rests a previous
    /// [`slow`](PatternArray::slow) placed between the slots are removed again, which is what
    /// makes `slow(n)` followed by `fast(n)` give back the original cycles.
    pub fn fast(self, n: f64) -> Self {
        match Factor::parse(n, "fast") {
            Some(Factor::Compress(n)) => self.compress(n),
            Some(Factor::Expand(n)) => self.expand(n),
            None => self,
        }
    }

    /// Slows the pattern down by spreading every cycle over `n` cycles.
    ///
    /// Each slot is placed on the `n`-times finer grid at `n` times its original position, and
    /// every position in between is a rest. Rounding follows [`fast`](PatternArray::fast).
    ///
    /// # Examples
    ///
    /// ```
    /// use barline::pattern::{PatternArray, Slot};
    ///
    /// let original = PatternArray::<char>::default().note(vec![Slot::values(vec!['a', 'b', 'c', 'd'])]);
    /// let slowed = original.clone().slow(2.0);
    ///
    /// assert_eq!(
    ///     slowed.cycles(),
    ///     &[
    ///         vec![Slot::Value('a'), Slot::Rest, Slot::Value('b'), Slot::Rest],
    ///         vec![Slot::Value('c'), Slot::Rest, Slot::Value('d'), Slot::Rest],
    ///     ][..]
    /// );
    /// assert_eq!(slowed.fast(2.0).cycles(), original.cycles());
    /// ```
    pub fn slow(self, n: f64) -> Self {
        match Factor::parse(n, "slow") {
            Some(Factor::Compress(n)) => self.expand(n),
            Some(Factor::Expand(n)) => self.compress(n),
            None => self,
        }
    }

    /// Resizes every cycle by `factor`, sampling the source slots.
    ///
    /// A cycle of `len` slots becomes `round(len * factor)` slots, rounding halves up and never
    /// shrinking a non-empty cycle below one slot. Output slot `k` copies source slot
    /// `floor(k / factor)`.
    pub fn stretch(mut self, factor: f64) -> Self {
        if !factor.is_finite() || factor <= 0.0 {
            log::warn!("stretch: ignoring invalid factor {}", factor);
            return self;
        }
        let longest = self.cycles().iter().map(Vec::len).max().unwrap_or(0);
        if longest as f64 * factor > MAX_SLOTS as f64 {
            log::warn!(
                "stretch: ignoring factor {}, cycles would exceed {} slots",
                factor,
                MAX_SLOTS
            );
            return self;
        }
        let cycles = self
            .cycles()
            .iter()
            .map(|cycle| {
                if cycle.is_empty() {
                    return Vec::new();
                }
                let len = ((cycle.len() as f64 * factor + 0.5).floor() as usize).max(1);
                (0..len)
                    .map(|k| {
                        let source = ((k as f64 / factor).floor() as usize).min(cycle.len() - 1);
                        cycle[source].clone()
                    })
                    .collect()
            })
            .collect();
        self.set(cycles);
        self
    }

    /// Reverses the order of cycles and the order of slots within every cycle.
    pub fn reverse(mut self) -> Self {
        let cycles = self
            .cycles()
            .iter()
            .rev()
            .map(|cycle| cycle.iter().rev().cloned().collect())
            .collect();
        self.set(cycles);
        self
    }

    /// Rotates the slots of every cycle left by `n`. Negative values rotate right.
    pub fn rotate(mut self, n: i64) -> Self {
        let cycles = self
            .cycles()
            .iter()
            .map(|cycle| {
                let mut cycle = cycle.clone();
                if !cycle.is_empty() {
                    let n = wrap(n, cycle.len());
                    cycle.rotate_left(n);
                }
                cycle
            })
            .collect();
        self.set(cycles);
        self
    }

    /// Splits every cycle into `n` cycles of contiguous slots.
    ///
    /// Each piece holds `ceil(len / n)` slots; the last piece is padded with rests when the cycle
    /// does not divide evenly. Piece counts above [`MAX_FACTOR`] are clamped.
    pub fn chop(mut self, n: usize) -> Self {
        if n == 0 {
            log::warn!("chop: ignoring zero piece count");
            return self;
        }
        let n = clamp_factor(n, "chop");
        let mut cycles = Vec::with_capacity(self.len() * n);
        for cycle in self.cycles() {
            let piece_len = (cycle.len() + n - 1) / n;
            for piece in 0..n {
                cycles.push(
                    (piece * piece_len..(piece + 1) * piece_len)
                        .map(|index| cycle.get(index).cloned().unwrap_or(Slot::Rest))
                        .collect(),
                );
            }
        }
        self.set(cycles);
        self
    }

    /// Replaces the active value with literal repetitions of the given cycles.
    ///
    /// Every `(count, cycle)` pair contributes `count` copies of `cycle`, in argument order.
    /// Non-positive counts contribute nothing.
    pub fn arrange<I>(mut self, sections: I) -> Self
    where
        I: IntoIterator<Item = (i64, Cycle<T>)>,
    {
        let mut cycles = Vec::new();
        for (count, cycle) in sections {
            for _ in 0..count.max(0) {
                cycles.push(cycle.clone());
            }
        }
        self.set(cycles);
        self
    }

    /// Applies a Euclidean rhythm to the pattern.
    ///
    /// Generates `pulses` onsets spread as evenly as possible over `steps` slots and rotates the
    /// result left by `rotation`. `pulses` and `rotation` may be lists; one cycle is produced per
    /// element of the longer list, with the shorter list repeating. Slots with an onset keep the
    /// value at the same position of the pattern's current contents, all other slots become rests.
    ///
    /// # Examples
    ///
    /// ```
    /// use barline::pattern::{PatternArray, Slot};
    ///
    /// let pattern = PatternArray::new(vec![Slot::values(vec![true])]).euclid(3, 8, 0);
    /// let onsets: Vec<bool> = pattern.cycle(0).iter().map(|slot| !slot.is_rest()).collect();
    ///
    /// assert_eq!(onsets, vec![true, false, false, true, false, false, true, false]);
    /// ```
    pub fn euclid(self, pulses: impl Into<Spread>, steps: i64, rotation: impl Into<Spread>) -> Self {
        let onsets = euclid::spread(&pulses.into(), steps, &rotation.into());
        self.apply_onsets(onsets)
    }

    /// Applies onsets decoded from hexadecimal tokens, one cycle per token.
    ///
    /// Every hex digit expands to four onset bits, most significant bit first. Malformed tokens
    /// produce an empty cycle.
    pub fn hex<I, H>(self, tokens: I) -> Self
    where
        I: IntoIterator<Item = H>,
        H: Into<HexToken>,
    {
        let onsets = tokens
            .into_iter()
            .map(|token| notation::hex_bits(&token.into()))
            .collect();
        self.apply_onsets(onsets)
    }

    /// Applies onsets from `x`/`-` strings or explicit bit lists, one cycle per token.
    ///
    /// In text tokens whitespace is ignored, `x` is an onset and any other character is a rest.
    pub fn xox<I, X>(self, tokens: I) -> Self
    where
        I: IntoIterator<Item = X>,
        X: Into<XoxToken>,
    {
        let onsets = tokens
            .into_iter()
            .map(|token| notation::xox_bits(&token.into()))
            .collect();
        self.apply_onsets(onsets)
    }

    fn apply_onsets(mut self, onsets: Vec<Vec<bool>>) -> Self {
        let cycles = onsets
            .iter()
            .enumerate()
            .map(|(cycle, bits)| {
                bits.iter()
                    .enumerate()
                    .map(|(slot, &onset)| {
                        if onset {
                            self.at(cycle as i64, slot as i64).cloned()
                        } else {
                            Slot::Rest
                        }
                    })
                    .collect()
            })
            .collect();
        self.set(cycles);
        self
    }

    fn compress(mut self, n: usize) -> Self {
        if n == 1 {
            return self;
        }
        // Concatenating `n` cycles keeps the padding of an earlier `slow` off the grid of
        // `gcd(n, spread)` slots, so exactly those positions can be dropped.
        let spread = self.spread;
        let grid = notation::gcd(n, spread);
        let source = self.cycles();
        let count = (source.len() + n - 1) / n;
        let cycles = (0..count)
            .map(|index| {
                let joined: Cycle<T> = (0..n)
                    .flat_map(|offset| source[(index * n + offset) % source.len()].iter().cloned())
                    .collect();
                compact(joined, grid)
            })
            .collect();
        self.set(cycles);
        if spread % n == 0 {
            self.spread = spread / n;
        }
        self
    }

    fn expand(mut self, n: usize) -> Self {
        if n == 1 {
            return self;
        }
        let spread = self.spread;
        let mut cycles = Vec::with_capacity(self.len() * n);
        for cycle in self.cycles() {
            let len = cycle.len();
            for part in 0..n {
                cycles.push(
                    (0..len)
                        .map(|slot| {
                            let stretched = part * len + slot;
                            if stretched % n == 0 {
                                cycle[stretched / n].clone()
                            } else {
                                Slot::Rest
                            }
                        })
                        .collect(),
                );
            }
        }
        self.set(cycles);
        self.spread = spread.checked_mul(n).unwrap_or(1);
        self
    }

    /// Replaces the active value. Any padding left by `slow` is forgotten.
    fn set(&mut self, cycles: Vec<Cycle<T>>) {
        self.value = if cycles.is_empty() { None } else { Some(cycles) };
        self.spread = 1;
    }
}

impl<T: Clone + FromStr> PatternArray<T> {
    /// Replaces the active value with cycles parsed from pattern notation.
    ///
    /// See [`notation::parse`] for the syntax. Malformed text is logged and leaves a single empty
    /// cycle in place.
    pub fn sequence(mut self, text: &str) -> Self {
        match notation::parse(text) {
            Ok(cycles) => self.set(cycles),
            Err(err) => {
                log::warn!("sequence: {}: {:?}", err, text);
                self.set(vec![Vec::new()]);
            }
        }
        self
    }
}

enum Factor {
    Compress(usize),
    Expand(usize),
}

impl Factor {
    fn parse(n: f64, operation: &str) -> Option<Factor> {
        if !n.is_finite() || n <= 0.0 {
            log::warn!("{}: ignoring invalid factor {}", operation, n);
            return None;
        }
        let group = |factor: f64| {
            let rounded = factor.round();
            if rounded > MAX_FACTOR as f64 {
                log::warn!("{}: clamping factor {} to {}", operation, factor, MAX_FACTOR);
                MAX_FACTOR
            } else {
                (rounded as usize).max(1)
            }
        };
        Some(if n >= 1.0 {
            Factor::Compress(group(n))
        } else {
            Factor::Expand(group(1.0 / n))
        })
    }
}

fn clamp_factor(n: usize, operation: &str) -> usize {
    if n > MAX_FACTOR {
        log::warn!("{}: clamping factor {} to {}", operation, n, MAX_FACTOR);
        MAX_FACTOR
    } else {
        n
    }
}


fn compact<T>(cycle: Cycle<T>, n: usize) -> Cycle<T> {
    let aligned = n > 1
        && !cycle.is_empty()
        && cycle.len() % n == 0
        && cycle
            .iter()
            .enumerate()
            .all(|(index, slot)| index % n == 0 || slot.is_rest());
    if !aligned {
        return cycle;
    }
    cycle.into_iter().step_by(n).collect()
}

pub(crate) fn wrap(index: i64, len: usize) -> usize {
    index.rem_euclid(len as i64) as usize
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chars(text: &str) -> Cycle<char> {
        text.chars()
            .map(|c| if c == '~' { Slot::Rest } else { Slot::Value(c) })
            .collect()
    }

    fn pattern(cycles: &[&str]) -> PatternArray<char> {
        PatternArray::default().note(cycles.iter().map(|cycle| chars(cycle)))
    }

    #[test]
    fn falls_back_to_default_value() {
        let pattern = PatternArray::new(vec![chars("ab")]);
        assert_eq!(pattern.len(), 1);
        assert_eq!(pattern.at(0, 1), Slot::Value(&'b'));

        let emptied = pattern.note(Vec::<Cycle<char>>::new());
        assert_eq!(emptied.cycles(), &[chars("ab")][..]);
    }

    #[test]
    fn empty_default_is_one_empty_cycle() {
        let pattern = PatternArray::<u8>::default();
        assert_eq!(pattern.len(), 1);
        assert_eq!(pattern.at(3, -7), Slot::Rest);
    }

    #[test]
    fn note_accepts_single_slots_and_lists() {
        let pattern = PatternArray::<i32>::default().note(vec![
            Slot::Value(1).into(),
            Slot::values(vec![2, 3]),
        ]);
        assert_eq!(
            pattern.cycles(),
            &[vec![Slot::Value(1)], vec![Slot::Value(2), Slot::Value(3)]][..]
        );
    }

    #[test]
    fn at_wraps_any_index() {
        let pattern = pattern(&["abc", "de"]);
        for i in -20..20_i64 {
            for j in -20..20_i64 {
                let cycle = i.rem_euclid(2);
                let len = if cycle == 0 { 3 } else { 2 };
                assert_eq!(pattern.at(i, j), pattern.at(cycle, j.rem_euclid(len)));
            }
        }
        assert_eq!(pattern.at(i64::MIN, i64::MAX), pattern.at(0, 1));
    }

    #[test]
    fn fast_joins_consecutive_cycles() {
        let fast = pattern(&["ab", "cd", "ef"]).fast(2.0);
        assert_eq!(fast.cycles(), &[chars("abcd"), chars("efab")][..]);
    }

    #[test]
    fn fast_repeats_a_single_cycle() {
        assert_eq!(pattern(&["ab"]).fast(2.0).cycles(), &[chars("abab")][..]);
    }

    #[test]
    fn slow_spreads_onto_finer_grid() {
        let slow = pattern(&["abc"]).slow(2.0);
        assert_eq!(slow.cycles(), &[chars("a~b"), chars("~c~")][..]);
    }

    #[test]
    fn slow_then_fast_round_trips() {
        let original = pattern(&["abcd", "efg", "h"]);
        for n in 1..6 {
            let round_trip = original.clone().slow(n as f64).fast(n as f64);
            assert_eq!(round_trip.cycles(), original.cycles(), "n = {}", n);
        }
    }

    #[test]
    fn fast_keeps_written_rests() {
        assert_eq!(pattern(&["a~"]).fast(2.0).cycles(), &[chars("a~a~")][..]);
        assert_eq!(
            pattern(&["a~b~"]).slow(2.0).fast(2.0).cycles(),
            &[chars("a~b~")][..]
        );
        assert_eq!(
            pattern(&["ab~d"]).slow(4.0).fast(2.0).fast(2.0).cycles(),
            &[chars("ab~d")][..]
        );
    }

    #[test]
    fn other_transformations_drop_slow_padding() {
        let reversed = pattern(&["ab"]).slow(2.0).reverse().fast(2.0);
        assert_eq!(reversed.cycles(), &[chars("~b~a")][..]);
    }

    #[test]
    fn huge_factors_are_clamped() {
        let fast = pattern(&["a"]).fast(1e20);
        assert_eq!(fast.cycles()[0].len(), MAX_FACTOR);

        let slow = pattern(&["ab"]).slow(1e20);
        assert_eq!(slow.len(), MAX_FACTOR);
        assert_eq!(slow.fast(1e20).cycles(), &[chars("ab")][..]);

        assert_eq!(pattern(&["a"]).fast(1e-20).len(), MAX_FACTOR);
        assert_eq!(pattern(&["ab"]).chop(usize::MAX).len(), MAX_FACTOR);
        assert_eq!(pattern(&["ab"]).stretch(1e20).cycles(), &[chars("ab")][..]);
        assert_eq!(pattern(&["x"]).euclid(1, i64::MAX, 0).cycles(), &[Vec::new()][..]);
    }

    #[test]
    fn fast_and_slow_are_reciprocal() {
        let original = pattern(&["ab", "cd"]);
        assert_eq!(original.clone().fast(0.5), original.clone().slow(2.0));
        assert_eq!(original.clone().slow(0.5), original.fast(2.0));
    }

    #[test]
    fn invalid_factors_are_ignored() {
        let original = pattern(&["ab"]);
        assert_eq!(original.clone().fast(0.0), original);
        assert_eq!(original.clone().slow(-2.0), original);
        assert_eq!(original.clone().fast(f64::NAN), original);
        assert_eq!(original.clone().stretch(0.0), original);
    }

    #[test]
    fn reverse_flips_cycles_and_slots() {
        let reversed = pattern(&["ab~", "cd"]).reverse();
        assert_eq!(reversed.cycles(), &[chars("dc"), chars("~ba")][..]);
    }

    #[test]
    fn rotate_wraps_in_both_directions() {
        assert_eq!(pattern(&["abcd"]).rotate(1).cycles(), &[chars("bcda")][..]);
        assert_eq!(pattern(&["abcd"]).rotate(-1).cycles(), &[chars("dabc")][..]);
        assert_eq!(pattern(&["abcd"]).rotate(9).cycles(), &[chars("bcda")][..]);
    }

    #[test]
    fn stretch_rounds_half_up_and_floors_sources() {
        assert_eq!(pattern(&["ab"]).stretch(2.0).cycles(), &[chars("aabb")][..]);
        assert_eq!(pattern(&["abc"]).stretch(0.5).cycles(), &[chars("ac")][..]);
        assert_eq!(pattern(&["a"]).stretch(0.1).cycles(), &[chars("a")][..]);
        assert_eq!(pattern(&["abc"]).stretch(1.5).cycles(), &[chars("aabcc")][..]);
    }

    #[test]
    fn chop_pads_the_last_piece() {
        let chopped = pattern(&["abcde"]).chop(2);
        assert_eq!(chopped.cycles(), &[chars("abc"), chars("de~")][..]);
    }

    #[test]
    fn arrange_repeats_cycles_literally() {
        let arranged = PatternArray::default().arrange(vec![
            (2, chars("ab")),
            (0, chars("zz")),
            (1, chars("c")),
        ]);
        assert_eq!(
            arranged.cycles(),
            &[chars("ab"), chars("ab"), chars("c")][..]
        );
    }

    #[test]
    fn euclid_keeps_values_at_onsets() {
        let pattern = pattern(&["abcdefgh"]).euclid(3, 8, 0);
        assert_eq!(pattern.cycles(), &[chars("a~~d~~g~")][..]);
    }

    #[test]
    fn euclid_lists_produce_one_cycle_each() {
        let pattern = pattern(&["x"]).euclid(vec![2, 3], 4, 0);
        assert_eq!(pattern.cycles(), &[chars("x~x~"), chars("xxx~")][..]);
    }

    #[test]
    fn euclid_invalid_arguments_yield_empty_cycle() {
        let pattern = pattern(&["x"]).euclid(5, 4, 0);
        assert_eq!(pattern.cycles(), &[Vec::new()][..]);
    }

    #[test]
    fn hex_and_xox_decode_onsets() {
        let hex = pattern(&["x"]).hex(vec!["A"]);
        assert_eq!(hex.cycles(), &[chars("x~x~")][..]);

        let xox = pattern(&["x"]).xox(vec!["x-x- x"]);
        assert_eq!(xox.cycles(), &[chars("x~x~x")][..]);
    }

    #[test]
    fn sequence_parses_notation() {
        let pattern = PatternArray::<u8>::default().sequence("1 ~ 3 | 4");
        assert_eq!(
            pattern.cycles(),
            &[
                vec![Slot::Value(1), Slot::Rest, Slot::Value(3)],
                vec![Slot::Value(4)]
            ][..]
        );
    }

    #[test]
    fn malformed_sequence_is_an_empty_cycle() {
        let pattern = PatternArray::<u8>::new(vec![Slot::values(vec![1])]).sequence("1 [2");
        assert_eq!(pattern.cycles(), &[Vec::new()][..]);

        let runaway = PatternArray::<u8>::default().sequence(&"[".repeat(200_000));
        assert_eq!(runaway.cycles(), &[Vec::new()][..]);
    }
}
