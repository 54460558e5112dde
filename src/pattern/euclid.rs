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

//! Euclidean rhythm generation.
//!
//! Rhythms are built with the iterative form of Bjorklund's algorithm. Two lists of groups are
//! kept: the "onset" groups, which start as `pulses` groups of a single onset, and the remainder
//! groups, which start as `steps - pulses` groups of a single rest. Every round appends one
//! remainder group to each onset group, and whatever is left over on either side becomes the new
//! remainder. The rounds stop once at most one remainder group is left.

/// A list argument for [`PatternArray::euclid`](super::PatternArray::euclid).
///
/// A single number is a one element list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Spread(Vec<i64>);

impl Spread {
    pub fn values(&self) -> &[i64] {
        &self.0
    }
}

macro_rules! spread_from {
    ($($int:ty),*) => {
        $(
            impl From<$int> for Spread {
                fn from(value: $int) -> Spread {
                    Spread(vec![value as i64])
                }
            }

            impl From<Vec<$int>> for Spread {
                fn from(values: Vec<$int>) -> Spread {
                    Spread(values.into_iter().map(|value| value as i64).collect())
                }
            }

            impl From<&[$int]> for Spread {
                fn from(values: &[$int]) -> Spread {
                    Spread(values.iter().map(|&value| value as i64).collect())
                }
            }
        )*
    };
}

spread_from!(i32, i64);

/// Builds one onset list per element of the longer of `pulses` and `rotations`.
///
/// An empty list is treated as `[0]`.
pub fn spread(pulses: &Spread, steps: i64, rotations: &Spread) -> Vec<Vec<bool>> {
    let pulses = non_empty(pulses.values());
    let rotations = non_empty(rotations.values());
    let count = pulses.len().max(rotations.len());
    (0..count)
        .map(|index| {
            let mut onsets = bjorklund(pulses[index % pulses.len()], steps);
            rotate(&mut onsets, rotations[index % rotations.len()]);
            onsets
        })
        .collect()
}

/// Distributes `pulses` onsets as evenly as possible over `steps` positions.
///
/// Returns an empty list when `pulses` or `steps` is negative, `pulses` exceeds `steps` or
/// `steps` exceeds [`MAX_SLOTS`](super::MAX_SLOTS).
pub fn bjorklund(pulses: i64, steps: i64) -> Vec<bool> {
    if pulses < 0 || steps < 0 || pulses > steps || steps as u64 > super::MAX_SLOTS as u64 {
        log::warn!(
            "euclid: no rhythm for {} pulses over {} steps",
            pulses,
            steps
        );
        return Vec::new();
    }
    let (pulses, steps) = (pulses as usize, steps as usize);
    if pulses == 0 || pulses == steps {
        return vec![pulses != 0; steps];
    }

    let mut onsets: Vec<Vec<bool>> = vec![vec![true]; pulses];
    let mut remainder: Vec<Vec<bool>> = vec![vec![false]; steps - pulses];
    while remainder.len() > 1 {
        let paired = onsets.len().min(remainder.len());
        let leftover = if onsets.len() > paired {
            onsets.split_off(paired)
        } else {
            remainder.split_off(paired)
        };
        for (group, tail) in onsets.iter_mut().zip(remainder.drain(..)) {
            group.extend(tail);
        }
        remainder = leftover;
    }

    onsets.into_iter().chain(remainder).flatten().collect()
}

/// Rotates left by `rotation`, normalized into `0..len`.
pub fn rotate(onsets: &mut [bool], rotation: i64) {
    if !onsets.is_empty() {
        onsets.rotate_left(super::wrap(rotation, onsets.len()));
    }
}

fn non_empty(values: &[i64]) -> &[i64] {
    if values.is_empty() {
        &[0]
    } else {
        values
    }
}
