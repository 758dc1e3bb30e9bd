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

//! DV repetition calculator
//!
//! Converts a requested dorsoventral displacement into the number of key
//! presses needed to drive it, given the manipulator's step size in
//! presses per 0.001 mm.

use std::fmt;
use thiserror::Error;

// Displacements below this are treated as "no movement requested".
const MIN_DISPLACEMENT_MM: f64 = 0.0001;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum DvError {
    #[error("step size must be greater than 0")]
    NonPositiveStepSize,
    #[error("current and final DV must be different")]
    NoMovement,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Increase,
    Decrease,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Increase => write!(f, "increase"),
            Direction::Decrease => write!(f, "decrease"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DvPlan {
    pub repetitions: u64,
    pub direction: Direction,
    pub distance_mm: f64,
}

/// Number of presses to move from `current_mm` to `final_mm` at
/// `steps_per_micron` presses per 0.001 mm, rounded up so any fractional
/// step still lands past the target.
pub fn reps_needed(
    current_mm: f64,
    final_mm: f64,
    steps_per_micron: u32,
) -> Result<DvPlan, DvError> {
    if steps_per_micron == 0 {
        return Err(DvError::NonPositiveStepSize);
    }

    let difference = final_mm - current_mm;
    if difference.abs() < MIN_DISPLACEMENT_MM {
        return Err(DvError::NoMovement);
    }

    let distance_microns = difference.abs() * 1000.0;
    let repetitions = (distance_microns * f64::from(steps_per_micron)).ceil() as u64;
    let direction = if difference > 0.0 {
        Direction::Increase
    } else {
        Direction::Decrease
    };

    Ok(DvPlan {
        repetitions,
        direction,
        distance_mm: difference.abs(),
    })
}
