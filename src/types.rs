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

//! Core types for stereokey automation

use std::fmt;

/// Default delay substituted for missing or malformed interval entries.
pub const DEFAULT_DELAY_MS: u64 = 100;

/// Cycle interval used when no interval table is available.
pub const FALLBACK_CYCLE_MS: u64 = 1000;

/// A symbolic key: either a literal character or a named special key
/// such as "escape" or "page_down".
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeyToken {
    Char(char),
    Named(String),
}

impl fmt::Display for KeyToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KeyToken::Char(c) => write!(f, "{c}"),
            KeyToken::Named(name) => write!(f, "{name}"),
        }
    }
}

/// The live-editable pair driving each cycle: an ordered key sequence and
/// its interval table. The table is cyclic: N keys carry N delay entries,
/// the i-th delay following the i-th key, the last wrapping back to the
/// start of the next cycle. A single-key sequence gets one self-loop entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CycleConfig {
    pub keys: Vec<KeyToken>,
    pub delays_ms: Vec<u64>,
}

impl CycleConfig {
    /// Total time for one cycle, which is also the scheduler's tick period.
    pub fn cycle_interval_ms(&self) -> u64 {
        if self.delays_ms.is_empty() {
            FALLBACK_CYCLE_MS
        } else {
            self.delays_ms.iter().sum()
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunMode {
    Continuous,
    Counted(u32),
}
