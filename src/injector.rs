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

//! Key-sequence sender
//!
//! Presses and releases each key in order with per-adjacency delays.
//! Injection failures degrade to a logged `false` result; nothing
//! propagates past this boundary.

use anyhow::{Context, Result};
use enigo::{Direction, Enigo, Key, Keyboard, Settings};
use rand::Rng;
use std::time::Duration;
use tokio::time::sleep;
use tracing::error;

use crate::types::{DEFAULT_DELAY_MS, KeyToken};

/// Host input-injection boundary. One press/release pair per key token.
pub trait Injector {
    fn press(&mut self, token: &KeyToken) -> Result<()>;
    fn release(&mut self, token: &KeyToken) -> Result<()>;
}

/// OS-level injection via enigo.
pub struct EnigoInjector {
    enigo: Enigo,
}

impl EnigoInjector {
    pub fn new() -> Result<Self> {
        let enigo = Enigo::new(&Settings::default())
            .context("Failed to initialise keyboard injection")?;
        Ok(Self { enigo })
    }

    fn apply(&mut self, token: &KeyToken, direction: Direction) -> Result<()> {
        match token {
            KeyToken::Char(c) => self
                .enigo
                .key(Key::Unicode(*c), direction)
                .with_context(|| format!("Failed to send key '{c}'"))?,
            KeyToken::Named(name) => match named_key(name) {
                Some(key) => self
                    .enigo
                    .key(key, direction)
                    .with_context(|| format!("Failed to send key '{name}'"))?,
                // Unrecognised names pass through as literal text
                None => {
                    if matches!(direction, Direction::Press) {
                        self.enigo
                            .text(name)
                            .with_context(|| format!("Failed to type '{name}'"))?;
                    }
                }
            },
        }
        Ok(())
    }
}

impl Injector for EnigoInjector {
    fn press(&mut self, token: &KeyToken) -> Result<()> {
        self.apply(token, Direction::Press)
    }

    fn release(&mut self, token: &KeyToken) -> Result<()> {
        self.apply(token, Direction::Release)
    }
}

fn named_key(name: &str) -> Option<Key> {
    let key = match name {
        "esc" | "escape" => Key::Escape,
        "tab" => Key::Tab,
        "enter" | "return" => Key::Return,
        "space" => Key::Space,
        "backspace" => Key::Backspace,
        "delete" | "del" => Key::Delete,
        "home" => Key::Home,
        "end" => Key::End,
        "page_up" | "pageup" => Key::PageUp,
        "page_down" | "pagedown" => Key::PageDown,
        "up" => Key::UpArrow,
        "down" => Key::DownArrow,
        "left" => Key::LeftArrow,
        "right" => Key::RightArrow,
        "ctrl" | "control" => Key::Control,
        "alt" => Key::Alt,
        "shift" => Key::Shift,
        "meta" | "cmd" | "win" => Key::Meta,
        "caps_lock" | "capslock" => Key::CapsLock,
        "f1" => Key::F1,
        "f2" => Key::F2,
        "f3" => Key::F3,
        "f4" => Key::F4,
        "f5" => Key::F5,
        "f6" => Key::F6,
        "f7" => Key::F7,
        "f8" => Key::F8,
        "f9" => Key::F9,
        "f10" => Key::F10,
        "f11" => Key::F11,
        "f12" => Key::F12,
        _ => return None,
    };
    Some(key)
}

/// Sleep plan for one pass over a sequence: the i-th entry is the pause
/// after the i-th key. The final gap is dropped when the caller's own
/// cycle timer already covers it. With no table at all, a lone trailing
/// default delay remains for manual test runs.
pub fn cycle_delays(key_count: usize, delays_ms: &[u64], include_final_delay: bool) -> Vec<Duration> {
    let mut plan = vec![Duration::ZERO; key_count];
    if key_count == 0 {
        return plan;
    }

    if delays_ms.is_empty() {
        if include_final_delay {
            plan[key_count - 1] = Duration::from_millis(DEFAULT_DELAY_MS);
        }
        return plan;
    }

    for (i, slot) in plan.iter_mut().enumerate() {
        if let Some(&ms) = delays_ms.get(i) {
            *slot = Duration::from_millis(ms);
        }
    }
    if !include_final_delay {
        plan[key_count - 1] = Duration::ZERO;
    }
    plan
}

fn jittered(base: Duration, jitter: f64) -> Duration {
    let base_ms = base.as_millis() as u64;
    let jitter_ms = (base_ms as f64 * jitter) as u64;

    if jitter_ms == 0 {
        return base;
    }

    let mut rng = rand::thread_rng();
    let variation = rng.gen_range(0..=jitter_ms * 2);
    Duration::from_millis(base_ms.saturating_add(variation).saturating_sub(jitter_ms))
}

async fn try_send<I: Injector>(
    injector: &mut I,
    keys: &[KeyToken],
    delays_ms: &[u64],
    include_final_delay: bool,
    jitter: f64,
) -> Result<()> {
    let plan = cycle_delays(keys.len(), delays_ms, include_final_delay);
    for (key, pause) in keys.iter().zip(plan) {
        injector.press(key)?;
        injector.release(key)?;
        if !pause.is_zero() {
            sleep(jittered(pause, jitter)).await;
        }
    }
    Ok(())
}

/// Send the whole sequence once. Returns `false` (after logging) on any
/// injection failure rather than surfacing an error to the caller.
pub async fn send_sequence<I: Injector>(
    injector: &mut I,
    keys: &[KeyToken],
    delays_ms: &[u64],
    include_final_delay: bool,
    jitter: f64,
) -> bool {
    match try_send(injector, keys, delays_ms, include_final_delay, jitter).await {
        Ok(()) => true,
        Err(e) => {
            error!("key injection failed: {e:#}");
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::anyhow;
    use tokio::time::Instant;

    #[derive(Default)]
    struct MockInjector {
        presses: Vec<KeyToken>,
        releases: Vec<KeyToken>,
        fail_on: Option<usize>,
    }

    impl Injector for MockInjector {
        fn press(&mut self, token: &KeyToken) -> Result<()> {
            if self.fail_on == Some(self.presses.len()) {
                return Err(anyhow!("injection rejected"));
            }
            self.presses.push(token.clone());
            Ok(())
        }

        fn release(&mut self, token: &KeyToken) -> Result<()> {
            self.releases.push(token.clone());
            Ok(())
        }
    }

    fn sequence() -> Vec<KeyToken> {
        vec![
            KeyToken::Char('a'),
            KeyToken::Char('b'),
            KeyToken::Char('c'),
        ]
    }

    #[test]
    fn test_cycle_delays_skips_final_gap() {
        let plan = cycle_delays(3, &[50, 75, 25], false);
        let total: Duration = plan.iter().sum();
        assert_eq!(total, Duration::from_millis(125));
        assert_eq!(plan[2], Duration::ZERO);
    }

    #[test]
    fn test_cycle_delays_keeps_final_gap() {
        let plan = cycle_delays(3, &[50, 75, 25], true);
        let total: Duration = plan.iter().sum();
        assert_eq!(total, Duration::from_millis(150));
    }

    #[test]
    fn test_cycle_delays_without_table() {
        // No table and no final delay means no sleeping at all.
        let plan = cycle_delays(3, &[], false);
        assert!(plan.iter().all(Duration::is_zero));

        // Manual test mode keeps one trailing default delay.
        let plan = cycle_delays(3, &[], true);
        assert_eq!(plan[0], Duration::ZERO);
        assert_eq!(plan[1], Duration::ZERO);
        assert_eq!(plan[2], Duration::from_millis(DEFAULT_DELAY_MS));
    }

    #[test]
    fn test_cycle_delays_short_table() {
        let plan = cycle_delays(3, &[40], true);
        assert_eq!(plan[0], Duration::from_millis(40));
        assert_eq!(plan[1], Duration::ZERO);
        assert_eq!(plan[2], Duration::ZERO);
    }

    #[test]
    fn test_single_key_self_loop() {
        assert_eq!(cycle_delays(1, &[200], true), vec![Duration::from_millis(200)]);
        assert_eq!(cycle_delays(1, &[200], false), vec![Duration::ZERO]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_send_presses_every_key_once() {
        let mut injector = MockInjector::default();
        let keys = sequence();
        let sent = send_sequence(&mut injector, &keys, &[50, 75, 25], false, 0.0).await;
        assert!(sent);
        assert_eq!(injector.presses, keys);
        assert_eq!(injector.releases, keys);
    }

    #[tokio::test(start_paused = true)]
    async fn test_send_sleeps_all_but_last_delay() {
        let mut injector = MockInjector::default();
        let keys = sequence();
        let start = Instant::now();
        send_sequence(&mut injector, &keys, &[50, 75, 25], false, 0.0).await;
        assert_eq!(start.elapsed(), Duration::from_millis(125));
    }

    #[tokio::test(start_paused = true)]
    async fn test_send_with_final_delay_sleeps_whole_table() {
        let mut injector = MockInjector::default();
        let keys = sequence();
        let start = Instant::now();
        send_sequence(&mut injector, &keys, &[50, 75, 25], true, 0.0).await;
        assert_eq!(start.elapsed(), Duration::from_millis(150));
    }

    #[tokio::test(start_paused = true)]
    async fn test_send_reports_injection_failure() {
        let mut injector = MockInjector {
            fail_on: Some(1),
            ..MockInjector::default()
        };
        let keys = sequence();
        let sent = send_sequence(&mut injector, &keys, &[50, 75, 25], false, 0.0).await;
        assert!(!sent);
        // First key went through before the failure.
        assert_eq!(injector.presses.len(), 1);
    }

    #[test]
    fn test_jitter_stays_within_bounds() {
        let base = Duration::from_millis(100);
        for _ in 0..50 {
            let d = jittered(base, 0.2).as_millis() as u64;
            assert!((80..=120).contains(&d));
        }
    }

    #[test]
    fn test_zero_jitter_is_exact() {
        assert_eq!(jittered(Duration::from_millis(100), 0.0), Duration::from_millis(100));
    }
}
