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

//! Key-combination recording
//!
//! A background listener captures key presses until the configured stop
//! key is seen, then hands the finished sequence to the caller as a
//! single completion event over a oneshot channel. The capture buffer is
//! owned by the listener alone until that handoff.

use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use tokio::sync::oneshot;
use tracing::{debug, warn};

use crate::types::KeyToken;

static RECORDING: AtomicBool = AtomicBool::new(false);

/// Collects pressed tokens until the stop key appears. The stop key
/// itself is never captured.
pub struct Capture {
    stop_key: KeyToken,
    buffer: Vec<KeyToken>,
}

impl Capture {
    pub fn new(stop_key: KeyToken) -> Self {
        Self {
            stop_key,
            buffer: Vec::new(),
        }
    }

    /// Feed one observed press. Returns the finalized sequence once the
    /// stop key is seen; the result may be empty if nothing was captured.
    pub fn observe(&mut self, token: KeyToken) -> Option<Vec<KeyToken>> {
        if token == self.stop_key {
            return Some(std::mem::take(&mut self.buffer));
        }
        self.buffer.push(token);
        None
    }
}

/// Start a background recording session. Returns `None` while another
/// session is active. The receiver yields exactly one finalized sequence;
/// a dropped sender means the capture was empty and was discarded.
pub fn start_recording(stop_key: KeyToken) -> Option<oneshot::Receiver<Vec<KeyToken>>> {
    if RECORDING.swap(true, Ordering::SeqCst) {
        warn!("a recording session is already active");
        return None;
    }

    let (tx, rx) = oneshot::channel();
    thread::spawn(move || {
        let mut capture = Capture::new(stop_key);
        let mut pending = Some(tx);

        // rdev's listener cannot be torn down once installed; after the
        // stop key fires the callback goes inert.
        let result = rdev::listen(move |event| {
            let rdev::EventType::KeyPress(key) = event.event_type else {
                return;
            };
            let Some(tx) = pending.take() else {
                return;
            };
            match capture.observe(token_from_rdev(key)) {
                Some(sequence) => {
                    RECORDING.store(false, Ordering::SeqCst);
                    if sequence.is_empty() {
                        debug!("recording finished with no keys; discarding");
                    } else {
                        let _ = tx.send(sequence);
                    }
                }
                None => pending = Some(tx),
            }
        });

        if let Err(e) = result {
            RECORDING.store(false, Ordering::SeqCst);
            warn!("key listener failed: {e:?}");
        }
    });

    Some(rx)
}

fn named(name: &str) -> KeyToken {
    KeyToken::Named(name.to_string())
}

fn token_from_rdev(key: rdev::Key) -> KeyToken {
    use rdev::Key::*;

    match key {
        KeyA => KeyToken::Char('a'),
        KeyB => KeyToken::Char('b'),
        KeyC => KeyToken::Char('c'),
        KeyD => KeyToken::Char('d'),
        KeyE => KeyToken::Char('e'),
        KeyF => KeyToken::Char('f'),
        KeyG => KeyToken::Char('g'),
        KeyH => KeyToken::Char('h'),
        KeyI => KeyToken::Char('i'),
        KeyJ => KeyToken::Char('j'),
        KeyK => KeyToken::Char('k'),
        KeyL => KeyToken::Char('l'),
        KeyM => KeyToken::Char('m'),
        KeyN => KeyToken::Char('n'),
        KeyO => KeyToken::Char('o'),
        KeyP => KeyToken::Char('p'),
        KeyQ => KeyToken::Char('q'),
        KeyR => KeyToken::Char('r'),
        KeyS => KeyToken::Char('s'),
        KeyT => KeyToken::Char('t'),
        KeyU => KeyToken::Char('u'),
        KeyV => KeyToken::Char('v'),
        KeyW => KeyToken::Char('w'),
        KeyX => KeyToken::Char('x'),
        KeyY => KeyToken::Char('y'),
        KeyZ => KeyToken::Char('z'),
        Num0 => KeyToken::Char('0'),
        Num1 => KeyToken::Char('1'),
        Num2 => KeyToken::Char('2'),
        Num3 => KeyToken::Char('3'),
        Num4 => KeyToken::Char('4'),
        Num5 => KeyToken::Char('5'),
        Num6 => KeyToken::Char('6'),
        Num7 => KeyToken::Char('7'),
        Num8 => KeyToken::Char('8'),
        Num9 => KeyToken::Char('9'),
        Escape => named("escape"),
        Return => named("enter"),
        Space => named("space"),
        Tab => named("tab"),
        Backspace => named("backspace"),
        Delete => named("delete"),
        Home => named("home"),
        End => named("end"),
        PageUp => named("page_up"),
        PageDown => named("page_down"),
        UpArrow => named("up"),
        DownArrow => named("down"),
        LeftArrow => named("left"),
        RightArrow => named("right"),
        ControlLeft | ControlRight => named("ctrl"),
        Alt | AltGr => named("alt"),
        ShiftLeft | ShiftRight => named("shift"),
        MetaLeft | MetaRight => named("meta"),
        CapsLock => named("caps_lock"),
        F1 => named("f1"),
        F2 => named("f2"),
        F3 => named("f3"),
        F4 => named("f4"),
        F5 => named("f5"),
        F6 => named("f6"),
        F7 => named("f7"),
        F8 => named("f8"),
        F9 => named("f9"),
        F10 => named("f10"),
        F11 => named("f11"),
        F12 => named("f12"),
        other => KeyToken::Named(format!("{other:?}").to_ascii_lowercase()),
    }
}
