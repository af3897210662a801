// Copyright (c) 2017-2021 Rene van der Meer
//
// Permission is hereby granted, free of charge, to any person obtaining a
// copy of this software and associated documentation files (the "Software"),
// to deal in the Software without restriction, including without limitation
// the rights to use, copy, modify, merge, publish, distribute, sublicense,
// and/or sell copies of the Software, and to permit persons to whom the
// Software is furnished to do so, subject to the following conditions:
//
// The above copyright notice and this permission notice shall be included in
// all copies or substantial portions of the Software.
//
// THE SOFTWARE IS PROVIDED "AS IS", WITHOUT WARRANTY OF ANY KIND, EXPRESS OR
// IMPLIED, INCLUDING BUT NOT LIMITED TO THE WARRANTIES OF MERCHANTABILITY,
// FITNESS FOR A PARTICULAR PURPOSE AND NONINFRINGEMENT. IN NO EVENT SHALL
// THE AUTHORS OR COPYRIGHT HOLDERS BE LIABLE FOR ANY CLAIM, DAMAGES OR OTHER
// LIABILITY, WHETHER IN AN ACTION OF CONTRACT, TORT OR OTHERWISE, ARISING
// FROM, OUT OF OR IN CONNECTION WITH THE SOFTWARE OR THE USE OR OTHER
// DEALINGS IN THE SOFTWARE.

//! CPU-family GPIO register banks.
//!
//! Each supported SoC family exposes its GPIO lines through a block of
//! memory-mapped registers. A [`Bank`] knows how to encode pin functions,
//! pull resistors and levels for one such block. The pins registered by a CPU
//! driver all share the driver's bank through an `Arc`.
//!
//! Several pins are packed into each register word. Every read-modify-write
//! of a shared word is serialized by a per-word lock inside the bank, so pins
//! that share a word can be reconfigured concurrently.
//!
//! [`Bank`]: trait.Bank.html

use std::fmt;
use std::hint;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::gpio::{self, sysfs, Function, Level, MemPin, Pull};

#[cfg(feature = "allwinner")]
pub mod allwinner;
#[cfg(feature = "bcm283x")]
pub mod bcm283x;

/// A CPU family's GPIO register block.
///
/// Lines are addressed by their global GPIO number.
pub trait Bank: fmt::Debug + Send + Sync {
    /// Returns the global numbers of every line in the bank, in ascending order.
    fn lines(&self) -> Vec<u32>;

    /// Returns the name of `line`, like `GPIO4` or `PB8`.
    fn line_name(&self, line: u32) -> String;

    /// Returns the pull resistor state of `line` after a reset.
    fn default_pull(&self, _line: u32) -> Pull {
        Pull::Float
    }

    fn function(&self, line: u32) -> Function;

    fn set_function(&self, line: u32, function: Function) -> gpio::Result<()>;

    /// Returns the current pull resistor state, if the hardware allows it to be read back.
    fn pull(&self, line: u32) -> Option<Pull>;

    fn set_pull(&self, line: u32, pull: Pull);

    fn level(&self, line: u32) -> Level;

    fn set_level(&self, line: u32, level: Level);

    /// Returns the peripheral signal that alternate function `alt` routes to `line`.
    fn alt_name(&self, _line: u32, _alt: u8) -> Option<&'static str> {
        None
    }
}

/// One spin lock per register word.
pub(crate) struct WordLocks {
    locks: Box<[AtomicBool]>,
}

impl fmt::Debug for WordLocks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WordLocks")
            .field("locks", &format_args!("{{ .. }}"))
            .finish()
    }
}

impl WordLocks {
    pub(crate) fn new(words: usize) -> WordLocks {
        WordLocks {
            locks: (0..words).map(|_| AtomicBool::new(false)).collect(),
        }
    }

    /// Locks `word` until the returned guard goes out of scope.
    pub(crate) fn lock(&self, word: usize) -> WordGuard<'_> {
        let lock = &self.locks[word];

        while lock
            .compare_exchange_weak(false, true, Ordering::Acquire, Ordering::Relaxed)
            .is_err()
        {
            hint::spin_loop();
        }

        WordGuard { lock }
    }
}

pub(crate) struct WordGuard<'a> {
    lock: &'a AtomicBool,
}

impl Drop for WordGuard<'_> {
    fn drop(&mut self) {
        self.lock.store(false, Ordering::Release);
    }
}

/// Registers a [`MemPin`] for every line in `bank`.
///
/// Edge detection for the new pins goes through `sysfs`.
///
/// [`MemPin`]: ../gpio/mmio/struct.MemPin.html
pub fn register_bank(
    pins: &gpio::Registry,
    bank: Arc<dyn Bank>,
    sysfs: &Arc<sysfs::Gpio>,
) -> gpio::Result<usize> {
    let lines = bank.lines();

    for &line in &lines {
        pins.register(Arc::new(MemPin::new(bank.clone(), line, sysfs.clone())))?;
    }

    log::debug!("Registered {} pins for {:?}", lines.len(), bank);

    Ok(lines.len())
}
