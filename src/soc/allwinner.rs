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

//! Allwinner A64 and H3 PIO controller.
//!
//! Each port occupies 0x24 bytes: four function-select words with 4 bits per
//! pin, one data word, two drive-strength words and two pull words with 2
//! bits per pin. Pins are named `P<port><n>` and numbered `port * 32 + n`,
//! matching the kernel's GPIO numbering.

use std::fmt;
use std::sync::Arc;

use crate::driver::{self, InitError};
use crate::gpio::{self, sysfs, Error, Function, Level, Pull};
use crate::host::Host;
use crate::mem::RegisterOverlay;
use crate::soc::{self, WordGuard, WordLocks};
use crate::system::{DeviceInfo, Soc};

/// Physical address of the PIO block.
pub const PIO_BASE: u64 = 0x01C2_0800;
pub(crate) const PIO_LEN: usize = 0x400;

const PORT_WORDS: usize = 9;
const CFG0: usize = 0;
const DAT: usize = 4;
const PULL0: usize = 7;

const FN_INPUT: u32 = 0b000;
const FN_OUTPUT: u32 = 0b001;
const FN_DISABLED: u32 = 0b111;

const PULL_FLOAT: u32 = 0b00;
const PULL_UP: u32 = 0b01;
const PULL_DOWN: u32 = 0b10;

/// Ports and the number of pins each one has, by port index (A = 0).
pub const PORTS_A64: &[(u8, u32)] = &[(1, 10), (2, 17), (3, 25), (4, 18), (5, 7), (6, 14), (7, 12)];
pub const PORTS_H3: &[(u8, u32)] = &[(0, 22), (2, 19), (3, 18), (4, 16), (5, 7), (6, 14)];

// (line, alternate function, signal) for the commonly used A64 functions
const ALT_NAMES_A64: &[(u32, u8, &str)] = &[
    (32, 1, "UART2_TX"),
    (32, 3, "JTAG_MS0"),
    (33, 1, "UART2_RX"),
    (33, 3, "JTAG_CK0"),
    (34, 1, "UART2_RTS"),
    (34, 3, "JTAG_DO0"),
    (35, 1, "UART2_CTS"),
    (35, 2, "I2S0_MCLK"),
    (35, 3, "JTAG_DI0"),
    (36, 1, "AIF2_SYNC"),
    (36, 2, "PCM0_SYNC"),
    (37, 1, "AIF2_BCLK"),
    (37, 2, "PCM0_BCLK"),
    (38, 1, "AIF2_DOUT"),
    (38, 2, "PCM0_DOUT"),
    (39, 1, "AIF2_DIN"),
    (39, 2, "PCM0_DIN"),
    (40, 3, "UART0_TX"),
    (41, 3, "UART0_RX"),
    (64, 1, "NAND_WE"),
    (64, 2, "SDC2_DS"),
    (64, 3, "SPI0_MOSI"),
    (65, 1, "NAND_ALE"),
    (65, 2, "SDC2_RST"),
    (65, 3, "SPI0_MISO"),
    (66, 1, "NAND_CLE"),
    (66, 3, "SPI0_CLK"),
    (67, 1, "NAND_CE1"),
    (67, 3, "SPI0_CS"),
    (224, 1, "I2C0_SCL"),
    (225, 1, "I2C0_SDA"),
    (226, 1, "I2C1_SCL"),
    (227, 1, "I2C1_SDA"),
    (228, 3, "UART3_TX"),
    (229, 3, "UART3_RX"),
    (230, 3, "UART3_RTS"),
    (231, 3, "UART3_CTS"),
    (232, 3, "OWA_OUT"),
];

fn function_code(function: Function) -> Option<u32> {
    match function {
        Function::Input => Some(FN_INPUT),
        Function::Output => Some(FN_OUTPUT),
        Function::Alt(n @ 1..=5) => Some(u32::from(n) + 1),
        Function::Disabled => Some(FN_DISABLED),
        Function::Alt(_) => None,
    }
}

fn code_function(code: u32) -> Function {
    match code {
        FN_INPUT => Function::Input,
        FN_OUTPUT => Function::Output,
        FN_DISABLED => Function::Disabled,
        n => Function::Alt(n as u8 - 1),
    }
}

/// The PIO controller of an Allwinner SoC.
pub struct Bank {
    regs: RegisterOverlay,
    locks: WordLocks,
    ports: &'static [(u8, u32)],
    alt_names: &'static [(u32, u8, &'static str)],
}

impl fmt::Debug for Bank {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("allwinner::Bank")
            .field("regs", &self.regs)
            .field("ports", &self.ports.len())
            .finish()
    }
}

impl Bank {
    /// Wraps a mapped PIO block with the given port layout.
    ///
    /// # Panics
    ///
    /// Panics if `regs` doesn't cover every port in `ports`.
    pub fn new(regs: RegisterOverlay, ports: &'static [(u8, u32)]) -> Bank {
        let words = ports
            .iter()
            .map(|&(port, _)| (usize::from(port) + 1) * PORT_WORDS)
            .max()
            .unwrap_or(0);

        assert!(regs.len() >= words, "register window too small for PIO ports");

        Bank {
            locks: WordLocks::new(regs.len()),
            regs,
            ports,
            alt_names: &[],
        }
    }

    /// The A64's ports and alternate-function names.
    pub fn a64(regs: RegisterOverlay) -> Bank {
        Bank {
            alt_names: ALT_NAMES_A64,
            ..Bank::new(regs, PORTS_A64)
        }
    }

    pub fn h3(regs: RegisterOverlay) -> Bank {
        Bank::new(regs, PORTS_H3)
    }

    // Base word of the port that contains `line`
    fn port_base(&self, line: u32) -> usize {
        (line / 32) as usize * PORT_WORDS
    }

    fn has_line(&self, line: u32) -> bool {
        let port = (line / 32) as u8;
        self.ports
            .iter()
            .any(|&(p, count)| p == port && line % 32 < count)
    }

    fn lock(&self, word: usize) -> WordGuard<'_> {
        self.locks.lock(word)
    }
}

impl soc::Bank for Bank {
    fn lines(&self) -> Vec<u32> {
        self.ports
            .iter()
            .flat_map(|&(port, count)| (0..count).map(move |n| u32::from(port) * 32 + n))
            .collect()
    }

    fn line_name(&self, line: u32) -> String {
        format!("P{}{}", (b'A' + (line / 32) as u8) as char, line % 32)
    }

    fn function(&self, line: u32) -> Function {
        let word = self.port_base(line) + CFG0 + (line % 32 / 8) as usize;
        let shift = (line % 8) * 4;

        code_function((self.regs.read(word) >> shift) & 0b111)
    }

    fn set_function(&self, line: u32, function: Function) -> gpio::Result<()> {
        let code = match function_code(function) {
            Some(code) if self.has_line(line) => code,
            _ => return Err(Error::UnsupportedFunction(self.line_name(line), function)),
        };

        let word = self.port_base(line) + CFG0 + (line % 32 / 8) as usize;
        let shift = (line % 8) * 4;

        let _guard = self.lock(word);

        // Go through Disabled, so no other function is briefly selected on the way
        let value = self.regs.read(word) | (FN_DISABLED << shift);
        self.regs.write(word, value);
        self.regs.write(word, value & !((!code & 0b111) << shift));

        log::trace!("{} function set to {}", self.line_name(line), function);

        Ok(())
    }

    fn pull(&self, line: u32) -> Option<Pull> {
        let word = self.port_base(line) + PULL0 + (line % 32 / 16) as usize;
        let shift = (line % 16) * 2;

        match (self.regs.read(word) >> shift) & 0b11 {
            PULL_UP => Some(Pull::Up),
            PULL_DOWN => Some(Pull::Down),
            _ => Some(Pull::Float),
        }
    }

    fn set_pull(&self, line: u32, pull: Pull) {
        let bits = match pull {
            Pull::Float => PULL_FLOAT,
            Pull::Up => PULL_UP,
            Pull::Down => PULL_DOWN,
            Pull::Keep => return,
        };

        let word = self.port_base(line) + PULL0 + (line % 32 / 16) as usize;
        let shift = (line % 16) * 2;

        let _guard = self.lock(word);

        let value = self.regs.read(word) & !(0b11 << shift);
        self.regs.write(word, value);
        self.regs.write(word, value | (bits << shift));
    }

    fn level(&self, line: u32) -> Level {
        let word = self.port_base(line) + DAT;

        Level::from((self.regs.read(word) >> (line % 32)) & 1 != 0)
    }

    fn set_level(&self, line: u32, level: Level) {
        let word = self.port_base(line) + DAT;
        let mask = 1 << (line % 32);

        let _guard = self.lock(word);

        self.regs.modify(word, |value| match level {
            Level::High => value | mask,
            Level::Low => value & !mask,
        });
    }

    fn alt_name(&self, line: u32, alt: u8) -> Option<&'static str> {
        self.alt_names
            .iter()
            .find(|&&(l, a, _)| l == line && a == alt)
            .map(|&(_, _, name)| name)
    }
}

/// CPU driver for the Allwinner A64 and H3.
#[derive(Debug)]
pub struct Driver {
    sysfs: Arc<sysfs::Gpio>,
}

impl Driver {
    pub fn new() -> Driver {
        Driver::with_sysfs(sysfs::Gpio::new())
    }

    /// Uses `sysfs` for edge detection.
    pub fn with_sysfs(sysfs: sysfs::Gpio) -> Driver {
        Driver {
            sysfs: Arc::new(sysfs),
        }
    }
}

impl Default for Driver {
    fn default() -> Driver {
        Driver::new()
    }
}

impl driver::Driver for Driver {
    fn name(&self) -> &str {
        "allwinner-gpio"
    }

    fn init(&self, host: &Host) -> Result<(), InitError> {
        let soc = DeviceInfo::new()
            .map_err(|_| InitError::skip("unknown SoC"))?
            .soc();

        if !soc.is_allwinner() {
            return Err(InitError::skip(format!("{} is not an Allwinner SoC", soc)));
        }

        let regs = RegisterOverlay::map(PIO_BASE, PIO_LEN)?;

        let bank: Arc<dyn soc::Bank> = match soc {
            Soc::AllwinnerA64 => Arc::new(Bank::a64(regs)),
            _ => Arc::new(Bank::h3(regs)),
        };

        soc::register_bank(host.pins(), bank, &self.sysfs)?;

        Ok(())
    }
}
