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

//! Broadcom BCM283x GPIO controller, as used on Raspberry Pi boards.

use std::fmt;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use crate::driver::{self, InitError};
use crate::gpio::{self, sysfs, Error, Function, Level, Pull};
use crate::host::Host;
use crate::mem::{self, RegisterOverlay};
use crate::soc::{self, WordLocks};
use crate::system::{DeviceInfo, Soc};

const PATH_DEV_GPIOMEM: &str = "/dev/gpiomem";

const GPIO_OFFSET: u64 = 0x20_0000;
/// Size of the register block, up to and including the BCM2711 pull registers.
pub(crate) const GPIO_MEM_SIZE: usize = 0xf4;

const GPFSEL0: usize = 0x00;
const GPSET0: usize = 0x1c / 4;
const GPCLR0: usize = 0x28 / 4;
const GPLEV0: usize = 0x34 / 4;
const GPPUD: usize = 0x94 / 4;
const GPPUDCLK0: usize = 0x98 / 4;
// BCM2711 only
const GPPUPPDN0: usize = 0xe4 / 4;

const LINES: u32 = 54;
const LINES_BCM2711: u32 = 58;

// Function select codes, indexed by alternate function
const FSEL_ALT: [u32; 6] = [0b100, 0b101, 0b110, 0b111, 0b011, 0b010];

// (line, alternate function, signal)
const ALT_NAMES: &[(u32, u8, &str)] = &[
    (0, 0, "I2C0_SDA"),
    (1, 0, "I2C0_SCL"),
    (2, 0, "I2C1_SDA"),
    (3, 0, "I2C1_SCL"),
    (4, 0, "GPCLK0"),
    (4, 5, "JTAG_TDI"),
    (5, 0, "GPCLK1"),
    (5, 5, "JTAG_TDO"),
    (6, 0, "GPCLK2"),
    (6, 5, "JTAG_RTCK"),
    (7, 0, "SPI0_CE1"),
    (8, 0, "SPI0_CE0"),
    (9, 0, "SPI0_MISO"),
    (10, 0, "SPI0_MOSI"),
    (11, 0, "SPI0_CLK"),
    (12, 0, "PWM0"),
    (12, 5, "JTAG_TMS"),
    (13, 0, "PWM1"),
    (13, 5, "JTAG_TCK"),
    (14, 0, "UART0_TX"),
    (14, 5, "UART1_TX"),
    (15, 0, "UART0_RX"),
    (15, 5, "UART1_RX"),
    (16, 3, "UART0_CTS"),
    (16, 4, "SPI1_CE2"),
    (16, 5, "UART1_CTS"),
    (17, 3, "UART0_RTS"),
    (17, 4, "SPI1_CE1"),
    (17, 5, "UART1_RTS"),
    (18, 0, "PCM_CLK"),
    (18, 4, "SPI1_CE0"),
    (18, 5, "PWM0"),
    (19, 0, "PCM_FS"),
    (19, 4, "SPI1_MISO"),
    (19, 5, "PWM1"),
    (20, 0, "PCM_DIN"),
    (20, 4, "SPI1_MOSI"),
    (20, 5, "GPCLK0"),
    (21, 0, "PCM_DOUT"),
    (21, 4, "SPI1_CLK"),
    (21, 5, "GPCLK1"),
    (22, 0, "SD0_CLK"),
    (22, 3, "SD1_CLK"),
    (22, 4, "JTAG_TRST"),
    (23, 0, "SD0_CMD"),
    (23, 3, "SD1_CMD"),
    (23, 4, "JTAG_RTCK"),
    (24, 0, "SD0_DAT0"),
    (24, 3, "SD1_DAT0"),
    (24, 4, "JTAG_TDO"),
    (25, 0, "SD0_DAT1"),
    (25, 3, "SD1_DAT1"),
    (25, 4, "JTAG_TCK"),
    (26, 0, "SD0_DAT2"),
    (26, 3, "SD1_DAT2"),
    (26, 4, "JTAG_TDI"),
    (27, 0, "SD0_DAT3"),
    (27, 3, "SD1_DAT3"),
    (27, 4, "JTAG_TMS"),
];

/// Returns the physical base address of the peripherals on `soc`.
pub fn peripheral_base(soc: Soc) -> Option<u64> {
    match soc {
        Soc::Bcm2835 => Some(0x2000_0000),
        Soc::Bcm2836 | Soc::Bcm2837 => Some(0x3f00_0000),
        Soc::Bcm2711 => Some(0xfe00_0000),
        _ => None,
    }
}

/// The GPIO controller of a BCM283x SoC.
pub struct Bank {
    regs: RegisterOverlay,
    locks: WordLocks,
    bcm2711: bool,
}

impl fmt::Debug for Bank {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("bcm283x::Bank")
            .field("regs", &self.regs)
            .field("bcm2711", &self.bcm2711)
            .finish()
    }
}

impl Bank {
    /// Wraps a mapped GPIO register block.
    ///
    /// The BCM2711 has more lines, and a different pull resistor interface.
    ///
    /// # Panics
    ///
    /// Panics if `regs` doesn't cover the whole register block.
    pub fn new(regs: RegisterOverlay, bcm2711: bool) -> Bank {
        assert!(
            regs.len() * 4 >= GPIO_MEM_SIZE,
            "register window too small for GPIO block"
        );

        Bank {
            locks: WordLocks::new(regs.len()),
            regs,
            bcm2711,
        }
    }

    /// Maps the GPIO registers of `soc`.
    ///
    /// `/dev/gpiomem` is tried first, since it doesn't require superuser
    /// privileges. If that fails, the registers are mapped through `/dev/mem`.
    pub fn open(soc: Soc) -> mem::Result<RegisterOverlay> {
        let gpiomem_err = match RegisterOverlay::map_device(PATH_DEV_GPIOMEM, GPIO_MEM_SIZE) {
            Ok(regs) => return Ok(regs),
            Err(e) => e,
        };

        let base = peripheral_base(soc).ok_or(mem::Error::UnsupportedPlatform)?;

        match RegisterOverlay::map(base + GPIO_OFFSET, GPIO_MEM_SIZE) {
            Ok(regs) => Ok(regs),
            // Report the more helpful /dev/gpiomem error if both were denied
            Err(mem::Error::PermissionDenied(path)) => match gpiomem_err {
                mem::Error::PermissionDenied(_) => Err(gpiomem_err),
                _ => Err(mem::Error::PermissionDenied(path)),
            },
            Err(e) => Err(e),
        }
    }

    fn line_count(&self) -> u32 {
        if self.bcm2711 {
            LINES_BCM2711
        } else {
            LINES
        }
    }

    // Pre-BCM2711 pull sequence. Both GPPUD and the clock word stay locked
    // for the whole sequence, always in that order.
    fn set_pull_legacy(&self, line: u32, bits: u32) {
        let offset = GPPUDCLK0 + (line / 32) as usize;
        let shift = line % 32;

        let _pud = self.locks.lock(GPPUD);
        let _clk = self.locks.lock(offset);

        let reg_value = self.regs.read(GPPUD);
        self.regs.write(GPPUD, (reg_value & !0b11) | (bits & 0b11));

        // The datasheet asks for 150 cycles between each step
        thread::sleep(Duration::from_micros(5));
        self.regs.write(offset, 1 << shift);
        thread::sleep(Duration::from_micros(5));

        self.regs.write(GPPUD, reg_value & !0b11);
        self.regs.write(offset, 0);
    }
}

impl soc::Bank for Bank {
    fn lines(&self) -> Vec<u32> {
        (0..self.line_count()).collect()
    }

    fn line_name(&self, line: u32) -> String {
        format!("GPIO{}", line)
    }

    fn default_pull(&self, line: u32) -> Pull {
        match line {
            0..=8 | 34..=36 | 46..=53 => Pull::Up,
            28 | 29 | 44 | 45 => Pull::Float,
            _ => Pull::Down,
        }
    }

    fn function(&self, line: u32) -> Function {
        let offset = GPFSEL0 + (line / 10) as usize;
        let shift = (line % 10) * 3;

        match (self.regs.read(offset) >> shift) & 0b111 {
            0b000 => Function::Input,
            0b001 => Function::Output,
            code => Function::Alt(FSEL_ALT.iter().position(|&c| c == code).unwrap_or(0) as u8),
        }
    }

    fn set_function(&self, line: u32, function: Function) -> gpio::Result<()> {
        let code = match function {
            Function::Input => 0b000,
            Function::Output => 0b001,
            Function::Alt(n) if (n as usize) < FSEL_ALT.len() => FSEL_ALT[n as usize],
            _ => return Err(Error::UnsupportedFunction(self.line_name(line), function)),
        };

        if line >= self.line_count() {
            return Err(Error::UnsupportedFunction(self.line_name(line), function));
        }

        let offset = GPFSEL0 + (line / 10) as usize;
        let shift = (line % 10) * 3;

        let _guard = self.locks.lock(offset);

        self.regs.modify(offset, |value| (value & !(0b111 << shift)) | (code << shift));

        log::trace!("GPIO{} function set to {}", line, function);

        Ok(())
    }

    fn pull(&self, line: u32) -> Option<Pull> {
        if !self.bcm2711 {
            // Write-only on older SoCs
            return None;
        }

        let offset = GPPUPPDN0 + (line / 16) as usize;
        let shift = (line % 16) * 2;

        match (self.regs.read(offset) >> shift) & 0b11 {
            0b01 => Some(Pull::Up),
            0b10 => Some(Pull::Down),
            _ => Some(Pull::Float),
        }
    }

    fn set_pull(&self, line: u32, pull: Pull) {
        if self.bcm2711 {
            let bits = match pull {
                Pull::Float => 0b00,
                Pull::Up => 0b01,
                Pull::Down => 0b10,
                Pull::Keep => return,
            };

            let offset = GPPUPPDN0 + (line / 16) as usize;
            let shift = (line % 16) * 2;

            let _guard = self.locks.lock(offset);

            self.regs
                .modify(offset, |value| (value & !(0b11 << shift)) | (bits << shift));
        } else {
            let bits = match pull {
                Pull::Float => 0b00,
                Pull::Down => 0b01,
                Pull::Up => 0b10,
                Pull::Keep => return,
            };

            self.set_pull_legacy(line, bits);
        }
    }

    fn level(&self, line: u32) -> Level {
        let offset = GPLEV0 + (line / 32) as usize;

        Level::from((self.regs.read(offset) >> (line % 32)) & 1 != 0)
    }

    // GPSET/GPCLR only act on the bits that are set, so no lock is needed
    fn set_level(&self, line: u32, level: Level) {
        let offset = match level {
            Level::High => GPSET0,
            Level::Low => GPCLR0,
        } + (line / 32) as usize;

        self.regs.write(offset, 1 << (line % 32));
    }

    fn alt_name(&self, line: u32, alt: u8) -> Option<&'static str> {
        ALT_NAMES
            .iter()
            .find(|&&(l, a, _)| l == line && a == alt)
            .map(|&(_, _, name)| name)
    }
}

/// CPU driver for the BCM2835, BCM2836, BCM2837 and BCM2711.
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
        "bcm283x-gpio"
    }

    fn init(&self, host: &Host) -> Result<(), InitError> {
        let soc = DeviceInfo::new()
            .map_err(|_| InitError::skip("unknown SoC"))?
            .soc();

        if !soc.is_bcm283x() {
            return Err(InitError::skip(format!("{} is not a BCM283x SoC", soc)));
        }

        let regs = Bank::open(soc)?;
        let bank = Arc::new(Bank::new(regs, soc == Soc::Bcm2711));

        soc::register_bank(host.pins(), bank, &self.sysfs)?;

        Ok(())
    }
}
