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

//! I2C buses exposed through the kernel's `i2cdev` interface.
//!
//! The `sysfs-i2c` [`Driver`] registers every `/dev/i2c-N` device node as a
//! bus named `I2C<N>`, with bus number `N`. Opening the bus through the
//! host's bus registry returns an [`I2c`] handle.
//!
//! Transactions use the `I2C_RDWR` ioctl, so a write followed by a read is
//! sent as a single transfer, with a repeated START in between.
//!
//! ## Troubleshooting
//!
//! ### Permission denied
//!
//! If opening a bus returns an `io::ErrorKind::PermissionDenied` error, make
//! sure the file permissions for `/dev/i2c-N` are correct, and the current
//! user is a member of the `i2c` group.
//!
//! [`Driver`]: struct.Driver.html
//! [`I2c`]: struct.I2c.html

use std::fs::{self, File, OpenOptions};
use std::io;
use std::os::unix::io::AsRawFd;
use std::path::{Path, PathBuf};

use libc::c_ulong;

use crate::bus::{Bus, BusRef};
use crate::driver::{self, InitError};
use crate::host::Host;

mod ioctl;

pub use self::ioctl::Capabilities;

const PATH_DEV: &str = "/dev";

/// An open `i2cdev` bus.
#[derive(Debug)]
pub struct I2c {
    name: String,
    bus: u32,
    i2cdev: File,
    capabilities: Capabilities,
}

impl I2c {
    /// Opens `/dev/i2c-<bus>`.
    pub fn with_bus(bus: u32) -> io::Result<I2c> {
        I2c::with_path(bus, Path::new(PATH_DEV).join(format!("i2c-{}", bus)))
    }

    fn with_path(bus: u32, path: PathBuf) -> io::Result<I2c> {
        let i2cdev = OpenOptions::new().read(true).write(true).open(path)?;

        let capabilities = unsafe { ioctl::funcs(i2cdev.as_raw_fd())? };

        // Disable retries
        unsafe {
            ioctl::set_retries(i2cdev.as_raw_fd(), 0)?;
        }

        Ok(I2c {
            name: format!("I2C{}", bus),
            bus,
            i2cdev,
            capabilities,
        })
    }

    /// Returns the transfer types supported by the underlying driver.
    pub fn capabilities(&self) -> Capabilities {
        self.capabilities
    }

    pub fn bus(&self) -> u32 {
        self.bus
    }

    /// Sets the transaction timeout, in milliseconds.
    ///
    /// The kernel rounds the timeout to multiples of 10 ms.
    pub fn set_timeout(&self, timeout: u32) -> io::Result<()> {
        // Contrary to the i2cdev documentation, this seems to
        // be used as a timeout for (part of) the I2C transaction.
        unsafe {
            ioctl::set_timeout(self.i2cdev.as_raw_fd(), (timeout.saturating_add(9) / 10) as c_ulong)?;
        }

        Ok(())
    }
}

impl Bus for I2c {
    fn name(&self) -> &str {
        &self.name
    }

    fn tx(&mut self, addr: u16, write: &[u8], read: &mut [u8]) -> io::Result<()> {
        if !self.capabilities.i2c() {
            return Err(io::Error::from(io::ErrorKind::Unsupported));
        }

        unsafe { ioctl::i2c_write_read(self.i2cdev.as_raw_fd(), addr, addr > 0x7f, write, read) }
    }
}

// Bus numbers of the i2c-N device nodes in `dev`, in ascending order
fn scan(dev: &Path) -> io::Result<Vec<u32>> {
    let mut buses: Vec<u32> = fs::read_dir(dev)?
        .filter_map(|entry| entry.ok())
        .filter_map(|entry| {
            entry
                .file_name()
                .to_str()
                .and_then(|name| name.strip_prefix("i2c-"))
                .and_then(|number| number.parse().ok())
        })
        .collect();

    buses.sort_unstable();

    Ok(buses)
}

/// Bus driver that registers every `i2cdev` device node.
#[derive(Debug)]
pub struct Driver {
    dev: PathBuf,
}

impl Driver {
    pub fn new() -> Driver {
        Driver::with_dev(PATH_DEV)
    }

    /// Looks for `i2c-N` device nodes in `dev`, instead of `/dev`.
    pub fn with_dev<P: Into<PathBuf>>(dev: P) -> Driver {
        Driver { dev: dev.into() }
    }
}

impl Default for Driver {
    fn default() -> Driver {
        Driver::new()
    }
}

impl driver::Driver for Driver {
    fn name(&self) -> &str {
        "sysfs-i2c"
    }

    fn init(&self, host: &Host) -> Result<(), InitError> {
        let buses = scan(&self.dev)?;

        if buses.is_empty() {
            return Err(InitError::skip("no I2C buses found"));
        }

        for number in buses {
            let path = self.dev.join(format!("i2c-{}", number));

            host.buses().register(BusRef::new(
                format!("I2C{}", number),
                Some(number),
                move || Ok(Box::new(I2c::with_path(number, path.clone())?) as Box<dyn Bus>),
            ))?;
        }

        Ok(())
    }
}
