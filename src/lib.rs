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

//! sbcio provides access to the GPIO pins and I2C buses of single-board
//! computers, without board-specific code at the call site.
//!
//! Hardware support comes from drivers. An application registers drivers with
//! a [`Host`], or starts from [`Host::with_defaults`], and calls
//! [`Host::init`] once. Drivers are initialized in dependency order, with
//! independent drivers running concurrently. A driver that fails or doesn't
//! apply to the current board is recorded in the returned [`State`], and only
//! affects drivers that depend on it.
//!
//! Initialized drivers populate the host's pin, bus and header registries.
//! GPIO pins are driven directly through the CPU's memory-mapped registers,
//! while edge detection goes through the kernel's sysfs GPIO interface.
//!
//! The built-in drivers support the Raspberry Pi (BCM2835, BCM2836, BCM2837
//! and BCM2711) and Allwinner A64 and H3 based boards, and every bus exposed
//! through `/dev/i2c-N`. sbcio requires a recent Linux distribution. Both
//! `gnu` and `musl` libc targets are supported.
//!
//! [`Host`]: host/struct.Host.html
//! [`Host::with_defaults`]: host/struct.Host.html#method.with_defaults
//! [`Host::init`]: host/struct.Host.html#method.init
//! [`State`]: driver/struct.State.html

// Used by rustdoc to link other crates to sbcio's docs
#![doc(html_root_url = "https://docs.rs/sbcio/0.1.0")]

#[macro_use]
mod macros;

pub mod board;
pub mod bus;
pub mod driver;
pub mod gpio;
pub mod header;
pub mod host;
#[cfg(feature = "i2c")]
pub mod i2c;
pub mod mem;
pub mod soc;
pub mod system;

pub use crate::driver::{Driver, InitError, Outcome, State};
pub use crate::host::Host;
