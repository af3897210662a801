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

//! General purpose I/O pins.
//!
//! Every GPIO line known to a [`Host`] is represented by a trait object
//! implementing [`Pin`]. CPU drivers register one pin per line in the host's
//! pin [`Registry`] during initialization, and board drivers add aliases for
//! the connector positions they know about. Downstream code then looks pins up
//! by name, alias or number, without needing to know which CPU family or board
//! it's running on.
//!
//! ## Memory-mapped pins
//!
//! The built-in CPU drivers create [`MemPin`]s, which configure, read and
//! write a line directly through the CPU's mapped GPIO registers. That makes
//! every operation except [`Pin::wait_for_edge`] a plain memory access without
//! any syscall overhead.
//!
//! ## Edge detection
//!
//! Level transitions can't be observed by polling the data registers, so edge
//! detection is delegated to the kernel. When a pin is configured as an input
//! with an [`Edge`] other than [`Edge::None`], the line is exported through
//! the sysfs GPIO interface and its `value` file is registered with an
//! edge-triggered epoll instance. [`Pin::wait_for_edge`] then blocks until a
//! transition is reported, or the timeout elapses.
//!
//! Edge detection requires a kernel with the legacy sysfs GPIO interface
//! (`CONFIG_GPIO_SYSFS`).
//!
//! ## embedded-hal
//!
//! With the `hal` feature enabled, [`MemPin`] implements the `embedded-hal`
//! 1.0 `digital` traits. Pins returned by the [`Registry`] can be wrapped in a
//! `HalPin` to pass them to `embedded-hal` drivers.
//!
//! ## Troubleshooting
//!
//! ### Permission denied
//!
//! Mapping the GPIO registers requires access to `/dev/gpiomem` (Raspberry Pi
//! OS gives this to members of the `gpio` group), or to `/dev/mem`, which is
//! normally restricted to the superuser. The CPU drivers report this as a
//! failed driver in the [`State`] returned by [`Host::init`].
//!
//! [`Host`]: ../host/struct.Host.html
//! [`Host::init`]: ../host/struct.Host.html#method.init
//! [`State`]: ../driver/struct.State.html
//! [`Pin`]: trait.Pin.html
//! [`Pin::wait_for_edge`]: trait.Pin.html#tymethod.wait_for_edge
//! [`Registry`]: struct.Registry.html
//! [`MemPin`]: mmio/struct.MemPin.html
//! [`Edge`]: enum.Edge.html
//! [`Edge::None`]: enum.Edge.html#variant.None

use std::error;
use std::fmt;
use std::io;
use std::ops::Not;
use std::result;
use std::sync::Arc;
use std::time::Duration;

mod epoll;
#[cfg(feature = "hal")]
mod hal;
pub mod mmio;
mod registry;
pub mod sysfs;

#[cfg(feature = "hal")]
pub use self::hal::HalPin;
pub use self::mmio::MemPin;
pub use self::registry::Registry;

/// Errors that can occur when accessing GPIO pins.
#[derive(Debug)]
pub enum Error {
    /// The pin's current function doesn't allow the requested operation.
    ///
    /// Levels can only be read while a pin is configured as an input or an
    /// output.
    InvalidState(String, Function),
    /// The pin isn't configured as an output.
    NotOutput(String),
    /// Edge detection isn't enabled for the pin.
    ///
    /// Call [`Pin::configure_input`] with an edge other than [`Edge::None`]
    /// before waiting for an edge.
    ///
    /// [`Pin::configure_input`]: trait.Pin.html#tymethod.configure_input
    /// [`Edge::None`]: enum.Edge.html#variant.None
    NotArmed(String),
    /// Edge detection isn't available for the pin.
    ///
    /// The kernel's sysfs GPIO interface couldn't export the line.
    EdgeUnsupported(String),
    /// The kernel didn't export the GPIO line with the specified number.
    NotExported(u32),
    /// The pin doesn't support the requested function.
    UnsupportedFunction(String, Function),
    /// A pin with the same name is already registered.
    DuplicatePin(String),
    /// A pin with the same number is already registered.
    DuplicateNumber(u32),
    /// The alias name is already in use by a real pin, or the real pin's
    /// name is already in use by an alias.
    AliasConflict(String),
    /// I/O error.
    Io(io::Error),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Error::InvalidState(ref name, function) => {
                write!(f, "Pin {} can't be read while its function is {}", name, function)
            }
            Error::NotOutput(ref name) => write!(f, "Pin {} is not configured as an output", name),
            Error::NotArmed(ref name) => {
                write!(f, "Pin {} is not configured for edge detection", name)
            }
            Error::EdgeUnsupported(ref name) => {
                write!(f, "Edge detection is not supported for pin {}", name)
            }
            Error::NotExported(number) => write!(f, "GPIO line {} is not exported", number),
            Error::UnsupportedFunction(ref name, function) => {
                write!(f, "Pin {} doesn't support function {}", name, function)
            }
            Error::DuplicatePin(ref name) => write!(f, "Pin {} is already registered", name),
            Error::DuplicateNumber(number) => {
                write!(f, "Pin number {} is already registered", number)
            }
            Error::AliasConflict(ref name) => {
                write!(f, "Name {} conflicts with an existing pin or alias", name)
            }
            Error::Io(ref err) => write!(f, "I/O error: {}", err),
        }
    }
}

impl error::Error for Error {}

impl From<io::Error> for Error {
    fn from(err: io::Error) -> Error {
        Error::Io(err)
    }
}

/// Result type returned from methods that can have `sbcio::gpio::Error`s.
pub type Result<T> = result::Result<T, Error>;

/// Pin logic levels.
#[derive(Debug, PartialEq, Eq, Copy, Clone)]
#[repr(u8)]
pub enum Level {
    Low = 0,
    High = 1,
}

impl From<bool> for Level {
    fn from(e: bool) -> Level {
        if e {
            Level::High
        } else {
            Level::Low
        }
    }
}

impl From<u8> for Level {
    fn from(value: u8) -> Self {
        if value == 0 {
            Level::Low
        } else {
            Level::High
        }
    }
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Level::Low => write!(f, "Low"),
            Level::High => write!(f, "High"),
        }
    }
}

impl Not for Level {
    type Output = Level;

    fn not(self) -> Level {
        match self {
            Level::Low => Level::High,
            Level::High => Level::Low,
        }
    }
}

/// Built-in pull-up/pull-down resistor states.
#[derive(Debug, PartialEq, Eq, Copy, Clone)]
pub enum Pull {
    /// No resistor.
    Float,
    Down,
    Up,
    /// Leave the resistor as it is.
    Keep,
}

impl fmt::Display for Pull {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Pull::Float => write!(f, "Float"),
            Pull::Down => write!(f, "Down"),
            Pull::Up => write!(f, "Up"),
            Pull::Keep => write!(f, "Keep"),
        }
    }
}

/// Edge detection conditions.
#[derive(Debug, PartialEq, Eq, Copy, Clone)]
pub enum Edge {
    None,
    Rising,
    Falling,
    Both,
}

impl Edge {
    // Value for the sysfs edge file
    pub(crate) fn as_sysfs(self) -> &'static str {
        match self {
            Edge::None => "none",
            Edge::Rising => "rising",
            Edge::Falling => "falling",
            Edge::Both => "both",
        }
    }
}

impl fmt::Display for Edge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Edge::None => write!(f, "None"),
            Edge::Rising => write!(f, "Rising"),
            Edge::Falling => write!(f, "Falling"),
            Edge::Both => write!(f, "Both"),
        }
    }
}

/// Pin functions.
///
/// Alternate functions are numbered the way the CPU's datasheet numbers them,
/// so `Alt(0)` is valid on BCM283x but not on Allwinner SoCs, which start at
/// `Alt(1)`.
#[derive(Debug, PartialEq, Eq, Copy, Clone)]
pub enum Function {
    Disabled,
    Input,
    Output,
    Alt(u8),
}

impl fmt::Display for Function {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Function::Disabled => write!(f, "Disabled"),
            Function::Input => write!(f, "In"),
            Function::Output => write!(f, "Out"),
            Function::Alt(n) => write!(f, "Alt{}", n),
        }
    }
}

/// A single GPIO line.
///
/// All methods take `&self`. Configuring the same pin from multiple threads
/// at the same time is allowed, but the resulting configuration is whichever
/// call finished last.
pub trait Pin: fmt::Debug + Send + Sync {
    /// Returns the pin's name, like `GPIO4` or `PB8`.
    fn name(&self) -> &str;

    /// Returns the pin's number in the CPU's global GPIO numbering, if it has one.
    fn number(&self) -> Option<u32>;

    /// Returns a human-readable summary of the pin's current function.
    ///
    /// Inputs and outputs include the current level (`In/High`, `Out/Low`).
    /// Alternate functions are described by the peripheral signal they're
    /// multiplexed to (`I2C1_SDA`) if known, and as `Alt<n>` otherwise.
    fn function(&self) -> String;

    /// Returns the pin's pull resistor state after a reset.
    fn default_pull(&self) -> Pull;

    /// Configures the pin as an input.
    ///
    /// `edge` selects which level transitions [`wait_for_edge`] reports.
    /// [`Edge::None`] disables edge detection.
    ///
    /// [`wait_for_edge`]: #tymethod.wait_for_edge
    /// [`Edge::None`]: enum.Edge.html#variant.None
    fn configure_input(&self, pull: Pull, edge: Edge) -> Result<()>;

    /// Configures the pin as an output, driving `level`.
    ///
    /// Any active edge detection is disabled first.
    fn configure_output(&self, level: Level) -> Result<()>;

    /// Reads the pin's current logic level.
    fn read(&self) -> Result<Level>;

    /// Sets the pin's output level.
    fn write(&self, level: Level) -> Result<()>;

    /// Blocks until an edge is detected, or the timeout elapses.
    ///
    /// Returns `Ok(true)` when an edge was detected, and `Ok(false)` on a
    /// timeout, or when edge detection was disabled by another thread while
    /// waiting. A `timeout` of `None` waits indefinitely.
    ///
    /// Fails with `Error::NotArmed` if edge detection isn't currently
    /// enabled for the pin.
    fn wait_for_edge(&self, timeout: Option<Duration>) -> Result<bool>;

    /// Returns the pin this pin is an alias of.
    fn real(&self) -> Option<Arc<dyn Pin>> {
        None
    }
}

/// A pin registered under an alternative name.
///
/// All operations are forwarded to the real pin.
#[derive(Debug, Clone)]
pub struct Alias {
    name: String,
    real: Arc<dyn Pin>,
}

impl Alias {
    pub fn new(name: impl Into<String>, real: Arc<dyn Pin>) -> Alias {
        Alias {
            name: name.into(),
            real,
        }
    }
}

impl Pin for Alias {
    fn name(&self) -> &str {
        &self.name
    }

    fn number(&self) -> Option<u32> {
        self.real.number()
    }

    fn function(&self) -> String {
        self.real.function()
    }

    fn default_pull(&self) -> Pull {
        self.real.default_pull()
    }

    fn configure_input(&self, pull: Pull, edge: Edge) -> Result<()> {
        self.real.configure_input(pull, edge)
    }

    fn configure_output(&self, level: Level) -> Result<()> {
        self.real.configure_output(level)
    }

    fn read(&self) -> Result<Level> {
        self.real.read()
    }

    fn write(&self, level: Level) -> Result<()> {
        self.real.write(level)
    }

    fn wait_for_edge(&self, timeout: Option<Duration>) -> Result<bool> {
        self.real.wait_for_edge(timeout)
    }

    fn real(&self) -> Option<Arc<dyn Pin>> {
        Some(self.real.clone())
    }
}
