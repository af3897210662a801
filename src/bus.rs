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

//! Bus registry.
//!
//! Bus drivers register a [`BusRef`] for every bus they find. A `BusRef`
//! describes the bus, and knows how to open it. Consumers open buses by name,
//! alias or number through the host's [`Registry`], and receive a [`Bus`]
//! handle they own exclusively.
//!
//! [`BusRef`]: struct.BusRef.html
//! [`Registry`]: struct.Registry.html
//! [`Bus`]: trait.Bus.html

use std::error;
use std::fmt;
use std::io;
use std::result;
use std::sync::{Arc, RwLock};

/// Errors that can occur when registering or opening buses.
#[derive(Debug)]
pub enum Error {
    /// A bus with the same name or alias is already registered.
    DuplicateName(String),
    /// A bus with the same number is already registered.
    DuplicateNumber(u32),
    /// No bus matches the name, alias or number.
    NotFound(String),
    /// I/O error.
    Io(io::Error),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Error::DuplicateName(ref name) => write!(f, "Bus {} is already registered", name),
            Error::DuplicateNumber(number) => {
                write!(f, "Bus number {} is already registered", number)
            }
            Error::NotFound(ref name) if name.is_empty() => write!(f, "No bus is registered"),
            Error::NotFound(ref name) => write!(f, "Bus {} not found", name),
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

/// Result type returned from methods that can have `sbcio::bus::Error`s.
pub type Result<T> = result::Result<T, Error>;

/// An open bus.
pub trait Bus: fmt::Debug + Send {
    fn name(&self) -> &str;

    /// Writes `write` to the device at `addr`, then reads `read.len()` bytes
    /// from it, as a single transaction. Either buffer may be empty.
    fn tx(&mut self, addr: u16, write: &[u8], read: &mut [u8]) -> io::Result<()>;
}

/// Opens a new handle to a bus.
pub type Opener = Arc<dyn Fn() -> io::Result<Box<dyn Bus>> + Send + Sync>;

/// A registered bus.
#[derive(Clone)]
pub struct BusRef {
    name: String,
    aliases: Vec<String>,
    number: Option<u32>,
    opener: Opener,
}

impl fmt::Debug for BusRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BusRef")
            .field("name", &self.name)
            .field("aliases", &self.aliases)
            .field("number", &self.number)
            .finish()
    }
}

impl BusRef {
    pub fn new<F>(name: impl Into<String>, number: Option<u32>, opener: F) -> BusRef
    where
        F: Fn() -> io::Result<Box<dyn Bus>> + Send + Sync + 'static,
    {
        BusRef {
            name: name.into(),
            aliases: Vec::new(),
            number,
            opener: Arc::new(opener),
        }
    }

    /// Adds an alternative name for the bus.
    pub fn alias(mut self, alias: impl Into<String>) -> BusRef {
        self.aliases.push(alias.into());
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn aliases(&self) -> &[String] {
        &self.aliases
    }

    pub fn number(&self) -> Option<u32> {
        self.number
    }

    pub fn open(&self) -> Result<Box<dyn Bus>> {
        Ok((self.opener)()?)
    }

    fn matches(&self, name: &str) -> bool {
        self.name == name || self.aliases.iter().any(|alias| alias == name)
    }
}

/// Index of every bus known to a host.
#[derive(Debug, Default)]
pub struct Registry {
    buses: RwLock<Vec<BusRef>>,
}

impl Registry {
    pub fn new() -> Registry {
        Registry::default()
    }

    /// Registers a bus.
    ///
    /// Fails if the bus's name or any of its aliases is already in use, or if
    /// another bus has the same number.
    pub fn register(&self, bus: BusRef) -> Result<()> {
        let mut buses = self.buses.write().unwrap();

        for name in std::iter::once(&bus.name).chain(bus.aliases.iter()) {
            if buses.iter().any(|b| b.matches(name)) {
                return Err(Error::DuplicateName(name.clone()));
            }
        }

        if let Some(number) = bus.number {
            if buses.iter().any(|b| b.number == Some(number)) {
                return Err(Error::DuplicateNumber(number));
            }
        }

        buses.push(bus);

        Ok(())
    }

    /// Finds a bus.
    ///
    /// An empty `name` selects the lowest-numbered bus. A decimal number
    /// selects the bus with that number. Anything else is matched against
    /// names and aliases.
    pub fn find(&self, name: &str) -> Result<BusRef> {
        let buses = self.buses.read().unwrap();

        let found = if name.is_empty() {
            buses
                .iter()
                .filter(|b| b.number.is_some())
                .min_by_key(|b| b.number)
                .or_else(|| buses.first())
        } else if let Ok(number) = name.parse::<u32>() {
            buses.iter().find(|b| b.number == Some(number))
        } else {
            buses.iter().find(|b| b.matches(name))
        };

        found
            .cloned()
            .ok_or_else(|| Error::NotFound(name.to_string()))
    }

    /// Finds a bus and opens it. See [`find`] for how `name` is matched.
    ///
    /// [`find`]: #method.find
    pub fn open(&self, name: &str) -> Result<Box<dyn Bus>> {
        self.find(name)?.open()
    }

    /// Returns every bus, sorted by number, then by name. Buses without a
    /// number come last.
    pub fn all(&self) -> Vec<BusRef> {
        let mut all = self.buses.read().unwrap().clone();

        all.sort_by(|a, b| {
            (a.number.unwrap_or(u32::MAX), &a.name).cmp(&(b.number.unwrap_or(u32::MAX), &b.name))
        });

        all
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug)]
    struct Loopback {
        name: String,
        last: Vec<u8>,
    }

    impl Bus for Loopback {
        fn name(&self) -> &str {
            &self.name
        }

        fn tx(&mut self, _addr: u16, write: &[u8], read: &mut [u8]) -> io::Result<()> {
            if !write.is_empty() {
                self.last = write.to_vec();
            }

            for (dst, src) in read.iter_mut().zip(self.last.iter()) {
                *dst = *src;
            }

            Ok(())
        }
    }

    fn loopback(name: &'static str, number: Option<u32>) -> BusRef {
        BusRef::new(name, number, move || {
            Ok(Box::new(Loopback {
                name: name.to_string(),
                last: Vec::new(),
            }) as Box<dyn Bus>)
        })
    }

    #[test]
    fn open_by_default_number_and_alias() {
        let buses = Registry::new();
        buses.register(loopback("I2C3", Some(3))).unwrap();
        buses.register(loopback("I2C1", Some(1)).alias("IMU")).unwrap();
        buses.register(loopback("SOFT", None)).unwrap();

        assert_eq!(buses.open("").unwrap().name(), "I2C1");
        assert_eq!(buses.open("3").unwrap().name(), "I2C3");
        assert_eq!(buses.open("IMU").unwrap().name(), "I2C1");
        assert_eq!(buses.open("SOFT").unwrap().name(), "SOFT");
        assert!(matches!(buses.open("2"), Err(Error::NotFound(_))));

        let names: Vec<_> = buses.all().iter().map(|b| b.name().to_string()).collect();
        assert_eq!(names, ["I2C1", "I2C3", "SOFT"]);
    }

    #[test]
    fn duplicates_are_rejected() {
        let buses = Registry::new();
        buses.register(loopback("I2C1", Some(1)).alias("IMU")).unwrap();

        assert!(matches!(buses.register(loopback("IMU", None)), Err(Error::DuplicateName(_))));
        assert!(matches!(buses.register(loopback("I2C9", Some(1))), Err(Error::DuplicateNumber(1))));
    }

    #[test]
    fn transactions_reach_the_bus() {
        let buses = Registry::new();
        buses.register(loopback("I2C1", Some(1))).unwrap();

        let mut bus = buses.open("").unwrap();
        let mut read = [0u8; 2];
        bus.tx(0x48, &[0xaa, 0x55], &mut read).unwrap();

        assert_eq!(read, [0xaa, 0x55]);
        assert!(matches!(Registry::new().open(""), Err(Error::NotFound(_))));
    }
}
