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

//! The application-owned registry of drivers and the hardware they expose.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, OnceLock};

use crate::driver::{self, Driver, State};
use crate::{bus, gpio, header};

/// A set of drivers, and the pins, buses and headers they register.
///
/// Register drivers with [`register`], then call [`init`] once to bring them
/// up. Each `Host` is independent, so tests can build as many as they need.
///
/// [`register`]: #method.register
/// [`init`]: #method.init
pub struct Host {
    drivers: Mutex<Vec<Arc<dyn Driver>>>,
    // Only changes while `drivers` is locked
    started: AtomicBool,
    state: OnceLock<driver::Result<State>>,
    pins: gpio::Registry,
    buses: bus::Registry,
    headers: header::Registry,
}

impl fmt::Debug for Host {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let drivers: Vec<String> = self
            .drivers
            .lock()
            .unwrap()
            .iter()
            .map(|d| d.name().to_string())
            .collect();

        f.debug_struct("Host")
            .field("drivers", &drivers)
            .field("state", &self.state.get())
            .field("pins", &self.pins)
            .field("buses", &self.buses)
            .field("headers", &self.headers)
            .finish()
    }
}

impl Default for Host {
    fn default() -> Host {
        Host::new()
    }
}

impl Host {
    /// Constructs a `Host` without any drivers.
    pub fn new() -> Host {
        Host {
            drivers: Mutex::new(Vec::new()),
            started: AtomicBool::new(false),
            state: OnceLock::new(),
            pins: gpio::Registry::new(),
            buses: bus::Registry::new(),
            headers: header::Registry::new(),
        }
    }

    /// Constructs a `Host` with every built-in driver enabled through cargo
    /// features.
    pub fn with_defaults() -> Host {
        let host = Host::new();

        // Names are unique and nothing has started yet, so these can't fail
        #[cfg(feature = "bcm283x")]
        let _ = host.register(crate::soc::bcm283x::Driver::new());
        #[cfg(feature = "allwinner")]
        let _ = host.register(crate::soc::allwinner::Driver::new());
        #[cfg(feature = "rpi")]
        let _ = host.register(crate::board::rpi::Driver::new());
        #[cfg(feature = "i2c")]
        let _ = host.register(crate::i2c::Driver::new());

        host
    }

    /// Registers a driver.
    ///
    /// Fails if a driver with the same name is already registered, or if
    /// [`init`] was already called.
    ///
    /// [`init`]: #method.init
    pub fn register<D: Driver + 'static>(&self, driver: D) -> driver::Result<()> {
        let mut drivers = self.drivers.lock().unwrap();

        if self.started.load(Ordering::SeqCst) {
            return Err(driver::Error::LateRegistration(driver.name().to_string()));
        }

        if drivers.iter().any(|d| d.name() == driver.name()) {
            return Err(driver::Error::DuplicateName(driver.name().to_string()));
        }

        drivers.push(Arc::new(driver));

        Ok(())
    }

    /// Initializes every registered driver, and returns the outcome.
    ///
    /// Only the first call initializes drivers. Later calls return the same
    /// result, including configuration errors.
    pub fn init(&self) -> driver::Result<&State> {
        self.state
            .get_or_init(|| {
                let drivers = {
                    let drivers = self.drivers.lock().unwrap();
                    self.started.store(true, Ordering::SeqCst);
                    drivers.clone()
                };

                driver::run(self, &drivers)
            })
            .as_ref()
            .map_err(Clone::clone)
    }

    /// Returns the state of a completed [`init`], if any.
    ///
    /// [`init`]: #method.init
    pub fn state(&self) -> Option<&State> {
        self.state.get().and_then(|result| result.as_ref().ok())
    }

    pub fn pins(&self) -> &gpio::Registry {
        &self.pins
    }

    pub fn buses(&self) -> &bus::Registry {
        &self.buses
    }

    pub fn headers(&self) -> &header::Registry {
        &self.headers
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_registered_by_name() {
        let host = Host::with_defaults();
        let drivers = host.drivers.lock().unwrap();

        #[cfg(feature = "bcm283x")]
        assert!(drivers.iter().any(|d| d.name() == "bcm283x-gpio"));
        #[cfg(feature = "rpi")]
        assert!(drivers.iter().any(|d| d.name() == "rpi"));
        #[cfg(feature = "i2c")]
        assert!(drivers.iter().any(|d| d.name() == "sysfs-i2c"));
    }

    #[test]
    fn empty_host_initializes() {
        let host = Host::new();

        assert!(host.state().is_none());

        let state = host.init().unwrap();
        assert!(state.loaded().is_empty());
        assert!(state.stages().is_empty());
        assert!(host.state().is_some());
    }
}
