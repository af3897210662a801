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

//! Pins backed by memory-mapped CPU registers.

use std::fmt;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use super::sysfs;
use super::{Edge, Error, Function, Level, Pin, Pull, Result};
use crate::soc::Bank;

/// A GPIO line configured and driven through its CPU's register bank.
///
/// Configuration, reads and writes access the mapped registers directly.
/// Edge detection is delegated to a [`sysfs::Pin`], which is only created the
/// first time an edge is requested.
///
/// [`sysfs::Pin`]: ../sysfs/struct.Pin.html
pub struct MemPin {
    name: String,
    line: u32,
    bank: Arc<dyn Bank>,
    sysfs: Arc<sysfs::Gpio>,
    edge: Mutex<Option<Arc<sysfs::Pin>>>,
}

impl fmt::Debug for MemPin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemPin")
            .field("name", &self.name)
            .field("line", &self.line)
            .field("edge", &format_args!("{{ .. }}"))
            .finish()
    }
}

impl MemPin {
    /// Creates the pin for `line` in `bank`.
    pub fn new(bank: Arc<dyn Bank>, line: u32, sysfs: Arc<sysfs::Gpio>) -> MemPin {
        MemPin {
            name: bank.line_name(line),
            line,
            bank,
            sysfs,
            edge: Mutex::new(None),
        }
    }

    /// Returns the pin's current pull resistor state, if the hardware
    /// allows it to be read back.
    pub fn pull(&self) -> Option<Pull> {
        self.bank.pull(self.line)
    }

    fn disarm(&self) -> Result<()> {
        if let Some(watch) = self.edge.lock().unwrap().as_ref() {
            watch.disarm()?;
        }

        Ok(())
    }

    fn arm(&self, edge: Edge) -> Result<()> {
        let mut watch = self.edge.lock().unwrap();

        match watch.as_ref() {
            Some(watch) if edge == Edge::None => watch.disarm()?,
            Some(watch) => watch.rearm(edge)?,
            None if edge == Edge::None => (),
            None => {
                let pin = self.sysfs.arm(self.line, edge).map_err(|e| {
                    log::debug!("Edge detection unavailable for {}: {}", self.name, e);

                    Error::EdgeUnsupported(self.name.clone())
                })?;

                *watch = Some(Arc::new(pin));
            }
        }

        Ok(())
    }
}

impl Pin for MemPin {
    fn name(&self) -> &str {
        &self.name
    }

    fn number(&self) -> Option<u32> {
        Some(self.line)
    }

    fn function(&self) -> String {
        match self.bank.function(self.line) {
            Function::Input => format!("In/{}", self.bank.level(self.line)),
            Function::Output => format!("Out/{}", self.bank.level(self.line)),
            Function::Alt(n) => match self.bank.alt_name(self.line, n) {
                Some(name) => name.to_string(),
                None => Function::Alt(n).to_string(),
            },
            function => function.to_string(),
        }
    }

    fn default_pull(&self) -> Pull {
        self.bank.default_pull(self.line)
    }

    fn configure_input(&self, pull: Pull, edge: Edge) -> Result<()> {
        self.bank.set_function(self.line, Function::Input)?;
        self.bank.set_pull(self.line, pull);

        self.arm(edge)
    }

    fn configure_output(&self, level: Level) -> Result<()> {
        self.disarm()?;

        // Latch the level first, so the line never drives a stale value
        self.bank.set_level(self.line, level);
        self.bank.set_function(self.line, Function::Output)
    }

    fn read(&self) -> Result<Level> {
        match self.bank.function(self.line) {
            Function::Input | Function::Output => Ok(self.bank.level(self.line)),
            function => Err(Error::InvalidState(self.name.clone(), function)),
        }
    }

    fn write(&self, level: Level) -> Result<()> {
        if self.bank.function(self.line) != Function::Output {
            return Err(Error::NotOutput(self.name.clone()));
        }

        self.bank.set_level(self.line, level);

        Ok(())
    }

    fn wait_for_edge(&self, timeout: Option<Duration>) -> Result<bool> {
        // Don't hold the lock while blocking, so the pin can still be
        // reconfigured (and disarmed) from another thread.
        let watch = match self.edge.lock().unwrap().as_ref() {
            Some(watch) if watch.is_armed() => watch.clone(),
            _ => return Err(Error::NotArmed(self.name.clone())),
        };

        // A disarm racing this wait makes it return false
        Ok(watch.wait(timeout)?)
    }
}
