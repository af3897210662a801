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

//! Physical pin headers.
//!
//! Board drivers describe the connectors on their board as a grid of pin
//! names, row by row. Positions that aren't GPIO lines use the [`GROUND`],
//! [`V3_3`] and [`V5`] names.
//!
//! [`GROUND`]: constant.GROUND.html
//! [`V3_3`]: constant.V3_3.html
//! [`V5`]: constant.V5.html

use std::collections::BTreeMap;
use std::error;
use std::fmt;
use std::result;
use std::sync::RwLock;

use crate::gpio::Pin;

pub const GROUND: &str = "GROUND";
pub const V3_3: &str = "3.3V";
pub const V5: &str = "5V";

/// Errors that can occur when registering headers.
#[derive(Debug)]
pub enum Error {
    /// A header with the same name is already registered.
    DuplicateName(String),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Error::DuplicateName(ref name) => write!(f, "Header {} is already registered", name),
        }
    }
}

impl error::Error for Error {}

/// Result type returned from methods that can have `sbcio::header::Error`s.
pub type Result<T> = result::Result<T, Error>;

/// A physical connector.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Header {
    name: String,
    rows: Vec<Vec<String>>,
}

impl Header {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the pin names, row by row.
    pub fn rows(&self) -> &[Vec<String>] {
        &self.rows
    }

    /// Returns the name at the 1-based `position`, counting left to right,
    /// then top to bottom.
    pub fn position(&self, position: usize) -> Option<&str> {
        self.rows
            .iter()
            .flatten()
            .nth(position.checked_sub(1)?)
            .map(String::as_str)
    }

    fn contains(&self, name: &str) -> bool {
        self.rows.iter().flatten().any(|n| n == name)
    }
}

/// Index of every header known to a host.
#[derive(Debug, Default)]
pub struct Registry {
    headers: RwLock<BTreeMap<String, Header>>,
}

impl Registry {
    pub fn new() -> Registry {
        Registry::default()
    }

    pub fn register(&self, name: &str, rows: Vec<Vec<String>>) -> Result<()> {
        let mut headers = self.headers.write().unwrap();

        if headers.contains_key(name) {
            return Err(Error::DuplicateName(name.to_string()));
        }

        headers.insert(
            name.to_string(),
            Header {
                name: name.to_string(),
                rows,
            },
        );

        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<Header> {
        self.headers.read().unwrap().get(name).cloned()
    }

    /// Returns every header, sorted by name.
    pub fn all(&self) -> Vec<Header> {
        self.headers.read().unwrap().values().cloned().collect()
    }

    /// Returns `true` if `pin`, or the real pin behind it, is on any header.
    pub fn is_connected(&self, pin: &dyn Pin) -> bool {
        let headers = self.headers.read().unwrap();
        let real = pin.real();

        headers.values().any(|header| {
            header.contains(pin.name()) || real.as_ref().map_or(false, |r| header.contains(r.name()))
        })
    }
}
