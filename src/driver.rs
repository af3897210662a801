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

//! Driver lifecycle orchestration.
//!
//! A [`Driver`] is a named unit of hardware initialization that may depend on
//! other drivers. Drivers are registered with a [`Host`], and initialized
//! exactly once by [`Host::init`]:
//!
//! 1. Every prerequisite name must match a registered driver, and the
//!    dependency graph must be acyclic. Otherwise, no driver is initialized,
//!    and `init` returns an [`Error`].
//! 2. Drivers are partitioned into stages, so that every driver's
//!    prerequisites are in strictly earlier stages.
//! 3. Stages run in order. Within a stage, every driver is initialized
//!    concurrently on its own thread, and the whole stage finishes before the
//!    next one starts.
//! 4. A driver whose prerequisites didn't all load is skipped without being
//!    initialized.
//!
//! A driver that fails or panics never aborts initialization. It's recorded
//! in the resulting [`State`], together with every driver that was skipped
//! because of it.
//!
//! [`Driver`]: trait.Driver.html
//! [`Host`]: ../host/struct.Host.html
//! [`Host::init`]: ../host/struct.Host.html#method.init
//! [`Error`]: enum.Error.html
//! [`State`]: struct.State.html

use std::any::Any;
use std::collections::HashSet;
use std::error;
use std::fmt;
use std::io;
use std::panic::{self, AssertUnwindSafe};
use std::result;
use std::sync::mpsc;
use std::sync::Arc;
use std::thread;

use crate::host::Host;
use crate::{bus, gpio, header, mem};

mod stage;

/// Configuration errors that prevent any driver from being initialized.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// A driver with the same name is already registered.
    DuplicateName(String),
    /// Drivers can't be registered once initialization has started.
    LateRegistration(String),
    /// A driver lists a prerequisite that isn't registered.
    UnsatisfiedDependency { driver: String, missing: String },
    /// The listed drivers depend on each other.
    CyclicDependency(Vec<String>),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Error::DuplicateName(ref name) => write!(f, "Driver {} is already registered", name),
            Error::LateRegistration(ref name) => write!(
                f,
                "Driver {} can't be registered after initialization has started",
                name
            ),
            Error::UnsatisfiedDependency {
                ref driver,
                ref missing,
            } => write!(f, "Driver {} depends on unregistered driver {}", driver, missing),
            Error::CyclicDependency(ref names) => {
                write!(f, "Cyclic dependency between drivers {}", names.join(", "))
            }
        }
    }
}

impl error::Error for Error {}

/// Result type returned from methods that can have `sbcio::driver::Error`s.
pub type Result<T> = result::Result<T, Error>;

/// Reasons a driver didn't load.
#[derive(Debug)]
pub enum InitError {
    /// The driver doesn't apply to this host.
    Skip(String),
    /// The driver applies to this host, but couldn't be initialized.
    Fail(Box<dyn error::Error + Send + Sync>),
}

impl InitError {
    pub fn skip(reason: impl Into<String>) -> InitError {
        InitError::Skip(reason.into())
    }

    pub fn fail<E>(err: E) -> InitError
    where
        E: Into<Box<dyn error::Error + Send + Sync>>,
    {
        InitError::Fail(err.into())
    }
}

impl fmt::Display for InitError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            InitError::Skip(ref reason) => write!(f, "Skipped: {}", reason),
            InitError::Fail(ref err) => write!(f, "Failed: {}", err),
        }
    }
}

impl From<io::Error> for InitError {
    fn from(err: io::Error) -> InitError {
        InitError::fail(err)
    }
}

impl From<mem::Error> for InitError {
    fn from(err: mem::Error) -> InitError {
        InitError::fail(err)
    }
}

impl From<gpio::Error> for InitError {
    fn from(err: gpio::Error) -> InitError {
        InitError::fail(err)
    }
}

impl From<bus::Error> for InitError {
    fn from(err: bus::Error) -> InitError {
        InitError::fail(err)
    }
}

impl From<header::Error> for InitError {
    fn from(err: header::Error) -> InitError {
        InitError::fail(err)
    }
}

/// A named, dependency-aware unit of hardware initialization.
///
/// `init` receives the host the driver is registered with, and typically
/// registers pins, buses or headers with it. Drivers within the same stage
/// run concurrently, so `init` shouldn't rely on state shared with other
/// drivers beyond what the host's registries provide.
///
/// `init` must not call [`Host::init`] on its own host, which would wait for
/// itself to finish.
///
/// [`Host::init`]: ../host/struct.Host.html#method.init
pub trait Driver: Send + Sync {
    /// Returns the driver's name, which must be unique within a host.
    fn name(&self) -> &str;

    /// Returns the names of the drivers that must load before this one.
    fn prerequisites(&self) -> &[&str] {
        &[]
    }

    fn init(&self, host: &Host) -> result::Result<(), InitError>;
}

/// The outcome of a single driver.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Loaded,
    Skipped(String),
    Failed(String),
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Outcome::Loaded => write!(f, "loaded"),
            Outcome::Skipped(ref reason) => write!(f, "skipped: {}", reason),
            Outcome::Failed(ref reason) => write!(f, "failed: {}", reason),
        }
    }
}

/// A driver that was skipped or failed, and why.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DriverFailure {
    pub name: String,
    pub reason: String,
}

impl fmt::Display for DriverFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.name, self.reason)
    }
}

/// The result of initializing every driver registered with a host.
///
/// Each list is sorted by driver name.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct State {
    loaded: Vec<String>,
    skipped: Vec<DriverFailure>,
    failed: Vec<DriverFailure>,
    stages: Vec<Vec<String>>,
}

impl State {
    /// Returns the names of the drivers that loaded.
    pub fn loaded(&self) -> &[String] {
        &self.loaded
    }

    /// Returns the drivers that didn't apply to this host, or whose
    /// prerequisites didn't load.
    pub fn skipped(&self) -> &[DriverFailure] {
        &self.skipped
    }

    /// Returns the drivers that failed to initialize.
    pub fn failed(&self) -> &[DriverFailure] {
        &self.failed
    }

    /// Returns the driver names in each stage, in execution order.
    pub fn stages(&self) -> &[Vec<String>] {
        &self.stages
    }

    /// Returns the outcome of the driver called `name`.
    pub fn outcome(&self, name: &str) -> Option<Outcome> {
        if self.loaded.iter().any(|n| n == name) {
            return Some(Outcome::Loaded);
        }

        if let Some(f) = self.skipped.iter().find(|f| f.name == name) {
            return Some(Outcome::Skipped(f.reason.clone()));
        }

        self.failed
            .iter()
            .find(|f| f.name == name)
            .map(|f| Outcome::Failed(f.reason.clone()))
    }

    fn record(&mut self, name: String, outcome: Outcome) {
        match outcome {
            Outcome::Loaded => {
                log::debug!("Driver {} loaded", name);
                self.loaded.push(name);
            }
            Outcome::Skipped(reason) => {
                log::debug!("Driver {} skipped: {}", name, reason);
                self.skipped.push(DriverFailure { name, reason });
            }
            Outcome::Failed(reason) => {
                log::warn!("Driver {} failed: {}", name, reason);
                self.failed.push(DriverFailure { name, reason });
            }
        }
    }
}

/// Returns the names of `drivers`, partitioned into stages.
///
/// Every driver's prerequisites are in strictly earlier stages, and each
/// stage is sorted by name.
pub fn stages(drivers: &[Arc<dyn Driver>]) -> Result<Vec<Vec<String>>> {
    Ok(stage::explode(drivers)?
        .iter()
        .map(|stage| stage.iter().map(|d| d.name().to_string()).collect())
        .collect())
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message
    } else {
        "unknown cause"
    }
}

fn init_driver(driver: &dyn Driver, host: &Host) -> Outcome {
    match panic::catch_unwind(AssertUnwindSafe(|| driver.init(host))) {
        Ok(Ok(())) => Outcome::Loaded,
        Ok(Err(InitError::Skip(reason))) => Outcome::Skipped(reason),
        Ok(Err(InitError::Fail(err))) => Outcome::Failed(err.to_string()),
        Err(payload) => Outcome::Failed(format!("panicked: {}", panic_message(&*payload))),
    }
}

/// Initializes `drivers` in dependency order.
pub(crate) fn run(host: &Host, drivers: &[Arc<dyn Driver>]) -> Result<State> {
    let stages = stage::explode(drivers)?;

    let mut state = State::default();
    let mut loaded: HashSet<String> = HashSet::new();

    for (index, stage) in stages.iter().enumerate() {
        let names: Vec<String> = stage.iter().map(|d| d.name().to_string()).collect();
        log::debug!("Starting stage {}: {}", index, names.join(", "));
        state.stages.push(names);

        let (tx, rx) = mpsc::channel::<(String, Outcome)>();

        thread::scope(|s| {
            for driver in stage {
                let name = driver.name().to_string();

                let missing = driver
                    .prerequisites()
                    .iter()
                    .find(|p| !loaded.contains(**p));

                if let Some(missing) = missing {
                    let reason = format!("dependency not loaded: {}", missing);
                    let _ = tx.send((name, Outcome::Skipped(reason)));
                    continue;
                }

                let tx = tx.clone();
                s.spawn(move || {
                    let outcome = init_driver(&**driver, host);
                    let _ = tx.send((name, outcome));
                });
            }
        });

        // Every worker has finished, so only our own sender is left
        drop(tx);

        for (name, outcome) in rx {
            if outcome == Outcome::Loaded {
                loaded.insert(name.clone());
            }

            state.record(name, outcome);
        }
    }

    state.loaded.sort();
    state.skipped.sort_by(|a, b| a.name.cmp(&b.name));
    state.failed.sort_by(|a, b| a.name.cmp(&b.name));

    log::info!(
        "Initialized drivers: {} loaded, {} skipped, {} failed",
        state.loaded.len(),
        state.skipped.len(),
        state.failed.len()
    );

    Ok(state)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn panic_messages() {
        let payload: Box<dyn Any + Send> = Box::new("static message");
        assert_eq!(panic_message(&*payload), "static message");

        let payload: Box<dyn Any + Send> = Box::new(String::from("formatted 42"));
        assert_eq!(panic_message(&*payload), "formatted 42");

        let payload: Box<dyn Any + Send> = Box::new(42);
        assert_eq!(panic_message(&*payload), "unknown cause");
    }

    #[test]
    fn init_errors_convert() {
        let err: InitError = io::Error::from(io::ErrorKind::NotFound).into();
        assert!(matches!(err, InitError::Fail(_)));

        let err: InitError = mem::Error::PermissionDenied(String::from("/dev/mem")).into();
        assert!(err.to_string().contains("elevated privileges"));

        assert_eq!(InitError::skip("not here").to_string(), "Skipped: not here");
    }

    #[test]
    fn outcome_lookup() {
        let mut state = State::default();
        state.record(String::from("a"), Outcome::Loaded);
        state.record(String::from("b"), Outcome::Skipped(String::from("why")));
        state.record(String::from("c"), Outcome::Failed(String::from("oops")));

        assert_eq!(state.outcome("a"), Some(Outcome::Loaded));
        assert_eq!(state.outcome("b"), Some(Outcome::Skipped(String::from("why"))));
        assert_eq!(state.outcome("c"), Some(Outcome::Failed(String::from("oops"))));
        assert_eq!(state.outcome("d"), None);
    }
}
