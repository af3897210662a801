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

//! embedded-hal 1.0 `digital` traits.
//!
//! [`MemPin`] implements the traits directly. Pins looked up through a
//! [`Registry`] are shared as `Arc<dyn Pin>`, which [`HalPin`] wraps so they
//! can be handed to embedded-hal drivers.
//!
//! [`MemPin`]: ../struct.MemPin.html
//! [`Registry`]: ../struct.Registry.html
//! [`HalPin`]: struct.HalPin.html

use std::sync::Arc;

use embedded_hal::digital::{
    self, ErrorKind, ErrorType, InputPin as InputPinHal, OutputPin as OutputPinHal,
    StatefulOutputPin as StatefulOutputPinHal,
};

use super::{Error, Level, MemPin, Pin};

/// `Error` trait implementation for `embedded-hal` v1.0.0.
impl digital::Error for Error {
    fn kind(&self) -> ErrorKind {
        ErrorKind::Other
    }
}

/// A shared pin usable with embedded-hal drivers.
///
/// The pin has to be configured through [`Pin::configure_input`] or
/// [`Pin::configure_output`] first. Reading or writing a pin in any other
/// state returns the same errors as [`Pin::read`] and [`Pin::write`].
#[derive(Debug, Clone)]
pub struct HalPin(Arc<dyn Pin>);

impl HalPin {
    pub fn new(pin: Arc<dyn Pin>) -> HalPin {
        HalPin(pin)
    }

    /// Returns the wrapped pin.
    pub fn into_inner(self) -> Arc<dyn Pin> {
        self.0
    }
}

impl From<Arc<dyn Pin>> for HalPin {
    fn from(pin: Arc<dyn Pin>) -> HalPin {
        HalPin(pin)
    }
}

macro_rules! impl_digital {
    ($ty:ty, |$pin:ident| $inner:expr) => {
        impl ErrorType for $ty {
            type Error = Error;
        }

        impl InputPinHal for $ty {
            fn is_high(&mut self) -> Result<bool, Self::Error> {
                let $pin = &*self;
                Ok($inner.read()? == Level::High)
            }

            fn is_low(&mut self) -> Result<bool, Self::Error> {
                let $pin = &*self;
                Ok($inner.read()? == Level::Low)
            }
        }

        impl OutputPinHal for $ty {
            fn set_low(&mut self) -> Result<(), Self::Error> {
                let $pin = &*self;
                $inner.write(Level::Low)
            }

            fn set_high(&mut self) -> Result<(), Self::Error> {
                let $pin = &*self;
                $inner.write(Level::High)
            }
        }

        // The data register reads back the latched level on an output
        impl StatefulOutputPinHal for $ty {
            fn is_set_high(&mut self) -> Result<bool, Self::Error> {
                let $pin = &*self;
                Ok($inner.read()? == Level::High)
            }

            fn is_set_low(&mut self) -> Result<bool, Self::Error> {
                let $pin = &*self;
                Ok($inner.read()? == Level::Low)
            }
        }
    };
}

impl_digital!(MemPin, |pin| pin);
impl_digital!(HalPin, |pin| pin.0);
