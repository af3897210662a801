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

// gpio_wait_edge.rs
//
// Configures a pin as an input with its pull-up resistor enabled, and prints
// a message every time the pin goes from high to low, until a SIGINT (Ctrl-C)
// or SIGTERM signal is caught.
//
// The pin can be passed by name, alias or number (GPIO23, P1_16, 23).

use std::env;
use std::error::Error;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use simple_signal::{self, Signal};

use sbcio::gpio::{Edge, Pull};
use sbcio::Host;

const DEFAULT_PIN: &str = "GPIO23";

fn main() -> Result<(), Box<dyn Error>> {
    let name = env::args().nth(1).unwrap_or_else(|| DEFAULT_PIN.to_string());

    let host = Host::with_defaults();
    host.init()?;

    let pin = host
        .pins()
        .by_name(&name)
        .ok_or_else(|| format!("Unknown pin {}", name))?;

    pin.configure_input(Pull::Up, Edge::Falling)?;

    let running = Arc::new(AtomicBool::new(true));

    // When a SIGINT (Ctrl-C) or SIGTERM signal is caught, atomically set running to false.
    simple_signal::set_handler(&[Signal::Int, Signal::Term], {
        let running = running.clone();
        move |_| {
            running.store(false, Ordering::SeqCst);
        }
    });

    // Wake up regularly to check whether we should stop.
    while running.load(Ordering::SeqCst) {
        if pin.wait_for_edge(Some(Duration::from_millis(500)))? {
            println!("{} went low ({})", pin.name(), pin.function());
        }
    }

    // Disable edge detection before exiting.
    pin.configure_input(Pull::Keep, Edge::None)?;

    Ok(())
}
