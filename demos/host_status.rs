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

// host_status.rs
//
// Initializes all built-in drivers, lists which drivers were loaded, skipped
// or failed, and displays the function of each pin on every registered header
// in an ASCII table.

use std::process::exit;

use sbcio::header::Header;
use sbcio::Host;

fn print_pin(host: &Host, position: usize, name: &str) {
    let function = match host.pins().by_name(name) {
        Some(pin) => pin.function(),
        None => String::new(),
    };

    if position % 2 != 0 {
        print!("| {:>8} | {:<10} | {:>2} |", name, function, position);
    } else {
        println!(" {:>2} | {:<10} | {:>8} |", position, function, name);
    }
}

fn print_header(host: &Host, header: &Header) {
    println!("{}", header.name());
    println!("+----------+------------+----+----+------------+----------+");
    println!("|   Name   | Function   |   Pin   | Function   |   Name   |");
    println!("+----------+------------+----+----+------------+----------+");

    for (idx, name) in header.rows().iter().flatten().enumerate() {
        print_pin(host, idx + 1, name);
    }

    println!("+----------+------------+----+----+------------+----------+");
}

fn main() {
    let host = Host::with_defaults();

    let state = host.init().unwrap_or_else(|e| {
        eprintln!("Error: Can't initialize drivers ({})", e);
        exit(1);
    });

    for (idx, stage) in state.stages().iter().enumerate() {
        println!("Stage {}: {}", idx + 1, stage.join(", "));
    }

    println!("Loaded: {}", state.loaded().join(", "));

    for failure in state.skipped() {
        println!("Skipped {}: {}", failure.name, failure.reason);
    }

    for failure in state.failed() {
        println!("Failed {}: {}", failure.name, failure.reason);
    }

    let headers = host.headers().all();
    if headers.is_empty() {
        eprintln!("Error: No header information available");
        exit(1);
    }

    for header in &headers {
        println!();
        print_header(&host, header);
    }
}
