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

#![cfg(feature = "allwinner")]

use std::env;
use std::ffi::CString;
use std::fs;
use std::os::unix::ffi::OsStrExt;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use sbcio::gpio::sysfs;
use sbcio::gpio::{Edge, Error, Function, Level, Pin, Pull};
use sbcio::mem::RegisterOverlay;
use sbcio::soc::{self, allwinner};
use sbcio::Host;

// Size of the Allwinner PIO block, in 32-bit words
const PIO_WORDS: usize = 0x400 / 4;

static COUNTER: AtomicUsize = AtomicUsize::new(0);

// A sysfs GPIO tree with the given lines already exported. Each line's value
// file is a FIFO, which never reports an edge.
fn sysfs_tree(lines: &[u32]) -> PathBuf {
    let root = env::temp_dir().join(format!(
        "sbcio-gpio-mmio-{}-{}",
        std::process::id(),
        COUNTER.fetch_add(1, Ordering::SeqCst)
    ));

    for line in lines {
        let dir = root.join(format!("gpio{}", line));
        fs::create_dir_all(&dir).unwrap();

        let value = CString::new(dir.join("value").as_os_str().as_bytes()).unwrap();
        assert_eq!(unsafe { libc::mkfifo(value.as_ptr(), 0o600) }, 0);
    }

    fs::create_dir_all(&root).unwrap();

    root
}

fn h3_host(root: &PathBuf) -> Host {
    let host = Host::new();
    let bank = allwinner::Bank::h3(RegisterOverlay::anonymous(PIO_WORDS).unwrap());

    let count = soc::register_bank(
        host.pins(),
        Arc::new(bank),
        &Arc::new(sysfs::Gpio::with_root(root)),
    )
    .unwrap();
    assert_eq!(count, 22 + 19 + 18 + 16 + 7 + 14);

    host
}

#[test]
fn pins_are_named_by_port() {
    let root = sysfs_tree(&[]);
    let host = h3_host(&root);

    let pin = host.pins().by_name("PA6").unwrap();
    assert_eq!(pin.number(), Some(6));

    let pin = host.pins().by_number(64 + 3).unwrap();
    assert_eq!(pin.name(), "PC3");

    assert!(host.pins().by_name("PB0").is_none());
    assert_eq!(host.pins().by_name("67").unwrap().name(), "PC3");

    fs::remove_dir_all(root).unwrap();
}

#[test]
fn output_round_trip() {
    let root = sysfs_tree(&[]);
    let host = h3_host(&root);
    let pin = host.pins().by_name("PA10").unwrap();

    pin.configure_output(Level::Low).unwrap();
    assert_eq!(pin.function(), "Out/Low");

    for i in 0..100 {
        let level = Level::from(i % 2 == 0);

        pin.write(level).unwrap();
        assert_eq!(pin.read().unwrap(), level);
    }

    fs::remove_dir_all(root).unwrap();
}

#[test]
fn output_latches_level_before_switching() {
    let root = sysfs_tree(&[]);
    let host = h3_host(&root);
    let pin = host.pins().by_name("PA11").unwrap();

    pin.configure_output(Level::High).unwrap();

    assert_eq!(pin.read().unwrap(), Level::High);
    assert_eq!(pin.function(), "Out/High");

    fs::remove_dir_all(root).unwrap();
}

#[test]
fn write_requires_output() {
    let root = sysfs_tree(&[]);
    let host = h3_host(&root);
    let pin = host.pins().by_name("PA12").unwrap();

    pin.configure_input(Pull::Down, Edge::None).unwrap();

    match pin.write(Level::High) {
        Err(Error::NotOutput(name)) => assert_eq!(name, "PA12"),
        other => panic!("unexpected result: {:?}", other),
    }

    assert!(pin.function().starts_with("In/"));

    fs::remove_dir_all(root).unwrap();
}

#[test]
fn edge_wait_times_out_and_disarms() {
    let root = sysfs_tree(&[6]);
    let host = h3_host(&root);
    let pin = host.pins().by_name("PA6").unwrap();

    pin.configure_input(Pull::Up, Edge::Rising).unwrap();
    assert_eq!(fs::read_to_string(root.join("gpio6/edge")).unwrap(), "rising");
    assert_eq!(fs::read_to_string(root.join("gpio6/direction")).unwrap(), "in");

    let start = Instant::now();
    assert!(!pin.wait_for_edge(Some(Duration::from_millis(50))).unwrap());
    let elapsed = start.elapsed();

    assert!(elapsed >= Duration::from_millis(45));
    assert!(elapsed < Duration::from_secs(1));

    // Switching to output disarms the watch
    pin.configure_output(Level::Low).unwrap();
    assert_eq!(fs::read_to_string(root.join("gpio6/edge")).unwrap(), "none");

    let start = Instant::now();
    assert!(matches!(pin.wait_for_edge(None), Err(Error::NotArmed(_))));
    assert!(start.elapsed() < Duration::from_millis(100));

    // Re-arming reuses the exported line
    pin.configure_input(Pull::Up, Edge::Falling).unwrap();
    assert_eq!(fs::read_to_string(root.join("gpio6/edge")).unwrap(), "falling");
    assert!(!pin.wait_for_edge(Some(Duration::from_millis(10))).unwrap());

    // Dropping edge detection on an input disarms it as well
    pin.configure_input(Pull::Keep, Edge::None).unwrap();
    assert_eq!(fs::read_to_string(root.join("gpio6/edge")).unwrap(), "none");
    assert!(matches!(pin.wait_for_edge(None), Err(Error::NotArmed(_))));

    drop(pin);
    drop(host);
    fs::remove_dir_all(root).unwrap();
}

#[test]
fn edge_wait_without_edge_detection() {
    let root = sysfs_tree(&[]);
    let host = h3_host(&root);
    let pin = host.pins().by_name("PA7").unwrap();

    pin.configure_input(Pull::Float, Edge::None).unwrap();

    assert!(matches!(
        pin.wait_for_edge(Some(Duration::from_millis(10))),
        Err(Error::NotArmed(_))
    ));

    // The line isn't exported in this tree
    assert!(matches!(
        pin.configure_input(Pull::Float, Edge::Both),
        Err(Error::EdgeUnsupported(_))
    ));

    fs::remove_dir_all(root).unwrap();
}

#[test]
fn adjacent_pins_reconfigure_concurrently() {
    let root = sysfs_tree(&[]);
    let host = h3_host(&root);

    // PA0..PA7 share a configuration register, and all of port A shares
    // a data register
    let pins: Vec<Arc<dyn Pin>> = (0..8)
        .map(|n| host.pins().by_name(&format!("PA{}", n)).unwrap())
        .collect();

    thread::scope(|s| {
        for (idx, pin) in pins.iter().enumerate() {
            s.spawn(move || {
                for i in 0..500 {
                    let level = Level::from((i + idx) % 2 == 0);

                    pin.configure_output(level).unwrap();
                    assert_eq!(pin.read().unwrap(), level);

                    pin.configure_input(Pull::Keep, Edge::None).unwrap();
                    assert!(pin.function().starts_with("In/"));
                }

                pin.configure_output(Level::from(idx % 2 == 0)).unwrap();
            });
        }
    });

    for (idx, pin) in pins.iter().enumerate() {
        assert_eq!(pin.function(), format!("Out/{}", Level::from(idx % 2 == 0)));
        assert_eq!(pin.read().unwrap(), Level::from(idx % 2 == 0));
    }

    fs::remove_dir_all(root).unwrap();
}

#[test]
fn read_requires_input_or_output() {
    let root = sysfs_tree(&[]);
    let host = Host::new();
    let bank = Arc::new(allwinner::Bank::h3(RegisterOverlay::anonymous(PIO_WORDS).unwrap()));

    soc::register_bank(
        host.pins(),
        bank.clone(),
        &Arc::new(sysfs::Gpio::with_root(&root)),
    )
    .unwrap();

    let pin = host.pins().by_name("PC0").unwrap();

    soc::Bank::set_function(&*bank, 64, Function::Disabled).unwrap();

    match pin.read() {
        Err(Error::InvalidState(name, Function::Disabled)) => assert_eq!(name, "PC0"),
        other => panic!("unexpected result: {:?}", other),
    }
    assert_eq!(pin.function(), "Disabled");

    pin.configure_input(Pull::Up, Edge::None).unwrap();
    assert_eq!(pin.read().unwrap(), Level::Low);

    fs::remove_dir_all(root).unwrap();
}
