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

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Barrier, Mutex};
use std::thread;
use std::time::Duration;

use sbcio::driver::{self, DriverFailure, Error};
use sbcio::{Driver, Host, InitError, Outcome};

#[derive(Clone, Copy)]
enum Action {
    Load,
    Skip,
    Fail,
    Panic,
}

// Records the order in which drivers run
#[derive(Clone, Default)]
struct Journal {
    entries: Arc<Mutex<Vec<String>>>,
    calls: Arc<AtomicUsize>,
}

impl Journal {
    fn entries(&self) -> Vec<String> {
        self.entries.lock().unwrap().clone()
    }

    fn position(&self, name: &str) -> usize {
        self.entries()
            .iter()
            .position(|n| n == name)
            .unwrap_or_else(|| panic!("{} never ran", name))
    }
}

struct Fake {
    name: &'static str,
    prerequisites: Vec<&'static str>,
    action: Action,
    journal: Journal,
}

impl Fake {
    fn new(name: &'static str, prerequisites: &[&'static str], journal: &Journal) -> Fake {
        Fake {
            name,
            prerequisites: prerequisites.to_vec(),
            action: Action::Load,
            journal: journal.clone(),
        }
    }

    fn action(mut self, action: Action) -> Fake {
        self.action = action;
        self
    }
}

impl Driver for Fake {
    fn name(&self) -> &str {
        self.name
    }

    fn prerequisites(&self) -> &[&str] {
        &self.prerequisites
    }

    fn init(&self, _host: &Host) -> Result<(), InitError> {
        self.journal.calls.fetch_add(1, Ordering::SeqCst);
        self.journal.entries.lock().unwrap().push(self.name.to_string());

        match self.action {
            Action::Load => Ok(()),
            Action::Skip => Err(InitError::skip("not present")),
            Action::Fail => Err(InitError::fail("device not responding")),
            Action::Panic => panic!("register block missing"),
        }
    }
}

#[test]
fn diamond_runs_in_three_stages() {
    let journal = Journal::default();
    let host = Host::new();

    host.register(Fake::new("super", &["base1", "base2"], &journal)).unwrap();
    host.register(Fake::new("base2", &["root"], &journal)).unwrap();
    host.register(Fake::new("root", &[], &journal)).unwrap();
    host.register(Fake::new("base1", &["root"], &journal)).unwrap();

    let state = host.init().unwrap();

    assert_eq!(
        state.stages(),
        [vec!["root"], vec!["base1", "base2"], vec!["super"]]
    );
    assert_eq!(state.loaded(), ["base1", "base2", "root", "super"]);
    assert!(state.skipped().is_empty());
    assert!(state.failed().is_empty());

    assert!(journal.position("root") < journal.position("base1"));
    assert!(journal.position("root") < journal.position("base2"));
    assert!(journal.position("base1") < journal.position("super"));
    assert!(journal.position("base2") < journal.position("super"));
}

// Blocks until every driver sharing the barrier is running
struct Rendezvous {
    name: &'static str,
    barrier: Arc<Barrier>,
}

impl Driver for Rendezvous {
    fn name(&self) -> &str {
        self.name
    }

    fn prerequisites(&self) -> &[&str] {
        &[]
    }

    fn init(&self, _host: &Host) -> Result<(), InitError> {
        self.barrier.wait();

        Ok(())
    }
}

#[test]
fn stage_runs_drivers_concurrently() {
    let names = ["gpio", "i2c", "spi", "uart"];
    let barrier = Arc::new(Barrier::new(names.len()));
    let host = Host::new();

    for name in names {
        host.register(Rendezvous {
            name,
            barrier: barrier.clone(),
        })
        .unwrap();
    }

    // Would never return if the stage ran its drivers one at a time
    let state = host.init().unwrap();

    assert_eq!(state.stages(), [vec!["gpio", "i2c", "spi", "uart"]]);
    assert_eq!(state.loaded(), names);
}

#[test]
fn prerequisites_run_first() {
    let journal = Journal::default();
    let host = Host::new();

    let graph: &[(&'static str, &[&'static str])] = &[
        ("display", &["i2c", "gpio"]),
        ("gpio", &["cpu"]),
        ("i2c", &["cpu"]),
        ("cpu", &[]),
        ("leds", &["gpio"]),
        ("spi", &["cpu"]),
        ("touch", &["spi", "display"]),
    ];

    for &(name, prerequisites) in graph {
        host.register(Fake::new(name, prerequisites, &journal)).unwrap();
    }

    host.init().unwrap();

    for &(name, prerequisites) in graph {
        for prerequisite in prerequisites {
            assert!(journal.position(prerequisite) < journal.position(name));
        }
    }
}

#[test]
fn cycle_is_a_configuration_error() {
    let journal = Journal::default();
    let host = Host::new();

    host.register(Fake::new("a", &["c"], &journal)).unwrap();
    host.register(Fake::new("b", &["a"], &journal)).unwrap();
    host.register(Fake::new("c", &["b"], &journal)).unwrap();
    host.register(Fake::new("free", &[], &journal)).unwrap();

    let err = host.init().unwrap_err();
    assert_eq!(
        err,
        Error::CyclicDependency(vec!["a".to_string(), "b".to_string(), "c".to_string()])
    );

    // Nothing runs, and the error sticks
    assert_eq!(journal.calls.load(Ordering::SeqCst), 0);
    assert_eq!(host.init().unwrap_err(), err);
    assert!(host.state().is_none());
}

#[test]
fn missing_prerequisite_is_a_configuration_error() {
    let journal = Journal::default();
    let host = Host::new();

    host.register(Fake::new("display", &["ghost"], &journal)).unwrap();

    assert_eq!(
        host.init().unwrap_err(),
        Error::UnsatisfiedDependency {
            driver: "display".to_string(),
            missing: "ghost".to_string(),
        }
    );
    assert_eq!(journal.calls.load(Ordering::SeqCst), 0);
}

#[test]
fn failure_only_affects_dependents() {
    let journal = Journal::default();
    let host = Host::new();

    host.register(Fake::new("a", &[], &journal).action(Action::Fail)).unwrap();
    host.register(Fake::new("b", &["a"], &journal)).unwrap();
    host.register(Fake::new("c", &["b"], &journal)).unwrap();
    host.register(Fake::new("d", &[], &journal)).unwrap();
    host.register(Fake::new("e", &[], &journal).action(Action::Skip)).unwrap();

    let state = host.init().unwrap();

    assert_eq!(state.loaded(), ["d"]);
    assert_eq!(
        state.failed(),
        [DriverFailure {
            name: "a".to_string(),
            reason: "device not responding".to_string(),
        }]
    );

    let skipped: Vec<&str> = state.skipped().iter().map(|f| f.name.as_str()).collect();
    assert_eq!(skipped, ["b", "c", "e"]);
    assert!(state.skipped()[0].reason.ends_with(": a"));
    assert!(state.skipped()[1].reason.ends_with(": b"));
    assert_eq!(state.outcome("e"), Some(Outcome::Skipped("not present".to_string())));

    // Dependents of a failed driver never run
    assert_eq!(journal.entries().len(), 3);
}

#[test]
fn panics_are_contained() {
    let journal = Journal::default();
    let host = Host::new();

    host.register(Fake::new("flaky", &[], &journal).action(Action::Panic)).unwrap();
    host.register(Fake::new("steady", &[], &journal)).unwrap();

    let state = host.init().unwrap();

    assert_eq!(state.loaded(), ["steady"]);
    assert_eq!(state.failed().len(), 1);
    assert_eq!(state.failed()[0].name, "flaky");
    assert_eq!(state.failed()[0].reason, "panicked: register block missing");
}

#[test]
fn init_runs_once() {
    let journal = Journal::default();
    let host = Arc::new(Host::new());

    host.register(Fake::new("a", &[], &journal)).unwrap();
    host.register(Fake::new("b", &["a"], &journal)).unwrap();

    let first = host.init().unwrap().clone();

    let handles: Vec<_> = (0..4)
        .map(|_| {
            let host = host.clone();
            thread::spawn(move || host.init().unwrap().clone())
        })
        .collect();

    for handle in handles {
        assert_eq!(handle.join().unwrap(), first);
    }

    assert_eq!(journal.calls.load(Ordering::SeqCst), 2);
}

#[test]
fn concurrent_first_calls_share_one_run() {
    struct Slow(Arc<AtomicUsize>);

    impl Driver for Slow {
        fn name(&self) -> &str {
            "slow"
        }

        fn init(&self, _host: &Host) -> Result<(), InitError> {
            self.0.fetch_add(1, Ordering::SeqCst);
            thread::sleep(Duration::from_millis(50));
            Ok(())
        }
    }

    let calls = Arc::new(AtomicUsize::new(0));
    let host = Host::new();
    host.register(Slow(calls.clone())).unwrap();

    thread::scope(|s| {
        for _ in 0..4 {
            s.spawn(|| assert_eq!(host.init().unwrap().loaded(), ["slow"]));
        }
    });

    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[test]
fn registration_closes_when_init_starts() {
    struct Registrar(Mutex<Option<driver::Result<()>>>);

    impl Driver for Registrar {
        fn name(&self) -> &str {
            "registrar"
        }

        fn init(&self, host: &Host) -> Result<(), InitError> {
            let journal = Journal::default();
            *self.0.lock().unwrap() = Some(host.register(Fake::new("late", &[], &journal)));
            Ok(())
        }
    }

    let host = Host::new();
    let registrar = Arc::new(Registrar(Mutex::new(None)));

    // Keep a handle on the result through a forwarding driver
    struct Forward(Arc<Registrar>);

    impl Driver for Forward {
        fn name(&self) -> &str {
            self.0.name()
        }

        fn init(&self, host: &Host) -> Result<(), InitError> {
            self.0.init(host)
        }
    }

    host.register(Forward(registrar.clone())).unwrap();
    host.init().unwrap();

    assert_eq!(
        *registrar.0.lock().unwrap(),
        Some(Err(Error::LateRegistration("late".to_string())))
    );

    let journal = Journal::default();
    assert_eq!(
        host.register(Fake::new("later", &[], &journal)),
        Err(Error::LateRegistration("later".to_string()))
    );
    assert_eq!(host.init().unwrap().loaded(), ["registrar"]);
}

#[test]
fn duplicate_names_are_rejected() {
    let journal = Journal::default();
    let host = Host::new();

    host.register(Fake::new("gpio", &[], &journal)).unwrap();

    assert_eq!(
        host.register(Fake::new("gpio", &[], &journal)),
        Err(Error::DuplicateName("gpio".to_string()))
    );
}

#[test]
fn stages_are_deterministic() {
    let journal = Journal::default();

    let drivers: Vec<Arc<dyn Driver>> = vec![
        Arc::new(Fake::new("z", &[], &journal)),
        Arc::new(Fake::new("m", &["z"], &journal)),
        Arc::new(Fake::new("a", &[], &journal)),
        Arc::new(Fake::new("k", &["a", "z"], &journal)),
    ];

    let expected = vec![
        vec!["a".to_string(), "z".to_string()],
        vec!["k".to_string(), "m".to_string()],
    ];

    for _ in 0..10 {
        assert_eq!(driver::stages(&drivers).unwrap(), expected);
    }

    let mut reversed = drivers.clone();
    reversed.reverse();
    assert_eq!(driver::stages(&reversed).unwrap(), expected);
}
