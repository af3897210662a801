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

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, RwLock};

use super::{Alias, Error, Pin, Result};

// Longest alias chain followed before giving up
const MAX_ALIAS_DEPTH: usize = 8;

#[derive(Default)]
struct Pins {
    by_name: HashMap<String, Arc<dyn Pin>>,
    by_number: HashMap<u32, Arc<dyn Pin>>,
    // Alias name to target name
    aliases: HashMap<String, String>,
}

/// Index of every pin known to a host.
///
/// Pins are looked up by name, number, or alias. Aliases are stored by
/// target name and resolved at lookup time, so an alias can be registered
/// before its target, and can point to another alias.
#[derive(Default)]
pub struct Registry {
    pins: RwLock<Pins>,
}

impl fmt::Debug for Registry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let pins = self.pins.read().unwrap();

        f.debug_struct("Registry")
            .field("pins", &pins.by_name.len())
            .field("aliases", &pins.aliases.len())
            .finish()
    }
}

impl Registry {
    pub fn new() -> Registry {
        Registry::default()
    }

    /// Registers a real pin.
    ///
    /// Fails if another pin has the same name or number, or if the name is
    /// already used by an alias.
    pub fn register(&self, pin: Arc<dyn Pin>) -> Result<()> {
        let mut pins = self.pins.write().unwrap();
        let name = pin.name().to_string();

        if pins.by_name.contains_key(&name) {
            return Err(Error::DuplicatePin(name));
        }

        if pins.aliases.contains_key(&name) {
            return Err(Error::AliasConflict(name));
        }

        if let Some(number) = pin.number() {
            if pins.by_number.contains_key(&number) {
                return Err(Error::DuplicateNumber(number));
            }

            pins.by_number.insert(number, pin.clone());
        }

        pins.by_name.insert(name, pin);

        Ok(())
    }

    /// Registers `alias` as another name for `target`.
    pub fn register_alias(&self, alias: &str, target: &str) -> Result<()> {
        let mut pins = self.pins.write().unwrap();

        if pins.by_name.contains_key(alias) {
            return Err(Error::AliasConflict(alias.to_string()));
        }

        if pins.aliases.contains_key(alias) {
            return Err(Error::DuplicatePin(alias.to_string()));
        }

        pins.aliases.insert(alias.to_string(), target.to_string());

        Ok(())
    }

    /// Looks up a pin by name, alias, or number.
    ///
    /// Aliases resolve to an [`Alias`] wrapping the real pin. Names that don't
    /// match any pin or alias are tried as a decimal pin number.
    ///
    /// [`Alias`]: struct.Alias.html
    pub fn by_name(&self, name: &str) -> Option<Arc<dyn Pin>> {
        let pins = self.pins.read().unwrap();

        if let Some(pin) = pins.by_name.get(name) {
            return Some(pin.clone());
        }

        if pins.aliases.contains_key(name) {
            let mut target = name;

            for _ in 0..MAX_ALIAS_DEPTH {
                target = pins.aliases.get(target)?.as_str();

                if let Some(real) = pins.by_name.get(target) {
                    return Some(Arc::new(Alias::new(name, real.clone())));
                }
            }

            log::debug!("Alias {} doesn't resolve to a pin", name);

            return None;
        }

        name.parse::<u32>()
            .ok()
            .and_then(|number| pins.by_number.get(&number).cloned())
    }

    pub fn by_number(&self, number: u32) -> Option<Arc<dyn Pin>> {
        self.pins.read().unwrap().by_number.get(&number).cloned()
    }

    /// Returns every real pin, sorted by number, then by name. Pins without a
    /// number come last.
    pub fn all(&self) -> Vec<Arc<dyn Pin>> {
        let mut all: Vec<_> = self.pins.read().unwrap().by_name.values().cloned().collect();

        all.sort_by(|a, b| {
            (a.number().unwrap_or(u32::MAX), a.name()).cmp(&(b.number().unwrap_or(u32::MAX), b.name()))
        });

        all
    }

    /// Returns every alias that resolves to a pin, sorted by name.
    pub fn aliases(&self) -> Vec<Arc<dyn Pin>> {
        let mut names: Vec<String> = self.pins.read().unwrap().aliases.keys().cloned().collect();
        names.sort();

        names.iter().filter_map(|name| self.by_name(name)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::time::Duration;

    use crate::gpio::{Edge, Level, Pull};

    #[derive(Debug)]
    struct Fake {
        name: &'static str,
        number: Option<u32>,
    }

    impl Pin for Fake {
        fn name(&self) -> &str {
            self.name
        }

        fn number(&self) -> Option<u32> {
            self.number
        }

        fn function(&self) -> String {
            String::from("In/Low")
        }

        fn default_pull(&self) -> Pull {
            Pull::Float
        }

        fn configure_input(&self, _pull: Pull, _edge: Edge) -> Result<()> {
            Ok(())
        }

        fn configure_output(&self, _level: Level) -> Result<()> {
            Ok(())
        }

        fn read(&self) -> Result<Level> {
            Ok(Level::Low)
        }

        fn write(&self, _level: Level) -> Result<()> {
            Ok(())
        }

        fn wait_for_edge(&self, _timeout: Option<Duration>) -> Result<bool> {
            Ok(false)
        }
    }

    fn fake(name: &'static str, number: Option<u32>) -> Arc<dyn Pin> {
        Arc::new(Fake { name, number })
    }

    #[test]
    fn duplicates_are_rejected() {
        let pins = Registry::new();
        pins.register(fake("GPIO4", Some(4))).unwrap();

        assert!(matches!(pins.register(fake("GPIO4", Some(5))), Err(Error::DuplicatePin(_))));
        assert!(matches!(pins.register(fake("OTHER", Some(4))), Err(Error::DuplicateNumber(4))));

        pins.register_alias("P1_7", "GPIO4").unwrap();
        assert!(matches!(pins.register(fake("P1_7", None)), Err(Error::AliasConflict(_))));
        assert!(matches!(pins.register_alias("GPIO4", "P1_7"), Err(Error::AliasConflict(_))));
        assert!(matches!(pins.register_alias("P1_7", "GPIO5"), Err(Error::DuplicatePin(_))));
    }

    #[test]
    fn lookups() {
        let pins = Registry::new();
        pins.register(fake("GPIO17", Some(17))).unwrap();
        pins.register(fake("LED", None)).unwrap();
        pins.register_alias("P1_11", "GPIO17").unwrap();
        pins.register_alias("BUTTON", "P1_11").unwrap();
        pins.register_alias("DANGLING", "NOWHERE").unwrap();
        pins.register_alias("LOOP_A", "LOOP_B").unwrap();
        pins.register_alias("LOOP_B", "LOOP_A").unwrap();

        assert_eq!(pins.by_name("GPIO17").unwrap().name(), "GPIO17");
        assert_eq!(pins.by_name("17").unwrap().name(), "GPIO17");
        assert_eq!(pins.by_number(17).unwrap().name(), "GPIO17");

        let alias = pins.by_name("BUTTON").unwrap();
        assert_eq!(alias.name(), "BUTTON");
        assert_eq!(alias.number(), Some(17));
        assert_eq!(alias.real().unwrap().name(), "GPIO17");

        assert!(pins.by_name("DANGLING").is_none());
        assert!(pins.by_name("LOOP_A").is_none());
        assert!(pins.by_name("18").is_none());

        let all: Vec<_> = pins.all().iter().map(|p| p.name().to_string()).collect();
        assert_eq!(all, ["GPIO17", "LED"]);

        let aliases: Vec<_> = pins.aliases().iter().map(|p| p.name().to_string()).collect();
        assert_eq!(aliases, ["BUTTON", "P1_11"]);
    }
}
