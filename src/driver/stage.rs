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

use std::collections::HashSet;
use std::sync::Arc;

use super::{Driver, Error, Result};

/// Partitions `drivers` into stages.
///
/// Every driver's prerequisites are placed in strictly earlier stages. Each
/// stage is sorted by name.
pub(crate) fn explode(drivers: &[Arc<dyn Driver>]) -> Result<Vec<Vec<Arc<dyn Driver>>>> {
    let mut remaining = drivers.to_vec();
    remaining.sort_by(|a, b| a.name().cmp(b.name()));

    let names: HashSet<&str> = drivers.iter().map(|d| d.name()).collect();

    for driver in &remaining {
        if let Some(missing) = driver.prerequisites().iter().find(|p| !names.contains(**p)) {
            return Err(Error::UnsatisfiedDependency {
                driver: driver.name().to_string(),
                missing: missing.to_string(),
            });
        }
    }

    let mut placed: HashSet<String> = HashSet::new();
    let mut stages = Vec::new();

    while !remaining.is_empty() {
        let (ready, blocked): (Vec<_>, Vec<_>) = remaining
            .into_iter()
            .partition(|d| d.prerequisites().iter().all(|p| placed.contains(*p)));

        if ready.is_empty() {
            return Err(Error::CyclicDependency(
                blocked.iter().map(|d| d.name().to_string()).collect(),
            ));
        }

        placed.extend(ready.iter().map(|d| d.name().to_string()));
        stages.push(ready);
        remaining = blocked;
    }

    Ok(stages)
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::driver::InitError;
    use crate::host::Host;

    struct Node(&'static str, Vec<&'static str>);

    impl Driver for Node {
        fn name(&self) -> &str {
            self.0
        }

        fn prerequisites(&self) -> &[&str] {
            &self.1
        }

        fn init(&self, _host: &Host) -> std::result::Result<(), InitError> {
            Ok(())
        }
    }

    fn names(stages: &[Vec<Arc<dyn Driver>>]) -> Vec<Vec<&str>> {
        stages
            .iter()
            .map(|stage| stage.iter().map(|d| d.name()).collect())
            .collect()
    }

    #[test]
    fn layers_by_depth() {
        let drivers: Vec<Arc<dyn Driver>> = vec![
            Arc::new(Node("c", vec!["b"])),
            Arc::new(Node("b", vec!["a"])),
            Arc::new(Node("x", vec![])),
            Arc::new(Node("a", vec![])),
            Arc::new(Node("d", vec!["a", "c"])),
        ];

        let stages = explode(&drivers).unwrap();

        assert_eq!(names(&stages), [vec!["a", "x"], vec!["b"], vec!["c"], vec!["d"]]);
    }

    #[test]
    fn self_dependency_is_a_cycle() {
        let drivers: Vec<Arc<dyn Driver>> = vec![
            Arc::new(Node("ok", vec![])),
            Arc::new(Node("selfish", vec!["selfish"])),
        ];

        match explode(&drivers) {
            Err(Error::CyclicDependency(names)) => assert_eq!(names, ["selfish"]),
            other => panic!("unexpected result: {:?}", other.map(|s| s.len())),
        }
    }

    #[test]
    fn empty_set_has_no_stages() {
        assert!(explode(&[]).unwrap().is_empty());
    }
}
