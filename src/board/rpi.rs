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

//! Raspberry Pi boards.
//!
//! The `rpi` [`Driver`] registers the `P1` expansion header, and an alias
//! `P1_<position>` for every GPIO pin on it. Physical pin 1 is the top left
//! position, with odd positions in the left column.
//!
//! The original model A and B boards have a 26-pin header. The first revision
//! of the model B routes GPIO0, GPIO1 and GPIO21 to positions 3, 5 and 13,
//! where later boards have GPIO2, GPIO3 and GPIO27. Compute modules don't
//! have a P1 header.
//!
//! [`Driver`]: struct.Driver.html

use crate::driver::{self, InitError};
use crate::header::{GROUND, V3_3, V5};
use crate::host::Host;
use crate::system::{DeviceInfo, Model};

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
enum PinType {
    Gpio(u8),
    Ground,
    Power3v3,
    Power5v,
}

impl PinType {
    fn name(self) -> String {
        match self {
            PinType::Gpio(line) => format!("GPIO{}", line),
            PinType::Ground => GROUND.to_string(),
            PinType::Power3v3 => V3_3.to_string(),
            PinType::Power5v => V5.to_string(),
        }
    }
}

const HEADER_40: [PinType; 40] = [
    PinType::Power3v3, // Physical pin 1
    PinType::Power5v,  // Physical pin 2
    PinType::Gpio(2),  // Physical pin 3
    PinType::Power5v,  // Physical pin 4
    PinType::Gpio(3),  // Physical pin 5
    PinType::Ground,   // Physical pin 6
    PinType::Gpio(4),  // Physical pin 7
    PinType::Gpio(14), // Physical pin 8
    PinType::Ground,   // Physical pin 9
    PinType::Gpio(15), // Physical pin 10
    PinType::Gpio(17), // Physical pin 11
    PinType::Gpio(18), // Physical pin 12
    PinType::Gpio(27), // Physical pin 13
    PinType::Ground,   // Physical pin 14
    PinType::Gpio(22), // Physical pin 15
    PinType::Gpio(23), // Physical pin 16
    PinType::Power3v3, // Physical pin 17
    PinType::Gpio(24), // Physical pin 18
    PinType::Gpio(10), // Physical pin 19
    PinType::Ground,   // Physical pin 20
    PinType::Gpio(9),  // Physical pin 21
    PinType::Gpio(25), // Physical pin 22
    PinType::Gpio(11), // Physical pin 23
    PinType::Gpio(8),  // Physical pin 24
    PinType::Ground,   // Physical pin 25
    PinType::Gpio(7),  // Physical pin 26
    PinType::Gpio(0),  // Physical pin 27
    PinType::Gpio(1),  // Physical pin 28
    PinType::Gpio(5),  // Physical pin 29
    PinType::Ground,   // Physical pin 30
    PinType::Gpio(6),  // Physical pin 31
    PinType::Gpio(12), // Physical pin 32
    PinType::Gpio(13), // Physical pin 33
    PinType::Ground,   // Physical pin 34
    PinType::Gpio(19), // Physical pin 35
    PinType::Gpio(16), // Physical pin 36
    PinType::Gpio(26), // Physical pin 37
    PinType::Gpio(20), // Physical pin 38
    PinType::Ground,   // Physical pin 39
    PinType::Gpio(21), // Physical pin 40
];

// B Rev 1 differences from the first 26 pins of HEADER_40
const REV1_OVERRIDES: [(usize, PinType); 3] = [
    (3, PinType::Gpio(0)),
    (5, PinType::Gpio(1)),
    (13, PinType::Gpio(21)),
];

// Physical pin types for the P1 header on `model`, in position order
fn layout(model: Model) -> Option<Vec<PinType>> {
    let mut pins = match model {
        Model::RaspberryPiComputeModule
        | Model::RaspberryPiComputeModule3
        | Model::RaspberryPiComputeModule3Plus
        | Model::RaspberryPiComputeModule4 => return None,
        Model::RaspberryPiA | Model::RaspberryPiBRev1 | Model::RaspberryPiBRev2 => {
            HEADER_40[..26].to_vec()
        }
        model if model.is_raspberry_pi() => HEADER_40.to_vec(),
        _ => return None,
    };

    if model == Model::RaspberryPiBRev1 {
        for &(position, pin_type) in &REV1_OVERRIDES {
            pins[position - 1] = pin_type;
        }
    }

    Some(pins)
}

// Header rows, two positions per row
fn rows(pins: &[PinType]) -> Vec<Vec<String>> {
    pins.chunks(2)
        .map(|row| row.iter().map(|pin| pin.name()).collect())
        .collect()
}

// (alias, pin name) for every GPIO position
fn aliases(pins: &[PinType]) -> Vec<(String, String)> {
    pins.iter()
        .enumerate()
        .filter(|(_, pin)| matches!(pin, PinType::Gpio(_)))
        .map(|(idx, pin)| (format!("P1_{}", idx + 1), pin.name()))
        .collect()
}

/// Board driver for the Raspberry Pi.
#[derive(Debug, Default)]
pub struct Driver {
    model: Option<Model>,
}

impl Driver {
    /// Constructs a `Driver` that identifies the board at initialization.
    pub fn new() -> Driver {
        Driver { model: None }
    }

    /// Constructs a `Driver` for `model`, skipping board identification.
    pub fn with_model(model: Model) -> Driver {
        Driver { model: Some(model) }
    }
}

impl driver::Driver for Driver {
    fn name(&self) -> &str {
        "rpi"
    }

    fn prerequisites(&self) -> &[&str] {
        &["bcm283x-gpio"]
    }

    fn init(&self, host: &Host) -> Result<(), InitError> {
        let model = match self.model {
            Some(model) => model,
            None => DeviceInfo::new()
                .map_err(|_| InitError::skip("unknown board"))?
                .model(),
        };

        if !model.is_raspberry_pi() {
            return Err(InitError::skip(format!("{} is not a Raspberry Pi", model)));
        }

        let pins = match layout(model) {
            Some(pins) => pins,
            None => {
                log::debug!("{} has no P1 header", model);
                return Ok(());
            }
        };

        host.headers().register("P1", rows(&pins))?;

        for (alias, target) in aliases(&pins) {
            host.pins().register_alias(&alias, &target)?;
        }

        log::debug!("Registered {}-pin P1 header for {}", pins.len(), model);

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::driver::Driver as _;

    #[test]
    fn forty_pin_layout() {
        let pins = layout(Model::RaspberryPi4B).unwrap();
        let rows = rows(&pins);

        assert_eq!(rows.len(), 20);
        assert_eq!(rows[0], ["3.3V", "5V"]);
        assert_eq!(rows[1], ["GPIO2", "5V"]);
        assert_eq!(rows[19], ["GROUND", "GPIO21"]);
    }

    #[test]
    fn rev1_header() {
        let pins = layout(Model::RaspberryPiBRev1).unwrap();

        assert_eq!(pins.len(), 26);
        assert_eq!(pins[2], PinType::Gpio(0));
        assert_eq!(pins[4], PinType::Gpio(1));
        assert_eq!(pins[12], PinType::Gpio(21));

        let pins = layout(Model::RaspberryPiBRev2).unwrap();

        assert_eq!(pins.len(), 26);
        assert_eq!(pins[2], PinType::Gpio(2));
        assert_eq!(pins[12], PinType::Gpio(27));
    }

    #[test]
    fn compute_modules_have_no_header() {
        assert!(layout(Model::RaspberryPiComputeModule3).is_none());
        assert!(layout(Model::RaspberryPiComputeModule4).is_none());
        assert!(layout(Model::Pine64).is_none());
    }

    #[test]
    fn aliases_skip_power_pins() {
        let aliases = aliases(&layout(Model::RaspberryPi3B).unwrap());

        assert_eq!(aliases.len(), 28);
        assert_eq!(aliases[0], ("P1_3".to_string(), "GPIO2".to_string()));
        assert!(!aliases.iter().any(|(alias, _)| alias == "P1_1"));
    }

    #[test]
    fn skips_other_boards() {
        let host = Host::new();
        let driver = Driver::with_model(Model::OrangePiPc);

        assert!(matches!(driver.init(&host), Err(InitError::Skip(_))));
        assert!(host.headers().get("P1").is_none());
    }

    #[test]
    fn registers_header_and_aliases() {
        let host = Host::new();
        Driver::with_model(Model::RaspberryPiZeroW).init(&host).unwrap();

        let header = host.headers().get("P1").unwrap();
        assert_eq!(header.position(40), Some("GPIO21"));

        assert!(matches!(
            host.pins().register_alias("P1_40", "GPIO21"),
            Err(crate::gpio::Error::DuplicatePin(_))
        ));
    }
}
