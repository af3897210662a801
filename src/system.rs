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

//! Board and SoC identification.
//!
//! Use [`DeviceInfo`] to identify the board's model and SoC. The built-in
//! drivers use it to decide whether they apply to the current host.
//!
//! [`DeviceInfo`]: struct.DeviceInfo.html

use std::error;
use std::fmt;
use std::fs;
use std::result;

const PATH_PROC_CPUINFO: &str = "/proc/cpuinfo";
const PATH_BASE_COMPATIBLE: &str = "/sys/firmware/devicetree/base/compatible";
const PATH_BASE_MODEL: &str = "/sys/firmware/devicetree/base/model";

/// Errors that can occur when trying to identify the hardware.
#[derive(Debug)]
pub enum Error {
    /// Unknown model.
    ///
    /// `DeviceInfo` was unable to identify the board or its SoC based on the
    /// contents of `/proc/cpuinfo`, `/sys/firmware/devicetree/base/compatible`
    /// and `/sys/firmware/devicetree/base/model`.
    ///
    /// You may also encounter this error if your Linux distribution
    /// doesn't provide any of the common user-accessible system files
    /// that are used to identify the model and SoC.
    UnknownModel,
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Error::UnknownModel => write!(f, "Unknown model"),
        }
    }
}

impl error::Error for Error {}

/// Result type returned from methods that can have `system::Error`s.
pub type Result<T> = result::Result<T, Error>;

/// Identifiable board models.
#[derive(Debug, PartialEq, Eq, Copy, Clone)]
#[non_exhaustive]
pub enum Model {
    RaspberryPiA,
    RaspberryPiAPlus,
    RaspberryPiBRev1,
    RaspberryPiBRev2,
    RaspberryPiBPlus,
    RaspberryPi2B,
    RaspberryPi3APlus,
    RaspberryPi3B,
    RaspberryPi3BPlus,
    RaspberryPi4B,
    RaspberryPi400,
    RaspberryPiComputeModule,
    RaspberryPiComputeModule3,
    RaspberryPiComputeModule3Plus,
    RaspberryPiComputeModule4,
    RaspberryPiZero,
    RaspberryPiZeroW,
    RaspberryPiZero2W,
    Pine64,
    OrangePiPc,
    /// A board that could only be identified by its SoC.
    Other,
}

impl Model {
    /// Returns `true` for any Raspberry Pi model.
    pub fn is_raspberry_pi(self) -> bool {
        !matches!(self, Model::Pine64 | Model::OrangePiPc | Model::Other)
    }

    // SoC a model shipped with, for sources that only identify the model
    fn default_soc(self) -> Option<Soc> {
        let soc = match self {
            Model::RaspberryPiA
            | Model::RaspberryPiAPlus
            | Model::RaspberryPiBRev1
            | Model::RaspberryPiBRev2
            | Model::RaspberryPiBPlus
            | Model::RaspberryPiComputeModule
            | Model::RaspberryPiZero
            | Model::RaspberryPiZeroW => Soc::Bcm2835,
            Model::RaspberryPi2B => Soc::Bcm2836,
            Model::RaspberryPi3B
            | Model::RaspberryPi3BPlus
            | Model::RaspberryPi3APlus
            | Model::RaspberryPiComputeModule3
            | Model::RaspberryPiComputeModule3Plus
            | Model::RaspberryPiZero2W => Soc::Bcm2837,
            Model::RaspberryPi4B | Model::RaspberryPi400 | Model::RaspberryPiComputeModule4 => {
                Soc::Bcm2711
            }
            Model::Pine64 => Soc::AllwinnerA64,
            Model::OrangePiPc => Soc::AllwinnerH3,
            Model::Other => return None,
        };

        Some(soc)
    }
}

impl fmt::Display for Model {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Model::RaspberryPiA => write!(f, "Raspberry Pi A"),
            Model::RaspberryPiAPlus => write!(f, "Raspberry Pi A+"),
            Model::RaspberryPiBRev1 => write!(f, "Raspberry Pi B Rev 1"),
            Model::RaspberryPiBRev2 => write!(f, "Raspberry Pi B Rev 2"),
            Model::RaspberryPiBPlus => write!(f, "Raspberry Pi B+"),
            Model::RaspberryPi2B => write!(f, "Raspberry Pi 2 B"),
            Model::RaspberryPi3B => write!(f, "Raspberry Pi 3 B"),
            Model::RaspberryPi3BPlus => write!(f, "Raspberry Pi 3 B+"),
            Model::RaspberryPi3APlus => write!(f, "Raspberry Pi 3 A+"),
            Model::RaspberryPi4B => write!(f, "Raspberry Pi 4 B"),
            Model::RaspberryPi400 => write!(f, "Raspberry Pi 400"),
            Model::RaspberryPiComputeModule => write!(f, "Raspberry Pi Compute Module"),
            Model::RaspberryPiComputeModule3 => write!(f, "Raspberry Pi Compute Module 3"),
            Model::RaspberryPiComputeModule3Plus => write!(f, "Raspberry Pi Compute Module 3+"),
            Model::RaspberryPiComputeModule4 => write!(f, "Raspberry Pi Compute Module 4"),
            Model::RaspberryPiZero => write!(f, "Raspberry Pi Zero"),
            Model::RaspberryPiZeroW => write!(f, "Raspberry Pi Zero W"),
            Model::RaspberryPiZero2W => write!(f, "Raspberry Pi Zero 2 W"),
            Model::Pine64 => write!(f, "Pine64"),
            Model::OrangePiPc => write!(f, "Orange Pi PC"),
            Model::Other => write!(f, "Unknown board"),
        }
    }
}

/// Identifiable SoCs.
#[derive(Debug, PartialEq, Eq, Copy, Clone)]
#[non_exhaustive]
pub enum Soc {
    Bcm2835,
    Bcm2836,
    Bcm2837,
    Bcm2711,
    AllwinnerA64,
    AllwinnerH3,
}

impl Soc {
    /// Returns `true` for the Broadcom SoCs used on Raspberry Pi boards.
    pub fn is_bcm283x(self) -> bool {
        matches!(self, Soc::Bcm2835 | Soc::Bcm2836 | Soc::Bcm2837 | Soc::Bcm2711)
    }

    /// Returns `true` for Allwinner SoCs.
    pub fn is_allwinner(self) -> bool {
        matches!(self, Soc::AllwinnerA64 | Soc::AllwinnerH3)
    }
}

impl fmt::Display for Soc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Soc::Bcm2835 => write!(f, "BCM2835"),
            Soc::Bcm2836 => write!(f, "BCM2836"),
            Soc::Bcm2837 => write!(f, "BCM2837"),
            Soc::Bcm2711 => write!(f, "BCM2711"),
            Soc::AllwinnerA64 => write!(f, "Allwinner A64"),
            Soc::AllwinnerH3 => write!(f, "Allwinner H3"),
        }
    }
}

// Identify the model based on the contents of /proc/cpuinfo
fn parse_proc_cpuinfo(cpuinfo: &str) -> Result<DeviceInfo> {
    let mut hardware = "";
    let mut revision = String::new();

    for line in cpuinfo.lines() {
        if let Some((key, value)) = line.split_once(':') {
            match key.trim() {
                "Hardware" => hardware = value.trim(),
                "Revision" => revision = value.trim().to_lowercase(),
                _ => (),
            }
        }
    }

    // Return an error if we don't recognize the SoC. This check is
    // done to prevent accidentally identifying a non-Pi SBC as a Pi
    // solely based on the revision field.
    match hardware {
        "BCM2708" | "BCM2835" | "BCM2709" | "BCM2836" | "BCM2710" | "BCM2837" | "BCM2837A1"
        | "BCM2837B0" | "BCM2711" => {}
        _ => return Err(Error::UnknownModel),
    }

    let code = u32::from_str_radix(&revision, 16).map_err(|_| Error::UnknownModel)?;

    // New-style revision codes set bit 23, and encode the board type in
    // bits 4-11 and the processor in bits 12-15.
    if code & (1 << 23) != 0 {
        let model = match (code >> 4) & 0xff {
            0x00 => Model::RaspberryPiA,
            0x01 => Model::RaspberryPiBRev2,
            0x02 => Model::RaspberryPiAPlus,
            0x03 => Model::RaspberryPiBPlus,
            0x04 => Model::RaspberryPi2B,
            0x06 => Model::RaspberryPiComputeModule,
            0x08 => Model::RaspberryPi3B,
            0x09 => Model::RaspberryPiZero,
            0x0a => Model::RaspberryPiComputeModule3,
            0x0c => Model::RaspberryPiZeroW,
            0x0d => Model::RaspberryPi3BPlus,
            0x0e => Model::RaspberryPi3APlus,
            0x10 => Model::RaspberryPiComputeModule3Plus,
            0x11 => Model::RaspberryPi4B,
            0x12 => Model::RaspberryPiZero2W,
            0x13 => Model::RaspberryPi400,
            0x14 => Model::RaspberryPiComputeModule4,
            _ => return Err(Error::UnknownModel),
        };

        let soc = match (code >> 12) & 0xf {
            0 => Soc::Bcm2835,
            1 => Soc::Bcm2836,
            2 => Soc::Bcm2837,
            3 => Soc::Bcm2711,
            _ => return Err(Error::UnknownModel),
        };

        return Ok(DeviceInfo { model, soc });
    }

    // Older revisions are 4 characters long, or 8 if they've been over-volted
    let model = match code & 0xffff {
        0x0007 | 0x0008 | 0x0009 | 0x0015 => Model::RaspberryPiA,
        0x0002 | 0x0003 => Model::RaspberryPiBRev1,
        0x0004 | 0x0005 | 0x0006 | 0x000d | 0x000e | 0x000f => Model::RaspberryPiBRev2,
        0x0012 => Model::RaspberryPiAPlus,
        0x0010 | 0x0013 => Model::RaspberryPiBPlus,
        0x0011 | 0x0014 => Model::RaspberryPiComputeModule,
        _ => return Err(Error::UnknownModel),
    };

    Ok(DeviceInfo {
        model,
        soc: Soc::Bcm2835,
    })
}

// Identify the model based on the contents of /sys/firmware/devicetree/base/compatible
fn parse_base_compatible(compatible: &str) -> Result<DeviceInfo> {
    let mut model = None;
    let mut soc = None;

    // Entries are ordered from most to least specific
    for comp_id in compatible.split('\0') {
        if model.is_none() {
            model = match comp_id {
                "raspberrypi,model-b-i2c0" | "raspberrypi,model-b" => Some(Model::RaspberryPiBRev1),
                "raspberrypi,model-a" => Some(Model::RaspberryPiA),
                "raspberrypi,model-b-rev2" => Some(Model::RaspberryPiBRev2),
                "raspberrypi,model-a-plus" => Some(Model::RaspberryPiAPlus),
                "raspberrypi,model-b-plus" => Some(Model::RaspberryPiBPlus),
                "raspberrypi,2-model-b" => Some(Model::RaspberryPi2B),
                "raspberrypi,compute-module" => Some(Model::RaspberryPiComputeModule),
                "raspberrypi,3-model-b" => Some(Model::RaspberryPi3B),
                "raspberrypi,model-zero" => Some(Model::RaspberryPiZero),
                "raspberrypi,3-compute-module" => Some(Model::RaspberryPiComputeModule3),
                "raspberrypi,3-compute-module-plus" => Some(Model::RaspberryPiComputeModule3Plus),
                "raspberrypi,model-zero-w" => Some(Model::RaspberryPiZeroW),
                "raspberrypi,model-zero-2-w" => Some(Model::RaspberryPiZero2W),
                "raspberrypi,3-model-b-plus" => Some(Model::RaspberryPi3BPlus),
                "raspberrypi,3-model-a-plus" => Some(Model::RaspberryPi3APlus),
                "raspberrypi,4-model-b" => Some(Model::RaspberryPi4B),
                "raspberrypi,400" => Some(Model::RaspberryPi400),
                "raspberrypi,4-compute-module" => Some(Model::RaspberryPiComputeModule4),
                "pine64,pine64" | "pine64,pine64-plus" => Some(Model::Pine64),
                "xunlong,orangepi-pc" => Some(Model::OrangePiPc),
                _ => None,
            };
        }

        if soc.is_none() {
            soc = match comp_id {
                "brcm,bcm2835" => Some(Soc::Bcm2835),
                "brcm,bcm2836" => Some(Soc::Bcm2836),
                "brcm,bcm2837" => Some(Soc::Bcm2837),
                "brcm,bcm2711" => Some(Soc::Bcm2711),
                "allwinner,sun50i-a64" => Some(Soc::AllwinnerA64),
                "allwinner,sun8i-h3" => Some(Soc::AllwinnerH3),
                _ => None,
            };
        }
    }

    match (model, soc) {
        (Some(model), Some(soc)) => Ok(DeviceInfo { model, soc }),
        (Some(model), None) => model
            .default_soc()
            .map(|soc| DeviceInfo { model, soc })
            .ok_or(Error::UnknownModel),
        (None, Some(soc)) => Ok(DeviceInfo {
            model: Model::Other,
            soc,
        }),
        (None, None) => Err(Error::UnknownModel),
    }
}

// Identify the model based on the contents of /sys/firmware/devicetree/base/model
fn parse_base_model(base_model: &str) -> Result<DeviceInfo> {
    let mut base_model = match base_model.find('\0') {
        Some(idx) => &base_model[..idx],
        None => base_model,
    }
    .trim();

    // Check if this is a Pi B rev 2 before we remove the revision part, assuming the
    // PCB Revision numbers on https://elinux.org/RPi_HardwareHistory are correct, and
    // the installed distro appends the revision to the model name.
    let model = match base_model {
        "Raspberry Pi Model B Rev 2.0" | "Raspberry Pi Model B rev2 Rev 2.0" => {
            Some(Model::RaspberryPiBRev2)
        }
        _ => None,
    };

    let model = match model {
        Some(model) => model,
        None => {
            if let Some(idx) = base_model.find(" Rev ") {
                base_model = &base_model[..idx];
            }

            match base_model {
                "Raspberry Pi Model B (no P5)" | "Raspberry Pi Model B" => Model::RaspberryPiBRev1,
                "Raspberry Pi Model A" => Model::RaspberryPiA,
                "Raspberry Pi Model B rev2" => Model::RaspberryPiBRev2,
                "Raspberry Pi Model A+" | "Raspberry Pi Model A Plus" => Model::RaspberryPiAPlus,
                "Raspberry Pi Model B+" | "Raspberry Pi Model B Plus" => Model::RaspberryPiBPlus,
                "Raspberry Pi 2 Model B" => Model::RaspberryPi2B,
                "Raspberry Pi Compute Module" => Model::RaspberryPiComputeModule,
                "Raspberry Pi 3 Model B" => Model::RaspberryPi3B,
                "Raspberry Pi Zero" => Model::RaspberryPiZero,
                "Raspberry Pi Compute Module 3" => Model::RaspberryPiComputeModule3,
                "Raspberry Pi Compute Module 3 Plus" => Model::RaspberryPiComputeModule3Plus,
                "Raspberry Pi Zero W" => Model::RaspberryPiZeroW,
                "Raspberry Pi Zero 2 W" => Model::RaspberryPiZero2W,
                "Raspberry Pi 3 Model B+" | "Raspberry Pi 3 Model B Plus" => {
                    Model::RaspberryPi3BPlus
                }
                "Raspberry Pi 3 Model A Plus" => Model::RaspberryPi3APlus,
                "Raspberry Pi 4 Model B" => Model::RaspberryPi4B,
                "Raspberry Pi 400" => Model::RaspberryPi400,
                "Raspberry Pi Compute Module 4" => Model::RaspberryPiComputeModule4,
                "Pine64" | "Pine64+" | "Pine64 PLUS" => Model::Pine64,
                "Xunlong Orange Pi PC" => Model::OrangePiPc,
                _ => return Err(Error::UnknownModel),
            }
        }
    };

    model
        .default_soc()
        .map(|soc| DeviceInfo { model, soc })
        .ok_or(Error::UnknownModel)
}

/// Retrieves board and SoC information.
#[derive(Debug, PartialEq, Eq, Copy, Clone)]
pub struct DeviceInfo {
    model: Model,
    soc: Soc,
}

impl DeviceInfo {
    /// Constructs a new `DeviceInfo`.
    ///
    /// `new` attempts to identify the board's model and SoC based on
    /// the contents of `/proc/cpuinfo`, `/sys/firmware/devicetree/base/compatible`
    /// and `/sys/firmware/devicetree/base/model`.
    pub fn new() -> Result<DeviceInfo> {
        let read = |path| fs::read_to_string(path).map_err(|_| Error::UnknownModel);

        // Parse order from most-detailed to least-detailed info
        read(PATH_PROC_CPUINFO)
            .and_then(|s| parse_proc_cpuinfo(&s))
            .or_else(|_| read(PATH_BASE_COMPATIBLE).and_then(|s| parse_base_compatible(&s)))
            .or_else(|_| read(PATH_BASE_MODEL).and_then(|s| parse_base_model(&s)))
    }

    /// Returns the board's model.
    pub fn model(&self) -> Model {
        self.model
    }

    /// Returns the board's SoC.
    pub fn soc(&self) -> Soc {
        self.soc
    }

    /// Returns `true` if the board is a Raspberry Pi.
    pub fn is_raspberry_pi(&self) -> bool {
        self.model.is_raspberry_pi()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cpuinfo_new_style_revision() {
        let cpuinfo = "processor\t: 0\nHardware\t: BCM2835\nRevision\t: c03111\nSerial\t\t: 1\n";

        assert_eq!(
            parse_proc_cpuinfo(cpuinfo).unwrap(),
            DeviceInfo {
                model: Model::RaspberryPi4B,
                soc: Soc::Bcm2711,
            }
        );
    }

    #[test]
    fn cpuinfo_old_style_revision() {
        let cpuinfo = "Hardware\t: BCM2708\nRevision\t: 1000000e\n";
        let info = parse_proc_cpuinfo(cpuinfo).unwrap();

        assert_eq!(info.model(), Model::RaspberryPiBRev2);
        assert_eq!(info.soc(), Soc::Bcm2835);
    }

    #[test]
    fn cpuinfo_requires_broadcom_hardware() {
        let cpuinfo = "Hardware\t: sun50iw1p1\nRevision\t: a02082\n";

        assert!(parse_proc_cpuinfo(cpuinfo).is_err());
        assert!(parse_proc_cpuinfo("").is_err());
    }

    #[test]
    fn compatible_identifies_allwinner() {
        let info = parse_base_compatible("pine64,pine64\0allwinner,sun50i-a64\0").unwrap();
        assert_eq!(info.model(), Model::Pine64);
        assert_eq!(info.soc(), Soc::AllwinnerA64);
        assert!(!info.is_raspberry_pi());

        let info = parse_base_compatible("friendlyarm,nanopi-m1\0allwinner,sun8i-h3\0").unwrap();
        assert_eq!(info.model(), Model::Other);
        assert_eq!(info.soc(), Soc::AllwinnerH3);
    }

    #[test]
    fn compatible_identifies_raspberry_pi() {
        let info = parse_base_compatible("raspberrypi,3-model-b\0brcm,bcm2837\0").unwrap();

        assert_eq!(info.model(), Model::RaspberryPi3B);
        assert_eq!(info.soc(), Soc::Bcm2837);
        assert!(info.is_raspberry_pi());
    }

    #[test]
    fn model_strips_revision() {
        let info = parse_base_model("Raspberry Pi 3 Model B Plus Rev 1.3\0").unwrap();
        assert_eq!(info.model(), Model::RaspberryPi3BPlus);

        let info = parse_base_model("Raspberry Pi Model B Rev 2.0").unwrap();
        assert_eq!(info.model(), Model::RaspberryPiBRev2);

        assert!(parse_base_model("Some Other Board").is_err());
    }
}
