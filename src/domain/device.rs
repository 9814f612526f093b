use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// A controllable immersion heater. The installation has exactly two.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Device {
    Main,
    Lucy,
}

impl Device {
    pub const ALL: [Device; 2] = [Device::Main, Device::Lucy];

    pub fn as_str(&self) -> &'static str {
        match self {
            Device::Main => "main",
            Device::Lucy => "lucy",
        }
    }
}

impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Device {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "main" => Ok(Device::Main),
            "lucy" => Ok(Device::Lucy),
            other => Err(format!("unknown device '{other}', expected 'main' or 'lucy'")),
        }
    }
}

/// A value held per immersion device.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PerDevice<T> {
    pub main: T,
    pub lucy: T,
}

impl<T> PerDevice<T> {
    pub fn get(&self, device: Device) -> &T {
        match device {
            Device::Main => &self.main,
            Device::Lucy => &self.lucy,
        }
    }

    pub fn get_mut(&mut self, device: Device) -> &mut T {
        match device {
            Device::Main => &mut self.main,
            Device::Lucy => &mut self.lucy,
        }
    }

    pub fn map<U>(&self, mut f: impl FnMut(Device, &T) -> U) -> PerDevice<U> {
        PerDevice {
            main: f(Device::Main, &self.main),
            lucy: f(Device::Lucy, &self.lucy),
        }
    }

    pub fn any(&self, mut pred: impl FnMut(&T) -> bool) -> bool {
        pred(&self.main) || pred(&self.lucy)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn device_parses_case_insensitively() {
        assert_eq!("main".parse::<Device>().unwrap(), Device::Main);
        assert_eq!("LUCY".parse::<Device>().unwrap(), Device::Lucy);
        assert!("boiler".parse::<Device>().is_err());
    }

    #[test]
    fn per_device_lookup_matches_field() {
        let values = PerDevice { main: 1, lucy: 2 };
        assert_eq!(*values.get(Device::Main), 1);
        assert_eq!(*values.get(Device::Lucy), 2);
        assert!(values.any(|v| *v == 2));
    }
}
