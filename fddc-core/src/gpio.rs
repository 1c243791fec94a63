//! Pin-level hardware abstraction.
//!
//! The pulse generator calls [`GpioBackend::write`] at audio rate from its
//! dedicated real-time thread, so implementations must not allocate or block.

use crate::error::FddcError;

/// A backend capable of driving GPIO output pins.
pub trait GpioBackend: Send {
    /// Configures `pin` as a digital output. Called once per pin at startup.
    fn configure_output(&mut self, pin: u8) -> Result<(), FddcError>;

    /// Drives `pin` high (`true`) or low (`false`).
    fn write(&mut self, pin: u8, high: bool);
}

/// In-process simulated backend: records the last-driven level per pin.
///
/// Used for dry runs, tests, and whenever no `rppal`-backed hardware is
/// available.
#[derive(Debug, Default)]
pub struct SimGpio {
    levels: std::collections::HashMap<u8, bool>,
}

impl SimGpio {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the last level written to `pin`, or `false` if never written.
    pub fn level(&self, pin: u8) -> bool {
        self.levels.get(&pin).copied().unwrap_or(false)
    }
}

impl GpioBackend for SimGpio {
    fn configure_output(&mut self, pin: u8) -> Result<(), FddcError> {
        self.levels.insert(pin, false);
        Ok(())
    }

    fn write(&mut self, pin: u8, high: bool) {
        self.levels.insert(pin, high);
    }
}

#[cfg(feature = "rppal")]
pub mod rpi {
    use super::GpioBackend;
    use crate::error::FddcError;
    use rppal::gpio::{Gpio, OutputPin};
    use std::collections::HashMap;

    /// Raspberry Pi GPIO backend, backed by the `rppal` crate.
    pub struct RppalGpio {
        gpio: Gpio,
        pins: HashMap<u8, OutputPin>,
    }

    impl RppalGpio {
        pub fn new() -> Result<Self, FddcError> {
            let gpio = Gpio::new().map_err(|e| FddcError::GpioInit(0, e.to_string()))?;
            Ok(Self {
                gpio,
                pins: HashMap::new(),
            })
        }
    }

    impl GpioBackend for RppalGpio {
        fn configure_output(&mut self, pin: u8) -> Result<(), FddcError> {
            let out = self
                .gpio
                .get(pin)
                .map_err(|e| FddcError::GpioInit(pin, e.to_string()))?
                .into_output();
            self.pins.insert(pin, out);
            Ok(())
        }

        fn write(&mut self, pin: u8, high: bool) {
            if let Some(out) = self.pins.get_mut(&pin) {
                if high {
                    out.set_high();
                } else {
                    out.set_low();
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sim_gpio_tracks_last_level() {
        let mut gpio = SimGpio::new();
        gpio.configure_output(5).unwrap();
        assert!(!gpio.level(5));
        gpio.write(5, true);
        assert!(gpio.level(5));
        gpio.write(5, false);
        assert!(!gpio.level(5));
    }

    #[test]
    fn sim_gpio_unwritten_pin_is_low() {
        let gpio = SimGpio::new();
        assert!(!gpio.level(12));
    }
}
