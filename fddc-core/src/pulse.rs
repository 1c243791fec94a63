//! The real-time pulse generator: one dedicated thread stepping every
//! active drive at its target half-period.
//!
//! Concurrency model: [`Drive`](crate::drive::Drive) (pins + the atomically
//! published `half_period_us`/`active` pair) is shared with the allocator via
//! `Arc`. The stepping state (`DriveState`: position, phase, direction) is
//! built and owned exclusively inside the generator thread's closure and is
//! never shared, matching the single-writer rule from the concurrency model.

use crate::drive::{Drive, DriveState};
use crate::gpio::GpioBackend;
use log::info;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

/// Nominal tick granularity of the generator loop, in microseconds.
pub const TICK_US: u64 = 1;

/// The shared drive array plus the request flag used to ask the generator
/// to home every currently-inactive drive (see [`Allocator::purge_all`]).
#[derive(Clone)]
pub struct DriveBank {
    pub drives: Arc<Vec<Drive>>,
    purge_requested: Arc<AtomicBool>,
}

impl DriveBank {
    /// Requests that the generator home every drive not currently sounding
    /// a note. Idempotent: a purge already pending stays pending.
    pub fn request_purge(&self) {
        self.purge_requested.store(true, Ordering::Release);
    }
}

/// Owns the shared drive handles and the background thread stepping them.
///
/// Dropping the generator (or calling [`stop`](Self::stop)) signals the
/// thread to drive all pins low before exiting, so a panic or early return
/// can never leave hardware energized.
pub struct PulseGenerator {
    bank: DriveBank,
    running: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
    track_limit: i32,
}

impl PulseGenerator {
    /// Builds drive handles from a pin-out list, configuring every pin as an
    /// output via `gpio`. Returns the generator and the shared drive bank
    /// the allocator will hold a clone of.
    pub fn new<G: GpioBackend>(
        gpio: &mut G,
        pinout: &[(u8, u8)],
        track_limit: i32,
    ) -> Result<(Self, DriveBank), crate::error::FddcError> {
        let mut drives = Vec::with_capacity(pinout.len());
        let mut seen_pins = std::collections::HashSet::new();
        for (idx, &(step_pin, dir_pin)) in pinout.iter().enumerate() {
            for pin in [step_pin, dir_pin] {
                if !seen_pins.insert(pin) {
                    return Err(crate::error::FddcError::PinCollision(pin, idx));
                }
            }
            gpio.configure_output(step_pin)?;
            gpio.configure_output(dir_pin)?;
            drives.push(Drive::new(idx, step_pin, dir_pin));
        }
        let bank = DriveBank {
            drives: Arc::new(drives),
            purge_requested: Arc::new(AtomicBool::new(false)),
        };
        Ok((
            Self {
                bank: bank.clone(),
                running: Arc::new(AtomicBool::new(false)),
                handle: None,
                track_limit,
            },
            bank,
        ))
    }

    /// Starts the generator loop on a dedicated thread. `gpio` is moved into
    /// the thread; it becomes the sole writer of pin state for the lifetime
    /// of the loop.
    pub fn start<G: GpioBackend + 'static>(&mut self, mut gpio: G) {
        if self.running.swap(true, Ordering::AcqRel) {
            return;
        }

        info!(
            "pulse generator starting, {} drives",
            self.bank.drives.len()
        );

        let running = Arc::clone(&self.running);
        let drives = Arc::clone(&self.bank.drives);
        let purge_requested = Arc::clone(&self.bank.purge_requested);
        let track_limit = self.track_limit;

        self.handle = Some(std::thread::spawn(move || {
            let mut states: Vec<DriveState> = drives
                .iter()
                .map(|d| DriveState::new(d.id, track_limit))
                .collect();

            while running.load(Ordering::Acquire) {
                if purge_requested.swap(false, Ordering::AcqRel) {
                    for (drive, state) in drives.iter().zip(states.iter_mut()) {
                        if !drive.is_active() {
                            state.purge();
                        }
                    }
                }

                for (drive, state) in drives.iter().zip(states.iter_mut()) {
                    if state.tick(drive, TICK_US) {
                        // Edge just emitted: drive the dir pin to match the
                        // (possibly just-reversed) direction, then pulse step.
                        let dir_high = matches!(
                            state.direction(),
                            crate::drive::StepDirection::Reverse
                        );
                        gpio.write(drive.dir_pin, dir_high);
                        gpio.write(drive.step_pin, true);
                        gpio.write(drive.step_pin, false);
                    }
                }
                std::thread::sleep(Duration::from_micros(TICK_US));
            }

            for drive in drives.iter() {
                gpio.write(drive.step_pin, false);
                gpio.write(drive.dir_pin, false);
            }
        }));
    }

    /// Signals the generator thread to stop and waits for it to exit.
    pub fn stop(&mut self) {
        self.running.store(false, Ordering::Release);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
        info!("pulse generator stopped");
    }
}

impl Drop for PulseGenerator {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gpio::SimGpio;

    #[test]
    fn new_configures_every_pin() {
        let mut gpio = SimGpio::new();
        let (gen, bank) = PulseGenerator::new(&mut gpio, &[(1, 2), (3, 4)], 80).unwrap();
        assert_eq!(bank.drives.len(), 2);
        drop(gen);
    }

    #[test]
    fn new_rejects_colliding_pins() {
        let mut gpio = SimGpio::new();
        let err = PulseGenerator::new(&mut gpio, &[(1, 2), (2, 3)], 80).unwrap_err();
        assert!(matches!(err, crate::error::FddcError::PinCollision(2, 1)));
    }

    #[test]
    fn start_then_stop_leaves_pins_low() {
        let mut setup_gpio = SimGpio::new();
        let (mut gen, bank) = PulseGenerator::new(&mut setup_gpio, &[(1, 2)], 80).unwrap();
        bank.drives[0].activate(50);
        let gpio = SimGpio::new();
        gen.start(gpio);
        std::thread::sleep(Duration::from_millis(5));
        gen.stop();
    }
}
