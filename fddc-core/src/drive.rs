//! Per-drive state.
//!
//! Each drive is split into two parts that live on opposite sides of the
//! real-time boundary (see the concurrency notes in the generator module):
//!
//! - [`Drive`] is the shared handle: pin numbers (fixed at setup) plus the
//!   two atomically-published fields the allocator writes and the generator
//!   reads, `half_period_us` and `active`.
//! - `DriveState`, owned exclusively by the pulse generator thread, tracks
//!   head position, accumulated phase and travel direction - never touched
//!   by the allocator.

use log::error;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

/// Direction the drive head is currently stepping.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepDirection {
    Forward,
    Reverse,
}

/// The shared half of a drive record: immutable pin assignment plus the
/// fields the allocator publishes to the generator.
pub struct Drive {
    pub id: usize,
    pub step_pin: u8,
    pub dir_pin: u8,

    half_period_us: AtomicU64,
    active: AtomicBool,
}

impl Drive {
    pub fn new(id: usize, step_pin: u8, dir_pin: u8) -> Self {
        Self {
            id,
            step_pin,
            dir_pin,
            half_period_us: AtomicU64::new(0),
            active: AtomicBool::new(false),
        }
    }

    /// Called by the allocator to start (or change the pitch of) this drive.
    pub fn activate(&self, half_period_us: u64) {
        self.half_period_us.store(half_period_us, Ordering::Release);
        self.active.store(true, Ordering::Release);
    }

    /// Called by the allocator to silence this drive.
    pub fn deactivate(&self) {
        self.active.store(false, Ordering::Release);
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    pub fn half_period_us(&self) -> u64 {
        self.half_period_us.load(Ordering::Acquire)
    }
}

/// Generator-private stepping state for one drive.
///
/// Amount of tracks a head may travel from the origin before the generator
/// reverses direction, matching the reference drive's 80-track travel.
pub const DEFAULT_TRACK_LIMIT: i32 = 80;

pub(crate) struct DriveState {
    id: usize,
    elapsed_us: u64,
    position: i32,
    direction: StepDirection,
    track_limit: i32,
}

impl DriveState {
    pub(crate) fn new(id: usize, track_limit: i32) -> Self {
        Self {
            id,
            elapsed_us: 0,
            position: 0,
            direction: StepDirection::Forward,
            track_limit,
        }
    }

    pub(crate) fn position(&self) -> i32 {
        self.position
    }

    pub(crate) fn direction(&self) -> StepDirection {
        self.direction
    }

    /// Advances the local clock by `tick_us` against `shared`'s published
    /// half-period and steps the head if one has elapsed. Returns `true` if
    /// a step edge was emitted.
    pub(crate) fn tick(&mut self, shared: &Drive, tick_us: u64) -> bool {
        if !shared.is_active() {
            self.elapsed_us = 0;
            return false;
        }

        let half_period = shared.half_period_us();
        if half_period == 0 {
            return false;
        }

        self.elapsed_us += tick_us;
        if self.elapsed_us >= half_period {
            self.elapsed_us -= half_period;
            self.step();
            true
        } else {
            false
        }
    }

    /// Emits one step edge, advancing position and reversing direction at
    /// the track limit.
    fn step(&mut self) {
        match self.direction {
            StepDirection::Forward => {
                if self.position + 1 > self.track_limit {
                    error!("drive {}: head at track limit, reversing", self.id);
                    self.direction = StepDirection::Reverse;
                    self.position -= 1;
                } else {
                    self.position += 1;
                }
            }
            StepDirection::Reverse => {
                if self.position - 1 < -self.track_limit {
                    error!("drive {}: head at track limit, reversing", self.id);
                    self.direction = StepDirection::Forward;
                    self.position += 1;
                } else {
                    self.position -= 1;
                }
            }
        }
    }

    /// Homes the head back to position 0, used at startup/shutdown.
    pub(crate) fn purge(&mut self) {
        self.direction = StepDirection::Reverse;
        while self.position != 0 {
            self.step();
        }
        self.elapsed_us = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn inactive_drive_does_not_step() {
        let shared = Drive::new(0, 1, 2);
        let mut state = DriveState::new(0, DEFAULT_TRACK_LIMIT);
        assert!(!state.tick(&shared, 1_000_000));
    }

    #[test]
    fn active_drive_steps_after_half_period() {
        let shared = Drive::new(0, 1, 2);
        shared.activate(100);
        let mut state = DriveState::new(0, DEFAULT_TRACK_LIMIT);
        assert!(!state.tick(&shared, 50));
        assert!(state.tick(&shared, 50));
        assert_eq!(state.position(), 1);
    }

    #[test]
    fn phase_is_preserved_across_ticks() {
        let shared = Drive::new(0, 1, 2);
        shared.activate(100);
        let mut state = DriveState::new(0, DEFAULT_TRACK_LIMIT);
        let mut steps = 0;
        for _ in 0..1000 {
            if state.tick(&shared, 30) {
                steps += 1;
            }
        }
        // 1000 * 30us = 30000us of elapsed time / 100us half-period = 300 steps
        assert_eq!(steps, 300);
    }

    #[test]
    fn reverses_at_track_limit() {
        let shared = Drive::new(0, 1, 2);
        shared.activate(10);
        let mut state = DriveState::new(0, 2);
        for _ in 0..10 {
            state.tick(&shared, 10);
        }
        assert!(state.position() <= 2 && state.position() >= -2);
    }

    #[test]
    fn deactivation_resets_phase() {
        let shared = Drive::new(0, 1, 2);
        shared.activate(100);
        let mut state = DriveState::new(0, DEFAULT_TRACK_LIMIT);
        state.tick(&shared, 90);
        shared.deactivate();
        assert!(!state.tick(&shared, 5));
        shared.activate(100);
        // phase was reset, so another 90us shouldn't trip a step yet
        assert!(!state.tick(&shared, 90));
    }

    #[test]
    fn purge_homes_to_zero() {
        let shared = Drive::new(0, 1, 2);
        shared.activate(10);
        let mut state = DriveState::new(0, DEFAULT_TRACK_LIMIT);
        for _ in 0..50 {
            state.tick(&shared, 10);
        }
        assert_ne!(state.position(), 0);
        state.purge();
        assert_eq!(state.position(), 0);
    }
}
