//! The voice allocator (FDDC): maps `(note, channel)` to drive indices.
//!
//! This is the single-writer owner of the free pool and in-use map; it runs
//! exclusively on the event-consumer thread (see the module-level
//! concurrency notes), so no locking is required here. The only concurrent
//! communication it performs is publishing `half_period_us`/`active` to the
//! shared [`Drive`] handles the pulse generator reads.

use crate::pulse::DriveBank;
use crate::wavelength::WavelengthTable;
use log::{debug, warn};
use std::collections::{HashMap, VecDeque};

/// Voice key: a sounding (note, channel) pair.
type VoiceKey = (u8, u8);

pub struct Allocator {
    bank: DriveBank,
    wavelengths: WavelengthTable,

    channel_map: HashMap<u8, Vec<usize>>,
    voices_per_note: HashMap<u8, usize>,

    free_pool: VecDeque<usize>,
    in_use: HashMap<VoiceKey, Vec<usize>>,
}

impl Allocator {
    pub fn new(bank: DriveBank) -> Self {
        let free_pool = (0..bank.drives.len()).collect();
        Self {
            bank,
            wavelengths: WavelengthTable::new(),
            channel_map: HashMap::new(),
            voices_per_note: HashMap::new(),
            free_pool,
            in_use: HashMap::new(),
        }
    }

    /// Installs the permitted drive set for `channel`. Channels without an
    /// explicit entry may use every drive (the default).
    pub fn set_channel_map(&mut self, channel: u8, drives: Vec<usize>) {
        self.channel_map.insert(channel, drives);
    }

    /// Installs the voice multiplier for `channel`. Defaults to 1.
    pub fn set_voices_per_note(&mut self, channel: u8, voices: usize) {
        self.voices_per_note.insert(channel, voices.max(1));
    }

    fn channel_eligible(&self, channel: u8, drive: usize) -> bool {
        match self.channel_map.get(&channel) {
            Some(allowed) => allowed.contains(&drive),
            None => true,
        }
    }

    fn voices_for(&self, channel: u8) -> usize {
        self.voices_per_note.get(&channel).copied().unwrap_or(1)
    }

    /// Picks and removes the first free drive eligible for `channel`, if any.
    fn take_free_drive(&mut self, channel: u8) -> Option<usize> {
        let pos = self
            .free_pool
            .iter()
            .position(|&d| self.channel_eligible(channel, d))?;
        self.free_pool.remove(pos)
    }

    /// Admits a NoteOn. Duplicate NoteOns for an already-sounding voice are
    /// tolerated as a no-op. If no eligible drive is free at all, the note is
    /// dropped silently; if only some of the requested voices can be
    /// satisfied, the note sounds with fewer voices than requested.
    pub fn play_note(&mut self, note: u8, channel: u8) {
        let key = (note, channel);
        if self.in_use.contains_key(&key) {
            debug!("note {note} ch {channel} already sounding, ignoring duplicate NoteOn");
            return;
        }

        let voices = self.voices_for(channel);
        let half_period = self.wavelengths.get(note);
        let mut claimed = Vec::with_capacity(voices);

        for _ in 0..voices {
            match self.take_free_drive(channel) {
                Some(drive) => {
                    self.bank.drives[drive].activate(half_period);
                    claimed.push(drive);
                }
                None => break,
            }
        }

        if claimed.is_empty() {
            warn!("note {note} ch {channel}: no free drive eligible, dropping");
            return;
        }
        if claimed.len() < voices {
            warn!(
                "note {note} ch {channel}: wanted {voices} voices, only got {}",
                claimed.len()
            );
        }

        self.in_use.insert(key, claimed);
    }

    /// Releases a sounding voice. Idempotent: releasing a voice that was
    /// never admitted (or already released) is a silent no-op.
    pub fn stop_note(&mut self, note: u8, channel: u8) {
        let key = (note, channel);
        let Some(drives) = self.in_use.remove(&key) else {
            return;
        };

        for drive in drives {
            self.bank.drives[drive].deactivate();
            self.free_pool.push_back(drive);
        }
    }

    /// Silences every sounding voice and homes every free drive. Intended
    /// for startup and end-of-track cleanup.
    pub fn purge_all(&mut self) {
        let keys: Vec<_> = self.in_use.keys().copied().collect();
        for (note, channel) in keys {
            self.stop_note(note, channel);
        }
        self.bank.request_purge();
    }

    pub fn free_count(&self) -> usize {
        self.free_pool.len()
    }

    pub fn in_use_count(&self) -> usize {
        self.in_use.values().map(Vec::len).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gpio::SimGpio;
    use crate::pulse::PulseGenerator;

    fn drives(n: usize) -> DriveBank {
        let mut gpio = SimGpio::new();
        let pinout: Vec<(u8, u8)> = (0..n as u8).map(|i| (i * 2, i * 2 + 1)).collect();
        let (_gen, bank) = PulseGenerator::new(&mut gpio, &pinout, 80).unwrap();
        bank
    }

    #[test]
    fn free_and_in_use_always_sum_to_total() {
        let total = 4;
        let mut alloc = Allocator::new(drives(total));
        alloc.play_note(60, 0);
        alloc.play_note(62, 0);
        assert_eq!(alloc.free_count() + alloc.in_use_count(), total);
        alloc.stop_note(60, 0);
        assert_eq!(alloc.free_count() + alloc.in_use_count(), total);
        alloc.play_note(64, 0);
        alloc.play_note(65, 0);
        alloc.play_note(67, 0);
        assert_eq!(alloc.free_count() + alloc.in_use_count(), total);
    }

    #[test]
    fn drops_note_when_out_of_drives() {
        let mut alloc = Allocator::new(drives(2));
        alloc.play_note(60, 0);
        alloc.play_note(62, 0);
        alloc.play_note(64, 0);
        assert_eq!(alloc.in_use_count(), 2);
    }

    #[test]
    fn duplicate_note_on_is_noop() {
        let mut alloc = Allocator::new(drives(2));
        alloc.play_note(60, 0);
        let used_before = alloc.in_use_count();
        alloc.play_note(60, 0);
        assert_eq!(alloc.in_use_count(), used_before);
    }

    #[test]
    fn stop_is_idempotent() {
        let mut alloc = Allocator::new(drives(2));
        alloc.stop_note(60, 0);
        alloc.play_note(60, 0);
        alloc.stop_note(60, 0);
        alloc.stop_note(60, 0);
        assert_eq!(alloc.free_count(), 2);
    }

    #[test]
    fn voice_multiplier_claims_multiple_drives() {
        let mut alloc = Allocator::new(drives(2));
        alloc.set_voices_per_note(0, 2);
        alloc.play_note(60, 0);
        assert_eq!(alloc.free_count(), 0);
        assert_eq!(alloc.in_use_count(), 2);
    }

    #[test]
    fn channel_map_restricts_eligible_drives() {
        let mut alloc = Allocator::new(drives(2));
        alloc.set_channel_map(1, vec![0]);
        alloc.set_channel_map(2, vec![1]);
        alloc.play_note(60, 1);
        alloc.play_note(60, 2);
        assert_eq!(alloc.in_use_count(), 2);
        assert_eq!(alloc.free_count(), 0);
    }

    #[test]
    fn play_then_stop_restores_free_pool_contents() {
        let mut alloc = Allocator::new(drives(3));
        let before = alloc.free_count();
        alloc.play_note(60, 0);
        alloc.stop_note(60, 0);
        assert_eq!(alloc.free_count(), before);
    }

    #[test]
    fn dispatched_half_period_matches_scaled_wavelength_table() {
        let bank = drives(2);
        let mut alloc = Allocator::new(bank.clone());
        alloc.play_note(60, 0);
        alloc.play_note(62, 0);
        let periods: Vec<u64> = bank.drives.iter().map(|d| d.half_period_us()).collect();
        assert!(periods.contains(&crate::wavelength::half_period_us(60)));
        assert!(periods.contains(&crate::wavelength::half_period_us(62)));
    }
}
