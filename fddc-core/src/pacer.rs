//! Drift-compensated tick-to-wallclock scheduler for file-driven playback.
//!
//! Runs on its own background thread, reconstructing the wall-clock timing
//! of a tick-quantized [`Score`](crate::midi::Score) under changing tempo,
//! and emits raw MIDI bytes into a queue so the top-level parser loop is
//! oblivious to whether its bytes came from a file or a live device.

use crate::midi::{Score, ScoreEvent};
use crossbeam_channel::{Receiver, Sender};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Default tempo assumed before the first `SetTempo` meta event, in BPM.
const DEFAULT_BPM: f64 = 120.0;

pub struct Pacer {
    score: Score,
    running: Arc<AtomicBool>,
}

impl Pacer {
    pub fn new(score: Score, running: Arc<AtomicBool>) -> Self {
        Self { score, running }
    }

    /// Builds the byte queue and spawns the pacing thread. Returns the
    /// receiving end the controller reads from.
    pub fn start(self) -> Receiver<u8> {
        let (tx, rx) = crossbeam_channel::unbounded();
        std::thread::spawn(move || self.run(tx));
        rx
    }

    fn run(self, tx: Sender<u8>) {
        let ppqn = f64::from(self.score.ppqn.max(1));
        let mut seconds_per_tick = 60.0 / (ppqn * DEFAULT_BPM);
        let mut delay_accum = 0.0f64;
        let start_wall = Instant::now();
        let mut prev_tick = 0u32;

        for (tick, events) in &self.score.ticks {
            if !self.running.load(Ordering::Acquire) {
                return;
            }

            let ideal_delay = f64::from(tick - prev_tick) * seconds_per_tick;
            let drift = delay_accum - start_wall.elapsed().as_secs_f64();
            let sleep_for = (ideal_delay + drift).max(0.0);
            if sleep_for > 0.0 {
                std::thread::sleep(Duration::from_secs_f64(sleep_for));
            }
            delay_accum += ideal_delay;
            prev_tick = *tick;

            for event in events {
                match *event {
                    ScoreEvent::SetTempo { us_per_quarter } => {
                        let bpm = 60_000_000.0 / f64::from(us_per_quarter.max(1));
                        seconds_per_tick = 60.0 / (ppqn * bpm);
                    }
                    ScoreEvent::NoteOn {
                        note,
                        channel,
                        velocity,
                    } => {
                        let _ = tx.send(0x90 | (channel & 0x0F));
                        let _ = tx.send(note);
                        let _ = tx.send(velocity);
                    }
                    ScoreEvent::NoteOff { note, channel } => {
                        let _ = tx.send(0x80 | (channel & 0x0F));
                        let _ = tx.send(note);
                        let _ = tx.send(0);
                    }
                }
            }
        }

        let _ = tx.send(0xFF);
        let _ = tx.send(0x2F);
        let _ = tx.send(0x00);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn emits_end_of_track_after_last_event() {
        let score = Score {
            ppqn: 96,
            ticks: vec![(
                0,
                vec![ScoreEvent::NoteOn {
                    note: 60,
                    channel: 0,
                    velocity: 100,
                }],
            )],
        };
        let running = Arc::new(AtomicBool::new(true));
        let rx = Pacer::new(score, running).start();

        let mut bytes = Vec::new();
        for _ in 0..6 {
            bytes.push(rx.recv_timeout(Duration::from_secs(2)).unwrap());
        }
        assert_eq!(bytes, vec![0x90, 60, 100, 0xFF, 0x2F, 0x00]);
    }

    #[test]
    fn respects_tempo_change() {
        let score = Score {
            ppqn: 96,
            ticks: vec![
                (
                    0,
                    vec![ScoreEvent::SetTempo {
                        us_per_quarter: 500_000,
                    }],
                ),
                (
                    96,
                    vec![ScoreEvent::NoteOn {
                        note: 60,
                        channel: 0,
                        velocity: 100,
                    }],
                ),
            ],
        };
        let running = Arc::new(AtomicBool::new(true));
        let rx = Pacer::new(score, running).start();
        let t0 = Instant::now();
        let _ = rx.recv_timeout(Duration::from_secs(3)).unwrap();
        // one quarter note at 120bpm (500_000us/quarter) == 0.5s
        assert!(t0.elapsed() < Duration::from_millis(1500));
    }
}
