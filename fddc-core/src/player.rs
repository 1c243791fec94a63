//! The top-level MIDI byte-stream parser loop.

use crate::allocator::Allocator;
use crate::controller::EventSource;
use log::{debug, warn};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Drum channel; events on it are dropped here too, so live input is
/// filtered the same way file input is filtered by the pacer.
const DRUM_CHANNEL: u8 = 9;

/// Runs the parser loop until end-of-track, the source closes, or `running`
/// is cleared (by a SIGINT handler, typically).
pub fn run<S: EventSource>(source: &mut S, allocator: &mut Allocator, running: &Arc<AtomicBool>) {
    source.start();

    while running.load(Ordering::Acquire) {
        let Some(status) = source.read_byte() else {
            break;
        };

        match status & 0xF0 {
            0x90 => {
                let (Some(note), Some(_vel)) = (source.read_byte(), source.read_byte()) else {
                    break;
                };
                let channel = status & 0x0F;
                if channel != DRUM_CHANNEL {
                    allocator.play_note(note, channel);
                }
            }
            0x80 => {
                let (Some(note), Some(_vel)) = (source.read_byte(), source.read_byte()) else {
                    break;
                };
                let channel = status & 0x0F;
                if channel != DRUM_CHANNEL {
                    allocator.stop_note(note, channel);
                }
            }
            _ if status == 0xFF => {
                let Some(meta_type) = source.read_byte() else {
                    break;
                };
                if meta_type == 0x2F {
                    let Some(_len) = source.read_byte() else {
                        break;
                    };
                    debug!("end of track");
                    break;
                }
            }
            _ => {
                warn!("unrecognized status byte {status:#04x}, ignoring");
            }
        }
    }

    allocator.purge_all();
    source.close();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::drive::DEFAULT_TRACK_LIMIT;
    use crate::gpio::SimGpio;
    use crate::pulse::PulseGenerator;
    use std::collections::VecDeque;

    struct ByteSource(VecDeque<u8>);

    impl EventSource for ByteSource {
        fn read_byte(&mut self) -> Option<u8> {
            self.0.pop_front()
        }
    }

    fn allocator(n: usize) -> Allocator {
        let mut gpio = SimGpio::new();
        let pinout: Vec<(u8, u8)> = (0..n as u8).map(|i| (i * 2, i * 2 + 1)).collect();
        let (_gen, drives) = PulseGenerator::new(&mut gpio, &pinout, DEFAULT_TRACK_LIMIT)
            .unwrap_or_else(|_| unreachable!());
        Allocator::new(drives)
    }

    #[test]
    fn stops_on_end_of_track() {
        let mut source = ByteSource(VecDeque::from(vec![
            0x90, 60, 100, 0xFF, 0x2F, 0x00,
        ]));
        let mut alloc = allocator(2);
        let running = Arc::new(AtomicBool::new(true));
        run(&mut source, &mut alloc, &running);
        // purge_all should have released everything
        assert_eq!(alloc.free_count(), 2);
    }

    #[test]
    fn ignores_drum_channel() {
        let mut source = ByteSource(VecDeque::from(vec![
            0x99, 60, 100, 0xFF, 0x2F, 0x00,
        ]));
        let mut alloc = allocator(2);
        let running = Arc::new(AtomicBool::new(true));
        run(&mut source, &mut alloc, &running);
        assert_eq!(alloc.free_count(), 2);
    }

    #[test]
    fn unrecognized_status_is_ignored_not_fatal() {
        let mut source = ByteSource(VecDeque::from(vec![0xA0, 1, 2, 0xFF, 0x2F, 0x00]));
        let mut alloc = allocator(2);
        let running = Arc::new(AtomicBool::new(true));
        run(&mut source, &mut alloc, &running);
        assert_eq!(alloc.free_count(), 2);
    }
}
