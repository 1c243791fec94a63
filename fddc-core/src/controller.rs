//! Event sources: live MIDI device bytes, or a file-driven pacer, behind one
//! interface so the top-level parser loop is oblivious to which it reads.

use crossbeam_channel::Receiver;
use log::info;
use std::fs::File;
use std::io::Read;
use std::path::Path;

/// A blocking byte-stream source of raw MIDI bytes.
pub trait EventSource {
    fn start(&mut self) {}
    fn read_byte(&mut self) -> Option<u8>;
    fn close(&mut self) {}
}

/// Reads raw bytes from a live MIDI device, falling back to `/dev/zero` (an
/// endless stream of status byte 0, silently ignored by the parser loop) if
/// the device file is absent, so the upper loop stays alive in dry-run mode.
pub struct LiveController {
    file: File,
}

impl LiveController {
    pub fn open(device_path: &Path) -> anyhow::Result<Self> {
        let file = File::open(device_path).or_else(|_| {
            info!(
                "MIDI device {} not found, falling back to /dev/zero",
                device_path.display()
            );
            File::open("/dev/zero")
        })?;
        Ok(Self { file })
    }
}

impl EventSource for LiveController {
    fn read_byte(&mut self) -> Option<u8> {
        let mut buf = [0u8; 1];
        self.file.read_exact(&mut buf).ok()?;
        Some(buf[0])
    }
}

/// Reads bytes produced by a [`Pacer`](crate::pacer::Pacer) running on a
/// background thread.
pub struct FileController {
    rx: Receiver<u8>,
}

impl FileController {
    pub fn new(rx: Receiver<u8>) -> Self {
        Self { rx }
    }
}

impl EventSource for FileController {
    fn read_byte(&mut self) -> Option<u8> {
        self.rx.recv().ok()
    }
}
