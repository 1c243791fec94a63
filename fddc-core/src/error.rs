use thiserror::Error;

/// Fatal, caller-matchable errors raised during setup.
///
/// The real-time paths (pulse generator, voice allocator) never return
/// this type - allocation failure and unknown MIDI bytes are silent
/// drops by design, not errors.
#[derive(Error, Debug)]
pub enum FddcError {
    #[error("drive index {0} is out of range (have {1} drives configured)")]
    DriveOutOfRange(usize, usize),

    #[error("MIDI channel {0} is out of range (0..=15)")]
    ChannelOutOfRange(u8),

    #[error("pin {0} is already claimed by drive {1}")]
    PinCollision(u8, usize),

    #[error("failed to configure GPIO pin {0}: {1}")]
    GpioInit(u8, String),

    #[error("failed to parse channel map/req spec {0:?}")]
    BadCliSpec(String),

    #[error("config error: {0}")]
    Config(#[from] serde_json::Error),
}
