pub mod allocator;
pub mod config;
pub mod controller;
pub mod drive;
pub mod error;
pub mod gpio;
pub mod midi;
pub mod pacer;
pub mod player;
pub mod pulse;
pub mod wavelength;

#[cfg(feature = "visualize")]
pub mod visualizer;
