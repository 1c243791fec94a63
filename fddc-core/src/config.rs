//! JSON configuration: per-file channel maps and the drive pin-out.

use crate::error::FddcError;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

/// One file's worth of channel configuration, as found in `maps.json` under
/// that file's basename.
#[derive(Debug, Default, Deserialize, Serialize)]
pub struct FileChannelConfig {
    /// Channel number (as a string key) -> eligible drive indices.
    #[serde(default)]
    pub map: HashMap<String, Vec<usize>>,

    /// Channel number (as a string key) -> voices per note.
    #[serde(default)]
    pub req: HashMap<String, usize>,
}

/// Top-level `maps.json` contents: file basename -> its channel config.
pub type MapsConfig = HashMap<String, FileChannelConfig>;

pub fn load_maps(path: &Path) -> anyhow::Result<MapsConfig> {
    let bytes = std::fs::read(path)?;
    Ok(serde_json::from_slice(&bytes).map_err(FddcError::Config)?)
}

/// A pin-out entry: (step_pin, dir_pin). Loaded either from the compiled-in
/// default or a `--pinout` JSON override (an array of two-element arrays).
pub fn load_pinout(path: &Path) -> anyhow::Result<Vec<(u8, u8)>> {
    let bytes = std::fs::read(path)?;
    let raw: Vec<[u8; 2]> = serde_json::from_slice(&bytes).map_err(FddcError::Config)?;
    Ok(raw.into_iter().map(|[s, d]| (s, d)).collect())
}

/// Compiled-in default pin-out, used when no `--pinout` override is given.
pub fn default_pinout() -> Vec<(u8, u8)> {
    // (step_pin, dir_pin) per drive; arbitrary but documented default wiring
    // for a handful of drives on a Raspberry Pi GPIO header.
    vec![(17, 27), (22, 23), (24, 25), (5, 6)]
}

/// Parses a CLI `-m <channel>:<d1,d2,...>` argument.
pub fn parse_map_spec(spec: &str) -> Result<(u8, Vec<usize>), FddcError> {
    let bad = || FddcError::BadCliSpec(spec.to_string());
    let (chan, drives) = spec.split_once(':').ok_or_else(bad)?;
    let chan: u8 = chan.parse().map_err(|_| bad())?;
    if chan > 15 {
        return Err(FddcError::ChannelOutOfRange(chan));
    }
    let drives: Vec<usize> = drives
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::parse)
        .collect::<Result<_, _>>()
        .map_err(|_| bad())?;
    Ok((chan, drives))
}

/// Parses a CLI `-r <channel>:<n>` argument.
pub fn parse_req_spec(spec: &str) -> Result<(u8, usize), FddcError> {
    let bad = || FddcError::BadCliSpec(spec.to_string());
    let (chan, n) = spec.split_once(':').ok_or_else(bad)?;
    let chan: u8 = chan.parse().map_err(|_| bad())?;
    if chan > 15 {
        return Err(FddcError::ChannelOutOfRange(chan));
    }
    Ok((chan, n.parse().map_err(|_| bad())?))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_map_spec() {
        assert_eq!(parse_map_spec("1:0,2,3").unwrap(), (1, vec![0, 2, 3]));
    }

    #[test]
    fn parses_req_spec() {
        assert_eq!(parse_req_spec("2:3").unwrap(), (2, 3));
    }

    #[test]
    fn rejects_malformed_specs() {
        assert!(parse_map_spec("nope").is_err());
        assert!(parse_req_spec("nope").is_err());
    }

    #[test]
    fn rejects_out_of_range_channel() {
        assert!(matches!(
            parse_map_spec("16:0"),
            Err(FddcError::ChannelOutOfRange(16))
        ));
        assert!(matches!(
            parse_req_spec("99:1"),
            Err(FddcError::ChannelOutOfRange(99))
        ));
    }

    #[test]
    fn default_pinout_is_nonempty() {
        assert!(!default_pinout().is_empty());
    }
}
