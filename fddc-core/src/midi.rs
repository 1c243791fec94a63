//! Standard MIDI file decoding into the tick-indexed event stream the pacer
//! consumes.
//!
//! Parsing itself is delegated to `midly`; this module only reshapes its
//! output into the three event kinds the core understands and merges all
//! tracks into one tick-ordered stream. Everything else in the file (pitch
//! bend, control change, sysex, other meta events) is dropped here, before
//! it ever reaches the allocator.

use midly::{MetaMessage, MidiMessage, Smf, Timing, TrackEventKind};

/// One musically meaningful event, already stripped of MIDI wire framing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScoreEvent {
    NoteOn { note: u8, channel: u8, velocity: u8 },
    NoteOff { note: u8, channel: u8 },
    SetTempo { us_per_quarter: u32 },
}

/// Sort priority within a single tick: NoteOff must release drives before
/// NoteOn claims them in the same tick (NoteOff < NoteOn < SetTempo).
fn sort_key(ev: &ScoreEvent) -> u8 {
    match ev {
        ScoreEvent::NoteOff { .. } => 0,
        ScoreEvent::NoteOn { .. } => 1,
        ScoreEvent::SetTempo { .. } => 2,
    }
}

/// A parsed score: pulses-per-quarter-note plus the merged, tick-ordered
/// event stream.
pub struct Score {
    pub ppqn: u16,
    /// `(tick, events)` pairs, sorted ascending by tick; within a tick,
    /// events are ordered by [`sort_key`].
    pub ticks: Vec<(u32, Vec<ScoreEvent>)>,
}

/// Drum channel, filtered out uniformly per the design notes.
const DRUM_CHANNEL: u8 = 9;

pub fn parse(bytes: &[u8]) -> anyhow::Result<Score> {
    let smf = Smf::parse(bytes)?;

    let ppqn = match smf.header.timing {
        Timing::Metrical(t) => t.as_int(),
        Timing::Timecode(fps, subframe) => {
            // Not a tick-based format; approximate ticks-per-quarter so
            // downstream tempo math still produces sane wall-clock timing.
            (fps.as_f32() * f32::from(subframe)) as u16
        }
    };

    let mut by_tick: std::collections::BTreeMap<u32, Vec<ScoreEvent>> =
        std::collections::BTreeMap::new();

    for track in &smf.tracks {
        let mut tick: u32 = 0;
        for event in track {
            tick += event.delta.as_int();
            let score_event = match &event.kind {
                TrackEventKind::Midi { channel, message } => {
                    let channel = channel.as_int();
                    if channel == DRUM_CHANNEL {
                        None
                    } else {
                        match *message {
                            MidiMessage::NoteOn { key, vel } if vel.as_int() > 0 => {
                                Some(ScoreEvent::NoteOn {
                                    note: key.as_int() as u8,
                                    channel,
                                    velocity: vel.as_int() as u8,
                                })
                            }
                            MidiMessage::NoteOn { key, .. } => Some(ScoreEvent::NoteOff {
                                note: key.as_int() as u8,
                                channel,
                            }),
                            MidiMessage::NoteOff { key, .. } => Some(ScoreEvent::NoteOff {
                                note: key.as_int() as u8,
                                channel,
                            }),
                            _ => None,
                        }
                    }
                }
                TrackEventKind::Meta(MetaMessage::Tempo(us_per_quarter)) => {
                    Some(ScoreEvent::SetTempo {
                        us_per_quarter: us_per_quarter.as_int(),
                    })
                }
                _ => None,
            };

            if let Some(ev) = score_event {
                by_tick.entry(tick).or_default().push(ev);
            }
        }
    }

    let ticks = by_tick
        .into_iter()
        .map(|(tick, mut events)| {
            events.sort_by_key(sort_key);
            (tick, events)
        })
        .collect();

    Ok(Score { ppqn, ticks })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sort_key_orders_off_before_on_before_tempo() {
        let tempo = ScoreEvent::SetTempo {
            us_per_quarter: 500_000,
        };
        let off = ScoreEvent::NoteOff {
            note: 60,
            channel: 0,
        };
        let on = ScoreEvent::NoteOn {
            note: 60,
            channel: 0,
            velocity: 100,
        };
        assert!(sort_key(&off) < sort_key(&on));
        assert!(sort_key(&on) < sort_key(&tempo));
    }
}
