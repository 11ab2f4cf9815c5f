//! Song data model: samples (via [`ft2_sample`]), instruments, patterns and
//! the per-channel replayer state they're played through.

pub mod channel;
pub mod envelope;
pub mod instrument;
pub mod note;
pub mod pattern;
pub mod song;

pub use channel::{Channel, ChannelStatus, EffectMemory, SampleId};
pub use envelope::{Envelope, EnvelopePoint, MAX_ENVELOPE_POINTS};
pub use instrument::{
    AutoVibrato, AutoVibratoWaveform, Instrument, MidiOut, MAX_SAMPLES_PER_INSTRUMENT,
    NOTE_SAMPLE_MAP_LEN,
};
pub use note::{Note, NOTE_MAX, NOTE_MIN, NOTE_NONE, NOTE_OFF};
pub use pattern::{Pattern, MAX_CHANNELS, MAX_PATTERN_ROWS};
pub use song::{Song, SourceFormat, MAX_ORDERS};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_song_has_no_patterns() {
        let song = Song::empty(SourceFormat::Xm);
        assert_eq!(song.patterns.len(), 0);
        assert!(song.linear_frequency_table);
    }

    #[test]
    fn mod_song_defaults_to_amiga_periods() {
        let song = Song::empty(SourceFormat::Mod);
        assert!(!song.linear_frequency_table);
    }

    #[test]
    fn channel_status_bits_combine() {
        let s = ChannelStatus::UPDATE_VOL | ChannelStatus::TRIGGER_VOICE;
        assert!(s.contains(ChannelStatus::UPDATE_VOL));
        assert!(s.contains(ChannelStatus::TRIGGER_VOICE));
        assert!(!s.contains(ChannelStatus::UPDATE_PAN));
    }

    #[test]
    fn channel_default_is_silent_centered() {
        let ch = Channel::default();
        assert_eq!(ch.out_vol, 0);
        assert_eq!(ch.out_pan, 128);
        assert_eq!(ch.status, ChannelStatus::empty());
    }

    #[test]
    fn instrument_generation_bumps_on_replace() {
        let mut inst = Instrument::default();
        assert_eq!(inst.generation(0), 0);
        inst.samples.push(ft2_sample::Sample::default());
        inst.replace_sample(0, ft2_sample::Sample::default());
        assert_eq!(inst.generation(0), 1);
    }
}
