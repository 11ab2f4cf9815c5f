//! Persisted engine configuration (§6 "Persistence").
//!
//! Grouped the way the source's `ft2_plugin_config_t` groups them (pattern
//! editor, DAW sync, audio/mixer, I/O routing, MIDI input, envelope
//! presets, user palette) but trimmed to what this façade actually reads:
//! UI-only fields the source carries for its own editor screens (disk
//! operation sort order, about-screen toggles, textbox/scrollbar state)
//! have no counterpart on this side of the façade and aren't carried here.

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use ft2_song::envelope::Envelope;
use std::io::Cursor;

use crate::error::ConfigError;

/// Current `Config` blob layout version; [`save`]/[`load`] reject anything
/// else outright rather than attempt a partial migration.
pub const CONFIG_VERSION: u32 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum Interpolation {
    None,
    Linear,
    Quadratic,
    Cubic,
    Sinc,
}

impl From<Interpolation> for ft2_interp::InterpMode {
    fn from(i: Interpolation) -> Self {
        match i {
            Interpolation::None => ft2_interp::InterpMode::None,
            Interpolation::Linear => ft2_interp::InterpMode::Linear,
            Interpolation::Quadratic => ft2_interp::InterpMode::Quadratic,
            Interpolation::Cubic => ft2_interp::InterpMode::Cubic,
            Interpolation::Sinc => ft2_interp::InterpMode::Sinc,
        }
    }
}

#[derive(Debug, Clone, Copy, serde::Serialize, serde::Deserialize)]
pub struct PatternEditorPrefs {
    pub stretch: bool,
    pub hex_row_numbers: bool,
    pub show_vol_column: bool,
    pub show_chan_numbers: bool,
    pub accidentals_flat: bool,
    pub line_light_step: u8,
}

impl Default for PatternEditorPrefs {
    fn default() -> Self {
        Self {
            stretch: false,
            hex_row_numbers: false,
            show_vol_column: true,
            show_chan_numbers: true,
            accidentals_flat: false,
            line_light_step: 4,
        }
    }
}

/// DAW-sync toggles and the values to fall back to when a toggle is
/// disabled mid-playback (`savedSpeed`/`savedBpm` in the source).
#[derive(Debug, Clone, Copy, serde::Serialize, serde::Deserialize)]
pub struct DawSyncConfig {
    pub sync_transport_from_daw: bool,
    pub sync_bpm_from_daw: bool,
    pub sync_position_from_daw: bool,
    pub allow_fxx_speed_changes: bool,
    pub locked_speed: u16,
    pub saved_speed: u16,
    pub saved_bpm: u16,
}

impl Default for DawSyncConfig {
    fn default() -> Self {
        Self {
            sync_transport_from_daw: true,
            sync_bpm_from_daw: true,
            sync_position_from_daw: true,
            allow_fxx_speed_changes: true,
            locked_speed: 6,
            saved_speed: 6,
            saved_bpm: 125,
        }
    }
}

#[derive(Debug, Clone, Copy, serde::Serialize, serde::Deserialize)]
pub struct MidiInputConfig {
    pub enabled: bool,
    pub all_channels: bool,
    pub channel: u8,
    pub transpose: i8,
    pub velocity_sensitivity: u8,
    pub record_velocity: bool,
    pub record_pitch_bend: bool,
    pub mod_depth_range: u8,
    pub bend_range: u8,
    pub trigger_patterns: bool,
}

impl Default for MidiInputConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            all_channels: true,
            channel: 1,
            transpose: 0,
            velocity_sensitivity: 100,
            record_velocity: true,
            record_pitch_bend: true,
            mod_depth_range: 15,
            bend_range: 2,
            trigger_patterns: false,
        }
    }
}

/// One of the engine's 6 built-in envelope presets (§6), recreated from
/// [`Envelope`]'s own point/sustain/loop fields rather than a flat
/// point-array-plus-flags struct, keeping one representation of an
/// envelope's shape instead of two.
#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize)]
pub struct EnvelopePreset {
    pub volume: Envelope,
    pub panning: Envelope,
    pub fadeout: u16,
    pub auto_vibrato: ft2_song::instrument::AutoVibrato,
}

/// The full persisted blob (§6 "Persistence"). `save`/`load` frame it with
/// a `u32` version the way the source prefixes its raw struct copy, but the
/// body itself is `serde_json` rather than a `memcpy`'d C struct — the
/// struct's shape is free to evolve across versions without corrupting
/// bytes a future reader doesn't expect.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct Config {
    pub pattern_editor: PatternEditorPrefs,
    pub daw_sync: DawSyncConfig,
    pub interpolation: Interpolation,
    pub volume_ramp: bool,
    pub boost_level: u8,
    pub master_vol: u16,
    pub channel_routing: Vec<u8>,
    pub channel_to_main: Vec<bool>,
    pub midi_input: MidiInputConfig,
    pub envelope_presets: [EnvelopePreset; 6],
    pub user_palette: [[u8; 3]; 16],
}

impl Default for Config {
    fn default() -> Self {
        Self {
            pattern_editor: PatternEditorPrefs::default(),
            daw_sync: DawSyncConfig::default(),
            interpolation: Interpolation::Sinc,
            volume_ramp: true,
            boost_level: 8,
            master_vol: 256,
            channel_routing: (0..ft2_song::pattern::MAX_CHANNELS as u8)
                .map(|ch| ch % ft2_mixer::NUM_BUSES as u8)
                .collect(),
            channel_to_main: vec![true; ft2_song::pattern::MAX_CHANNELS],
            midi_input: MidiInputConfig::default(),
            envelope_presets: Default::default(),
            user_palette: [[32, 32, 32]; 16],
        }
    }
}

impl Config {
    /// `u32 version` followed by the `serde_json`-encoded body (§6).
    pub fn save(&self) -> Vec<u8> {
        let mut out = Vec::new();
        out.write_u32::<LittleEndian>(CONFIG_VERSION).expect("write to Vec never fails");
        serde_json::to_writer(&mut out, self).expect("Config serializes infallibly");
        out
    }

    pub fn load(bytes: &[u8]) -> Result<Config, ConfigError> {
        let mut cursor = Cursor::new(bytes);
        let version = cursor.read_u32::<LittleEndian>().map_err(|_| ConfigError::Truncated)?;
        if version != CONFIG_VERSION {
            return Err(ConfigError::UnsupportedVersion(version));
        }
        let body = &bytes[cursor.position() as usize..];
        serde_json::from_slice(body).map_err(ConfigError::Malformed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_through_save_and_load() {
        let mut cfg = Config::default();
        cfg.boost_level = 16;
        cfg.master_vol = 200;
        cfg.interpolation = Interpolation::Cubic;

        let bytes = cfg.save();
        let restored = Config::load(&bytes).unwrap();
        assert_eq!(restored.boost_level, 16);
        assert_eq!(restored.master_vol, 200);
        assert_eq!(restored.interpolation, Interpolation::Cubic);
    }

    #[test]
    fn rejects_unknown_version() {
        let mut bytes = Config::default().save();
        bytes[0] = 99;
        match Config::load(&bytes) {
            Err(ConfigError::UnsupportedVersion(99)) => {}
            other => panic!("expected UnsupportedVersion(99), got {other:?}"),
        }
    }

    #[test]
    fn rejects_truncated_blob() {
        let err = Config::load(&[0, 1]).unwrap_err();
        assert!(matches!(err, ConfigError::Truncated));
    }
}
