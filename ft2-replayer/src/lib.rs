//! Per-tick effect engine (§4.3): advances `(order, row, tick)`, evaluates
//! every XM effect against a [`ft2_song::Song`] and its [`ft2_song::Channel`]
//! state, and hands off the result as a flat list of voice/MIDI updates for
//! a host (`ft2-engine`) to apply to its own [`ft2_mixer::Mixer`].
//!
//! This crate never touches the mixer directly beyond reading its
//! [`ft2_mixer::Rates`] for tick length in samples — keeping the tick
//! algorithm free of any audio-thread allocation or locking concerns.

mod effects;
mod envelope;
mod tables;
mod tick;
mod trigger;
mod voices;

pub use voices::VoiceUpdate;

use ft2_song::{Channel, Song};
use tables::PeriodTables;

/// Transport mode, mirrored from the source's `playMode` (§4.3 "Play
/// modes"). `Pattern`/`RecPattern` loop a single pattern instead of
/// advancing through the song's order list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlayMode {
    Idle,
    Edit,
    Song,
    Pattern,
    RecSong,
    RecPattern,
}

impl PlayMode {
    /// Whether `get_next_pos` should advance the song-order position on
    /// pattern-end/position-jump, as opposed to looping the same pattern.
    pub fn advances_order(self) -> bool {
        !matches!(self, PlayMode::Pattern | PlayMode::RecPattern)
    }
}

/// DAW-facing knobs that veto or redirect what would otherwise be
/// song-authored tempo control (§4.6 "Transport hint servicing").
#[derive(Debug, Clone, Copy)]
pub struct ReplayerConfig {
    /// When `false`, Fxx values below 32 (speed changes) are ignored —
    /// the host's own tempo/time-map governs row duration instead.
    pub allow_fxx_speed_changes: bool,
    /// When `Some`, overrides `song.speed` outright regardless of Fxx.
    pub locked_speed: Option<u16>,
    /// When `true`, Fxx values at/above 32 (BPM changes) are ignored — the
    /// host is driving BPM itself (DAW transport sync).
    pub sync_bpm_from_daw: bool,
}

impl Default for ReplayerConfig {
    fn default() -> Self {
        Self {
            allow_fxx_speed_changes: true,
            locked_speed: None,
            sync_bpm_from_daw: false,
        }
    }
}

/// One MIDI-out event a channel produced this tick, queued for the host to
/// forward to its `midi_out_queue` (§5) — this crate has no ring buffer of
/// its own.
#[derive(Debug, Clone, Copy)]
pub struct MidiEvent {
    pub channel: usize,
    pub kind: MidiEventKind,
    pub note: u8,
    pub velocity: u8,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MidiEventKind {
    NoteOn,
    NoteOff,
}

/// Errors a live-input call can hit; pattern-driven playback never produces
/// one (malformed pattern data is clamped/ignored per §7, never surfaced).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplayerError {
    InvalidChannel(usize),
}

impl core::fmt::Display for ReplayerError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            ReplayerError::InvalidChannel(ch) => write!(f, "channel index {ch} out of range"),
        }
    }
}

impl std::error::Error for ReplayerError {}

/// The replayer: a song, its live per-channel state, and the transport
/// cursor that walks it one tick at a time.
pub struct Replayer {
    pub song: Song,
    pub channels: Vec<Channel>,
    pub play_mode: PlayMode,
    pub config: ReplayerConfig,
    tables: PeriodTables,
    /// Pattern index looped by `PlayMode::Pattern`/`RecPattern`, set by
    /// [`Replayer::play_pattern`].
    looped_pattern: u16,
    midi_events: Vec<MidiEvent>,
}

impl Replayer {
    pub fn new(song: Song) -> Self {
        let num_channels = song.num_channels.max(1) as usize;
        Self {
            channels: (0..num_channels).map(|_| Channel::default()).collect(),
            song,
            play_mode: PlayMode::Idle,
            config: ReplayerConfig::default(),
            tables: PeriodTables::new(),
            looped_pattern: 0,
            midi_events: Vec::new(),
        }
    }

    /// Starts song playback from `order`/`row` (§6 "Transport: play").
    pub fn play(&mut self, mode: PlayMode, order: u16, row: u16) {
        self.song.song_pos = order.min(self.song.song_length.saturating_sub(1));
        self.set_position(self.song.song_pos, row);
        self.song.playing = true;
        self.play_mode = mode;
    }

    /// Loops a single pattern, ignoring the song's order list (§4.3 "Play
    /// modes": Pattern/RecPattern).
    pub fn play_pattern(&mut self, pattern: u16, start_row: u16) {
        self.looped_pattern = pattern;
        self.song.pattern = pattern;
        self.song.curr_num_rows = self
            .song
            .patterns
            .get(pattern as usize)
            .map(|p| p.num_rows as u16)
            .unwrap_or(64);
        self.song.row = start_row.min(self.song.curr_num_rows.saturating_sub(1));
        self.song.tick = 1;
        self.song.playing = true;
        self.play_mode = PlayMode::Pattern;
    }

    /// Stops playback; voices are left to the host to fade/silence via
    /// `ft2_mixer::VoicePool::fade_out_all` — the replayer owns no voices.
    pub fn stop(&mut self) {
        self.song.playing = false;
        self.play_mode = PlayMode::Idle;
    }

    /// Seeks to `order`/`row` without starting or stopping playback —
    /// used by a DAW scrubbing its timeline (§4.5 "time map lookup").
    pub fn set_position(&mut self, order: u16, row: u16) {
        self.song.song_pos = order.min(self.song.song_length.saturating_sub(1));
        self.song.pattern = self
            .song
            .pattern_index_at_order(self.song.song_pos)
            .unwrap_or(0) as u16;
        self.song.curr_num_rows = self
            .song
            .pattern_at_order(self.song.song_pos)
            .map(|p| p.num_rows as u16)
            .unwrap_or(64);
        self.song.row = row.min(self.song.curr_num_rows.saturating_sub(1));
        self.song.tick = 1;
        self.song.pattern_delay = 0;
        self.song.pattern_delay2 = 0;
        self.song.p_break_flag = false;
        self.song.pos_jump_flag = false;
    }

    pub fn set_bpm(&mut self, bpm: u16) {
        self.song.bpm = bpm.clamp(32, 255);
    }

    /// Resolves the period a direct sample trigger at `note` (1..=96) would
    /// use, given a sample's own `relative_note`/`finetune` — the same
    /// table lookup `trigger_note_internal` does, exposed for a caller
    /// (e.g. `ft2-engine::play_sample`) that triggers a sample directly
    /// rather than through the pattern-driven note path. Returns 0 for an
    /// out-of-range note.
    pub fn note_to_period(&self, note: u8, relative_note: i8, finetune: i8) -> i32 {
        let final_note = note as i32 + relative_note as i32;
        if final_note <= 0 || final_note >= 120 {
            return 0;
        }
        let finetune_idx = ((finetune as i32) >> 3) + 16;
        self.tables.period(self.song.linear_frequency_table, final_note - 1, finetune_idx) as i32
    }

    /// Live-input note trigger (jam/MIDI-in path, §6 "live input"),
    /// bypassing pattern data entirely. `mod_depth` (0..127, a mod-wheel
    /// reading) scales the instrument's own auto-vibrato amplitude/sweep at
    /// trigger time; `pitch_bend` is an initial period offset applied on
    /// top of the triggered note's period (a pitch-wheel reading already
    /// converted to period units by the caller).
    pub fn trigger_note(
        &mut self,
        channel: usize,
        note: u8,
        instr: u8,
        vol: u8,
        mod_depth: u8,
        pitch_bend: i16,
    ) -> Result<(), ReplayerError> {
        if channel >= self.channels.len() {
            return Err(ReplayerError::InvalidChannel(channel));
        }
        self.channels[channel].instrument_idx = instr;
        if vol > 0 {
            self.channels[channel].real_vol = vol.min(64);
            self.channels[channel].out_vol = vol.min(64);
        }
        self.trigger_note_internal(channel, note, 0, 0);
        self.trigger_instrument(channel);
        self.apply_mod_wheel(channel, mod_depth);
        self.apply_pitch_bend(channel, pitch_bend);
        Ok(())
    }

    pub fn release_note(&mut self, channel: usize) -> Result<(), ReplayerError> {
        if channel >= self.channels.len() {
            return Err(ReplayerError::InvalidChannel(channel));
        }
        self.key_off(channel);
        Ok(())
    }

    pub fn midi_events(&self) -> &[MidiEvent] {
        &self.midi_events
    }

    pub fn clear_midi_events(&mut self) {
        self.midi_events.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ft2_song::SourceFormat;

    #[test]
    fn new_replayer_has_one_channel_per_song_channel() {
        let mut song = Song::empty(SourceFormat::Xm);
        song.num_channels = 4;
        let rep = Replayer::new(song);
        assert_eq!(rep.channels.len(), 4);
    }

    #[test]
    fn trigger_note_on_invalid_channel_errs() {
        let song = Song::empty(SourceFormat::Xm);
        let mut rep = Replayer::new(song);
        assert!(rep.trigger_note(99, 49, 1, 64, 0, 0).is_err());
    }

    #[test]
    fn play_pattern_sets_pattern_play_mode() {
        let song = Song::empty(SourceFormat::Xm);
        let mut rep = Replayer::new(song);
        rep.play_pattern(0, 0);
        assert_eq!(rep.play_mode, PlayMode::Pattern);
        assert!(rep.song.playing);
    }
}
