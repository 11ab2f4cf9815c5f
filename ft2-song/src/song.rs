//! The song: orders, patterns, instruments and current playback position.

use crate::instrument::Instrument;
use crate::pattern::Pattern;

pub const MAX_ORDERS: usize = 256;

/// Source module format. Affects only how periods are interpreted (linear
/// vs Amiga) — effect commands are normalised to FT2's internal set by the
/// loader regardless of source format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceFormat {
    Xm,
    Mod,
    S3m,
}

pub struct Song {
    pub name: String,
    pub format: SourceFormat,
    pub orders: [u8; MAX_ORDERS],
    pub song_length: u16,
    pub song_loop_start: u16,
    pub num_channels: u8,
    pub initial_speed: u16,
    pub initial_bpm: u16,
    pub linear_frequency_table: bool,
    pub patterns: Vec<Pattern>,
    pub instruments: Vec<Instrument>,

    pub song_pos: u16,
    pub pattern: u16,
    pub row: u16,
    pub tick: u16,
    pub global_volume: u8,
    pub is_modified: bool,

    /// Current ticks/row and BPM; diverge from `initial_speed`/`initial_bpm`
    /// once Fxx/Bxx effects touch them mid-song.
    pub speed: u16,
    pub bpm: u16,
    /// Row count of the pattern currently playing, cached so `get_next_pos`
    /// doesn't re-resolve `orders[song_pos]` every row.
    pub curr_num_rows: u16,

    /// EEx pattern-delay staging: `pattern_delay` is set by the effect,
    /// copied into `pattern_delay2` (the live countdown) on the next row
    /// tick (`ft2_plugin_replayer.c::getNextPos`).
    pub pattern_delay: u8,
    pub pattern_delay2: u8,

    pub p_break_flag: bool,
    pub p_break_pos: u16,
    pub pos_jump_flag: bool,
    /// Set when Bxx targets a position at or past `song_length` while not
    /// in pattern-loop play mode; resolved to position 0 by `get_next_pos`.
    pub bxx_overflow: bool,

    pub playing: bool,

    /// `(song_pos, loop_counter, loop_start_row)` restored by a DAW seek
    /// mid-E6x-loop; consumed once by the next `patternLoop` (Qxx-less
    /// European sense: E6x) dispatch on the channel that set the loop.
    pub pattern_loop_state_set: bool,
    pub pattern_loop_counter: u8,
    pub pattern_loop_start_row: u16,

    pub playback_seconds: u32,
    pub playback_seconds_frac: u64,
}

impl Song {
    pub fn empty(format: SourceFormat) -> Self {
        Self {
            name: String::new(),
            format,
            orders: [0; MAX_ORDERS],
            song_length: 0,
            song_loop_start: 0,
            num_channels: 2,
            initial_speed: 6,
            initial_bpm: 125,
            linear_frequency_table: format == SourceFormat::Xm,
            patterns: Vec::new(),
            instruments: Vec::new(),
            song_pos: 0,
            pattern: 0,
            row: 0,
            tick: 0,
            global_volume: 64,
            is_modified: false,
            speed: 6,
            bpm: 125,
            curr_num_rows: 64,
            pattern_delay: 0,
            pattern_delay2: 0,
            p_break_flag: false,
            p_break_pos: 0,
            pos_jump_flag: false,
            bxx_overflow: false,
            playing: false,
            pattern_loop_state_set: false,
            pattern_loop_counter: 0,
            pattern_loop_start_row: 0,
            playback_seconds: 0,
            playback_seconds_frac: 0,
        }
    }

    pub fn pattern_index_at_order(&self, order: u16) -> Option<u8> {
        self.orders.get(order as usize).copied()
    }

    pub fn pattern_at_order(&self, order: u16) -> Option<&Pattern> {
        let idx = self.pattern_index_at_order(order)?;
        self.patterns.get(idx as usize)
    }

    pub fn instrument(&self, idx: u8) -> Option<&Instrument> {
        if idx == 0 {
            return None;
        }
        self.instruments.get(idx as usize - 1)
    }

    pub fn instrument_mut(&mut self, idx: u8) -> Option<&mut Instrument> {
        if idx == 0 {
            return None;
        }
        self.instruments.get_mut(idx as usize - 1)
    }
}
