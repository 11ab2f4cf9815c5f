//! Patterns: a dense `rows × num_channels` grid of [`Note`]s.

use crate::note::Note;

pub const MAX_CHANNELS: usize = 32;
pub const MAX_PATTERN_ROWS: u16 = 256;

#[derive(Debug, Clone)]
pub struct Pattern {
    num_rows: u16,
    num_channels: u8,
    /// Row-major: `cells[row * num_channels + channel]`. Always allocated
    /// to the song's full channel width, even for channels the pattern
    /// doesn't use musically — FT2 patterns are always full-width.
    cells: Vec<Note>,
}

impl Pattern {
    pub fn new(num_rows: u16, num_channels: u8) -> Self {
        let num_rows = num_rows.clamp(1, MAX_PATTERN_ROWS);
        Self {
            num_rows,
            num_channels,
            cells: vec![Note::default(); num_rows as usize * num_channels as usize],
        }
    }

    pub fn num_rows(&self) -> u16 {
        self.num_rows
    }

    pub fn num_channels(&self) -> u8 {
        self.num_channels
    }

    #[inline]
    pub fn get(&self, row: u16, channel: u8) -> Option<&Note> {
        if row >= self.num_rows || channel >= self.num_channels {
            return None;
        }
        self.cells
            .get(row as usize * self.num_channels as usize + channel as usize)
    }

    #[inline]
    pub fn set(&mut self, row: u16, channel: u8, note: Note) {
        if row >= self.num_rows || channel >= self.num_channels {
            return;
        }
        let idx = row as usize * self.num_channels as usize + channel as usize;
        self.cells[idx] = note;
    }
}
