//! PPQ <-> `(song_pos, row, loop_state)` index for DAW transport sync.
//!
//! The map is BPM-invariant: one FT2 tick is always `1/24` PPQ (`1 tick =
//! 2.5/bpm sec`, `1 beat = 60/bpm sec`, BPM cancels). Built by a dry run that
//! walks the song with the same control-flow rules the replayer uses, but
//! never touches channel/voice state.

use ft2_song::song::Song;

/// Maximum entries recorded before a dry-run build gives up (infinite-loop
/// backstop, independent of the position-visited bitset below).
pub const MAX_ENTRIES: usize = 65536;

/// Maximum song positions scanned before a dry-run build gives up.
pub const MAX_POSITIONS: usize = 512;

/// PPQ contributed by a single tick: `2.5/60`.
pub const PPQ_PER_TICK: f64 = 1.0 / 24.0;

/// Knobs the time-map builder needs that aren't part of the song itself.
#[derive(Debug, Clone, Copy)]
pub struct TimeMapConfig {
    /// Whether Fxx (param < 0x20) is allowed to change the dry-run speed.
    pub allow_fxx_speed_changes: bool,
    /// Speed used for the whole dry run when Fxx changes are vetoed.
    pub locked_speed: u16,
}

impl Default for TimeMapConfig {
    fn default() -> Self {
        Self {
            allow_fxx_speed_changes: true,
            locked_speed: 6,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TimeMapEntry {
    pub ppq_position: f64,
    pub song_pos: u16,
    pub row: u16,
    pub loop_counter: u8,
    pub loop_start_row: u16,
}

/// Sorted (by `ppq_position`) index built from a single dry run of the song.
#[derive(Debug, Default)]
pub struct TimeMap {
    entries: Vec<TimeMapEntry>,
    total_ppq: f64,
    valid: bool,
}

impl TimeMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_valid(&self) -> bool {
        self.valid
    }

    pub fn total_ppq(&self) -> f64 {
        self.total_ppq
    }

    pub fn entries(&self) -> &[TimeMapEntry] {
        &self.entries
    }

    /// Marks the map stale; the next [`TimeMap::lookup`] rebuilds it.
    pub fn invalidate(&mut self) {
        self.valid = false;
    }

    /// Re-scans `song` and replaces the index in place.
    pub fn build(&mut self, song: &Song, config: &TimeMapConfig) {
        self.entries.clear();
        self.total_ppq = 0.0;
        self.valid = false;
        self.entries.reserve(1024);

        let mut speed: u16 = if config.allow_fxx_speed_changes {
            if song.initial_speed > 0 {
                song.initial_speed
            } else {
                6
            }
        } else {
            config.locked_speed
        };

        let mut current_ppq = 0.0f64;
        let mut next_row_start: u16 = 0;
        let mut positions_scanned = 0usize;
        let mut visited = [false; 256];

        let mut song_pos: i32 = 0;
        while (song_pos as u16) < song.song_length && positions_scanned < MAX_POSITIONS {
            positions_scanned += 1;

            let Some(pattern) = song.pattern_at_order(song_pos as u16) else {
                song_pos += 1;
                continue;
            };
            let num_rows = if pattern.num_rows() > 0 {
                pattern.num_rows()
            } else {
                64
            };

            let mut start_row = next_row_start;
            next_row_start = 0;
            if start_row >= num_rows {
                start_row = 0;
            }

            let mut position_jump = false;
            let mut pattern_break = false;
            let mut jump_pos: u16 = 0;
            let mut break_row: u16 = 0;

            let mut loop_start_row: u16 = 0;
            let mut loop_counter: u8 = 0;

            let mut row = start_row;
            while row < num_rows {
                if self.entries.len() >= MAX_ENTRIES {
                    self.total_ppq = current_ppq;
                    self.valid = !self.entries.is_empty();
                    return;
                }
                self.entries.push(TimeMapEntry {
                    ppq_position: current_ppq,
                    song_pos: song_pos as u16,
                    row,
                    loop_counter,
                    loop_start_row,
                });

                let mut pattern_delay_processed = false;

                for ch in 0..song.num_channels {
                    let default_note = ft2_song::note::Note::default();
                    let note = pattern.get(row, ch).unwrap_or(&default_note);
                    let efx = note.efx;
                    let efx_data = note.efx_data;

                    match efx {
                        0x0F => {
                            if efx_data > 0 && efx_data < 0x20 && config.allow_fxx_speed_changes {
                                speed = efx_data as u16;
                            }
                        }
                        0x0B => {
                            if !position_jump {
                                position_jump = true;
                                jump_pos = efx_data as u16;
                            }
                        }
                        0x0D => {
                            if !pattern_break {
                                pattern_break = true;
                                break_row = ((efx_data >> 4) * 10 + (efx_data & 0x0F)) as u16;
                            }
                        }
                        0x0E => {
                            let efx_type = efx_data >> 4;
                            let efx_param = efx_data & 0x0F;
                            if efx_type == 0x06 {
                                if efx_param == 0 {
                                    loop_start_row = row;
                                } else if loop_counter == 0 {
                                    loop_counter = efx_param;
                                    row = loop_start_row.wrapping_sub(1);
                                } else {
                                    loop_counter -= 1;
                                    if loop_counter > 0 {
                                        row = loop_start_row.wrapping_sub(1);
                                    }
                                }
                            } else if efx_type == 0x0E && !pattern_delay_processed && efx_param > 0 {
                                current_ppq += efx_param as f64 * speed as f64 * PPQ_PER_TICK;
                                pattern_delay_processed = true;
                            }
                        }
                        _ => {}
                    }
                }

                current_ppq += speed as f64 * PPQ_PER_TICK;

                if position_jump || pattern_break {
                    if position_jump {
                        if jump_pos < song.song_length {
                            if visited[jump_pos as usize] && !pattern_break {
                                self.total_ppq = current_ppq;
                                self.valid = !self.entries.is_empty();
                                return;
                            }
                            visited[song_pos as usize & 0xFF] = true;
                            song_pos = jump_pos as i32 - 1;
                        } else {
                            self.total_ppq = current_ppq;
                            self.valid = !self.entries.is_empty();
                            return;
                        }
                    }
                    if pattern_break {
                        next_row_start = break_row;
                    }
                    break;
                }

                row = row.wrapping_add(1);
            }

            song_pos += 1;
        }

        self.total_ppq = current_ppq;
        self.valid = !self.entries.is_empty();
        tracing::debug!(
            entries = self.entries.len(),
            total_ppq = self.total_ppq,
            "rebuilt time map"
        );
    }

    /// Rebuilds (if stale) and resolves `ppq_position` to the position active
    /// at that point: `(song_pos, row, loop_counter, loop_start_row)`.
    pub fn lookup(
        &mut self,
        song: &Song,
        config: &TimeMapConfig,
        ppq_position: f64,
    ) -> Option<(u16, u16, u8, u16)> {
        if !self.valid {
            self.build(song, config);
        }
        if self.entries.is_empty() {
            return None;
        }

        let mut ppq = ppq_position.max(0.0);
        if self.total_ppq > 0.0 && ppq >= self.total_ppq {
            ppq %= self.total_ppq;
        }

        let mut left = 0usize;
        let mut right = self.entries.len() - 1;
        let mut result = 0usize;
        loop {
            let mid = left + (right - left) / 2;
            if self.entries[mid].ppq_position <= ppq {
                result = mid;
                if mid == self.entries.len() - 1 {
                    break;
                }
                left = mid + 1;
            } else {
                if mid == 0 {
                    break;
                }
                right = mid - 1;
            }
            if left > right {
                break;
            }
        }

        let e = self.entries[result];
        Some((e.song_pos, e.row, e.loop_counter, e.loop_start_row))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ft2_song::note::Note;
    use ft2_song::pattern::Pattern;
    use ft2_song::song::SourceFormat;

    fn basic_song() -> Song {
        let mut song = Song::empty(SourceFormat::Xm);
        song.num_channels = 1;
        song.initial_speed = 6;
        song.song_length = 2;
        song.orders[0] = 0;
        song.orders[1] = 1;

        let mut p0 = Pattern::new(64, 1);
        // Dxx at row 16 breaking to pattern 1 row 0.
        p0.set(16, 0, Note { efx: 0x0D, efx_data: 0x00, ..Default::default() });
        song.patterns.push(p0);

        let p1 = Pattern::new(64, 1);
        song.patterns.push(p1);

        song
    }

    #[test]
    fn entries_strictly_increase_in_ppq() {
        let song = basic_song();
        let mut map = TimeMap::new();
        map.build(&song, &TimeMapConfig::default());
        for w in map.entries().windows(2) {
            assert!(w[0].ppq_position < w[1].ppq_position);
        }
    }

    #[test]
    fn dxx_break_lands_on_next_pattern() {
        let song = basic_song();
        let mut map = TimeMap::new();
        let ppq_at_row16 = 16.0 * 6.0 / 24.0;
        let result = map
            .lookup(&song, &TimeMapConfig::default(), ppq_at_row16 + 0.01)
            .unwrap();
        assert_eq!(result, (1, 0, 0, 0));
    }

    #[test]
    fn lookup_wraps_modulo_total_ppq() {
        let song = basic_song();
        let mut map = TimeMap::new();
        map.build(&song, &TimeMapConfig::default());
        let total = map.total_ppq();
        let (pos_a, row_a, _, _) = map.lookup(&song, &TimeMapConfig::default(), 0.5).unwrap();
        let (pos_b, row_b, _, _) = map
            .lookup(&song, &TimeMapConfig::default(), total + 0.5)
            .unwrap();
        assert_eq!((pos_a, row_a), (pos_b, row_b));
    }

    #[test]
    fn e6x_loop_counter_exhausts() {
        let mut song = Song::empty(SourceFormat::Xm);
        song.num_channels = 1;
        song.initial_speed = 6;
        song.song_length = 1;
        song.orders[0] = 0;

        let mut p0 = Pattern::new(16, 1);
        p0.set(4, 0, Note { efx: 0x0E, efx_data: 0x60, ..Default::default() });
        p0.set(7, 0, Note { efx: 0x0E, efx_data: 0x62, ..Default::default() });
        song.patterns.push(p0);

        let mut map = TimeMap::new();
        map.build(&song, &TimeMapConfig::default());

        let last_iter_entry = map
            .entries()
            .iter()
            .rev()
            .find(|e| e.row == 8)
            .expect("row 8 of final pass recorded");
        assert_eq!(last_iter_entry.loop_counter, 0);
    }
}
