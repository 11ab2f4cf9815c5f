//! The main per-tick loop (`ft2_replayer_tick`), row dispatch (`getNewNote`)
//! and position advance (`getNextPos`), ported from the source's
//! `ft2_plugin_replayer.c`.

use ft2_song::{ChannelStatus, NOTE_OFF};

use crate::Replayer;

impl Replayer {
    /// Runs one tick of playback (§4.3 "Tick algorithm"). When the song
    /// isn't playing, only envelope/fadeout/auto-vibrato bookkeeping runs
    /// so live (jam) notes keep sounding correctly — the pattern cursor
    /// never moves (§4.6 "jam-only" path).
    pub fn tick(&mut self) {
        if !self.song.playing {
            for ch in 0..self.channels.len() {
                self.update_vol_pan_autovib(ch);
            }
            return;
        }

        self.advance_playback_clock();

        let mut tick_zero = false;
        self.song.tick = self.song.tick.saturating_sub(1);
        if self.song.tick == 0 {
            self.song.tick = self.song.speed;
            tick_zero = true;
        }

        let read_new_note = tick_zero && self.song.pattern_delay2 == 0;

        if read_new_note {
            for ch in 0..self.channels.len() {
                self.get_new_note(ch);
                self.update_vol_pan_autovib(ch);
            }
        } else {
            for ch in 0..self.channels.len() {
                self.handle_effects_tick_nonzero(ch);
                self.update_vol_pan_autovib(ch);
            }
        }

        self.get_next_pos();
    }

    /// Accumulates real elapsed seconds in a 35-bit fixed-point fraction,
    /// independent of the audio clock (`songTickDuration35fp`) — a host's
    /// position display, not the mixer, consumes `playback_seconds`.
    fn advance_playback_clock(&mut self) {
        let bpm = self.song.bpm;
        if !(32..=255).contains(&bpm) {
            return;
        }
        let duration_35fp = ((2.5 / bpm as f64) * (1u64 << 35) as f64).round() as u64;
        self.song.playback_seconds_frac += duration_35fp;
        if self.song.playback_seconds_frac >= 1u64 << 35 {
            self.song.playback_seconds_frac &= (1u64 << 35) - 1;
            self.song.playback_seconds += 1;
        }
    }

    /// One row's worth of tick-zero note dispatch (`getNewNote`).
    fn get_new_note(&mut self, ch_idx: usize) {
        let pattern = self.song.pattern;
        let row = self.song.row;
        let note = self
            .song
            .patterns
            .get(pattern as usize)
            .and_then(|p| p.get(row, ch_idx as u8))
            .copied()
            .unwrap_or_default();

        {
            let ch = &mut self.channels[ch_idx];
            ch.vol_column_vol = note.vol;

            // A running arpeggio (outPeriod != realPeriod from last row)
            // resets before this row's own effect (if any) takes over; same
            // for a vibrato/tremolo that this row's effect column doesn't
            // continue.
            if ch.efx == 0 {
                if ch.efx_data > 0 {
                    ch.out_period = ch.real_period;
                    ch.status.set(ChannelStatus::UPDATE_PERIOD);
                }
            } else if (ch.efx == 4 || ch.efx == 6) && note.efx != 4 && note.efx != 6 {
                ch.out_period = ch.real_period;
                ch.status.set(ChannelStatus::UPDATE_PERIOD);
            }

            ch.efx = note.efx;
            ch.efx_data = note.efx_data;
            ch.copy_of_instr_and_note = ((note.instr as u16) << 8) | note.note as u16;
        }

        if self.channels[ch_idx].channel_off {
            self.handle_more_effects_tick_zero(ch_idx, note.efx, note.efx_data);
            return;
        }

        let instr_num = note.instr;
        if instr_num > 0 {
            self.channels[ch_idx].instrument_idx = instr_num;
        }

        // E-Dx note delay (param 1..=15): the trigger is deferred to its
        // own tick by `note_delay` (§4.3 tick-non-zero EDx); param 0 isn't
        // a valid delay and falls through to normal processing.
        if note.efx == 0x0E && (0xD1..=0xDF).contains(&note.efx_data) {
            return;
        }

        if !(note.efx == 0x0E && note.efx_data == 0x90) {
            if (self.channels[ch_idx].vol_column_vol & 0xF0) == 0xF0 {
                let param = self.channels[ch_idx].vol_column_vol & 0x0F;
                if param > 0 {
                    self.channels[ch_idx].effects.tone_porta_speed = (param << 4).wrapping_mul(4);
                }
                self.prepare_portamento(ch_idx, note.note, instr_num);
                self.handle_effects_tick_zero(ch_idx);
                return;
            }

            if note.efx == 0x03 || note.efx == 0x05 {
                if note.efx != 0x05 && note.efx_data != 0 {
                    self.channels[ch_idx].effects.tone_porta_speed = note.efx_data.wrapping_mul(4);
                }
                self.prepare_portamento(ch_idx, note.note, instr_num);
                self.handle_effects_tick_zero(ch_idx);
                return;
            }

            if note.efx == 0x14 && note.efx_data == 0 {
                self.key_off(ch_idx);
                if instr_num > 0 {
                    self.reset_volumes(ch_idx);
                }
                self.handle_effects_tick_zero(ch_idx);
                return;
            }

            if note.note == 0 {
                if instr_num > 0 {
                    self.reset_volumes(ch_idx);
                    self.trigger_instrument(ch_idx);
                }
                self.handle_effects_tick_zero(ch_idx);
                return;
            }
        }

        if note.note == NOTE_OFF {
            self.key_off(ch_idx);
        } else {
            self.trigger_note_internal(ch_idx, note.note, note.efx, note.efx_data);
        }

        if instr_num > 0 {
            self.reset_volumes(ch_idx);
            if note.note != NOTE_OFF {
                self.trigger_instrument(ch_idx);
            }
        }

        self.handle_effects_tick_zero(ch_idx);
    }

    /// Advances `(row, song_pos)` (`getNextPos`), honouring pattern delay,
    /// Dxx/Bxx position changes and the song-loop-start wrap. Runs every
    /// tick but only takes effect on the row's last tick (`song.tick == 1`
    /// right after the countdown above) — see the module doc for why that's
    /// the correct moment, not tick zero.
    fn get_next_pos(&mut self) {
        if self.song.tick != 1 {
            return;
        }

        self.song.row += 1;

        if self.song.pattern_delay > 0 {
            self.song.pattern_delay2 = self.song.pattern_delay;
            self.song.pattern_delay = 0;
        }

        if self.song.pattern_delay2 > 0 {
            self.song.pattern_delay2 -= 1;
            if self.song.pattern_delay2 > 0 {
                self.song.row -= 1;
            }
        }

        if self.song.p_break_flag {
            self.song.p_break_flag = false;
            self.song.row = self.song.p_break_pos;
        }

        if self.song.row >= self.song.curr_num_rows || self.song.pos_jump_flag {
            self.song.row = self.song.p_break_pos;
            self.song.p_break_pos = 0;
            self.song.pos_jump_flag = false;

            if self.play_mode.advances_order() {
                if self.song.bxx_overflow {
                    self.song.song_pos = 0;
                    self.song.bxx_overflow = false;
                } else {
                    self.song.song_pos += 1;
                    if self.song.song_pos >= self.song.song_length {
                        self.song.song_pos = self.song.song_loop_start;
                    }
                }

                self.song.pattern = self
                    .song
                    .pattern_index_at_order(self.song.song_pos)
                    .unwrap_or(0) as u16;
                self.song.curr_num_rows = self
                    .song
                    .pattern_at_order(self.song.song_pos)
                    .map(|p| p.num_rows())
                    .unwrap_or(64);
            }

            if self.song.row >= self.song.curr_num_rows {
                self.song.row = 0;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ft2_song::{Note, Pattern, Song, SourceFormat};

    fn two_row_song() -> Song {
        let mut song = Song::empty(SourceFormat::Xm);
        song.num_channels = 1;
        song.song_length = 1;
        song.orders[0] = 0;
        song.speed = 2;
        song.curr_num_rows = 4;
        let mut p = Pattern::new(4, 1);
        p.set(0, 0, Note { note: 49, instr: 0, vol: 0, efx: 0, efx_data: 0 });
        song.patterns.push(p);
        song
    }

    #[test]
    fn tick_advances_row_after_speed_ticks() {
        let song = two_row_song();
        let mut rep = Replayer::new(song);
        rep.play(crate::PlayMode::Song, 0, 0);

        // tick=1 at start; speed=2 means 2 ticks per row.
        rep.tick(); // tick-- -> 0, wraps to speed(2), row-tick, reads row 0
        assert_eq!(rep.song.row, 0);
        rep.tick(); // tick-- -> 1, getNextPos advances row to 1
        assert_eq!(rep.song.row, 1);
    }

    #[test]
    fn stopped_replayer_only_runs_envelopes() {
        let song = two_row_song();
        let mut rep = Replayer::new(song);
        assert!(!rep.song.playing);
        let row_before = rep.song.row;
        rep.tick();
        assert_eq!(rep.song.row, row_before);
    }

    #[test]
    fn pattern_delay_extends_the_row() {
        let mut song = two_row_song();
        song.speed = 1;
        let mut p = Pattern::new(4, 1);
        p.set(0, 0, Note { note: 0, instr: 0, vol: 0, efx: 0x0E, efx_data: 0xE1 }); // EE1: delay row by 1 extra pass
        song.patterns[0] = p;
        let mut rep = Replayer::new(song);
        rep.play(crate::PlayMode::Song, 0, 0);

        rep.tick(); // reads row 0, EE1 sets pattern_delay=2 (hold row for 1 extra pass)
        assert_eq!(rep.song.row, 0);
        rep.tick(); // hold consumed: row advances to 1
        assert_eq!(rep.song.row, 1);
    }
}
