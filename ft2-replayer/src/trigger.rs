//! Note/instrument triggering: `triggerNote`, `triggerInstrument`, `keyOff`,
//! `resetVolumes`, `preparePortamento` and the period-quantising helper
//! `period2NotePeriod` the arpeggio/glissando effects lean on.

use ft2_song::channel::SampleId;
use ft2_song::{ChannelStatus, NOTE_OFF};

use crate::{MidiEvent, MidiEventKind, Replayer};

const MAX_PERIOD: i32 = 32000;

impl Replayer {
    /// `note == 0` reuses the channel's last note (Rxy/E9x retrigger);
    /// returns with no effect if there's nothing to reuse, mirroring the
    /// source's early-return rather than surfacing an error (§7).
    pub(crate) fn trigger_note_internal(&mut self, ch_idx: usize, note: u8, efx: u8, efx_data: u8) {
        let mut note = note;
        if note == 0 {
            note = self.channels[ch_idx].note;
            if note == 0 {
                return;
            }
        }
        note = note.min(96);
        self.channels[ch_idx].note = note;

        let instr_idx = self.channels[ch_idx].instrument_idx;
        let inst = self.song.instrument(instr_idx);

        let mut sample_snapshot = None;
        if let Some(ins) = inst {
            if let Some(smp_idx) = ins.sample_for_note(note) {
                self.channels[ch_idx].sample_id = Some(SampleId { instrument: instr_idx, sample: smp_idx });
                self.channels[ch_idx].sample_generation = ins.generation(smp_idx);
                sample_snapshot = ins.samples.get(smp_idx as usize).map(|s| (s.relative_note, s.volume, s.panning, s.finetune));
            } else {
                self.channels[ch_idx].sample_id = None;
            }
        } else {
            self.channels[ch_idx].sample_id = None;
        }

        if let Some((relative_note, volume, panning, finetune)) = sample_snapshot {
            let ch = &mut self.channels[ch_idx];
            ch.relative_note = relative_note;
            ch.old_vol = volume;
            ch.old_pan = panning;
            ch.finetune = if efx == 0x0E && (efx_data & 0xF0) == 0x50 {
                (((efx_data & 0x0F) as i32) * 16 - 128) as i8
            } else {
                finetune
            };
        }

        let final_note = note as i32 + self.channels[ch_idx].relative_note as i32;
        if final_note >= 120 {
            return;
        }
        if final_note != 0 {
            let finetune_idx = ((self.channels[ch_idx].finetune as i32) >> 3) + 16;
            let period = self
                .tables
                .period(self.song.linear_frequency_table, final_note - 1, finetune_idx) as i32;
            let ch = &mut self.channels[ch_idx];
            ch.out_period = period;
            ch.real_period = period;
        }

        let ch = &mut self.channels[ch_idx];
        ch.status.set(ChannelStatus::UPDATE_PERIOD);
        ch.status.set(ChannelStatus::UPDATE_VOL);
        ch.status.set(ChannelStatus::UPDATE_PAN);
        ch.status.set(ChannelStatus::TRIGGER_VOICE);
        ch.status.set(ChannelStatus::USE_QUICK_VOLRAMP);

        if efx == 0x09 {
            if efx_data > 0 {
                ch.effects.sample_offset_high = efx_data;
            }
            ch.smp_start_pos = (ch.effects.sample_offset_high as u32) << 8;
        } else {
            ch.smp_start_pos = 0;
        }

        if let Some(midi) = inst.and_then(|ins| ins.midi_out) {
            if !midi.mute {
                if self.channels[ch_idx].midi_active {
                    self.midi_events.push(MidiEvent {
                        channel: ch_idx,
                        kind: MidiEventKind::NoteOff,
                        note: self.channels[ch_idx].midi_last_note.unwrap_or(0),
                        velocity: 0,
                    });
                }
                let midi_note = (final_note + 11).clamp(0, 127) as u8;
                let out_vol = self.channels[ch_idx].out_vol;
                let velocity = if out_vol > 0 { ((out_vol as u32 * 127) / 64) as u8 } else { 100 };
                self.midi_events.push(MidiEvent {
                    channel: ch_idx,
                    kind: MidiEventKind::NoteOn,
                    note: midi_note,
                    velocity,
                });
                self.channels[ch_idx].midi_last_note = Some(midi_note);
                self.channels[ch_idx].midi_active = true;
            }
        }
    }

    pub(crate) fn key_off(&mut self, ch_idx: usize) {
        self.channels[ch_idx].key_off = true;
        let instr_idx = self.channels[ch_idx].instrument_idx;
        let Some(inst) = self.song.instrument(instr_idx) else {
            return;
        };

        if inst.volume_envelope.is_enabled() {
            let point = self.channels[ch_idx].vol_env_point;
            if let Some(p) = inst.volume_envelope.points.get(point as usize) {
                if self.channels[ch_idx].vol_env_tick >= p.tick {
                    self.channels[ch_idx].vol_env_tick = p.tick.saturating_sub(1);
                }
            }
        } else {
            let ch = &mut self.channels[ch_idx];
            ch.real_vol = 0;
            ch.out_vol = 0;
            ch.status.set(ChannelStatus::UPDATE_VOL);
            ch.status.set(ChannelStatus::USE_QUICK_VOLRAMP);
        }

        // Verbatim source quirk: this gate checks the *disabled* case, not
        // the enabled one — clamping panEnvTick only when the panning
        // envelope is off. Kept as-is for fidelity; it's inert since a
        // disabled envelope's tick never feeds the final pan.
        if !inst.panning_envelope.is_enabled() {
            let point = self.channels[ch_idx].pan_env_point;
            if let Some(p) = inst.panning_envelope.points.get(point as usize) {
                if self.channels[ch_idx].pan_env_tick >= p.tick {
                    self.channels[ch_idx].pan_env_tick = p.tick.saturating_sub(1);
                }
            }
        }

        if let Some(midi) = inst.midi_out {
            if !midi.mute && self.channels[ch_idx].midi_active {
                self.midi_events.push(MidiEvent {
                    channel: ch_idx,
                    kind: MidiEventKind::NoteOff,
                    note: self.channels[ch_idx].midi_last_note.unwrap_or(0),
                    velocity: 0,
                });
                self.channels[ch_idx].midi_active = false;
            }
        }
    }

    pub(crate) fn reset_volumes(&mut self, ch_idx: usize) {
        let ch = &mut self.channels[ch_idx];
        ch.real_vol = ch.old_vol;
        ch.out_vol = ch.old_vol;
        ch.real_pan = ch.old_pan;
        ch.out_pan = ch.old_pan;
        ch.status.set(ChannelStatus::UPDATE_VOL);
        ch.status.set(ChannelStatus::UPDATE_PAN);
        ch.status.set(ChannelStatus::USE_QUICK_VOLRAMP);
    }

    pub(crate) fn trigger_instrument(&mut self, ch_idx: usize) {
        {
            let ch = &mut self.channels[ch_idx];
            if ch.effects.vibrato_ctrl & 0x04 == 0 {
                ch.effects.vibrato_pos = 0;
            }
            if ch.effects.tremolo_ctrl & 0x04 == 0 {
                ch.effects.tremolo_pos = 0;
            }
            ch.effects.retrig_counter = 0;
            ch.effects.tremor_pos = 0;
            ch.key_off = false;
        }

        let instr_idx = self.channels[ch_idx].instrument_idx;
        let Some(inst) = self.song.instrument(instr_idx) else {
            return;
        };

        let ch = &mut self.channels[ch_idx];
        if inst.volume_envelope.is_enabled() {
            ch.vol_env_tick = u16::MAX;
            ch.vol_env_point = 0;
        }
        if inst.panning_envelope.is_enabled() {
            ch.pan_env_tick = u16::MAX;
            ch.pan_env_point = 0;
        }
        ch.fadeout_speed = inst.fadeout;
        ch.fadeout = 32768;

        if inst.auto_vibrato.depth > 0 {
            ch.autovib_pos = 0;
            if inst.auto_vibrato.sweep > 0 {
                ch.autovib_amp = 0.0;
                ch.autovib_sweep = (inst.auto_vibrato.depth as f32 * 256.0) / inst.auto_vibrato.sweep as f32;
            } else {
                ch.autovib_amp = inst.auto_vibrato.depth as f32 * 256.0;
                ch.autovib_sweep = 0.0;
            }
        }
    }

    /// Scales the channel's auto-vibrato amplitude/sweep by an incoming
    /// mod-wheel depth (0..127), layered on top of whatever
    /// `trigger_instrument` just set from the instrument's own auto-vibrato
    /// (§6 "live input"). A depth of 0 (no mod wheel) leaves the
    /// instrument's auto-vibrato untouched.
    pub(crate) fn apply_mod_wheel(&mut self, ch_idx: usize, mod_depth: u8) {
        if mod_depth == 0 {
            return;
        }
        let ch = &mut self.channels[ch_idx];
        let scale = mod_depth as f32 / 127.0;
        ch.autovib_amp *= scale;
        ch.autovib_sweep *= scale;
    }

    /// Applies an initial pitch-bend offset (period units, already
    /// converted by the caller from raw pitch-wheel units) to the
    /// just-triggered note (§6 "live input").
    pub(crate) fn apply_pitch_bend(&mut self, ch_idx: usize, pitch_bend: i16) {
        if pitch_bend == 0 {
            return;
        }
        let ch = &mut self.channels[ch_idx];
        ch.real_period = (ch.real_period - pitch_bend as i32).clamp(1, MAX_PERIOD);
        ch.out_period = ch.real_period;
        ch.status.set(ChannelStatus::UPDATE_PERIOD);
    }

    /// Sets up a 3xx/5xx tone-portamento target and direction; does *not*
    /// retrigger the sample (`preparePortamento` never calls `triggerNote`).
    pub(crate) fn prepare_portamento(&mut self, ch_idx: usize, note: u8, instr_num: u8) {
        if note > 0 {
            if note == NOTE_OFF {
                self.key_off(ch_idx);
            } else {
                let final_note = (note as i32 + self.channels[ch_idx].relative_note as i32).clamp(1, 119);
                let finetune_idx = ((self.channels[ch_idx].finetune as i32) >> 3) + 16;
                let target = self
                    .tables
                    .period(self.song.linear_frequency_table, final_note - 1, finetune_idx) as i32;
                let ch = &mut self.channels[ch_idx];
                ch.effects.tone_porta_target = target;
                ch.effects.portamento_direction = match target.cmp(&ch.real_period) {
                    std::cmp::Ordering::Equal => 0,
                    std::cmp::Ordering::Greater => 1,
                    std::cmp::Ordering::Less => 2,
                };
            }
        }
        if instr_num > 0 {
            self.reset_volumes(ch_idx);
            if note != NOTE_OFF {
                self.trigger_instrument(ch_idx);
            }
        }
    }

    /// Quantises `period` to the nearest note-period in the active (linear
    /// or Amiga) table, offset by `note_offset` semitones — a binary search
    /// over the period table standing in for the source's direct LUT
    /// inversion (`period2NotePeriod`).
    pub(crate) fn period2note_period(&self, period: i32, note_offset: i32) -> i32 {
        let table = self.tables.table(self.song.linear_frequency_table);
        let mut lo = 0usize;
        let mut hi = table.len() - 1;
        while lo < hi {
            let mid = (lo + hi) / 2;
            if (table[mid] as i32) <= period {
                hi = mid;
            } else {
                lo = mid + 1;
            }
        }
        let idx = (hi as i32 + note_offset * 16).clamp(0, table.len() as i32 - 1) as usize;
        (table[idx] as i32).clamp(1, MAX_PERIOD)
    }
}
