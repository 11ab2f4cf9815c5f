//! Per-tick envelope/fadeout/auto-vibrato evaluation (`updateVolPanAutoVib`),
//! run for every channel every tick regardless of whether this tick also
//! read a new row.
//!
//! This replicates the source's own loop/sustain/interpolate state machine
//! directly against `Channel`'s `vol_env_tick`/`vol_env_point`/
//! `vol_env_value` fields rather than going through
//! [`ft2_song::Envelope::step`] — that helper's cursor doesn't reproduce the
//! compound loop-vs-sustain gate below (loop restarts UNLESS sustain is
//! active and keyed-on at the loop-end point).

use ft2_song::envelope::Envelope;
use ft2_song::ChannelStatus;

use crate::Replayer;

/// Runs one envelope tick, returning the new (loop/sustain-aware)
/// interpolated value. Mirrors the loop half of `updateVolPanAutoVib`,
/// shared between the volume and panning envelopes.
fn step_envelope(env: &Envelope, tick: &mut u16, point: &mut u8, value: &mut f32, key_off: bool) {
    if !env.is_enabled() {
        return;
    }
    let last = (env.points.len() - 1) as u8;
    if *point >= last {
        *value = env.points[last as usize].value as f32;
        return;
    }

    *tick = tick.wrapping_add(1);
    let cur = env.points[*point as usize];

    if *tick == cur.tick {
        *value = cur.value as f32;

        let at_sustain_hold = env.sustain_enabled && !key_off && env.sustain_point == Some(*point);
        if at_sustain_hold {
            *tick = tick.wrapping_sub(1);
            return;
        }

        *point += 1;
        if let (true, Some(loop_end), Some(loop_start)) = (env.loop_enabled, env.loop_end, env.loop_start) {
            let looping_back = *point > loop_end
                && !(env.sustain_enabled && !key_off && env.sustain_point == Some(loop_end));
            if looping_back || *point > loop_end {
                *point = loop_start;
                *tick = env.points.get(loop_start as usize).map(|p| p.tick).unwrap_or(0);
            }
        }
        return;
    }

    let next = env.points[(*point + 1).min(last) as usize];
    if next.tick > cur.tick {
        let delta = (next.value as f32 - cur.value as f32) / (next.tick - cur.tick) as f32;
        *value += delta;
        *value = value.clamp(0.0, 64.0);
    }
}

impl Replayer {
    pub(crate) fn update_vol_pan_autovib(&mut self, ch_idx: usize) {
        let instr_idx = self.channels[ch_idx].instrument_idx;
        let inst = self.song.instrument(instr_idx);
        let global_volume = self.song.global_volume as f32;

        let ch = &mut self.channels[ch_idx];

        if ch.key_off && ch.fadeout_speed > 0 {
            ch.fadeout = ch.fadeout.saturating_sub(ch.fadeout_speed);
            if ch.fadeout == 0 {
                ch.fadeout_speed = 0;
            }
            ch.status.set(ChannelStatus::UPDATE_VOL);
        }

        let vol_env_enabled = inst.is_some_and(|i| i.volume_envelope.is_enabled());
        if !ch.mute && inst.is_some() {
            if let Some(ins) = inst {
                if vol_env_enabled {
                    let mut tick = ch.vol_env_tick;
                    let mut point = ch.vol_env_point;
                    let mut value = ch.vol_env_value;
                    step_envelope(&ins.volume_envelope, &mut tick, &mut point, &mut value, ch.key_off);
                    ch.vol_env_tick = tick;
                    ch.vol_env_point = point;
                    ch.vol_env_value = value;
                }
            }
        }

        let mut f_vol = (global_volume * ch.out_vol as f32 * ch.fadeout as f32) / (64.0 * 64.0 * 32768.0);
        if vol_env_enabled {
            f_vol *= ch.vol_env_value / 64.0;
        }
        ch.final_vol = if ch.mute || inst.is_none() { 0.0 } else { f_vol.clamp(0.0, 1.0) };

        let pan_env_enabled = inst.is_some_and(|i| i.panning_envelope.is_enabled());
        if pan_env_enabled {
            if let Some(ins) = inst {
                let mut tick = ch.pan_env_tick;
                let mut point = ch.pan_env_point;
                let mut value = ch.pan_env_value;
                step_envelope(&ins.panning_envelope, &mut tick, &mut point, &mut value, ch.key_off);
                ch.pan_env_tick = tick;
                ch.pan_env_point = point;
                ch.pan_env_value = value;
            }
            let spread = 128 - (ch.out_pan as i32 - 128).abs();
            ch.final_pan = (ch.out_pan as i32 + ((ch.pan_env_value - 32.0) as i32 * spread) / 32)
                .clamp(0, 255) as u8;
        } else {
            ch.final_pan = ch.out_pan;
        }

        if let Some(ins) = inst {
            if ins.auto_vibrato.depth > 0 {
                let target_amp = ins.auto_vibrato.depth as f32 * 256.0;
                if ch.autovib_sweep > 0.0 && ch.autovib_amp < target_amp {
                    ch.autovib_amp = (ch.autovib_amp + ch.autovib_sweep).min(target_amp);
                }
                ch.autovib_pos = ch.autovib_pos.wrapping_add(ins.auto_vibrato.rate);

                let raw = match ins.auto_vibrato.waveform {
                    ft2_song::AutoVibratoWaveform::Square => {
                        if ch.autovib_pos > 127 { 64 } else { -64 }
                    }
                    ft2_song::AutoVibratoWaveform::RampDown => (((ch.autovib_pos >> 1) as i32 + 64) & 127) - 64,
                    ft2_song::AutoVibratoWaveform::RampUp => ((-((ch.autovib_pos >> 1) as i32) + 64) & 127) - 64,
                    ft2_song::AutoVibratoWaveform::Sine => self.tables.auto_vib_sine[ch.autovib_pos as usize] as i32,
                };

                let autovib_val = (raw * ch.autovib_amp as i32) >> 14;
                let final_period = ch.out_period + autovib_val;
                ch.final_period = if final_period >= 32000 { 0 } else { final_period };
                return;
            }
        }
        ch.final_period = ch.out_period;
    }

    fn tables_auto_vib_sine(&self, pos: u8) -> i8 {
        self.tables.auto_vib_sine[pos as usize]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ft2_song::{Song, SourceFormat};

    #[test]
    fn disabled_envelope_final_vol_follows_out_vol_directly() {
        let song = Song::empty(SourceFormat::Xm);
        let mut rep = Replayer::new(song);
        rep.channels[0].out_vol = 64;
        rep.song.global_volume = 64;
        rep.channels[0].instrument_idx = 0; // no instrument -> silent
        rep.update_vol_pan_autovib(0);
        assert_eq!(rep.channels[0].final_vol, 0.0);
    }

    #[test]
    fn no_envelope_no_autovib_passes_period_through() {
        let song = Song::empty(SourceFormat::Xm);
        let mut rep = Replayer::new(song);
        rep.channels[0].out_period = 1000;
        rep.update_vol_pan_autovib(0);
        assert_eq!(rep.channels[0].final_period, 1000);
    }
}
