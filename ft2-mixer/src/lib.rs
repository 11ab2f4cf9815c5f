//! Fixed-point resampling mixer (§4.4).
//!
//! One function dispatched on `(loop kind, interpolation mode)`; bit depth is
//! already erased upstream by [`ft2_sample::Sample::frame_i32`], which
//! normalises 8-bit data into the 16-bit domain, so this crate has a single
//! numeric path instead of the source's 8/16-bit function pairs.

mod rates;
mod voice;

pub use rates::Rates;
pub use voice::{Voice, VoicePool};

use ft2_interp::{InterpMode, InterpTables};
use ft2_sample::{LoopKind, Sample};
use ft2_song::channel::SampleId;

/// Number of selectable output buses for [`Mixer::mix_multi_out`] (§4.4
/// "Multi-bus output").
pub const NUM_BUSES: usize = 15;

pub struct Mixer {
    pub rates: Rates,
    pub interpolation: InterpMode,
    pub volume_ramping: bool,
    tables: std::sync::Arc<InterpTables>,
}

impl Mixer {
    pub fn new(sample_rate: u32) -> Self {
        Self {
            rates: Rates::new(sample_rate),
            interpolation: InterpMode::Sinc,
            volume_ramping: true,
            tables: ft2_interp::acquire(),
        }
    }

    pub fn set_sample_rate(&mut self, sample_rate: u32) {
        self.rates = Rates::new(sample_rate);
    }

    pub fn set_interpolation(&mut self, mode: InterpMode) {
        self.interpolation = mode;
    }

    /// Sets up a voice to start playing `sample` at `start_pos`, per
    /// `ft2_trigger_voice`: illegal parameters (no data, start past end)
    /// leave the voice inactive rather than erroring (§7 `InvalidParameter`).
    pub fn trigger_voice(
        &self,
        voice: &mut Voice,
        sample_id: SampleId,
        generation: u32,
        sample: &Sample,
        start_pos: u32,
        period: u32,
        linear_periods: bool,
    ) {
        let length = sample.length();
        if length == 0 {
            voice.active = false;
            return;
        }

        let mut loop_kind = sample.loop_kind;
        if sample.loop_length < 1 {
            loop_kind = LoopKind::None;
        }

        let loop_end = sample.loop_start + sample.loop_length;

        voice.sample_id = Some(sample_id);
        voice.generation = generation;
        voice.has_looped = false;
        voice.sampling_backwards = false;
        voice.loop_kind = loop_kind;
        voice.sample_end = if loop_kind == LoopKind::None {
            length as i64
        } else {
            loop_end as i64
        };
        voice.loop_start = sample.loop_start;
        voice.loop_length = sample.loop_length;
        voice.position = start_pos as i64;
        voice.position_frac = 0;
        voice.delta = self.rates.period_to_delta(period, linear_periods);

        if voice.position >= voice.sample_end {
            voice.active = false;
            return;
        }

        voice.active = true;
    }

    /// Recomputes a voice's target volume/pan gains and sets up (or skips)
    /// a ramp, per `ft2_voice_update_volumes`. `triggered`/`quick_ramp` come
    /// from the channel's accumulated [`ft2_song::channel::ChannelStatus`].
    #[allow(clippy::too_many_arguments)]
    pub fn update_volumes(
        &self,
        main: &mut Voice,
        fade: &mut Voice,
        volume: f32,
        panning: u8,
        triggered: bool,
        quick_ramp: bool,
        samples_per_tick: u32,
    ) {
        main.panning = panning;
        main.fvolume = volume;
        main.target_volume_l = volume * self.rates.sqrt_panning[256 - panning as usize];
        main.target_volume_r = volume * self.rates.sqrt_panning[panning as usize];

        if !self.volume_ramping {
            main.curr_volume_l = main.target_volume_l;
            main.curr_volume_r = main.target_volume_r;
            main.volume_ramp_length = 0;
            return;
        }

        if triggered {
            if main.curr_volume_l > 0.0 || main.curr_volume_r > 0.0 {
                *fade = main.clone();
                fade.volume_ramp_length = self.rates.quick_vol_ramp_samples;
                fade.volume_l_delta = -fade.curr_volume_l * self.rates.quick_vol_ramp_mul;
                fade.volume_r_delta = -fade.curr_volume_r * self.rates.quick_vol_ramp_mul;
                fade.target_volume_l = 0.0;
                fade.target_volume_r = 0.0;
                fade.is_fade_out_voice = true;
            }
            main.curr_volume_l = 0.0;
            main.curr_volume_r = 0.0;
        }

        if !triggered
            && main.target_volume_l == main.curr_volume_l
            && main.target_volume_r == main.curr_volume_r
        {
            main.volume_ramp_length = 0;
            return;
        }

        let diff_l = main.target_volume_l - main.curr_volume_l;
        let diff_r = main.target_volume_r - main.curr_volume_r;

        let (ramp_len, ramp_mul) = if quick_ramp {
            (self.rates.quick_vol_ramp_samples, self.rates.quick_vol_ramp_mul)
        } else {
            (samples_per_tick, 1.0 / samples_per_tick.max(1) as f32)
        };

        main.volume_ramp_length = ramp_len;
        main.volume_l_delta = diff_l * ramp_mul;
        main.volume_r_delta = diff_r * ramp_mul;
    }

    /// Called at the start of every tick: snaps any in-flight ramp straight
    /// to its target (`ft2_reset_ramp_volumes`).
    pub fn reset_ramp_volumes(&self, pool: &mut VoicePool) {
        for ch in 0..pool.len() {
            let v = pool.main_mut(ch);
            v.curr_volume_l = v.target_volume_l;
            v.curr_volume_r = v.target_volume_r;
            v.volume_ramp_length = 0;
        }
    }

    /// Mixes `num_samples` frames of every active voice in `pool` into
    /// `mix_l`/`mix_r`, summing. `sample_for` resolves a voice's
    /// [`SampleId`] to its [`Sample`] (the mixer holds no sample data
    /// itself — §3 "voices hold borrowed, non-owning pointers").
    pub fn mix<'a>(
        &self,
        pool: &mut VoicePool,
        sample_for: impl Fn(SampleId) -> Option<&'a Sample>,
        mix_l: &mut [f32],
        mix_r: &mut [f32],
        num_samples: usize,
    ) {
        for voice in pool.iter_mut() {
            if !voice.active {
                continue;
            }
            let Some(id) = voice.sample_id else {
                voice.active = false;
                continue;
            };
            let Some(sample) = sample_for(id) else {
                voice.active = false;
                continue;
            };
            self.mix_voice(voice, sample, mix_l, mix_r, num_samples);
        }
    }

    /// Mixes a single voice, for a caller (e.g. multi-bus routing) that
    /// needs to place each channel's voice into its own buffer pair rather
    /// than summing every active voice into one.
    pub fn mix_one(&self, voice: &mut Voice, sample: &Sample, mix_l: &mut [f32], mix_r: &mut [f32], num_samples: usize) {
        self.mix_voice(voice, sample, mix_l, mix_r, num_samples);
    }

    fn mix_voice(&self, v: &mut Voice, sample: &Sample, mix_l: &mut [f32], mix_r: &mut [f32], num_samples: usize) {
        if v.is_silent() {
            self.silence_voice(v, num_samples);
            return;
        }

        let get = |pos: i64| sample.frame_i32(pos) as f32 * (1.0 / 32768.0);
        let mut position = v.position;
        let mut position_frac = v.position_frac;
        let mut backwards = v.sampling_backwards;
        let mut delta_bits: u64 = if backwards { v.delta.wrapping_neg() } else { v.delta };
        let loop_end = v.loop_start as i64 + v.loop_length as i64;

        for i in 0..num_samples {
            match v.loop_kind {
                LoopKind::None => {
                    if position >= v.sample_end {
                        v.active = false;
                        break;
                    }
                }
                LoopKind::Forward => {
                    while position >= loop_end {
                        position -= v.loop_length as i64;
                        v.has_looped = true;
                    }
                }
                LoopKind::PingPong => {
                    if backwards {
                        while position < v.loop_start as i64 {
                            position = v.loop_start as i64 + (v.loop_start as i64 - position);
                            backwards = false;
                            delta_bits = delta_bits.wrapping_neg();
                            v.has_looped = true;
                        }
                    } else {
                        while position >= loop_end {
                            position = loop_end - 1 - (position - loop_end);
                            backwards = true;
                            delta_bits = delta_bits.wrapping_neg();
                            v.has_looped = true;
                        }
                    }
                }
            }

            let frac32 = position_frac;
            let sample_val = match self.interpolation {
                InterpMode::None => get(position),
                InterpMode::Linear => {
                    let f = (frac32 >> 1) as f32 * (1.0 / 2147483648.0);
                    get(position) + (get(position + 1) - get(position)) * f
                }
                InterpMode::Quadratic => self.tables.quadratic(frac32, |o| get(position + o)),
                InterpMode::Cubic => self.tables.cubic(frac32, |o| get(position + o)),
                InterpMode::Sinc => self
                    .tables
                    .sinc(frac32, v.delta, |o| get(position + o)),
            };

            mix_l[i] += sample_val * v.curr_volume_l;
            mix_r[i] += sample_val * v.curr_volume_r;

            if v.volume_ramp_length > 0 {
                v.curr_volume_l += v.volume_l_delta;
                v.curr_volume_r += v.volume_r_delta;
                v.volume_ramp_length -= 1;
            }

            let sum = (position_frac as u64).wrapping_add(delta_bits);
            position_frac = (sum & 0xFFFF_FFFF) as u32;
            let carry = (sum >> 32) as u32 as i32;
            position += carry as i64;
        }

        v.position = position;
        v.position_frac = position_frac;
        v.sampling_backwards = backwards;
    }

    /// Advances a fully-silent voice's position without touching the mix
    /// buffers, handling loop wrap exactly as the full path would
    /// (invariant 8, "silence fast-path equivalence").
    fn silence_voice(&self, v: &mut Voice, num_samples: usize) {
        // Matches the source's silenceMixRoutine, which advances by the
        // unsigned magnitude of delta regardless of ping-pong direction;
        // direction only affects which half of the bounce cycle `position`
        // lands in, via the cycle-parity flip below.
        let samples_to_mix = v.delta.wrapping_mul(num_samples as u64);
        let samples = samples_to_mix >> 32;
        let samples_frac = (samples_to_mix & 0xFFFF_FFFF) + v.position_frac as u64;

        let mut position = v.position + samples as i64 + (samples_frac >> 32) as i64;
        let position_frac = (samples_frac & 0xFFFF_FFFF) as u32;

        if position < v.sample_end {
            v.position = position;
            v.position_frac = position_frac;
            return;
        }

        match v.loop_kind {
            LoopKind::None => {
                v.active = false;
            }
            LoopKind::Forward => {
                if v.loop_length >= 2 {
                    position = v.loop_start as i64 + (position - v.sample_end) % v.loop_length as i64;
                } else {
                    position = v.loop_start as i64;
                }
                v.has_looped = true;
                v.position = position;
                v.position_frac = position_frac;
            }
            LoopKind::PingPong => {
                if v.loop_length >= 2 {
                    let overflow = position - v.sample_end;
                    let cycles = overflow / v.loop_length as i64;
                    let phase = overflow % v.loop_length as i64;
                    position = v.loop_start as i64 + phase;
                    if cycles & 1 != 0 {
                        v.sampling_backwards = !v.sampling_backwards;
                    }
                } else {
                    position = v.loop_start as i64;
                }
                v.has_looped = true;
                v.position = position;
                v.position_frac = position_frac;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ft2_sample::{BitDepth, SampleParams};

    fn square_sample(loop_kind: LoopKind) -> Sample {
        let params = SampleParams {
            bit_depth: BitDepth::Sixteen,
            length: 8,
            loop_kind,
            loop_start: 2,
            loop_length: 6,
            ..Default::default()
        };
        let pcm: Vec<u8> = (0..8i16)
            .flat_map(|v| (v * 1000).to_le_bytes())
            .collect();
        let mut s = Sample::load(params, &pcm).unwrap();
        s.fix();
        s
    }

    #[test]
    fn no_loop_voice_deactivates_at_end() {
        let mixer = Mixer::new(48000);
        let sample = square_sample(LoopKind::None);
        let mut voice = Voice {
            active: true,
            position: 0,
            delta: 1u64 << 32, // 1.0 step per sample
            sample_end: 8,
            curr_volume_l: 1.0,
            curr_volume_r: 1.0,
            volume_ramp_length: 0,
            ..Default::default()
        };
        let mut l = vec![0.0f32; 16];
        let mut r = vec![0.0f32; 16];
        mixer.mix_voice(&mut voice, &sample, &mut l, &mut r, 16);
        assert!(!voice.active);
    }

    #[test]
    fn silence_fast_path_matches_full_mix_position() {
        let mixer = Mixer::new(48000);
        let sample = square_sample(LoopKind::Forward);

        let base = Voice {
            active: true,
            position: 0,
            delta: 1u64 << 32,
            loop_kind: LoopKind::Forward,
            loop_start: 2,
            loop_length: 6,
            sample_end: 8,
            ..Default::default()
        };

        let mut silent = base.clone();
        let mut silenced_l = vec![0.0f32; 20];
        let mut silenced_r = vec![0.0f32; 20];
        mixer.mix_voice(&mut silent, &sample, &mut silenced_l, &mut silenced_r, 20);

        let mut audible = base.clone();
        audible.curr_volume_l = 0.0000001;
        audible.curr_volume_r = 0.0000001;
        let mut audible_l = vec![0.0f32; 20];
        let mut audible_r = vec![0.0f32; 20];
        mixer.mix_voice(&mut audible, &sample, &mut audible_l, &mut audible_r, 20);

        assert_eq!(silent.position, audible.position);
        assert_eq!(silent.sampling_backwards, audible.sampling_backwards);
    }
}
