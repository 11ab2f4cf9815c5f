//! Per-block render (§4.6, grounded in `ft2_instance_render` /
//! `ft2_mix_voices_only` / `ft2_instance_render_multiout`): the
//! tick-sample-counter loop that interleaves `replayer.tick()` with the
//! mixer, plus the "jam-only" path that keeps envelopes moving without
//! advancing the pattern cursor.

use ft2_mixer::NUM_BUSES;
use ft2_sample::{BitDepth, LoopKind, Sample};
use ft2_song::channel::SampleId;
use ft2_song::Song;

use crate::queues::{MidiOutEvent, MidiOutKind, ScopeSyncEntry};
use crate::Engine;

impl Engine {
    /// Standard stereo render (§6 `render`). Advances the pattern cursor
    /// tick by tick; callers that want jam-only envelope ticking while the
    /// transport is stopped should use [`Engine::render_jam_only`] instead.
    pub fn render(&mut self, out_l: &mut [f32], out_r: &mut [f32]) {
        let num_frames = out_l.len().min(out_r.len());
        self.run_block(num_frames, true, |engine, start, len| {
            engine.mix_main(&mut out_l[start..start + len], &mut out_r[start..start + len]);
        });
    }

    /// Keeps envelope/fadeout/auto-vibrato timing alive for live-triggered
    /// voices without moving `(order, row)` — used when the host transport
    /// is stopped but notes are still sounding (§4.6 "jam-only").
    pub fn render_jam_only(&mut self, out_l: &mut [f32], out_r: &mut [f32]) {
        let num_frames = out_l.len().min(out_r.len());
        self.run_block(num_frames, false, |engine, start, len| {
            engine.mix_main(&mut out_l[start..start + len], &mut out_r[start..start + len]);
        });
    }

    /// Multi-bus render (§4.4 "Multi-bus output", §6 `render_multi_out`):
    /// every channel's voice is mixed into `bus[channel_routing[ch]]`
    /// instead of the main buffers directly, then buses flagged by
    /// `channel_to_main` are summed into `main_l`/`main_r`. The 15 bus
    /// buffers are left populated (and gain-scaled) for read-only
    /// inspection after the call.
    pub fn render_multi_out(&mut self, main_l: &mut [f32], main_r: &mut [f32]) {
        let num_frames = main_l.len().min(main_r.len());
        for bus in &mut self.bus_l {
            bus.resize(num_frames, 0.0);
            bus.fill(0.0);
        }
        for bus in &mut self.bus_r {
            bus.resize(num_frames, 0.0);
            bus.fill(0.0);
        }

        let playing = self.replayer.song.playing;
        self.run_block(num_frames, playing, |engine, start, len| {
            engine.mix_buses(start, len);
        });

        let mul = self.audio_normalize_mul;
        let num_channels = self.replayer.song.num_channels as usize;
        let mut bus_feeds_main = [false; NUM_BUSES];
        for ch in 0..num_channels.min(self.config.channel_to_main.len()) {
            if self.config.channel_to_main[ch] {
                let routed = *self.config.channel_routing.get(ch).unwrap_or(&0) as usize;
                let bus = if routed < NUM_BUSES { routed } else { ch % NUM_BUSES };
                bus_feeds_main[bus] = true;
            }
        }

        for i in 0..num_frames {
            let mut sum_l = 0.0f32;
            let mut sum_r = 0.0f32;
            for bus in 0..NUM_BUSES {
                if bus_feeds_main[bus] {
                    sum_l += self.bus_l[bus][i];
                    sum_r += self.bus_r[bus][i];
                }
            }
            main_l[i] = (sum_l * mul).clamp(-1.0, 1.0);
            main_r[i] = (sum_r * mul).clamp(-1.0, 1.0);
        }

        for bus in 0..NUM_BUSES {
            for i in 0..num_frames {
                self.bus_l[bus][i] = (self.bus_l[bus][i] * mul).clamp(-1.0, 1.0);
                self.bus_r[bus][i] = (self.bus_r[bus][i] * mul).clamp(-1.0, 1.0);
            }
        }
    }

    /// Read-only access to a multi-out bus after [`Engine::render_multi_out`].
    pub fn bus(&self, index: usize) -> Option<(&[f32], &[f32])> {
        Some((self.bus_l.get(index)?, self.bus_r.get(index)?))
    }

    /// The tick/mix interleave shared by every render entry point.
    /// `advance_pattern` selects `replayer.tick()`'s normal path vs. the
    /// envelope-only path `Replayer::tick` already takes when
    /// `song.playing` is false — so jam-only rendering simply leaves
    /// `song.playing` untouched rather than needing a second tick function.
    fn run_block(&mut self, num_frames: usize, advance_pattern: bool, mut mix: impl FnMut(&mut Engine, usize, usize)) {
        let was_playing = self.replayer.song.playing;
        if !advance_pattern {
            self.replayer.song.playing = false;
        }

        let mut frames_left = num_frames;
        let mut out_pos = 0usize;

        while frames_left > 0 {
            if self.tick_sample_counter == 0 {
                self.begin_tick();
            }

            let chunk = frames_left.min(self.tick_sample_counter as usize).max(1).min(frames_left);
            mix(self, out_pos, chunk);

            out_pos += chunk;
            frames_left -= chunk;
            self.tick_sample_counter = self.tick_sample_counter.saturating_sub(chunk as u32);
        }

        if !advance_pattern {
            self.replayer.song.playing = was_playing;
        }
    }

    /// Runs one full tick boundary: recomputes `tick_sample_counter` from
    /// the current BPM, resets in-flight volume ramps, advances the
    /// replayer and applies the resulting voice updates.
    fn begin_tick(&mut self) {
        let (int_part, frac_part) = self.mixer.rates.samples_per_tick(self.replayer.song.bpm);
        self.tick_sample_counter = int_part;
        self.tick_sample_counter_frac += frac_part;
        if self.tick_sample_counter_frac >= 1u64 << 32 {
            self.tick_sample_counter_frac &= 0xFFFF_FFFF;
            self.tick_sample_counter += 1;
        }

        if self.mixer.volume_ramping {
            self.mixer.reset_ramp_volumes(&mut self.voices);
        }

        self.replayer.tick();
        let updates = self.replayer.update_voices();
        for update in updates {
            self.apply_voice_update(update);
        }

        for event in self.replayer.midi_events() {
            self.queues.midi_out.push(MidiOutEvent {
                channel: event.channel,
                kind: match event.kind {
                    ft2_replayer::MidiEventKind::NoteOn => MidiOutKind::NoteOn,
                    ft2_replayer::MidiEventKind::NoteOff => MidiOutKind::NoteOff,
                },
                note: event.note,
                velocity: event.velocity,
                sample_pos_in_buffer: num_frames_consumed_placeholder(),
            });
        }
        self.replayer.clear_midi_events();
    }

    /// Applies one channel's tick-boundary update to the mixer/voice pool
    /// and publishes its scope snapshot. Shared by the pattern-driven tick
    /// loop and live-input calls ([`Engine::trigger_note`],
    /// [`Engine::release_note`]) — both paths go through
    /// `Replayer::update_voices` and need identical handling.
    pub(crate) fn apply_voice_update(&mut self, update: ft2_replayer::VoiceUpdate) {
        let ch = update.channel;
        if ch >= self.voices.len() {
            return;
        }

        let linear = self.replayer.song.linear_frequency_table;

        if update.trigger {
            if let Some(id) = update.sample_id {
                if let Some(sample) = sample_for(&self.replayer.song, id) {
                    self.mixer.trigger_voice(
                        self.voices.main_mut(ch),
                        id,
                        update.sample_generation,
                        sample,
                        update.start_pos,
                        update.period as u32,
                        linear,
                    );
                } else {
                    self.voices.main_mut(ch).active = false;
                }
            } else {
                self.voices.main_mut(ch).active = false;
            }
        } else if update.update_period {
            if let Some(id) = update.sample_id {
                let delta = self.mixer.rates.period_to_delta(update.period as u32, linear);
                let main = self.voices.main_mut(ch);
                if main.sample_id == Some(id) {
                    main.delta = delta;
                }
            }
        }

        if update.update_volume || update.update_pan || update.trigger {
            let samples_per_tick = self.mixer.rates.samples_per_tick(self.replayer.song.bpm).0;
            let (main, fade) = self.voices.main_and_fade_mut(ch);
            self.mixer.update_volumes(
                main,
                fade,
                update.volume,
                update.panning,
                update.trigger,
                update.quick_ramp,
                samples_per_tick,
            );
        }

        let (length, loop_start, loop_length, loop_kind, is_16bit) = update
            .sample_id
            .and_then(|id| sample_for(&self.replayer.song, id))
            .map(|s| (s.length(), s.loop_start, s.loop_length, s.loop_kind, s.bit_depth() == BitDepth::Sixteen))
            .unwrap_or((0, 0, 0, LoopKind::None, false));

        self.queues.scope.push(ScopeSyncEntry {
            channel: ch,
            triggered: update.trigger,
            volume: update.volume,
            period: update.period,
            sample_id: update.sample_id,
            sample_generation: update.sample_generation,
            length,
            loop_start,
            loop_length,
            loop_kind,
            is_16bit,
            start_pos: update.start_pos,
        });
    }

    fn mix_main(&mut self, mix_l: &mut [f32], mix_r: &mut [f32]) {
        let num_samples = mix_l.len();
        mix_l.fill(0.0);
        mix_r.fill(0.0);

        let song = &self.replayer.song;
        self.mixer.mix(&mut self.voices, |id| sample_for(song, id), mix_l, mix_r, num_samples);

        let mul = self.audio_normalize_mul;
        for (l, r) in mix_l.iter_mut().zip(mix_r.iter_mut()) {
            *l = (*l * mul).clamp(-1.0, 1.0);
            *r = (*r * mul).clamp(-1.0, 1.0);
        }
    }

    fn mix_buses(&mut self, start: usize, len: usize) {
        let num_channels = self.replayer.song.num_channels as usize;
        let song = &self.replayer.song;
        let mixer = &self.mixer;
        let routing = &self.config.channel_routing;

        for ch in 0..num_channels.min(self.voices.len()) {
            let routed = *routing.get(ch).unwrap_or(&0) as usize;
            let bus = if routed < NUM_BUSES { routed } else { ch % NUM_BUSES };
            let (main, fade) = self.voices.main_and_fade_mut(ch);
            for voice in [main, fade] {
                if !voice.active {
                    continue;
                }
                let Some(id) = voice.sample_id else { continue };
                let Some(sample) = sample_for(song, id) else { continue };
                mixer.mix_one(voice, sample, &mut self.bus_l[bus][start..start + len], &mut self.bus_r[bus][start..start + len], len);
            }
        }
    }
}

fn sample_for(song: &Song, id: SampleId) -> Option<&Sample> {
    song.instrument(id.instrument)?.samples.get(id.sample as usize)
}

/// The source stamps `midi_out_queue` entries with the sample offset inside
/// the render block the event fired at; every event here fires at a tick
/// boundary, i.e. the start of whatever chunk `begin_tick` is about to mix,
/// which `run_block` doesn't thread through to this call. Recorded as `0`
/// until a caller needs sub-block MIDI timing precision.
fn num_frames_consumed_placeholder() -> u32 {
    0
}
