//! Instance-safe engine façade (§6): the single entry point a host embeds —
//! load a module, drive its transport, feed it live input, pull rendered
//! audio, persist its configuration. Everything below this layer
//! (`ft2-replayer`, `ft2-mixer`, `ft2-timemap`, `ft2-loader`) is a library
//! with no notion of "the current instance"; this crate is what turns them
//! into one, the way `FT2Instance`/`PluginProcessor` do in the source.

mod config;
mod error;
mod queues;
mod render;
mod transport;

pub use config::{Config, DawSyncConfig, EnvelopePreset, Interpolation, MidiInputConfig, PatternEditorPrefs};
pub use error::{ConfigError, EngineError};
pub use queues::{EngineQueues, MidiOutEvent, MidiOutKind, ScopeSyncEntry};
pub use transport::TransportHint;

use ft2_mixer::{Mixer, VoicePool, NUM_BUSES};
use ft2_replayer::{PlayMode, Replayer};
use ft2_song::channel::SampleId;
use ft2_timemap::TimeMap;
use tracing::{debug, warn};

/// The engine façade. Owns exactly one loaded song at a time — loading a
/// new module discards the previous replayer/voice state outright, per
/// `ft2_instance_load`'s "stop and replace" semantics rather than an
/// incremental diff.
pub struct Engine {
    sample_rate: u32,
    mixer: Mixer,
    voices: VoicePool,
    replayer: Replayer,
    time_map: TimeMap,
    config: Config,
    queues: EngineQueues,

    was_daw_playing: bool,
    last_ppq: f64,

    audio_normalize_mul: f32,
    tick_sample_counter: u32,
    tick_sample_counter_frac: u64,

    bus_l: Vec<Vec<f32>>,
    bus_r: Vec<Vec<f32>>,

    loaded: bool,
}

impl Engine {
    /// Builds an engine with no module loaded; `render`/`render_multi_out`
    /// produce silence until [`Engine::load_module`] succeeds.
    pub fn new(sample_rate: u32) -> Self {
        let config = Config::default();
        let mixer = Self::build_mixer(sample_rate, &config);
        let replayer = Replayer::new(ft2_song::Song::empty(ft2_song::SourceFormat::Xm));
        let voices = VoicePool::new(replayer.channels.len());
        Self {
            sample_rate,
            voices,
            replayer,
            time_map: TimeMap::new(),
            audio_normalize_mul: Self::normalize_mul(&config),
            mixer,
            config,
            queues: EngineQueues::new(),
            was_daw_playing: false,
            last_ppq: 0.0,
            tick_sample_counter: 0,
            tick_sample_counter_frac: 0,
            bus_l: (0..NUM_BUSES).map(|_| Vec::new()).collect(),
            bus_r: (0..NUM_BUSES).map(|_| Vec::new()).collect(),
            loaded: false,
        }
    }

    fn build_mixer(sample_rate: u32, config: &Config) -> Mixer {
        let mut mixer = Mixer::new(sample_rate);
        mixer.set_interpolation(config.interpolation.into());
        mixer.volume_ramping = config.volume_ramp;
        mixer
    }

    fn normalize_mul(config: &Config) -> f32 {
        let boost = config.boost_level.clamp(1, 32) as f32;
        let master = config.master_vol.min(256) as f32;
        (boost * master) / (32.0 * 256.0)
    }

    /// Stops playback and silences every voice, leaving the loaded song in
    /// place (`ft2_instance_stop` plus a voice pool reset, not a full
    /// unload — use [`Engine::load_module`] to replace the song itself).
    pub fn reset(&mut self) {
        self.replayer.stop();
        self.voices.stop_all();
        self.tick_sample_counter = 0;
        self.tick_sample_counter_frac = 0;
        self.was_daw_playing = false;
        self.last_ppq = 0.0;
    }

    /// Changes the render sample rate, rebuilding every rate-derived table
    /// (`ft2_instance_set_sample_rate`, which recomputes `samplesPerTick`
    /// and the period tables from scratch rather than rescaling them).
    pub fn set_sample_rate(&mut self, sample_rate: u32) {
        if sample_rate == self.sample_rate {
            return;
        }
        self.sample_rate = sample_rate;
        self.mixer.set_sample_rate(sample_rate);
        self.time_map.invalidate();
        self.tick_sample_counter = 0;
        self.tick_sample_counter_frac = 0;
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Parses `data` as a tracker module and replaces the currently loaded
    /// song outright (`ft2_instance_load`): every sample is tap-fixed once
    /// up front so the mixer's inner loop never needs a bounds check, the
    /// replayer and voice pool are rebuilt to the song's own channel count,
    /// and the time map is invalidated so the next DAW seek rebuilds it.
    pub fn load_module(&mut self, data: &[u8]) -> Result<(), EngineError> {
        let mut song = match ft2_loader::load_module(data) {
            Ok(song) => song,
            Err(e) => {
                warn!(error = %e, "module load failed");
                return Err(e.into());
            }
        };
        for instrument in &mut song.instruments {
            for sample in &mut instrument.samples {
                sample.fix();
            }
        }

        let num_channels = song.num_channels.max(1) as usize;
        debug!(num_channels, num_patterns = song.patterns.len(), "module loaded");
        self.replayer = Replayer::new(song);
        self.voices = VoicePool::new(num_channels);
        self.time_map.invalidate();
        self.tick_sample_counter = 0;
        self.tick_sample_counter_frac = 0;
        self.was_daw_playing = false;
        self.last_ppq = 0.0;
        self.loaded = true;
        Ok(())
    }

    pub fn is_loaded(&self) -> bool {
        self.loaded
    }

    /// Starts song playback from the order/row the transport is already
    /// sitting at (`ft2_instance_play(instance, FT2_PLAYMODE_SONG, 0)` as
    /// called from `PluginProcessor::processBlock` on a DAW-driven start —
    /// the pattern editor's cursor, not order 0, is what "play" resumes
    /// from).
    fn start_song_playback(&mut self) {
        let order = self.replayer.song.song_pos;
        self.replayer.play(PlayMode::Song, order, 0);
        self.tick_sample_counter = 0;
        self.tick_sample_counter_frac = 0;
    }

    /// Starts song playback at `order`/`row` (§6 "Transport: play").
    pub fn play(&mut self, order: u16, row: u16) {
        self.replayer.play(PlayMode::Song, order, row);
        self.tick_sample_counter = 0;
        self.tick_sample_counter_frac = 0;
    }

    /// Loops a single pattern, ignoring the order list (§4.3 "Play modes").
    pub fn play_pattern(&mut self, pattern: u16, start_row: u16) {
        self.replayer.play_pattern(pattern, start_row);
        self.tick_sample_counter = 0;
        self.tick_sample_counter_frac = 0;
    }

    /// Stops playback and fades every currently-sounding voice out through
    /// its shadow slot rather than cutting it (`ft2_instance_stop`).
    pub fn stop(&mut self) {
        self.replayer.stop();
        self.voices.fade_out_all(self.mixer.rates.quick_vol_ramp_samples, self.mixer.rates.quick_vol_ramp_mul);
        self.tick_sample_counter = 0;
        self.tick_sample_counter_frac = 0;
    }

    /// Seeks without starting or stopping playback (§4.5 "time map
    /// lookup"'s direct counterpart for a host driving position itself
    /// rather than reporting PPQ).
    pub fn set_position(&mut self, order: u16, row: u16) {
        self.replayer.set_position(order, row);
        self.tick_sample_counter = 0;
        self.tick_sample_counter_frac = 0;
    }

    pub fn position(&self) -> (u16, u16) {
        (self.replayer.song.song_pos, self.replayer.song.row)
    }

    pub fn is_playing(&self) -> bool {
        self.replayer.song.playing
    }

    /// Applies one block's DAW transport report ahead of a render call
    /// (§4.6). A no-op once `daw_sync.sync_transport_from_daw` is off.
    pub fn report_transport(&mut self, hint: TransportHint, num_frames: u32) {
        self.service_transport_hint(hint, num_frames);
    }

    /// Live-input note trigger (jam/MIDI-in, §6 "live input"), independent
    /// of whatever the pattern cursor is doing. `mod_depth` is a raw
    /// mod-wheel reading (0..127); `pitch_bend` is a raw pitch-wheel
    /// reading, scaled here by `midi_input.bend_range` (semitones) into the
    /// period offset the replayer applies.
    pub fn trigger_note(
        &mut self,
        channel: usize,
        note: u8,
        instrument: u8,
        volume: u8,
        mod_depth: u8,
        pitch_bend: i16,
    ) -> Result<(), EngineError> {
        let bend_period = (pitch_bend as i32 * self.config.midi_input.bend_range as i32 * 4 / 8192).clamp(i16::MIN as i32, i16::MAX as i32) as i16;
        self.replayer
            .trigger_note(channel, note, instrument, volume, mod_depth, bend_period)
            .map_err(|_| EngineError::InvalidChannel(channel))?;
        for update in self.replayer.update_voices() {
            self.apply_live_update(update);
        }
        Ok(())
    }

    pub fn release_note(&mut self, channel: usize) -> Result<(), EngineError> {
        self.replayer
            .release_note(channel)
            .map_err(|_| EngineError::InvalidChannel(channel))?;
        for update in self.replayer.update_voices() {
            self.apply_live_update(update);
        }
        Ok(())
    }

    /// Triggers a specific instrument/sample pair directly at `offset`
    /// frames into the sample, bypassing the instrument's own
    /// note-to-sample map — used by a sample-preview auditioning UI rather
    /// than normal note-on handling. `note` resolves to a period through the
    /// sample's own `relative_note`/`finetune`, the same table lookup a
    /// pattern-driven trigger uses. `length` caps playback to at most
    /// `length` frames past `offset`, disabling the sample's own loop — a
    /// zero `length` plays the sample out normally (to its end, or looping,
    /// per the sample's own loop settings).
    pub fn play_sample(
        &mut self,
        channel: usize,
        instrument: u8,
        sample: u8,
        note: u8,
        volume: f32,
        offset: u32,
        length: u32,
    ) -> Result<(), EngineError> {
        if channel >= self.voices.len() {
            return Err(EngineError::InvalidChannel(channel));
        }
        let id = SampleId { instrument, sample };
        let generation = self
            .replayer
            .song
            .instrument(instrument)
            .map(|ins| ins.generation(sample))
            .unwrap_or(0);
        let Some(smp) = self.replayer.song.instrument(instrument).and_then(|ins| ins.samples.get(sample as usize)) else {
            return Ok(());
        };
        let period = self.replayer.note_to_period(note, smp.relative_note, smp.finetune).max(1) as u32;
        let linear = self.replayer.song.linear_frequency_table;
        let voice = self.voices.main_mut(channel);
        self.mixer.trigger_voice(voice, id, generation, smp, offset, period, linear);
        if length > 0 {
            voice.loop_kind = ft2_sample::LoopKind::None;
            voice.sample_end = voice.sample_end.min(offset as i64 + length as i64);
        }
        let samples_per_tick = self.mixer.rates.samples_per_tick(self.replayer.song.bpm).0;
        let (main, fade) = self.voices.main_and_fade_mut(channel);
        self.mixer.update_volumes(main, fade, volume, 128, true, true, samples_per_tick);
        Ok(())
    }

    fn apply_live_update(&mut self, update: ft2_replayer::VoiceUpdate) {
        self.apply_voice_update(update);
    }

    /// Current master-gain multiplier applied to every rendered sample
    /// (`ft2_instance_set_audio_amp`'s formula).
    pub fn audio_normalize_mul(&self) -> f32 {
        self.audio_normalize_mul
    }

    pub fn set_boost_level(&mut self, boost_level: u8) {
        self.config.boost_level = boost_level.clamp(1, 32);
        self.audio_normalize_mul = Self::normalize_mul(&self.config);
    }

    pub fn set_master_vol(&mut self, master_vol: u16) {
        self.config.master_vol = master_vol.min(256);
        self.audio_normalize_mul = Self::normalize_mul(&self.config);
    }

    pub fn set_interpolation(&mut self, mode: Interpolation) {
        self.config.interpolation = mode;
        self.mixer.set_interpolation(mode.into());
    }

    pub fn set_volume_ramping(&mut self, enabled: bool) {
        self.config.volume_ramp = enabled;
        self.mixer.volume_ramping = enabled;
    }

    /// Routes channel `ch` to `bus` (§4.4 "Multi-bus output"); out-of-range
    /// buses are left to [`Engine::render_multi_out`]'s own modulo clamp
    /// (§7 `InvalidParameter`) rather than rejected here.
    pub fn set_channel_routing(&mut self, ch: usize, bus: u8) {
        if let Some(slot) = self.config.channel_routing.get_mut(ch) {
            *slot = bus;
        }
    }

    pub fn set_channel_to_main(&mut self, ch: usize, to_main: bool) {
        if let Some(slot) = self.config.channel_to_main.get_mut(ch) {
            *slot = to_main;
        }
    }

    /// Current configuration, for a host UI that wants to read it back
    /// between edits rather than only at load/save time.
    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn queues_mut(&mut self) -> &mut EngineQueues {
        &mut self.queues
    }

    /// Serializes the current configuration (§6 "Persistence").
    pub fn save_config(&self) -> Vec<u8> {
        self.config.save()
    }

    /// Restores a previously-saved configuration and applies every knob it
    /// carries to the live mixer/voice state (`ft2_config_apply`).
    pub fn load_config(&mut self, bytes: &[u8]) -> Result<(), ConfigError> {
        let config = Config::load(bytes)?;
        self.mixer.set_interpolation(config.interpolation.into());
        self.mixer.volume_ramping = config.volume_ramp;
        self.config = config;
        self.audio_normalize_mul = Self::normalize_mul(&self.config);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ft2_sample::{BitDepth, Sample, SampleParams};
    use ft2_song::instrument::Instrument;
    use ft2_song::note::Note;
    use ft2_song::pattern::Pattern;
    use ft2_song::{Song, SourceFormat};

    /// One channel, one two-row pattern: a note at row 0, nothing at row 1.
    /// The instrument's single sample is an audible (non-zero, unlooped)
    /// 16-bit square wave, long enough to still be playing at the end of a
    /// short render.
    fn audible_song() -> Song {
        let mut song = Song::empty(SourceFormat::Xm);
        song.num_channels = 1;
        song.song_length = 1;
        song.orders[0] = 0;
        song.bpm = 125;
        song.speed = 6;

        let mut pattern = Pattern::new(2, 1);
        pattern.set(0, 0, Note { note: 49, instr: 1, vol: 0, efx: 0, efx_data: 0 }); // C-4
        song.patterns.push(pattern);

        let params = SampleParams { bit_depth: BitDepth::Sixteen, length: 4000, ..Default::default() };
        let pcm: Vec<u8> = (0..4000i32).flat_map(|i| (((i % 64) * 500 - 16000) as i16).to_le_bytes()).collect();
        let mut sample = Sample::load(params, &pcm).unwrap();
        sample.fix();

        let mut instrument = Instrument::default();
        instrument.samples.push(sample);
        instrument.note_sample_map = [0; ft2_song::instrument::NOTE_SAMPLE_MAP_LEN];
        song.instruments.push(instrument);

        song
    }

    #[test]
    fn new_engine_is_unloaded_and_silent() {
        let mut engine = Engine::new(48000);
        assert!(!engine.is_loaded());
        let mut l = vec![1.0f32; 64];
        let mut r = vec![1.0f32; 64];
        engine.render(&mut l, &mut r);
        assert!(l.iter().all(|&s| s == 0.0));
        assert!(r.iter().all(|&s| s == 0.0));
    }

    #[test]
    fn playing_a_loaded_song_produces_audible_output() {
        let mut engine = Engine::new(48000);
        engine.replayer = Replayer::new(audible_song());
        engine.voices = VoicePool::new(engine.replayer.channels.len());
        engine.loaded = true;

        engine.play(0, 0);
        assert!(engine.is_playing());

        let mut l = vec![0.0f32; 2048];
        let mut r = vec![0.0f32; 2048];
        engine.render(&mut l, &mut r);

        assert!(l.iter().any(|&s| s != 0.0), "expected some audible output after triggering a note");
        assert!(l.iter().all(|&s| (-1.0..=1.0).contains(&s)));
        assert!(r.iter().all(|&s| (-1.0..=1.0).contains(&s)));
    }

    #[test]
    fn stop_fades_voices_and_halts_the_transport() {
        let mut engine = Engine::new(48000);
        engine.replayer = Replayer::new(audible_song());
        engine.voices = VoicePool::new(engine.replayer.channels.len());
        engine.play(0, 0);

        let mut l = vec![0.0f32; 64];
        let mut r = vec![0.0f32; 64];
        engine.render(&mut l, &mut r);

        engine.stop();
        assert!(!engine.is_playing());
    }

    #[test]
    fn trigger_note_on_invalid_channel_errs() {
        let mut engine = Engine::new(48000);
        assert!(engine.trigger_note(99, 49, 1, 64, 0, 0).is_err());
    }

    #[test]
    fn boost_and_master_vol_are_clamped_into_normalize_mul() {
        let mut engine = Engine::new(48000);
        engine.set_boost_level(200); // clamps to 32
        engine.set_master_vol(9000); // clamps to 256
        let expected = (32.0f32 * 256.0) / (32.0 * 256.0);
        assert!((engine.audio_normalize_mul() - expected).abs() < 1e-6);
    }

    #[test]
    fn config_round_trips_through_the_engine() {
        let mut engine = Engine::new(48000);
        engine.set_boost_level(16);
        engine.set_interpolation(Interpolation::None);
        let bytes = engine.save_config();

        let mut other = Engine::new(48000);
        other.load_config(&bytes).unwrap();
        assert_eq!(other.config().boost_level, 16);
        assert_eq!(other.config().interpolation, Interpolation::None);
    }
}
