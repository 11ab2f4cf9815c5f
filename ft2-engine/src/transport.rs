//! DAW transport-hint servicing (§4.6, grounded in
//! `PluginProcessor::processBlock`'s `syncTransportFromDAW` block): a host
//! reports its own play state once per render call and this façade maps
//! that onto `play`/`stop`, BPM and position, instead of a UI driving the
//! replayer directly.

use ft2_timemap::TimeMapConfig;
use tracing::debug;

use crate::Engine;

/// What the host observed from its own transport this block.
#[derive(Debug, Clone, Copy)]
pub struct TransportHint {
    pub playing: bool,
    pub bpm: Option<u16>,
    pub ppq_position: Option<f64>,
}

impl Engine {
    /// Applies one block's transport hint, honouring the `Config` DAW-sync
    /// toggles. A no-op if `daw_sync.sync_transport_from_daw` is off —
    /// the host is then expected to drive `play`/`stop` directly.
    pub(crate) fn service_transport_hint(&mut self, hint: TransportHint, num_frames: u32) {
        if !self.config.daw_sync.sync_transport_from_daw {
            return;
        }

        let just_started = hint.playing && !self.was_daw_playing;
        if just_started {
            if !self.replayer.song.playing {
                debug!("DAW transport started, resuming song playback");
                self.start_song_playback();
            }
        } else if !hint.playing && self.was_daw_playing && self.replayer.song.playing {
            debug!("DAW transport stopped, fading voices out");
            self.replayer.stop();
            self.voices.fade_out_all(self.mixer.rates.quick_vol_ramp_samples, self.mixer.rates.quick_vol_ramp_mul);
        }
        self.was_daw_playing = hint.playing;

        if self.config.daw_sync.sync_bpm_from_daw {
            if let Some(bpm) = hint.bpm {
                if (32..=255).contains(&bpm) && self.replayer.song.bpm != bpm {
                    self.replayer.set_bpm(bpm);
                }
            }
        }

        if self.config.daw_sync.sync_position_from_daw && hint.playing {
            if let (Some(ppq), Some(bpm)) = (hint.ppq_position, hint.bpm) {
                self.service_position_hint(ppq, bpm, num_frames, just_started);
            }
        }
    }

    /// Seek detection: a PPQ jump bigger than `2x` the block's expected
    /// advance, or any backwards motion, is treated as a DAW-side seek and
    /// resolved through the BPM-invariant time map rather than a raw BPM
    /// conversion.
    fn service_position_hint(&mut self, ppq: f64, bpm: u16, num_frames: u32, just_started: bool) {
        let buffer_seconds = num_frames as f64 / self.sample_rate.max(1) as f64;
        let expected_advance = buffer_seconds * bpm as f64 / 60.0;
        let ppq_delta = ppq - self.last_ppq;
        let is_seek = ppq_delta < -0.01 || ppq_delta > expected_advance * 2.0 + 0.5;

        if is_seek || just_started {
            let time_map_config = TimeMapConfig {
                allow_fxx_speed_changes: self.config.daw_sync.allow_fxx_speed_changes,
                locked_speed: self.config.daw_sync.locked_speed,
            };
            if let Some((song_pos, row, loop_counter, loop_start_row)) =
                self.time_map.lookup(&self.replayer.song, &time_map_config, ppq)
            {
                debug!(ppq, song_pos, row, "DAW seek resolved through time map");
                self.replayer.set_position(song_pos, row);
                self.replayer.song.pattern_loop_counter = loop_counter;
                self.replayer.song.pattern_loop_start_row = loop_start_row;
                self.replayer.song.pattern_loop_state_set = true;
                for ch in &mut self.replayer.channels {
                    ch.effects.pattern_loop_row = 0;
                    ch.effects.pattern_loop_count = 0;
                }
            }
        }

        self.last_ppq = ppq;
    }
}
