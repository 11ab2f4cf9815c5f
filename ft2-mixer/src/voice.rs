//! Per-column mixer playback state, plus its fade-out shadow slot (§3
//! "Voice").

use ft2_sample::LoopKind;
use ft2_song::channel::SampleId;

/// One playback slot. A channel owns two: the live voice and a shadow used
/// to ramp a just-retriggered voice's previous take out to silence.
#[derive(Debug, Clone)]
pub struct Voice {
    pub active: bool,
    pub sample_id: Option<SampleId>,
    pub generation: u32,

    pub position: i64,
    pub position_frac: u32,
    pub delta: u64,

    pub loop_kind: LoopKind,
    pub loop_start: u32,
    pub loop_length: u32,
    pub sample_end: i64,
    pub sampling_backwards: bool,
    pub has_looped: bool,

    pub panning: u8,
    pub fvolume: f32,
    pub curr_volume_l: f32,
    pub curr_volume_r: f32,
    pub target_volume_l: f32,
    pub target_volume_r: f32,
    pub volume_l_delta: f32,
    pub volume_r_delta: f32,
    pub volume_ramp_length: u32,

    pub is_fade_out_voice: bool,
}

impl Default for Voice {
    fn default() -> Self {
        Self {
            active: false,
            sample_id: None,
            generation: 0,
            position: 0,
            position_frac: 0,
            delta: 0,
            loop_kind: LoopKind::None,
            loop_start: 0,
            loop_length: 0,
            sample_end: 0,
            sampling_backwards: false,
            has_looped: false,
            panning: 128,
            fvolume: 0.0,
            curr_volume_l: 0.0,
            curr_volume_r: 0.0,
            target_volume_l: 0.0,
            target_volume_r: 0.0,
            volume_l_delta: 0.0,
            volume_r_delta: 0.0,
            volume_ramp_length: 0,
            is_fade_out_voice: false,
        }
    }
}

impl Voice {
    pub fn silence(&mut self) {
        *self = Voice::default();
    }

    pub fn is_silent(&self) -> bool {
        self.volume_ramp_length == 0 && self.curr_volume_l == 0.0 && self.curr_volume_r == 0.0
    }

    /// Whether this voice is currently playing the sample identified by
    /// `id` (§3 "stop or evict every voice currently referencing it").
    pub fn references(&self, id: SampleId) -> bool {
        self.active && self.sample_id == Some(id)
    }
}

/// Main voice + fade-out shadow voice for every channel.
pub struct VoicePool {
    main: Vec<Voice>,
    fade: Vec<Voice>,
}

impl VoicePool {
    pub fn new(num_channels: usize) -> Self {
        Self {
            main: vec![Voice::default(); num_channels],
            fade: vec![Voice::default(); num_channels],
        }
    }

    pub fn len(&self) -> usize {
        self.main.len()
    }

    pub fn is_empty(&self) -> bool {
        self.main.is_empty()
    }

    pub fn main(&self, ch: usize) -> &Voice {
        &self.main[ch]
    }

    pub fn main_mut(&mut self, ch: usize) -> &mut Voice {
        &mut self.main[ch]
    }

    pub fn fade_mut(&mut self, ch: usize) -> &mut Voice {
        &mut self.fade[ch]
    }

    /// Both halves of a channel's voice slot at once, for
    /// `Mixer::update_volumes`'s retrigger-fade handoff.
    pub fn main_and_fade_mut(&mut self, ch: usize) -> (&mut Voice, &mut Voice) {
        (&mut self.main[ch], &mut self.fade[ch])
    }

    pub fn stop(&mut self, ch: usize) {
        self.main[ch].silence();
        self.fade[ch].silence();
    }

    pub fn stop_all(&mut self) {
        for v in self.main.iter_mut().chain(self.fade.iter_mut()) {
            v.silence();
        }
    }

    /// Moves every active, audible voice to its fade-out slot with a quick
    /// ramp to zero (§4.4 shadow fade-out voice), used by e.g. a global stop.
    pub fn fade_out_all(&mut self, quick_ramp_samples: u32, quick_ramp_mul: f32) {
        for (main, fade) in self.main.iter_mut().zip(self.fade.iter_mut()) {
            if !main.active || (main.curr_volume_l == 0.0 && main.curr_volume_r == 0.0) {
                continue;
            }
            *fade = main.clone();
            fade.volume_ramp_length = quick_ramp_samples;
            fade.volume_l_delta = -fade.curr_volume_l * quick_ramp_mul;
            fade.volume_r_delta = -fade.curr_volume_r * quick_ramp_mul;
            fade.target_volume_l = 0.0;
            fade.target_volume_r = 0.0;
            fade.is_fade_out_voice = true;
            main.silence();
        }
    }

    /// Stops every voice (main and fade) that currently references `id`,
    /// per invariant 7 ("voice ownership safety").
    pub fn stop_referencing(&mut self, id: SampleId) {
        for v in self.main.iter_mut().chain(self.fade.iter_mut()) {
            if v.references(id) {
                v.silence();
            }
        }
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Voice> {
        self.main.iter_mut().chain(self.fade.iter_mut())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stop_referencing_clears_main_and_fade() {
        let id = SampleId { instrument: 1, sample: 0 };
        let mut pool = VoicePool::new(2);
        pool.main_mut(0).active = true;
        pool.main_mut(0).sample_id = Some(id);
        pool.fade_mut(0).active = true;
        pool.fade_mut(0).sample_id = Some(id);

        pool.stop_referencing(id);
        assert!(!pool.main(0).active);
    }
}
