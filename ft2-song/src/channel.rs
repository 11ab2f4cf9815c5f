//! Replayer state for one pattern column.

use crate::envelope::Envelope;

/// Accumulates what `update_voices` needs to consume after a tick's effect
/// processing (§4.3 "Status flags"), hand-rolled the same way the pack's
/// `FormatFlags` is — a plain bitmask, no external crate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ChannelStatus(u8);

impl ChannelStatus {
    pub const UPDATE_VOL: Self = Self(0x01);
    pub const UPDATE_PAN: Self = Self(0x02);
    pub const UPDATE_PERIOD: Self = Self(0x04);
    pub const TRIGGER_VOICE: Self = Self(0x08);
    pub const USE_QUICK_VOLRAMP: Self = Self(0x10);

    pub const fn empty() -> Self {
        Self(0)
    }

    pub const fn contains(&self, other: Self) -> bool {
        (self.0 & other.0) == other.0
    }

    pub fn set(&mut self, other: Self) {
        self.0 |= other.0;
    }

    pub fn clear(&mut self) {
        self.0 = 0;
    }
}

impl std::ops::BitOr for ChannelStatus {
    type Output = Self;
    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

/// Non-owning reference to a sample inside an instrument, paired with the
/// generation the channel last observed (§9: index + generation instead of
/// a raw pointer, to catch a sample edited out from under a playing voice).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SampleId {
    pub instrument: u8,
    pub sample: u8,
}

/// Per-effect "memory" bytes FT2 channels carry between rows — every slide
/// speed, vibrato/tremolo phase and retrigger counter an effect needs to
/// recall "last non-zero parameter" semantics.
#[derive(Debug, Clone, Copy, Default)]
pub struct EffectMemory {
    pub porta_up_speed: u8,
    pub porta_down_speed: u8,
    pub tone_porta_speed: u8,
    pub tone_porta_target: i32,
    pub glissando: bool,

    pub vibrato_pos: u8,
    pub vibrato_speed: u8,
    pub vibrato_depth: u8,
    /// Full E4x param nibble (0-15), not pre-masked: bits 0-1 select the
    /// waveform at the point of use (`&3`), bit 2 (`&4`) suppresses the
    /// phase reset that `trigger_instrument` would otherwise do.
    pub vibrato_ctrl: u8,

    pub tremolo_pos: u8,
    pub tremolo_speed: u8,
    pub tremolo_depth: u8,
    /// Full E7x param nibble (0-15); same `&3` waveform / `&4` no-retrigger
    /// split as `vibrato_ctrl`.
    pub tremolo_ctrl: u8,

    pub vol_slide_speed: u8,
    pub global_vol_slide_speed: u8,
    pub pan_slide_speed: u8,

    pub pattern_loop_row: u16,
    pub pattern_loop_count: u8,

    pub fine_pitch_up: u8,
    pub fine_pitch_down: u8,
    pub extra_fine_pitch_up: u8,
    pub extra_fine_pitch_down: u8,
    pub fine_vol_up: u8,
    pub fine_vol_down: u8,

    pub sample_offset_high: u8,

    /// `0` no slide in progress, `1` real_period rising toward target,
    /// `2` real_period falling toward target (3xx/5xx tone portamento).
    pub portamento_direction: u8,

    pub retrig_counter: u8,
    pub retrig_speed: u8,
    pub retrig_vol: u8,

    /// High bit: on/off half of the current Txy cycle. Low 7 bits: ticks
    /// left in that half (`ft2_channel_t::tremorPos`).
    pub tremor_pos: u8,
    pub tremor_param: u8,
}

/// One pattern column's worth of replayer state.
pub struct Channel {
    /// Last note number the channel actually triggered (`note == 0` in a
    /// row means "reuse this", e.g. for Rxy/E9x retriggers).
    pub note: u8,
    pub instrument_idx: u8,
    pub sample_id: Option<SampleId>,
    pub sample_generation: u32,
    pub relative_note: i8,
    pub finetune: i8,

    /// This row's volume-column byte, cached for effects that read it back
    /// (Rxy's tick-zero fire decision, note-delay's deferred vol-col).
    pub vol_column_vol: u8,
    /// Effect column of the last row read, held for the duration of the
    /// row (every tick's `handleEffects_TickNonZero` dispatches on these,
    /// not on a re-read of the pattern).
    pub efx: u8,
    pub efx_data: u8,
    /// Sample defaults latched at the last trigger, restored by `K00`/
    /// note-delay's `resetVolumes`.
    pub old_vol: u8,
    pub old_pan: u8,

    pub real_period: i32,
    pub out_period: i32,
    pub final_period: i32,

    pub real_vol: u8,
    pub out_vol: u8,
    /// Fully resolved linear gain (`0.0..=1.0`), folding in global volume,
    /// fadeout and the volume envelope — fed straight to
    /// `ft2_mixer::Mixer::update_volumes` (§4.3 "`ch->fFinalVol`").
    pub final_vol: f32,

    pub real_pan: u8,
    pub out_pan: u8,
    pub final_pan: u8,

    pub fadeout: u16,
    pub fadeout_speed: u16,
    pub key_off: bool,

    pub vol_envelope: Envelope,
    pub vol_env_tick: u16,
    pub vol_env_point: u8,
    pub vol_env_value: f32,

    pub pan_envelope: Envelope,
    pub pan_env_tick: u16,
    pub pan_env_point: u8,
    pub pan_env_value: f32,

    pub autovib_tick: u16,
    pub autovib_pos: u8,
    pub autovib_amp: f32,
    pub autovib_sweep: f32,

    pub effects: EffectMemory,

    pub status: ChannelStatus,
    pub smp_start_pos: u32,

    /// Set for columns beyond the song's channel count (MOD padding) or
    /// explicitly disabled; such channels still run pattern-loop/delay
    /// bookkeeping but nothing else (§4.3 `handleMoreEffects_TickZero`).
    pub channel_off: bool,
    /// Per-instrument mute, independent of `channel_off`.
    pub mute: bool,
    /// `(instr << 8) | note` latched at row-read time, replayed by `EDx`
    /// note-delay once its tick arrives.
    pub copy_of_instr_and_note: u16,

    pub midi_last_note: Option<u8>,
    pub midi_active: bool,
}

impl Default for Channel {
    fn default() -> Self {
        Self {
            note: 0,
            instrument_idx: 0,
            sample_id: None,
            sample_generation: 0,
            relative_note: 0,
            finetune: 0,
            vol_column_vol: 0,
            efx: 0,
            efx_data: 0,
            old_vol: 0,
            old_pan: 128,
            real_period: 0,
            out_period: 0,
            final_period: 0,
            real_vol: 0,
            out_vol: 0,
            final_vol: 0.0,
            real_pan: 128,
            out_pan: 128,
            final_pan: 128,
            fadeout: 65535,
            fadeout_speed: 0,
            key_off: false,
            vol_envelope: Envelope::default(),
            vol_env_tick: 0,
            vol_env_point: 0,
            vol_env_value: 64.0,
            pan_envelope: Envelope::default(),
            pan_env_tick: 0,
            pan_env_point: 0,
            pan_env_value: 32.0,
            autovib_tick: 0,
            autovib_pos: 0,
            autovib_amp: 0.0,
            autovib_sweep: 0.0,
            effects: EffectMemory::default(),
            status: ChannelStatus::empty(),
            smp_start_pos: 0,
            channel_off: false,
            mute: false,
            copy_of_instr_and_note: 0,
            midi_last_note: None,
            midi_active: false,
        }
    }
}

impl Channel {
    pub fn reset(&mut self) {
        *self = Channel::default();
    }
}
