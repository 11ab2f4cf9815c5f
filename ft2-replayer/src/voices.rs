//! Per-tick channel → voice translation (`ft2_update_voices`): drains each
//! channel's accumulated [`ChannelStatus`] bits into a flat list of
//! instructions for the host's mixer. This crate never touches
//! `ft2_mixer` directly — keeping the tick algorithm free of mixer/alloc
//! concerns (see the crate-level doc comment).

use ft2_song::channel::SampleId;
use ft2_song::ChannelStatus;

use crate::Replayer;

/// What a host should apply to channel `channel`'s voice this tick, derived
/// from the channel's final (post-effect, post-envelope) state
/// (§4.3 "Status flags").
#[derive(Debug, Clone, Copy)]
pub struct VoiceUpdate {
    pub channel: usize,
    pub update_volume: bool,
    pub update_pan: bool,
    pub update_period: bool,
    pub trigger: bool,
    pub quick_ramp: bool,
    pub volume: f32,
    pub panning: u8,
    pub period: i32,
    pub sample_id: Option<SampleId>,
    pub sample_generation: u32,
    pub start_pos: u32,
}

impl Replayer {
    /// Drains every channel's accumulated status flags into voice updates,
    /// clearing the flags as it goes. Channels with no pending update, or
    /// that are off/muted, contribute nothing (`ft2_update_voices`).
    pub fn update_voices(&mut self) -> Vec<VoiceUpdate> {
        let mut updates = Vec::with_capacity(self.channels.len());

        for i in 0..self.channels.len() {
            let ch = &mut self.channels[i];
            let status = ch.status;
            if status == ChannelStatus::empty() {
                continue;
            }
            ch.status = ChannelStatus::empty();

            if ch.channel_off || ch.mute {
                continue;
            }

            updates.push(VoiceUpdate {
                channel: i,
                update_volume: status.contains(ChannelStatus::UPDATE_VOL),
                update_pan: status.contains(ChannelStatus::UPDATE_PAN),
                update_period: status.contains(ChannelStatus::UPDATE_PERIOD),
                trigger: status.contains(ChannelStatus::TRIGGER_VOICE),
                quick_ramp: status.contains(ChannelStatus::USE_QUICK_VOLRAMP),
                volume: ch.final_vol,
                panning: ch.final_pan,
                period: ch.final_period,
                sample_id: ch.sample_id,
                sample_generation: ch.sample_generation,
                start_pos: ch.smp_start_pos,
            });
        }

        updates
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ft2_song::{Song, SourceFormat};

    #[test]
    fn no_status_produces_no_update() {
        let song = Song::empty(SourceFormat::Xm);
        let mut rep = Replayer::new(song);
        assert!(rep.update_voices().is_empty());
    }

    #[test]
    fn pending_status_is_drained_and_cleared() {
        let song = Song::empty(SourceFormat::Xm);
        let mut rep = Replayer::new(song);
        rep.channels[0].status.set(ChannelStatus::UPDATE_VOL);
        rep.channels[0].final_vol = 0.5;

        let updates = rep.update_voices();
        assert_eq!(updates.len(), 1);
        assert_eq!(updates[0].channel, 0);
        assert!(updates[0].update_volume);
        assert_eq!(rep.channels[0].status, ChannelStatus::empty());

        assert!(rep.update_voices().is_empty());
    }

    #[test]
    fn muted_channel_is_skipped_but_status_still_cleared() {
        let song = Song::empty(SourceFormat::Xm);
        let mut rep = Replayer::new(song);
        rep.channels[0].mute = true;
        rep.channels[0].status.set(ChannelStatus::UPDATE_VOL);

        assert!(rep.update_voices().is_empty());
        assert_eq!(rep.channels[0].status, ChannelStatus::empty());
    }
}
