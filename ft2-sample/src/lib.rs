//! Tap-padded sample store.
//!
//! Owns decoded PCM plus the scratch tap regions the mixer needs to stay
//! branchless across loop seams and sample boundaries. A [`Sample`] is
//! either *unfixed* (data reflects the source exactly, safe to edit) or
//! *fixed* (tap regions rewritten, safe to play) — never both at once.

mod error;
mod tap;

pub use error::SampleError;
pub use tap::{MAX_LEFT_TAPS, MAX_RIGHT_TAPS, TapBuffer};

/// Bit depth a sample's PCM was decoded to. Stereo sources are down-mixed to
/// mono at load time; FT2 samples are always mono internally.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BitDepth {
    Eight,
    Sixteen,
}

/// Loop mode for sample playback
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopKind {
    None,
    Forward,
    PingPong,
}

/// Parameters needed to build a [`Sample`] from raw decoded PCM
#[derive(Debug, Clone, Copy)]
pub struct SampleParams {
    pub bit_depth: BitDepth,
    pub length: u32,
    pub loop_kind: LoopKind,
    pub loop_start: u32,
    pub loop_length: u32,
    pub volume: u8,
    pub panning: u8,
    pub relative_note: i8,
    pub finetune: i8,
}

impl Default for SampleParams {
    fn default() -> Self {
        Self {
            bit_depth: BitDepth::Eight,
            length: 0,
            loop_kind: LoopKind::None,
            loop_start: 0,
            loop_length: 0,
            volume: 64,
            panning: 128,
            relative_note: 0,
            finetune: 0,
        }
    }
}

enum SampleData {
    Eight(TapBuffer<i8>),
    Sixteen(TapBuffer<i16>),
}

/// A decoded, tap-padded sample.
pub struct Sample {
    pub loop_kind: LoopKind,
    pub loop_start: u32,
    pub loop_length: u32,
    pub volume: u8,
    pub panning: u8,
    pub relative_note: i8,
    pub finetune: i8,
    data: SampleData,
    /// Absolute frame position where the right tap region begins (`length`
    /// for no-loop, `loop_start + loop_length` for the two loop modes);
    /// meaningful only while `is_fixed`.
    fixed_pos: u32,
    fixed_smp: Option<[i64; MAX_RIGHT_TAPS]>,
    is_fixed: bool,
}

impl Default for Sample {
    /// An empty 8-bit, zero-length, unlooped sample.
    fn default() -> Self {
        Sample::load(SampleParams::default(), &[]).expect("empty sample never truncates")
    }
}

impl Sample {
    /// Allocates a tap-padded sample, copies `pcm_bytes` into it and runs
    /// [`Sample::sanitize`]. `pcm_bytes` must hold at least `length` frames
    /// (1 byte/frame for 8-bit, 2 little-endian bytes/frame for 16-bit).
    pub fn load(params: SampleParams, pcm_bytes: &[u8]) -> Result<Sample, SampleError> {
        let data = match params.bit_depth {
            BitDepth::Eight => {
                if pcm_bytes.len() < params.length as usize {
                    return Err(SampleError::Truncated);
                }
                let mut buf = TapBuffer::<i8>::new(params.length);
                for (dst, &src) in buf.data_mut().iter_mut().zip(pcm_bytes.iter()) {
                    *dst = src as i8;
                }
                SampleData::Eight(buf)
            }
            BitDepth::Sixteen => {
                let needed = params.length as usize * 2;
                if pcm_bytes.len() < needed {
                    return Err(SampleError::Truncated);
                }
                let mut buf = TapBuffer::<i16>::new(params.length);
                for (dst, chunk) in buf.data_mut().iter_mut().zip(pcm_bytes.chunks_exact(2)) {
                    *dst = i16::from_le_bytes([chunk[0], chunk[1]]);
                }
                SampleData::Sixteen(buf)
            }
        };

        let mut sample = Sample {
            loop_kind: params.loop_kind,
            loop_start: params.loop_start,
            loop_length: params.loop_length,
            volume: params.volume,
            panning: params.panning,
            relative_note: params.relative_note,
            finetune: params.finetune,
            data,
            fixed_pos: 0,
            fixed_smp: None,
            is_fixed: false,
        };
        sample.sanitize();
        Ok(sample)
    }

    pub fn bit_depth(&self) -> BitDepth {
        match &self.data {
            SampleData::Eight(_) => BitDepth::Eight,
            SampleData::Sixteen(_) => BitDepth::Sixteen,
        }
    }

    pub fn length(&self) -> u32 {
        match &self.data {
            SampleData::Eight(b) => b.length(),
            SampleData::Sixteen(b) => b.length(),
        }
    }

    pub fn is_fixed(&self) -> bool {
        self.is_fixed
    }

    /// Clamps out-of-range parameters and drops an invalid loop. Never
    /// fails; invalid input is corrected, matching §7's `InvalidParameter`
    /// policy (clamp, never surface).
    pub fn sanitize(&mut self) {
        self.volume = self.volume.min(64);
        self.relative_note = self.relative_note.clamp(-48, 71);

        let length = self.length();
        let loop_end = self.loop_start.saturating_add(self.loop_length);
        if self.loop_kind != LoopKind::None && (self.loop_length == 0 || loop_end > length) {
            self.loop_kind = LoopKind::None;
            self.loop_start = 0;
            self.loop_length = 0;
        }
    }

    /// Rewrites the tap regions so the mixer's inner loop never needs a
    /// bounds or seam check. No-op if already fixed or if the sample holds
    /// no data.
    pub fn fix(&mut self) {
        if self.is_fixed || self.length() == 0 {
            return;
        }

        let (fixed_pos, saved) = match self.loop_kind {
            LoopKind::None => {
                let pos = self.length();
                let saved = match &mut self.data {
                    SampleData::Eight(b) => b.fix_no_loop(),
                    SampleData::Sixteen(b) => b.fix_no_loop(),
                };
                (pos, saved)
            }
            LoopKind::Forward => {
                let pos = self.loop_start + self.loop_length;
                let saved = match &mut self.data {
                    SampleData::Eight(b) => b.fix_forward_loop(self.loop_start, self.loop_length),
                    SampleData::Sixteen(b) => {
                        b.fix_forward_loop(self.loop_start, self.loop_length)
                    }
                };
                (pos, saved)
            }
            LoopKind::PingPong => {
                let pos = self.loop_start + self.loop_length;
                let saved = match &mut self.data {
                    SampleData::Eight(b) => b.fix_ping_pong(self.loop_start, self.loop_length),
                    SampleData::Sixteen(b) => b.fix_ping_pong(self.loop_start, self.loop_length),
                };
                (pos, saved)
            }
        };

        self.fixed_pos = fixed_pos;
        self.fixed_smp = Some(saved);
        self.is_fixed = true;
    }

    /// Restores the bytes under the right tap region. No-op if not fixed.
    pub fn unfix(&mut self) {
        if !self.is_fixed {
            return;
        }
        if let Some(saved) = self.fixed_smp.take() {
            let from = self.fixed_pos as i64;
            match &mut self.data {
                SampleData::Eight(b) => b.unfix(from, &saved),
                SampleData::Sixteen(b) => b.unfix(from, &saved),
            }
        }
        self.is_fixed = false;
    }

    /// Reads the frame at absolute position `pos`, normalised to a common
    /// `i32` domain (8-bit values scaled up by 256) for mixer consumption.
    #[inline]
    pub fn frame_i32(&self, pos: i64) -> i32 {
        match &self.data {
            SampleData::Eight(b) => (b.frame(pos) as i32) << 8,
            SampleData::Sixteen(b) => b.frame(pos) as i32,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn square_wave(len: usize) -> Vec<u8> {
        (0..len).map(|i| if i % 2 == 0 { 64 } else { 192 }).collect()
    }

    #[test]
    fn sanitize_clamps_volume_and_drops_invalid_loop() {
        let params = SampleParams {
            bit_depth: BitDepth::Eight,
            length: 8,
            loop_kind: LoopKind::Forward,
            loop_start: 4,
            loop_length: 100, // loop_end way past length -> dropped
            volume: 200,
            ..Default::default()
        };
        let sample = Sample::load(params, &square_wave(8)).unwrap();
        assert_eq!(sample.volume, 64);
        assert_eq!(sample.loop_kind, LoopKind::None);
    }

    #[test]
    fn fix_unfix_round_trip() {
        let params = SampleParams {
            bit_depth: BitDepth::Sixteen,
            length: 32,
            loop_kind: LoopKind::Forward,
            loop_start: 8,
            loop_length: 24,
            ..Default::default()
        };
        let pcm: Vec<u8> = (0..32u16)
            .flat_map(|v| (v as i16).to_le_bytes())
            .collect();
        let mut sample = Sample::load(params, &pcm).unwrap();

        let before: Vec<i32> = (0..32).map(|i| sample.frame_i32(i)).collect();
        sample.fix();
        assert!(sample.is_fixed());
        sample.unfix();
        assert!(!sample.is_fixed());
        let after: Vec<i32> = (0..32).map(|i| sample.frame_i32(i)).collect();
        assert_eq!(before, after);
    }

    #[test]
    fn truncated_pcm_is_rejected() {
        let params = SampleParams {
            bit_depth: BitDepth::Sixteen,
            length: 10,
            ..Default::default()
        };
        let err = Sample::load(params, &[0u8; 4]).unwrap_err();
        assert_eq!(err, SampleError::Truncated);
    }
}
