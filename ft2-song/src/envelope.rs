//! Volume / panning envelopes: up to 12 `(tick, value)` points, evaluated by
//! float-domain linear interpolation (§4.3 "Envelope evaluation").

pub const MAX_ENVELOPE_POINTS: usize = 12;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize, serde::Deserialize)]
pub struct EnvelopePoint {
    pub tick: u16,
    pub value: u16,
}

#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize)]
pub struct Envelope {
    pub points: Vec<EnvelopePoint>,
    pub sustain_point: Option<u8>,
    pub loop_start: Option<u8>,
    pub loop_end: Option<u8>,
    pub enabled: bool,
    pub sustain_enabled: bool,
    pub loop_enabled: bool,
}

impl Envelope {
    pub fn is_enabled(&self) -> bool {
        self.enabled && !self.points.is_empty()
    }

    fn point(&self, idx: u8) -> Option<EnvelopePoint> {
        self.points.get(idx as usize).copied()
    }

    /// Advances the envelope cursor by one tick and returns the new
    /// interpolated value. `tick` and `point_idx` are owned by the caller
    /// (one per channel per envelope).
    ///
    /// `key_off` gates sustain: while not key-released and the cursor sits
    /// on the sustain point, the tick freezes there.
    pub fn step(&self, tick: &mut u16, point_idx: &mut u8, key_off: bool) -> f32 {
        if !self.is_enabled() {
            return 0.0;
        }

        let last = (self.points.len() - 1) as u8;
        if *point_idx >= last {
            return self.point(last).map(|p| p.value as f32).unwrap_or(0.0);
        }

        let sustaining = self.sustain_enabled
            && !key_off
            && self.sustain_point == Some(*point_idx)
            && self
                .point(*point_idx)
                .is_some_and(|p| *tick == p.tick);
        if sustaining {
            return self.point(*point_idx).unwrap().value as f32;
        }

        let cur = self.point(*point_idx).unwrap();
        let next = self.point(*point_idx + 1).unwrap();

        let value = if next.tick > cur.tick {
            let span = (next.tick - cur.tick) as f32;
            let frac = (*tick - cur.tick) as f32 / span;
            cur.value as f32 + (next.value as f32 - cur.value as f32) * frac
        } else {
            cur.value as f32
        };

        *tick += 1;

        if *tick >= next.tick {
            *point_idx += 1;
            if self.loop_enabled
                && let (Some(loop_end), Some(loop_start)) = (self.loop_end, self.loop_start)
                && *point_idx >= loop_end
            {
                *point_idx = loop_start;
                *tick = self.point(loop_start).map(|p| p.tick).unwrap_or(0);
            }
        }

        value
    }
}
