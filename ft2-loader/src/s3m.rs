//! Scream Tracker 3 (.s3m) loader.
//!
//! Best-effort: covers the common PCM-sample, non-adlib case with the
//! signature/order/sample/pattern layout Scream Tracker actually writes.
//! Exotic adlib-instrument S3Ms are skipped (empty instrument slot).

use crate::cursor::Cursor;
use crate::error::LoadError;
use ft2_sample::{BitDepth, LoopKind, Sample, SampleParams};
use ft2_song::{
    note::Note,
    pattern::Pattern,
    song::{Song, SourceFormat},
    Instrument,
};

const NOTE_C4: i32 = 48;
const C4_FREQ: f64 = 8363.0;

pub fn detect(data: &[u8]) -> bool {
    data.len() >= 48 && &data[0x2C..0x30] == b"SCRM" && data[0x1D] == 16
}

fn set_c4_freq(freq: f64) -> (i8, i8) {
    let period_offset = (NOTE_C4 * 16 + 16) as f64;
    let mut period = (period_offset + (freq / C4_FREQ).log2() * 12.0 * 16.0).round() as i32;
    period = period.clamp(0, 12 * 16 * 10 - 1);
    let finetune = (((period & 31) - 16) << 3) as i8;
    let relative_note = (((period & !31) >> 4) - NOTE_C4) as i8;
    (relative_note, finetune)
}

fn unpack_s3m_note(raw_note: u8) -> u8 {
    match raw_note {
        255 => 0,
        254 => ft2_song::note::NOTE_OFF,
        n => {
            let octave = (n >> 4) as u16;
            let semitone = (n & 0x0F) as u16;
            (1 + octave * 12 + semitone).min(ft2_song::note::NOTE_MAX as u16) as u8
        }
    }
}

pub fn load(data: &[u8]) -> Result<Song, LoadError> {
    if !detect(data) {
        return Err(LoadError::InvalidMagic);
    }
    if data.len() < 96 {
        return Err(LoadError::TooSmall);
    }

    let mut c = Cursor::new(data);
    let name = c.read_string(28)?;
    c.skip(1); // junk1
    let _type_byte = c.read_u8()?;
    c.skip(2); // junk2
    let num_orders = c.read_u16()?;
    let num_samples = c.read_u16()?;
    let num_patterns = c.read_u16()?;
    let _flags = c.read_u16()?;
    c.skip(2); // junk3
    let version = c.read_u16()?;
    let _id = c.read_bytes(4)?;
    c.skip(1); // junk4
    let speed = c.read_u8()?;
    let bpm = c.read_u8()?;
    c.skip(1 + 12 + 32); // junk5, junk6, chnSettings

    if num_samples as usize > ft2_song::song::MAX_ORDERS
        || num_orders as usize > ft2_song::song::MAX_ORDERS
        || !(1..=2).contains(&version)
    {
        return Err(LoadError::UnsupportedVersion(version));
    }

    let mut orders = c.read_bytes(num_orders as usize)?.to_vec();
    orders.retain(|&o| o != 254);
    if let Some(end) = orders.iter().skip(1).position(|&o| o == 255) {
        orders.truncate(end + 1);
    }

    let mut song = Song::empty(SourceFormat::S3m);
    song.name = name;
    song.song_length = orders.len() as u16;
    song.initial_speed = speed as u16;
    song.initial_bpm = bpm as u16;
    for (i, &o) in orders.iter().enumerate() {
        song.orders[i] = o;
    }

    let mut sample_offsets = Vec::with_capacity(num_samples as usize);
    for _ in 0..num_samples {
        sample_offsets.push((c.read_u16()? as usize) << 4);
    }
    let mut pattern_offsets = Vec::with_capacity(num_patterns as usize);
    for _ in 0..num_patterns {
        pattern_offsets.push((c.read_u16()? as usize) << 4);
    }

    let mut max_channel = 0u8;
    let mut patterns = Vec::with_capacity(num_patterns as usize);
    for &off in &pattern_offsets {
        let (pattern, used) = parse_pattern(data, off)?;
        max_channel = max_channel.max(used);
        patterns.push(pattern);
    }
    song.num_channels = (max_channel + 1).max(1);
    // Re-widen every pattern to the song's final channel count.
    for p in patterns.iter_mut() {
        if p.num_channels() != song.num_channels {
            let mut widened = Pattern::new(p.num_rows(), song.num_channels);
            for row in 0..p.num_rows() {
                for ch in 0..p.num_channels() {
                    if let Some(&n) = p.get(row, ch) {
                        widened.set(row, ch, n);
                    }
                }
            }
            *p = widened;
        }
    }
    song.patterns = patterns;

    for &off in &sample_offsets {
        song.instruments.push(parse_sample(data, off)?);
    }

    Ok(song)
}

fn parse_pattern(data: &[u8], offset: usize) -> Result<(Pattern, u8), LoadError> {
    if offset == 0 || offset + 2 > data.len() {
        return Ok((Pattern::new(64, ft2_song::pattern::MAX_CHANNELS as u8), 0));
    }
    let mut c = Cursor::new(data);
    c.seek(offset);
    let _packed_len = c.read_u16()?;

    let full_width = ft2_song::pattern::MAX_CHANNELS as u8;
    let mut pattern = Pattern::new(64, full_width);
    let mut max_channel = 0u8;

    let mut row = 0u16;
    while row < 64 {
        let marker = c.read_u8()?;
        if marker == 0 {
            row += 1;
            continue;
        }
        let channel = (marker & 31).min(full_width - 1);
        max_channel = max_channel.max(channel);
        let mut note = Note::default();

        if marker & 0x20 != 0 {
            let raw_note = c.read_u8()?;
            let instr = c.read_u8()?;
            note.note = unpack_s3m_note(raw_note);
            note.instr = instr;
        }
        if marker & 0x40 != 0 {
            note.vol = c.read_u8()?.min(64);
        }
        if marker & 0x80 != 0 {
            note.efx = c.read_u8()?;
            note.efx_data = c.read_u8()?;
        }

        pattern.set(row, channel, note);
    }

    Ok((pattern, max_channel))
}

fn parse_sample(data: &[u8], offset: usize) -> Result<Instrument, LoadError> {
    if offset == 0 || offset + 80 > data.len() {
        return Ok(Instrument::default());
    }
    let mut c = Cursor::new(data);
    c.seek(offset);

    let sample_type = c.read_u8()?;
    c.skip(12); // junk1
    let offset_in_file_h = c.read_u8()?;
    let offset_in_file = c.read_u16()?;
    let length = c.read_u32()?;
    let loop_start = c.read_u32()?;
    let loop_end = c.read_u32()?;
    let volume = c.read_u8()?;
    c.skip(1); // junk2
    let _pack_flag = c.read_u8()?;
    let flags = c.read_u8()?;
    let mid_c_freq = c.read_u32()? as i32;
    c.skip(4 + 2 + 6); // junk3, junk4, junk5
    let name = c.read_string(28)?;

    if sample_type != 1 {
        return Ok(Instrument {
            name,
            ..Default::default()
        });
    }

    let is_stereo = flags & 0x02 != 0;
    let is_16bit = flags & 0x04 != 0;
    let loop_on = flags & 0x01 != 0;

    let pcm_offset = ((offset_in_file_h as usize) << 20) | ((offset_in_file as usize) << 4);
    let bit_depth = if is_16bit {
        BitDepth::Sixteen
    } else {
        BitDepth::Eight
    };
    let byte_len = if is_16bit { length as usize * 2 } else { length as usize };
    let raw = if pcm_offset + byte_len <= data.len() {
        &data[pcm_offset..pcm_offset + byte_len]
    } else {
        &[]
    };

    let pcm = unsigned_to_signed(raw, is_16bit, is_stereo);

    let (relative_note, finetune) = set_c4_freq(mid_c_freq as f64);

    let loop_kind = if loop_on { LoopKind::Forward } else { LoopKind::None };
    let params = SampleParams {
        bit_depth,
        length,
        loop_kind,
        loop_start,
        loop_length: loop_end.saturating_sub(loop_start),
        volume: volume.min(64),
        panning: 128,
        relative_note,
        finetune,
    };

    let sample = Sample::load(params, &pcm)?;
    let mut instrument = Instrument {
        name,
        ..Default::default()
    };
    instrument.samples.push(sample);
    Ok(instrument)
}

/// S3M PCM is unsigned; stereo sources are pre-mixed to mono (FT2 samples
/// are always mono internally).
fn unsigned_to_signed(raw: &[u8], is_16bit: bool, stereo: bool) -> Vec<u8> {
    if is_16bit {
        let frames: Vec<i16> = raw
            .chunks_exact(2)
            .map(|c| i16::from_le_bytes([c[0], c[1]]) ^ i16::MIN)
            .collect();
        if stereo {
            let half = frames.len() / 2;
            let (l, r) = frames.split_at(half);
            l.iter()
                .zip(r.iter())
                .flat_map(|(&a, &b)| (((a as i32 + b as i32) >> 1) as i16).to_le_bytes())
                .collect()
        } else {
            frames.iter().flat_map(|v| v.to_le_bytes()).collect()
        }
    } else {
        let frames: Vec<i8> = raw.iter().map(|&b| (b ^ 0x80) as i8).collect();
        if stereo {
            let half = frames.len() / 2;
            let (l, r) = frames.split_at(half);
            l.iter()
                .zip(r.iter())
                .map(|(&a, &b)| (((a as i32 + b as i32) >> 1) as i8) as u8)
                .collect()
        } else {
            frames.iter().map(|&v| v as u8).collect()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detect_requires_scrm_signature() {
        let data = vec![0u8; 64];
        assert!(!detect(&data));
    }

    #[test]
    fn c4_freq_roundtrips_near_8363() {
        let (rel, fine) = set_c4_freq(8363.0);
        assert_eq!(rel, 0);
        assert!(fine.abs() <= 8);
    }
}
