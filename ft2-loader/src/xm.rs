//! Extended Module (.xm) loader.
//!
//! v1.02 stores pattern row counts as `u8 + 1` and lays the file out as
//! *all instrument headers, then all patterns, then all sample data*; v1.03
//! widens the row count to `u16` but keeps that same layout; v1.04
//! interleaves each instrument's header immediately followed by its sample
//! data, after the patterns. Sample flags additionally carry a stereo bit
//! (down-mixed to mono on load) and a ModPlug ADPCM marker.

use crate::cursor::Cursor;
use crate::delta::{decode_adpcm, decode_delta_8, decode_delta_16, downmix_stereo_8, downmix_stereo_16};
use crate::error::LoadError;
use ft2_sample::{BitDepth, LoopKind, Sample, SampleParams};
use ft2_song::{
    instrument::{AutoVibrato, AutoVibratoWaveform},
    note::Note,
    pattern::Pattern,
    song::{Song, SourceFormat},
    Envelope, EnvelopePoint, Instrument, MAX_SAMPLES_PER_INSTRUMENT,
};
use tracing::{debug, warn};

const MAGIC: &[u8] = b"Extended Module: ";
const MAX_INSTRUMENTS: usize = 128;
const MAX_PATTERNS: usize = 256;

const SAMPLE_16BIT: u8 = 0x10;
const SAMPLE_STEREO: u8 = 0x20;
const SAMPLE_ADPCM: u8 = 0x40;

pub fn load(data: &[u8]) -> Result<Song, LoadError> {
    if data.len() < 60 {
        return Err(LoadError::TooSmall);
    }
    if &data[0..17] != MAGIC {
        return Err(LoadError::InvalidMagic);
    }

    let mut c = Cursor::new(data);
    c.seek(17);
    let name = c.read_string(20)?;
    c.skip(1); // 0x1A marker
    c.skip(20); // tracker name

    let version = c.read_u16()?;
    if !(0x0102..=0x0104).contains(&version) {
        return Err(LoadError::UnsupportedVersion(version));
    }

    let header_start = c.position();
    let header_size = c.read_u32()?;
    let song_length = c.read_u16()?;
    let restart_position = c.read_u16()?;
    let num_channels = c.read_u16()?;
    if num_channels > ft2_song::pattern::MAX_CHANNELS as u16 {
        return Err(LoadError::TooManyChannels(num_channels));
    }
    let num_patterns = c.read_u16()?;
    let num_instruments = c.read_u16()?;
    let flags = c.read_u16()?;
    let linear_frequency_table = (flags & 1) != 0;
    let default_speed = c.read_u16()?;
    let default_bpm = c.read_u16()?;

    let mut order_bytes = c.read_bytes(256)?.to_vec();
    order_bytes.truncate(song_length.max(1) as usize);

    c.seek(header_start + header_size as usize);

    debug!(version = format_args!("0x{version:04X}"), num_channels, num_patterns, num_instruments, "XM header parsed");

    let mut song = Song::empty(SourceFormat::Xm);
    song.name = name;
    song.linear_frequency_table = linear_frequency_table;
    song.num_channels = (num_channels as u8).max(1);
    if song.num_channels % 2 != 0 {
        song.num_channels = (song.num_channels + 1).min(ft2_song::pattern::MAX_CHANNELS as u8);
    }
    song.song_length = order_bytes.len() as u16;
    song.song_loop_start = if restart_position < song.song_length { restart_position } else { 0 };
    song.initial_speed = default_speed;
    song.initial_bpm = default_bpm;
    for (i, &p) in order_bytes.iter().enumerate() {
        song.orders[i] = p;
    }

    let num_patterns = (num_patterns as usize).min(MAX_PATTERNS);
    let num_instruments = (num_instruments as usize).min(MAX_INSTRUMENTS + 64);

    if version < 0x0104 {
        // v1.02/v1.03: every instrument header first, then the patterns,
        // then every instrument's sample data.
        let mut headers = Vec::with_capacity(num_instruments);
        for _ in 0..num_instruments {
            headers.push(parse_instrument_header(&mut c, version)?);
        }
        for _ in 0..num_patterns {
            song.patterns.push(parse_pattern(&mut c, song.num_channels, version)?);
        }
        for header in headers {
            song.instruments.push(finish_instrument(&mut c, header)?);
        }
    } else {
        for _ in 0..num_patterns {
            song.patterns.push(parse_pattern(&mut c, song.num_channels, version)?);
        }
        for _ in 0..num_instruments {
            let header = parse_instrument_header(&mut c, version)?;
            song.instruments.push(finish_instrument(&mut c, header)?);
        }
    }

    Ok(song)
}

fn parse_pattern(c: &mut Cursor, num_channels: u8, version: u16) -> Result<Pattern, LoadError> {
    let header_start = c.position();
    let header_length = c.read_u32()?;
    let _packing_type = c.read_u8()?;

    let (num_rows, packed_size) = if version == 0x0102 {
        let rows_minus_one = c.read_u8()?;
        let packed_size = c.read_u16()?;
        (rows_minus_one as u16 + 1, packed_size)
    } else {
        let num_rows = c.read_u16()?;
        let packed_size = c.read_u16()?;
        (num_rows, packed_size)
    };

    c.seek(header_start + header_length as usize);

    let num_rows = if num_rows == 0 { 64 } else { num_rows.min(ft2_song::pattern::MAX_PATTERN_ROWS) };
    let mut pattern = Pattern::new(num_rows, num_channels);

    if packed_size != 0 {
        let pattern_start = c.position();
        for row in 0..num_rows {
            for ch in 0..num_channels {
                let note = unpack_note(c)?;
                pattern.set(row, ch, note);
            }
        }
        c.seek(pattern_start + packed_size as usize);
    }

    Ok(pattern)
}

fn unpack_note(c: &mut Cursor) -> Result<Note, LoadError> {
    let first = c.read_u8()?;
    let mut note = Note::default();

    if first & 0x80 != 0 {
        if first & 0x01 != 0 {
            note.note = c.read_u8()?;
        }
        if first & 0x02 != 0 {
            note.instr = c.read_u8()?;
        }
        if first & 0x04 != 0 {
            note.vol = c.read_u8()?;
        }
        if first & 0x08 != 0 {
            note.efx = c.read_u8()?;
        }
        if first & 0x10 != 0 {
            note.efx_data = c.read_u8()?;
        }
    } else {
        note.note = first;
        note.instr = c.read_u8()?;
        note.vol = c.read_u8()?;
        note.efx = c.read_u8()?;
        note.efx_data = c.read_u8()?;
    }

    Ok(note)
}

fn waveform_from_xm(v: u8) -> AutoVibratoWaveform {
    match v & 0x03 {
        0 => AutoVibratoWaveform::Sine,
        1 => AutoVibratoWaveform::Square,
        2 => AutoVibratoWaveform::RampDown,
        _ => AutoVibratoWaveform::RampUp,
    }
}

struct SampleHeader {
    length: u32,
    loop_start: u32,
    loop_length: u32,
    volume: u8,
    finetune: i8,
    loop_kind: LoopKind,
    bit_depth: BitDepth,
    stereo: bool,
    adpcm: bool,
    panning: u8,
    relative_note: i8,
}

/// An instrument with its sample *headers* parsed but PCM data not yet
/// read — the split `load_instr_header`/`load_instr_sample` the original
/// keeps so v1.02/v1.03 can read every header before any sample body.
struct InstrumentHeader {
    instrument: Instrument,
    sample_headers: Vec<SampleHeader>,
}

fn parse_instrument_header(c: &mut Cursor, version: u16) -> Result<InstrumentHeader, LoadError> {
    let header_start = c.position();
    let header_size = c.read_u32()?;

    if header_size < 29 {
        c.seek(header_start + header_size.max(4) as usize);
        return Ok(InstrumentHeader { instrument: Instrument::default(), sample_headers: Vec::new() });
    }

    let name = c.read_string(22)?;
    let _instrument_type = c.read_u8()?;
    let num_samples = c.read_u16()?;

    let mut instrument = Instrument { name, ..Default::default() };

    if num_samples == 0 {
        c.seek(header_start + header_size as usize);
        return Ok(InstrumentHeader { instrument, sample_headers: Vec::new() });
    }

    let sample_header_size = c.read_u32()?;
    let note_map = c.read_bytes(96)?;
    instrument.note_sample_map.copy_from_slice(note_map);

    let mut vol_points = Vec::with_capacity(12);
    for _ in 0..12 {
        let tick = c.read_u16()?;
        let value = c.read_u16()?;
        vol_points.push(EnvelopePoint { tick, value });
    }
    let mut pan_points = Vec::with_capacity(12);
    for _ in 0..12 {
        let tick = c.read_u16()?;
        let value = c.read_u16()?;
        pan_points.push(EnvelopePoint { tick, value });
    }

    let num_vol_points = c.read_u8()?;
    let num_pan_points = c.read_u8()?;
    let vol_sustain = c.read_u8()?;
    let vol_loop_start = c.read_u8()?;
    let vol_loop_end = c.read_u8()?;
    let pan_sustain = c.read_u8()?;
    let pan_loop_start = c.read_u8()?;
    let pan_loop_end = c.read_u8()?;
    let vol_type = c.read_u8()?;
    let pan_type = c.read_u8()?;

    let vibrato_type = c.read_u8()?;
    let vibrato_sweep = c.read_u8()?;
    let vibrato_depth = c.read_u8()?;
    let vibrato_rate = c.read_u8()?;
    instrument.auto_vibrato = AutoVibrato {
        waveform: waveform_from_xm(vibrato_type),
        depth: vibrato_depth.min(15),
        rate: vibrato_rate,
        sweep: vibrato_sweep,
    };

    let volume_fadeout = c.read_u16()?;
    instrument.fadeout = volume_fadeout;

    c.seek(header_start + header_size as usize);

    vol_points.truncate((num_vol_points as usize).max(1));
    instrument.volume_envelope = Envelope {
        points: vol_points,
        sustain_point: Some(vol_sustain),
        loop_start: Some(vol_loop_start),
        loop_end: Some(vol_loop_end),
        enabled: num_vol_points > 0 && (vol_type & 1) != 0,
        sustain_enabled: (vol_type & 2) != 0,
        loop_enabled: (vol_type & 4) != 0,
    };

    pan_points.truncate((num_pan_points as usize).max(1));
    instrument.panning_envelope = Envelope {
        points: pan_points,
        sustain_point: Some(pan_sustain),
        loop_start: Some(pan_loop_start),
        loop_end: Some(pan_loop_end),
        enabled: num_pan_points > 0 && (pan_type & 1) != 0,
        sustain_enabled: (pan_type & 2) != 0,
        loop_enabled: (pan_type & 4) != 0,
    };

    let headers_to_read = (num_samples as usize).min(MAX_SAMPLES_PER_INSTRUMENT);
    let mut sample_headers = Vec::with_capacity(headers_to_read);
    for _ in 0..headers_to_read {
        let smp_start = c.position();
        let length = c.read_u32()?;
        let loop_start = c.read_u32()?;
        let loop_length = c.read_u32()?;
        let volume = c.read_u8()?;
        let finetune = c.read_i8()?;
        let sample_type = c.read_u8()?;
        let panning = c.read_u8()?;
        let relative_note = c.read_i8()?;
        let name_length = c.read_u8()?;
        let _name = c.read_string(22)?;

        let loop_kind = match sample_type & 0x03 {
            1 => LoopKind::Forward,
            2 => LoopKind::PingPong,
            _ => LoopKind::None,
        };
        let stereo = sample_type & SAMPLE_STEREO != 0;
        let bit_depth = if sample_type & SAMPLE_16BIT != 0 { BitDepth::Sixteen } else { BitDepth::Eight };
        // ModPlug ADPCM marks itself with a sentinel name length and must
        // be 8-bit mono (FT2 never writes this combination itself).
        let adpcm = name_length == 0xAD && sample_type & (SAMPLE_16BIT | SAMPLE_STEREO) == 0;

        if sample_header_size as usize > c.position() - smp_start {
            c.skip(sample_header_size as usize - (c.position() - smp_start));
        }

        sample_headers.push(SampleHeader {
            length,
            loop_start,
            loop_length,
            volume,
            finetune,
            loop_kind,
            bit_depth,
            stereo,
            adpcm,
            panning,
            relative_note,
        });
    }

    // Extra sample headers beyond FT2's per-instrument limit are skipped
    // outright — their bodies are located and skipped in `finish_instrument`.
    for _ in headers_to_read..num_samples as usize {
        c.skip(sample_header_size as usize);
    }

    if num_samples as usize > MAX_SAMPLES_PER_INSTRUMENT {
        warn!(num_samples, "instrument exceeds 16 samples, discarding extras");
    }

    Ok(InstrumentHeader { instrument, sample_headers })
}

fn finish_instrument(c: &mut Cursor, header: InstrumentHeader) -> Result<Instrument, LoadError> {
    let InstrumentHeader { mut instrument, sample_headers } = header;

    for h in sample_headers {
        if h.length == 0 {
            continue;
        }

        let length_in_file = h.length;
        let shift = if h.bit_depth == BitDepth::Sixteen { 1 } else { 0 };

        let pcm = if h.adpcm {
            let raw = c.read_bytes(16 + (h.length as usize + 1) / 2)?;
            decode_adpcm(raw, h.length as usize)
        } else {
            let bytes_in_file = length_in_file as usize;
            let raw = c.read_bytes(bytes_in_file)?;
            match (h.bit_depth, h.stereo) {
                (BitDepth::Eight, false) => decode_delta_8(raw),
                (BitDepth::Sixteen, false) => decode_delta_16(raw),
                (BitDepth::Eight, true) => downmix_stereo_8(raw),
                (BitDepth::Sixteen, true) => downmix_stereo_16(raw),
            }
        };

        let frames = (h.length >> shift) >> (h.stereo as u32);
        let params = SampleParams {
            bit_depth: h.bit_depth,
            length: frames,
            loop_kind: h.loop_kind,
            loop_start: (h.loop_start >> shift) >> (h.stereo as u32),
            loop_length: (h.loop_length >> shift) >> (h.stereo as u32),
            volume: h.volume,
            panning: h.panning,
            relative_note: h.relative_note,
            finetune: h.finetune,
        };
        instrument.samples.push(Sample::load(params, &pcm)?);
    }

    Ok(instrument)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_too_small_file() {
        assert_eq!(load(&[0u8; 10]).unwrap_err(), LoadError::TooSmall);
    }

    #[test]
    fn rejects_bad_magic() {
        let mut data = vec![0u8; 80];
        data[0..17].copy_from_slice(b"Not An XM Header!");
        assert_eq!(load(&data).unwrap_err(), LoadError::InvalidMagic);
    }

    #[test]
    fn rejects_out_of_range_version() {
        let mut data = vec![0u8; 80];
        data[0..17].copy_from_slice(MAGIC);
        data[37] = 0x00;
        data[38] = 0x02; // 0x0200, outside 0x0102..=0x0104
        assert_eq!(load(&data).unwrap_err(), LoadError::UnsupportedVersion(0x0200));
    }
}
