//! NoiseTracker/ProTracker/FastTracker .mod loader.
//!
//! MOD has no embedded instruments: each of its 31 sample slots becomes a
//! one-sample FT2 instrument, and the note-to-sample mapping is a no-op
//! (every note maps to sample 0 of its instrument).

use crate::cursor::Cursor;
use crate::error::LoadError;
use ft2_sample::{BitDepth, LoopKind, Sample, SampleParams};
use ft2_song::{
    note::Note,
    pattern::Pattern,
    song::{Song, SourceFormat},
    Instrument,
};

const MOD_PERIODS: [u16; 96] = [
    6848, 6464, 6096, 5760, 5424, 5120, 4832, 4560, 4304, 4064, 3840, 3624, 3424, 3232, 3048, 2880,
    2712, 2560, 2416, 2280, 2152, 2032, 1920, 1812, 1712, 1616, 1524, 1440, 1356, 1280, 1208, 1140,
    1076, 1016, 960, 906, 856, 808, 762, 720, 678, 640, 604, 570, 538, 508, 480, 453, 428, 404, 381,
    360, 339, 320, 302, 285, 269, 254, 240, 226, 214, 202, 190, 180, 170, 160, 151, 143, 135, 127,
    120, 113, 107, 101, 95, 90, 85, 80, 75, 71, 67, 63, 60, 56, 53, 50, 47, 45, 42, 40, 37, 35, 33,
    31, 30, 28,
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ModFormat {
    Mk,
    Flt4,
    Flt8,
    Ft2,
    Nt,
    Hmnt,
}

fn mod_type(id: &[u8; 4]) -> Option<(ModFormat, u8)> {
    let is = |b: &[u8]| id == b;
    if is(b"M.K.") || is(b"M!K!") || is(b"NSMS") || is(b"LARD") || is(b"PATT") {
        return Some((ModFormat::Mk, 4));
    }
    if id[0].is_ascii_digit() && id[1] == b'C' && id[2] == b'H' && id[3] == b'N' {
        return Some((ModFormat::Ft2, id[0] - b'0'));
    }
    if id[0].is_ascii_digit() && id[1].is_ascii_digit() && (id[2] == b'C') && (id[3] == b'H' || id[3] == b'N') {
        return Some((ModFormat::Ft2, (id[0] - b'0') * 10 + (id[1] - b'0')));
    }
    if is(b"CD61") || is(b"CD81") {
        return Some((ModFormat::Ft2, id[2] - b'0'));
    }
    if id[0] == b'F' && id[1] == b'A' && id[2] == b'0' && (b'4'..=b'8').contains(&id[3]) {
        return Some((ModFormat::Ft2, id[3] - b'0'));
    }
    if is(b"OKTA") || is(b"OCTA") {
        return Some((ModFormat::Ft2, 8));
    }
    if is(b"FLT4") || is(b"EXO4") {
        return Some((ModFormat::Flt4, 4));
    }
    if is(b"FLT8") || is(b"EXO8") {
        return Some((ModFormat::Flt8, 8));
    }
    if is(b"N.T.") {
        return Some((ModFormat::Nt, 4));
    }
    if is(b"M&K!") || is(b"FEST") {
        return Some((ModFormat::Hmnt, 4));
    }
    None
}

pub fn detect(data: &[u8]) -> bool {
    data.len() >= 1084 && {
        let id: [u8; 4] = data[1080..1084].try_into().unwrap();
        mod_type(&id).is_some()
    }
}

fn period_to_note(period: u16) -> u8 {
    if period == 0 {
        return 0;
    }
    for (i, &p) in MOD_PERIODS.iter().enumerate() {
        if period >= p {
            return i as u8 + 1;
        }
    }
    0
}

/// Remaps MOD-era effect commands to FT2's effect set and drops the
/// zero-parameter forms FT2 treats as no-op.
fn convert_effect(format: ModFormat, efx: &mut u8, efx_data: &mut u8) {
    match *efx {
        0xC => {
            if *efx_data > 64 {
                *efx_data = 64;
            }
        }
        0x1 | 0x2 | 0xA => {
            if *efx_data == 0 {
                *efx = 0;
            }
        }
        0x5 => {
            if *efx_data == 0 {
                *efx = 0x3;
            }
        }
        0x6 => {
            if *efx_data == 0 {
                *efx = 0x4;
            }
        }
        0xE => {
            if matches!(*efx_data, 0x10 | 0x20 | 0xA0 | 0xB0) {
                *efx = 0;
                *efx_data = 0;
            }
        }
        _ => {}
    }

    match format {
        ModFormat::Nt | ModFormat::Hmnt => {
            if *efx == 0xD {
                *efx_data = 0;
            }
            if *efx == 0xF && *efx_data == 0 {
                *efx = 0;
            }
        }
        ModFormat::Flt4 | ModFormat::Flt8 => {
            if *efx == 0xE {
                *efx = 0;
                *efx_data = 0;
            }
            if *efx == 0xF && *efx_data > 0x1F {
                *efx_data = 0x1F;
            }
        }
        _ => {}
    }
}

pub fn load(data: &[u8]) -> Result<Song, LoadError> {
    if data.len() < 1084 {
        return Err(LoadError::TooSmall);
    }

    let id: [u8; 4] = data[1080..1084].try_into().unwrap();
    let (format, mut num_channels) = mod_type(&id).ok_or(LoadError::InvalidMagic)?;

    let mut c = Cursor::new(data);
    let name = c.read_string(20)?;

    struct SmpHdr {
        name: String,
        length: u16,
        finetune: u8,
        volume: u8,
        loop_start: u16,
        loop_length: u16,
    }
    let mut smp_hdrs = Vec::with_capacity(31);
    for _ in 0..31 {
        let name = c.read_string(22)?;
        let length = c.read_u16()?;
        let finetune = c.read_u8()?;
        let volume = c.read_u8()?;
        let loop_start = c.read_u16()?;
        let loop_length = c.read_u16()?;
        smp_hdrs.push(SmpHdr {
            name,
            length: length.swap_bytes(),
            finetune,
            volume,
            loop_start: loop_start.swap_bytes(),
            loop_length: loop_length.swap_bytes(),
        });
    }

    let mut num_orders = c.read_u8()?;
    if format == ModFormat::Mk && num_orders == 129 {
        num_orders = 127;
    }
    let song_loop_start = c.read_u8()?;
    let mut orders = c.read_bytes(128)?.to_vec();
    c.skip(4); // ID, already consumed above

    if num_channels == 0 || num_orders == 0 {
        return Err(LoadError::InvalidMagic);
    }
    let detected_channels = num_channels;
    let too_many_channels = num_channels as usize > ft2_song::pattern::MAX_CHANNELS;
    if too_many_channels {
        num_channels = ft2_song::pattern::MAX_CHANNELS as u8;
    }

    let mut song = Song::empty(SourceFormat::Mod);
    song.name = name;
    song.num_channels = num_channels;
    song.song_length = num_orders as u16;
    song.song_loop_start = if (song_loop_start as u16) < song.song_length {
        song_loop_start as u16
    } else {
        0
    };

    if format == ModFormat::Flt8 {
        for o in orders.iter_mut() {
            *o >>= 1;
        }
    }
    let num_patterns = orders.iter().take(128).copied().max().unwrap_or(0) as u16 + 1;
    for (i, &o) in orders.iter().enumerate() {
        song.orders[i] = o;
    }

    let mut patterns: Vec<Pattern> = (0..num_patterns)
        .map(|_| Pattern::new(64, num_channels))
        .collect();

    if format != ModFormat::Flt8 {
        for pat in patterns.iter_mut() {
            for row in 0..64 {
                for ch in 0..num_channels {
                    let bytes = c.read_bytes(4)?;
                    let period = (((bytes[0] & 0x0F) as u16) << 8) | bytes[1] as u16;
                    let mut note = Note {
                        note: period_to_note(period),
                        instr: (bytes[0] & 0xF0) | (bytes[2] >> 4),
                        efx: bytes[2] & 0x0F,
                        efx_data: bytes[3],
                        vol: 0,
                    };
                    convert_effect(format, &mut note.efx, &mut note.efx_data);
                    pat.set(row, ch, note);
                }
                if too_many_channels {
                    let remaining = detected_channels as usize - num_channels as usize;
                    c.skip(remaining * 4);
                }
            }
        }
    } else {
        // FLT8: patterns interleave two 4-channel halves back-to-back.
        for half in 0..(num_patterns as usize * 2) {
            let pat_idx = half / 2;
            let chan_offset = (half % 2) as u8 * 4;
            for row in 0..64 {
                for k in 0..4u8 {
                    let bytes = c.read_bytes(4)?;
                    let period = (((bytes[0] & 0x0F) as u16) << 8) | bytes[1] as u16;
                    let mut note = Note {
                        note: period_to_note(period),
                        instr: (bytes[0] & 0xF0) | (bytes[2] >> 4),
                        efx: bytes[2] & 0x0F,
                        efx_data: bytes[3],
                        vol: 0,
                    };
                    convert_effect(format, &mut note.efx, &mut note.efx_data);
                    patterns[pat_idx].set(row, k + chan_offset, note);
                }
            }
        }
    }
    song.patterns = patterns;

    for h in smp_hdrs {
        if h.length == 0 {
            song.instruments.push(Instrument::default());
            continue;
        }

        let finetune = if format == ModFormat::Hmnt {
            (h.finetune.wrapping_neg() & 0x1F) >> 1
        } else {
            h.finetune
        };
        let xm_finetune = ((finetune & 0x0F) << 4) as i8;

        let length = 2 * h.length as u32;
        let mut loop_start = 2 * h.loop_start as u32;
        let mut loop_length = 2 * h.loop_length as u32;

        if loop_length > 2 && loop_start + loop_length > length && (loop_start >> 1) + loop_length <= length {
            loop_start >>= 1;
        }
        if loop_start + loop_length > length {
            if loop_start >= length {
                loop_start = 0;
                loop_length = 0;
            } else {
                loop_length = length - loop_start;
            }
        }
        let loop_kind = if loop_start + loop_length > 2 {
            LoopKind::Forward
        } else {
            LoopKind::None
        };

        let pcm = c.read_bytes(length as usize)?;
        let params = SampleParams {
            bit_depth: BitDepth::Eight,
            length,
            loop_kind,
            loop_start,
            loop_length,
            volume: h.volume.min(64),
            panning: 128,
            relative_note: 0,
            finetune: xm_finetune,
        };
        let sample = Sample::load(params, pcm)?;

        let mut instrument = Instrument {
            name: h.name,
            ..Default::default()
        };
        instrument.samples.push(sample);
        song.instruments.push(instrument);
    }

    Ok(song)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_undersized_file() {
        assert_eq!(load(&[0u8; 100]).unwrap_err(), LoadError::TooSmall);
    }

    #[test]
    fn period_table_lookup_monotonic() {
        assert_eq!(period_to_note(6848), 1);
        assert_eq!(period_to_note(28), 96);
        assert_eq!(period_to_note(0), 0);
    }
}
