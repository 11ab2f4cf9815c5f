//! XM sample PCM is delta-coded: each stored byte/word is the signed
//! difference from the previous decoded sample, wrapping like two's
//! complement arithmetic. Decoding is a running sum.

pub fn decode_delta_8(raw: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(raw.len());
    let mut old: i8 = 0;
    for &b in raw {
        old = old.wrapping_add(b as i8);
        out.push(old as u8);
    }
    out
}

pub fn decode_delta_16(raw: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(raw.len());
    let mut old: i16 = 0;
    for chunk in raw.chunks_exact(2) {
        let delta = i16::from_le_bytes([chunk[0], chunk[1]]);
        old = old.wrapping_add(delta);
        out.extend_from_slice(&old.to_le_bytes());
    }
    out
}

/// Stereo XM samples store the two channels as separate delta-coded planes
/// (all of the left channel's bytes, then all of the right's), not
/// interleaved. Each plane decodes independently and the two are averaged
/// down to mono, the same down-mix the loader performs at load time.
pub fn downmix_stereo_8(raw: &[u8]) -> Vec<u8> {
    let half = raw.len() / 2;
    let left = decode_delta_8(&raw[..half]);
    let right = decode_delta_8(&raw[half..half * 2]);
    left.iter()
        .zip(right.iter())
        .map(|(&l, &r)| (((l as i8 as i32) + (r as i8 as i32)) >> 1) as i8 as u8)
        .collect()
}

pub fn downmix_stereo_16(raw: &[u8]) -> Vec<u8> {
    let half = (raw.len() / 2) & !1; // stay on a 2-byte boundary
    let left = decode_delta_16(&raw[..half]);
    let right = decode_delta_16(&raw[half..half * 2]);
    let mut out = Vec::with_capacity(half);
    for (lc, rc) in left.chunks_exact(2).zip(right.chunks_exact(2)) {
        let l = i16::from_le_bytes([lc[0], lc[1]]) as i32;
        let r = i16::from_le_bytes([rc[0], rc[1]]) as i32;
        let mixed = ((l + r) >> 1) as i16;
        out.extend_from_slice(&mixed.to_le_bytes());
    }
    out
}

/// ModPlug's 4-bit ADPCM: a 16-entry signed delta lookup table followed by
/// one nibble per sample, low nibble first.
pub fn decode_adpcm(raw: &[u8], length: usize) -> Vec<u8> {
    let mut lut = [0i8; 16];
    for (i, slot) in lut.iter_mut().enumerate() {
        *slot = raw[i] as i8;
    }

    let mut out = Vec::with_capacity(length);
    let mut current: i8 = 0;
    'outer: for &byte in &raw[16..] {
        current = current.wrapping_add(lut[(byte & 0x0F) as usize]);
        out.push(current as u8);
        if out.len() >= length {
            break 'outer;
        }
        current = current.wrapping_add(lut[(byte >> 4) as usize]);
        out.push(current as u8);
        if out.len() >= length {
            break 'outer;
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delta_8_accumulates() {
        let raw = [5u8, 250, 10]; // +5, -6, +10
        let decoded = decode_delta_8(&raw);
        assert_eq!(decoded, vec![5u8, (5i8 - 6) as u8, (5i8 - 6 + 10) as u8]);
    }

    #[test]
    fn delta_16_wraps() {
        let raw = i16::MAX.to_le_bytes();
        let mut both = raw.to_vec();
        both.extend_from_slice(&i16::MAX.to_le_bytes());
        let decoded = decode_delta_16(&both);
        let second = i16::from_le_bytes([decoded[2], decoded[3]]);
        assert_eq!(second, i16::MAX.wrapping_add(i16::MAX));
    }
}
