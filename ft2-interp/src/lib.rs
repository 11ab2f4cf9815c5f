//! Process-wide interpolation LUT registry.
//!
//! [`InterpTables`] holds the quadratic spline, cubic spline and windowed
//! sinc kernels the mixer indexes into. Building them involves a handful of
//! Bessel-function evaluations per sinc tap and is done once per process:
//! [`acquire`] hands out a shared, reference-counted [`std::sync::Arc`] and
//! rebuilds only after every engine instance has dropped its handle (the
//! `Weak` upgrade fails, so the next `acquire` rebuilds from scratch) —
//! the natural Rust translation of the source's manual
//! init-refcount/free-on-last-decrement global.

use std::sync::{Arc, Mutex, OnceLock, Weak};

/// Mixer position fractional bits (`position_frac` is a 32-bit fixed-point
/// fraction; `delta` packs integer:frac as 32:32).
pub const FRAC_BITS: u32 = 32;
pub const FRAC_SCALE: u64 = 1u64 << FRAC_BITS;

pub const QUADRATIC_SPLINE_WIDTH: usize = 3;
pub const QUADRATIC_SPLINE_PHASES: usize = 8192;
pub const CUBIC_SPLINE_WIDTH: usize = 4;
pub const CUBIC_SPLINE_PHASES: usize = 8192;
pub const SINC_KERNELS: usize = 3;
pub const SINC_PHASES: usize = 8192;
const SINC_PHASE_BITS: u32 = 13;

/// (Kaiser beta, sinc cutoff) per kernel, selected by resampling ratio.
const SINC_KERNEL_CONFIG: [(f64, f64); SINC_KERNELS] = [
    (9.6377, 1.000),
    (8.5000, 0.750),
    (7.3000, 0.425),
];

/// The five selectable mixer interpolation qualities.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InterpMode {
    None,
    Linear,
    Quadratic,
    Cubic,
    Sinc,
}

/// Zeroth-order modified Bessel function of the first kind, series form.
fn bessel_i0(z: f64) -> f64 {
    let mut s = 1.0;
    let mut ds = 1.0;
    let mut d = 2.0;
    let zz = z * z;
    loop {
        ds *= zz / (d * d);
        s += ds;
        d += 2.0;
        if ds <= s * 1e-12 {
            break;
        }
    }
    s
}

/// Normalized sinc, `sin(pi*x*cutoff)/(pi*x)`.
fn sinc(x: f64, cutoff: f64) -> f64 {
    if x == 0.0 {
        return cutoff;
    }
    let x = x * std::f64::consts::PI;
    (cutoff * x).sin() / x
}

fn make_sinc_kernel(num_points: usize, num_phases: usize, beta: f64, cutoff: f64) -> Vec<f32> {
    let point_bits = (num_points as f64).log2() as u32;
    let point_mask = num_points - 1;
    let center_point = (num_points / 2) as i64 - 1;
    let bessel_i0_beta = 1.0 / bessel_i0(beta);
    let phase_mul = 1.0 / num_phases as f64;
    let x_mul = 1.0 / (num_points / 2) as f64;

    let kernel_len = num_phases * num_points;
    let mut out = vec![0.0f32; kernel_len];
    for (i, slot) in out.iter_mut().enumerate() {
        let x = ((i & point_mask) as i64 - center_point) as f64
            - ((i >> point_bits) as f64 * phase_mul);
        let n = x * x_mul;
        let window_arg = (1.0 - n * n).max(0.0);
        let window = bessel_i0(beta * window_arg.sqrt()) * bessel_i0_beta;
        *slot = (sinc(x, cutoff) * window) as f32;
    }
    out
}

fn make_quadratic_spline() -> Vec<f32> {
    let mut out = vec![0.0f32; QUADRATIC_SPLINE_WIDTH * QUADRATIC_SPLINE_PHASES];
    for (i, chunk) in out.chunks_exact_mut(QUADRATIC_SPLINE_WIDTH).enumerate() {
        let x1 = i as f64 * (1.0 / QUADRATIC_SPLINE_PHASES as f64);
        let x2 = x1 * x1;
        chunk[0] = (x1 * -1.5 + x2 * 0.5 + 1.0) as f32;
        chunk[1] = (x1 * 2.0 + x2 * -1.0) as f32;
        chunk[2] = (x1 * -0.5 + x2 * 0.5) as f32;
    }
    out
}

fn make_cubic_spline() -> Vec<f32> {
    let mut out = vec![0.0f32; CUBIC_SPLINE_WIDTH * CUBIC_SPLINE_PHASES];
    for (i, chunk) in out.chunks_exact_mut(CUBIC_SPLINE_WIDTH).enumerate() {
        let x1 = i as f64 * (1.0 / CUBIC_SPLINE_PHASES as f64);
        let x2 = x1 * x1;
        let x3 = x2 * x1;
        chunk[0] = (x1 * -0.5 + x2 * 1.0 + x3 * -0.5) as f32;
        chunk[1] = (x2 * -2.5 + x3 * 1.5 + 1.0) as f32;
        chunk[2] = (x1 * 0.5 + x2 * 2.0 + x3 * -1.5) as f32;
        chunk[3] = (x2 * -0.5 + x3 * 0.5) as f32;
    }
    out
}

/// Shared interpolation LUTs. Build with [`acquire`], never directly.
pub struct InterpTables {
    quadratic: Vec<f32>,
    cubic: Vec<f32>,
    sinc8: [Vec<f32>; SINC_KERNELS],
    sinc16: [Vec<f32>; SINC_KERNELS],
    sinc_ratio1: u64,
    sinc_ratio2: u64,
}

impl InterpTables {
    fn build() -> Self {
        let mut sinc8: [Vec<f32>; SINC_KERNELS] = Default::default();
        let mut sinc16: [Vec<f32>; SINC_KERNELS] = Default::default();
        for (i, &(beta, cutoff)) in SINC_KERNEL_CONFIG.iter().enumerate() {
            sinc8[i] = make_sinc_kernel(8, SINC_PHASES, beta, cutoff);
            sinc16[i] = make_sinc_kernel(16, SINC_PHASES, beta, cutoff);
        }
        Self {
            quadratic: make_quadratic_spline(),
            cubic: make_cubic_spline(),
            sinc8,
            sinc16,
            sinc_ratio1: (1.1875 * FRAC_SCALE as f64) as u64,
            sinc_ratio2: (1.5 * FRAC_SCALE as f64) as u64,
        }
    }

    /// Picks the sinc kernel (and its tap width) for a given fixed-point
    /// resampling `delta`, per §4.2: `delta <= 1.1875*scale` uses the
    /// 16-tap kernel 0, `delta <= 1.5*scale` uses the 8-tap kernel 1,
    /// otherwise the 8-tap kernel 2.
    pub fn select_sinc(&self, delta: u64) -> (&[f32], usize) {
        if delta <= self.sinc_ratio1 {
            (&self.sinc16[0], 16)
        } else if delta <= self.sinc_ratio2 {
            (&self.sinc8[1], 8)
        } else {
            (&self.sinc8[2], 8)
        }
    }

    /// Evaluates the quadratic spline at fractional position `frac`
    /// (a 32-bit fixed-point fraction) using `get(-1)`, `get(0)`, `get(1)`.
    pub fn quadratic(&self, frac: u32, get: impl Fn(i64) -> f32) -> f32 {
        let phase = (frac >> (FRAC_BITS - 13)) as usize;
        let c = &self.quadratic[phase * QUADRATIC_SPLINE_WIDTH..][..QUADRATIC_SPLINE_WIDTH];
        c[0] * get(-1) + c[1] * get(0) + c[2] * get(1)
    }

    /// Evaluates the cubic (Catmull-Rom) spline using `get(-1)..get(2)`.
    pub fn cubic(&self, frac: u32, get: impl Fn(i64) -> f32) -> f32 {
        let phase = (frac >> (FRAC_BITS - 13)) as usize;
        let c = &self.cubic[phase * CUBIC_SPLINE_WIDTH..][..CUBIC_SPLINE_WIDTH];
        c[0] * get(-1) + c[1] * get(0) + c[2] * get(1) + c[3] * get(2)
    }

    /// Evaluates the windowed-sinc kernel selected by `delta`.
    pub fn sinc(&self, frac: u32, delta: u64, get: impl Fn(i64) -> f32) -> f32 {
        let (kernel, num_points) = self.select_sinc(delta);
        let shift = FRAC_BITS - (SINC_PHASE_BITS + num_points.trailing_zeros());
        let phase = (frac >> shift) as usize & (SINC_PHASES - 1);
        let center = (num_points / 2) as i64 - 1;
        let row = &kernel[phase * num_points..][..num_points];
        let mut acc = 0.0f32;
        for (j, &w) in row.iter().enumerate() {
            acc += w * get(j as i64 - center);
        }
        acc
    }
}

static REGISTRY: OnceLock<Mutex<Weak<InterpTables>>> = OnceLock::new();

/// Returns the shared interpolation tables, building them if no engine
/// currently holds a live handle.
pub fn acquire() -> Arc<InterpTables> {
    let slot = REGISTRY.get_or_init(|| Mutex::new(Weak::new()));
    let mut guard = slot.lock().expect("interpolation LUT registry poisoned");
    if let Some(existing) = guard.upgrade() {
        return existing;
    }
    tracing::debug!("building interpolation LUTs (quadratic/cubic/sinc)");
    let fresh = Arc::new(InterpTables::build());
    *guard = Arc::downgrade(&fresh);
    fresh
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quadratic_endpoints_match_samples() {
        let tables = InterpTables::build();
        let get = |i: i64| match i {
            -1 => 1.0,
            0 => 2.0,
            1 => 5.0,
            _ => 0.0,
        };
        assert!((tables.quadratic(0, get) - 2.0).abs() < 1e-4);
    }

    #[test]
    fn cubic_endpoints_match_samples() {
        let tables = InterpTables::build();
        let get = |i: i64| match i {
            -1 => 1.0,
            0 => 2.0,
            1 => 5.0,
            2 => 3.0,
            _ => 0.0,
        };
        assert!((tables.cubic(0, get) - 2.0).abs() < 1e-4);
    }

    #[test]
    fn sinc_kernel_selection_thresholds() {
        let tables = InterpTables::build();
        let (_kernel, taps) = tables.select_sinc((1.0 * FRAC_SCALE as f64) as u64);
        assert_eq!(taps, 16);
        let (_kernel, taps) = tables.select_sinc((1.3 * FRAC_SCALE as f64) as u64);
        assert_eq!(taps, 8);
        let (_kernel, taps) = tables.select_sinc((2.0 * FRAC_SCALE as f64) as u64);
        assert_eq!(taps, 8);
    }

    #[test]
    fn acquire_shares_tables_while_referenced() {
        let a = acquire();
        let b = acquire();
        assert!(Arc::ptr_eq(&a, &b));
        drop(a);
        drop(b);
        let c = acquire();
        assert_eq!(c.quadratic.len(), QUADRATIC_SPLINE_WIDTH * QUADRATIC_SPLINE_PHASES);
    }
}
