//! Numeric precision modes and kernel scalar-argument encoding.
//!
//! A simulation context fixes one [`PrecisionMode`] for its lifetime; the
//! mode governs the binary width of every scalar argument passed into
//! solver and integration kernels. The encoding rule is resolved once via
//! [`PrecisionMode::encoder`] so per-launch argument packing is a single
//! function call, not a branch over modes.

use serde::{Deserialize, Serialize};

/// Numeric precision mode, fixed for the lifetime of a simulation context.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PrecisionMode {
    /// IEEE binary16 state and arguments.
    Half,
    /// f32 state and arguments.
    Single,
    /// f64 state and arguments.
    Double,
    /// f32 positions with an f64-wide accumulation path; arguments are
    /// passed double-wide.
    Mixed,
}

/// A kernel scalar argument, encoded at the width the active mode requires.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ScalarArg {
    /// binary16 bit pattern.
    Half(u16),
    Single(f32),
    Double(f64),
}

impl ScalarArg {
    /// Widens the encoded value back to f64. The round trip through the
    /// mode's width is what gives kernels their mode-consistent arguments.
    pub fn to_f64(self) -> f64 {
        match self {
            ScalarArg::Half(bits) => f64::from(f16_bits_to_f32(bits)),
            ScalarArg::Single(v) => f64::from(v),
            ScalarArg::Double(v) => v,
        }
    }
}

/// Scalar encoding rule, resolved once at context creation.
#[derive(Clone, Copy)]
pub struct ScalarEncoder {
    encode: fn(f64) -> ScalarArg,
    mode: PrecisionMode,
}

impl ScalarEncoder {
    /// Encodes a scalar at the width of the resolved mode.
    #[inline]
    pub fn encode(&self, value: f64) -> ScalarArg {
        (self.encode)(value)
    }

    /// Round-trips a scalar through the mode's width.
    #[inline]
    pub fn narrow(&self, value: f64) -> f64 {
        self.encode(value).to_f64()
    }

    /// The mode this encoder was resolved for.
    pub fn mode(&self) -> PrecisionMode {
        self.mode
    }
}

impl std::fmt::Debug for ScalarEncoder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScalarEncoder").field("mode", &self.mode).finish()
    }
}

impl PrecisionMode {
    /// Resolves the mode to its argument-encoding rule.
    pub fn encoder(self) -> ScalarEncoder {
        let encode = match self {
            PrecisionMode::Half => encode_half as fn(f64) -> ScalarArg,
            PrecisionMode::Single => encode_single,
            // Mixed passes kernel arguments double-wide; the narrower
            // position path is handled by the integrator's commit phase.
            PrecisionMode::Double | PrecisionMode::Mixed => encode_double,
        };
        ScalarEncoder { encode, mode: self }
    }

    /// Whether the position state is stored narrower than f64, requiring
    /// the first-order reciprocal correction in the commit phase.
    pub fn needs_reciprocal_correction(self) -> bool {
        matches!(self, PrecisionMode::Half | PrecisionMode::Single)
    }
}

fn encode_half(value: f64) -> ScalarArg {
    ScalarArg::Half(f32_to_f16_bits(value as f32))
}

fn encode_single(value: f64) -> ScalarArg {
    ScalarArg::Single(value as f32)
}

fn encode_double(value: f64) -> ScalarArg {
    ScalarArg::Double(value)
}

/// Packs an f32 into IEEE binary16 bits, round-to-nearest-even.
pub fn f32_to_f16_bits(value: f32) -> u16 {
    let bits = value.to_bits();
    let sign = ((bits >> 16) & 0x8000) as u16;
    let exp = ((bits >> 23) & 0xff) as i32;
    let frac = bits & 0x007f_ffff;

    if exp == 0xff {
        // Inf / NaN: preserve a quiet-NaN payload bit.
        let payload = if frac != 0 { 0x0200 } else { 0 };
        return sign | 0x7c00 | payload;
    }

    let unbiased = exp - 127;
    if unbiased > 15 {
        // Overflow to infinity.
        return sign | 0x7c00;
    }
    if unbiased >= -14 {
        // Normal range: 10 fraction bits, round to nearest even.
        let mantissa = frac >> 13;
        let round_bit = (frac >> 12) & 1;
        let sticky = frac & 0x0fff;
        let mut half = sign | (((unbiased + 15) as u16) << 10) | mantissa as u16;
        if round_bit == 1 && (sticky != 0 || mantissa & 1 == 1) {
            half += 1; // Carry into the exponent is well-formed.
        }
        return half;
    }
    if unbiased >= -25 {
        // Subnormal half: value = mantissa * 2^-24.
        let shift = (-1 - unbiased) as u32; // 14..24
        let full = frac | 0x0080_0000;
        let mantissa = full >> shift;
        let round_bit = (full >> (shift - 1)) & 1;
        let sticky = full & ((1 << (shift - 1)) - 1);
        let mut half = sign | mantissa as u16;
        if round_bit == 1 && (sticky != 0 || mantissa & 1 == 1) {
            half += 1;
        }
        return half;
    }
    // Underflow to signed zero.
    sign
}

/// Unpacks IEEE binary16 bits into an f32.
pub fn f16_bits_to_f32(bits: u16) -> f32 {
    let sign = u32::from(bits & 0x8000) << 16;
    let exp = (bits >> 10) & 0x1f;
    let frac = u32::from(bits & 0x03ff);

    let out = match exp {
        0 => {
            if frac == 0 {
                sign
            } else {
                // Subnormal: normalize into f32 range.
                let shift = frac.leading_zeros() - 21;
                let mantissa = (frac << (shift + 1)) & 0x03ff;
                sign | ((113 - shift) << 23) | (mantissa << 13)
            }
        }
        0x1f => sign | 0x7f80_0000 | (frac << 13),
        _ => sign | ((u32::from(exp) + 112) << 23) | (frac << 13),
    };
    f32::from_bits(out)
}
