//! Fixed-point helpers and lookup tables for the audio hot path.
//!
//! All per-sample arithmetic runs on integers: audio samples are `i16`,
//! normalized parameters are Q15 (`0..=32767`), playback speeds and grain
//! positions are Q16 and grain-length reciprocals are Q32. Intermediate
//! products are widened to `i32`/`i64` and saturated back at the boundaries.

pub mod luts;

// -------------------------------------------------------------------------------------------------

/// Full scale of a Q15 normalized value.
pub const Q15_ONE: i16 = 32767;

/// Unity playback speed in Q16.
pub const Q16_ONE: i32 = 1 << 16;

/// Saturate a widened intermediate value back to the 16 bit sample range.
#[inline]
pub fn saturate16(value: i32) -> i16 {
    value.clamp(-32767, 32767) as i16
}

/// Multiply a sample by a Q15 gain.
#[inline]
pub fn mul_q15(sample: i16, gain_q15: i16) -> i16 {
    ((sample as i32 * gain_q15 as i32) >> 15) as i16
}

// -------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn saturation() {
        assert_eq!(saturate16(40000), 32767);
        assert_eq!(saturate16(-40000), -32767);
        assert_eq!(saturate16(1234), 1234);
    }

    #[test]
    fn q15_multiply() {
        assert_eq!(mul_q15(32767, Q15_ONE), 32766); // ~unity, one lsb rounding loss
        assert_eq!(mul_q15(20000, 0), 0);
        assert_eq!(mul_q15(-16384, 16384), -8192);
    }
}
