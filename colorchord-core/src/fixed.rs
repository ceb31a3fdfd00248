//! # Fixed-Point Helpers
//!
//! Small integer-only building blocks shared by every stage of the engine.
//! All of them saturate instead of wrapping, so pathological input (silence
//! followed by a clipped burst, for example) degrades to a pinned value rather
//! than a sign flip.

/// One step of a single-pole IIR filter: `y + (x - y) >> shift`.
///
/// The difference is shifted arithmetically, so a value that is decaying
/// toward a smaller target always drops by at least one. A value rising
/// toward a larger target may stall just below it.
#[inline]
pub fn iir_step(y: u16, x: u16, shift: u8) -> u16 {
    let delta = (x as i32 - y as i32) >> shift;
    saturate_u16(y as i32 + delta)
}

/// Clamps a signed intermediate into `u16` range.
#[inline]
pub fn saturate_u16(value: i32) -> u16 {
    value.clamp(0, u16::MAX as i32) as u16
}

/// Clamps an unsigned intermediate into `u16` range.
#[inline]
pub fn saturate_u16_from_u32(value: u32) -> u16 {
    value.min(u16::MAX as u32) as u16
}

/// Clamps an unsigned intermediate into `u8` range.
#[inline]
pub fn saturate_u8(value: u32) -> u8 {
    value.min(u8::MAX as u32) as u8
}

/// Cheap magnitude estimate of a sin/cos accumulator pair.
///
/// `max + min / 2` overestimates the true norm by at most ~12%, which is fine
/// for peak picking and needs no multiply or square root.
#[inline]
pub fn approx_norm(sin: i32, cos: i32) -> u32 {
    let s = sin.unsigned_abs();
    let c = cos.unsigned_abs();
    let (hi, lo) = if s > c { (s, c) } else { (c, s) };
    hi.saturating_add(lo >> 1)
}

/// Multiplies `value` by `num / den` where the ratio is first turned into a
/// Q16 factor, as the edge taper does.
#[inline]
pub fn scale_q16(value: u16, num: u32, den: u32) -> u16 {
    if den == 0 {
        return value;
    }
    let factor = (65536 / den) * num;
    saturate_u16_from_u32(((value as u64 * factor as u64) >> 16) as u32)
}

/// One pass of the `[1/4, 1/2, 1/4]` smoothing kernel.
///
/// Each tap is shifted before the add, so the sum of three `u16` values can
/// never exceed `u16::MAX`. `wrap` treats the slice as circular; otherwise
/// the edge bins are reused as their own missing neighbor.
pub fn blur_pass(input: &[u16], output: &mut [u16], wrap: bool) {
    let len = input.len();
    if len == 0 {
        return;
    }
    for i in 0..len {
        let left = if i > 0 {
            input[i - 1]
        } else if wrap {
            input[len - 1]
        } else {
            input[0]
        };
        let right = if i + 1 < len {
            input[i + 1]
        } else if wrap {
            input[0]
        } else {
            input[len - 1]
        };
        output[i] = (left >> 2) + (right >> 2) + (input[i] >> 1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn iir_moves_toward_target() {
        assert_eq!(iir_step(0, 160, 4), 10);
        assert_eq!(iir_step(160, 0, 4), 150);
        assert_eq!(iir_step(100, 100, 2), 100);
    }

    #[test]
    fn iir_decay_never_stalls() {
        let mut y = 5;
        let mut steps = 0;
        while y > 0 {
            let next = iir_step(y, 0, 4);
            assert!(next < y);
            y = next;
            steps += 1;
        }
        assert_eq!(steps, 5);
    }

    #[test]
    fn iir_saturates_at_extremes() {
        assert_eq!(iir_step(u16::MAX, u16::MAX, 0), u16::MAX);
        assert_eq!(iir_step(0, u16::MAX, 0), u16::MAX);
    }

    #[test]
    fn approx_norm_handles_extreme_inputs() {
        assert_eq!(approx_norm(0, 0), 0);
        assert_eq!(approx_norm(-100, 40), 120);
        assert_eq!(approx_norm(i32::MIN, i32::MIN), 3_221_225_472u32);
    }

    #[test]
    fn scale_q16_tapers() {
        assert_eq!(scale_q16(1000, 0, 24), 0);
        assert!(scale_q16(1000, 12, 24) >= 499);
        assert_eq!(scale_q16(1000, 5, 0), 1000);
    }

    #[test]
    fn blur_spreads_a_spike() {
        let input = [0, 0, 400, 0, 0];
        let mut out = [0; 5];
        blur_pass(&input, &mut out, false);
        assert_eq!(out, [0, 100, 200, 100, 0]);
    }

    #[test]
    fn blur_wraps_when_circular() {
        let input = [400, 0, 0, 0];
        let mut out = [0; 4];
        blur_pass(&input, &mut out, true);
        assert_eq!(out, [200, 100, 0, 100]);
    }

    #[test]
    fn blur_never_overflows() {
        let input = [u16::MAX; 3];
        let mut out = [0; 3];
        blur_pass(&input, &mut out, false);
        assert!(out.iter().all(|&v| v >= u16::MAX - 2));
    }
}
