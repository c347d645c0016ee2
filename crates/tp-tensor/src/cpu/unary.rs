// Scalar activation functions shared by the CPU backend.

use std::f32::consts::FRAC_1_SQRT_2;

/// Error function, Abramowitz & Stegun 7.1.26 (|error| < 1.5e-7).
pub(crate) fn erf(x: f32) -> f32 {
    const A1: f64 = 0.254_829_592;
    const A2: f64 = -0.284_496_736;
    const A3: f64 = 1.421_413_741;
    const A4: f64 = -1.453_152_027;
    const A5: f64 = 1.061_405_429;
    const P: f64 = 0.327_591_1;

    let x = x as f64;
    let sign = if x < 0.0 { -1.0 } else { 1.0 };
    let x = x.abs();
    let t = 1.0 / (1.0 + P * x);
    let poly = ((((A5 * t + A4) * t + A3) * t + A2) * t + A1) * t;
    (sign * (1.0 - poly * (-x * x).exp())) as f32
}

pub(crate) fn gelu(x: f32) -> f32 {
    0.5 * x * (1.0 + erf(x * FRAC_1_SQRT_2))
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn test_erf_reference_points() {
        assert_abs_diff_eq!(erf(0.0), 0.0, epsilon = 1e-6);
        assert_abs_diff_eq!(erf(1.0), 0.842_700_8, epsilon = 1e-6);
        assert_abs_diff_eq!(erf(-0.5), -0.520_499_9, epsilon = 1e-6);
    }

    #[test]
    fn test_gelu_reference_points() {
        assert_abs_diff_eq!(gelu(0.0), 0.0, epsilon = 1e-6);
        assert_abs_diff_eq!(gelu(1.0), 0.841_344_7, epsilon = 1e-5);
        assert_abs_diff_eq!(gelu(-1.0), -0.158_655_3, epsilon = 1e-5);
    }
}
