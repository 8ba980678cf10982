//! Utility maths functions

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use num_traits::Float;

/// Limit `value` to the range [`min`, `max`].
pub fn clamp<T>(value: &T, min: &T, max: &T) -> T 
where
    T: Float
{
    let mut ret = *value;

    if ret > *max {
        ret = *max
    }
    if ret < *min {
        ret = *min
    }

    ret
}

/// Move `current` towards `target` by no more than `max_step`.
///
/// `max_step` is treated as a magnitude, its sign is ignored.
pub fn step_towards<T>(current: T, target: T, max_step: T) -> T
where
    T: Float
{
    let max_step = max_step.abs();
    let delta = target - current;

    if delta > max_step {
        current + max_step
    }
    else if delta < -max_step {
        current - max_step
    }
    else {
        target
    }
}

/// Normalise an angle into the range (-pi, pi].
pub fn wrap_pi<T>(value: T) -> T
where
    T: Float
{
    let pi_t = T::from(std::f64::consts::PI).unwrap_or_else(T::zero);
    let tau_t = pi_t + pi_t;

    // Shift into [0, 2pi), then back into [-pi, pi)
    let wrapped = rem_euclid(value + pi_t, tau_t) - pi_t;

    // The lower bound belongs to the upper end of the range
    if wrapped <= -pi_t {
        wrapped + tau_t
    }
    else {
        wrapped
    }
}

/// Calculates the least nonnegative remainder of `lhs (mod rhs)`.
/// 
/// This function is taken from the std library as num is missing it.
///
/// In particular, the return value `r` satisfies `0.0 <= r < rhs.abs()` in
/// most cases. However, due to a floating point round-off error it can
/// result in `r == rhs.abs()`, violating the mathematical definition, if
/// `self` is much smaller than `rhs.abs()` in magnitude and `self < 0.0`.
pub fn rem_euclid<T>(lhs: T, rhs: T) -> T
where
    T: Float
{
    let r = lhs % rhs;
    if r < T::zero() { r + rhs.abs() } else { r }
}
