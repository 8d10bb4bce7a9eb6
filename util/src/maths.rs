//! Utility maths functions

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use num_traits::Float;

/// Map a value from one range into another.
pub fn lin_map<T>(source_range: (T, T), target_range: (T, T), value: T) -> T
where
    T: Float
{
    target_range.0
        + ((value - source_range.0)
        * (target_range.1 - target_range.0)
        / (source_range.1 - source_range.0))
}

/// Limit a value to the closed range `[min, max]`.
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

/// Calculates the least nonnegative remainder of `lhs (mod rhs)`.
///
/// This function is taken from the std library as num is missing it.
///
/// Due to floating point round-off the result can equal `rhs.abs()` when `lhs` is a very small
/// negative number. Use [`wrap_deg`] when a strictly half-open range is required.
pub fn rem_euclid<T>(lhs: T, rhs: T) -> T
where
    T: Float
{
    let r = lhs % rhs;
    if r < T::zero() { r + rhs.abs() } else { r }
}

/// Wrap an angle in degrees into the range `[0, 360)`.
pub fn wrap_deg<T>(angle_deg: T) -> T
where
    T: Float
{
    let full_turn = T::from(360.0).unwrap_or_else(T::max_value);
    let wrapped = rem_euclid(angle_deg, full_turn);

    if wrapped >= full_turn {
        T::zero()
    }
    else {
        wrapped
    }
}

/// Arithmetic mean of the values, or `None` if there are none.
pub fn mean<T, I>(values: I) -> Option<T>
where
    T: Float,
    I: IntoIterator<Item = T>
{
    let mut sum = T::zero();
    let mut count = T::zero();

    for v in values {
        sum = sum + v;
        count = count + T::one();
    }

    if count > T::zero() {
        Some(sum / count)
    }
    else {
        None
    }
}

/// Population standard deviation of the values, or `None` if there are none.
pub fn std_dev<T>(values: &[T]) -> Option<T>
where
    T: Float
{
    let mu = mean(values.iter().copied())?;
    let var = mean(values.iter().map(|v| (*v - mu).powi(2)))?;

    Some(var.sqrt())
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_wrap_deg() {
        assert_eq!(wrap_deg(0f64), 0f64);
        assert_eq!(wrap_deg(360f64), 0f64);
        assert_eq!(wrap_deg(370f64), 10f64);
        assert_eq!(wrap_deg(-10f64), 350f64);
        assert_eq!(wrap_deg(-720f64), 0f64);

        // Tiny negative values must not round up to 360
        let w = wrap_deg(-1e-20f64);
        assert!(w >= 0.0 && w < 360.0);
    }

    #[test]
    fn test_std_dev() {
        assert_eq!(std_dev::<f64>(&[]), None);
        assert_eq!(std_dev(&[3.0f64; 10]), Some(0.0));

        // Population deviation of 2, 4, 4, 4, 5, 5, 7, 9 is exactly 2
        let sd = std_dev(&[2.0f64, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0]).unwrap();
        assert!((sd - 2.0).abs() < 1e-12);
    }

    #[test]
    fn test_lin_map_and_clamp() {
        assert_eq!(lin_map((0f64, 10f64), (100f64, 200f64), 5f64), 150f64);
        assert_eq!(clamp(&20f64, &-15f64, &15f64), 15f64);
        assert_eq!(clamp(&-20f64, &-15f64, &15f64), -15f64);
        assert_eq!(clamp(&3f64, &-15f64, &15f64), 3f64);
    }
}
