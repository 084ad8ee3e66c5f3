use num_traits::Float;

/// Evaluate the power law `a * x^b`
///
/// # Examples
///
/// ```
/// use mq135::math::power_law;
///
/// approx::assert_relative_eq!(power_law(2.0_f64, 3.0, 2.0), 16.0);
/// approx::assert_relative_eq!(power_law(100.0_f64, -2.0, 10.0), 1.0);
/// ```
pub fn power_law<T: Float>(a: T, b: T, x: T) -> T {
    a * x.powf(b)
}

/// Solve `y = a * x^b` for `x`
///
/// This is the inverse of [`power_law`], `x = (y / a)^(1 / b)`. The result is only meaningful
/// when `y / a` is positive and `b` is non-zero.
///
/// # Examples
///
/// ```
/// use mq135::math::{inverse_power_law, power_law};
///
/// let (a, b) = (110.93_f64, -2.762);
/// let y = power_law(a, b, 1.5);
/// approx::assert_relative_eq!(inverse_power_law(a, b, y), 1.5, max_relative = 1e-12);
/// ```
pub fn inverse_power_law<T: Float>(a: T, b: T, y: T) -> T {
    (y / a).powf(b.recip())
}

/// Partial derivatives of `a * x^b` with respect to `a` and `b`
///
/// Returns `[x^b, a * x^b * ln(x)]`, one row of the Jacobian of a power law model.
pub fn power_law_gradient<T: Float>(a: T, b: T, x: T) -> [T; 2] {
    let x_to_b = x.powf(b);
    [x_to_b, a * x_to_b * x.ln()]
}

/// Exact power law through two points
///
/// Returns `(a, b)` such that `a * x^b` passes through both `first` and `last`. Points must lie
/// in the positive quadrant with distinct abscissae, otherwise the result is not finite.
///
/// # Examples
///
/// ```
/// use mq135::math::power_law_through;
///
/// let (a, b) = power_law_through((1.0_f64, 3.0), (4.0, 1.5));
/// approx::assert_relative_eq!(a, 3.0);
/// approx::assert_relative_eq!(b, -0.5);
/// ```
pub fn power_law_through<T: Float>(first: (T, T), last: (T, T)) -> (T, T) {
    let b = (last.1 / first.1).ln() / (last.0 / first.0).ln();
    let a = first.1 / first.0.powf(b);
    (a, b)
}
