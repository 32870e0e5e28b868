//! Motion inside a single envelope step.
//!
//! Between two consecutive points of a part, the acceleration is constant: the square
//! of the speed is linear in position.

/// Constant acceleration of the step going from `(pos_a, speed_a)` to `(pos_b, speed_b)`.
pub fn step_acceleration(pos_a: f64, pos_b: f64, speed_a: f64, speed_b: f64) -> f64 {
    (speed_b * speed_b - speed_a * speed_a) / (2.0 * (pos_b - pos_a))
}

/// Speed at `position`, which must lie between `pos_a` and `pos_b`.
pub fn interpolate_step_speed(pos_a: f64, pos_b: f64, speed_a: f64, speed_b: f64, position: f64) -> f64 {
    if speed_a == speed_b {
        return speed_a;
    }
    if position == pos_a {
        return speed_a;
    }
    if position == pos_b {
        return speed_b;
    }
    let acceleration = step_acceleration(pos_a, pos_b, speed_a, speed_b);
    let squared = speed_a * speed_a + 2.0 * acceleration * (position - pos_a);
    squared.max(0.0).sqrt()
}

/// Time needed to go from `pos_a` to `position`.
pub fn interpolate_step_time(pos_a: f64, pos_b: f64, speed_a: f64, speed_b: f64, position: f64) -> f64 {
    if speed_a == speed_b {
        return ((position - pos_a) / speed_a).abs();
    }
    let acceleration = step_acceleration(pos_a, pos_b, speed_a, speed_b);
    let speed = interpolate_step_speed(pos_a, pos_b, speed_a, speed_b, position);
    ((speed - speed_a) / acceleration).abs()
}

/// Duration of a whole step, using its mean speed.
pub fn compute_step_time(pos_a: f64, pos_b: f64, speed_a: f64, speed_b: f64) -> f64 {
    2.0 * (pos_b - pos_a).abs() / (speed_a + speed_b)
}

/// Position at which a step with distinct speeds reaches `speed`.
pub fn intersect_step_with_speed(pos_a: f64, pos_b: f64, speed_a: f64, speed_b: f64, speed: f64) -> f64 {
    let acceleration = step_acceleration(pos_a, pos_b, speed_a, speed_b);
    pos_a + (speed * speed - speed_a * speed_a) / (2.0 * acceleration)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_constant_acceleration_step() {
        // from rest at 1 m/s², 8 m later the speed is 4 m/s, after 4 s
        let acceleration = step_acceleration(0.0, 8.0, 0.0, 4.0);
        assert!((acceleration - 1.0).abs() < 1e-12);
        assert!((interpolate_step_speed(0.0, 8.0, 0.0, 4.0, 2.0) - 2.0).abs() < 1e-12);
        assert!((interpolate_step_time(0.0, 8.0, 0.0, 4.0, 2.0) - 2.0).abs() < 1e-12);
        assert!((compute_step_time(0.0, 8.0, 0.0, 4.0) - 4.0).abs() < 1e-12);
        assert!((intersect_step_with_speed(0.0, 8.0, 0.0, 4.0, 3.0) - 4.5).abs() < 1e-12);
    }

    #[test]
    fn test_constant_speed_step() {
        assert_eq!(interpolate_step_speed(0.0, 10.0, 2.0, 2.0, 3.0), 2.0);
        assert!((interpolate_step_time(0.0, 10.0, 2.0, 2.0, 3.0) - 1.5).abs() < 1e-12);
        assert!((compute_step_time(0.0, 10.0, 2.0, 2.0) - 5.0).abs() < 1e-12);
    }

    #[test]
    fn test_backward_step_is_symmetric() {
        // a step described from its end behaves as the same step
        let forward = interpolate_step_speed(0.0, 8.0, 0.0, 4.0, 6.0);
        let backward = interpolate_step_speed(8.0, 0.0, 4.0, 0.0, 6.0);
        assert!((forward - backward).abs() < 1e-12);
    }
}
