// src/motion/profile.rs - Trapezoidal velocity profile of a single move

/// One constant-acceleration phase of a move.
///
/// `until` is the cumulative distance (in defining-axis steps) at which the
/// phase ends; speeds are in defining-axis steps/s.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Phase {
    pub until: f64,
    pub v0: f64,
    pub v1: f64,
}

/// Splits a move of `distance` steps into accelerate / cruise / decelerate
/// phases between the fixed `entry` and `exit` speeds.
///
/// Returns three phases when `cruise` can be reached and held, two phases
/// meeting at the peak speed when it can't, and a single phase when the move
/// is only long enough to get from `entry` to `exit`.
pub fn trapezoid(entry: f64, exit: f64, cruise: f64, accel: f64, distance: f64) -> Vec<Phase> {
    let ramp = |from: f64, to: f64| (to * to - from * from) / (2.0 * accel);
    let cruise = cruise.max(entry).max(exit);

    let accel_distance = ramp(entry, cruise);
    let decel_distance = ramp(exit, cruise);
    if accel_distance + decel_distance <= distance {
        return vec![
            Phase { until: accel_distance, v0: entry, v1: cruise },
            Phase { until: distance - decel_distance, v0: cruise, v1: cruise },
            Phase { until: distance, v0: cruise, v1: exit },
        ];
    }

    let peak = ((2.0 * accel * distance + entry * entry + exit * exit) / 2.0).sqrt();
    if peak <= entry.max(exit) {
        return vec![Phase { until: distance, v0: entry, v1: exit }];
    }
    vec![
        Phase {
            until: ramp(entry, peak).clamp(0.0, distance),
            v0: entry,
            v1: peak,
        },
        Phase { until: distance, v0: peak, v1: exit },
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reaches_cruise() {
        // 1000 steps/s^2: reaching 100 steps/s takes 5 steps.
        let phases = trapezoid(0.0, 0.0, 100.0, 1000.0, 100.0);
        assert_eq!(phases.len(), 3);
        assert_eq!(phases[0], Phase { until: 5.0, v0: 0.0, v1: 100.0 });
        assert_eq!(phases[1], Phase { until: 95.0, v0: 100.0, v1: 100.0 });
        assert_eq!(phases[2], Phase { until: 100.0, v0: 100.0, v1: 0.0 });
    }

    #[test]
    fn test_too_short_for_cruise() {
        let phases = trapezoid(0.0, 0.0, 1000.0, 1000.0, 100.0);
        assert_eq!(phases.len(), 2);
        // v^2 = a * d for a symmetric ramp.
        let peak = (1000.0f64 * 100.0).sqrt();
        assert!((phases[0].v1 - peak).abs() < 1e-9);
        assert_eq!(phases[0].v1, phases[1].v0);
        assert!((phases[0].until - 50.0).abs() < 1e-9);
    }

    #[test]
    fn test_asymmetric_entry_exit() {
        let phases = trapezoid(50.0, 10.0, 1000.0, 1000.0, 100.0);
        assert_eq!(phases.len(), 2);
        assert_eq!(phases[0].v0, 50.0);
        assert_eq!(phases[1].v1, 10.0);
        // Peak^2 = (2*a*d + 50^2 + 10^2) / 2 = 101300; ramp up = (101300 - 2500) / 2000.
        assert!((phases[0].until - 49.4).abs() < 1e-9);
    }

    #[test]
    fn test_pure_deceleration() {
        // Exactly enough room to stop from 100 steps/s.
        let phases = trapezoid(100.0, 0.0, 100.0, 1000.0, 5.0);
        assert_eq!(phases.len(), 3);
        assert_eq!(phases[0].until, 0.0);
        assert_eq!(phases[1].until, 0.0);

        // Slightly short: single decelerating phase.
        let phases = trapezoid(100.0, 0.0, 100.0, 1000.0, 4.0);
        assert_eq!(phases, vec![Phase { until: 4.0, v0: 100.0, v1: 0.0 }]);
    }
}
