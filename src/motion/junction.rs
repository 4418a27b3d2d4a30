// src/motion/junction.rs - Corner classification between consecutive moves
use crate::axes::{Axis, AxesRegister};

/// Decides how fast the machine may pass the corner between two moves.
///
/// Corners at or above `threshold_angle` degrees are sharp and force a full
/// stop. Shallower corners are taken at the lower of the two cruise speeds.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct JunctionRule {
    pub threshold_angle: f64,
}

impl JunctionRule {
    pub fn new(threshold_angle: f64) -> Self {
        Self { threshold_angle }
    }

    pub fn is_sharp(&self, angle: f64) -> bool {
        angle >= self.threshold_angle
    }

    /// Highest speed allowed at the junction, in the common unit of both cruise speeds.
    pub fn max_junction_speed(
        &self,
        from_direction: &AxesRegister,
        from_cruise: f64,
        to_direction: &AxesRegister,
        to_cruise: f64,
    ) -> f64 {
        let angle = corner_angle(from_direction, to_direction);
        if self.is_sharp(angle) {
            tracing::trace!("Sharp corner {:.2}° >= {:.2}°: full stop", angle, self.threshold_angle);
            0.0
        } else {
            from_cruise.min(to_cruise)
        }
    }
}

/// Unit vector pointing along `delta`, or all zeros for a zero vector.
pub fn unit_vector(delta: &AxesRegister) -> AxesRegister {
    let length = delta.iter().map(|(_, v)| v * v).sum::<f64>().sqrt();
    let mut unit = AxesRegister::new();
    if length > 0.0 {
        for axis in Axis::ALL {
            unit[axis] = delta[axis] / length;
        }
    }
    unit
}

/// Angle in degrees between two unit direction vectors (0 = straight on, 180 = reversal).
pub fn corner_angle(from: &AxesRegister, to: &AxesRegister) -> f64 {
    let dot: f64 = Axis::ALL.iter().map(|&axis| from[axis] * to[axis]).sum();
    dot.clamp(-1.0, 1.0).acos().to_degrees()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dir(x: f64, y: f64) -> AxesRegister {
        unit_vector(&AxesRegister::with(&[(Axis::X, x), (Axis::Y, y)]))
    }

    #[test]
    fn test_unit_vector() {
        let unit = dir(3.0, 4.0);
        assert!((unit[Axis::X] - 0.6).abs() < 1e-12);
        assert!((unit[Axis::Y] - 0.8).abs() < 1e-12);
        assert_eq!(unit_vector(&AxesRegister::new()), AxesRegister::new());
    }

    #[test]
    fn test_corner_angle() {
        assert!(corner_angle(&dir(1.0, 0.0), &dir(1.0, 0.0)).abs() < 1e-6);
        assert!((corner_angle(&dir(1.0, 0.0), &dir(0.0, 1.0)) - 90.0).abs() < 1e-9);
        assert!((corner_angle(&dir(1.0, 0.0), &dir(-1.0, 0.0)) - 180.0).abs() < 1e-9);
        assert!((corner_angle(&dir(1.0, 0.0), &dir(1.0, 1.0)) - 45.0).abs() < 1e-9);
    }

    #[test]
    fn test_junction_rule() {
        let rule = JunctionRule::new(5.0);
        let a = dir(1.0, 0.0);
        let shallow = dir(1.0, 0.05);
        let square = dir(0.0, 1.0);
        assert_eq!(rule.max_junction_speed(&a, 300.0, &shallow, 200.0), 200.0);
        assert_eq!(rule.max_junction_speed(&a, 100.0, &shallow, 200.0), 100.0);
        assert_eq!(rule.max_junction_speed(&a, 300.0, &square, 300.0), 0.0);

        // Threshold 0 turns every corner, even a straight continuation, into a stop.
        let always_stop = JunctionRule::new(0.0);
        assert_eq!(always_stop.max_junction_speed(&a, 300.0, &a, 300.0), 0.0);
    }
}
