// src/hardware/motor.rs - Motor backend interface and its implementations
use crate::axes::{Axis, AxesRegister};
use crate::hardware::mapping::{HardwareMapping, NUM_MOTORS};
use serde::Serialize;
use std::collections::VecDeque;
use thiserror::Error;

/// One straight segment of motion in step space.
///
/// `steps` are signed deltas per logical axis. `v0` and `v1` are the entry
/// and exit step rates of the defining axis (the one with the most steps).
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct LinearSegmentSteps {
    pub v0: f64,
    pub v1: f64,
    pub steps: AxesRegister<i64>,
}

impl LinearSegmentSteps {
    /// Axis with the largest absolute step count; first in axis order on ties.
    pub fn defining_axis(&self) -> Axis {
        let mut defining = Axis::X;
        for (axis, steps) in self.steps.iter() {
            if steps.unsigned_abs() > self.steps[defining].unsigned_abs() {
                defining = axis;
            }
        }
        defining
    }

    pub fn defining_steps(&self) -> u64 {
        self.steps[self.defining_axis()].unsigned_abs()
    }

    /// Time needed for the segment under constant acceleration, in seconds.
    pub fn duration(&self) -> f64 {
        let speed_sum = self.v0 + self.v1;
        if speed_sum <= 0.0 {
            return 0.0;
        }
        2.0 * self.defining_steps() as f64 / speed_sum
    }
}

#[derive(Debug, Error)]
pub enum MotorError {
    #[error("Motors are disabled")]
    Disabled,
    #[error("Motor queue closed")]
    QueueClosed,
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Sink for finalized step segments.
///
/// `enqueue` may block while the backend's own queue is full, and must
/// execute segments in call order.
pub trait MotorOperations {
    fn enqueue(&mut self, segment: &LinearSegmentSteps) -> Result<(), MotorError>;

    fn motor_enable(&mut self, on: bool);

    /// Blocks until every enqueued segment has been executed.
    fn wait_queue_empty(&mut self) -> Result<(), MotorError>;
}

impl<M: MotorOperations + ?Sized> MotorOperations for &mut M {
    fn enqueue(&mut self, segment: &LinearSegmentSteps) -> Result<(), MotorError> {
        (**self).enqueue(segment)
    }

    fn motor_enable(&mut self, on: bool) {
        (**self).motor_enable(on)
    }

    fn wait_queue_empty(&mut self) -> Result<(), MotorError> {
        (**self).wait_queue_empty()
    }
}

impl<M: MotorOperations + ?Sized> MotorOperations for Box<M> {
    fn enqueue(&mut self, segment: &LinearSegmentSteps) -> Result<(), MotorError> {
        (**self).enqueue(segment)
    }

    fn motor_enable(&mut self, on: bool) {
        (**self).motor_enable(on)
    }

    fn wait_queue_empty(&mut self) -> Result<(), MotorError> {
        (**self).wait_queue_empty()
    }
}

/// Collects segments in memory; the stand-in used by tests.
#[derive(Debug, Clone, Default)]
pub struct RecordingMotorOperations {
    segments: Vec<LinearSegmentSteps>,
    enabled: bool,
    wait_calls: usize,
}

impl RecordingMotorOperations {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn segments(&self) -> &[LinearSegmentSteps] {
        &self.segments
    }

    pub fn take_segments(&mut self) -> Vec<LinearSegmentSteps> {
        std::mem::take(&mut self.segments)
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn wait_calls(&self) -> usize {
        self.wait_calls
    }
}

impl MotorOperations for RecordingMotorOperations {
    fn enqueue(&mut self, segment: &LinearSegmentSteps) -> Result<(), MotorError> {
        self.segments.push(*segment);
        Ok(())
    }

    fn motor_enable(&mut self, on: bool) {
        self.enabled = on;
    }

    fn wait_queue_empty(&mut self) -> Result<(), MotorError> {
        self.wait_calls += 1;
        Ok(())
    }
}

/// Simulated machine: keeps a bounded queue of pending segments and tracks
/// the position of every motor connector through the hardware mapping.
///
/// When the queue is full, `enqueue` executes the oldest segment first, the
/// way a hardware queue blocks until a slot frees up.
#[derive(Debug)]
pub struct SimulatedMotorOperations<'a> {
    hardware: &'a HardwareMapping,
    pending: VecDeque<LinearSegmentSteps>,
    capacity: usize,
    motor_positions: [i64; NUM_MOTORS],
    executed: usize,
    elapsed: f64,
    enabled: bool,
}

impl<'a> SimulatedMotorOperations<'a> {
    pub const DEFAULT_CAPACITY: usize = 64;

    pub fn new(hardware: &'a HardwareMapping) -> Self {
        Self::with_capacity(hardware, Self::DEFAULT_CAPACITY)
    }

    pub fn with_capacity(hardware: &'a HardwareMapping, capacity: usize) -> Self {
        Self {
            hardware,
            pending: VecDeque::with_capacity(capacity),
            capacity: capacity.max(1),
            motor_positions: [0; NUM_MOTORS],
            executed: 0,
            elapsed: 0.0,
            enabled: false,
        }
    }

    fn execute_next(&mut self) -> bool {
        let Some(segment) = self.pending.pop_front() else {
            return false;
        };
        let motor_steps = self.hardware.motor_steps(&segment.steps);
        for (position, delta) in self.motor_positions.iter_mut().zip(motor_steps) {
            *position += delta;
        }
        self.elapsed += segment.duration();
        self.executed += 1;
        tracing::trace!("Executed segment {:?} -> motors {:?}", segment.steps, self.motor_positions);
        true
    }

    /// Absolute step position per connector, index 0 being connector 1.
    pub fn motor_positions(&self) -> &[i64; NUM_MOTORS] {
        &self.motor_positions
    }

    pub fn executed_segments(&self) -> usize {
        self.executed
    }

    pub fn pending_segments(&self) -> usize {
        self.pending.len()
    }

    /// Estimated machine time of all executed segments, in seconds.
    pub fn elapsed_seconds(&self) -> f64 {
        self.elapsed
    }
}

impl MotorOperations for SimulatedMotorOperations<'_> {
    fn enqueue(&mut self, segment: &LinearSegmentSteps) -> Result<(), MotorError> {
        if !self.enabled {
            return Err(MotorError::Disabled);
        }
        while self.pending.len() >= self.capacity {
            self.execute_next();
        }
        self.pending.push_back(*segment);
        Ok(())
    }

    fn motor_enable(&mut self, on: bool) {
        tracing::debug!("Motors {}", if on { "enabled" } else { "disabled" });
        self.enabled = on;
    }

    fn wait_queue_empty(&mut self) -> Result<(), MotorError> {
        while self.execute_next() {}
        Ok(())
    }
}

/// Logs every segment before handing it on; used for `debug_print`.
#[derive(Debug)]
pub struct LoggingMotorOperations<M> {
    inner: M,
    count: usize,
}

impl<M: MotorOperations> LoggingMotorOperations<M> {
    pub fn new(inner: M) -> Self {
        Self { inner, count: 0 }
    }

    pub fn into_inner(self) -> M {
        self.inner
    }
}

impl<M: MotorOperations> MotorOperations for LoggingMotorOperations<M> {
    fn enqueue(&mut self, segment: &LinearSegmentSteps) -> Result<(), MotorError> {
        let moving: Vec<String> = segment
            .steps
            .iter()
            .filter(|(_, steps)| *steps != 0)
            .map(|(axis, steps)| format!("{}={}", axis, steps))
            .collect();
        tracing::info!(
            "#{:<5} {} v0={:.1} v1={:.1} steps/s",
            self.count,
            moving.join(" "),
            segment.v0,
            segment.v1
        );
        self.count += 1;
        self.inner.enqueue(segment)
    }

    fn motor_enable(&mut self, on: bool) {
        self.inner.motor_enable(on)
    }

    fn wait_queue_empty(&mut self) -> Result<(), MotorError> {
        self.inner.wait_queue_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn segment(x: i64, y: i64, v0: f64, v1: f64) -> LinearSegmentSteps {
        LinearSegmentSteps {
            v0,
            v1,
            steps: AxesRegister::with(&[(Axis::X, x), (Axis::Y, y)]),
        }
    }

    #[test]
    fn test_defining_axis() {
        assert_eq!(segment(10, -20, 0.0, 1.0).defining_axis(), Axis::Y);
        assert_eq!(segment(10, -20, 0.0, 1.0).defining_steps(), 20);
        // Ties go to the first axis.
        assert_eq!(segment(-5, 5, 0.0, 1.0).defining_axis(), Axis::X);
    }

    #[test]
    fn test_duration() {
        // 100 steps accelerating 0 -> 100 steps/s takes 2s.
        assert_eq!(segment(100, 0, 0.0, 100.0).duration(), 2.0);
        assert_eq!(segment(100, 0, 50.0, 50.0).duration(), 2.0);
        assert_eq!(segment(100, 0, 0.0, 0.0).duration(), 0.0);
    }

    #[test]
    fn test_recording_backend() {
        let mut motors = RecordingMotorOperations::new();
        motors.motor_enable(true);
        motors.enqueue(&segment(1, 2, 0.0, 3.0)).unwrap();
        motors.wait_queue_empty().unwrap();
        assert!(motors.is_enabled());
        assert_eq!(motors.segments().len(), 1);
        assert_eq!(motors.wait_calls(), 1);
        assert_eq!(motors.take_segments().len(), 1);
        assert!(motors.segments().is_empty());
    }

    #[test]
    fn test_simulated_backend_tracks_motor_positions() {
        let mut hardware = HardwareMapping::new();
        hardware.add_motor_mapping(Axis::X, 1, false).unwrap();
        hardware.add_motor_mapping(Axis::Y, 2, false).unwrap();
        hardware.add_motor_mapping(Axis::Y, 3, true).unwrap();
        let mut motors = SimulatedMotorOperations::with_capacity(&hardware, 2);

        assert!(matches!(motors.enqueue(&segment(1, 1, 0.0, 1.0)), Err(MotorError::Disabled)));

        motors.motor_enable(true);
        motors.enqueue(&segment(100, 50, 0.0, 100.0)).unwrap();
        motors.enqueue(&segment(100, 50, 100.0, 100.0)).unwrap();
        assert_eq!(motors.pending_segments(), 2);
        // Queue full: the oldest one runs to make room.
        motors.enqueue(&segment(-50, 0, 100.0, 0.0)).unwrap();
        assert_eq!(motors.executed_segments(), 1);
        assert_eq!(motors.pending_segments(), 2);

        motors.wait_queue_empty().unwrap();
        assert_eq!(motors.executed_segments(), 3);
        assert_eq!(motors.motor_positions()[0], 150);
        assert_eq!(motors.motor_positions()[1], 100);
        assert_eq!(motors.motor_positions()[2], -100);
        assert_eq!(motors.elapsed_seconds(), 2.0 + 1.0 + 1.0);
    }

    #[test]
    fn test_logging_backend_forwards() {
        let mut recorder = RecordingMotorOperations::new();
        {
            let mut logging = LoggingMotorOperations::new(&mut recorder);
            logging.motor_enable(true);
            logging.enqueue(&segment(3, 0, 0.0, 10.0)).unwrap();
            logging.wait_queue_empty().unwrap();
        }
        assert!(recorder.is_enabled());
        assert_eq!(recorder.segments().len(), 1);
        assert_eq!(recorder.wait_calls(), 1);
    }

    fn run_boxed(mut motors: Box<dyn MotorOperations + '_>) -> Result<(), MotorError> {
        motors.motor_enable(true);
        motors.enqueue(&segment(4, 2, 0.0, 8.0))?;
        motors.enqueue(&segment(4, 2, 8.0, 0.0))?;
        motors.wait_queue_empty()
    }

    #[test]
    fn test_boxed_backend_selected_at_runtime() {
        let mut recorder = RecordingMotorOperations::new();
        for debug_print in [false, true] {
            let backend: Box<dyn MotorOperations + '_> = if debug_print {
                Box::new(LoggingMotorOperations::new(&mut recorder))
            } else {
                Box::new(&mut recorder)
            };
            run_boxed(backend).unwrap();
        }
        assert_eq!(recorder.segments().len(), 4);
        assert_eq!(recorder.wait_calls(), 2);

        let mut hardware = HardwareMapping::new();
        hardware.add_motor_mapping(Axis::X, 1, false).unwrap();
        let mut simulated = SimulatedMotorOperations::new(&hardware);
        run_boxed(Box::new(&mut simulated)).unwrap();
        assert_eq!(simulated.motor_positions()[0], 8);
    }
}
