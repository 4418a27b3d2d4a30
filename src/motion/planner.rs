// src/motion/planner.rs - Lookahead planner turning moves into step segments
use std::collections::VecDeque;

use crate::axes::{Axis, AxesRegister};
use crate::config::MachineControlConfig;
use crate::hardware::{HardwareMapping, LinearSegmentSteps, MotorOperations};
use crate::motion::junction::{unit_vector, JunctionRule};
use crate::motion::profile::trapezoid;
use crate::motion::PlannerError;

/// Moves kept for lookahead before the oldest one is committed.
pub const DEFAULT_LOOKAHEAD: usize = 16;

/// Shortest move, in defining-axis steps, that gets its own segments.
const MIN_MOVE_STEPS: f64 = 2.0;

/// Largest absolute step position; every integer up to here is exact in f64.
const MAX_STEP_POSITION: f64 = (1u64 << 53) as f64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlannerState {
    /// Nothing buffered.
    Idle,
    /// Moves are buffered and their junction speeds may still change.
    Buffering,
    /// Inside `bring_path_to_halt`.
    Draining,
}

/// A buffered move in step space.
///
/// All speeds are in steps/s of this move's defining axis; `accel` in steps/s^2.
#[derive(Debug, Clone)]
struct PlannedMove {
    delta_steps: AxesRegister<i64>,
    direction: AxesRegister,
    defining_steps: f64,
    cruise: f64,
    accel: f64,
    /// Cap on the junction speed into this move.
    entry_cap: f64,
    /// The corner before this move is sharp.
    stop_before: bool,
    /// Planned junction speed into this move; also the exit of the move before.
    entry: f64,
}

impl PlannedMove {
    /// Highest speed reachable at the far end when starting at `speed`
    /// (or, read backwards, the highest start speed that still allows ending at `speed`).
    fn reachable_from(&self, speed: f64) -> f64 {
        (speed * speed + 2.0 * self.accel * self.defining_steps).sqrt()
    }
}

/// Buffers linear moves and hands finalized, speed-continuous step segments
/// to the motor backend.
///
/// Segments are emitted strictly in enqueue order. The first segment after a
/// halt starts at rest, `bring_path_to_halt` ends at rest, and every
/// segment's `v1` equals the next one's `v0`.
pub struct Planner<'a, M: MotorOperations> {
    config: &'a MachineControlConfig,
    hardware: &'a HardwareMapping,
    motor_ops: M,
    junction: JunctionRule,
    queue: VecDeque<PlannedMove>,
    lookahead: usize,
    /// Entry speed of the front move, fixed by what has already been emitted.
    front_entry: f64,
    position: AxesRegister,
    position_steps: AxesRegister<i64>,
    state: PlannerState,
}

impl<'a, M: MotorOperations> Planner<'a, M> {
    pub fn new(
        config: &'a MachineControlConfig,
        hardware: &'a HardwareMapping,
        motor_ops: M,
    ) -> Result<Self, PlannerError> {
        Self::with_lookahead(config, hardware, motor_ops, DEFAULT_LOOKAHEAD)
    }

    pub fn with_lookahead(
        config: &'a MachineControlConfig,
        hardware: &'a HardwareMapping,
        motor_ops: M,
        lookahead: usize,
    ) -> Result<Self, PlannerError> {
        config.validate()?;
        if lookahead == 0 {
            return Err(PlannerError::EmptyLookahead);
        }
        tracing::info!(
            "Planner ready: lookahead {} moves, threshold angle {}°, speed factor {}",
            lookahead,
            config.threshold_angle,
            config.speed_factor
        );
        Ok(Self {
            config,
            hardware,
            motor_ops,
            junction: JunctionRule::new(config.threshold_angle),
            queue: VecDeque::with_capacity(lookahead + 1),
            lookahead,
            front_entry: 0.0,
            position: AxesRegister::new(),
            position_steps: AxesRegister::new(),
            state: PlannerState::Idle,
        })
    }

    /// Queues a straight move from the last position to `target` (mm) at
    /// `feedrate` (mm/s).
    ///
    /// Moves that became fully determined are handed to the backend before
    /// this returns. Moves without any step, or without a usable feedrate,
    /// are dropped.
    pub fn enqueue(&mut self, target: &AxesRegister, feedrate: f64) -> Result<(), PlannerError> {
        if !(feedrate.is_finite() && feedrate > 0.0) {
            tracing::warn!("Ignoring move to {:?}: feedrate {} mm/s", target.as_array(), feedrate);
            return Ok(());
        }

        let Some(target_steps) = self.to_steps(target) else {
            tracing::warn!("Ignoring move to {:?}: target outside the step range", target.as_array());
            return Ok(());
        };
        let mut delta_steps = AxesRegister::<i64>::new();
        for axis in Axis::ALL {
            delta_steps[axis] = target_steps[axis] - self.position_steps[axis];
        }
        self.position = *target;

        let Some(mut planned) = self.plan_move(delta_steps, feedrate) else {
            tracing::debug!("Dropping zero-step move to {:?}", target.as_array());
            return Ok(());
        };
        if planned.defining_steps < MIN_MOVE_STEPS {
            // Too short to both accelerate and decelerate; the steps stay
            // pending and are picked up by the next move.
            tracing::debug!("Dropping sub-resolution move to {:?}", target.as_array());
            return Ok(());
        }
        self.position_steps = target_steps;

        match self.queue.back() {
            Some(previous) => {
                planned.entry_cap = self.junction.max_junction_speed(
                    &previous.direction,
                    previous.cruise,
                    &planned.direction,
                    planned.cruise,
                );
                planned.stop_before = planned.entry_cap == 0.0;
            }
            None => {
                // Only ever empty after a stop: the previous move, if any, ended at rest.
                self.front_entry = 0.0;
            }
        }
        tracing::debug!(
            "Queued move {:?} steps, cruise {:.1} steps/s, accel {:.1} steps/s², junction cap {:.1}",
            planned.delta_steps.as_array(),
            planned.cruise,
            planned.accel,
            planned.entry_cap
        );
        self.queue.push_back(planned);
        self.state = PlannerState::Buffering;

        self.replan();
        self.emit_finalized()?;
        if self.queue.is_empty() {
            self.state = PlannerState::Idle;
        }
        Ok(())
    }

    /// Brings the machine to rest at the end of the last queued move and
    /// emits everything still buffered.
    pub fn bring_path_to_halt(&mut self) -> Result<(), PlannerError> {
        if self.queue.is_empty() {
            self.state = PlannerState::Idle;
            return Ok(());
        }
        self.state = PlannerState::Draining;
        tracing::debug!("Draining {} buffered move(s)", self.queue.len());
        self.replan();
        if let Err(e) = self.emit_front(self.queue.len()) {
            self.state = PlannerState::Buffering;
            return Err(e);
        }
        self.front_entry = 0.0;
        self.state = PlannerState::Idle;
        Ok(())
    }

    /// Halts the path and re-bases the planner on `position` (mm).
    pub fn set_position(&mut self, position: &AxesRegister) -> Result<(), PlannerError> {
        let steps = self.to_steps(position).ok_or(PlannerError::PositionOutOfRange)?;
        self.bring_path_to_halt()?;
        self.position = *position;
        self.position_steps = steps;
        tracing::debug!("Planner position set to {:?}", position.as_array());
        Ok(())
    }

    /// Target of the last enqueued move, in mm.
    pub fn current_position(&self) -> &AxesRegister {
        &self.position
    }

    pub fn state(&self) -> PlannerState {
        self.state
    }

    /// Number of buffered, not yet emitted moves.
    pub fn queue_len(&self) -> usize {
        self.queue.len()
    }

    pub fn config(&self) -> &'a MachineControlConfig {
        self.config
    }

    pub fn motor_ops(&self) -> &M {
        &self.motor_ops
    }

    pub fn motor_ops_mut(&mut self) -> &mut M {
        &mut self.motor_ops
    }

    /// Gives the backend back. Buffered moves that were not halted are lost.
    pub fn into_motor_ops(self) -> M {
        if !self.queue.is_empty() {
            tracing::warn!("Discarding {} buffered move(s)", self.queue.len());
        }
        self.motor_ops
    }

    fn is_active_axis(&self, axis: Axis) -> bool {
        self.config.is_axis_configured(axis) && self.hardware.is_axis_mapped(axis)
    }

    /// Absolute step position of `position`, 0 on inactive axes. `None` when
    /// an active axis lands outside the exactly representable step range.
    fn to_steps(&self, position: &AxesRegister) -> Option<AxesRegister<i64>> {
        let mut steps = AxesRegister::<i64>::new();
        for axis in Axis::ALL {
            if !self.is_active_axis(axis) {
                continue;
            }
            let rounded = (position[axis] * self.config.steps_per_mm[axis]).round();
            if !(rounded.abs() <= MAX_STEP_POSITION) {
                return None;
            }
            steps[axis] = rounded as i64;
        }
        Some(steps)
    }

    /// Derives direction, cruise speed and acceleration of a move in its
    /// defining axis' step units. `None` for a move without steps.
    fn plan_move(&self, delta_steps: AxesRegister<i64>, feedrate: f64) -> Option<PlannedMove> {
        let mut defining = Axis::X;
        for (axis, steps) in delta_steps.iter() {
            if steps.unsigned_abs() > delta_steps[defining].unsigned_abs() {
                defining = axis;
            }
        }
        let defining_steps = delta_steps[defining].unsigned_abs();
        if defining_steps == 0 {
            return None;
        }

        let mut delta_mm = AxesRegister::new();
        for (axis, steps) in delta_steps.iter() {
            if steps != 0 {
                delta_mm[axis] = steps as f64 / self.config.steps_per_mm[axis];
            }
        }
        let length = delta_mm.iter().map(|(_, v)| v * v).sum::<f64>().sqrt();
        let direction = unit_vector(&delta_mm);

        // Euclidean limits: each axis only sees its share of the motion.
        let mut cruise = feedrate;
        let mut accel = f64::INFINITY;
        for (axis, component) in direction.iter() {
            let component = component.abs();
            if component > 0.0 {
                cruise = cruise.min(self.config.max_feedrate[axis] / component);
                accel = accel.min(self.config.acceleration[axis] / component);
            }
        }
        cruise *= self.config.speed_factor;

        // mm of travel -> steps of the defining axis.
        let steps_per_mm = defining_steps as f64 / length;
        Some(PlannedMove {
            delta_steps,
            direction,
            defining_steps: defining_steps as f64,
            cruise: cruise * steps_per_mm,
            accel: accel * steps_per_mm,
            entry_cap: 0.0,
            stop_before: true,
            entry: 0.0,
        })
    }

    /// Recomputes every junction speed in the window: a backward pass that
    /// lets each move still stop by the end of the queue, then a forward pass
    /// that keeps every exit reachable from its entry.
    fn replan(&mut self) {
        let Some(last) = self.queue.len().checked_sub(1) else {
            return;
        };

        let mut exit = 0.0;
        for index in (1..=last).rev() {
            let planned = &mut self.queue[index];
            planned.entry = planned.entry_cap.min(planned.reachable_from(exit));
            exit = planned.entry;
        }
        self.queue[0].entry = self.front_entry;

        for index in 0..last {
            let reachable = self.queue[index].reachable_from(self.queue[index].entry);
            let next = &mut self.queue[index + 1];
            if next.entry > reachable {
                next.entry = reachable;
            }
        }
    }

    /// Emits every move whose exit speed can no longer change: all moves in
    /// front of the last sharp corner, then whatever overflows the lookahead.
    fn emit_finalized(&mut self) -> Result<(), PlannerError> {
        if let Some(stop) = (1..self.queue.len()).rev().find(|&i| self.queue[i].stop_before) {
            self.emit_front(stop)?;
        }
        if self.queue.len() > self.lookahead {
            self.emit_front(self.queue.len() - self.lookahead)?;
        }
        Ok(())
    }

    /// Hands the first `count` moves to the backend.
    ///
    /// A move leaves the queue only once all of its segments were accepted. On
    /// a backend error the failing move stays at the front, although some of
    /// its segments may already have been sent.
    fn emit_front(&mut self, count: usize) -> Result<(), PlannerError> {
        for _ in 0..count {
            let Some(planned) = self.queue.front().cloned() else {
                break;
            };
            let exit = self.queue.get(1).map_or(0.0, |next| next.entry);
            self.emit_move(&planned, exit)?;
            self.queue.pop_front();
            self.front_entry = exit;
        }
        Ok(())
    }

    /// Synthesizes the accelerate / cruise / decelerate segments of one move.
    fn emit_move(&mut self, planned: &PlannedMove, exit: f64) -> Result<(), PlannerError> {
        let phases = trapezoid(
            planned.entry,
            exit,
            planned.cruise,
            planned.accel,
            planned.defining_steps,
        );

        let mut done = AxesRegister::<i64>::new();
        let mut carried_v0 = None;
        let mut segments: Vec<LinearSegmentSteps> = Vec::with_capacity(phases.len());
        for (index, phase) in phases.iter().enumerate() {
            let fraction = phase.until / planned.defining_steps;
            let is_last = index + 1 == phases.len();
            let mut steps = AxesRegister::<i64>::new();
            for (axis, total) in planned.delta_steps.iter() {
                // Cumulative rounding keeps every phase moving the same way as the move.
                let reached = if is_last {
                    total
                } else {
                    (total as f64 * fraction).round() as i64
                };
                steps[axis] = reached - done[axis];
                done[axis] = reached;
            }
            if steps.iter().all(|(_, s)| s == 0) {
                carried_v0.get_or_insert(phase.v0);
                continue;
            }
            segments.push(LinearSegmentSteps {
                v0: carried_v0.take().unwrap_or(phase.v0),
                v1: phase.v1,
                steps,
            });
        }
        if carried_v0.is_some() {
            if let Some(last) = segments.last_mut() {
                last.v1 = exit;
            }
        }
        if let [only] = segments.as_slice() {
            if only.v0 == 0.0 && only.v1 == 0.0 {
                // All steps ended up in one phase between two stops: split it
                // into a ramp up and a ramp down around the reachable peak.
                let peak = (planned.accel * planned.defining_steps).sqrt().min(planned.cruise);
                segments = split_at_peak(&planned.delta_steps, peak);
            }
        }

        for segment in &segments {
            tracing::trace!(
                "Segment {:?} v0={:.3} v1={:.3}",
                segment.steps.as_array(),
                segment.v0,
                segment.v1
            );
            self.motor_ops.enqueue(segment)?;
        }
        Ok(())
    }
}

/// Two segments covering `delta_steps`, from rest up to `peak` and back to rest.
fn split_at_peak(delta_steps: &AxesRegister<i64>, peak: f64) -> Vec<LinearSegmentSteps> {
    let mut up = AxesRegister::<i64>::new();
    let mut down = AxesRegister::<i64>::new();
    for (axis, total) in delta_steps.iter() {
        up[axis] = (total as f64 / 2.0).round() as i64;
        down[axis] = total - up[axis];
    }
    vec![
        LinearSegmentSteps { v0: 0.0, v1: peak, steps: up },
        LinearSegmentSteps { v0: peak, v1: 0.0, steps: down },
    ]
}

impl<M: MotorOperations> std::fmt::Debug for Planner<'_, M> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Planner")
            .field("state", &self.state)
            .field("queue_len", &self.queue.len())
            .field("lookahead", &self.lookahead)
            .field("position", &self.position)
            .finish()
    }
}
