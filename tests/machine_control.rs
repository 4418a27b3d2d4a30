// Integration tests for machine control driven from a config file and a move list

#[cfg(test)]
mod tests {
    use std::fs::File;
    use std::io::Write;
    use stride_rs::{
        load_config, parse_move_list, Axis, HardwareMapping, MachineControl,
        MachineError, MoveKind, RecordingMotorOperations, SimulatedMotorOperations,
    };
    use tempfile::tempdir;

    const CONFIG: &str = r#"
threshold_angle = 10.0
axis_mapping = "XYy"
min_endswitch = "XY"
max_endswitch = "__z"
home_order = "XY"

[axis.x]
steps_per_mm = 80.0
max_feedrate = 200.0
acceleration = 2000.0
move_range_mm = 200.0

[axis.y]
steps_per_mm = 80.0
max_feedrate = 150.0
acceleration = 1500.0
move_range_mm = 150.0
"#;

    const MOVES: &str = "
# square, then rapid home
X50 Y0 F100
X50 Y50
X0 Y50
X0 Y0
R X100 Y100
";

    fn write_config(dir: &tempfile::TempDir) -> String {
        let path = dir.path().join("machine.toml");
        let mut file = File::create(&path).unwrap();
        write!(file, "{}", CONFIG).unwrap();
        path.to_str().unwrap().to_string()
    }

    fn run_moves<'a>(
        machine: &mut MachineControl<'a, impl stride_rs::MotorOperations>,
        input: &str,
    ) -> Result<(), MachineError> {
        for request in parse_move_list(input).unwrap() {
            let mut target = *machine.current_position();
            for &(axis, value) in &request.axes {
                target[axis] = value;
            }
            match request.kind {
                MoveKind::Coordinated => machine.coordinated_move(request.feedrate, &target)?,
                MoveKind::Rapid => machine.rapid_move(&target)?,
                MoveKind::Home => machine.mark_homed()?,
            }
        }
        Ok(())
    }

    #[test]
    fn test_move_list_end_to_end() {
        let dir = tempdir().unwrap();
        let config = load_config(&write_config(&dir)).unwrap();
        let hardware = HardwareMapping::from_config(&config).unwrap();
        let mut acks = Vec::new();
        {
            let mut machine =
                MachineControl::new(&config, &hardware, RecordingMotorOperations::new())
                    .unwrap()
                    .with_message_sink(&mut acks);
            run_moves(&mut machine, MOVES).unwrap();
            machine.finish().unwrap();

            let segments = machine.motor_ops().segments();
            assert_eq!(segments[0].v0, 0.0);
            assert_eq!(segments[segments.len() - 1].v1, 0.0);
            for pair in segments.windows(2) {
                assert_eq!(pair[0].v1, pair[1].v0);
            }
            // Four square corners plus the diagonal: every leg starts at rest.
            assert_eq!(segments.iter().filter(|s| s.v0 == 0.0).count(), 5);
            let x: i64 = segments.iter().map(|s| s.steps[Axis::X]).sum();
            let y: i64 = segments.iter().map(|s| s.steps[Axis::Y]).sum();
            assert_eq!((x, y), (8000, 8000));
        }
        assert_eq!(String::from_utf8(acks).unwrap(), "ok\n".repeat(5));
    }

    #[test]
    fn test_simulated_machine_reaches_target() {
        let dir = tempdir().unwrap();
        let config = load_config(&write_config(&dir)).unwrap();
        let hardware = HardwareMapping::from_config(&config).unwrap();
        let mut machine =
            MachineControl::new(&config, &hardware, SimulatedMotorOperations::new(&hardware)).unwrap();
        run_moves(&mut machine, MOVES).unwrap();
        machine.motors_enable(false).unwrap();

        let motors = machine.into_motor_ops();
        assert_eq!(motors.pending_segments(), 0);
        assert!(motors.elapsed_seconds() > 0.0);
        // Connector 3 mirrors Y.
        assert_eq!(&motors.motor_positions()[..3], &[8000, 8000, -8000]);
    }

    #[test]
    fn test_out_of_range_line_is_rejected() {
        let dir = tempdir().unwrap();
        let config = load_config(&write_config(&dir)).unwrap();
        let hardware = HardwareMapping::from_config(&config).unwrap();
        let mut machine =
            MachineControl::new(&config, &hardware, RecordingMotorOperations::new()).unwrap();
        let err = run_moves(&mut machine, "X10 F50\nY151\n").unwrap_err();
        assert!(matches!(
            err,
            MachineError::OutOfRange { axis: Axis::Y, range, .. } if range == 150.0
        ));
        assert_eq!(machine.current_position()[Axis::X], 10.0);
    }

    #[test]
    fn test_homing_rebases_position() {
        let dir = tempdir().unwrap();
        let mut config = load_config(&write_config(&dir)).unwrap();
        config.require_homing = true;
        let hardware = HardwareMapping::from_config(&config).unwrap();
        assert_eq!(hardware.home_order(), &[Axis::X, Axis::Y]);

        let mut machine =
            MachineControl::new(&config, &hardware, RecordingMotorOperations::new()).unwrap();
        assert!(matches!(run_moves(&mut machine, "X1 F10"), Err(MachineError::NotHomed)));
        run_moves(&mut machine, "H # switches reached\nX1 F10").unwrap();
        assert!(machine.is_homed());
        // Both homing switches sit on the min side.
        assert_eq!(machine.current_position()[Axis::Y], 0.0);
        assert_eq!(machine.current_position()[Axis::X], 1.0);
    }
}
