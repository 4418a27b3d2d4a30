// src/main.rs - Command line driver: plan a move list and print the step segments
use std::path::PathBuf;

use clap::Parser;
use stride_rs::{
    load_config, parse_move_list, HardwareMapping, LinearSegmentSteps, LoggingMotorOperations,
    MachineControl, MachineControlConfig, MotorOperations, MoveKind, MoveRequest,
    RecordingMotorOperations, SimulatedMotorOperations,
};

type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

#[derive(Parser, Debug)]
#[command(name = "stride", about = "Plans a list of straight moves into motor step segments.")]
struct Args {
    /// Path to the machine TOML config
    #[arg(short, long, default_value = "machine.toml")]
    config: PathBuf,

    /// Move list to plan; read from stdin when omitted
    #[arg(short, long)]
    moves: Option<PathBuf>,

    /// Print one JSON object per segment
    #[arg(long)]
    json: bool,

    /// Also run the segments through the simulated machine and report motor positions
    #[arg(long)]
    simulate: bool,
}

fn main() -> Result<(), BoxError> {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    let config_path = args.config.to_string_lossy();
    tracing::info!("Loading configuration from: {}", config_path);
    let config = load_config(&config_path).map_err(|e| {
        tracing::error!("Failed to load config from '{}': {}", config_path, e);
        Box::new(e) as BoxError
    })?;
    let hardware = HardwareMapping::from_config(&config).map_err(|e| {
        tracing::error!("Invalid hardware mapping: {}", e);
        Box::new(e) as BoxError
    })?;

    let input = match &args.moves {
        Some(path) => std::fs::read_to_string(path)?,
        None => std::io::read_to_string(std::io::stdin())?,
    };
    let moves = parse_move_list(&input)?;
    tracing::info!("Planning {} move(s)", moves.len());

    if config.require_homing && !moves.iter().any(|m| m.kind == MoveKind::Home) {
        tracing::error!("require_homing is set but the move list never reports homing with 'H'");
    }

    let mut recorder = RecordingMotorOperations::new();
    let backend: Box<dyn MotorOperations + '_> = if config.debug_print {
        Box::new(LoggingMotorOperations::new(&mut recorder))
    } else {
        Box::new(&mut recorder)
    };
    drive(&config, &hardware, &moves, backend)?;

    let segments = recorder.segments();
    if args.json {
        for segment in segments {
            println!("{}", serde_json::to_string(segment)?);
        }
    } else {
        print_summary(segments);
    }

    if args.simulate {
        simulate(&hardware, segments)?;
    }
    Ok(())
}

fn drive<M: MotorOperations>(
    config: &MachineControlConfig,
    hardware: &HardwareMapping,
    moves: &[MoveRequest],
    motor_ops: M,
) -> Result<(), BoxError> {
    let mut machine = MachineControl::new(config, hardware, motor_ops)?.with_message_sink(std::io::stderr());
    for request in moves {
        let mut target = *machine.current_position();
        for &(axis, value) in &request.axes {
            target[axis] = value;
        }
        let result = match request.kind {
            MoveKind::Coordinated => machine.coordinated_move(request.feedrate, &target),
            MoveKind::Rapid => machine.rapid_move(&target),
            MoveKind::Home => machine.mark_homed(),
        };
        result.map_err(|e| {
            tracing::error!("Line {}: {}", request.line, e);
            Box::new(e) as BoxError
        })?;
    }
    machine.motors_enable(false)?;
    Ok(())
}

fn print_summary(segments: &[LinearSegmentSteps]) {
    for (index, segment) in segments.iter().enumerate() {
        let moving: Vec<String> = segment
            .steps
            .iter()
            .filter(|(_, steps)| *steps != 0)
            .map(|(axis, steps)| format!("{}{:+}", axis, steps))
            .collect();
        println!(
            "{:>5}  {:<40} {:>10.1} -> {:>10.1} steps/s",
            index,
            moving.join(" "),
            segment.v0,
            segment.v1
        );
    }
    let total: f64 = segments.iter().map(LinearSegmentSteps::duration).sum();
    println!("{} segment(s), {:.3} s", segments.len(), total);
}

fn simulate(hardware: &HardwareMapping, segments: &[LinearSegmentSteps]) -> Result<(), BoxError> {
    let mut machine = SimulatedMotorOperations::new(hardware);
    machine.motor_enable(true);
    for segment in segments {
        machine.enqueue(segment)?;
    }
    machine.wait_queue_empty()?;
    machine.motor_enable(false);
    for (index, position) in machine.motor_positions().iter().enumerate() {
        if let Some(axis) = hardware.axis_for_connector(index + 1) {
            println!("motor {} ({}): {} steps", index + 1, axis, position);
        }
    }
    println!(
        "simulated {} segment(s) in {:.3} s",
        machine.executed_segments(),
        machine.elapsed_seconds()
    );
    Ok(())
}
