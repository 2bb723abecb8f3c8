use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, ValueEnum};
use inkflow_sim::{RenderMode, SimConfig};

mod run;

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Mode {
    Fluid,
    Pressure,
    Velocity,
}

impl From<Mode> for RenderMode {
    fn from(mode: Mode) -> Self {
        match mode {
            Mode::Fluid => RenderMode::Fluid,
            Mode::Pressure => RenderMode::Pressure,
            Mode::Velocity => RenderMode::Velocity,
        }
    }
}

/// Headless driver for the inkflow simulation: stirs the fluid with a
/// scripted pointer path and writes snapshot frames as PNG.
#[derive(Parser, Debug)]
#[command(name = "inkflow")]
struct Args {
    /// Domain width, in pixels.
    #[arg(long, default_value_t = 640)]
    width: u32,

    /// Domain height, in pixels.
    #[arg(long, default_value_t = 480)]
    height: u32,

    /// Number of frames to simulate.
    #[arg(long, default_value_t = 600)]
    frames: u32,

    /// Trail fade length, in frames (clamped to [1, 100]).
    #[arg(long, default_value_t = 15)]
    trail_length: u32,

    /// Buffer to visualize.
    #[arg(long, value_enum, default_value_t = Mode::Fluid)]
    mode: Mode,

    /// Particle reseeding RNG seed.
    #[arg(long, default_value_t = 0)]
    seed: u64,

    /// Directory snapshots are written into.
    #[arg(long, default_value = "output")]
    out_dir: PathBuf,

    /// Request a snapshot every N frames; 0 captures only the final frame.
    #[arg(long, default_value_t = 60)]
    snapshot_every: u32,
}

fn main() -> ExitCode {
    env_logger::init();
    let args = Args::parse();

    let config = SimConfig {
        trail_length: args.trail_length,
        seed: args.seed,
        ..SimConfig::default()
    };

    match run::run(
        config,
        args.width,
        args.height,
        args.frames,
        args.mode.into(),
        &args.out_dir,
        args.snapshot_every,
    ) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("inkflow: {err}");
            ExitCode::FAILURE
        }
    }
}
