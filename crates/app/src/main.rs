use std::{
    fs::File,
    io::{self, BufWriter, Write},
    path::{Path, PathBuf},
    time::{Duration, Instant},
};

use clap::{Args, Parser, Subcommand};
use tracing_subscriber::EnvFilter;
use voxel_display_core::{
    AnimatorRegistry, AppConfig, Broadcaster, JsonFrameWriter, Result, Scheduler, VoxelEngine,
    VoxelSnapshot,
};

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();

    let cli = Cli::parse();

    match cli.command {
        Commands::Run {
            display,
            frames,
            dump,
        } => run_live(&display, frames, dump.as_deref()).await,
        Commands::Render {
            display,
            frames,
            output,
        } => run_offline(&display, frames, &output).await,
        Commands::Animators => {
            for tag in AnimatorRegistry::with_builtins().tags() {
                println!("{tag}");
            }
            Ok(())
        }
    }
}

async fn run_live(opts: &DisplayArgs, frames: Option<u64>, dump: Option<&Path>) -> Result<()> {
    let config = opts.load()?;
    tracing::info!(
        grid_size = config.display.grid_size,
        fps = config.scheduler.target_fps,
        animator = %config.display.initial_animator,
        "starting voxel display"
    );

    let mut engine = VoxelEngine::from_config(&config.display)?;
    let scheduler = Scheduler::from_config(&config.scheduler)?;
    let mut broadcaster = LogBroadcaster::new(match dump {
        Some(path) => Some(JsonFrameWriter::new(BufWriter::new(File::create(path)?))),
        None => None,
    });

    tokio::select! {
        summary = scheduler.run(&mut engine, &mut broadcaster, frames) => {
            tracing::info!(frames = summary.frames, overruns = summary.overruns, "run finished");
        }
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("interrupted");
        }
    }

    broadcaster.flush()
}

async fn run_offline(opts: &DisplayArgs, frames: u64, output: &Path) -> Result<()> {
    let config = opts.load()?;
    let dt = config.scheduler.target_interval()?.as_secs_f32();
    tracing::info!(frames, dt, ?output, "rendering offline");

    let mut engine = VoxelEngine::from_config(&config.display)?;
    for _ in 0..frames {
        engine.render_frame(dt).await?;
    }

    let snapshot = engine.output_snapshot()?;
    let mut out = BufWriter::new(File::create(output)?);
    serde_json::to_writer(&mut out, &snapshot)?;
    out.flush()?;
    Ok(())
}

/// Logs publish statistics once per second, optionally dumping every frame.
struct LogBroadcaster {
    dump: Option<JsonFrameWriter<BufWriter<File>>>,
    window_start: Instant,
    window_frames: u32,
}

impl LogBroadcaster {
    fn new(dump: Option<JsonFrameWriter<BufWriter<File>>>) -> Self {
        Self {
            dump,
            window_start: Instant::now(),
            window_frames: 0,
        }
    }

    fn flush(self) -> Result<()> {
        if let Some(dump) = self.dump {
            dump.into_inner().flush()?;
        }
        Ok(())
    }
}

impl Broadcaster for LogBroadcaster {
    fn publish(&mut self, frame: &VoxelSnapshot, brightness: f32, frame_index: u64) -> Result<()> {
        if let Some(dump) = self.dump.as_mut() {
            dump.publish(frame, brightness, frame_index)?;
        }

        self.window_frames += 1;
        let window = self.window_start.elapsed();
        if window >= Duration::from_secs(1) {
            let lit = frame.voxels.iter().filter(|c| c.r + c.g + c.b > 0.0).count();
            tracing::info!(
                frame = frame_index,
                fps = f64::from(self.window_frames) / window.as_secs_f64(),
                lit,
                brightness,
                "publishing"
            );
            self.window_start = Instant::now();
            self.window_frames = 0;
        }
        Ok(())
    }
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(io::stderr)
        .try_init();
}

#[derive(Parser, Debug)]
#[command(author, version, about = "Voxel LED display engine", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Drive the display in real time until interrupted.
    Run {
        #[command(flatten)]
        display: DisplayArgs,
        /// Stop after this many frames.
        #[arg(long)]
        frames: Option<u64>,
        /// Write every published frame as a JSON line to this file.
        #[arg(long)]
        dump: Option<PathBuf>,
    },
    /// Render frames at a fixed time step without waiting and save the last one.
    Render {
        #[command(flatten)]
        display: DisplayArgs,
        #[arg(long, default_value_t = 60)]
        frames: u64,
        /// Output path for the final frame snapshot.
        #[arg(short, long)]
        output: PathBuf,
    },
    /// List the available animators.
    Animators,
}

#[derive(Args, Debug)]
struct DisplayArgs {
    /// JSON config file to start from.
    #[arg(short, long)]
    config: Option<PathBuf>,
    /// Voxels along each edge of the cube.
    #[arg(long)]
    grid_size: Option<usize>,
    #[arg(long)]
    fps: Option<f64>,
    /// Animator shown at start-up.
    #[arg(short, long)]
    animator: Option<String>,
    #[arg(long)]
    brightness: Option<f32>,
    #[arg(long)]
    crossfade: Option<f32>,
}

impl DisplayArgs {
    /// Config file contents with command line overrides applied.
    fn load(&self) -> Result<AppConfig> {
        let mut config = match &self.config {
            Some(path) => AppConfig::from_json_file(path)?,
            None => AppConfig::default(),
        };
        if let Some(size) = self.grid_size {
            config.display.grid_size = size;
        }
        if let Some(fps) = self.fps {
            config.scheduler.target_fps = fps;
        }
        if let Some(animator) = &self.animator {
            config.display.initial_animator = animator.clone();
        }
        if let Some(brightness) = self.brightness {
            config.display.brightness = brightness;
        }
        if let Some(secs) = self.crossfade {
            config.display.crossfade_secs = secs;
        }
        config.validate()?;
        Ok(config)
    }
}
