use std::time::Duration;

use serde::Serialize;
use tokio::time::{self, Instant};
use tracing::{debug, info, instrument, warn};

use crate::{
    config::DEFAULT_POLLING_FREQUENCY_HZ, Broadcaster, Result, SchedulerConfig, VoxelEngine,
};

/// Outcome of [`Scheduler::run`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    /// Frames handed to the broadcaster.
    pub frames: u64,
    /// Ticks that took longer than the frame budget.
    pub overruns: u64,
}

/// Fixed-rate frame loop. Only one tick is ever in flight: the next one
/// starts after the previous frame has been published.
#[derive(Debug, Clone)]
pub struct Scheduler {
    target_interval: Duration,
}

impl Scheduler {
    pub fn new(target_interval: Duration) -> Self {
        Self { target_interval }
    }

    pub fn from_config(config: &SchedulerConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self::new(config.target_interval()?))
    }

    pub fn target_interval(&self) -> Duration {
        self.target_interval
    }

    /// Time left to wait after a tick that took `elapsed`, or `None` when the
    /// next tick should start straight away.
    pub fn next_delay(&self, elapsed: Duration) -> Option<Duration> {
        self.target_interval
            .checked_sub(elapsed)
            .filter(|delay| !delay.is_zero())
    }

    /// Renders one frame worth `dt` seconds and publishes it. Returns the
    /// index of the published frame.
    pub async fn tick(
        &self,
        engine: &mut VoxelEngine,
        broadcaster: &mut dyn Broadcaster,
        dt: f32,
    ) -> Result<u64> {
        engine.render_frame(dt).await?;
        let snapshot = engine.output_snapshot()?;
        broadcaster.publish(&snapshot, engine.brightness(), engine.frame_counter())?;
        Ok(engine.finish_frame())
    }

    /// Ticks until `max_frames` ticks have run, or forever when unset.
    /// Failed ticks are logged and the loop carries on.
    #[instrument(skip_all, fields(interval = ?self.target_interval))]
    pub async fn run(
        &self,
        engine: &mut VoxelEngine,
        broadcaster: &mut dyn Broadcaster,
        max_frames: Option<u64>,
    ) -> RunSummary {
        info!("scheduler started");
        let mut summary = RunSummary::default();
        let mut ticks = 0_u64;
        let mut last_frame = Instant::now();
        time::sleep(self.target_interval).await;

        while max_frames.map_or(true, |max| ticks < max) {
            let started = Instant::now();
            let dt = started.duration_since(last_frame).as_secs_f32();
            last_frame = started;

            match self.tick(engine, broadcaster, dt).await {
                Ok(_) => summary.frames += 1,
                Err(err) => warn!(frame = engine.frame_counter(), %err, "frame dropped"),
            }
            ticks += 1;
            if max_frames.is_some_and(|max| ticks >= max) {
                break;
            }

            let elapsed = started.elapsed();
            match self.next_delay(elapsed) {
                Some(delay) => time::sleep(delay).await,
                None => {
                    summary.overruns += 1;
                    debug!(
                        frame = engine.frame_counter(),
                        elapsed_ms = elapsed.as_secs_f64() * 1000.0,
                        "frame overran its budget"
                    );
                    tokio::task::yield_now().await;
                }
            }
        }

        info!(frames = summary.frames, overruns = summary.overruns, "scheduler stopped");
        summary
    }
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new(Duration::from_secs_f64(1.0 / DEFAULT_POLLING_FREQUENCY_HZ))
    }
}
