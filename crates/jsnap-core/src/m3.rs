//! Continuous-monitoring mode (M3).
//!
//! Repeats the cheap capture set on a fixed interval against the same
//! [`RunContext`], so the shared log followers carry their read
//! positions from tick to tick and each tick uploads only what changed.

use crate::proc;
use crate::run::{self, RunContext, RunKind, RunReport};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{info, warn};

pub struct M3Loop {
    ctx: RunContext,
    interval: Duration,
    stop: Arc<AtomicBool>,
}

impl M3Loop {
    pub fn new(ctx: RunContext) -> Self {
        let interval = Duration::from_secs(ctx.config.m3_interval_secs);
        Self {
            ctx,
            interval,
            stop: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Handle for requesting a graceful stop from another thread.
    pub fn stop_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.stop)
    }

    /// One monitoring tick.
    pub fn tick(&self) -> jsnap_common::Result<RunReport> {
        run::execute_run(&self.ctx, RunKind::Monitor)
    }

    /// Run ticks until stopped or the target process exits.
    ///
    /// A failed tick is logged and does not end the loop; only setup
    /// problems would make the next tick fail the same way, and those
    /// surface on every tick's report anyway.
    pub fn run(&self) {
        info!(interval_secs = self.interval.as_secs(), "continuous monitoring started");
        loop {
            if let Some(pid) = self.ctx.pid {
                if !proc::is_alive(pid) {
                    info!(pid, "target process exited, monitoring stopped");
                    return;
                }
            }

            let started = Instant::now();
            match self.tick() {
                Ok(report) => {
                    info!(run_id = report.run_id, any_ok = report.any_ok(), "tick finished")
                }
                Err(e) => warn!(error = %e, "tick failed"),
            }

            let elapsed = started.elapsed();
            let pause = self.interval.saturating_sub(elapsed);
            // Sleep in short slices so a stop request is honored promptly.
            let deadline = Instant::now() + pause;
            while Instant::now() < deadline {
                if self.stop.load(Ordering::Relaxed) {
                    info!("stop requested, monitoring stopped");
                    return;
                }
                std::thread::sleep(Duration::from_millis(250).min(self.interval));
            }
            if self.stop.load(Ordering::Relaxed) {
                info!("stop requested, monitoring stopped");
                return;
            }
        }
    }
}
