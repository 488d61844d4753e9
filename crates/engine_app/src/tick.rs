//! Fixed-timestep tick loop.
//!
//! Each tick hands the configured timestep to [`EntityManager::update`], which
//! applies queued commands, recomputes the schedule if the System set changed,
//! and runs every System once. The loop then sleeps for the rest of the tick
//! budget.

use std::time::{Duration, Instant};

use engine_system::{ConfigError, EntityManager, TickReport, WorldConfig};
use tracing::{debug, info, warn};

/// Aggregate outcome of a [`TickLoop::run`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunSummary {
    /// Ticks executed.
    pub ticks: u64,
    /// Ticks in which at least one System failed.
    pub failed_ticks: u64,
    /// Ticks that overran their time budget.
    pub overruns: u64,
}

/// Drives an [`EntityManager`] at a fixed rate.
#[derive(Debug)]
pub struct TickLoop {
    config: WorldConfig,
    tick_duration: Duration,
    world: EntityManager,
}

impl TickLoop {
    /// Create a loop over `world` using the rate and limits in `config`.
    ///
    /// # Errors
    ///
    /// [`ConfigError::Invalid`] if `config` fails validation.
    pub fn new(config: WorldConfig, world: EntityManager) -> Result<Self, ConfigError> {
        config.validate()?;
        let tick_duration = config.tick_period()?;
        Ok(Self {
            config,
            tick_duration,
            world,
        })
    }

    /// Returns the id of the last completed tick.
    #[must_use]
    pub fn tick_id(&self) -> u64 {
        self.world.tick_id()
    }

    /// Consume the loop and hand back the world.
    #[must_use]
    pub fn into_world(self) -> EntityManager {
        self.world
    }

    /// Run one tick with the configured timestep.
    pub fn tick(&mut self) -> TickReport {
        let report = self.world.update(self.config.delta());
        debug!(
            tick_id = report.tick_id,
            executed = report.executed,
            failures = report.failures.len(),
            commands_applied = report.commands.applied,
            "tick complete"
        );
        report
    }

    /// Run the tick loop for the configured number of ticks, or indefinitely.
    ///
    /// Failing Systems do not stop the loop; they are counted in the summary.
    pub fn run(&mut self) -> RunSummary {
        let tick_duration = self.tick_duration;
        let mut summary = RunSummary::default();

        info!(
            tick_rate = self.config.tick_rate,
            max_ticks = self.config.max_ticks,
            execution = ?self.config.execution,
            "starting tick loop"
        );

        loop {
            let start = Instant::now();

            let report = self.tick();
            summary.ticks += 1;
            if !report.is_clean() {
                summary.failed_ticks += 1;
            }

            if self.config.max_ticks > 0 && summary.ticks >= self.config.max_ticks {
                info!(
                    ticks = summary.ticks,
                    failed_ticks = summary.failed_ticks,
                    "tick loop complete"
                );
                break;
            }

            let elapsed = start.elapsed();
            if elapsed < tick_duration {
                std::thread::sleep(tick_duration - elapsed);
            } else {
                summary.overruns += 1;
                warn!(
                    tick_id = report.tick_id,
                    elapsed_ms = elapsed.as_millis() as u64,
                    budget_ms = tick_duration.as_millis() as u64,
                    "tick exceeded time budget"
                );
            }
        }
        summary
    }
}
