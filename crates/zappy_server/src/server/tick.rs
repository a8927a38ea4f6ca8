//! # Tick Scheduler
//!
//! The only place game state changes. Once per period it:
//!
//! 1. Takes the grid gate (held for the whole tick)
//! 2. Snapshots the registered ids, ascending
//! 3. Pops at most one command per entity and hands it to the executor
//! 4. Advances per-entity timers
//! 5. Evicts entities that died this tick and terminates them
//! 6. Publishes the tick number on the world
//!
//! Entities registered after the snapshot wait for the next tick. A late
//! tick is not made up for: missed periods are skipped, not bunched.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::watch;
use tokio::time::{self, MissedTickBehavior};
use tracing::{debug, info, warn};
use zappy_core::{Entity, World};

use crate::rules::{CommandExecutor, EffectReport, Vitality, REPLY_KO};

/// Tick timing statistics.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TickStats {
    /// Shortest tick observed.
    pub min_tick_us: u64,
    /// Longest tick observed.
    pub max_tick_us: u64,
    /// Rolling average tick duration.
    pub avg_tick_us: u64,
    /// Ticks that overran their period.
    pub late_ticks: u64,
    /// Ticks measured.
    pub total_ticks: u64,
}

impl Default for TickStats {
    fn default() -> Self {
        Self {
            min_tick_us: u64::MAX,
            max_tick_us: 0,
            avg_tick_us: 0,
            late_ticks: 0,
            total_ticks: 0,
        }
    }
}

impl TickStats {
    /// Records one tick that took `elapsed` against a `budget`.
    pub fn record(&mut self, elapsed: Duration, budget: Duration) {
        let elapsed_us = u64::try_from(elapsed.as_micros()).unwrap_or(u64::MAX);

        self.min_tick_us = self.min_tick_us.min(elapsed_us);
        self.max_tick_us = self.max_tick_us.max(elapsed_us);
        self.avg_tick_us = if self.total_ticks == 0 {
            elapsed_us
        } else {
            (self.avg_tick_us.saturating_mul(15).saturating_add(elapsed_us)) / 16
        };
        self.total_ticks += 1;

        if elapsed > budget {
            self.late_ticks += 1;
        }
    }

    /// Share of ticks that overran, in percent.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn late_percent(&self) -> f64 {
        self.late_ticks as f64 / self.total_ticks.max(1) as f64 * 100.0
    }
}

/// What one tick did.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TickReport {
    /// Tick number, starting at 1.
    pub tick: u64,
    /// Entities processed.
    pub visited: usize,
    /// Commands handed to the executor.
    pub dispatched: usize,
    /// Of those, commands the executor did not understand.
    pub unknown: usize,
    /// Ids in the snapshot that were gone at lookup.
    pub vanished: usize,
    /// Entities evicted because they died.
    pub condemned: usize,
}

/// Fixed-rate command scheduler.
pub struct TickScheduler<E> {
    world: Arc<World>,
    executor: E,
    period: Duration,
    status_interval: u64,
    tick_count: u64,
    stats: TickStats,
}

impl<E: CommandExecutor> TickScheduler<E> {
    /// Creates a scheduler ticking every `period`.
    #[must_use]
    pub fn new(world: Arc<World>, executor: E, period: Duration) -> Self {
        Self {
            world,
            executor,
            period,
            status_interval: 0,
            tick_count: 0,
            stats: TickStats::default(),
        }
    }

    /// Logs a status line every `ticks` ticks. Zero disables it.
    #[must_use]
    pub const fn with_status_interval(mut self, ticks: u64) -> Self {
        self.status_interval = ticks;
        self
    }

    /// Ticks executed so far.
    #[must_use]
    pub const fn tick_count(&self) -> u64 {
        self.tick_count
    }

    /// Timing statistics so far.
    #[must_use]
    pub const fn stats(&self) -> &TickStats {
        &self.stats
    }

    /// Target tick period.
    #[must_use]
    pub const fn period(&self) -> Duration {
        self.period
    }

    /// Runs exactly one tick, without waiting for the clock.
    pub fn run_tick(&mut self) -> TickReport {
        self.tick_count += 1;
        let mut report = TickReport {
            tick: self.tick_count,
            ..TickReport::default()
        };

        let mut grid = self.world.lock_grid();
        let registry = self.world.registry();
        let mut dead: Vec<Arc<Entity>> = Vec::new();

        for id in registry.snapshot_ids() {
            let Some(entity) = registry.lookup(id) else {
                report.vanished += 1;
                continue;
            };
            report.visited += 1;

            let mut state = entity.state();
            if let Some(command) = entity.intake().try_pop() {
                report.dispatched += 1;
                let reply = match self.executor.execute(&entity, &mut state, &mut grid, &command) {
                    EffectReport::Reply(line) => line,
                    EffectReport::Unknown => {
                        report.unknown += 1;
                        warn!(entity = id.0, command = %command, "unknown command");
                        REPLY_KO.to_owned()
                    }
                };
                if !entity.notify(reply) {
                    debug!(entity = id.0, "reply dropped, outbox full or closed");
                }
            }

            if self.executor.advance_timers(&entity, &mut state) == Vitality::Dead {
                dead.push(Arc::clone(&entity));
            }
        }

        for entity in dead {
            if self.world.despawn_locked(&mut grid, entity.id()) {
                report.condemned += 1;
                info!(entity = entity.id().0, team = entity.team(), "entity died");
            }
            // The handler writes the death notice once it sees this.
            entity.terminate();
        }
        drop(grid);

        self.world.set_tick(self.tick_count);
        report
    }

    /// Ticks until `shutdown` flips or its sender is dropped.
    ///
    /// Returns the final timing statistics.
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) -> TickStats {
        let mut interval = time::interval(self.period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

        info!(
            period_us = u64::try_from(self.period.as_micros()).unwrap_or(u64::MAX),
            "tick scheduler started"
        );

        loop {
            tokio::select! {
                _ = interval.tick() => {}
                _ = shutdown.changed() => break,
            }

            let start = Instant::now();
            let report = self.run_tick();
            self.stats.record(start.elapsed(), self.period);

            if report.unknown > 0 || report.condemned > 0 {
                debug!(?report, "tick");
            }
            if self.status_interval > 0 && report.tick % self.status_interval == 0 {
                self.log_status();
            }
        }

        info!(ticks = self.tick_count, "tick scheduler stopped");
        self.stats
    }

    fn log_status(&self) {
        let status = self.world.status();
        info!(
            tick = self.tick_count,
            entities = status.entities,
            teams = status.teams,
            avg_tick_us = self.stats.avg_tick_us,
            max_tick_us = self.stats.max_tick_us,
            late_ticks = self.stats.late_ticks,
            late_pct = self.stats.late_percent(),
            "server status"
        );
    }
}
