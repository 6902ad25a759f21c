//! Periodic drain scheduler.
//!
//! Wraps a `tokio::time::Interval` with an explicit armed/paused/destroyed
//! state. A drain pass runs through [`DrainScheduler::run_pass`], which pauses
//! the scheduler for the duration of the pass and re-arms it afterwards, so two
//! passes never overlap even if ticks were missed while the pass ran.

use std::time::Duration;

use tokio::time::{Instant, Interval, MissedTickBehavior, interval_at};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerState {
  /// Timer running, the next tick will fire
  Armed,
  /// Timer stopped, no pending tick
  Paused,
  /// Terminal, no tick will ever fire again
  Destroyed,
}

#[derive(Debug)]
pub struct DrainScheduler {
  interval: Interval,
  state: SchedulerState,
}

impl DrainScheduler {
  /// Create an armed scheduler whose first tick fires one `period` from now.
  ///
  /// `period` must be non-zero.
  pub fn new(period: Duration) -> Self {
    let mut interval = interval_at(Instant::now() + period, period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    Self {
      interval,
      state: SchedulerState::Armed,
    }
  }

  pub fn period(&self) -> Duration {
    self.interval.period()
  }

  pub fn state(&self) -> SchedulerState {
    self.state
  }

  pub fn is_destroyed(&self) -> bool {
    self.state == SchedulerState::Destroyed
  }

  /// Wait for the next tick.
  ///
  /// Never resolves while paused or destroyed. Cancel safe, so it can sit in a
  /// `select!` next to other events.
  pub async fn tick(&mut self) {
    if self.state != SchedulerState::Armed {
      std::future::pending::<()>().await;
    }
    self.interval.tick().await;
  }

  pub fn pause(&mut self) {
    if self.state == SchedulerState::Armed {
      self.state = SchedulerState::Paused;
    }
  }

  /// Re-arm a paused scheduler; the next tick fires one full period from now.
  /// No-op once destroyed.
  pub fn resume(&mut self) {
    if self.state == SchedulerState::Paused {
      self.state = SchedulerState::Armed;
      self.interval.reset();
    }
  }

  /// Stop for good. Returns false if already destroyed.
  pub fn destroy(&mut self) -> bool {
    let was_alive = self.state != SchedulerState::Destroyed;
    self.state = SchedulerState::Destroyed;
    was_alive
  }

  /// Run one pass with the scheduler paused.
  ///
  /// The pass may destroy the scheduler through the reference it receives, in
  /// which case it stays off afterwards.
  pub fn run_pass<R>(&mut self, pass: impl FnOnce(&mut Self) -> R) -> R {
    self.pause();
    let output = pass(self);
    self.resume();
    output
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use tokio::time::timeout;

  #[tokio::test]
  async fn test_armed_scheduler_ticks() {
    let mut scheduler = DrainScheduler::new(Duration::from_millis(5));
    assert_eq!(scheduler.state(), SchedulerState::Armed);

    for _ in 0..3 {
      timeout(Duration::from_secs(1), scheduler.tick())
        .await
        .expect("armed scheduler should tick");
    }
  }

  #[tokio::test]
  async fn test_paused_scheduler_does_not_tick() {
    let mut scheduler = DrainScheduler::new(Duration::from_millis(5));
    scheduler.pause();

    assert!(timeout(Duration::from_millis(50), scheduler.tick()).await.is_err());

    scheduler.resume();
    assert_eq!(scheduler.state(), SchedulerState::Armed);
    timeout(Duration::from_secs(1), scheduler.tick())
      .await
      .expect("resumed scheduler should tick");
  }

  #[tokio::test]
  async fn test_destroy_is_terminal_and_idempotent() {
    let mut scheduler = DrainScheduler::new(Duration::from_millis(5));
    assert!(scheduler.destroy());
    assert!(!scheduler.destroy());

    scheduler.resume();
    assert!(scheduler.is_destroyed());
    assert!(timeout(Duration::from_millis(50), scheduler.tick()).await.is_err());
  }

  #[tokio::test]
  async fn test_run_pass_pauses_and_rearms() {
    let mut scheduler = DrainScheduler::new(Duration::from_millis(5));

    let seen = scheduler.run_pass(|s| s.state());
    assert_eq!(seen, SchedulerState::Paused);
    assert_eq!(scheduler.state(), SchedulerState::Armed);
  }

  #[tokio::test]
  async fn test_destroy_during_pass_stays_destroyed() {
    let mut scheduler = DrainScheduler::new(Duration::from_millis(5));

    scheduler.run_pass(|s| {
      s.destroy();
    });
    assert!(scheduler.is_destroyed());
    assert!(timeout(Duration::from_millis(50), scheduler.tick()).await.is_err());
  }
}
