// Copyright (C) 2025  Tom Waddington
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published
// by the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program.  If not, see <https://www.gnu.org/licenses/>.

//! Cycle scheduler
//!
//! A single repeating timer drives the automation: each tick sends the
//! current sequence once, counts completed cycles, and stops itself when
//! a counted target is reached or the run is cancelled. Ticks are
//! serialized by the one awaited loop; a tick cannot begin before the
//! previous one returns.

use std::sync::{
    Arc, RwLock,
    atomic::{AtomicBool, Ordering},
};
use std::time::Duration;
use thiserror::Error;
use tokio::time::{self, Instant, MissedTickBehavior};
use tracing::{info, warn};

use crate::injector::{Injector, send_sequence};
use crate::types::{CycleConfig, RunMode};

const COUNTDOWN_TICKS: u64 = 3;

#[derive(Debug, Error)]
pub enum StartError {
    #[error("key combination is empty; nothing to automate")]
    EmptySequence,
}

/// Live-editable configuration handle. The scheduler takes a snapshot at
/// every tick, so edits land on the next cycle without restarting the run.
#[derive(Clone)]
pub struct SharedConfig {
    inner: Arc<RwLock<CycleConfig>>,
}

impl SharedConfig {
    pub fn new(config: CycleConfig) -> Self {
        Self {
            inner: Arc::new(RwLock::new(config)),
        }
    }

    pub fn snapshot(&self) -> CycleConfig {
        match self.inner.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub fn replace(&self, config: CycleConfig) {
        match self.inner.write() {
            Ok(mut guard) => *guard = config,
            Err(poisoned) => *poisoned.into_inner() = config,
        }
    }
}

/// Cancels a run from outside the scheduler loop. Idempotent; safe to
/// fire at any point, including mid-countdown.
#[derive(Clone)]
pub struct StopHandle(Arc<AtomicBool>);

impl StopHandle {
    pub fn stop(&self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    Completed,
    StoppedEarly,
    Continuous,
}

#[derive(Debug)]
pub struct RunReport {
    pub outcome: RunOutcome,
    pub presses: u64,
    pub elapsed: Duration,
}

impl RunReport {
    pub fn summary(&self, mode: RunMode) -> String {
        let secs = self.elapsed.as_secs_f64();
        match self.outcome {
            RunOutcome::Completed => {
                format!("completed: {} repeats in {secs:.1}s", self.presses)
            }
            RunOutcome::StoppedEarly => match mode {
                RunMode::Counted(target) => {
                    format!("stopped: {}/{target} repeats in {secs:.1}s", self.presses)
                }
                RunMode::Continuous => {
                    format!("stopped: {} total presses in {secs:.1}s", self.presses)
                }
            },
            RunOutcome::Continuous => {
                format!("stopped: {} total presses in {secs:.1}s", self.presses)
            }
        }
    }
}

pub struct Scheduler<I> {
    injector: I,
    config: SharedConfig,
    running: Arc<AtomicBool>,
    jitter: f64,
}

impl<I: Injector> Scheduler<I> {
    pub fn new(injector: I, config: SharedConfig) -> Self {
        Self {
            injector,
            config,
            running: Arc::new(AtomicBool::new(true)),
            jitter: 0.0,
        }
    }

    pub fn with_jitter(mut self, jitter: f64) -> Self {
        self.jitter = jitter;
        self
    }

    pub fn stop_handle(&self) -> StopHandle {
        StopHandle(self.running.clone())
    }

    fn should_continue(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    async fn countdown(&self) {
        for remaining in (1..=COUNTDOWN_TICKS).rev() {
            if !self.should_continue() {
                return;
            }
            info!("starting in {remaining}...");
            time::sleep(Duration::from_secs(1)).await;
        }
    }

    /// Run until the counted target is reached or the run is cancelled.
    /// The tick period is the sum of the interval table at start time;
    /// the sequence and delays themselves are re-read on every tick.
    pub async fn run(&mut self, mode: RunMode, countdown: bool) -> Result<RunReport, StartError> {
        let initial = self.config.snapshot();
        if initial.keys.is_empty() {
            return Err(StartError::EmptySequence);
        }

        if countdown {
            self.countdown().await;
        }

        let cycle_ms = initial.cycle_interval_ms();
        let started = Instant::now();
        let mut presses: u64 = 0;

        let mut ticker = time::interval(Duration::from_millis(cycle_ms));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let outcome = loop {
            ticker.tick().await;

            if !self.should_continue() {
                break match mode {
                    RunMode::Continuous => RunOutcome::Continuous,
                    RunMode::Counted(_) => RunOutcome::StoppedEarly,
                };
            }

            if let RunMode::Counted(target) = mode {
                if presses >= u64::from(target) {
                    break RunOutcome::Completed;
                }
            }

            let current = self.config.snapshot();
            if current.keys.is_empty() {
                warn!("key combination is empty; skipping this cycle");
                continue;
            }

            // The final table entry is covered by the tick period, so the
            // sender skips it.
            let sent = send_sequence(
                &mut self.injector,
                &current.keys,
                &current.delays_ms,
                false,
                self.jitter,
            )
            .await;
            if !sent {
                // Failed tick: no count, no retry, on to the next cycle.
                continue;
            }

            presses += 1;
            self.report_progress(mode, presses, started.elapsed(), &current);
        };

        let report = RunReport {
            outcome,
            presses,
            elapsed: started.elapsed(),
        };
        info!("{}", report.summary(mode));
        Ok(report)
    }

    fn report_progress(&self, mode: RunMode, presses: u64, elapsed: Duration, current: &CycleConfig) {
        match mode {
            RunMode::Counted(target) => {
                let target = u64::from(target);
                let remaining = target.saturating_sub(presses);
                if remaining > 0 {
                    let cycle_secs = current.cycle_interval_ms() as f64 / 1000.0;
                    let estimate = format_remaining(remaining as f64 * cycle_secs);
                    info!("running: {presses}/{target} done, {remaining} remaining ({estimate})");
                } else {
                    info!("running: {presses}/{target} done, finishing");
                }
            }
            RunMode::Continuous => {
                info!(
                    "running: {presses} presses, {:.1}s elapsed",
                    elapsed.as_secs_f64()
                );
            }
        }
    }
}

/// Plain seconds below a minute, `m:ss` beyond.
pub fn format_remaining(seconds: f64) -> String {
    if seconds < 60.0 {
        format!("{seconds:.0}s")
    } else {
        let minutes = (seconds / 60.0) as u64;
        let secs = (seconds % 60.0) as u64;
        format!("{minutes}:{secs:02}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::KeyToken;
    use anyhow::anyhow;

    #[derive(Default)]
    struct CountingInjector {
        pairs: usize,
        fail_first: bool,
    }

    impl Injector for CountingInjector {
        fn press(&mut self, _token: &KeyToken) -> anyhow::Result<()> {
            if self.fail_first && self.pairs == 0 {
                self.fail_first = false;
                return Err(anyhow!("transient injection failure"));
            }
            Ok(())
        }

        fn release(&mut self, _token: &KeyToken) -> anyhow::Result<()> {
            self.pairs += 1;
            Ok(())
        }
    }

    fn single_key_config() -> SharedConfig {
        SharedConfig::new(CycleConfig {
            keys: vec![KeyToken::Char('a')],
            delays_ms: vec![100],
        })
    }

    #[tokio::test(start_paused = true)]
    async fn counted_mode_stops_at_target() {
        let config = single_key_config();
        let mut scheduler = Scheduler::new(CountingInjector::default(), config);
        let report = scheduler.run(RunMode::Counted(5), false).await.unwrap();
        assert_eq!(report.outcome, RunOutcome::Completed);
        assert_eq!(report.presses, 5);
    }

    #[tokio::test(start_paused = true)]
    async fn counted_mode_single_repeat() {
        let config = single_key_config();
        let mut scheduler = Scheduler::new(CountingInjector::default(), config);
        let report = scheduler.run(RunMode::Counted(1), false).await.unwrap();
        assert_eq!(report.outcome, RunOutcome::Completed);
        assert_eq!(report.presses, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn continuous_mode_stops_on_cancel() {
        let config = single_key_config();
        let mut scheduler = Scheduler::new(CountingInjector::default(), config);
        let stop = scheduler.stop_handle();

        let run = tokio::spawn(async move { scheduler.run(RunMode::Continuous, false).await });
        // Ticks land at 0, 100, 200 and 300 ms; cancel before the fifth.
        time::sleep(Duration::from_millis(350)).await;
        stop.stop();

        let report = run.await.unwrap().unwrap();
        assert_eq!(report.outcome, RunOutcome::Continuous);
        assert_eq!(report.presses, 4);
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_during_countdown_sends_nothing() {
        let config = single_key_config();
        let mut scheduler = Scheduler::new(CountingInjector::default(), config);
        let stop = scheduler.stop_handle();
        stop.stop();

        let report = scheduler.run(RunMode::Counted(5), true).await.unwrap();
        assert_eq!(report.outcome, RunOutcome::StoppedEarly);
        assert_eq!(report.presses, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn stop_is_idempotent() {
        let config = single_key_config();
        let scheduler = Scheduler::new(CountingInjector::default(), config);
        let stop = scheduler.stop_handle();
        stop.stop();
        stop.stop();
    }

    #[tokio::test(start_paused = true)]
    async fn empty_sequence_is_rejected() {
        let config = SharedConfig::new(CycleConfig {
            keys: vec![],
            delays_ms: vec![],
        });
        let mut scheduler = Scheduler::new(CountingInjector::default(), config);
        let result = scheduler.run(RunMode::Counted(5), false).await;
        assert!(matches!(result, Err(StartError::EmptySequence)));
    }

    #[tokio::test(start_paused = true)]
    async fn failed_tick_does_not_count() {
        let config = single_key_config();
        let injector = CountingInjector {
            fail_first: true,
            ..CountingInjector::default()
        };
        let mut scheduler = Scheduler::new(injector, config);
        let report = scheduler.run(RunMode::Counted(2), false).await.unwrap();
        // The failed first tick is skipped; two successful ticks follow.
        assert_eq!(report.outcome, RunOutcome::Completed);
        assert_eq!(report.presses, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn live_edits_are_seen_next_tick() {
        let config = SharedConfig::new(CycleConfig {
            keys: vec![KeyToken::Char('a')],
            delays_ms: vec![100],
        });
        let editor = config.clone();
        let mut scheduler = Scheduler::new(CountingInjector::default(), config);

        let run = tokio::spawn(async move { scheduler.run(RunMode::Counted(4), false).await });
        time::sleep(Duration::from_millis(150)).await;
        // Swap in a two-key sequence mid-run; later ticks pick it up.
        editor.replace(CycleConfig {
            keys: vec![KeyToken::Char('x'), KeyToken::Char('y')],
            delays_ms: vec![10, 10],
        });

        let report = run.await.unwrap().unwrap();
        assert_eq!(report.outcome, RunOutcome::Completed);
        assert_eq!(report.presses, 4);
    }

    #[test]
    fn test_format_remaining() {
        assert_eq!(format_remaining(5.0), "5s");
        assert_eq!(format_remaining(59.4), "59s");
        assert_eq!(format_remaining(60.0), "1:00");
        assert_eq!(format_remaining(125.0), "2:05");
    }

    #[test]
    fn test_summary_variants() {
        let completed = RunReport {
            outcome: RunOutcome::Completed,
            presses: 5,
            elapsed: Duration::from_secs(2),
        };
        assert!(completed.summary(RunMode::Counted(5)).starts_with("completed"));

        let early = RunReport {
            outcome: RunOutcome::StoppedEarly,
            presses: 3,
            elapsed: Duration::from_secs(1),
        };
        assert!(early.summary(RunMode::Counted(5)).contains("3/5"));

        let continuous = RunReport {
            outcome: RunOutcome::Continuous,
            presses: 7,
            elapsed: Duration::from_secs(9),
        };
        assert!(continuous.summary(RunMode::Continuous).contains("7 total"));
    }
}
