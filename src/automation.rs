//! Long-running automation: repeated broadcast cycles with pacing, age-based
//! cleanup of finished videos and cooperative shutdown.

use std::fs;
use std::panic::AssertUnwindSafe;
use std::path::Path;
use std::time::{Duration, SystemTime};

use futures::FutureExt;
use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::AutomationConfig;
use crate::dispatch::{DispatchMode, Dispatcher};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AutomationState {
    Idle,
    Running,
    Waiting,
    Retrying,
    Stopped,
}

/// Sleep lengths between runs and cycles.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pacing {
    pub run_delay: Duration,
    pub retry_delay: Duration,
    pub cycle_interval: Duration,
    pub error_backoff: Duration,
    /// How often a long wait checks for cancellation.
    pub poll_interval: Duration,
}

impl Pacing {
    pub fn from_config(config: &AutomationConfig) -> Self {
        Self {
            run_delay: config.run_delay(),
            retry_delay: config.retry_delay(),
            cycle_interval: config.cycle_interval(),
            error_backoff: config.error_backoff(),
            poll_interval: config.poll_interval(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CycleReport {
    pub runs_started: u32,
    pub videos_produced: u32,
    pub failed_runs: u32,
    pub exited_early: bool,
    pub old_videos_removed: usize,
}

pub struct AutomationController {
    dispatcher: Dispatcher,
    config: AutomationConfig,
    pacing: Pacing,
    state: Mutex<AutomationState>,
}

impl AutomationController {
    pub fn new(dispatcher: Dispatcher, config: AutomationConfig) -> Self {
        let pacing = Pacing::from_config(&config);
        Self {
            dispatcher,
            config,
            pacing,
            state: Mutex::new(AutomationState::Idle),
        }
    }

    pub fn with_pacing(mut self, pacing: Pacing) -> Self {
        self.pacing = pacing;
        self
    }

    pub fn state(&self) -> AutomationState {
        *self.state.lock()
    }

    fn set_state(&self, state: AutomationState) {
        let mut current = self.state.lock();
        if *current != state {
            debug!("Automation state {:?} -> {:?}", *current, state);
            *current = state;
        }
    }

    fn any_channel_ready(&self) -> bool {
        let runner = self.dispatcher.runner();
        runner
            .channels()
            .iter()
            .any(|c| runner.tracker().should_post_now(c))
    }

    /// One automation cycle: up to `max_runs` broadcast dispatches, then
    /// cleanup. Stops early once no channel may post.
    pub async fn run_cycle(&self) -> CycleReport {
        let mut report = CycleReport::default();
        if !self.config.enabled {
            info!("Automation is disabled in configuration, skipping cycle");
            return report;
        }

        self.set_state(AutomationState::Running);
        let skip_upload = self.dispatcher.runner().skip_upload();
        let max_runs = self.config.max_runs;
        info!("Starting automation cycle with up to {} runs", max_runs);

        for run in 1..=max_runs {
            if !skip_upload && !self.any_channel_ready() {
                info!("No channels ready to post, ending cycle early");
                report.exited_early = true;
                break;
            }

            info!("Automation run {}/{}", run, max_runs);
            report.runs_started += 1;
            let succeeded = match self.dispatcher.dispatch(&DispatchMode::Broadcast).await {
                Ok(dispatch) => {
                    report.videos_produced += dispatch.stats.successful;
                    dispatch.overall()
                }
                Err(e) => {
                    error!("Dispatch failed: {}", e);
                    false
                }
            };
            if !succeeded {
                report.failed_runs += 1;
            }

            if run < max_runs {
                let delay = if succeeded {
                    self.set_state(AutomationState::Waiting);
                    self.pacing.run_delay
                } else {
                    warn!("Run {} failed, retrying in {} seconds", run, self.pacing.retry_delay.as_secs());
                    self.set_state(AutomationState::Retrying);
                    self.pacing.retry_delay
                };
                tokio::time::sleep(delay).await;
                self.set_state(AutomationState::Running);
            }
        }

        if self.config.cleanup_old_videos {
            let dir = self.dispatcher.runner().output_dir();
            match cleanup_old_videos(dir, self.config.keep_videos_days) {
                Ok(removed) => report.old_videos_removed = removed,
                Err(e) => warn!("Cleanup of {} failed: {}", dir.display(), e),
            }
        }

        info!(
            runs = report.runs_started,
            videos = report.videos_produced,
            failed = report.failed_runs,
            early_exit = report.exited_early,
            "Automation cycle finished"
        );
        self.set_state(AutomationState::Idle);
        report
    }

    /// Repeat cycles until `cancel` fires. A run in flight always finishes;
    /// waits between cycles observe cancellation every poll interval.
    pub async fn supervise(&self, cancel: CancellationToken) {
        info!("Automation supervisor started");
        while !cancel.is_cancelled() {
            let wait = match AssertUnwindSafe(self.run_cycle()).catch_unwind().await {
                Ok(_) => {
                    self.set_state(AutomationState::Waiting);
                    info!(
                        "Next cycle in {} minutes",
                        self.pacing.cycle_interval.as_secs() / 60
                    );
                    self.pacing.cycle_interval
                }
                Err(_) => {
                    error!(
                        "Automation cycle crashed, backing off for {} seconds",
                        self.pacing.error_backoff.as_secs()
                    );
                    self.set_state(AutomationState::Retrying);
                    self.pacing.error_backoff
                }
            };
            if !self.wait(wait, &cancel).await {
                break;
            }
        }
        self.set_state(AutomationState::Stopped);
        info!("Automation supervisor stopped");
    }

    /// Sleep in poll-interval steps; false if cancelled before the end.
    async fn wait(&self, duration: Duration, cancel: &CancellationToken) -> bool {
        let mut remaining = duration;
        while !remaining.is_zero() {
            if cancel.is_cancelled() {
                return false;
            }
            let step = if self.pacing.poll_interval.is_zero() {
                remaining
            } else {
                remaining.min(self.pacing.poll_interval)
            };
            tokio::time::sleep(step).await;
            remaining -= step;
        }
        !cancel.is_cancelled()
    }
}

/// Delete `*.mp4` files in `dir` last modified more than `keep_days` ago.
/// Only a failure to list `dir` is an error; files that cannot be inspected
/// or removed are logged and skipped.
pub fn cleanup_old_videos(dir: &Path, keep_days: u64) -> std::io::Result<usize> {
    if !dir.exists() {
        return Ok(0);
    }
    let max_age = Duration::from_secs(keep_days * 24 * 60 * 60);
    let now = SystemTime::now();
    let mut removed = 0;
    for entry in fs::read_dir(dir)? {
        let path = match entry {
            Ok(entry) => entry.path(),
            Err(e) => {
                warn!("Cannot read entry in {}: {}", dir.display(), e);
                continue;
            }
        };
        let is_video = path
            .extension()
            .is_some_and(|e| e.eq_ignore_ascii_case("mp4"));
        if !is_video || !path.is_file() {
            continue;
        }
        match remove_if_older(&path, now, max_age) {
            Ok(true) => {
                info!("Removed old video {}", path.display());
                removed += 1;
            }
            Ok(false) => {}
            Err(e) => warn!("Skipping {} during cleanup: {}", path.display(), e),
        }
    }
    if removed > 0 {
        info!("Cleaned up {} old videos", removed);
    }
    Ok(removed)
}

fn remove_if_older(path: &Path, now: SystemTime, max_age: Duration) -> std::io::Result<bool> {
    let modified = fs::metadata(path)?.modified()?;
    if now.duration_since(modified).unwrap_or_default() <= max_age {
        return Ok(false);
    }
    fs::remove_file(path)?;
    Ok(true)
}

#[cfg(test)]
mod tests {
    use std::fs::File;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use tokio::time::Instant;

    use super::*;
    use crate::error::StoreError;
    use crate::pipeline::tests::{harness, harness_with_store, Faults};
    use crate::store::{CounterStore, MemoryCounterStore};
    use crate::tracker::tests::channel;

    fn instant() -> Pacing {
        Pacing {
            run_delay: Duration::ZERO,
            retry_delay: Duration::ZERO,
            cycle_interval: Duration::ZERO,
            error_backoff: Duration::ZERO,
            poll_interval: Duration::ZERO,
        }
    }

    fn controller(
        channels: Vec<crate::channel::ChannelTarget>,
        faults: Faults,
        skip_upload: bool,
        config: AutomationConfig,
    ) -> (AutomationController, crate::pipeline::tests::Harness) {
        let (runner, h) = harness(channels, faults, skip_upload);
        let dispatcher = Dispatcher::new(runner, Duration::ZERO);
        (
            AutomationController::new(dispatcher, config).with_pacing(instant()),
            h,
        )
    }

    fn config(max_runs: u32) -> AutomationConfig {
        AutomationConfig {
            enabled: true,
            max_runs,
            ..AutomationConfig::default()
        }
    }

    #[tokio::test]
    async fn cycle_stops_when_quota_is_reached() {
        let (ctl, h) = controller(vec![channel("c1", 0, 23, 2)], Faults::default(), false, config(5));
        let report = ctl.run_cycle().await;

        assert_eq!(report.runs_started, 2);
        assert_eq!(report.videos_produced, 2);
        assert_eq!(report.failed_runs, 0);
        assert!(report.exited_early);
        assert_eq!(h.tracker.uploads_today("c1").unwrap(), 2);
        assert_eq!(ctl.state(), AutomationState::Idle);
    }

    #[tokio::test]
    async fn closed_window_exits_before_generating() {
        let (ctl, h) = controller(vec![channel("c1", 0, 3, 5)], Faults::default(), false, config(5));
        let report = ctl.run_cycle().await;

        assert_eq!(report.runs_started, 0);
        assert!(report.exited_early);
        assert!(h.videos().is_empty());
    }

    #[tokio::test]
    async fn skip_upload_ignores_schedule() {
        let (ctl, h) = controller(vec![channel("c1", 0, 3, 5)], Faults::default(), true, config(3));
        let report = ctl.run_cycle().await;

        assert_eq!(report.runs_started, 3);
        assert_eq!(report.videos_produced, 3);
        assert!(!report.exited_early);
        assert_eq!(h.videos().len(), 3);
    }

    #[tokio::test]
    async fn failed_runs_are_retried_not_fatal() {
        let faults = Faults {
            synthesize: true,
            ..Faults::default()
        };
        let (ctl, _h) = controller(vec![channel("c1", 0, 23, 5)], faults, false, config(3));
        let report = ctl.run_cycle().await;

        assert_eq!(report.runs_started, 3);
        assert_eq!(report.failed_runs, 3);
        assert_eq!(report.videos_produced, 0);
    }

    #[tokio::test]
    async fn disabled_cycle_is_a_no_op() {
        let cfg = AutomationConfig {
            enabled: false,
            ..config(5)
        };
        let (ctl, h) = controller(vec![channel("c1", 0, 23, 5)], Faults::default(), false, cfg);
        assert_eq!(ctl.run_cycle().await, CycleReport::default());
        assert!(h.videos().is_empty());
    }

    #[tokio::test]
    async fn supervisor_stops_on_cancel_during_long_wait() {
        let (ctl, h) = controller(vec![channel("c1", 0, 23, 1)], Faults::default(), false, config(1));
        let ctl = ctl.with_pacing(Pacing {
            cycle_interval: Duration::from_secs(3600),
            poll_interval: Duration::from_millis(10),
            ..instant()
        });

        let token = CancellationToken::new();
        let trigger = token.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(100)).await;
            trigger.cancel();
        });

        tokio::time::timeout(Duration::from_secs(5), ctl.supervise(token))
            .await
            .expect("supervisor should stop promptly");
        assert_eq!(ctl.state(), AutomationState::Stopped);
        assert_eq!(h.tracker.uploads_today("c1").unwrap(), 1);
    }

    fn paced(run_delay: u64, retry_delay: u64) -> Pacing {
        Pacing {
            run_delay: Duration::from_secs(run_delay),
            retry_delay: Duration::from_secs(retry_delay),
            ..instant()
        }
    }

    #[tokio::test(start_paused = true)]
    async fn successful_runs_wait_run_delay_between_runs() {
        let (ctl, _h) = controller(vec![channel("c1", 0, 23, 5)], Faults::default(), false, config(3));
        let ctl = ctl.with_pacing(paced(11, 100));

        let started = Instant::now();
        let report = ctl.run_cycle().await;

        assert_eq!(report.videos_produced, 3);
        // Two gaps; nothing after the last run.
        assert_eq!(started.elapsed(), Duration::from_secs(22));
    }

    #[tokio::test(start_paused = true)]
    async fn failed_runs_wait_retry_delay_between_runs() {
        let faults = Faults {
            compose: true,
            ..Faults::default()
        };
        let (ctl, _h) = controller(vec![channel("c1", 0, 23, 5)], faults, false, config(3));
        let ctl = ctl.with_pacing(paced(100, 7));

        let started = Instant::now();
        let report = ctl.run_cycle().await;

        assert_eq!(report.failed_runs, 3);
        assert_eq!(started.elapsed(), Duration::from_secs(14));
    }

    #[tokio::test(start_paused = true)]
    async fn state_reflects_which_delay_is_running() {
        let (ctl, _h) = controller(vec![channel("c1", 0, 23, 5)], Faults::default(), false, config(2));
        let ctl = ctl.with_pacing(paced(60, 600));

        let observe = async {
            tokio::time::sleep(Duration::from_secs(30)).await;
            ctl.state()
        };
        let (report, during_wait) = tokio::join!(ctl.run_cycle(), observe);

        assert_eq!(during_wait, AutomationState::Waiting);
        assert_eq!(report.runs_started, 2);
        assert_eq!(ctl.state(), AutomationState::Idle);
    }

    /// Panics on the first `get`, then behaves like a memory store.
    struct CrashOnceStore {
        inner: MemoryCounterStore,
        crashes_left: AtomicUsize,
    }

    impl CounterStore for CrashOnceStore {
        fn get(&self, key: &str) -> Result<u32, StoreError> {
            let crash = self
                .crashes_left
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok();
            if crash {
                panic!("counter backend crashed");
            }
            self.inner.get(key)
        }

        fn increment(&self, key: &str) -> Result<u32, StoreError> {
            self.inner.increment(key)
        }

        fn enumerate(&self, prefix: &str) -> Result<Vec<(String, u32)>, StoreError> {
            self.inner.enumerate(prefix)
        }
    }

    #[tokio::test(start_paused = true)]
    async fn supervisor_backs_off_after_crashed_cycle_then_runs_again() {
        let store = Arc::new(CrashOnceStore {
            inner: MemoryCounterStore::new(),
            crashes_left: AtomicUsize::new(1),
        });
        let (runner, h) = harness_with_store(vec![channel("c1", 0, 23, 5)], Faults::default(), false, store);
        let ctl = AutomationController::new(Dispatcher::new(runner, Duration::ZERO), config(1)).with_pacing(
            Pacing {
                error_backoff: Duration::from_secs(30),
                cycle_interval: Duration::from_secs(3600),
                poll_interval: Duration::from_secs(10),
                ..instant()
            },
        );

        let token = CancellationToken::new();
        let observe = async {
            tokio::time::sleep(Duration::from_secs(15)).await;
            let backing_off = (ctl.state(), h.tracker.uploads_today("c1").unwrap());

            tokio::time::sleep(Duration::from_secs(30)).await;
            let after_retry = (ctl.state(), h.tracker.uploads_today("c1").unwrap());

            token.cancel();
            (backing_off, after_retry)
        };
        let started = Instant::now();
        let (_, (backing_off, after_retry)) = tokio::join!(ctl.supervise(token.clone()), observe);

        assert_eq!(backing_off, (AutomationState::Retrying, 0));
        assert_eq!(after_retry, (AutomationState::Waiting, 1));
        assert_eq!(ctl.state(), AutomationState::Stopped);
        // Cancelled at 45s, noticed at the next 10s poll step.
        assert_eq!(started.elapsed(), Duration::from_secs(50));
    }

    #[test]
    fn vanished_file_is_reported_not_counted() {
        let dir = tempfile::tempdir().unwrap();
        let gone = dir.path().join("gone.mp4");
        assert!(remove_if_older(&gone, SystemTime::now(), Duration::ZERO).is_err());
    }

    #[test]
    fn removes_only_old_mp4_files() {
        let dir = tempfile::tempdir().unwrap();
        let old = dir.path().join("old.mp4");
        let fresh = dir.path().join("fresh.mp4");
        let other = dir.path().join("old.txt");
        for p in [&old, &fresh, &other] {
            std::fs::write(p, b"x").unwrap();
        }
        let ten_days_ago = SystemTime::now() - Duration::from_secs(10 * 24 * 60 * 60);
        for p in [&old, &other] {
            File::options()
                .write(true)
                .open(p)
                .unwrap()
                .set_modified(ten_days_ago)
                .unwrap();
        }

        assert_eq!(cleanup_old_videos(dir.path(), 7).unwrap(), 1);
        assert!(!old.exists());
        assert!(fresh.exists());
        assert!(other.exists());
        assert_eq!(cleanup_old_videos(&dir.path().join("missing"), 7).unwrap(), 0);
    }
}
