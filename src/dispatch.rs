//! Choosing which channels a batch of pipeline runs goes to.

use std::fmt;
use std::time::Duration;

use tracing::{info, warn};

use crate::error::PipelineError;
use crate::pipeline::{RunOutcome, StageRunner};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchMode {
    /// One run bound to the channel with this key.
    Targeted(String),
    /// One independent run per configured channel, in configuration order.
    Broadcast,
    /// One unbound run; the first channel allowed to post gets it.
    Auto,
}

impl fmt::Display for DispatchMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DispatchMode::Targeted(key) => write!(f, "targeted({key})"),
            DispatchMode::Broadcast => f.write_str("broadcast"),
            DispatchMode::Auto => f.write_str("auto"),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunStatistics {
    pub attempted: u32,
    pub successful: u32,
    pub failed: u32,
}

impl RunStatistics {
    pub fn record(&mut self, success: bool) {
        self.attempted += 1;
        if success {
            self.successful += 1;
        } else {
            self.failed += 1;
        }
    }

    pub fn merge(&mut self, other: RunStatistics) {
        self.attempted += other.attempted;
        self.successful += other.successful;
        self.failed += other.failed;
    }

    /// Percentage of attempted runs that succeeded; zero when nothing ran.
    pub fn success_rate(&self) -> f64 {
        if self.attempted == 0 {
            0.0
        } else {
            f64::from(self.successful) / f64::from(self.attempted) * 100.0
        }
    }
}

#[derive(Debug, Default)]
pub struct DispatchReport {
    pub stats: RunStatistics,
    pub outcomes: Vec<RunOutcome>,
}

impl DispatchReport {
    fn push(&mut self, outcome: RunOutcome) {
        self.stats.record(outcome.is_success());
        self.outcomes.push(outcome);
    }

    fn absorb(&mut self, other: DispatchReport) {
        self.stats.merge(other.stats);
        self.outcomes.extend(other.outcomes);
    }

    /// True when at least one run succeeded.
    pub fn overall(&self) -> bool {
        self.stats.successful > 0
    }
}

pub struct Dispatcher {
    runner: StageRunner,
    channel_delay: Duration,
}

impl Dispatcher {
    pub fn new(runner: StageRunner, channel_delay: Duration) -> Self {
        Self {
            runner,
            channel_delay,
        }
    }

    pub fn runner(&self) -> &StageRunner {
        &self.runner
    }

    /// Run the pipeline according to `mode`. Only an unknown channel key is
    /// an error; stage failures are counted in the report.
    pub async fn dispatch(&self, mode: &DispatchMode) -> Result<DispatchReport, PipelineError> {
        let mut report = DispatchReport::default();
        match mode {
            DispatchMode::Targeted(key) => {
                let channel = self
                    .runner
                    .channels()
                    .iter()
                    .find(|c| &c.key == key)
                    .ok_or_else(|| PipelineError::Configuration {
                        channel: key.clone(),
                        reason: "no such channel in configuration".to_string(),
                    })?;
                report.push(self.runner.run(Some(channel)).await);
            }
            DispatchMode::Broadcast => {
                let channels = self.runner.channels();
                if channels.is_empty() {
                    warn!("Broadcast requested but no channels are configured");
                }
                for (i, channel) in channels.iter().enumerate() {
                    if i > 0 && !self.channel_delay.is_zero() {
                        tokio::time::sleep(self.channel_delay).await;
                    }
                    info!("Processing channel {}/{}: {}", i + 1, channels.len(), channel.name);
                    let outcome = self.runner.run(Some(channel)).await;
                    if outcome.is_success() {
                        info!("Channel {} completed", channel.key);
                    } else {
                        warn!("Channel {} did not complete", channel.key);
                    }
                    report.push(outcome);
                }
                info!(
                    "Broadcast finished: {}/{} channels succeeded",
                    report.stats.successful, report.stats.attempted
                );
            }
            DispatchMode::Auto => report.push(self.runner.run(None).await),
        }
        Ok(report)
    }

    /// Dispatch `count` times with `delay` between dispatches. `on_progress`
    /// sees the 1-based dispatch number and that dispatch's report.
    pub async fn run_batch<F>(
        &self,
        mode: &DispatchMode,
        count: u32,
        delay: Duration,
        mut on_progress: F,
    ) -> Result<DispatchReport, PipelineError>
    where
        F: FnMut(u32, &DispatchReport),
    {
        info!("Starting batch of {} dispatches in {} mode", count, mode);
        let mut total = DispatchReport::default();
        for n in 1..=count {
            let report = self.dispatch(mode).await?;
            on_progress(n, &report);
            total.absorb(report);
            if n < count && !delay.is_zero() {
                info!("Waiting {} seconds before next dispatch", delay.as_secs());
                tokio::time::sleep(delay).await;
            }
        }
        Ok(total)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::tests::{harness, Faults};
    use crate::tracker::tests::channel;

    fn three_channels() -> Vec<crate::channel::ChannelTarget> {
        vec![
            channel("channel_1", 0, 23, 5),
            channel("channel_2", 0, 23, 5),
            channel("channel_3", 0, 23, 5),
        ]
    }

    #[tokio::test]
    async fn broadcast_all_succeed() {
        let (runner, h) = harness(three_channels(), Faults::default(), false);
        let dispatcher = Dispatcher::new(runner, Duration::ZERO);
        let report = dispatcher.dispatch(&DispatchMode::Broadcast).await.unwrap();

        assert_eq!(
            report.stats,
            RunStatistics {
                attempted: 3,
                successful: 3,
                failed: 0
            }
        );
        assert!(report.overall());
        let uploads: Vec<String> = h.uploader.uploads.lock().iter().map(|(c, _)| c.clone()).collect();
        assert_eq!(uploads, ["channel_1", "channel_2", "channel_3"]);
        assert_eq!(h.videos().len(), 3);
    }

    #[tokio::test]
    async fn broadcast_all_fail() {
        let faults = Faults {
            compose: true,
            ..Faults::default()
        };
        let (runner, _h) = harness(three_channels(), faults, false);
        let dispatcher = Dispatcher::new(runner, Duration::ZERO);
        let report = dispatcher.dispatch(&DispatchMode::Broadcast).await.unwrap();

        assert_eq!(report.stats.attempted, 3);
        assert_eq!(report.stats.failed, 3);
        assert!(!report.overall());
    }

    #[tokio::test]
    async fn broadcast_partial_success_is_overall_success() {
        let mut channels = three_channels();
        channels[1] = channel("channel_2", 0, 3, 5);
        let (runner, _h) = harness(channels, Faults::default(), false);
        let dispatcher = Dispatcher::new(runner, Duration::ZERO);
        let report = dispatcher.dispatch(&DispatchMode::Broadcast).await.unwrap();

        assert_eq!(report.stats.successful, 2);
        assert_eq!(report.stats.failed, 1);
        assert!(report.overall());
        assert!(matches!(report.outcomes[1], RunOutcome::NotScheduled { .. }));
    }

    #[tokio::test]
    async fn targeted_runs_once_for_that_channel() {
        let (runner, h) = harness(three_channels(), Faults::default(), false);
        let dispatcher = Dispatcher::new(runner, Duration::ZERO);
        let report = dispatcher
            .dispatch(&DispatchMode::Targeted("channel_2".into()))
            .await
            .unwrap();

        assert_eq!(report.stats.attempted, 1);
        assert!(report.overall());
        assert_eq!(h.tracker.uploads_today("channel_2").unwrap(), 1);
        assert_eq!(h.tracker.uploads_today("channel_1").unwrap(), 0);
    }

    #[tokio::test]
    async fn targeted_unknown_channel_is_rejected() {
        let (runner, _h) = harness(three_channels(), Faults::default(), false);
        let dispatcher = Dispatcher::new(runner, Duration::ZERO);
        let err = dispatcher
            .dispatch(&DispatchMode::Targeted("nope".into()))
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::Configuration { .. }));
    }

    #[tokio::test]
    async fn batch_aggregates_and_reports_progress() {
        let (runner, h) = harness(vec![channel("channel_1", 0, 23, 2)], Faults::default(), false);
        let dispatcher = Dispatcher::new(runner, Duration::ZERO);
        let mut seen = Vec::new();
        let report = dispatcher
            .run_batch(&DispatchMode::Auto, 3, Duration::ZERO, |n, r| {
                seen.push((n, r.overall()))
            })
            .await
            .unwrap();

        // Quota of two closes the channel for the third run.
        assert_eq!(seen, [(1, true), (2, true), (3, false)]);
        assert_eq!(report.stats.attempted, 3);
        assert_eq!(report.stats.successful, 2);
        assert!((report.stats.success_rate() - 200.0 / 3.0).abs() < 1e-9);
        assert_eq!(h.tracker.uploads_today("channel_1").unwrap(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn broadcast_waits_channel_delay_between_channels_only() {
        let (runner, _h) = harness(three_channels(), Faults::default(), false);
        let dispatcher = Dispatcher::new(runner, Duration::from_secs(5));

        let started = tokio::time::Instant::now();
        let report = dispatcher.dispatch(&DispatchMode::Broadcast).await.unwrap();

        assert_eq!(report.stats.successful, 3);
        assert_eq!(started.elapsed(), Duration::from_secs(10));
    }

    #[tokio::test(start_paused = true)]
    async fn batch_waits_between_dispatches_only() {
        let (runner, _h) = harness(vec![channel("channel_1", 0, 23, 5)], Faults::default(), false);
        let dispatcher = Dispatcher::new(runner, Duration::from_secs(5));

        let started = tokio::time::Instant::now();
        let report = dispatcher
            .run_batch(&DispatchMode::Auto, 3, Duration::from_secs(4), |_, _| {})
            .await
            .unwrap();

        assert_eq!(report.stats.successful, 3);
        assert_eq!(started.elapsed(), Duration::from_secs(8));
    }

    #[test]
    fn empty_statistics_have_zero_rate() {
        assert_eq!(RunStatistics::default().success_rate(), 0.0);
    }
}
